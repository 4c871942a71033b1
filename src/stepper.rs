//! Per-frame simulation orchestration.
//!
//! [`step_frame`] is the single entry point the host calls during playback.
//! It decides between four outcomes for a requested frame: rewind to the
//! start (full rebuild from rest poses), replay a cached frame, advance the
//! simulation exactly one frame, or do nothing. Simulation never
//! fast-forwards: a request more than one frame ahead without a cache hit
//! leaves the engine state where it was.

use log::{debug, info, warn};

use crate::body::BodyFlags;
use crate::breaking::update_breaking;
use crate::cache::{BodyPose, CacheFlags};
use crate::constraint::{ConstraintFlags, ConstraintKey};
use crate::error::{SimError, SimResult};
use crate::filter::SimContactFilter;
use crate::scene::Scene;
use crate::sync::{
    reset_grabbed_body, restore_rest_pose, sync_object_transforms, update_sim_body,
};
use crate::validate::{apply_pending_actions, validate_body, validate_constraint};
use crate::world::RigidBodyWorld;

/// One validation pass: world, then bodies, then constraints, with the
/// collision filter's deferred actions drained first so the flags they set
/// are honored in the same pass.
pub fn update_simulation(
    scene: &mut Scene,
    world: &mut RigidBodyWorld,
    rebuild: bool,
) -> SimResult<()> {
    world.validate_world(scene, rebuild);
    let gravity = world.effective_gravity(scene);
    if let Some(handle) = world.handle {
        world.backend_mut().world_set_gravity(handle, gravity);
    }

    apply_pending_actions(scene, world)?;

    if rebuild || world.index_maps_stale(scene) {
        world.rebuild_index_maps(scene)?;
    }

    propagate_solver_overrides(scene, world);

    // bodies before constraints: constraint validation needs live endpoints
    for key in world.body_keys().to_vec() {
        let Some(body) = scene.body(key) else {
            continue;
        };
        let dirty = body.flags.intersects(
            BodyFlags::NEEDS_VALIDATE | BodyFlags::NEEDS_RESHAPE | BodyFlags::KINEMATIC_REBUILD,
        );
        if rebuild || dirty || body.handle.is_none() {
            let kinematic_rebuild = body.flags.contains(BodyFlags::KINEMATIC_REBUILD);
            validate_body(scene, world, key, rebuild || kinematic_rebuild)?;
        }
    }

    for key in constraint_keys(scene, world) {
        let Some(con) = scene.constraint(key) else {
            continue;
        };
        let dirty = con.flags.contains(ConstraintFlags::NEEDS_VALIDATE);
        if rebuild || dirty || con.handle.is_none() {
            validate_constraint(scene, world, key, rebuild || dirty)?;
        }
    }

    // pre-step write-to-engine pass
    for key in world.body_keys().to_vec() {
        update_sim_body(scene, world, key)?;
    }

    world.rebuild_comp_con = false;
    Ok(())
}

/// All constraint keys carried by the world's members, object-level first.
fn constraint_keys(scene: &Scene, world: &RigidBodyWorld) -> Vec<ConstraintKey> {
    let mut keys = Vec::new();
    for id in &world.members {
        let Ok(obj) = scene.object(*id) else {
            continue;
        };
        if obj.constraint.is_some() {
            keys.push(ConstraintKey::Object(*id));
        }
        if let Some(fracture) = obj.active_fracture() {
            if fracture.use_constraints {
                for index in 0..fracture.constraints.len() {
                    keys.push(ConstraintKey::Shard { object: *id, index });
                }
            }
        }
    }
    keys
}

/// Push the per-object solver iteration override down into every shard
/// constraint that does not carry it yet.
fn propagate_solver_overrides(scene: &mut Scene, world: &RigidBodyWorld) {
    for id in &world.members {
        let Ok(obj) = scene.object_mut(*id) else {
            continue;
        };
        let Some(fracture) = obj.active_fracture_mut() else {
            continue;
        };
        let override_iterations = fracture.settings.solver_iterations_override;
        if override_iterations <= 0 {
            continue;
        }
        for con in &mut fracture.constraints {
            if con.num_solver_iterations != override_iterations
                || !con
                    .flags
                    .contains(ConstraintFlags::OVERRIDE_SOLVER_ITERATIONS)
            {
                con.num_solver_iterations = override_iterations;
                con.flags.insert(
                    ConstraintFlags::OVERRIDE_SOLVER_ITERATIONS | ConstraintFlags::NEEDS_VALIDATE,
                );
            }
        }
    }
}

/// Rewind to the cache start frame: rest poses restored, everything rebuilt
/// from scratch, broken constraints re-enabled.
fn reset_to_start(scene: &mut Scene, world: &mut RigidBodyWorld) -> SimResult<()> {
    let start = world.cache.frame_start;
    if world.last_time == start
        && world.handle.is_some()
        && !world.cache.flags.contains(CacheFlags::OUTDATED)
    {
        return Ok(());
    }

    info!("resetting simulation to frame {}", start);
    world.rebuild_comp_con = true;
    if world.cache.flags.contains(CacheFlags::OUTDATED) {
        // recorded frames no longer match the scene; drop them (or flag a
        // baked cache for redo) before resimulating
        world.cache.reset();
    }
    for id in world.members.clone() {
        restore_rest_pose(scene, id, start)?;
    }
    update_simulation(scene, world, true)?;

    if !world.cache.is_baked() {
        write_cache_frame(scene, world, start)?;
    }
    world.cache.validate(start);
    world.last_time = start;
    Ok(())
}

/// Pull every body's simulated pose out of the engine.
fn pull_engine_poses(scene: &mut Scene, world: &mut RigidBodyWorld) {
    for key in world.body_keys().to_vec() {
        let Some(body) = scene.body(key) else {
            continue;
        };
        let Some(handle) = body.handle else {
            continue;
        };
        let kinematic = body.is_kinematic();
        let position = world.backend().body_position(handle);
        let orientation = world.backend().body_orientation(handle);
        if let Some(body) = scene.body_mut(key) {
            // kinematic bodies keep the authoring-driven pose
            if !kinematic {
                body.position = position;
                body.orientation = orientation;
            }
        }
    }
}

fn write_cache_frame(scene: &Scene, world: &mut RigidBodyWorld, frame: i32) -> SimResult<()> {
    let poses = world
        .body_keys()
        .iter()
        .filter_map(|key| {
            scene.body(*key).map(|body| BodyPose {
                key: *key,
                position: body.position,
                orientation: body.orientation,
            })
        })
        .collect();
    world.cache.write(frame, poses);
    Ok(())
}

/// Replay a recorded frame into the scene and the engine without stepping.
fn replay_cached_frame(
    scene: &mut Scene,
    world: &mut RigidBodyWorld,
    frame: i32,
) -> SimResult<()> {
    let cached = match world.cache.read(frame) {
        Some(frame) => frame.poses.clone(),
        None => return Ok(()),
    };
    if cached.len() != world.num_bodies {
        return Err(SimError::CachePoseCount {
            frame,
            got: cached.len(),
            expected: world.num_bodies,
        });
    }

    for pose in cached {
        let handle = {
            let Some(body) = scene.body_mut(pose.key) else {
                continue;
            };
            body.position = pose.position;
            body.orientation = pose.orientation;
            body.handle
        };
        if let Some(handle) = handle {
            world
                .backend_mut()
                .body_set_transform(handle, pose.position, pose.orientation);
        }
    }
    for id in world.members.clone() {
        sync_object_transforms(scene, id, frame)?;
    }
    Ok(())
}

/// Advance the simulation to `frame`.
///
/// Frames at or before the cache start rewind and rebuild. Recorded frames
/// replay from the cache. Exactly one frame past the last simulated one is
/// stepped; anything further is ignored until the cache catches up, so a
/// skipped frame leaves the engine state at `last_time` (a known
/// limitation, not an error).
pub fn step_frame(scene: &mut Scene, world: &mut RigidBodyWorld, frame: i32) -> SimResult<()> {
    if world.muted {
        return Ok(());
    }
    let frame = world.cache.clamp_frame(frame);

    if frame <= world.cache.frame_start {
        return reset_to_start(scene, world);
    }
    if frame == world.last_time {
        return Ok(());
    }

    // cache replay short-circuits simulation entirely
    if world.cache.read(frame).is_some() {
        debug!("replaying cached frame {}", frame);
        replay_cached_frame(scene, world, frame)?;
        world.last_time = frame;
        return Ok(());
    }
    if world.cache.is_baked() {
        return Ok(());
    }
    if frame != world.last_time + 1 {
        warn!(
            "frame {} requested with last simulated frame {}, not fast-forwarding",
            frame, world.last_time
        );
        return Ok(());
    }

    update_simulation(scene, world, false)?;

    let fps = scene.fps.max(1.0);
    let timestep = 1.0 / fps * (frame - world.last_time) as f32 * world.settings.time_scale;
    let substep =
        1.0 / world.settings.steps_per_second as f32 * world.settings.time_scale.min(1.0);

    let Some(world_handle) = world.handle else {
        return Ok(());
    };
    let mut filter = SimContactFilter::snapshot(scene, world.body_keys());
    world
        .backend_mut()
        .world_step(world_handle, timestep, i32::MAX, substep, &mut filter);
    world.pending_actions.extend(filter.take_pending());

    // grabbed bodies were pinned for the step; undo before reading poses back
    for key in world.body_keys().to_vec() {
        reset_grabbed_body(scene, world, key)?;
    }

    pull_engine_poses(scene, world);
    update_breaking(scene, world)?;

    for id in world.members.clone() {
        sync_object_transforms(scene, id, frame)?;
    }
    write_cache_frame(scene, world, frame)?;
    world.cache.validate(frame);
    world.last_time = frame;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::body::{BodyType, CollisionShape, RigidBody};
    use crate::scene::{BodyKey, Mesh, ObjectId, SceneObject};
    use glam::{Mat4, Vec3};

    fn box_mesh(half: f32) -> Mesh {
        Mesh {
            vertices: vec![Vec3::splat(-half), Vec3::splat(half)],
            triangles: vec![],
        }
    }

    fn falling_scene() -> (Scene, ObjectId, ObjectId) {
        let mut scene = Scene::new();

        let mut ground = SceneObject::new("ground", box_mesh(5.0));
        let mut ground_body = RigidBody::new(BodyType::Passive);
        ground_body.shape = CollisionShape::Box;
        ground.body = Some(ground_body);
        ground.transform = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let ground_id = scene.add_object(ground);

        let mut faller = SceneObject::new("faller", box_mesh(1.0));
        let mut body = RigidBody::new(BodyType::Active);
        body.shape = CollisionShape::Box;
        body.position = Vec3::new(0.0, 0.0, 10.0);
        faller.body = Some(body);
        faller.transform = Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0));
        let faller_id = scene.add_object(faller);

        (scene, ground_id, faller_id)
    }

    fn world_with(scene: &Scene, members: &[ObjectId]) -> RigidBodyWorld {
        let mut world = RigidBodyWorld::new(
            Box::new(MockBackend::new()),
            scene.frame_start,
            scene.frame_end,
        );
        for id in members {
            world.add_member(*id);
        }
        world
    }

    #[test]
    fn free_fall_descends_monotonically() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);
        let key = BodyKey::object(faller);

        step_frame(&mut scene, &mut world, 1).unwrap();
        let mut last_z = scene.body(key).unwrap().position.z;
        assert_eq!(last_z, 10.0);

        for frame in 2..=6 {
            step_frame(&mut scene, &mut world, frame).unwrap();
            let body = scene.body(key).unwrap();
            assert!(!body.is_kinematic(), "free fall must stay dynamic");
            let z = body.position.z;
            assert!(z < last_z, "frame {}: z {} did not descend from {}", frame, z, last_z);
            last_z = z;
        }
        // scenario has no constraints, so nothing got disabled
        assert!(scene.objects.iter().all(|o| o.constraint.is_none()));
    }

    #[test]
    fn skipped_frames_do_not_fast_forward() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);

        step_frame(&mut scene, &mut world, 1).unwrap();
        step_frame(&mut scene, &mut world, 2).unwrap();
        let z_after_two = scene.body(BodyKey::object(faller)).unwrap().position.z;

        step_frame(&mut scene, &mut world, 5).unwrap();
        assert_eq!(world.last_time, 2, "no fast-forward past a cache miss");
        assert_eq!(
            scene.body(BodyKey::object(faller)).unwrap().position.z,
            z_after_two
        );
    }

    #[test]
    fn cached_frames_replay_without_stepping() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);
        let key = BodyKey::object(faller);

        for frame in 1..=4 {
            step_frame(&mut scene, &mut world, frame).unwrap();
        }
        let z3 = world.cache.read(3).unwrap().poses[1].position.z;

        // rewind to start, then jump straight to the recorded frame
        step_frame(&mut scene, &mut world, 1).unwrap();
        assert_eq!(world.last_time, 1);
        step_frame(&mut scene, &mut world, 3).unwrap();
        assert_eq!(world.last_time, 3);
        assert!((scene.body(key).unwrap().position.z - z3).abs() < 1e-6);
    }

    #[test]
    fn rewind_to_start_restores_rest_state() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);
        let key = BodyKey::object(faller);

        for frame in 1..=5 {
            step_frame(&mut scene, &mut world, frame).unwrap();
        }
        assert!(scene.body(key).unwrap().position.z < 10.0);

        step_frame(&mut scene, &mut world, 1).unwrap();
        assert_eq!(scene.body(key).unwrap().position.z, 10.0);
        assert_eq!(world.last_time, 1);
    }

    #[test]
    fn grabbed_object_stays_pinned_while_stepping() {
        let (mut scene, ground, faller) = falling_scene();
        scene.objects[faller.0 as usize].selected = true;
        scene.objects[faller.0 as usize].grabbed = true;
        let mut world = world_with(&scene, &[ground, faller]);
        let key = BodyKey::object(faller);

        for frame in 1..=3 {
            step_frame(&mut scene, &mut world, frame).unwrap();
        }
        assert_eq!(scene.body(key).unwrap().position.z, 10.0);

        // the pin is undone after each step so dynamics resume on release
        let handle = scene.body(key).unwrap().handle.unwrap();
        let mock = world
            .backend()
            .as_any()
            .downcast_ref::<MockBackend>()
            .expect("tests run against the mock");
        let body = mock.body(handle).unwrap();
        assert_eq!(body.position.z, 10.0);
        assert!(!body.kinematic);
        assert_eq!(body.mass, 1.0);
    }

    #[test]
    fn baked_cache_is_never_stepped_past() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);

        step_frame(&mut scene, &mut world, 1).unwrap();
        world.cache.flags.insert(CacheFlags::BAKED);

        step_frame(&mut scene, &mut world, 2).unwrap();
        assert_eq!(world.last_time, 1, "baked cache without frame 2 must not simulate");
    }

    #[test]
    fn muted_world_does_nothing() {
        let (mut scene, ground, faller) = falling_scene();
        let mut world = world_with(&scene, &[ground, faller]);
        world.muted = true;
        step_frame(&mut scene, &mut world, 1).unwrap();
        assert!(world.handle.is_none());
    }
}
