//! Body and constraint validation.
//!
//! Reconciles dirty flags with engine state: stale engine handles are torn
//! down and rebuilt, live ones are reused, and settings are reapplied
//! whenever a handle is (re)created. Missing prerequisites (no world, no
//! body settings, endpoint not yet simulated) are expected mid-build and
//! no-op. A dirty flag is only ever cleared after the matching rebuild
//! actually ran.

use glam::{Quat, Vec3};
use log::debug;

use crate::backend::BodyHandle;
use crate::body::{BodyFlags, BodyType};
use crate::constraint::{dist_angle, ConstraintFlags, ConstraintKey, ConstraintType, Limit};
use crate::error::SimResult;
use crate::filter::PendingAction;
use crate::scene::{BodyKey, IslandId, Mesh, Scene};
use crate::shape::validate_shape;
use crate::world::RigidBodyWorld;

/// Geometry a body's collision shape is built from, in body-local space.
///
/// Whole objects use their mesh as-is; islands recenter their rest-pose
/// vertices around the island centroid.
fn local_mesh(scene: &Scene, key: BodyKey) -> Option<Mesh> {
    let obj = scene.objects.get(key.object.0 as usize)?;
    match key.island {
        None => Some(obj.mesh.clone()),
        Some(IslandId(i)) => {
            let island = obj.fracture.as_ref()?.islands.get(i as usize)?;
            Some(Mesh {
                vertices: island
                    .rest_positions
                    .iter()
                    .map(|v| *v - island.centroid)
                    .collect(),
                triangles: island.triangles.clone(),
            })
        }
    }
}

/// Ensure the engine body behind `key` matches its settings block.
///
/// `rebuild` forces a fresh engine body; without it an existing handle is
/// reused and only re-inserted into the world. A body flagged
/// `KINEMATIC_REBUILD` keeps its handle but gets mass and kinematic state
/// reapplied in place.
pub fn validate_body(
    scene: &mut Scene,
    world: &mut RigidBodyWorld,
    key: BodyKey,
    rebuild: bool,
) -> SimResult<()> {
    let Some(world_handle) = world.handle else {
        return Ok(());
    };
    let Some(body_ref) = scene.body(key) else {
        return Ok(());
    };

    let needs_shape = body_ref.shape_handle.is_none()
        || rebuild
        || body_ref.flags.contains(BodyFlags::NEEDS_RESHAPE);
    let mesh = if needs_shape { local_mesh(scene, key) } else { None };

    let (lock_location, lock_rotation) = {
        let obj = scene.object(key.object)?;
        (obj.lock_location, obj.lock_rotation)
    };

    let ground_weight = key.island.and_then(|IslandId(i)| {
        let obj = scene.objects.get(key.object.0 as usize)?;
        let island = obj.fracture.as_ref()?.islands.get(i as usize)?;
        Some(island.ground_weight)
    });

    let backend = world.backend_mut();
    let Some(body) = scene.body_mut(key) else {
        return Ok(());
    };

    // islands resting on the ground plane simulate as passive supports
    if ground_weight.map_or(false, |w| w > 0.5) {
        body.body_type = BodyType::Passive;
    }

    if let Some(mesh) = &mesh {
        validate_shape(backend, body, mesh, true);
        body.flags.remove(BodyFlags::NEEDS_RESHAPE);
    }
    let Some(shape_handle) = body.shape_handle else {
        return Ok(());
    };

    let kinematic_rebuild = body.flags.contains(BodyFlags::KINEMATIC_REBUILD);

    if let Some(handle) = body.handle {
        if !rebuild || kinematic_rebuild {
            backend.world_remove_body(world_handle, handle);
        }
    }

    if body.handle.is_none() || rebuild {
        if !kinematic_rebuild || body.handle.is_none() {
            if let Some(old) = body.handle.take() {
                backend.world_remove_body(world_handle, old);
                backend.body_delete(old);
            }
            debug!("creating engine body for {:?}", key);
            body.handle = Some(backend.body_new(shape_handle, body.position, body.orientation));
        }

        if let Some(handle) = body.handle {
            backend.body_set_friction(handle, body.friction);
            backend.body_set_restitution(handle, body.restitution);
            backend.body_set_damping(handle, body.lin_damping, body.ang_damping);
            backend.body_set_sleep_thresh(handle, body.lin_sleep_thresh, body.ang_sleep_thresh);
            backend
                .body_set_activation_state(handle, body.flags.contains(BodyFlags::USE_DEACTIVATION));
            // passive bodies never wake on their own; they start asleep like
            // explicitly start-deactivated ones
            if body.body_type == BodyType::Passive
                || body.flags.contains(BodyFlags::START_DEACTIVATED)
            {
                backend.body_deactivate(handle);
            }
            backend.body_set_linear_factor(handle, lock_factor(lock_location));
            backend.body_set_angular_factor(handle, lock_factor(lock_rotation));
            backend.body_set_collision_shape(handle, shape_handle);
            backend.body_set_mass(handle, body.effective_mass());
            backend.body_set_kinematic_state(
                handle,
                body.is_kinematic() || body.flags.contains(BodyFlags::DISABLED),
            );
        }
    }

    if let Some(handle) = body.handle {
        backend.world_add_body(world_handle, handle, body.col_groups, key);
    }
    body.flags
        .remove(BodyFlags::NEEDS_VALIDATE | BodyFlags::KINEMATIC_REBUILD);
    Ok(())
}

/// Per-axis motion factor from the object's lock flags.
fn lock_factor(locks: [bool; 3]) -> Vec3 {
    Vec3::new(
        if locks[0] { 0.0 } else { 1.0 },
        if locks[1] { 0.0 } else { 1.0 },
        if locks[2] { 0.0 } else { 1.0 },
    )
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    handle: Option<BodyHandle>,
    position: Vec3,
    orientation: Quat,
}

fn endpoint(scene: &Scene, key: BodyKey) -> Option<Endpoint> {
    scene.body(key).map(|b| Endpoint {
        handle: b.handle,
        position: b.position,
        orientation: b.orientation,
    })
}

/// Ensure the engine constraint behind `key` matches its settings block.
///
/// A constraint whose endpoints are not both simulated yet is not an error:
/// any engine handle is torn down and the constraint is left inert until a
/// later pass finds both endpoint bodies alive.
pub fn validate_constraint(
    scene: &mut Scene,
    world: &mut RigidBodyWorld,
    key: ConstraintKey,
    rebuild: bool,
) -> SimResult<()> {
    let Some(world_handle) = world.handle else {
        return Ok(());
    };
    let Some(mut con) = scene.constraint(key).cloned() else {
        return Ok(());
    };

    let live = match (endpoint(scene, con.body1), endpoint(scene, con.body2)) {
        (Some(e1), Some(e2)) => e1.handle.zip(e2.handle).map(|(h1, h2)| (e1, e2, h1, h2)),
        _ => None,
    };

    let rebuild_comp_con = world.rebuild_comp_con;
    let backend = world.backend_mut();

    let Some((e1, e2, h1, h2)) = live else {
        if let Some(handle) = con.handle.take() {
            debug!("tearing down constraint {:?}, endpoint body missing", key);
            backend.world_remove_constraint(world_handle, handle);
            backend.constraint_delete(handle);
        }
        con.flags
            .remove(ConstraintFlags::NEEDS_VALIDATE | ConstraintFlags::USE_KINEMATIC_DEACTIVATION);
        if let Some(slot) = scene.constraint_mut(key) {
            *slot = con;
        }
        return Ok(());
    };

    // a from-scratch resimulation starts from an unbroken state
    if rebuild_comp_con && !con.is_enabled() {
        con.flags.insert(ConstraintFlags::ENABLED);
    }

    if let Some(handle) = con.handle {
        if !rebuild {
            backend.world_remove_constraint(world_handle, handle);
        }
    }

    if con.handle.is_none() || rebuild {
        if let Some(old) = con.handle.take() {
            backend.world_remove_constraint(world_handle, old);
            backend.constraint_delete(old);
        }

        let (pivot, orientation) = match key {
            // object-level constraints pivot at the carrying object
            ConstraintKey::Object(id) => {
                let (loc, rot, _) = scene.object(id)?.decompose_transform();
                (loc, rot)
            }
            // shard constraints pivot midway between their endpoints
            ConstraintKey::Shard { .. } => ((e1.position + e2.position) * 0.5, e1.orientation),
        };

        let handle = match con.con_type {
            ConstraintType::Point => backend.constraint_new_point(pivot, h1, h2),
            ConstraintType::Fixed => backend.constraint_new_fixed(pivot, orientation, h1, h2),
            ConstraintType::Hinge => backend.constraint_new_hinge(pivot, orientation, h1, h2),
            ConstraintType::Slider => backend.constraint_new_slider(pivot, orientation, h1, h2),
            ConstraintType::Piston => backend.constraint_new_piston(pivot, orientation, h1, h2),
            ConstraintType::SixDof => backend.constraint_new_6dof(pivot, orientation, h1, h2),
            ConstraintType::SixDofSpring => {
                backend.constraint_new_6dof_spring(pivot, orientation, h1, h2)
            }
            ConstraintType::Motor => backend.constraint_new_motor(pivot, orientation, h1, h2),
        };

        apply_type_settings(backend, handle, &con);

        let threshold = if con.flags.contains(ConstraintFlags::USE_BREAKING) {
            con.breaking_threshold
        } else {
            f32::MAX
        };
        backend.constraint_set_breaking_threshold(handle, threshold);

        let iterations = if con
            .flags
            .contains(ConstraintFlags::OVERRIDE_SOLVER_ITERATIONS)
        {
            con.num_solver_iterations
        } else {
            -1
        };
        backend.constraint_set_solver_iterations(handle, iterations);
        backend.constraint_set_enabled(handle, con.is_enabled());

        let (start_dist, start_angle) =
            dist_angle(e1.position, e1.orientation, e2.position, e2.orientation);
        con.start_dist = start_dist;
        con.start_angle = start_angle;
        con.handle = Some(handle);
    }

    if let Some(handle) = con.handle {
        backend.world_add_constraint(
            world_handle,
            handle,
            con.flags.contains(ConstraintFlags::DISABLE_COLLISIONS),
        );
    }
    con.flags
        .remove(ConstraintFlags::NEEDS_VALIDATE | ConstraintFlags::USE_KINEMATIC_DEACTIVATION);
    if let Some(slot) = scene.constraint_mut(key) {
        *slot = con;
    }
    Ok(())
}

fn apply_type_settings(
    backend: &mut dyn crate::backend::PhysicsBackend,
    handle: crate::backend::ConstraintHandle,
    con: &crate::constraint::RigidBodyConstraint,
) {
    use crate::backend::DofAxis;

    match con.con_type {
        ConstraintType::Point | ConstraintType::Fixed => {}
        ConstraintType::Hinge => {
            let l = con.effective_limit(ConstraintFlags::USE_LIMIT_ANG_Z, con.limit_ang_z);
            backend.constraint_set_limits_hinge(handle, l.lower, l.upper);
        }
        ConstraintType::Slider => {
            let l = con.effective_limit(ConstraintFlags::USE_LIMIT_LIN_X, con.limit_lin_x);
            backend.constraint_set_limits_slider(handle, l.lower, l.upper);
        }
        ConstraintType::Piston => {
            let lin = con.effective_limit(ConstraintFlags::USE_LIMIT_LIN_X, con.limit_lin_x);
            let ang = con.effective_limit(ConstraintFlags::USE_LIMIT_ANG_X, con.limit_ang_x);
            backend.constraint_set_limits_piston(handle, lin.lower, lin.upper, ang.lower, ang.upper);
        }
        ConstraintType::SixDof | ConstraintType::SixDofSpring => {
            // spring setup first; limit setting below is shared with plain 6DOF
            if con.con_type == ConstraintType::SixDofSpring {
                let springs = [
                    (DofAxis::LinX, ConstraintFlags::USE_SPRING_X, 0),
                    (DofAxis::LinY, ConstraintFlags::USE_SPRING_Y, 1),
                    (DofAxis::LinZ, ConstraintFlags::USE_SPRING_Z, 2),
                ];
                for (axis, flag, i) in springs {
                    backend.constraint_set_spring(handle, axis, con.flags.contains(flag));
                    backend.constraint_set_spring_stiffness(handle, axis, con.spring_stiffness[i]);
                    backend.constraint_set_spring_damping(handle, axis, con.spring_damping[i]);
                }
                backend.constraint_set_equilibrium(handle);
            }

            let axes: [(DofAxis, ConstraintFlags, Limit); 6] = [
                (DofAxis::LinX, ConstraintFlags::USE_LIMIT_LIN_X, con.limit_lin_x),
                (DofAxis::LinY, ConstraintFlags::USE_LIMIT_LIN_Y, con.limit_lin_y),
                (DofAxis::LinZ, ConstraintFlags::USE_LIMIT_LIN_Z, con.limit_lin_z),
                (DofAxis::AngX, ConstraintFlags::USE_LIMIT_ANG_X, con.limit_ang_x),
                (DofAxis::AngY, ConstraintFlags::USE_LIMIT_ANG_Y, con.limit_ang_y),
                (DofAxis::AngZ, ConstraintFlags::USE_LIMIT_ANG_Z, con.limit_ang_z),
            ];
            for (axis, flag, limit) in axes {
                let l = con.effective_limit(flag, limit);
                backend.constraint_set_limits_6dof(handle, axis, l.lower, l.upper);
            }
        }
        ConstraintType::Motor => {
            backend.constraint_set_motor_enabled(
                handle,
                con.flags.contains(ConstraintFlags::USE_MOTOR_LIN),
                con.flags.contains(ConstraintFlags::USE_MOTOR_ANG),
            );
            backend.constraint_set_motor_max_impulse(
                handle,
                con.motor_lin_max_impulse,
                con.motor_ang_max_impulse,
            );
            backend.constraint_set_motor_target_velocity(
                handle,
                con.motor_lin_target_velocity,
                con.motor_ang_target_velocity,
            );
        }
    }
}

/// Drain the collision filter's deferred actions. Runs exactly once per
/// validation pass, before bodies are validated, so the flags set here are
/// honored in the same pass.
pub fn apply_pending_actions(scene: &mut Scene, world: &mut RigidBodyWorld) -> SimResult<()> {
    let actions = std::mem::take(&mut world.pending_actions);
    let world_handle = world.handle;

    for action in actions {
        let PendingAction::WakeKinematicObject(id) = action;
        let Ok(obj) = scene.object_mut(id) else {
            continue;
        };
        let Some(fracture) = obj.fracture.as_mut() else {
            // unfractured objects flip their single body
            if let Some(body) = obj.body.as_mut() {
                if body.is_kinematic() {
                    debug!("waking kinematic object {:?}", id);
                    body.flags.remove(BodyFlags::KINEMATIC);
                    body.flags
                        .insert(BodyFlags::KINEMATIC_REBUILD | BodyFlags::NEEDS_VALIDATE);
                }
            }
            continue;
        };

        debug!("waking kinematic object {:?}", id);
        for island in &mut fracture.islands {
            if island.body.is_kinematic() {
                island.body.flags.remove(BodyFlags::KINEMATIC);
                island
                    .body
                    .flags
                    .insert(BodyFlags::KINEMATIC_REBUILD | BodyFlags::NEEDS_VALIDATE);
            }
        }
        for con in &mut fracture.constraints {
            con.flags.insert(
                ConstraintFlags::NEEDS_VALIDATE | ConstraintFlags::USE_KINEMATIC_DEACTIVATION,
            );
            if let (Some(handle), Some(wh)) = (con.handle, world_handle) {
                world.backend_mut().world_remove_constraint(wh, handle);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::body::{BodyType, RigidBody};
    use crate::constraint::RigidBodyConstraint;
    use crate::scene::{FractureState, Island, ObjectId, SceneObject};

    fn test_world(scene: &Scene) -> RigidBodyWorld {
        let mut world = RigidBodyWorld::new(Box::new(MockBackend::new()), 1, 250);
        world.validate_world(scene, false);
        world
    }

    fn mock(world: &RigidBodyWorld) -> &MockBackend {
        world
            .backend()
            .as_any()
            .downcast_ref::<MockBackend>()
            .expect("tests run against the mock")
    }

    fn box_object(name: &str, body_type: BodyType) -> SceneObject {
        let mut obj = SceneObject::new(
            name,
            Mesh {
                vertices: vec![Vec3::splat(-1.0), Vec3::splat(1.0)],
                triangles: vec![],
            },
        );
        let mut body = RigidBody::new(body_type);
        body.shape = crate::body::CollisionShape::Box;
        obj.body = Some(body);
        obj
    }

    #[test]
    fn validation_clears_flags_and_creates_handles() {
        let mut scene = Scene::new();
        let id = scene.add_object(box_object("a", BodyType::Active));
        let mut world = test_world(&scene);

        let key = BodyKey::object(id);
        validate_body(&mut scene, &mut world, key, true).unwrap();

        let body = scene.body(key).unwrap();
        assert!(!body.flags.contains(BodyFlags::NEEDS_VALIDATE));
        assert!(!body.flags.contains(BodyFlags::NEEDS_RESHAPE));
        assert!(body.handle.is_some());
        assert!(body.shape_handle.is_some());
    }

    #[test]
    fn validation_is_idempotent_without_rebuild() {
        let mut scene = Scene::new();
        let id = scene.add_object(box_object("a", BodyType::Active));
        let mut world = test_world(&scene);
        let key = BodyKey::object(id);

        validate_body(&mut scene, &mut world, key, true).unwrap();
        let (h, sh) = {
            let body = scene.body(key).unwrap();
            (body.handle, body.shape_handle)
        };

        validate_body(&mut scene, &mut world, key, false).unwrap();
        let body = scene.body(key).unwrap();
        assert_eq!(body.handle, h);
        assert_eq!(body.shape_handle, sh);
    }

    #[test]
    fn constraint_requires_both_endpoint_bodies() {
        let mut scene = Scene::new();
        let a = scene.add_object(box_object("a", BodyType::Active));
        let b = scene.add_object(box_object("b", BodyType::Active));
        let mut empty = SceneObject::new("con", Mesh::default());
        empty.constraint = Some(RigidBodyConstraint::new(
            ConstraintType::Fixed,
            BodyKey::object(a),
            BodyKey::object(b),
        ));
        let holder = scene.add_object(empty);
        let ckey = ConstraintKey::Object(holder);

        let mut world = test_world(&scene);

        // neither endpoint simulated yet: constraint stays inert
        validate_constraint(&mut scene, &mut world, ckey, true).unwrap();
        assert!(scene.constraint(ckey).unwrap().handle.is_none());

        validate_body(&mut scene, &mut world, BodyKey::object(a), true).unwrap();
        validate_constraint(&mut scene, &mut world, ckey, true).unwrap();
        assert!(scene.constraint(ckey).unwrap().handle.is_none());

        validate_body(&mut scene, &mut world, BodyKey::object(b), true).unwrap();
        validate_constraint(&mut scene, &mut world, ckey, true).unwrap();
        assert!(scene.constraint(ckey).unwrap().handle.is_some());

        // removing an endpoint body tears the constraint down on the next pass
        {
            let body = scene.body_mut(BodyKey::object(a)).unwrap();
            let handle = body.handle.take().unwrap();
            let wh = world.handle.unwrap();
            world.backend_mut().world_remove_body(wh, handle);
            world.backend_mut().body_delete(handle);
        }
        assert!(scene.constraint(ckey).unwrap().handle.is_some());
        validate_constraint(&mut scene, &mut world, ckey, false).unwrap();
        assert!(scene.constraint(ckey).unwrap().handle.is_none());
    }

    #[test]
    fn rebuild_comp_con_reenables_broken_constraints() {
        let mut scene = Scene::new();
        let a = scene.add_object(box_object("a", BodyType::Active));
        let b = scene.add_object(box_object("b", BodyType::Active));
        let mut holder = SceneObject::new("con", Mesh::default());
        let mut con = RigidBodyConstraint::new_shard(
            ConstraintType::Fixed,
            BodyKey::object(a),
            BodyKey::object(b),
        );
        con.flags.remove(ConstraintFlags::ENABLED); // broken in a previous run
        holder.constraint = Some(con);
        let holder = scene.add_object(holder);
        let ckey = ConstraintKey::Object(holder);

        let mut world = test_world(&scene);
        validate_body(&mut scene, &mut world, BodyKey::object(a), true).unwrap();
        validate_body(&mut scene, &mut world, BodyKey::object(b), true).unwrap();

        world.rebuild_comp_con = true;
        validate_constraint(&mut scene, &mut world, ckey, true).unwrap();
        assert!(scene.constraint(ckey).unwrap().is_enabled());
    }

    #[test]
    fn passive_and_start_deactivated_bodies_build_asleep() {
        let mut scene = Scene::new();
        let active = scene.add_object(box_object("active", BodyType::Active));
        let passive = scene.add_object(box_object("passive", BodyType::Passive));
        let mut sleeper = box_object("sleeper", BodyType::Active);
        sleeper.body.as_mut().unwrap().flags |= BodyFlags::START_DEACTIVATED;
        let sleeper = scene.add_object(sleeper);

        let mut world = test_world(&scene);
        for id in [active, passive, sleeper] {
            validate_body(&mut scene, &mut world, BodyKey::object(id), true).unwrap();
        }

        let handle_of = |scene: &Scene, id| scene.body(BodyKey::object(id)).unwrap().handle.unwrap();
        assert!(mock(&world).body(handle_of(&scene, active)).unwrap().active);
        assert!(!mock(&world).body(handle_of(&scene, passive)).unwrap().active);
        assert!(!mock(&world).body(handle_of(&scene, sleeper)).unwrap().active);
    }

    #[test]
    fn grounded_islands_are_promoted_to_passive() {
        let mut scene = Scene::new();
        let mut obj = SceneObject::new("wall", Mesh::default());
        let mut base = Island::new(Vec3::ZERO, vec![Vec3::splat(-0.5), Vec3::splat(0.5)]);
        base.ground_weight = 0.8;
        base.body.shape = crate::body::CollisionShape::Box;
        let mut upper = Island::new(Vec3::ONE, vec![Vec3::splat(0.5), Vec3::splat(1.5)]);
        upper.body.shape = crate::body::CollisionShape::Box;
        obj.fracture = Some(FractureState::new(vec![base, upper]));
        let id = scene.add_object(obj);

        let mut world = test_world(&scene);
        let base_key = BodyKey::island(id, IslandId(0));
        let upper_key = BodyKey::island(id, IslandId(1));
        validate_body(&mut scene, &mut world, base_key, true).unwrap();
        validate_body(&mut scene, &mut world, upper_key, true).unwrap();

        let base_body = scene.body(base_key).unwrap();
        assert_eq!(base_body.body_type, BodyType::Passive);
        assert_eq!(mock(&world).body(base_body.handle.unwrap()).unwrap().mass, 0.0);

        let upper_body = scene.body(upper_key).unwrap();
        assert_eq!(upper_body.body_type, BodyType::Active);
        assert_eq!(mock(&world).body(upper_body.handle.unwrap()).unwrap().mass, 1.0);
    }

    #[test]
    fn pending_wake_flips_plain_kinematic_body() {
        let mut scene = Scene::new();
        let mut obj = box_object("door", BodyType::Active);
        obj.body.as_mut().unwrap().flags |=
            BodyFlags::KINEMATIC | BodyFlags::USE_KINEMATIC_DEACTIVATION;
        let id = scene.add_object(obj);

        let mut world = test_world(&scene);
        world
            .pending_actions
            .push(PendingAction::WakeKinematicObject(id));
        apply_pending_actions(&mut scene, &mut world).unwrap();

        let body = scene.body(BodyKey::object(id)).unwrap();
        assert!(!body.flags.contains(BodyFlags::KINEMATIC));
        assert!(body.flags.contains(BodyFlags::KINEMATIC_REBUILD));
        assert!(body.flags.contains(BodyFlags::NEEDS_VALIDATE));
    }

    #[test]
    fn pending_wake_flips_kinematic_islands() {
        let mut scene = Scene::new();
        let mut obj = SceneObject::new("wall", Mesh::default());
        let mut island = Island::new(Vec3::ZERO, vec![Vec3::splat(-0.5), Vec3::splat(0.5)]);
        island.body.flags |= BodyFlags::KINEMATIC | BodyFlags::USE_KINEMATIC_DEACTIVATION;
        obj.fracture = Some(FractureState::new(vec![island]));
        let id = scene.add_object(obj);

        let mut world = test_world(&scene);
        world
            .pending_actions
            .push(PendingAction::WakeKinematicObject(id));
        apply_pending_actions(&mut scene, &mut world).unwrap();

        let body = &scene.objects[0].fracture.as_ref().unwrap().islands[0].body;
        assert!(!body.flags.contains(BodyFlags::KINEMATIC));
        assert!(body.flags.contains(BodyFlags::KINEMATIC_REBUILD));
        assert!(body.flags.contains(BodyFlags::NEEDS_VALIDATE));
        assert!(world.pending_actions.is_empty());

        // unknown objects in the queue are skipped, not fatal
        world
            .pending_actions
            .push(PendingAction::WakeKinematicObject(ObjectId(99)));
        apply_pending_actions(&mut scene, &mut world).unwrap();
    }
}
