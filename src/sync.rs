//! Two-way transform synchronization.
//!
//! Before a step, authoring transforms drive the engine for kinematic and
//! grabbed bodies, deforming trimeshes push their vertices, and effector
//! forces are applied to free bodies. After a step, simulated poses flow the
//! other way: island vertices are reconstructed from their rest pose and the
//! per-frame location/rotation history grows by exactly one entry per newly
//! reached frame.

use glam::{Mat4, Quat, Vec3};
use log::trace;

use crate::body::{BodyFlags, BodyType, CollisionShape};
use crate::error::SimResult;
use crate::scene::{BodyKey, Island, ObjectId, Scene};
use crate::shape::HULL_AUTO_MARGIN;
use crate::world::RigidBodyWorld;

/// Sentinel marking "no pose data for this frame"; such input no-ops.
pub const INVALID_LOCATION: Vec3 = Vec3::splat(f32::MIN);

fn pose_is_valid(location: Vec3, rotation: Quat) -> bool {
    location.x != f32::MIN && rotation.x != f32::MIN
}

/// Pre-step write-to-engine pass for one body.
///
/// Kinematic bodies, and bodies of a selected object the user is currently
/// grabbing, take their pose from the authoring transform. Everything else
/// keeps its simulated pose and only receives scale changes, deformed
/// trimesh vertices and effector forces.
pub fn update_sim_body(scene: &mut Scene, world: &mut RigidBodyWorld, key: BodyKey) -> SimResult<()> {
    let (loc, rot, scale, grabbed) = {
        let obj = scene.object(key.object)?;
        let (loc, rot, scale) = obj.decompose_transform();
        (loc, rot, scale, obj.selected && obj.grabbed)
    };

    let (handle, shape_handle, kinematic, hull, centroid, deform_verts) = {
        let Some(body) = scene.body(key) else {
            return Ok(());
        };
        let Some(handle) = body.handle else {
            return Ok(());
        };
        let centroid = island_centroid(scene, key);
        let deform = body.flags.contains(BodyFlags::USE_DEFORM)
            && body.shape == CollisionShape::TriMesh;
        let verts = if deform {
            deformed_local_vertices(scene, key, centroid)
        } else {
            None
        };
        let hull = body.shape == CollisionShape::ConvexHull
            && !body.flags.contains(BodyFlags::USE_MARGIN);
        (handle, body.shape_handle, body.is_kinematic(), hull, centroid, verts)
    };

    // effector force at the body's simulated pose, gathered before mutation
    let force = if !kinematic {
        let position = world.backend().body_position(handle);
        let velocity = world.backend().body_linear_velocity(handle);
        scene.effector_force(position, velocity)
    } else {
        Vec3::ZERO
    };

    let backend = world.backend_mut();

    // grabbed bodies are pinned so the user can drag them mid-simulation;
    // the post-step pass puts the authored state back
    if grabbed {
        backend.body_set_kinematic_state(handle, true);
        backend.body_set_mass(handle, 0.0);
    }

    if kinematic || grabbed {
        let position = loc + rot * (centroid * scale);
        backend.body_set_transform(handle, position, rot);
        backend.body_activate(handle);
        if let Some(body) = scene.body_mut(key) {
            body.position = position;
            body.orientation = rot;
        }
    }

    backend.body_set_scale(handle, scale);

    // the embedded hull margin does not scale with the body
    if hull {
        if let Some(shape) = shape_handle {
            backend.shape_set_margin(shape, HULL_AUTO_MARGIN * scale.min_element());
        }
    }

    if let (Some(verts), Some(shape)) = (deform_verts, shape_handle) {
        backend.shape_update_trimesh(shape, &verts);
    }

    if force != Vec3::ZERO {
        trace!("applying effector force {:?} to {:?}", force, key);
        backend.body_apply_central_force(handle, force);
        backend.body_activate(handle);
    }
    Ok(())
}

/// Post-step pass undoing the temporary pinning of grabbed bodies.
///
/// Restores the authored kinematic state and mass so the body simulates
/// normally again once the grab ends. Passive bodies are put back to sleep so
/// they do not hold nearby active bodies awake.
pub fn reset_grabbed_body(scene: &Scene, world: &mut RigidBodyWorld, key: BodyKey) -> SimResult<()> {
    let grabbed = {
        let obj = scene.object(key.object)?;
        obj.selected && obj.grabbed
    };
    if !grabbed {
        return Ok(());
    }
    let Some(body) = scene.body(key) else {
        return Ok(());
    };
    let Some(handle) = body.handle else {
        return Ok(());
    };

    let backend = world.backend_mut();
    backend.body_set_kinematic_state(
        handle,
        body.is_kinematic() || body.flags.contains(BodyFlags::DISABLED),
    );
    backend.body_set_mass(handle, body.effective_mass());
    if body.body_type == BodyType::Passive {
        backend.body_deactivate(handle);
    }
    Ok(())
}

fn island_centroid(scene: &Scene, key: BodyKey) -> Vec3 {
    let Some(island_id) = key.island else {
        return Vec3::ZERO;
    };
    scene
        .objects
        .get(key.object.0 as usize)
        .and_then(|o| o.fracture.as_ref())
        .and_then(|f| f.islands.get(island_id.0 as usize))
        .map(|i| i.centroid)
        .unwrap_or(Vec3::ZERO)
}

fn deformed_local_vertices(scene: &Scene, key: BodyKey, centroid: Vec3) -> Option<Vec<Vec3>> {
    let obj = scene.objects.get(key.object.0 as usize)?;
    match key.island {
        None => Some(obj.mesh.vertices.clone()),
        Some(island_id) => {
            let island = obj.fracture.as_ref()?.islands.get(island_id.0 as usize)?;
            Some(island.positions.iter().map(|v| *v - centroid).collect())
        }
    }
}

/// Post-step write-to-authoring pass for one object at `frame`.
///
/// Body poses must already be pulled from the engine. Fractured objects get
/// their island vertices reconstructed and histories grown; unfractured
/// objects get their transform rebuilt around the simulated pose. Skipped
/// entirely while the fracture system is regenerating shards.
pub fn sync_object_transforms(scene: &mut Scene, object: ObjectId, frame: i32) -> SimResult<()> {
    let obj = scene.object_mut(object)?;
    let transform = obj.transform;

    if let Some(fracture) = obj.fracture.as_mut() {
        if !fracture.is_active() {
            return Ok(());
        }
        let matrix = if fracture.original_matrix == Mat4::ZERO {
            transform
        } else {
            fracture.original_matrix
        };
        let (scale, _, _) = matrix.to_scale_rotation_translation();
        let inverse = matrix.inverse();
        for island in &mut fracture.islands {
            let location = island.body.position;
            let rotation = island.body.orientation;
            update_island_cell(island, frame, location, rotation, scale, &inverse);
        }
        return Ok(());
    }

    if let Some(body) = obj.body.as_ref() {
        if body.is_kinematic() || obj.grabbed {
            return Ok(());
        }
        // the first simulated write-back captures the authoring matrix, so a
        // rewind can put it back
        if obj.original_matrix == Mat4::ZERO {
            obj.original_matrix = obj.transform;
        }
        let (scale, _, _) = obj.transform.to_scale_rotation_translation();
        if pose_is_valid(body.position, body.orientation) {
            obj.transform =
                Mat4::from_scale_rotation_translation(scale, body.orientation, body.position);
        }
    }
    Ok(())
}

/// Apply one simulated frame to an island: grow the pose history by exactly
/// one entry when `frame` is newly reached, and rebuild display vertices
/// from the rest pose. Sentinel poses no-op.
pub fn update_island_cell(
    island: &mut Island,
    frame: i32,
    location: Vec3,
    rotation: Quat,
    scale: Vec3,
    object_inverse: &Mat4,
) {
    if !pose_is_valid(location, rotation) {
        return;
    }

    let rel = frame - island.start_frame;
    if rel >= 0 && rel as usize == island.frame_count() {
        island.locations.push(location);
        island.rotations.push(rotation);
    }

    for (display, rest) in island.positions.iter_mut().zip(&island.rest_positions) {
        let world = rotation * ((*rest - island.centroid) * scale) + location;
        *display = object_inverse.transform_point3(world);
    }
}

/// Rewind an object's simulated state back to its rest pose, at simulation
/// start or after a cache reset.
pub fn restore_rest_pose(scene: &mut Scene, object: ObjectId, start_frame: i32) -> SimResult<()> {
    let obj = scene.object_mut(object)?;

    // plain objects had their transform overwritten by the write-back pass;
    // restore the captured authoring matrix before deriving the rest pose
    if obj.fracture.is_none() {
        if obj.original_matrix == Mat4::ZERO {
            obj.original_matrix = obj.transform;
        } else {
            obj.transform = obj.original_matrix;
        }
    }

    let (loc, rot, scale) = obj.decompose_transform();
    let transform = obj.transform;

    if let Some(fracture) = obj.fracture.as_mut() {
        fracture.original_matrix = transform;
        for island in &mut fracture.islands {
            island.positions.clone_from(&island.rest_positions);
            island.locations.clear();
            island.rotations.clear();
            island.start_frame = start_frame;
            island.body.position = loc + rot * (island.centroid * scale);
            island.body.orientation = rot;

            // bodies woken by kinematic deactivation start kinematic again
            if island.body.flags.contains(BodyFlags::USE_KINEMATIC_DEACTIVATION)
                && !island.body.is_kinematic()
            {
                island.body.flags.insert(
                    BodyFlags::KINEMATIC | BodyFlags::KINEMATIC_REBUILD | BodyFlags::NEEDS_VALIDATE,
                );
            }
        }
    } else if let Some(body) = obj.body.as_mut() {
        body.position = loc;
        body.orientation = rot;
    }
    Ok(())
}
