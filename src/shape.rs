//! Collision shape validation.
//!
//! Ensures a body's engine shape handle exists and matches its shape setting
//! and current geometry. Shape dimensions are derived from the mesh's
//! axis-aligned bounds; hull and trimesh shapes take the vertex data
//! directly.

use glam::Vec3;
use log::warn;

use crate::backend::{PhysicsBackend, ShapeDesc};
use crate::body::{BodyFlags, CollisionShape, RigidBody};
use crate::scene::Mesh;

/// Margin embedded into convex hulls built from solid geometry.
pub const HULL_AUTO_MARGIN: f32 = 0.04;

/// Ensure `body.shape_handle` is valid for the body's shape setting and
/// `mesh`. No-op when a handle exists and `rebuild` is false.
///
/// Construction failure (degenerate hull or trimesh geometry) falls back to
/// a box around the same bounds and retries once; box construction cannot
/// fail, so the retry always terminates.
pub fn validate_shape(
    backend: &mut dyn PhysicsBackend,
    body: &mut RigidBody,
    mesh: &Mesh,
    rebuild: bool,
) {
    if body.shape_handle.is_some() && !rebuild {
        return;
    }

    let mut handle = build_shape(backend, body, mesh);
    if handle.is_none() {
        warn!(
            "shape construction failed for {:?}, falling back to box",
            body.shape
        );
        body.shape = CollisionShape::Box;
        handle = build_shape(backend, body, mesh);
    }

    if let Some(new_handle) = handle {
        if let Some(old) = body.shape_handle.take() {
            backend.shape_delete(old);
        }
        backend.shape_set_margin(new_handle, body.effective_margin());
        body.shape_handle = Some(new_handle);
    }
}

fn build_shape(
    backend: &mut dyn PhysicsBackend,
    body: &RigidBody,
    mesh: &Mesh,
) -> Option<crate::backend::ShapeHandle> {
    let (_, half) = mesh.bounds();
    let radius = half.x.max(half.y);

    match body.shape {
        CollisionShape::Box => backend.shape_new(ShapeDesc::Box { half_extents: half }),
        CollisionShape::Sphere => backend.shape_new(ShapeDesc::Sphere {
            radius: half.max_element(),
        }),
        CollisionShape::Capsule => backend.shape_new(ShapeDesc::Capsule {
            radius,
            height: ((half.z - radius) * 2.0).max(0.0),
        }),
        CollisionShape::Cylinder => backend.shape_new(ShapeDesc::Cylinder {
            radius,
            half_height: half.z,
        }),
        CollisionShape::Cone => backend.shape_new(ShapeDesc::Cone {
            radius,
            height: half.z * 2.0,
        }),
        CollisionShape::ConvexHull => backend.shape_new(ShapeDesc::ConvexHull {
            vertices: &mesh.vertices,
            margin: hull_margin(body, half),
        }),
        CollisionShape::TriMesh => backend.shape_new(ShapeDesc::TriMesh {
            vertices: &mesh.vertices,
            triangles: &mesh.triangles,
        }),
    }
}

/// Hulls around solid geometry get the margin embedded automatically unless
/// the user pinned an explicit margin; flat geometry keeps the exact
/// silhouette.
fn hull_margin(body: &RigidBody, half: Vec3) -> f32 {
    let has_volume = half.x > 0.0 && half.y > 0.0 && half.z > 0.0;
    if has_volume && !body.flags.contains(BodyFlags::USE_MARGIN) {
        HULL_AUTO_MARGIN
    } else {
        body.margin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::body::BodyType;

    fn cube_mesh() -> Mesh {
        let v = |x: f32, y: f32, z: f32| Vec3::new(x, y, z);
        Mesh {
            vertices: vec![
                v(-1.0, -1.0, -1.0),
                v(1.0, -1.0, -1.0),
                v(1.0, 1.0, -1.0),
                v(-1.0, 1.0, -1.0),
                v(-1.0, -1.0, 1.0),
                v(1.0, -1.0, 1.0),
                v(1.0, 1.0, 1.0),
                v(-1.0, 1.0, 1.0),
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3], [4, 5, 6], [4, 6, 7]],
        }
    }

    #[test]
    fn existing_handle_is_kept_without_rebuild() {
        let mut backend = MockBackend::new();
        let mut body = RigidBody::new(BodyType::Active);
        let mesh = cube_mesh();

        validate_shape(&mut backend, &mut body, &mesh, false);
        let first = body.shape_handle.expect("shape built");

        validate_shape(&mut backend, &mut body, &mesh, false);
        assert_eq!(body.shape_handle, Some(first));
        assert_eq!(backend.shape_count(), 1);

        validate_shape(&mut backend, &mut body, &mesh, true);
        assert_ne!(body.shape_handle, Some(first));
        assert_eq!(backend.shape_count(), 1, "old shape must be deleted");
    }

    #[test]
    fn degenerate_hull_falls_back_to_box() {
        let mut backend = MockBackend::new();
        let mut body = RigidBody::new(BodyType::Active);
        assert_eq!(body.shape, CollisionShape::ConvexHull);

        // two vertices cannot form a hull
        let mesh = Mesh {
            vertices: vec![Vec3::ZERO, Vec3::ONE],
            triangles: vec![],
        };
        validate_shape(&mut backend, &mut body, &mesh, false);
        assert_eq!(body.shape, CollisionShape::Box);
        assert!(body.shape_handle.is_some());
    }

    #[test]
    fn solid_hull_embeds_auto_margin() {
        let body = RigidBody::new(BodyType::Active);
        assert_eq!(hull_margin(&body, Vec3::ONE), HULL_AUTO_MARGIN);

        // flat geometry keeps the user margin
        assert_eq!(
            hull_margin(&body, Vec3::new(1.0, 1.0, 0.0)),
            body.margin
        );

        let mut pinned = RigidBody::new(BodyType::Active);
        pinned.flags |= BodyFlags::USE_MARGIN;
        pinned.margin = 0.1;
        assert_eq!(hull_margin(&pinned, Vec3::ONE), 0.1);
    }
}
