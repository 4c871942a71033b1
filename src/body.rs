//! Rigid body settings block.
//!
//! One `RigidBody` exists per simulated body: a whole object, or one fracture
//! island. It carries the authoring-time physical properties plus the opaque
//! engine handles owned on the body's behalf. The dirty-state flags drive the
//! incremental validation pass: no flag is ever cleared without the matching
//! rebuild having executed.

use bitflags::bitflags;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::backend::{BodyHandle, ShapeHandle};
use crate::scene::Mesh;

/// Collision shape approximation for a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollisionShape {
    Box,
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    ConvexHull,
    TriMesh,
}

/// Active bodies are simulated; passive bodies only push back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    Active,
    Passive,
}

bitflags! {
    /// Mutable per-body state driving the validation pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct BodyFlags: u32 {
        /// Body is driven by the authoring transform, not by dynamics
        const KINEMATIC = 1 << 0;
        /// Settings changed; engine body must be revalidated
        const NEEDS_VALIDATE = 1 << 1;
        /// Geometry or shape type changed; collision shape must be rebuilt
        const NEEDS_RESHAPE = 1 << 2;
        /// Kinematic state flipped; engine body must be rebuilt in place
        const KINEMATIC_REBUILD = 1 << 3;
        /// Let the engine put this body to sleep
        const USE_DEACTIVATION = 1 << 4;
        /// Start the simulation with this body asleep
        const START_DEACTIVATED = 1 << 5;
        /// Excluded from dynamics (still occupies its slot)
        const DISABLED = 1 << 6;
        /// User overrode the collision margin; never auto-embed
        const USE_MARGIN = 1 << 7;
        /// A touch from another object wakes this body's whole island group
        const USE_KINEMATIC_DEACTIVATION = 1 << 8;
        /// Trimesh shape follows mesh deformation every frame
        const USE_DEFORM = 1 << 9;
    }
}

/// Rigid body settings plus owned engine handles.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub body_type: BodyType,
    pub shape: CollisionShape,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub margin: f32,
    pub lin_damping: f32,
    pub ang_damping: f32,
    pub lin_sleep_thresh: f32,
    pub ang_sleep_thresh: f32,
    /// Collision group bitmask (20 usable bits)
    pub col_groups: u32,
    pub flags: BodyFlags,
    /// Simulation-space position (includes the island centroid offset)
    pub position: Vec3,
    pub orientation: Quat,
    /// Engine body, created and destroyed by the validator
    pub handle: Option<BodyHandle>,
    /// Engine collision shape, created and destroyed by the shape validator
    pub shape_handle: Option<ShapeHandle>,
}

impl RigidBody {
    /// Defaults match the engine's own: friction 0.5, restitution 0, margin
    /// 0.04, sleep thresholds at half the engine default. Active bodies get a
    /// convex hull; dynamic trimeshes are too unstable, so only passive
    /// bodies default to one.
    pub fn new(body_type: BodyType) -> Self {
        let shape = match body_type {
            BodyType::Active => CollisionShape::ConvexHull,
            BodyType::Passive => CollisionShape::TriMesh,
        };
        Self {
            body_type,
            shape,
            mass: 1.0,
            friction: 0.5,
            restitution: 0.0,
            margin: 0.04,
            lin_damping: 0.04,
            ang_damping: 0.1,
            lin_sleep_thresh: 0.4,
            ang_sleep_thresh: 0.5,
            col_groups: 1,
            flags: BodyFlags::NEEDS_VALIDATE,
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            handle: None,
            shape_handle: None,
        }
    }

    /// Mass the engine sees: passive and disabled bodies are static.
    pub fn effective_mass(&self) -> f32 {
        if self.body_type == BodyType::Passive || self.flags.contains(BodyFlags::DISABLED) {
            0.0
        } else {
            self.mass
        }
    }

    /// Margin the engine sees: trimesh shapes ignore the stored margin.
    pub fn effective_margin(&self) -> f32 {
        if self.shape == CollisionShape::TriMesh {
            0.04
        } else {
            self.margin
        }
    }

    pub fn is_kinematic(&self) -> bool {
        self.flags.contains(BodyFlags::KINEMATIC)
    }
}

/// Estimate a mesh's volume for the given shape approximation.
///
/// Quadrics are assumed upright on local z with mass centred on the pivot;
/// mesh-like shapes are treated as their bounding box, degenerating to an
/// area when flat in one axis.
pub fn calc_volume(mesh: &Mesh, shape: CollisionShape) -> f32 {
    let (_, half) = mesh.bounds();
    let size = half * 2.0;

    match shape {
        CollisionShape::Sphere => {
            let radius = size.max_element() * 0.5;
            4.0 / 3.0 * std::f32::consts::PI * radius.powi(3)
        }
        // close enough to a cylinder for mass purposes
        CollisionShape::Capsule | CollisionShape::Cylinder => {
            let radius = size.x.max(size.y) * 0.5;
            std::f32::consts::PI * radius * radius * size.z
        }
        CollisionShape::Cone => {
            let radius = size.x.max(size.y) * 0.5;
            std::f32::consts::PI / 3.0 * radius * radius * size.z
        }
        CollisionShape::Box | CollisionShape::ConvexHull | CollisionShape::TriMesh => {
            if size.x == 0.0 {
                size.y * size.z
            } else if size.y == 0.0 {
                size.x * size.z
            } else if size.z == 0.0 {
                size.x * size.y
            } else {
                size.x * size.y * size.z
            }
        }
    }
}

/// Derive a shard's mass from its share of the whole object's volume.
///
/// Active shards get a small mass floor so the solver never divides by zero.
pub fn calc_shard_mass(
    object_mesh: &Mesh,
    object_mass: f32,
    object_shape: CollisionShape,
    shard_mesh: &Mesh,
    shard: &mut RigidBody,
) {
    let vol_ob = calc_volume(object_mesh, object_shape);
    if vol_ob > 0.0 {
        let vol_mi = calc_volume(shard_mesh, shard.shape);
        shard.mass = (vol_mi / vol_ob) * object_mass;
    }

    if shard.body_type == BodyType::Active && shard.mass == 0.0 {
        shard.mass = 0.001;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn box_mesh(half: Vec3) -> Mesh {
        Mesh {
            vertices: vec![-half, half],
            triangles: vec![],
        }
    }

    #[test]
    fn defaults_differ_by_body_type() {
        let active = RigidBody::new(BodyType::Active);
        let passive = RigidBody::new(BodyType::Passive);
        assert_eq!(active.shape, CollisionShape::ConvexHull);
        assert_eq!(passive.shape, CollisionShape::TriMesh);
        assert!(active.flags.contains(BodyFlags::NEEDS_VALIDATE));
        assert_eq!(passive.effective_mass(), 0.0);
    }

    #[test]
    fn box_volume_degenerates_to_area_for_flat_meshes() {
        let flat = box_mesh(Vec3::new(1.0, 2.0, 0.0));
        assert!((calc_volume(&flat, CollisionShape::Box) - 8.0).abs() < 1e-5);

        let solid = box_mesh(Vec3::new(1.0, 1.0, 1.0));
        assert!((calc_volume(&solid, CollisionShape::Box) - 8.0).abs() < 1e-5);
    }

    #[test]
    fn shard_mass_is_volume_proportional_with_floor() {
        let whole = box_mesh(Vec3::ONE); // volume 8
        let half = box_mesh(Vec3::new(1.0, 1.0, 0.5)); // volume 4
        let mut shard = RigidBody::new(BodyType::Active);
        shard.shape = CollisionShape::Box;
        calc_shard_mass(&whole, 2.0, CollisionShape::Box, &half, &mut shard);
        assert!((shard.mass - 1.0).abs() < 1e-5);

        let empty = Mesh::default(); // unit fallback bounds, but zero object volume path
        let mut tiny = RigidBody::new(BodyType::Active);
        tiny.shape = CollisionShape::Box;
        tiny.mass = 0.0;
        calc_shard_mass(&box_mesh(Vec3::ZERO), 1.0, CollisionShape::Box, &empty, &mut tiny);
        assert_eq!(tiny.mass, 0.001);
    }
}
