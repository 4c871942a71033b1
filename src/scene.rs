//! Host-side scene data consumed by the simulation bridge.
//!
//! The bridge does not own the scene graph. It reads object transforms,
//! meshes and fracture state from here and writes simulated transforms (and
//! shard vertex positions) back. Everything physics-engine-facing lives on
//! the [`RigidBody`](crate::body::RigidBody) and
//! [`RigidBodyConstraint`](crate::constraint::RigidBodyConstraint) settings
//! blocks attached to objects and islands.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::body::{BodyType, RigidBody};
use crate::constraint::{ConstraintKey, RigidBodyConstraint};
use crate::error::{SimError, SimResult};

/// Stable identifier of a scene object (slot in `Scene::objects`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

/// Stable identifier of a fracture island within its owning object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IslandId(pub u32);

/// Addresses one simulated body: a whole object, or one of its islands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyKey {
    pub object: ObjectId,
    pub island: Option<IslandId>,
}

impl BodyKey {
    pub fn object(object: ObjectId) -> Self {
        Self {
            object,
            island: None,
        }
    }

    pub fn island(object: ObjectId, island: IslandId) -> Self {
        Self {
            object,
            island: Some(island),
        }
    }
}

/// Minimal mesh view: enough for shape building and bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mesh {
    pub vertices: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl Mesh {
    /// Axis-aligned center and half extents of the vertex set.
    ///
    /// Empty meshes report unit half extents so downstream shape building
    /// never sees a zero-size box.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, Vec3::ONE);
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for v in &self.vertices {
            min = min.min(*v);
            max = max.max(*v);
        }
        ((min + max) * 0.5, (max - min) * 0.5)
    }
}

/// One rigid fragment of a fractured object.
///
/// Owns its body settings and its geometry subset; references its
/// participating constraints by index into the owning
/// [`FractureState::constraints`] list, never by pointer.
#[derive(Debug, Clone)]
pub struct Island {
    /// Centroid in object space
    pub centroid: Vec3,
    /// Rest-pose vertex positions, object space (never mutated by playback)
    pub rest_positions: Vec<Vec3>,
    /// Triangles over `rest_positions`, used for trimesh shard shapes
    pub triangles: Vec<[u32; 3]>,
    /// Display vertex positions, written back after each simulated frame
    pub positions: Vec<Vec3>,
    /// Weight applied to weighted breaking thresholds (0 disables weighting
    /// for this island's constraints)
    pub thresh_weight: f32,
    /// Islands resting on the ground plane (weight above 0.5) are promoted
    /// to passive bodies by the validator
    pub ground_weight: f32,
    /// Slot in the world's flat index space, assigned by the index-map rebuild
    pub linear_index: usize,
    /// First frame this island was simulated at
    pub start_frame: i32,
    /// Recorded per-frame locations, grown one entry per newly-reached frame
    pub locations: Vec<Vec3>,
    /// Recorded per-frame rotations, parallel to `locations`
    pub rotations: Vec<Quat>,
    /// Indices of constraints (in the owning fracture state) this island
    /// participates in
    pub participating_constraints: Vec<usize>,
    pub body: RigidBody,
}

impl Island {
    pub fn new(centroid: Vec3, rest_positions: Vec<Vec3>) -> Self {
        let positions = rest_positions.clone();
        Self {
            centroid,
            rest_positions,
            triangles: Vec::new(),
            positions,
            thresh_weight: 0.0,
            ground_weight: 0.0,
            linear_index: 0,
            start_frame: 0,
            locations: Vec::new(),
            rotations: Vec::new(),
            participating_constraints: Vec::new(),
            body: RigidBody::new(BodyType::Active),
        }
    }

    /// Number of frames recorded so far.
    pub fn frame_count(&self) -> usize {
        self.locations.len()
    }
}

/// Per-object fracture settings controlling constraint breaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FractureSettings {
    /// Base breaking threshold applied to auto-generated shard constraints
    pub breaking_threshold: f32,
    /// Scale each constraint's threshold by its pair mass relative to the
    /// heaviest constrained pair
    pub use_mass_dependent_thresholds: bool,
    /// Percentage of an island's constraints that, once broken, dooms the
    /// rest (0 disables)
    pub breaking_percentage: i32,
    pub breaking_percentage_weighted: bool,
    /// Relative-rotation deviation (radians) breaking a constraint (0 disables)
    pub breaking_angle: f32,
    pub breaking_angle_weighted: bool,
    /// Relative-distance deviation breaking a constraint (0 disables)
    pub breaking_distance: f32,
    pub breaking_distance_weighted: bool,
    /// Per-constraint solver iteration override (0 = inherit world setting)
    pub solver_iterations_override: i32,
}

impl Default for FractureSettings {
    fn default() -> Self {
        Self {
            breaking_threshold: 10.0,
            use_mass_dependent_thresholds: false,
            breaking_percentage: 0,
            breaking_percentage_weighted: false,
            breaking_angle: 0.0,
            breaking_angle_weighted: false,
            breaking_distance: 0.0,
            breaking_distance_weighted: false,
            solver_iterations_override: 0,
        }
    }
}

/// Fracture-modifier state on an object: the tagged variant the bridge looks
/// up instead of downcasting a modifier list entry.
#[derive(Debug, Clone, Default)]
pub struct FractureState {
    pub islands: Vec<Island>,
    /// Shard constraints. Owned here; islands refer to them by index.
    pub constraints: Vec<RigidBodyConstraint>,
    /// Whether auto-generated constraints participate at all
    pub use_constraints: bool,
    /// Set while the fracture system is regenerating shards; vertex
    /// write-back must be skipped until it clears
    pub refreshing: bool,
    /// Modifier enabled for the current evaluation mode
    pub enabled: bool,
    pub settings: FractureSettings,
    /// Authoring transform preserved across playback so simulated shard
    /// motion never tears the user's object matrix
    pub original_matrix: Mat4,
}

impl FractureState {
    pub fn new(islands: Vec<Island>) -> Self {
        Self {
            islands,
            constraints: Vec::new(),
            use_constraints: true,
            refreshing: false,
            enabled: true,
            settings: FractureSettings::default(),
            original_matrix: Mat4::ZERO,
        }
    }

    /// Active means: enabled and not mid-refresh. Inactive fracture state is
    /// ignored by the bridge and the object simulates as a single body.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.refreshing
    }

    /// Rebuild each island's participating-constraint index list from the
    /// constraint endpoints. Call after adding or removing constraints.
    pub fn relink_participating_constraints(&mut self) {
        for island in &mut self.islands {
            island.participating_constraints.clear();
        }
        for (ci, con) in self.constraints.iter().enumerate() {
            for key in [con.body1, con.body2] {
                if let Some(IslandId(idx)) = key.island {
                    if let Some(island) = self.islands.get_mut(idx as usize) {
                        island.participating_constraints.push(ci);
                    }
                }
            }
        }
    }
}

/// External force field evaluated at a body's position and velocity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Effector {
    /// Constant directional force
    Wind { direction: Vec3, strength: f32 },
    /// Velocity-proportional drag
    Drag { strength: f32 },
    /// Point attractor/repulsor with inverse-square falloff
    Point { location: Vec3, strength: f32 },
}

impl Effector {
    pub fn force_at(&self, position: Vec3, velocity: Vec3) -> Vec3 {
        match *self {
            Effector::Wind {
                direction,
                strength,
            } => direction.normalize_or_zero() * strength,
            Effector::Drag { strength } => -velocity * strength,
            Effector::Point { location, strength } => {
                let delta = position - location;
                let dist_sq = delta.length_squared().max(1e-6);
                delta.normalize_or_zero() * (strength / dist_sq)
            }
        }
    }
}

/// Gravity scaling applied on top of scene gravity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectorWeights {
    pub global_gravity: f32,
    pub all: f32,
}

impl Default for EffectorWeights {
    fn default() -> Self {
        Self {
            global_gravity: 1.0,
            all: 1.0,
        }
    }
}

/// One object in the host scene graph.
#[derive(Debug, Clone, Default)]
pub struct SceneObject {
    pub name: String,
    /// Authoring/world transform matrix
    pub transform: Mat4,
    pub mesh: Mesh,
    pub body: Option<RigidBody>,
    /// Object-level constraint carried by this (typically empty) object
    pub constraint: Option<RigidBodyConstraint>,
    pub fracture: Option<FractureState>,
    /// Authoring transform captured before playback first overwrites
    /// `transform`, so a rewind restores the user's matrix (`Mat4::ZERO`
    /// until captured; fractured objects use
    /// [`FractureState::original_matrix`] instead)
    pub original_matrix: Mat4,
    pub selected: bool,
    /// User is interactively transforming this object right now
    pub grabbed: bool,
    pub lock_location: [bool; 3],
    pub lock_rotation: [bool; 3],
}

impl SceneObject {
    pub fn new(name: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            original_matrix: Mat4::ZERO,
            mesh,
            ..Default::default()
        }
    }

    /// Fracture state, if present and active (the bridge never looks at an
    /// inactive one).
    pub fn active_fracture(&self) -> Option<&FractureState> {
        self.fracture.as_ref().filter(|f| f.is_active())
    }

    pub fn active_fracture_mut(&mut self) -> Option<&mut FractureState> {
        self.fracture.as_mut().filter(|f| f.is_active())
    }

    /// Location, rotation and scale decomposed from the object matrix.
    pub fn decompose_transform(&self) -> (Vec3, Quat, Vec3) {
        let (scale, rot, loc) = self.transform.to_scale_rotation_translation();
        (loc, rot, scale)
    }
}

/// The host scene: objects, gravity, effectors and the playback frame range.
#[derive(Debug, Default)]
pub struct Scene {
    pub objects: Vec<SceneObject>,
    pub gravity: Vec3,
    pub use_gravity: bool,
    pub effectors: Vec<Effector>,
    pub frame_start: i32,
    pub frame_end: i32,
    /// Playback frame rate, frames per second
    pub fps: f32,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            gravity: Vec3::new(0.0, 0.0, -9.81),
            use_gravity: true,
            effectors: Vec::new(),
            frame_start: 1,
            frame_end: 250,
            fps: 24.0,
        }
    }

    pub fn add_object(&mut self, object: SceneObject) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(object);
        id
    }

    pub fn object(&self, id: ObjectId) -> SimResult<&SceneObject> {
        self.objects
            .get(id.0 as usize)
            .ok_or(SimError::UnknownObject(id))
    }

    pub fn object_mut(&mut self, id: ObjectId) -> SimResult<&mut SceneObject> {
        self.objects
            .get_mut(id.0 as usize)
            .ok_or(SimError::UnknownObject(id))
    }

    /// Resolve a body key to its settings block, if the addressed object,
    /// island and body all exist. Missing pieces are expected mid-build and
    /// simply yield `None`.
    pub fn body(&self, key: BodyKey) -> Option<&RigidBody> {
        let object = self.objects.get(key.object.0 as usize)?;
        match key.island {
            Some(island) => {
                let fracture = object.fracture.as_ref()?;
                Some(&fracture.islands.get(island.0 as usize)?.body)
            }
            None => object.body.as_ref(),
        }
    }

    pub fn body_mut(&mut self, key: BodyKey) -> Option<&mut RigidBody> {
        let object = self.objects.get_mut(key.object.0 as usize)?;
        match key.island {
            Some(island) => {
                let fracture = object.fracture.as_mut()?;
                Some(&mut fracture.islands.get_mut(island.0 as usize)?.body)
            }
            None => object.body.as_mut(),
        }
    }

    /// Resolve a constraint key to its settings block, if present.
    pub fn constraint(&self, key: ConstraintKey) -> Option<&RigidBodyConstraint> {
        match key {
            ConstraintKey::Object(id) => self.objects.get(id.0 as usize)?.constraint.as_ref(),
            ConstraintKey::Shard { object, index } => self
                .objects
                .get(object.0 as usize)?
                .fracture
                .as_ref()?
                .constraints
                .get(index),
        }
    }

    pub fn constraint_mut(&mut self, key: ConstraintKey) -> Option<&mut RigidBodyConstraint> {
        match key {
            ConstraintKey::Object(id) => self.objects.get_mut(id.0 as usize)?.constraint.as_mut(),
            ConstraintKey::Shard { object, index } => self
                .objects
                .get_mut(object.0 as usize)?
                .fracture
                .as_mut()?
                .constraints
                .get_mut(index),
        }
    }

    /// Effective gravity for the physics world: scene gravity scaled by
    /// effector weights, zero when globally disabled.
    pub fn effective_gravity(&self, weights: &EffectorWeights) -> Vec3 {
        if self.use_gravity {
            self.gravity * weights.global_gravity * weights.all
        } else {
            Vec3::ZERO
        }
    }

    /// Net effector force at a point, used for central-force application.
    pub fn effector_force(&self, position: Vec3, velocity: Vec3) -> Vec3 {
        self.effectors
            .iter()
            .map(|e| e.force_at(position, velocity))
            .sum()
    }
}
