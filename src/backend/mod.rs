//! Abstract physics engine interface.
//!
//! The bridge never talks to a concrete physics engine directly; everything
//! goes through [`PhysicsBackend`], which hands out opaque handles and keeps
//! all engine state on its side. Handles are plain ids: the backend owns the
//! objects, the bridge owns the handles and is responsible for deleting them.
//!
//! The [`mock`] backend is the in-process reference implementation used by
//! the test suite and by hosts that want deterministic previews without a
//! native engine.

pub mod mock;

pub use mock::MockBackend;

use glam::{Quat, Vec3};

use crate::scene::BodyKey;

/// Opaque world handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldHandle(pub(crate) u32);

/// Opaque rigid body handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub(crate) u32);

/// Opaque collision shape handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeHandle(pub(crate) u32);

/// Opaque constraint handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstraintHandle(pub(crate) u32);

/// Shape construction parameters. Dimensions are half extents unless noted.
#[derive(Debug, Clone, Copy)]
pub enum ShapeDesc<'a> {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// `height` is the cylinder part between the cap centers
    Capsule { radius: f32, height: f32 },
    Cylinder { radius: f32, half_height: f32 },
    Cone { radius: f32, height: f32 },
    ConvexHull { vertices: &'a [Vec3], margin: f32 },
    TriMesh {
        vertices: &'a [Vec3],
        triangles: &'a [[u32; 3]],
    },
}

/// Axis selector for 6DOF limit and spring calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DofAxis {
    LinX,
    LinY,
    LinZ,
    AngX,
    AngY,
    AngZ,
}

/// Per-pair collision predicate, invoked by the engine during broadphase.
///
/// Implementations must not touch engine structures; anything beyond the
/// verdict is recorded and applied after the step returns.
pub trait ContactFilter {
    fn check_pair(&mut self, a: BodyKey, b: BodyKey) -> bool;
}

/// Everything the bridge needs from a rigid-body engine.
///
/// Calls with stale or foreign handles must be ignored by implementations,
/// mirroring the bridge's own missing-prerequisite policy.
pub trait PhysicsBackend {
    /// Concrete-type escape hatch for backend-specific inspection.
    fn as_any(&self) -> &dyn std::any::Any;

    // -- world --
    fn world_new(&mut self, gravity: Vec3) -> WorldHandle;
    fn world_delete(&mut self, world: WorldHandle);
    fn world_set_gravity(&mut self, world: WorldHandle, gravity: Vec3);
    fn world_set_solver_iterations(&mut self, world: WorldHandle, iterations: i32);
    fn world_set_split_impulse(&mut self, world: WorldHandle, split_impulse: bool);
    /// Advance the world. Blocking; either completes or the frame is abandoned.
    fn world_step(
        &mut self,
        world: WorldHandle,
        timestep: f32,
        max_substeps: i32,
        substep: f32,
        filter: &mut dyn ContactFilter,
    );

    // -- shapes --
    /// `None` on construction failure (degenerate hull input and the like).
    fn shape_new(&mut self, desc: ShapeDesc<'_>) -> Option<ShapeHandle>;
    fn shape_delete(&mut self, shape: ShapeHandle);
    fn shape_set_margin(&mut self, shape: ShapeHandle, margin: f32);
    /// Push deformed vertices into an existing trimesh shape.
    fn shape_update_trimesh(&mut self, shape: ShapeHandle, vertices: &[Vec3]);

    // -- bodies --
    fn body_new(&mut self, shape: ShapeHandle, position: Vec3, orientation: Quat) -> BodyHandle;
    fn body_delete(&mut self, body: BodyHandle);
    fn body_set_mass(&mut self, body: BodyHandle, mass: f32);
    fn body_set_friction(&mut self, body: BodyHandle, friction: f32);
    fn body_set_restitution(&mut self, body: BodyHandle, restitution: f32);
    fn body_set_damping(&mut self, body: BodyHandle, linear: f32, angular: f32);
    fn body_set_sleep_thresh(&mut self, body: BodyHandle, linear: f32, angular: f32);
    fn body_set_activation_state(&mut self, body: BodyHandle, use_deactivation: bool);
    fn body_activate(&mut self, body: BodyHandle);
    fn body_deactivate(&mut self, body: BodyHandle);
    fn body_set_linear_factor(&mut self, body: BodyHandle, factor: Vec3);
    fn body_set_angular_factor(&mut self, body: BodyHandle, factor: Vec3);
    fn body_set_kinematic_state(&mut self, body: BodyHandle, kinematic: bool);
    fn body_set_transform(&mut self, body: BodyHandle, position: Vec3, orientation: Quat);
    fn body_set_scale(&mut self, body: BodyHandle, scale: Vec3);
    fn body_set_collision_shape(&mut self, body: BodyHandle, shape: ShapeHandle);
    fn body_apply_central_force(&mut self, body: BodyHandle, force: Vec3);
    fn body_position(&self, body: BodyHandle) -> Vec3;
    fn body_orientation(&self, body: BodyHandle) -> Quat;
    fn body_linear_velocity(&self, body: BodyHandle) -> Vec3;
    fn body_angular_velocity(&self, body: BodyHandle) -> Vec3;
    fn world_add_body(
        &mut self,
        world: WorldHandle,
        body: BodyHandle,
        col_groups: u32,
        identity: BodyKey,
    );
    fn world_remove_body(&mut self, world: WorldHandle, body: BodyHandle);

    // -- constraints --
    fn constraint_new_point(&mut self, pivot: Vec3, a: BodyHandle, b: BodyHandle)
        -> ConstraintHandle;
    fn constraint_new_fixed(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_hinge(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_slider(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_piston(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_6dof(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_6dof_spring(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_new_motor(
        &mut self,
        pivot: Vec3,
        orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle;
    fn constraint_delete(&mut self, constraint: ConstraintHandle);
    fn constraint_set_enabled(&mut self, constraint: ConstraintHandle, enabled: bool);
    fn constraint_is_enabled(&self, constraint: ConstraintHandle) -> bool;
    /// `f32::MAX` means "never breaks".
    fn constraint_set_breaking_threshold(&mut self, constraint: ConstraintHandle, threshold: f32);
    /// `-1` means "use the world default".
    fn constraint_set_solver_iterations(&mut self, constraint: ConstraintHandle, iterations: i32);
    fn constraint_set_limits_hinge(&mut self, constraint: ConstraintHandle, lower: f32, upper: f32);
    fn constraint_set_limits_slider(
        &mut self,
        constraint: ConstraintHandle,
        lower: f32,
        upper: f32,
    );
    fn constraint_set_limits_piston(
        &mut self,
        constraint: ConstraintHandle,
        lin_lower: f32,
        lin_upper: f32,
        ang_lower: f32,
        ang_upper: f32,
    );
    fn constraint_set_limits_6dof(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        lower: f32,
        upper: f32,
    );
    fn constraint_set_spring(&mut self, constraint: ConstraintHandle, axis: DofAxis, enable: bool);
    fn constraint_set_spring_stiffness(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        stiffness: f32,
    );
    fn constraint_set_spring_damping(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        damping: f32,
    );
    /// Capture current relative pose as the spring rest state.
    fn constraint_set_equilibrium(&mut self, constraint: ConstraintHandle);
    fn constraint_set_motor_enabled(
        &mut self,
        constraint: ConstraintHandle,
        linear: bool,
        angular: bool,
    );
    fn constraint_set_motor_max_impulse(
        &mut self,
        constraint: ConstraintHandle,
        linear: f32,
        angular: f32,
    );
    fn constraint_set_motor_target_velocity(
        &mut self,
        constraint: ConstraintHandle,
        linear: f32,
        angular: f32,
    );
    fn world_add_constraint(
        &mut self,
        world: WorldHandle,
        constraint: ConstraintHandle,
        disable_collisions: bool,
    );
    fn world_remove_constraint(&mut self, world: WorldHandle, constraint: ConstraintHandle);
}
