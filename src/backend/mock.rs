//! In-process reference backend.
//!
//! A deliberately small rigid-body engine: semi-implicit Euler integration,
//! AABB broadphase, and a vertical contact clamp good enough for "body falls
//! onto ground" scenarios. It exists so the bridge's validation, filtering
//! and caching logic can be exercised deterministically without a native
//! engine, and so hosts get a preview backend for free.
//!
//! Settings calls record their values verbatim; tests inspect them to verify
//! what the bridge applied.

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use super::{
    BodyHandle, ConstraintHandle, ContactFilter, DofAxis, PhysicsBackend, ShapeDesc, ShapeHandle,
    WorldHandle,
};
use crate::scene::BodyKey;

#[derive(Debug, Clone)]
pub(crate) struct MockShape {
    pub kind: MockShapeKind,
    pub half_extents: Vec3,
    pub margin: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockShapeKind {
    Box,
    Sphere,
    Capsule,
    Cylinder,
    Cone,
    ConvexHull,
    TriMesh,
}

#[derive(Debug, Clone)]
pub(crate) struct MockBody {
    pub shape: ShapeHandle,
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub force: Vec3,
    pub mass: f32,
    pub friction: f32,
    pub restitution: f32,
    pub lin_damping: f32,
    pub ang_damping: f32,
    pub lin_sleep_thresh: f32,
    pub ang_sleep_thresh: f32,
    pub use_deactivation: bool,
    pub active: bool,
    pub kinematic: bool,
    pub linear_factor: Vec3,
    pub angular_factor: Vec3,
    pub col_groups: u32,
    pub identity: BodyKey,
    pub in_world: Option<WorldHandle>,
}

#[derive(Debug, Clone)]
pub(crate) struct MockConstraint {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub enabled: bool,
    pub breaking_threshold: f32,
    pub solver_iterations: i32,
    pub limits: FxHashMap<&'static str, (f32, f32)>,
    pub dof_limits: FxHashMap<DofAxis, (f32, f32)>,
    pub springs: FxHashMap<DofAxis, (bool, f32, f32)>,
    pub motor: (bool, bool, f32, f32, f32, f32),
    pub in_world: Option<WorldHandle>,
    pub disable_collisions: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MockWorld {
    pub gravity: Vec3,
    pub solver_iterations: i32,
    pub split_impulse: bool,
    bodies: Vec<BodyHandle>,
}

/// Reference [`PhysicsBackend`] implementation.
#[derive(Default)]
pub struct MockBackend {
    worlds: FxHashMap<u32, MockWorld>,
    shapes: FxHashMap<u32, MockShape>,
    bodies: FxHashMap<u32, MockBody>,
    constraints: FxHashMap<u32, MockConstraint>,
    next_id: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn body(&self, handle: BodyHandle) -> Option<&MockBody> {
        self.bodies.get(&handle.0)
    }

    pub(crate) fn constraint(&self, handle: ConstraintHandle) -> Option<&MockConstraint> {
        self.constraints.get(&handle.0)
    }

    pub(crate) fn shape(&self, handle: ShapeHandle) -> Option<&MockShape> {
        self.shapes.get(&handle.0)
    }

    pub(crate) fn world(&self, handle: WorldHandle) -> Option<&MockWorld> {
        self.worlds.get(&handle.0)
    }

    /// Number of live bodies, for leak assertions in tests.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    fn new_constraint(&mut self, body_a: BodyHandle, body_b: BodyHandle) -> ConstraintHandle {
        let id = self.alloc();
        self.constraints.insert(
            id,
            MockConstraint {
                body_a,
                body_b,
                enabled: true,
                breaking_threshold: f32::MAX,
                solver_iterations: -1,
                limits: FxHashMap::default(),
                dof_limits: FxHashMap::default(),
                springs: FxHashMap::default(),
                motor: (false, false, 0.0, 0.0, 0.0, 0.0),
                in_world: None,
                disable_collisions: false,
            },
        );
        ConstraintHandle(id)
    }

    fn world_aabb(&self, body: &MockBody) -> Option<(Vec3, Vec3)> {
        let shape = self.shapes.get(&body.shape.0)?;
        let half = shape.half_extents * body.scale;
        Some((body.position - half, body.position + half))
    }

    fn is_dynamic(body: &MockBody) -> bool {
        !body.kinematic && body.mass > 0.0
    }
}

fn aabb_overlap(a: (Vec3, Vec3), b: (Vec3, Vec3)) -> bool {
    a.0.x <= b.1.x
        && a.1.x >= b.0.x
        && a.0.y <= b.1.y
        && a.1.y >= b.0.y
        && a.0.z <= b.1.z
        && a.1.z >= b.0.z
}

impl PhysicsBackend for MockBackend {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn world_new(&mut self, gravity: Vec3) -> WorldHandle {
        let id = self.alloc();
        self.worlds.insert(
            id,
            MockWorld {
                gravity,
                solver_iterations: 10,
                split_impulse: false,
                bodies: Vec::new(),
            },
        );
        WorldHandle(id)
    }

    fn world_delete(&mut self, world: WorldHandle) {
        self.worlds.remove(&world.0);
    }

    fn world_set_gravity(&mut self, world: WorldHandle, gravity: Vec3) {
        if let Some(w) = self.worlds.get_mut(&world.0) {
            w.gravity = gravity;
        }
    }

    fn world_set_solver_iterations(&mut self, world: WorldHandle, iterations: i32) {
        if let Some(w) = self.worlds.get_mut(&world.0) {
            w.solver_iterations = iterations;
        }
    }

    fn world_set_split_impulse(&mut self, world: WorldHandle, split_impulse: bool) {
        if let Some(w) = self.worlds.get_mut(&world.0) {
            w.split_impulse = split_impulse;
        }
    }

    fn world_step(
        &mut self,
        world: WorldHandle,
        timestep: f32,
        max_substeps: i32,
        substep: f32,
        filter: &mut dyn ContactFilter,
    ) {
        let Some(w) = self.worlds.get(&world.0) else {
            return;
        };
        if timestep <= 0.0 {
            return;
        }
        let gravity = w.gravity;
        let members = w.bodies.clone();

        let mut substeps = if substep > 0.0 {
            (timestep / substep).round() as i32
        } else {
            1
        };
        substeps = substeps.clamp(1, max_substeps.max(1));
        let dt = timestep / substeps as f32;

        for _ in 0..substeps {
            // integrate
            for handle in &members {
                let Some(body) = self.bodies.get_mut(&handle.0) else {
                    continue;
                };
                if !Self::is_dynamic(body) || !body.active {
                    body.force = Vec3::ZERO;
                    continue;
                }
                let accel = gravity + body.force / body.mass;
                body.linear_velocity += accel * dt;
                body.linear_velocity *= 1.0 - body.lin_damping * dt;
                body.angular_velocity *= 1.0 - body.ang_damping * dt;
                let delta = body.linear_velocity * body.linear_factor * dt;
                body.position += delta;
                body.force = Vec3::ZERO;
            }

            // broadphase + filter + vertical contact clamp
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let (Some(a), Some(b)) =
                        (self.bodies.get(&members[i].0), self.bodies.get(&members[j].0))
                    else {
                        continue;
                    };
                    let (Some(box_a), Some(box_b)) = (self.world_aabb(a), self.world_aabb(b))
                    else {
                        continue;
                    };
                    if !aabb_overlap(box_a, box_b) {
                        continue;
                    }
                    if !filter.check_pair(a.identity, b.identity) {
                        continue;
                    }

                    // resolve only the falling-onto-support case; enough for
                    // a preview backend
                    let (dyn_idx, sup_top) = if Self::is_dynamic(a) && !Self::is_dynamic(b) {
                        (i, box_b.1.z)
                    } else if Self::is_dynamic(b) && !Self::is_dynamic(a) {
                        (j, box_a.1.z)
                    } else {
                        continue;
                    };
                    let handle = members[dyn_idx];
                    let half_z = self
                        .bodies
                        .get(&handle.0)
                        .and_then(|body| {
                            self.shapes
                                .get(&body.shape.0)
                                .map(|s| s.half_extents.z * body.scale.z)
                        })
                        .unwrap_or(0.0);
                    if let Some(body) = self.bodies.get_mut(&handle.0) {
                        if body.linear_velocity.z < 0.0 && body.position.z > sup_top {
                            body.position.z = sup_top + half_z;
                            body.linear_velocity.z = 0.0;
                        }
                    }
                }
            }
        }
    }

    fn shape_new(&mut self, desc: ShapeDesc<'_>) -> Option<ShapeHandle> {
        let (kind, half_extents) = match desc {
            ShapeDesc::Box { half_extents } => (MockShapeKind::Box, half_extents),
            ShapeDesc::Sphere { radius } => (MockShapeKind::Sphere, Vec3::splat(radius)),
            ShapeDesc::Capsule { radius, height } => (
                MockShapeKind::Capsule,
                Vec3::new(radius, radius, height * 0.5 + radius),
            ),
            ShapeDesc::Cylinder {
                radius,
                half_height,
            } => (MockShapeKind::Cylinder, Vec3::new(radius, radius, half_height)),
            ShapeDesc::Cone { radius, height } => {
                (MockShapeKind::Cone, Vec3::new(radius, radius, height * 0.5))
            }
            ShapeDesc::ConvexHull { vertices, .. } => {
                // a hull needs at least a non-degenerate simplex
                if vertices.len() < 4 {
                    return None;
                }
                (MockShapeKind::ConvexHull, extents_of(vertices))
            }
            ShapeDesc::TriMesh {
                vertices,
                triangles,
            } => {
                if vertices.is_empty() || triangles.is_empty() {
                    return None;
                }
                (MockShapeKind::TriMesh, extents_of(vertices))
            }
        };
        let margin = match desc {
            ShapeDesc::ConvexHull { margin, .. } => margin,
            _ => 0.0,
        };
        let id = self.alloc();
        self.shapes.insert(
            id,
            MockShape {
                kind,
                half_extents,
                margin,
            },
        );
        Some(ShapeHandle(id))
    }

    fn shape_delete(&mut self, shape: ShapeHandle) {
        self.shapes.remove(&shape.0);
    }

    fn shape_set_margin(&mut self, shape: ShapeHandle, margin: f32) {
        if let Some(s) = self.shapes.get_mut(&shape.0) {
            s.margin = margin;
        }
    }

    fn shape_update_trimesh(&mut self, shape: ShapeHandle, vertices: &[Vec3]) {
        if let Some(s) = self.shapes.get_mut(&shape.0) {
            if s.kind == MockShapeKind::TriMesh && !vertices.is_empty() {
                s.half_extents = extents_of(vertices);
            }
        }
    }

    fn body_new(&mut self, shape: ShapeHandle, position: Vec3, orientation: Quat) -> BodyHandle {
        let id = self.alloc();
        self.bodies.insert(
            id,
            MockBody {
                shape,
                position,
                orientation,
                scale: Vec3::ONE,
                linear_velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
                force: Vec3::ZERO,
                mass: 1.0,
                friction: 0.5,
                restitution: 0.0,
                lin_damping: 0.0,
                ang_damping: 0.0,
                lin_sleep_thresh: 0.0,
                ang_sleep_thresh: 0.0,
                use_deactivation: false,
                active: true,
                kinematic: false,
                linear_factor: Vec3::ONE,
                angular_factor: Vec3::ONE,
                col_groups: 1,
                identity: BodyKey {
                    object: crate::scene::ObjectId(u32::MAX),
                    island: None,
                },
                in_world: None,
            },
        );
        BodyHandle(id)
    }

    fn body_delete(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.remove(&body.0) {
            if let Some(world) = b.in_world {
                if let Some(w) = self.worlds.get_mut(&world.0) {
                    w.bodies.retain(|h| *h != body);
                }
            }
        }
    }

    fn body_set_mass(&mut self, body: BodyHandle, mass: f32) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.mass = mass;
        }
    }

    fn body_set_friction(&mut self, body: BodyHandle, friction: f32) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.friction = friction;
        }
    }

    fn body_set_restitution(&mut self, body: BodyHandle, restitution: f32) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.restitution = restitution;
        }
    }

    fn body_set_damping(&mut self, body: BodyHandle, linear: f32, angular: f32) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.lin_damping = linear;
            b.ang_damping = angular;
        }
    }

    fn body_set_sleep_thresh(&mut self, body: BodyHandle, linear: f32, angular: f32) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.lin_sleep_thresh = linear;
            b.ang_sleep_thresh = angular;
        }
    }

    fn body_set_activation_state(&mut self, body: BodyHandle, use_deactivation: bool) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.use_deactivation = use_deactivation;
        }
    }

    fn body_activate(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.active = true;
        }
    }

    fn body_deactivate(&mut self, body: BodyHandle) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.active = false;
        }
    }

    fn body_set_linear_factor(&mut self, body: BodyHandle, factor: Vec3) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.linear_factor = factor;
        }
    }

    fn body_set_angular_factor(&mut self, body: BodyHandle, factor: Vec3) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.angular_factor = factor;
        }
    }

    fn body_set_kinematic_state(&mut self, body: BodyHandle, kinematic: bool) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.kinematic = kinematic;
        }
    }

    fn body_set_transform(&mut self, body: BodyHandle, position: Vec3, orientation: Quat) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.position = position;
            b.orientation = orientation;
        }
    }

    fn body_set_scale(&mut self, body: BodyHandle, scale: Vec3) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.scale = scale;
        }
    }

    fn body_set_collision_shape(&mut self, body: BodyHandle, shape: ShapeHandle) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.shape = shape;
        }
    }

    fn body_apply_central_force(&mut self, body: BodyHandle, force: Vec3) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.force += force;
        }
    }

    fn body_position(&self, body: BodyHandle) -> Vec3 {
        self.bodies.get(&body.0).map(|b| b.position).unwrap_or_default()
    }

    fn body_orientation(&self, body: BodyHandle) -> Quat {
        self.bodies
            .get(&body.0)
            .map(|b| b.orientation)
            .unwrap_or(Quat::IDENTITY)
    }

    fn body_linear_velocity(&self, body: BodyHandle) -> Vec3 {
        self.bodies
            .get(&body.0)
            .map(|b| b.linear_velocity)
            .unwrap_or_default()
    }

    fn body_angular_velocity(&self, body: BodyHandle) -> Vec3 {
        self.bodies
            .get(&body.0)
            .map(|b| b.angular_velocity)
            .unwrap_or_default()
    }

    fn world_add_body(
        &mut self,
        world: WorldHandle,
        body: BodyHandle,
        col_groups: u32,
        identity: BodyKey,
    ) {
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.col_groups = col_groups;
            b.identity = identity;
            b.in_world = Some(world);
        }
        if let Some(w) = self.worlds.get_mut(&world.0) {
            if !w.bodies.contains(&body) {
                w.bodies.push(body);
            }
        }
    }

    fn world_remove_body(&mut self, world: WorldHandle, body: BodyHandle) {
        if let Some(w) = self.worlds.get_mut(&world.0) {
            w.bodies.retain(|h| *h != body);
        }
        if let Some(b) = self.bodies.get_mut(&body.0) {
            b.in_world = None;
        }
    }

    fn constraint_new_point(
        &mut self,
        _pivot: Vec3,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_fixed(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_hinge(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_slider(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_piston(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_6dof(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_6dof_spring(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_new_motor(
        &mut self,
        _pivot: Vec3,
        _orientation: Quat,
        a: BodyHandle,
        b: BodyHandle,
    ) -> ConstraintHandle {
        self.new_constraint(a, b)
    }

    fn constraint_delete(&mut self, constraint: ConstraintHandle) {
        self.constraints.remove(&constraint.0);
    }

    fn constraint_set_enabled(&mut self, constraint: ConstraintHandle, enabled: bool) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.enabled = enabled;
        }
    }

    fn constraint_is_enabled(&self, constraint: ConstraintHandle) -> bool {
        self.constraints
            .get(&constraint.0)
            .map(|c| c.enabled)
            .unwrap_or(false)
    }

    fn constraint_set_breaking_threshold(&mut self, constraint: ConstraintHandle, threshold: f32) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.breaking_threshold = threshold;
        }
    }

    fn constraint_set_solver_iterations(&mut self, constraint: ConstraintHandle, iterations: i32) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.solver_iterations = iterations;
        }
    }

    fn constraint_set_limits_hinge(
        &mut self,
        constraint: ConstraintHandle,
        lower: f32,
        upper: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.limits.insert("hinge", (lower, upper));
        }
    }

    fn constraint_set_limits_slider(
        &mut self,
        constraint: ConstraintHandle,
        lower: f32,
        upper: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.limits.insert("slider", (lower, upper));
        }
    }

    fn constraint_set_limits_piston(
        &mut self,
        constraint: ConstraintHandle,
        lin_lower: f32,
        lin_upper: f32,
        ang_lower: f32,
        ang_upper: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.limits.insert("piston_lin", (lin_lower, lin_upper));
            c.limits.insert("piston_ang", (ang_lower, ang_upper));
        }
    }

    fn constraint_set_limits_6dof(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        lower: f32,
        upper: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.dof_limits.insert(axis, (lower, upper));
        }
    }

    fn constraint_set_spring(&mut self, constraint: ConstraintHandle, axis: DofAxis, enable: bool) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            let entry = c.springs.entry(axis).or_insert((false, 0.0, 0.0));
            entry.0 = enable;
        }
    }

    fn constraint_set_spring_stiffness(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        stiffness: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            let entry = c.springs.entry(axis).or_insert((false, 0.0, 0.0));
            entry.1 = stiffness;
        }
    }

    fn constraint_set_spring_damping(
        &mut self,
        constraint: ConstraintHandle,
        axis: DofAxis,
        damping: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            let entry = c.springs.entry(axis).or_insert((false, 0.0, 0.0));
            entry.2 = damping;
        }
    }

    fn constraint_set_equilibrium(&mut self, _constraint: ConstraintHandle) {}

    fn constraint_set_motor_enabled(
        &mut self,
        constraint: ConstraintHandle,
        linear: bool,
        angular: bool,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.motor.0 = linear;
            c.motor.1 = angular;
        }
    }

    fn constraint_set_motor_max_impulse(
        &mut self,
        constraint: ConstraintHandle,
        linear: f32,
        angular: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.motor.2 = linear;
            c.motor.3 = angular;
        }
    }

    fn constraint_set_motor_target_velocity(
        &mut self,
        constraint: ConstraintHandle,
        linear: f32,
        angular: f32,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.motor.4 = linear;
            c.motor.5 = angular;
        }
    }

    fn world_add_constraint(
        &mut self,
        world: WorldHandle,
        constraint: ConstraintHandle,
        disable_collisions: bool,
    ) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.in_world = Some(world);
            c.disable_collisions = disable_collisions;
        }
    }

    fn world_remove_constraint(&mut self, _world: WorldHandle, constraint: ConstraintHandle) {
        if let Some(c) = self.constraints.get_mut(&constraint.0) {
            c.in_world = None;
        }
    }
}

fn extents_of(vertices: &[Vec3]) -> Vec3 {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for v in vertices {
        min = min.min(*v);
        max = max.max(*v);
    }
    (max - min) * 0.5
}
