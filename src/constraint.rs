//! Rigid body constraint settings block.
//!
//! A constraint joins two bodies addressed by [`BodyKey`] (object-level
//! constraints join whole objects, shard constraints join islands). Endpoint
//! bodies are resolved through the scene at use time, so a removed island can
//! never leave a dangling reference behind.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::backend::ConstraintHandle;
use crate::body::RigidBody;
use crate::scene::{BodyKey, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintType {
    Point,
    Fixed,
    Hinge,
    Slider,
    Piston,
    SixDof,
    SixDofSpring,
    Motor,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ConstraintFlags: u32 {
        const ENABLED = 1 << 0;
        /// Settings changed; engine constraint must be revalidated
        const NEEDS_VALIDATE = 1 << 1;
        /// Break when impulse exceeds the breaking threshold
        const USE_BREAKING = 1 << 2;
        /// Suppress collisions between the two constrained bodies
        const DISABLE_COLLISIONS = 1 << 3;
        /// Rebuild pending because kinematic deactivation tore this
        /// constraint out of the world mid-query
        const USE_KINEMATIC_DEACTIVATION = 1 << 4;
        const OVERRIDE_SOLVER_ITERATIONS = 1 << 5;

        const USE_LIMIT_LIN_X = 1 << 6;
        const USE_LIMIT_LIN_Y = 1 << 7;
        const USE_LIMIT_LIN_Z = 1 << 8;
        const USE_LIMIT_ANG_X = 1 << 9;
        const USE_LIMIT_ANG_Y = 1 << 10;
        const USE_LIMIT_ANG_Z = 1 << 11;

        const USE_SPRING_X = 1 << 12;
        const USE_SPRING_Y = 1 << 13;
        const USE_SPRING_Z = 1 << 14;

        const USE_MOTOR_LIN = 1 << 15;
        const USE_MOTOR_ANG = 1 << 16;
    }
}

/// Addresses one constraint: an object-level constraint carried by an
/// object, or one auto-generated shard constraint in a fracture state.
/// Constraints are always resolved through the scene at use time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKey {
    Object(ObjectId),
    Shard { object: ObjectId, index: usize },
}

/// Lower/upper bound pair for one axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limit {
    pub lower: f32,
    pub upper: f32,
}

impl Limit {
    /// Degenerate range the engine interprets as unconstrained.
    pub const FREE: Limit = Limit {
        lower: 0.0,
        upper: -1.0,
    };
}

/// Constraint settings plus the owned engine handle.
#[derive(Debug, Clone)]
pub struct RigidBodyConstraint {
    pub con_type: ConstraintType,
    pub body1: BodyKey,
    pub body2: BodyKey,
    pub flags: ConstraintFlags,

    pub limit_lin_x: Limit,
    pub limit_lin_y: Limit,
    pub limit_lin_z: Limit,
    pub limit_ang_x: Limit,
    pub limit_ang_y: Limit,
    pub limit_ang_z: Limit,

    pub spring_stiffness: Vec3,
    pub spring_damping: Vec3,

    pub motor_lin_max_impulse: f32,
    pub motor_lin_target_velocity: f32,
    pub motor_ang_max_impulse: f32,
    pub motor_ang_target_velocity: f32,

    pub breaking_threshold: f32,
    pub num_solver_iterations: i32,

    /// Relative distance between the endpoints, captured at validation
    pub start_dist: f32,
    /// Relative axis-angle rotation between the endpoints, captured at validation
    pub start_angle: f32,

    pub handle: Option<ConstraintHandle>,
}

impl RigidBodyConstraint {
    fn with_defaults(
        con_type: ConstraintType,
        body1: BodyKey,
        body2: BodyKey,
        flags: ConstraintFlags,
        breaking_threshold: f32,
    ) -> Self {
        let quarter_pi = std::f32::consts::FRAC_PI_4;
        Self {
            con_type,
            body1,
            body2,
            flags,
            limit_lin_x: Limit {
                lower: -1.0,
                upper: 1.0,
            },
            limit_lin_y: Limit {
                lower: -1.0,
                upper: 1.0,
            },
            limit_lin_z: Limit {
                lower: -1.0,
                upper: 1.0,
            },
            limit_ang_x: Limit {
                lower: -quarter_pi,
                upper: quarter_pi,
            },
            limit_ang_y: Limit {
                lower: -quarter_pi,
                upper: quarter_pi,
            },
            limit_ang_z: Limit {
                lower: -quarter_pi,
                upper: quarter_pi,
            },
            spring_stiffness: Vec3::splat(10.0),
            spring_damping: Vec3::splat(0.5),
            motor_lin_max_impulse: 1.0,
            motor_lin_target_velocity: 1.0,
            motor_ang_max_impulse: 1.0,
            motor_ang_target_velocity: 1.0,
            breaking_threshold,
            num_solver_iterations: 10,
            start_dist: 0.0,
            start_angle: 0.0,
            handle: None,
        }
    }

    /// Object-level constraint: enabled, collisions between the pair
    /// suppressed, breaking opt-in.
    pub fn new(con_type: ConstraintType, body1: BodyKey, body2: BodyKey) -> Self {
        Self::with_defaults(
            con_type,
            body1,
            body2,
            ConstraintFlags::ENABLED | ConstraintFlags::DISABLE_COLLISIONS,
            10.0,
        )
    }

    /// Shard constraint: breaking on by default, pair collisions allowed so
    /// broken neighbours still push each other apart.
    pub fn new_shard(con_type: ConstraintType, body1: BodyKey, body2: BodyKey) -> Self {
        Self::with_defaults(
            con_type,
            body1,
            body2,
            ConstraintFlags::ENABLED | ConstraintFlags::USE_BREAKING,
            1.0,
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.flags.contains(ConstraintFlags::ENABLED)
    }

    /// Effective limit for one axis: the stored range when its use-flag is
    /// set, otherwise the free sentinel.
    pub fn effective_limit(&self, use_flag: ConstraintFlags, limit: Limit) -> Limit {
        if self.flags.contains(use_flag) {
            limit
        } else {
            Limit::FREE
        }
    }
}

/// Relative distance and axis-angle rotation between two poses.
pub fn dist_angle(p1: Vec3, q1: glam::Quat, p2: Vec3, q2: glam::Quat) -> (f32, f32) {
    let dist = (p1 - p2).length();
    let qdiff = q1.inverse() * q2;
    let (_, angle) = qdiff.to_axis_angle();
    (dist, angle)
}

/// Current relative distance and axis-angle rotation between two endpoint
/// bodies. Zero when either body is missing.
pub fn calc_dist_angle(body1: Option<&RigidBody>, body2: Option<&RigidBody>) -> (f32, f32) {
    let (Some(b1), Some(b2)) = (body1, body2) else {
        return (0.0, 0.0);
    };
    dist_angle(b1.position, b1.orientation, b2.position, b2.orientation)
}

/// Capture the starting distance and angle used as the breaking baseline.
pub fn capture_start_dist_angle(
    con: &mut RigidBodyConstraint,
    body1: Option<&RigidBody>,
    body2: Option<&RigidBody>,
) {
    let (dist, angle) = calc_dist_angle(body1, body2);
    con.start_dist = dist;
    con.start_angle = angle;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::BodyType;
    use crate::scene::{BodyKey, ObjectId};
    use glam::Quat;

    fn key(i: u32) -> BodyKey {
        BodyKey::object(ObjectId(i))
    }

    #[test]
    fn shard_defaults_enable_breaking_and_allow_collisions() {
        let con = RigidBodyConstraint::new_shard(ConstraintType::Fixed, key(0), key(1));
        assert!(con.flags.contains(ConstraintFlags::USE_BREAKING));
        assert!(!con.flags.contains(ConstraintFlags::DISABLE_COLLISIONS));
        assert_eq!(con.breaking_threshold, 1.0);

        let obj_con = RigidBodyConstraint::new(ConstraintType::Fixed, key(0), key(1));
        assert!(obj_con.flags.contains(ConstraintFlags::DISABLE_COLLISIONS));
        assert_eq!(obj_con.breaking_threshold, 10.0);
    }

    #[test]
    fn effective_limit_falls_back_to_free_sentinel() {
        let mut con = RigidBodyConstraint::new(ConstraintType::SixDof, key(0), key(1));
        let limit = con.effective_limit(ConstraintFlags::USE_LIMIT_LIN_X, con.limit_lin_x);
        assert_eq!(limit.lower, 0.0);
        assert_eq!(limit.upper, -1.0);

        con.flags |= ConstraintFlags::USE_LIMIT_LIN_X;
        let limit = con.effective_limit(ConstraintFlags::USE_LIMIT_LIN_X, con.limit_lin_x);
        assert_eq!(limit.lower, -1.0);
        assert_eq!(limit.upper, 1.0);
    }

    #[test]
    fn dist_angle_from_body_poses() {
        let mut b1 = RigidBody::new(BodyType::Active);
        let mut b2 = RigidBody::new(BodyType::Active);
        b1.position = Vec3::ZERO;
        b2.position = Vec3::new(3.0, 4.0, 0.0);
        b2.orientation = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);

        let (dist, angle) = calc_dist_angle(Some(&b1), Some(&b2));
        assert!((dist - 5.0).abs() < 1e-5);
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 1e-4);

        assert_eq!(calc_dist_angle(None, Some(&b2)), (0.0, 0.0));
    }
}
