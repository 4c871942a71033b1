//! Collision-group filtering and kinematic deactivation.
//!
//! The engine asks, per candidate contact pair, whether the pair may collide
//! at all. The verdict is pure group-mask overlap; the interesting part is
//! the side channel: a touch against a kinematic body that opted into
//! kinematic deactivation queues a wake-up action, gated on the touching
//! side having opted in as well (or the touched fracture running without
//! constraints). Structures are never mutated while the engine is mid-query,
//! the queue is drained by the next validation pass.

use log::debug;
use rustc_hash::FxHashMap;

use crate::backend::ContactFilter;
use crate::body::BodyFlags;
use crate::scene::{BodyKey, ObjectId, Scene};

/// Usable collision group bits per body.
pub const COLLISION_GROUP_BITS: u32 = 20;

const COLLISION_GROUP_MASK: u32 = (1 << COLLISION_GROUP_BITS) - 1;

/// Two bodies may collide iff their group masks share any bit. Kinematic
/// status never affects the verdict.
pub fn collision_groups_overlap(a: u32, b: u32) -> bool {
    a & b & COLLISION_GROUP_MASK != 0
}

/// Deferred mutation recorded during a collision query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Flip every kinematic island of the object to dynamic and pull all of
    /// its shard constraints out of the world for revalidation.
    WakeKinematicObject(ObjectId),
}

#[derive(Debug, Clone, Copy)]
struct FilterEntry {
    col_groups: u32,
    kinematic: bool,
    wake_on_touch: bool,
    /// Owning object is fractured with its shard constraints switched off
    unconstrained: bool,
}

/// Snapshot-based [`ContactFilter`].
///
/// Built fresh before each world step from the bodies currently in the
/// world, so the engine never reaches back into the scene during the query.
#[derive(Debug, Default)]
pub struct SimContactFilter {
    entries: FxHashMap<BodyKey, FilterEntry>,
    pending: Vec<PendingAction>,
}

impl SimContactFilter {
    /// Snapshot the filter-relevant state of every body under `keys`.
    pub fn snapshot<'a>(scene: &Scene, keys: impl IntoIterator<Item = &'a BodyKey>) -> Self {
        let mut entries = FxHashMap::default();
        for key in keys {
            if let Some(body) = scene.body(*key) {
                let unconstrained = scene
                    .object(key.object)
                    .ok()
                    .and_then(|o| o.active_fracture())
                    .map_or(false, |f| !f.use_constraints);
                entries.insert(
                    *key,
                    FilterEntry {
                        col_groups: body.col_groups,
                        kinematic: body.is_kinematic(),
                        wake_on_touch: body.flags.contains(BodyFlags::USE_KINEMATIC_DEACTIVATION),
                        unconstrained,
                    },
                );
            }
        }
        Self {
            entries,
            pending: Vec::new(),
        }
    }

    /// Actions recorded during the step, in touch order, deduplicated.
    pub fn take_pending(&mut self) -> Vec<PendingAction> {
        std::mem::take(&mut self.pending)
    }

    fn queue_wake(&mut self, object: ObjectId) {
        let action = PendingAction::WakeKinematicObject(object);
        if !self.pending.contains(&action) {
            debug!("queueing kinematic wake for object {:?}", object);
            self.pending.push(action);
        }
    }
}

impl ContactFilter for SimContactFilter {
    fn check_pair(&mut self, a: BodyKey, b: BodyKey) -> bool {
        let (Some(ea), Some(eb)) = (
            self.entries.get(&a).copied(),
            self.entries.get(&b).copied(),
        ) else {
            return false;
        };
        if !collision_groups_overlap(ea.col_groups, eb.col_groups) {
            return false;
        }

        // a kinematic side that opted into touch deactivation gets its whole
        // object woken. Fractured islands only fire when the touching side
        // opted in too, or when their own shard constraints are switched off;
        // plain kinematic objects flip unconditionally.
        if a.object != b.object {
            for (key, entry, other) in [(a, ea, eb), (b, eb, ea)] {
                if !(entry.kinematic && entry.wake_on_touch) {
                    continue;
                }
                let fires = match key.island {
                    Some(_) => other.wake_on_touch || entry.unconstrained,
                    None => true,
                };
                if fires {
                    self.queue_wake(key.object);
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{BodyType, RigidBody};
    use crate::scene::{FractureState, Island, IslandId, Mesh, SceneObject};
    use glam::Vec3;

    #[test]
    fn group_overlap_is_bitwise_and() {
        assert!(!collision_groups_overlap(1, 2));
        assert!(collision_groups_overlap(3, 2));
        assert!(collision_groups_overlap(1, 1));
        assert!(!collision_groups_overlap(0, u32::MAX));
        // bits above the usable range never collide
        assert!(!collision_groups_overlap(1 << 20, 1 << 20));
    }

    fn fractured_object(kinematic_wake: bool) -> SceneObject {
        let mut island = Island::new(Vec3::ZERO, vec![]);
        island.body.flags |= BodyFlags::KINEMATIC;
        if kinematic_wake {
            island.body.flags |= BodyFlags::USE_KINEMATIC_DEACTIVATION;
        }
        let mut obj = SceneObject::new("wall", Mesh::default());
        obj.fracture = Some(FractureState::new(vec![island]));
        obj
    }

    fn ball_object(opted_in: bool) -> SceneObject {
        let mut island = Island::new(Vec3::ZERO, vec![]);
        island.body = RigidBody::new(BodyType::Active);
        if opted_in {
            island.body.flags |= BodyFlags::USE_KINEMATIC_DEACTIVATION;
        }
        let mut obj = SceneObject::new("ball", Mesh::default());
        obj.fracture = Some(FractureState::new(vec![island]));
        obj
    }

    #[test]
    fn touch_queues_wake_once_per_object() {
        let mut scene = Scene::new();
        let wall = scene.add_object(fractured_object(true));
        let ball = scene.add_object(ball_object(true));

        let wall_key = BodyKey::island(wall, IslandId(0));
        let ball_key = BodyKey::island(ball, IslandId(0));
        let mut filter = SimContactFilter::snapshot(&scene, [&wall_key, &ball_key]);

        assert!(filter.check_pair(wall_key, ball_key));
        assert!(filter.check_pair(ball_key, wall_key));
        // the ball opted in but is not kinematic, so only the wall wakes
        assert_eq!(
            filter.take_pending(),
            vec![PendingAction::WakeKinematicObject(wall)]
        );
        assert!(filter.take_pending().is_empty());
    }

    #[test]
    fn one_sided_opt_in_does_not_wake() {
        let mut scene = Scene::new();
        let wall = scene.add_object(fractured_object(true));
        let ball = scene.add_object(ball_object(false));

        let wall_key = BodyKey::island(wall, IslandId(0));
        let ball_key = BodyKey::island(ball, IslandId(0));
        let mut filter = SimContactFilter::snapshot(&scene, [&wall_key, &ball_key]);

        assert!(filter.check_pair(wall_key, ball_key));
        assert!(filter.take_pending().is_empty());
    }

    #[test]
    fn unconstrained_fracture_wakes_without_mutual_opt_in() {
        let mut scene = Scene::new();
        let mut wall_obj = fractured_object(true);
        wall_obj.fracture.as_mut().expect("fractured").use_constraints = false;
        let wall = scene.add_object(wall_obj);
        let ball = scene.add_object(ball_object(false));

        let wall_key = BodyKey::island(wall, IslandId(0));
        let ball_key = BodyKey::island(ball, IslandId(0));
        let mut filter = SimContactFilter::snapshot(&scene, [&wall_key, &ball_key]);

        assert!(filter.check_pair(wall_key, ball_key));
        assert_eq!(
            filter.take_pending(),
            vec![PendingAction::WakeKinematicObject(wall)]
        );
    }

    #[test]
    fn plain_kinematic_object_wakes_on_touch() {
        let mut scene = Scene::new();
        let mut door = SceneObject::new("door", Mesh::default());
        let mut body = RigidBody::new(BodyType::Active);
        body.flags |= BodyFlags::KINEMATIC | BodyFlags::USE_KINEMATIC_DEACTIVATION;
        door.body = Some(body);
        let door = scene.add_object(door);

        let mut ball = SceneObject::new("ball", Mesh::default());
        ball.body = Some(RigidBody::new(BodyType::Active));
        let ball = scene.add_object(ball);

        let door_key = BodyKey::object(door);
        let ball_key = BodyKey::object(ball);
        let mut filter = SimContactFilter::snapshot(&scene, [&door_key, &ball_key]);

        assert!(filter.check_pair(door_key, ball_key));
        assert_eq!(
            filter.take_pending(),
            vec![PendingAction::WakeKinematicObject(door)]
        );
    }

    #[test]
    fn same_object_islands_never_queue_wake() {
        let mut scene = Scene::new();
        let mut obj = fractured_object(true);
        obj.fracture
            .as_mut()
            .expect("fractured")
            .islands
            .push(Island::new(Vec3::ONE, vec![]));
        let id = scene.add_object(obj);

        let k0 = BodyKey::island(id, IslandId(0));
        let k1 = BodyKey::island(id, IslandId(1));
        let mut filter = SimContactFilter::snapshot(&scene, [&k0, &k1]);
        assert!(filter.check_pair(k0, k1));
        assert!(filter.take_pending().is_empty());
    }

    #[test]
    fn unknown_identities_are_rejected() {
        let mut filter = SimContactFilter::default();
        let a = BodyKey::object(ObjectId(0));
        let b = BodyKey::object(ObjectId(1));
        assert!(!filter.check_pair(a, b));
    }
}
