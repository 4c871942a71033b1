//! Physics world ownership and the flat body index space.
//!
//! `RigidBodyWorld` owns the engine world handle, the dense member-object
//! list, and the keyed index maps linearizing (object, island) pairs into the
//! flat per-body index space the engine's user data refers to. Structural
//! changes (member added or removed, island count changed) are detected by
//! body-count mismatch and repaired by rebuilding the maps wholesale, never
//! by patching.

use glam::Vec3;
use log::{debug, info};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::backend::{PhysicsBackend, WorldHandle};
use crate::cache::PointCache;
use crate::error::{SimError, SimResult};
use crate::filter::PendingAction;
use crate::scene::{BodyKey, EffectorWeights, ObjectId, Scene};

/// World-level simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSettings {
    pub num_solver_iterations: i32,
    pub use_split_impulse: bool,
    /// Fixed internal step rate of the engine
    pub steps_per_second: i32,
    /// Playback speed multiplier applied to the frame timestep
    pub time_scale: f32,
    pub effector_weights: EffectorWeights,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            num_solver_iterations: 10,
            use_split_impulse: false,
            steps_per_second: 60,
            time_scale: 1.0,
            effector_weights: EffectorWeights::default(),
        }
    }
}

/// The simulation context threaded through every bridge operation.
pub struct RigidBodyWorld {
    backend: Box<dyn PhysicsBackend>,
    pub handle: Option<WorldHandle>,
    /// Participating objects, in group order
    pub members: Vec<ObjectId>,
    /// Flat index -> body key
    index_map: Vec<BodyKey>,
    /// Flat index -> owning object's slot in `members`
    offset_map: Vec<usize>,
    /// Body key -> flat index
    key_index: FxHashMap<BodyKey, usize>,
    /// Body count the maps were built for
    pub num_bodies: usize,
    pub settings: WorldSettings,
    pub cache: PointCache,
    /// Actions recorded by the collision filter, drained once per
    /// validation pass
    pub pending_actions: Vec<PendingAction>,
    /// Force-re-enable broken constraints on the next validation pass
    pub rebuild_comp_con: bool,
    /// Muted worlds never step; playback falls back to cached frames
    pub muted: bool,
    /// Last frame actually simulated
    pub last_time: i32,
}

impl RigidBodyWorld {
    pub fn new(backend: Box<dyn PhysicsBackend>, frame_start: i32, frame_end: i32) -> Self {
        Self {
            backend,
            handle: None,
            members: Vec::new(),
            index_map: Vec::new(),
            offset_map: Vec::new(),
            key_index: FxHashMap::default(),
            num_bodies: 0,
            settings: WorldSettings::default(),
            cache: PointCache::new(frame_start, frame_end),
            pending_actions: Vec::new(),
            rebuild_comp_con: false,
            muted: false,
            last_time: frame_start,
        }
    }

    pub fn backend_mut(&mut self) -> &mut dyn PhysicsBackend {
        &mut *self.backend
    }

    pub fn backend(&self) -> &dyn PhysicsBackend {
        &*self.backend
    }

    /// Add an object to the simulation group. The index maps are stale until
    /// the next validation pass rebuilds them.
    pub fn add_member(&mut self, object: ObjectId) {
        if !self.members.contains(&object) {
            self.members.push(object);
            self.cache.reset();
        }
    }

    /// Remove an object from the simulation group, freeing every engine
    /// handle it owns.
    pub fn remove_member(&mut self, scene: &mut Scene, object: ObjectId) -> SimResult<()> {
        let Some(slot) = self.members.iter().position(|m| *m == object) else {
            return Ok(());
        };
        self.members.remove(slot);
        self.free_object_handles(scene, object)?;
        self.cache.reset();
        Ok(())
    }

    fn free_object_handles(&mut self, scene: &mut Scene, object: ObjectId) -> SimResult<()> {
        let obj = scene.object_mut(object)?;
        if let Some(fracture) = obj.fracture.as_mut() {
            for con in &mut fracture.constraints {
                if let Some(handle) = con.handle.take() {
                    if let Some(world) = self.handle {
                        self.backend.world_remove_constraint(world, handle);
                    }
                    self.backend.constraint_delete(handle);
                }
            }
            for island in &mut fracture.islands {
                if let Some(handle) = island.body.handle.take() {
                    if let Some(world) = self.handle {
                        self.backend.world_remove_body(world, handle);
                    }
                    self.backend.body_delete(handle);
                }
                if let Some(shape) = island.body.shape_handle.take() {
                    self.backend.shape_delete(shape);
                }
            }
        }
        if let Some(con) = obj.constraint.as_mut() {
            if let Some(handle) = con.handle.take() {
                if let Some(world) = self.handle {
                    self.backend.world_remove_constraint(world, handle);
                }
                self.backend.constraint_delete(handle);
            }
        }
        if let Some(body) = obj.body.as_mut() {
            if let Some(handle) = body.handle.take() {
                if let Some(world) = self.handle {
                    self.backend.world_remove_body(world, handle);
                }
                self.backend.body_delete(handle);
            }
            if let Some(shape) = body.shape_handle.take() {
                self.backend.shape_delete(shape);
            }
        }
        Ok(())
    }

    /// Body count the scene implies: one per unfractured member with body
    /// settings, one per island otherwise. Bodyless members (constraint
    /// holders) occupy no slot.
    pub fn expected_body_count(&self, scene: &Scene) -> usize {
        self.members
            .iter()
            .filter_map(|id| scene.object(*id).ok())
            .map(|obj| match obj.active_fracture() {
                Some(fracture) => fracture.islands.len(),
                None => usize::from(obj.body.is_some()),
            })
            .sum()
    }

    /// True when a structural change invalidated the index maps.
    pub fn index_maps_stale(&self, scene: &Scene) -> bool {
        self.expected_body_count(scene) != self.num_bodies
    }

    /// Rebuild the flat index maps wholesale, assigning each island its slot
    /// in the flat index space.
    pub fn rebuild_index_maps(&mut self, scene: &mut Scene) -> SimResult<()> {
        self.index_map.clear();
        self.offset_map.clear();
        self.key_index.clear();

        for (slot, id) in self.members.clone().into_iter().enumerate() {
            let obj = scene.object_mut(id)?;
            match obj.active_fracture_mut() {
                Some(fracture) => {
                    for (i, island) in fracture.islands.iter_mut().enumerate() {
                        let key = BodyKey::island(id, crate::scene::IslandId(i as u32));
                        island.linear_index = self.index_map.len();
                        self.key_index.insert(key, self.index_map.len());
                        self.index_map.push(key);
                        self.offset_map.push(slot);
                    }
                }
                None => {
                    if obj.body.is_none() {
                        continue;
                    }
                    let key = BodyKey::object(id);
                    self.key_index.insert(key, self.index_map.len());
                    self.index_map.push(key);
                    self.offset_map.push(slot);
                }
            }
        }
        self.num_bodies = self.index_map.len();
        debug!("index maps rebuilt, {} bodies", self.num_bodies);
        Ok(())
    }

    pub fn body_key_at(&self, index: usize) -> SimResult<BodyKey> {
        self.index_map
            .get(index)
            .copied()
            .ok_or(SimError::StaleIndex(index))
    }

    pub fn linear_index_of(&self, key: BodyKey) -> Option<usize> {
        self.key_index.get(&key).copied()
    }

    /// Slot of the owning object in `members` for a flat index.
    pub fn owner_slot_of(&self, index: usize) -> SimResult<usize> {
        self.offset_map
            .get(index)
            .copied()
            .ok_or(SimError::StaleIndex(index))
    }

    /// All body keys currently in the flat index space, in index order.
    pub fn body_keys(&self) -> &[BodyKey] {
        &self.index_map
    }

    /// Create the engine world if absent or `rebuild`, and reapply the cheap
    /// world settings unconditionally.
    pub fn validate_world(&mut self, scene: &Scene, rebuild: bool) {
        let gravity = self.effective_gravity(scene);
        if rebuild {
            if let Some(old) = self.handle.take() {
                self.backend.world_delete(old);
            }
        }
        if self.handle.is_none() {
            info!("creating physics world");
            self.handle = Some(self.backend.world_new(gravity));
        }
        if let Some(world) = self.handle {
            self.backend
                .world_set_solver_iterations(world, self.settings.num_solver_iterations);
            self.backend
                .world_set_split_impulse(world, self.settings.use_split_impulse);
        }
    }

    /// Scene gravity scaled by the world's effector weights.
    pub fn effective_gravity(&self, scene: &Scene) -> Vec3 {
        scene.effective_gravity(&self.settings.effector_weights)
    }

    /// Tear down every engine handle owned through this world.
    pub fn free(&mut self, scene: &mut Scene) -> SimResult<()> {
        for id in self.members.clone() {
            self.free_object_handles(scene, id)?;
        }
        if let Some(world) = self.handle.take() {
            self.backend.world_delete(world);
        }
        self.num_bodies = 0;
        self.index_map.clear();
        self.offset_map.clear();
        self.key_index.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::body::{BodyType, RigidBody};
    use crate::scene::{FractureState, Island, IslandId, Mesh, SceneObject};

    fn world_for(frame_end: i32) -> RigidBodyWorld {
        RigidBodyWorld::new(Box::new(MockBackend::new()), 1, frame_end)
    }

    fn plain_object(name: &str) -> SceneObject {
        let mut obj = SceneObject::new(name, Mesh::default());
        obj.body = Some(RigidBody::new(BodyType::Active));
        obj
    }

    fn fractured_object(name: &str, islands: usize) -> SceneObject {
        let mut obj = SceneObject::new(name, Mesh::default());
        obj.fracture = Some(FractureState::new(
            (0..islands)
                .map(|_| Island::new(Vec3::ZERO, vec![]))
                .collect(),
        ));
        obj
    }

    #[test]
    fn index_maps_linearize_islands_in_member_order() {
        let mut scene = Scene::new();
        let a = scene.add_object(plain_object("a"));
        let b = scene.add_object(fractured_object("b", 3));

        let mut world = world_for(250);
        world.add_member(a);
        world.add_member(b);
        assert!(world.index_maps_stale(&scene));

        world.rebuild_index_maps(&mut scene).expect("members exist");
        assert_eq!(world.num_bodies, 4);
        assert!(!world.index_maps_stale(&scene));

        assert_eq!(world.body_key_at(0).unwrap(), BodyKey::object(a));
        assert_eq!(
            world.body_key_at(2).unwrap(),
            BodyKey::island(b, IslandId(1))
        );
        assert_eq!(world.owner_slot_of(0).unwrap(), 0);
        assert_eq!(world.owner_slot_of(3).unwrap(), 1);

        let fracture = scene.objects[b.0 as usize].fracture.as_ref().unwrap();
        assert_eq!(fracture.islands[2].linear_index, 3);
        assert_eq!(
            world.linear_index_of(BodyKey::island(b, IslandId(2))),
            Some(3)
        );
    }

    #[test]
    fn island_count_change_marks_maps_stale() {
        let mut scene = Scene::new();
        let b = scene.add_object(fractured_object("b", 2));
        let mut world = world_for(250);
        world.add_member(b);
        world.rebuild_index_maps(&mut scene).unwrap();
        assert!(!world.index_maps_stale(&scene));

        scene.objects[b.0 as usize]
            .fracture
            .as_mut()
            .unwrap()
            .islands
            .push(Island::new(Vec3::ONE, vec![]));
        assert!(world.index_maps_stale(&scene));
    }

    #[test]
    fn validate_world_keeps_handle_without_rebuild() {
        let scene = Scene::new();
        let mut world = world_for(250);
        world.validate_world(&scene, false);
        let first = world.handle.expect("world created");

        world.validate_world(&scene, false);
        assert_eq!(world.handle, Some(first));

        world.validate_world(&scene, true);
        assert_ne!(world.handle, Some(first));
    }

    #[test]
    fn remove_member_frees_engine_handles() {
        let mut scene = Scene::new();
        let a = scene.add_object(plain_object("a"));
        let mut world = world_for(250);
        world.validate_world(&scene, false);
        world.add_member(a);

        // give the object a live body handle
        let world_handle = world.handle.unwrap();
        let shape = world
            .backend_mut()
            .shape_new(crate::backend::ShapeDesc::Box {
                half_extents: Vec3::ONE,
            })
            .unwrap();
        let handle = world
            .backend_mut()
            .body_new(shape, Vec3::ZERO, glam::Quat::IDENTITY);
        world
            .backend_mut()
            .world_add_body(world_handle, handle, 1, BodyKey::object(a));
        {
            let body = scene.objects[0].body.as_mut().unwrap();
            body.handle = Some(handle);
            body.shape_handle = Some(shape);
        }

        world.remove_member(&mut scene, a).unwrap();
        assert!(scene.objects[0].body.as_ref().unwrap().handle.is_none());
        assert!(world.members.is_empty());
    }
}
