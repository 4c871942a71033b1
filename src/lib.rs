//! Incremental rigid-body simulation bridge.
//!
//! Keeps an external physics engine synchronized with a host application's
//! scene graph: whole objects and fractured-object shards become engine
//! bodies, auto-generated shard constraints hold fragments together until
//! they break, and simulated transforms flow back into the authoring data
//! frame by frame.
//!
//! The crate is organized around the per-frame pipeline:
//! - [`world`]: the simulation context, engine world handle and the flat
//!   body index maps
//! - [`validate`]: incremental body/constraint rebuild driven by dirty flags
//! - [`shape`]: collision shape construction from mesh bounds
//! - [`filter`]: collision-group filtering and deferred kinematic wake-ups
//! - [`breaking`]: per-step constraint breaking criteria
//! - [`sync`]: two-way transform synchronization
//! - [`cache`]: frame-indexed pose cache for playback and scrubbing
//! - [`stepper`]: the per-frame orchestration entry point
//!
//! Hosts drive everything through [`stepper::step_frame`] with an explicit
//! [`world::RigidBodyWorld`] context; there is no global state.

pub mod backend;
pub mod body;
pub mod breaking;
pub mod cache;
pub mod constraint;
pub mod error;
pub mod filter;
pub mod scene;
pub mod shape;
pub mod stepper;
pub mod sync;
pub mod validate;
pub mod world;

pub use backend::{MockBackend, PhysicsBackend};
pub use body::{BodyFlags, BodyType, CollisionShape, RigidBody};
pub use cache::{CacheFlags, PointCache};
pub use constraint::{ConstraintFlags, ConstraintKey, ConstraintType, RigidBodyConstraint};
pub use error::{SimError, SimResult};
pub use scene::{
    BodyKey, FractureSettings, FractureState, Island, IslandId, Mesh, ObjectId, Scene, SceneObject,
};
pub use stepper::{step_frame, update_simulation};
pub use world::{RigidBodyWorld, WorldSettings};
