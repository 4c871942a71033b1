//! Error handling for the simulation bridge.
//!
//! Almost everything in this crate recovers locally: missing prerequisites
//! no-op, degenerate shapes fall back to a box, stale index maps force a
//! rebuild. `SimError` covers the remaining cases where the caller handed us
//! inconsistent data and silently continuing would hide a real bug.

use crate::scene::ObjectId;

/// Crate-wide result type
pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Unknown object: {0:?}")]
    UnknownObject(ObjectId),

    #[error("Cache frame {frame} carries {got} poses, world has {expected} bodies")]
    CachePoseCount {
        frame: i32,
        got: usize,
        expected: usize,
    },

    #[error("Flat body index {0} is out of range, index maps are stale")]
    StaleIndex(usize),
}
