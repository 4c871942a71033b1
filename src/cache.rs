//! In-memory point cache for simulated body poses.
//!
//! The stepper treats this like an opaque frame store: has frame N been
//! recorded, read it, write it. A cache hit replays recorded poses instead of
//! stepping the engine, which is what makes timeline scrubbing backwards (or
//! replaying a baked range) possible at all.

use bitflags::bitflags;
use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;

use crate::scene::BodyKey;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheFlags: u32 {
        /// Recorded frames no longer match the scene; resimulate from start
        const OUTDATED = 1 << 0;
        /// Frozen by an explicit bake; the stepper must never step past it
        const BAKED = 1 << 1;
        /// A bake exists but the scene changed underneath it
        const REDO_NEEDED = 1 << 2;
    }
}

/// Pose of one body at one frame.
#[derive(Debug, Clone, Copy)]
pub struct BodyPose {
    pub key: BodyKey,
    pub position: Vec3,
    pub orientation: Quat,
}

/// All body poses recorded for one frame.
#[derive(Debug, Clone, Default)]
pub struct CachedFrame {
    pub poses: Vec<BodyPose>,
}

/// Frame-indexed pose store with a validity watermark.
#[derive(Debug)]
pub struct PointCache {
    pub flags: CacheFlags,
    pub frame_start: i32,
    pub frame_end: i32,
    /// Highest frame known to hold exact simulated data
    pub last_exact: i32,
    frames: FxHashMap<i32, CachedFrame>,
}

impl PointCache {
    pub fn new(frame_start: i32, frame_end: i32) -> Self {
        Self {
            flags: CacheFlags::empty(),
            frame_start,
            frame_end,
            last_exact: frame_start,
            frames: FxHashMap::default(),
        }
    }

    /// Clamp a requested frame into the cached range.
    pub fn clamp_frame(&self, frame: i32) -> i32 {
        frame.clamp(self.frame_start, self.frame_end)
    }

    pub fn is_baked(&self) -> bool {
        self.flags.contains(CacheFlags::BAKED)
    }

    /// Recorded poses for `frame`, if any.
    pub fn read(&self, frame: i32) -> Option<&CachedFrame> {
        self.frames.get(&frame)
    }

    /// Record `poses` as the exact result for `frame`, replacing any previous
    /// recording.
    pub fn write(&mut self, frame: i32, poses: Vec<BodyPose>) {
        self.frames.insert(frame, CachedFrame { poses });
    }

    /// Advance the validity watermark after `frame` was simulated or replayed.
    pub fn validate(&mut self, frame: i32) {
        if frame > self.last_exact {
            self.last_exact = frame;
        }
        self.flags.remove(CacheFlags::OUTDATED);
    }

    /// Drop all recorded frames and rewind the watermark. Baked caches are
    /// only marked for redo; their frames survive until the user rebakes.
    pub fn reset(&mut self) {
        if self.is_baked() {
            self.flags.insert(CacheFlags::REDO_NEEDED);
        } else {
            self.frames.clear();
            self.last_exact = self.frame_start;
        }
        self.flags.insert(CacheFlags::OUTDATED);
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ObjectId;

    fn pose(frame: i32) -> Vec<BodyPose> {
        vec![BodyPose {
            key: BodyKey::object(ObjectId(0)),
            position: Vec3::new(0.0, 0.0, frame as f32),
            orientation: Quat::IDENTITY,
        }]
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut cache = PointCache::new(1, 250);
        assert!(cache.read(5).is_none());
        cache.write(5, pose(5));
        let frame = cache.read(5).expect("frame recorded");
        assert_eq!(frame.poses[0].position.z, 5.0);
    }

    #[test]
    fn reset_clears_frames_unless_baked() {
        let mut cache = PointCache::new(1, 250);
        cache.write(3, pose(3));
        cache.validate(3);
        cache.reset();
        assert_eq!(cache.frame_count(), 0);
        assert_eq!(cache.last_exact, 1);
        assert!(cache.flags.contains(CacheFlags::OUTDATED));

        let mut baked = PointCache::new(1, 250);
        baked.write(3, pose(3));
        baked.flags.insert(CacheFlags::BAKED);
        baked.reset();
        assert_eq!(baked.frame_count(), 1);
        assert!(baked.flags.contains(CacheFlags::REDO_NEEDED));
    }
}
