//! Constraint breaking evaluation.
//!
//! Runs once per simulated step, per fractured member object. Three
//! independent criteria can disable a shard constraint: the engine itself
//! (impulse exceeded the breaking threshold mid-step), deviation of the
//! endpoints' relative distance or rotation from the baseline captured at
//! validation, and the percentage cascade that dooms an island's remaining
//! joints once enough of them are gone. Disabled constraints keep their
//! engine handle as an inert record; only a from-scratch restart re-enables
//! them.

use log::debug;
use rustc_hash::FxHashSet;

use crate::backend::ConstraintHandle;
use crate::constraint::{calc_dist_angle, ConstraintFlags};
use crate::error::SimResult;
use crate::scene::{BodyKey, ObjectId, Scene};
use crate::world::RigidBodyWorld;

#[derive(Debug, Clone, Copy)]
struct ConState {
    handle: Option<ConstraintHandle>,
    enabled: bool,
    use_breaking: bool,
    pair_mass: f32,
    min_weight: f32,
    dist_dev: f32,
    angle_dev: f32,
}

/// Threshold weight of a constraint endpoint. Whole-object endpoints carry
/// no weight.
fn thresh_weight(scene: &Scene, key: BodyKey) -> f32 {
    let Some(island) = key.island else {
        return 0.0;
    };
    scene
        .objects
        .get(key.object.0 as usize)
        .and_then(|o| o.fracture.as_ref())
        .and_then(|f| f.islands.get(island.0 as usize))
        .map(|i| i.thresh_weight)
        .unwrap_or(0.0)
}

fn gather(scene: &Scene, world: &RigidBodyWorld, object: ObjectId) -> Option<Vec<ConState>> {
    let obj = scene.object(object).ok()?;
    let fracture = obj.active_fracture()?;
    if !fracture.use_constraints || fracture.constraints.is_empty() {
        return None;
    }

    let states = fracture
        .constraints
        .iter()
        .map(|con| {
            let b1 = scene.body(con.body1);
            let b2 = scene.body(con.body2);
            let pair_mass =
                b1.map(|b| b.mass).unwrap_or(0.0) + b2.map(|b| b.mass).unwrap_or(0.0);
            let (dist, angle) = calc_dist_angle(b1, b2);
            // a constraint the engine broke mid-step counts as disabled even
            // before its flag is synced
            let enabled = con.is_enabled()
                && con
                    .handle
                    .map(|h| world.backend().constraint_is_enabled(h))
                    .unwrap_or(true);
            ConState {
                handle: con.handle,
                enabled,
                use_breaking: con.flags.contains(ConstraintFlags::USE_BREAKING),
                pair_mass,
                min_weight: thresh_weight(scene, con.body1)
                    .min(thresh_weight(scene, con.body2)),
                dist_dev: (con.start_dist - dist).abs(),
                angle_dev: (con.start_angle - angle).abs(),
            }
        })
        .collect();
    Some(states)
}

/// Mass-dependent threshold for one constrained pair: scales the base
/// threshold by the pair's share of the heaviest constrained pair.
pub fn mass_dependent_threshold(pair_mass: f32, max_pair_mass: f32, base: f32) -> f32 {
    if max_pair_mass > 0.0 {
        (pair_mass / max_pair_mass) * base
    } else {
        base
    }
}

/// Evaluate breaking criteria for every fractured member of the world.
pub fn update_breaking(scene: &mut Scene, world: &mut RigidBodyWorld) -> SimResult<()> {
    for id in world.members.clone() {
        break_object_constraints(scene, world, id)?;
    }
    Ok(())
}

fn break_object_constraints(
    scene: &mut Scene,
    world: &mut RigidBodyWorld,
    object: ObjectId,
) -> SimResult<()> {
    let Some(states) = gather(scene, world, object) else {
        return Ok(());
    };
    let settings = {
        let obj = scene.object(object)?;
        match obj.active_fracture() {
            Some(fracture) => fracture.settings.clone(),
            None => return Ok(()),
        }
    };

    let mut thresholds: Vec<Option<f32>> = vec![None; states.len()];
    if settings.use_mass_dependent_thresholds {
        let max_pair_mass = states.iter().map(|s| s.pair_mass).fold(0.0, f32::max);
        for (i, state) in states.iter().enumerate() {
            thresholds[i] = Some(mass_dependent_threshold(
                state.pair_mass,
                max_pair_mass,
                settings.breaking_threshold,
            ));
        }
    }

    let mut to_disable: FxHashSet<usize> = FxHashSet::default();

    // engine-side breaks get their flag synced through the same path
    for (i, state) in states.iter().enumerate() {
        if state.handle.is_some() && !state.enabled {
            to_disable.insert(i);
        }
    }

    // angle/distance deviation from the validation baseline; the checks are
    // independent, either alone breaks the joint
    for (i, state) in states.iter().enumerate() {
        if !state.enabled || state.handle.is_none() {
            continue;
        }
        if settings.breaking_angle > 0.0 {
            let limit = weighted(
                settings.breaking_angle,
                settings.breaking_angle_weighted,
                state.min_weight,
            );
            if state.angle_dev > limit {
                to_disable.insert(i);
            }
        }
        if settings.breaking_distance > 0.0 {
            let limit = weighted(
                settings.breaking_distance,
                settings.breaking_distance_weighted,
                state.min_weight,
            );
            if state.dist_dev > limit {
                to_disable.insert(i);
            }
        }
    }

    // percentage cascade, evaluated against this pass's disables too
    if settings.breaking_percentage > 0 {
        let obj = scene.object(object)?;
        if let Some(fracture) = obj.active_fracture() {
            for island in &fracture.islands {
                let parts = &island.participating_constraints;
                if parts.is_empty() {
                    continue;
                }
                let pct = if settings.breaking_percentage_weighted && island.thresh_weight > 0.0 {
                    settings.breaking_percentage as f32 * island.thresh_weight
                } else {
                    settings.breaking_percentage as f32
                };
                let broken = parts
                    .iter()
                    .filter(|ci| {
                        states.get(**ci).map(|s| !s.enabled).unwrap_or(false)
                            || to_disable.contains(*ci)
                    })
                    .count();
                if (broken as f32 / parts.len() as f32) * 100.0 >= pct {
                    to_disable.extend(parts.iter().copied());
                }
            }
        }
    }

    // apply
    let backend = world.backend_mut();
    let obj = scene.object_mut(object)?;
    let Some(fracture) = obj.active_fracture_mut() else {
        return Ok(());
    };

    for (i, threshold) in thresholds.iter().enumerate() {
        let (Some(threshold), Some(con)) = (threshold, fracture.constraints.get_mut(i)) else {
            continue;
        };
        con.breaking_threshold = *threshold;
        if let Some(handle) = con.handle {
            let effective = if states[i].use_breaking {
                *threshold
            } else {
                f32::MAX
            };
            backend.constraint_set_breaking_threshold(handle, effective);
        }
    }

    if !to_disable.is_empty() {
        debug!(
            "breaking {} constraints on object {:?}",
            to_disable.len(),
            object
        );
    }
    for i in to_disable {
        let Some(con) = fracture.constraints.get_mut(i) else {
            continue;
        };
        if let Some(handle) = con.handle {
            backend.constraint_set_enabled(handle, false);
        }
        con.flags.remove(ConstraintFlags::ENABLED);
        con.flags.insert(ConstraintFlags::NEEDS_VALIDATE);
    }
    Ok(())
}

/// Weighted limits multiply by the endpoint weight unconditionally: a zero
/// weight collapses the limit, so the joint breaks on any deviation.
fn weighted(base: f32, use_weight: bool, weight: f32) -> f32 {
    if use_weight {
        base * weight
    } else {
        base
    }
}
