//! Weighted motion selection and tap-area resolution.

use rand::Rng;
use shared::domain::{HitAreaName, MotionName, MotionWeightMap, TapMotionMap};

/// Draws one motion from `group` proportionally to each entry's weight:
/// a uniform value in `[0, total)` is reduced by each weight in
/// iteration order and the first entry driving the remainder to or below
/// zero wins. `None` when the group is empty or its total weight is not
/// positive.
pub fn pick_weighted<R: Rng + ?Sized>(rng: &mut R, group: &MotionWeightMap) -> Option<MotionName> {
    let total: f32 = group.values().sum();
    if group.is_empty() || total <= 0.0 {
        return None;
    }
    let mut remainder = rng.gen_range(0.0..total);
    for (name, weight) in group {
        remainder -= weight;
        if remainder <= 0.0 {
            return Some(name.clone());
        }
    }
    // Float rounding can leave a sliver after the last entry.
    group.keys().next_back().cloned()
}

/// Resolves a tap into a motion. The first hit area (in hit-test order)
/// with a configured group wins; a tap outside every configured area
/// falls back to the merged group so models without a catch-all area
/// still react. `None` when `tap_motions` is empty.
pub fn resolve_tap_motion<R: Rng + ?Sized>(
    rng: &mut R,
    tap_motions: &TapMotionMap,
    hit_areas: &[HitAreaName],
) -> Option<MotionName> {
    for area in hit_areas {
        if let Some(group) = tap_motions.get(area) {
            return pick_weighted(rng, group);
        }
    }
    if tap_motions.is_empty() {
        return None;
    }
    pick_weighted(rng, &merged_fallback_group(tap_motions))
}

/// Every motion's weight averaged across all groups; a group that does
/// not contain the motion contributes zero to its average.
fn merged_fallback_group(tap_motions: &TapMotionMap) -> MotionWeightMap {
    let group_count = tap_motions.len() as f32;
    let mut merged = MotionWeightMap::new();
    for group in tap_motions.values() {
        for (name, weight) in group {
            *merged.entry(name.clone()).or_insert(0.0) += weight;
        }
    }
    for weight in merged.values_mut() {
        *weight /= group_count;
    }
    merged
}
