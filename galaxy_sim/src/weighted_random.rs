use bevy::math::Vec3;
use rand::Rng;

/// Picks an index with probability proportional to its weight.
///
/// `total_weight` is the caller's precomputed sum of `weights`. Returns `None`
/// when the total is not a positive finite number, or when the draw falls past
/// the cumulative sum (possible if the caller's total overstates the weights).
pub fn weighted_random_index<R: Rng + ?Sized>(
    total_weight: f32,
    weights: &[f32],
    rng: &mut R,
) -> Option<usize> {
    if !(total_weight > 0.0 && total_weight.is_finite()) {
        return None;
    }

    let decision = rng.gen_range(0.0..total_weight);
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += weight;
        if decision < cumulative {
            return Some(index);
        }
    }
    None
}

/// Two-stage pick over three-channel weights: first an entry by the sum of its
/// channels, then a channel within that entry.
pub fn weighted_random_index_vec3<R: Rng + ?Sized>(
    total_weight: Vec3,
    weights: &[Vec3],
    rng: &mut R,
) -> Option<(usize, usize)> {
    let total = total_weight.x + total_weight.y + total_weight.z;
    if !(total > 0.0 && total.is_finite()) {
        return None;
    }

    let decision = rng.gen_range(0.0..total);
    let mut cumulative = 0.0;
    for (index, weight) in weights.iter().enumerate() {
        let entry_total = weight.x + weight.y + weight.z;
        cumulative += entry_total;
        if decision < cumulative {
            let channel_decision = if entry_total > 0.0 {
                rng.gen_range(0.0..entry_total)
            } else {
                0.0
            };
            let channel = if channel_decision < weight.x {
                0
            } else if channel_decision < weight.x + weight.y {
                1
            } else {
                2
            };
            return Some((index, channel));
        }
    }
    None
}
