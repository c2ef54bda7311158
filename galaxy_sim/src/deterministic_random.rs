use bevy::prelude::Entity;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Portable seeded stream used everywhere the simulation needs randomness.
pub type GameRng = ChaCha8Rng;

/// Maps any `i32` onto a seed value, folding non-positive inputs above
/// `i32::MAX` so that `0` and negative values still produce distinct seeds.
pub fn unique_seed_from_i32(value: i32) -> u32 {
    if value <= 0 {
        (i32::MAX as u32).wrapping_add(value as u32)
    } else {
        value as u32
    }
}

/// Stream seeded from the wrapping sum of [`unique_seed_from_i32`] over `values`.
pub fn deterministic_rng(values: &[i32]) -> GameRng {
    let seed = values
        .iter()
        .fold(0u32, |acc, &value| acc.wrapping_add(unique_seed_from_i32(value)));
    GameRng::seed_from_u64(u64::from(seed))
}

pub fn entity_seed(entity: Entity) -> i32 {
    entity.index() as i32
}

/// Uniform draw in `[min, max)`; degenerate ranges return `min`.
pub fn next_f32<R: Rng + ?Sized>(rng: &mut R, min: f32, max: f32) -> f32 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}

/// Uniform draw in `[min, max)`; degenerate ranges return `min`.
pub fn next_i32<R: Rng + ?Sized>(rng: &mut R, min: i32, max: i32) -> i32 {
    if max > min {
        rng.gen_range(min..max)
    } else {
        min
    }
}
