use std::hash::Hasher;

use bevy::math::Vec3;

/// FNV-1a 64-bit hasher with a fixed basis, so digests of the simulation
/// state are stable across runs and platforms.
#[derive(Debug, Clone)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }

    /// Feeds the exact bit patterns of the components.
    pub fn write_vec3(&mut self, value: Vec3) {
        for component in value.to_array() {
            self.write_u32(component.to_bits());
        }
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }

    fn write_u32(&mut self, value: u32) {
        self.write(&value.to_le_bytes());
    }

    fn write_u64(&mut self, value: u64) {
        self.write(&value.to_le_bytes());
    }
}
