//! Seeded register-file randomization.

use crate::core::machine::{Arch, MachineState};

/// SplitMix64 generator. Deterministic per seed.
#[derive(Debug, Clone)]
pub struct SplitMix64(u64);

impl SplitMix64 {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self.0.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    pub fn fill(&mut self, bytes: &mut [u8]) {
        for chunk in bytes.chunks_mut(8) {
            let word = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}

/// Register file with every field of `arch`'s schema randomized.
pub fn random_state(arch: Arch, seed: u64) -> MachineState {
    let mut rng = SplitMix64::new(seed);
    let mut state = MachineState::zeroed();
    for field in arch.schema() {
        state.set_word(field.loc, rng.next_u64());
    }
    for slot in state.simd.iter_mut() {
        rng.fill(&mut slot[..arch.simd_bytes()]);
    }
    state
}
