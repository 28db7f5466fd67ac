//! Organism state.

/// An organism occupying one slot of the grid.
///
/// Existence is the occupancy of the slot itself; the per-tick bookkeeping
/// (targets, replication readiness) lives in the engine's scratch buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Organism {
    pub energy: u32,
    /// Tick during which the organism was created
    pub birthday: u64,
    pub kills: u32,
}

impl Organism {
    pub fn new(energy: u32, birthday: u64) -> Self {
        Self {
            energy,
            birthday,
            kills: 0,
        }
    }

    pub fn is_starved(&self) -> bool {
        self.energy == 0
    }

    pub fn add_energy(&mut self, amount: u32) {
        self.energy = self.energy.saturating_add(amount);
    }

    /// Pay `amount`, flooring at zero. Returns false when the organism could
    /// not pay in full.
    pub fn consume_energy(&mut self, amount: u32) -> bool {
        if self.energy >= amount {
            self.energy -= amount;
            true
        } else {
            self.energy = 0;
            false
        }
    }

    pub fn clamp_energy(&mut self, maximum: u32) {
        self.energy = self.energy.min(maximum);
    }

    pub fn record_kill(&mut self) {
        self.kills = self.kills.saturating_add(1);
    }
}
