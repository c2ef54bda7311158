use bevy::prelude::*;
use bitflags::bitflags;

use crate::components::TeamId;

/// Number of completed simulation ticks.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub u64);

bitflags! {
    /// Gameplay system sets that may run each tick. `ALWAYS_ON` bypasses
    /// every individual check.
    #[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SimulationCapabilities: u32 {
        const ALWAYS_ON = 1 << 0;
        const TEAM_AI = 1 << 1;
        const COMBAT = 1 << 2;
        const CAPTURE = 1 << 3;
        const CONSTRUCTION = 1 << 4;
        const PRODUCTION = 1 << 5;
        const TRADE = 1 << 6;
    }
}

impl Default for SimulationCapabilities {
    fn default() -> Self {
        Self::ALWAYS_ON
    }
}

/// Run condition for systems gated behind `flag`.
pub fn capability_enabled(
    flag: SimulationCapabilities,
) -> impl Fn(Res<SimulationCapabilities>) -> bool + Clone {
    move |capabilities: Res<SimulationCapabilities>| {
        capabilities.intersects(flag | SimulationCapabilities::ALWAYS_ON)
    }
}

#[derive(Debug, Clone)]
pub struct TeamEntry {
    pub id: TeamId,
    pub name: String,
    pub manager: Entity,
}

/// Every empire created at world generation, indexed by team id. Entries
/// outlive defeat; check `is_alive` for current status.
#[derive(Resource, Debug, Clone, Default)]
pub struct TeamRoster {
    teams: Vec<TeamEntry>,
    alive: Vec<bool>,
}

impl TeamRoster {
    pub fn register(&mut self, name: impl Into<String>, manager: Entity) -> TeamId {
        let id = TeamId(self.teams.len() as u8);
        self.teams.push(TeamEntry {
            id,
            name: name.into(),
            manager,
        });
        self.alive.push(true);
        id
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }

    pub fn entries(&self) -> &[TeamEntry] {
        &self.teams
    }

    pub fn get(&self, id: TeamId) -> Option<&TeamEntry> {
        self.teams.get(id.index())
    }

    pub fn is_alive(&self, id: TeamId) -> bool {
        self.alive.get(id.index()).copied().unwrap_or(false)
    }

    pub fn mark_defeated(&mut self, id: TeamId) {
        if let Some(alive) = self.alive.get_mut(id.index()) {
            *alive = false;
        }
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|alive| **alive).count()
    }
}

/// Live ship totals refreshed once per tick, used by factories to honor the
/// global and per-team caps.
#[derive(Resource, Debug, Clone, Default)]
pub struct ShipCensus {
    pub total: u32,
    pub per_team: Vec<u32>,
}

impl ShipCensus {
    pub fn team_total(&self, id: TeamId) -> u32 {
        self.per_team.get(id.index()).copied().unwrap_or(0)
    }

    pub fn record_spawn(&mut self, id: TeamId) {
        self.total += 1;
        if self.per_team.len() <= id.index() {
            self.per_team.resize(id.index() + 1, 0);
        }
        self.per_team[id.index()] += 1;
    }
}
