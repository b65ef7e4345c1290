use crate::global::UnitId;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Named subgroup of units with collective operations.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TeamId(pub u32);

impl TeamId {
    /// The implicit team containing every unit; team-local and global IDs
    /// coincide.
    pub const ALL: TeamId = TeamId(0);
}

/// Identity of a unit within a team.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct TeamUnitId(pub u32);

/// A team and its member table, in team-local order.
#[derive(Clone, Debug)]
pub struct Team {
    id: TeamId,
    members: Vec<UnitId>,
}

impl Team {
    pub fn new(id: TeamId, members: Vec<UnitId>) -> Team {
        Team { id, members }
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    /// Translate a team-local unit ID to the process-global one.
    pub fn l2g(&self, local: TeamUnitId) -> Option<UnitId> {
        self.members.get(local.0 as usize).copied()
    }
}

/// Registry of the teams known to a dependency engine.
#[derive(Debug, Default)]
pub struct Teams {
    teams: RwLock<HashMap<TeamId, Team>>,
}

impl Teams {
    pub fn new() -> Teams {
        Teams::default()
    }

    pub fn register(&self, team: Team) {
        self.teams.write().insert(team.id(), team);
    }

    /// Resolve the unit field of a dependency gptr to a global unit ID.
    ///
    /// For [`TeamId::ALL`] the field already is the global ID; otherwise it
    /// is interpreted as team-local and translated through the member table.
    pub fn global_unit(&self, team: TeamId, unit: UnitId) -> Option<UnitId> {
        if team == TeamId::ALL {
            return Some(unit);
        }
        self.teams.read().get(&team)?.l2g(TeamUnitId(unit.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2g_translation() {
        let teams = Teams::new();
        teams.register(Team::new(TeamId(1), vec![UnitId(4), UnitId(7)]));

        assert_eq!(teams.global_unit(TeamId::ALL, UnitId(9)), Some(UnitId(9)));
        assert_eq!(teams.global_unit(TeamId(1), UnitId(0)), Some(UnitId(4)));
        assert_eq!(teams.global_unit(TeamId(1), UnitId(1)), Some(UnitId(7)));
        assert_eq!(teams.global_unit(TeamId(1), UnitId(2)), None);
        assert_eq!(teams.global_unit(TeamId(2), UnitId(0)), None);
    }
}
