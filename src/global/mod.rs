use std::fmt;

mod gptr;
pub use gptr::{DepKey, GlobalPtr, SegmentId};

mod memory;
pub use memory::{GlobalMemory, IdentityMemory};

mod team;
pub use team::{Team, TeamId, TeamUnitId, Teams};

/// Process-global identifier of one unit (process) in the program.
///
/// Units also carry a team-local identity within subgroups, see
/// [`TeamUnitId`] and [`Team::l2g`].
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct UnitId(pub u32);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Monotonically non-decreasing epoch counter attached to every task at
/// submission time.
///
/// Phases partition tasks into epochs; remote-dependency matching is
/// phase-aware. [`Phase::TASK`] is the sentinel meaning "inherit the
/// submitting task's phase".
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Phase(pub i32);

impl Phase {
    /// Sentinel: resolve to the phase of the task the dependency belongs to.
    pub const TASK: Phase = Phase(i32::MIN);

    /// The first phase of a program.
    pub const FIRST: Phase = Phase(0);

    /// Resolve the [`Phase::TASK`] sentinel against a concrete task phase.
    pub fn or_task(self, task_phase: Phase) -> Phase {
        if self == Phase::TASK { task_phase } else { self }
    }

    pub fn next(self) -> Phase {
        Phase(self.0 + 1)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Phase::TASK {
            write!(f, "ph:task")
        } else {
            write!(f, "ph:{}", self.0)
        }
    }
}
