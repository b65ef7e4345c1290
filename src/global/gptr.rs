use crate::global::{TeamId, UnitId};
use std::fmt;

/// Numeric ID of a unit-local memory segment.
///
/// Together with a unit and an offset a segment identifies a memory location
/// anywhere in the system.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct SegmentId(pub i16);

impl SegmentId {
    /// Reserved local segment for copy-in destination buffers. Synthetic
    /// records on this segment deduplicate prefetches per `(dest, phase)`.
    pub const COPYIN: SegmentId = SegmentId(-1);
}

/// A global pointer: identifies a memory location anywhere in the system.
///
/// The `unit` field is interpreted as team-local when `team` is not
/// [`TeamId::ALL`]; dependency handling translates it to the global unit
/// before matching.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct GlobalPtr {
    pub team: TeamId,
    pub unit: UnitId,
    pub segment: SegmentId,
    /// Offset within the segment, or the absolute local address once
    /// localized.
    pub addr: u64,
}

impl GlobalPtr {
    pub const NULL: GlobalPtr = GlobalPtr {
        team: TeamId::ALL,
        unit: UnitId(0),
        segment: SegmentId(0),
        addr: 0,
    };

    pub fn new(unit: UnitId, segment: SegmentId, addr: u64) -> GlobalPtr {
        GlobalPtr {
            team: TeamId::ALL,
            unit,
            segment,
            addr,
        }
    }

    /// The identity used for dependency matching: two global pointers refer
    /// to the same location iff their resolved keys are equal. The team is
    /// deliberately absent, dependencies carry global unit IDs.
    pub fn key(&self) -> DepKey {
        DepKey {
            unit: self.unit,
            segment: self.segment,
            addr: self.addr,
        }
    }
}

impl fmt::Display for GlobalPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:s{}+{:#x}", self.unit, self.segment.0, self.addr)
    }
}

/// Resolved `(unit, segment, address)` triple, the equality domain of
/// dependency matching.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct DepKey {
    pub unit: UnitId,
    pub segment: SegmentId,
    pub addr: u64,
}
