use crate::deps::pool::{DepElem, DepPool};
use crate::global::DepKey;

/// Fixed bucket count; a prime stirs the modulo reasonably well.
pub(crate) const DEPHASH_BUCKETS: usize = 1023;

/// Map the resolved address of a dependency to its bucket.
///
/// The hash mixes segment, unit, and offset and is stable across runs. The
/// shift by 2 drops the low bits of at-least-4-byte-aligned addresses.
pub(crate) fn slot_for(key: DepKey) -> usize {
    let segment = key.segment.0 as u16 as u64;
    let unit = key.unit.0 as u64;

    let mut hash = key.addr >> 2;
    hash ^= segment << 16;
    hash ^= unit << 32;

    (hash % DEPHASH_BUCKETS as u64) as usize
}

/// Per-parent map from global address to the dependency records of its
/// children, guarded by the parent's table mutex.
///
/// Buckets keep insertion order, oldest first; since submission order is
/// non-decreasing in phase, matchers scanning from the back visit records in
/// descending phase order. That ordering is what lets scans stop at the
/// first writer.
pub(crate) struct DepTable {
    buckets: Vec<Vec<Box<DepElem>>>,
}

impl DepTable {
    pub(crate) fn new() -> DepTable {
        DepTable {
            buckets: (0..DEPHASH_BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    pub(crate) fn insert(&mut self, elem: Box<DepElem>) {
        let slot = slot_for(elem.dep.gptr.key());
        self.buckets[slot].push(elem);
    }

    pub(crate) fn bucket(&self, slot: usize) -> &[Box<DepElem>] {
        &self.buckets[slot]
    }

    pub(crate) fn bucket_mut(&mut self, slot: usize) -> &mut Vec<Box<DepElem>> {
        &mut self.buckets[slot]
    }

    /// Recycle every record; used by reset and finalize.
    pub(crate) fn drain_into(&mut self, pool: &DepPool) {
        for bucket in &mut self.buckets {
            for elem in bucket.drain(..) {
                pool.recycle(elem);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deps::pool::TaskRef;
    use crate::global::{GlobalPtr, Phase, SegmentId, UnitId};
    use crate::task::{DepKind, Task, TaskDep};
    use rstest::rstest;

    fn key(unit: u32, seg: i16, addr: u64) -> DepKey {
        GlobalPtr::new(UnitId(unit), SegmentId(seg), addr).key()
    }

    #[test]
    fn test_hash_is_stable_across_runs() {
        // Fixed expectations pin the mixing function down.
        assert_eq!(slot_for(key(0, 0, 0)), 0);
        assert_eq!(slot_for(key(0, 0, 0x1000)), (0x1000u64 >> 2) as usize % 1023);
        assert_eq!(
            slot_for(key(5, 3, 0x80)),
            (((0x80u64 >> 2) ^ (3 << 16) ^ (5u64 << 32)) % 1023) as usize
        );
    }

    #[rstest]
    #[case::aligned(0x100, 0x104)]
    #[case::page(0x2000, 0x2004)]
    fn test_adjacent_words_spread(#[case] a: u64, #[case] b: u64) {
        assert_ne!(slot_for(key(0, 1, a)), slot_for(key(0, 1, b)));
    }

    #[test]
    fn test_bucket_preserves_insertion_order() {
        let pool = DepPool::new();
        let task = Task::new(Phase::FIRST, None, None);
        let gptr = GlobalPtr::new(UnitId(0), SegmentId(1), 0x40);
        let mut table = DepTable::new();

        for phase in 0..4 {
            table.insert(pool.allocate(
                TaskDep::new(DepKind::Out, gptr, Phase(phase)),
                TaskRef::Local(task.clone()),
                UnitId(0),
            ));
        }

        let slot = slot_for(gptr.key());
        let phases: Vec<i32> = table.bucket(slot).iter().map(|e| e.dep.phase.0).collect();
        assert_eq!(phases, vec![0, 1, 2, 3]);

        // Matchers scan from the back: descending phase.
        let newest_first: Vec<i32> = table
            .bucket(slot)
            .iter()
            .rev()
            .map(|e| e.dep.phase.0)
            .collect();
        assert_eq!(newest_first, vec![3, 2, 1, 0]);

        table.drain_into(&pool);
        assert_eq!(table.len(), 0);
        assert_eq!(pool.free_len(), 4);
    }
}
