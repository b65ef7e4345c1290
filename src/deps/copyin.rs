use crate::deps::table::slot_for;
use crate::deps::{DepEngine, DepError};
use crate::global::{GlobalPtr, Phase, SegmentId, TeamId};
use crate::task::{CopyinDep, DepKind, Task, TaskDep};
use std::sync::Arc;
use tracing::trace;

impl DepEngine {
    /// Plan a copy-in dependency, eliding redundant fetches: within one
    /// phase, all consumers of the same destination share a single prefetch
    /// task and attach to it as successors.
    ///
    /// The dedup key is a synthetic record on the reserved [`SegmentId::COPYIN`]
    /// segment. If no prefetch has registered its output record yet, the
    /// task-creation collaborator is asked to create one and the bucket is
    /// scanned again; a second miss means the collaborator failed to install
    /// the record, which is a runtime bug.
    pub(crate) fn handle_copyin(
        &self,
        copyin: &CopyinDep,
        phase: Phase,
        task: &Arc<Task>,
    ) -> Result<(), DepError> {
        let dest_gptr = GlobalPtr {
            team: TeamId::ALL,
            unit: self.my_unit(),
            segment: SegmentId::COPYIN,
            addr: copyin.dest,
        };

        trace!(
            task = %task.id(),
            src = %copyin.src,
            dest = copyin.dest,
            %phase,
            "handling copy-in dependency"
        );

        for iter in 0..2 {
            if self.attach_to_prefetch(copyin, dest_gptr, phase, task) {
                // Record this task as a reader of the destination so later
                // writers of the buffer order themselves behind it.
                let in_dep = TaskDep::new(DepKind::In, dest_gptr, phase);
                self.add_local_record(&in_dep, task);
                return Ok(());
            }

            assert!(
                iter == 0,
                "copy-in prefetch task failed to install its output record"
            );

            trace!(%phase, dest = copyin.dest, "creating copy-in prefetch task");
            self.scheduler()?
                .create_copyin_task(copyin, dest_gptr, phase)
                .map_err(DepError::Transport)?;
        }
        unreachable!("copy-in scan loop neither attached nor aborted");
    }

    /// Scan for a same-phase prefetch of `dest` and attach `task` as its
    /// successor. Returns whether one was found.
    fn attach_to_prefetch(
        &self,
        copyin: &CopyinDep,
        dest_gptr: GlobalPtr,
        phase: Phase,
        task: &Arc<Task>,
    ) -> bool {
        let Some(parent) = task.parent() else {
            return false;
        };
        let slot = slot_for(dest_gptr.key());

        let mut guard = parent.local_deps.lock();
        let Some(table) = guard.as_mut() else {
            return false;
        };

        for elem in table.bucket(slot).iter().rev() {
            if elem.dep.gptr.addr != copyin.dest {
                continue;
            }
            if elem.dep.phase < phase {
                // Descending phase order: everything older cannot be reused.
                // TODO: reusing an earlier phase's prefetch would need the
                // remote side to confirm the data did not change in between.
                break;
            }
            if elem.dep.kind.is_output() && elem.dep.phase == phase {
                let prefetch = Arc::clone(elem.local_task());
                let mut inner = prefetch.inner.lock();
                if inner.state.is_active() {
                    let unresolved = task.add_local_dep();
                    trace!(
                        task = %task.id(),
                        prefetch = %prefetch.id(),
                        unresolved,
                        "copy-in consumer waits for prefetch"
                    );
                    inner.successors.push(Arc::clone(task));
                }
                return true;
            }
        }

        false
    }
}
