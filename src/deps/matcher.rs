use crate::deps::DepEngine;
use crate::deps::pool::TaskRef;
use crate::deps::table::{DepTable, slot_for};
use crate::task::{DepKind, Task, TaskDep};
use std::sync::Arc;
use tracing::{debug, trace, warn};

impl DepEngine {
    /// Wire a new task's data dependency into predecessor/successor edges
    /// against the records already in its parent's table.
    ///
    /// Phases are ignored here: the dependency is matched against the most
    /// recent previous records. A new input only blocks on the most recent
    /// writer; a new output blocks on the most recent writer and on every
    /// intervening reader. Stopping at the first writer implements exactly
    /// that, given the descending-phase scan order of the bucket.
    pub(crate) fn match_local_datadep(&self, dep: &TaskDep, task: &Arc<Task>) {
        let Some(parent) = task.parent() else { return };

        let key = dep.gptr.key();
        let slot = slot_for(key);

        let mut guard = parent.local_deps.lock();
        // No table yet means no predecessors are possible.
        let Some(table) = guard.as_mut() else { return };

        let bucket = table.bucket_mut(slot);
        for idx in (0..bucket.len()).rev() {
            let elem = &mut bucket[idx];
            if elem.dep.gptr.key() != key {
                continue;
            }

            let elem_task = Arc::clone(elem.local_task());
            if Arc::ptr_eq(&elem_task, task) {
                // Self-dependency: upgrade the earlier input record if this
                // one writes, then stop.
                if elem.dep.kind == DepKind::In && dep.kind.is_output() {
                    elem.dep.kind = DepKind::Inout;
                }
                break;
            }

            trace!(
                task = %task.id(),
                pred = %elem_task.id(),
                gptr = %dep.gptr,
                kinds = ?(dep.kind, elem.dep.kind),
                "pairing local dependency"
            );

            if dep.kind.is_output() || (dep.kind == DepKind::In && elem.dep.kind.is_output()) {
                let mut inner = elem_task.inner.lock();
                if inner.state.is_active() {
                    if inner.successors.iter().any(|s| Arc::ptr_eq(s, task)) {
                        trace!(
                            task = %task.id(),
                            pred = %elem_task.id(),
                            "already a successor, skipping"
                        );
                    } else {
                        let unresolved = task.add_local_dep();
                        trace!(
                            task = %task.id(),
                            pred = %elem_task.id(),
                            unresolved,
                            "new local successor edge"
                        );
                        inner.successors.push(Arc::clone(task));
                    }
                }
            }

            if bucket[idx].dep.kind.is_output() {
                // The most recent writer dominates everything older.
                trace!(task = %task.id(), "stopping at first output dependency");
                return;
            }
        }

        if !dep.kind.is_output() {
            trace!(
                task = %task.id(),
                gptr = %dep.gptr,
                phase = %dep.phase,
                "no matching output dependency for input"
            );
        }
    }

    /// Register the new dependency record in the parent's table, allocating
    /// the table on first use.
    pub(crate) fn add_local_record(&self, dep: &TaskDep, task: &Arc<Task>) {
        let Some(parent) = task.parent() else { return };

        let elem = self
            .pool
            .allocate(*dep, TaskRef::Local(Arc::clone(task)), self.my_unit());

        let mut guard = parent.local_deps.lock();
        guard
            .get_or_insert_with(|| Box::new(DepTable::new()))
            .insert(elem);
    }

    /// Match a delayed input dependency, honoring phases: records of later
    /// phases are skipped, and the task is inserted "into the past".
    ///
    /// If a writer between the dependency's phase and the present exists,
    /// the new task additionally gains that next writer as a successor (the
    /// writer must not overwrite what the task is about to read) and its
    /// record is not inserted, being dominated by the writer's.
    pub(crate) fn match_delayed_local_datadep(&self, dep: &TaskDep, task: &Arc<Task>) {
        let Some(parent) = task.parent() else { return };

        let key = dep.gptr.key();
        let slot = slot_for(key);

        debug!(task = %task.id(), phase = %dep.phase, "handling delayed input dependency");

        let mut guard = parent.local_deps.lock();
        let Some(table) = guard.as_mut() else { return };

        // The writer closest after `dep.phase`, updated while scanning the
        // newer part of the bucket.
        let mut next_writer: Option<Arc<Task>> = None;

        let bucket = table.bucket_mut(slot);
        for idx in (0..bucket.len()).rev() {
            let elem = &bucket[idx];
            if elem.dep.phase > dep.phase {
                if elem.dep.gptr.key() == key && elem.dep.kind.is_output() {
                    next_writer = Some(Arc::clone(elem.local_task()));
                }
                continue;
            }

            if elem.dep.gptr.key() != key {
                continue;
            }

            let elem_task = Arc::clone(elem.local_task());
            assert!(
                !Arc::ptr_eq(&elem_task, task),
                "delayed dependency rediscovered its own task"
            );

            if !elem.dep.kind.is_output() {
                continue;
            }

            // Found the writer this delayed input reads from.
            {
                let mut inner = elem_task.inner.lock();
                if inner.state.is_active() {
                    let unresolved = task.add_local_dep();
                    trace!(
                        task = %task.id(),
                        pred = %elem_task.id(),
                        unresolved,
                        "delayed dependency successor edge"
                    );
                    inner.successors.push(Arc::clone(task));
                }
            }

            if let Some(next_writer) = next_writer {
                // Back-edge: the next writer must wait for this reader.
                {
                    let mut inner = next_writer.inner.lock();
                    assert!(
                        inner.state.is_active(),
                        "next writer already running while inserting delayed dependency"
                    );
                    let unresolved = next_writer.add_local_dep();
                    trace!(
                        reader = %task.id(),
                        writer = %next_writer.id(),
                        unresolved,
                        "delayed dependency back-edge to next writer"
                    );
                }
                // The submitting thread is the only one that can see `task`
                // at this point.
                task.inner.lock().successors.push(next_writer);
                // Dominated by the next writer, no record to insert.
            } else {
                // No later writer: the record goes into the bucket right
                // after the matched writer, preserving phase order.
                let elem = self
                    .pool
                    .allocate(*dep, TaskRef::Local(Arc::clone(task)), self.my_unit());
                bucket.insert(idx + 1, elem);
                trace!(task = %task.id(), "inserted delayed dependency record");
            }
            return;
        }

        drop(guard);
        warn!(
            task = %task.id(),
            gptr = %dep.gptr,
            phase = %dep.phase,
            "no active task matches the delayed input dependency"
        );
    }
}
