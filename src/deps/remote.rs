use crate::deps::pool::TaskRef;
use crate::deps::table::slot_for;
use crate::deps::{DepEngine, DepError};
use crate::global::{GlobalPtr, Phase, UnitId};
use crate::remote::RemoteTaskRef;
use crate::task::{DepKind, Task, TaskDep};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

impl DepEngine {
    /// Outgoing: a dependency referencing another unit. Only supported on
    /// tasks whose parent is the root task; the phase protocol cannot order
    /// the tables of nested parents across units.
    pub(crate) fn handle_remote_datadep(
        &self,
        dep: &TaskDep,
        target: UnitId,
        task: &Arc<Task>,
    ) -> Result<(), DepError> {
        let parent_is_root = task.parent().is_some_and(|p| p.is_root());
        if !parent_is_root {
            warn!(task = %task.id(), "ignoring remote dependency in nested task");
            return Err(DepError::NestedRemoteDep);
        }

        self.transport()
            .send_dep_request(target, RemoteTaskRef::from(task.id()), dep)?;

        let unresolved = task.add_remote_dep();
        debug!(
            task = %task.id(),
            %target,
            gptr = %dep.gptr,
            unresolved,
            "sent remote dependency request"
        );
        if unresolved == 1 {
            self.remote_blocked.lock().push(Arc::clone(task));
        }
        Ok(())
    }

    /// Incoming: an off-unit task depends on data we own. The request is not
    /// matched immediately, matching needs the complete picture of the
    /// phase's local tasks; it is queued until [`DepEngine::handle_deferred_remote`]
    /// runs after the phase synchronization point.
    pub fn handle_remote_task(
        &self,
        dep: &TaskDep,
        remote_task: RemoteTaskRef,
        origin: UnitId,
    ) -> Result<(), DepError> {
        if dep.kind != DepKind::In {
            error!(
                kind = ?dep.kind,
                %origin,
                "remote dependencies with a type other than input are not supported"
            );
            return Err(DepError::InvalidRemoteDep(dep.kind));
        }

        debug!(task = ?remote_task, %origin, "queueing remote dependency request");
        let elem = self
            .pool
            .allocate(*dep, TaskRef::Remote(remote_task), origin);
        self.unhandled_remote.lock().push(elem);
        Ok(())
    }

    /// Resolve every queued incoming request against the now-complete local
    /// table of the prior phase.
    ///
    /// An incoming read from phase `p` must wait for the latest local writer
    /// in a phase `< p`; and local writers at phase `>= p` must not begin
    /// until the remote reader has been released, because they would
    /// overwrite the data it is about to read.
    pub fn handle_deferred_remote(&self) -> Result<(), DepError> {
        let pending = std::mem::take(&mut *self.unhandled_remote.lock());
        debug!(count = pending.len(), "matching deferred remote dependencies");

        let mut first_err = None;
        for rdep in pending {
            if let Err(e) = self.match_remote_request(rdep) {
                warn!(error = %e, "failed to resolve remote dependency request");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn match_remote_request(&self, rdep: Box<crate::deps::pool::DepElem>) -> Result<(), DepError> {
        let origin = rdep.origin;
        let remote_task = rdep
            .task
            .remote()
            .expect("unhandled-remote queue holds a non-remote task reference");
        let key = rdep.dep.gptr.key();
        let slot = slot_for(key);

        // The earliest-prior-phase writer that satisfies the request, and
        // the lowest-phase local task that must wait for the remote reader.
        let mut satisfier: Option<Arc<Task>> = None;
        let mut direct_candidate: Option<(Arc<Task>, Phase)> = None;

        {
            let guard = self.root().local_deps.lock();
            if let Some(table) = guard.as_ref() {
                for elem in table.bucket(slot).iter().rev() {
                    if !(elem.dep.kind.is_output() && elem.dep.gptr.key() == key) {
                        continue;
                    }
                    let local_task = elem.local_task();
                    let inner = local_task.inner.lock();
                    if !inner.state.is_active() {
                        debug!(
                            local = %local_task.id(),
                            remote = ?remote_task,
                            "matching local task already finished"
                        );
                        // Everything older finished as well, stop searching.
                        break;
                    }

                    if elem.dep.phase < rdep.dep.phase {
                        // A writer in a strictly earlier phase: match.
                        satisfier = Some(Arc::clone(local_task));
                        break;
                    }

                    // Same or later phase: write-after-read candidate. Only
                    // the lowest phase matters, later writers are ordered
                    // through local dependencies.
                    if direct_candidate
                        .as_ref()
                        .is_none_or(|(_, phase)| *phase > elem.dep.phase)
                    {
                        trace!(
                            local = %local_task.id(),
                            remote = ?remote_task,
                            "direct dependency candidate for remote reader"
                        );
                        direct_candidate = Some((Arc::clone(local_task), elem.dep.phase));
                    }
                }
            }
        }

        if let Some((candidate, phase)) = direct_candidate {
            // The candidate would overwrite the remote reader's input; it
            // has to wait for the reader to finish. The origin attaches the
            // candidate to its reader's remote successors.
            self.transport()
                .send_direct(origin, remote_task, RemoteTaskRef::from(candidate.id()))?;
            let unresolved = candidate.add_remote_dep();
            debug!(
                local = %candidate.id(),
                %phase,
                remote = ?remote_task,
                %origin,
                unresolved,
                "direct remote dependency on remote reader"
            );
            if unresolved == 1 {
                self.remote_blocked.lock().push(candidate);
            }
        }

        if let Some(candidate) = satisfier {
            let mut inner = candidate.inner.lock();
            if inner.state.is_active() {
                debug!(
                    local = %candidate.id(),
                    remote = ?remote_task,
                    %origin,
                    "local task satisfies remote dependency"
                );
                inner.remote_successors.push(rdep);
                return Ok(());
            }
            // Finished between the scan and the attach: fall through.
        }

        // No local writer still owes this data, release the reader now.
        debug!(
            remote = ?remote_task,
            %origin,
            phase = %rdep.dep.phase,
            "releasing unmatched remote dependency"
        );
        let res = self.transport().send_release(origin, remote_task, &rdep.dep);
        self.pool.recycle(rdep);
        res.map_err(DepError::from)
    }

    /// Incoming: a remote unit's deferred matching decided one of our tasks
    /// must wait for one of theirs. Attach the waiter as a remote successor,
    /// or release it immediately if our task is already done.
    pub fn handle_remote_direct(
        &self,
        local: RemoteTaskRef,
        waiter: RemoteTaskRef,
        origin: UnitId,
    ) -> Result<(), DepError> {
        let dep = TaskDep::new(DepKind::Direct, GlobalPtr::NULL, Phase::FIRST);

        let Some(task) = self.lookup(local) else {
            warn!(task = ?local, %origin, "direct dependency names an unknown task");
            return self
                .transport()
                .send_release(origin, waiter, &dep)
                .map_err(DepError::from);
        };

        debug!(local = %task.id(), waiter = ?waiter, %origin, "remote direct dependency");

        let attached = {
            let mut inner = task.inner.lock();
            if inner.state.is_active() {
                let elem = self.pool.allocate(dep, TaskRef::Remote(waiter), origin);
                inner.remote_successors.push(elem);
                true
            } else {
                false
            }
        };

        if !attached {
            // Already done, release immediately.
            self.transport()
                .send_release(origin, waiter, &dep)
                .map_err(DepError::from)?;
        }
        Ok(())
    }

    /// Incoming: a remote predecessor of `local` finished.
    pub fn release_remote_dep(&self, local: RemoteTaskRef) -> Result<(), DepError> {
        let Some(task) = self.lookup(local) else {
            warn!(task = ?local, "remote release for an unknown task (cancelled?)");
            return Ok(());
        };
        self.release_remote_dep_task(&task);
        Ok(())
    }

    /// Decrement the remote counter of `task`; on reaching zero splice it
    /// out of the remote-blocked list, and enqueue it once the local counter
    /// is also zero.
    pub(crate) fn release_remote_dep_task(&self, task: &Arc<Task>) {
        let (runnable, remote_zero) = task.release_remote_dep();
        debug!(
            task = %task.id(),
            local = task.unresolved_local(),
            remote = task.unresolved_remote(),
            "released remote dependency"
        );

        if remote_zero {
            let mut blocked = self.remote_blocked.lock();
            if let Some(pos) = blocked.iter().position(|t| Arc::ptr_eq(t, task)) {
                blocked.swap_remove(pos);
            }
        }

        if runnable {
            self.enqueue_runnable(task);
        }
    }
}
