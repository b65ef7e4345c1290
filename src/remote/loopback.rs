//! In-process transport: every unit is a thread in the same process, and a
//! shared hub routes messages between per-unit inboxes. Sends are immediate,
//! so after the barrier every message of the bounded phase is already in the
//! receiver's inbox.

use crate::global::UnitId;
use crate::remote::{DepMessage, RemoteEvents, RemoteTaskRef, Transport};
use crate::task::TaskDep;
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Barrier};
use tracing::trace;

/// Shared state of an in-process unit group.
pub struct LoopbackHub {
    inboxes: Vec<Mutex<VecDeque<DepMessage>>>,
    barrier: Barrier,
}

impl LoopbackHub {
    pub fn new(units: usize) -> Arc<LoopbackHub> {
        assert!(units > 0, "a unit group cannot be empty");
        Arc::new(LoopbackHub {
            inboxes: (0..units).map(|_| Mutex::new(VecDeque::new())).collect(),
            barrier: Barrier::new(units),
        })
    }

    /// The endpoint through which unit `unit` participates.
    pub fn endpoint(self: &Arc<LoopbackHub>, unit: UnitId) -> LoopbackTransport {
        assert!(
            (unit.0 as usize) < self.inboxes.len(),
            "unit {unit} outside the group"
        );
        LoopbackTransport {
            unit,
            hub: Arc::clone(self),
        }
    }

    fn deliver(&self, target: UnitId, msg: DepMessage) -> Result<()> {
        let inbox = self
            .inboxes
            .get(target.0 as usize)
            .ok_or_else(|| anyhow!("send to unknown unit {target}"))?;
        inbox.lock().push_back(msg);
        Ok(())
    }
}

/// One unit's view of a [`LoopbackHub`].
pub struct LoopbackTransport {
    unit: UnitId,
    hub: Arc<LoopbackHub>,
}

impl Transport for LoopbackTransport {
    fn my_unit(&self) -> UnitId {
        self.unit
    }

    fn num_units(&self) -> usize {
        self.hub.inboxes.len()
    }

    fn barrier(&self) {
        self.hub.barrier.wait();
    }

    fn send_dep_request(&self, target: UnitId, task: RemoteTaskRef, dep: &TaskDep) -> Result<()> {
        trace!(%target, ?task, "loopback: dependency request");
        self.hub.deliver(
            target,
            DepMessage::Request {
                dep: *dep,
                task,
                origin: self.unit,
            },
        )
    }

    fn send_release(&self, target: UnitId, task: RemoteTaskRef, dep: &TaskDep) -> Result<()> {
        trace!(%target, ?task, "loopback: release");
        self.hub
            .deliver(target, DepMessage::Release { task, dep: *dep })
    }

    fn send_direct(
        &self,
        target: UnitId,
        task: RemoteTaskRef,
        waiter: RemoteTaskRef,
    ) -> Result<()> {
        trace!(%target, ?task, ?waiter, "loopback: direct dependency");
        self.hub.deliver(
            target,
            DepMessage::Direct {
                task,
                waiter,
                origin: self.unit,
            },
        )
    }

    fn progress(&self, events: &dyn RemoteEvents) -> Result<()> {
        // Drain outside the inbox lock: dispatching may send replies, and a
        // reply to ourselves would re-enter the same inbox.
        let drained: Vec<DepMessage> = {
            let mut inbox = self.hub.inboxes[self.unit.0 as usize].lock();
            inbox.drain(..).collect()
        };

        for msg in drained {
            match msg {
                DepMessage::Request { dep, task, origin } => {
                    events.on_dep_request(&dep, task, origin)
                }
                DepMessage::Release { task, .. } => events.on_release(task),
                DepMessage::Direct {
                    task,
                    waiter,
                    origin,
                } => events.on_direct(task, waiter, origin),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::{GlobalPtr, Phase, SegmentId};
    use crate::task::{DepKind, TaskId};
    use static_assertions::assert_impl_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    assert_impl_all!(LoopbackTransport: Send, Sync, Transport);

    #[derive(Default)]
    struct CountingEvents {
        requests: AtomicUsize,
        releases: AtomicUsize,
        directs: AtomicUsize,
    }

    impl RemoteEvents for CountingEvents {
        fn on_dep_request(&self, _dep: &TaskDep, _task: RemoteTaskRef, _origin: UnitId) {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }

        fn on_direct(&self, _task: RemoteTaskRef, _waiter: RemoteTaskRef, _origin: UnitId) {
            self.directs.fetch_add(1, Ordering::Relaxed);
        }

        fn on_release(&self, _task: RemoteTaskRef) {
            self.releases.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_messages_route_to_the_target_inbox() {
        let hub = LoopbackHub::new(2);
        let t0 = hub.endpoint(UnitId(0));
        let t1 = hub.endpoint(UnitId(1));

        let dep = TaskDep::new(
            DepKind::In,
            GlobalPtr::new(UnitId(0), SegmentId(1), 0x10),
            Phase(1),
        );
        let task = RemoteTaskRef::from(TaskId::next());

        t1.send_dep_request(UnitId(0), task, &dep).unwrap();
        t1.send_release(UnitId(0), task, &dep).unwrap();
        t0.send_direct(UnitId(1), task, task).unwrap();

        let ev0 = CountingEvents::default();
        t0.progress(&ev0).unwrap();
        assert_eq!(ev0.requests.load(Ordering::Relaxed), 1);
        assert_eq!(ev0.releases.load(Ordering::Relaxed), 1);
        assert_eq!(ev0.directs.load(Ordering::Relaxed), 0);

        let ev1 = CountingEvents::default();
        t1.progress(&ev1).unwrap();
        assert_eq!(ev1.directs.load(Ordering::Relaxed), 1);

        // Inboxes drained.
        t0.progress(&ev0).unwrap();
        assert_eq!(ev0.requests.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_send_to_unknown_unit_fails() {
        let hub = LoopbackHub::new(1);
        let t0 = hub.endpoint(UnitId(0));
        let dep = TaskDep::new(DepKind::In, GlobalPtr::NULL, Phase(0));
        assert!(
            t0.send_release(UnitId(9), RemoteTaskRef::from(TaskId::next()), &dep)
                .is_err()
        );
    }
}
