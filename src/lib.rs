//! Phase-aware task-graph runtime for PGAS-style programs.
//!
//! dagolo accepts tasks annotated with data dependencies on global
//! addresses, discovers the happens-before relation between them, locally
//! and across a distributed set of units, and releases tasks for execution
//! as soon as their dependencies are satisfied.
//!
//! The moving parts:
//! - `deps`: the dependency engine — per-parent hash tables of dependency
//!   records, the local and phase-aware matchers, the copy-in planner, the
//!   deferred remote matching step, and the release engine.
//! - `task`: task objects with their lifecycle states, atomic dependency
//!   counters, and the dependency types submitted with them.
//! - `global`: units, teams, phases, global pointers, and the seam to the
//!   global-memory layer.
//! - `remote`: the transport seam, plus an in-process loopback transport for
//!   single-process multi-unit runs.
//! - `runtime`: builder, worker pool, and the runtime handle.
//!
//! Quick start:
//! 1. Create a transport (e.g. a [`remote::LoopbackHub`] endpoint) and build
//!    a runtime via [`Builder`].
//! 2. Submit tasks with [`Runtime::task`], declaring dependencies with
//!    [`task::Dep`] helpers.
//! 3. Bound each phase with [`Runtime::advance_phase`] and
//!    [`Runtime::complete_phase`]; the latter is the synchronization point
//!    at which cross-unit dependencies are matched.

pub mod deps;
pub use deps::{DepEngine, DepError};

pub mod global;

pub mod remote;

pub mod runtime;
pub use runtime::{Builder, Runtime};

pub mod task;

#[cfg(test)]
pub(crate) mod test_utils;
