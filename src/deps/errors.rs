use crate::global::TeamId;
use crate::task::DepKind;
use thiserror::Error;

/// Routine failures of dependency handling.
///
/// These are returned to the caller; handling continues for the remaining
/// dependencies of the same task. Invariant violations (counter underflow,
/// reuse of a dirty pool element) are not errors but runtime bugs and abort.
#[derive(Debug, Error)]
pub enum DepError {
    #[error("remote dependencies must be inputs, got {0:?}")]
    InvalidRemoteDep(DepKind),

    #[error("remote dependencies are not supported on nested tasks")]
    NestedRemoteDep,

    #[error("dependency names unknown team {0:?}")]
    UnknownTeam(TeamId),

    #[error("no scheduler bound to the dependency engine")]
    SchedulerDetached,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
