use thiserror::Error;

use crate::furnace::FurnaceId;

/// Rejected furnace operations
///
/// None of these are fatal: the record is left exactly as it was and the
/// operator can retry once the precondition holds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FurnaceError {
    #[error("furnace {0}: parameters are incomplete, cannot start")]
    NotReady(FurnaceId),

    #[error("furnace {0}: process is already running")]
    AlreadyStarted(FurnaceId),

    #[error("furnace {0}: process has not been started")]
    NotStarted(FurnaceId),

    #[error("furnace {0}: downtime is already open")]
    AlreadyInDowntime(FurnaceId),

    #[error("furnace {0}: no downtime is open")]
    NotInDowntime(FurnaceId),

    #[error("furnace {0}: inputs are locked while the process runs")]
    InputsLocked(FurnaceId),

    #[error("invalid administrator password")]
    AdminAuthFailed,
}
