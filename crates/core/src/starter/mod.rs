//! Script starter: the run loop tying discovery, status logs, locks and the
//! process supervisor together.
//!
//! A run goes through two phases:
//! - **Preparation**: every discovered script is looked at once under its
//!   lock. Unseen scripts are marked `todo`; eligible ones become candidates.
//! - **Dispatch**: candidates are claimed (`running` is appended under the
//!   lock, only if the log did not change since preparation) and spawned,
//!   while exits are polled and recorded as `finished` or `error`.

mod inventory;
mod runner;
mod types;

pub use inventory::{count_pending, count_scripts, list_scripts};
pub use runner::ScriptStarter;
pub use types::{
    RunReport, ScriptEntry, ScriptOutcome, ScriptResult, SkipReason, SkippedScript, StarterError,
};
