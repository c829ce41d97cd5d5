//! Cross-agent signal log.
//!
//! Agents never talk to each other directly. Each one appends immutable
//! signal files to the refactor's `signals/` directory and the others read
//! them back in filename order:
//!
//! - `session_started` / `session_done` from execution sessions
//! - `audit_passed` / `revision_needed` / `escalated` from audits
//! - `question` / `paused` / `resumed` from the orchestrator or operator

mod log;
mod types;

pub use log::SignalLog;
pub use types::{Signal, SignalPayload, SignalType};
