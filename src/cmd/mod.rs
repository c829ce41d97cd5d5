//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module         | Commands handled                                              |
//! |----------------|---------------------------------------------------------------|
//! | `refactor`     | `New`, `List`, `Status`, `Signals`                            |
//! | `session`      | `Start`, `Done`                                               |
//! | `audit`        | `Audit`, `AuditPass`, `AuditFail`, `AuditEscalate`, `AuditAuto` |
//! | `orchestrate`  | `Advance`, `Pause`, `Resume`, `Ask`, `Handoff`, `Orchestrate` |
//! | `plan`         | `Plan`, `PlanHandoff`, `Analyze`                              |
//! | `config`       | `Config`                                                      |
//!
//! Controller results are folded into a `CommandOutcome`; a failed outcome
//! is printed and turned into a non-zero exit.

pub mod audit;
pub mod config;
pub mod orchestrate;
pub mod plan;
pub mod refactor;
pub mod session;

pub use audit::{cmd_audit, cmd_audit_auto, cmd_audit_escalate, cmd_audit_fail, cmd_audit_pass};
pub use config::cmd_config;
pub use orchestrate::{cmd_advance, cmd_ask, cmd_handoff, cmd_orchestrate, cmd_pause, cmd_resume};
pub use plan::{cmd_analyze, cmd_plan, cmd_plan_handoff};
pub use refactor::{cmd_list, cmd_new, cmd_signals, cmd_status};
pub use session::{cmd_done, cmd_start};

use anyhow::{Result, bail};
use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;
use forge_refactor::launch::{TerminalKind, TerminalLauncher};

/// Print an outcome; a failure becomes the command's error.
fn finish(outcome: CommandOutcome) -> Result<()> {
    if outcome.success {
        println!();
        println!("{} {}", console::style("✓").green().bold(), outcome.message);
        println!();
        Ok(())
    } else {
        bail!(outcome.message)
    }
}

/// Terminal launcher from `--terminal`, falling back to the configured one.
fn launcher(config: &Config, terminal: Option<&str>) -> Result<TerminalLauncher> {
    let kind = match terminal {
        Some(name) => name.parse::<TerminalKind>().map_err(anyhow::Error::msg)?,
        None => config.terminal,
    };
    Ok(TerminalLauncher::new(kind))
}
