//! Audit commands: launch an audit session and record its verdict.

use anyhow::Result;
use console::style;

use forge_refactor::audit::AuditController;
use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;

use super::{finish, launcher};

fn controller(config: &Config, refactor: &str, sessions: &[String]) -> Result<AuditController> {
    let handle = config.refactor(refactor)?;
    Ok(AuditController::new(&handle, sessions, &config.project_dir)?
        .with_docs_dir(&config.docs_dir)
        .with_max_iterations(config.max_audit_iterations)
        .with_diff_limits(config.diff_limits)
        .with_agent_command(config.agent_command()))
}

pub async fn cmd_audit(
    config: &Config,
    refactor: &str,
    sessions: &[String],
    terminal: Option<&str>,
) -> Result<()> {
    let audit = controller(config, refactor, sessions)?;
    let launcher = launcher(config, terminal)?;

    match audit.launch(&launcher).await {
        Ok(launch) if launch.launched => {
            finish(CommandOutcome::ok(launch.message(audit.session_ids())))
        }
        Ok(launch) => {
            println!();
            println!(
                "{} {}",
                style("!").yellow().bold(),
                launch.message(audit.session_ids())
            );
            Ok(())
        }
        Err(e) => finish(CommandOutcome::failed(e.to_string())),
    }
}

pub fn cmd_audit_pass(
    config: &Config,
    refactor: &str,
    sessions: &[String],
    notes: Option<&str>,
) -> Result<()> {
    let audit = controller(config, refactor, sessions)?;
    finish(CommandOutcome::from_result(audit.record_pass(notes), |o| {
        o.message()
    }))
}

pub fn cmd_audit_fail(
    config: &Config,
    refactor: &str,
    sessions: &[String],
    issues: &[String],
    suggestions: &[String],
) -> Result<()> {
    let audit = controller(config, refactor, sessions)?;
    finish(CommandOutcome::from_result(
        audit.record_fail(issues, suggestions),
        |o| o.message(),
    ))
}

pub fn cmd_audit_escalate(
    config: &Config,
    refactor: &str,
    sessions: &[String],
    reason: &str,
) -> Result<()> {
    let audit = controller(config, refactor, sessions)?;
    finish(CommandOutcome::from_result(
        audit.record_escalation(reason),
        |o| o.message(),
    ))
}

pub async fn cmd_audit_auto(config: &Config, refactor: &str, sessions: &[String]) -> Result<()> {
    let audit = controller(config, refactor, sessions)?;
    let agent = config.agent(audit.audit_dir());
    std::fs::create_dir_all(audit.audit_dir())?;

    println!();
    println!(
        "{} Auditing sessions {} (timeout {}s)...",
        style("→").cyan(),
        audit.session_ids().join(", "),
        config.agent_timeout_secs
    );
    finish(CommandOutcome::from_result(
        audit.run_with_agent(&agent).await,
        |o| o.message(),
    ))
}
