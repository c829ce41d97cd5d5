//! Execution session commands: `start` and `done`.

use anyhow::Result;
use console::style;

use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;
use forge_refactor::session::ExecutionSession;

use super::{finish, launcher};

fn execution_session(config: &Config, refactor: &str, session: &str) -> Result<ExecutionSession> {
    let handle = config.refactor(refactor)?;
    Ok(ExecutionSession::new(&handle, session, &config.project_dir)
        .with_docs_dir(&config.docs_dir)
        .with_agent_command(config.agent_command())
        .with_base_branch(config.base_branch.clone()))
}

pub async fn cmd_start(
    config: &Config,
    refactor: &str,
    session: &str,
    terminal: Option<&str>,
) -> Result<()> {
    let controller = execution_session(config, refactor, session)?;
    let launcher = launcher(config, terminal)?;

    match controller.launch(&launcher).await {
        Ok(report) if report.launched => finish(CommandOutcome::ok(report.message())),
        Ok(report) => {
            // State and signal are already recorded; only the terminal failed.
            println!();
            println!("{} {}", style("!").yellow().bold(), report.message());
            Ok(())
        }
        Err(e) => finish(CommandOutcome::failed(e.to_string())),
    }
}

pub fn cmd_done(
    config: &Config,
    refactor: &str,
    session: &str,
    commit: Option<&str>,
    notes: Option<&str>,
    write_output: bool,
) -> Result<()> {
    let controller = execution_session(config, refactor, session)?;
    finish(CommandOutcome::from_result(
        controller.complete(commit, notes, write_output),
        |report| report.message(),
    ))
}
