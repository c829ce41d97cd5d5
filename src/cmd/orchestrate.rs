//! Orchestrator commands: phase advance, pause/resume, questions, handoff
//! and launching the orchestrator session itself.

use anyhow::Result;
use console::style;

use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;
use forge_refactor::orchestrator::{HandoffNotes, Orchestrator};
use forge_refactor::refactor::sanitize_id;

use super::{finish, launcher};

fn orchestrator(config: &Config, refactor: &str) -> Result<Orchestrator> {
    let handle = config.refactor(refactor)?;
    Ok(Orchestrator::new(&handle).with_agent_command(config.agent_command()))
}

pub fn cmd_advance(config: &Config, refactor: &str, from: &str, to: &str) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    let (from, to) = (sanitize_id(from), sanitize_id(to));
    finish(CommandOutcome::from_result(
        orchestrator.advance_phase(&from, &to),
        |changed| {
            if changed {
                format!("Advanced from {} to {}", from, to)
            } else {
                format!("Already advanced from {} to {}", from, to)
            }
        },
    ))
}

pub fn cmd_pause(config: &Config, refactor: &str, reason: Option<&str>) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    finish(CommandOutcome::from_result(orchestrator.pause(reason), |_| {
        format!("Refactor {} paused", refactor)
    }))
}

pub fn cmd_resume(config: &Config, refactor: &str) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    finish(CommandOutcome::from_result(orchestrator.resume(), |_| {
        format!("Refactor {} resumed", refactor)
    }))
}

pub fn cmd_ask(
    config: &Config,
    refactor: &str,
    session: &str,
    question: &str,
    options: &[String],
) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    let session = sanitize_id(session);
    finish(CommandOutcome::from_result(
        orchestrator.ask(&session, question, options),
        |_| format!("Question from {} recorded for the orchestrator", session),
    ))
}

pub fn cmd_handoff(
    config: &Config,
    refactor: &str,
    why: String,
    context: String,
    questions: Vec<String>,
    notes: String,
) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    let notes = HandoffNotes {
        why_handoff: why,
        conversation_context: context,
        open_questions: questions,
        notes,
    };
    if notes.why_handoff.is_empty() {
        println!(
            "{} No handoff reason provided. Consider adding context for the next orchestrator (--why).",
            style("!").yellow().bold()
        );
    }
    let generation = orchestrator.current_generation();
    finish(CommandOutcome::from_result(
        orchestrator.update_handoff(&notes),
        |path| {
            format!(
                "Handoff written for Orchestrator #{}: {}",
                generation + 1,
                path.display()
            )
        },
    ))
}

pub async fn cmd_orchestrate(config: &Config, refactor: &str, terminal: Option<&str>) -> Result<()> {
    let orchestrator = orchestrator(config, refactor)?;
    let launcher = launcher(config, terminal)?;

    match orchestrator.launch(&launcher).await {
        Ok(launch) if launch.launched => finish(CommandOutcome::ok(launch.message(refactor))),
        Ok(launch) => {
            println!();
            println!("{} {}", style("!").yellow().bold(), launch.message(refactor));
            Ok(())
        }
        Err(e) => finish(CommandOutcome::failed(e.to_string())),
    }
}
