//! Planning commands: launch or resume a planning session, record a planner
//! handoff, and draft `PRE_REFACTOR.md` from a codebase analysis.

use anyhow::{Result, bail};
use console::style;
use std::collections::BTreeMap;

use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;
use forge_refactor::planning::{
    CodebaseAnalyzer, DocStatus, PlanningHandoffNotes, PlanningSession, parse_doc_status,
};

use super::{finish, launcher};

fn planning(config: &Config, refactor: &str) -> Result<PlanningSession> {
    Ok(PlanningSession::open(&config.registry(), refactor)?
        .with_guide_dir(config.project_dir.join(&config.docs_dir))
        .with_agent_command(config.agent_command()))
}

/// Create a refactor and start its first planner, or resume a later one.
pub async fn cmd_plan(
    config: &Config,
    title: Option<&str>,
    goal: &str,
    resume: Option<&str>,
    terminal: Option<&str>,
) -> Result<()> {
    let launcher = launcher(config, terminal)?;
    let (refactor, result) = match (resume, title) {
        (Some(refactor), _) => {
            let session = planning(config, refactor)?;
            (refactor.to_string(), session.resume(&launcher).await)
        }
        (None, Some(title)) => {
            config.ensure_directories()?;
            let handle = match config.registry().create(title, goal) {
                Ok(handle) => handle,
                Err(e) => return finish(CommandOutcome::failed(e.to_string())),
            };
            println!(
                "{} Created refactor {} in {}",
                style("✓").green(),
                style(handle.id()).bold(),
                handle.dir().display()
            );
            let session = planning(config, handle.id())?;
            (handle.id().to_string(), session.launch(&launcher).await)
        }
        (None, None) => bail!("Give a refactor title, or --resume <refactor>"),
    };

    match result {
        Ok(launch) if launch.launched => finish(CommandOutcome::ok(launch.message(&refactor))),
        Ok(launch) => {
            println!();
            println!("{} {}", style("!").yellow().bold(), launch.message(&refactor));
            Ok(())
        }
        Err(e) => finish(CommandOutcome::failed(e.to_string())),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn cmd_plan_handoff(
    config: &Config,
    refactor: &str,
    why: String,
    context: String,
    questions: Vec<String>,
    decisions: Vec<String>,
    preferences: Vec<String>,
    docs: &[String],
) -> Result<()> {
    let session = planning(config, refactor)?;
    let docs_state: BTreeMap<String, DocStatus> = docs
        .iter()
        .map(|arg| parse_doc_status(arg))
        .collect::<std::result::Result<_, String>>()
        .map_err(anyhow::Error::msg)?;
    let notes = PlanningHandoffNotes {
        why_handoff: why,
        conversation_context: context,
        open_questions: questions,
        decisions_in_progress: decisions,
        user_preferences: preferences,
        docs_state,
    };
    if notes.why_handoff.is_empty() {
        println!(
            "{} No handoff reason provided. Consider adding context for the next planner (--why).",
            style("!").yellow().bold()
        );
    }
    let generation = session.current_generation();
    finish(CommandOutcome::from_result(
        session.update_handoff(&notes),
        |path| {
            format!(
                "Planning handoff written for Planner #{}: {}\n\n  Next: forge-refactor plan --resume {}",
                generation + 1,
                path.display(),
                refactor
            )
        },
    ))
}

/// Analyze the project for the refactor goal and write `PRE_REFACTOR.md`.
pub async fn cmd_analyze(config: &Config, refactor: &str, goal: Option<&str>) -> Result<()> {
    let handle = config.refactor(refactor)?;
    let goal = match goal {
        Some(goal) => goal.to_string(),
        None => config
            .registry()
            .get(handle.id())?
            .map(|meta| meta.goal)
            .filter(|goal| !goal.trim().is_empty())
            .unwrap_or_else(|| handle.id().to_string()),
    };

    println!(
        "{} Analyzing {} for: {}",
        style("→").cyan(),
        config.project_dir.display(),
        goal
    );
    let agent = config.agent(config.project_dir.clone());
    let result = CodebaseAnalyzer::new(&config.project_dir)
        .analyze(&goal, &agent)
        .await;
    finish(CommandOutcome::from_result(result.save(&handle.dir()), |path| {
        format!(
            "Analysis saved to {} ({} key files)",
            path.display(),
            result.key_files.len()
        )
    }))
}
