//! Refactor creation, listing, status and signal commands.

use anyhow::Result;
use console::style;

use forge_refactor::config::Config;
use forge_refactor::errors::CommandOutcome;
use forge_refactor::orchestrator::{Orchestrator, status_marker};
use forge_refactor::signals::SignalLog;
use forge_refactor::state::StateStore;

use super::finish;

pub fn cmd_new(config: &Config, title: &str, goal: &str) -> Result<()> {
    config.ensure_directories()?;
    let outcome = CommandOutcome::from_result(config.registry().create(title, goal), |handle| {
        format!(
            "Created refactor {}\n\n  Directory: {}\n\n  Next: write EXECUTION_PLAN.md there, then `forge-refactor start {} 1.1`",
            handle.id(),
            handle.dir().display(),
            handle.id()
        )
    });
    finish(outcome)
}

pub fn cmd_list(config: &Config) -> Result<()> {
    let refactors = config.registry().list()?;
    println!();
    if refactors.is_empty() {
        println!("No refactors found. Create one with 'forge-refactor new <title>'.");
        println!();
        return Ok(());
    }

    println!("{:<30} {:<12} {:<17} Title", "Id", "Status", "Created");
    println!(
        "{:<30} {:<12} {:<17} -----",
        "------------------------------", "------------", "-----------------"
    );
    for meta in &refactors {
        let status = config
            .refactor(&meta.id)
            .ok()
            .and_then(|handle| StateStore::new(&handle).load_optional().ok().flatten())
            .map(|state| state.status.as_str().to_string())
            .unwrap_or_else(|| meta.status.clone());
        println!(
            "{:<30} {:<12} {:<17} {}",
            meta.id,
            status,
            meta.created_at.format("%Y-%m-%d %H:%M"),
            meta.title
        );
    }
    println!();
    Ok(())
}

pub fn cmd_status(config: &Config, refactor: &str) -> Result<()> {
    let handle = config.refactor(refactor)?;
    let orchestrator = Orchestrator::new(&handle);
    let summary = orchestrator.status_summary()?;

    println!();
    println!("{}", summary.to_markdown());
    if let Some(state) = orchestrator.read_state()? {
        if !state.sessions.is_empty() {
            println!("{}", style("Sessions").bold());
        }
        for session in state.sessions.values() {
            let mut line = format!(
                "  {} {:<8} {:<15} audit: {}",
                status_marker(session.status),
                session.session_id,
                session.status.as_str(),
                session.audit_result.as_str()
            );
            if session.iteration_count > 0 {
                line.push_str(&format!(" (iterations: {})", session.iteration_count));
            }
            if let Some(commit) = &session.commit_hash {
                line.push_str(&format!(" {}", style(commit).dim()));
            }
            println!("{}", line);
        }
    }
    if let Some(advice) = orchestrator.next_step()? {
        println!();
        println!("{}", style("Next").bold());
        println!("{}", advice.trim_end());
    }
    println!();
    Ok(())
}

pub fn cmd_signals(config: &Config, refactor: &str, archive: bool) -> Result<()> {
    let handle = config.refactor(refactor)?;
    if archive {
        let outcome = CommandOutcome::from_result(SignalLog::new(&handle).archive(), |(dir, count)| {
            match dir {
                Some(dir) => format!("Archived {} signal(s) to {}", count, dir.display()),
                None => "No signals to archive".to_string(),
            }
        });
        return finish(outcome);
    }

    let summary = Orchestrator::new(&handle).check_signals()?;
    println!();
    println!("{}", summary.to_markdown());
    println!();
    Ok(())
}
