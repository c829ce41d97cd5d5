use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use forge_refactor::config::Config;

mod cmd;

#[derive(Parser)]
#[command(name = "forge-refactor")]
#[command(version, about = "Coordinate multi-session refactors run by AI agents")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new refactor
    New {
        title: String,
        /// What the refactor should achieve
        #[arg(long, default_value = "")]
        goal: String,
    },
    /// Create a refactor and launch an interactive planning session
    Plan {
        #[arg(required_unless_present = "resume")]
        title: Option<String>,
        /// What the refactor should achieve
        #[arg(long, default_value = "")]
        goal: String,
        /// Resume planning for an existing refactor from PLANNING_HANDOFF.md
        #[arg(long, conflicts_with = "title")]
        resume: Option<String>,
        #[arg(long)]
        terminal: Option<String>,
    },
    /// Rewrite PLANNING_HANDOFF.md for the next planner
    PlanHandoff {
        refactor: String,
        #[arg(long, default_value = "")]
        why: String,
        #[arg(long, default_value = "")]
        context: String,
        /// Open question (repeatable)
        #[arg(long = "question")]
        questions: Vec<String>,
        /// Decision still being debated (repeatable)
        #[arg(long = "decision")]
        decisions: Vec<String>,
        /// Discovered user preference (repeatable)
        #[arg(long = "preference")]
        preferences: Vec<String>,
        /// Document status as NAME=STATUS, e.g. VISION=draft (repeatable)
        #[arg(long = "doc")]
        docs: Vec<String>,
    },
    /// Analyze the codebase for the refactor goal and write PRE_REFACTOR.md
    Analyze {
        refactor: String,
        /// Goal to analyze for (defaults to the refactor's goal)
        #[arg(long)]
        goal: Option<String>,
    },
    /// List refactors
    List,
    /// Show sessions, phases and the latest signal
    Status { refactor: String },
    /// Show the signal summary and timeline
    Signals {
        refactor: String,
        /// Move current signals into a timestamped archive folder
        #[arg(long)]
        archive: bool,
    },
    /// Launch an execution session
    Start {
        refactor: String,
        session: String,
        /// Terminal to open: auto, tmux, iterm2, terminal, warp
        #[arg(long)]
        terminal: Option<String>,
    },
    /// Mark an execution session complete
    Done {
        refactor: String,
        session: String,
        /// Commit to record (defaults to the worktree HEAD)
        #[arg(long)]
        commit: Option<String>,
        /// Handoff notes for the next session
        #[arg(long)]
        notes: Option<String>,
        /// Do not write sessions/{id}/output.md
        #[arg(long)]
        no_output: bool,
    },
    /// Launch an interactive audit session
    Audit {
        refactor: String,
        #[arg(required = true)]
        sessions: Vec<String>,
        #[arg(long)]
        terminal: Option<String>,
    },
    /// Record a passed audit
    AuditPass {
        refactor: String,
        #[arg(required = true)]
        sessions: Vec<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Record a failed audit
    AuditFail {
        refactor: String,
        #[arg(required = true)]
        sessions: Vec<String>,
        /// One finding (repeatable)
        #[arg(long = "issue")]
        issues: Vec<String>,
        /// One suggestion (repeatable)
        #[arg(long = "suggestion")]
        suggestions: Vec<String>,
    },
    /// Escalate sessions to a human and pause the refactor
    AuditEscalate {
        refactor: String,
        #[arg(required = true)]
        sessions: Vec<String>,
        #[arg(long)]
        reason: String,
    },
    /// Run a non-interactive audit through the agent CLI
    AuditAuto {
        refactor: String,
        #[arg(required = true)]
        sessions: Vec<String>,
    },
    /// Complete one session and point the refactor at the next
    Advance {
        refactor: String,
        from: String,
        to: String,
    },
    /// Pause the refactor
    Pause {
        refactor: String,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Resume a paused refactor
    Resume { refactor: String },
    /// Record a question from a session
    Ask {
        refactor: String,
        session: String,
        question: String,
        /// One answer option (repeatable)
        #[arg(long = "option")]
        options: Vec<String>,
    },
    /// Rewrite ORCHESTRATOR_HANDOFF.md for the next orchestrator
    Handoff {
        refactor: String,
        /// Why the handoff is happening
        #[arg(long, default_value = "")]
        why: String,
        /// Key discussion points
        #[arg(long, default_value = "")]
        context: String,
        /// Open question (repeatable)
        #[arg(long = "question")]
        questions: Vec<String>,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Launch the orchestrator session
    Orchestrate {
        refactor: String,
        #[arg(long)]
        terminal: Option<String>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default forge.toml file
    Init,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("forge_refactor={}", default)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&project_dir, command.clone());
    }
    let config = Config::new(project_dir, cli.verbose)?;

    match cli.command {
        Commands::New { title, goal } => cmd::cmd_new(&config, &title, &goal)?,
        Commands::Plan {
            title,
            goal,
            resume,
            terminal,
        } => {
            cmd::cmd_plan(
                &config,
                title.as_deref(),
                &goal,
                resume.as_deref(),
                terminal.as_deref(),
            )
            .await?
        }
        Commands::PlanHandoff {
            refactor,
            why,
            context,
            questions,
            decisions,
            preferences,
            docs,
        } => cmd::cmd_plan_handoff(
            &config,
            &refactor,
            why,
            context,
            questions,
            decisions,
            preferences,
            &docs,
        )?,
        Commands::Analyze { refactor, goal } => {
            cmd::cmd_analyze(&config, &refactor, goal.as_deref()).await?
        }
        Commands::List => cmd::cmd_list(&config)?,
        Commands::Status { refactor } => cmd::cmd_status(&config, &refactor)?,
        Commands::Signals { refactor, archive } => cmd::cmd_signals(&config, &refactor, archive)?,
        Commands::Start {
            refactor,
            session,
            terminal,
        } => cmd::cmd_start(&config, &refactor, &session, terminal.as_deref()).await?,
        Commands::Done {
            refactor,
            session,
            commit,
            notes,
            no_output,
        } => cmd::cmd_done(
            &config,
            &refactor,
            &session,
            commit.as_deref(),
            notes.as_deref(),
            !no_output,
        )?,
        Commands::Audit {
            refactor,
            sessions,
            terminal,
        } => cmd::cmd_audit(&config, &refactor, &sessions, terminal.as_deref()).await?,
        Commands::AuditPass {
            refactor,
            sessions,
            notes,
        } => cmd::cmd_audit_pass(&config, &refactor, &sessions, notes.as_deref())?,
        Commands::AuditFail {
            refactor,
            sessions,
            issues,
            suggestions,
        } => cmd::cmd_audit_fail(&config, &refactor, &sessions, &issues, &suggestions)?,
        Commands::AuditEscalate {
            refactor,
            sessions,
            reason,
        } => cmd::cmd_audit_escalate(&config, &refactor, &sessions, &reason)?,
        Commands::AuditAuto { refactor, sessions } => {
            cmd::cmd_audit_auto(&config, &refactor, &sessions).await?
        }
        Commands::Advance { refactor, from, to } => cmd::cmd_advance(&config, &refactor, &from, &to)?,
        Commands::Pause { refactor, reason } => cmd::cmd_pause(&config, &refactor, reason.as_deref())?,
        Commands::Resume { refactor } => cmd::cmd_resume(&config, &refactor)?,
        Commands::Ask {
            refactor,
            session,
            question,
            options,
        } => cmd::cmd_ask(&config, &refactor, &session, &question, &options)?,
        Commands::Handoff {
            refactor,
            why,
            context,
            questions,
            notes,
        } => cmd::cmd_handoff(&config, &refactor, why, context, questions, notes)?,
        Commands::Orchestrate { refactor, terminal } => {
            cmd::cmd_orchestrate(&config, &refactor, terminal.as_deref()).await?
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}
