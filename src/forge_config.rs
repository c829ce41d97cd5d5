//! Project configuration read from `.forge/forge.toml`.
//!
//! Layered as file → environment → default. A missing file yields the
//! defaults; unknown keys are ignored.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-project"
//! claude_cmd = "claude"
//!
//! [refactor]
//! base_branch = "main"
//! terminal = "tmux"
//! docs_dir = "docs/MAJOR_REFACTOR_MODE"
//! max_audit_iterations = 3
//! max_diff_chars_per_commit = 3000
//! max_diff_chars_total = 12000
//! agent_timeout_secs = 120
//! skip_permissions = true
//! ```

use crate::audit::{DEFAULT_MAX_AUDIT_ITERATIONS, DEFAULT_MAX_DIFF_CHARS_PER_COMMIT, DEFAULT_MAX_DIFF_CHARS_TOTAL, DiffLimits};
use crate::launch::TerminalKind;
use crate::session::DEFAULT_DOCS_DIR;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
    /// Claude CLI command (default: "claude")
    #[serde(default)]
    pub claude_cmd: Option<String>,
}

/// Settings for refactor coordination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefactorSection {
    /// Branch worktrees are cut from when HEAD is detached
    #[serde(default)]
    pub base_branch: Option<String>,
    /// Terminal to open sessions in (auto, tmux, iterm2, terminal, warp)
    #[serde(default)]
    pub terminal: Option<String>,
    /// Planning documents directory, relative to the project root
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    /// Failed audits before a session is escalated
    #[serde(default = "default_max_audit_iterations")]
    pub max_audit_iterations: u32,
    #[serde(default = "default_max_diff_chars_per_commit")]
    pub max_diff_chars_per_commit: usize,
    #[serde(default = "default_max_diff_chars_total")]
    pub max_diff_chars_total: usize,
    /// Timeout for non-interactive agent calls
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Whether to skip permission prompts for Claude CLI
    #[serde(default = "default_skip_permissions")]
    pub skip_permissions: bool,
}

fn default_docs_dir() -> String {
    DEFAULT_DOCS_DIR.to_string()
}

fn default_max_audit_iterations() -> u32 {
    DEFAULT_MAX_AUDIT_ITERATIONS
}

fn default_max_diff_chars_per_commit() -> usize {
    DEFAULT_MAX_DIFF_CHARS_PER_COMMIT
}

fn default_max_diff_chars_total() -> usize {
    DEFAULT_MAX_DIFF_CHARS_TOTAL
}

fn default_agent_timeout_secs() -> u64 {
    120
}

fn default_skip_permissions() -> bool {
    true
}

impl Default for RefactorSection {
    fn default() -> Self {
        Self {
            base_branch: None,
            terminal: None,
            docs_dir: default_docs_dir(),
            max_audit_iterations: default_max_audit_iterations(),
            max_diff_chars_per_commit: default_max_diff_chars_per_commit(),
            max_diff_chars_total: default_max_diff_chars_total(),
            agent_timeout_secs: default_agent_timeout_secs(),
            skip_permissions: default_skip_permissions(),
        }
    }
}

/// The complete forge.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgeToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub refactor: RefactorSection,
}

impl ForgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse forge.toml")
    }

    /// Load configuration from the default location (.forge/forge.toml).
    /// Returns default configuration if file doesn't exist.
    pub fn load_or_default(forge_dir: &Path) -> Result<Self> {
        let config_path = forge_dir.join("forge.toml");
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize forge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Claude command: `CLAUDE_CMD` → file → "claude".
    pub fn claude_cmd(&self) -> String {
        self.claude_cmd_with(std::env::var("CLAUDE_CMD").ok())
    }

    fn claude_cmd_with(&self, env: Option<String>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .or_else(|| self.project.claude_cmd.clone())
            .unwrap_or_else(|| "claude".to_string())
    }

    /// Get skip_permissions, with fallback to environment variable.
    pub fn skip_permissions(&self) -> bool {
        // Environment variable can override file setting
        if let Ok(env_val) = std::env::var("SKIP_PERMISSIONS") {
            return env_val != "false";
        }
        self.refactor.skip_permissions
    }

    /// Terminal: `FORGE_TERMINAL` → file → auto. Unknown names fall back to auto.
    pub fn terminal(&self) -> TerminalKind {
        self.terminal_with(std::env::var("FORGE_TERMINAL").ok())
    }

    fn terminal_with(&self, env: Option<String>) -> TerminalKind {
        env.or_else(|| self.refactor.terminal.clone())
            .and_then(|name| name.parse().ok())
            .unwrap_or_default()
    }

    pub fn diff_limits(&self) -> DiffLimits {
        DiffLimits {
            per_commit: self.refactor.max_diff_chars_per_commit,
            total: self.refactor.max_diff_chars_total,
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let r = &self.refactor;

        if let Some(terminal) = &r.terminal
            && let Err(e) = terminal.parse::<TerminalKind>()
        {
            warnings.push(e);
        }
        if r.max_audit_iterations == 0 {
            warnings.push("max_audit_iterations is 0: every failed audit escalates".to_string());
        }
        if r.max_diff_chars_per_commit > r.max_diff_chars_total {
            warnings.push(format!(
                "max_diff_chars_per_commit ({}) exceeds max_diff_chars_total ({})",
                r.max_diff_chars_per_commit, r.max_diff_chars_total
            ));
        }
        if r.agent_timeout_secs == 0 {
            warnings.push("agent_timeout_secs is 0: agent calls will time out immediately".to_string());
        }
        if Path::new(&r.docs_dir).is_absolute() {
            warnings.push(format!(
                "docs_dir '{}' should be relative to the project root",
                r.docs_dir
            ));
        }

        warnings
    }
}

/// Parsed forge.toml bound to a project directory.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Path to the project directory
    pub project_dir: PathBuf,
    /// Path to the .forge directory
    pub forge_dir: PathBuf,
    /// Parsed forge.toml configuration
    pub toml: ForgeToml,
}

impl ForgeConfig {
    /// Create a new ForgeConfig from a project directory.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let forge_dir = project_dir.join(".forge");
        let toml = ForgeToml::load_or_default(&forge_dir)?;

        Ok(Self {
            project_dir,
            forge_dir,
            toml,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.forge_dir.join("forge.toml")
    }

    pub fn refactors_dir(&self) -> PathBuf {
        self.forge_dir.join("refactors")
    }
}
