use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::audit::DiffLimits;
use crate::forge_config::ForgeConfig;
use crate::launch::{ClaudeCli, TerminalKind};
use crate::refactor::{RefactorHandle, RefactorRegistry};

/// Runtime configuration for a `forge-refactor` invocation.
///
/// Resolves the project layout once and folds `forge.toml` and the
/// environment into plain values the commands hand to controllers.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub forge_dir: PathBuf,
    pub refactors_dir: PathBuf,
    /// Planning documents directory, relative to `project_dir`.
    pub docs_dir: String,
    pub claude_cmd: String,
    pub skip_permissions: bool,
    pub terminal: TerminalKind,
    pub base_branch: Option<String>,
    pub max_audit_iterations: u32,
    pub diff_limits: DiffLimits,
    pub agent_timeout_secs: u64,
    pub verbose: bool,
    /// The underlying unified configuration
    forge_config: ForgeConfig,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let forge_config = ForgeConfig::new(project_dir)?;
        let toml = &forge_config.toml;
        for warning in toml.validate() {
            tracing::warn!(warning = %warning, "forge.toml");
        }

        Ok(Self {
            project_dir: forge_config.project_dir.clone(),
            forge_dir: forge_config.forge_dir.clone(),
            refactors_dir: forge_config.refactors_dir(),
            docs_dir: toml.refactor.docs_dir.clone(),
            claude_cmd: toml.claude_cmd(),
            skip_permissions: toml.skip_permissions(),
            terminal: toml.terminal(),
            base_branch: toml.refactor.base_branch.clone(),
            max_audit_iterations: toml.refactor.max_audit_iterations,
            diff_limits: toml.diff_limits(),
            agent_timeout_secs: toml.refactor.agent_timeout_secs,
            verbose,
            forge_config,
        })
    }

    /// Get the underlying ForgeConfig.
    pub fn forge_config(&self) -> &ForgeConfig {
        &self.forge_config
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.refactors_dir)
            .context("Failed to create refactors directory")?;
        Ok(())
    }

    pub fn claude_flags(&self) -> Vec<String> {
        let mut flags = Vec::new();
        if self.skip_permissions {
            flags.push("--dangerously-skip-permissions".to_string());
        }
        flags
    }

    /// Interactive command typed into a new terminal.
    pub fn agent_command(&self) -> String {
        std::iter::once(self.claude_cmd.clone())
            .chain(self.claude_flags())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Non-interactive agent rooted at `working_dir`.
    pub fn agent(&self, working_dir: PathBuf) -> ClaudeCli {
        ClaudeCli::new(&self.claude_cmd, working_dir, self.agent_timeout_secs)
            .with_flags(self.claude_flags())
    }

    pub fn registry(&self) -> RefactorRegistry {
        RefactorRegistry::new(&self.refactors_dir)
    }

    /// Handle for an existing refactor.
    pub fn refactor(&self, refactor_id: &str) -> Result<RefactorHandle> {
        Ok(self.registry().handle(refactor_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_layout() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), true).unwrap();
        let root = dir.path().canonicalize().unwrap();
        assert!(config.verbose);
        assert_eq!(config.forge_dir, root.join(".forge"));
        assert_eq!(config.refactors_dir, root.join(".forge/refactors"));
        assert_eq!(config.docs_dir, "docs/MAJOR_REFACTOR_MODE");
        assert_eq!(config.max_audit_iterations, 3);
    }

    #[test]
    fn test_config_reads_forge_toml() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".forge")).unwrap();
        fs::write(
            dir.path().join(".forge/forge.toml"),
            "[refactor]\nmax_audit_iterations = 5\nskip_permissions = false\nbase_branch = \"main\"\n",
        )
        .unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        assert_eq!(config.max_audit_iterations, 5);
        assert_eq!(config.base_branch.as_deref(), Some("main"));
        assert_eq!(config.forge_config().toml.refactor.max_audit_iterations, 5);
    }

    #[test]
    fn test_claude_flags() {
        let dir = tempdir().unwrap();
        let mut config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.claude_cmd = "claude".into();
        config.skip_permissions = true;
        assert_eq!(config.agent_command(), "claude --dangerously-skip-permissions");
        config.skip_permissions = false;
        assert!(config.claude_flags().is_empty());
        assert_eq!(config.agent_command(), "claude");
    }

    #[test]
    fn test_ensure_directories_and_refactor_lookup() {
        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), false).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.refactors_dir.is_dir());

        assert!(config.refactor("missing").is_err());
        config.registry().create("Demo", "goal").unwrap();
        assert_eq!(config.refactor("demo").unwrap().id(), "demo");
    }

    #[test]
    fn test_missing_project_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::new(dir.path().join("nope"), false).is_err());
    }
}
