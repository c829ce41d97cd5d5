//! Configuration view and validation commands: `forge-refactor config`.

use anyhow::Result;
use std::path::Path;

use forge_refactor::forge_config::ForgeToml;

use super::super::ConfigCommands;

fn print_values(toml: &ForgeToml) {
    let r = &toml.refactor;
    println!("[refactor]");
    if let Some(branch) = &r.base_branch {
        println!("  base_branch = \"{}\"", branch);
    }
    if let Some(terminal) = &r.terminal {
        println!("  terminal = \"{}\"", terminal);
    }
    println!("  docs_dir = \"{}\"", r.docs_dir);
    println!("  max_audit_iterations = {}", r.max_audit_iterations);
    println!("  max_diff_chars_per_commit = {}", r.max_diff_chars_per_commit);
    println!("  max_diff_chars_total = {}", r.max_diff_chars_total);
    println!("  agent_timeout_secs = {}", r.agent_timeout_secs);
    println!("  skip_permissions = {}", r.skip_permissions);
    println!();
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let forge_dir = project_dir.join(".forge");
    let config_path = forge_dir.join("forge.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Refactor Configuration");
            println!("======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                ForgeToml::load(&config_path)?
            } else {
                println!("No forge.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                ForgeToml::default()
            };

            if toml.project.name.is_some() || toml.project.claude_cmd.is_some() {
                println!("[project]");
                if let Some(name) = &toml.project.name {
                    println!("  name = \"{}\"", name);
                }
                if let Some(cmd) = &toml.project.claude_cmd {
                    println!("  claude_cmd = \"{}\"", cmd);
                }
                println!();
            }
            print_values(&toml);

            println!("Effective values (with env overrides):");
            println!("  claude_cmd = \"{}\"", toml.claude_cmd());
            println!("  terminal = \"{}\"", toml.terminal());
            println!("  skip_permissions = {}", toml.skip_permissions());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No forge.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ForgeToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("forge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            std::fs::create_dir_all(&forge_dir)?;
            ForgeToml::default().save(&config_path)?;

            println!("Created forge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] name, claude_cmd");
            println!("  - [refactor] terminal, docs_dir, max_audit_iterations, diff limits");
            println!();
        }
    }

    Ok(())
}
