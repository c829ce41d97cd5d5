use super::ProcessLauncher;
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Which terminal to open new sessions in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    #[default]
    Auto,
    Tmux,
    Iterm2,
    #[serde(rename = "terminal")]
    TerminalApp,
    Warp,
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalKind::Auto => write!(f, "auto"),
            TerminalKind::Tmux => write!(f, "tmux"),
            TerminalKind::Iterm2 => write!(f, "iterm2"),
            TerminalKind::TerminalApp => write!(f, "terminal"),
            TerminalKind::Warp => write!(f, "warp"),
        }
    }
}

impl FromStr for TerminalKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TerminalKind::Auto),
            "tmux" => Ok(TerminalKind::Tmux),
            "iterm2" | "iterm" => Ok(TerminalKind::Iterm2),
            "terminal" | "terminal.app" => Ok(TerminalKind::TerminalApp),
            "warp" => Ok(TerminalKind::Warp),
            _ => Err(format!(
                "Invalid terminal '{}'. Valid values: auto, tmux, iterm2, terminal, warp",
                s
            )),
        }
    }
}

impl TerminalKind {
    /// Resolve `Auto` from the environment: tmux first, then `TERM_PROGRAM`,
    /// then Terminal.app on macOS. None when nothing usable is found.
    pub fn detect(tmux: Option<&str>, term_program: Option<&str>) -> Option<TerminalKind> {
        if tmux.is_some_and(|v| !v.is_empty()) {
            return Some(TerminalKind::Tmux);
        }
        match term_program {
            Some("iTerm.app") => Some(TerminalKind::Iterm2),
            Some("WarpTerminal") => Some(TerminalKind::Warp),
            Some("Apple_Terminal") => Some(TerminalKind::TerminalApp),
            _ if cfg!(target_os = "macos") => Some(TerminalKind::TerminalApp),
            _ => None,
        }
    }

    fn resolve(self) -> Option<TerminalKind> {
        match self {
            TerminalKind::Auto => TerminalKind::detect(
                std::env::var("TMUX").ok().as_deref(),
                std::env::var("TERM_PROGRAM").ok().as_deref(),
            ),
            other => Some(other),
        }
    }
}

/// Program and arguments that open `command` in `directory` for a terminal.
pub(crate) fn build_invocation(
    kind: TerminalKind,
    directory: &Path,
    command: &str,
) -> Option<(String, Vec<String>)> {
    let dir = directory.display().to_string();
    let shell_line = if command.is_empty() {
        format!("cd \"{}\"", dir)
    } else {
        format!("cd \"{}\" && {}", dir, command)
    };
    let escaped = shell_line.replace('\\', "\\\\").replace('"', "\\\"");

    match kind {
        TerminalKind::Auto => None,
        TerminalKind::Tmux => {
            let mut args = vec!["new-window".to_string(), "-c".to_string(), dir];
            if !command.is_empty() {
                args.push(command.to_string());
            }
            Some(("tmux".to_string(), args))
        }
        TerminalKind::Iterm2 => {
            let script = format!(
                "tell application \"iTerm\"\n  activate\n  tell current window\n    create tab with default profile\n    tell current session\n      write text \"{}\"\n    end tell\n  end tell\nend tell",
                escaped
            );
            Some(osascript(script))
        }
        TerminalKind::TerminalApp => {
            let script = format!(
                "tell application \"Terminal\"\n  activate\n  do script \"{}\"\nend tell",
                escaped
            );
            Some(osascript(script))
        }
        TerminalKind::Warp => {
            let script = format!(
                "tell application \"Warp\" to activate\ndelay 0.5\ntell application \"System Events\"\n  keystroke \"n\" using command down\n  delay 0.5\n  keystroke \"{}\"\n  key code 36\nend tell",
                escaped
            );
            Some(osascript(script))
        }
    }
}

fn osascript(script: String) -> (String, Vec<String>) {
    ("osascript".to_string(), vec!["-e".to_string(), script])
}

/// Opens a new terminal tab or window running a command.
#[derive(Debug, Clone, Default)]
pub struct TerminalLauncher {
    kind: TerminalKind,
}

impl TerminalLauncher {
    pub fn new(kind: TerminalKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> TerminalKind {
        self.kind
    }
}

#[async_trait]
impl ProcessLauncher for TerminalLauncher {
    async fn open(&self, directory: &Path, command: &str) -> Result<bool> {
        let Some(kind) = self.kind.resolve() else {
            warn!("No supported terminal detected");
            return Ok(false);
        };
        let Some((program, args)) = build_invocation(kind, directory, command) else {
            return Ok(false);
        };

        debug!(terminal = %kind, program = %program, "Launching terminal");
        match Command::new(&program).args(&args).output().await {
            Ok(output) if output.status.success() => {
                info!(terminal = %kind, dir = %directory.display(), "Terminal opened");
                Ok(true)
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(
                    terminal = %kind,
                    code = output.status.code().unwrap_or(-1),
                    stderr = %stderr.trim(),
                    "Terminal launch failed"
                );
                Ok(false)
            }
            Err(e) => {
                warn!(terminal = %kind, error = %e, "Could not run terminal launcher");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kind_parse_and_display() {
        for kind in [
            TerminalKind::Auto,
            TerminalKind::Tmux,
            TerminalKind::Iterm2,
            TerminalKind::TerminalApp,
            TerminalKind::Warp,
        ] {
            assert_eq!(kind.to_string().parse::<TerminalKind>().unwrap(), kind);
        }
        assert_eq!("iTerm".parse::<TerminalKind>().unwrap(), TerminalKind::Iterm2);
        assert!("konsole".parse::<TerminalKind>().is_err());
    }

    #[test]
    fn test_detect_prefers_tmux() {
        assert_eq!(
            TerminalKind::detect(Some("/tmp/tmux-1000/default,1,0"), Some("iTerm.app")),
            Some(TerminalKind::Tmux)
        );
        assert_eq!(
            TerminalKind::detect(None, Some("WarpTerminal")),
            Some(TerminalKind::Warp)
        );
        assert_eq!(
            TerminalKind::detect(Some(""), Some("iTerm.app")),
            Some(TerminalKind::Iterm2)
        );
    }

    #[test]
    fn test_tmux_invocation() {
        let (program, args) =
            build_invocation(TerminalKind::Tmux, Path::new("/work/tree"), "claude --print").unwrap();
        assert_eq!(program, "tmux");
        assert_eq!(args, vec!["new-window", "-c", "/work/tree", "claude --print"]);
    }

    #[test]
    fn test_applescript_escapes_quotes() {
        let (program, args) =
            build_invocation(TerminalKind::TerminalApp, Path::new("/a b"), "echo \"hi\"").unwrap();
        assert_eq!(program, "osascript");
        assert!(args[1].contains("cd \\\"/a b\\\" && echo \\\"hi\\\""));
        assert!(build_invocation(TerminalKind::Auto, Path::new("/"), "x").is_none());
    }
}
