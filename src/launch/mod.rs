//! External collaborators: terminal launching and the AI agent CLI.
//!
//! The coordination core never spawns processes itself. It talks to these
//! two narrow traits so controllers can be exercised with in-memory fakes.

mod agent;
mod terminal;

pub use agent::ClaudeCli;
pub use terminal::{TerminalKind, TerminalLauncher};

use crate::errors::Result;
use async_trait::async_trait;
use std::path::Path;

/// Opens an interactive session in a directory, fire-and-forget.
///
/// `Ok(false)` means the launch could not be performed (no supported
/// terminal, launcher exited non-zero). The caller then prints manual
/// instructions instead.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn open(&self, directory: &Path, command: &str) -> Result<bool>;
}

/// One-shot text generation by an external agent.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records every launch request and answers with a fixed result.
    pub struct RecordingLauncher {
        pub result: bool,
        pub calls: Mutex<Vec<(PathBuf, String)>>,
    }

    impl RecordingLauncher {
        pub fn new(result: bool) -> Self {
            Self {
                result,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> Vec<(PathBuf, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessLauncher for RecordingLauncher {
        async fn open(&self, directory: &Path, command: &str) -> Result<bool> {
            self.calls
                .lock()
                .unwrap()
                .push((directory.to_path_buf(), command.to_string()));
            Ok(self.result)
        }
    }

    /// Returns a canned response and keeps the prompts it was given.
    pub struct CannedAgent {
        pub response: String,
        pub prompts: Mutex<Vec<String>>,
    }

    impl CannedAgent {
        pub fn new(response: impl Into<String>) -> Self {
            Self {
                response: response.into(),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for CannedAgent {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    /// Answers each call with the next scripted response, repeating the last.
    pub struct ScriptedAgent {
        pub responses: Vec<std::result::Result<String, String>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
            Self {
                responses,
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedAgent {
        async fn generate(&self, prompt: &str) -> Result<String> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            let index = (prompts.len() - 1).min(self.responses.len().saturating_sub(1));
            match self.responses.get(index) {
                Some(Ok(response)) => Ok(response.clone()),
                Some(Err(message)) => Err(crate::errors::RefactorError::AgentFailed(message.clone())),
                None => Ok(String::new()),
            }
        }
    }

    pub struct FailingAgent;

    #[async_trait]
    impl AgentInvoker for FailingAgent {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(crate::errors::RefactorError::AgentTimeout { secs: 1 })
        }
    }
}
