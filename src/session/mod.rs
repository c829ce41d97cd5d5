//! Execution sessions: spec resolution, agent instructions and the
//! launch/complete lifecycle of a single unit of work.

mod controller;
mod instructions;
mod spec;

pub use controller::{
    CompletionReport, DEFAULT_AGENT_COMMAND, DEFAULT_DOCS_DIR, ExecutionSession, LaunchReport,
};
pub use instructions::{
    ORIGINAL_CLAUDE_MD_HEADING, SessionOutput, execution_instructions, write_instructions,
    write_session_output,
};
pub use spec::{SessionSpec, SpecResolver, extract_section};
