//! File-backed coordination for multi-session refactors driven by AI agents.
//!
//! Each refactor lives in its own directory under `.forge/refactors/` and
//! holds a state document, an append-only signal log and the planning
//! documents its sessions are specified in. Agents run as separate
//! processes and coordinate only through those files.

pub mod audit;
pub mod config;
pub mod errors;
pub mod forge_config;
pub mod launch;
pub mod orchestrator;
pub mod planning;
pub mod refactor;
pub mod session;
pub mod signals;
pub mod state;
pub mod tracker;
pub mod util;
