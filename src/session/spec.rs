//! Session specs parsed out of planning documents.
//!
//! A session section in `EXECUTION_PLAN.md` looks like:
//!
//! ~~~text
//! ### Session 1.1: Core State & Signals
//!
//! | Field | Value |
//! |-------|-------|
//! | **Worktree** | YES |
//! | **Scope** | IN: state module. OUT: CLI |
//! | **Start When** | Plan approved |
//! | **Stop When** | Tests pass |
//!
//! **PROMPT**
//! ```
//! Implement the state store...
//! ```
//!
//! **ASK USER IF...**
//! - The schema needs to change
//!
//! **EXIT CRITERIA**
//! - [ ] All tests pass
//!
//! **GIT INSTRUCTIONS**
//! ```bash
//! git commit -m "..."
//! ```
//!
//! **HANDOFF**
//! Free text until `---` or a `**Files` line.
//! ~~~
//!
//! Each piece is optional. The scanner fills whatever it recognises and
//! leaves the rest at its default.

use crate::refactor::RefactorHandle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSpec {
    pub session_id: String,
    pub title: String,
    /// Whether the session runs in its own git worktree.
    pub worktree: bool,
    pub scope_in: Vec<String>,
    pub scope_out: Vec<String>,
    pub start_when: String,
    pub stop_when: String,
    pub prompt: String,
    pub ask_user_if: Vec<String>,
    pub exit_criteria: Vec<String>,
    pub git_instructions: String,
    pub handoff: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Prompt,
    AskUser,
    ExitCriteria,
    GitInstructions,
    Handoff,
    Closed,
}

impl SessionSpec {
    /// Parse one session section. Never fails: unknown or missing parts
    /// stay empty and the title falls back to `Session {id}`.
    pub fn parse(session_id: &str, content: &str) -> SessionSpec {
        let mut spec = SessionSpec {
            session_id: session_id.to_string(),
            ..Default::default()
        };
        let mut title = None;
        let mut section = Section::Preamble;
        let mut fence: Option<Vec<&str>> = None;
        let mut handoff: Vec<&str> = Vec::new();

        for raw in content.lines() {
            let line = raw.trim();

            if let Some(buf) = fence.as_mut() {
                if line.starts_with("```") {
                    let block = buf.join("\n").trim().to_string();
                    match section {
                        Section::Prompt => spec.prompt = block,
                        Section::GitInstructions => spec.git_instructions = block,
                        _ => {}
                    }
                    fence = None;
                    section = Section::Closed;
                } else {
                    buf.push(raw);
                }
                continue;
            }

            if title.is_none() {
                if let Some(t) = parse_title(line) {
                    title = Some(t.to_string());
                    continue;
                }
            }

            if let Some(next) = section_marker(line) {
                section = next;
                continue;
            }

            if parse_table_row(&mut spec, line) {
                continue;
            }

            match section {
                Section::Prompt | Section::GitInstructions => {
                    let taken = match section {
                        Section::Prompt => !spec.prompt.is_empty(),
                        _ => !spec.git_instructions.is_empty(),
                    };
                    if line.starts_with("```") && !taken {
                        fence = Some(Vec::new());
                    }
                }
                Section::AskUser => match bullet_item(line) {
                    Some(item) => spec.ask_user_if.push(item.to_string()),
                    None if line.is_empty() && spec.ask_user_if.is_empty() => {}
                    None => section = Section::Closed,
                },
                Section::ExitCriteria => match checkbox_item(line) {
                    Some(item) => spec.exit_criteria.push(item.to_string()),
                    None if line.is_empty() && spec.exit_criteria.is_empty() => {}
                    None => section = Section::Closed,
                },
                Section::Handoff => {
                    if line.starts_with("---") || line.starts_with("**Files") {
                        section = Section::Closed;
                    } else {
                        handoff.push(raw);
                    }
                }
                Section::Preamble | Section::Closed => {}
            }
        }

        spec.title = title.unwrap_or_else(|| format!("Session {}", session_id));
        spec.handoff = handoff.join("\n").trim().to_string();
        spec
    }
}

/// `### Session 1.1: Title` -> `Title`.
fn parse_title(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("###")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("Session")?;
    let rest = rest.trim_start();
    let id_len = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(rest.len());
    if id_len == 0 {
        return None;
    }
    let title = rest[id_len..].trim_start().strip_prefix(':')?.trim();
    if title.is_empty() { None } else { Some(title) }
}

fn section_marker(line: &str) -> Option<Section> {
    let rest = line.strip_prefix("**")?;
    let end = rest.find("**")?;
    let name = rest[..end]
        .trim()
        .trim_end_matches(['.', '…'])
        .trim()
        .to_uppercase();
    match name.as_str() {
        "PROMPT" => Some(Section::Prompt),
        "ASK USER IF" => Some(Section::AskUser),
        "EXIT CRITERIA" => Some(Section::ExitCriteria),
        "GIT INSTRUCTIONS" => Some(Section::GitInstructions),
        "HANDOFF" => Some(Section::Handoff),
        _ => None,
    }
}

/// Value cell following `**key**` in a markdown table row.
fn table_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    let marker = format!("**{}**", key);
    let start = line.find(&marker)? + marker.len();
    let rest = line[start..].trim_start().strip_prefix('|')?;
    let value = rest.split('|').next().unwrap_or("").trim();
    Some(value)
}

fn parse_table_row(spec: &mut SessionSpec, line: &str) -> bool {
    if let Some(value) = table_value(line, "Worktree") {
        spec.worktree = value
            .split_whitespace()
            .next()
            .is_some_and(|v| v.eq_ignore_ascii_case("yes"));
        return true;
    }
    if let Some(value) = table_value(line, "Scope") {
        let (scope_in, scope_out) = parse_scope(value);
        spec.scope_in = scope_in.into_iter().collect();
        spec.scope_out = scope_out.into_iter().collect();
        return true;
    }
    if let Some(value) = table_value(line, "Start When") {
        spec.start_when = value.to_string();
        return true;
    }
    if let Some(value) = table_value(line, "Stop When") {
        spec.stop_when = value.to_string();
        return true;
    }
    false
}

/// `IN: a, b. OUT: c` -> (Some("a, b"), Some("c")).
fn parse_scope(value: &str) -> (Option<String>, Option<String>) {
    let clean = |s: &str| {
        let s = s.trim().trim_end_matches('.').trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    let (in_part, out_part) = match value.rfind("OUT:") {
        Some(idx) => (&value[..idx], Some(&value[idx + "OUT:".len()..])),
        None => (value, None),
    };
    let scope_in = in_part.trim().strip_prefix("IN:").and_then(clean);
    (scope_in, out_part.and_then(clean))
}

fn bullet_item(line: &str) -> Option<&str> {
    let item = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?
        .trim();
    if item.is_empty() { None } else { Some(item) }
}

/// `- [ ] text` or `- [x] text` -> `text`.
fn checkbox_item(line: &str) -> Option<&str> {
    let rest = bullet_item(line)?;
    let rest = rest.strip_prefix('[')?;
    let mut chars = rest.chars();
    chars.next()?;
    let rest = chars.as_str().strip_prefix(']')?.trim();
    if rest.is_empty() { None } else { Some(rest) }
}

/// Body of `### Session {id}...` up to the next `### Session` heading.
///
/// The id must be followed by `:` or whitespace, so `1.1` never matches
/// a `1.10` heading.
pub fn extract_section(content: &str, session_id: &str) -> Option<String> {
    let mut collected: Option<Vec<&str>> = None;
    for line in content.lines() {
        let heading = session_heading_id(line.trim());
        if let Some(lines) = collected.as_mut() {
            if heading.is_some() {
                break;
            }
            lines.push(line);
        } else if heading.is_some_and(|id| heading_matches(id, session_id)) {
            collected = Some(vec![line]);
        }
    }
    collected.map(|lines| lines.join("\n"))
}

/// The text after `### Session ` on a session heading line.
fn session_heading_id(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("###")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start().strip_prefix("Session")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

fn heading_matches(heading_rest: &str, session_id: &str) -> bool {
    match heading_rest.strip_prefix(session_id) {
        Some(after) => after.is_empty() || after.starts_with(':') || after.starts_with(char::is_whitespace),
        None => false,
    }
}

/// Finds the spec for a session: `sessions/{id}/spec.md` first, then the
/// session's section in the first planning document that has one.
#[derive(Debug, Clone)]
pub struct SpecResolver {
    handle: RefactorHandle,
    plan_documents: Vec<PathBuf>,
}

impl SpecResolver {
    pub fn new(handle: &RefactorHandle, project_dir: &Path, docs_dir: &str) -> Self {
        let refactor_dir = handle.dir();
        Self {
            handle: handle.clone(),
            plan_documents: vec![
                refactor_dir.join("EXECUTION.md"),
                refactor_dir.join("EXECUTION_PLAN.md"),
                project_dir.join(docs_dir).join("EXECUTION_PLAN.md"),
            ],
        }
    }

    pub fn plan_documents(&self) -> &[PathBuf] {
        &self.plan_documents
    }

    pub fn resolve(&self, session_id: &str) -> Option<SessionSpec> {
        let override_path = self.handle.session_dir(session_id).join("spec.md");
        if let Some(content) = read_if_present(&override_path) {
            debug!(session = session_id, path = %override_path.display(), "Using per-session spec");
            return Some(SessionSpec::parse(session_id, &content));
        }

        for plan in &self.plan_documents {
            let Some(content) = read_if_present(plan) else {
                continue;
            };
            if let Some(section) = extract_section(&content, session_id) {
                debug!(session = session_id, path = %plan.display(), "Found session in plan");
                return Some(SessionSpec::parse(session_id, &section));
            }
        }
        None
    }
}

fn read_if_present(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read planning document");
            None
        }
    }
}
