//! `PLANNING_HANDOFF.md`: what one planner passes to the next.

use crate::refactor::RefactorMetadata;
use chrono::Local;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static GENERATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Generation\W*Planner\s*#(\d+)\s*(?:→|->)\s*#(\d+)").unwrap()
});

/// Planning documents tracked in every handoff, in reading order.
pub const PLANNING_DOCS: &[&str] = &[
    "PHILOSOPHY.md",
    "VISION.md",
    "DECISIONS.md",
    "PRE_REFACTOR.md",
    "EXECUTION_PLAN.md",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocStatus {
    #[default]
    NotStarted,
    InProgress,
    Draft,
    Complete,
}

impl DocStatus {
    pub fn marker(self) -> &'static str {
        match self {
            DocStatus::NotStarted => "⬜",
            DocStatus::InProgress => "🔄",
            DocStatus::Draft => "📝",
            DocStatus::Complete => "✅",
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocStatus::NotStarted => "not started",
            DocStatus::InProgress => "in progress",
            DocStatus::Draft => "draft",
            DocStatus::Complete => "complete",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DocStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "not started" | "todo" => Ok(DocStatus::NotStarted),
            "in progress" | "started" => Ok(DocStatus::InProgress),
            "draft" => Ok(DocStatus::Draft),
            "complete" | "completed" | "done" => Ok(DocStatus::Complete),
            other => Err(format!(
                "Unknown document status '{}'. Use: not-started, in-progress, draft, complete",
                other
            )),
        }
    }
}

/// Normalize a planning doc name: `vision` and `VISION.md` both become `VISION.md`.
pub fn doc_name(name: &str) -> String {
    let stem = name.trim().trim_end_matches(".md").trim_end_matches(".MD");
    format!("{}.md", stem.to_uppercase())
}

/// Parse `NAME=STATUS` as given on the command line.
pub fn parse_doc_status(arg: &str) -> Result<(String, DocStatus), String> {
    let (name, status) = arg
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=STATUS, got '{}'", arg))?;
    Ok((doc_name(name), status.parse()?))
}

/// What the outgoing planner wants its successor to know.
#[derive(Debug, Clone, Default)]
pub struct PlanningHandoffNotes {
    pub why_handoff: String,
    pub conversation_context: String,
    pub open_questions: Vec<String>,
    pub decisions_in_progress: Vec<String>,
    pub user_preferences: Vec<String>,
    pub docs_state: BTreeMap<String, DocStatus>,
}

/// The incoming planner generation recorded in a handoff, 1 if none.
pub fn parse_planning_generation(content: &str) -> u32 {
    GENERATION_REGEX
        .captures(content)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn list_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items
            .iter()
            .map(|i| format!("- {}", i))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn text_or<'a>(text: &'a str, empty: &'a str) -> &'a str {
    if text.trim().is_empty() { empty } else { text }
}

pub fn render_planning_handoff(
    metadata: &RefactorMetadata,
    generation: u32,
    notes: &PlanningHandoffNotes,
) -> String {
    let mut names: Vec<&str> = PLANNING_DOCS.to_vec();
    names.extend(
        notes
            .docs_state
            .keys()
            .map(String::as_str)
            .filter(|name| !PLANNING_DOCS.contains(name)),
    );
    let docs = names
        .into_iter()
        .map(|name| {
            let status = notes.docs_state.get(name).copied().unwrap_or_default();
            format!("- {} {}: {}", status.marker(), name, status)
        })
        .collect::<Vec<_>>()
        .join("\n");
    let next = generation + 1;
    let id = &metadata.id;
    let title = &metadata.title;

    format!(
        r#"# Planning Handoff - {id}

> **Updated**: {updated}
> **Refactor**: {title}
> **Goal**: {goal}
> **Generation**: Planner #{generation} → #{next}

---

## Read This Before Starting

You are **Planner #{next}** for the "{title}" refactor.
A previous planner has handed off to you. Read this file carefully before continuing.

Introduce yourself: "I'm Planner #{next} for {title}, continuing from #{generation}. Let me review where we left off..."

---

## Why This Handoff

{why}

---

## Conversation Context

{context}

---

## Open Questions / Pending Decisions

{questions}

---

## Decisions In Progress

These decisions were being discussed but not yet finalized:

{decisions}

---

## User Preferences Discovered

{preferences}

---

## Document Status

{docs}

---

## Planning Commands

```bash
forge-refactor plan --resume {id}
forge-refactor analyze {id}
forge-refactor orchestrate {id}
```

---

## Key Files

- `CLAUDE.md`: planning session instructions
- `metadata.json`: refactor metadata
- `PHILOSOPHY.md` and `VISION.md` are immutable once written
- `DECISIONS.md` records rejected alternatives as well as choices
- `PRE_REFACTOR.md` is the codebase snapshot
- `EXECUTION_PLAN.md` holds the phased sessions
"#,
        id = id,
        updated = Local::now().format("%Y-%m-%d %H:%M"),
        title = title,
        goal = text_or(&metadata.goal, "Unknown"),
        generation = generation,
        next = next,
        why = text_or(&notes.why_handoff, "No specific reason recorded."),
        context = text_or(&notes.conversation_context, "No conversation context recorded."),
        questions = list_or(&notes.open_questions, "No open questions."),
        decisions = list_or(&notes.decisions_in_progress, "No decisions pending."),
        preferences = list_or(&notes.user_preferences, "None discovered yet."),
        docs = docs,
    )
}
