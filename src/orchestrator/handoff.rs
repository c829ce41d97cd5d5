//! `ORCHESTRATOR_HANDOFF.md`: context passed from one orchestrator
//! instance to its successor.

use super::summary::{SignalSummary, phase_progress, status_marker};
use crate::state::RefactorState;
use chrono::Local;
use regex::Regex;
use std::sync::LazyLock;

static GENERATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Generation\W*Orchestrator\s*#(\d+)\s*(?:→|->)\s*#(\d+)").unwrap()
});

/// What the outgoing orchestrator wants its successor to know.
#[derive(Debug, Clone, Default)]
pub struct HandoffNotes {
    pub why_handoff: String,
    pub conversation_context: String,
    pub open_questions: Vec<String>,
    pub notes: String,
}

/// The incoming generation recorded in a handoff document, 1 if none.
pub fn parse_generation(content: &str) -> u32 {
    GENERATION_REGEX
        .captures(content)
        .and_then(|caps| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(1)
}

fn or_placeholder<'a>(text: &'a str, placeholder: &'a str) -> &'a str {
    if text.trim().is_empty() { placeholder } else { text }
}

pub fn render_handoff(
    refactor_id: &str,
    generation: u32,
    state: Option<&RefactorState>,
    signals: &SignalSummary,
    notes: &HandoffNotes,
) -> String {
    let sessions = match state {
        Some(s) if !s.sessions.is_empty() => s
            .sessions
            .values()
            .map(|sess| {
                format!(
                    "- {} Session {}: {}",
                    status_marker(sess.status),
                    sess.session_id,
                    sess.status
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "- No sessions tracked yet".to_string(),
    };
    let phases = state
        .map(phase_progress)
        .filter(|p| !p.is_empty())
        .map(|p| p.iter().map(|ph| ph.line()).collect::<Vec<_>>().join("\n"))
        .unwrap_or_else(|| "No phases tracked yet.".to_string());
    let questions = if notes.open_questions.is_empty() {
        "No open questions.".to_string()
    } else {
        notes
            .open_questions
            .iter()
            .map(|q| format!("- {}", q))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"# Orchestrator Handoff - {refactor_id}

> **Updated**: {updated}
> **Refactor**: {refactor_id}
> **Status**: {status}
> **Generation**: Orchestrator #{generation} → #{next}

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

## Current State

**Current Session**: {current}

### Phase Progress

{phases}

### Session Details

{sessions}

---

{signals}

---

## Orchestrator Commands

```bash
forge-refactor status {refactor_id}
forge-refactor start {refactor_id} <session-id>
forge-refactor audit {refactor_id} <session-id>...
forge-refactor advance {refactor_id} <from> <to>
```

---

## Notes from This Session

{notes}

---

## Key Files

- `PHILOSOPHY.md` - Principles (stable anchor, read first)
- `DECISIONS.md` - Architecture decisions
- `EXECUTION_PLAN.md` - All session specs
- `state.json` - Runtime state
- `signals/` - Agent signals

All paths are relative to the refactor directory.
"#,
        refactor_id = refactor_id,
        updated = Local::now().format("%Y-%m-%d %H:%M"),
        status = state.map_or("unknown", |s| s.status.as_str()),
        generation = generation,
        next = generation + 1,
        why = or_placeholder(&notes.why_handoff, "No specific reason recorded."),
        context = or_placeholder(
            &notes.conversation_context,
            "No conversation context recorded."
        ),
        questions = questions,
        current = state
            .and_then(|s| s.current_session.as_deref())
            .unwrap_or("None"),
        phases = phases,
        sessions = sessions,
        signals = signals.to_markdown(),
        notes = or_placeholder(&notes.notes, "No additional notes."),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generation() {
        assert_eq!(parse_generation("no header here"), 1);
        assert_eq!(parse_generation("Generation: Orchestrator #3 → #4"), 4);
        assert_eq!(parse_generation("> **Generation**: Orchestrator #1 → #2"), 2);
        assert_eq!(parse_generation("Generation: Orchestrator #7 -> #8"), 8);
    }

    #[test]
    fn test_render_round_trips_generation() {
        let doc = render_handoff(
            "demo",
            2,
            None,
            &SignalSummary::default(),
            &HandoffNotes::default(),
        );
        assert!(doc.contains("Orchestrator #2 → #3"));
        assert_eq!(parse_generation(&doc), 3);
        assert!(doc.contains("No specific reason recorded."));
        assert!(doc.contains("- No sessions tracked yet"));
        assert!(doc.contains("**Status**: unknown"));
    }

    #[test]
    fn test_render_with_state_and_notes() {
        let mut state = RefactorState::new("demo");
        state.start_session("1.1").unwrap();
        let notes = HandoffNotes {
            why_handoff: "context tight".into(),
            open_questions: vec!["Split phase 2?".into()],
            ..Default::default()
        };
        let doc = render_handoff("demo", 1, Some(&state), &SignalSummary::default(), &notes);
        assert!(doc.contains("context tight"));
        assert!(doc.contains("- Split phase 2?"));
        assert!(doc.contains("- 🔄 Session 1.1: in_progress"));
        assert!(doc.contains("- 🔄 Phase 1: In progress"));
        assert!(doc.contains("**Current Session**: 1.1"));
    }
}
