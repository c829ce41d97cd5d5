use super::spec::SessionSpec;
use crate::errors::{RefactorError, Result};
use crate::refactor::RefactorHandle;
use crate::util::atomic_write;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Heading placed between generated instructions and a project's own CLAUDE.md.
pub const ORIGINAL_CLAUDE_MD_HEADING: &str = "# Original Project CLAUDE.md";

/// Instruction document for the agent running one execution session.
pub fn execution_instructions(refactor_id: &str, spec: &SessionSpec, docs_dir: &str) -> String {
    let scope_in = if spec.scope_in.is_empty() {
        "See prompt above".to_string()
    } else {
        spec.scope_in.join(", ")
    };
    let scope_out = if spec.scope_out.is_empty() {
        "See prompt above".to_string()
    } else {
        spec.scope_out.join(", ")
    };
    let ask_user = if spec.ask_user_if.is_empty() {
        "- No specific pause triggers for this session".to_string()
    } else {
        bullets(&spec.ask_user_if, "- ")
    };
    let exit_criteria = bullets(&spec.exit_criteria, "- [ ] ");

    format!(
        r#"# Execution Session: {title}

> **Refactor**: {refactor}
> **Session**: {session}
> **Generated**: {generated}

---

## FIRST: Read These Docs

1. `{docs}/PHILOSOPHY.md` - Guiding principles
2. `{docs}/DECISIONS.md` - Architecture decisions (don't re-litigate)

---

## Your Mission

{prompt}

---

## Scope

**IN scope**: {scope_in}

**OUT of scope**: {scope_out}

**Start when**: {start_when}

**Stop when**: {stop_when}

---

## When to Ask the User

{ask_user}

---

## Exit Criteria

Before marking this session complete, verify ALL of these:

{exit_criteria}

---

## Git Instructions

```bash
{git}
```

---

## Signaling Ready for Review

When every exit criterion is met and your work is committed, run:

```bash
forge-refactor done {refactor} {session}
```

This means "ready for audit", not final approval. If the audit finds
issues you will be asked to revise.

---

## Handoff Notes

{handoff}
"#,
        title = spec.title,
        refactor = refactor_id,
        session = spec.session_id,
        generated = Local::now().format("%Y-%m-%d %H:%M"),
        docs = docs_dir,
        prompt = spec.prompt,
        scope_in = scope_in,
        scope_out = scope_out,
        start_when = or_dash(&spec.start_when),
        stop_when = or_dash(&spec.stop_when),
        ask_user = ask_user,
        exit_criteria = exit_criteria,
        git = spec.git_instructions,
        handoff = spec.handoff,
    )
}

/// Write the session instructions.
///
/// The copy in `sessions/{id}/CLAUDE.md` is always written. With a worktree
/// the same content also goes to the worktree root, in front of any
/// existing project CLAUDE.md. Returns the directory the agent should run in.
pub fn write_instructions(
    handle: &RefactorHandle,
    session_id: &str,
    content: &str,
    worktree: Option<&Path>,
) -> Result<PathBuf> {
    let session_dir = handle.session_dir(session_id);
    atomic_write(&session_dir.join("CLAUDE.md"), content.as_bytes())?;

    let Some(worktree) = worktree else {
        return Ok(session_dir);
    };

    let target = worktree.join("CLAUDE.md");
    let combined = if target.is_file() {
        let existing = fs::read_to_string(&target).map_err(|e| RefactorError::io(&target, e))?;
        if existing.starts_with(content.lines().next().unwrap_or_default())
            && existing.contains(ORIGINAL_CLAUDE_MD_HEADING)
        {
            // Relaunch: replace the previous session block, keep the project part.
            let original = existing
                .split_once(ORIGINAL_CLAUDE_MD_HEADING)
                .map(|(_, rest)| rest.trim_start())
                .unwrap_or_default();
            format!("{}\n\n---\n\n{}\n\n{}", content, ORIGINAL_CLAUDE_MD_HEADING, original)
        } else {
            format!("{}\n\n---\n\n{}\n\n{}", content, ORIGINAL_CLAUDE_MD_HEADING, existing)
        }
    } else {
        content.to_string()
    };
    atomic_write(&target, combined.as_bytes())?;
    Ok(worktree.to_path_buf())
}

/// Content of a session's `output.md`.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    pub summary: String,
    pub accomplishments: Vec<String>,
    pub issues: Vec<String>,
    pub handoff_notes: String,
}

/// Write `sessions/{id}/output.md`, the record an audit reads back.
pub fn write_session_output(
    handle: &RefactorHandle,
    session_id: &str,
    output: &SessionOutput,
) -> Result<PathBuf> {
    let path = handle.session_dir(session_id).join("output.md");
    let accomplishments = if output.accomplishments.is_empty() {
        "- See commit for details".to_string()
    } else {
        bullets(&output.accomplishments, "- ")
    };
    let issues = if output.issues.is_empty() {
        "- None".to_string()
    } else {
        bullets(&output.issues, "- ")
    };
    let summary = if output.summary.is_empty() {
        "Session completed."
    } else {
        output.summary.as_str()
    };
    let handoff = if output.handoff_notes.is_empty() {
        "Ready for next session."
    } else {
        output.handoff_notes.as_str()
    };

    let content = format!(
        "# Session {} Output\n\n> **Completed**: {}\n\n## Summary\n\n{}\n\n## Accomplishments\n\n{}\n\n## Issues Encountered\n\n{}\n\n## Handoff Notes\n\n{}\n",
        session_id,
        Local::now().format("%Y-%m-%d %H:%M"),
        summary,
        accomplishments,
        issues,
        handoff,
    );
    atomic_write(&path, content.as_bytes())?;
    Ok(path)
}

fn bullets(items: &[String], prefix: &str) -> String {
    items
        .iter()
        .map(|item| format!("{}{}", prefix, item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_spec() -> SessionSpec {
        SessionSpec {
            session_id: "1.1".into(),
            title: "Core".into(),
            prompt: "Build the core.".into(),
            exit_criteria: vec!["Tests pass".into()],
            git_instructions: "git commit".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_execution_instructions_content() {
        let doc = execution_instructions("demo", &sample_spec(), "docs/MAJOR_REFACTOR_MODE");
        assert!(doc.starts_with("# Execution Session: Core"));
        assert!(doc.contains("Build the core."));
        assert!(doc.contains("- [ ] Tests pass"));
        assert!(doc.contains("No specific pause triggers"));
        assert!(doc.contains("forge-refactor done demo 1.1"));
        assert!(doc.contains("docs/MAJOR_REFACTOR_MODE/PHILOSOPHY.md"));
    }

    #[test]
    fn test_write_instructions_without_worktree() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "demo");
        let work_dir = write_instructions(&handle, "1.1", "# Doc", None).unwrap();
        assert_eq!(work_dir, handle.session_dir("1.1"));
        assert_eq!(
            fs::read_to_string(work_dir.join("CLAUDE.md")).unwrap(),
            "# Doc"
        );
    }

    #[test]
    fn test_write_instructions_prepends_to_project_file() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path().join("refactors"), "demo");
        let worktree = dir.path().join("wt");
        fs::create_dir_all(&worktree).unwrap();
        fs::write(worktree.join("CLAUDE.md"), "Project rules").unwrap();

        write_instructions(&handle, "1.1", "# Session doc", Some(&worktree)).unwrap();
        let combined = fs::read_to_string(worktree.join("CLAUDE.md")).unwrap();
        assert!(combined.starts_with("# Session doc"));
        assert!(combined.ends_with("Project rules"));

        // A relaunch replaces the session part instead of stacking another copy.
        write_instructions(&handle, "1.1", "# Session doc", Some(&worktree)).unwrap();
        let again = fs::read_to_string(worktree.join("CLAUDE.md")).unwrap();
        assert_eq!(again, combined);
        assert!(handle.session_dir("1.1").join("CLAUDE.md").is_file());
    }

    #[test]
    fn test_write_session_output_defaults() {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "demo");
        let path = write_session_output(&handle, "1.1", &SessionOutput::default()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.starts_with("# Session 1.1 Output"));
        assert!(content.contains("Session completed."));
        assert!(content.contains("- None"));
    }
}
