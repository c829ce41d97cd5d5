//! Goal-focused codebase analysis written to `PRE_REFACTOR.md`.
//!
//! The analyzer walks the project (honouring `.gitignore`), asks the agent
//! which files matter for the refactor goal, then feeds samples of those
//! files back for a structured summary. Any agent failure degrades to a
//! placeholder analysis built from the file scan alone.

use crate::errors::Result;
use crate::launch::AgentInvoker;
use crate::util::{atomic_write, extract_json_object, truncate_with_marker};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files listed to the agent when asking for relevant ones.
const TREE_FILES: usize = 100;
const MAX_SCANNED_FILES: usize = 200;
const MAX_SAMPLED_FILES: usize = 15;
const MAX_CONTEXT_FILES: usize = 10;
const SAMPLE_LINES: usize = 80;
const SAMPLE_CHARS: usize = 2000;

const DEFAULT_IGNORES: &[&str] = &[
    ".git",
    "target",
    "__pycache__",
    "*.pyc",
    "node_modules",
    ".venv",
    "venv",
    ".forge",
    ".worktrees",
    "*.egg-info",
    "build",
    "dist",
    ".DS_Store",
];

const CODE_EXTENSIONS: &[&str] = &[
    "py", "swift", "ts", "tsx", "js", "jsx", "go", "rs", "java", "kt", "rb", "php", "c", "cpp",
    "h", "hpp", "cs", "md", "json", "yaml", "yml", "toml",
];

/// One file the analysis singled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFile {
    pub path: String,
    pub purpose: String,
    pub key_lines: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub goal: String,
    pub executive_summary: String,
    pub current_architecture: String,
    pub key_files: Vec<KeyFile>,
    pub patterns_in_use: Vec<String>,
    pub known_gaps: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Placeholder used when the agent could not produce an analysis.
    fn fallback(goal: &str, scanned: usize, files: &[RelevantFile]) -> Self {
        Self {
            goal: goal.to_string(),
            executive_summary: format!(
                "Scanned {} files for goal: {}. AI analysis incomplete: the agent may have timed out or returned an error. The files listed below are potentially relevant based on file structure.",
                scanned, goal
            ),
            current_architecture:
                "Manual analysis required. Consider re-running with a more specific goal.".to_string(),
            key_files: files
                .iter()
                .map(|f| KeyFile {
                    path: f.path.clone(),
                    purpose: f.relevance.clone(),
                    key_lines: String::new(),
                })
                .collect(),
            patterns_in_use: vec!["Unable to detect patterns - manual review needed".to_string()],
            known_gaps: vec![
                "AI analysis incomplete - verify results manually".to_string(),
                "Check that the agent CLI is installed and responding".to_string(),
            ],
            generated_at: Utc::now(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let key_files = if self.key_files.is_empty() {
            "*No key files identified.*".to_string()
        } else {
            let mut rows = vec![
                "| File | Purpose | Key Lines |".to_string(),
                "|------|---------|-----------|".to_string(),
            ];
            rows.extend(self.key_files.iter().map(|f| {
                format!("| `{}` | {} | {} |", f.path, f.purpose, f.key_lines)
            }));
            rows.join("\n")
        };

        format!(
            r#"# Pre-Refactor Codebase Analysis

> **Goal**: {goal}
> **Generated**: {generated}
>
> ## For agents
>
> This is a **snapshot document**.
> - Line numbers may shift after code changes
> - Use it for **architectural understanding**, not exact references
> - For the execution workflow see EXECUTION_PLAN.md

---

## Executive Summary

{summary}

---

## Current Architecture

{architecture}

---

## Key Files

{key_files}

---

## Patterns in Use

{patterns}

---

## Known Gaps / Issues

{gaps}

---

## Summary

This analysis provides context for the refactor goal. Execution sessions should:
1. Read this document to understand the current state
2. Reference PHILOSOPHY.md for guiding principles
3. Check DECISIONS.md for approved architecture
"#,
            goal = self.goal,
            generated = self.generated_at.format("%Y-%m-%d"),
            summary = self.executive_summary,
            architecture = self.current_architecture,
            key_files = key_files,
            patterns = bullets(&self.patterns_in_use, "*No specific patterns identified.*"),
            gaps = bullets(&self.known_gaps, "*No known gaps identified.*"),
        )
    }

    /// Write `PRE_REFACTOR.md` into `output_dir`.
    pub fn save(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join("PRE_REFACTOR.md");
        atomic_write(&path, self.to_markdown().as_bytes())?;
        info!(path = %path.display(), key_files = self.key_files.len(), "Analysis saved");
        Ok(path)
    }
}

fn bullets(items: &[String], empty: &str) -> String {
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

#[derive(Debug, Clone, Deserialize)]
struct RelevantFile {
    path: String,
    #[serde(default)]
    relevance: String,
}

#[derive(Debug, Deserialize)]
struct RelevantFiles {
    #[serde(default)]
    relevant_files: Vec<RelevantFile>,
}

/// `*` stays within one path segment when matching whole paths.
const PATH_MATCH: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// One `.gitignore`-style rule.
#[derive(Debug)]
struct IgnoreRule {
    pattern: glob::Pattern,
    root_only: bool,
}

impl IgnoreRule {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        // Negations are not supported.
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            return None;
        }
        let root_only = line.starts_with('/');
        let body = line.trim_start_matches('/').trim_end_matches('/');
        if body.is_empty() {
            return None;
        }
        match glob::Pattern::new(body) {
            Ok(pattern) => Some(Self { pattern, root_only }),
            Err(e) => {
                warn!(pattern = line, error = %e, "Ignoring invalid ignore pattern");
                None
            }
        }
    }

    /// `parts` are the components of a path relative to the project root.
    fn matches(&self, parts: &[String]) -> bool {
        if !self.root_only && parts.iter().any(|part| self.pattern.matches(part)) {
            return true;
        }
        // Anchored at the root: the path or any of its parent dirs.
        (1..=parts.len()).any(|n| {
            self.pattern
                .matches_with(&parts[..n].join("/"), PATH_MATCH)
        })
    }
}

pub struct CodebaseAnalyzer {
    project_root: PathBuf,
    rules: Vec<IgnoreRule>,
}

impl CodebaseAnalyzer {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let gitignore = fs::read_to_string(project_root.join(".gitignore")).unwrap_or_default();
        let rules = DEFAULT_IGNORES
            .iter()
            .filter_map(|pattern| IgnoreRule::parse(pattern))
            .chain(gitignore.lines().filter_map(IgnoreRule::parse))
            .collect();
        Self {
            project_root,
            rules,
        }
    }

    /// Whether `rel_path` (relative to the project root) is excluded.
    pub fn is_ignored(&self, rel_path: &Path) -> bool {
        let parts: Vec<String> = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        self.rules.iter().any(|rule| rule.matches(&parts))
    }

    /// Code and doc files under the root, sorted, at most `max_files`.
    pub fn scan_structure(&self, max_files: usize) -> Vec<String> {
        let root = &self.project_root;
        let mut files: Vec<String> = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || e.path()
                        .strip_prefix(root)
                        .map(|rel| !self.is_ignored(rel))
                        .unwrap_or(false)
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| CODE_EXTENSIONS.contains(&ext.as_str()))
            })
            .filter_map(|e| {
                e.path()
                    .strip_prefix(root)
                    .ok()
                    .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            })
            .take(max_files)
            .collect();
        files.sort();
        files
    }

    /// First `max_lines` lines of a project file, `None` when unreadable or
    /// outside the project.
    pub fn read_file_sample(&self, path: &str, max_lines: usize) -> Option<String> {
        let rel = Path::new(path);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            debug!(path, "Refusing to sample a path outside the project");
            return None;
        }
        let content = fs::read_to_string(self.project_root.join(rel)).ok()?;
        let lines: Vec<&str> = content.split('\n').collect();
        if lines.len() <= max_lines {
            return Some(content);
        }
        Some(format!(
            "{}\n\n... (truncated, {} total lines)",
            lines[..max_lines].join("\n"),
            lines.len()
        ))
    }

    /// Two agent passes: pick the relevant files, then analyze samples of them.
    pub async fn analyze(&self, goal: &str, agent: &dyn AgentInvoker) -> AnalysisResult {
        let all_files = self.scan_structure(MAX_SCANNED_FILES);
        info!(goal, files = all_files.len(), "Analyzing codebase");

        let tree = all_files
            .iter()
            .take(TREE_FILES)
            .map(|f| format!("  {}", f))
            .collect::<Vec<_>>()
            .join("\n");
        let response = ask(agent, &identify_prompt(goal, &tree)).await;
        let mut relevant = parse_relevant_files(&response);
        if relevant.is_empty() {
            debug!("No relevant files returned, using the first scanned files");
            relevant = all_files
                .iter()
                .take(MAX_CONTEXT_FILES)
                .map(|path| RelevantFile {
                    path: path.clone(),
                    relevance: "Found in codebase".to_string(),
                })
                .collect();
        }

        let samples: Vec<(String, String)> = relevant
            .iter()
            .take(MAX_SAMPLED_FILES)
            .filter(|f| !f.path.is_empty())
            .filter_map(|f| {
                self.read_file_sample(&f.path, SAMPLE_LINES)
                    .filter(|content| !content.is_empty())
                    .map(|content| (f.path.clone(), content))
            })
            .collect();
        let files_context: String = samples
            .iter()
            .take(MAX_CONTEXT_FILES)
            .map(|(path, content)| {
                format!(
                    "\n\n### {}\n```\n{}\n```",
                    path,
                    truncate_with_marker(content, SAMPLE_CHARS)
                )
            })
            .collect();

        let response = ask(agent, &analysis_prompt(goal, &files_context)).await;
        match parse_analysis(goal, &response) {
            Some(result) => result,
            None => {
                warn!(goal, "Agent analysis unusable, writing a fallback analysis");
                let listed: Vec<RelevantFile> =
                    relevant.into_iter().take(MAX_CONTEXT_FILES).collect();
                AnalysisResult::fallback(goal, all_files.len(), &listed)
            }
        }
    }
}

/// Agent response, or an empty string when the call failed.
async fn ask(agent: &dyn AgentInvoker, prompt: &str) -> String {
    match agent.generate(prompt).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Analysis agent call failed");
            String::new()
        }
    }
}

fn parse_relevant_files(response: &str) -> Vec<RelevantFile> {
    extract_json_object(response)
        .and_then(|json| serde_json::from_str::<RelevantFiles>(&json).ok())
        .map(|parsed| parsed.relevant_files)
        .unwrap_or_default()
}

/// Agents return strings, lists or numbers for free-text fields.
fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|i| format!("- {}", value_text(i)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_analysis(goal: &str, response: &str) -> Option<AnalysisResult> {
    let json = extract_json_object(response)?;
    let data: Value = serde_json::from_str(&json).ok()?;
    if !data.is_object() {
        return None;
    }
    let text = |key: &str, default: &str| {
        data.get(key)
            .map(value_text)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    };
    let key_files = match data.get("key_files") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let field = |key: &str| item.get(key).map(value_text).unwrap_or_default();
                KeyFile {
                    path: field("path"),
                    purpose: field("purpose"),
                    key_lines: field("key_lines"),
                }
            })
            .collect(),
        _ => Vec::new(),
    };

    Some(AnalysisResult {
        goal: goal.to_string(),
        executive_summary: text("executive_summary", "Analysis not available."),
        current_architecture: text("current_architecture", "Architecture not analyzed."),
        key_files,
        patterns_in_use: text_list(data.get("patterns_in_use")),
        known_gaps: text_list(data.get("known_gaps")),
        generated_at: Utc::now(),
    })
}

fn identify_prompt(goal: &str, tree: &str) -> String {
    format!(
        r#"You are analyzing a codebase for a refactor.

REFACTOR GOAL: {goal}

FILE STRUCTURE (partial):
{tree}

Based on the refactor goal, identify the 5-15 most relevant files that would need to be understood or modified. For each file, explain why it's relevant.

Respond in this JSON format only:
{{
  "relevant_files": [
    {{"path": "path/to/file.rs", "relevance": "Why this file is relevant to the goal"}}
  ]
}}"#
    )
}

fn analysis_prompt(goal: &str, files_context: &str) -> String {
    format!(
        r#"You are analyzing a codebase before a major refactor.

REFACTOR GOAL: {goal}

KEY FILES AND THEIR CONTENT:
{files_context}

Analyze this codebase and provide:

1. EXECUTIVE SUMMARY (2-3 paragraphs): what the relevant code does, how it is structured, and what matters most before changing it.
2. CURRENT ARCHITECTURE (bullet points): key components, how they interact, data flow.
3. KEY FILES: path, one-line purpose, key lines or functions.
4. PATTERNS IN USE: architecture patterns, conventions, frameworks.
5. KNOWN GAPS/ISSUES: what the refactor might address, likely challenges.

Respond in this exact JSON format:
{{
  "executive_summary": "Your summary here...",
  "current_architecture": "Bullet points here...",
  "key_files": [
    {{"path": "file.rs", "purpose": "What it does", "key_lines": "Lines X-Y"}}
  ],
  "patterns_in_use": ["Pattern 1", "Pattern 2"],
  "known_gaps": ["Gap 1", "Gap 2"]
}}"#
    )
}
