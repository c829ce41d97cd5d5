use super::types::{Signal, SignalPayload, SignalType};
use crate::errors::{RefactorError, Result};
use crate::refactor::RefactorHandle;
use crate::util::atomic_create;
use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeDelta, Timelike, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FILENAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
const ARCHIVE_DIR_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Append-only log of signal files under `{refactor}/signals/`.
///
/// Each signal lives in its own file named
/// `{YYYYmmdd_HHMMSS_micros}_{type}.json`, so lexicographic filename order
/// is chronological order. Names are made strictly increasing even when the
/// clock stalls or two writers race within one microsecond.
#[derive(Debug, Clone)]
pub struct SignalLog {
    dir: PathBuf,
}

impl SignalLog {
    pub fn new(handle: &RefactorHandle) -> Self {
        Self {
            dir: handle.signals_dir(),
        }
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_root(&self) -> PathBuf {
        self.dir.join("archive")
    }

    /// Persist one signal and return the path of the new file.
    pub fn write(&self, payload: SignalPayload, session_id: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| RefactorError::io(&self.dir, e))?;

        let mut timestamp = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.latest_file_timestamp()? {
            if timestamp <= last {
                timestamp = last + TimeDelta::microseconds(1);
            }
        }

        let signal_type = payload.signal_type();
        let mut signal = Signal {
            payload,
            session_id: session_id.to_string(),
            timestamp,
        };
        // Another writer may claim the same name between our scan and the
        // rename; the no-clobber rename detects that and we move one tick on.
        loop {
            let path = self.path_for(signal.timestamp, signal_type);
            let json = serde_json::to_string_pretty(&signal)
                .map_err(|e| RefactorError::json(&path, e))?;
            if atomic_create(&path, json.as_bytes())? {
                debug!(signal = %signal_type, session = session_id, path = %path.display(), "Signal written");
                return Ok(path);
            }
            signal.timestamp += TimeDelta::microseconds(1);
        }
    }

    /// All active signals, oldest first. Unreadable files are skipped.
    pub fn read_all(&self) -> Result<Vec<Signal>> {
        let mut signals = Vec::new();
        for path in self.signal_files()? {
            match read_signal(&path) {
                Some(signal) => signals.push(signal),
                None => warn!(path = %path.display(), "Skipping unreadable signal file"),
            }
        }
        Ok(signals)
    }

    /// Most recent signal, optionally restricted to one type.
    pub fn read_latest(&self, filter: Option<SignalType>) -> Result<Option<Signal>> {
        for path in self.signal_files()?.into_iter().rev() {
            if filter.is_some_and(|wanted| !file_has_type(&path, wanted)) {
                continue;
            }
            match read_signal(&path) {
                Some(signal) if filter.is_none_or(|t| signal.signal_type() == t) => {
                    return Ok(Some(signal));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    pub fn read_for_session(&self, session_id: &str) -> Result<Vec<Signal>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|s| s.session_id == session_id)
            .collect())
    }

    /// Move every active signal into `archive/{YYYYmmdd_HHMMSS}/`.
    ///
    /// Returns the archive directory (None when there was nothing to move)
    /// and the number of files moved.
    pub fn archive(&self) -> Result<(Option<PathBuf>, usize)> {
        let files = self.signal_files()?;
        if files.is_empty() {
            return Ok((None, 0));
        }

        let target = self
            .archive_root()
            .join(Utc::now().format(ARCHIVE_DIR_FORMAT).to_string());
        fs::create_dir_all(&target).map_err(|e| RefactorError::io(&target, e))?;

        let mut moved = 0;
        for file in files {
            let Some(name) = file.file_name() else {
                continue;
            };
            let dest = target.join(name);
            fs::rename(&file, &dest).map_err(|e| RefactorError::io(&file, e))?;
            moved += 1;
        }

        info!(count = moved, archive = %target.display(), "Signals archived");
        Ok((Some(target), moved))
    }

    /// Archive directories, oldest first.
    pub fn archives(&self) -> Result<Vec<PathBuf>> {
        let root = self.archive_root();
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut dirs: Vec<PathBuf> = fs::read_dir(&root)
            .map_err(|e| RefactorError::io(&root, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    pub fn session_started(&self, session_id: &str, worktree_path: Option<&Path>) -> Result<PathBuf> {
        self.write(
            SignalPayload::SessionStarted {
                worktree_path: worktree_path.map(|p| p.display().to_string()),
            },
            session_id,
        )
    }

    pub fn session_done(
        &self,
        session_id: &str,
        commit_hash: Option<&str>,
        summary: &str,
    ) -> Result<PathBuf> {
        self.write(
            SignalPayload::SessionDone {
                commit_hash: commit_hash.map(str::to_string),
                summary: summary.to_string(),
            },
            session_id,
        )
    }

    pub fn audit_passed(&self, session_id: &str, notes: &str) -> Result<PathBuf> {
        self.write(
            SignalPayload::AuditPassed {
                notes: notes.to_string(),
            },
            session_id,
        )
    }

    pub fn revision_needed(
        &self,
        session_id: &str,
        issues: &[String],
        suggestions: &[String],
    ) -> Result<PathBuf> {
        self.write(
            SignalPayload::RevisionNeeded {
                issues: issues.to_vec(),
                suggestions: suggestions.to_vec(),
            },
            session_id,
        )
    }

    pub fn question(&self, session_id: &str, question: &str, options: &[String]) -> Result<PathBuf> {
        self.write(
            SignalPayload::Question {
                question: question.to_string(),
                options: options.to_vec(),
            },
            session_id,
        )
    }

    pub fn paused(&self, session_id: &str, reason: Option<&str>) -> Result<PathBuf> {
        self.write(
            SignalPayload::Paused {
                reason: reason.map(str::to_string),
            },
            session_id,
        )
    }

    pub fn resumed(&self, session_id: &str) -> Result<PathBuf> {
        self.write(SignalPayload::Resumed {}, session_id)
    }

    pub fn escalated(&self, session_id: &str, iteration_count: u32, reason: &str) -> Result<PathBuf> {
        self.write(
            SignalPayload::Escalated {
                iteration_count,
                reason: reason.to_string(),
            },
            session_id,
        )
    }

    fn path_for(&self, timestamp: DateTime<Utc>, signal_type: SignalType) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.json",
            timestamp.format(FILENAME_TIME_FORMAT),
            signal_type
        ))
    }

    /// Active signal files sorted by name. Temp files and the archive are excluded.
    fn signal_files(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(|e| RefactorError::io(&self.dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.') && n.ends_with(".json"))
            })
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn latest_file_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .signal_files()?
            .iter()
            .rev()
            .find_map(|p| p.file_name().and_then(|n| n.to_str()).and_then(parse_filename_timestamp)))
    }
}

fn read_signal(path: &Path) -> Option<Signal> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

fn file_has_type(path: &Path, signal_type: SignalType) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.ends_with(&format!("_{}", signal_type)))
}

/// Parse the `YYYYmmdd_HHMMSS_micros` prefix of a signal filename.
fn parse_filename_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let seconds = name.get(..15)?;
    let micros: u32 = name.get(16..22)?.parse().ok()?;
    let naive = NaiveDateTime::parse_from_str(seconds, "%Y%m%d_%H%M%S").ok()?;
    let naive = naive.with_nanosecond(micros * 1000)?;
    Some(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{TempDir, tempdir};

    fn make_log() -> (SignalLog, TempDir) {
        let dir = tempdir().unwrap();
        let handle = RefactorHandle::new(dir.path(), "demo");
        (SignalLog::new(&handle), dir)
    }

    #[test]
    fn test_empty_log() {
        let (log, _dir) = make_log();
        assert!(log.read_all().unwrap().is_empty());
        assert!(log.read_latest(None).unwrap().is_none());
        assert_eq!(log.archive().unwrap(), (None, 0));
    }

    #[test]
    fn test_read_all_in_write_order() {
        let (log, _dir) = make_log();
        log.session_started("1.1", None).unwrap();
        log.session_done("1.1", Some("abc1234"), "done").unwrap();
        log.audit_passed("1.1", "clean").unwrap();

        let types: Vec<SignalType> = log
            .read_all()
            .unwrap()
            .iter()
            .map(|s| s.signal_type())
            .collect();
        assert_eq!(
            types,
            vec![
                SignalType::SessionStarted,
                SignalType::SessionDone,
                SignalType::AuditPassed
            ]
        );
    }

    #[test]
    fn test_filenames_strictly_increase() {
        let (log, _dir) = make_log();
        let paths: Vec<PathBuf> = (0..20)
            .map(|_| log.resumed("1.1").unwrap())
            .collect();
        for pair in paths.windows(2) {
            assert!(pair[0].file_name() < pair[1].file_name());
        }
    }

    #[test]
    fn test_filename_matches_timestamp() {
        let (log, _dir) = make_log();
        let path = log.question("1.1", "Which API?", &["a".into(), "b".into()]).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_question.json"));

        let signal = log.read_latest(None).unwrap().unwrap();
        assert_eq!(parse_filename_timestamp(name), Some(signal.timestamp));
    }

    #[test]
    fn test_stalled_clock_still_orders() {
        let (log, _dir) = make_log();
        fs::create_dir_all(log.dir()).unwrap();
        // A file stamped far in the future forces the next write past it.
        let future = "29990101_000000_000000_paused.json";
        let signal = Signal {
            payload: SignalPayload::Paused { reason: None },
            session_id: "1.1".into(),
            timestamp: parse_filename_timestamp(future).unwrap(),
        };
        fs::write(log.dir().join(future), serde_json::to_string(&signal).unwrap()).unwrap();

        let path = log.resumed("1.1").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "29990101_000000_000001_resumed.json"
        );
        assert_eq!(
            log.read_latest(None).unwrap().unwrap().signal_type(),
            SignalType::Resumed
        );
    }

    #[test]
    fn test_concurrent_writers_never_overwrite() {
        let (log, _dir) = make_log();
        let handles: Vec<_> = (0..6)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..60 {
                        log.question(&format!("{}.{}", t, i), "?", &[]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let signals = log.read_all().unwrap();
        assert_eq!(signals.len(), 360);
        let mut sessions: Vec<&str> = signals.iter().map(|s| s.session_id.as_str()).collect();
        sessions.sort_unstable();
        sessions.dedup();
        assert_eq!(sessions.len(), 360);
    }

    #[test]
    fn test_corrupt_file_skipped() {
        let (log, _dir) = make_log();
        log.session_started("1.1", None).unwrap();
        fs::write(
            log.dir().join("20000101_000000_000000_session_done.json"),
            "{truncated",
        )
        .unwrap();
        fs::write(log.dir().join("notes.txt"), "ignore me").unwrap();

        let signals = log.read_all().unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type(), SignalType::SessionStarted);
    }

    #[test]
    fn test_read_latest_with_filter() {
        let (log, _dir) = make_log();
        log.session_done("1.1", None, "first").unwrap();
        log.session_done("1.2", None, "second").unwrap();
        log.audit_passed("1.1", "").unwrap();

        let latest = log.read_latest(Some(SignalType::SessionDone)).unwrap().unwrap();
        assert_eq!(latest.session_id, "1.2");
        assert!(log.read_latest(Some(SignalType::Escalated)).unwrap().is_none());
        assert_eq!(
            log.read_latest(None).unwrap().unwrap().signal_type(),
            SignalType::AuditPassed
        );
    }

    #[test]
    fn test_read_for_session() {
        let (log, _dir) = make_log();
        log.session_started("1.1", None).unwrap();
        log.session_started("1.2", Some(Path::new("/tmp/wt"))).unwrap();
        log.session_done("1.1", None, "").unwrap();
        assert_eq!(log.read_for_session("1.1").unwrap().len(), 2);
        assert_eq!(log.read_for_session("1.2").unwrap().len(), 1);
    }

    #[test]
    fn test_archive_moves_everything_and_repeats() {
        let (log, _dir) = make_log();
        log.session_started("1.1", None).unwrap();
        log.session_done("1.1", None, "").unwrap();

        let (target, moved) = log.archive().unwrap();
        assert_eq!(moved, 2);
        let target = target.unwrap();
        assert!(target.starts_with(log.archive_root()));
        assert_eq!(fs::read_dir(&target).unwrap().count(), 2);
        assert!(log.read_all().unwrap().is_empty());

        log.paused("1.1", Some("lunch")).unwrap();
        let (_, moved) = log.archive().unwrap();
        assert_eq!(moved, 1);
        assert!(log.read_all().unwrap().is_empty());
        assert!(!log.archives().unwrap().is_empty());
    }
}
