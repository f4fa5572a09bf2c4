use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Default history file name, relative to the starting directory.
pub const DEFAULT_HISTORY_FILE: &str = ".shell_history";

/// When accepted lines reach the history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Every accepted line is appended to the file right away.
    Immediate,
    /// New lines of this session are appended once, when the shell exits.
    OnExit,
}

/// Command history of the session plus its backing file.
///
/// `session` is what the `history` builtin shows; `recall` is what the line editor
/// offers on arrow-up and always contains the lines loaded from the file.
#[derive(Debug, Clone, Default)]
pub struct CommandHistory {
    file: Option<(PathBuf, PersistMode)>,
    session: Vec<String>,
    recall: Vec<String>,
    flushed: usize,
    appended_marks: HashMap<PathBuf, usize>,
}

impl CommandHistory {
    /// History that is never written anywhere.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads history from `path` if the file exists.
    ///
    /// With [`PersistMode::OnExit`] the loaded lines also become part of the
    /// session history, as when the user configured the file explicitly.
    pub fn load(path: impl Into<PathBuf>, mode: PersistMode) -> Result<Self> {
        let path = path.into();
        let mut history = Self {
            file: Some((path.clone(), mode)),
            ..Self::default()
        };

        if path.exists() {
            let lines = read_lines(&path)?;
            if mode == PersistMode::OnExit {
                history.session.extend(lines.iter().cloned());
                history.flushed = history.session.len();
            }
            history.recall = lines;
        }
        Ok(history)
    }

    pub fn session_lines(&self) -> &[String] {
        &self.session
    }

    pub fn recall_lines(&self) -> &[String] {
        &self.recall
    }

    /// Records an accepted input line.
    pub fn add(&mut self, line: &str) -> Result<()> {
        self.session.push(line.to_string());
        self.recall.push(line.to_string());

        if let Some((path, PersistMode::Immediate)) = &self.file {
            append_lines(path, &[line.to_string()])?;
            self.flushed = self.session.len();
        }
        Ok(())
    }

    /// Appends lines read from elsewhere (e.g. `history -r`) to the session.
    pub fn extend(&mut self, lines: impl IntoIterator<Item = String>) {
        for line in lines {
            self.recall.push(line.clone());
            self.session.push(line);
        }
    }

    /// Writes the session lines not yet persisted. Only meaningful in
    /// [`PersistMode::OnExit`]; immediate mode has nothing pending.
    pub fn flush(&mut self) -> Result<()> {
        let Some((path, PersistMode::OnExit)) = &self.file else {
            return Ok(());
        };
        let pending = &self.session[self.flushed.min(self.session.len())..];
        if !pending.is_empty() {
            append_lines(path, pending)?;
        }
        self.flushed = self.session.len();
        Ok(())
    }

    /// `history -w`: replaces `path` with the whole session.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, joined(&self.session))
            .with_context(|| format!("history: {}: cannot write", path.display()))
    }

    /// `history -r`: appends the non-empty lines of `path` to the session.
    pub fn read_from(&mut self, path: &Path) -> Result<()> {
        let lines = read_lines(path)?;
        self.extend(lines);
        Ok(())
    }

    /// `history -a`: appends the lines added since the previous `-a` to `path`.
    pub fn append_new_to(&mut self, path: &Path) -> Result<()> {
        let from = self.appended_marks.get(path).copied().unwrap_or(0);
        let pending = &self.session[from.min(self.session.len())..];
        if !pending.is_empty() {
            append_lines(path, pending)?;
        }
        self.appended_marks
            .insert(path.to_path_buf(), self.session.len());
        Ok(())
    }
}

/// Picks the history file and its persistence mode.
///
/// An explicitly configured file (relative paths resolved against `cwd`) is written on
/// exit; otherwise [`DEFAULT_HISTORY_FILE`] in `cwd` receives every line immediately.
pub fn locate(explicit: Option<&str>, cwd: &Path) -> (PathBuf, PersistMode) {
    match explicit.map(str::trim).filter(|path| !path.is_empty()) {
        Some(path) => (cwd.join(path), PersistMode::OnExit),
        None => (cwd.join(DEFAULT_HISTORY_FILE), PersistMode::Immediate),
    }
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("history: {}: cannot read", path.display()))?;
    Ok(content
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

fn joined(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn append_lines(path: &Path, lines: &[String]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("history: {}: cannot open", path.display()))?;
    file.write_all(joined(lines).as_bytes())
        .with_context(|| format!("history: {}: cannot append", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_history_records_lines() {
        let mut history = CommandHistory::in_memory();
        history.add("echo hello").unwrap();
        history.add("pwd").unwrap();
        assert_eq!(history.session_lines(), &["echo hello", "pwd"]);
        assert_eq!(history.recall_lines(), &["echo hello", "pwd"]);
        assert!(history.file.is_none());
    }

    #[test]
    fn test_immediate_mode_appends_each_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist");
        fs::write(&path, "old\n").unwrap();

        let mut history = CommandHistory::load(&path, PersistMode::Immediate).unwrap();
        assert_eq!(history.recall_lines(), &["old"]);
        assert!(history.session_lines().is_empty());

        history.add("ls").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\nls\n");
    }

    #[test]
    fn test_on_exit_mode_writes_new_lines_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hist");
        fs::write(&path, "first\n\nsecond\n").unwrap();

        let mut history = CommandHistory::load(&path, PersistMode::OnExit).unwrap();
        assert_eq!(history.session_lines(), &["first", "second"]);

        history.add("third").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n\nsecond\n");

        history.flush().unwrap();
        history.flush().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\n\nsecond\nthird\n");
    }

    #[test]
    fn test_write_read_and_append() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");

        let mut history = CommandHistory::in_memory();
        history.add("a").unwrap();
        history.add("b").unwrap();
        history.write_to(&out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "a\nb\n");

        let appended = dir.path().join("appended");
        history.append_new_to(&appended).unwrap();
        history.add("c").unwrap();
        history.append_new_to(&appended).unwrap();
        history.append_new_to(&appended).unwrap();
        assert_eq!(fs::read_to_string(&appended).unwrap(), "a\nb\nc\n");

        let mut other = CommandHistory::in_memory();
        other.read_from(&appended).unwrap();
        assert_eq!(other.session_lines(), &["a", "b", "c"]);
    }

    #[test]
    fn test_locate_history_file() {
        let cwd = Path::new("/work");
        assert_eq!(
            locate(None, cwd),
            (PathBuf::from("/work/.shell_history"), PersistMode::Immediate)
        );
        assert_eq!(
            locate(Some("  "), cwd),
            (PathBuf::from("/work/.shell_history"), PersistMode::Immediate)
        );
        assert_eq!(
            locate(Some(" hist.txt "), cwd),
            (PathBuf::from("/work/hist.txt"), PersistMode::OnExit)
        );
        assert_eq!(
            locate(Some("/tmp/h"), cwd),
            (PathBuf::from("/tmp/h"), PersistMode::OnExit)
        );
    }

    #[test]
    fn test_read_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let mut history = CommandHistory::in_memory();
        assert!(history.read_from(&dir.path().join("nope")).is_err());
    }
}
