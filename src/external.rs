use std::collections::{BTreeSet, HashMap};
use std::ffi::OsStr;
use std::fs;
use std::path::{self, Path, PathBuf};
use tracing::{debug, trace};

/// Resolves bare command names to executables on an ordered directory list.
///
/// Both hits and misses are memoized per name. Any change to the directory list
/// drops the whole cache, so a stale path is never returned after the list changes.
#[derive(Debug, Clone, Default)]
pub struct PathResolver {
    dirs: Vec<PathBuf>,
    cache: HashMap<String, Option<PathBuf>>,
}

impl PathResolver {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            cache: HashMap::new(),
        }
    }

    /// Builds a resolver from a `PATH`-style value.
    pub fn from_search_path(value: impl AsRef<OsStr>) -> Self {
        Self::new(split_search_path(value.as_ref()))
    }

    /// The directories searched, in order.
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Replaces the directory list from a `PATH`-style value.
    pub fn set_search_path(&mut self, value: impl AsRef<OsStr>) {
        self.replace_dirs(split_search_path(value.as_ref()));
    }

    pub fn replace_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.dirs = dirs;
        self.invalidate();
    }

    /// Puts `dir` in front of the list. Blank values are ignored.
    pub fn prepend_dir(&mut self, dir: impl AsRef<Path>) {
        let Some(dir) = trimmed(dir.as_ref()) else {
            return;
        };
        self.dirs.insert(0, dir);
        self.invalidate();
    }

    fn invalidate(&mut self) {
        debug!(entries = self.cache.len(), "search path changed, clearing resolution cache");
        self.cache.clear();
    }

    /// Resolves `name` to an executable path.
    ///
    /// Names containing a path separator are checked as given, relative ones against
    /// `cwd`. Bare names are looked up in each directory in list order and the first
    /// executable candidate wins; relative directories are also taken against `cwd`.
    pub async fn resolve(&mut self, name: &str, cwd: &Path) -> Option<PathBuf> {
        let key = if is_literal_path(name) {
            cwd.join(name).to_string_lossy().into_owned()
        } else {
            name.to_string()
        };
        if let Some(cached) = self.cache.get(&key) {
            trace!(name, hit = cached.is_some(), "resolution cache hit");
            return cached.clone();
        }

        let resolved = self.lookup(name, cwd).await;
        debug!(name, resolved = ?resolved, "resolved command");
        self.cache.insert(key, resolved.clone());
        resolved
    }

    async fn lookup(&self, name: &str, cwd: &Path) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }

        if is_literal_path(name) {
            let path = cwd.join(name);
            return is_executable(&path).await.then_some(path);
        }

        for dir in &self.dirs {
            let candidate = cwd.join(dir).join(name);
            if is_executable(&candidate).await {
                return Some(candidate);
            }
        }
        None
    }

    /// Names of executables in the listed directories that start with `prefix`.
    ///
    /// Used for tab completion, so it reads the directories synchronously and
    /// bypasses the cache. Unreadable directories are skipped.
    pub fn executables_with_prefix(&self, prefix: &str) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for dir in &self.dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let file_name = entry.file_name();
                let Some(name) = file_name.to_str() else {
                    continue;
                };
                if name.starts_with(prefix) && is_executable_sync(&entry.path()) {
                    names.insert(name.to_string());
                }
            }
        }
        names
    }
}

fn split_search_path(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter_map(|dir| trimmed(&dir))
        .collect()
}

fn trimmed(dir: &Path) -> Option<PathBuf> {
    let text = dir.to_string_lossy();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(PathBuf::from(text))
    }
}

fn is_literal_path(name: &str) -> bool {
    name.contains(path::MAIN_SEPARATOR) || name.contains('/')
}

async fn is_executable(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && has_exec_bit(&meta),
        Err(_) => false,
    }
}

fn is_executable_sync(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && has_exec_bit(&meta),
        Err(_) => false,
    }
}

#[cfg(unix)]
fn has_exec_bit(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_exec_bit(_meta: &fs::Metadata) -> bool {
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, mode: u32) -> PathBuf {
        fs::create_dir_all(dir).expect("create dir");
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho hello\n").expect("write file");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    #[test]
    fn test_search_path_is_split_trimmed_and_filtered() {
        let resolver = PathResolver::from_search_path(" /usr/bin : /bin ::");
        assert_eq!(
            resolver.dirs(),
            &[PathBuf::from("/usr/bin"), PathBuf::from("/bin")]
        );
        assert!(PathResolver::from_search_path("").dirs().is_empty());
    }

    #[test]
    fn test_prepend_ignores_blank() {
        let mut resolver = PathResolver::from_search_path("/bin");
        resolver.prepend_dir("   ");
        assert_eq!(resolver.dirs(), &[PathBuf::from("/bin")]);
        resolver.prepend_dir("/usr/local/bin");
        assert_eq!(resolver.dirs()[0], PathBuf::from("/usr/local/bin"));
    }

    #[tokio::test]
    async fn test_resolves_in_list_order() {
        let tmp = TempDir::new().unwrap();
        let first = write_file(&tmp.path().join("bin1"), "orderexec", 0o755);
        write_file(&tmp.path().join("bin2"), "orderexec", 0o755);

        let mut resolver = PathResolver::new(vec![tmp.path().join("bin1"), tmp.path().join("bin2")]);
        assert_eq!(resolver.resolve("orderexec", Path::new("/")).await, Some(first));
    }

    #[tokio::test]
    async fn test_skips_non_executable_and_directories() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("a"), "tool", 0o644);
        fs::create_dir_all(tmp.path().join("b").join("tool")).unwrap();
        let real = write_file(&tmp.path().join("c"), "tool", 0o700);

        let mut resolver = PathResolver::new(vec![
            tmp.path().join("a"),
            tmp.path().join("b"),
            tmp.path().join("c"),
        ]);
        assert_eq!(resolver.resolve("tool", Path::new("/")).await, Some(real));
    }

    #[tokio::test]
    async fn test_missing_command_is_none() {
        let mut resolver = PathResolver::from_search_path("/nonexistent/dir");
        assert_eq!(resolver.resolve("nonexistent_command_xyz_123", Path::new("/")).await, None);
        assert_eq!(resolver.resolve("", Path::new("/")).await, None);
    }

    #[tokio::test]
    async fn test_names_with_separator_are_checked_directly() {
        let tmp = TempDir::new().unwrap();
        let exec = write_file(tmp.path(), "direct-exec", 0o755);
        let plain = write_file(tmp.path(), "notexec", 0o644);

        let mut resolver = PathResolver::default();
        let exec_name = exec.to_string_lossy().into_owned();
        assert_eq!(resolver.resolve(&exec_name, Path::new("/")).await, Some(exec.clone()));
        assert_eq!(resolver.resolve(&plain.to_string_lossy(), Path::new("/")).await, None);
    }

    #[tokio::test]
    async fn test_cached_hit_survives_file_removal() {
        let tmp = TempDir::new().unwrap();
        let exec = write_file(tmp.path(), "cachedexec", 0o755);

        let mut resolver = PathResolver::new(vec![tmp.path().to_path_buf()]);
        assert_eq!(resolver.resolve("cachedexec", Path::new("/")).await, Some(exec.clone()));
        fs::remove_file(&exec).unwrap();
        assert_eq!(resolver.resolve("cachedexec", Path::new("/")).await, Some(exec));
    }

    #[tokio::test]
    async fn test_cached_miss_until_list_changes() {
        let tmp = TempDir::new().unwrap();
        let mut resolver = PathResolver::new(vec![tmp.path().join("empty")]);
        assert_eq!(resolver.resolve("latecomer", Path::new("/")).await, None);

        let exec = write_file(&tmp.path().join("later"), "latecomer", 0o755);
        assert_eq!(resolver.resolve("latecomer", Path::new("/")).await, None);

        resolver.prepend_dir(tmp.path().join("later"));
        assert_eq!(resolver.resolve("latecomer", Path::new("/")).await, Some(exec));
    }

    #[tokio::test]
    async fn test_replacing_list_drops_stale_hit() {
        let tmp = TempDir::new().unwrap();
        let old_dir = tmp.path().join("old");
        write_file(&old_dir, "stale", 0o755);

        let mut resolver = PathResolver::new(vec![old_dir]);
        assert!(resolver.resolve("stale", Path::new("/")).await.is_some());

        resolver.replace_dirs(vec![tmp.path().join("new")]);
        assert_eq!(resolver.resolve("stale", Path::new("/")).await, None);

        resolver.set_search_path(tmp.path().join("old").as_os_str());
        assert!(resolver.resolve("stale", Path::new("/")).await.is_some());
    }

    #[tokio::test]
    async fn test_relative_names_resolve_against_shell_directory() {
        let tmp = TempDir::new().unwrap();
        let exec = write_file(&tmp.path().join("tools"), "local-tool", 0o755);

        let mut resolver = PathResolver::from_search_path("tools");
        assert_eq!(resolver.resolve("local-tool", tmp.path()).await, Some(exec.clone()));
        assert_eq!(
            resolver.resolve("./tools/local-tool", tmp.path()).await,
            Some(tmp.path().join("./tools/local-tool"))
        );
        assert_eq!(resolver.resolve("./tools/local-tool", Path::new("/")).await, None);
    }

    #[test]
    fn test_executables_with_prefix() {
        let tmp = TempDir::new().unwrap();
        write_file(&tmp.path().join("one"), "foo-a", 0o755);
        write_file(&tmp.path().join("one"), "foo-plain", 0o644);
        write_file(&tmp.path().join("two"), "foo-b", 0o755);
        write_file(&tmp.path().join("two"), "foo-a", 0o755);
        write_file(&tmp.path().join("two"), "bar", 0o755);

        let resolver = PathResolver::new(vec![tmp.path().join("one"), tmp.path().join("two")]);
        let names: Vec<String> = resolver.executables_with_prefix("foo").into_iter().collect();
        assert_eq!(names, vec!["foo-a", "foo-b"]);
    }
}
