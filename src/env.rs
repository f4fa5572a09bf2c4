use crate::command::ExitCode;
use crate::external::PathResolver;
use crate::history::CommandHistory;
use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::OsString;
use std::path::PathBuf;

/// Mutable, user-level view of the process environment used by the interpreter.
///
/// The environment contains:
/// - `vars`: a map of environment variables that will be visible to executed commands.
/// - `current_dir`: the working directory for command execution.
/// - `resolver`: the executable search list and its resolution cache.
/// - `history`: the command history of this session.
/// - `exit_request`: set by `exit`; a REPL loop checks it to know when to terminate.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
    pub resolver: PathResolver,
    pub history: CommandHistory,
    /// Exit code requested by the `exit` builtin, if any.
    pub exit_request: Option<ExitCode>,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    ///
    /// Variables are copied from the process environment (entries that are not valid
    /// UTF-8 are skipped), the resolver is seeded from `PATH`
    /// and history is kept in memory only. See [`Environment::with_history`].
    pub fn new() -> Self {
        let vars = utf8_vars(stdenv::vars_os());
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let resolver = PathResolver::from_search_path(vars.get("PATH").map(String::as_str).unwrap_or(""));
        Self {
            vars,
            current_dir,
            resolver,
            history: CommandHistory::in_memory(),
            exit_request: None,
        }
    }

    pub fn with_history(mut self, history: CommandHistory) -> Self {
        self.history = history;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_resolver(mut self, resolver: PathResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn request_exit(&mut self, code: ExitCode) {
        self.exit_request = Some(code);
    }

    pub fn should_exit(&self) -> bool {
        self.exit_request.is_some()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

fn utf8_vars(vars: impl Iterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::env::{Environment, utf8_vars};
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
        assert!(!env.resolver.dirs().is_empty());
    }

    #[test]
    fn test_exit_request() {
        let mut env = Environment::new();
        assert!(!env.should_exit());
        env.request_exit(3);
        assert!(env.should_exit());
        assert_eq!(env.exit_request, Some(3));
    }

    #[test]
    fn test_non_utf8_variables_are_skipped() {
        let vars = utf8_vars(
            [
                (OsString::from("GOOD"), OsString::from("value")),
                (OsString::from("BAD_VALUE"), OsString::from_vec(vec![0x66, 0xff])),
                (OsString::from_vec(vec![0xfe, 0x41]), OsString::from("x")),
            ]
            .into_iter(),
        );
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("GOOD").map(String::as_str), Some("value"));
    }
}
