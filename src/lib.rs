//! A small interactive shell: a quote-aware parser and a pipeline execution engine.
//!
//! Input lines are turned into a [`ParsedLine`] by [`parse_line`], which handles
//! quoting, escaping, pipes and output redirects. The [`Interpreter`] runs the result:
//! builtins execute in-process, everything else is resolved on the search path and
//! spawned, with pipeline stages running concurrently.
//!
//! The public modules expose the building blocks: [`env`] for the shell state,
//! [`external`] for executable resolution, [`history`] for the command history and
//! [`logging`] for diagnostics.

mod builtin;
pub mod command;
mod completer;
pub mod env;
pub mod external;
pub mod history;
mod interpreter;
mod io_adapters;
pub mod lexer;
pub mod logging;
pub mod parser;

/// The shell itself. See [`Interpreter`] for the high-level API.
pub use interpreter::Interpreter;
pub use parser::{ParsedLine, Redirect, RedirectMode, Stage, parse_line, parse_stage};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    /// Serializes tests that change the process working directory.
    pub fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
