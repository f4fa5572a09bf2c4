use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Output streams handed to an in-process command for the duration of one call.
///
/// Handlers never touch the process-wide stdout or stderr directly. The engine decides
/// where each stream goes (the terminal, a redirect file, or an in-memory buffer that
/// feeds the next pipeline stage) and lends the sinks here. Whatever was lent is
/// released when the call returns, on success and on error alike.
pub struct StageIo<'a> {
    pub stdout: &'a mut dyn Write,
    pub stderr: &'a mut dyn Write,
}

impl<'a> StageIo<'a> {
    pub fn new(stdout: &'a mut dyn Write, stderr: &'a mut dyn Write) -> Self {
        Self { stdout, stderr }
    }
}
