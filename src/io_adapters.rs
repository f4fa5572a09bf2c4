use crate::parser::{Redirect, RedirectMode};
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Result as IoResult, Write};
use std::path::Path;
use std::process::Stdio;

/// Destination of one output stream of a stage.
pub enum Sink {
    /// The terminal's standard output.
    Stdout,
    /// The terminal's standard error.
    Stderr,
    /// A redirect target owned by the stage that opened it.
    File(File),
    /// In-memory capture of an in-process command's output inside a pipeline.
    Buffer(Vec<u8>),
}

impl Sink {
    /// Opens `redirect` if present, otherwise returns `fallback`.
    /// Relative targets are taken against `cwd`.
    pub fn redirect_or(redirect: Option<&Redirect>, cwd: &Path, fallback: Sink) -> Result<Sink> {
        match redirect {
            Some(redirect) => Ok(Sink::File(open_redirect(redirect, cwd)?)),
            None => Ok(fallback),
        }
    }

    /// Takes the captured bytes; empty for sinks that do not capture.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Sink::Buffer(buf) => buf,
            _ => Vec::new(),
        }
    }
}

impl Write for Sink {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        match self {
            Sink::Stdout => io::stdout().write(data),
            Sink::Stderr => io::stderr().write(data),
            Sink::File(file) => file.write(data),
            Sink::Buffer(buf) => {
                buf.extend_from_slice(data);
                Ok(data.len())
            }
        }
    }

    fn flush(&mut self) -> IoResult<()> {
        match self {
            Sink::Stdout => io::stdout().flush(),
            Sink::Stderr => io::stderr().flush(),
            Sink::File(file) => file.flush(),
            Sink::Buffer(_) => Ok(()),
        }
    }
}

/// Child process stream for an optional redirect: the opened file, or `fallback`.
pub fn redirect_stdio(redirect: Option<&Redirect>, cwd: &Path, fallback: Stdio) -> Result<Stdio> {
    match redirect {
        Some(redirect) => Ok(Stdio::from(open_redirect(redirect, cwd)?)),
        None => Ok(fallback),
    }
}

/// Opens a redirect target: `Overwrite` truncates or creates, `Append` creates or extends.
pub fn open_redirect(redirect: &Redirect, cwd: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    match redirect.mode {
        RedirectMode::Overwrite => options.write(true).create(true).truncate(true),
        RedirectMode::Append => options.append(true).create(true),
    };
    options
        .open(cwd.join(&redirect.target))
        .with_context(|| format!("{}: cannot open redirect target", redirect.target))
}
