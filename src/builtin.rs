use crate::command::{ExitCode, StageIo};
use crate::env::Environment;
use anyhow::{Result, anyhow};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Built-in commands known to the shell at compile time.
///
/// Builtins run in-process without spawning a child. Output goes exclusively through
/// the [`StageIo`] they are given, so the caller alone decides whether it lands on the
/// terminal, in a redirect file or in the next pipeline stage.
pub(crate) trait BuiltinCommand: Sized {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Builds the command from its arguments (without the command name).
    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Executes the command.
    ///
    /// Return value should follow shell conventions: 0 for success, non-zero for error.
    async fn execute(self, io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode>;
}

fn parse_with_argh<T: BuiltinCommand + FromArgs>(args: &[&str]) -> Result<T, EarlyExit> {
    T::from_args(&[T::name()], args)
}

/// Every in-process command, resolved once from a name and its arguments.
pub enum Builtin {
    Cd(Cd),
    Echo(Echo),
    Exit(Exit),
    History(History),
    Pwd(Pwd),
    Type(Type),
    /// Arguments were rejected, or help was requested.
    Usage(Usage),
}

impl Builtin {
    /// Names of all builtins, sorted.
    pub const NAMES: [&'static str; 6] = ["cd", "echo", "exit", "history", "pwd", "type"];

    pub fn is_builtin(name: &str) -> bool {
        Self::NAMES.contains(&name)
    }

    /// Returns the builtin called `name`, or `None` when `name` is not a builtin.
    pub fn lookup(name: &str, args: &[String]) -> Option<Builtin> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let parsed = match name {
            "cd" => Cd::parse(&args).map(Builtin::Cd),
            "echo" => Echo::parse(&args).map(Builtin::Echo),
            "exit" => Exit::parse(&args).map(Builtin::Exit),
            "history" => History::parse(&args).map(Builtin::History),
            "pwd" => Pwd::parse(&args).map(Builtin::Pwd),
            "type" => Type::parse(&args).map(Builtin::Type),
            _ => return None,
        };
        Some(parsed.unwrap_or_else(|EarlyExit { output, status }| {
            Builtin::Usage(Usage {
                output,
                is_error: status.is_err(),
            })
        }))
    }

    /// Runs the builtin. Command failures are reported on `io.stderr` and turn into
    /// exit code 1; only a failure to write that report is returned as an error.
    pub async fn run(self, io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let result = match self {
            Builtin::Cd(cmd) => cmd.execute(io, env).await,
            Builtin::Echo(cmd) => cmd.execute(io, env).await,
            Builtin::Exit(cmd) => cmd.execute(io, env).await,
            Builtin::History(cmd) => cmd.execute(io, env).await,
            Builtin::Pwd(cmd) => cmd.execute(io, env).await,
            Builtin::Type(cmd) => cmd.execute(io, env).await,
            Builtin::Usage(usage) => return usage.report(io),
        };
        match result {
            Ok(code) => Ok(code),
            Err(e) => {
                writeln!(io.stderr, "{e:#}")?;
                Ok(1)
            }
        }
    }
}

/// Output of a rejected or `--help` invocation, as produced by argh.
pub struct Usage {
    output: String,
    is_error: bool,
}

impl Usage {
    fn report(self, io: &mut StageIo<'_>) -> Result<ExitCode> {
        let out = if self.is_error {
            &mut *io.stderr
        } else {
            &mut *io.stdout
        };
        writeln!(out, "{}", self.output.trim_end())?;
        Ok(if self.is_error { 1 } else { 0 })
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    async fn execute(self, io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        writeln!(io.stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory.
/// If no target is provided, changes to the directory specified by the HOME environment variable.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute, relative to the current directory, or starting with `~`.
    pub target: Option<String>,
}

impl Cd {
    fn no_such_dir(dir: &str) -> anyhow::Error {
        anyhow!("cd: {dir}: No such file or directory")
    }

    fn expand_home(dir: &str, env: &Environment) -> Result<PathBuf> {
        let rest = match dir.strip_prefix('~') {
            Some("") => "",
            Some(rest) if rest.starts_with('/') => &rest[1..],
            _ => return Ok(PathBuf::from(dir)),
        };
        let home = env.get_var("HOME").ok_or_else(|| Self::no_such_dir(dir))?;
        Ok(Path::new(&home).join(rest))
    }
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    async fn execute(self, _io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        let dir = match self.target {
            Some(t) if !t.is_empty() => t,
            _ => match env.get_var("HOME") {
                Some(home) => home,
                None => return Ok(0),
            },
        };

        let target = Self::expand_home(&dir, env)?;
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = fs::canonicalize(&new_dir).map_err(|_| Self::no_such_dir(&dir))?;
        if !canonical.is_dir() {
            return Err(Self::no_such_dir(&dir));
        }
        env::set_current_dir(&canonical).map_err(|_| Self::no_such_dir(&dir))?;
        env.current_dir = canonical;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Exit the shell.
pub struct Exit {
    #[argh(positional, default = "0")]
    /// exit status of the shell, 0 when omitted.
    pub code: ExitCode,
}

impl BuiltinCommand for Exit {
    fn name() -> &'static str {
        "exit"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    async fn execute(self, _io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        env.request_exit(self.code);
        Ok(self.code)
    }
}

/// Write the arguments to standard output, separated by spaces, followed by a newline.
///
/// Unlike the other builtins, `echo` takes no options: every word is printed as-is.
pub struct Echo {
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        Ok(Echo {
            args: args.iter().map(|a| a.to_string()).collect(),
        })
    }

    async fn execute(self, io: &mut StageIo<'_>, _env: &mut Environment) -> Result<ExitCode> {
        writeln!(io.stdout, "{}", self.args.join(" "))?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Display how each name would be interpreted if used as a command.
pub struct Type {
    #[argh(positional, greedy)]
    /// command names to look up.
    pub names: Vec<String>,
}

impl BuiltinCommand for Type {
    fn name() -> &'static str {
        "type"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    async fn execute(self, io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        if self.names.is_empty() {
            writeln!(io.stderr, "type: missing argument")?;
            return Ok(1);
        }

        let mut code = 0;
        for name in &self.names {
            if Builtin::is_builtin(name) {
                writeln!(io.stdout, "{name} is a shell builtin")?;
            } else if let Some(path) = env.resolver.resolve(name, &env.current_dir).await {
                writeln!(io.stdout, "{name} is {}", path.display())?;
            } else {
                writeln!(io.stdout, "{name}: not found")?;
                code = 1;
            }
        }
        Ok(code)
    }
}

#[derive(FromArgs)]
/// Display or manipulate the command history.
pub struct History {
    #[argh(option, short = 'w')]
    /// write the session history to this file, replacing its content.
    pub write: Option<String>,

    #[argh(option, short = 'r')]
    /// append the lines of this file to the session history.
    pub read: Option<String>,

    #[argh(option, short = 'a')]
    /// append the entries added since the previous `-a` to this file.
    pub append: Option<String>,

    #[argh(positional)]
    /// show only the last N entries.
    pub count: Option<String>,
}

impl BuiltinCommand for History {
    fn name() -> &'static str {
        "history"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    async fn execute(self, io: &mut StageIo<'_>, env: &mut Environment) -> Result<ExitCode> {
        if let Some(path) = &self.write {
            let path = env.current_dir.join(path);
            env.history.write_to(&path)?;
            return Ok(0);
        }
        if let Some(path) = &self.read {
            let path = env.current_dir.join(path);
            env.history.read_from(&path)?;
            return Ok(0);
        }
        if let Some(path) = &self.append {
            let path = env.current_dir.join(path);
            env.history.append_new_to(&path)?;
            return Ok(0);
        }

        let lines = env.history.session_lines();
        let start = match self.count.as_deref().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => lines.len().saturating_sub(n),
            _ => 0,
        };
        for (i, line) in lines.iter().enumerate().skip(start) {
            writeln!(io.stdout, "{:>5}  {}", i + 1, line)?;
        }
        Ok(0)
    }
}
