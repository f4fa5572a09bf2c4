use crate::builtin::Builtin;
use crate::command::{ExitCode, StageIo};
use crate::completer::ShellHelper;
use crate::env::Environment;
use crate::io_adapters::{Sink, redirect_stdio};
use crate::parser::{self, ParsedLine, Stage};
use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{CompletionType, Config, Editor};
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const PROMPT: &str = "$ ";

/// The shell: executes parsed lines against its [`Environment`].
///
/// Single commands run to completion before [`Interpreter::execute`] returns. Pipelines
/// start every stage concurrently and return once every started stage has settled.
///
/// Example
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use pipesh::Interpreter;
/// let mut sh = Interpreter::default();
/// sh.execute_line("echo hello | tr a-z A-Z > /tmp/out.txt").await?;
/// # Ok(())
/// # }
/// ```
pub struct Interpreter {
    env: Environment,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(Environment::new())
    }
}

/// What the next pipeline stage reads from.
enum Upstream {
    /// The interactive terminal; only the first stage reads from it.
    Terminal,
    /// Standard output of the previous external stage.
    Process(ChildStdout),
    /// Everything a builtin stage wrote.
    Bytes(Vec<u8>),
    /// Nothing will ever be written.
    Closed,
}

/// Bookkeeping for the stages of one pipeline.
///
/// Each stage owns a cancellation token at its own index. A stage that reaches a terminal
/// state cancels the tokens of all stages before it, and a cancelled external stage is
/// killed.
#[derive(Default)]
struct PipelineRun {
    tokens: Vec<CancellationToken>,
    running: JoinSet<usize>,
    helpers: JoinSet<()>,
}

impl PipelineRun {
    /// Creates the token of the next stage. Returns it with clones of all earlier tokens.
    fn register(&mut self) -> (CancellationToken, Vec<CancellationToken>) {
        let earlier = self.tokens.clone();
        let token = CancellationToken::new();
        self.tokens.push(token.clone());
        (token, earlier)
    }

    fn cancel_before(&self, index: usize) {
        for token in &self.tokens[..index.min(self.tokens.len())] {
            token.cancel();
        }
    }

    fn cancel_all(&self) {
        self.cancel_before(self.tokens.len());
    }

    /// Reads an upstream process to the end, discarding its output.
    fn drain(&mut self, mut stdout: ChildStdout) {
        self.helpers.spawn(async move {
            if let Err(e) = tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await {
                trace!(error = %e, "drain stopped");
            }
        });
    }

    /// Writes `bytes` to a stage's stdin and closes it.
    fn feed(&mut self, child: &mut Child, bytes: Vec<u8>) {
        let Some(mut stdin) = child.stdin.take() else {
            return;
        };
        self.helpers.spawn(async move {
            if let Err(e) = stdin.write_all(&bytes).await {
                trace!(error = %e, "stage stopped reading its input");
            }
        });
    }

    /// Waits until every started stage has finished. Helper tasks are abandoned then.
    async fn settle(mut self) {
        while let Some(joined) = self.running.join_next().await {
            match joined {
                Ok(index) => trace!(stage = index, "stage settled"),
                Err(e) => warn!(error = %e, "stage supervisor failed"),
            }
        }
        self.helpers.shutdown().await;
    }
}

/// Waits for an external stage to exit or to be cancelled, then cancels every earlier stage.
async fn supervise(
    index: usize,
    name: String,
    mut child: Child,
    token: CancellationToken,
    upstream: Vec<CancellationToken>,
) -> usize {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => debug!(stage = index, %name, %status, "stage exited"),
            Err(e) => debug!(stage = index, %name, error = %e, "failed to wait for stage"),
        },
        _ = token.cancelled() => {
            debug!(stage = index, %name, "terminating stage");
            if let Err(e) = child.kill().await {
                trace!(stage = index, %name, error = %e, "termination failed");
            }
        }
    }

    for token in &upstream {
        token.cancel();
    }
    index
}

fn report_not_found(name: &str, stderr: &mut Sink) -> Result<()> {
    writeln!(stderr, "{name}: command not found")?;
    stderr.flush()?;
    Ok(())
}

impl Interpreter {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Parses and executes one input line, recording it in the history first.
    ///
    /// Blank lines are ignored. A trailing carriage return is stripped.
    pub async fn execute_line(&mut self, line: &str) -> Result<()> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let parsed = parser::parse_line(line);
        if parsed.is_blank() {
            return Ok(());
        }

        if let Err(e) = self.env.history.add(line) {
            warn!(error = %e, "failed to record history");
        }
        self.execute(&parsed).await
    }

    /// Executes a parsed line.
    ///
    /// The only error is a redirect target that cannot be opened. Missing commands are
    /// reported on the stage's error stream, and failures of external processes are
    /// treated like ordinary exits.
    pub async fn execute(&mut self, line: &ParsedLine) -> Result<()> {
        match line {
            ParsedLine::Single(stage) if stage.is_empty() => Ok(()),
            ParsedLine::Single(stage) => self.run_single(stage).await,
            ParsedLine::Pipeline(stages) => self.run_pipeline(stages).await,
        }
    }

    async fn run_single(&mut self, stage: &Stage) -> Result<()> {
        debug!(name = %stage.name, args = ?stage.args, "running command");

        if let Some(builtin) = Builtin::lookup(&stage.name, &stage.args) {
            let mut stdout = Sink::redirect_or(
                stage.stdout.as_ref(),
                &self.env.current_dir,
                Sink::Stdout,
            )?;
            let mut stderr = Sink::redirect_or(
                stage.stderr.as_ref(),
                &self.env.current_dir,
                Sink::Stderr,
            )?;
            let code = self.run_builtin(builtin, &mut stdout, &mut stderr).await?;
            debug!(name = %stage.name, code, "builtin finished");
            return Ok(());
        }

        let Some(path) = self
            .env
            .resolver
            .resolve(&stage.name, &self.env.current_dir)
            .await
        else {
            let mut stderr = Sink::redirect_or(
                stage.stderr.as_ref(),
                &self.env.current_dir,
                Sink::Stderr,
            )?;
            return report_not_found(&stage.name, &mut stderr);
        };

        let cwd = &self.env.current_dir;
        let stdout = redirect_stdio(stage.stdout.as_ref(), cwd, Stdio::inherit())?;
        let stderr = redirect_stdio(stage.stderr.as_ref(), cwd, Stdio::inherit())?;
        let spawned = self
            .command(&path, stage)
            .stdin(Stdio::inherit())
            .stdout(stdout)
            .stderr(stderr)
            .spawn();

        match spawned {
            Ok(mut child) => match child.wait().await {
                Ok(status) => debug!(name = %stage.name, %status, "command exited"),
                Err(e) => debug!(name = %stage.name, error = %e, "failed to wait for command"),
            },
            Err(e) => debug!(name = %stage.name, path = %path.display(), error = %e, "spawn failed"),
        }
        Ok(())
    }

    async fn run_pipeline(&mut self, stages: &[Stage]) -> Result<()> {
        debug!(stages = stages.len(), "running pipeline");

        let mut run = PipelineRun::default();
        let mut upstream = Upstream::Terminal;
        let mut outcome = Ok(());

        for (index, stage) in stages.iter().enumerate() {
            let is_last = index + 1 == stages.len();
            match self.start_stage(&mut run, index, stage, is_last, upstream).await {
                Ok(Some(next)) => upstream = next,
                Ok(None) => {
                    run.cancel_all();
                    break;
                }
                Err(e) => {
                    run.cancel_all();
                    outcome = Err(e);
                    break;
                }
            }
        }

        run.settle().await;
        outcome
    }

    /// Starts one pipeline stage. Returns what the following stage reads, or `None` when
    /// the stage's command does not exist and the pipeline must stop.
    async fn start_stage(
        &mut self,
        run: &mut PipelineRun,
        index: usize,
        stage: &Stage,
        is_last: bool,
        upstream: Upstream,
    ) -> Result<Option<Upstream>> {
        let (token, earlier) = run.register();

        if let Some(builtin) = Builtin::lookup(&stage.name, &stage.args) {
            if let Upstream::Process(stdout) = upstream {
                run.drain(stdout);
            }

            let mut stderr = Sink::redirect_or(
                stage.stderr.as_ref(),
                &self.env.current_dir,
                Sink::Stderr,
            )?;
            let mut stdout = if is_last {
                Sink::redirect_or(stage.stdout.as_ref(), &self.env.current_dir, Sink::Stdout)?
            } else {
                Sink::Buffer(Vec::new())
            };
            let code = self.run_builtin(builtin, &mut stdout, &mut stderr).await?;
            debug!(stage = index, name = %stage.name, code, "builtin stage finished");

            run.cancel_before(index);
            return Ok(Some(if is_last {
                Upstream::Closed
            } else {
                Upstream::Bytes(stdout.into_bytes())
            }));
        }

        let Some(path) = self
            .env
            .resolver
            .resolve(&stage.name, &self.env.current_dir)
            .await
        else {
            let mut stderr = Sink::redirect_or(
                stage.stderr.as_ref(),
                &self.env.current_dir,
                Sink::Stderr,
            )?;
            report_not_found(&stage.name, &mut stderr)?;
            return Ok(None);
        };

        let cwd = &self.env.current_dir;
        let stderr = redirect_stdio(stage.stderr.as_ref(), cwd, Stdio::inherit())?;
        let stdout = if is_last {
            redirect_stdio(stage.stdout.as_ref(), cwd, Stdio::inherit())?
        } else {
            Stdio::piped()
        };
        let (stdin, input) = match upstream {
            Upstream::Terminal => (Stdio::inherit(), None),
            Upstream::Process(out) => {
                let stdin: Stdio = out
                    .try_into()
                    .context("failed to connect pipeline stages")?;
                (stdin, None)
            }
            Upstream::Bytes(bytes) => (Stdio::piped(), Some(bytes)),
            Upstream::Closed => (Stdio::null(), None),
        };

        let spawned = self
            .command(&path, stage)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!(stage = index, name = %stage.name, error = %e, "spawn failed");
                run.cancel_before(index);
                return Ok(Some(Upstream::Closed));
            }
        };
        debug!(stage = index, name = %stage.name, pid = ?child.id(), "stage started");

        if let Some(bytes) = input {
            run.feed(&mut child, bytes);
        }
        let next = if is_last {
            Upstream::Closed
        } else {
            child.stdout.take().map_or(Upstream::Closed, Upstream::Process)
        };

        run.running
            .spawn(supervise(index, stage.name.clone(), child, token, earlier));
        Ok(Some(next))
    }

    async fn run_builtin(
        &mut self,
        builtin: Builtin,
        stdout: &mut Sink,
        stderr: &mut Sink,
    ) -> Result<ExitCode> {
        let code = {
            let mut io = StageIo::new(stdout, stderr);
            builtin.run(&mut io, &mut self.env).await?
        };
        stdout.flush()?;
        stderr.flush()?;
        Ok(code)
    }

    /// Command for an external program. The program sees the name it was invoked with.
    fn command(&self, path: &Path, stage: &Stage) -> Command {
        let mut command = Command::new(path);
        #[cfg(unix)]
        command.arg0(&stage.name);
        command
            .args(&stage.args)
            .current_dir(&self.env.current_dir)
            .envs(&self.env.vars);
        command
    }

    /// Runs the interactive read-eval-print loop until `exit` or end of input.
    ///
    /// Each line is executed on `runtime`. Returns the exit code requested by `exit`,
    /// or 0 on end of input.
    pub fn repl(&mut self, runtime: &Runtime) -> Result<ExitCode> {
        let config = Config::builder()
            .completion_type(CompletionType::List)
            .build();
        let mut editor: Editor<ShellHelper, DefaultHistory> = Editor::with_config(config)?;
        editor.set_helper(Some(ShellHelper::new(&self.env.resolver)));
        for line in self.env.history.recall_lines() {
            editor.add_history_entry(line.as_str())?;
        }

        loop {
            if let Some(helper) = editor.helper_mut() {
                helper.refresh(&self.env.resolver);
            }

            match editor.readline(PROMPT) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        editor.add_history_entry(line.as_str())?;
                    }
                    if let Err(e) = runtime.block_on(self.execute_line(&line)) {
                        eprintln!("pipesh: {e:#}");
                    }
                    if self.env.should_exit() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            }
        }

        self.env.history.flush()?;
        Ok(self.env.exit_request.unwrap_or(0))
    }
}
