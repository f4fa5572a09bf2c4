use anyhow::{Context, Result};
use argh::FromArgs;
use pipesh::env::Environment;
use pipesh::history::{self, CommandHistory};
use pipesh::{Interpreter, logging};
use tracing::warn;

#[derive(FromArgs)]
/// An interactive shell with pipelines and output redirection.
struct Args {
    #[argh(option, short = 'c')]
    /// execute this line and exit.
    command: Option<String>,

    #[argh(option)]
    /// history file, written on exit; overrides $HISTFILE.
    histfile: Option<String>,

    #[argh(option, default = "String::from(\"warn\")")]
    /// log filter used when $PIPESH_LOG is not set.
    log_level: String,
}

fn open_history(args: &Args, env: &Environment) -> CommandHistory {
    let explicit = args.histfile.clone().or_else(|| env.get_var("HISTFILE"));
    let (path, mode) = history::locate(explicit.as_deref(), &env.current_dir);
    CommandHistory::load(&path, mode).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "history file unavailable, keeping history in memory");
        CommandHistory::in_memory()
    })
}

fn run(args: Args) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    let env = Environment::new();
    let history = open_history(&args, &env);
    let mut interpreter = Interpreter::new(env.with_history(history));

    match args.command {
        Some(line) => {
            let outcome = runtime.block_on(interpreter.execute_line(&line));
            interpreter.env_mut().history.flush()?;
            match outcome {
                Ok(()) => Ok(interpreter.env().exit_request.unwrap_or(0)),
                Err(e) => {
                    eprintln!("pipesh: {e:#}");
                    Ok(1)
                }
            }
        }
        None => interpreter.repl(&runtime),
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    logging::init(&args.log_level)?;

    let code = run(args)?;
    std::process::exit(code);
}
