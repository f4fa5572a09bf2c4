use crate::lexer::{self, Token};
use tracing::debug;

/// How a redirect target file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `>`: create or truncate the target.
    Overwrite,
    /// `>>`: create or extend the target.
    Append,
}

/// An output redirection of one stream of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// The file name exactly as written on the command line.
    pub target: String,
    pub mode: RedirectMode,
}

impl Redirect {
    pub fn overwrite(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: RedirectMode::Overwrite,
        }
    }

    pub fn append(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            mode: RedirectMode::Append,
        }
    }
}

/// A single command: its name, positional arguments and output redirects.
///
/// An empty `name` means the text held no command at all; such a stage is never executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub args: Vec<String>,
    pub stdout: Option<Redirect>,
    pub stderr: Option<Redirect>,
}

impl Stage {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A lone command.
    Single(Stage),
    /// Two or more commands connected by `|`, in execution order.
    /// Every stage has a non-empty name.
    Pipeline(Vec<Stage>),
}

impl ParsedLine {
    /// True for blank input, i.e. nothing to execute.
    pub fn is_blank(&self) -> bool {
        matches!(self, ParsedLine::Single(stage) if stage.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Redirect operators, more specific spellings first so that fused forms
/// such as `1>>file` are not mistaken for `1>` followed by `>file`.
const OPERATORS: [(&str, Stream, RedirectMode); 6] = [
    ("1>>", Stream::Stdout, RedirectMode::Append),
    ("2>>", Stream::Stderr, RedirectMode::Append),
    (">>", Stream::Stdout, RedirectMode::Append),
    ("1>", Stream::Stdout, RedirectMode::Overwrite),
    ("2>", Stream::Stderr, RedirectMode::Overwrite),
    (">", Stream::Stdout, RedirectMode::Overwrite),
];

enum Operator<'a> {
    /// The operator stands alone; the target is the next word.
    Bare(Stream, RedirectMode),
    /// The operator is glued to its target, e.g. `2>err.txt`.
    Fused(Stream, RedirectMode, &'a str),
}

fn match_operator(token: &Token) -> Option<Operator<'_>> {
    if token.protected {
        return None;
    }
    OPERATORS.iter().find_map(|&(op, stream, mode)| {
        let rest = token.text.strip_prefix(op)?;
        if rest.is_empty() {
            Some(Operator::Bare(stream, mode))
        } else {
            Some(Operator::Fused(stream, mode, rest))
        }
    })
}

struct StageBuilder {
    stage: Stage,
}

impl StageBuilder {
    fn set_redirect(&mut self, stream: Stream, mode: RedirectMode, target: &str) {
        let redirect = Some(Redirect {
            target: target.to_string(),
            mode,
        });
        // The last redirect of a stream wins.
        match stream {
            Stream::Stdout => self.stage.stdout = redirect,
            Stream::Stderr => self.stage.stderr = redirect,
        }
    }

    fn build(tokens: Vec<Token>) -> Stage {
        let mut tokens = tokens.into_iter();
        let Some(name) = tokens.next() else {
            return Stage::default();
        };

        let mut builder = StageBuilder {
            stage: Stage {
                name: name.text,
                ..Stage::default()
            },
        };

        while let Some(token) = tokens.next() {
            match match_operator(&token) {
                Some(Operator::Fused(stream, mode, target)) => {
                    builder.set_redirect(stream, mode, target);
                }
                Some(Operator::Bare(stream, mode)) => match tokens.next() {
                    Some(target) => builder.set_redirect(stream, mode, &target.text),
                    // Dangling operator: keep it as an ordinary word.
                    None => builder.stage.args.push(token.text),
                },
                None => builder.stage.args.push(token.text),
            }
        }

        builder.stage
    }
}

/// Tokenizes one command (no pipe splitting) and extracts its redirects.
///
/// The first word is the command name. Unprotected words matching `>`, `1>`, `>>`,
/// `1>>`, `2>` or `2>>` consume the following word as their target; the same
/// operators fused with a non-empty remainder carry their target inline. All
/// remaining words are positional arguments in their original order.
pub fn parse_stage(text: &str) -> Stage {
    StageBuilder::build(lexer::tokenize(text))
}

/// Parses a full input line into a single command or a pipeline.
///
/// The line is split at every bare `|`. If any resulting segment has no command
/// name, the pipeline reading is abandoned and the whole line is tokenized as one
/// command, which turns the pipe characters into ordinary words.
pub fn parse_line(text: &str) -> ParsedLine {
    let segments = lexer::split_pipes(text);
    if segments.len() < 2 {
        return ParsedLine::Single(parse_stage(text));
    }

    let stages: Vec<Stage> = segments.into_iter().map(parse_stage).collect();
    if stages.iter().any(Stage::is_empty) {
        debug!(line = text, "empty pipeline segment, parsing line as a single command");
        return ParsedLine::Single(parse_stage(text));
    }

    debug!(stages = stages.len(), "parsed pipeline");
    ParsedLine::Pipeline(stages)
}
