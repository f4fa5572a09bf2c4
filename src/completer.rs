use crate::builtin::Builtin;
use crate::external::PathResolver;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};
use std::collections::BTreeSet;

/// Line editor helper that completes command names.
///
/// Only the first word of a line is completed, from the builtin names and the
/// executables on the search list. A unique match gets a trailing space.
pub struct ShellHelper {
    resolver: PathResolver,
}

impl ShellHelper {
    pub fn new(resolver: &PathResolver) -> Self {
        Self {
            resolver: PathResolver::new(resolver.dirs().to_vec()),
        }
    }

    /// Follows changes of the shell's search list.
    pub fn refresh(&mut self, resolver: &PathResolver) {
        if self.resolver.dirs() != resolver.dirs() {
            self.resolver.replace_dirs(resolver.dirs().to_vec());
        }
    }

    fn command_names(&self, prefix: &str) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = Builtin::NAMES
            .iter()
            .filter(|name| name.starts_with(prefix))
            .map(|name| name.to_string())
            .collect();
        names.extend(self.resolver.executables_with_prefix(prefix));
        names
    }

    fn candidates(&self, line: &str, pos: usize) -> (usize, Vec<Pair>) {
        let head = &line[..pos];
        let start = head.len() - head.trim_start().len();
        let word = &head[start..];
        if word.is_empty() || word.contains(char::is_whitespace) {
            return (pos, Vec::new());
        }

        let names = self.command_names(word);
        let unique = names.len() == 1;
        let pairs = names
            .into_iter()
            .map(|name| Pair {
                replacement: if unique {
                    format!("{name} ")
                } else {
                    name.clone()
                },
                display: name,
            })
            .collect();
        (start, pairs)
    }
}

impl Completer for ShellHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        Ok(self.candidates(line, pos))
    }
}

impl Hinter for ShellHelper {
    type Hint = String;
}

impl Highlighter for ShellHelper {}

impl Validator for ShellHelper {}

impl Helper for ShellHelper {}
