//! Lexical analysis for the shell grammar: words, quotes, escapes and pipe boundaries.
//!
//! The lexer never fails. Unterminated quotes simply run to the end of the line and
//! a trailing lone backslash is kept literally.

/// A word produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The word after quote removal and escape processing.
    pub text: String,
    /// Set when any character of the word came from a quoted span or an escape.
    /// Protected words are never treated as redirect operators.
    pub protected: bool,
}

#[cfg(test)]
impl Token {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            protected: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            protected: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    buffer: String,
    protected: bool,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            buffer: String::new(),
            protected: false,
        }
    }

    /// Runs the state machine over the whole input and returns the words in order.
    ///
    /// Adjacent quoted and unquoted spans with no whitespace between them end up
    /// in the same word, so `'a'b"c"` yields a single token `abc`.
    fn make_tokens(mut self) -> Vec<Token> {
        let mut out = Vec::new();

        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_unquoted(ch, &mut out),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }

        if self.state != LexingState::Start {
            self.finish_word(&mut out);
        }
        out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_unquoted(&mut self, ch: char, out: &mut Vec<Token>) {
        match ch {
            ' ' | '\t' => {
                if self.state == LexingState::ReadingWord {
                    self.finish_word(out);
                }
            }
            '\\' => {
                self.state = LexingState::ReadingWord;
                match self.read_char() {
                    Some(escaped) => {
                        self.buffer.push(escaped);
                        self.protected = true;
                    }
                    None => self.buffer.push('\\'),
                }
            }
            '\'' => {
                self.state = LexingState::ReadingSingleQuote;
                self.protected = true;
            }
            '"' => {
                self.state = LexingState::ReadingDoubleQuote;
                self.protected = true;
            }
            _ => {
                self.state = LexingState::ReadingWord;
                self.buffer.push(ch);
            }
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        if ch == '\'' {
            self.state = LexingState::ReadingWord;
        } else {
            self.buffer.push(ch);
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.peek_char() {
                Some(next @ ('\\' | '"')) => {
                    self.pos += 1;
                    self.buffer.push(next);
                }
                // Anything else keeps the backslash; the next char is read on its own.
                _ => self.buffer.push('\\'),
            },
            _ => self.buffer.push(ch),
        }
    }

    fn finish_word(&mut self, out: &mut Vec<Token>) {
        out.push(Token {
            text: std::mem::take(&mut self.buffer),
            protected: std::mem::replace(&mut self.protected, false),
        });
        self.state = LexingState::Start;
    }
}

/// Splits a line into words, honoring quotes and backslash escapes.
pub fn tokenize(line: &str) -> Vec<Token> {
    LexingFSM::new(line).make_tokens()
}

/// Splits a raw line at every `|` that is neither quoted nor escaped.
///
/// Quote and escape tracking mirrors [`tokenize`], so a segment boundary is only
/// placed where the tokenizer would also see a bare pipe character. The segments are
/// returned untrimmed; a line without a bare pipe yields a single segment.
pub fn split_pipes(line: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut state = LexingState::Start;
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match state {
            LexingState::ReadingSingleQuote => {
                if ch == '\'' {
                    state = LexingState::Start;
                }
            }
            LexingState::ReadingDoubleQuote => match ch {
                '"' => state = LexingState::Start,
                '\\' => {
                    if matches!(chars.peek(), Some((_, '\\' | '"'))) {
                        chars.next();
                    }
                }
                _ => {}
            },
            LexingState::Start | LexingState::ReadingWord => match ch {
                '\\' => {
                    chars.next();
                }
                '\'' => state = LexingState::ReadingSingleQuote,
                '"' => state = LexingState::ReadingDoubleQuote,
                '|' => {
                    segments.push(&line[start..idx]);
                    start = idx + ch.len_utf8();
                }
                _ => {}
            },
        }
    }

    segments.push(&line[start..]);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(line: &str) -> Vec<String> {
        tokenize(line).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_whitespace_separates_and_collapses() {
        assert_eq!(texts("echo   hello \t world"), vec!["echo", "hello", "world"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \t  ").is_empty());
    }

    #[test]
    fn test_single_quotes_are_literal() {
        assert_eq!(texts("echo 'hello world'"), vec!["echo", "hello world"]);
        assert_eq!(texts(r#"echo 'he said \"hi\"'"#), vec!["echo", r#"he said \"hi\""#]);
        assert_eq!(texts(r"echo 'a\nb'"), vec!["echo", r"a\nb"]);
    }

    #[test]
    fn test_empty_quotes_produce_empty_word() {
        assert_eq!(tokenize("echo ''")[1], Token::quoted(""));
        assert_eq!(tokenize(r#"echo """#)[1], Token::quoted(""));
    }

    #[test]
    fn test_double_quote_escapes() {
        assert_eq!(texts(r#"echo "a\\b""#), vec!["echo", r"a\b"]);
        assert_eq!(texts(r#"echo "a\"b""#), vec!["echo", r#"a"b"#]);
        assert_eq!(texts(r#"echo "a\nb""#), vec!["echo", r"a\nb"]);
        assert_eq!(texts(r#"echo "'quoted'""#), vec!["echo", "'quoted'"]);
    }

    #[test]
    fn test_backslash_outside_quotes() {
        assert_eq!(texts(r"echo hello\ world"), vec!["echo", "hello world"]);
        assert_eq!(texts(r"echo a\\b"), vec!["echo", r"a\b"]);
        assert_eq!(texts(r"echo it\'s"), vec!["echo", "it's"]);
        assert_eq!(texts(r"echo hello\"), vec!["echo", r"hello\"]);
    }

    #[test]
    fn test_adjacent_spans_concatenate() {
        assert_eq!(tokenize(r#"'a'b"c""#), vec![Token::quoted("abc")]);
        assert_eq!(texts("echo 'hello'world"), vec!["echo", "helloworld"]);
    }

    #[test]
    fn test_protection_flag() {
        let tokens = tokenize(r"> '>' \> x");
        assert_eq!(
            tokens,
            vec![
                Token::plain(">"),
                Token::quoted(">"),
                Token::quoted(">"),
                Token::plain("x"),
            ]
        );
    }

    #[test]
    fn test_unterminated_quote_runs_to_end() {
        assert_eq!(texts("echo 'abc def"), vec!["echo", "abc def"]);
    }

    #[test]
    fn test_split_pipes_at_every_bare_pipe() {
        assert_eq!(split_pipes("a | b|c"), vec!["a ", " b", "c"]);
        assert_eq!(split_pipes("echo hi"), vec!["echo hi"]);
        assert_eq!(split_pipes("a | | b"), vec!["a ", " ", " b"]);
    }

    #[test]
    fn test_split_pipes_ignores_quoted_and_escaped() {
        assert_eq!(split_pipes("echo 'a | b'"), vec!["echo 'a | b'"]);
        assert_eq!(split_pipes(r#"echo "a | b""#), vec![r#"echo "a | b""#]);
        assert_eq!(split_pipes(r"echo a \| b"), vec![r"echo a \| b"]);
        assert_eq!(split_pipes(r#"echo "x\"|" | wc"#), vec![r#"echo "x\"|" "#, " wc"]);
    }
}
