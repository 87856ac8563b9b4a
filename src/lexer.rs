//! Lexical analysis (tokenization) of a command line.
//!
//! Words support single quotes, double quotes and backslash escapes. Every
//! token remembers the byte range it was read from so that later stages
//! (alias substitution, completion) can work on the original text.

use std::fmt;
use std::ops::Range;

/// The kind of a token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A word with quotes and escapes already removed.
    Word(String),
    /// The pipe operator, `|`.
    Pipe,
    /// Run the next pipeline only on success, `&&`.
    And,
    /// Run the next pipeline only on failure, `||`.
    Or,
    /// Unconditional sequencing, `;`.
    Semicolon,
    /// Input redirection, `<`.
    RedirectIn,
    /// Output redirection, `>`.
    RedirectOut,
    /// Appending output redirection, `>>`.
    RedirectAppend,
}

impl TokenKind {
    /// Operators that end a command and start a new one.
    pub fn is_separator(&self) -> bool {
        matches!(
            self,
            TokenKind::Pipe | TokenKind::And | TokenKind::Or | TokenKind::Semicolon
        )
    }

    pub fn is_redirect(&self) -> bool {
        matches!(
            self,
            TokenKind::RedirectIn | TokenKind::RedirectOut | TokenKind::RedirectAppend
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Word(word) => write!(f, "{word}"),
            TokenKind::Pipe => f.write_str("|"),
            TokenKind::And => f.write_str("&&"),
            TokenKind::Or => f.write_str("||"),
            TokenKind::Semicolon => f.write_str(";"),
            TokenKind::RedirectIn => f.write_str("<"),
            TokenKind::RedirectOut => f.write_str(">"),
            TokenKind::RedirectAppend => f.write_str(">>"),
        }
    }
}

/// A token together with the byte range of the input it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexingError {
    /// A closing quote (single or double) was not found.
    #[error("unterminated quote")]
    UnfinishedQuote,
    /// The line ends with a lone backslash.
    #[error("trailing backslash")]
    DanglingEscape,
    /// A single `&`; background jobs are not supported.
    #[error("background jobs ('&') are not supported")]
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

const OPERATOR_CHARS: &[char] = &['|', '&', ';', '<', '>'];

struct LexingFSM {
    input: Vec<(usize, char)>,
    len: usize,
    pos: usize,
    state: LexingState,
    word: String,
    word_start: usize,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.char_indices().collect(),
            len: line.len(),
            pos: 0,
            state: LexingState::Start,
            word: String::new(),
            word_start: 0,
        }
    }

    fn make_tokens(&mut self) -> Result<Vec<Token>, LexingError> {
        let mut out = Vec::new();

        while let Some((at, ch)) = self.read_char() {
            match self.state {
                LexingState::Start => self.handle_start(at, ch, &mut out)?,
                LexingState::ReadingWord => self.handle_word(at, ch, &mut out)?,
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch)?,
            }
        }

        match self.state {
            LexingState::ReadingSingleQuote | LexingState::ReadingDoubleQuote => {
                return Err(LexingError::UnfinishedQuote);
            }
            LexingState::ReadingWord => self.finish_word(self.len, &mut out),
            LexingState::Start => {}
        }

        Ok(out)
    }

    fn read_char(&mut self) -> Option<(usize, char)> {
        let item = self.input.get(self.pos).copied();
        if item.is_some() {
            self.pos += 1;
        }
        item
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).map(|&(_, ch)| ch)
    }

    fn handle_start(
        &mut self,
        at: usize,
        ch: char,
        out: &mut Vec<Token>,
    ) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {}
            // a comment runs to the end of the line
            '#' => self.pos = self.input.len(),
            c if OPERATOR_CHARS.contains(&c) => self.push_operator(at, c, out)?,
            c => {
                self.word_start = at;
                self.state = LexingState::ReadingWord;
                self.handle_word(at, c, out)?;
            }
        }
        Ok(())
    }

    fn handle_word(
        &mut self,
        at: usize,
        ch: char,
        out: &mut Vec<Token>,
    ) -> Result<(), LexingError> {
        match ch {
            c if c.is_whitespace() => {
                self.finish_word(at, out);
                self.state = LexingState::Start;
            }
            c if OPERATOR_CHARS.contains(&c) => {
                self.finish_word(at, out);
                self.state = LexingState::Start;
                self.push_operator(at, c, out)?;
            }
            '\'' => self.state = LexingState::ReadingSingleQuote,
            '"' => self.state = LexingState::ReadingDoubleQuote,
            '\\' => match self.read_char() {
                Some((_, escaped)) => self.word.push(escaped),
                None => return Err(LexingError::DanglingEscape),
            },
            c => self.word.push(c),
        }
        Ok(())
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.word.push(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) -> Result<(), LexingError> {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '\\' => match self.read_char() {
                Some((_, c @ ('"' | '\\' | '$' | '`'))) => self.word.push(c),
                Some((_, c)) => {
                    self.word.push('\\');
                    self.word.push(c);
                }
                None => return Err(LexingError::UnfinishedQuote),
            },
            c => self.word.push(c),
        }
        Ok(())
    }

    /// Emit the operator starting with `ch`, which must be one of [`OPERATOR_CHARS`].
    fn push_operator(
        &mut self,
        at: usize,
        ch: char,
        out: &mut Vec<Token>,
    ) -> Result<(), LexingError> {
        let (kind, width) = match (ch, self.peek_char()) {
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('|', _) => (TokenKind::Pipe, 1),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('&', _) => return Err(LexingError::Background),
            ('<', _) => (TokenKind::RedirectIn, 1),
            ('>', Some('>')) => (TokenKind::RedirectAppend, 2),
            ('>', _) => (TokenKind::RedirectOut, 1),
            _ => (TokenKind::Semicolon, 1),
        };
        if width == 2 {
            self.read_char();
        }
        out.push(Token {
            kind,
            span: at..at + width,
        });
        Ok(())
    }

    fn finish_word(&mut self, end: usize, out: &mut Vec<Token>) {
        out.push(Token {
            kind: TokenKind::Word(std::mem::take(&mut self.word)),
            span: self.word_start..end,
        });
    }
}

/// Split a command line into tokens.
pub fn split_into_tokens(line: &str) -> Result<Vec<Token>, LexingError> {
    LexingFSM::new(line).make_tokens()
}
