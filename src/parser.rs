use crate::lexer::{self, LexingError, Token, TokenKind};

/// Kind of redirection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectKind {
    /// Input redirection (`<`): reads standard input from a file.
    Input,
    /// Output redirection (`>`): writes standard output to a file, truncating it.
    Output,
    /// Output redirection with append (`>>`).
    Append,
}

/// An I/O redirection attached to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub kind: RedirectKind,
    pub target: String,
}

/// A single command: its words plus any redirections, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleCommand {
    pub argv: Vec<String>,
    pub redirects: Vec<Redirect>,
}

/// Condition under which a pipeline in a list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// First pipeline, or one following `;`.
    Always,
    /// Following `&&`.
    IfSuccess,
    /// Following `||`.
    IfFailure,
}

/// A pipeline together with the connector that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub connector: Connector,
    pub pipeline: Vec<SimpleCommand>,
}

/// A whole command line: pipelines joined by `;`, `&&` and `||`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub items: Vec<ListItem>,
}

/// Errors that can occur while building a [`Script`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParsingError {
    #[error(transparent)]
    Lexing(#[from] LexingError),
    /// Encountered a token that was not expected at the current position.
    #[error("unexpected token '{0}'")]
    UnexpectedToken(TokenKind),
    /// The line ended in the middle of a construct (e.g. after `&&`).
    #[error("unexpected end of line")]
    UnexpectedEnd,
    /// A redirection operator was not followed by a file name.
    #[error("missing file name after '{0}'")]
    ExpectedRedirectTarget(TokenKind),
}

struct ScriptBuilder {
    tokens: Vec<Token>,
    pos: usize,
}

impl ScriptBuilder {
    fn from(tokens: Vec<Token>) -> Self {
        ScriptBuilder { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn consume(&mut self) -> Option<TokenKind> {
        let kind = self.tokens.get(self.pos).map(|t| t.kind.clone());
        if kind.is_some() {
            self.pos += 1;
        }
        kind
    }

    /// Parse a list: pipeline ((';' | '&&' | '||') pipeline)* [';']
    fn parse_list(mut self) -> Result<Script, ParsingError> {
        let mut items = Vec::new();
        let mut connector = Connector::Always;

        while self.peek().is_some() {
            let pipeline = self.parse_pipeline()?;
            items.push(ListItem {
                connector,
                pipeline,
            });

            connector = match self.consume() {
                None => break,
                Some(TokenKind::Semicolon) => Connector::Always,
                Some(TokenKind::And) => Connector::IfSuccess,
                Some(TokenKind::Or) => Connector::IfFailure,
                Some(other) => return Err(ParsingError::UnexpectedToken(other)),
            };
            if connector != Connector::Always && self.peek().is_none() {
                return Err(ParsingError::UnexpectedEnd);
            }
        }

        Ok(Script { items })
    }

    /// Parse a pipeline: command ('|' command)*
    fn parse_pipeline(&mut self) -> Result<Vec<SimpleCommand>, ParsingError> {
        let mut commands = vec![self.parse_command()?];
        while let Some(TokenKind::Pipe) = self.peek() {
            self.consume();
            commands.push(self.parse_command()?);
        }
        Ok(commands)
    }

    /// Parse a command: (word | redirect)+
    fn parse_command(&mut self) -> Result<SimpleCommand, ParsingError> {
        let mut argv = Vec::new();
        let mut redirects = Vec::new();

        while let Some(kind) = self.peek() {
            let redirect = match kind {
                TokenKind::Word(_) => None,
                TokenKind::RedirectIn => Some(RedirectKind::Input),
                TokenKind::RedirectOut => Some(RedirectKind::Output),
                TokenKind::RedirectAppend => Some(RedirectKind::Append),
                _ => break,
            };
            let operator = self.consume().ok_or(ParsingError::UnexpectedEnd)?;
            match (redirect, operator) {
                (None, TokenKind::Word(word)) => argv.push(word),
                (Some(kind), operator) => match self.consume() {
                    Some(TokenKind::Word(target)) => redirects.push(Redirect { kind, target }),
                    _ => return Err(ParsingError::ExpectedRedirectTarget(operator)),
                },
                (None, other) => return Err(ParsingError::UnexpectedToken(other)),
            }
        }

        if argv.is_empty() {
            return match self.peek() {
                Some(kind) => Err(ParsingError::UnexpectedToken(kind.clone())),
                None => Err(ParsingError::UnexpectedEnd),
            };
        }
        Ok(SimpleCommand { argv, redirects })
    }
}

/// Parse a command line into a [`Script`]. Blank lines give an empty script.
pub fn parse(line: &str) -> Result<Script, ParsingError> {
    let tokens = lexer::split_into_tokens(line)?;
    ScriptBuilder::from(tokens).parse_list()
}
