//! User-defined aliases and their substitution into command lines.

use crate::lexer::{self, Token, TokenKind};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasError {
    #[error("'{0}': invalid alias name")]
    InvalidName(String),
    #[error("{0}: not found")]
    NotFound(String),
}

/// Alias key to replacement text, kept in key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    /// Define or redefine `key`.
    pub fn define(&mut self, key: &str, value: &str) -> Result<(), AliasError> {
        let valid = !key.is_empty()
            && !key
                .chars()
                .any(|c| c.is_whitespace() || "'\"\\|&;<>#".contains(c));
        if !valid {
            return Err(AliasError::InvalidName(key.to_string()));
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), AliasError> {
        self.entries
            .remove(key)
            .map(drop)
            .ok_or_else(|| AliasError::NotFound(key.to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// All keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Print every alias as `alias key='value'`.
    pub fn write_all(&self, out: &mut dyn Write) -> io::Result<()> {
        for (key, value) in &self.entries {
            writeln!(out, "alias {key}='{}'", value.replace('\'', r"'\''"))?;
        }
        Ok(())
    }

    /// Substitute aliases for the leading word of every command in `line`.
    ///
    /// Only unquoted words qualify. A replacement whose own leading word is
    /// an alias is expanded again, but no key is used twice in one chain.
    /// Lines that do not lex are returned unchanged.
    pub fn resolve(&self, line: &str) -> String {
        if self.entries.is_empty() {
            return line.to_string();
        }
        let Ok(tokens) = lexer::split_into_tokens(line) else {
            return line.to_string();
        };

        let mut out = String::with_capacity(line.len());
        let mut copied = 0;
        for token in command_heads(&tokens) {
            let TokenKind::Word(word) = &token.kind else {
                continue;
            };
            let raw = &line[token.span.clone()];
            if raw != word {
                continue;
            }
            if let Some(expanded) = self.expand_head(word) {
                out.push_str(&line[copied..token.span.start]);
                out.push_str(&expanded);
                copied = token.span.end;
            }
        }
        out.push_str(&line[copied..]);
        out
    }

    fn expand_head(&self, word: &str) -> Option<String> {
        let mut seen = BTreeSet::new();
        let mut current = word.to_string();
        let mut expanded: Option<String> = None;

        while let Some(value) = self.entries.get(&current) {
            if !seen.insert(current.clone()) {
                break;
            }
            let text = match &expanded {
                None => value.clone(),
                Some(previous) => format!("{value}{}", &previous[current.len()..]),
            };
            current = leading_word(&text).unwrap_or_default();
            expanded = Some(text);
        }
        expanded
    }
}

/// The first word of each command, skipping redirection targets.
fn command_heads(tokens: &[Token]) -> impl Iterator<Item = &Token> {
    let mut at_head = true;
    let mut after_redirect = false;
    tokens.iter().filter(move |token| {
        let kind = &token.kind;
        if kind.is_separator() {
            at_head = true;
            after_redirect = false;
            return false;
        }
        if kind.is_redirect() {
            after_redirect = true;
            return false;
        }
        if after_redirect {
            after_redirect = false;
            return false;
        }
        std::mem::replace(&mut at_head, false)
    })
}

/// The leading word of `text` when it starts with a plain, unquoted word.
fn leading_word(text: &str) -> Option<String> {
    let start = text.len() - text.trim_start().len();
    if start != 0 {
        return None;
    }
    let end = text
        .find(|c: char| c.is_whitespace() || "|&;<>".contains(c))
        .unwrap_or(text.len());
    let word = &text[..end];
    (!word.is_empty() && !word.contains(['\'', '"', '\\'])).then(|| word.to_string())
}
