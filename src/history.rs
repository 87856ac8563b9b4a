//! Command history and `!`-style history expansion.

/// Entries of the session history, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct History {
    entries: Vec<String>,
}

/// Result of a successful expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub line: String,
    /// Whether any history reference was replaced.
    pub changed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpansionError {
    #[error("{0}: event not found")]
    EventNotFound(String),
    #[error("substitution failed")]
    SubstitutionFailed,
}

impl From<Vec<String>> for History {
    fn from(entries: Vec<String>) -> Self {
        Self { entries }
    }
}

impl History {
    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand history references in `line`.
    ///
    /// Supported: `!!`, `!n`, `!-n`, `!prefix`, `!?substring?`, `!$` and a
    /// leading `^old^new^`. A `!` before whitespace, `=`, `(` or the end of
    /// the line is literal, as is a `!` escaped by a backslash or inside
    /// single quotes. Double quotes do not protect a `!` unless it closes
    /// the quoted text.
    pub fn expand(&self, line: &str) -> Result<Expansion, ExpansionError> {
        if let Some(rest) = line.strip_prefix('^') {
            return self.quick_substitution(rest);
        }

        let chars: Vec<char> = line.chars().collect();
        let mut out = String::with_capacity(line.len());
        let mut changed = false;
        let mut in_single_quote = false;
        let mut in_double_quote = false;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' if !in_double_quote => {
                    in_single_quote = !in_single_quote;
                    out.push(c);
                    i += 1;
                }
                '"' if !in_single_quote => {
                    in_double_quote = !in_double_quote;
                    out.push(c);
                    i += 1;
                }
                '\\' if !in_single_quote && chars.get(i + 1) == Some(&'!') => {
                    out.push_str("\\!");
                    i += 2;
                }
                '!' if !in_single_quote => match chars.get(i + 1) {
                    None | Some(' ' | '\t' | '\n' | '=' | '(') => {
                        out.push('!');
                        i += 1;
                    }
                    Some('"') if in_double_quote => {
                        out.push('!');
                        i += 1;
                    }
                    Some(_) => {
                        let (text, used) = self.event(&chars[i + 1..])?;
                        out.push_str(&text);
                        i += 1 + used;
                        changed = true;
                    }
                },
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }

        Ok(Expansion { line: out, changed })
    }

    /// Resolve the event designator that follows a `!`. Returns the
    /// replacement and how many characters were consumed.
    fn event(&self, designator: &[char]) -> Result<(String, usize), ExpansionError> {
        let not_found = |used: usize| {
            let typed: String = designator[..used].iter().collect();
            ExpansionError::EventNotFound(format!("!{typed}"))
        };

        match designator[0] {
            '!' => self.last().map(|e| (e.to_string(), 1)).ok_or_else(|| not_found(1)),
            '$' => self
                .last()
                .map(|e| (e.split_whitespace().last().unwrap_or("").to_string(), 1))
                .ok_or_else(|| not_found(1)),
            '?' => {
                let body: String = designator[1..].iter().take_while(|&&c| c != '?').collect();
                let closed = designator.len() > body.chars().count() + 1;
                let used = 1 + body.chars().count() + usize::from(closed);
                self.entries
                    .iter()
                    .rev()
                    .find(|e| !body.is_empty() && e.contains(&body))
                    .map(|e| (e.clone(), used))
                    .ok_or_else(|| not_found(used))
            }
            '-' if designator.get(1).is_some_and(char::is_ascii_digit) => {
                let digits = count_digits(&designator[1..]);
                let used = 1 + digits;
                let back: usize = designator[1..used].iter().collect::<String>().parse().unwrap_or(0);
                (back >= 1 && back <= self.entries.len())
                    .then(|| (self.entries[self.entries.len() - back].clone(), used))
                    .ok_or_else(|| not_found(used))
            }
            c if c.is_ascii_digit() => {
                let used = count_digits(designator);
                let n: usize = designator[..used].iter().collect::<String>().parse().unwrap_or(0);
                (n >= 1 && n <= self.entries.len())
                    .then(|| (self.entries[n - 1].clone(), used))
                    .ok_or_else(|| not_found(used))
            }
            _ => {
                let used = designator
                    .iter()
                    .take_while(|c| !c.is_whitespace() && !"!;&|<>()'\"".contains(**c))
                    .count();
                if used == 0 {
                    return Err(not_found(1));
                }
                let prefix: String = designator[..used].iter().collect();
                self.entries
                    .iter()
                    .rev()
                    .find(|e| e.starts_with(&prefix))
                    .map(|e| (e.clone(), used))
                    .ok_or_else(|| not_found(used))
            }
        }
    }

    /// `^old^new^tail`: replace the first `old` in the previous entry.
    fn quick_substitution(&self, rest: &str) -> Result<Expansion, ExpansionError> {
        let mut parts = rest.splitn(3, '^');
        let old = parts.next().unwrap_or("");
        let new = parts.next().unwrap_or("");
        let tail = parts.next().unwrap_or("");

        let previous = self
            .last()
            .ok_or_else(|| ExpansionError::EventNotFound("^".to_string()))?;
        if old.is_empty() || !previous.contains(old) {
            return Err(ExpansionError::SubstitutionFailed);
        }
        Ok(Expansion {
            line: format!("{}{tail}", previous.replacen(old, new, 1)),
            changed: true,
        })
    }

    fn last(&self) -> Option<&str> {
        self.entries.last().map(String::as_str)
    }
}

fn count_digits(chars: &[char]) -> usize {
    chars.iter().take_while(|c| c.is_ascii_digit()).count()
}
