//! # Inline Glyph Escape Parser
//!
//! Text handed to the font engine may reference named glyphs (icons, umlauts
//! the asset generator stored under a name, ...) by wrapping the name in two
//! pairs of braces: `"Sunny {{SUN}}"`.
//!
//! The parser is a small finite-state machine fed one character at a time.
//! It never looks ahead, so the layout pass can interleave parsing and
//! blitting without buffering the whole string.
//!
//! | state        | `{`                          | `}`                         | other                 |
//! |--------------|------------------------------|-----------------------------|-----------------------|
//! | `Idle`       | → `Open1`                    | ignored                     | emit literal          |
//! | `Open1`      | → `Collecting`               | → `Idle` (emit name if any) | emit literal, → `Idle`|
//! | `Collecting` | emit literal `{`, → `Idle`   | → `Open1`                   | append to name        |
//!
//! Ending the input anywhere but `Idle` is an [`EscapeError::Unclosed`].

use thiserror::Error;

/// Brace depth of the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeState {
    /// No unmatched `{`.
    Idle,
    /// One unmatched `{`.
    Open1,
    /// Two unmatched `{`; plain characters accumulate into the name buffer.
    Collecting,
}

impl EscapeState {
    fn depth(self) -> u8 {
        match self {
            EscapeState::Idle => 0,
            EscapeState::Open1 => 1,
            EscapeState::Collecting => 2,
        }
    }
}

/// Something the layout pass has to draw.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    /// A plain character, looked up by itself.
    Literal(char),
    /// A glyph addressed by name via `{{NAME}}`.
    Named(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EscapeError {
    /// An opening `{{` was never closed, `name` is what had been collected so far.
    #[error("unclosed glyph escape: {{{{{name}")]
    Unclosed { name: String },
}

/// Character-at-a-time parser for the `{{NAME}}` escape protocol.
#[derive(Debug)]
pub struct EscapeParser {
    state: EscapeState,
    name: String,
}

impl Default for EscapeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EscapeParser {
    pub fn new() -> Self {
        Self {
            state: EscapeState::Idle,
            name: String::new(),
        }
    }

    pub fn state(&self) -> EscapeState {
        self.state
    }

    /// Feed one character, returning the token to draw, if any.
    pub fn feed(&mut self, ch: char) -> Result<Option<Token>, EscapeError> {
        match (ch, self.state) {
            ('{', EscapeState::Idle) => {
                self.state = EscapeState::Open1;
                Ok(None)
            }
            ('{', EscapeState::Open1) => {
                self.state = EscapeState::Collecting;
                Ok(None)
            }
            ('{', EscapeState::Collecting) => {
                // a third opening brace never starts a deeper level
                self.state = EscapeState::Idle;
                self.name.clear();
                Ok(Some(Token::Literal('{')))
            }
            ('}', EscapeState::Idle) => Ok(None),
            ('}', EscapeState::Collecting) => {
                self.state = EscapeState::Open1;
                Ok(None)
            }
            ('}', EscapeState::Open1) => {
                self.state = EscapeState::Idle;
                if self.name.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Token::Named(std::mem::take(&mut self.name))))
                }
            }
            (other, EscapeState::Collecting) => {
                self.name.push(other);
                Ok(None)
            }
            (_, EscapeState::Open1) if !self.name.is_empty() => {
                // `{{NAME}x`: the closing pair was cut short
                Err(EscapeError::Unclosed {
                    name: std::mem::take(&mut self.name),
                })
            }
            (other, _) => {
                self.state = EscapeState::Idle;
                Ok(Some(Token::Literal(other)))
            }
        }
    }

    /// Signal end of input.
    pub fn finish(self) -> Result<(), EscapeError> {
        if self.state.depth() > 0 {
            return Err(EscapeError::Unclosed { name: self.name });
        }
        Ok(())
    }
}

/// Tokenize a whole string. Mostly useful for tests and diagnostics; the
/// font engine drives [`EscapeParser`] directly.
pub fn tokenize(text: &str) -> Result<Vec<Token>, EscapeError> {
    let mut parser = EscapeParser::new();
    let mut tokens = Vec::with_capacity(text.len());
    for ch in text.chars() {
        if let Some(token) = parser.feed(ch)? {
            tokens.push(token);
        }
    }
    parser.finish()?;
    Ok(tokens)
}
