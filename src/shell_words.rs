//! POSIX shell-style word splitting for user-supplied engine options.
//!
//! Supports single quotes (literal), double quotes (backslash escapes only
//! `"` and `\`) and backslash escapes outside quotes. Nothing is expanded.

use thiserror::Error;

/// Characters never accepted in extra options.
pub const UNSAFE_CHARS: &[char] = &[';', '&', '|', '`', '$', '<', '>'];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    #[error("No closing quotation")]
    UnclosedQuote,

    #[error("No escaped character")]
    TrailingBackslash,
}

/// Returns true if the text contains a shell metacharacter from `UNSAFE_CHARS`.
pub fn has_unsafe_chars(text: &str) -> bool {
    text.contains(UNSAFE_CHARS)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Between,
    Word,
    Single,
    Double,
}

/// Splits a string into words.
pub fn split(input: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut state = State::Between;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match state {
            State::Between | State::Word => match c {
                c if c.is_whitespace() => {
                    if state == State::Word {
                        words.push(std::mem::take(&mut word));
                        state = State::Between;
                    }
                }
                '\'' => state = State::Single,
                '"' => state = State::Double,
                '\\' => {
                    word.push(chars.next().ok_or(SplitError::TrailingBackslash)?);
                    state = State::Word;
                }
                c => {
                    word.push(c);
                    state = State::Word;
                }
            },
            State::Single => match c {
                '\'' => state = State::Word,
                c => word.push(c),
            },
            State::Double => match c {
                '"' => state = State::Word,
                '\\' => {
                    let next = chars.next().ok_or(SplitError::UnclosedQuote)?;
                    if next != '"' && next != '\\' {
                        word.push('\\');
                    }
                    word.push(next);
                }
                c => word.push(c),
            },
        }
    }

    match state {
        State::Single | State::Double => Err(SplitError::UnclosedQuote),
        State::Word => {
            words.push(word);
            Ok(words)
        }
        State::Between => Ok(words),
    }
}
