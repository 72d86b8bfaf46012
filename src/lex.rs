use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{Error, Result};

pub const LABEL_DECL: char = ':';
pub const LABEL_REF: char = '.';
const DELIMITER: char = ' ';

/// A space-delimited word of source text. `index` is the position of the
/// token in the original source and survives label substitution, so later
/// stages can report where an error came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub index: usize,
}

impl Token {
    pub fn new(text: impl Into<String>, index: usize) -> Self {
        Self {
            text: text.into(),
            index,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_label_decl(&self) -> bool {
        self.text.starts_with(LABEL_DECL)
    }

    pub fn is_label_ref(&self) -> bool {
        self.text.starts_with(LABEL_REF)
    }

    /// Name of a declared or referenced label, without its sigil.
    pub fn label_name(&self) -> Result<&str> {
        match self.text.get(1..) {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Error::MalformedToken {
                index: self.index,
                token: self.text.clone(),
            }),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

struct Lexer<'a> {
    source: &'a str,
    it: Peekable<Chars<'a>>,
    tokens: Vec<Token>,
    start: usize,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            it: source.chars().peekable(),
            tokens: vec![],
            start: 0,
            pos: 0,
        }
    }

    fn make_tokens(mut self) -> Vec<Token> {
        loop {
            self.consume_while(|ch| *ch != DELIMITER);
            self.add_token();

            // step over the delimiter, or stop at end of source
            if self.consume().is_none() {
                break;
            }
            self.start = self.pos;
        }

        self.tokens
    }

    fn consume(&mut self) -> Option<char> {
        let ch = self.it.next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn peek(&mut self) -> Option<&char> {
        self.it.peek()
    }

    fn lexeme(&self) -> &'a str {
        let source = self.source;
        &source[self.start..self.pos]
    }

    fn add_token(&mut self) {
        let index = self.tokens.len();
        self.tokens.push(Token::new(self.lexeme(), index));
    }

    fn consume_while<F>(&mut self, condition: F)
    where
        F: Fn(&char) -> bool,
    {
        while let Some(ch) = self.peek() {
            if condition(ch) {
                self.consume();
            } else {
                break;
            }
        }
    }
}

/// Number of tokens `tokenize` will produce for `source`.
pub fn token_count(source: &str) -> usize {
    source.matches(DELIMITER).count() + 1
}

/// Splits `source` on single spaces. Always yields `token_count(source)`
/// tokens; consecutive spaces produce empty tokens.
pub fn tokenize(source: &str) -> Vec<Token> {
    let tokens = Lexer::new(source).make_tokens();
    log::debug!("tokenized {} tokens", tokens.len());
    tokens
}

/// Like `tokenize`, but checks a count the caller computed up front.
pub fn tokenize_counted(source: &str, expected: usize) -> Result<Vec<Token>> {
    let actual = token_count(source);
    if actual != expected {
        return Err(Error::InvalidTokenCount { expected, actual });
    }

    Ok(tokenize(source))
}

/// Re-joins tokens with single spaces.
pub fn join(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(Token::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
