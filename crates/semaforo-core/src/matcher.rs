//! Whole-word keyword matching.
//!
//! Text is split into alternating word and separator runs. Separators are
//! whitespace plus [`SEPARATOR_PUNCTUATION`], and they stay in the token
//! stream so concatenating every token reproduces the input byte for byte.

use std::ops::Range;

pub const SEPARATOR_PUNCTUATION: [char; 9] = ['.', ',', '!', '?', ';', ':', '(', ')', '"'];

/// Shortest constituent of a multi-word title that is allowed to match alone.
pub const MIN_INFORMATIVE_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    Separator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset into the source text.
    pub start: usize,
}

impl Token<'_> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.text.len()
    }

    pub fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || SEPARATOR_PUNCTUATION.contains(&c)
}

pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut current: Option<(TokenKind, usize)> = None;

    for (i, c) in text.char_indices() {
        let kind = if is_separator(c) {
            TokenKind::Separator
        } else {
            TokenKind::Word
        };
        match current {
            Some((k, _)) if k == kind => {}
            Some((k, start)) => {
                tokens.push(Token {
                    kind: k,
                    text: &text[start..i],
                    start,
                });
                current = Some((kind, i));
            }
            None => current = Some((kind, i)),
        }
    }
    if let Some((kind, start)) = current {
        tokens.push(Token {
            kind,
            text: &text[start..],
            start,
        });
    }
    tokens
}

/// Lower-case a token after removing the separator punctuation.
pub fn normalize(token: &str) -> String {
    token
        .chars()
        .filter(|c| !SEPARATOR_PUNCTUATION.contains(c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A keyword title prepared for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordPattern {
    key: String,
    terms: Vec<String>,
}

impl KeywordPattern {
    /// Returns `None` for titles that can never match (blank, or multi-word
    /// titles made only of short words).
    pub fn new(title: &str) -> Option<Self> {
        let key = allocation_key(title)?;
        let parts: Vec<String> = title
            .split_whitespace()
            .map(normalize)
            .filter(|p| !p.is_empty())
            .collect();
        let terms: Vec<String> = if parts.len() > 1 {
            parts
                .into_iter()
                .filter(|p| p.chars().count() >= MIN_INFORMATIVE_LEN)
                .collect()
        } else {
            parts
        };
        if terms.is_empty() {
            return None;
        }
        Some(Self { key, terms })
    }

    /// Lower-cased title used as the allocation key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    fn hits(&self, token: &Token<'_>) -> bool {
        token.is_word() && {
            let word = normalize(token.text);
            self.terms.iter().any(|t| *t == word)
        }
    }

    /// Byte ranges of every matching word token, in text order.
    pub fn find_all(&self, tokens: &[Token<'_>]) -> Vec<Range<usize>> {
        tokens
            .iter()
            .filter(|t| self.hits(t))
            .map(|t| t.range())
            .collect()
    }

    pub fn find_in(&self, tokens: &[Token<'_>]) -> Option<Range<usize>> {
        tokens.iter().find(|t| self.hits(t)).map(|t| t.range())
    }
}

/// The lower-cased, trimmed title, or `None` when blank.
pub fn allocation_key(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Byte range of the first token in `text` that matches `keyword_title`.
pub fn find_match(text: &str, keyword_title: &str) -> Option<Range<usize>> {
    let pattern = KeywordPattern::new(keyword_title)?;
    pattern.find_in(&tokenize(text))
}

pub fn matches(text: &str, keyword_title: &str) -> bool {
    find_match(text, keyword_title).is_some()
}
