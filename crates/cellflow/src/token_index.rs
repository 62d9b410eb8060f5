//! Context completion from the tokens already visible in a cell.
//!
//! This is a textual heuristic: every distinct token spelling in the cell,
//! plus every known cell identity and its `Out['<identity>']` reference, is a
//! candidate. Candidates that extend the token under the cursor are offered
//! in discovery order. Nothing here knows about scopes, imports or types.

use std::collections::HashSet;
use std::ops::Range;

use serde::Serialize;

use crate::identity::CellIdentity;

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Identifier,
    Number,
    String,
    Operator,
    Comment,
    /// Brackets, commas, colons, dots: structure, not content.
    Punctuation,
    Whitespace,
}

impl TokenClass {
    /// Whether tokens of this class are worth offering as completions.
    pub fn is_candidate(self) -> bool {
        !matches!(self, TokenClass::Punctuation | TokenClass::Whitespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub text: &'a str,
    pub class: TokenClass,
    /// Byte range within the scanned text.
    pub span: Range<usize>,
}

const PUNCTUATION: &str = "()[]{},:;.";
const OPERATORS: &str = "+-*/%=<>!&|^~@";

/// Split `text` into lexical tokens covering every byte of the input.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let class = if c.is_whitespace() {
            while chars.next_if(|&(_, n)| n.is_whitespace()).is_some() {}
            TokenClass::Whitespace
        } else if c == '#' {
            while chars.next_if(|&(_, n)| n != '\n').is_some() {}
            TokenClass::Comment
        } else if c == '"' || c == '\'' {
            scan_string(text, start, c, &mut chars);
            TokenClass::String
        } else if c.is_ascii_digit() {
            while chars
                .next_if(|&(_, n)| n.is_alphanumeric() || n == '_' || n == '.')
                .is_some()
            {}
            TokenClass::Number
        } else if c.is_alphabetic() || c == '_' {
            while chars
                .next_if(|&(_, n)| n.is_alphanumeric() || n == '_')
                .is_some()
            {}
            TokenClass::Identifier
        } else if PUNCTUATION.contains(c) {
            TokenClass::Punctuation
        } else if OPERATORS.contains(c) {
            while chars.next_if(|&(_, n)| OPERATORS.contains(n)).is_some() {}
            TokenClass::Operator
        } else {
            TokenClass::Operator
        };

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        tokens.push(Token {
            text: &text[start..end],
            class,
            span: start..end,
        });
    }

    tokens
}

/// Consume a string literal opened by `quote` at byte `start`. Triple-quoted
/// strings may span lines; single-quoted ones end at the newline.
fn scan_string(
    text: &str,
    start: usize,
    quote: char,
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) {
    let triple: String = std::iter::repeat(quote).take(3).collect();
    if text[start..].starts_with(&triple) {
        chars.next();
        chars.next();
        let body = start + 3;
        let close = text[body..]
            .find(&triple)
            .map(|i| body + i + 3)
            .unwrap_or(text.len());
        while chars.next_if(|&(i, _)| i < close).is_some() {}
        return;
    }

    let mut escaped = false;
    while let Some((_, n)) = chars.next_if(|&(_, n)| n != '\n') {
        if escaped {
            escaped = false;
        } else if n == '\\' {
            escaped = true;
        } else if n == quote {
            break;
        }
    }
}

/// One completion offered to the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub text: String,
    /// Always `"context"`: suggestions come from visible text, not the kernel.
    pub kind: &'static str,
    /// Byte range of the text the suggestion replaces.
    pub replace: Range<usize>,
}

/// Distinct candidate strings, in first-discovery order: token spellings,
/// then per identity its output reference and the bare identity.
pub fn candidates(text: &str, identities: &[CellIdentity]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut maybe_add = |s: String| {
        if seen.insert(s.clone()) {
            found.push(s);
        }
    };

    for token in tokenize(text) {
        if token.class.is_candidate() {
            maybe_add(token.text.to_string());
        }
    }
    for identity in identities {
        maybe_add(identity.output_reference());
        maybe_add(identity.as_str().to_string());
    }
    found
}

/// The token the cursor sits in or directly after, as `(stem, span)`.
///
/// Whitespace and punctuation yield an empty stem positioned at the cursor.
pub fn stem_at(text: &str, cursor: usize) -> (&str, Range<usize>) {
    let cursor = floor_char_boundary(text, cursor);
    let token = tokenize(text)
        .into_iter()
        .find(|t| t.span.start < cursor && cursor <= t.span.end);

    match token {
        Some(t) if t.class.is_candidate() => (t.text, t.span),
        _ => ("", cursor..cursor),
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Offer every candidate that starts with the stem under `cursor` but is not
/// the stem itself. An empty stem offers the whole candidate pool.
pub fn complete(text: &str, cursor: usize, identities: &[CellIdentity]) -> Vec<Suggestion> {
    let (stem, span) = stem_at(text, cursor);
    candidates(text, identities)
        .into_iter()
        .filter(|candidate| candidate.starts_with(stem) && candidate != stem)
        .map(|candidate| Suggestion {
            text: candidate,
            kind: "context",
            replace: span.clone(),
        })
        .collect()
}
