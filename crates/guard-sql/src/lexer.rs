// SPDX-License-Identifier: Apache-2.0

//! Minimal SQLite lexer
//!
//! Produces just enough token structure to find statement boundaries,
//! leading keywords and table references. Whitespace and comments are
//! dropped; string literals and quoted identifiers are kept whole so that
//! nothing inside them is ever mistaken for a keyword or terminator.

use guard_core::ClassificationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Bare keyword or identifier
    Word,
    /// `"ident"`, `` `ident` `` or `[ident]`
    Quoted,
    /// `'text'`
    Literal,
    Number,
    /// `?`, `?NNN`, `:name`, `@name`, `$name`
    Param,
    /// Any other single punctuation character
    Symbol,
    Semicolon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl<'a> Token<'a> {
    /// Case-insensitive keyword match (bare words only)
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_symbol(&self, symbol: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.len() == 1 && self.text.starts_with(symbol)
    }

    /// True for tokens that can name a table or column
    pub fn is_identifier(&self) -> bool {
        match self.kind {
            TokenKind::Quoted => true,
            TokenKind::Word => !is_reserved(self.text),
            _ => false,
        }
    }

    /// The identifier this token names, with quoting removed
    pub fn ident_value(&self) -> Option<String> {
        match self.kind {
            TokenKind::Word => Some(self.text.to_string()),
            TokenKind::Quoted => Some(unquote(self.text)),
            _ => None,
        }
    }
}

/// Keywords that can never start a table reference
const RESERVED: &[&str] = &[
    "WHERE", "RETURNING", "ORDER", "LIMIT", "SET", "AS", "INDEXED", "NOT", "FROM", "SELECT",
    "VALUES", "ON", "USING", "GROUP", "HAVING", "JOIN", "AND", "OR", "IF", "EXISTS",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

fn unquote(text: &str) -> String {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(b'[') => text[1..text.len() - 1].to_string(),
        Some(&q) if q == b'"' || q == b'`' => {
            let quote = q as char;
            let doubled: String = [quote, quote].iter().collect();
            text[1..text.len() - 1].replace(&doubled, &quote.to_string())
        }
        _ => text.to_string(),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit() || b == b'$'
}

/// Finds the end (exclusive) of a quoted run starting at `start`, where a
/// doubled closing character is an escape.
fn scan_quoted(bytes: &[u8], start: usize, close: u8, escapable: bool) -> Option<usize> {
    let mut j = start + 1;
    while j < bytes.len() {
        if bytes[j] == close {
            if escapable && bytes.get(j + 1) == Some(&close) {
                j += 2;
                continue;
            }
            return Some(j + 1);
        }
        j += 1;
    }
    None
}

/// Splits SQL text into tokens
pub fn tokenize(sql: &str) -> Result<Vec<Token<'_>>, ClassificationError> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let mut push = |kind: TokenKind, start: usize, end: usize| {
        tokens.push(Token {
            kind,
            text: &sql[start..end],
            start,
            end,
        });
    };

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b if b.is_ascii_whitespace() => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                i = match sql[i..].find('\n') {
                    Some(n) => i + n + 1,
                    None => bytes.len(),
                };
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match sql[i + 2..].find("*/") {
                Some(n) => i = i + 2 + n + 2,
                None => return Err(ClassificationError::unterminated("block comment", i)),
            },
            b'\'' => {
                let end = scan_quoted(bytes, i, b'\'', true)
                    .ok_or_else(|| ClassificationError::unterminated("string literal", i))?;
                push(TokenKind::Literal, i, end);
                i = end;
            }
            b'"' | b'`' => {
                let end = scan_quoted(bytes, i, b, true)
                    .ok_or_else(|| ClassificationError::unterminated("quoted identifier", i))?;
                push(TokenKind::Quoted, i, end);
                i = end;
            }
            b'[' => {
                let end = scan_quoted(bytes, i, b']', false)
                    .ok_or_else(|| ClassificationError::unterminated("quoted identifier", i))?;
                push(TokenKind::Quoted, i, end);
                i = end;
            }
            b';' => {
                push(TokenKind::Semicolon, i, i + 1);
                i += 1;
            }
            b'?' => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                push(TokenKind::Param, i, j);
                i = j;
            }
            b':' | b'@' | b'$' if bytes.get(i + 1).copied().is_some_and(is_ident_start) => {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_continue(bytes[j]) {
                    j += 1;
                }
                push(TokenKind::Param, i, j);
                i = j;
            }
            b'0'..=b'9' => {
                let mut j = i + 1;
                while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'.') {
                    j += 1;
                }
                push(TokenKind::Number, i, j);
                i = j;
            }
            b'.' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                let mut j = i + 1;
                while j < bytes.len() && bytes[j].is_ascii_alphanumeric() {
                    j += 1;
                }
                push(TokenKind::Number, i, j);
                i = j;
            }
            b if is_ident_start(b) => {
                let mut j = i + 1;
                while j < bytes.len() && is_ident_continue(bytes[j]) {
                    j += 1;
                }
                push(TokenKind::Word, i, j);
                i = j;
            }
            _ => {
                push(TokenKind::Symbol, i, i + 1);
                i += 1;
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(sql: &str) -> Vec<TokenKind> {
        tokenize(sql).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn semicolons_inside_literals_are_not_terminators() {
        let tokens = tokenize("SELECT 'a;b', \"c;d\" FROM t -- x;y\n/* ; */;").unwrap();
        let semis = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Semicolon)
            .count();
        assert_eq!(semis, 1);
    }

    #[test]
    fn escaped_quotes_stay_inside_literal() {
        let tokens = tokenize("SELECT 'it''s'; SELECT 2").unwrap();
        assert_eq!(tokens[1].text, "'it''s'");
        assert_eq!(tokens[2].kind, TokenKind::Semicolon);
    }

    #[test]
    fn parameters_are_recognised() {
        assert_eq!(
            kinds("? ?2 :name @other $third"),
            vec![TokenKind::Param; 5]
        );
    }

    #[test]
    fn quoted_identifiers_unquote() {
        let tokens = tokenize("\"my \"\"table\"\" \" [x y] `z`").unwrap();
        assert_eq!(tokens[0].ident_value().unwrap(), "my \"table\" ");
        assert_eq!(tokens[1].ident_value().unwrap(), "x y");
        assert_eq!(tokens[2].ident_value().unwrap(), "z");
    }

    #[test]
    fn unterminated_input_is_rejected() {
        assert!(matches!(
            tokenize("SELECT 'oops"),
            Err(ClassificationError::Unterminated { .. })
        ));
        assert!(matches!(
            tokenize("SELECT 1 /* never closed"),
            Err(ClassificationError::Unterminated { .. })
        ));
    }

    #[test]
    fn non_ascii_identifiers_keep_char_boundaries() {
        let tokens = tokenize("SELECT * FROM café WHERE naïve = 1").unwrap();
        assert_eq!(tokens[3].text, "café");
        assert_eq!(tokens[5].text, "naïve");
    }
}
