//! Tokenizer for the CQL subset

use crate::error::{StoreError, StoreResult};

/// A lexical token
///
/// Unquoted identifiers and keywords are case-insensitive and are lowercased
/// here.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// `'quoted string'`
    Str(String),
    /// Integer literal
    Int(i64),
    /// Floating point literal
    Float(f64),
    /// `?`
    Marker,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `=`
    Eq,
    /// `:`
    Colon,
    /// `*`
    Star,
    /// `;`
    Semi,
}

/// Split statement text into tokens
pub fn tokenize(input: &str) -> StoreResult<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '?' => {
                tokens.push(Token::Marker);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semi);
                i += 1;
            }
            '\'' => {
                // '' inside a string is an escaped quote
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(StoreError::Syntax("unterminated string literal".into()))
                        }
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let is_float = chars.get(i) == Some(&'.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
                if is_float {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let token = if is_float {
                    text.parse::<f64>().map(Token::Float).map_err(|e| {
                        StoreError::Syntax(format!("bad number '{}': {}", text, e))
                    })?
                } else {
                    text.parse::<i64>().map(Token::Int).map_err(|e| {
                        StoreError::Syntax(format!("bad number '{}': {}", text, e))
                    })?
                };
                tokens.push(token);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(word.to_ascii_lowercase()));
            }
            other => {
                return Err(StoreError::Syntax(format!(
                    "unexpected character '{}' at offset {}",
                    other, i
                )))
            }
        }
    }

    Ok(tokens)
}
