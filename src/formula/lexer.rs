//! Formula lexer.
//!
//! Converts formula source text into a token sequence. Field references are
//! lexed whole: everything between `[` and `]` becomes one token, so field
//! names may contain spaces and punctuation without escaping.

use super::ParseError;

/// A token in the formula language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    /// Contents between `[` and `]`, brackets stripped.
    FieldRef(String),

    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Token {
    /// Display form used in parse diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(v) => v.to_string(),
            Token::Float(v) => v.to_string(),
            Token::Str(s) => format!("\"{}\"", s),
            Token::Ident(s) => s.clone(),
            Token::FieldRef(s) => format!("[{}]", s),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::EqEq => "==".to_string(),
            Token::NotEq => "!=".to_string(),
            Token::Gt => ">".to_string(),
            Token::Gte => ">=".to_string(),
            Token::Lt => "<".to_string(),
            Token::Lte => "<=".to_string(),
        }
    }
}

/// Tokenize formula source text.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == ']' {
                        closed = true;
                        break;
                    }
                    name.push(ch);
                }
                if !closed {
                    return Err(ParseError::UnterminatedFieldRef { pos });
                }
                tokens.push(Token::FieldRef(name.trim().to_string()));
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == quote {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err(ParseError::UnterminatedString { pos });
                }
                tokens.push(Token::Str(text));
            }
            '0'..='9' => {
                let mut text = String::new();
                let mut is_float = false;
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() {
                        text.push(ch);
                        chars.next();
                    } else if ch == '.' && !is_float {
                        is_float = true;
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if is_float {
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| ParseError::InvalidNumber { text: text.clone(), pos })?;
                    tokens.push(Token::Float(value));
                } else {
                    let value = text
                        .parse::<i64>()
                        .map_err(|_| ParseError::InvalidNumber { text: text.clone(), pos })?;
                    tokens.push(Token::Int(value));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::EqEq);
                    }
                    _ => return Err(ParseError::UnexpectedChar { ch: '=', pos }),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::NotEq);
                    }
                    _ => return Err(ParseError::UnexpectedChar { ch: '!', pos }),
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Gte);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Lte);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            other => return Err(ParseError::UnexpectedChar { ch: other, pos }),
        }
    }

    Ok(tokens)
}
