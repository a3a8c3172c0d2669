//! Tokenizer for An source code.
//!
//! Hand-rolled scanner producing a full token vector for the parser.
//! Newlines are significant (they separate statements alongside `;`) and are
//! emitted as tokens; other whitespace and `--` line comments are skipped.
//! Integer and float literal suffixes (`3u8`, `1.5f32`) are resolved here so
//! the parser only ever sees a literal plus its type tag.

use crate::ast::Loc;
use crate::types::Ty;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Keywords
    Let,
    Mut,
    Fun,
    Type,
    Ext,
    Trait,
    Import,
    If,
    Then,
    Elif,
    Else,
    While,
    Do,
    For,
    In,
    Match,
    With,
    Return,
    New,
    Not,
    And,
    Or,
    True,
    False,

    // Primitive type names carry their tag directly.
    PrimTy(Ty),

    Ident(String),
    IntLit(String, Ty),
    FltLit(String, Ty),
    StrLit(String),
    CharLit(u8),

    // Operators
    Plus,      // +
    Minus,     // -
    Star,      // *
    Slash,     // /
    Percent,   // %
    Caret,     // ^
    Lt,        // <
    Gt,        // >
    LtEq,      // <=
    GtEq,      // >=
    EqEq,      // ==
    NotEq,     // !=
    Assign,    // =
    Arrow,     // ->
    Pipe,      // |
    Hash,      // #
    At,        // @
    Bang,      // !

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,
    Ellipsis, // ...
    Dot,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub loc: Loc,
}

impl Lexer {
    pub fn new(src: &str) -> Lexer {
        Lexer {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn here(&self) -> Loc {
        Loc::new(self.line, self.col)
    }

    fn err(&self, msg: impl Into<String>) -> LexError {
        LexError {
            message: msg.into(),
            loc: self.here(),
        }
    }

    /// Tokenizes the whole input, ending with a single `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            // Collapse runs of newlines into one separator token.
            let redundant = tok.kind == TokenKind::Newline
                && matches!(out.last().map(|t: &Token| &t.kind), Some(TokenKind::Newline) | None);
            if !redundant {
                out.push(tok);
            }
            if done {
                break;
            }
        }
        Ok(out)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        // Skip spaces, tabs, and comments; stop on newline which is a token.
        loop {
            match self.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.bump();
                }
                Some('-') if self.peek2() == Some('-') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let start = self.here();
        let c = match self.peek() {
            Some(c) => c,
            None => {
                return Ok(Token {
                    kind: TokenKind::Eof,
                    loc: start,
                })
            }
        };

        if c == '\n' {
            self.bump();
            return Ok(self.tok(TokenKind::Newline, start));
        }
        if c.is_ascii_digit() {
            return self.lex_number(start);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.lex_word(start));
        }
        if c == '"' {
            return self.lex_string(start);
        }
        if c == '\'' {
            return self.lex_char(start);
        }

        self.bump();
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => {
                if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Caret,
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '|' => TokenKind::Pipe,
            '#' => TokenKind::Hash,
            '@' => TokenKind::At,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '.' => {
                if self.peek() == Some('.') && self.peek2() == Some('.') {
                    self.bump();
                    self.bump();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            other => return Err(self.err(format!("unexpected character '{}'", other))),
        };
        Ok(self.tok(kind, start))
    }

    fn tok(&self, kind: TokenKind, start: Loc) -> Token {
        let end = Loc::new(self.line, self.col.saturating_sub(1).max(1));
        Token {
            kind,
            loc: start.to(end),
        }
    }

    fn lex_number(&mut self, start: Loc) -> Result<Token, LexError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        let mut is_float = false;
        if self.peek() == Some('.') && self.peek2().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.bump();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        // Type suffix: i8..i64 / u8..u64 on integers, f16/f32/f64 on either
        // (a suffixed integer like 1f32 is a float literal).
        match self.peek() {
            Some('i') | Some('u') if !is_float => {
                let sign = self.bump().unwrap();
                let width = self.lex_suffix_width()?;
                let ty = match (sign, width) {
                    ('i', 8) => Ty::I8,
                    ('i', 16) => Ty::I16,
                    ('i', 32) => Ty::I32,
                    ('i', 64) => Ty::I64,
                    ('u', 8) => Ty::U8,
                    ('u', 16) => Ty::U16,
                    ('u', 32) => Ty::U32,
                    ('u', 64) => Ty::U64,
                    _ => return Err(self.err("invalid integer literal suffix")),
                };
                return Ok(self.tok(TokenKind::IntLit(text, ty), start));
            }
            Some('f') => {
                self.bump();
                let width = self.lex_suffix_width()?;
                let ty = match width {
                    16 => Ty::F16,
                    32 => Ty::F32,
                    64 => Ty::F64,
                    _ => return Err(self.err("invalid float literal suffix")),
                };
                return Ok(self.tok(TokenKind::FltLit(text, ty), start));
            }
            _ => {}
        }

        if is_float {
            Ok(self.tok(TokenKind::FltLit(text, Ty::F64), start))
        } else {
            Ok(self.tok(TokenKind::IntLit(text, Ty::I32), start))
        }
    }

    fn lex_suffix_width(&mut self) -> Result<u32, LexError> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        digits
            .parse::<u32>()
            .map_err(|_| self.err("missing width in literal suffix"))
    }

    fn lex_word(&mut self, start: Loc) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let kind = match text.as_str() {
            "let" => TokenKind::Let,
            "mut" => TokenKind::Mut,
            "fun" => TokenKind::Fun,
            "type" => TokenKind::Type,
            "ext" => TokenKind::Ext,
            "trait" => TokenKind::Trait,
            "import" => TokenKind::Import,
            "if" => TokenKind::If,
            "then" => TokenKind::Then,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "match" => TokenKind::Match,
            "with" => TokenKind::With,
            "return" => TokenKind::Return,
            "new" => TokenKind::New,
            "not" => TokenKind::Not,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "i8" => TokenKind::PrimTy(Ty::I8),
            "i16" => TokenKind::PrimTy(Ty::I16),
            "i32" => TokenKind::PrimTy(Ty::I32),
            "i64" => TokenKind::PrimTy(Ty::I64),
            "u8" => TokenKind::PrimTy(Ty::U8),
            "u16" => TokenKind::PrimTy(Ty::U16),
            "u32" => TokenKind::PrimTy(Ty::U32),
            "u64" => TokenKind::PrimTy(Ty::U64),
            "isz" => TokenKind::PrimTy(Ty::Isz),
            "usz" => TokenKind::PrimTy(Ty::Usz),
            "f16" => TokenKind::PrimTy(Ty::F16),
            "f32" => TokenKind::PrimTy(Ty::F32),
            "f64" => TokenKind::PrimTy(Ty::F64),
            "c8" => TokenKind::PrimTy(Ty::C8),
            "bool" => TokenKind::PrimTy(Ty::Bool),
            "unit" => TokenKind::PrimTy(Ty::Unit),
            _ => TokenKind::Ident(text),
        };
        self.tok(kind, start)
    }

    fn lex_string(&mut self, start: Loc) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    _ => return Err(self.err("invalid escape sequence in string literal")),
                },
                Some(c) => text.push(c),
                None => return Err(self.err("unterminated string literal")),
            }
        }
        Ok(self.tok(TokenKind::StrLit(text), start))
    }

    fn lex_char(&mut self, start: Loc) -> Result<Token, LexError> {
        self.bump(); // opening quote
        let c = match self.bump() {
            Some('\\') => match self.bump() {
                Some('n') => b'\n',
                Some('t') => b'\t',
                Some('0') => b'\0',
                Some('\\') => b'\\',
                Some('\'') => b'\'',
                _ => return Err(self.err("invalid escape sequence in character literal")),
            },
            Some(c) if c.is_ascii() => c as u8,
            _ => return Err(self.err("invalid character literal")),
        };
        if self.bump() != Some('\'') {
            return Err(self.err("unterminated character literal"));
        }
        Ok(self.tok(TokenKind::CharLit(c), start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn integer_suffixes_pick_the_tag() {
        assert_eq!(
            kinds("3 4u8 5i64"),
            vec![
                TokenKind::IntLit("3".into(), Ty::I32),
                TokenKind::IntLit("4".into(), Ty::U8),
                TokenKind::IntLit("5".into(), Ty::I64),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn float_suffixes_and_defaults() {
        assert_eq!(
            kinds("1.5 2.0f32 3f16"),
            vec![
                TokenKind::FltLit("1.5".into(), Ty::F64),
                TokenKind::FltLit("2.0".into(), Ty::F32),
                TokenKind::FltLit("3".into(), Ty::F16),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn arrow_vs_minus_and_comments() {
        assert_eq!(
            kinds("a -> b - c -- comment\nd"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Arrow,
                TokenKind::Ident("b".into()),
                TokenKind::Minus,
                TokenKind::Ident("c".into()),
                TokenKind::Newline,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newline_runs_collapse() {
        assert_eq!(
            kinds("a\n\n\nb"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Newline,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
    }
}
