//! Recursive-descent parser for An.
//!
//! Produces a flat `Vec<Expr>` of top-level statements. Statements are
//! separated by newlines or `;`. Uppercase-initial identifiers in expression
//! position denote types (union tags, record names, static-access targets);
//! this is the same capitalization rule the lowering engine applies to
//! function names and union tags.

use crate::ast::{BinOp, DataBody, Expr, FuncDecl, Loc, Pattern, UnOp};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::Ty;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub loc: Loc,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.loc.line, self.loc.col, self.message)
    }
}

impl std::error::Error for ParseError {}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Parses a whole source unit into its top-level statement list.
pub fn parse(src: &str) -> Result<Vec<Expr>, ParseError> {
    let tokens = Lexer::new(src).tokenize().map_err(|e| ParseError {
        message: e.message,
        loc: e.loc,
    })?;
    Parser { tokens, pos: 0 }.parse_program()
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn loc(&self) -> Loc {
        self.tokens[self.pos.min(self.tokens.len() - 1)].loc
    }

    fn prev_loc(&self) -> Loc {
        self.tokens[self.pos.saturating_sub(1)].loc
    }

    fn bump(&mut self) -> TokenKind {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].kind.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.err(format!("expected {}", what)))
        }
    }

    fn err(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            message: msg.into(),
            loc: self.loc(),
        }
    }

    fn skip_seps(&mut self) {
        while matches!(self.peek(), TokenKind::Newline | TokenKind::Semicolon) {
            self.bump();
        }
    }

    fn skip_newlines_only(&mut self) {
        while *self.peek() == TokenKind::Newline {
            self.bump();
        }
    }

    /// Consumes newlines if (and only if) `kind` follows them; used for
    /// continuation tokens like `else` and `|` that may start a fresh line.
    fn eat_through_newlines(&mut self, kind: &TokenKind) -> bool {
        let mut look = self.pos;
        while look < self.tokens.len() && self.tokens[look].kind == TokenKind::Newline {
            look += 1;
        }
        if look < self.tokens.len() && &self.tokens[look].kind == kind {
            self.pos = look;
            self.bump();
            true
        } else {
            false
        }
    }

    fn peek_through_newlines(&self, kind: &TokenKind) -> bool {
        let mut look = self.pos;
        while look < self.tokens.len() && self.tokens[look].kind == TokenKind::Newline {
            look += 1;
        }
        look < self.tokens.len() && &self.tokens[look].kind == kind
    }

    fn parse_program(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        self.skip_seps();
        while *self.peek() != TokenKind::Eof {
            items.push(self.parse_item()?);
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
            ) {
                return Err(self.err("expected end of statement"));
            }
            self.skip_seps();
        }
        Ok(items)
    }

    fn parse_item(&mut self) -> Result<Expr, ParseError> {
        let directives = self.parse_directives()?;
        if !directives.is_empty() && *self.peek() != TokenKind::Fun {
            return Err(self.err("compiler directives must precede a function declaration"));
        }

        match self.peek() {
            TokenKind::Fun => Ok(Expr::Func(self.parse_fun(directives)?)),
            TokenKind::Type => self.parse_data_decl(),
            TokenKind::Ext => self.parse_ext(),
            TokenKind::Trait => self.parse_trait(),
            TokenKind::Import => self.parse_import(),
            TokenKind::Let => self.parse_let(),
            TokenKind::Mut => self.parse_var_decl(),
            TokenKind::Return => {
                let loc = self.loc();
                self.bump();
                let expr = self.parse_expr()?;
                Ok(Expr::Ret {
                    loc: loc.to(expr.loc()),
                    expr: Box::new(expr),
                })
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.eat(&TokenKind::Assign) {
                    let rhs = self.parse_expr()?;
                    Ok(Expr::Assign {
                        loc: expr.loc().to(rhs.loc()),
                        target: Box::new(expr),
                        expr: Box::new(rhs),
                    })
                } else {
                    Ok(expr)
                }
            }
        }
    }

    /// Compiler directives, e.g. `![inline]`, attach to the following
    /// function declaration.
    fn parse_directives(&mut self) -> Result<Vec<String>, ParseError> {
        let mut directives = Vec::new();
        while *self.peek() == TokenKind::Bang {
            self.bump();
            self.expect(TokenKind::LBracket, "'[' after '!'")?;
            match self.bump() {
                TokenKind::Ident(name) => directives.push(name),
                _ => return Err(self.err("expected directive name")),
            }
            self.expect(TokenKind::RBracket, "']' closing directive")?;
            self.skip_seps();
        }
        Ok(directives)
    }

    fn parse_fun(&mut self, directives: Vec<String>) -> Result<FuncDecl, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Fun, "'fun'")?;

        // A named function, an operator overload, or (no name) a lambda.
        let name = match self.peek().clone() {
            TokenKind::Ident(n) => {
                self.bump();
                n
            }
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::Caret
            | TokenKind::Lt
            | TokenKind::Gt
            | TokenKind::LtEq
            | TokenKind::GtEq
            | TokenKind::EqEq
            | TokenKind::NotEq => {
                let op = self.bump();
                op_lexeme(&op).to_string()
            }
            _ => String::new(),
        };

        let mut params = Vec::new();
        let mut varargs = false;
        loop {
            if *self.peek() == TokenKind::LParen {
                self.bump();
                let pname = match self.bump() {
                    TokenKind::Ident(n) => n,
                    _ => return Err(self.err("expected parameter name")),
                };
                let pty = self.parse_type()?;
                self.expect(TokenKind::RParen, "')' closing parameter")?;
                params.push((pname, pty));
            } else if *self.peek() == TokenKind::Ellipsis {
                self.bump();
                varargs = true;
                break;
            } else {
                break;
            }
        }

        let ret = if self.eat(&TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = if self.eat(&TokenKind::Assign) {
            self.skip_newlines_only();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let end = self.prev_loc();
        Ok(FuncDecl {
            name,
            params,
            ret,
            body,
            directives,
            varargs,
            loc: loc.to(end),
        })
    }

    fn parse_data_decl(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Type, "'type'")?;
        let name = match self.bump() {
            TokenKind::Ident(n) => n,
            _ => return Err(self.err("expected type name")),
        };
        self.expect(TokenKind::Assign, "'=' in type declaration")?;
        self.skip_newlines_only();

        if *self.peek() == TokenKind::Pipe {
            // Tagged union: | Tag ty? | Tag ty? ...
            let mut variants = Vec::new();
            while self.eat_through_newlines(&TokenKind::Pipe) {
                let tag = match self.bump() {
                    TokenKind::Ident(n) => n,
                    _ => return Err(self.err("expected union tag name")),
                };
                let payload = if self.starts_type() {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                variants.push((tag, payload));
            }
            return Ok(Expr::DataDecl {
                name,
                body: DataBody::Union(variants),
                loc: loc.to(self.prev_loc()),
            });
        }

        // Record body `field ty, field ty, ...`, or a bare aliased type.
        if let TokenKind::Ident(first) = self.peek().clone() {
            if self.peek_is_type_after_ident() {
                self.bump();
                let ty = self.parse_type()?;
                let mut fields = vec![(first, ty)];
                while self.eat(&TokenKind::Comma) {
                    self.skip_newlines_only();
                    let fname = match self.bump() {
                        TokenKind::Ident(n) => n,
                        _ => return Err(self.err("expected field name")),
                    };
                    let fty = self.parse_type()?;
                    fields.push((fname, fty));
                }
                return Ok(Expr::DataDecl {
                    name,
                    body: DataBody::Record(fields),
                    loc: loc.to(self.prev_loc()),
                });
            }
        }

        // `type Int = i32` style alias.
        let ty = self.parse_type()?;
        Ok(Expr::DataDecl {
            name,
            body: DataBody::Record(vec![(String::new(), ty)]),
            loc: loc.to(self.prev_loc()),
        })
    }

    /// True when the token after the current identifier begins a type, which
    /// distinguishes `field ty` record bodies from bare alias types.
    fn peek_is_type_after_ident(&self) -> bool {
        matches!(
            self.tokens.get(self.pos + 1).map(|t| &t.kind),
            Some(TokenKind::PrimTy(_))
                | Some(TokenKind::Ident(_))
                | Some(TokenKind::LBracket)
                | Some(TokenKind::LParen)
        )
    }

    fn parse_ext(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Ext, "'ext'")?;
        let ty = self.parse_type()?;
        let methods = self.parse_fun_block()?;
        Ok(Expr::Ext {
            ty,
            methods,
            loc: loc.to(self.prev_loc()),
        })
    }

    fn parse_trait(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Trait, "'trait'")?;
        let name = match self.bump() {
            TokenKind::Ident(n) => n,
            _ => return Err(self.err("expected trait name")),
        };
        let methods = self.parse_fun_block()?;
        Ok(Expr::Trait {
            name,
            methods,
            loc: loc.to(self.prev_loc()),
        })
    }

    fn parse_fun_block(&mut self) -> Result<Vec<FuncDecl>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut methods = Vec::new();
        self.skip_seps();
        while *self.peek() != TokenKind::RBrace {
            let directives = self.parse_directives()?;
            methods.push(self.parse_fun(directives)?);
            self.skip_seps();
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(methods)
    }

    fn parse_import(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Import, "'import'")?;
        match self.bump() {
            TokenKind::StrLit(path) => Ok(Expr::Import {
                path,
                loc: loc.to(self.prev_loc()),
            }),
            _ => Err(self.err("expected file path string after 'import'")),
        }
    }

    fn parse_let(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Let, "'let'")?;
        let name = match self.bump() {
            TokenKind::Ident(n) => n,
            _ => return Err(self.err("expected binding name")),
        };
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        self.expect(TokenKind::Assign, "'=' in let binding")?;
        let expr = self.parse_expr()?;
        Ok(Expr::Let {
            name,
            ty,
            loc: loc.to(expr.loc()),
            expr: Box::new(expr),
        })
    }

    fn parse_var_decl(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Mut, "'mut'")?;
        let name = match self.bump() {
            TokenKind::Ident(n) => n,
            _ => return Err(self.err("expected variable name")),
        };
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let expr = if self.eat(&TokenKind::Assign) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        if ty.is_none() && expr.is_none() {
            return Err(self.err("mutable variable needs a type or an initializer"));
        }
        Ok(Expr::VarDecl {
            name,
            ty,
            expr,
            loc: loc.to(self.prev_loc()),
        })
    }

    fn starts_type(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::PrimTy(_) | TokenKind::Ident(_) | TokenKind::LBracket | TokenKind::LParen
        )
    }

    fn parse_type(&mut self) -> Result<Ty, ParseError> {
        let mut base = match self.bump() {
            TokenKind::PrimTy(ty) => ty,
            TokenKind::Ident(name) => Ty::Data(name),
            TokenKind::LBracket => {
                let inner = self.parse_type()?;
                self.expect(TokenKind::RBracket, "']' closing array type")?;
                Ty::Array(Box::new(inner))
            }
            TokenKind::LParen => {
                let mut elems = vec![self.parse_type()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_type()?);
                }
                self.expect(TokenKind::RParen, "')' closing tuple type")?;
                if elems.len() == 1 {
                    elems.pop().unwrap()
                } else {
                    Ty::Tuple(elems)
                }
            }
            _ => return Err(self.err("expected a type")),
        };
        while self.eat(&TokenKind::Star) {
            base = Ty::ptr_to(base);
        }
        Ok(base)
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_bin(0)
    }

    fn parse_bin(&mut self, min_level: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let (op, level) = match self.peek() {
                TokenKind::Or => (BinOp::Or, 1),
                TokenKind::And => (BinOp::And, 2),
                TokenKind::Caret => (BinOp::Xor, 3),
                TokenKind::EqEq => (BinOp::Eq, 4),
                TokenKind::NotEq => (BinOp::NotEq, 4),
                TokenKind::Lt => (BinOp::Lt, 5),
                TokenKind::Gt => (BinOp::Gt, 5),
                TokenKind::LtEq => (BinOp::LtEq, 5),
                TokenKind::GtEq => (BinOp::GtEq, 5),
                TokenKind::Plus => (BinOp::Add, 6),
                TokenKind::Minus => (BinOp::Sub, 6),
                TokenKind::Star => (BinOp::Mul, 7),
                TokenKind::Slash => (BinOp::Div, 7),
                TokenKind::Percent => (BinOp::Rem, 7),
                _ => break,
            };
            if level < min_level {
                break;
            }
            self.bump();
            self.skip_newlines_only();
            let rhs = self.parse_bin(level + 1)?;
            lhs = Expr::Bin {
                op,
                loc: lhs.loc().to(rhs.loc()),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        let op = match self.peek() {
            TokenKind::At => Some(UnOp::Deref),
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Not => Some(UnOp::Not),
            TokenKind::New => Some(UnOp::New),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let rhs = self.parse_unary()?;
            return Ok(Expr::Un {
                op,
                loc: loc.to(rhs.loc()),
                rhs: Box::new(rhs),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.bump();
                    let field = match self.bump() {
                        TokenKind::Ident(n) => n,
                        _ => return Err(self.err("expected field or method name after '.'")),
                    };
                    let end = self.prev_loc();
                    expr = Expr::Bin {
                        op: BinOp::Dot,
                        loc: expr.loc().to(end),
                        lhs: Box::new(expr),
                        rhs: Box::new(Expr::Var {
                            name: field,
                            loc: end,
                        }),
                    };
                }
                TokenKind::Hash => {
                    self.bump();
                    let idx = self.parse_primary()?;
                    expr = Expr::Bin {
                        op: BinOp::Idx,
                        loc: expr.loc().to(idx.loc()),
                        lhs: Box::new(expr),
                        rhs: Box::new(idx),
                    };
                }
                TokenKind::LParen => {
                    self.bump();
                    let mut args = Vec::new();
                    if *self.peek() != TokenKind::RParen {
                        args.push(self.parse_expr()?);
                        while self.eat(&TokenKind::Comma) {
                            self.skip_newlines_only();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(TokenKind::RParen, "')' closing call arguments")?;
                    expr = Expr::Call {
                        loc: expr.loc().to(self.prev_loc()),
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        match self.peek().clone() {
            TokenKind::IntLit(val, ty) => {
                self.bump();
                Ok(Expr::IntLit { val, ty, loc })
            }
            TokenKind::FltLit(val, ty) => {
                self.bump();
                Ok(Expr::FltLit { val, ty, loc })
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::BoolLit { val: true, loc })
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::BoolLit { val: false, loc })
            }
            TokenKind::StrLit(val) => {
                self.bump();
                Ok(Expr::StrLit { val, loc })
            }
            TokenKind::CharLit(val) => {
                self.bump();
                Ok(Expr::CharLit { val, loc })
            }
            TokenKind::LBracket => {
                self.bump();
                let mut elems = Vec::new();
                if *self.peek() != TokenKind::RBracket {
                    elems.push(self.parse_expr()?);
                    while self.eat(&TokenKind::Comma) {
                        self.skip_newlines_only();
                        elems.push(self.parse_expr()?);
                    }
                }
                self.expect(TokenKind::RBracket, "']' closing array literal")?;
                Ok(Expr::ArrayLit {
                    elems,
                    loc: loc.to(self.prev_loc()),
                })
            }
            TokenKind::LParen => {
                self.bump();
                if self.eat(&TokenKind::RParen) {
                    // The unit value.
                    return Ok(Expr::TupleLit {
                        elems: Vec::new(),
                        loc: loc.to(self.prev_loc()),
                    });
                }
                let first = self.parse_expr()?;
                if self.eat(&TokenKind::Comma) {
                    let mut elems = vec![first];
                    loop {
                        self.skip_newlines_only();
                        elems.push(self.parse_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "')' closing tuple")?;
                    Ok(Expr::TupleLit {
                        elems,
                        loc: loc.to(self.prev_loc()),
                    })
                } else {
                    self.expect(TokenKind::RParen, "')'")?;
                    Ok(first)
                }
            }
            TokenKind::LBrace => self.parse_block(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Do, "'do' after while condition")?;
                self.skip_newlines_only();
                let body = self.parse_expr()?;
                Ok(Expr::While {
                    loc: loc.to(body.loc()),
                    cond: Box::new(cond),
                    body: Box::new(body),
                })
            }
            TokenKind::For => {
                self.bump();
                let var = match self.bump() {
                    TokenKind::Ident(n) => n,
                    _ => return Err(self.err("expected loop variable")),
                };
                self.expect(TokenKind::In, "'in' in for loop")?;
                let range = self.parse_expr()?;
                self.expect(TokenKind::Do, "'do' after for range")?;
                self.skip_newlines_only();
                let body = self.parse_expr()?;
                Ok(Expr::For {
                    var,
                    loc: loc.to(body.loc()),
                    range: Box::new(range),
                    body: Box::new(body),
                })
            }
            TokenKind::Match => self.parse_match(),
            TokenKind::Fun => Ok(Expr::Func(self.parse_fun(Vec::new())?)),
            TokenKind::Ident(name) => {
                if starts_uppercase(&name) {
                    self.parse_type_primary()
                } else {
                    self.bump();
                    Ok(Expr::Var { name, loc })
                }
            }
            TokenKind::PrimTy(_) => self.parse_type_primary(),
            _ => Err(self.err("expected an expression")),
        }
    }

    /// A type in expression position: `None` (enum value), `Some 5`
    /// (union-tag construction), `Int 3` (cast), `Vec2 {1.0, 2.0}` (record
    /// construction from a tuple), or the left side of a static access.
    fn parse_type_primary(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        let ty = self.parse_type()?;

        if *self.peek() == TokenKind::LBrace {
            self.bump();
            let mut elems = Vec::new();
            self.skip_newlines_only();
            if *self.peek() != TokenKind::RBrace {
                elems.push(self.parse_expr()?);
                while self.eat(&TokenKind::Comma) {
                    self.skip_newlines_only();
                    elems.push(self.parse_expr()?);
                }
                self.skip_newlines_only();
            }
            self.expect(TokenKind::RBrace, "'}' closing record construction")?;
            let end = self.prev_loc();
            let tuple = Expr::TupleLit {
                elems,
                loc: loc.to(end),
            };
            return Ok(Expr::Cast {
                ty,
                expr: Box::new(tuple),
                loc: loc.to(end),
            });
        }

        if self.starts_cast_operand() {
            let operand = self.parse_unary()?;
            return Ok(Expr::Cast {
                ty,
                loc: loc.to(operand.loc()),
                expr: Box::new(operand),
            });
        }

        Ok(Expr::TypeRef {
            ty,
            loc: loc.to(self.prev_loc()),
        })
    }

    /// Tokens that can begin the operand of a juxtaposed cast (`i64 x`,
    /// `Some 5`). Deliberately excludes operators so `a == Some` style
    /// comparisons never swallow the rest of the expression.
    fn starts_cast_operand(&self) -> bool {
        match self.peek() {
            TokenKind::IntLit(..)
            | TokenKind::FltLit(..)
            | TokenKind::StrLit(_)
            | TokenKind::CharLit(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::At
            | TokenKind::New => true,
            TokenKind::Ident(n) => !starts_uppercase(n),
            _ => false,
        }
    }

    fn parse_block(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        self.skip_seps();
        while *self.peek() != TokenKind::RBrace {
            stmts.push(self.parse_item()?);
            if !matches!(
                self.peek(),
                TokenKind::Newline | TokenKind::Semicolon | TokenKind::RBrace
            ) {
                return Err(self.err("expected end of statement"));
            }
            self.skip_seps();
        }
        self.expect(TokenKind::RBrace, "'}' closing block")?;
        Ok(Expr::Block {
            stmts,
            loc: loc.to(self.prev_loc()),
        })
    }

    fn parse_if(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        // Consumes either `if` or (continuing a chain) `elif`.
        self.bump();
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then, "'then' after if condition")?;
        self.skip_newlines_only();
        let then = self.parse_expr()?;

        let els = if self.peek_through_newlines(&TokenKind::Elif) {
            self.skip_newlines_only();
            Some(Box::new(self.parse_if()?))
        } else if self.eat_through_newlines(&TokenKind::Else) {
            self.skip_newlines_only();
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let end = els.as_ref().map(|e| e.loc()).unwrap_or(then.loc());
        Ok(Expr::If {
            loc: loc.to(end),
            cond: Box::new(cond),
            then: Box::new(then),
            els,
        })
    }

    fn parse_match(&mut self) -> Result<Expr, ParseError> {
        let loc = self.loc();
        self.expect(TokenKind::Match, "'match'")?;
        let scrutinee = self.parse_expr()?;
        self.expect(TokenKind::With, "'with' after match expression")?;

        let mut branches = Vec::new();
        while self.eat_through_newlines(&TokenKind::Pipe) {
            let pattern = self.parse_pattern()?;
            self.expect(TokenKind::Arrow, "'->' after pattern")?;
            self.skip_newlines_only();
            let body = self.parse_expr()?;
            branches.push((pattern, body));
        }
        if branches.is_empty() {
            return Err(self.err("match expression needs at least one '|' branch"));
        }
        Ok(Expr::Match {
            loc: loc.to(self.prev_loc()),
            expr: Box::new(scrutinee),
            branches,
        })
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        match self.bump() {
            TokenKind::Ident(name) => {
                if starts_uppercase(&name) {
                    if let TokenKind::Ident(binder) = self.peek().clone() {
                        if !starts_uppercase(&binder) {
                            self.bump();
                            return Ok(Pattern::TagBind(name, binder));
                        }
                    }
                    Ok(Pattern::Tag(name))
                } else {
                    Ok(Pattern::Wildcard(name))
                }
            }
            _ => Err(self.err("expected a pattern")),
        }
    }
}

fn starts_uppercase(name: &str) -> bool {
    name.chars().next().map_or(false, |c| c.is_ascii_uppercase())
}

fn op_lexeme(kind: &TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Caret => "^",
        TokenKind::Lt => "<",
        TokenKind::Gt => ">",
        TokenKind::LtEq => "<=",
        TokenKind::GtEq => ">=",
        TokenKind::EqEq => "==",
        TokenKind::NotEq => "!=",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn let_binding_with_arithmetic() {
        let ast = parse("let x = 3 + 4").unwrap();
        assert_eq!(ast.len(), 1);
        match &ast[0] {
            Expr::Let { name, ty, expr, .. } => {
                assert_eq!(name, "x");
                assert!(ty.is_none());
                assert!(matches!(**expr, Expr::Bin { op: BinOp::Add, .. }));
            }
            other => panic!("expected let binding, got {:?}", other),
        }
    }

    #[test]
    fn union_declaration_and_tag_construction() {
        let ast = parse("type Opt = | Some i32 | None\nlet v = Some 5").unwrap();
        assert_eq!(ast.len(), 2);
        match &ast[0] {
            Expr::DataDecl {
                name,
                body: DataBody::Union(variants),
                ..
            } => {
                assert_eq!(name, "Opt");
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0], ("Some".to_string(), Some(Ty::I32)));
                assert_eq!(variants[1], ("None".to_string(), None));
            }
            other => panic!("expected union declaration, got {:?}", other),
        }
        match &ast[1] {
            Expr::Let { expr, .. } => {
                assert!(matches!(
                    &**expr,
                    Expr::Cast { ty: Ty::Data(n), .. } if n == "Some"
                ));
            }
            other => panic!("expected let binding, got {:?}", other),
        }
    }

    #[test]
    fn match_patterns() {
        let src = "match o with\n| Some n -> n\n| None -> 0";
        let ast = parse(src).unwrap();
        match &ast[0] {
            Expr::Match { branches, .. } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(
                    branches[0].0,
                    Pattern::TagBind("Some".into(), "n".into())
                );
                assert_eq!(branches[1].0, Pattern::Tag("None".into()));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn function_declaration_and_call() {
        let ast = parse("fun f (x i32) (y i32) -> i32 = x + y\nf(2, 3)").unwrap();
        match &ast[0] {
            Expr::Func(f) => {
                assert_eq!(f.name, "f");
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.ret, Some(Ty::I32));
                assert!(f.body.is_some());
            }
            other => panic!("expected function declaration, got {:?}", other),
        }
        assert!(matches!(&ast[1], Expr::Call { args, .. } if args.len() == 2));
    }

    #[test]
    fn record_construction_desugars_to_cast() {
        let ast = parse("type Vec2 = x f32, y f32\nmut v = Vec2 {1.0, 2.0}\nv.x = 3.0").unwrap();
        assert!(matches!(&ast[0], Expr::DataDecl { .. }));
        match &ast[1] {
            Expr::VarDecl { expr: Some(e), .. } => match &**e {
                Expr::Cast { ty, expr, .. } => {
                    assert_eq!(*ty, Ty::Data("Vec2".into()));
                    assert!(matches!(**expr, Expr::TupleLit { ref elems, .. } if elems.len() == 2));
                }
                other => panic!("expected cast, got {:?}", other),
            },
            other => panic!("expected mut declaration, got {:?}", other),
        }
        match &ast[2] {
            Expr::Assign { target, .. } => {
                assert!(matches!(**target, Expr::Bin { op: BinOp::Dot, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn operator_overload_declaration() {
        let ast = parse("fun + (a Str) (b Str) -> Str = a").unwrap();
        match &ast[0] {
            Expr::Func(f) => assert_eq!(f.name, "+"),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn directive_attaches_to_function() {
        let ast = parse("![inline]\nfun square (x i32) -> i32 = x * x").unwrap();
        match &ast[0] {
            Expr::Func(f) => assert_eq!(f.directives, vec!["inline".to_string()]),
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn new_and_deref_unary_operators() {
        let ast = parse("let p = new 42\nlet v = @p").unwrap();
        assert!(matches!(
            &ast[0],
            Expr::Let { expr, .. } if matches!(**expr, Expr::Un { op: UnOp::New, .. })
        ));
        assert!(matches!(
            &ast[1],
            Expr::Let { expr, .. } if matches!(**expr, Expr::Un { op: UnOp::Deref, .. })
        ));
    }

    #[test]
    fn index_assignment_parses_as_insert_target() {
        let ast = parse("xs#0 = 5").unwrap();
        match &ast[0] {
            Expr::Assign { target, .. } => {
                assert!(matches!(**target, Expr::Bin { op: BinOp::Idx, .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }
}
