//! AST for the An language.
//!
//! The parser produces a flat `Vec<Expr>` of top-level statements; sequencing
//! is positional, there are no sibling links. Every node carries a `Loc` for
//! diagnostics.

use crate::types::Ty;

/// Source span: `line:col` through `end_line:end_col`, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    pub line: u32,
    pub col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Loc {
    pub fn new(line: u32, col: u32) -> Loc {
        Loc {
            line,
            col,
            end_line: line,
            end_col: col,
        }
    }

    pub fn to(self, end: Loc) -> Loc {
        Loc {
            line: self.line,
            col: self.col,
            end_line: end.end_line,
            end_col: end.end_col,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    LtEq,
    GtEq,
    Eq,
    NotEq,
    Xor,
    And,
    Or,
    /// Member access, `a.b`.
    Dot,
    /// Index extract, `a#i`.
    Idx,
}

impl BinOp {
    /// The operator's source lexeme; also the base name used when searching
    /// for an overload (`<op>_<lhs>_<rhs>`).
    pub fn lexeme(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "<=",
            BinOp::GtEq => ">=",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Xor => "^",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::Dot => ".",
            BinOp::Idx => "#",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Pointer dereference, `@p`.
    Deref,
    Neg,
    Not,
    /// Heap allocation, `new e`.
    New,
}

/// A `match` arm pattern. Tag names are uppercase-initial by the
/// capitalization rule; a lowercase identifier is the wildcard binder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    /// Bare tag: `None`.
    Tag(String),
    /// Tag with payload binder: `Some n`.
    TagBind(String, String),
    /// Catch-all binding the scrutinee: `other`.
    Wildcard(String),
}

/// A function declaration, named or anonymous (lambda).
#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    /// Declared name; empty for lambdas. Rewritten to the mangled name by
    /// the declaration scan.
    pub name: String,
    pub params: Vec<(String, Ty)>,
    /// `None` requests return-type inference.
    pub ret: Option<Ty>,
    /// `None` marks an extern declaration.
    pub body: Option<Box<Expr>>,
    /// Compiler directives preceding the declaration, e.g. `inline`, `ct`.
    pub directives: Vec<String>,
    pub varargs: bool,
    pub loc: Loc,
}

/// The body of a `type` declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum DataBody {
    /// Record fields in declaration order. Field names may be empty for a
    /// bare aliased type (`type Int = i32`).
    Record(Vec<(String, Ty)>),
    /// Union variants: tag name and optional payload type.
    Union(Vec<(String, Option<Ty>)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit {
        val: String,
        ty: Ty,
        loc: Loc,
    },
    FltLit {
        val: String,
        ty: Ty,
        loc: Loc,
    },
    BoolLit {
        val: bool,
        loc: Loc,
    },
    CharLit {
        val: u8,
        loc: Loc,
    },
    StrLit {
        val: String,
        loc: Loc,
    },
    ArrayLit {
        elems: Vec<Expr>,
        loc: Loc,
    },
    /// Tuple literal; the empty tuple is the unit value.
    TupleLit {
        elems: Vec<Expr>,
        loc: Loc,
    },
    Var {
        name: String,
        loc: Loc,
    },
    /// A type used in expression position: an enum value (`None`) or the
    /// left side of a static access (`Math.rand`).
    TypeRef {
        ty: Ty,
        loc: Loc,
    },
    Cast {
        ty: Ty,
        expr: Box<Expr>,
        loc: Loc,
    },
    Bin {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: Loc,
    },
    Un {
        op: UnOp,
        rhs: Box<Expr>,
        loc: Loc,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        loc: Loc,
    },
    Block {
        stmts: Vec<Expr>,
        loc: Loc,
    },
    Ret {
        expr: Box<Expr>,
        loc: Loc,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        /// `elif` chains nest here as further `If` nodes.
        els: Option<Box<Expr>>,
        loc: Loc,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
        loc: Loc,
    },
    For {
        var: String,
        range: Box<Expr>,
        body: Box<Expr>,
        loc: Loc,
    },
    Match {
        expr: Box<Expr>,
        branches: Vec<(Pattern, Expr)>,
        loc: Loc,
    },
    Let {
        name: String,
        ty: Option<Ty>,
        expr: Box<Expr>,
        loc: Loc,
    },
    VarDecl {
        name: String,
        ty: Option<Ty>,
        expr: Option<Box<Expr>>,
        loc: Loc,
    },
    Assign {
        target: Box<Expr>,
        expr: Box<Expr>,
        loc: Loc,
    },
    Func(FuncDecl),
    DataDecl {
        name: String,
        body: DataBody,
        loc: Loc,
    },
    /// Extension block: every contained function becomes a method of `ty`.
    Ext {
        ty: Ty,
        methods: Vec<FuncDecl>,
        loc: Loc,
    },
    Trait {
        name: String,
        methods: Vec<FuncDecl>,
        loc: Loc,
    },
    Import {
        path: String,
        loc: Loc,
    },
}

impl Expr {
    pub fn loc(&self) -> Loc {
        match self {
            Expr::IntLit { loc, .. }
            | Expr::FltLit { loc, .. }
            | Expr::BoolLit { loc, .. }
            | Expr::CharLit { loc, .. }
            | Expr::StrLit { loc, .. }
            | Expr::ArrayLit { loc, .. }
            | Expr::TupleLit { loc, .. }
            | Expr::Var { loc, .. }
            | Expr::TypeRef { loc, .. }
            | Expr::Cast { loc, .. }
            | Expr::Bin { loc, .. }
            | Expr::Un { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Block { loc, .. }
            | Expr::Ret { loc, .. }
            | Expr::If { loc, .. }
            | Expr::While { loc, .. }
            | Expr::For { loc, .. }
            | Expr::Match { loc, .. }
            | Expr::Let { loc, .. }
            | Expr::VarDecl { loc, .. }
            | Expr::Assign { loc, .. }
            | Expr::DataDecl { loc, .. }
            | Expr::Ext { loc, .. }
            | Expr::Trait { loc, .. }
            | Expr::Import { loc, .. } => *loc,
            Expr::Func(f) => f.loc,
        }
    }

    /// True for the declarations the pre-pass removes from the top level.
    pub fn is_declaration(&self) -> bool {
        matches!(self, Expr::Func(_) | Expr::DataDecl { .. } | Expr::Ext { .. })
    }
}
