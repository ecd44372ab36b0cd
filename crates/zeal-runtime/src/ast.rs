//! Abstract syntax tree produced by the parser and consumed by the compiler

use crate::span::Span;

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level statements
    pub stmts: Vec<Stmt>,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    Shl,
    Shr,
    BitAnd,
    BitXor,
    BitOr,
}

/// Short-circuit logical operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Numeric negation (`-`)
    Neg,
    /// Boolean not (`!`)
    Not,
    /// Bitwise not (`~`)
    BitNot,
}

/// Type tags testable with `is`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Empty = 0,
    Bool = 1,
    Int = 2,
    Float = 3,
    Str = 4,
    Array = 5,
    List = 6,
    Dict = 7,
    Record = 8,
    Proc = 9,
}

impl TypeTag {
    /// Parse a tag from its keyword spelling
    pub fn from_name(name: &str) -> Option<TypeTag> {
        let tag = match name {
            "empty" => TypeTag::Empty,
            "bool" => TypeTag::Bool,
            "int" => TypeTag::Int,
            "float" => TypeTag::Float,
            "str" => TypeTag::Str,
            "array" => TypeTag::Array,
            "list" => TypeTag::List,
            "dict" => TypeTag::Dict,
            "record" => TypeTag::Record,
            "proc" => TypeTag::Proc,
            _ => return None,
        };
        Some(tag)
    }

    /// The one-byte encoding used by the `IS` opcode
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// Decode the `IS` operand byte
    pub fn from_byte(byte: u8) -> Option<TypeTag> {
        let tag = match byte {
            0 => TypeTag::Empty,
            1 => TypeTag::Bool,
            2 => TypeTag::Int,
            3 => TypeTag::Float,
            4 => TypeTag::Str,
            5 => TypeTag::Array,
            6 => TypeTag::List,
            7 => TypeTag::Dict,
            8 => TypeTag::Record,
            9 => TypeTag::Proc,
            _ => return None,
        };
        Some(tag)
    }
}

/// Loop direction of a `for` range statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForDirection {
    Upto,
    Downto,
}

/// A function parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

/// Expressions always push exactly one value
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Empty(Span),
    Bool(bool, Span),
    Int(i64, Span),
    Float(f64, Span),
    Str(String, Span),
    /// Template string: each part is stringified and concatenated
    Template { parts: Vec<Expr>, span: Span },
    Ident(String, Span),
    Group(Box<Expr>),
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Access {
        target: Box<Expr>,
        name: String,
        span: Span,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// Assignment; `op` carries the compound operator, if any
    Assign {
        target: Box<Expr>,
        op: Option<BinaryOp>,
        value: Box<Expr>,
        span: Span,
    },
    Is {
        operand: Box<Expr>,
        tag: TypeTag,
        span: Span,
    },
    /// Anonymous function expression
    Anon {
        params: Vec<Param>,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `[a, b, c]`
    ArrayLiteral { items: Vec<Expr>, span: Span },
    /// `array(len)` — a fresh array of `empty` values
    ArrayNew { len: Box<Expr>, span: Span },
    /// `list(a, b, c)`
    ListLiteral { items: Vec<Expr>, span: Span },
    /// `dict(k: v, ...)`
    DictLiteral {
        entries: Vec<(Expr, Expr)>,
        span: Span,
    },
    /// `{ name: value, ... }`
    RecordLiteral {
        fields: Vec<(String, Expr)>,
        span: Span,
    },
}

impl Expr {
    /// The source span of this expression
    pub fn span(&self) -> Span {
        match self {
            Expr::Empty(span)
            | Expr::Bool(_, span)
            | Expr::Int(_, span)
            | Expr::Float(_, span)
            | Expr::Str(_, span)
            | Expr::Ident(_, span) => *span,
            Expr::Group(inner) => inner.span(),
            Expr::Template { span, .. }
            | Expr::Call { span, .. }
            | Expr::Access { span, .. }
            | Expr::Index { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Is { span, .. }
            | Expr::Anon { span, .. }
            | Expr::ArrayLiteral { span, .. }
            | Expr::ArrayNew { span, .. }
            | Expr::ListLiteral { span, .. }
            | Expr::DictLiteral { span, .. }
            | Expr::RecordLiteral { span, .. } => *span,
        }
    }
}

/// One branch of an `if`/`elif` chain
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub condition: Expr,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Statements
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    VarDecl {
        mutable: bool,
        name: String,
        init: Option<Expr>,
        span: Span,
    },
    Block { stmts: Vec<Stmt>, span: Span },
    If {
        branches: Vec<IfBranch>,
        else_body: Option<Vec<Stmt>>,
        span: Span,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    ForRange {
        var: String,
        init: Option<Expr>,
        direction: ForDirection,
        bound: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    Stop(Span),
    Continue(Span),
    Ret { value: Option<Expr>, span: Span },
    Proc {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
        span: Span,
    },
    Throw { value: Option<Expr>, span: Span },
    Try {
        body: Vec<Stmt>,
        binding: Option<String>,
        catch_body: Vec<Stmt>,
        span: Span,
    },
    Import {
        names: Vec<String>,
        alias: Option<String>,
        span: Span,
    },
    Export {
        names: Vec<(String, Span)>,
        span: Span,
    },
}

impl Stmt {
    /// The source span of this statement
    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr(expr) => expr.span(),
            Stmt::VarDecl { span, .. }
            | Stmt::Block { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::ForRange { span, .. }
            | Stmt::Ret { span, .. }
            | Stmt::Proc { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Import { span, .. }
            | Stmt::Export { span, .. } => *span,
            Stmt::Stop(span) | Stmt::Continue(span) => *span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_round_trip() {
        for byte in 0u8..=9 {
            let tag = TypeTag::from_byte(byte).unwrap();
            assert_eq!(tag.as_byte(), byte);
        }
        assert_eq!(TypeTag::from_byte(10), None);
    }

    #[test]
    fn test_type_tag_names() {
        assert_eq!(TypeTag::from_name("record"), Some(TypeTag::Record));
        assert_eq!(TypeTag::from_name("object"), None);
    }
}
