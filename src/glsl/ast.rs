//! Syntax tree for the supported GLSL ES subset.

use super::lexer::Directive;

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Directive(Directive),
    Struct(StructDecl),
    Declaration(Declaration),
    Function(FunctionDecl),
    /// `precision mediump float;` — carries no semantics for the target.
    Precision,
    Expr(Expr),
    Block(Vec<Stmt>),
    Return(Option<Expr>),
    If(IfStmt),
    For(ForStmt),
    Discard,
    Break,
    Continue,
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<StructFieldDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructFieldDecl {
    pub ty: TypeSpec,
    pub name: String,
    pub array_len: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub qualifier: Option<Qualifier>,
    /// Location pinned by an explicit `layout(location = N)` qualifier.
    pub layout_location: Option<u32>,
    pub ty: TypeSpec,
    pub declarators: Vec<Declarator>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub array_len: Option<Expr>,
    pub init: Option<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Qualifier {
    Attribute,
    Varying,
    Uniform,
    Const,
    In,
    Out,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    /// Array suffix attached to the type itself (`float[3] x`).
    pub array_len: Option<Box<Expr>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDecl {
    pub return_type: TypeSpec,
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for a prototype.
    pub body: Option<Vec<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub direction: ParamDirection,
    pub ty: TypeSpec,
    pub name: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamDirection {
    In,
    Out,
    InOut,
}

impl ParamDirection {
    /// `out` and `inout` parameters lower to pointer parameters.
    pub const fn is_pointer(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then: Vec<Stmt>,
    pub otherwise: Option<Vec<Stmt>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ForStmt {
    pub init: Option<Box<Stmt>>,
    pub cond: Option<Expr>,
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Ident(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Call(CallExpr),
    /// `float[3](a, b, c)` — an array-specifier constructor.
    ArrayCtor {
        ty: TypeSpec,
        len: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        expr: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    /// Callees in GLSL are always plain names: functions, builtins or type
    /// constructors.
    pub callee: String,
    pub args: Vec<Expr>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub const fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Gt | Self::Le | Self::Ge | Self::Eq | Self::Ne
        )
    }

    pub const fn wgsl(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl Expr {
    /// A short label for the ancestor trace.
    pub fn label(&self) -> String {
        match self {
            Self::Ident(name) => format!("ident {name}"),
            Self::Int(v) => format!("int {v}"),
            Self::Uint(v) => format!("uint {v}"),
            Self::Float(v) => format!("float {v}"),
            Self::Bool(v) => format!("bool {v}"),
            Self::Call(call) => format!("call {}", call.callee),
            Self::ArrayCtor { ty, .. } => format!("array ctor {}", ty.name),
            Self::Assign { .. } => "assign".into(),
            Self::Binary { op, .. } => format!("binary {}", op.wgsl()),
            Self::Unary { .. } => "unary".into(),
            Self::Update { .. } => "update".into(),
            Self::Ternary { .. } => "ternary".into(),
            Self::Logical { .. } => "logical".into(),
            Self::Member { member, .. } => format!("member .{member}"),
            Self::Index { .. } => "index".into(),
        }
    }
}
