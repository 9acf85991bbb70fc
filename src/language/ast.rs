use crate::language::{span::Span, types::TypeExpr};

/// Top-level declarations of one source file.
#[derive(Clone, Debug, Default)]
pub struct File {
    pub decls: Vec<Decl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: Span::default(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.name == "_"
    }
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            span: Span::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    Empty(Span),
    Assign(AssignStmt),
    Block(Block),
    Branch(BranchStmt),
    Case(CaseClause),
    Comm(CommClause),
    Decl(Decl),
    Defer(DeferStmt),
    Expr(Expr),
    For(ForStmt),
    Go(GoStmt),
    If(IfStmt),
    IncDec(IncDecStmt),
    Labeled(LabeledStmt),
    Range(RangeStmt),
    Return(ReturnStmt),
    Select(SelectStmt),
    Send(SendStmt),
    Switch(SwitchStmt),
    TypeSwitch(TypeSwitchStmt),
    /// Placeholder left behind by a parse error.
    Bad(Span),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Define,
    Compound(BinaryOp),
}

#[derive(Clone, Debug)]
pub struct AssignStmt {
    pub lhs: Vec<Expr>,
    pub op: AssignOp,
    pub rhs: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchKind {
    Break,
    Continue,
    Fallthrough,
    Goto,
}

#[derive(Clone, Debug)]
pub struct BranchStmt {
    pub kind: BranchKind,
    pub label: Option<Identifier>,
    pub span: Span,
}

/// `case a, b:` or `default:` (when `list` is `None`) in a switch or type switch.
#[derive(Clone, Debug)]
pub struct CaseClause {
    pub list: Option<Vec<Expr>>,
    pub body: Vec<Statement>,
    pub span: Span,
}

/// `case <comm>:` or `default:` (when `comm` is `None`) in a select.
#[derive(Clone, Debug)]
pub struct CommClause {
    pub comm: Option<Box<Statement>>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct DeferStmt {
    pub call: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct GoStmt {
    pub call: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    pub init: Option<Box<Statement>>,
    pub cond: Option<Expr>,
    pub post: Option<Box<Statement>>,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub init: Option<Box<Statement>>,
    pub cond: Expr,
    pub then_branch: Block,
    pub else_branch: Option<Box<Statement>>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IncDecStmt {
    pub target: Expr,
    pub increment: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct LabeledStmt {
    pub label: Identifier,
    pub stmt: Box<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct RangeStmt {
    pub key: Option<Expr>,
    pub value: Option<Expr>,
    pub define: bool,
    pub expr: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SelectStmt {
    pub clauses: Vec<CommClause>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SendStmt {
    pub channel: Expr,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SwitchStmt {
    pub init: Option<Box<Statement>>,
    pub tag: Option<Expr>,
    pub clauses: Vec<CaseClause>,
    pub span: Span,
}

/// `switch binding := subject.(type) { ... }`. Case lists hold `Expr::Type` or `nil`.
#[derive(Clone, Debug)]
pub struct TypeSwitchStmt {
    pub init: Option<Box<Statement>>,
    pub binding: Option<Identifier>,
    pub subject: Expr,
    pub clauses: Vec<CaseClause>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Decl {
    Var(Vec<ValueSpec>, Span),
    Const(Vec<ValueSpec>, Span),
    Type(Vec<TypeSpec>, Span),
    Func(FuncDecl),
}

#[derive(Clone, Debug)]
pub struct ValueSpec {
    pub names: Vec<Identifier>,
    pub ty: Option<TypeExpr>,
    pub values: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeSpec {
    pub name: Identifier,
    pub ty: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: Identifier,
    pub sig: FuncTypeExpr,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FuncTypeExpr {
    pub params: Vec<Field>,
    pub results: Vec<Field>,
    pub variadic: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: Option<Identifier>,
    pub ty: TypeExpr,
}

impl Field {
    pub fn named(name: impl Into<String>, ty: TypeExpr) -> Self {
        Self {
            name: Some(Identifier::new(name)),
            ty,
        }
    }

    pub fn anon(ty: TypeExpr) -> Self {
        Self { name: None, ty }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Identifier(Identifier),
    Literal(Literal),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        ellipsis: bool,
        span: Span,
    },
    FuncLit {
        sig: FuncTypeExpr,
        body: Block,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    SliceLiteral {
        elem: TypeExpr,
        elems: Vec<Expr>,
        span: Span,
    },
    MapLiteral {
        key: TypeExpr,
        value: TypeExpr,
        entries: Vec<MapLiteralEntry>,
        span: Span,
    },
    TypeAssert {
        expr: Box<Expr>,
        ty: TypeExpr,
        span: Span,
    },
    /// A type in expression position, e.g. the first argument of `make`.
    Type(TypeExpr, Span),
}

#[derive(Clone, Debug)]
pub enum Literal {
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    String(String, Span),
}

#[derive(Clone, Debug)]
pub struct MapLiteralEntry {
    pub key: Expr,
    pub value: Expr,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    /// Channel receive `<-ch`.
    Recv,
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Empty(span) | Statement::Bad(span) => *span,
            Statement::Assign(stmt) => stmt.span,
            Statement::Block(block) => block.span,
            Statement::Branch(stmt) => stmt.span,
            Statement::Case(clause) => clause.span,
            Statement::Comm(clause) => clause.span,
            Statement::Decl(decl) => decl.span(),
            Statement::Defer(stmt) => stmt.span,
            Statement::Expr(expr) => expr.span(),
            Statement::For(stmt) => stmt.span,
            Statement::Go(stmt) => stmt.span,
            Statement::If(stmt) => stmt.span,
            Statement::IncDec(stmt) => stmt.span,
            Statement::Labeled(stmt) => stmt.span,
            Statement::Range(stmt) => stmt.span,
            Statement::Return(stmt) => stmt.span,
            Statement::Select(stmt) => stmt.span,
            Statement::Send(stmt) => stmt.span,
            Statement::Switch(stmt) => stmt.span,
            Statement::TypeSwitch(stmt) => stmt.span,
        }
    }

    /// Name of the statement kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Empty(_) => "empty statement",
            Statement::Assign(_) => "assignment",
            Statement::Block(_) => "block",
            Statement::Branch(_) => "branch statement",
            Statement::Case(_) => "case clause",
            Statement::Comm(_) => "comm clause",
            Statement::Decl(_) => "declaration",
            Statement::Defer(_) => "defer statement",
            Statement::Expr(_) => "expression statement",
            Statement::For(_) => "for statement",
            Statement::Go(_) => "go statement",
            Statement::If(_) => "if statement",
            Statement::IncDec(_) => "inc/dec statement",
            Statement::Labeled(_) => "labeled statement",
            Statement::Range(_) => "range statement",
            Statement::Return(_) => "return statement",
            Statement::Select(_) => "select statement",
            Statement::Send(_) => "send statement",
            Statement::Switch(_) => "switch statement",
            Statement::TypeSwitch(_) => "type switch statement",
            Statement::Bad(_) => "bad statement",
        }
    }

    pub fn expr(expr: Expr) -> Self {
        Statement::Expr(expr)
    }

    pub fn assign(lhs: Vec<Expr>, rhs: Vec<Expr>) -> Self {
        Statement::Assign(AssignStmt {
            lhs,
            op: AssignOp::Assign,
            rhs,
            span: Span::default(),
        })
    }

    pub fn define(names: &[&str], rhs: Vec<Expr>) -> Self {
        Statement::Assign(AssignStmt {
            lhs: names.iter().map(|name| Expr::ident(*name)).collect(),
            op: AssignOp::Define,
            rhs,
            span: Span::default(),
        })
    }

    pub fn op_assign(op: BinaryOp, target: Expr, value: Expr) -> Self {
        Statement::Assign(AssignStmt {
            lhs: vec![target],
            op: AssignOp::Compound(op),
            rhs: vec![value],
            span: Span::default(),
        })
    }

    pub fn var(name: &str, ty: Option<TypeExpr>, value: Option<Expr>) -> Self {
        Statement::Decl(Decl::Var(
            vec![ValueSpec {
                names: vec![Identifier::new(name)],
                ty,
                values: value.into_iter().collect(),
                span: Span::default(),
            }],
            Span::default(),
        ))
    }

    pub fn block(statements: Vec<Statement>) -> Self {
        Statement::Block(Block::new(statements))
    }

    pub fn inc(target: Expr) -> Self {
        Statement::IncDec(IncDecStmt {
            target,
            increment: true,
            span: Span::default(),
        })
    }

    pub fn dec(target: Expr) -> Self {
        Statement::IncDec(IncDecStmt {
            target,
            increment: false,
            span: Span::default(),
        })
    }

    pub fn ret(values: Vec<Expr>) -> Self {
        Statement::Return(ReturnStmt {
            values,
            span: Span::default(),
        })
    }

    pub fn branch(kind: BranchKind, label: Option<&str>) -> Self {
        Statement::Branch(BranchStmt {
            kind,
            label: label.map(Identifier::new),
            span: Span::default(),
        })
    }

    pub fn labeled(label: &str, stmt: Statement) -> Self {
        Statement::Labeled(LabeledStmt {
            label: Identifier::new(label),
            stmt: Box::new(stmt),
            span: Span::default(),
        })
    }

    pub fn if_else(cond: Expr, then_branch: Vec<Statement>, else_branch: Option<Statement>) -> Self {
        Statement::If(IfStmt {
            init: None,
            cond,
            then_branch: Block::new(then_branch),
            else_branch: else_branch.map(Box::new),
            span: Span::default(),
        })
    }

    pub fn for_loop(
        init: Option<Statement>,
        cond: Option<Expr>,
        post: Option<Statement>,
        body: Vec<Statement>,
    ) -> Self {
        Statement::For(ForStmt {
            init: init.map(Box::new),
            cond,
            post: post.map(Box::new),
            body: Block::new(body),
            span: Span::default(),
        })
    }

    pub fn range(key: Option<&str>, value: Option<&str>, expr: Expr, body: Vec<Statement>) -> Self {
        Statement::Range(RangeStmt {
            key: key.map(Expr::ident),
            value: value.map(Expr::ident),
            define: true,
            expr,
            body: Block::new(body),
            span: Span::default(),
        })
    }

    pub fn go(call: Expr) -> Self {
        Statement::Go(GoStmt {
            call,
            span: Span::default(),
        })
    }

    pub fn defer(call: Expr) -> Self {
        Statement::Defer(DeferStmt {
            call,
            span: Span::default(),
        })
    }

    pub fn send(channel: Expr, value: Expr) -> Self {
        Statement::Send(SendStmt {
            channel,
            value,
            span: Span::default(),
        })
    }

    pub fn switch(tag: Option<Expr>, clauses: Vec<CaseClause>) -> Self {
        Statement::Switch(SwitchStmt {
            init: None,
            tag,
            clauses,
            span: Span::default(),
        })
    }

    pub fn func(name: &str, sig: FuncTypeExpr, body: Vec<Statement>) -> Self {
        Statement::Decl(Decl::Func(FuncDecl {
            name: Identifier::new(name),
            sig,
            body: Block::new(body),
            span: Span::default(),
        }))
    }
}

impl CaseClause {
    pub fn case(list: Vec<Expr>, body: Vec<Statement>) -> Self {
        Self {
            list: Some(list),
            body,
            span: Span::default(),
        }
    }

    pub fn default(body: Vec<Statement>) -> Self {
        Self {
            list: None,
            body,
            span: Span::default(),
        }
    }
}

impl CommClause {
    pub fn case(comm: Statement, body: Vec<Statement>) -> Self {
        Self {
            comm: Some(Box::new(comm)),
            body,
            span: Span::default(),
        }
    }

    pub fn default(body: Vec<Statement>) -> Self {
        Self {
            comm: None,
            body,
            span: Span::default(),
        }
    }
}

impl Decl {
    pub fn span(&self) -> Span {
        match self {
            Decl::Var(_, span) | Decl::Const(_, span) | Decl::Type(_, span) => *span,
            Decl::Func(func) => func.span,
        }
    }
}

impl FuncTypeExpr {
    pub fn new(params: Vec<Field>, results: Vec<Field>) -> Self {
        Self {
            params,
            results,
            variadic: false,
        }
    }
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Identifier(ident) => ident.span,
            Expr::Literal(
                Literal::Int(_, span)
                | Literal::Float(_, span)
                | Literal::Bool(_, span)
                | Literal::String(_, span),
            ) => *span,
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Call { span, .. }
            | Expr::FuncLit { span, .. }
            | Expr::Index { span, .. }
            | Expr::SliceLiteral { span, .. }
            | Expr::MapLiteral { span, .. }
            | Expr::TypeAssert { span, .. }
            | Expr::Type(_, span) => *span,
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Identifier(Identifier::new(name))
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value, Span::default()))
    }

    pub fn float(value: f64) -> Self {
        Expr::Literal(Literal::Float(value, Span::default()))
    }

    pub fn bool(value: bool) -> Self {
        Expr::Literal(Literal::Bool(value, Span::default()))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into(), Span::default()))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: Span::default(),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
            span: Span::default(),
        }
    }

    pub fn recv(channel: Expr) -> Self {
        Expr::unary(UnaryOp::Recv, channel)
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
            ellipsis: false,
            span: Span::default(),
        }
    }

    /// `callee(args...)` with the last argument spread into a variadic parameter.
    pub fn spread_call(callee: Expr, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
            ellipsis: true,
            span: Span::default(),
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
            span: Span::default(),
        }
    }

    pub fn func_lit(sig: FuncTypeExpr, body: Vec<Statement>) -> Self {
        Expr::FuncLit {
            sig,
            body: Block::new(body),
            span: Span::default(),
        }
    }

    pub fn slice_lit(elem: TypeExpr, elems: Vec<Expr>) -> Self {
        Expr::SliceLiteral {
            elem,
            elems,
            span: Span::default(),
        }
    }

    pub fn type_expr(ty: TypeExpr) -> Self {
        Expr::Type(ty, Span::default())
    }

    pub fn type_assert(expr: Expr, ty: TypeExpr) -> Self {
        Expr::TypeAssert {
            expr: Box::new(expr),
            ty,
            span: Span::default(),
        }
    }

    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Expr::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_identifier().map_or(false, Identifier::is_blank)
    }
}
