//! Owned IR for compiled units.
//!
//! `lower` builds this from the oxc AST so the result outlives the parser's
//! arena and can be cached and shared between renders.

use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    TypeOf,
    Void,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    LogicalAnd,
    LogicalOr,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Const,
    Let,
    Var,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Identifier(String),
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<FunctionDef>),
    Call {
        callee: Box<Expr>,
        arguments: Vec<ArrayItem>,
        optional: bool,
    },
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        optional: bool,
    },
    /// Boundary of an optional chain; a short-circuit inside yields `undefined`.
    Chain(Box<Expr>),
    Unary {
        operator: UnaryOp,
        argument: Box<Expr>,
    },
    Binary {
        operator: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        operator: AssignOp,
        target: AssignTarget,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: AssignTarget,
    },
    Sequence(Vec<Expr>),
    Element(Rc<ElementDef>),
}

#[derive(Debug, Clone)]
pub enum ArrayItem {
    Expr(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum ObjectItem {
    Property { key: PropertyName, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyName {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum AssignTarget {
    Identifier(String),
    Member {
        object: Box<Expr>,
        property: MemberProperty,
    },
}

#[derive(Debug, Clone)]
pub enum Pattern {
    Identifier(String),
    Object {
        properties: Vec<(PropertyName, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        default: Expr,
    },
}

impl Pattern {
    pub fn bound_names(&self, names: &mut Vec<String>) {
        match self {
            Pattern::Identifier(name) => names.push(name.clone()),
            Pattern::Object { properties, rest } => {
                for (_, pattern) in properties {
                    pattern.bound_names(names);
                }
                if let Some(rest) = rest {
                    rest.bound_names(names);
                }
            }
            Pattern::Array { elements, rest } => {
                for pattern in elements.iter().flatten() {
                    pattern.bound_names(names);
                }
                if let Some(rest) = rest {
                    rest.bound_names(names);
                }
            }
            Pattern::Default { target, .. } => target.bound_names(names),
        }
    }
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<Pattern>,
    pub body: Vec<Stmt>,
    pub arrow: bool,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Declare {
        kind: DeclKind,
        pattern: Pattern,
        init: Option<Expr>,
    },
    Function(Rc<FunctionDef>),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Vec<Stmt>),
    Expression(Expr),
    ForOf {
        kind: DeclKind,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        param: Option<Pattern>,
        handler: Option<Vec<Stmt>>,
        finalizer: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Empty,
}

#[derive(Debug)]
pub struct ElementDef {
    pub tag: ElementTag,
    pub attributes: Vec<AttributeItem>,
    pub children: Vec<ChildItem>,
}

#[derive(Debug)]
pub enum ElementTag {
    /// Lowercase host tag such as `div`.
    Intrinsic(String),
    /// Capitalised or dotted tag resolved against scope at render time.
    Component(Expr),
    Fragment,
}

#[derive(Debug)]
pub enum AttributeItem {
    Named { name: String, value: Expr },
    Spread(Expr),
}

#[derive(Debug)]
pub enum ChildItem {
    Text(String),
    Expr(Expr),
    Spread(Expr),
}

/// A lowered source unit.
#[derive(Debug)]
pub struct Program {
    pub body: Vec<Stmt>,
    /// Identifiers referenced but not bound anywhere in the unit (diagnostics only).
    pub free_identifiers: Vec<String>,
}

impl Program {
    /// Names declared at the top level of the unit, in source order.
    pub fn declared_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for stmt in &self.body {
            match stmt {
                Stmt::Declare { pattern, .. } => pattern.bound_names(&mut names),
                Stmt::Function(def) => {
                    if let Some(name) = &def.name {
                        names.push(name.clone());
                    }
                }
                _ => {}
            }
        }
        names
    }
}
