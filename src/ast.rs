//! The input tree this crate lowers.
//!
//! The source compiler represents a parsed program as an untyped, tagged
//! S-expression (a symbolic head plus ordered children). This crate encodes
//! that vocabulary as a typed enum instead: dispatch in [`crate::lower`] is
//! exhaustive pattern matching rather than a string switch, and a single
//! [`Node::Unknown`] variant stands in for any construct the (out-of-scope)
//! parser might produce that this pass does not recognize.

use serde::{Deserialize, Serialize};

/// A literal value produced by the `lit` tag.
///
/// `str`, `true`/`false`/`nil` and `self` are not literals in this
/// vocabulary — they are distinct [`Node`] variants, matching the source
/// grammar's own tag split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(OrderedFloat),
    Symbol(String),
    /// A range literal. `begin`/`end` are themselves nodes (not necessarily
    /// integer literals) and are lowered recursively.
    Range {
        begin: Box<Node>,
        end: Box<Node>,
        exclude_end: bool,
    },
}

/// Thin wrapper so `Literal` can derive `PartialEq` without pulling in a
/// crate for float comparisons; equality here is used only by tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

/// A single `when` arm of a `case` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhenClause {
    pub options: Vec<Node>,
    pub body: Vec<Node>,
}

/// One formal parameter. Nested/Splat/Optional parameters put a parameter
/// list into the "complex" lowering path (§4.3); a list of only `Required`
/// parameters is "simple".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Param {
    Required(String),
    /// `name` is `None` for an anonymous splat (`*`) that only discards the
    /// middle of the argument list without binding it.
    Splat(Option<String>),
    Optional(String, Box<Node>),
    Nested(Vec<Param>),
}

/// One `rescue` clause: zero or more exception-class expressions, an
/// optional bound variable name, and a handler body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescueClause {
    pub exception_classes: Vec<Node>,
    pub var_name: Option<String>,
    pub body: Vec<Node>,
}

/// A `begin ... rescue ... else ... ensure ... end` region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rescue {
    pub body: Vec<Node>,
    pub clauses: Vec<RescueClause>,
    pub else_body: Option<Vec<Node>>,
    pub ensure_body: Option<Vec<Node>>,
}

/// A tagged AST node.
///
/// Variant names follow the source tag vocabulary (`lasgn`, `ivar`, `cdecl`,
/// `colon2`, ...) rather than generic OO names, since that vocabulary is
/// what §4.2 of the governing design document names and is what downstream
/// fixtures speak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Block(Vec<Node>),

    Lit(Literal),
    Str(String),
    True,
    False,
    Nil,
    SelfExpr,

    LVar(String),
    IVar(String),
    GVar(String),
    Const(String),
    Colon2(Box<Node>, String),
    Colon3(String),

    LAsgn(String, Box<Node>),
    IAsgn(String, Box<Node>),
    GAsgn(String, Box<Node>),
    /// `name` is the constant-owner slot resolved by [`crate::lower::constant`]:
    /// an atomic symbol, or a boxed `Colon2`/`Colon3` node.
    CDecl(Box<Node>, Box<Node>),

    Array(Vec<Node>),
    Hash(Vec<Node>),

    /// `..` / `...`; `None` endpoints stand for an absent begin/end (lowered
    /// as `nil`).
    Dot2(Option<Box<Node>>, Option<Box<Node>>),
    Dot3(Option<Box<Node>>, Option<Box<Node>>),

    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),

    If(Box<Node>, Option<Box<Node>>, Option<Box<Node>>),
    /// `subject` is `None` for subject-less `case`/`when` chains.
    Case(Option<Box<Node>>, Vec<WhenClause>, Option<Vec<Node>>),

    /// `receiver` absent means an implicit-self call. `with_block` is set by
    /// the caller (e.g. an enclosing `iter`), never by the parser.
    Call {
        receiver: Option<Box<Node>>,
        message: String,
        args: Vec<Node>,
        with_block: bool,
    },
    /// `call` must itself be a `Node::Call`; anything else is rejected with
    /// `UnexpectedIterCall`.
    Iter {
        call: Box<Node>,
        params: Vec<Param>,
        body: Vec<Node>,
    },
    Yield(Vec<Node>),

    Defn {
        name: String,
        params: Vec<Param>,
        body: Vec<Node>,
    },
    Class {
        /// The constant-owner slot for the class name (see `CDecl`).
        name: Box<Node>,
        superclass: Option<Box<Node>>,
        body: Vec<Node>,
    },

    Rescue(Rescue),

    /// Placeholder for a construct this pass does not recognize. The only
    /// variant `lower_expr` does not match exhaustively; present so adding a
    /// new parser-side tag never needs a breaking enum change here.
    Unknown(String),
}

impl Node {
    /// Short tag name, used only to build error messages.
    pub fn tag(&self) -> String {
        match self {
            Node::Block(_) => "block".into(),
            Node::Lit(_) => "lit".into(),
            Node::Str(_) => "str".into(),
            Node::True => "true".into(),
            Node::False => "false".into(),
            Node::Nil => "nil".into(),
            Node::SelfExpr => "self".into(),
            Node::LVar(_) => "lvar".into(),
            Node::IVar(_) => "ivar".into(),
            Node::GVar(_) => "gvar".into(),
            Node::Const(_) => "const".into(),
            Node::Colon2(_, _) => "colon2".into(),
            Node::Colon3(_) => "colon3".into(),
            Node::LAsgn(_, _) => "lasgn".into(),
            Node::IAsgn(_, _) => "iasgn".into(),
            Node::GAsgn(_, _) => "gasgn".into(),
            Node::CDecl(_, _) => "cdecl".into(),
            Node::Array(_) => "array".into(),
            Node::Hash(_) => "hash".into(),
            Node::Dot2(_, _) => "dot2".into(),
            Node::Dot3(_, _) => "dot3".into(),
            Node::And(_, _) => "and".into(),
            Node::Or(_, _) => "or".into(),
            Node::If(_, _, _) => "if".into(),
            Node::Case(_, _, _) => "case".into(),
            Node::Call { .. } => "call".into(),
            Node::Iter { .. } => "iter".into(),
            Node::Yield(_) => "yield".into(),
            Node::Defn { .. } => "defn".into(),
            Node::Class { .. } => "class".into(),
            Node::Rescue(_) => "rescue".into(),
            Node::Unknown(tag) => tag.clone(),
        }
    }
}
