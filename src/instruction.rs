//! The output of this pass: a flat, ordered sequence of stack-machine
//! instructions (§6 of the governing design document).
//!
//! Instructions are value objects with no identity; an instruction stream is
//! just `Vec<Instruction>`. Structured control flow is expressed with scope
//! markers (`If`/`Else`/`End`, and the named `Define*`/`BeginRescue`
//! openers) rather than jump offsets — resolving those into actual branches
//! is a downstream backend's job, not this pass's.

use serde::{Deserialize, Serialize};

/// Tags a scope-opening/closing instruction pair so `Else`/`End` can be
/// checked against the opener they close. Mirrors the five constructs in
/// the source grammar that introduce a structured region: `if`,
/// `define_method`, `define_block`, `define_class`, and `rescue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeTag {
    If,
    DefineMethod,
    DefineBlock,
    DefineClass,
    Rescue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instruction {
    PushInt(i64),
    PushFloat(f64),
    PushSymbol(String),
    /// The byte length travels with the string so a backend need not
    /// re-measure it.
    PushString(String, usize),
    PushTrue,
    PushFalse,
    PushNil,
    PushSelf,
    PushObjectClass,
    /// Consumes end, begin (in that order, begin on top); see `PushRange`
    /// emission order in `lower::expr`.
    PushRange {
        exclude_end: bool,
    },
    PushArg(usize),
    /// Materializes the full argument array.
    PushArgs,
    PushArgc(usize),

    CreateArray(usize),
    /// Payload is the number of key/value *pairs*, not raw items.
    CreateHash(usize),

    Dup,
    /// Duplicates the item sitting `depth` slots below the current top
    /// (`0` duplicates the top itself) and pushes the copy.
    DupRel(usize),
    Swap,
    Pop,

    VariableGet(String),
    VariableSet {
        name: String,
        local_only: bool,
    },
    InstanceVariableGet(String),
    InstanceVariableSet(String),
    GlobalVariableGet(String),
    GlobalVariableSet(String),
    /// Consumes the owner (pushed by the constant-owner helper) and
    /// produces the constant's value.
    ConstFind(String),
    /// Consumes value, then owner.
    ConstSet(String),

    Send {
        message: String,
        receiver_is_self: bool,
        with_block: bool,
    },
    Yield,

    If,
    Else(ScopeTag),
    End(ScopeTag),

    DefineMethod {
        name: String,
        arity: usize,
    },
    DefineBlock {
        arity: usize,
    },
    DefineClass {
        name: String,
    },

    /// Opens a `rescue` scope; closed by `End(ScopeTag::Rescue)` (§4.5.1).
    BeginRescue,
    /// Reads the exception currently being handled; valid only inside an
    /// open `rescue` scope (§4.5.1).
    PushException,
}
