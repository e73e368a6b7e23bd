//! AST-to-instruction-sequence lowering pass ("pass 1") for a dynamic,
//! object-oriented scripting language's compiler.
//!
//! Given a parsed program ([`ast::Node`]), [`lower::lower_program`]
//! produces a flat [`instruction::Instruction`] stream ready for a
//! downstream backend. See the crate's design document for the full
//! per-construct transform catalog and the invariants this pass upholds.

pub mod ast;
pub mod debug;
pub mod error;
pub mod instruction;
pub mod lower;
pub mod validate;

pub use ast::Node;
pub use debug::DebugConfig;
pub use error::LowerError;
pub use instruction::Instruction;
pub use lower::lower_program;
