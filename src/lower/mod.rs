//! The lowering pass: AST → instruction sequence (§4 of the governing
//! design document).

pub mod args;
pub mod constant;
pub mod expr;
pub mod rescue;

pub use expr::lower_expr;

use crate::ast::Node;
use crate::debug::{dump_instructions, DebugConfig};
use crate::error::LowerError;
use crate::instruction::Instruction;
use crate::validate::validate as validate_stream;

/// Lowers a body (ordered sequence of expressions) honoring the
/// last-expression-is-used discipline (§4.4): every expression but the
/// last is lowered unused; the last inherits the body's own `used`. An
/// empty body lowers as `nil` with the inherited `used`.
pub fn lower_body(body: &[Node], used: bool, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    match body.split_last() {
        None => lower_expr(&Node::Nil, used, out),
        Some((last, init)) => {
            for node in init {
                lower_expr(node, false, out)?;
            }
            lower_expr(last, used, out)
        }
    }
}

/// Top-level entry point. The root node must be a `block`; anything else
/// is `UnexpectedRoot`. Honors `debug.dump`/`debug.validate` (§10) without
/// ever changing the emitted instructions themselves.
pub fn lower_program(
    root: &Node,
    used: bool,
    debug: &DebugConfig,
) -> Result<Vec<Instruction>, LowerError> {
    let Node::Block(body) = root else {
        return Err(LowerError::UnexpectedRoot(root.tag()));
    };

    let mut out = Vec::new();
    lower_body(body, used, &mut out)?;

    if debug.dump {
        dump_instructions(&out);
    }
    if debug.validate {
        validate_stream(&out, usize::from(used))?;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction::*;

    #[test]
    fn root_must_be_block() {
        let err = lower_program(&Node::Nil, false, &DebugConfig::none()).unwrap_err();
        assert!(matches!(err, LowerError::UnexpectedRoot(tag) if tag == "nil"));
    }

    #[test]
    fn empty_block_lowers_to_nil() {
        let out = lower_program(&Node::Block(vec![]), true, &DebugConfig::none()).unwrap();
        assert_eq!(out, vec![PushNil]);
    }

    #[test]
    fn body_drops_all_but_last_value() {
        let root = Node::Block(vec![
            Node::Lit(crate::ast::Literal::Int(1)),
            Node::Lit(crate::ast::Literal::Int(2)),
        ]);
        let out = lower_program(&root, true, &DebugConfig::none()).unwrap();
        assert_eq!(out, vec![PushInt(2)]);
    }

    #[test]
    fn validate_catches_a_malformed_stream_from_an_invalid_construct() {
        // A rescue with an invalid owner slot never reaches validate; this
        // just exercises that validate runs and succeeds end to end when
        // debug.validate is set.
        let root = Node::Block(vec![Node::Lit(crate::ast::Literal::Int(42))]);
        let out = lower_program(&root, true, &DebugConfig::verbose()).unwrap();
        assert_eq!(out, vec![PushInt(42)]);
    }
}
