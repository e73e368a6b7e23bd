//! Constant-owner resolution (§4.6): given the "name" slot of a
//! constant-defining construct (`cdecl`'s first field, or a class's name
//! field), produce the leaf name plus the instructions that push the owner
//! onto the stack.

use crate::ast::Node;
use crate::error::LowerError;
use crate::instruction::Instruction;

use super::expr::lower_expr;

/// Resolves `name_node` to `(leaf_name, prep_instructions appended to `out`)`.
///
/// - An atomic constant reference (`Node::Const`) resolves against the
///   current scope: prep is `PushSelf`.
/// - `Node::Colon2(namespace, name)` resolves under an arbitrary expression:
///   prep is that expression, lowered for its value.
/// - `Node::Colon3(name)` resolves under the root namespace: prep is
///   `PushObjectClass`.
/// - Anything else is not a valid owner slot.
pub fn resolve_owner(name_node: &Node, out: &mut Vec<Instruction>) -> Result<String, LowerError> {
    match name_node {
        Node::Const(name) => {
            out.push(Instruction::PushSelf);
            Ok(name.clone())
        }
        Node::Colon2(namespace, name) => {
            lower_expr(namespace, true, out)?;
            Ok(name.clone())
        }
        Node::Colon3(name) => {
            out.push(Instruction::PushObjectClass);
            Ok(name.clone())
        }
        other => Err(LowerError::UnknownConstantName(other.tag())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction::*;

    #[test]
    fn atomic_symbol_resolves_to_self() {
        let mut out = Vec::new();
        let leaf = resolve_owner(&Node::Const("Foo".into()), &mut out).unwrap();
        assert_eq!(leaf, "Foo");
        assert_eq!(out, vec![PushSelf]);
    }

    #[test]
    fn colon2_resolves_under_namespace_expression() {
        let mut out = Vec::new();
        let leaf = resolve_owner(
            &Node::Colon2(Box::new(Node::Const("Outer".into())), "Inner".into()),
            &mut out,
        )
        .unwrap();
        assert_eq!(leaf, "Inner");
        assert_eq!(out, vec![PushSelf, ConstFind("Outer".into())]);
    }

    #[test]
    fn colon3_resolves_under_root_namespace() {
        let mut out = Vec::new();
        let leaf = resolve_owner(&Node::Colon3("Root".into()), &mut out).unwrap();
        assert_eq!(leaf, "Root");
        assert_eq!(out, vec![PushObjectClass]);
    }

    #[test]
    fn invalid_owner_slot_is_rejected() {
        let mut out = Vec::new();
        let err = resolve_owner(&Node::Nil, &mut out).unwrap_err();
        assert!(matches!(err, LowerError::UnknownConstantName(tag) if tag == "nil"));
    }
}
