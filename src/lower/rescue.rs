//! `begin`/`rescue`/`else`/`ensure` lowering (§4.5, resolved in §4.5.1).
//!
//! The region is modeled as an alternation, reusing the scope-marker
//! vocabulary already defined for `if`: `BeginRescue` opens it,
//! `Else(Rescue)` separates the normal-completion path (protected body,
//! then `else` if present) from the exceptional path (the handler
//! ladder), and `End(Rescue)` closes it. Only one of the two paths
//! actually runs at a time, so — exactly like an `if`'s then/else — both
//! must leave the same stack height; `validate` checks this the same way
//! it checks `if`. `ensure`, which always runs regardless of which path
//! was taken, sits outside the region entirely, appended after
//! `End(Rescue)` with `used = false`.

use crate::ast::{Node, Rescue, RescueClause};
use crate::error::LowerError;
use crate::instruction::{Instruction, ScopeTag};

use super::expr::lower_expr;

pub fn lower_rescue(r: &Rescue, used: bool, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    out.push(Instruction::BeginRescue);

    // Normal-completion path: the protected body, then `else` if present.
    // When an `else` clause exists it, not the body, produces the
    // region's value (§4.5.1).
    let body_used = if r.else_body.is_some() { false } else { used };
    super::lower_body(&r.body, body_used, out)?;
    if let Some(else_body) = &r.else_body {
        super::lower_body(else_body, used, out)?;
    }

    out.push(Instruction::Else(ScopeTag::Rescue));

    // Exceptional path: the handler ladder, tried in source order.
    lower_clause_ladder(&r.clauses, used, out)?;

    out.push(Instruction::End(ScopeTag::Rescue));

    if let Some(ensure_body) = &r.ensure_body {
        super::lower_body(ensure_body, false, out)?;
    }

    Ok(())
}

/// Nested `If`/`Else(if)`/`End(if)` ladder over the handler clauses,
/// structurally identical to `lower_case_without_subject`. The final
/// "nothing matched" branch lowers as `PushNil` under `used`; a real
/// backend re-raises here rather than swallowing the exception.
fn lower_clause_ladder(
    clauses: &[RescueClause],
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    let Some((clause, rest)) = clauses.split_first() else {
        if used {
            out.push(Instruction::PushNil);
        }
        return Ok(());
    };

    lower_handler_test(&clause.exception_classes, out)?;
    out.push(Instruction::If);
    if let Some(var) = &clause.var_name {
        out.push(Instruction::PushException);
        out.push(Instruction::VariableSet { name: var.clone(), local_only: false });
    }
    super::lower_body(&clause.body, used, out)?;
    out.push(Instruction::Else(ScopeTag::If));
    lower_clause_ladder(rest, used, out)?;
    out.push(Instruction::End(ScopeTag::If));
    Ok(())
}

/// `classes.any? { |c| c === current_exception }`, short-circuited
/// right-to-left exactly like the `or` transform. An empty class list (a
/// bare `rescue`) always matches.
fn lower_handler_test(classes: &[Node], out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    let Some((first, rest)) = classes.split_first() else {
        out.push(Instruction::PushTrue);
        return Ok(());
    };
    emit_exception_eq(first, out)?;
    if rest.is_empty() {
        return Ok(());
    }
    out.push(Instruction::Dup);
    out.push(Instruction::If);
    out.push(Instruction::Else(ScopeTag::If));
    out.push(Instruction::Pop);
    lower_handler_test(rest, out)?;
    out.push(Instruction::End(ScopeTag::If));
    Ok(())
}

/// `class === current_exception`. Unlike `case`'s scrutinee, the current
/// exception needs no retention trick across options: `PushException` is
/// a plain read, repeatable for every class tested.
fn emit_exception_eq(class_node: &Node, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    out.push(Instruction::PushException);
    out.push(Instruction::PushArgc(1));
    lower_expr(class_node, true, out)?;
    out.push(Instruction::Send {
        message: "===".to_string(),
        receiver_is_self: false,
        with_block: false,
    });
    Ok(())
}
