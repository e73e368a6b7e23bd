//! Per-tag transforms (§4.2). Each function lowers one AST construct,
//! honoring the `used` flag discipline described in §3.

use crate::ast::{Literal, Node, WhenClause};
use crate::error::LowerError;
use crate::instruction::{Instruction, ScopeTag};

use super::{args, constant, rescue};

/// Lowers `node`, dispatching on its tag. Pure producers emit nothing at
/// all when `used` is false; everything else evaluates for effect and
/// appends a trailing `Pop` when the result is unused.
pub fn lower_expr(node: &Node, used: bool, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    match node {
        Node::Block(body) => super::lower_body(body, used, out),

        Node::Lit(lit) => lower_lit(lit, used, out),
        Node::Str(s) => {
            if used {
                out.push(Instruction::PushString(s.clone(), s.len()));
            }
            Ok(())
        }
        Node::True => {
            if used {
                out.push(Instruction::PushTrue);
            }
            Ok(())
        }
        Node::False => {
            if used {
                out.push(Instruction::PushFalse);
            }
            Ok(())
        }
        Node::Nil => {
            if used {
                out.push(Instruction::PushNil);
            }
            Ok(())
        }
        Node::SelfExpr => {
            if used {
                out.push(Instruction::PushSelf);
            }
            Ok(())
        }
        Node::LVar(name) => {
            if used {
                out.push(Instruction::VariableGet(name.clone()));
            }
            Ok(())
        }
        Node::IVar(name) => {
            if used {
                out.push(Instruction::InstanceVariableGet(name.clone()));
            }
            Ok(())
        }
        Node::GVar(name) => {
            if used {
                out.push(Instruction::GlobalVariableGet(name.clone()));
            }
            Ok(())
        }
        Node::Const(name) => {
            if used {
                out.push(Instruction::PushSelf);
                out.push(Instruction::ConstFind(name.clone()));
            }
            Ok(())
        }
        Node::Colon2(namespace, name) => {
            if used {
                lower_expr(namespace, true, out)?;
                out.push(Instruction::ConstFind(name.clone()));
            }
            Ok(())
        }
        Node::Colon3(name) => {
            if used {
                out.push(Instruction::PushObjectClass);
                out.push(Instruction::ConstFind(name.clone()));
            }
            Ok(())
        }

        Node::LAsgn(name, value) => {
            lower_expr(value, true, out)?;
            out.push(Instruction::VariableSet {
                name: name.clone(),
                local_only: false,
            });
            if used {
                out.push(Instruction::VariableGet(name.clone()));
            }
            Ok(())
        }
        Node::IAsgn(name, value) => {
            lower_expr(value, true, out)?;
            out.push(Instruction::InstanceVariableSet(name.clone()));
            if used {
                out.push(Instruction::InstanceVariableGet(name.clone()));
            }
            Ok(())
        }
        Node::GAsgn(name, value) => {
            lower_expr(value, true, out)?;
            out.push(Instruction::GlobalVariableSet(name.clone()));
            if used {
                out.push(Instruction::GlobalVariableGet(name.clone()));
            }
            Ok(())
        }
        Node::CDecl(name_slot, value) => {
            lower_expr(value, true, out)?;
            let leaf = constant::resolve_owner(name_slot, out)?;
            out.push(Instruction::ConstSet(leaf.clone()));
            // A constant declaration's value behaves like any other
            // assignment's: re-resolving the owner to read it back is
            // cheap and, per §4.2, constant-owner expressions are treated
            // as pure (see the Const/Colon2/Colon3 producers above), so
            // re-evaluating it here is not a double side effect in practice.
            if used {
                constant::resolve_owner(name_slot, out)?;
                out.push(Instruction::ConstFind(leaf));
            }
            Ok(())
        }

        Node::Array(items) => {
            for item in items {
                lower_expr(item, true, out)?;
            }
            out.push(Instruction::CreateArray(items.len()));
            if !used {
                out.push(Instruction::Pop);
            }
            Ok(())
        }
        Node::Hash(items) => {
            if items.len() % 2 != 0 {
                return Err(LowerError::OddHashItems);
            }
            for item in items {
                lower_expr(item, true, out)?;
            }
            out.push(Instruction::CreateHash(items.len() / 2));
            if !used {
                out.push(Instruction::Pop);
            }
            Ok(())
        }

        Node::Dot2(begin, end) => lower_range(begin, end, false, used, out),
        Node::Dot3(begin, end) => lower_range(begin, end, true, used, out),

        Node::And(lhs, rhs) => {
            // rhs always lowers `used = true`: the then-branch (Pop, rhs)
            // and the else-branch (lhs left in place) must leave the same
            // stack height for the If/Else/End to balance; a trailing Pop
            // discards the result when the whole expression is unused.
            lower_expr(lhs, true, out)?;
            out.push(Instruction::Dup);
            out.push(Instruction::If);
            out.push(Instruction::Pop);
            lower_expr(rhs, true, out)?;
            out.push(Instruction::Else(ScopeTag::If));
            out.push(Instruction::End(ScopeTag::If));
            if !used {
                out.push(Instruction::Pop);
            }
            Ok(())
        }
        Node::Or(lhs, rhs) => {
            lower_expr(lhs, true, out)?;
            out.push(Instruction::Dup);
            out.push(Instruction::If);
            out.push(Instruction::Else(ScopeTag::If));
            out.push(Instruction::Pop);
            lower_expr(rhs, true, out)?;
            out.push(Instruction::End(ScopeTag::If));
            if !used {
                out.push(Instruction::Pop);
            }
            Ok(())
        }

        Node::If(cond, then_branch, else_branch) => {
            lower_expr(cond, true, out)?;
            out.push(Instruction::If);
            lower_branch(then_branch.as_deref(), used, out)?;
            out.push(Instruction::Else(ScopeTag::If));
            lower_branch(else_branch.as_deref(), used, out)?;
            out.push(Instruction::End(ScopeTag::If));
            Ok(())
        }
        Node::Case(subject, whens, else_body) => lower_case(subject, whens, else_body, used, out),

        Node::Call { receiver, message, args: call_args, with_block } => {
            lower_call(receiver.as_deref(), message, call_args, *with_block, used, out)
        }
        Node::Iter { call, params, body } => lower_iter(call, params, body, used, out),
        Node::Yield(call_args) => {
            for a in call_args {
                lower_expr(a, true, out)?;
            }
            out.push(Instruction::PushArgc(call_args.len()));
            out.push(Instruction::Yield);
            if !used {
                out.push(Instruction::Pop);
            }
            Ok(())
        }

        Node::Defn { name, params, body } => {
            out.push(Instruction::DefineMethod {
                name: name.clone(),
                arity: params.len(),
            });
            args::lower_formals(params, true, out)?;
            super::lower_body(body, true, out)?;
            out.push(Instruction::End(ScopeTag::DefineMethod));
            Ok(())
        }
        Node::Class { name, superclass, body } => {
            match superclass {
                Some(sc) => lower_expr(sc, true, out)?,
                None => out.push(Instruction::PushObjectClass),
            }
            let leaf = constant::resolve_owner(name, out)?;
            out.push(Instruction::DefineClass { name: leaf });
            super::lower_body(body, true, out)?;
            out.push(Instruction::End(ScopeTag::DefineClass));
            Ok(())
        }

        Node::Rescue(r) => rescue::lower_rescue(r, used, out),

        Node::Unknown(tag) => Err(LowerError::UnknownConstruct(tag.clone())),
    }
}

fn lower_lit(lit: &Literal, used: bool, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    if !used {
        return Ok(());
    }
    match lit {
        Literal::Int(n) => out.push(Instruction::PushInt(*n)),
        Literal::Float(f) => out.push(Instruction::PushFloat(f.0)),
        Literal::Symbol(s) => out.push(Instruction::PushSymbol(s.clone())),
        Literal::Range { begin, end, exclude_end } => {
            lower_expr(end, true, out)?;
            lower_expr(begin, true, out)?;
            out.push(Instruction::PushRange { exclude_end: *exclude_end });
        }
    }
    Ok(())
}

fn lower_range(
    begin: &Option<Box<Node>>,
    end: &Option<Box<Node>>,
    exclude_end: bool,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    lower_endpoint(end, used, out)?;
    lower_endpoint(begin, used, out)?;
    if used {
        out.push(Instruction::PushRange { exclude_end });
    }
    Ok(())
}

fn lower_endpoint(
    endpoint: &Option<Box<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    match endpoint {
        Some(node) => lower_expr(node, used, out),
        None => lower_expr(&Node::Nil, used, out),
    }
}

/// Lowers an optional `if`/`case`/rescue-clause branch; a missing branch
/// lowers as `nil`.
fn lower_branch(
    branch: Option<&Node>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    match branch {
        Some(node) => lower_expr(node, used, out),
        None => lower_expr(&Node::Nil, used, out),
    }
}

fn lower_call(
    receiver: Option<&Node>,
    message: &str,
    call_args: &[Node],
    with_block: bool,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    for a in call_args {
        lower_expr(a, true, out)?;
    }
    out.push(Instruction::PushArgc(call_args.len()));
    let receiver_is_self = receiver.is_none();
    match receiver {
        Some(r) => lower_expr(r, true, out)?,
        None => out.push(Instruction::PushSelf),
    }
    out.push(Instruction::Send {
        message: message.to_string(),
        receiver_is_self,
        with_block,
    });
    if !used {
        out.push(Instruction::Pop);
    }
    Ok(())
}

fn lower_iter(
    call: &Node,
    params: &[crate::ast::Param],
    body: &[Node],
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    let Node::Call { receiver, message, args: call_args, .. } = call else {
        return Err(LowerError::UnexpectedIterCall(call.tag()));
    };

    out.push(Instruction::DefineBlock { arity: params.len() });
    args::lower_formals(params, true, out)?;
    super::lower_body(body, true, out)?;
    out.push(Instruction::End(ScopeTag::DefineBlock));

    lower_call(receiver.as_deref(), message, call_args, true, used, out)
}

/// Lowers a `case` node, with or without a subject (§4.2).
fn lower_case(
    subject: &Option<Box<Node>>,
    whens: &[WhenClause],
    else_body: &Option<Vec<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    match subject {
        Some(subject) => lower_case_with_subject(subject, whens, else_body, used, out),
        None => lower_case_without_subject(whens, else_body, used, out),
    }
}

fn lower_case_with_subject(
    subject: &Node,
    whens: &[WhenClause],
    else_body: &Option<Vec<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    if whens.is_empty() {
        return lower_body_or_nil(else_body, used, out);
    }

    lower_expr(subject, true, out)?;
    lower_when_ladder(whens, else_body, used, out)?;
    // Discard the scrutinee that's been sitting beneath the ladder's result.
    out.push(Instruction::Swap);
    out.push(Instruction::Pop);
    Ok(())
}

/// Emits the nested `when`-option/body ladder. On entry the scrutinee sits
/// on top of the stack; on exit it sits one below the ladder's result.
fn lower_when_ladder(
    whens: &[WhenClause],
    else_body: &Option<Vec<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    let Some((when, rest)) = whens.split_first() else {
        return lower_body_or_nil(else_body, used, out);
    };

    lower_when_option_test(&when.options, out)?;
    out.push(Instruction::If);
    lower_body_or_nil(&Some(when.body.clone()), used, out)?;
    out.push(Instruction::Else(ScopeTag::If));
    lower_when_ladder(rest, else_body, used, out)?;
    out.push(Instruction::End(ScopeTag::If));
    Ok(())
}

/// `options.any? { |opt| opt === scrutinee }`, short-circuited, leaving the
/// scrutinee intact two slots below the boolean result.
fn lower_when_option_test(options: &[Node], out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    let Some((first, rest)) = options.split_first() else {
        out.push(Instruction::PushFalse);
        return Ok(());
    };
    emit_case_eq(first, out)?;
    if rest.is_empty() {
        return Ok(());
    }
    out.push(Instruction::Dup);
    out.push(Instruction::If);
    out.push(Instruction::Else(ScopeTag::If));
    out.push(Instruction::Pop);
    lower_when_option_test(rest, out)?;
    out.push(Instruction::End(ScopeTag::If));
    Ok(())
}

/// `option === scrutinee`, where the scrutinee sits two slots below the
/// top (`DupRel(2)`) so it survives for the next option/ladder branch.
fn emit_case_eq(option: &Node, out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    lower_expr(option, true, out)?;
    out.push(Instruction::PushArgc(1));
    out.push(Instruction::DupRel(2));
    out.push(Instruction::Send {
        message: "===".to_string(),
        receiver_is_self: false,
        with_block: false,
    });
    Ok(())
}

fn lower_case_without_subject(
    whens: &[WhenClause],
    else_body: &Option<Vec<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    let Some((when, rest)) = whens.split_first() else {
        return lower_body_or_nil(else_body, used, out);
    };

    let test = fold_options_or(&when.options);
    lower_expr(&test, true, out)?;
    out.push(Instruction::If);
    lower_body_or_nil(&Some(when.body.clone()), used, out)?;
    out.push(Instruction::Else(ScopeTag::If));
    lower_case_without_subject(rest, else_body, used, out)?;
    out.push(Instruction::End(ScopeTag::If));
    Ok(())
}

/// Right-folds a `when`'s options array into a nested `or` expression.
fn fold_options_or(options: &[Node]) -> Node {
    match options.split_first() {
        None => Node::False,
        Some((first, [])) => first.clone(),
        Some((first, rest)) => Node::Or(Box::new(first.clone()), Box::new(fold_options_or(rest))),
    }
}

fn lower_body_or_nil(
    body: &Option<Vec<Node>>,
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    match body {
        Some(body) => super::lower_body(body, used, out),
        None => lower_expr(&Node::Nil, used, out),
    }
}
