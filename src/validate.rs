//! Executable form of invariants 1 and 2 from the governing design document:
//! stack-effect soundness and scope balance.
//!
//! This works in two passes. First, the flat instruction stream is parsed
//! into a small tree ([`Node`]) that makes branching explicit: an `If`
//! becomes one node holding its then- and else-bodies, rather than three
//! flat markers a linear walk would otherwise have to thread through. Then
//! the tree is simulated: a then/else pair is checked independently from
//! the *same* starting height and must arrive at the *same* resulting
//! height (only one of them runs at execution time; a linear
//! instruction-by-instruction walk that just accumulated through both in
//! sequence would both double-count their effects and miss genuine
//! mismatches). `DefineMethod`/`DefineBlock`/`DefineClass` bodies are not
//! executed inline at the point they're defined — they're captured as a
//! separate code object invoked later — so each is simulated as its own
//! independent frame (starting at height 0, required to end at exactly 1,
//! since method/block bodies are always lowered `used = true`, §4.2)
//! rather than folded into the surrounding frame's running height.
//!
//! Exercised by this crate's own tests (every end-to-end fixture is
//! round-tripped through `validate`) and exported for downstream consumers
//! (a backend, or a fuzzer) that want to assert a stream is well-formed
//! before consuming it.

use thiserror::Error;

use crate::instruction::{Instruction, ScopeTag};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("instruction {index} ({instruction}) needs {needed} value(s) on the stack, found {have}")]
    Underflow {
        index: usize,
        instruction: String,
        needed: usize,
        have: usize,
    },
    #[error("instruction {index}: `Else`/`End` with no matching open scope")]
    UnmatchedClose { index: usize },
    #[error("instruction {index}: scope tag mismatch, expected {expected:?}, found {found:?}")]
    ScopeMismatch {
        index: usize,
        expected: ScopeTag,
        found: ScopeTag,
    },
    #[error("instruction {index}: `Send`/`Yield` with no preceding `PushArgc`")]
    MissingArgc { index: usize },
    #[error("instruction {index}: `PushException` outside an open rescue scope")]
    ExceptionOutsideRescue { index: usize },
    #[error("{open} scope(s) left unclosed at end of stream")]
    UnclosedScope { open: usize },
    #[error("stream ends with stack height {actual}, expected {expected}")]
    WrongFinalHeight { expected: usize, actual: usize },
    #[error("instruction {index}: method/block body must leave exactly one value, left {actual}")]
    WrongBodyHeight { index: usize, actual: usize },
    #[error("instruction {index}: `if` branches disagree on resulting stack height ({then_height} vs {else_height})")]
    BranchHeightMismatch {
        index: usize,
        then_height: usize,
        else_height: usize,
    },
}

/// Validates `instructions`, asserting the stream leaves exactly
/// `expected_final_height` values on the stack (0 or 1, matching the
/// `used` flag that produced it).
pub fn validate(
    instructions: &[Instruction],
    expected_final_height: usize,
) -> Result<(), ValidationError> {
    let (tree, end) = parse_block(instructions, 0, None)?;
    debug_assert_eq!(end, instructions.len());
    let height = simulate(&tree, 0, false)?;
    if height != expected_final_height {
        return Err(ValidationError::WrongFinalHeight {
            expected: expected_final_height,
            actual: height,
        });
    }
    Ok(())
}

/// One node of the parsed tree.
enum Node<'a> {
    Inst(usize, &'a Instruction),
    If {
        index: usize,
        then_body: Vec<Node<'a>>,
        else_body: Vec<Node<'a>>,
    },
    Rescue {
        index: usize,
        normal_body: Vec<Node<'a>>,
        handler_body: Vec<Node<'a>>,
    },
    Define {
        index: usize,
        tag: ScopeTag,
        consumes: usize,
        body: Vec<Node<'a>>,
    },
}

/// Parses a sequential block starting at `instructions[start]`. `closing`
/// is `Some(tag)` when this block is the body of a `Define*`/`If`/`Else`/
/// `Rescue` construct and must stop at the matching closer (consumed by
/// the caller, not here); `None` for the top level, which must run off the
/// end of `instructions`.
fn parse_block<'a>(
    instructions: &'a [Instruction],
    start: usize,
    closing: Option<Closer>,
) -> Result<(Vec<Node<'a>>, usize), ValidationError> {
    let mut nodes = Vec::new();
    let mut i = start;

    loop {
        if instructions.get(i).is_none() {
            if closing.is_some() {
                return Err(ValidationError::UnclosedScope { open: 1 });
            }
            return Ok((nodes, i));
        }
        if let Some(stop) = &closing {
            if stop.matches(&instructions[i]) {
                return Ok((nodes, i));
            }
        }

        match &instructions[i] {
            Instruction::If => {
                let (then_body, next) = parse_block(instructions, i + 1, Some(Closer::Else))?;
                let Some(Instruction::Else(tag)) = instructions.get(next) else {
                    return Err(ValidationError::UnmatchedClose { index: i });
                };
                if *tag != ScopeTag::If {
                    return Err(ValidationError::ScopeMismatch {
                        index: next,
                        expected: ScopeTag::If,
                        found: *tag,
                    });
                }
                let (else_body, next2) =
                    parse_block(instructions, next + 1, Some(Closer::End(ScopeTag::If)))?;
                nodes.push(Node::If { index: i, then_body, else_body });
                i = next2 + 1;
            }
            Instruction::BeginRescue => {
                // The normal-completion path (protected body, then `else`
                // if present) and the handler ladder are alternatives —
                // only one runs at execution time — so they're parsed and
                // later simulated exactly like an `if`'s then/else.
                let (normal_body, next) = parse_block(instructions, i + 1, Some(Closer::Else))?;
                let Some(Instruction::Else(tag)) = instructions.get(next) else {
                    return Err(ValidationError::UnmatchedClose { index: i });
                };
                if *tag != ScopeTag::Rescue {
                    return Err(ValidationError::ScopeMismatch {
                        index: next,
                        expected: ScopeTag::Rescue,
                        found: *tag,
                    });
                }
                let (handler_body, next2) =
                    parse_block(instructions, next + 1, Some(Closer::End(ScopeTag::Rescue)))?;
                nodes.push(Node::Rescue { index: i, normal_body, handler_body });
                i = next2 + 1;
            }
            Instruction::DefineMethod { .. } => {
                let (body, next) =
                    parse_block(instructions, i + 1, Some(Closer::End(ScopeTag::DefineMethod)))?;
                nodes.push(Node::Define { index: i, tag: ScopeTag::DefineMethod, consumes: 0, body });
                i = next + 1;
            }
            Instruction::DefineBlock { .. } => {
                let (body, next) =
                    parse_block(instructions, i + 1, Some(Closer::End(ScopeTag::DefineBlock)))?;
                nodes.push(Node::Define { index: i, tag: ScopeTag::DefineBlock, consumes: 0, body });
                i = next + 1;
            }
            Instruction::DefineClass { .. } => {
                let (body, next) =
                    parse_block(instructions, i + 1, Some(Closer::End(ScopeTag::DefineClass)))?;
                nodes.push(Node::Define { index: i, tag: ScopeTag::DefineClass, consumes: 2, body });
                i = next + 1;
            }
            Instruction::Else(_) | Instruction::End(_) => {
                // Reached a closer that doesn't match what this block is
                // waiting for (wrong tag, or no open scope at all).
                return Err(ValidationError::UnmatchedClose { index: i });
            }
            other => {
                nodes.push(Node::Inst(i, other));
                i += 1;
            }
        }
    }
}

enum Closer {
    Else,
    End(ScopeTag),
}

impl Closer {
    fn matches(&self, inst: &Instruction) -> bool {
        match (self, inst) {
            (Closer::Else, Instruction::Else(_)) => true,
            (Closer::End(tag), Instruction::End(found)) => tag == found,
            _ => false,
        }
    }
}

/// Simulates a parsed block starting from `height`, returning the
/// resulting height. `in_rescue` allows `PushException`; it resets to
/// `false` when entering a `Define*` body, since exception visibility does
/// not cross a method/block boundary.
fn simulate(nodes: &[Node], mut height: usize, in_rescue: bool) -> Result<usize, ValidationError> {
    let mut pending_argc: Option<usize> = None;

    for node in nodes {
        match node {
            Node::Inst(index, inst) => {
                apply(*index, inst, &mut height, &mut pending_argc, in_rescue)?;
            }
            Node::If { index, then_body, else_body } => {
                if height < 1 {
                    return Err(ValidationError::Underflow {
                        index: *index,
                        instruction: "If".to_string(),
                        needed: 1,
                        have: height,
                    });
                }
                let branch_height = height - 1;
                let then_height = simulate(then_body, branch_height, in_rescue)?;
                let else_height = simulate(else_body, branch_height, in_rescue)?;
                if then_height != else_height {
                    return Err(ValidationError::BranchHeightMismatch {
                        index: *index,
                        then_height,
                        else_height,
                    });
                }
                height = then_height;
            }
            Node::Rescue { index, normal_body, handler_body } => {
                // `BeginRescue` itself consumes nothing (0 -> 0); both
                // paths start from the same height and must agree.
                let normal_height = simulate(normal_body, height, true)?;
                let handler_height = simulate(handler_body, height, true)?;
                if normal_height != handler_height {
                    return Err(ValidationError::BranchHeightMismatch {
                        index: *index,
                        then_height: normal_height,
                        else_height: handler_height,
                    });
                }
                height = normal_height;
            }
            Node::Define { index, tag: _, consumes, body } => {
                if height < *consumes {
                    return Err(ValidationError::Underflow {
                        index: *index,
                        instruction: "DefineClass".to_string(),
                        needed: *consumes,
                        have: height,
                    });
                }
                height -= consumes;
                let inner = simulate(body, 0, false)?;
                if inner != 1 {
                    return Err(ValidationError::WrongBodyHeight { index: *index, actual: inner });
                }
            }
        }
    }

    Ok(height)
}

fn apply(
    index: usize,
    inst: &Instruction,
    height: &mut usize,
    pending_argc: &mut Option<usize>,
    in_rescue: bool,
) -> Result<(), ValidationError> {
    let mut pop = |n: usize, height: &mut usize| -> Result<(), ValidationError> {
        if *height < n {
            return Err(ValidationError::Underflow {
                index,
                instruction: format!("{inst:?}"),
                needed: n,
                have: *height,
            });
        }
        *height -= n;
        Ok(())
    };

    match inst {
        Instruction::PushInt(_)
        | Instruction::PushFloat(_)
        | Instruction::PushSymbol(_)
        | Instruction::PushString(_, _)
        | Instruction::PushTrue
        | Instruction::PushFalse
        | Instruction::PushNil
        | Instruction::PushSelf
        | Instruction::PushObjectClass
        | Instruction::PushArg(_)
        | Instruction::PushArgs
        | Instruction::VariableGet(_)
        | Instruction::InstanceVariableGet(_)
        | Instruction::GlobalVariableGet(_) => *height += 1,

        Instruction::PushException => {
            if !in_rescue {
                return Err(ValidationError::ExceptionOutsideRescue { index });
            }
            *height += 1;
        }

        Instruction::PushArgc(n) => {
            *height += 1;
            *pending_argc = Some(*n);
        }

        Instruction::PushRange { .. } => {
            pop(2, height)?;
            *height += 1;
        }

        Instruction::CreateArray(n) => {
            pop(*n, height)?;
            *height += 1;
        }
        Instruction::CreateHash(pairs) => {
            pop(pairs * 2, height)?;
            *height += 1;
        }

        Instruction::Dup => {
            pop(1, height)?;
            *height += 2;
        }
        Instruction::DupRel(depth) => {
            pop(*depth + 1, height)?;
            *height += *depth + 2;
        }
        Instruction::Swap => {
            pop(2, height)?;
            *height += 2;
        }
        Instruction::Pop => pop(1, height)?,

        Instruction::VariableSet { .. }
        | Instruction::InstanceVariableSet(_)
        | Instruction::GlobalVariableSet(_) => pop(1, height)?,

        Instruction::ConstFind(_) => {
            pop(1, height)?;
            *height += 1;
        }
        Instruction::ConstSet(_) => pop(2, height)?,

        Instruction::Send { .. } => {
            let Some(argc) = pending_argc.take() else {
                return Err(ValidationError::MissingArgc { index });
            };
            pop(argc + 2, height)?;
            *height += 1;
        }
        Instruction::Yield => {
            let Some(argc) = pending_argc.take() else {
                return Err(ValidationError::MissingArgc { index });
            };
            pop(argc + 1, height)?;
            *height += 1;
        }

        // Structural instructions are consumed by `parse_block` and never
        // appear as a flat `Node::Inst`.
        Instruction::If
        | Instruction::Else(_)
        | Instruction::End(_)
        | Instruction::BeginRescue
        | Instruction::DefineMethod { .. }
        | Instruction::DefineBlock { .. }
        | Instruction::DefineClass { .. } => unreachable!("structural instruction reached apply()"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction::*;

    #[test]
    fn empty_stream_matches_zero_height() {
        assert_eq!(validate(&[], 0), Ok(()));
    }

    #[test]
    fn single_push_matches_height_one() {
        assert_eq!(validate(&[PushInt(1)], 1), Ok(()));
    }

    #[test]
    fn underflow_on_bare_pop() {
        assert!(matches!(
            validate(&[Pop], 0),
            Err(ValidationError::Underflow { .. })
        ));
    }

    #[test]
    fn unmatched_end_without_open_scope() {
        assert!(matches!(
            validate(&[End(ScopeTag::If)], 0),
            Err(ValidationError::UnmatchedClose { .. })
        ));
    }

    #[test]
    fn balanced_if_else() {
        let stream = vec![
            PushTrue,
            If,
            PushInt(1),
            Else(ScopeTag::If),
            PushInt(2),
            End(ScopeTag::If),
        ];
        assert_eq!(validate(&stream, 1), Ok(()));
    }

    #[test]
    fn if_branches_must_agree_on_height() {
        let stream = vec![
            PushTrue,
            If,
            PushInt(1),
            Else(ScopeTag::If),
            // else-branch leaves nothing: heights disagree (1 vs 0)
            End(ScopeTag::If),
        ];
        assert!(matches!(
            validate(&stream, 1),
            Err(ValidationError::BranchHeightMismatch { .. })
        ));
    }

    #[test]
    fn send_without_argc_is_rejected() {
        let stream = vec![
            PushSelf,
            Send {
                message: "puts".into(),
                receiver_is_self: true,
                with_block: false,
            },
        ];
        assert!(matches!(
            validate(&stream, 1),
            Err(ValidationError::MissingArgc { .. })
        ));
    }

    #[test]
    fn send_consumes_args_argc_and_receiver() {
        let stream = vec![
            PushString("hi".into(), 2),
            PushArgc(1),
            PushSelf,
            Send {
                message: "puts".into(),
                receiver_is_self: true,
                with_block: false,
            },
        ];
        assert_eq!(validate(&stream, 1), Ok(()));
    }

    #[test]
    fn push_exception_outside_rescue_is_rejected() {
        assert!(matches!(
            validate(&[PushException], 1),
            Err(ValidationError::ExceptionOutsideRescue { .. })
        ));
    }

    #[test]
    fn push_exception_inside_rescue_is_allowed() {
        let stream = vec![
            BeginRescue,
            Else(ScopeTag::Rescue),
            PushException,
            Pop,
            End(ScopeTag::Rescue),
        ];
        assert_eq!(validate(&stream, 0), Ok(()));
    }

    #[test]
    fn wrong_final_height_is_reported() {
        assert!(matches!(
            validate(&[PushInt(1)], 0),
            Err(ValidationError::WrongFinalHeight { .. })
        ));
    }

    #[test]
    fn define_method_body_is_validated_as_its_own_frame() {
        let stream = vec![
            DefineMethod { name: "f".into(), arity: 0 },
            PushNil,
            End(ScopeTag::DefineMethod),
        ];
        assert_eq!(validate(&stream, 0), Ok(()));
    }

    #[test]
    fn define_method_body_must_leave_exactly_one_value() {
        let stream = vec![
            DefineMethod { name: "f".into(), arity: 0 },
            End(ScopeTag::DefineMethod),
        ];
        assert!(matches!(
            validate(&stream, 0),
            Err(ValidationError::WrongBodyHeight { .. })
        ));
    }

    #[test]
    fn define_class_consumes_superclass_and_owner_from_outer_frame() {
        let stream = vec![
            PushObjectClass,
            PushSelf,
            DefineClass { name: "Foo".into() },
            PushNil,
            End(ScopeTag::DefineClass),
        ];
        assert_eq!(validate(&stream, 0), Ok(()));
    }

    #[test]
    fn exception_visibility_does_not_cross_a_method_boundary() {
        let stream = vec![
            BeginRescue,
            DefineMethod { name: "f".into(), arity: 0 },
            PushException,
            End(ScopeTag::DefineMethod),
            Else(ScopeTag::Rescue),
            PushNil,
            End(ScopeTag::Rescue),
        ];
        assert!(matches!(
            validate(&stream, 0),
            Err(ValidationError::ExceptionOutsideRescue { .. })
        ));
    }

    #[test]
    fn nested_if_inside_a_branch_is_fully_parsed() {
        let stream = vec![
            PushTrue,
            If,
            PushTrue,
            If,
            PushInt(1),
            Else(ScopeTag::If),
            PushInt(2),
            End(ScopeTag::If),
            Else(ScopeTag::If),
            PushInt(3),
            End(ScopeTag::If),
        ];
        assert_eq!(validate(&stream, 1), Ok(()));
    }

    #[test]
    fn rescue_paths_must_agree_on_height() {
        let stream = vec![
            BeginRescue,
            PushInt(1),
            Else(ScopeTag::Rescue),
            // handler leaves nothing: disagrees with the normal path's 1
            End(ScopeTag::Rescue),
        ];
        assert!(matches!(
            validate(&stream, 1),
            Err(ValidationError::BranchHeightMismatch { .. })
        ));
    }

    #[test]
    fn balanced_rescue_region() {
        let stream = vec![
            BeginRescue,
            PushInt(1),
            Else(ScopeTag::Rescue),
            PushException,
            Pop,
            PushInt(2),
            End(ScopeTag::Rescue),
        ];
        assert_eq!(validate(&stream, 1), Ok(()));
    }
}
