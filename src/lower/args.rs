//! Formal-parameter (argument list) lowering (§4.3, resolved in §4.3.1).
//!
//! A parameter list is "simple" when every parameter is a bare required
//! name; anything else (splat, optional default, nested destructure) is
//! "complex" and goes through [`bind_params`], which materializes the
//! argument array once and binds every parameter against it using the
//! existing `Send`/`PushRange` machinery rather than inventing new
//! indexing instructions.

use crate::ast::{Node, Param};
use crate::error::LowerError;
use crate::instruction::{Instruction, ScopeTag};

use super::expr::lower_expr;

fn is_simple(params: &[Param]) -> bool {
    params.iter().all(|p| matches!(p, Param::Required(_)))
}

/// Lowers a formal parameter list. `used = false` emits nothing — callers
/// with no parameters to bind, or that don't want binding code at all,
/// skip this entirely.
pub fn lower_formals(
    params: &[Param],
    used: bool,
    out: &mut Vec<Instruction>,
) -> Result<(), LowerError> {
    if !used {
        return Ok(());
    }
    if is_simple(params) {
        for (i, param) in params.iter().enumerate() {
            let Param::Required(name) = param else {
                unreachable!("is_simple guarantees every parameter is Required");
            };
            out.push(Instruction::PushArg(i));
            out.push(Instruction::VariableSet {
                name: name.clone(),
                local_only: true,
            });
        }
        Ok(())
    } else {
        out.push(Instruction::PushArgs);
        bind_params(params, out)
    }
}

/// Binds `params` against the array value sitting on top of the stack.
/// Consumes it (net stack effect 0) regardless of how many parameters are
/// bound, recursing for nested destructure groups.
fn bind_params(params: &[Param], out: &mut Vec<Instruction>) -> Result<(), LowerError> {
    let splat_idx = params.iter().position(|p| matches!(p, Param::Splat(_)));

    for (i, param) in params.iter().enumerate() {
        let negative_from_splat = splat_idx.is_some_and(|s| i > s);
        match param {
            Param::Required(name) => {
                let index = index_for(i, params.len(), negative_from_splat);
                extract_index(index, out);
                out.push(Instruction::VariableSet {
                    name: name.clone(),
                    local_only: true,
                });
            }
            Param::Optional(name, default) => {
                let index = index_for(i, params.len(), negative_from_splat);
                extract_index(index, out);
                out.push(Instruction::Dup);
                out.push(Instruction::If);
                out.push(Instruction::Else(ScopeTag::If));
                out.push(Instruction::Pop);
                lower_expr(default, true, out)?;
                out.push(Instruction::End(ScopeTag::If));
                out.push(Instruction::VariableSet {
                    name: name.clone(),
                    local_only: true,
                });
            }
            Param::Splat(name) => {
                let trailing = params.len() - i - 1;
                extract_range(i as i64, -(trailing as i64 + 1), out);
                match name {
                    Some(name) => out.push(Instruction::VariableSet {
                        name: name.clone(),
                        local_only: true,
                    }),
                    None => out.push(Instruction::Pop),
                }
            }
            Param::Nested(sub) => {
                let index = index_for(i, params.len(), negative_from_splat);
                extract_index(index, out);
                bind_params(sub, out)?;
            }
        }
    }
    out.push(Instruction::Pop);
    Ok(())
}

/// Index to extract element `i` of `len`-length params by: positive from
/// the front before/at a splat, negative from the end after one. Negative
/// indexing needs no knowledge of the runtime array's actual length.
fn index_for(i: usize, len: usize, negative_from_splat: bool) -> i64 {
    if negative_from_splat {
        -((len - i) as i64)
    } else {
        i as i64
    }
}

/// `array[index]`, leaving the array beneath the extracted value intact
/// for subsequent extractions.
fn extract_index(index: i64, out: &mut Vec<Instruction>) {
    out.push(Instruction::PushInt(index));
    out.push(Instruction::PushArgc(1));
    out.push(Instruction::DupRel(2));
    out.push(Instruction::Send {
        message: "[]".into(),
        receiver_is_self: false,
        with_block: false,
    });
}

/// `array[begin..end]`, leaving the array beneath the extracted slice
/// intact for subsequent extractions.
fn extract_range(begin: i64, end: i64, out: &mut Vec<Instruction>) {
    out.push(Instruction::PushInt(end));
    out.push(Instruction::PushInt(begin));
    out.push(Instruction::PushRange { exclude_end: false });
    out.push(Instruction::PushArgc(1));
    out.push(Instruction::DupRel(2));
    out.push(Instruction::Send {
        message: "[]".into(),
        receiver_is_self: false,
        with_block: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate;

    #[test]
    fn unused_emits_nothing() {
        let mut out = Vec::new();
        lower_formals(&[Param::Required("a".into())], false, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn simple_case_uses_push_arg() {
        let mut out = Vec::new();
        let params = vec![Param::Required("a".into()), Param::Required("b".into())];
        lower_formals(&params, true, &mut out).unwrap();
        assert_eq!(
            out,
            vec![
                Instruction::PushArg(0),
                Instruction::VariableSet { name: "a".into(), local_only: true },
                Instruction::PushArg(1),
                Instruction::VariableSet { name: "b".into(), local_only: true },
            ]
        );
        assert_eq!(validate(&out, 0), Ok(()));
    }

    #[test]
    fn complex_case_is_net_zero_and_well_formed() {
        let mut out = Vec::new();
        let params = vec![
            Param::Required("a".into()),
            Param::Splat(Some("rest".into())),
            Param::Required("z".into()),
        ];
        lower_formals(&params, true, &mut out).unwrap();
        assert!(matches!(out.first(), Some(Instruction::PushArgs)));
        assert!(matches!(out.last(), Some(Instruction::Pop)));
        assert_eq!(validate(&out, 0), Ok(()));
    }

    #[test]
    fn optional_default_is_well_formed() {
        let mut out = Vec::new();
        let params = vec![Param::Optional(
            "x".into(),
            Box::new(Node::Lit(crate::ast::Literal::Int(7))),
        )];
        lower_formals(&params, true, &mut out).unwrap();
        assert_eq!(validate(&out, 0), Ok(()));
    }

    #[test]
    fn nested_destructure_is_well_formed() {
        let mut out = Vec::new();
        let params = vec![Param::Nested(vec![
            Param::Required("a".into()),
            Param::Required("b".into()),
        ])];
        lower_formals(&params, true, &mut out).unwrap();
        assert_eq!(validate(&out, 0), Ok(()));
    }

    #[test]
    fn anonymous_splat_discards_without_binding() {
        let mut out = Vec::new();
        let params = vec![Param::Required("a".into()), Param::Splat(None)];
        lower_formals(&params, true, &mut out).unwrap();
        assert!(!out
            .iter()
            .any(|i| matches!(i, Instruction::VariableSet { name, .. } if name.is_empty())));
        assert_eq!(validate(&out, 0), Ok(()));
    }
}
