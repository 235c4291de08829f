//! Expression rewrites applied across SSA state.
//!
//! Two whole-tree rewrites support SSA maintenance:
//!
//! - [`convert_implicit_refs`] replaces every implicit subscript `{-}` with a
//!   reference to a concrete implicit definition at the procedure entry,
//!   creating the [`crate::ir::StmtKind::ImplicitAssign`] on first demand.
//! - [`strip_ssa`] removes subscripts, substituting a mapped local symbol for
//!   the base location where one exists. Use collectors apply it when they are
//!   translated out of SSA form.

use crate::ir::{Exp, Procedure};

/// Rewrites every `base{-}` in `e` into `base{d}` where `d` is the implicit
/// entry definition of `base`, creating the implicit assignment if needed.
///
/// Bases are converted before their subscripts are resolved, so a nested
/// implicit reference inside an address is replaced first and the implicit
/// definition is keyed by the converted base. Applying the rewrite twice
/// yields the same tree: already-concrete subscripts are left alone.
#[must_use]
pub fn convert_implicit_refs(proc: &mut Procedure, e: &Exp) -> Exp {
    match e {
        Exp::Ref(base, def) => {
            let base = convert_implicit_refs(proc, base);
            let def = match def {
                Some(d) => Some(*d),
                None => Some(proc.find_implicit_assign(&base)),
            };
            Exp::subscript(base, def)
        }
        Exp::MemOf(addr) => Exp::mem_of(convert_implicit_refs(proc, addr)),
        Exp::Binary(op, lhs, rhs) => Exp::binary(
            *op,
            convert_implicit_refs(proc, lhs),
            convert_implicit_refs(proc, rhs),
        ),
        other => other.clone(),
    }
}

/// Removes SSA subscripts from `e`.
///
/// A subscripted reference becomes the procedure's mapped local symbol for its
/// base when one exists, and the bare base otherwise. Sub-expressions are
/// rewritten throughout.
#[must_use]
pub fn strip_ssa(proc: &Procedure, e: &Exp) -> Exp {
    match e {
        Exp::Ref(base, _) => {
            let base = strip_ssa(proc, base);
            match proc.symbol_for(&base) {
                Some(name) => Exp::Local(name.to_string()),
                None => base,
            }
        }
        Exp::MemOf(addr) => Exp::mem_of(strip_ssa(proc, addr)),
        Exp::Binary(op, lhs, rhs) => {
            Exp::binary(*op, strip_ssa(proc, lhs), strip_ssa(proc, rhs))
        }
        other => other.clone(),
    }
}
