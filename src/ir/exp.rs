//! Symbolic location expressions.
//!
//! This module provides [`Exp`], the owned expression tree used to name the symbolic
//! locations a lifted procedure reads and writes: registers, temporaries, flags,
//! named locals, and memory dereferences built from address arithmetic. Expressions
//! have structural equality and a total order, so they can key the ordered maps and
//! sets the SSA engine maintains (definition stacks, definition sites, phi sites).
//!
//! # SSA Subscripts
//!
//! A use that has been through SSA renaming is wrapped in [`Exp::Ref`], pairing the
//! base location with the statement that defines it. A subscript of `None` is the
//! implicit subscript `{-}`: the location is defined at procedure entry, before any
//! statement. [`crate::analysis::DataFlow::convert_implicits`] later replaces these
//! with references to concrete implicit assignments.
//!
//! # The Define-All Sentinel
//!
//! [`Exp::DefineAll`] stands for "every location". It is the key under which the
//! renamer stacks the reaching childless calls, which conservatively define all
//! variables; the stack map treats it like any other key.
//!
//! # Examples
//!
//! ```rust
//! use retroscope::ir::{BinOp, Exp};
//!
//! // m[r28 + 4], the usual local-or-parameter pattern
//! let loc = Exp::mem_of(Exp::binary(BinOp::Plus, Exp::Reg(28), Exp::Const(4)));
//! assert!(loc.is_mem_of());
//! assert_eq!(format!("{loc}"), "m[r28 + 4]");
//! ```

use std::collections::BTreeSet;
use std::fmt;

use crate::ir::StmtId;

/// An ordered set of locations.
///
/// Used throughout the engine for collected uses and definitions. Ordering follows
/// the total order on [`Exp`], which keeps every traversal over collected locations
/// deterministic.
pub type LocationSet = BTreeSet<Exp>;

/// An individual machine flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum FlagKind {
    /// Carry flag.
    Cf,
    /// Zero flag.
    Zf,
    /// Negative (sign) flag.
    Nf,
    /// Overflow flag.
    Of,
}

/// Binary operators usable in address arithmetic.
///
/// Only the operators needed to express stack-relative addressing survive in
/// location expressions; the full expression algebra of the decompiler front end
/// is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
pub enum BinOp {
    /// Addition.
    #[strum(serialize = "+")]
    Plus,
    /// Subtraction.
    #[strum(serialize = "-")]
    Minus,
}

/// A symbolic location expression.
///
/// `Exp` is a value type: cloning is deep, equality and ordering are structural.
/// The engine clones expressions whenever it stores them into long-lived
/// containers, so containers never alias caller-owned trees.
///
/// # Variants and Renaming
///
/// The SSA rename policy ([`crate::analysis::DataFlow::can_rename`]) recognizes
/// registers, temporaries, flags, named locals, and memory dereferences that match
/// the procedure's local-or-parameter pattern. Everything else (`Const`, `Pc`,
/// address arithmetic appearing outside a dereference) is never renamed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Exp {
    /// An integer constant.
    Const(i64),
    /// The program counter. Never renamable.
    Pc,
    /// A machine register, by register number.
    Reg(u16),
    /// A temporary introduced by the lifter.
    Temp(String),
    /// The aggregate flags location.
    Flags,
    /// An individual flag such as `%CF`.
    MainFlag(FlagKind),
    /// A named local variable, introduced by symbol mapping.
    Local(String),
    /// Address arithmetic over sub-expressions.
    Binary(BinOp, Box<Exp>, Box<Exp>),
    /// A memory dereference `m[addr]`.
    MemOf(Box<Exp>),
    /// A subscripted reference `base{def}`; `None` is the implicit subscript `{-}`.
    Ref(Box<Exp>, Option<StmtId>),
    /// The define-all sentinel `<all>`, standing for every location.
    DefineAll,
}

impl Exp {
    /// Builds a memory dereference `m[addr]`.
    #[must_use]
    pub fn mem_of(addr: Exp) -> Self {
        Exp::MemOf(Box::new(addr))
    }

    /// Builds a binary address expression.
    #[must_use]
    pub fn binary(op: BinOp, lhs: Exp, rhs: Exp) -> Self {
        Exp::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Builds a subscripted reference `base{def}`.
    #[must_use]
    pub fn subscript(base: Exp, def: Option<StmtId>) -> Self {
        Exp::Ref(Box::new(base), def)
    }

    /// Returns `true` if this is a register.
    #[must_use]
    pub fn is_reg(&self) -> bool {
        matches!(self, Exp::Reg(_))
    }

    /// Returns `true` if this is a temporary.
    #[must_use]
    pub fn is_temp(&self) -> bool {
        matches!(self, Exp::Temp(_))
    }

    /// Returns `true` if this is the aggregate flags location.
    #[must_use]
    pub fn is_flags(&self) -> bool {
        matches!(self, Exp::Flags)
    }

    /// Returns `true` if this is an individual flag.
    #[must_use]
    pub fn is_main_flag(&self) -> bool {
        matches!(self, Exp::MainFlag(_))
    }

    /// Returns `true` if this is a named local.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Exp::Local(_))
    }

    /// Returns `true` if this is a memory dereference.
    #[must_use]
    pub fn is_mem_of(&self) -> bool {
        matches!(self, Exp::MemOf(_))
    }

    /// Returns `true` if this is a subscripted reference.
    #[must_use]
    pub fn is_subscript(&self) -> bool {
        matches!(self, Exp::Ref(..))
    }

    /// Returns `true` if this is the define-all sentinel.
    #[must_use]
    pub fn is_define_all(&self) -> bool {
        matches!(self, Exp::DefineAll)
    }

    /// Returns the base and subscript of a subscripted reference, or `None` for
    /// any other variant.
    #[must_use]
    pub fn as_subscript(&self) -> Option<(&Exp, Option<StmtId>)> {
        match self {
            Exp::Ref(base, def) => Some((base, *def)),
            _ => None,
        }
    }

    /// Peels a single outer subscript, returning the base; any other expression
    /// is returned unchanged.
    #[must_use]
    pub fn strip_subscript(&self) -> &Exp {
        match self {
            Exp::Ref(base, _) => base,
            other => other,
        }
    }

    /// Collects the locations this expression uses into `locs`, treating the
    /// expression as a value.
    ///
    /// Leaf locations and memory dereferences insert themselves; a dereference
    /// additionally recurses into its address, since computing the address reads
    /// the locations it mentions. A subscripted reference inserts itself without
    /// recursing: its base is accounted for by the reference, and renaming must
    /// not descend into already-renamed uses.
    pub fn used_locs(&self, locs: &mut LocationSet) {
        match self {
            Exp::Const(_) | Exp::DefineAll => {}
            Exp::Pc
            | Exp::Reg(_)
            | Exp::Temp(_)
            | Exp::Flags
            | Exp::MainFlag(_)
            | Exp::Local(_) => {
                locs.insert(self.clone());
            }
            Exp::Binary(_, lhs, rhs) => {
                lhs.used_locs(locs);
                rhs.used_locs(locs);
            }
            Exp::MemOf(addr) => {
                locs.insert(self.clone());
                addr.used_locs(locs);
            }
            Exp::Ref(..) => {
                locs.insert(self.clone());
            }
        }
    }

    /// Rewrites every un-subscripted occurrence of `x` in this expression into
    /// `x{def}`, returning the rewritten tree.
    ///
    /// Occurrences inside subscripted references are left alone: they were renamed
    /// by an earlier pass and carry their own subscript.
    #[must_use]
    pub fn subscript_var(&self, x: &Exp, def: Option<StmtId>) -> Exp {
        if self == x {
            return Exp::Ref(Box::new(self.clone()), def);
        }
        match self {
            Exp::Ref(..) => self.clone(),
            Exp::MemOf(addr) => Exp::MemOf(Box::new(addr.subscript_var(x, def))),
            Exp::Binary(op, lhs, rhs) => Exp::Binary(
                *op,
                Box::new(lhs.subscript_var(x, def)),
                Box::new(rhs.subscript_var(x, def)),
            ),
            other => other.clone(),
        }
    }

    /// Replaces every occurrence of `from` with `to`, descending into every
    /// sub-expression including subscripted references.
    ///
    /// Returns the rewritten tree and whether anything changed.
    #[must_use]
    pub fn search_replace(&self, from: &Exp, to: &Exp) -> (Exp, bool) {
        if self == from {
            return (to.clone(), true);
        }
        match self {
            Exp::MemOf(addr) => {
                let (addr, changed) = addr.search_replace(from, to);
                (Exp::MemOf(Box::new(addr)), changed)
            }
            Exp::Binary(op, lhs, rhs) => {
                let (lhs, c1) = lhs.search_replace(from, to);
                let (rhs, c2) = rhs.search_replace(from, to);
                (Exp::Binary(*op, Box::new(lhs), Box::new(rhs)), c1 || c2)
            }
            Exp::Ref(base, def) => {
                let (base, changed) = base.search_replace(from, to);
                (Exp::Ref(Box::new(base), *def), changed)
            }
            other => (other.clone(), false),
        }
    }
}

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exp::Const(v) => write!(f, "{v}"),
            Exp::Pc => write!(f, "%pc"),
            Exp::Reg(n) => write!(f, "r{n}"),
            Exp::Temp(name) => write!(f, "{name}"),
            Exp::Flags => write!(f, "%flags"),
            Exp::MainFlag(kind) => write!(f, "%{kind}"),
            Exp::Local(name) => write!(f, "{name}"),
            Exp::Binary(op, lhs, rhs) => write!(f, "{lhs} {op} {rhs}"),
            Exp::MemOf(addr) => write!(f, "m[{addr}]"),
            Exp::Ref(base, Some(def)) => write!(f, "{base}{{{def}}}"),
            Exp::Ref(base, None) => write!(f, "{base}{{-}}"),
            Exp::DefineAll => write!(f, "<all>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(Exp::Reg(24).is_reg());
        assert!(Exp::Temp("tmp1".to_string()).is_temp());
        assert!(Exp::Flags.is_flags());
        assert!(Exp::MainFlag(FlagKind::Cf).is_main_flag());
        assert!(Exp::Local("x".to_string()).is_local());
        assert!(Exp::mem_of(Exp::Reg(28)).is_mem_of());
        assert!(Exp::subscript(Exp::Reg(24), None).is_subscript());
        assert!(Exp::DefineAll.is_define_all());
        assert!(!Exp::Const(3).is_reg());
        assert!(!Exp::Pc.is_mem_of());
    }

    #[test]
    fn test_strip_subscript() {
        let base = Exp::Reg(24);
        let wrapped = Exp::subscript(base.clone(), Some(StmtId::from_index(5)));
        assert_eq!(wrapped.strip_subscript(), &base);
        assert_eq!(base.strip_subscript(), &base);
    }

    #[test]
    fn test_structural_order_is_total() {
        let mut set = BTreeSet::new();
        set.insert(Exp::Reg(24));
        set.insert(Exp::Reg(24));
        set.insert(Exp::Reg(25));
        set.insert(Exp::mem_of(Exp::Reg(28)));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_used_locs_memof_recurses_into_address() {
        // m[r28 + 4] uses both the dereference itself and r28
        let loc = Exp::mem_of(Exp::binary(BinOp::Plus, Exp::Reg(28), Exp::Const(4)));
        let mut locs = LocationSet::new();
        loc.used_locs(&mut locs);
        assert!(locs.contains(&loc));
        assert!(locs.contains(&Exp::Reg(28)));
        assert_eq!(locs.len(), 2);
    }

    #[test]
    fn test_used_locs_does_not_descend_into_refs() {
        // m[r28{-} + 4]: the subscripted r28 is collected, its base is not
        let sub = Exp::subscript(Exp::Reg(28), None);
        let loc = Exp::mem_of(Exp::binary(BinOp::Plus, sub.clone(), Exp::Const(4)));
        let mut locs = LocationSet::new();
        loc.used_locs(&mut locs);
        assert!(locs.contains(&loc));
        assert!(locs.contains(&sub));
        assert!(!locs.contains(&Exp::Reg(28)));
    }

    #[test]
    fn test_subscript_var_wraps_matches() {
        let def = Some(StmtId::from_index(7));
        let rhs = Exp::binary(BinOp::Plus, Exp::Reg(24), Exp::Const(1));
        let out = rhs.subscript_var(&Exp::Reg(24), def);
        assert_eq!(
            out,
            Exp::binary(
                BinOp::Plus,
                Exp::subscript(Exp::Reg(24), def),
                Exp::Const(1)
            )
        );
    }

    #[test]
    fn test_subscript_var_skips_existing_refs() {
        let already = Exp::subscript(Exp::Reg(24), Some(StmtId::from_index(3)));
        let out = already.subscript_var(&Exp::Reg(24), Some(StmtId::from_index(9)));
        assert_eq!(out, already);
    }

    #[test]
    fn test_search_replace_descends_into_refs() {
        let from = Exp::Reg(28);
        let to = Exp::Local("sp".to_string());
        let e = Exp::subscript(Exp::mem_of(Exp::Reg(28)), Some(StmtId::from_index(2)));
        let (out, changed) = e.search_replace(&from, &to);
        assert!(changed);
        assert_eq!(
            out,
            Exp::subscript(
                Exp::mem_of(Exp::Local("sp".to_string())),
                Some(StmtId::from_index(2))
            )
        );
    }

    #[test]
    fn test_display() {
        let loc = Exp::mem_of(Exp::binary(BinOp::Plus, Exp::Reg(28), Exp::Const(4)));
        assert_eq!(format!("{loc}"), "m[r28 + 4]");
        let sub = Exp::subscript(Exp::Reg(24), None);
        assert_eq!(format!("{sub}"), "r24{-}");
        assert_eq!(format!("{}", Exp::DefineAll), "<all>");
        assert_eq!(format!("{}", Exp::MainFlag(FlagKind::Zf)), "%ZF");
    }
}
