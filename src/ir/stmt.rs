//! Three-address statements and the statement arena handle.
//!
//! Statements are stored in a per-procedure arena ([`crate::ir::Procedure`]) and
//! addressed by [`StmtId`], a dense `Copy` handle. Everything that needs to refer
//! to a statement (SSA subscripts, phi parameters, collector side tables) holds
//! the handle rather than a pointer, so the statement graph stays acyclic and the
//! arena can be mutated freely.
//!
//! # Statement Kinds
//!
//! - [`StmtKind::Assign`] - an ordinary three-address assignment
//! - [`StmtKind::PhiAssign`] - a phi-function at a join block, one parameter per
//!   in-edge, indexed by source block
//! - [`StmtKind::ImplicitAssign`] - an implicit definition at procedure entry,
//!   the target of implicit-subscript conversion
//! - [`StmtKind::Call`] - a call; a *childless* call has no callee summary and is
//!   conservatively modeled as defining every variable
//! - [`StmtKind::Return`] - a procedure return

use std::fmt;

use crate::ir::{BlockId, Exp, LocationSet};

/// A unique identifier for a statement in a procedure's arena.
///
/// Identifiers are assigned densely in creation order and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(usize);

impl StmtId {
    /// Creates a statement identifier from a raw arena index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        StmtId(index)
    }

    /// Returns the raw arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One phi-function parameter: the value of the phi's location as it arrives
/// from one predecessor block.
///
/// Parameters are indexed by their source block, not by position; the renamer
/// fills `base` and `def` when it processes that predecessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiParam {
    /// The predecessor block this parameter covers.
    pub pred: BlockId,
    /// The location as seen at the end of the predecessor, once renamed.
    pub base: Option<Exp>,
    /// The statement defining the location at the end of the predecessor, or
    /// `None` if no definition reaches it.
    pub def: Option<StmtId>,
}

impl PhiParam {
    /// Creates an unfilled parameter for the given predecessor.
    #[must_use]
    pub const fn new(pred: BlockId) -> Self {
        PhiParam {
            pred,
            base: None,
            def: None,
        }
    }
}

/// The payload of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// An ordinary assignment `lhs := rhs`.
    Assign {
        /// The defined location.
        lhs: Exp,
        /// The assigned value.
        rhs: Exp,
    },
    /// A phi-function `lhs := phi(...)` with one parameter per in-edge.
    PhiAssign {
        /// The merged location.
        lhs: Exp,
        /// One parameter per incoming CFG edge, indexed by source block.
        params: Vec<PhiParam>,
    },
    /// An implicit definition of `lhs` at procedure entry.
    ImplicitAssign {
        /// The implicitly defined location.
        lhs: Exp,
    },
    /// A call statement.
    Call {
        /// The callee name, for diagnostics.
        callee: String,
        /// Argument expressions (the call's uses).
        args: Vec<Exp>,
        /// Locations the callee is known to define.
        defines: Vec<Exp>,
        /// Whether the callee summary is unavailable. A childless call is
        /// conservatively modeled as defining every variable.
        childless: bool,
    },
    /// A return statement.
    Return {
        /// The returned value, if any.
        value: Option<Exp>,
    },
}

/// A statement in a lifted procedure.
///
/// Statements carry an ordering `number` (assigned at creation, with implicit
/// assignments numbered 0) and a dominance number filled in by
/// [`crate::analysis::DataFlow::set_dominance_nums`].
#[derive(Debug, Clone)]
pub struct Stmt {
    kind: StmtKind,
    number: u32,
    dom_number: Option<u32>,
}

impl Stmt {
    /// Creates a new statement with the given ordering number.
    #[must_use]
    pub fn new(kind: StmtKind, number: u32) -> Self {
        Stmt {
            kind,
            number,
            dom_number: None,
        }
    }

    /// Returns the statement payload.
    #[must_use]
    pub fn kind(&self) -> &StmtKind {
        &self.kind
    }

    /// Returns the statement ordering number.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Returns the dominance number, if dominance numbering has run.
    #[must_use]
    pub fn dom_number(&self) -> Option<u32> {
        self.dom_number
    }

    /// Sets the dominance number.
    pub fn set_dom_number(&mut self, num: u32) {
        self.dom_number = Some(num);
    }

    /// Returns `true` if this is a phi-function.
    #[must_use]
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, StmtKind::PhiAssign { .. })
    }

    /// Returns `true` if this is a call.
    #[must_use]
    pub fn is_call(&self) -> bool {
        matches!(self.kind, StmtKind::Call { .. })
    }

    /// Returns `true` if this is a childless call.
    #[must_use]
    pub fn is_childless_call(&self) -> bool {
        matches!(self.kind, StmtKind::Call { childless: true, .. })
    }

    /// Returns `true` if this is a return.
    #[must_use]
    pub fn is_return(&self) -> bool {
        matches!(self.kind, StmtKind::Return { .. })
    }

    /// Returns `true` if this is an implicit entry definition.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, StmtKind::ImplicitAssign { .. })
    }

    /// Returns the left-hand side of an assignment-like statement (assign, phi,
    /// or implicit), or `None` for calls and returns.
    #[must_use]
    pub fn lhs(&self) -> Option<&Exp> {
        match &self.kind {
            StmtKind::Assign { lhs, .. }
            | StmtKind::PhiAssign { lhs, .. }
            | StmtKind::ImplicitAssign { lhs } => Some(lhs),
            _ => None,
        }
    }

    /// Returns the right-hand side of an ordinary assignment, or `None` for
    /// every other kind.
    #[must_use]
    pub fn rhs(&self) -> Option<&Exp> {
        match &self.kind {
            StmtKind::Assign { rhs, .. } => Some(rhs),
            _ => None,
        }
    }

    /// Returns the phi parameters, or `None` if this is not a phi-function.
    #[must_use]
    pub fn phi_params(&self) -> Option<&[PhiParam]> {
        match &self.kind {
            StmtKind::PhiAssign { params, .. } => Some(params),
            _ => None,
        }
    }

    /// Collects the locations this statement defines into `defs`.
    pub fn definitions(&self, defs: &mut LocationSet) {
        match &self.kind {
            StmtKind::Assign { lhs, .. }
            | StmtKind::PhiAssign { lhs, .. }
            | StmtKind::ImplicitAssign { lhs } => {
                defs.insert(lhs.clone());
            }
            StmtKind::Call { defines, .. } => {
                for d in defines {
                    defs.insert(d.clone());
                }
            }
            StmtKind::Return { .. } => {}
        }
    }

    /// Collects the locations this statement uses into `locs`.
    ///
    /// For an assignment with a dereference on the left, the address computation
    /// counts as a use even though the dereference itself is a definition. For a
    /// phi-function, each filled parameter contributes its subscripted reference,
    /// which is how phi uses participate in liveness-style walks.
    pub fn used_locs(&self, locs: &mut LocationSet) {
        match &self.kind {
            StmtKind::Assign { lhs, rhs } => {
                rhs.used_locs(locs);
                Self::lhs_address_uses(lhs, locs);
            }
            StmtKind::PhiAssign { lhs, params } => {
                for param in params {
                    if let Some(base) = &param.base {
                        locs.insert(Exp::subscript(base.clone(), param.def));
                    }
                }
                Self::lhs_address_uses(lhs, locs);
            }
            StmtKind::ImplicitAssign { .. } => {}
            StmtKind::Call { args, .. } => {
                for arg in args {
                    arg.used_locs(locs);
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    value.used_locs(locs);
                }
            }
        }
    }

    /// Rewrites every un-subscripted use of `x` in this statement into `x{def}`.
    ///
    /// For a phi-function only the address inside a dereference left-hand side is
    /// rewritten (the subscript is substituted in place); every other statement
    /// kind substitutes across its value expressions.
    pub fn subscript_var(&mut self, x: &Exp, def: Option<StmtId>) {
        match &mut self.kind {
            StmtKind::Assign { lhs, rhs } => {
                *rhs = rhs.subscript_var(x, def);
                *lhs = Self::subscript_lhs_address(lhs, x, def);
            }
            StmtKind::PhiAssign { lhs, .. } => {
                *lhs = Self::subscript_lhs_address(lhs, x, def);
            }
            StmtKind::ImplicitAssign { .. } => {}
            StmtKind::Call { args, .. } => {
                for arg in args.iter_mut() {
                    *arg = arg.subscript_var(x, def);
                }
            }
            StmtKind::Return { value } => {
                if let Some(value) = value {
                    *value = value.subscript_var(x, def);
                }
            }
        }
    }

    /// Sets the phi parameter coming from predecessor `pred` to `base{def}`.
    ///
    /// If no parameter for that predecessor exists yet, one is appended; the
    /// parameter list is keyed by source block, not by position.
    pub fn put_phi_param(&mut self, pred: BlockId, def: Option<StmtId>, base: Exp) {
        if let StmtKind::PhiAssign { params, .. } = &mut self.kind {
            if let Some(param) = params.iter_mut().find(|p| p.pred == pred) {
                param.base = Some(base);
                param.def = def;
            } else {
                params.push(PhiParam {
                    pred,
                    base: Some(base),
                    def,
                });
            }
        }
    }

    /// Collects the uses hidden in the address of a dereference left-hand side.
    fn lhs_address_uses(lhs: &Exp, locs: &mut LocationSet) {
        if let Exp::MemOf(addr) = lhs.strip_subscript() {
            addr.used_locs(locs);
        }
    }

    /// Rewrites uses of `x` inside the address of a dereference left-hand side,
    /// leaving the defined location itself alone.
    fn subscript_lhs_address(lhs: &Exp, x: &Exp, def: Option<StmtId>) -> Exp {
        match lhs {
            Exp::MemOf(addr) => Exp::MemOf(Box::new(addr.subscript_var(x, def))),
            Exp::Ref(base, existing) => match &**base {
                Exp::MemOf(addr) => Exp::subscript(
                    Exp::MemOf(Box::new(addr.subscript_var(x, def))),
                    *existing,
                ),
                _ => lhs.clone(),
            },
            _ => lhs.clone(),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::Assign { lhs, rhs } => write!(f, "{lhs} := {rhs}"),
            StmtKind::PhiAssign { lhs, params } => {
                write!(f, "{lhs} := phi(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match param.def {
                        Some(def) => write!(f, "B{}:{}", param.pred.index(), def)?,
                        None => write!(f, "B{}:-", param.pred.index())?,
                    }
                }
                write!(f, ")")
            }
            StmtKind::ImplicitAssign { lhs } => write!(f, "{lhs} := -"),
            StmtKind::Call {
                callee,
                args,
                defines,
                childless,
            } => {
                if !defines.is_empty() {
                    for (i, d) in defines.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{d}")?;
                    }
                    write!(f, " := ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")?;
                if *childless {
                    write!(f, " <childless>")?;
                }
                Ok(())
            }
            StmtKind::Return { value } => match value {
                Some(value) => write!(f, "ret {value}"),
                None => write!(f, "ret"),
            },
        }
    }
}
