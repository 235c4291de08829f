//! Lifted procedures: the statement arena and its surrounding context.
//!
//! A [`Procedure`] owns everything the SSA engine needs from one function under
//! decompilation: the statement arena, the [`Cfg`](crate::ir::Cfg), the symbol
//! map from local names to locations, the set of address-escaped variables, and
//! the implicit entry definitions created on demand for implicit-subscript
//! conversion.
//!
//! The procedure knows its stack-pointer register, which drives
//! [`Procedure::is_local_or_param_pattern`]: the test for memory dereferences of
//! the form `m[sp]` or `m[sp ± k]` that may name locals or parameters once
//! escape analysis has run.

use std::collections::{BTreeMap, BTreeSet};

use crate::ir::{BinOp, BlockId, Cfg, Exp, Stmt, StmtId, StmtKind};

/// A procedure under decompilation.
///
/// Statements are arena-allocated and addressed by [`StmtId`]. Ordinary
/// statements are numbered from 1 in creation order; implicit entry definitions
/// are numbered 0, which is how they print in subscripts once implicit
/// conversion has run.
#[derive(Debug, Clone)]
pub struct Procedure {
    name: String,
    cfg: Cfg,
    stmts: Vec<Stmt>,
    next_number: u32,
    sp: u16,
    symbols: BTreeMap<String, Exp>,
    escaped: BTreeSet<Exp>,
    implicits: BTreeMap<Exp, StmtId>,
}

impl Procedure {
    /// Creates an empty procedure whose stack pointer is register `sp`.
    #[must_use]
    pub fn new(name: impl Into<String>, sp: u16) -> Self {
        Procedure {
            name: name.into(),
            cfg: Cfg::new(),
            stmts: Vec::new(),
            next_number: 1,
            sp,
            symbols: BTreeMap::new(),
            escaped: BTreeSet::new(),
            implicits: BTreeMap::new(),
        }
    }

    /// Returns the procedure name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stack-pointer register number.
    #[must_use]
    pub fn sp(&self) -> u16 {
        self.sp
    }

    /// Returns the control flow graph.
    #[must_use]
    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    /// Returns the control flow graph, mutably.
    pub fn cfg_mut(&mut self) -> &mut Cfg {
        &mut self.cfg
    }

    /// Returns the number of statements in the arena.
    #[must_use]
    pub fn num_stmts(&self) -> usize {
        self.stmts.len()
    }

    /// Returns the statement with the given handle.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this procedure.
    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    /// Returns the statement with the given handle, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not belong to this procedure.
    pub fn stmt_mut(&mut self, id: StmtId) -> &mut Stmt {
        &mut self.stmts[id.index()]
    }

    /// Allocates a statement in the arena without attaching it to a block.
    pub fn add_stmt(&mut self, kind: StmtKind) -> StmtId {
        let number = if matches!(kind, StmtKind::ImplicitAssign { .. }) {
            0
        } else {
            let n = self.next_number;
            self.next_number += 1;
            n
        };
        let id = StmtId::from_index(self.stmts.len());
        self.stmts.push(Stmt::new(kind, number));
        id
    }

    /// Allocates a statement and appends it to `block`.
    pub fn append_stmt(&mut self, block: BlockId, kind: StmtKind) -> StmtId {
        let id = self.add_stmt(kind);
        self.cfg.block_mut(block).push_stmt(id);
        id
    }

    /// Allocates a statement and inserts it at the head of `block`.
    pub fn prepend_stmt(&mut self, block: BlockId, kind: StmtKind) -> StmtId {
        let id = self.add_stmt(kind);
        self.cfg.block_mut(block).prepend_stmt(id);
        id
    }

    /// Maps a local symbol name to the location it stands for.
    pub fn map_symbol(&mut self, name: impl Into<String>, loc: Exp) {
        self.symbols.insert(name.into(), loc);
    }

    /// Returns the location a local symbol name stands for.
    #[must_use]
    pub fn exp_from_symbol(&self, name: &str) -> Option<&Exp> {
        self.symbols.get(name)
    }

    /// Returns the symbol name mapped to `loc`, if any.
    #[must_use]
    pub fn symbol_for(&self, loc: &Exp) -> Option<&str> {
        self.symbols
            .iter()
            .find(|(_, mapped)| *mapped == loc)
            .map(|(name, _)| name.as_str())
    }

    /// Marks a location as having its address escape the procedure.
    ///
    /// Escaped locations are never renamed, even after escape analysis enables
    /// local and parameter renaming.
    pub fn mark_escaped(&mut self, loc: Exp) {
        self.escaped.insert(loc);
    }

    /// Returns `true` if the address of `loc` escapes the procedure.
    #[must_use]
    pub fn is_address_escaped_var(&self, loc: &Exp) -> bool {
        self.escaped.contains(loc)
    }

    /// Returns `true` if `e` matches the local-or-parameter address pattern
    /// `m[sp]` or `m[sp ± k]`, with the stack pointer possibly subscripted.
    #[must_use]
    pub fn is_local_or_param_pattern(&self, e: &Exp) -> bool {
        let Exp::MemOf(addr) = e else {
            return false;
        };
        match &**addr {
            Exp::Binary(BinOp::Plus | BinOp::Minus, lhs, rhs) => {
                self.is_sp_base(lhs) && matches!(&**rhs, Exp::Const(_))
            }
            base => self.is_sp_base(base),
        }
    }

    /// Returns the implicit entry definition for `e`, creating an
    /// [`StmtKind::ImplicitAssign`] at the head of the entry block on first
    /// request.
    ///
    /// # Panics
    ///
    /// Panics if the CFG has no blocks.
    pub fn find_implicit_assign(&mut self, e: &Exp) -> StmtId {
        if let Some(&id) = self.implicits.get(e) {
            return id;
        }
        let entry = self.cfg.entry().expect("CFG has no entry block");
        let id = self.prepend_stmt(entry, StmtKind::ImplicitAssign { lhs: e.clone() });
        self.implicits.insert(e.clone(), id);
        id
    }

    /// Returns the implicit entry definition for `e`, if one has been created.
    #[must_use]
    pub fn implicit_assign(&self, e: &Exp) -> Option<StmtId> {
        self.implicits.get(e).copied()
    }

    fn is_sp_base(&self, e: &Exp) -> bool {
        matches!(e.strip_subscript(), Exp::Reg(r) if *r == self.sp)
    }
}
