//! Fluent construction of procedures for tests and drivers.
//!
//! [`ProcBuilder`] assembles a [`Procedure`] block by block: create blocks, wire
//! edges, and append statements, then call [`ProcBuilder::finish`]. The front
//! end of a real decompiler produces procedures directly; the builder exists so
//! analysis code and tests can state small CFGs without ceremony.
//!
//! # Examples
//!
//! ```rust
//! use retroscope::ir::{Exp, ProcBuilder};
//!
//! // 0 -> 1: define r24, then return it
//! let mut b = ProcBuilder::new("f");
//! let b0 = b.block();
//! let b1 = b.block();
//! b.edge(b0, b1);
//! b.assign(b0, Exp::Reg(24), Exp::Const(5));
//! b.ret(b1, Some(Exp::Reg(24)));
//! let proc = b.finish();
//! assert_eq!(proc.cfg().num_blocks(), 2);
//! ```

use crate::ir::{BlockId, Exp, Procedure, StmtId, StmtKind};

/// Default stack-pointer register for built procedures (`r28`).
const DEFAULT_SP: u16 = 28;

/// A fluent builder for [`Procedure`]s.
#[derive(Debug)]
pub struct ProcBuilder {
    proc: Procedure,
}

impl ProcBuilder {
    /// Creates a builder for a procedure with the default stack pointer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_sp(name, DEFAULT_SP)
    }

    /// Creates a builder for a procedure whose stack pointer is register `sp`.
    #[must_use]
    pub fn with_sp(name: impl Into<String>, sp: u16) -> Self {
        ProcBuilder {
            proc: Procedure::new(name, sp),
        }
    }

    /// Adds an empty basic block.
    pub fn block(&mut self) -> BlockId {
        self.proc.cfg_mut().add_block()
    }

    /// Adds a directed edge between two blocks.
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.proc.cfg_mut().add_edge(from, to);
    }

    /// Designates the entry block (the first block added is the default).
    pub fn entry(&mut self, entry: BlockId) {
        self.proc.cfg_mut().set_entry(entry);
    }

    /// Appends `lhs := rhs` to `block`.
    pub fn assign(&mut self, block: BlockId, lhs: Exp, rhs: Exp) -> StmtId {
        self.proc.append_stmt(block, StmtKind::Assign { lhs, rhs })
    }

    /// Appends a call with known defines to `block`.
    pub fn call(
        &mut self,
        block: BlockId,
        callee: impl Into<String>,
        args: Vec<Exp>,
        defines: Vec<Exp>,
    ) -> StmtId {
        self.proc.append_stmt(
            block,
            StmtKind::Call {
                callee: callee.into(),
                args,
                defines,
                childless: false,
            },
        )
    }

    /// Appends a childless call (no callee summary) to `block`.
    pub fn childless_call(
        &mut self,
        block: BlockId,
        callee: impl Into<String>,
        args: Vec<Exp>,
    ) -> StmtId {
        self.proc.append_stmt(
            block,
            StmtKind::Call {
                callee: callee.into(),
                args,
                defines: Vec::new(),
                childless: true,
            },
        )
    }

    /// Appends a return to `block`.
    pub fn ret(&mut self, block: BlockId, value: Option<Exp>) -> StmtId {
        self.proc.append_stmt(block, StmtKind::Return { value })
    }

    /// Maps a local symbol name to a location.
    pub fn symbol(&mut self, name: impl Into<String>, loc: Exp) {
        self.proc.map_symbol(name, loc);
    }

    /// Marks a location as address-escaped.
    pub fn escape(&mut self, loc: Exp) {
        self.proc.mark_escaped(loc);
    }

    /// Finishes construction and returns the procedure.
    #[must_use]
    pub fn finish(self) -> Procedure {
        self.proc
    }
}
