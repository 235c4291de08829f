//! Static Single Assignment construction and maintenance.
//!
//! This module is the mid-end engine that lifts a procedure's statements into
//! SSA form and keeps the surrounding dataflow side-state current. Construction
//! proceeds in strict stages per run:
//!
//! 1. **Block indexing** - blocks get dense indexes with the entry at 0
//!    ([`DataFlow::dominators`] rebuilds the index every run)
//! 2. **Dominators** - depth-first numbering, semidominators with path
//!    compression, immediate dominators, dominance frontiers
//! 3. **Phi placement** - pruned phi-functions over the iterated dominance
//!    frontier of every renamable location's definition sites
//!    ([`DataFlow::place_phi_functions`])
//! 4. **Renaming** - a dominator-tree walk that subscripts every use with its
//!    reaching definition and feeds the call/return collectors inline
//!    ([`DataFlow::rename_block_vars`])
//!
//! Auxiliary passes run independently over the populated dominator tree:
//! dominance numbering, live-at-dominating-phi discovery, and implicit-
//! reference conversion.
//!
//! # Sub-modules
//!
//! - [`collectors`] - reaching-definition and use-before-define collectors
//! - [`xform`] - implicit-subscript conversion and SSA-stripping rewrites
//!
//! # Renaming Policy
//!
//! Which locations are renamed is a policy question answered by
//! [`DataFlow::can_rename`]: registers, temporaries, and flags always; named
//! locals and stack-slot dereferences only once the driver has run escape
//! analysis and set [`DataFlow::set_rename_locals_and_params`]. When the driver
//! asserts ABI compliance ([`DataFlow::set_assume_abi`]), childless calls stop
//! being modeled as defining every variable.
//!
//! # Usage
//!
//! ```rust
//! use retroscope::analysis::DataFlow;
//! use retroscope::ir::{Exp, ProcBuilder};
//!
//! // 0 -> {1, 2} -> 3, both arms define r24, the join uses it
//! let mut b = ProcBuilder::new("diamond");
//! let b0 = b.block();
//! let b1 = b.block();
//! let b2 = b.block();
//! let b3 = b.block();
//! b.edge(b0, b1);
//! b.edge(b0, b2);
//! b.edge(b1, b3);
//! b.edge(b2, b3);
//! b.assign(b1, Exp::Reg(24), Exp::Const(1));
//! b.assign(b2, Exp::Reg(24), Exp::Const(2));
//! b.ret(b3, Some(Exp::Reg(24)));
//! let mut proc = b.finish();
//!
//! let mut df = DataFlow::new();
//! df.dominators(&proc)?;
//! df.place_phi_functions(&mut proc)?;
//! df.rename_block_vars(&mut proc, 0, true)?;
//! # Ok::<(), retroscope::Error>(())
//! ```
//!
//! # References
//!
//! - Cytron et al., "Efficiently Computing Static Single Assignment Form and
//!   the Control Dependence Graph", ACM TOPLAS 1991
//! - Appel, "Modern Compiler Implementation in Java", 2nd ed., chapter 19

mod collectors;
mod dominators;
mod passes;
mod placement;
mod rename;
pub mod xform;

pub use collectors::{CollectedDef, DefCollector, DefStacks, UseCollector};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, Exp, LocationSet, Procedure, StmtId};

/// Sentinel for "no block index" in the dominator vectors (the root's
/// immediate dominator, unreachable blocks, unlinked forest entries).
pub(crate) const NONE: usize = usize::MAX;

/// Per-procedure SSA and dataflow state.
///
/// One `DataFlow` accompanies one procedure through decompilation. Every run of
/// the construction pipeline rebuilds the dominator and placement state from
/// scratch, so the driver can mutate the CFG (switch recovery, block splitting)
/// and simply run the stages again.
///
/// # State Groups
///
/// - **Indexer**: `bbs` (dense index to block) and `indices` (block to dense
///   index), entry at index 0, unreachable blocks included
/// - **Dominators**: DFS numbering, semidominators, immediate dominators,
///   dominance frontiers
/// - **Placement**: per-block original definitions, definition sites, define-all
///   sites, placed phi sites
/// - **Renaming**: per-location definition stacks
/// - **Collectors**: reaching-definition and use-before-define collectors for
///   calls and returns, keyed by statement handle, plus the procedure-entry
///   use collector
#[derive(Debug, Default)]
pub struct DataFlow {
    /// Whether locals and stack-slot parameters may be renamed (set by the
    /// driver after escape analysis).
    rename_locals_and_params: bool,
    /// Whether childless calls are assumed ABI-compliant (disables define-all
    /// modeling).
    assume_abi: bool,

    /// Dense index to block, entry at index 0.
    bbs: Vec<BlockId>,
    /// Block to dense index.
    indices: FxHashMap<BlockId, usize>,

    /// Number of blocks reached by the depth-first search.
    count: usize,
    /// DFS preorder number per block index; 0 means unvisited.
    dfnum: Vec<usize>,
    /// Block index in DFS preorder position order.
    vertex: Vec<usize>,
    /// DFS tree parent per block index.
    parent: Vec<usize>,
    /// Semidominator per block index.
    semi: Vec<usize>,
    /// Immediate dominator per block index; [`NONE`] for the root and for
    /// unreachable blocks.
    idom: Vec<usize>,
    /// Spanning-forest ancestor for path compression.
    ancestor: Vec<usize>,
    /// Best candidate on the compressed path.
    best: Vec<usize>,
    /// Deferred-dominator link.
    samedom: Vec<usize>,
    /// Blocks whose immediate dominator resolves when this block is linked.
    bucket: Vec<BTreeSet<usize>>,
    /// Dominance frontier per block index.
    df: Vec<BTreeSet<usize>>,

    /// Locations originally defined in each block, before renaming.
    a_orig: Vec<LocationSet>,
    /// Blocks defining each location.
    defsites: BTreeMap<Exp, BTreeSet<usize>>,
    /// Blocks containing a childless call, which defines every variable.
    defallsites: BTreeSet<usize>,
    /// Blocks where a phi-function for each location has been inserted.
    a_phi: BTreeMap<Exp, BTreeSet<usize>>,
    /// Last seen defining statement per location during placement.
    def_stmts: BTreeMap<Exp, StmtId>,

    /// Definition stacks: the reaching definition of each location at the
    /// renamer's current traversal position.
    stacks: DefStacks,

    /// Reaching-definition collectors for call and return statements.
    def_collectors: FxHashMap<StmtId, DefCollector>,
    /// Use-before-define collectors for call statements.
    use_collectors: FxHashMap<StmtId, UseCollector>,
    /// Locations used before definition on entry paths: the procedure's
    /// parameter candidates.
    entry_uses: UseCollector,
}

impl DataFlow {
    /// Creates an empty engine with both policy flags off.
    #[must_use]
    pub fn new() -> Self {
        DataFlow::default()
    }

    /// Enables or disables renaming of locals and stack-slot parameters.
    ///
    /// The driver sets this after escape analysis; until then only registers,
    /// temporaries, and flags are renamed.
    pub fn set_rename_locals_and_params(&mut self, enable: bool) {
        self.rename_locals_and_params = enable;
    }

    /// Returns whether locals and parameters are currently renamable.
    #[must_use]
    pub fn renames_locals_and_params(&self) -> bool {
        self.rename_locals_and_params
    }

    /// Enables or disables the ABI-compliance assumption for childless calls.
    pub fn set_assume_abi(&mut self, enable: bool) {
        self.assume_abi = enable;
    }

    /// Returns whether childless calls are assumed ABI-compliant.
    #[must_use]
    pub fn assumes_abi(&self) -> bool {
        self.assume_abi
    }

    /// Returns the number of indexed blocks, or 0 before the dominator pass.
    #[must_use]
    pub fn num_indexed(&self) -> usize {
        self.bbs.len()
    }

    /// Returns the block at a dense index.
    #[must_use]
    pub fn block_at(&self, index: usize) -> Option<BlockId> {
        self.bbs.get(index).copied()
    }

    /// Returns the dense index of a block.
    #[must_use]
    pub fn index_of(&self, block: BlockId) -> Option<usize> {
        self.indices.get(&block).copied()
    }

    /// Returns the immediate dominator of block index `n`, or `None` for the
    /// entry and for unreachable blocks.
    #[must_use]
    pub fn idom(&self, n: usize) -> Option<usize> {
        match self.idom.get(n) {
            Some(&i) if i != NONE => Some(i),
            _ => None,
        }
    }

    /// Returns the dominance frontier of block index `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is out of range or the dominator pass has not run.
    #[must_use]
    pub fn frontier(&self, n: usize) -> &BTreeSet<usize> {
        &self.df[n]
    }

    /// Returns the blocks where a phi-function for `loc` has been placed.
    #[must_use]
    pub fn phi_sites(&self, loc: &Exp) -> Option<&BTreeSet<usize>> {
        self.a_phi.get(loc)
    }

    /// Returns the blocks defining `loc`, as recorded by the placement pass.
    #[must_use]
    pub fn def_sites(&self, loc: &Exp) -> Option<&BTreeSet<usize>> {
        self.defsites.get(loc)
    }

    /// Returns the locations originally defined in block index `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` is out of range or the placement pass has not run.
    #[must_use]
    pub fn orig_defs(&self, n: usize) -> &LocationSet {
        &self.a_orig[n]
    }

    /// Returns the last statement seen defining `loc` during placement.
    #[must_use]
    pub fn def_stmt(&self, loc: &Exp) -> Option<StmtId> {
        self.def_stmts.get(loc).copied()
    }

    /// Returns the reaching definition on top of the stack for `loc`, without
    /// creating an entry. A missing key and an empty stack are both `None`.
    #[must_use]
    pub fn stack_top(&self, loc: &Exp) -> Option<StmtId> {
        self.stacks.get(loc).and_then(|stack| stack.last().copied())
    }

    /// Returns the depth of the definition stack for `loc`, without creating
    /// an entry.
    #[must_use]
    pub fn stack_depth(&self, loc: &Exp) -> usize {
        self.stacks.get(loc).map_or(0, Vec::len)
    }

    /// Returns the reaching-definition collector of a call or return, if the
    /// renamer has reached that statement.
    #[must_use]
    pub fn def_collector(&self, stmt: StmtId) -> Option<&DefCollector> {
        self.def_collectors.get(&stmt)
    }

    /// Returns the use-before-define collector of a call, if anything has been
    /// recorded at it.
    #[must_use]
    pub fn use_collector(&self, stmt: StmtId) -> Option<&UseCollector> {
        self.use_collectors.get(&stmt)
    }

    /// Returns the use-before-define collector of a call, mutably, creating it
    /// if absent.
    pub fn use_collector_mut(&mut self, stmt: StmtId) -> &mut UseCollector {
        self.use_collectors.entry(stmt).or_default()
    }

    /// Returns the procedure-entry use collector: the locations used before
    /// any definition on some entry path.
    #[must_use]
    pub fn entry_uses(&self) -> &UseCollector {
        &self.entry_uses
    }

    /// Records a location as used before definition at the procedure entry.
    pub fn use_before_define(&mut self, loc: Exp) {
        self.entry_uses.insert(loc);
    }

    /// Renders the definition stacks for the log stream.
    #[must_use]
    pub fn dump_stacks(&self, proc: &Procedure) -> String {
        let mut out = format!("Stacks: {} entries\n", self.stacks.len());
        for (loc, stack) in &self.stacks {
            let _ = write!(out, "Var {loc} [ ");
            for &def in stack.iter().rev() {
                let _ = write!(out, "{} ", proc.stmt(def).number());
            }
            let _ = writeln!(out, "]");
        }
        out
    }

    /// Renders the placed phi sites for the log stream.
    #[must_use]
    pub fn dump_a_phi(&self) -> String {
        let mut out = String::from("A_phi:\n");
        for (loc, sites) in &self.a_phi {
            let _ = write!(out, "{loc} -> ");
            for site in sites {
                let _ = write!(out, "{site}, ");
            }
            let _ = writeln!(out);
        }
        out.push_str("end A_phi\n");
        out
    }

    /// Renders the definition sites for the log stream.
    #[must_use]
    pub fn dump_defsites(&self) -> String {
        let mut out = String::new();
        for (loc, sites) in &self.defsites {
            let _ = write!(out, "{loc}");
            for site in sites {
                let _ = write!(out, " {site}");
            }
            let _ = writeln!(out);
        }
        out
    }

    /// Renders the per-block original definitions for the log stream.
    #[must_use]
    pub fn dump_a_orig(&self) -> String {
        let mut out = String::new();
        for (n, locs) in self.a_orig.iter().enumerate() {
            let _ = write!(out, "{n}");
            for loc in locs {
                let _ = write!(out, " {loc}");
            }
            let _ = writeln!(out);
        }
        out
    }
}
