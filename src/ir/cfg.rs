//! Control flow graph of basic blocks.
//!
//! This module provides [`Cfg`], the per-procedure graph whose nodes are
//! [`BasicBlock`]s holding ordered statement handles. Edge lists are ordered and
//! maintained in both directions: successor order determines phi-parameter
//! placement and predecessor order determines how join blocks enumerate their
//! in-edges, so neither may be perturbed by analysis passes.
//!
//! Blocks are addressed by [`BlockId`] in creation order. The designated entry
//! block need not be the first block created; the SSA engine's block indexer maps
//! whatever entry the CFG designates to dense index 0 and the remaining blocks to
//! `1..B` in iteration order, unreachable blocks included.

use std::fmt;

use crate::ir::StmtId;

/// A unique identifier for a basic block within a [`Cfg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block identifier from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        BlockId(index)
    }

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}", self.0)
    }
}

/// A basic block: a maximal straight-line statement sequence with ordered
/// in-edges and out-edges.
#[derive(Debug, Clone, Default)]
pub struct BasicBlock {
    stmts: Vec<StmtId>,
    successors: Vec<BlockId>,
    predecessors: Vec<BlockId>,
}

impl BasicBlock {
    /// Returns the statements of this block in execution order.
    #[must_use]
    pub fn stmts(&self) -> &[StmtId] {
        &self.stmts
    }

    /// Returns the ordered successor blocks.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Returns the ordered predecessor blocks.
    #[must_use]
    pub fn predecessors(&self) -> &[BlockId] {
        &self.predecessors
    }

    /// Appends a statement at the end of the block.
    pub fn push_stmt(&mut self, stmt: StmtId) {
        self.stmts.push(stmt);
    }

    /// Inserts a statement at the head of the block.
    ///
    /// Phi-functions are placed this way, so they precede every original
    /// statement of the block.
    pub fn prepend_stmt(&mut self, stmt: StmtId) {
        self.stmts.insert(0, stmt);
    }
}

/// A control flow graph over basic blocks.
///
/// The graph owns only structure; statements live in the procedure's arena and
/// blocks reference them by handle. Block iteration follows creation order,
/// which the SSA engine relies on when it assigns dense block indexes.
#[derive(Debug, Clone, Default)]
pub struct Cfg {
    blocks: Vec<BasicBlock>,
    entry: Option<BlockId>,
}

impl Cfg {
    /// Creates an empty CFG.
    #[must_use]
    pub fn new() -> Self {
        Cfg::default()
    }

    /// Adds a new, empty basic block and returns its identifier.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(BasicBlock::default());
        id
    }

    /// Designates the entry block.
    ///
    /// The first block added becomes the entry by default; calling this
    /// overrides that choice.
    pub fn set_entry(&mut self, entry: BlockId) {
        self.entry = Some(entry);
    }

    /// Returns the entry block, or `None` if the CFG is empty.
    #[must_use]
    pub fn entry(&self) -> Option<BlockId> {
        self.entry.or_else(|| {
            if self.blocks.is_empty() {
                None
            } else {
                Some(BlockId(0))
            }
        })
    }

    /// Returns the number of blocks, unreachable blocks included.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block with the given identifier.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this CFG.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    /// Returns the block with the given identifier, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the identifier does not belong to this CFG.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0]
    }

    /// Adds a directed edge, appending to the source's successor list and the
    /// target's predecessor list.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0].successors.push(to);
        self.blocks[to.0].predecessors.push(from);
    }

    /// Iterates over block identifiers in creation order.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len()).map(BlockId)
    }
}
