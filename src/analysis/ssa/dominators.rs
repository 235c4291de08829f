//! Dominator tree and dominance frontier computation.
//!
//! This is the Lengauer-Tarjan algorithm in its semidominator formulation with
//! path compression, over the dense block indexing built at the start of every
//! run. The frontier computation follows: for each node, the local frontier
//! comes from successors the node does not immediately dominate, and the
//! up-frontier is inherited from dominator-tree children.
//!
//! Traversals that recurse on the dominator tree or the DFS tree run on
//! explicit work stacks, so CFGs deep enough to overflow a native stack are
//! handled without raising process limits. The path-compression helper keeps
//! its standard recursive shape; its depth is bounded by the compressed forest
//! paths, which collapse as it runs.
//!
//! # Theory
//!
//! A node `d` **dominates** `n` if every path from the entry to `n` passes
//! through `d`. The **semidominator** of `n` is the minimum-preorder vertex `v`
//! with a path to `n` whose intermediate vertices all have preorder numbers
//! greater than `n`'s; the Semidominator Theorem turns that into the one-pass
//! scan over predecessors implemented here.

use std::collections::BTreeSet;

use crate::analysis::ssa::{DataFlow, NONE};
use crate::ir::Procedure;
use crate::Result;

enum Visit {
    Enter(usize),
    Exit(usize),
}

impl DataFlow {
    /// Computes the dominator tree and dominance frontiers of the procedure's
    /// CFG.
    ///
    /// The block index is rebuilt first: the entry block gets dense index 0 and
    /// the remaining blocks follow in CFG iteration order, unreachable blocks
    /// included so that lookups by predecessor never fail. All dominator-state
    /// vectors are reinitialized, so the pass can be re-run after the driver
    /// mutates the CFG.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Empty`] for a CFG with no blocks, and
    /// [`crate::Error::Structural`] if an edge references a block the indexer
    /// has never seen.
    pub fn dominators(&mut self, proc: &Procedure) -> Result<()> {
        let cfg = proc.cfg();
        let num_bb = cfg.num_blocks();
        let entry = cfg.entry().ok_or(crate::Error::Empty)?;

        // Rebuild the block index; a restart after switch recovery must not
        // see stale entries.
        self.bbs = Vec::with_capacity(num_bb);
        self.bbs.push(entry);
        self.indices.clear();
        self.indices.insert(entry, 0);
        let mut idx = 1;
        for block in cfg.block_ids() {
            if block != entry {
                self.indices.insert(block, idx);
                self.bbs.push(block);
                idx += 1;
            }
        }

        self.count = 0;
        self.dfnum = vec![0; num_bb];
        self.vertex = vec![NONE; num_bb];
        self.parent = vec![NONE; num_bb];
        self.semi = vec![NONE; num_bb];
        self.idom = vec![NONE; num_bb];
        self.ancestor = vec![NONE; num_bb];
        self.best = vec![NONE; num_bb];
        self.samedom = vec![NONE; num_bb];
        self.bucket = vec![BTreeSet::new(); num_bb];
        self.df = vec![BTreeSet::new(); num_bb];

        self.dfs(proc)?;

        // Reverse preorder, entry excluded: compute semidominators and
        // resolve buckets as the spanning forest grows.
        for i in (1..self.count).rev() {
            let n = self.vertex[i];
            let p = self.parent[n];
            let mut s = p;

            for &pred in proc.cfg().block(self.bbs[n]).predecessors() {
                let Some(&v) = self.indices.get(&pred) else {
                    log::warn!("predecessor {pred} of {} has no block index", self.bbs[n]);
                    return Err(structural_error!(
                        "predecessor {} of block {} has no block index",
                        pred,
                        self.bbs[n]
                    ));
                };
                if self.dfnum[v] == 0 {
                    continue; // Unreachable predecessor, not in the DFS tree
                }
                let sdash = if self.dfnum[v] > self.dfnum[n] {
                    let u = self.ancestor_with_lowest_semi(v);
                    self.semi[u]
                } else {
                    v
                };
                if self.dfnum[sdash] < self.dfnum[s] {
                    s = sdash;
                }
            }
            self.semi[n] = s;

            // n's dominator is deferred until the path from s to n is linked
            // into the forest.
            self.bucket[s].insert(n);
            self.link(p, n);

            let bucket = std::mem::take(&mut self.bucket[p]);
            for v in bucket {
                let y = self.ancestor_with_lowest_semi(v);
                if self.semi[y] == self.semi[v] {
                    self.idom[v] = p;
                } else {
                    self.samedom[v] = y; // Defer
                }
            }
        }

        // Deferred dominators, by the second clause of the Dominator Theorem.
        for i in 1..self.count {
            let n = self.vertex[i];
            if self.samedom[n] != NONE {
                self.idom[n] = self.idom[self.samedom[n]];
            }
        }

        self.compute_df(proc, 0)
    }

    /// Returns `true` if block index `n` dominates block index `w`.
    ///
    /// The test walks the immediate-dominator chain of `w`; a block does not
    /// dominate itself under this test, and nothing dominates an unreachable
    /// block.
    #[must_use]
    pub fn does_dominate(&self, n: usize, w: usize) -> bool {
        let mut w = w;
        while self.idom[w] != NONE {
            if self.idom[w] == n {
                return true;
            }
            w = self.idom[w];
        }
        false
    }

    /// Depth-first numbering from the entry, matching recursive preorder.
    ///
    /// Numbers start at 1 so that 0 always means "unvisited", for the entry
    /// block as much as for any other; `vertex[i]` holds the block index in
    /// preorder position `i`.
    fn dfs(&mut self, proc: &Procedure) -> Result<()> {
        let mut stack = vec![(NONE, 0usize)];
        while let Some((p, n)) = stack.pop() {
            if self.dfnum[n] != 0 {
                continue;
            }
            self.count += 1;
            self.dfnum[n] = self.count;
            self.vertex[self.count - 1] = n;
            self.parent[n] = p;

            // Successors pushed in reverse so the first one is visited next,
            // reproducing the recursive visit order exactly.
            let block = self.bbs[n];
            for &succ in proc.cfg().block(block).successors().iter().rev() {
                let Some(&s) = self.indices.get(&succ) else {
                    log::warn!("successor {succ} of {block} has no block index");
                    return Err(structural_error!(
                        "successor {} of block {} has no block index",
                        succ,
                        block
                    ));
                };
                if self.dfnum[s] == 0 {
                    stack.push((n, s));
                }
            }
        }
        Ok(())
    }

    /// Finds the ancestor of `v` with the lowest-numbered semidominator,
    /// compressing the forest path as it returns.
    fn ancestor_with_lowest_semi(&mut self, v: usize) -> usize {
        if self.ancestor[v] == NONE {
            return v;
        }
        let a = self.ancestor[v];
        if self.ancestor[a] != NONE {
            let b = self.ancestor_with_lowest_semi(a);
            self.ancestor[v] = self.ancestor[a];
            if self.dfnum[self.semi[b]] < self.dfnum[self.semi[self.best[v]]] {
                self.best[v] = b;
            }
        }
        self.best[v]
    }

    /// Links `n` under `p` in the spanning forest.
    fn link(&mut self, p: usize, n: usize) {
        self.ancestor[n] = p;
        self.best[n] = n;
    }

    /// Computes dominance frontiers for the dominator subtree rooted at `start`.
    ///
    /// Children are found by a linear scan over the immediate-dominator vector;
    /// unreachable blocks keep [`NONE`] there and so are never treated as
    /// children.
    fn compute_df(&mut self, proc: &Procedure, start: usize) -> Result<()> {
        let mut work = vec![Visit::Enter(start)];
        while let Some(visit) = work.pop() {
            match visit {
                Visit::Enter(n) => {
                    work.push(Visit::Exit(n));
                    for c in (0..self.idom.len()).rev() {
                        if self.idom[c] == n {
                            work.push(Visit::Enter(c));
                        }
                    }
                }
                Visit::Exit(n) => {
                    let mut frontier = BTreeSet::new();
                    // DF_local: successors not immediately dominated by n
                    let block = self.bbs[n];
                    for &succ in proc.cfg().block(block).successors() {
                        let Some(&y) = self.indices.get(&succ) else {
                            log::warn!("successor {succ} of {block} has no block index");
                            return Err(structural_error!(
                                "successor {} of block {} has no block index",
                                succ,
                                block
                            ));
                        };
                        if self.idom[y] != n {
                            frontier.insert(y);
                        }
                    }
                    // DF_up: inherited from dominator-tree children
                    for c in 0..self.idom.len() {
                        if self.idom[c] != n {
                            continue;
                        }
                        for &w in &self.df[c] {
                            if n == w || !self.does_dominate(n, w) {
                                frontier.insert(w);
                            }
                        }
                    }
                    self.df[n] = frontier;
                }
            }
        }
        Ok(())
    }
}
