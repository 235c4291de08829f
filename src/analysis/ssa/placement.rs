//! Pruned phi-function placement over the dominance frontier.
//!
//! For every renamable location, phi-functions are inserted at the iterated
//! dominance frontier of its definition sites, pruned by the worklist: a
//! frontier block that already carries a phi for the location is skipped, and
//! a block joins the worklist only if the location was not originally defined
//! there. Blocks containing a childless call count as definition sites for
//! *every* location, since such a call is conservatively modeled as defining
//! all variables.
//!
//! Placement is the second stage of each construction run. It frees the
//! vectors only the dominator pass needed, rebuilds the per-block definition
//! sets from the current statements (propagation and other rewrites invalidate
//! old ones), and leaves the inserted phi-functions trivial: one parameter per
//! in-edge with no defining statement, to be filled by the renamer.

use std::collections::BTreeSet;

use crate::analysis::ssa::DataFlow;
use crate::ir::{LocationSet, PhiParam, Procedure, StmtKind};
use crate::Result;

impl DataFlow {
    /// Inserts pruned phi-functions for every renamable location defined in
    /// the procedure.
    ///
    /// Returns whether any phi was inserted, which the driver uses to decide
    /// whether renaming must run again.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if the block index does not cover
    /// the CFG (the dominator pass must have run on the current CFG first).
    pub fn place_phi_functions(&mut self, proc: &mut Procedure) -> Result<bool> {
        // Free memory only the dominator pass needed.
        self.dfnum = Vec::new();
        self.semi = Vec::new();
        self.ancestor = Vec::new();
        self.best = Vec::new();
        self.samedom = Vec::new();
        self.vertex = Vec::new();
        self.parent = Vec::new();
        self.bucket = Vec::new();

        self.defsites.clear();
        self.defallsites.clear();
        self.a_orig.clear();
        self.def_stmts.clear();
        // Stale phi sites from before a CFG restart would suppress insertion
        // into the rebuilt blocks.
        self.a_phi.clear();

        let num_bb = self.indices.len();
        if num_bb != proc.cfg().num_blocks() {
            return Err(invariant_error!(
                "block index covers {} blocks but the CFG has {}",
                num_bb,
                proc.cfg().num_blocks()
            ));
        }

        let mut change = false;
        self.a_orig = vec![LocationSet::new(); num_bb];

        // Rebuild A_orig[n] for all n from the current statements.
        for n in 0..num_bb {
            let block = self.bbs[n];
            for &sid in proc.cfg().block(block).stmts() {
                let stmt = proc.stmt(sid);
                let mut defs = LocationSet::new();
                stmt.definitions(&mut defs);
                if stmt.is_childless_call() {
                    // This block defines every variable
                    self.defallsites.insert(n);
                }
                for loc in &defs {
                    if self.can_rename(loc, proc) {
                        self.a_orig[n].insert(loc.clone());
                        self.def_stmts.insert(loc.clone(), sid);
                    }
                }
            }
        }

        for n in 0..num_bb {
            for loc in &self.a_orig[n] {
                self.defsites.entry(loc.clone()).or_default().insert(n);
            }
        }

        // Iterate over a snapshot of the keys: the define-all augmentation
        // must see the same location set no matter what it inserts.
        let locations: Vec<_> = self.defsites.keys().cloned().collect();
        for a in locations {
            // Childless calls define every variable, so every define-all
            // block is a definition site for `a`.
            let defall: Vec<usize> = self.defallsites.iter().copied().collect();
            let sites = self
                .defsites
                .get_mut(&a)
                .expect("snapshot key vanished from defsites");
            for n in defall {
                sites.insert(n);
            }

            let mut worklist: BTreeSet<usize> = sites.clone();
            while let Some(n) = worklist.pop_first() {
                let frontier: Vec<usize> = self.df[n].iter().copied().collect();
                for y in frontier {
                    if self.a_phi.get(&a).is_some_and(|placed| placed.contains(&y)) {
                        continue;
                    }
                    // Insert the trivial phi a := phi(...) at the top of y
                    change = true;
                    let params = proc
                        .cfg()
                        .block(self.bbs[y])
                        .predecessors()
                        .iter()
                        .map(|&pred| PhiParam::new(pred))
                        .collect();
                    proc.prepend_stmt(
                        self.bbs[y],
                        StmtKind::PhiAssign {
                            lhs: a.clone(),
                            params,
                        },
                    );
                    self.a_phi.entry(a.clone()).or_default().insert(y);
                    if !self.a_orig[y].contains(&a) {
                        worklist.insert(y);
                    }
                }
            }
        }

        log::debug!(
            "placed phi functions for {} in {} locations, changed: {}",
            proc.name(),
            self.a_phi.len(),
            change
        );
        Ok(change)
    }
}
