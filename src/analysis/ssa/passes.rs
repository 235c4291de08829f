//! Auxiliary passes over the populated dominator tree.
//!
//! These run independently of the construction pipeline once the dominator
//! pass has filled the tree:
//!
//! - [`DataFlow::set_dominance_nums`] gives every statement a preorder serial
//!   so later passes can ask "does this statement dominate that one" in O(1)
//! - [`DataFlow::find_live_at_dom_phi`] discovers SSA locations used by a phi
//!   that dominates their assignment, and tracks which of those phis are dead
//! - [`DataFlow::convert_implicits`] rebuilds the placement maps after the
//!   implicit-subscript rewrite, so keys like `m[r28]{-}` become `m[r28]{0}`
//!   and lookups with the converted form succeed

use std::collections::BTreeMap;

use crate::analysis::ssa::{xform, DataFlow};
use crate::ir::{Exp, LocationSet, Procedure, StmtId};

impl DataFlow {
    /// Assigns every statement a monotonically increasing number in a preorder
    /// walk of the dominator tree starting at block index `start`.
    ///
    /// `counter` carries the next number to assign, so a driver can continue
    /// numbering across disjoint subtrees.
    pub fn set_dominance_nums(&self, proc: &mut Procedure, start: usize, counter: &mut u32) {
        let mut work = vec![start];
        while let Some(n) = work.pop() {
            let stmt_ids: Vec<StmtId> = proc.cfg().block(self.bbs[n]).stmts().to_vec();
            for sid in stmt_ids {
                proc.stmt_mut(sid).set_dom_number(*counter);
                *counter += 1;
            }
            for c in (0..self.idom.len()).rev() {
                if self.idom[c] == n {
                    work.push(c);
                }
            }
        }
    }

    /// Walks the dominator tree from block index `start` looking for SSA
    /// locations that are used in a phi dominating their assignment.
    ///
    /// Entering a phi, each filled parameter is wrapped as `base{def}` and
    /// recorded in `used0`, and the phi's left-hand side wrapped with the phi
    /// itself becomes a key in `defd_by_phi`. Every use erases its location
    /// from `defd_by_phi`, so when the walk finishes only dead phis remain
    /// there. Every definition wraps itself with its statement; if that
    /// wrapped form is in `used0`, the location is indeed used by a dominating
    /// phi and moves to the final `used` set.
    pub fn find_live_at_dom_phi(
        &self,
        proc: &Procedure,
        start: usize,
        used: &mut LocationSet,
        used0: &mut LocationSet,
        defd_by_phi: &mut BTreeMap<Exp, StmtId>,
    ) {
        let mut work = vec![start];
        while let Some(n) = work.pop() {
            for &sid in proc.cfg().block(self.bbs[n]).stmts() {
                let stmt = proc.stmt(sid);
                if stmt.is_phi() {
                    for param in stmt.phi_params().expect("phi has parameters") {
                        if let Some(base) = &param.base {
                            used0.insert(Exp::subscript(base.clone(), param.def));
                        }
                    }
                    let lhs = stmt.lhs().expect("phi has a left-hand side");
                    defd_by_phi.insert(Exp::subscript(lhs.clone(), Some(sid)), sid);
                    // Fall through: phi uses are legitimate uses too
                }
                let mut uses = LocationSet::new();
                stmt.used_locs(&mut uses);
                for u in &uses {
                    // This phi-defined location is used somewhere, so the phi
                    // is live
                    defd_by_phi.remove(u);
                }
                let mut defs = LocationSet::new();
                stmt.definitions(&mut defs);
                for d in &defs {
                    let wrapped = Exp::subscript(d.clone(), Some(sid));
                    if used0.remove(&wrapped) {
                        used.insert(wrapped);
                    }
                }
            }
            for c in (0..self.idom.len()).rev() {
                if self.idom[c] == n {
                    work.push(c);
                }
            }
        }
    }

    /// Rewrites every implicit subscript `{-}` held in the placement maps into
    /// a reference to a concrete implicit definition at the procedure entry.
    ///
    /// Keys of the phi-site and definition-site maps and the members of every
    /// per-block original-definition set are converted and re-inserted into
    /// fresh containers; the block-index value sets are carried over as-is.
    /// The rewrite is idempotent, so running the conversion twice yields the
    /// same maps as once.
    pub fn convert_implicits(&mut self, proc: &mut Procedure) {
        let a_phi = std::mem::take(&mut self.a_phi);
        for (loc, sites) in a_phi {
            let loc = xform::convert_implicit_refs(proc, &loc);
            self.a_phi.insert(loc, sites);
        }

        let defsites = std::mem::take(&mut self.defsites);
        for (loc, sites) in defsites {
            let loc = xform::convert_implicit_refs(proc, &loc);
            self.defsites.insert(loc, sites);
        }

        let a_orig = std::mem::take(&mut self.a_orig);
        self.a_orig = a_orig
            .into_iter()
            .map(|set| {
                set.iter()
                    .map(|loc| xform::convert_implicit_refs(proc, loc))
                    .collect()
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::DataFlow;
    use crate::ir::ProcBuilder;

    fn diamond() -> (crate::ir::Procedure, DataFlow) {
        let mut b = ProcBuilder::new("diamond");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        let b3 = b.block();
        b.edge(b0, b1);
        b.edge(b0, b2);
        b.edge(b1, b3);
        b.edge(b2, b3);
        b.assign(b1, Exp::Reg(24), Exp::Const(1));
        b.assign(b2, Exp::Reg(24), Exp::Const(2));
        b.ret(b3, Some(Exp::Reg(24)));
        let mut proc = b.finish();
        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();
        (proc, df)
    }

    #[test]
    fn test_dominance_nums_are_preorder() {
        let (mut proc, df) = diamond();
        let mut counter = 0;
        df.set_dominance_nums(&mut proc, 0, &mut counter);
        assert_eq!(counter as usize, proc.num_stmts());

        // The entry's statements are numbered before any dominated block's,
        // and numbers are strictly increasing within a block
        for block in proc.cfg().block_ids() {
            let stmts = proc.cfg().block(block).stmts();
            for pair in stmts.windows(2) {
                let a = proc.stmt(pair[0]).dom_number().unwrap();
                let b = proc.stmt(pair[1]).dom_number().unwrap();
                assert!(a < b);
            }
        }
    }

    #[test]
    fn test_find_live_at_dom_phi_keeps_live_phi() {
        // In the diamond, the phi at the join is used by the return, so it is
        // not left in defd_by_phi; nothing is assigned below the phi, so the
        // used set stays empty
        let (proc, df) = diamond();
        let mut used = LocationSet::new();
        let mut used0 = LocationSet::new();
        let mut defd = BTreeMap::new();
        df.find_live_at_dom_phi(&proc, 0, &mut used, &mut used0, &mut defd);
        assert!(defd.is_empty());
        assert!(used.is_empty());
        // Both phi parameters were seen as wrapped uses
        assert_eq!(used0.len(), 2);
    }

    #[test]
    fn test_find_live_at_dom_phi_flags_dead_phi() {
        // A loop where the phi merges a value nothing ever reads: the phi
        // stays in defd_by_phi (dead), and the body's assignment lands in
        // `used` because the dominating phi refers to it
        let mut b = ProcBuilder::new("deadphi");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        b.edge(b0, b1);
        b.edge(b1, b1);
        b.edge(b1, b2);
        b.assign(b0, Exp::Reg(24), Exp::Const(0));
        b.assign(b1, Exp::Reg(24), Exp::Const(1));
        b.ret(b2, None);
        let mut proc = b.finish();
        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        let mut used = LocationSet::new();
        let mut used0 = LocationSet::new();
        let mut defd = BTreeMap::new();
        df.find_live_at_dom_phi(&proc, 0, &mut used, &mut used0, &mut defd);

        // The phi's value is never used
        assert_eq!(defd.len(), 1);
        // The in-loop assignment is referenced by the dominating phi
        assert_eq!(used.len(), 1);
    }

    #[test]
    fn test_convert_implicits_rewrites_keys_idempotently() {
        // A use of an undefined stack slot leaves an implicit subscript; after
        // conversion the placement maps key on the concrete entry definition
        let mut b = ProcBuilder::new("imp");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        let b3 = b.block();
        b.edge(b0, b1);
        b.edge(b0, b2);
        b.edge(b1, b3);
        b.edge(b2, b3);
        let slot = Exp::mem_of(Exp::Reg(28));
        b.assign(b1, slot.clone(), Exp::Const(1));
        b.assign(b2, slot.clone(), Exp::Const(2));
        b.ret(b3, Some(slot.clone()));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.set_rename_locals_and_params(true);
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        assert!(df.phi_sites(&slot).is_some());

        df.convert_implicits(&mut proc);
        // The un-subscripted key survives conversion unchanged here (no
        // implicit subscript inside), so lookups still succeed
        assert!(df.phi_sites(&slot).is_some());

        // Keys holding implicit subscripts convert to the entry definition
        let wrapped = Exp::subscript(slot.clone(), None);
        let converted = xform::convert_implicit_refs(&mut proc, &wrapped);
        let imp = proc.implicit_assign(&slot).unwrap();
        assert_eq!(converted, Exp::subscript(slot.clone(), Some(imp)));

        // Idempotent: converting again changes nothing
        let before = df.dump_a_phi();
        df.convert_implicits(&mut proc);
        assert_eq!(df.dump_a_phi(), before);
    }
}
