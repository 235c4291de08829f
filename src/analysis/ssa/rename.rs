//! SSA renaming over the dominator tree, and the rename policy.
//!
//! Renaming walks the dominator tree in preorder on an explicit work stack.
//! Entering a block it rewrites every renamable use `x` into `x{d}`, where `d`
//! is the definition on top of `x`'s stack (falling back to the reaching
//! define-all statement, and finally to the implicit subscript `{-}` with the
//! location recorded in the procedure-entry use collector). It then snapshots
//! reaching definitions into call/return collectors, pushes the block's own
//! definitions, and fills the phi parameters of CFG successors. Leaving a
//! block it pops what it pushed, scanning the statements backwards so the
//! blanket pushes of childless calls come off in the right order.
//!
//! The stacks are keyed by expression; a key is only ever created by a push.
//! Lookups go through [`DataFlow::stack_top`], which never materializes an
//! entry, so probing cannot corrupt the map.

use crate::analysis::ssa::DataFlow;
use crate::ir::{BlockId, Exp, LocationSet, Procedure, StmtId};
use crate::Result;

enum Frame {
    Enter(usize),
    Exit(usize),
}

impl DataFlow {
    /// Returns `true` if `e` may be SSA-renamed under the current policy.
    ///
    /// A single outer subscript is peeled first. Registers, temporaries, and
    /// flags always rename. Named locals and dereferences matching the
    /// procedure's local-or-parameter pattern rename only in the
    /// post-escape-analysis phase, and a dereference additionally requires
    /// that its address has not escaped. Everything else (the program counter,
    /// constants, unrecognized forms) never renames.
    ///
    /// The predicate is pure: callers may memoize it across a single pass.
    #[must_use]
    pub fn can_rename(&self, e: &Exp, proc: &Procedure) -> bool {
        let e = e.strip_subscript(); // Look inside refs
        if e.is_reg() || e.is_temp() || e.is_flags() || e.is_main_flag() {
            return true;
        }
        if e.is_local() {
            // Hard locals only once escape analysis has run
            return self.rename_locals_and_params;
        }
        if !e.is_mem_of() {
            return false; // Can't rename %pc or other junk
        }
        // A dereference must match the local/parameter pattern, and even then
        // only renames after escape analysis, if the address has not escaped
        if !proc.is_local_or_param_pattern(e) {
            return false;
        }
        self.rename_locals_and_params && !proc.is_address_escaped_var(e)
    }

    /// Subscripts every renamable use in the dominator subtree rooted at block
    /// index `start` with its reaching definition.
    ///
    /// A full construction run starts at block 0 with `clear_stacks` set, which
    /// discards any definition stacks left over from a prior run (their keys
    /// may name expressions that no longer exist). Returns whether any
    /// substitution occurred.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Invariant`] if a definition stack pop has no
    /// matching push, or if a defined local has no mapped location.
    pub fn rename_block_vars(
        &mut self,
        proc: &mut Procedure,
        start: usize,
        clear_stacks: bool,
    ) -> Result<bool> {
        if clear_stacks {
            self.stacks.clear();
        }
        let mut changed = false;
        let mut work = vec![Frame::Enter(start)];
        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(n) => {
                    changed |= self.rename_enter(proc, n)?;
                    work.push(Frame::Exit(n));
                    // Children pushed in reverse so the lowest index runs next
                    for c in (0..self.idom.len()).rev() {
                        if self.idom[c] == n {
                            work.push(Frame::Enter(c));
                        }
                    }
                }
                Frame::Exit(n) => self.rename_exit(proc, n)?,
            }
        }
        Ok(changed)
    }

    /// Renames within block index `n` and fills successor phi parameters.
    fn rename_enter(&mut self, proc: &mut Procedure, n: usize) -> Result<bool> {
        let mut changed = false;
        let block = self.bbs[n];
        let stmt_ids: Vec<StmtId> = proc.cfg().block(block).stmts().to_vec();

        for sid in stmt_ids {
            // Collect the used locations of S. For a phi, only the address of
            // a dereference left-hand side contributes; the parameters were
            // renamed at the end of their predecessors.
            let mut locs = LocationSet::new();
            let stmt = proc.stmt(sid);
            if stmt.is_phi() {
                let lhs = stmt.lhs().expect("phi has a left-hand side").clone();
                if let Exp::MemOf(addr) = &lhs {
                    addr.used_locs(&mut locs);
                }
                // A phi may merge a location defined at a call, in which case
                // that call's use collector needs to hear about the phi
                let param_defs: Vec<StmtId> = stmt
                    .phi_params()
                    .expect("phi has parameters")
                    .iter()
                    .filter_map(|param| param.def)
                    .collect();
                for def in param_defs {
                    if proc.stmt(def).is_call() {
                        self.use_collector_mut(def).insert(lhs.clone());
                    }
                }
            } else {
                stmt.used_locs(&mut locs);
            }

            for x in locs {
                if !self.can_rename(&x, proc) {
                    continue;
                }
                if let Some((base, def)) = x.as_subscript() {
                    // Already subscripted: no renaming, but redo the usage
                    // analysis in case call livenesses were rebuilt
                    match def {
                        Some(d) if proc.stmt(d).is_call() => {
                            self.use_collector_mut(d).insert(base.clone());
                        }
                        None => self.use_before_define(base.clone()),
                        _ => {}
                    }
                    continue;
                }
                let mut def = self.stack_top(&x);
                if def.is_none() {
                    def = self.stack_top(&Exp::DefineAll);
                    if def.is_none() {
                        // No definition reaches at all: leave the subscript
                        // implicit and record the use at the procedure entry
                        self.use_before_define(x.clone());
                    }
                }
                if let Some(d) = def {
                    if proc.stmt(d).is_call() {
                        // Calls track locations used before definition at them
                        self.use_collector_mut(d).insert(x.clone());
                    }
                }
                changed = true;
                proc.stmt_mut(sid).subscript_var(&x, def);
            }

            // Calls and returns snapshot the reaching definitions before the
            // statement's own defines are pushed
            if proc.stmt(sid).is_call() || proc.stmt(sid).is_return() {
                self.def_collectors
                    .entry(sid)
                    .or_default()
                    .update_defs(&self.stacks);
            }

            // Push this statement for each location it defines
            let mut defs = LocationSet::new();
            proc.stmt(sid).definitions(&mut defs);
            for a in &defs {
                if !self.can_rename(a, proc) {
                    continue;
                }
                self.push_def(a, sid);
                if let Exp::Local(name) = a {
                    // A named local also shadows the location its symbol
                    // resolves to
                    let resolved = proc.exp_from_symbol(name).cloned().ok_or_else(|| {
                        invariant_error!("local {} has no mapped location", name)
                    })?;
                    self.push_def(&resolved, sid);
                }
            }

            // A childless call defines every variable, at least until the
            // driver asserts ABI compliance
            if proc.stmt(sid).is_childless_call() && !self.assume_abi {
                self.stacks.entry(Exp::DefineAll).or_default();
                for stack in self.stacks.values_mut() {
                    stack.push(sid);
                }
            }
        }

        // Fill the phi parameters our successors hold for this block
        let succs: Vec<BlockId> = proc.cfg().block(block).successors().to_vec();
        for succ in succs {
            let succ_stmts: Vec<StmtId> = proc.cfg().block(succ).stmts().to_vec();
            for sid in succ_stmts {
                // Not a break: a rewrite can turn a phi into an ordinary
                // assign mid-block
                if !proc.stmt(sid).is_phi() {
                    continue;
                }
                let a = proc
                    .stmt(sid)
                    .lhs()
                    .expect("phi has a left-hand side")
                    .clone();
                if !self.can_rename(&a, proc) {
                    continue;
                }
                let def = self.stack_top(&a);
                proc.stmt_mut(sid).put_phi_param(block, def, a);
            }
        }

        Ok(changed)
    }

    /// Pops everything [`Self::rename_enter`] pushed for block index `n`.
    ///
    /// Statements are walked backwards: a childless call pushed itself onto
    /// every stack, so its blanket pops must interleave with the ordinary
    /// definition pops in reverse statement order.
    fn rename_exit(&mut self, proc: &Procedure, n: usize) -> Result<()> {
        let block = self.bbs[n];
        let stmt_ids: Vec<StmtId> = proc.cfg().block(block).stmts().to_vec();
        for &sid in stmt_ids.iter().rev() {
            let mut defs = LocationSet::new();
            proc.stmt(sid).definitions(&mut defs);
            for a in &defs {
                if !self.can_rename(a, proc) {
                    continue;
                }
                self.pop_def(a)?;
                if let Exp::Local(name) = a {
                    let resolved = proc.exp_from_symbol(name).cloned().ok_or_else(|| {
                        invariant_error!("local {} has no mapped location", name)
                    })?;
                    self.pop_def(&resolved)?;
                }
            }
            if proc.stmt(sid).is_childless_call() {
                for stack in self.stacks.values_mut() {
                    if stack.last() == Some(&sid) {
                        stack.pop();
                    }
                }
            }
        }
        Ok(())
    }

    fn push_def(&mut self, loc: &Exp, def: StmtId) {
        if let Some(stack) = self.stacks.get_mut(loc) {
            stack.push(def);
        } else {
            self.stacks.insert(loc.clone(), vec![def]);
        }
    }

    fn pop_def(&mut self, loc: &Exp) -> Result<()> {
        let Some(stack) = self.stacks.get_mut(loc) else {
            log::warn!("tried to pop {loc} from the definition stacks; no entry exists");
            return Err(invariant_error!(
                "tried to pop {} from the definition stacks; no entry exists",
                loc
            ));
        };
        if stack.pop().is_none() {
            log::warn!("tried to pop {loc} from an empty definition stack");
            return Err(invariant_error!(
                "tried to pop {} from an empty definition stack",
                loc
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::analysis::DataFlow;
    use crate::ir::{Exp, ProcBuilder, StmtKind};

    #[test]
    fn test_straight_line_use_sees_latest_def() {
        // 0 -> 1 -> 2: r24 := 1; r24 := 2; ret r24
        let mut b = ProcBuilder::new("line");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        b.edge(b0, b1);
        b.edge(b1, b2);
        b.assign(b0, Exp::Reg(24), Exp::Const(1));
        let second = b.assign(b1, Exp::Reg(24), Exp::Const(2));
        let ret = b.ret(b2, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        assert!(!df.place_phi_functions(&mut proc).unwrap());
        assert!(df.rename_block_vars(&mut proc, 0, true).unwrap());

        match proc.stmt(ret).kind() {
            StmtKind::Return { value: Some(value) } => {
                assert_eq!(value, &Exp::subscript(Exp::Reg(24), Some(second)));
            }
            other => panic!("unexpected return shape: {other:?}"),
        }
    }

    #[test]
    fn test_stacks_are_balanced_after_renaming() {
        let mut b = ProcBuilder::new("balance");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        let b3 = b.block();
        b.edge(b0, b1);
        b.edge(b0, b2);
        b.edge(b1, b3);
        b.edge(b2, b3);
        b.assign(b0, Exp::Reg(25), Exp::Const(0));
        b.assign(b1, Exp::Reg(24), Exp::Const(1));
        b.childless_call(b2, "unknown", vec![]);
        b.ret(b3, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        // Every push was popped on the way out
        assert_eq!(df.stack_depth(&Exp::Reg(24)), 0);
        assert_eq!(df.stack_depth(&Exp::Reg(25)), 0);
        assert_eq!(df.stack_depth(&Exp::DefineAll), 0);

        // The stack dump agrees: every surviving entry renders drained
        let dump = df.dump_stacks(&proc);
        assert!(dump.starts_with("Stacks:"));
        assert!(dump.contains("Var r24 [ ]"));
        assert!(dump.contains("Var <all> [ ]"));
    }

    #[test]
    fn test_use_without_def_gets_implicit_subscript() {
        let mut b = ProcBuilder::new("implicit");
        let b0 = b.block();
        let ret = b.ret(b0, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        match proc.stmt(ret).kind() {
            StmtKind::Return { value: Some(value) } => {
                assert_eq!(value, &Exp::subscript(Exp::Reg(24), None));
            }
            other => panic!("unexpected return shape: {other:?}"),
        }
        assert!(df.entry_uses().contains(&Exp::Reg(24)));
    }

    #[test]
    fn test_renaming_is_idempotent_on_subscripted_uses() {
        let mut b = ProcBuilder::new("idem");
        let b0 = b.block();
        let def = b.assign(b0, Exp::Reg(24), Exp::Const(1));
        let ret = b.ret(b0, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();
        let expected = Exp::subscript(Exp::Reg(24), Some(def));

        // A second pass leaves the subscript alone
        df.rename_block_vars(&mut proc, 0, true).unwrap();
        match proc.stmt(ret).kind() {
            StmtKind::Return { value: Some(value) } => assert_eq!(value, &expected),
            other => panic!("unexpected return shape: {other:?}"),
        }
    }

    #[test]
    fn test_childless_call_becomes_reaching_def() {
        // 0: r24 := 1; 1: childless call; 2: ret r24 -- straight line
        let mut b = ProcBuilder::new("defall");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        b.edge(b0, b1);
        b.edge(b1, b2);
        b.assign(b0, Exp::Reg(24), Exp::Const(1));
        let call = b.childless_call(b1, "unknown", vec![]);
        let ret = b.ret(b2, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        match proc.stmt(ret).kind() {
            StmtKind::Return { value: Some(value) } => {
                assert_eq!(value, &Exp::subscript(Exp::Reg(24), Some(call)));
            }
            other => panic!("unexpected return shape: {other:?}"),
        }
        // The use reached a call definition, so the call collected it
        assert!(df.use_collector(call).unwrap().contains(&Exp::Reg(24)));
    }

    #[test]
    fn test_assume_abi_disables_define_all() {
        let mut b = ProcBuilder::new("abi");
        let b0 = b.block();
        let b1 = b.block();
        let b2 = b.block();
        b.edge(b0, b1);
        b.edge(b1, b2);
        let def = b.assign(b0, Exp::Reg(24), Exp::Const(1));
        b.childless_call(b1, "unknown", vec![]);
        let ret = b.ret(b2, Some(Exp::Reg(24)));
        let mut proc = b.finish();

        let mut df = DataFlow::new();
        assert!(!df.assumes_abi());
        df.set_assume_abi(true);
        assert!(df.assumes_abi());
        df.dominators(&proc).unwrap();
        df.place_phi_functions(&mut proc).unwrap();
        df.rename_block_vars(&mut proc, 0, true).unwrap();

        // Under the ABI assumption the call does not clobber r24
        match proc.stmt(ret).kind() {
            StmtKind::Return { value: Some(value) } => {
                assert_eq!(value, &Exp::subscript(Exp::Reg(24), Some(def)));
            }
            other => panic!("unexpected return shape: {other:?}"),
        }
    }

    #[test]
    fn test_can_rename_policy() {
        let mut b = ProcBuilder::new("policy");
        let b0 = b.block();
        b.ret(b0, None);
        b.escape(Exp::mem_of(Exp::Reg(28)));
        let proc = b.finish();

        let mut df = DataFlow::new();
        assert!(df.can_rename(&Exp::Reg(24), &proc));
        assert!(df.can_rename(&Exp::Temp("tmp1".to_string()), &proc));
        assert!(df.can_rename(&Exp::Flags, &proc));
        assert!(df.can_rename(&Exp::subscript(Exp::Reg(24), None), &proc));
        assert!(!df.can_rename(&Exp::Pc, &proc));
        assert!(!df.can_rename(&Exp::Const(4), &proc));
        assert!(!df.can_rename(&Exp::Local("x".to_string()), &proc));
        assert!(!df.can_rename(&Exp::mem_of(Exp::Reg(25)), &proc));

        // Stack slots need the post-escape-analysis policy, and escape wins
        let slot = Exp::mem_of(Exp::binary(
            crate::ir::BinOp::Plus,
            Exp::Reg(28),
            Exp::Const(4),
        ));
        assert!(!df.can_rename(&slot, &proc));
        df.set_rename_locals_and_params(true);
        assert!(df.can_rename(&slot, &proc));
        assert!(df.can_rename(&Exp::Local("x".to_string()), &proc));
        assert!(!df.can_rename(&Exp::mem_of(Exp::Reg(28)), &proc));
    }
}
