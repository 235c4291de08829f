//! Side collectors for call and return boundaries.
//!
//! SSA renaming is a single walk over the dominator tree, but calls and returns
//! need to remember what that walk saw as it passed them:
//!
//! - A [`DefCollector`] snapshots the definitions reaching a call or return, as
//!   synthetic assignments `loc := loc{def}`. The caller side of interprocedural
//!   analysis reads these to know what the statement could observe or propagate.
//! - A [`UseCollector`] accumulates the locations used before being defined
//!   along the current path. Each call has one (locations live into the call),
//!   and the procedure entry has one (locations live into the procedure, which
//!   become parameter candidates).
//!
//! Collectors are stored in side tables keyed by statement handle (see
//! [`crate::analysis::DataFlow`]), so statements and collectors never hold
//! references to each other.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::ir::{Exp, Procedure, StmtId};

use crate::analysis::ssa::xform;

/// The definition stacks maintained by the renamer: for each location, the
/// statements currently defining it on the path from the entry to the traversal
/// position, innermost last.
pub type DefStacks = BTreeMap<Exp, Vec<StmtId>>;

/// One collected reaching definition: a synthetic assignment `lhs := rhs` where
/// `rhs` is `lhs` subscripted with its reaching definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedDef {
    lhs: Exp,
    rhs: Exp,
}

impl CollectedDef {
    /// Returns the defined location.
    #[must_use]
    pub fn lhs(&self) -> &Exp {
        &self.lhs
    }

    /// Returns the subscripted right-hand side.
    #[must_use]
    pub fn rhs(&self) -> &Exp {
        &self.rhs
    }
}

impl fmt::Display for CollectedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.lhs, self.rhs)
    }
}

/// A snapshot of the definitions reaching a call or return statement.
///
/// Definitions are keyed by left-hand side; inserting a second definition for
/// the same location is a no-op. Lookup is a linear scan over the collected
/// definitions, which stay in the deterministic order the snapshot inserted
/// them (expression order of the definition stacks).
#[derive(Debug, Clone, Default)]
pub struct DefCollector {
    initialised: bool,
    defs: Vec<CollectedDef>,
}

impl DefCollector {
    /// Creates an empty, uninitialised collector.
    #[must_use]
    pub fn new() -> Self {
        DefCollector::default()
    }

    /// Returns `true` once a snapshot has been taken.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Returns the number of collected definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns `true` if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterates over the collected definitions.
    pub fn iter(&self) -> impl Iterator<Item = &CollectedDef> {
        self.defs.iter()
    }

    /// Removes every collected definition and resets the initialised flag.
    pub fn clear(&mut self) {
        self.defs.clear();
        self.initialised = false;
    }

    /// Snapshots the currently reaching definitions from the renamer's stacks.
    ///
    /// Every stack with a definition on top contributes one synthetic
    /// assignment `loc := loc{def}`. The define-all stack contributes its own
    /// entry under the sentinel, standing for everything a childless call
    /// defines.
    pub fn update_defs(&mut self, stacks: &DefStacks) {
        for (loc, stack) in stacks {
            let Some(&def) = stack.last() else {
                continue; // This location's definition doesn't reach here
            };
            self.insert(loc.clone(), Exp::subscript(loc.clone(), Some(def)));
        }
        self.initialised = true;
    }

    /// Finds the definition for `e` that reaches this collector, returning its
    /// subscripted right-hand side, or `None` if nothing explicit reaches here.
    #[must_use]
    pub fn find_def_for(&self, e: &Exp) -> Option<&Exp> {
        self.defs
            .iter()
            .find(|def| &def.lhs == e)
            .map(CollectedDef::rhs)
    }

    /// Returns `true` if a definition with this left-hand side was collected.
    #[must_use]
    pub fn exists_on_left(&self, lhs: &Exp) -> bool {
        self.defs.iter().any(|def| &def.lhs == lhs)
    }

    /// Inserts a definition unless one with the same left-hand side exists.
    pub fn insert(&mut self, lhs: Exp, rhs: Exp) {
        if self.exists_on_left(&lhs) {
            return;
        }
        self.defs.push(CollectedDef { lhs, rhs });
    }

    /// Replaces this collector's contents with a deep copy of `other`.
    pub fn make_clone_of(&mut self, other: &DefCollector) {
        self.initialised = other.initialised;
        self.defs = other.defs.clone();
    }

    /// Rewrites every occurrence of `from` to `to` across the collected
    /// definitions, returning whether anything changed.
    pub fn search_replace_all(&mut self, from: &Exp, to: &Exp) -> bool {
        let mut change = false;
        for def in &mut self.defs {
            let (lhs, c1) = def.lhs.search_replace(from, to);
            let (rhs, c2) = def.rhs.search_replace(from, to);
            def.lhs = lhs;
            def.rhs = rhs;
            change |= c1 || c2;
        }
        change
    }
}

impl fmt::Display for DefCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, def) in self.defs.iter().enumerate() {
            if i > 0 {
                write!(f, ",   ")?;
            }
            write!(f, "{def}")?;
        }
        Ok(())
    }
}

/// The locations used before being defined along the current path.
///
/// Insertion deduplicates by structural equality; iteration follows the
/// expression order.
#[derive(Debug, Clone, Default)]
pub struct UseCollector {
    initialised: bool,
    locs: BTreeSet<Exp>,
}

impl UseCollector {
    /// Creates an empty, uninitialised collector.
    #[must_use]
    pub fn new() -> Self {
        UseCollector::default()
    }

    /// Returns `true` once the collector has seen at least one update.
    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    /// Returns the number of collected locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locs.len()
    }

    /// Returns `true` if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    /// Records a location as used before defined.
    pub fn insert(&mut self, loc: Exp) {
        self.locs.insert(loc);
        self.initialised = true;
    }

    /// Returns `true` if the location was collected.
    #[must_use]
    pub fn contains(&self, loc: &Exp) -> bool {
        self.locs.contains(loc)
    }

    /// Removes a location.
    pub fn remove(&mut self, loc: &Exp) {
        self.locs.remove(loc);
    }

    /// Iterates over the collected locations in expression order.
    pub fn iter(&self) -> impl Iterator<Item = &Exp> {
        self.locs.iter()
    }

    /// Removes every collected location and resets the initialised flag.
    pub fn clear(&mut self) {
        self.locs.clear();
        self.initialised = false;
    }

    /// Replaces this collector's contents with a deep copy of `other`.
    pub fn make_clone_of(&mut self, other: &UseCollector) {
        self.initialised = other.initialised;
        self.locs = other.locs.clone();
    }

    /// Translates the collected locations out of SSA form.
    ///
    /// Each location is wrapped as `loc{def}` and run through the SSA-removing
    /// rewrite, which strips subscripts and substitutes mapped local symbols.
    /// Locations whose rewrite differs replace the originals.
    pub fn from_ssa_form(&mut self, proc: &Procedure, def: StmtId) {
        let mut removes = Vec::new();
        let mut inserts = Vec::new();
        for loc in &self.locs {
            let wrapped = Exp::subscript(loc.clone(), Some(def));
            let out = xform::strip_ssa(proc, &wrapped);
            if &out != loc {
                removes.push(loc.clone());
                inserts.push(out);
            }
        }
        for loc in removes {
            self.locs.remove(&loc);
        }
        for loc in inserts {
            self.locs.insert(loc);
        }
    }
}

impl PartialEq for UseCollector {
    fn eq(&self, other: &Self) -> bool {
        self.initialised == other.initialised && self.locs == other.locs
    }
}

impl Eq for UseCollector {}

impl fmt::Display for UseCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, loc) in self.locs.iter().enumerate() {
            if i > 0 {
                write!(f, ",  ")?;
            }
            write!(f, "{loc}")?;
        }
        Ok(())
    }
}
