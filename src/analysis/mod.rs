//! Program analysis over lifted procedures.
//!
//! The analysis layer hosts the mid-end passes of the decompiler. Its core is
//! the SSA construction and maintenance engine in [`ssa`]: dominator tree and
//! dominance frontier computation, pruned phi placement, use renaming, and the
//! call/return side collectors, all owned by one [`DataFlow`] per procedure.
//!
//! # Pipeline
//!
//! A construction run over a procedure is three stages in order, with the
//! auxiliary passes available afterwards:
//!
//! ```rust,ignore
//! let mut df = DataFlow::new();
//! df.dominators(&proc)?;                       // index blocks, build the tree
//! df.place_phi_functions(&mut proc)?;          // insert trivial phis
//! df.rename_block_vars(&mut proc, 0, true)?;   // subscript every use
//! ```
//!
//! The driver may re-run all three after mutating the CFG; every stage rebuilds
//! its state from scratch.

pub mod ssa;

pub use ssa::{CollectedDef, DataFlow, DefCollector, DefStacks, UseCollector};
