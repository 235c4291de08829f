//! Intermediate representation of lifted procedures.
//!
//! This module provides the collaborator layer the SSA engine works over:
//!
//! - [`exp`] - Symbolic location expressions with structural equality and order
//! - [`stmt`] - Three-address statements and the arena handle [`StmtId`]
//! - [`cfg`] - The control flow graph of basic blocks
//! - [`proc`] - The procedure: statement arena, CFG, symbols, escape set
//! - [`builder`] - Fluent procedure construction for tests and drivers
//!
//! # Ownership Model
//!
//! Statements live in a per-procedure arena and are addressed by [`StmtId`];
//! blocks hold ordered handle lists. Expressions are plain values with deep
//! clones, so containers in the analysis layer never alias procedure-owned
//! trees. SSA subscripts ([`Exp::Ref`]) and phi parameters refer to defining
//! statements by handle, which keeps the statement graph acyclic.

mod builder;
mod cfg;
mod exp;
mod proc;
mod stmt;

pub use builder::ProcBuilder;
pub use cfg::{BasicBlock, BlockId, Cfg};
pub use exp::{BinOp, Exp, FlagKind, LocationSet};
pub use proc::Procedure;
pub use stmt::{PhiParam, Stmt, StmtId, StmtKind};
