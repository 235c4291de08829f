//! Convenient re-exports of the most commonly used types.
//!
//! Import everything a typical driver needs with one line:
//!
//! ```rust
//! use retroscope::prelude::*;
//!
//! let mut b = ProcBuilder::new("f");
//! let b0 = b.block();
//! b.ret(b0, Some(Exp::Reg(24)));
//! let mut proc = b.finish();
//!
//! let mut df = DataFlow::new();
//! df.dominators(&proc)?;
//! df.place_phi_functions(&mut proc)?;
//! df.rename_block_vars(&mut proc, 0, true)?;
//! # Ok::<(), retroscope::Error>(())
//! ```

pub use crate::analysis::{DataFlow, DefCollector, UseCollector};
pub use crate::ir::{
    BasicBlock, BinOp, BlockId, Cfg, Exp, FlagKind, LocationSet, PhiParam, ProcBuilder, Procedure,
    Stmt, StmtId, StmtKind,
};
pub use crate::{Error, Result};
