// Copyright 2025-2026 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! # retroscope
//!
//! An SSA construction and dataflow maintenance engine for machine-code
//! decompilation. Given a procedure's control flow graph of three-address
//! statements over symbolic locations (registers, temporaries, flags, stack
//! slots), `retroscope` computes dominators and dominance frontiers, inserts
//! minimal pruned phi-functions, subscripts every use with its unique
//! reaching definition, and keeps interprocedural side-state (reaching
//! definitions at calls and returns, uses-before-definition) current while it
//! does so.
//!
//! # Architecture
//!
//! The library is organized in two layers:
//!
//! - **IR Layer** ([`ir`]): location expressions with structural equality and
//!   a total order, arena-allocated statements, the control flow graph, and
//!   the procedure that owns them
//! - **Analysis Layer** ([`analysis`]): the SSA engine proper, one
//!   [`analysis::DataFlow`] per procedure, plus the auxiliary passes that run
//!   over the populated dominator tree (dominance numbering, live-at-
//!   dominating-phi discovery, implicit-reference conversion)
//!
//! # Usage
//!
//! ```rust
//! use retroscope::prelude::*;
//!
//! // if-then-else join: both arms assign r24, the join returns it
//! let mut b = ProcBuilder::new("max_ish");
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
//! let placed = df.place_phi_functions(&mut proc)?;
//! assert!(placed); // one phi for r24 at the join
//! df.rename_block_vars(&mut proc, 0, true)?;
//! # Ok::<(), retroscope::Error>(())
//! ```
//!
//! # Policy Knobs
//!
//! Two driver-controlled flags shape a run:
//!
//! - [`analysis::DataFlow::set_rename_locals_and_params`] - enable renaming of
//!   named locals and stack-slot dereferences after escape analysis
//! - [`analysis::DataFlow::set_assume_abi`] - assume childless calls are
//!   ABI-compliant instead of modeling them as defining every variable
//!
//! # Error Handling
//!
//! Failures are structural (a CFG edge naming an unindexed block) or
//! invariant violations (an unbalanced definition-stack pop); both abort the
//! pass with a diagnostic, and the driver restarts construction from the
//! dominator pass if it wants to retry. See [`Error`].

#[macro_use]
pub(crate) mod error;

pub mod analysis;
pub mod ir;
pub mod prelude;

pub use error::Error;

/// Convenience alias for `Result<T, retroscope::Error>`.
pub type Result<T> = std::result::Result<T, Error>;
