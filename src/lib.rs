// VpnReach: Policy-aware route propagation checks for BGP/MPLS VPNs
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # VpnReach: Policy-aware route propagation checks for BGP/MPLS VPNs
//!
//! This crate checks whether a route for a given address can propagate from one provider edge
//! router to another, given the iBGP sessions, the route-targets that each router exports and
//! imports, and the ordered import filters (ACL chains) of each router. Every check is a
//! satisfiability query on the Z3 SMT solver.
//!
//! The interesting part is how the filters are encoded. There are two strategies, which must
//! always agree on the verdict:
//!
//! - The *global* encoding ([`encoding::GlobalEncoding`]) defines the predicate
//!   `Is_Prefix_Denied(router, address)` for all routers up-front using universally quantified
//!   assertions.
//! - The *local* encoding ([`encoding::LocalEncoding`]) compiles only the filters of the
//!   destination router, at query time, directly over the address of the query.
//!
//! ## Structure
//! The source code of this program is structured as follows:
//! - The module [`model`] contains the immutable [`PolicyModel`], which is built from the parsed
//!   topology and configuration in [`input`].
//! - The module [`session`] declares the sorts and relations in the solver, and asserts the base
//!   constraints of the model ([`Session`]).
//! - The module [`encoding`] contains the ACL chain compiler ([`encoding::compile_chain`]) and both
//!   encoding strategies.
//! - The module [`evaluator`] checks individual queries ([`Evaluator`]), each within its own solver
//!   scope.
//! - The module [`compare`] runs both strategies on the same queries, and reports their timing and
//!   any divergence.
//! - The module [`generate`] builds the reference network and random networks.
//!
//! ## Example
//!
//! ```no_run
//! use vpnreach::{generate, Evaluator, PolicyModel, Query, Session, Verdict};
//! use vpnreach::encoding::LocalEncoding;
//!
//! let (topo, config) = generate::reference_network();
//! let model = PolicyModel::from_input(&topo, &config).unwrap();
//! let ctx = z3::Context::new(&z3::Config::new());
//! let mut evaluator = Evaluator::new(&model, Session::new(&ctx, &model), LocalEncoding::new());
//! let query = Query::from_names(&model, "PE2", "PE1", "10.0.1.100").unwrap();
//! assert_eq!(evaluator.evaluate(&query).unwrap().verdict, Verdict::Unsatisfiable);
//! ```

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::result_large_err)]

pub mod compare;
pub mod encoding;
pub mod evaluator;
pub mod formatter;
pub mod generate;
pub mod input;
pub mod model;
pub mod session;
#[cfg(test)]
mod test;

pub use compare::{compare, CompareOptions, Comparison, Strategy};
pub use evaluator::{Evaluator, Query, QueryError, QueryResult, Verdict};
pub use model::{ModelError, PolicyModel, RouterId};
pub use session::Session;
