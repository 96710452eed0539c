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

//! # Encoding Strategies
//!
//! An encoding decides how the import filters of the routers enter the solver. Both strategies
//! implement the [`Encoding`] trait, and they must always produce the same verdicts:
//!
//! - [`GlobalEncoding`] compiles the filters of every router once, and asserts a quantified
//!   definition of `Is_Prefix_Denied` for each of them before any query is checked.
//! - [`LocalEncoding`] registers nothing up-front. Instead, it compiles the filters of the
//!   destination router for every query and inlines them into the query formula.
//!
//! Both strategies share the same chain compiler ([`compile_chain`]).

use std::time::Duration;

use z3::ast::{Bool, Int};

use crate::{
    model::{PolicyModel, RouterId},
    session::Session,
};

pub mod acl;
mod global;
mod local;

pub use acl::compile_chain;
pub use global::GlobalEncoding;
pub use local::LocalEncoding;

/// Statistics about the work done while materializing an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct MaterializeStats {
    /// Number of rules that were compiled
    pub num_rules: usize,
    /// Number of assertions added to the session
    pub num_assertions: usize,
    /// Time required to compile and assert everything
    pub duration: Duration,
}

impl std::fmt::Display for MaterializeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rules in {} assertions ({:.4}s)",
            self.num_rules,
            self.num_assertions,
            self.duration.as_secs_f64()
        )
    }
}

/// Strategy to encode the import filters of routers.
pub trait Encoding {
    /// Name of the strategy, used for logging.
    fn name(&self) -> &'static str;

    /// Prepare the session before any query is checked. Everything asserted here is permanent.
    fn materialize<'ctx>(
        &mut self,
        session: &mut Session<'ctx>,
        model: &PolicyModel,
    ) -> MaterializeStats;

    /// Get a formula that holds if and only if `router` denies `address`.
    ///
    /// **Warning** `router` must be part of the model.
    fn denied<'ctx>(
        &self,
        session: &Session<'ctx>,
        model: &PolicyModel,
        router: RouterId,
        address: &Int<'ctx>,
    ) -> Bool<'ctx>;
}
