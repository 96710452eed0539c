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

//! Lazy encoding that inlines the filters of the destination into each query.

use log::{debug, info};
use z3::ast::{Bool, Int};

use super::{compile_chain, Encoding, MaterializeStats};
use crate::{
    model::{PolicyModel, RouterId},
    session::Session,
};

/// # Local Encoding
///
/// Nothing is asserted up-front. For each query, the chain of the destination router is compiled
/// over the (ground) address of the query, and the resulting expression is embedded directly into
/// the query formula. No quantifiers are involved, but the chain of a router is compiled again for
/// every query that targets it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalEncoding;

impl LocalEncoding {
    /// Create a new local encoding.
    pub fn new() -> Self {
        Self
    }
}

impl Encoding for LocalEncoding {
    fn name(&self) -> &'static str {
        "local"
    }

    fn materialize<'ctx>(
        &mut self,
        _session: &mut Session<'ctx>,
        _model: &PolicyModel,
    ) -> MaterializeStats {
        info!("Skipping global ACL injection");
        MaterializeStats::default()
    }

    fn denied<'ctx>(
        &self,
        session: &Session<'ctx>,
        model: &PolicyModel,
        router: RouterId,
        address: &Int<'ctx>,
    ) -> Bool<'ctx> {
        match model.get_chain(router) {
            Some(chain) if !chain.is_empty() => {
                debug!("Inject {} ACLs", chain.len());
                compile_chain(session.ctx(), chain, address)
            }
            _ => {
                debug!("No ACLs");
                Bool::from_bool(session.ctx(), false)
            }
        }
    }
}
