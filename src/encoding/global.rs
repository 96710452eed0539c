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

//! Eager encoding with one quantified definition of `Is_Prefix_Denied` per router.

use std::time::Instant;

use log::{debug, info, warn};
use z3::ast::{forall_const, Ast, Bool, Int};

use super::{compile_chain, Encoding, MaterializeStats};
use crate::{
    model::{PolicyModel, RouterId},
    session::Session,
};

/// # Global Encoding
///
/// Asserts, for every router `r`, the definition
///
/// ```text
/// forall a: Int. Is_Prefix_Denied(r, a) == compile(chain(r), a)
/// ```
///
/// Queries then only refer to `Is_Prefix_Denied(dst, target_ip)`. The setup cost is paid once for
/// the entire network, and the solver must instantiate the quantifiers during each check. If it
/// fails to do so, the check may return unknown.
///
/// Whether the definitions exist is a property of the [`Session`], not of the encoding. The same
/// encoding can therefore be used on several sessions, and each of them receives the definitions
/// exactly once.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalEncoding;

impl GlobalEncoding {
    /// Create a new global encoding.
    pub fn new() -> Self {
        Self
    }
}

impl Encoding for GlobalEncoding {
    fn name(&self) -> &'static str {
        "global"
    }

    fn materialize<'ctx>(
        &mut self,
        session: &mut Session<'ctx>,
        model: &PolicyModel,
    ) -> MaterializeStats {
        if session.has_denied_definitions() {
            debug!("Global encoding is already materialized on this session");
            return MaterializeStats::default();
        }

        let ctx = session.ctx();
        let start = Instant::now();
        let sym_ip = Int::new_const(ctx, "sym_ip");
        let mut stats = MaterializeStats::default();
        let mut definitions = Vec::with_capacity(model.num_routers());

        for router in model.routers() {
            if !session.contains_router(router) {
                warn!("Router {} has no constant in the session", router.index());
                continue;
            }
            let Some(chain) = model.get_chain(router) else {
                continue;
            };
            let body = session
                .is_prefix_denied(router, &sym_ip)
                ._eq(&compile_chain(ctx, chain, &sym_ip));
            let definition: Bool<'ctx> = forall_const(ctx, &[&sym_ip as &dyn Ast<'ctx>], &[], &body);
            definitions.push(definition);
            stats.num_rules += chain.len();
        }

        session.define_denied(&definitions);
        stats.num_assertions = definitions.len();
        stats.duration = start.elapsed();
        info!("Injected all ACLs: {stats}");
        stats
    }

    fn denied<'ctx>(
        &self,
        session: &Session<'ctx>,
        _model: &PolicyModel,
        router: RouterId,
        address: &Int<'ctx>,
    ) -> Bool<'ctx> {
        session.is_prefix_denied(router, address)
    }
}
