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

//! Compiler of ACL chains into solver expressions.
//!
//! A chain `[r1, r2, ..., rn]` is compiled into the right-nested conditional
//!
//! ```text
//! ite(a in r1, r1 == deny, ite(a in r2, r2 == deny, ... ite(a in rn, rn == deny, false)))
//! ```
//!
//! which mirrors the first-match-wins evaluation of the chain. The empty chain compiles to `false`.

use z3::{
    ast::{Bool, Int},
    Context,
};

use crate::model::{AclChain, AclRule};

/// Compile the chain into a formula that holds if and only if `address` is denied by the chain.
/// The rules are never reordered or merged.
pub fn compile_chain<'ctx>(ctx: &'ctx Context, chain: &AclChain, address: &Int<'ctx>) -> Bool<'ctx> {
    // fold from the last rule, such that the first rule ends up outermost
    chain
        .rules()
        .iter()
        .rev()
        .fold(Bool::from_bool(ctx, false), |rest, rule| {
            rule_matches(ctx, rule, address).ite(&Bool::from_bool(ctx, rule.action.is_deny()), &rest)
        })
}

/// Formula that holds if `address` lies within the interval of `rule`.
pub fn rule_matches<'ctx>(ctx: &'ctx Context, rule: &AclRule, address: &Int<'ctx>) -> Bool<'ctx> {
    let start = Int::from_u64(ctx, rule.start() as u64);
    let end = Int::from_u64(ctx, rule.end() as u64);
    Bool::and(ctx, &[&address.ge(&start), &address.le(&end)])
}
