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

//! Test module

use crate::{
    generate,
    model::{AclAction, AclRule, PolicyModel},
};

mod test_input;
mod test_model;

/// Build the reference network.
pub(crate) fn reference_model() -> PolicyModel {
    let (topo, config) = generate::reference_network();
    PolicyModel::from_input(&topo, &config).unwrap()
}

/// Create a rule from a prefix string.
pub(crate) fn rule(index: i64, prefix: &str, action: AclAction) -> AclRule {
    AclRule::new(index, prefix.parse().unwrap(), action)
}

/// Create a new Z3 context.
pub(crate) fn new_ctx() -> z3::Context {
    z3::Context::new(&z3::Config::new())
}
