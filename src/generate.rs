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

//! Generate topologies and VPN configurations, either the small reference network, or random
//! networks of arbitrary size.

use std::net::Ipv4Addr;

use rand::prelude::*;

use crate::{
    evaluator::Query,
    input::{
        BgpSessionsInput, NodeInput, RouteFilterInput, SessionInput, TopologyInput, VpnConfigInput,
        VpnIntentInput,
    },
    model::{AclAction, PolicyModel},
};

/// Mask lengths used for random filters. Short masks create overlapping rules.
const MASK_LENGTHS: [u8; 4] = [8, 16, 20, 24];

/// Both ends of the address space.
const EDGE_ADDRESSES: [Ipv4Addr; 2] = [Ipv4Addr::new(0, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 255)];

/// The reference network: `PE1` and `PE2` are iBGP neighbors sharing the route-target `65000:1`.
/// The filters of `PE1` permit `192.168.1.0/24`, deny `10.0.1.0/24`, and permit the rest of
/// `10.0.0.0/8`. `PE3` has a session to `PE1` but only imports `65000:2`, and `P1` has no VPN
/// configuration at all.
pub fn reference_network() -> (TopologyInput, VpnConfigInput) {
    let nodes = ["PE1", "PE2", "PE3", "P1"]
        .into_iter()
        .map(|id| NodeInput { id: id.to_string() })
        .collect();
    let ibgp_pe_mesh = [["PE1", "PE2"], ["PE1", "PE3"], ["PE2", "P1"]]
        .into_iter()
        .map(|[a, b]| SessionInput {
            nodes: [a.to_string(), b.to_string()],
        })
        .collect();
    let topo = TopologyInput {
        nodes,
        bgp_sessions: BgpSessionsInput { ibgp_pe_mesh },
    };

    let config = VpnConfigInput {
        vpn_network_intents: vec![
            VpnIntentInput {
                pe_id: "PE1".to_string(),
                export_rt: vec!["65000:1".to_string()],
                import_rt: vec!["65000:1".to_string()],
                import_route_filters: vec![
                    RouteFilterInput::new(10, "192.168.1.0/24", AclAction::Permit),
                    RouteFilterInput::new(20, "10.0.1.0/24", AclAction::Deny),
                    RouteFilterInput::new(30, "10.0.0.0/8", AclAction::Permit),
                ],
            },
            VpnIntentInput {
                pe_id: "PE2".to_string(),
                export_rt: vec!["65000:1".to_string()],
                import_rt: vec!["65000:1".to_string()],
                import_route_filters: vec![],
            },
            VpnIntentInput {
                pe_id: "PE3".to_string(),
                export_rt: vec!["65000:1".to_string(), "65000:2".to_string()],
                import_rt: vec!["65000:2".to_string()],
                import_route_filters: vec![RouteFilterInput {
                    index: Some(5),
                    prefix: Some("172.16.0.0".to_string()),
                    mask: Some(12),
                    action: Some("deny".to_string()),
                }],
            },
        ],
    };

    (topo, config)
}

/// The reference queries on [`reference_network`].
pub fn reference_queries(model: &PolicyModel) -> Vec<Query> {
    [
        ("PE1", "PE2", "192.168.1.1"),
        ("PE2", "PE1", "10.0.1.100"),
        ("PE2", "PE1", "10.0.99.1"),
    ]
    .into_iter()
    .filter_map(|(s, d, ip)| Query::from_names(model, s, d, ip).ok())
    .collect()
}

/// Generate a random network with `num_routers` routers named `R0`, `R1`, ..., and `num_rts`
/// route-targets. Each pair of routers is adjacent with probability `0.7`, and each router is part
/// of the VPN with probability `0.8`. Every router in the VPN exports and imports a random subset of
/// the route-targets, and has `rules_per_router` filter rules.
pub fn random_network<R: Rng + ?Sized>(
    rng: &mut R,
    num_routers: usize,
    num_rts: usize,
    rules_per_router: usize,
) -> (TopologyInput, VpnConfigInput) {
    let names: Vec<String> = (0..num_routers).map(|i| format!("R{i}")).collect();
    let rts: Vec<String> = (0..num_rts).map(|i| format!("65000:{}", i + 1)).collect();

    let nodes = names.iter().map(|id| NodeInput { id: id.clone() }).collect();
    let mut ibgp_pe_mesh = Vec::new();
    for (i, a) in names.iter().enumerate() {
        for b in names.iter().skip(i + 1) {
            if rng.gen_bool(0.7) {
                ibgp_pe_mesh.push(SessionInput {
                    nodes: [a.clone(), b.clone()],
                });
            }
        }
    }

    let mut vpn_network_intents = Vec::new();
    for name in names.iter() {
        if !rng.gen_bool(0.8) {
            continue;
        }
        let export_rt = rts.iter().filter(|_| rng.gen_bool(0.5)).cloned().collect();
        let import_rt = rts.iter().filter(|_| rng.gen_bool(0.5)).cloned().collect();
        let import_route_filters = (0..rules_per_router)
            .map(|i| {
                let action = if rng.gen_bool(0.5) {
                    AclAction::Deny
                } else {
                    AclAction::Permit
                };
                let len = *MASK_LENGTHS.choose(rng).unwrap_or(&24);
                RouteFilterInput::new(
                    10 * (i as i64 + 1),
                    format!("{}/{}", random_address(rng), len),
                    action,
                )
            })
            .collect();
        vpn_network_intents.push(VpnIntentInput {
            pe_id: name.clone(),
            export_rt,
            import_rt,
            import_route_filters,
        });
    }

    (
        TopologyInput {
            nodes,
            bgp_sessions: BgpSessionsInput { ibgp_pe_mesh },
        },
        VpnConfigInput {
            vpn_network_intents,
        },
    )
}

/// Pick `num_queries` random queries on the model. Addresses are either taken from the filters of
/// the destination, or drawn from the same address pool as [`random_network`].
pub fn random_queries<R: Rng + ?Sized>(
    rng: &mut R,
    model: &PolicyModel,
    num_queries: usize,
) -> Vec<Query> {
    let routers: Vec<_> = model.routers().collect();
    if routers.is_empty() {
        return Vec::new();
    }
    (0..num_queries)
        .filter_map(|_| {
            let source = *routers.choose(rng)?;
            let destination = *routers.choose(rng)?;
            let rules = model.get_chain(destination).map(|c| c.rules()).unwrap_or(&[]);
            let target = match rules.choose(rng) {
                Some(rule) if rng.gen_bool(0.8) => {
                    let (start, end) = (rule.start(), rule.end());
                    Ipv4Addr::from(rng.gen_range(start..=end))
                }
                _ if rng.gen_bool(0.05) => *EDGE_ADDRESSES.choose(rng)?,
                _ => random_address(rng),
            };
            Some(Query::new(source, destination, target))
        })
        .collect()
}

/// Random address within `10.0.0.0/12`.
fn random_address<R: Rng + ?Sized>(rng: &mut R) -> Ipv4Addr {
    Ipv4Addr::new(10, rng.gen_range(0..16), rng.gen_range(0..4), rng.gen())
}
