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

//! Test parsing the input and building the model from it.

use std::net::Ipv4Addr;

use pretty_assertions_sorted::assert_eq;
use test_log::test;

use super::rule;
use crate::{
    input::{
        BgpSessionsInput, NodeInput, RouteFilterInput, SessionInput, TopologyInput,
        VpnConfigInput, VpnIntentInput,
    },
    model::{AclAction::*, ModelError, PolicyModel},
};

/// Topology with the given routers, where all pairs in `sessions` are adjacent.
fn topo(nodes: &[&str], sessions: &[(&str, &str)]) -> TopologyInput {
    TopologyInput {
        nodes: nodes
            .iter()
            .map(|id| NodeInput { id: id.to_string() })
            .collect(),
        bgp_sessions: BgpSessionsInput {
            ibgp_pe_mesh: sessions
                .iter()
                .map(|(a, b)| SessionInput {
                    nodes: [a.to_string(), b.to_string()],
                })
                .collect(),
        },
    }
}

/// Configuration with a single intent for `pe` that only has filters.
fn filters(pe: &str, filters: Vec<RouteFilterInput>) -> VpnConfigInput {
    VpnConfigInput {
        vpn_network_intents: vec![VpnIntentInput {
            pe_id: pe.to_string(),
            import_route_filters: filters,
            ..Default::default()
        }],
    }
}

#[test]
fn filter_forms() {
    let slash = RouteFilterInput::new(10, "10.0.0.0/8", Deny);
    assert_eq!(slash.parse("PE1"), Ok(rule(10, "10.0.0.0/8", Deny)));

    let mask = RouteFilterInput {
        index: Some(5),
        prefix: Some("172.16.0.0".to_string()),
        mask: Some(12),
        action: Some("deny".to_string()),
    };
    assert_eq!(mask.parse("PE1"), Ok(rule(5, "172.16.0.0/12", Deny)));

    // the prefix length in the string wins over the mask
    let both = RouteFilterInput {
        mask: Some(30),
        ..slash.clone()
    };
    assert_eq!(both.parse("PE1"), Ok(rule(10, "10.0.0.0/8", Deny)));
}

#[test]
fn filter_defaults() {
    let host = RouteFilterInput {
        prefix: Some("192.168.1.7".to_string()),
        ..Default::default()
    };
    let r = host.parse("PE1").unwrap();
    assert_eq!(r, rule(0, "192.168.1.7/32", Permit));
    assert_eq!(r.start(), r.end());

    let empty = RouteFilterInput::default().parse("PE1").unwrap();
    assert_eq!(empty, rule(0, "0.0.0.0/32", Permit));
    assert!(empty.contains(Ipv4Addr::UNSPECIFIED));
    assert!(!empty.contains(Ipv4Addr::new(0, 0, 0, 1)));
}

#[test]
fn filter_host_bits_are_cleared() {
    let r = RouteFilterInput::new(1, "10.0.1.77/24", Deny)
        .parse("PE1")
        .unwrap();
    assert_eq!(r, rule(1, "10.0.1.0/24", Deny));
    assert_eq!(r.start(), u32::from(Ipv4Addr::new(10, 0, 1, 0)));
    assert_eq!(r.end(), u32::from(Ipv4Addr::new(10, 0, 1, 255)));
}

#[test]
fn filter_errors() {
    let action = RouteFilterInput {
        action: Some("reject".to_string()),
        ..RouteFilterInput::new(1, "10.0.0.0/8", Permit)
    };
    assert_eq!(
        action.parse("PE1"),
        Err(ModelError::InvalidAction {
            router: "PE1".to_string(),
            action: "reject".to_string()
        })
    );

    assert_eq!(
        RouteFilterInput::new(1, "10.0.0.0/33", Permit).parse("PE1"),
        Err(ModelError::InvalidMaskLength {
            router: "PE1".to_string(),
            len: 33
        })
    );

    let mask = RouteFilterInput {
        prefix: Some("10.0.0.0".to_string()),
        mask: Some(40),
        ..Default::default()
    };
    assert_eq!(
        mask.parse("PE2"),
        Err(ModelError::InvalidMaskLength {
            router: "PE2".to_string(),
            len: 40
        })
    );

    for prefix in ["10.0.0/8", "10.0.0.256/8", "10.0.0.0/x", "foo"] {
        assert_eq!(
            RouteFilterInput::new(1, prefix, Permit).parse("PE1"),
            Err(ModelError::InvalidPrefix {
                router: "PE1".to_string(),
                prefix: prefix.to_string()
            })
        );
    }
}

#[test]
fn unknown_session_is_skipped() {
    let topo = topo(&["PE1", "PE2"], &[("PE1", "PE2"), ("PE1", "PE9")]);
    let model = PolicyModel::from_input(&topo, &VpnConfigInput::default()).unwrap();
    assert_eq!(model.num_routers(), 2);
    assert_eq!(model.adjacencies().count(), 1);
}

#[test]
fn unknown_pe() {
    let topo = topo(&["PE1", "PE2"], &[("PE1", "PE2")]);
    let config = filters("PE9", vec![]);
    assert_eq!(
        PolicyModel::from_input(&topo, &config).unwrap_err(),
        ModelError::UnknownRouter("PE9".to_string())
    );
}

#[test]
fn duplicate_node() {
    let topo = topo(&["PE1", "PE1"], &[]);
    assert_eq!(
        PolicyModel::from_input(&topo, &VpnConfigInput::default()).unwrap_err(),
        ModelError::DuplicateRouter("PE1".to_string())
    );
}

#[test]
fn duplicate_filter_index() {
    let topo = topo(&["PE1"], &[]);
    let config = filters(
        "PE1",
        vec![
            RouteFilterInput::new(10, "10.0.0.0/8", Permit),
            RouteFilterInput::new(10, "10.0.1.0/24", Deny),
        ],
    );
    assert_eq!(
        PolicyModel::from_input(&topo, &config).unwrap_err(),
        ModelError::DuplicateIndex {
            router: "PE1".to_string(),
            index: 10
        }
    );
}

#[test]
fn filters_are_sorted() {
    let topo = topo(&["PE1"], &[]);
    let config = filters(
        "PE1",
        vec![
            RouteFilterInput::new(30, "10.0.0.0/8", Permit),
            RouteFilterInput::new(10, "192.168.1.0/24", Permit),
            RouteFilterInput::new(20, "10.0.1.0/24", Deny),
        ],
    );
    let model = PolicyModel::from_input(&topo, &config).unwrap();
    let pe1 = model.get_router_id("PE1").unwrap();
    let indices: Vec<i64> = model
        .get_chain(pe1)
        .unwrap()
        .rules()
        .iter()
        .map(|r| r.index)
        .collect();
    assert_eq!(indices, vec![10, 20, 30]);
}

#[test]
fn last_intent_wins() {
    let topo = topo(&["PE1", "PE2"], &[("PE1", "PE2")]);
    let config = VpnConfigInput {
        vpn_network_intents: vec![
            VpnIntentInput {
                pe_id: "PE1".to_string(),
                export_rt: vec!["65000:1".to_string()],
                import_rt: vec!["65000:1".to_string()],
                import_route_filters: vec![RouteFilterInput::new(10, "10.0.0.0/8", Deny)],
            },
            VpnIntentInput {
                pe_id: "PE2".to_string(),
                export_rt: vec!["65000:1".to_string()],
                ..Default::default()
            },
            VpnIntentInput {
                pe_id: "PE1".to_string(),
                import_rt: vec!["65000:2".to_string()],
                import_route_filters: vec![RouteFilterInput::new(20, "192.168.0.0/16", Deny)],
                ..Default::default()
            },
        ],
    };
    let model = PolicyModel::from_input(&topo, &config).unwrap();
    let pe1 = model.get_router_id("PE1").unwrap();
    let pe2 = model.get_router_id("PE2").unwrap();
    let (rt1, _) = model.route_targets().find(|(_, s)| *s == "65000:1").unwrap();
    let (rt2, _) = model.route_targets().find(|(_, s)| *s == "65000:2").unwrap();

    assert!(!model.exports(pe1, rt1));
    assert!(!model.imports(pe1, rt1));
    assert!(model.imports(pe1, rt2));
    assert!(model.exports(pe2, rt1));
    assert_eq!(
        model.get_chain(pe1).unwrap().rules(),
        &[rule(20, "192.168.0.0/16", Deny)]
    );
}

#[cfg(feature = "serde")]
mod json {
    use pretty_assertions_sorted::assert_eq;
    use test_log::test;

    use crate::{
        input::{load_json, LoadError, TopologyInput, VpnConfigInput},
        model::PolicyModel,
    };

    const TOPO: &str = r#"{
        "nodes": [{"id": "PE1"}, {"id": "PE2"}, {"id": "PE3"}],
        "bgp_sessions": {"ibgp_pe_mesh": [{"nodes": ["PE1", "PE2"]}]}
    }"#;

    const CONFIG: &str = r#"{
        "vpn_network_intents": [
            {
                "pe_id": "PE1",
                "export_rt": ["65000:1"],
                "import_rt": ["65000:1"],
                "import_route_filters": [
                    {"index": 20, "prefix": "10.0.1.0/24", "action": "deny"},
                    {"index": 30, "prefix": "10.0.0.0", "mask": 8}
                ]
            },
            {"pe_id": "PE2", "export_rt": ["65000:1"]}
        ]
    }"#;

    #[test]
    fn parse_json() {
        let topo: TopologyInput = serde_json::from_str(TOPO).unwrap();
        let config: VpnConfigInput = serde_json::from_str(CONFIG).unwrap();
        assert_eq!(topo.nodes.len(), 3);
        assert_eq!(config.vpn_network_intents[1].import_route_filters, vec![]);

        let model = PolicyModel::from_input(&topo, &config).unwrap();
        let pe1 = model.get_router_id("PE1").unwrap();
        let pe3 = model.get_router_id("PE3").unwrap();
        assert_eq!(model.num_route_targets(), 1);
        assert_eq!(model.get_chain(pe1).unwrap().len(), 2);
        assert!(model.get_chain(pe3).unwrap().is_empty());
        assert!(model.get_chain(pe1).unwrap().is_denied("10.0.1.1".parse().unwrap()));
        assert!(!model.get_chain(pe1).unwrap().is_denied("10.0.2.1".parse().unwrap()));
    }

    #[test]
    fn missing_sessions() {
        let topo: TopologyInput = serde_json::from_str(r#"{"nodes": [{"id": "PE1"}]}"#).unwrap();
        assert!(topo.bgp_sessions.ibgp_pe_mesh.is_empty());
    }

    #[test]
    fn load_missing_file() {
        let result = load_json("/nonexistent/topo.json", "/nonexistent/config.json");
        assert!(matches!(result, Err(LoadError::Io(_, _))));
    }

    #[test]
    fn load_files() {
        let dir = std::env::temp_dir().join(format!("vpnreach-load-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let topo_file = dir.join("topo.json");
        let config_file = dir.join("config.json");
        std::fs::write(&topo_file, TOPO).unwrap();
        std::fs::write(&config_file, CONFIG).unwrap();

        let model = load_json(&topo_file, &config_file).unwrap();
        assert_eq!(model.num_routers(), 3);

        std::fs::write(&config_file, "{\"vpn_network_intents\": 5}").unwrap();
        assert!(matches!(
            load_json(&topo_file, &config_file),
            Err(LoadError::Json(_, _))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
