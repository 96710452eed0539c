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

//! Already-parsed topology and VPN configuration, and the construction of the [`PolicyModel`]
//! from it. With the feature `serde`, both structures can be read from JSON files using
//! [`load_json`].

use std::{collections::HashMap, net::Ipv4Addr};

use ipnet::Ipv4Net;
use log::warn;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::model::{AclAction, AclRule, ModelError, PolicyModel, PolicyModelBuilder};

/// The topology: a set of nodes and the iBGP sessions between them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TopologyInput {
    /// All routers of the network
    pub nodes: Vec<NodeInput>,
    /// BGP sessions in the network
    #[cfg_attr(feature = "serde", serde(default))]
    pub bgp_sessions: BgpSessionsInput,
}

/// A single node in the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct NodeInput {
    /// Name of the router
    pub id: String,
}

/// The BGP sessions of the topology.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct BgpSessionsInput {
    /// iBGP sessions among the provider edge routers.
    #[cfg_attr(feature = "serde", serde(default))]
    pub ibgp_pe_mesh: Vec<SessionInput>,
}

/// A single iBGP session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SessionInput {
    /// Both endpoints of the session
    pub nodes: [String; 2],
}

/// The VPN configuration of all provider edge routers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct VpnConfigInput {
    /// Configuration of each router. Routers without an intent have no filters and neither import
    /// nor export any route-target.
    pub vpn_network_intents: Vec<VpnIntentInput>,
}

/// The configuration of a single provider edge router.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct VpnIntentInput {
    /// Name of the router
    pub pe_id: String,
    /// Route-targets attached to exported routes
    #[cfg_attr(feature = "serde", serde(default))]
    pub export_rt: Vec<String>,
    /// Route-targets accepted when importing routes
    #[cfg_attr(feature = "serde", serde(default))]
    pub import_rt: Vec<String>,
    /// Filters applied on imported routes
    #[cfg_attr(feature = "serde", serde(default))]
    pub import_route_filters: Vec<RouteFilterInput>,
}

/// A filter rule as written in the configuration. The prefix is either given as `a.b.c.d/len`, or
/// as `a.b.c.d` together with `mask`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct RouteFilterInput {
    /// Sequence number (defaults to 0)
    #[cfg_attr(feature = "serde", serde(default))]
    pub index: Option<i64>,
    /// Matched prefix (defaults to `0.0.0.0`)
    #[cfg_attr(feature = "serde", serde(default))]
    pub prefix: Option<String>,
    /// Mask length, if not part of the prefix (defaults to 32)
    #[cfg_attr(feature = "serde", serde(default))]
    pub mask: Option<u32>,
    /// Either `permit` or `deny` (defaults to `permit`)
    #[cfg_attr(feature = "serde", serde(default))]
    pub action: Option<String>,
}

impl RouteFilterInput {
    /// Shorthand to create a filter from a prefix string in the form `a.b.c.d/len`.
    pub fn new(index: i64, prefix: impl Into<String>, action: AclAction) -> Self {
        Self {
            index: Some(index),
            prefix: Some(prefix.into()),
            mask: None,
            action: Some(action.to_string()),
        }
    }

    /// Parse the filter into a rule. `router` is only used for error reporting.
    pub fn parse(&self, router: &str) -> Result<AclRule, ModelError> {
        let raw = self.prefix.as_deref().unwrap_or("0.0.0.0");
        let invalid_prefix = || ModelError::InvalidPrefix {
            router: router.to_string(),
            prefix: raw.to_string(),
        };

        let (addr, len) = match raw.split_once('/') {
            Some((addr, len)) => (addr, len.trim().parse::<u32>().map_err(|_| invalid_prefix())?),
            None => (raw, self.mask.unwrap_or(32)),
        };
        let addr: Ipv4Addr = addr.trim().parse().map_err(|_| invalid_prefix())?;
        if len > 32 {
            return Err(ModelError::InvalidMaskLength {
                router: router.to_string(),
                len,
            });
        }
        let prefix = Ipv4Net::new(addr, len as u8).map_err(|_| ModelError::InvalidMaskLength {
            router: router.to_string(),
            len,
        })?;

        let action = self
            .action
            .as_deref()
            .unwrap_or("permit")
            .parse::<AclAction>()
            .map_err(|action| ModelError::InvalidAction {
                router: router.to_string(),
                action,
            })?;

        Ok(AclRule::new(self.index.unwrap_or(0), prefix, action))
    }
}

impl PolicyModel {
    /// Build the policy model from the topology and the VPN configuration.
    ///
    /// iBGP sessions that mention an unknown router are skipped. If a router has multiple VPN
    /// intents, only the last one is used. VPN intents for routers that are not part of the
    /// topology, as well as malformed filters, cause an error.
    pub fn from_input(topo: &TopologyInput, config: &VpnConfigInput) -> Result<Self, ModelError> {
        let mut builder = PolicyModelBuilder::new();

        for node in topo.nodes.iter() {
            builder.add_router(node.id.as_str())?;
        }

        for session in topo.bgp_sessions.ibgp_pe_mesh.iter() {
            let [a, b] = &session.nodes;
            match (builder.get_router_id(a), builder.get_router_id(b)) {
                (Some(a), Some(b)) => builder.add_adjacency(a, b),
                _ => warn!("Skip iBGP session {a} -- {b}: unknown router"),
            }
        }

        // only the last intent of each router is used
        let last: HashMap<&str, usize> = config
            .vpn_network_intents
            .iter()
            .enumerate()
            .map(|(i, intent)| (intent.pe_id.as_str(), i))
            .collect();

        for (i, intent) in config.vpn_network_intents.iter().enumerate() {
            let router = builder
                .get_router_id(&intent.pe_id)
                .ok_or_else(|| ModelError::UnknownRouter(intent.pe_id.clone()))?;
            if last.get(intent.pe_id.as_str()) != Some(&i) {
                warn!("Ignore VPN intent of {}: overwritten by a later one", intent.pe_id);
                continue;
            }
            for rt in intent.export_rt.iter() {
                builder.add_export(router, rt);
            }
            for rt in intent.import_rt.iter() {
                builder.add_import(router, rt);
            }
            for filter in intent.import_route_filters.iter() {
                let rule = filter.parse(&intent.pe_id)?;
                builder.add_rule(router, rule);
            }
        }

        builder.build()
    }
}

#[cfg(feature = "serde")]
pub use load::{load_json, LoadError};

#[cfg(feature = "serde")]
mod load {
    use std::{fs::File, io::BufReader, path::Path};

    use log::info;
    use thiserror::Error;

    use super::{TopologyInput, VpnConfigInput};
    use crate::model::{ModelError, PolicyModel};

    /// Error thrown while loading the input files.
    #[derive(Debug, Error)]
    pub enum LoadError {
        /// A file could not be opened or read.
        #[error("Cannot read {0}: {1}")]
        Io(String, #[source] std::io::Error),
        /// A file does not contain the expected JSON structure.
        #[error("Cannot parse {0}: {1}")]
        Json(String, #[source] serde_json::Error),
        /// The input is malformed.
        #[error("{0}")]
        Model(#[from] ModelError),
    }

    /// Read the topology and the VPN configuration from two JSON files, and build the model.
    pub fn load_json(
        topo_file: impl AsRef<Path>,
        config_file: impl AsRef<Path>,
    ) -> Result<PolicyModel, LoadError> {
        info!("Loading files...");
        let topo: TopologyInput = read(topo_file.as_ref())?;
        let config: VpnConfigInput = read(config_file.as_ref())?;
        Ok(PolicyModel::from_input(&topo, &config)?)
    }

    /// Deserialize a single JSON file.
    fn read<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
        let name = path.to_string_lossy().to_string();
        let file = File::open(path).map_err(|e| LoadError::Io(name.clone(), e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| LoadError::Json(name, e))
    }
}
