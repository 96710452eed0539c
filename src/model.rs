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

//! # Policy Model
//!
//! This module contains the immutable representation of the VPN network: the set of routers, the
//! iBGP adjacency, the route-targets that each router exports and imports, and the ordered import
//! filters (ACL chains) of each router. Use the [`PolicyModelBuilder`] to construct a model.
//!
//! ```
//! # use vpnreach::model::*;
//! # fn main() -> Result<(), ModelError> {
//! let mut builder = PolicyModelBuilder::new();
//! let pe1 = builder.add_router("PE1")?;
//! let pe2 = builder.add_router("PE2")?;
//! builder.add_adjacency(pe1, pe2);
//! builder.add_export(pe1, "65000:1");
//! builder.add_import(pe2, "65000:1");
//! builder.add_rule(pe2, AclRule::new(10, "10.0.1.0/24".parse().unwrap(), AclAction::Deny));
//! let model = builder.build()?;
//! assert!(model.is_adjacent(pe2, pe1));
//! # Ok(())
//! # }
//! ```

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    fmt,
    net::Ipv4Addr,
    str::FromStr,
};

use ipnet::Ipv4Net;
use itertools::Itertools;
use petgraph::{
    graph::{NodeIndex, UnGraph},
    visit::EdgeRef,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Router Identification (and index into the adjacency graph)
pub type RouterId = NodeIndex<u32>;

/// Identification of a route-target community.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct RouteTargetId(usize);

impl RouteTargetId {
    /// Index of the route-target in the universe of route-targets of the model.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for RouteTargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rt{}", self.0)
    }
}

/// Action of an ACL rule.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(rename_all = "lowercase")
)]
pub enum AclAction {
    /// Routes matching the rule are accepted.
    Permit,
    /// Routes matching the rule are dropped.
    Deny,
}

impl AclAction {
    /// Returns `true` if the action is `Deny`.
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny)
    }
}

impl fmt::Display for AclAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclAction::Permit => f.write_str("permit"),
            AclAction::Deny => f.write_str("deny"),
        }
    }
}

impl FromStr for AclAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "permit" => Ok(Self::Permit),
            "deny" => Ok(Self::Deny),
            s => Err(s.to_string()),
        }
    }
}

/// A single rule of an import filter. The rule matches all addresses within `prefix`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AclRule {
    /// Sequence number of the rule. Rules with lower index are checked earlier.
    pub index: i64,
    /// Prefix matched by the rule. Host bits are always zero.
    pub prefix: Ipv4Net,
    /// What happens to addresses that are matched by this rule.
    pub action: AclAction,
}

impl AclRule {
    /// Create a new rule. The host bits of `prefix` are cleared.
    pub fn new(index: i64, prefix: Ipv4Net, action: AclAction) -> Self {
        Self {
            index,
            prefix: prefix.trunc(),
            action,
        }
    }

    /// First address of the interval matched by this rule.
    pub fn start(&self) -> u32 {
        u32::from(self.prefix.network())
    }

    /// Last address (inclusive) of the interval matched by this rule.
    pub fn end(&self) -> u32 {
        u32::from(self.prefix.broadcast())
    }

    /// Returns `true` if the address lies within the interval of the rule.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let addr = u32::from(addr);
        self.start() <= addr && addr <= self.end()
    }
}

impl fmt::Display for AclRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.index, self.action, self.prefix)
    }
}

/// Error thrown when two rules of a chain share the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Index {0} is used by multiple rules")]
pub struct DuplicateIndex(pub i64);

/// Ordered sequence of rules of a single router. The first rule that contains an address decides
/// its fate. Addresses that are not matched by any rule are permitted.
///
/// The chain is serialized as a list of rules. Deserializing sorts the rules, and rejects lists
/// with duplicate indices.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
#[cfg_attr(
    feature = "serde",
    derive(Deserialize, Serialize),
    serde(try_from = "Vec<AclRule>", into = "Vec<AclRule>")
)]
pub struct AclChain {
    rules: Vec<AclRule>,
}

impl AclChain {
    /// Create a chain from a set of rules. The rules are sorted by their index. This function fails
    /// if two rules have the same index.
    pub fn new(rules: impl IntoIterator<Item = AclRule>) -> Result<Self, DuplicateIndex> {
        let rules: Vec<AclRule> = rules.into_iter().sorted_by_key(|r| r.index).collect();
        if let Some((a, _)) = rules
            .iter()
            .tuple_windows()
            .find(|(a, b)| a.index == b.index)
        {
            return Err(DuplicateIndex(a.index));
        }
        Ok(Self { rules })
    }

    /// Get the rules, sorted by their index.
    pub fn rules(&self) -> &[AclRule] {
        &self.rules
    }

    /// Number of rules in the chain
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if the chain has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Get the rule that decides on the address, i.e., the first rule that contains it.
    pub fn first_match(&self, addr: Ipv4Addr) -> Option<&AclRule> {
        self.rules.iter().find(|r| r.contains(addr))
    }

    /// Check whether the chain denies the address by scanning the rules in order.
    pub fn is_denied(&self, addr: Ipv4Addr) -> bool {
        self.first_match(addr)
            .map(|r| r.action.is_deny())
            .unwrap_or(false)
    }
}

impl TryFrom<Vec<AclRule>> for AclChain {
    type Error = DuplicateIndex;

    fn try_from(rules: Vec<AclRule>) -> Result<Self, Self::Error> {
        Self::new(rules)
    }
}

impl From<AclChain> for Vec<AclRule> {
    fn from(chain: AclChain) -> Self {
        chain.rules
    }
}

impl fmt::Display for AclChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.rules.iter().join(", "))
    }
}

/// Error thrown while building a [`PolicyModel`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The same router was declared twice.
    #[error("Router {0} is declared more than once")]
    DuplicateRouter(String),
    /// The configuration mentions a router that is not part of the topology.
    #[error("Router {0} is not part of the topology")]
    UnknownRouter(String),
    /// A filter prefix could not be parsed.
    #[error("Invalid prefix {prefix:?} in the filters of router {router}")]
    InvalidPrefix {
        /// Router whose filter is malformed
        router: String,
        /// The prefix string
        prefix: String,
    },
    /// The mask length of a filter is not in `0..=32`.
    #[error("Invalid mask length {len} in the filters of router {router}")]
    InvalidMaskLength {
        /// Router whose filter is malformed
        router: String,
        /// The mask length
        len: u32,
    },
    /// The action of a filter is neither `permit` nor `deny`.
    #[error("Invalid action {action:?} in the filters of router {router}")]
    InvalidAction {
        /// Router whose filter is malformed
        router: String,
        /// The action string
        action: String,
    },
    /// Two filters of the same router share a sequence index.
    #[error("Filter index {index} is used more than once on router {router}")]
    DuplicateIndex {
        /// Router whose filters are malformed
        router: String,
        /// The index that is duplicated
        index: i64,
    },
}

/// # Policy Model
///
/// The immutable state of a VPN network. Relations are total: every router (route-target) pair
/// that was not explicitly configured is not adjacent (not exported or imported), and every router
/// without filters has an empty chain.
#[derive(Debug, Clone)]
pub struct PolicyModel {
    graph: UnGraph<String, (), u32>,
    router_names: HashMap<String, RouterId>,
    route_targets: Vec<String>,
    exports: Vec<BTreeSet<RouteTargetId>>,
    imports: Vec<BTreeSet<RouteTargetId>>,
    chains: Vec<AclChain>,
}

impl PolicyModel {
    /// Iterate over all routers of the model.
    pub fn routers(&self) -> impl Iterator<Item = RouterId> + Clone + '_ {
        self.graph.node_indices()
    }

    /// Number of routers in the model.
    pub fn num_routers(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the router is part of the model.
    pub fn contains_router(&self, router: RouterId) -> bool {
        router.index() < self.graph.node_count()
    }

    /// Get the name of a router.
    pub fn get_router_name(&self, router: RouterId) -> Option<&str> {
        self.graph.node_weight(router).map(|s| s.as_str())
    }

    /// Get the router id from its name.
    pub fn get_router_id(&self, name: impl AsRef<str>) -> Option<RouterId> {
        self.router_names.get(name.as_ref()).copied()
    }

    /// Iterate over all route-targets and their community strings.
    pub fn route_targets(&self) -> impl Iterator<Item = (RouteTargetId, &str)> + Clone + '_ {
        self.route_targets
            .iter()
            .enumerate()
            .map(|(i, s)| (RouteTargetId(i), s.as_str()))
    }

    /// Number of distinct route-targets in the model.
    pub fn num_route_targets(&self) -> usize {
        self.route_targets.len()
    }

    /// Get the community string of a route-target.
    pub fn get_route_target_name(&self, rt: RouteTargetId) -> Option<&str> {
        self.route_targets.get(rt.0).map(|s| s.as_str())
    }

    /// Returns `true` if there is an iBGP session between `a` and `b`.
    pub fn is_adjacent(&self, a: RouterId, b: RouterId) -> bool {
        self.contains_router(a) && self.contains_router(b) && self.graph.contains_edge(a, b)
    }

    /// Iterate over all iBGP sessions (each session once).
    pub fn adjacencies(&self) -> impl Iterator<Item = (RouterId, RouterId)> + '_ {
        self.graph.edge_references().map(|e| (e.source(), e.target()))
    }

    /// Returns `true` if `router` exports `rt`.
    pub fn exports(&self, router: RouterId, rt: RouteTargetId) -> bool {
        self.exports
            .get(router.index())
            .map(|s| s.contains(&rt))
            .unwrap_or(false)
    }

    /// Returns `true` if `router` imports `rt`.
    pub fn imports(&self, router: RouterId, rt: RouteTargetId) -> bool {
        self.imports
            .get(router.index())
            .map(|s| s.contains(&rt))
            .unwrap_or(false)
    }

    /// Get the import filters of a router. Returns `None` if the router does not exist.
    pub fn get_chain(&self, router: RouterId) -> Option<&AclChain> {
        self.chains.get(router.index())
    }

    /// Total number of rules over all routers.
    pub fn num_rules(&self) -> usize {
        self.chains.iter().map(AclChain::len).sum()
    }
}

impl fmt::Display for PolicyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in self.routers() {
            let name = |r: RouterId| self.get_router_name(r).unwrap_or("?");
            let rts = |set: &BTreeSet<RouteTargetId>| {
                set.iter()
                    .filter_map(|rt| self.get_route_target_name(*rt))
                    .join(", ")
            };
            writeln!(
                f,
                "{}: neighbors {{{}}}, export {{{}}}, import {{{}}}, filters {}",
                name(r),
                self.graph.neighbors(r).map(name).sorted().dedup().join(", "),
                rts(&self.exports[r.index()]),
                rts(&self.imports[r.index()]),
                self.chains[r.index()],
            )?;
        }
        Ok(())
    }
}

/// Builder for a [`PolicyModel`]. Route-targets are interned by their community string, such that
/// each string maps to exactly one [`RouteTargetId`].
#[derive(Debug, Default)]
pub struct PolicyModelBuilder {
    graph: UnGraph<String, (), u32>,
    router_names: HashMap<String, RouterId>,
    route_targets: Vec<String>,
    rt_names: HashMap<String, RouteTargetId>,
    exports: HashMap<RouterId, BTreeSet<RouteTargetId>>,
    imports: HashMap<RouterId, BTreeSet<RouteTargetId>>,
    rules: HashMap<RouterId, Vec<AclRule>>,
    edges: HashSet<(RouterId, RouterId)>,
}

impl PolicyModelBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new router. This function fails if a router with the same name already exists.
    pub fn add_router(&mut self, name: impl Into<String>) -> Result<RouterId, ModelError> {
        let name = name.into();
        if self.router_names.contains_key(&name) {
            return Err(ModelError::DuplicateRouter(name));
        }
        let id = self.graph.add_node(name.clone());
        self.router_names.insert(name, id);
        Ok(id)
    }

    /// Get the id of a router that was already added.
    pub fn get_router_id(&self, name: impl AsRef<str>) -> Option<RouterId> {
        self.router_names.get(name.as_ref()).copied()
    }

    /// Add an iBGP session between `a` and `b`. Adding the same session twice has no effect.
    ///
    /// **Warning** This function panics if `a` or `b` was not added to the builder.
    pub fn add_adjacency(&mut self, a: RouterId, b: RouterId) {
        let key = if a <= b { (a, b) } else { (b, a) };
        if self.edges.insert(key) {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Get the id of a route-target, creating it if it does not yet exist.
    pub fn route_target(&mut self, community: impl AsRef<str>) -> RouteTargetId {
        let community = community.as_ref();
        if let Some(rt) = self.rt_names.get(community) {
            return *rt;
        }
        let rt = RouteTargetId(self.route_targets.len());
        self.route_targets.push(community.to_string());
        self.rt_names.insert(community.to_string(), rt);
        rt
    }

    /// Let `router` export routes with the route-target `community`.
    pub fn add_export(&mut self, router: RouterId, community: impl AsRef<str>) -> RouteTargetId {
        let rt = self.route_target(community);
        self.exports.entry(router).or_default().insert(rt);
        rt
    }

    /// Let `router` import routes with the route-target `community`.
    pub fn add_import(&mut self, router: RouterId, community: impl AsRef<str>) -> RouteTargetId {
        let rt = self.route_target(community);
        self.imports.entry(router).or_default().insert(rt);
        rt
    }

    /// Add a rule to the import filter of `router`. The order in which rules are added is
    /// irrelevant; they are sorted by their index once the model is built.
    pub fn add_rule(&mut self, router: RouterId, rule: AclRule) {
        self.rules.entry(router).or_default().push(rule);
    }

    /// Build the model. This fails if any router has two rules with the same index.
    pub fn build(mut self) -> Result<PolicyModel, ModelError> {
        let n = self.graph.node_count();
        let mut chains = Vec::with_capacity(n);
        let mut exports = Vec::with_capacity(n);
        let mut imports = Vec::with_capacity(n);
        for router in self.graph.node_indices() {
            let chain = AclChain::new(self.rules.remove(&router).unwrap_or_default()).map_err(
                |DuplicateIndex(index)| ModelError::DuplicateIndex {
                    router: self.graph[router].clone(),
                    index,
                },
            )?;
            chains.push(chain);
            exports.push(self.exports.remove(&router).unwrap_or_default());
            imports.push(self.imports.remove(&router).unwrap_or_default());
        }

        log::debug!(
            "Built a policy model with {} routers, {} sessions, {} route-targets and {} rules",
            n,
            self.graph.edge_count(),
            self.route_targets.len(),
            chains.iter().map(AclChain::len).sum::<usize>()
        );

        Ok(PolicyModel {
            graph: self.graph,
            router_names: self.router_names,
            route_targets: self.route_targets,
            exports,
            imports,
            chains,
        })
    }
}
