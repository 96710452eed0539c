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

//! # Reachability Query Evaluator
//!
//! A query asks whether a route for the target address can propagate from `source` to
//! `destination`. This is the case if there exists a route-target `rt` such that
//!
//! ```text
//! Ibgp_Neighbor(src, dst) && Has_Export_RT(src, rt) && Has_Import_RT(dst, rt)
//!     && !Denied(dst, target_ip)
//! ```
//!
//! is satisfiable together with `target_ip == address`. Each query is checked within its own
//! [`Scope`](crate::session::Scope), so queries never influence each other.

use std::{
    fmt,
    net::Ipv4Addr,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use thiserror::Error;
use z3::{
    ast::{Ast, Bool, Int},
    SatResult,
};

use crate::{
    encoding::{Encoding, MaterializeStats},
    model::{PolicyModel, RouterId},
    session::Session,
};

/// Error of a single query. The evaluator remains usable after an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The router does not exist in the model.
    #[error("Router was not found in the model: {0:?}")]
    RouterNotFound(RouterId),
    /// The router name does not exist in the model.
    #[error("Router name was not found in the model: {0}")]
    RouterNameNotFound(String),
    /// The target address cannot be parsed.
    #[error("Invalid target address: {0:?}")]
    InvalidAddress(String),
}

/// A single reachability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Query {
    /// Router that exports the route
    pub source: RouterId,
    /// Router that should import the route
    pub destination: RouterId,
    /// Address for which to check propagation
    pub target: Ipv4Addr,
}

impl Query {
    /// Create a new query.
    pub fn new(source: RouterId, destination: RouterId, target: Ipv4Addr) -> Self {
        Self {
            source,
            destination,
            target,
        }
    }

    /// Create a query from router names and an address string.
    pub fn from_names(
        model: &PolicyModel,
        source: impl AsRef<str>,
        destination: impl AsRef<str>,
        target: impl AsRef<str>,
    ) -> Result<Self, QueryError> {
        let lookup = |name: &str| {
            model
                .get_router_id(name)
                .ok_or_else(|| QueryError::RouterNameNotFound(name.to_string()))
        };
        let target = target.as_ref();
        Ok(Self {
            source: lookup(source.as_ref())?,
            destination: lookup(destination.as_ref())?,
            target: target
                .trim()
                .parse()
                .map_err(|_| QueryError::InvalidAddress(target.to_string()))?,
        })
    }
}

/// Outcome of a satisfiability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Verdict {
    /// The route can propagate.
    Satisfiable,
    /// The route cannot propagate.
    Unsatisfiable,
    /// The solver could not decide.
    Unknown,
}

impl Verdict {
    /// Returns `true` if the verdict is either satisfiable or unsatisfiable.
    pub fn is_definite(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl From<SatResult> for Verdict {
    fn from(r: SatResult) -> Self {
        match r {
            SatResult::Sat => Self::Satisfiable,
            SatResult::Unsat => Self::Unsatisfiable,
            SatResult::Unknown => Self::Unknown,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Satisfiable => f.write_str("sat"),
            Verdict::Unsatisfiable => f.write_str("unsat"),
            Verdict::Unknown => f.write_str("unknown"),
        }
    }
}

/// Result of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct QueryResult {
    /// The query that was checked
    pub query: Query,
    /// The verdict of the solver
    pub verdict: Verdict,
    /// Time spent in the satisfiability check
    pub elapsed: Duration,
    /// Reason given by the solver for an unknown verdict.
    pub reason_unknown: Option<String>,
}

/// # Evaluator
///
/// Evaluates queries on a [`Session`] using the encoding `E`. The encoding is materialized when the
/// evaluator is created.
#[derive(Debug)]
pub struct Evaluator<'ctx, 'm, E> {
    model: &'m PolicyModel,
    session: Session<'ctx>,
    encoding: E,
    setup: MaterializeStats,
}

impl<'ctx, 'm, E: Encoding> Evaluator<'ctx, 'm, E> {
    /// Create the evaluator and materialize the encoding on the session.
    pub fn new(model: &'m PolicyModel, mut session: Session<'ctx>, mut encoding: E) -> Self {
        info!("Prepare the {} encoding", encoding.name());
        let setup = encoding.materialize(&mut session, model);
        info!(
            "Current constraint count: {} ({} encoding)",
            session.num_assertions(),
            encoding.name()
        );
        Self {
            model,
            session,
            encoding,
            setup,
        }
    }

    /// Statistics of materializing the encoding.
    pub fn setup(&self) -> &MaterializeStats {
        &self.setup
    }

    /// The encoding used by the evaluator.
    pub fn encoding(&self) -> &E {
        &self.encoding
    }

    /// The session on which queries are checked.
    pub fn session(&self) -> &Session<'ctx> {
        &self.session
    }

    /// The model on which queries are checked.
    pub fn model(&self) -> &'m PolicyModel {
        self.model
    }

    /// Build the propagation formula of a query. The formula refers to the target address of the
    /// session, not to the address of the query.
    pub fn propagation(&self, query: &Query) -> Result<Bool<'ctx>, QueryError> {
        self.check_router(query.source)?;
        self.check_router(query.destination)?;
        let s = &self.session;
        let rt = s.rt_witness();
        Ok(Bool::and(
            s.ctx(),
            &[
                &s.ibgp_neighbor(query.source, query.destination),
                &s.has_export_rt(query.source, rt),
                &s.has_import_rt(query.destination, rt),
                &self
                    .encoding
                    .denied(s, self.model, query.destination, s.target_ip())
                    .not(),
            ],
        ))
    }

    /// Check whether the route for the target address can propagate from the source to the
    /// destination. The permanent state of the session is the same before and after this call.
    pub fn evaluate(&mut self, query: &Query) -> Result<QueryResult, QueryError> {
        let formula = self.propagation(query)?;
        let ctx = self.session.ctx();
        let pin = self
            .session
            .target_ip()
            ._eq(&Int::from_u64(ctx, u32::from(query.target) as u64));
        debug!("Query formula: {formula}");

        let scope = self.session.scope();
        scope.assert(&pin);
        scope.assert(&formula);

        let start = Instant::now();
        let verdict = Verdict::from(scope.check());
        let elapsed = start.elapsed();

        let reason_unknown = match verdict {
            Verdict::Unknown => scope.reason_unknown(),
            _ => None,
        };
        drop(scope);

        if let Some(reason) = reason_unknown.as_ref() {
            warn!("Solver returned unknown: {reason}");
        }

        Ok(QueryResult {
            query: *query,
            verdict,
            elapsed,
            reason_unknown,
        })
    }

    /// Evaluate all queries in sequence. Failed queries do not stop the evaluation.
    pub fn evaluate_all<'q>(
        &mut self,
        queries: impl IntoIterator<Item = &'q Query>,
    ) -> Vec<Result<QueryResult, QueryError>> {
        queries
            .into_iter()
            .map(|q| {
                let result = self.evaluate(q);
                match &result {
                    Ok(r) => info!(
                        "Check {:?} -> {:?} IP={}: {} ({:.2} ms) [{} encoding]",
                        self.model.get_router_name(q.source).unwrap_or("?"),
                        self.model.get_router_name(q.destination).unwrap_or("?"),
                        q.target,
                        r.verdict,
                        r.elapsed.as_secs_f64() * 1000.0,
                        self.encoding.name(),
                    ),
                    Err(e) => warn!("Check failed: {e}"),
                }
                result
            })
            .collect()
    }

    /// Fail if the router does not exist in the model, or has no constant in the session (if the
    /// session was built from a different model).
    fn check_router(&self, router: RouterId) -> Result<(), QueryError> {
        if self.model.contains_router(router) && self.session.contains_router(router) {
            Ok(())
        } else {
            Err(QueryError::RouterNotFound(router))
        }
    }
}
