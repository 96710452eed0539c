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

//! Comparison of the global and the local encoding on the same set of queries.

use std::time::Duration;

use clap::ValueEnum;
use itertools::Itertools;
use log::{error, info};
use z3::{Config, Context};

use crate::{
    encoding::{Encoding, GlobalEncoding, LocalEncoding, MaterializeStats},
    evaluator::{Evaluator, Query, QueryError, QueryResult, Verdict},
    model::PolicyModel,
    session::Session,
};

/// The encoding strategy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, ValueEnum)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Strategy {
    /// Inject all ACLs as quantified definitions before checking any query.
    Global,
    /// Inline the ACLs of the destination into each query.
    Local,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Global => f.write_str("Global (full injection)"),
            Strategy::Local => f.write_str("Local (on-demand)"),
        }
    }
}

/// Options for the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompareOptions {
    /// Timeout for each individual check.
    pub timeout: Option<Duration>,
    /// Run both strategies on separate threads, each with its own solver context.
    pub parallel: bool,
}

/// Outcome of running all queries with a single strategy.
#[derive(Debug, Clone)]
pub struct StrategyReport {
    /// Which strategy was used
    pub strategy: Strategy,
    /// Work done before the first query
    pub setup: MaterializeStats,
    /// Number of permanent assertions after the setup
    pub num_assertions: usize,
    /// Result of each query, in the order in which the queries were given.
    pub results: Vec<Result<QueryResult, QueryError>>,
}

impl StrategyReport {
    /// Sum of the time spent in all satisfiability checks.
    pub fn total_check_time(&self) -> Duration {
        self.results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .map(|r| r.elapsed)
            .sum()
    }

    /// Verdicts of all queries (`None` for failed queries).
    pub fn verdicts(&self) -> Vec<Option<Verdict>> {
        self.results
            .iter()
            .map(|r| r.as_ref().ok().map(|r| r.verdict))
            .collect()
    }
}

/// A query on which both strategies report a different definite verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divergence {
    /// The query
    pub query: Query,
    /// Verdict of the global encoding
    pub global: Verdict,
    /// Verdict of the local encoding
    pub local: Verdict,
}

/// Result of comparing both strategies.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Report of the global encoding
    pub global: StrategyReport,
    /// Report of the local encoding
    pub local: StrategyReport,
    /// Queries on which the strategies disagree
    pub divergences: Vec<Divergence>,
}

impl Comparison {
    /// Returns `true` if both strategies agree on all queries where neither reports unknown.
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }

    /// Ratio of the total check time of the global encoding to the local encoding. Returns `None`
    /// if the local encoding is too fast to measure.
    pub fn speedup(&self) -> Option<f64> {
        let local = self.local.total_check_time().as_secs_f64();
        if local > 0.0 {
            Some(self.global.total_check_time().as_secs_f64() / local)
        } else {
            None
        }
    }
}

/// Run all queries with a single strategy on a new solver context.
pub fn run_strategy(
    model: &PolicyModel,
    strategy: Strategy,
    queries: &[Query],
    timeout: Option<Duration>,
) -> StrategyReport {
    let ctx = Context::new(&Config::new());
    let session = Session::new(&ctx, model);
    run_on_session(model, session, strategy, queries, timeout)
}

/// Run all queries with a single strategy on the given session.
pub fn run_on_session(
    model: &PolicyModel,
    mut session: Session<'_>,
    strategy: Strategy,
    queries: &[Query],
    timeout: Option<Duration>,
) -> StrategyReport {
    info!("Running the {strategy} encoding on {} queries", queries.len());
    if let Some(timeout) = timeout {
        session.set_timeout(timeout);
    }
    match strategy {
        Strategy::Global => run_encoding(model, session, GlobalEncoding::new(), strategy, queries),
        Strategy::Local => run_encoding(model, session, LocalEncoding::new(), strategy, queries),
    }
}

/// Materialize the encoding and evaluate all queries.
fn run_encoding<E: Encoding>(
    model: &PolicyModel,
    session: Session<'_>,
    encoding: E,
    strategy: Strategy,
    queries: &[Query],
) -> StrategyReport {
    let mut evaluator = Evaluator::new(model, session, encoding);
    let setup = *evaluator.setup();
    let num_assertions = evaluator.session().num_assertions();
    let results = evaluator.evaluate_all(queries);
    StrategyReport {
        strategy,
        setup,
        num_assertions,
        results,
    }
}

/// Run the queries with both strategies and compare their verdicts. The local encoding runs first.
///
/// Without `options.parallel`, the base constraints are built once and both strategies run on an
/// independent fork. Otherwise, each strategy builds its own solver context on a separate thread.
pub fn compare(model: &PolicyModel, queries: &[Query], options: CompareOptions) -> Comparison {
    let (local, global) = if options.parallel {
        rayon::join(
            || run_strategy(model, Strategy::Local, queries, options.timeout),
            || run_strategy(model, Strategy::Global, queries, options.timeout),
        )
    } else {
        let ctx = Context::new(&Config::new());
        let base = Session::new(&ctx, model);
        let local = run_on_session(model, base.fork(), Strategy::Local, queries, options.timeout);
        let global = run_on_session(model, base.fork(), Strategy::Global, queries, options.timeout);
        (local, global)
    };

    let divergences = find_divergences(queries, &global, &local);
    for d in divergences.iter() {
        error!(
            "Strategies disagree on {:?}: global says {}, local says {}",
            d.query, d.global, d.local
        );
    }

    Comparison {
        global,
        local,
        divergences,
    }
}

/// Find all queries on which both reports have a different, definite verdict.
pub fn find_divergences(
    queries: &[Query],
    global: &StrategyReport,
    local: &StrategyReport,
) -> Vec<Divergence> {
    queries
        .iter()
        .zip(global.verdicts())
        .zip(local.verdicts())
        .filter_map(|((q, g), l)| match (g, l) {
            (Some(g), Some(l)) if g.is_definite() && l.is_definite() && g != l => Some(Divergence {
                query: *q,
                global: g,
                local: l,
            }),
            _ => None,
        })
        .collect_vec()
}
