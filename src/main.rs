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

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use rand::prelude::*;

use vpnreach::{
    compare::{run_strategy, StrategyReport},
    formatter::ModelFormatter,
    generate, input, CompareOptions, PolicyModel, Query, Strategy,
};

/// Compare the global and the local encoding of import filters on a set of reachability queries.
#[derive(Debug, Parser)]
struct Cli {
    /// Topology file (JSON). Requires `--config`.
    #[clap(long = "topo", short = 't', requires = "config")]
    topo: Option<PathBuf>,
    /// VPN configuration file (JSON). Requires `--topo`.
    #[clap(long = "config", short = 'c', requires = "topo")]
    config: Option<PathBuf>,
    /// Use the built-in reference network instead of a random one.
    #[clap(long)]
    reference: bool,
    /// Number of routers in the random network.
    #[clap(long = "routers", short = 'r', default_value = "10")]
    routers: usize,
    /// Number of route-targets in the random network.
    #[clap(long = "rts", default_value = "3")]
    rts: usize,
    /// Number of filter rules per router in the random network.
    #[clap(long = "rules", default_value = "30")]
    rules: usize,
    /// Seed for the random network and the random queries.
    #[clap(long, default_value = "42")]
    seed: u64,
    /// Query in the form `SRC,DST,IP`. Can be given multiple times. If no query is given, the
    /// reference queries are used on networks that have `PE1` and `PE2`, and random queries
    /// otherwise.
    #[clap(long = "query", short = 'q')]
    queries: Vec<String>,
    /// Number of random queries.
    #[clap(long = "num-queries", short = 'n', default_value = "10")]
    num_queries: usize,
    /// Timeout for each satisfiability check in milliseconds.
    #[clap(long = "timeout", short = 'T')]
    timeout: Option<u64>,
    /// Run both strategies in parallel, each with its own solver context.
    #[clap(long, short)]
    parallel: bool,
    /// Only run a single strategy.
    #[clap(long = "strategy", short = 's')]
    strategy: Option<Strategy>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_timed();

    let args = Cli::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let model = match (&args.topo, &args.config) {
        (Some(topo), Some(config)) => input::load_json(topo, config)?,
        _ if args.reference => {
            let (topo, config) = generate::reference_network();
            PolicyModel::from_input(&topo, &config)?
        }
        _ => {
            let (topo, config) =
                generate::random_network(&mut rng, args.routers, args.rts, args.rules);
            PolicyModel::from_input(&topo, &config)?
        }
    };
    log::debug!("Policy model:\n{model}");

    let queries = get_queries(&args, &model, &mut rng);
    let timeout = args.timeout.map(Duration::from_millis);

    if let Some(strategy) = args.strategy {
        let report = run_strategy(&model, strategy, &queries, timeout);
        print_report(&model, &report);
        return Ok(());
    }

    let comparison = vpnreach::compare(
        &model,
        &queries,
        CompareOptions {
            timeout,
            parallel: args.parallel,
        },
    );

    print_report(&model, &comparison.local);
    print_report(&model, &comparison.global);

    println!("\n{}", "=".repeat(60));
    println!(
        "       Performance Summary (Total time for {} queries)",
        queries.len()
    );
    println!("{}", "=".repeat(60));
    println!(
        "Global (Full Injection) : {:.2} ms",
        comparison.global.total_check_time().as_secs_f64() * 1000.0
    );
    println!(
        "Local  (On-Demand)      : {:.2} ms",
        comparison.local.total_check_time().as_secs_f64() * 1000.0
    );
    match comparison.speedup() {
        Some(speedup) => println!("Speedup Factor          : {speedup:.2} x"),
        None => println!("Local is too fast to measure speedup factor."),
    }

    if comparison.is_consistent() {
        Ok(())
    } else {
        for d in comparison.divergences.iter() {
            eprintln!(
                "Divergence on {}: global={}, local={}",
                d.query.fmt(&model),
                d.global,
                d.local
            );
        }
        Err(format!(
            "The strategies disagree on {} queries",
            comparison.divergences.len()
        )
        .into())
    }
}

/// Parse the queries from the command line, or pick the default ones.
fn get_queries(args: &Cli, model: &PolicyModel, rng: &mut StdRng) -> Vec<Query> {
    if !args.queries.is_empty() {
        return args
            .queries
            .iter()
            .filter_map(|q| {
                let parts: Vec<&str> = q.split(',').collect();
                let result = match parts.as_slice() {
                    [src, dst, ip] => Query::from_names(model, src.trim(), dst.trim(), ip),
                    _ => {
                        log::error!("Cannot parse query {q:?}, expected `SRC,DST,IP`");
                        return None;
                    }
                };
                result.map_err(|e| log::error!("Skip query {q:?}: {e}")).ok()
            })
            .collect();
    }

    let reference = generate::reference_queries(model);
    if reference.is_empty() {
        generate::random_queries(rng, model, args.num_queries)
    } else {
        reference
    }
}

/// Print the setup and the result of every query.
fn print_report(model: &PolicyModel, report: &StrategyReport) {
    println!("\n{}", "=".repeat(60));
    println!("   {}", report.strategy);
    println!("{}", "=".repeat(60));
    println!(
        "ACL Injection: {} (constraint count: {})",
        report.setup, report.num_assertions
    );
    for result in report.results.iter() {
        println!("  Check {}", result.fmt(model));
    }
}
