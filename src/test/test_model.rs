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

//! Test the construction of the policy model.

use std::collections::HashSet;

use itertools::Itertools;
use maplit::hashset;
use pretty_assertions_sorted::assert_eq;
use test_log::test;
use z3::{ast::Ast, SatResult};

use super::{new_ctx, reference_model, rule};
use crate::{
    model::{AclAction::*, ModelError, PolicyModelBuilder},
    session::Session,
};

#[test]
fn reference_model_structure() {
    let model = reference_model();
    assert_eq!(model.num_routers(), 4);
    assert_eq!(model.num_route_targets(), 2);
    assert_eq!(model.num_rules(), 4);

    let pe1 = model.get_router_id("PE1").unwrap();
    let pe2 = model.get_router_id("PE2").unwrap();
    let pe3 = model.get_router_id("PE3").unwrap();
    let p1 = model.get_router_id("P1").unwrap();

    // adjacency is symmetric
    assert!(model.is_adjacent(pe1, pe2));
    assert!(model.is_adjacent(pe2, pe1));
    assert!(model.is_adjacent(pe3, pe1));
    assert!(model.is_adjacent(p1, pe2));
    assert!(!model.is_adjacent(pe2, pe3));
    assert!(!model.is_adjacent(pe1, pe1));
    assert_eq!(model.adjacencies().count(), 3);

    // route-targets
    let rts: HashSet<&str> = model.route_targets().map(|(_, s)| s).collect();
    assert_eq!(rts, hashset! {"65000:1", "65000:2"});
    let (rt1, _) = model.route_targets().find(|(_, s)| *s == "65000:1").unwrap();
    let (rt2, _) = model.route_targets().find(|(_, s)| *s == "65000:2").unwrap();
    assert!(model.exports(pe1, rt1));
    assert!(!model.exports(pe1, rt2));
    assert!(model.exports(pe3, rt1));
    assert!(model.imports(pe3, rt2));
    assert!(!model.imports(pe3, rt1));

    // unconfigured routers have nothing
    assert!(!model.exports(p1, rt1));
    assert!(!model.imports(p1, rt1));
    assert!(model.get_chain(p1).unwrap().is_empty());
    assert!(model.get_chain(pe2).unwrap().is_empty());
    assert_eq!(model.get_chain(pe1).unwrap().len(), 3);
}

#[test]
fn duplicate_router() {
    let mut builder = PolicyModelBuilder::new();
    builder.add_router("PE1").unwrap();
    assert_eq!(
        builder.add_router("PE1"),
        Err(ModelError::DuplicateRouter("PE1".to_string()))
    );
}

#[test]
fn duplicate_index() {
    let mut builder = PolicyModelBuilder::new();
    let r = builder.add_router("PE1").unwrap();
    builder.add_rule(r, rule(10, "10.0.0.0/8", Permit));
    builder.add_rule(r, rule(10, "10.0.1.0/24", Deny));
    assert_eq!(
        builder.build().unwrap_err(),
        ModelError::DuplicateIndex {
            router: "PE1".to_string(),
            index: 10
        }
    );
}

#[test]
fn route_targets_are_interned() {
    let mut builder = PolicyModelBuilder::new();
    let a = builder.add_router("A").unwrap();
    let b = builder.add_router("B").unwrap();
    let rt_a = builder.add_export(a, "65000:1");
    let rt_b = builder.add_import(b, "65000:1");
    let other = builder.add_import(b, "65000:2");
    assert_eq!(rt_a, rt_b);
    assert_ne!(rt_a, other);

    // adding the same session twice has no effect
    builder.add_adjacency(a, b);
    builder.add_adjacency(b, a);
    let model = builder.build().unwrap();
    assert_eq!(model.num_route_targets(), 2);
    assert_eq!(model.adjacencies().count(), 1);
    assert_eq!(model.get_route_target_name(rt_a), Some("65000:1"));
}

#[test]
fn distinct_identities_regardless_of_order() {
    let names = ["PE4", "PE1", "PE3", "PE2", "P9"];
    let rts = ["65000:3", "65000:1", "65000:2"];
    for perm in names.iter().permutations(names.len()).take(10) {
        let mut builder = PolicyModelBuilder::new();
        let ids: Vec<_> = perm.iter().map(|n| builder.add_router(**n).unwrap()).collect();
        for (i, rt) in rts.iter().enumerate() {
            builder.add_export(ids[i], rt);
        }
        let model = builder.build().unwrap();

        assert_eq!(model.routers().unique().count(), names.len());
        assert_eq!(
            model.route_targets().map(|(rt, _)| rt).unique().count(),
            rts.len()
        );
        for n in names {
            assert_eq!(model.get_router_name(model.get_router_id(n).unwrap()), Some(n));
        }

        // the solver constants are pairwise distinct as well
        let ctx = new_ctx();
        let mut session = Session::new(&ctx, &model);
        for (a, b) in model.routers().tuple_combinations() {
            let eq = session.router(a)._eq(session.router(b));
            let scope = session.scope();
            scope.assert(&eq);
            assert_eq!(scope.check(), SatResult::Unsat);
        }
    }
}

#[test]
fn session_constants_are_distinct() {
    let model = reference_model();
    let ctx = new_ctx();
    let mut session = Session::new(&ctx, &model);
    for (a, b) in model.routers().tuple_combinations() {
        let eq = session.router(a)._eq(session.router(b));
        let scope = session.scope();
        scope.assert(&eq);
        assert_eq!(scope.check(), SatResult::Unsat);
    }
    let rts: Vec<_> = model.route_targets().map(|(rt, _)| rt).collect();
    for (a, b) in rts.iter().tuple_combinations() {
        let eq = session.route_target(*a)._eq(session.route_target(*b));
        let scope = session.scope();
        scope.assert(&eq);
        assert_eq!(scope.check(), SatResult::Unsat);
    }
}

#[test]
fn model_display() {
    let model = reference_model();
    let s = model.to_string();
    assert!(s.contains("PE1: neighbors {PE2, PE3}, export {65000:1}, import {65000:1}"));
    assert!(s.contains("P1: neighbors {PE2}, export {}, import {}, filters []"));
}

#[test]
fn model_is_shareable() {
    fn assert_send_sync<T: Send + Sync>(_: &T) {}
    assert_send_sync(&reference_model());
}
