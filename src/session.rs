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

//! Solver session holding the base constraints of a [`PolicyModel`].
//!
//! The session declares two uninterpreted sorts, `Router` and `RT`, one constant for each router
//! and route-target, and the relations `Ibgp_Neighbor`, `Has_Export_RT`, and `Has_Import_RT`. The
//! relations are fully specified for every pair of constants. The permanent assertions also close
//! the universe of routers and route-targets by making all constants distinct.

use std::{rc::Rc, time::Duration};

use itertools::iproduct;
use log::{debug, info};
use z3::{
    ast::{Ast, Bool, Dynamic, Int},
    Context, FuncDecl, Params, SatResult, Solver, Sort,
};

use crate::model::{PolicyModel, RouteTargetId, RouterId};

/// Largest address (`255.255.255.255`).
pub const MAX_ADDRESS: u64 = u32::MAX as u64;

/// Sorts, functions and constants shared by all forks of a session.
struct Symbols<'ctx> {
    /// The Z3 context
    ctx: &'ctx Context,
    /// Relation `Router x Router -> Bool`
    ibgp_neighbor: FuncDecl<'ctx>,
    /// Relation `Router x RT -> Bool`
    has_export_rt: FuncDecl<'ctx>,
    /// Relation `Router x RT -> Bool`
    has_import_rt: FuncDecl<'ctx>,
    /// Function `Router x Int -> Bool`, only constrained by the global encoding.
    is_prefix_denied: FuncDecl<'ctx>,
    /// One constant for each router, indexed by the router id.
    routers: Vec<Dynamic<'ctx>>,
    /// One constant for each route-target, indexed by the route-target id.
    route_targets: Vec<Dynamic<'ctx>>,
    /// Free route-target shared by all queries (the witness).
    rt_val: Dynamic<'ctx>,
    /// The address of a query.
    target_ip: Int<'ctx>,
}

/// # Solver Session
///
/// A solver together with the permanent base assertions of a policy model. All queries on a session
/// must happen within a [`Scope`], such that the permanent assertions remain unchanged.
pub struct Session<'ctx> {
    symbols: Rc<Symbols<'ctx>>,
    solver: Solver<'ctx>,
    /// Set once the quantified definitions of `Is_Prefix_Denied` are asserted on this solver.
    denied_defined: bool,
}

impl std::fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("routers", &self.symbols.routers.len())
            .field("route_targets", &self.symbols.route_targets.len())
            .field("assertions", &self.num_assertions())
            .field("denied_defined", &self.denied_defined)
            .finish()
    }
}

impl<'ctx> Session<'ctx> {
    /// Declare all sorts and functions, and assert the base constraints of the model.
    pub fn new(ctx: &'ctx Context, model: &PolicyModel) -> Self {
        info!(
            "Building the base constraints for {} routers and {} route-targets",
            model.num_routers(),
            model.num_route_targets()
        );
        let router_sort = Sort::uninterpreted(ctx, "Router".into());
        let rt_sort = Sort::uninterpreted(ctx, "RT".into());
        let bool_sort = Sort::bool(ctx);
        let int_sort = Sort::int(ctx);

        let ibgp_neighbor = FuncDecl::new(
            ctx,
            "Ibgp_Neighbor",
            &[&router_sort, &router_sort],
            &bool_sort,
        );
        let has_export_rt = FuncDecl::new(ctx, "Has_Export_RT", &[&router_sort, &rt_sort], &bool_sort);
        let has_import_rt = FuncDecl::new(ctx, "Has_Import_RT", &[&router_sort, &rt_sort], &bool_sort);
        let is_prefix_denied = FuncDecl::new(
            ctx,
            "Is_Prefix_Denied",
            &[&router_sort, &int_sort],
            &bool_sort,
        );

        let routers: Vec<Dynamic<'ctx>> = model
            .routers()
            .map(|r| {
                let name = model.get_router_name(r).unwrap_or_default();
                FuncDecl::new(ctx, format!("router:{name}"), &[], &router_sort).apply(&[])
            })
            .collect();
        let route_targets: Vec<Dynamic<'ctx>> = model
            .route_targets()
            .map(|(_, name)| FuncDecl::new(ctx, format!("rt:{name}"), &[], &rt_sort).apply(&[]))
            .collect();
        let rt_val = FuncDecl::new(ctx, "rt_val", &[], &rt_sort).apply(&[]);
        let target_ip = Int::new_const(ctx, "target_ip");

        let symbols = Symbols {
            ctx,
            ibgp_neighbor,
            has_export_rt,
            has_import_rt,
            is_prefix_denied,
            routers,
            route_targets,
            rt_val,
            target_ip,
        };

        let solver = Solver::new(ctx);
        assert_base_constraints(&solver, &symbols, model);

        let session = Self {
            symbols: Rc::new(symbols),
            solver,
            denied_defined: false,
        };
        debug!(
            "Base constraints ready: {} assertions",
            session.num_assertions()
        );
        session
    }

    /// Create an independent copy of the session. The copy has the same permanent assertions, but
    /// an empty assumption stack. Assertions added to one session are never visible in the other.
    ///
    /// **Warning** Do not fork a session while a [`Scope`] is open, as the copy would contain the
    /// assertions of that scope permanently.
    pub fn fork(&self) -> Self {
        Self {
            symbols: self.symbols.clone(),
            solver: self.solver.translate(self.symbols.ctx),
            denied_defined: self.denied_defined,
        }
    }

    /// Set a timeout for each satisfiability check. Once the timeout is reached, the check reports
    /// an unknown result.
    pub fn set_timeout(&mut self, timeout: Duration) {
        let mut params = Params::new(self.symbols.ctx);
        params.set_u32("timeout", timeout.as_millis().min(u32::MAX as u128) as u32);
        self.solver.set_params(&params);
    }

    /// Set a boolean solver parameter, e.g., `smt.mbqi`.
    pub fn set_bool_param(&mut self, name: &str, value: bool) {
        let mut params = Params::new(self.symbols.ctx);
        params.set_bool(name, value);
        self.solver.set_params(&params);
    }

    /// Returns `true` if the quantified definitions of `Is_Prefix_Denied` are part of the
    /// permanent assertions. Forks inherit this state together with the assertions.
    pub fn has_denied_definitions(&self) -> bool {
        self.denied_defined
    }

    /// Assert the quantified definitions of `Is_Prefix_Denied` permanently. Does nothing (and
    /// returns `false`) if the definitions were already asserted on this session.
    pub(crate) fn define_denied(&mut self, definitions: &[Bool<'ctx>]) -> bool {
        if self.denied_defined {
            return false;
        }
        for d in definitions {
            self.solver.assert(d);
        }
        self.denied_defined = true;
        true
    }

    /// Number of routers that have a constant in this session.
    pub fn num_routers(&self) -> usize {
        self.symbols.routers.len()
    }

    /// Returns `true` if the router has a constant in this session.
    pub fn contains_router(&self, router: RouterId) -> bool {
        router.index() < self.symbols.routers.len()
    }

    /// The Z3 context of the session
    pub fn ctx(&self) -> &'ctx Context {
        self.symbols.ctx
    }

    /// Assert a formula permanently.
    pub fn assert(&mut self, formula: &Bool<'ctx>) {
        self.solver.assert(formula);
    }

    /// Number of permanent assertions (only meaningful if no scope is open).
    pub fn num_assertions(&self) -> usize {
        self.solver.get_assertions().len()
    }

    /// Open a new scope on the assumption stack. The scope is removed once the returned guard is
    /// dropped.
    pub fn scope(&mut self) -> Scope<'_, 'ctx> {
        Scope::new(&self.solver)
    }

    /// Get the constant of a router.
    ///
    /// **Warning** This function panics if the router does not exist in the model.
    pub fn router(&self, router: RouterId) -> &Dynamic<'ctx> {
        &self.symbols.routers[router.index()]
    }

    /// Get the constant of a route-target.
    ///
    /// **Warning** This function panics if the route-target does not exist in the model.
    pub fn route_target(&self, rt: RouteTargetId) -> &Dynamic<'ctx> {
        &self.symbols.route_targets[rt.index()]
    }

    /// The free route-target of a query.
    pub fn rt_witness(&self) -> &Dynamic<'ctx> {
        &self.symbols.rt_val
    }

    /// The address of a query. It is constrained to a valid IPv4 address.
    pub fn target_ip(&self) -> &Int<'ctx> {
        &self.symbols.target_ip
    }

    /// `Ibgp_Neighbor(a, b)`
    pub fn ibgp_neighbor(&self, a: RouterId, b: RouterId) -> Bool<'ctx> {
        apply_bool(&self.symbols.ibgp_neighbor, self.router(a), self.router(b))
    }

    /// `Has_Export_RT(router, rt)`
    pub fn has_export_rt(&self, router: RouterId, rt: &Dynamic<'ctx>) -> Bool<'ctx> {
        apply_bool(&self.symbols.has_export_rt, self.router(router), rt)
    }

    /// `Has_Import_RT(router, rt)`
    pub fn has_import_rt(&self, router: RouterId, rt: &Dynamic<'ctx>) -> Bool<'ctx> {
        apply_bool(&self.symbols.has_import_rt, self.router(router), rt)
    }

    /// `Is_Prefix_Denied(router, address)`
    pub fn is_prefix_denied(&self, router: RouterId, address: &Int<'ctx>) -> Bool<'ctx> {
        apply_bool(&self.symbols.is_prefix_denied, self.router(router), address)
    }
}

/// Apply a binary predicate.
fn apply_bool<'ctx>(f: &FuncDecl<'ctx>, a: &dyn Ast<'ctx>, b: &dyn Ast<'ctx>) -> Bool<'ctx> {
    f.apply(&[a, b])
        .as_bool()
        .expect("All relations of the session have a boolean range")
}

/// Assert distinctness of all constants, the relation tables, and the address range.
fn assert_base_constraints<'ctx>(solver: &Solver<'ctx>, s: &Symbols<'ctx>, model: &PolicyModel) {
    let ctx = s.ctx;

    // the universe of routers and route-targets is closed
    if !s.routers.is_empty() {
        solver.assert(&Dynamic::distinct(ctx, &s.routers.iter().collect::<Vec<_>>()));
    }
    if !s.route_targets.is_empty() {
        solver.assert(&Dynamic::distinct(
            ctx,
            &s.route_targets.iter().collect::<Vec<_>>(),
        ));
    }
    let witness_is_known = s
        .route_targets
        .iter()
        .map(|rt| s.rt_val._eq(rt))
        .collect::<Vec<_>>();
    solver.assert(&Bool::or(ctx, &witness_is_known.iter().collect::<Vec<_>>()));

    // adjacency
    for (a, b) in iproduct!(model.routers(), model.routers()) {
        let rel = apply_bool(&s.ibgp_neighbor, &s.routers[a.index()], &s.routers[b.index()]);
        solver.assert(&rel._eq(&Bool::from_bool(ctx, model.is_adjacent(a, b))));
    }

    // route-target membership
    for (r, (rt, _)) in iproduct!(model.routers(), model.route_targets()) {
        let router = &s.routers[r.index()];
        let target = &s.route_targets[rt.index()];
        let import = apply_bool(&s.has_import_rt, router, target);
        let export = apply_bool(&s.has_export_rt, router, target);
        solver.assert(&import._eq(&Bool::from_bool(ctx, model.imports(r, rt))));
        solver.assert(&export._eq(&Bool::from_bool(ctx, model.exports(r, rt))));
    }

    // valid IPv4 address
    solver.assert(&s.target_ip.ge(&Int::from_u64(ctx, 0)));
    solver.assert(&s.target_ip.le(&Int::from_u64(ctx, MAX_ADDRESS)));
}

/// # Solver Scope
///
/// Guard of a nested scope on the assumption stack of a solver. Creating the scope pushes a new
/// checkpoint. Dropping it pops the checkpoint again, removing all assertions made within the
/// scope, on every exit path.
pub struct Scope<'s, 'ctx> {
    solver: &'s Solver<'ctx>,
}

impl std::fmt::Debug for Scope<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scope")
    }
}

impl<'s, 'ctx> Scope<'s, 'ctx> {
    /// Push a new checkpoint on the solver.
    fn new(solver: &'s Solver<'ctx>) -> Self {
        solver.push();
        Self { solver }
    }

    /// Assert a formula within this scope.
    pub fn assert(&self, formula: &Bool<'ctx>) {
        self.solver.assert(formula);
    }

    /// Check satisfiability of all permanent assertions together with those of the scope.
    pub fn check(&self) -> SatResult {
        self.solver.check()
    }

    /// Reason why the last check returned an unknown result.
    pub fn reason_unknown(&self) -> Option<String> {
        self.solver.get_reason_unknown()
    }
}

impl Drop for Scope<'_, '_> {
    fn drop(&mut self) {
        self.solver.pop(1);
    }
}
