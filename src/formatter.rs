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

//! Module that introduces a formatter to display all types containing `RouterId`.

use crate::{
    evaluator::{Query, QueryError, QueryResult},
    model::{PolicyModel, RouteTargetId, RouterId},
};

/// Trait to format a type that contains RouterIds
pub trait ModelFormatter<'a, 'm> {
    /// Type that is returned, which implements `std::fmt::Display`.
    type Formatter;

    /// Return a struct that can be formatted and displayed.
    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter;
}

impl<'a, 'm> ModelFormatter<'a, 'm> for RouterId {
    type Formatter = &'m str;

    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter {
        model.get_router_name(*self).unwrap_or("?")
    }
}

impl<'a, 'm> ModelFormatter<'a, 'm> for RouteTargetId {
    type Formatter = &'m str;

    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter {
        model.get_route_target_name(*self).unwrap_or("?")
    }
}

impl<'a, 'm> ModelFormatter<'a, 'm> for Query {
    type Formatter = String;

    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter {
        format!(
            "{} -> {} IP={}",
            self.source.fmt(model),
            self.destination.fmt(model),
            self.target
        )
    }
}

impl<'a, 'm> ModelFormatter<'a, 'm> for QueryResult {
    type Formatter = String;

    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter {
        let reason = self
            .reason_unknown
            .as_ref()
            .map(|r| format!(" [{r}]"))
            .unwrap_or_default();
        format!(
            "{}: {} ({:.2} ms){}",
            self.query.fmt(model),
            self.verdict,
            self.elapsed.as_secs_f64() * 1000.0,
            reason
        )
    }
}

impl<'a, 'm> ModelFormatter<'a, 'm> for Result<QueryResult, QueryError> {
    type Formatter = String;

    fn fmt(&'a self, model: &'m PolicyModel) -> Self::Formatter {
        match self {
            Ok(r) => r.fmt(model),
            Err(e) => format!("error: {e}"),
        }
    }
}
