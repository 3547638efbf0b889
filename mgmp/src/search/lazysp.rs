/*
 * Copyright (C) 2025 Open Source Robotics Foundation
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 *
*/

//! LazySP driven by an incremental inner search.
//!
//! The inner LPA* plans over cached edge costs only. Each outer round
//! evaluates the unresolved edges along the candidate path; if any of them
//! resolve away from their optimistic estimates, the resulting change events
//! are absorbed and the inner search repairs its plan. The loop ends when a
//! candidate path survives full evaluation, which makes it optimal under the
//! true costs.

use crate::graphs::SearchGraph;
use crate::search::lpastar::LpaStar;
use crate::search::SearchResult;

pub fn lazy_sp<G: SearchGraph>(search: &mut LpaStar<G>) -> SearchResult {
    loop {
        let result = search.compute_shortest_path();
        if !result.solved {
            return result;
        }
        // Force the exact cost of every edge along the candidate path.
        for pair in result.path.windows(2) {
            search.graph().edge_cost(pair[0], pair[1], false);
        }
        let changes = search.graph().take_edge_changes();
        if changes.is_empty() {
            // The candidate is fully evaluated, so its cost is exact.
            return result;
        }
        search.update_edges(&changes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::{EdgeChange, VertexId, VertexKind};
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    /// Edges carry an optimistic estimate until the search asks for the
    /// exact cost; resolutions are reported as change events, like the
    /// roadmap adapters do.
    #[derive(Clone)]
    struct LazyFixture {
        inner: Rc<RefCell<Inner>>,
    }

    struct Inner {
        start: VertexId,
        estimates: BTreeMap<(VertexId, VertexId), f64>,
        exact: BTreeMap<(VertexId, VertexId), f64>,
        resolved: BTreeMap<(VertexId, VertexId), f64>,
        goals: BTreeMap<VertexId, f64>,
        pending: Vec<EdgeChange>,
        evaluations: usize,
    }

    impl LazyFixture {
        fn new(start: VertexId) -> Self {
            Self {
                inner: Rc::new(RefCell::new(Inner {
                    start,
                    estimates: BTreeMap::new(),
                    exact: BTreeMap::new(),
                    resolved: BTreeMap::new(),
                    goals: BTreeMap::new(),
                    pending: Vec::new(),
                    evaluations: 0,
                })),
            }
        }

        fn add_edge(&self, u: VertexId, v: VertexId, estimate: f64, exact: f64) {
            let mut inner = self.inner.borrow_mut();
            for key in [(u, v), (v, u)] {
                inner.estimates.insert(key, estimate);
                inner.exact.insert(key, exact);
            }
        }

        fn set_goal(&self, v: VertexId, goal_cost: f64) {
            self.inner.borrow_mut().goals.insert(v, goal_cost);
        }

        fn evaluations(&self) -> usize {
            self.inner.borrow().evaluations
        }
    }

    impl SearchGraph for LazyFixture {
        fn start_vertex(&self) -> VertexId {
            self.inner.borrow().start
        }

        fn check_validity(&self, _: VertexId) -> bool {
            true
        }

        fn heuristic(&self, _: VertexId) -> f64 {
            0.0
        }

        fn successors(&self, v: VertexId, _: bool) -> Box<dyn Iterator<Item = VertexId>> {
            let inner = self.inner.borrow();
            let out: Vec<VertexId> = inner
                .estimates
                .keys()
                .filter(|(u, _)| *u == v)
                .map(|(_, s)| *s)
                .collect();
            Box::new(out.into_iter())
        }

        fn predecessors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
            self.successors(v, lazy)
        }

        fn edge_cost(&self, u: VertexId, v: VertexId, lazy: bool) -> f64 {
            let mut inner = self.inner.borrow_mut();
            if let Some(cost) = inner.resolved.get(&(u, v)) {
                return *cost;
            }
            let estimate = *inner
                .estimates
                .get(&(u, v))
                .unwrap_or(&f64::INFINITY);
            if lazy {
                return estimate;
            }
            let exact = *inner.exact.get(&(u, v)).unwrap_or(&f64::INFINITY);
            inner.evaluations += 1;
            inner.resolved.insert((u, v), exact);
            inner.resolved.insert((v, u), exact);
            if exact != estimate {
                inner.pending.push(EdgeChange {
                    u,
                    v,
                    old_cost: estimate,
                });
                inner.pending.push(EdgeChange {
                    u: v,
                    v: u,
                    old_cost: estimate,
                });
            }
            exact
        }

        fn is_goal(&self, v: VertexId) -> bool {
            self.inner.borrow().goals.contains_key(&v)
        }

        fn goal_cost(&self, v: VertexId) -> f64 {
            *self.inner.borrow().goals.get(&v).unwrap_or(&f64::INFINITY)
        }

        fn resolve(&self, v: VertexId) -> VertexKind {
            VertexKind::Base(v)
        }

        fn take_edge_changes(&self) -> Vec<EdgeChange> {
            std::mem::take(&mut self.inner.borrow_mut().pending)
        }
    }

    /// Two routes to the goal: one looks cheap but is expensive, the other
    /// is honestly priced.
    fn deceptive() -> LazyFixture {
        let fixture = LazyFixture::new(0);
        fixture.add_edge(0, 1, 1.0, 1.0);
        fixture.add_edge(1, 4, 1.0, 1.0);
        fixture.add_edge(0, 2, 0.2, 5.0);
        fixture.add_edge(2, 4, 0.2, 5.0);
        fixture.set_goal(4, 0.0);
        fixture
    }

    #[test]
    fn converges_to_the_truly_cheapest_path() {
        let fixture = deceptive();
        let mut search = LpaStar::new(fixture.clone(), true);
        let result = lazy_sp(&mut search);
        assert!(result.solved);
        assert_eq!(result.path, vec![0, 1, 4]);
        assert_eq!(result.path_cost, 2.0);
    }

    #[test]
    fn only_candidate_path_edges_are_evaluated() {
        let fixture = deceptive();
        let mut search = LpaStar::new(fixture.clone(), true);
        lazy_sp(&mut search);
        // Both candidate routes were probed, nothing else: at most the four
        // undirected edges, and at least the two on the deceptive route.
        assert!(fixture.evaluations() >= 2);
        assert!(fixture.evaluations() <= 4);
    }

    #[test]
    fn an_exactly_estimated_path_needs_one_round() {
        let fixture = LazyFixture::new(0);
        fixture.add_edge(0, 1, 1.0, 1.0);
        fixture.add_edge(1, 2, 2.0, 2.0);
        fixture.set_goal(2, 0.0);
        let mut search = LpaStar::new(fixture.clone(), true);
        let result = lazy_sp(&mut search);
        assert!(result.solved);
        assert_eq!(result.path_cost, 3.0);
        assert_eq!(fixture.evaluations(), 2);
    }

    #[test]
    fn infeasible_when_every_route_resolves_infinite() {
        let fixture = LazyFixture::new(0);
        fixture.add_edge(0, 1, 1.0, f64::INFINITY);
        fixture.set_goal(1, 0.0);
        let mut search = LpaStar::new(fixture.clone(), true);
        let result = lazy_sp(&mut search);
        assert!(!result.solved);
        assert!(result.path.is_empty());
    }
}
