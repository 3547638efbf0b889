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

//! One-shot A* over a search graph, in an eager and a lazy-weighted
//! flavor.
//!
//! The eager variant resolves every touched edge exactly while expanding.
//! The lazy-weighted variant queues children under the cached optimistic
//! costs and defers the expensive evaluation until a vertex is popped: if
//! the true cost of its inbound edge pushes the vertex back in the order,
//! it is re-queued instead of expanded.

use crate::graphs::{SearchGraph, VertexId};
use crate::search::SearchResult;
use float_ord::FloatOrd;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket {
    f: FloatOrd<f64>,
    g: FloatOrd<f64>,
    v: VertexId,
    parent: VertexId,
    evaluated: bool,
}

/// A* with exact edge evaluation at expansion time.
pub fn astar<G: SearchGraph>(graph: &G) -> SearchResult {
    search(graph, false)
}

/// Lazy-weighted A*: edge evaluation deferred until a vertex is popped.
pub fn lazy_weighted_astar<G: SearchGraph>(graph: &G) -> SearchResult {
    search(graph, true)
}

fn search<G: SearchGraph>(graph: &G, lazy: bool) -> SearchResult {
    let start = graph.start_vertex();
    let mut result = SearchResult::unsolved(start);
    if !graph.check_validity(start) {
        return result;
    }

    let mut queue: BinaryHeap<Reverse<Ticket>> = BinaryHeap::new();
    // Best finalized cost and parent per vertex.
    let mut closed: HashMap<VertexId, (f64, VertexId)> = HashMap::new();
    let mut best_goal: Option<(VertexId, f64, f64)> = None;

    queue.push(Reverse(Ticket {
        f: FloatOrd(graph.heuristic(start)),
        g: FloatOrd(0.0),
        v: start,
        parent: start,
        evaluated: true,
    }));

    while let Some(Reverse(ticket)) = queue.pop() {
        if let Some((_, path_cost, goal_cost)) = best_goal {
            if ticket.f.0 >= path_cost + goal_cost {
                // Nothing left in the queue can beat the recorded goal.
                break;
            }
        }
        if closed.contains_key(&ticket.v) {
            continue;
        }

        if lazy && !ticket.evaluated {
            // Settle the inbound edge before trusting this ticket.
            let exact = graph.edge_cost(ticket.parent, ticket.v, false);
            let parent_g = closed
                .get(&ticket.parent)
                .map(|(g, _)| *g)
                .unwrap_or(f64::INFINITY);
            let corrected = parent_g + exact;
            if corrected > ticket.g.0 {
                if corrected.is_finite() {
                    queue.push(Reverse(Ticket {
                        f: FloatOrd(corrected + graph.heuristic(ticket.v)),
                        g: FloatOrd(corrected),
                        v: ticket.v,
                        parent: ticket.parent,
                        evaluated: true,
                    }));
                }
                continue;
            }
        }

        if !graph.check_validity(ticket.v) {
            continue;
        }
        closed.insert(ticket.v, (ticket.g.0, ticket.parent));
        result.expansions += 1;

        if graph.is_goal(ticket.v) {
            let goal_cost = graph.goal_cost(ticket.v);
            let total = ticket.g.0 + goal_cost;
            if best_goal.map_or(true, |(_, pc, gc)| total < pc + gc) {
                best_goal = Some((ticket.v, ticket.g.0, goal_cost));
            }
        }

        let successors: Vec<VertexId> = graph.successors(ticket.v, lazy).collect();
        for s in successors {
            if closed.contains_key(&s) {
                continue;
            }
            let cost = graph.edge_cost(ticket.v, s, lazy);
            if cost.is_infinite() {
                continue;
            }
            let g = ticket.g.0 + cost;
            queue.push(Reverse(Ticket {
                f: FloatOrd(g + graph.heuristic(s)),
                g: FloatOrd(g),
                v: s,
                parent: ticket.v,
                evaluated: !lazy,
            }));
        }
    }

    if let Some((goal, path_cost, goal_cost)) = best_goal {
        result.solved = true;
        result.goal_node = goal;
        result.path_cost = path_cost;
        result.goal_cost = goal_cost;
        result.path = extract_path(&closed, start, goal);
    }
    result
}

fn extract_path(
    closed: &HashMap<VertexId, (f64, VertexId)>,
    start: VertexId,
    goal: VertexId,
) -> Vec<VertexId> {
    let mut path = vec![goal];
    let mut current = goal;
    while current != start {
        let Some((_, parent)) = closed.get(&current) else {
            return Vec::new();
        };
        current = *parent;
        path.push(current);
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphs::{EdgeChange, VertexKind};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    /// A fixed graph whose edges carry an optimistic estimate and a true
    /// cost, mimicking the roadmap's lazy caches.
    struct TwoCostGraph {
        start: VertexId,
        edges: BTreeMap<(VertexId, VertexId), (f64, f64)>,
        resolved: RefCell<BTreeMap<(VertexId, VertexId), f64>>,
        goals: BTreeMap<VertexId, f64>,
        evaluations: Cell<usize>,
    }

    impl TwoCostGraph {
        fn new(start: VertexId) -> Self {
            Self {
                start,
                edges: BTreeMap::new(),
                resolved: RefCell::new(BTreeMap::new()),
                goals: BTreeMap::new(),
                evaluations: Cell::new(0),
            }
        }

        fn add_edge(&mut self, u: VertexId, v: VertexId, estimate: f64, exact: f64) {
            self.edges.insert((u, v), (estimate, exact));
            self.edges.insert((v, u), (estimate, exact));
        }
    }

    impl SearchGraph for Rc<TwoCostGraph> {
        fn start_vertex(&self) -> VertexId {
            self.start
        }

        fn check_validity(&self, _: VertexId) -> bool {
            true
        }

        fn heuristic(&self, _: VertexId) -> f64 {
            0.0
        }

        fn successors(&self, v: VertexId, _: bool) -> Box<dyn Iterator<Item = VertexId>> {
            let out: Vec<VertexId> = self
                .edges
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
            let Some((estimate, exact)) = self.edges.get(&(u, v)) else {
                return f64::INFINITY;
            };
            if let Some(resolved) = self.resolved.borrow().get(&(u, v)) {
                return *resolved;
            }
            if lazy {
                *estimate
            } else {
                self.evaluations.set(self.evaluations.get() + 1);
                let mut resolved = self.resolved.borrow_mut();
                resolved.insert((u, v), *exact);
                resolved.insert((v, u), *exact);
                *exact
            }
        }

        fn is_goal(&self, v: VertexId) -> bool {
            self.goals.contains_key(&v)
        }

        fn goal_cost(&self, v: VertexId) -> f64 {
            *self.goals.get(&v).unwrap_or(&f64::INFINITY)
        }

        fn resolve(&self, v: VertexId) -> VertexKind {
            VertexKind::Base(v)
        }

        fn take_edge_changes(&self) -> Vec<EdgeChange> {
            Vec::new()
        }
    }

    /// Start 0; route 0-1-3 is truly cheap, route 0-2-3 looks cheap but
    /// resolves expensive.
    fn deceptive_graph() -> Rc<TwoCostGraph> {
        let mut graph = TwoCostGraph::new(0);
        graph.add_edge(0, 1, 1.0, 1.2);
        graph.add_edge(1, 3, 1.0, 1.2);
        graph.add_edge(0, 2, 0.5, 4.0);
        graph.add_edge(2, 3, 0.5, 4.0);
        graph.goals.insert(3, 0.0);
        Rc::new(graph)
    }

    #[test]
    fn eager_astar_finds_the_true_shortest_path() {
        let graph = deceptive_graph();
        let result = astar(&graph);
        assert!(result.solved);
        assert_eq!(result.path, vec![0, 1, 3]);
        assert_eq!(result.path_cost, 2.4);
    }

    #[test]
    fn lazy_weighted_astar_agrees_with_eager_astar() {
        let graph = deceptive_graph();
        let result = lazy_weighted_astar(&graph);
        assert!(result.solved);
        assert_eq!(result.path, vec![0, 1, 3]);
        assert_eq!(result.path_cost, 2.4);
    }

    #[test]
    fn lazy_weighted_astar_evaluates_fewer_edges() {
        let eager_graph = deceptive_graph();
        astar(&eager_graph);
        let eager_evaluations = eager_graph.evaluations.get();

        let lazy_graph = deceptive_graph();
        lazy_weighted_astar(&lazy_graph);
        let lazy_evaluations = lazy_graph.evaluations.get();
        assert!(lazy_evaluations <= eager_evaluations);
    }

    #[test]
    fn unreachable_goal_is_unsolved() {
        let mut graph = TwoCostGraph::new(0);
        graph.add_edge(0, 1, 1.0, 1.0);
        graph.goals.insert(7, 0.0);
        let result = astar(&Rc::new(graph));
        assert!(!result.solved);
        assert!(result.path.is_empty());
    }

    #[test]
    fn terminal_cost_steers_goal_selection() {
        let mut graph = TwoCostGraph::new(0);
        graph.add_edge(0, 1, 1.0, 1.0);
        graph.add_edge(0, 2, 2.0, 2.0);
        graph.goals.insert(1, 5.0);
        graph.goals.insert(2, 0.0);
        let result = astar(&Rc::new(graph));
        assert!(result.solved);
        assert_eq!(result.goal_node, 2);
        assert_eq!(result.cost(), 2.0);
    }
}
