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

//! Lifelong Planning A*.
//!
//! The engine keeps, for every vertex it has touched, the best known cost
//! `g` and the one-step look-ahead
//! `rhs(v) = min over predecessors u of g(u) + c(u, v)`. A vertex whose two
//! values disagree is inconsistent and waits in a priority queue under the
//! key `(min(g, rhs) + h, min(g, rhs))`; expanding vertices in key order
//! restores consistency along every relevant shortest path. Because the
//! state survives between calls, absorbing a batch of edge-cost changes and
//! re-running [`LpaStar::compute_shortest_path`] repairs just the affected
//! region instead of searching from scratch.

use crate::graphs::{EdgeChange, SearchGraph, VertexId};
use crate::search::heap::{Key, KeyedHeap};
use crate::search::SearchResult;
use smallvec::SmallVec;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct VertexData {
    g: f64,
    rhs: f64,
    /// Heuristic value, fetched from the graph once when the vertex is
    /// first touched.
    h: f64,
    parent: VertexId,
}

/// How the engine consults edge costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Every touched edge is resolved exactly during relaxation; the
    /// resulting change events are absorbed before the next expansion.
    Eager,
    /// Relaxations read the cached estimates only. Results are optimistic
    /// until an outer loop (LazySP) validates them.
    Lazy,
    /// Relaxations read cached estimates, but a vertex's inbound edge is
    /// resolved exactly when the vertex is popped; if that pushes the
    /// vertex back in the queue order it is re-queued instead of expanded.
    LazyWeighted,
}

impl EvaluationMode {
    fn lazy_lookups(&self) -> bool {
        !matches!(self, EvaluationMode::Eager)
    }
}

pub struct LpaStar<G: SearchGraph> {
    graph: G,
    vertex_data: HashMap<VertexId, VertexData>,
    queue: KeyedHeap,
    goal_key: Key,
    result: SearchResult,
    start: VertexId,
    start_valid: bool,
    mode: EvaluationMode,
    lazy: bool,
    expansions: usize,
    #[cfg(test)]
    pop_trace: Vec<Key>,
}

impl<G: SearchGraph> LpaStar<G> {
    /// Set up the search. With `lazy` set, relaxations read the graph's
    /// cached edge costs; otherwise every touched edge is resolved exactly,
    /// and the resulting change events are absorbed before the next
    /// expansion.
    ///
    /// An invalid start leaves the engine inert: the search reports
    /// unsolved with an empty path.
    pub fn new(graph: G, lazy: bool) -> Self {
        let mode = if lazy {
            EvaluationMode::Lazy
        } else {
            EvaluationMode::Eager
        };
        Self::with_mode(graph, mode)
    }

    pub fn with_mode(graph: G, mode: EvaluationMode) -> Self {
        let start = graph.start_vertex();
        let start_valid = graph.check_validity(start);
        let mut this = Self {
            result: SearchResult::unsolved(start),
            graph,
            vertex_data: HashMap::new(),
            queue: KeyedHeap::new(),
            goal_key: Key::INFINITE,
            start,
            start_valid,
            mode,
            lazy: mode.lazy_lookups(),
            expansions: 0,
            #[cfg(test)]
            pop_trace: Vec::new(),
        };
        if start_valid {
            let h = this.graph.heuristic(start);
            this.vertex_data.insert(
                start,
                VertexData {
                    g: f64::INFINITY,
                    rhs: 0.0,
                    h,
                    parent: start,
                },
            );
            this.queue.push(start, Key(h, 0.0));
        }
        this
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn start(&self) -> VertexId {
        self.start
    }

    /// Total vertex expansions over the engine's lifetime.
    pub fn expansions(&self) -> usize {
        self.expansions
    }

    fn ensure_data(&mut self, v: VertexId) -> &mut VertexData {
        if !self.vertex_data.contains_key(&v) {
            let h = self.graph.heuristic(v);
            self.vertex_data.insert(
                v,
                VertexData {
                    g: f64::INFINITY,
                    rhs: f64::INFINITY,
                    h,
                    parent: v,
                },
            );
        }
        self.vertex_data.get_mut(&v).unwrap()
    }

    fn key_for(data: &VertexData) -> Key {
        let g = data.g.min(data.rhs);
        Key(g + data.h, g)
    }

    /// Repair queue membership after `v`'s values moved, and fold `v` into
    /// the goal tracking if it is a goal.
    fn update_vertex_key(&mut self, v: VertexId) {
        let data = self.ensure_data(v).clone();
        let consistent = data.g == data.rhs;
        let key = Self::key_for(&data);
        if !consistent {
            if self.queue.contains(v) {
                self.queue.update(v, key);
            } else {
                self.queue.push(v, key);
            }
        } else if self.queue.contains(v) {
            self.queue.remove(v);
        }

        if self.graph.is_goal(v) {
            let goal_cost = self.graph.goal_cost(v);
            let v_goal_key = Key(data.g + goal_cost, data.g);
            if v_goal_key < self.goal_key {
                self.goal_key = v_goal_key;
                self.result.goal_node = v;
                self.result.goal_cost = goal_cost;
                self.result.path_cost = data.g;
                self.result.solved = data.g == data.rhs;
            } else if v == self.result.goal_node {
                // The recorded goal itself got worse; re-track it at its
                // current values so the termination bound stays sound.
                self.goal_key = v_goal_key;
                self.result.goal_cost = goal_cost;
                self.result.path_cost = data.g;
                self.result.solved = data.g == data.rhs && data.g.is_finite();
            }
        }
    }

    /// Try to reach `v` more cheaply through `u`.
    fn handle_cost_decrease(&mut self, u: VertexId, v: VertexId) {
        let edge_cost = self.graph.edge_cost(u, v, self.lazy);
        let g_u = self.ensure_data(u).g;
        let v_data = self.ensure_data(v);
        if v_data.rhs > g_u + edge_cost {
            v_data.parent = u;
            v_data.rhs = g_u + edge_cost;
            self.update_vertex_key(v);
        }
    }

    /// Reaching `v` through its parent got more expensive; rebuild its
    /// look-ahead from all predecessors.
    fn handle_cost_increase(&mut self, u: VertexId, v: VertexId) {
        if v == self.start {
            return;
        }
        if self.ensure_data(v).parent != u {
            return;
        }
        self.recompute_rhs(v);
        self.update_vertex_key(v);
    }

    fn recompute_rhs(&mut self, v: VertexId) {
        let predecessors: SmallVec<[VertexId; 16]> =
            self.graph.predecessors(v, self.lazy).collect();
        let mut best_rhs = f64::INFINITY;
        let mut best_parent = v;
        for t in predecessors {
            let g_t = self.ensure_data(t).g;
            let rhs = g_t + self.graph.edge_cost(t, v, self.lazy);
            if rhs < best_rhs {
                best_rhs = rhs;
                best_parent = t;
            }
        }
        let v_data = self.ensure_data(v);
        v_data.rhs = best_rhs;
        v_data.parent = best_parent;
    }

    /// Absorb a batch of edge-weight changes into the search state.
    pub fn update_edges(&mut self, changes: &[EdgeChange]) {
        for change in changes {
            let new_cost = self.graph.edge_cost(change.u, change.v, self.lazy);
            if change.old_cost > new_cost {
                self.handle_cost_decrease(change.u, change.v);
            } else {
                self.handle_cost_increase(change.u, change.v);
            }
        }
    }

    /// Pop-time validation for the lazy-weighted mode: resolve the popped
    /// vertex's inbound edge exactly and report whether the vertex should be
    /// re-queued instead of expanded.
    fn settle_parent_edge(&mut self, u: VertexId) -> bool {
        if u == self.start {
            return false;
        }
        let (parent, rhs) = {
            let data = self.ensure_data(u);
            (data.parent, data.rhs)
        };
        if parent == u {
            return false;
        }
        let exact = self.graph.edge_cost(parent, u, false);
        let g_parent = self.ensure_data(parent).g;
        if g_parent + exact > rhs {
            self.recompute_rhs(u);
            self.update_vertex_key(u);
            return true;
        }
        false
    }

    fn expand(&mut self, u: VertexId) {
        self.expansions += 1;
        let u_data = self.ensure_data(u);
        if u_data.g > u_data.rhs {
            // Overconsistent: commit the look-ahead and relax outwards.
            u_data.g = u_data.rhs;
            self.update_vertex_key(u);
            let successors: SmallVec<[VertexId; 16]> =
                self.graph.successors(u, self.lazy).collect();
            for s in successors {
                self.handle_cost_decrease(u, s);
            }
        } else {
            // Underconsistent: retract and let the children look for new
            // parents.
            u_data.g = f64::INFINITY;
            let successors: SmallVec<[VertexId; 16]> =
                self.graph.successors(u, self.lazy).collect();
            for s in successors {
                self.handle_cost_increase(u, s);
            }
            self.update_vertex_key(u);
        }
    }

    /// Run the main loop until the cheapest queued key can no longer beat
    /// the best recorded goal, absorbing edge changes produced by lazy
    /// evaluation between expansions.
    pub fn compute_shortest_path(&mut self) -> SearchResult {
        if !self.start_valid {
            let mut result = self.result.clone();
            result.expansions = self.expansions;
            return result;
        }
        loop {
            // Lazy resolutions of the previous expansion must land before
            // the next pop.
            let changes = self.graph.take_edge_changes();
            if !changes.is_empty() {
                self.update_edges(&changes);
                continue;
            }
            let Some((top, top_key)) = self.queue.peek() else {
                break;
            };
            if !(top_key < self.goal_key) && self.result.solved {
                break;
            }
            self.queue.pop();
            #[cfg(test)]
            self.pop_trace.push(top_key);
            if self.mode == EvaluationMode::LazyWeighted {
                let overconsistent = self
                    .vertex_data
                    .get(&top)
                    .map_or(false, |data| data.g > data.rhs);
                if overconsistent && self.settle_parent_edge(top) {
                    continue;
                }
            }
            self.expand(top);
        }
        let mut result = self.result.clone();
        result.expansions = self.expansions;
        if result.solved {
            result.path = self.extract_path(result.goal_node);
        }
        result
    }

    /// Walk the parent pointers back from the goal.
    fn extract_path(&self, goal: VertexId) -> Vec<VertexId> {
        let mut path = vec![goal];
        let mut current = goal;
        let bound = self.vertex_data.len() + 1;
        while current != self.start && path.len() <= bound {
            current = match self.vertex_data.get(&current) {
                Some(data) => data.parent,
                None => break,
            };
            path.push(current);
        }
        if current != self.start {
            tracing::error!(goal, "parent chain did not reach the start");
            return Vec::new();
        }
        path.reverse();
        path
    }

    /// Forget the recorded goal and rediscover the best one among the
    /// vertices the search already knows. Called after the goal set changed
    /// under the engine.
    pub fn rescan_goals(&mut self) {
        self.goal_key = Key::INFINITE;
        self.result = SearchResult::unsolved(self.start);
        let mut touched: Vec<VertexId> = self.vertex_data.keys().copied().collect();
        touched.sort_unstable();
        for v in touched {
            if !self.graph.is_goal(v) {
                continue;
            }
            let data = self.vertex_data[&v].clone();
            let goal_cost = self.graph.goal_cost(v);
            let v_goal_key = Key(data.g + goal_cost, data.g);
            if v_goal_key < self.goal_key {
                self.goal_key = v_goal_key;
                self.result.goal_node = v;
                self.result.goal_cost = goal_cost;
                self.result.path_cost = data.g;
                self.result.solved = data.g == data.rhs;
            }
        }
    }

    /// Re-fetch the heuristic of every touched vertex and rebuild the queue
    /// keys. Needed when the graph's heuristic changed shape, which only the
    /// incremental engines can recover from.
    pub fn refresh_heuristic(&mut self) {
        let mut touched: Vec<VertexId> = self.vertex_data.keys().copied().collect();
        touched.sort_unstable();
        for v in touched {
            let h = self.graph.heuristic(v);
            self.vertex_data.get_mut(&v).unwrap().h = h;
            if self.queue.contains(v) {
                let key = Self::key_for(&self.vertex_data[&v]);
                self.queue.update(v, key);
            }
        }
    }

    #[cfg(test)]
    fn take_pop_trace(&mut self) -> Vec<Key> {
        std::mem::take(&mut self.pop_trace)
    }

    #[cfg(test)]
    fn invariant_queue_membership(&self) -> bool {
        self.vertex_data.iter().all(|(v, data)| {
            let inconsistent = data.g != data.rhs;
            inconsistent == self.queue.contains(*v)
        })
    }

    #[cfg(test)]
    fn data_of(&self, v: VertexId) -> Option<(f64, f64, VertexId)> {
        self.vertex_data.get(&v).map(|d| (d.g, d.rhs, d.parent))
    }
}
