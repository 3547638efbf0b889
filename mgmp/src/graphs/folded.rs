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

use crate::goals::{GoalDistance, GoalSet};
use crate::graphs::{EdgeChange, FilteredVertexIter, SearchGraph, VertexId, VertexKind};
use crate::roadmap::{NodeId, Roadmap};
use crate::space::{Config, GraspId};
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

/// The folded multi-grasp graph: one grasp-agnostic base layer over all
/// roadmap nodes, using base costs, plus per-grasp layers entered through
/// zero-cost lift edges at goal nodes.
///
/// The search leaves the start through the base layer; its base-layer
/// expansion is the single backwards search whose cost-to-come estimates are
/// shared by every grasp. Lifting at a goal node drops the search into that
/// goal's grasp layer, which it then walks back to the start under the
/// grasp-conditional costs. The folded goal vertices are therefore the
/// start's per-grasp copies, and grasp-layer vertices aim their heuristic
/// back at the start configuration.
///
/// The stationary variant keeps the base-layer heuristic it was built with.
/// The dynamic variant swaps in a fresh heuristic whenever grasps are pruned
/// from the goal set, which invalidates memoized `h` values; only the
/// LPA*-family searches can replan through that, so the planner restricts
/// the dynamic variant to them.
pub struct FoldedGraph {
    roadmap: Rc<RefCell<Roadmap>>,
    goals: Rc<RefCell<GoalSet>>,
    heuristic: RefCell<Rc<GoalDistance>>,
    start: NodeId,
    start_config: Config,
    dynamic: bool,
    registry: Rc<RefCell<Registry>>,
    journal_cursor: Cell<usize>,
}

#[derive(Default)]
struct Registry {
    forward_base: HashMap<NodeId, VertexId>,
    forward_grasp: HashMap<(NodeId, GraspId), VertexId>,
    reverse: Vec<VertexKind>,
    layers: BTreeSet<GraspId>,
}

impl Registry {
    fn base_vertex(&mut self, node: NodeId) -> VertexId {
        if let Some(v) = self.forward_base.get(&node) {
            return *v;
        }
        let v = self.reverse.len();
        self.reverse.push(VertexKind::Base(node));
        self.forward_base.insert(node, v);
        v
    }

    fn grasp_vertex(&mut self, node: NodeId, grasp: GraspId) -> VertexId {
        if let Some(v) = self.forward_grasp.get(&(node, grasp)) {
            return *v;
        }
        let v = self.reverse.len();
        self.reverse.push(VertexKind::Grasped(node, grasp));
        self.forward_grasp.insert((node, grasp), v);
        self.layers.insert(grasp);
        v
    }

    fn kind(&self, v: VertexId) -> Option<VertexKind> {
        self.reverse.get(v).copied()
    }
}

impl FoldedGraph {
    pub fn new(
        roadmap: Rc<RefCell<Roadmap>>,
        goals: Rc<RefCell<GoalSet>>,
        heuristic: Rc<GoalDistance>,
        start: NodeId,
        dynamic: bool,
    ) -> Self {
        let start_config = roadmap
            .borrow()
            .get_node(start)
            .expect("start node must exist in the roadmap")
            .config
            .clone();
        let journal_cursor = Cell::new(roadmap.borrow().journal_cursor());
        let registry = Rc::new(RefCell::new(Registry::default()));
        // The start's base vertex gets the first id.
        registry.borrow_mut().base_vertex(start);
        Self {
            roadmap,
            goals,
            heuristic: RefCell::new(heuristic),
            start,
            start_config,
            dynamic,
            registry,
            journal_cursor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Replace the base-layer heuristic after the goal set changed. Only
    /// meaningful for the dynamic variant; the caller must make the search
    /// refresh its memoized `h` values afterwards.
    pub fn set_heuristic(&self, heuristic: Rc<GoalDistance>) {
        *self.heuristic.borrow_mut() = heuristic;
    }

    fn kind(&self, v: VertexId) -> Option<VertexKind> {
        self.registry.borrow().kind(v)
    }

    fn neighbor_iter(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        let candidates: SmallVec<[VertexId; 16]> = match self.kind(v) {
            Some(VertexKind::Base(node)) => {
                let neighbors = {
                    let mut roadmap = self.roadmap.borrow_mut();
                    roadmap.update_adjacency(node);
                    roadmap.neighbors(node)
                };
                let goals = self.goals.borrow();
                let mut registry = self.registry.borrow_mut();
                let mut out: SmallVec<[VertexId; 16]> = neighbors
                    .into_iter()
                    .map(|n| registry.base_vertex(n))
                    .collect();
                if let Some(goal) = goals.goal_at_node(node) {
                    out.push(registry.grasp_vertex(node, goal.grasp_id));
                }
                out
            }
            Some(VertexKind::Grasped(node, grasp)) => {
                let neighbors = {
                    let mut roadmap = self.roadmap.borrow_mut();
                    roadmap.update_adjacency(node);
                    roadmap.neighbors(node)
                };
                let goals = self.goals.borrow();
                let mut registry = self.registry.borrow_mut();
                let mut out: SmallVec<[VertexId; 16]> = neighbors
                    .into_iter()
                    .map(|n| registry.grasp_vertex(n, grasp))
                    .collect();
                if goals.goal_id_for(node, grasp).is_some() {
                    out.push(registry.base_vertex(node));
                }
                out
            }
            _ => SmallVec::new(),
        };
        let roadmap = self.roadmap.clone();
        let registry = self.registry.clone();
        Box::new(FilteredVertexIter::new(candidates, move |candidate| {
            match registry.borrow().kind(candidate) {
                Some(VertexKind::Base(node)) => roadmap.borrow_mut().is_valid(node),
                Some(VertexKind::Grasped(node, grasp)) => {
                    let mut roadmap = roadmap.borrow_mut();
                    if lazy {
                        roadmap.is_valid(node)
                    } else {
                        roadmap.is_valid_with_grasp(node, grasp)
                    }
                }
                _ => false,
            }
        }))
    }
}

impl SearchGraph for FoldedGraph {
    fn start_vertex(&self) -> VertexId {
        self.registry.borrow_mut().base_vertex(self.start)
    }

    fn check_validity(&self, v: VertexId) -> bool {
        match self.kind(v) {
            Some(VertexKind::Base(node)) => self.roadmap.borrow_mut().is_valid(node),
            Some(VertexKind::Grasped(node, grasp)) => {
                self.roadmap.borrow_mut().is_valid_with_grasp(node, grasp)
            }
            _ => false,
        }
    }

    fn heuristic(&self, v: VertexId) -> f64 {
        match self.kind(v) {
            Some(VertexKind::Base(node)) => {
                let roadmap = self.roadmap.borrow();
                let Some(node) = roadmap.get_node(node) else {
                    return f64::INFINITY;
                };
                self.heuristic.borrow().cost_to_go(&node.config)
            }
            // Grasp layers travel from a goal back towards the start.
            Some(VertexKind::Grasped(node, _)) => {
                let roadmap = self.roadmap.borrow();
                let Some(node) = roadmap.get_node(node) else {
                    return f64::INFINITY;
                };
                roadmap.distance(&node.config, &self.start_config)
            }
            _ => f64::INFINITY,
        }
    }

    fn successors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        self.neighbor_iter(v, lazy)
    }

    fn predecessors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        self.neighbor_iter(v, lazy)
    }

    fn edge_cost(&self, u: VertexId, v: VertexId, lazy: bool) -> f64 {
        let (Some(ku), Some(kv)) = (self.kind(u), self.kind(v)) else {
            return f64::INFINITY;
        };
        match (ku, kv) {
            (VertexKind::Base(a), VertexKind::Base(b)) => {
                let mut roadmap = self.roadmap.borrow_mut();
                if lazy {
                    roadmap.lazy_cost(a, b)
                } else {
                    roadmap.compute_cost(a, b)
                }
            }
            (VertexKind::Grasped(a, ga), VertexKind::Grasped(b, gb)) if ga == gb => {
                let mut roadmap = self.roadmap.borrow_mut();
                if lazy {
                    roadmap.lazy_conditional_cost(a, b, ga)
                } else {
                    roadmap.compute_conditional_cost(a, b, ga)
                }
            }
            // Zero-cost lift between a goal node's base and grasp copies.
            (VertexKind::Base(a), VertexKind::Grasped(b, grasp))
            | (VertexKind::Grasped(b, grasp), VertexKind::Base(a))
                if a == b =>
            {
                if self.goals.borrow().goal_id_for(a, grasp).is_some() {
                    0.0
                } else {
                    f64::INFINITY
                }
            }
            _ => f64::INFINITY,
        }
    }

    fn is_goal(&self, v: VertexId) -> bool {
        let Some(VertexKind::Grasped(node, grasp)) = self.kind(v) else {
            return false;
        };
        if node != self.start {
            return false;
        }
        let goals = self.goals.borrow();
        if !goals.grasps_with_goals().contains(&grasp) {
            return false;
        }
        self.roadmap.borrow_mut().is_valid_with_grasp(node, grasp)
    }

    fn goal_cost(&self, v: VertexId) -> f64 {
        let Some(VertexKind::Grasped(node, grasp)) = self.kind(v) else {
            return f64::INFINITY;
        };
        if node != self.start {
            return f64::INFINITY;
        }
        // The lift edge does not remember which goal it came through, so
        // the terminal penalty is the optimistic one over the grasp's goals.
        let goals = self.goals.borrow();
        let heuristic = self.heuristic.borrow();
        goals
            .goals()
            .iter()
            .filter(|goal| goal.grasp_id == grasp)
            .map(|goal| heuristic.goal_cost(goal.quality))
            .fold(f64::INFINITY, f64::min)
    }

    fn resolve(&self, v: VertexId) -> VertexKind {
        self.kind(v).unwrap_or(VertexKind::Base(self.start))
    }

    fn set_goal_heuristic(&self, heuristic: Rc<GoalDistance>) {
        if self.dynamic {
            self.set_heuristic(heuristic);
        }
    }

    fn take_edge_changes(&self) -> Vec<EdgeChange> {
        let roadmap = self.roadmap.borrow();
        let changes = roadmap.cost_changes_since(self.journal_cursor.get());
        self.journal_cursor
            .set(self.journal_cursor.get() + changes.len());
        let mut registry = self.registry.borrow_mut();
        let mut out = Vec::new();
        let mut push_pair = |va: VertexId, vb: VertexId, old: f64| {
            out.push(EdgeChange {
                u: va,
                v: vb,
                old_cost: old,
            });
            out.push(EdgeChange {
                u: vb,
                v: va,
                old_cost: old,
            });
        };
        for change in changes {
            match change.grasp_id {
                None => {
                    // Base layer.
                    let known = registry.forward_base.contains_key(&change.a)
                        || registry.forward_base.contains_key(&change.b);
                    if known {
                        let va = registry.base_vertex(change.a);
                        let vb = registry.base_vertex(change.b);
                        push_pair(va, vb, change.old_cost);
                    }
                    // Fan out into the grasp layers the search has entered.
                    let layers: SmallVec<[GraspId; 8]> =
                        registry.layers.iter().copied().collect();
                    for grasp in layers {
                        let known = registry.forward_grasp.contains_key(&(change.a, grasp))
                            || registry.forward_grasp.contains_key(&(change.b, grasp));
                        if known {
                            let va = registry.grasp_vertex(change.a, grasp);
                            let vb = registry.grasp_vertex(change.b, grasp);
                            push_pair(va, vb, change.old_cost);
                        }
                    }
                }
                Some(grasp) => {
                    let known = registry.forward_grasp.contains_key(&(change.a, grasp))
                        || registry.forward_grasp.contains_key(&(change.b, grasp));
                    if known {
                        let va = registry.grasp_vertex(change.a, grasp);
                        let vb = registry.grasp_vertex(change.b, grasp);
                        push_pair(va, vb, change.old_cost);
                    }
                }
            }
        }
        out
    }
}
