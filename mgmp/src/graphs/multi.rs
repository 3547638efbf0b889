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
use crate::space::GraspId;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// The product of all grasp layers: every roadmap node is replicated once
/// per grasp, edges exist only within a layer, and a synthetic start vertex
/// fans out into each layer's copy of the start node with zero-cost edges.
/// Goals live only in the layer of their own grasp.
///
/// Layer vertices are materialized on demand; the registry assigns stable
/// ids as the search touches `(node, grasp)` pairs.
pub struct MultiGraspGraph {
    roadmap: Rc<RefCell<Roadmap>>,
    goals: Rc<RefCell<GoalSet>>,
    heuristic: Rc<GoalDistance>,
    start: NodeId,
    grasps: Vec<GraspId>,
    registry: Rc<RefCell<Registry>>,
    journal_cursor: Cell<usize>,
}

#[derive(Default)]
struct Registry {
    forward: HashMap<(NodeId, GraspId), VertexId>,
    reverse: Vec<VertexKind>,
}

impl Registry {
    fn new() -> Self {
        Self {
            forward: HashMap::new(),
            reverse: vec![VertexKind::VirtualStart],
        }
    }

    fn vertex_for(&mut self, node: NodeId, grasp: GraspId) -> VertexId {
        if let Some(v) = self.forward.get(&(node, grasp)) {
            return *v;
        }
        let v = self.reverse.len();
        self.reverse.push(VertexKind::Grasped(node, grasp));
        self.forward.insert((node, grasp), v);
        v
    }

    fn lookup(&self, node: NodeId, grasp: GraspId) -> Option<VertexId> {
        self.forward.get(&(node, grasp)).copied()
    }

    fn kind(&self, v: VertexId) -> Option<VertexKind> {
        self.reverse.get(v).copied()
    }
}

/// The synthetic start vertex of every product graph.
pub const VIRTUAL_START: VertexId = 0;

impl MultiGraspGraph {
    /// Build the product over the grasps that currently carry goals.
    pub fn new(
        roadmap: Rc<RefCell<Roadmap>>,
        goals: Rc<RefCell<GoalSet>>,
        heuristic: Rc<GoalDistance>,
        start: NodeId,
    ) -> Self {
        let grasps: Vec<GraspId> = goals.borrow().grasps_with_goals().into_iter().collect();
        let journal_cursor = Cell::new(roadmap.borrow().journal_cursor());
        Self {
            roadmap,
            goals,
            heuristic,
            start,
            grasps,
            registry: Rc::new(RefCell::new(Registry::new())),
            journal_cursor,
        }
    }

    fn kind(&self, v: VertexId) -> Option<VertexKind> {
        self.registry.borrow().kind(v)
    }

    fn layer_neighbors(&self, node: NodeId, grasp: GraspId) -> SmallVec<[VertexId; 16]> {
        let neighbors = {
            let mut roadmap = self.roadmap.borrow_mut();
            roadmap.update_adjacency(node);
            roadmap.neighbors(node)
        };
        let mut registry = self.registry.borrow_mut();
        let mut out: SmallVec<[VertexId; 16]> = neighbors
            .into_iter()
            .map(|n| registry.vertex_for(n, grasp))
            .collect();
        // A layer's copy of the start keeps its zero-cost link back to the
        // synthetic start so predecessor scans can reach it.
        if node == self.start {
            out.push(VIRTUAL_START);
        }
        out
    }

    fn neighbor_iter(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        let candidates: SmallVec<[VertexId; 16]> = match self.kind(v) {
            Some(VertexKind::VirtualStart) => {
                let mut registry = self.registry.borrow_mut();
                self.grasps
                    .iter()
                    .map(|g| registry.vertex_for(self.start, *g))
                    .collect()
            }
            Some(VertexKind::Grasped(node, grasp)) => self.layer_neighbors(node, grasp),
            _ => SmallVec::new(),
        };
        let roadmap = self.roadmap.clone();
        let registry = self.registry.clone();
        Box::new(FilteredVertexIter::new(candidates, move |candidate| {
            match registry.borrow().kind(candidate) {
                Some(VertexKind::VirtualStart) => true,
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

impl SearchGraph for MultiGraspGraph {
    fn start_vertex(&self) -> VertexId {
        VIRTUAL_START
    }

    fn check_validity(&self, v: VertexId) -> bool {
        match self.kind(v) {
            Some(VertexKind::VirtualStart) => self.roadmap.borrow_mut().is_valid(self.start),
            Some(VertexKind::Grasped(node, grasp)) => {
                self.roadmap.borrow_mut().is_valid_with_grasp(node, grasp)
            }
            _ => false,
        }
    }

    fn heuristic(&self, v: VertexId) -> f64 {
        let (node, grasp) = match self.kind(v) {
            Some(VertexKind::VirtualStart) => (self.start, None),
            Some(VertexKind::Grasped(node, grasp)) => (node, Some(grasp)),
            _ => return f64::INFINITY,
        };
        let roadmap = self.roadmap.borrow();
        let Some(node) = roadmap.get_node(node) else {
            return f64::INFINITY;
        };
        match grasp {
            None => self.heuristic.cost_to_go(&node.config),
            Some(grasp) => self
                .heuristic
                .cost_to_go_for_grasp(&node.config, grasp)
                .unwrap_or(f64::INFINITY),
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
            (VertexKind::VirtualStart, VertexKind::Grasped(node, _))
            | (VertexKind::Grasped(node, _), VertexKind::VirtualStart)
                if node == self.start =>
            {
                0.0
            }
            (VertexKind::Grasped(a, ga), VertexKind::Grasped(b, gb)) if ga == gb => {
                let mut roadmap = self.roadmap.borrow_mut();
                if lazy {
                    roadmap.lazy_conditional_cost(a, b, ga)
                } else {
                    roadmap.compute_conditional_cost(a, b, ga)
                }
            }
            // Layers are only connected through the synthetic start.
            _ => f64::INFINITY,
        }
    }

    fn is_goal(&self, v: VertexId) -> bool {
        match self.kind(v) {
            Some(VertexKind::Grasped(node, grasp)) => {
                let mut roadmap = self.roadmap.borrow_mut();
                self.goals.borrow().is_goal(&mut roadmap, node, grasp)
            }
            _ => false,
        }
    }

    fn goal_cost(&self, v: VertexId) -> f64 {
        let Some(VertexKind::Grasped(node, grasp)) = self.kind(v) else {
            return f64::INFINITY;
        };
        let goals = self.goals.borrow();
        match goals.goal_at_node(node) {
            Some(goal) if goal.grasp_id == grasp => self.heuristic.goal_cost(goal.quality),
            _ => f64::INFINITY,
        }
    }

    fn resolve(&self, v: VertexId) -> VertexKind {
        self.kind(v).unwrap_or(VertexKind::VirtualStart)
    }

    fn take_edge_changes(&self) -> Vec<EdgeChange> {
        let roadmap = self.roadmap.borrow();
        let changes = roadmap.cost_changes_since(self.journal_cursor.get());
        self.journal_cursor
            .set(self.journal_cursor.get() + changes.len());
        let mut registry = self.registry.borrow_mut();
        let mut out = Vec::new();
        for change in changes {
            let layers: SmallVec<[GraspId; 8]> = match change.grasp_id {
                Some(grasp) => SmallVec::from_slice(&[grasp]),
                None => self.grasps.iter().copied().collect(),
            };
            for grasp in layers {
                // Only fan out into layers the search has already touched at
                // one endpoint; untouched regions will see the current costs
                // whenever they are first expanded.
                let known_a = registry.lookup(change.a, grasp);
                let known_b = registry.lookup(change.b, grasp);
                if known_a.is_none() && known_b.is_none() {
                    continue;
                }
                let va = registry.vertex_for(change.a, grasp);
                let vb = registry.vertex_for(change.b, grasp);
                out.push(EdgeChange {
                    u: va,
                    v: vb,
                    old_cost: change.old_cost,
                });
                out.push(EdgeChange {
                    u: vb,
                    v: va,
                    old_cost: change.old_cost,
                });
            }
        }
        out
    }
}
