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
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// The roadmap seen through a single grasp: vertex ids are roadmap node
/// ids, and validity and cost are conditioned on that grasp throughout.
pub struct SingleGraspGraph {
    roadmap: Rc<RefCell<Roadmap>>,
    goals: Rc<RefCell<GoalSet>>,
    heuristic: Rc<GoalDistance>,
    start: NodeId,
    grasp_id: GraspId,
    journal_cursor: Cell<usize>,
}

impl SingleGraspGraph {
    pub fn new(
        roadmap: Rc<RefCell<Roadmap>>,
        goals: Rc<RefCell<GoalSet>>,
        heuristic: Rc<GoalDistance>,
        start: NodeId,
        grasp_id: GraspId,
    ) -> Self {
        let journal_cursor = Cell::new(roadmap.borrow().journal_cursor());
        Self {
            roadmap,
            goals,
            heuristic,
            start,
            grasp_id,
            journal_cursor,
        }
    }

    pub fn grasp_id(&self) -> GraspId {
        self.grasp_id
    }

    fn adjacency(&self, v: VertexId) -> smallvec::SmallVec<[VertexId; 16]> {
        let mut roadmap = self.roadmap.borrow_mut();
        roadmap.update_adjacency(v);
        roadmap.neighbors(v)
    }

    fn neighbor_iter(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        let candidates = self.adjacency(v);
        let roadmap = self.roadmap.clone();
        let grasp_id = self.grasp_id;
        Box::new(FilteredVertexIter::new(candidates, move |n| {
            let mut roadmap = roadmap.borrow_mut();
            if lazy {
                roadmap.is_valid(n)
            } else {
                roadmap.is_valid_with_grasp(n, grasp_id)
            }
        }))
    }
}

impl SearchGraph for SingleGraspGraph {
    fn start_vertex(&self) -> VertexId {
        self.start
    }

    fn check_validity(&self, v: VertexId) -> bool {
        self.roadmap.borrow_mut().is_valid_with_grasp(v, self.grasp_id)
    }

    fn heuristic(&self, v: VertexId) -> f64 {
        let roadmap = self.roadmap.borrow();
        let Some(node) = roadmap.get_node(v) else {
            return f64::INFINITY;
        };
        self.heuristic
            .cost_to_go_for_grasp(&node.config, self.grasp_id)
            .unwrap_or(f64::INFINITY)
    }

    fn successors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        self.neighbor_iter(v, lazy)
    }

    fn predecessors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        self.neighbor_iter(v, lazy)
    }

    fn edge_cost(&self, u: VertexId, v: VertexId, lazy: bool) -> f64 {
        let mut roadmap = self.roadmap.borrow_mut();
        if lazy {
            roadmap.lazy_conditional_cost(u, v, self.grasp_id)
        } else {
            roadmap.compute_conditional_cost(u, v, self.grasp_id)
        }
    }

    fn is_goal(&self, v: VertexId) -> bool {
        let mut roadmap = self.roadmap.borrow_mut();
        self.goals.borrow().is_goal(&mut roadmap, v, self.grasp_id)
    }

    fn goal_cost(&self, v: VertexId) -> f64 {
        let goals = self.goals.borrow();
        match goals.goal_at_node(v) {
            Some(goal) if goal.grasp_id == self.grasp_id => self.heuristic.goal_cost(goal.quality),
            _ => f64::INFINITY,
        }
    }

    fn resolve(&self, v: VertexId) -> VertexKind {
        VertexKind::Grasped(v, self.grasp_id)
    }

    fn take_edge_changes(&self) -> Vec<EdgeChange> {
        let roadmap = self.roadmap.borrow();
        let changes = roadmap.cost_changes_since(self.journal_cursor.get());
        self.journal_cursor
            .set(self.journal_cursor.get() + changes.len());
        let mut out = Vec::new();
        for change in changes {
            // Base-cost changes move this layer's best-known value whenever
            // no conditional cost shadows them; forwarding them untouched is
            // safe either way, since absorption re-reads the current cost.
            if change.grasp_id.is_some() && change.grasp_id != Some(self.grasp_id) {
                continue;
            }
            out.push(EdgeChange {
                u: change.a,
                v: change.b,
                old_cost: change.old_cost,
            });
            out.push(EdgeChange {
                u: change.b,
                v: change.a,
                old_cost: change.old_cost,
            });
        }
        out
    }
}
