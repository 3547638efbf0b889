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

//! Search-graph adapters over the roadmap.
//!
//! A search algorithm never touches the roadmap directly; it sees one of
//! four logical graphs, all speaking the same [`SearchGraph`] interface:
//! one grasp layer by itself, the product of all grasp layers, or a folded
//! arrangement that shares a single grasp-agnostic base layer across grasps
//! and lifts into a grasp layer at goal nodes.
//!
//! Every adapter evaluates the roadmap lazily. `edge_cost(u, v, lazy=true)`
//! returns whatever is cached (initially the admissible lower bound);
//! `lazy=false` forces the exact cost. Whenever a lazy value resolves to
//! something different, the adapter reports an [`EdgeChange`] so the search
//! can repair itself.

pub mod single;
pub use single::SingleGraspGraph;

pub mod multi;
pub use multi::MultiGraspGraph;

pub mod folded;
pub use folded::FoldedGraph;

use crate::roadmap::NodeId;
use crate::space::GraspId;
use smallvec::SmallVec;

/// Identifier of a vertex of a search graph. Only meaningful within the
/// adapter that produced it.
pub type VertexId = usize;

/// What a search-graph vertex stands for in roadmap terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexKind {
    /// The synthetic source that fans out into the grasp layers of a
    /// product graph.
    VirtualStart,
    /// A roadmap node in the grasp-agnostic base layer of a folded graph.
    Base(NodeId),
    /// A roadmap node within a particular grasp layer.
    Grasped(NodeId, GraspId),
}

impl VertexKind {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            VertexKind::VirtualStart => None,
            VertexKind::Base(node) => Some(*node),
            VertexKind::Grasped(node, _) => Some(*node),
        }
    }

    pub fn grasp(&self) -> Option<GraspId> {
        match self {
            VertexKind::Grasped(_, grasp) => Some(*grasp),
            _ => None,
        }
    }
}

/// A directed edge whose cached cost was observed to change. `old_cost` is
/// the value the search may have relied on; the current value is whatever
/// `edge_cost` returns now.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeChange {
    pub u: VertexId,
    pub v: VertexId,
    pub old_cost: f64,
}

/// The graph interface the search algorithms run against.
///
/// Adapters hold shared handles onto the roadmap and goal set, so all
/// methods take `&self`; lazy evaluation mutates the caches behind them.
pub trait SearchGraph {
    /// The vertex the search starts from.
    fn start_vertex(&self) -> VertexId;

    /// Whether the vertex is valid, running the appropriate lazy validity
    /// check for its layer.
    fn check_validity(&self, v: VertexId) -> bool;

    /// Admissible cost-to-go estimate for the vertex.
    fn heuristic(&self, v: VertexId) -> f64;

    /// The vertices adjacent to `v`, refreshing roadmap adjacency first.
    /// With `lazy` set, neighbors are filtered by the cheap base validity
    /// check only; otherwise by the layer's full validity.
    fn successors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>>;

    /// Same vertex set as [`SearchGraph::successors`]; the graphs are
    /// undirected apart from synthetic start edges.
    fn predecessors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>>;

    /// The cost of traversing `(u, v)`: the cached estimate when `lazy`,
    /// the exact (resolved and cached) cost otherwise.
    fn edge_cost(&self, u: VertexId, v: VertexId, lazy: bool) -> f64;

    /// Whether the vertex terminates the search.
    fn is_goal(&self, v: VertexId) -> bool;

    /// The terminal quality penalty paid for finishing at this vertex.
    fn goal_cost(&self, v: VertexId) -> f64;

    /// The roadmap-level identity of the vertex.
    fn resolve(&self, v: VertexId) -> VertexKind;

    /// Edge-change events accumulated since the last drain, already
    /// translated into this graph's vertex ids (both directions of every
    /// undirected edge).
    fn take_edge_changes(&self) -> Vec<EdgeChange>;

    /// Install a rebuilt cost-to-go heuristic after the goal set changed.
    /// Only the folded dynamic graph reacts; everything else keeps the
    /// heuristic it was built with.
    fn set_goal_heuristic(&self, _heuristic: std::rc::Rc<crate::goals::GoalDistance>) {}
}

impl SearchGraph for Box<dyn SearchGraph> {
    fn start_vertex(&self) -> VertexId {
        (**self).start_vertex()
    }

    fn check_validity(&self, v: VertexId) -> bool {
        (**self).check_validity(v)
    }

    fn heuristic(&self, v: VertexId) -> f64 {
        (**self).heuristic(v)
    }

    fn successors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        (**self).successors(v, lazy)
    }

    fn predecessors(&self, v: VertexId, lazy: bool) -> Box<dyn Iterator<Item = VertexId>> {
        (**self).predecessors(v, lazy)
    }

    fn edge_cost(&self, u: VertexId, v: VertexId, lazy: bool) -> f64 {
        (**self).edge_cost(u, v, lazy)
    }

    fn is_goal(&self, v: VertexId) -> bool {
        (**self).is_goal(v)
    }

    fn goal_cost(&self, v: VertexId) -> f64 {
        (**self).goal_cost(v)
    }

    fn resolve(&self, v: VertexId) -> VertexKind {
        (**self).resolve(v)
    }

    fn take_edge_changes(&self) -> Vec<EdgeChange> {
        (**self).take_edge_changes()
    }

    fn set_goal_heuristic(&self, heuristic: std::rc::Rc<crate::goals::GoalDistance>) {
        (**self).set_goal_heuristic(heuristic)
    }
}

/// An explicit lazy iterator over candidate vertices: the underlying
/// adjacency snapshot plus a validity predicate evaluated per step, so
/// vertices the consumer never reaches are never checked.
pub(crate) struct FilteredVertexIter<F: FnMut(VertexId) -> bool> {
    candidates: SmallVec<[VertexId; 16]>,
    index: usize,
    filter: F,
}

impl<F: FnMut(VertexId) -> bool> FilteredVertexIter<F> {
    pub(crate) fn new(candidates: SmallVec<[VertexId; 16]>, filter: F) -> Self {
        Self {
            candidates,
            index: 0,
            filter,
        }
    }
}

impl<F: FnMut(VertexId) -> bool> Iterator for FilteredVertexIter<F> {
    type Item = VertexId;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.candidates.len() {
            let candidate = self.candidates[self.index];
            self.index += 1;
            if (self.filter)(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}
