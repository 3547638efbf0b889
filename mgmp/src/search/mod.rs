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

//! The search algorithms that run over a [`SearchGraph`](crate::graphs::SearchGraph).

pub mod heap;
pub use heap::{Key, KeyedHeap};

pub mod lpastar;
pub use lpastar::{EvaluationMode, LpaStar};

pub mod astar;
pub use astar::{astar, lazy_weighted_astar};

pub mod lazysp;
pub use lazysp::lazy_sp;

use crate::graphs::VertexId;

/// The outcome of a search: the best goal vertex discovered, the cost of the
/// path leading to it, and the terminal goal penalty paid on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub solved: bool,
    /// Vertex ids from the start to the goal, empty while unsolved.
    pub path: Vec<VertexId>,
    pub path_cost: f64,
    pub goal_cost: f64,
    pub goal_node: VertexId,
    /// How many vertices the search expanded to get here.
    pub expansions: usize,
}

impl SearchResult {
    pub fn unsolved(start: VertexId) -> Self {
        Self {
            solved: false,
            path: Vec::new(),
            path_cost: f64::INFINITY,
            goal_cost: f64::INFINITY,
            goal_node: start,
            expansions: 0,
        }
    }

    /// The full objective: path cost plus the goal's quality penalty.
    pub fn cost(&self) -> f64 {
        self.path_cost + self.goal_cost
    }
}
