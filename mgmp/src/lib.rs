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

//! Motion planning for a robot arm that must carry a grasped object to one of
//! several candidate goal configurations, where each goal is bound to a
//! specific grasp of the object.
//!
//! The crate is built around three cooperating pieces:
//! * a shared probabilistic [`Roadmap`](roadmap::Roadmap) whose vertices and
//!   edges cache grasp-agnostic and per-grasp validity and cost data, all of
//!   it evaluated lazily on first touch;
//! * the [`LpaStar`](search::LpaStar) engine, which keeps shortest-path
//!   information consistent as lazily evaluated edges resolve to their true
//!   costs;
//! * a multi-goal cost-to-go heuristic that trades path cost against grasp
//!   quality.
//!
//! [`planner::MultiGraspPlanner`] wires these together behind a small
//! front-end facing API.

pub mod error;

pub mod space;
pub use space::{Config, Goal, Grasp, SpaceInformation, StateSpace};

pub mod sampling;

pub mod nn;

pub mod cost;
pub use cost::{EdgeCostComputer, IntegralEdgeCostComputer};

pub mod roadmap;
pub use roadmap::Roadmap;

pub mod goals;
pub use goals::{GoalDistance, GoalSet};

pub mod graphs;

pub mod search;

pub mod planner;
pub use planner::{MultiGraspPlanner, Parameters, Solution};

pub mod prelude {
    pub use super::cost::*;
    pub use super::goals::*;
    pub use super::graphs::*;
    pub use super::planner::*;
    pub use super::roadmap::*;
    pub use super::search::*;
    pub use super::space::*;
}
