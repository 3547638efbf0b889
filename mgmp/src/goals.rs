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

//! Goal bookkeeping and the multi-goal cost-to-go heuristic.

use crate::error::ThisError;
use crate::nn::NearestNeighbors;
use crate::roadmap::{NodeId, Roadmap};
use crate::space::{Config, Goal, GoalId, GraspId};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum GoalError {
    #[error("a goal with id [{0}] has already been added")]
    DuplicateGoal(GoalId),
    #[error("no goal with id [{0}] is known")]
    UnknownGoal(GoalId),
    #[error("no goals are known, cannot compute a cost to go")]
    NoGoals,
    #[error("no goal is known for grasp [{0}]")]
    NoGoalsForGrasp(GraspId),
}

/// The set of candidate goals, cross-linked with the roadmap nodes that
/// carry their configurations.
#[derive(Debug, Default)]
pub struct GoalSet {
    goals: HashMap<GoalId, Goal>,
    goal_to_node: HashMap<GoalId, NodeId>,
    node_to_goal: HashMap<NodeId, GoalId>,
}

impl GoalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    /// Insert the goal's configuration into the roadmap and remember the
    /// association. Re-using a goal id is a contract violation.
    pub fn add_goal(&mut self, roadmap: &mut Roadmap, goal: Goal) -> Result<NodeId, GoalError> {
        if self.goals.contains_key(&goal.id) {
            return Err(GoalError::DuplicateGoal(goal.id));
        }
        let node = roadmap.add_node(goal.config.clone());
        tracing::debug!(goal = goal.id, grasp = goal.grasp_id, node, "goal added");
        self.goal_to_node.insert(goal.id, node);
        self.node_to_goal.insert(node, goal.id);
        self.goals.insert(goal.id, goal);
        Ok(node)
    }

    /// Forget a goal. The roadmap node stays in place since other callers
    /// may still reach it.
    pub fn remove_goal(&mut self, goal_id: GoalId) {
        if self.goals.remove(&goal_id).is_none() {
            tracing::warn!(goal = goal_id, "tried to remove a goal that does not exist");
            return;
        }
        let node = self
            .goal_to_node
            .remove(&goal_id)
            .expect("goal was registered without a roadmap node");
        self.node_to_goal.remove(&node);
    }

    pub fn remove_goals(&mut self, goal_ids: &[GoalId]) {
        for goal_id in goal_ids {
            self.remove_goal(*goal_id);
        }
    }

    pub fn goal(&self, goal_id: GoalId) -> Result<&Goal, GoalError> {
        self.goals
            .get(&goal_id)
            .ok_or(GoalError::UnknownGoal(goal_id))
    }

    /// The roadmap node carrying the goal's configuration.
    pub fn goal_node(&self, goal_id: GoalId) -> Option<NodeId> {
        self.goal_to_node.get(&goal_id).copied()
    }

    /// The goal whose configuration lives at the given roadmap node, if any.
    pub fn goal_at_node(&self, node: NodeId) -> Option<&Goal> {
        self.node_to_goal
            .get(&node)
            .and_then(|goal_id| self.goals.get(goal_id))
    }

    /// Whether the node is a goal for the given grasp: it must carry a goal
    /// bound to exactly that grasp, and be valid while the grasp is held.
    pub fn is_goal(&self, roadmap: &mut Roadmap, node: NodeId, grasp_id: GraspId) -> bool {
        let Some(goal) = self.goal_at_node(node) else {
            return false;
        };
        if goal.grasp_id != grasp_id {
            return false;
        }
        roadmap.is_valid_with_grasp(node, grasp_id)
    }

    /// The goal id registered at `node` for `grasp_id`, ignoring validity.
    pub fn goal_id_for(&self, node: NodeId, grasp_id: GraspId) -> Option<GoalId> {
        self.goal_at_node(node)
            .filter(|goal| goal.grasp_id == grasp_id)
            .map(|goal| goal.id)
    }

    /// Goals in ascending id order.
    pub fn goals(&self) -> Vec<&Goal> {
        let mut goals: Vec<&Goal> = self.goals.values().collect();
        goals.sort_by_key(|goal| goal.id);
        goals
    }

    /// The grasps that currently have at least one goal, in ascending order.
    pub fn grasps_with_goals(&self) -> BTreeSet<GraspId> {
        self.goals.values().map(|goal| goal.grasp_id).collect()
    }
}

struct GoalPoint {
    config: Config,
    quality: f64,
}

/// A cost-to-go estimate over the current goal set.
///
/// The distance from a query configuration to a goal blends the path-cost
/// lower bound with a penalty for foregone quality:
/// `d(a, g.config) + λ' (q_max - g.quality)` with `λ' = λ / Δq`, queries
/// pinned at the best known quality. One nearest-neighbor index covers all
/// goals; one more per grasp answers the grasp-conditioned variant.
pub struct GoalDistance {
    all_goals: NearestNeighbors<GoalPoint>,
    per_grasp: HashMap<GraspId, NearestNeighbors<GoalPoint>>,
    path_cost: Rc<dyn Fn(&Config, &Config) -> f64>,
    scaled_lambda: f64,
    max_quality: f64,
}

impl std::fmt::Debug for GoalDistance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalDistance")
            .field("goals", &self.all_goals.len())
            .field("grasps", &self.per_grasp.len())
            .field("scaled_lambda", &self.scaled_lambda)
            .field("max_quality", &self.max_quality)
            .finish()
    }
}

impl GoalDistance {
    /// Build the heuristic for the goals currently in `goal_set`.
    /// `path_cost` must lower-bound the true cost of any path between its
    /// arguments for the heuristic to preserve search optimality.
    pub fn new(
        goal_set: &GoalSet,
        path_cost: Rc<dyn Fn(&Config, &Config) -> f64>,
        lambda: f64,
    ) -> Result<Self, GoalError> {
        let goals = goal_set.goals();
        if goals.is_empty() {
            return Err(GoalError::NoGoals);
        }
        let max_quality = goals.iter().map(|g| g.quality).fold(f64::NEG_INFINITY, f64::max);
        let min_quality = goals.iter().map(|g| g.quality).fold(f64::INFINITY, f64::min);
        let quality_range = (max_quality - min_quality).max(f64::EPSILON);
        let scaled_lambda = lambda / quality_range;

        let make_index = || {
            let path_cost = path_cost.clone();
            NearestNeighbors::new(move |a: &GoalPoint, b: &GoalPoint| {
                path_cost(&a.config, &b.config) + scaled_lambda * (a.quality - b.quality).abs()
            })
        };

        let mut all_goals = make_index();
        let mut per_grasp: HashMap<GraspId, NearestNeighbors<GoalPoint>> = HashMap::new();
        for goal in goals {
            let point = GoalPoint {
                config: goal.config.clone(),
                quality: goal.quality,
            };
            all_goals.add(GoalPoint {
                config: point.config.clone(),
                quality: point.quality,
            });
            per_grasp
                .entry(goal.grasp_id)
                .or_insert_with(&make_index)
                .add(point);
        }

        Ok(Self {
            all_goals,
            per_grasp,
            path_cost,
            scaled_lambda,
            max_quality,
        })
    }

    fn distance_to_nearest(&self, index: &NearestNeighbors<GoalPoint>, a: &Config) -> f64 {
        let query = GoalPoint {
            config: a.clone(),
            quality: self.max_quality,
        };
        let nearest = index
            .nearest(&query)
            .expect("goal index is never constructed empty");
        // Same blend the index orders by; the query sits at max quality so
        // the penalty term is q_max - quality.
        (self.path_cost)(&query.config, &nearest.config)
            + self.scaled_lambda * (self.max_quality - nearest.quality)
    }

    /// Cost-to-go from `a` to the nearest goal of any grasp.
    pub fn cost_to_go(&self, a: &Config) -> f64 {
        self.distance_to_nearest(&self.all_goals, a)
    }

    /// Cost-to-go from `a` to the nearest goal of the given grasp.
    pub fn cost_to_go_for_grasp(&self, a: &Config, grasp_id: GraspId) -> Result<f64, GoalError> {
        let index = self
            .per_grasp
            .get(&grasp_id)
            .ok_or(GoalError::NoGoalsForGrasp(grasp_id))?;
        Ok(self.distance_to_nearest(index, a))
    }

    /// The terminal penalty paid on arrival at a goal of the given quality.
    pub fn goal_cost(&self, quality: f64) -> f64 {
        self.scaled_lambda * (self.max_quality - quality)
    }

    pub fn max_quality(&self) -> f64 {
        self.max_quality
    }

    pub fn scaled_lambda(&self) -> f64 {
        self.scaled_lambda
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::IntegralEdgeCostComputer;
    use crate::roadmap::TraceLogger;
    use crate::space::{Grasp, SpaceError, SpaceInformation, StateSpace};
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    struct OpenSquare;

    impl StateSpace for OpenSquare {
        fn dimension(&self) -> usize {
            2
        }

        fn space_information(&self) -> SpaceInformation {
            SpaceInformation {
                dimension: 2,
                lower: DVector::zeros(2),
                upper: DVector::from_element(2, 1.0),
            }
        }

        fn distance(&self, a: &Config, b: &Config) -> f64 {
            (a - b).norm()
        }

        fn is_valid(&self, _: &Config) -> bool {
            true
        }

        fn is_valid_with_grasp(&self, _: &Config, _: GraspId, _: bool) -> bool {
            true
        }

        fn cost(&self, _: &Config) -> f64 {
            1.0
        }

        fn conditional_cost(&self, _: &Config, _: GraspId) -> f64 {
            1.0
        }

        fn add_grasp(&self, _: Grasp) -> Result<(), SpaceError> {
            Ok(())
        }

        fn remove_grasp(&self, _: GraspId) -> Result<(), SpaceError> {
            Ok(())
        }
    }

    fn make_roadmap() -> Roadmap {
        let scene = Rc::new(OpenSquare);
        let computer = Rc::new(IntegralEdgeCostComputer::new(scene.clone()));
        Roadmap::new(scene, computer, 10, TraceLogger::disabled())
    }

    fn goal(id: GoalId, x: f64, y: f64, grasp_id: GraspId, quality: f64) -> Goal {
        Goal {
            id,
            config: DVector::from_vec(vec![x, y]),
            grasp_id,
            quality,
        }
    }

    fn euclidean() -> Rc<dyn Fn(&Config, &Config) -> f64> {
        Rc::new(|a: &Config, b: &Config| (a - b).norm())
    }

    #[test]
    fn duplicate_goal_id_is_rejected() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        goals
            .add_goal(&mut roadmap, goal(4, 0.1, 0.1, 0, 0.0))
            .unwrap();
        assert_eq!(
            goals.add_goal(&mut roadmap, goal(4, 0.2, 0.2, 0, 0.0)),
            Err(GoalError::DuplicateGoal(4))
        );
    }

    #[test]
    fn add_then_remove_restores_the_goal_set() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        let node = goals
            .add_goal(&mut roadmap, goal(0, 0.9, 0.9, 1, 0.5))
            .unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals.goal_node(0), Some(node));

        goals.remove_goals(&[0]);
        assert!(goals.is_empty());
        assert_eq!(goals.goal_node(0), None);
        assert_eq!(goals.goal_id_for(node, 1), None);
        // The roadmap node outlives the goal.
        assert!(roadmap.get_node(node).is_some());
    }

    #[test]
    fn is_goal_requires_matching_grasp() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        let node = goals
            .add_goal(&mut roadmap, goal(0, 0.9, 0.9, 1, 0.5))
            .unwrap();
        assert!(goals.is_goal(&mut roadmap, node, 1));
        assert!(!goals.is_goal(&mut roadmap, node, 2));
        assert!(!goals.is_goal(&mut roadmap, 0, 1));
    }

    #[test]
    fn unknown_goal_lookup_is_an_error() {
        let goals = GoalSet::new();
        assert_eq!(goals.goal(17).unwrap_err(), GoalError::UnknownGoal(17));
    }

    #[test]
    fn no_goals_means_no_heuristic() {
        let goals = GoalSet::new();
        assert!(matches!(
            GoalDistance::new(&goals, euclidean(), 1.0),
            Err(GoalError::NoGoals)
        ));
    }

    #[test]
    fn cost_to_go_blends_distance_and_quality() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        goals
            .add_goal(&mut roadmap, goal(0, 0.9, 0.9, 0, 0.0))
            .unwrap();
        goals
            .add_goal(&mut roadmap, goal(1, 0.5, 0.5, 0, 1.0))
            .unwrap();
        let heuristic = GoalDistance::new(&goals, euclidean(), 1.0).unwrap();

        // Delta-q = 1, so lambda' = 1. From the corner, goal 1 is both
        // closer and of maximal quality.
        let query = DVector::from_vec(vec![0.1, 0.1]);
        let to_goal_1 = (0.4_f64 * 0.4 + 0.4 * 0.4).sqrt();
        assert_relative_eq!(
            heuristic.cost_to_go(&query),
            to_goal_1,
            max_relative = 1e-12
        );

        // Quality penalties.
        assert_relative_eq!(heuristic.goal_cost(1.0), 0.0);
        assert_relative_eq!(heuristic.goal_cost(0.0), 1.0);
    }

    #[test]
    fn quality_penalty_can_outweigh_distance() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        // A nearby low-quality goal against a distant perfect one, with a
        // lambda large enough that quality dominates.
        goals
            .add_goal(&mut roadmap, goal(0, 0.2, 0.2, 0, 0.0))
            .unwrap();
        goals
            .add_goal(&mut roadmap, goal(1, 0.9, 0.9, 0, 1.0))
            .unwrap();
        let heuristic = GoalDistance::new(&goals, euclidean(), 10.0).unwrap();

        let query = DVector::from_vec(vec![0.1, 0.1]);
        let far = (DVector::from_vec(vec![0.9, 0.9]) - &query).norm();
        assert_relative_eq!(heuristic.cost_to_go(&query), far, max_relative = 1e-12);
    }

    #[test]
    fn per_grasp_indices_are_separate() {
        let mut roadmap = make_roadmap();
        let mut goals = GoalSet::new();
        goals
            .add_goal(&mut roadmap, goal(0, 0.2, 0.2, 0, 1.0))
            .unwrap();
        goals
            .add_goal(&mut roadmap, goal(1, 0.9, 0.9, 5, 1.0))
            .unwrap();
        let heuristic = GoalDistance::new(&goals, euclidean(), 1.0).unwrap();

        let query = DVector::from_vec(vec![0.1, 0.1]);
        let near = heuristic.cost_to_go_for_grasp(&query, 0).unwrap();
        let far = heuristic.cost_to_go_for_grasp(&query, 5).unwrap();
        assert!(near < far);
        assert!(matches!(
            heuristic.cost_to_go_for_grasp(&query, 9),
            Err(GoalError::NoGoalsForGrasp(9))
        ));
    }
}
