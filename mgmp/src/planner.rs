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

//! The front-end facing planner: owns the roadmap and goal set, builds the
//! configured graph adapter and search, and turns search results into
//! waypoint paths.

use crate::cost::IntegralEdgeCostComputer;
use crate::error::ThisError;
use crate::goals::{GoalDistance, GoalError, GoalSet};
use crate::graphs::{
    FoldedGraph, MultiGraspGraph, SearchGraph, SingleGraspGraph, VertexKind,
};
use crate::roadmap::{NodeId, Roadmap, TraceLogger};
use crate::search::{astar, lazy_sp, lazy_weighted_astar, EvaluationMode, LpaStar, SearchResult};
use crate::space::{Config, Goal, GoalId, GraspId, SpaceError, StateSpace};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmType {
    AStar,
    LazyWeightedAStar,
    LpaStar,
    LazyWeightedLpaStar,
    LazySpLpaStar,
}

impl AlgorithmType {
    /// Whether the algorithm keeps search state alive between `plan` calls.
    pub fn is_incremental(&self) -> bool {
        matches!(
            self,
            AlgorithmType::LpaStar | AlgorithmType::LazyWeightedLpaStar | AlgorithmType::LazySpLpaStar
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphType {
    SingleGrasp,
    MultiGrasp,
    FoldedStationary,
    FoldedDynamic,
}

/// Planner configuration. `extreme_lazy` is accepted for interface
/// compatibility but currently has no effect.
#[derive(Debug, Clone)]
pub struct Parameters {
    pub algo_type: AlgorithmType,
    pub graph_type: GraphType,
    /// Weight of goal quality against path cost.
    pub lambda: f64,
    pub extreme_lazy: bool,
    /// Number of Halton samples per densification batch.
    pub batch_size: usize,
    /// Optional sink for node creations (`uid, dim, x...` per line).
    pub roadmap_log: Option<PathBuf>,
    /// Optional sink for validity and cost evaluation events.
    pub event_log: Option<PathBuf>,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            algo_type: AlgorithmType::AStar,
            graph_type: GraphType::SingleGrasp,
            lambda: 1.0,
            extreme_lazy: false,
            batch_size: 1000,
            roadmap_log: None,
            event_log: None,
        }
    }
}

/// A planned transport motion: the winning goal, the waypoint path from the
/// start to it, and the combined path-plus-quality cost.
#[derive(Debug, Clone)]
pub struct Solution {
    pub goal_id: GoalId,
    pub path: Vec<Config>,
    pub cost: f64,
}

#[derive(ThisError, Debug)]
pub enum PlannerError {
    #[error(transparent)]
    Goal(#[from] GoalError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("graph type {graph:?} requires an LPA*-family algorithm, got {algo:?}")]
    IncompatibleGraph {
        graph: GraphType,
        algo: AlgorithmType,
    },
    #[error("failed to open trace log: {0}")]
    TraceLog(#[from] std::io::Error),
}

/// Which persistent search a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SearchSlot {
    /// One per grasp for the single-grasp graph.
    Single(GraspId),
    /// The one shared search of the product and folded graphs.
    Shared,
}

pub struct MultiGraspPlanner {
    state_space: Rc<dyn StateSpace>,
    roadmap: Rc<RefCell<Roadmap>>,
    goal_set: Rc<RefCell<GoalSet>>,
    start: NodeId,
    params: Parameters,
    searches: HashMap<SearchSlot, LpaStar<Box<dyn SearchGraph>>>,
    goals_dirty: bool,
    /// Grasps the shared product search was built over.
    product_grasps: std::collections::BTreeSet<GraspId>,
    last_plan_expansions: usize,
}

impl MultiGraspPlanner {
    pub fn new(
        state_space: Rc<dyn StateSpace>,
        start_config: Config,
        params: Parameters,
    ) -> Result<Self, PlannerError> {
        if params.graph_type == GraphType::FoldedDynamic && !params.algo_type.is_incremental() {
            return Err(PlannerError::IncompatibleGraph {
                graph: params.graph_type,
                algo: params.algo_type,
            });
        }
        let logger =
            TraceLogger::with_paths(params.roadmap_log.as_deref(), params.event_log.as_deref())?;
        let cost_computer = Rc::new(IntegralEdgeCostComputer::new(state_space.clone()));
        let mut roadmap = Roadmap::new(
            state_space.clone(),
            cost_computer,
            params.batch_size,
            logger,
        );
        let start = roadmap.add_node(start_config);
        tracing::info!(
            start,
            batch = params.batch_size,
            algo = ?params.algo_type,
            graph = ?params.graph_type,
            "planner ready"
        );
        Ok(Self {
            state_space,
            roadmap: Rc::new(RefCell::new(roadmap)),
            goal_set: Rc::new(RefCell::new(GoalSet::new())),
            start,
            params,
            searches: HashMap::new(),
            goals_dirty: false,
            product_grasps: std::collections::BTreeSet::new(),
            last_plan_expansions: 0,
        })
    }

    pub fn roadmap(&self) -> Rc<RefCell<Roadmap>> {
        self.roadmap.clone()
    }

    pub fn start_node(&self) -> NodeId {
        self.start
    }

    /// Vertex expansions performed by the most recent `plan` call.
    pub fn last_plan_expansions(&self) -> usize {
        self.last_plan_expansions
    }

    /// Register a candidate goal. Its configuration joins the roadmap
    /// immediately; persistent searches learn of the new edges through the
    /// roadmap's change journal.
    pub fn add_goal(&mut self, goal: Goal) -> Result<(), PlannerError> {
        let mut roadmap = self.roadmap.borrow_mut();
        let node = self.goal_set.borrow_mut().add_goal(&mut roadmap, goal)?;
        roadmap.update_adjacency(node);
        drop(roadmap);
        self.goals_dirty = true;
        Ok(())
    }

    /// Withdraw goals. Unknown ids are ignored with a warning.
    pub fn remove_goals(&mut self, goal_ids: &[GoalId]) {
        self.goal_set.borrow_mut().remove_goals(goal_ids);
        self.goals_dirty = true;
    }

    fn path_cost_fn(&self) -> Rc<dyn Fn(&Config, &Config) -> f64> {
        let state_space = self.state_space.clone();
        Rc::new(move |a: &Config, b: &Config| state_space.distance(a, b))
    }

    fn build_heuristic(&self) -> Result<Rc<GoalDistance>, PlannerError> {
        Ok(Rc::new(GoalDistance::new(
            &self.goal_set.borrow(),
            self.path_cost_fn(),
            self.params.lambda,
        )?))
    }

    fn build_graph(
        &self,
        heuristic: Rc<GoalDistance>,
        grasp: Option<GraspId>,
    ) -> Box<dyn SearchGraph> {
        match self.params.graph_type {
            GraphType::SingleGrasp => Box::new(SingleGraspGraph::new(
                self.roadmap.clone(),
                self.goal_set.clone(),
                heuristic,
                self.start,
                grasp.expect("single-grasp graph needs a grasp"),
            )),
            GraphType::MultiGrasp => Box::new(MultiGraspGraph::new(
                self.roadmap.clone(),
                self.goal_set.clone(),
                heuristic,
                self.start,
            )),
            GraphType::FoldedStationary => Box::new(FoldedGraph::new(
                self.roadmap.clone(),
                self.goal_set.clone(),
                heuristic,
                self.start,
                false,
            )),
            GraphType::FoldedDynamic => Box::new(FoldedGraph::new(
                self.roadmap.clone(),
                self.goal_set.clone(),
                heuristic,
                self.start,
                true,
            )),
        }
    }

    fn evaluation_mode(&self) -> EvaluationMode {
        match self.params.algo_type {
            AlgorithmType::LpaStar => EvaluationMode::Eager,
            AlgorithmType::LazyWeightedLpaStar => EvaluationMode::LazyWeighted,
            AlgorithmType::LazySpLpaStar => EvaluationMode::Lazy,
            // One-shot algorithms never construct an incremental engine.
            AlgorithmType::AStar | AlgorithmType::LazyWeightedAStar => EvaluationMode::Eager,
        }
    }

    /// Run or resume the search for one slot. One-shot algorithms hand
    /// their graph back so the caller can still resolve vertex ids.
    fn run_slot(
        &mut self,
        slot: SearchSlot,
        heuristic: &Rc<GoalDistance>,
        grasp: Option<GraspId>,
    ) -> (SearchResult, Option<Box<dyn SearchGraph>>) {
        match self.params.algo_type {
            AlgorithmType::AStar => {
                let graph = self.build_graph(heuristic.clone(), grasp);
                (astar(&graph), Some(graph))
            }
            AlgorithmType::LazyWeightedAStar => {
                let graph = self.build_graph(heuristic.clone(), grasp);
                (lazy_weighted_astar(&graph), Some(graph))
            }
            _ => {
                let mode = self.evaluation_mode();
                if !self.searches.contains_key(&slot) {
                    let graph = self.build_graph(heuristic.clone(), grasp);
                    self.searches.insert(slot, LpaStar::with_mode(graph, mode));
                } else if self.goals_dirty {
                    let search = self.searches.get_mut(&slot).unwrap();
                    search.graph().set_goal_heuristic(heuristic.clone());
                    if self.params.graph_type == GraphType::FoldedDynamic {
                        search.refresh_heuristic();
                    }
                    search.rescan_goals();
                }
                let search = self.searches.get_mut(&slot).unwrap();
                let result = if self.params.algo_type == AlgorithmType::LazySpLpaStar {
                    lazy_sp(search)
                } else {
                    search.compute_shortest_path()
                };
                (result, None)
            }
        }
    }

    /// Plan a path from the start to the best reachable goal. Returns
    /// `None` when the current roadmap admits no solution; planning with an
    /// empty goal set is a contract violation.
    pub fn plan(&mut self) -> Result<Option<Solution>, PlannerError> {
        if self.goal_set.borrow().is_empty() {
            return Err(GoalError::NoGoals.into());
        }
        // The product graph fans out into the grasps known at construction,
        // so a goal with a previously unseen grasp forces a fresh search.
        if self.params.graph_type == GraphType::MultiGrasp {
            let current = self.goal_set.borrow().grasps_with_goals();
            if !current.is_subset(&self.product_grasps) {
                if self.searches.remove(&SearchSlot::Shared).is_some() {
                    tracing::debug!("rebuilding product search for new grasps");
                }
                self.product_grasps = current;
            }
        }
        let heuristic = self.build_heuristic()?;
        let expansions_before: usize = self.searches.values().map(LpaStar::expansions).sum();

        let mut best: Option<(SearchResult, SearchSlot, Option<Box<dyn SearchGraph>>)> = None;
        let mut one_shot_expansions = 0;
        match self.params.graph_type {
            GraphType::SingleGrasp => {
                let grasps: Vec<GraspId> = self
                    .goal_set
                    .borrow()
                    .grasps_with_goals()
                    .into_iter()
                    .collect();
                for grasp in grasps {
                    let slot = SearchSlot::Single(grasp);
                    let (result, graph) = self.run_slot(slot, &heuristic, Some(grasp));
                    one_shot_expansions += result.expansions;
                    let better = match &best {
                        Some((current, _, _)) => {
                            result.solved && (!current.solved || result.cost() < current.cost())
                        }
                        None => true,
                    };
                    if better {
                        best = Some((result, slot, graph));
                    }
                }
            }
            _ => {
                let (result, graph) = self.run_slot(SearchSlot::Shared, &heuristic, None);
                one_shot_expansions += result.expansions;
                best = Some((result, SearchSlot::Shared, graph));
            }
        }
        self.goals_dirty = false;
        self.last_plan_expansions = if self.params.algo_type.is_incremental() {
            let after: usize = self.searches.values().map(LpaStar::expansions).sum();
            after - expansions_before
        } else {
            one_shot_expansions
        };

        let Some((result, slot, one_shot_graph)) = best else {
            return Ok(None);
        };
        if !result.solved {
            tracing::info!("no solution on the current roadmap");
            return Ok(None);
        }
        let graph: &dyn SearchGraph = match &one_shot_graph {
            Some(graph) => graph.as_ref(),
            None => self
                .searches
                .get(&slot)
                .expect("incremental search must exist after running")
                .graph()
                .as_ref(),
        };
        let solution = if self.is_folded() {
            self.extract_folded_solution(&result, graph)
        } else {
            self.extract_solution(&result, graph)
        };
        if let Some(solution) = &solution {
            tracing::info!(
                goal = solution.goal_id,
                cost = solution.cost,
                waypoints = solution.path.len(),
                expansions = self.last_plan_expansions,
                "solution found"
            );
        }
        Ok(solution)
    }

    fn is_folded(&self) -> bool {
        matches!(
            self.params.graph_type,
            GraphType::FoldedStationary | GraphType::FoldedDynamic
        )
    }

    /// Read the winning vertex chain back into configurations. For the
    /// single-grasp and product graphs the path maps one-to-one.
    fn extract_solution(&self, result: &SearchResult, graph: &dyn SearchGraph) -> Option<Solution> {
        let roadmap = self.roadmap.borrow();
        let goal_set = self.goal_set.borrow();
        let mut path = Vec::new();
        let mut last: Option<(NodeId, GraspId)> = None;
        for v in &result.path {
            let kind = graph.resolve(*v);
            let Some(node) = kind.node() else {
                continue;
            };
            path.push(roadmap.get_node(node)?.config.clone());
            if let Some(grasp) = kind.grasp() {
                last = Some((node, grasp));
            }
        }
        let (goal_node, goal_grasp) = last?;
        let goal_id = goal_set.goal_id_for(goal_node, goal_grasp)?;
        Some(Solution {
            goal_id,
            path,
            cost: result.cost(),
        })
    }

    /// The folded path leaves the start through the base layer and walks
    /// the grasp layer back from the goal, so the grasp-layer vertices read
    /// in reverse order are the executable start-to-goal motion.
    fn extract_folded_solution(
        &self,
        result: &SearchResult,
        graph: &dyn SearchGraph,
    ) -> Option<Solution> {
        let roadmap = self.roadmap.borrow();
        let goal_set = self.goal_set.borrow();
        let mut path = Vec::new();
        let mut last: Option<(NodeId, GraspId)> = None;
        for v in result.path.iter().rev() {
            if let VertexKind::Grasped(node, grasp) = graph.resolve(*v) {
                path.push(roadmap.get_node(node)?.config.clone());
                last = Some((node, grasp));
            }
        }
        let (goal_node, goal_grasp) = last?;
        let goal_id = goal_set.goal_id_for(goal_node, goal_grasp)?;
        Some(Solution {
            goal_id,
            path,
            cost: result.cost(),
        })
    }
}
