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

//! The shared probabilistic roadmap.
//!
//! Densification samples Halton points into the joint limits and adjacency is
//! refreshed on demand with the PRM* connection radius. Everything expensive
//! is deferred: a node's validity is unknown until something asks, and an
//! edge is born carrying only the admissible lower bound of its cost. The
//! first query that needs an exact value resolves and caches it, and every
//! resolution that changes a cached value is recorded in a journal that the
//! search-facing graph adapters drain into edge-change events.

use crate::cost::EdgeCostComputer;
use crate::nn::NearestNeighbors;
use crate::sampling::HaltonSequence;
use crate::space::{Config, GraspId, SpaceInformation, StateSpace};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

/// Identifier of a roadmap node. Monotonically increasing and never reused,
/// so an id stays meaningful for the node's whole lifetime.
pub type NodeId = usize;

/// Identifier of an undirected edge: the endpoint ids in ascending order.
pub type EdgeKey = (NodeId, NodeId);

/// Sentinel for adjacency that has never been computed.
const GEN_UNSEEN: u64 = u64::MAX;

pub fn edge_key(a: NodeId, b: NodeId) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug)]
pub struct Node {
    pub uid: NodeId,
    pub config: Config,
    /// True once base validity has been checked (and found true). A node
    /// that fails the check is deleted instead.
    initialized: bool,
    conditional_validity: HashMap<GraspId, bool>,
    edges: HashMap<NodeId, EdgeKey>,
    densification_gen: u64,
}

#[derive(Debug)]
pub struct Edge {
    /// The best known grasp-agnostic cost. Seeded with the lower bound and
    /// final once `base_evaluated` is set.
    pub base_cost: f64,
    pub base_evaluated: bool,
    conditional_costs: HashMap<GraspId, f64>,
}

impl Edge {
    /// The cheapest cost this edge could still have for the given grasp.
    pub fn best_known_cost(&self, grasp_id: GraspId) -> f64 {
        match self.conditional_costs.get(&grasp_id) {
            Some(cost) => *cost,
            None => self.base_cost,
        }
    }

    pub fn conditional_cost(&self, grasp_id: GraspId) -> Option<f64> {
        self.conditional_costs.get(&grasp_id).copied()
    }

    fn is_dead(&self) -> bool {
        self.base_evaluated && self.base_cost.is_infinite()
    }
}

/// A lazily cached cost that changed value: either a base cost or a
/// grasp-conditional cost resolved away from its optimistic estimate, or an
/// edge that died with one of its endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCostChange {
    pub a: NodeId,
    pub b: NodeId,
    /// `None` for a change to the grasp-agnostic base cost.
    pub grasp_id: Option<GraspId>,
    pub old_cost: f64,
    pub new_cost: f64,
}

/// Optional line-oriented trace sinks: one file for node creations, one for
/// validity and cost evaluation events. Both are best-effort; write failures
/// never disturb planning.
#[derive(Default)]
pub struct TraceLogger {
    roadmap: Option<Box<dyn Write>>,
    events: Option<Box<dyn Write>>,
}

impl std::fmt::Debug for TraceLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLogger")
            .field("roadmap", &self.roadmap.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

impl TraceLogger {
    /// A logger that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(roadmap: Option<Box<dyn Write>>, events: Option<Box<dyn Write>>) -> Self {
        Self { roadmap, events }
    }

    pub fn with_paths(roadmap: Option<&Path>, events: Option<&Path>) -> io::Result<Self> {
        let open = |path: &Path| -> io::Result<Box<dyn Write>> {
            Ok(Box::new(BufWriter::new(File::create(path)?)))
        };
        Ok(Self {
            roadmap: roadmap.map(open).transpose()?,
            events: events.map(open).transpose()?,
        })
    }

    fn new_node(&mut self, uid: NodeId, config: &Config) {
        if let Some(w) = &mut self.roadmap {
            let _ = write!(w, "{}, {}", uid, config.len());
            for x in config.iter() {
                let _ = write!(w, ", {}", x);
            }
            let _ = writeln!(w);
        }
    }

    fn validity_checked(&mut self, uid: NodeId, valid: bool) {
        if let Some(w) = &mut self.events {
            let _ = writeln!(w, "VAL_BASE, {}, {}", uid, valid as u8);
        }
    }

    fn grasp_validity_checked(&mut self, uid: NodeId, grasp_id: GraspId, valid: bool) {
        if let Some(w) = &mut self.events {
            let _ = writeln!(w, "VAL_GRASP, {}, {}, {}", uid, grasp_id, valid as u8);
        }
    }

    fn edge_cost_checked(&mut self, a: NodeId, b: NodeId, cost: f64) {
        if let Some(w) = &mut self.events {
            let _ = writeln!(w, "EDGE_COST, {}, {}, {}", a, b, cost);
        }
    }

    fn grasp_edge_cost_checked(&mut self, a: NodeId, b: NodeId, grasp_id: GraspId, cost: f64) {
        if let Some(w) = &mut self.events {
            let _ = writeln!(w, "EDGE_COST_GRASP, {}, {}, {}, {}", a, b, grasp_id, cost);
        }
    }
}

struct NnEntry {
    uid: NodeId,
    config: Config,
}

pub struct Roadmap {
    state_space: Rc<dyn StateSpace>,
    cost_computer: Rc<dyn EdgeCostComputer>,
    si: SpaceInformation,
    batch_size: usize,
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<EdgeKey, Edge>,
    nn: NearestNeighbors<NnEntry>,
    halton: HaltonSequence,
    node_id_counter: NodeId,
    densification_gen: u64,
    gamma_prm: f64,
    logger: TraceLogger,
    journal: Vec<EdgeCostChange>,
}

impl std::fmt::Debug for Roadmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Roadmap")
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("densification_gen", &self.densification_gen)
            .finish()
    }
}

impl Roadmap {
    /// Create a roadmap over the given state space and densify it once with
    /// `batch_size` samples.
    pub fn new(
        state_space: Rc<dyn StateSpace>,
        cost_computer: Rc<dyn EdgeCostComputer>,
        batch_size: usize,
        logger: TraceLogger,
    ) -> Self {
        let si = state_space.space_information();
        assert_eq!(si.lower.len(), si.dimension);
        assert_eq!(si.upper.len(), si.dimension);
        let dim = si.dimension as f64;
        // xi is the measure of a dim-dimensional unit ball. Together with the
        // measure of the bounding box (stand-in for the free space measure)
        // it yields the PRM* constant of Karaman and Frazzoli.
        let xi = std::f64::consts::PI.powf(dim / 2.0) / gamma_fn(dim / 2.0 + 1.0);
        let gamma_prm = 2.0 * ((1.0 + 1.0 / dim) * si.measure() / xi).powf(1.0 / dim);
        let nn_space = state_space.clone();
        let mut roadmap = Self {
            state_space,
            cost_computer,
            si: si.clone(),
            batch_size,
            nodes: HashMap::new(),
            edges: HashMap::new(),
            nn: NearestNeighbors::new(move |a: &NnEntry, b: &NnEntry| {
                nn_space.distance(&a.config, &b.config)
            }),
            halton: HaltonSequence::new(si.dimension),
            node_id_counter: 0,
            densification_gen: 0,
            gamma_prm,
            logger,
            journal: Vec::new(),
        };
        roadmap.densify_batch(batch_size);
        roadmap
    }

    pub fn space_information(&self) -> &SpaceInformation {
        &self.si
    }

    pub fn gamma_prm(&self) -> f64 {
        self.gamma_prm
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn densification_gen(&self) -> u64 {
        self.densification_gen
    }

    /// The PRM* connection radius for the current number of samples.
    pub fn radius(&self) -> f64 {
        let n = self.nn.len();
        if n < 2 {
            return 0.0;
        }
        let n = n as f64;
        self.gamma_prm * (n.ln() / n).powf(1.0 / self.si.dimension as f64)
    }

    /// Grow the roadmap by the configured batch size.
    pub fn densify(&mut self) {
        self.densify_batch(self.batch_size);
    }

    /// Grow the roadmap by `batch` Halton samples scaled into the joint
    /// limits. A batch of zero is a no-op.
    pub fn densify_batch(&mut self, batch: usize) {
        if batch == 0 {
            return;
        }
        for unit in self.halton.sample_batch(batch) {
            let config = self.scale_to_limits(unit);
            self.add_node(config);
        }
        self.densification_gen += 1;
    }

    fn scale_to_limits(&self, unit: Config) -> Config {
        let mut config = unit;
        for i in 0..self.si.dimension {
            config[i] = config[i] * (self.si.upper[i] - self.si.lower[i]) + self.si.lower[i];
        }
        config
    }

    /// Insert a node for `config` without checking its validity.
    pub fn add_node(&mut self, config: Config) -> NodeId {
        let uid = self.node_id_counter;
        self.node_id_counter += 1;
        self.logger.new_node(uid, &config);
        self.nn.add(NnEntry {
            uid,
            config: config.clone(),
        });
        self.nodes.insert(
            uid,
            Node {
                uid,
                config,
                initialized: false,
                conditional_validity: HashMap::new(),
                edges: HashMap::new(),
                densification_gen: GEN_UNSEEN,
            },
        );
        uid
    }

    pub fn get_node(&self, uid: NodeId) -> Option<&Node> {
        self.nodes.get(&uid)
    }

    /// The state space's distance metric.
    pub fn distance(&self, a: &Config, b: &Config) -> f64 {
        self.state_space.distance(a, b)
    }

    pub fn get_edge(&self, a: NodeId, b: NodeId) -> Option<&Edge> {
        self.edges.get(&edge_key(a, b))
    }

    /// The node's neighbors in ascending id order. Call
    /// [`Roadmap::update_adjacency`] first if fresh adjacency is needed.
    pub fn neighbors(&self, uid: NodeId) -> SmallVec<[NodeId; 16]> {
        let mut ids: SmallVec<[NodeId; 16]> = match self.nodes.get(&uid) {
            Some(node) => node.edges.keys().copied().collect(),
            None => SmallVec::new(),
        };
        ids.sort_unstable();
        ids
    }

    /// Refresh the node's adjacency if the roadmap has been densified since
    /// the last refresh, then prune incident edges that are known dead.
    pub fn update_adjacency(&mut self, uid: NodeId) {
        let Some(node) = self.nodes.get(&uid) else {
            return;
        };
        if node.densification_gen != self.densification_gen {
            let radius = self.radius();
            let query = NnEntry {
                uid,
                config: node.config.clone(),
            };
            let neighbors: Vec<NodeId> = self
                .nn
                .nearest_within(&query, radius)
                .into_iter()
                .map(|entry| entry.uid)
                .filter(|other| *other != uid)
                .collect();
            for other in neighbors {
                let key = edge_key(uid, other);
                if self.edges.contains_key(&key) {
                    continue;
                }
                let lower_bound = {
                    let a = &self.nodes[&uid].config;
                    let b = &self.nodes[&other].config;
                    self.cost_computer.lower_bound(a, b)
                };
                self.edges.insert(
                    key,
                    Edge {
                        base_cost: lower_bound,
                        base_evaluated: false,
                        conditional_costs: HashMap::new(),
                    },
                );
                self.nodes.get_mut(&uid).unwrap().edges.insert(other, key);
                self.nodes.get_mut(&other).unwrap().edges.insert(uid, key);
                // Announce the edge so a search that already expanded either
                // endpoint learns of the new connection.
                self.journal.push(EdgeCostChange {
                    a: uid,
                    b: other,
                    grasp_id: None,
                    old_cost: f64::INFINITY,
                    new_cost: lower_bound,
                });
            }
            self.nodes.get_mut(&uid).unwrap().densification_gen = self.densification_gen;
        }

        // Garbage-collect incident edges that were resolved to infinity or
        // died with a deleted neighbor.
        let dead: Vec<(NodeId, EdgeKey)> = self.nodes[&uid]
            .edges
            .iter()
            .filter(|(_, key)| self.edges.get(*key).map_or(true, Edge::is_dead))
            .map(|(other, key)| (*other, *key))
            .collect();
        for (other, key) in dead {
            self.nodes.get_mut(&uid).unwrap().edges.remove(&other);
            let other_still_linked = self
                .nodes
                .get(&other)
                .map_or(false, |n| n.edges.contains_key(&uid));
            if !other_still_linked {
                self.edges.remove(&key);
            }
        }
    }

    /// Whether the node is valid for the robot alone. The first call asks
    /// the oracle; a node that fails the check is deleted and every later
    /// call returns false.
    pub fn is_valid(&mut self, uid: NodeId) -> bool {
        let Some(node) = self.nodes.get_mut(&uid) else {
            return false;
        };
        if node.initialized {
            return true;
        }
        let valid = self.state_space.is_valid(&node.config);
        self.logger.validity_checked(uid, valid);
        if !valid {
            self.delete_node(uid);
            return false;
        }
        self.nodes.get_mut(&uid).unwrap().initialized = true;
        true
    }

    /// Whether the node is valid while holding `grasp_id`. Requires base
    /// validity; the answer is memoized per grasp.
    pub fn is_valid_with_grasp(&mut self, uid: NodeId, grasp_id: GraspId) -> bool {
        if !self.is_valid(uid) {
            return false;
        }
        let node = self.nodes.get(&uid).unwrap();
        if let Some(valid) = node.conditional_validity.get(&grasp_id) {
            return *valid;
        }
        let valid = self
            .state_space
            .is_valid_with_grasp(&node.config, grasp_id, true);
        self.logger.grasp_validity_checked(uid, grasp_id, valid);
        self.nodes
            .get_mut(&uid)
            .unwrap()
            .conditional_validity
            .insert(grasp_id, valid);
        valid
    }

    /// The currently cached grasp-agnostic cost of the edge, without
    /// resolving it.
    pub fn lazy_cost(&self, a: NodeId, b: NodeId) -> f64 {
        self.edges
            .get(&edge_key(a, b))
            .map_or(f64::INFINITY, |edge| edge.base_cost)
    }

    /// The currently cached cost of the edge for `grasp_id`, without
    /// resolving it.
    pub fn lazy_conditional_cost(&self, a: NodeId, b: NodeId, grasp_id: GraspId) -> f64 {
        self.edges
            .get(&edge_key(a, b))
            .map_or(f64::INFINITY, |edge| {
                if edge.is_dead() {
                    f64::INFINITY
                } else {
                    edge.best_known_cost(grasp_id)
                }
            })
    }

    /// The exact grasp-agnostic cost of the edge, resolving and caching it on
    /// first touch.
    pub fn compute_cost(&mut self, a: NodeId, b: NodeId) -> f64 {
        let key = edge_key(a, b);
        let Some(edge) = self.edges.get(&key) else {
            return f64::INFINITY;
        };
        if edge.base_evaluated {
            return edge.base_cost;
        }
        let old_cost = edge.base_cost;
        let cost = {
            let ca = &self.nodes[&key.0].config;
            let cb = &self.nodes[&key.1].config;
            self.cost_computer.cost(ca, cb)
        };
        self.logger.edge_cost_checked(key.0, key.1, cost);
        let edge = self.edges.get_mut(&key).unwrap();
        edge.base_cost = cost;
        edge.base_evaluated = true;
        if cost != old_cost {
            self.journal.push(EdgeCostChange {
                a: key.0,
                b: key.1,
                grasp_id: None,
                old_cost,
                new_cost: cost,
            });
        }
        cost
    }

    /// The exact cost of the edge for `grasp_id`, resolving and caching it on
    /// first touch. An edge whose base cost resolved to infinity is infinite
    /// for every grasp without consulting the oracle.
    pub fn compute_conditional_cost(&mut self, a: NodeId, b: NodeId, grasp_id: GraspId) -> f64 {
        let key = edge_key(a, b);
        let Some(edge) = self.edges.get(&key) else {
            return f64::INFINITY;
        };
        if edge.is_dead() {
            return f64::INFINITY;
        }
        if let Some(cost) = edge.conditional_costs.get(&grasp_id) {
            return *cost;
        }
        let old_cost = edge.base_cost;
        let cost = {
            let ca = &self.nodes[&key.0].config;
            let cb = &self.nodes[&key.1].config;
            self.cost_computer.conditional_cost(ca, cb, grasp_id)
        };
        self.logger
            .grasp_edge_cost_checked(key.0, key.1, grasp_id, cost);
        self.edges
            .get_mut(&key)
            .unwrap()
            .conditional_costs
            .insert(grasp_id, cost);
        if cost != old_cost {
            self.journal.push(EdgeCostChange {
                a: key.0,
                b: key.1,
                grasp_id: Some(grasp_id),
                old_cost,
                new_cost: cost,
            });
        }
        cost
    }

    /// The current end of the cost-change journal. Consumers remember this
    /// cursor and later ask for everything recorded after it, so several
    /// independent consumers can observe the same changes.
    pub fn journal_cursor(&self) -> usize {
        self.journal.len()
    }

    /// The cached-cost changes recorded since `cursor`.
    pub fn cost_changes_since(&self, cursor: usize) -> &[EdgeCostChange] {
        &self.journal[cursor.min(self.journal.len())..]
    }

    /// Remove a node that was found invalid. Incident edges become infinite
    /// and final; surviving neighbors prune them at their next adjacency
    /// refresh.
    fn delete_node(&mut self, uid: NodeId) {
        let Some(node) = self.nodes.remove(&uid) else {
            return;
        };
        self.nn.remove_if(|entry| entry.uid == uid);
        for (other, key) in node.edges {
            if let Some(edge) = self.edges.get_mut(&key) {
                if !edge.is_dead() {
                    self.journal.push(EdgeCostChange {
                        a: uid,
                        b: other,
                        grasp_id: None,
                        old_cost: edge.base_cost,
                        new_cost: f64::INFINITY,
                    });
                }
                edge.base_cost = f64::INFINITY;
                edge.base_evaluated = true;
            }
        }
    }
}

/// Lanczos approximation of the gamma function, good to ~1e-13 over the
/// arguments that occur here (dim/2 + 1 for small dim).
fn gamma_fn(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    if x < 0.5 {
        std::f64::consts::PI / ((std::f64::consts::PI * x).sin() * gamma_fn(1.0 - x))
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + G + 0.5;
        for (i, c) in COEFFS.iter().enumerate().skip(1) {
            a += c / (x + i as f64);
        }
        (2.0 * std::f64::consts::PI).sqrt() * t.powf(x + 0.5) * (-t).exp() * a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::IntegralEdgeCostComputer;
    use crate::space::{Grasp, SpaceError};
    use approx::assert_relative_eq;
    use nalgebra::DVector;
    use std::cell::Cell;

    /// A unit-square scene; configurations inside the forbidden band along
    /// the first axis are invalid, everything else costs 1.
    struct BandScene {
        dimension: usize,
        forbidden: Option<(f64, f64)>,
        validity_queries: Cell<usize>,
        cost_queries: Cell<usize>,
    }

    impl BandScene {
        fn open(dimension: usize) -> Self {
            Self {
                dimension,
                forbidden: None,
                validity_queries: Cell::new(0),
                cost_queries: Cell::new(0),
            }
        }

        fn with_band(dimension: usize, lo: f64, hi: f64) -> Self {
            Self {
                forbidden: Some((lo, hi)),
                ..Self::open(dimension)
            }
        }
    }

    impl StateSpace for BandScene {
        fn dimension(&self) -> usize {
            self.dimension
        }

        fn space_information(&self) -> SpaceInformation {
            SpaceInformation {
                dimension: self.dimension,
                lower: DVector::zeros(self.dimension),
                upper: DVector::from_element(self.dimension, 1.0),
            }
        }

        fn distance(&self, a: &Config, b: &Config) -> f64 {
            (a - b).norm()
        }

        fn is_valid(&self, config: &Config) -> bool {
            self.validity_queries.set(self.validity_queries.get() + 1);
            self.cost(config).is_finite()
        }

        fn is_valid_with_grasp(&self, config: &Config, _: GraspId, _: bool) -> bool {
            self.cost(config).is_finite()
        }

        fn cost(&self, config: &Config) -> f64 {
            self.cost_queries.set(self.cost_queries.get() + 1);
            if let Some((lo, hi)) = self.forbidden {
                if config[0] >= lo && config[0] <= hi {
                    return f64::INFINITY;
                }
            }
            // Strictly above 1 so that resolved edge costs differ from the
            // distance lower bound.
            1.5
        }

        fn conditional_cost(&self, config: &Config, _: GraspId) -> f64 {
            // Holding the object doubles the point cost: still finite, but
            // distinguishable from the base cost in tests.
            2.0 * self.cost(config)
        }

        fn add_grasp(&self, _: Grasp) -> Result<(), SpaceError> {
            Ok(())
        }

        fn remove_grasp(&self, _: GraspId) -> Result<(), SpaceError> {
            Ok(())
        }
    }

    fn make_roadmap(scene: Rc<BandScene>, batch: usize) -> Roadmap {
        let computer = Rc::new(IntegralEdgeCostComputer::new(scene.clone()));
        Roadmap::new(scene, computer, batch, TraceLogger::disabled())
    }

    #[test]
    fn densify_creates_batch_nodes_and_bumps_generation() {
        let roadmap = make_roadmap(Rc::new(BandScene::open(2)), 50);
        assert_eq!(roadmap.num_nodes(), 50);
        assert_eq!(roadmap.densification_gen(), 1);
    }

    #[test]
    fn densify_zero_is_a_no_op() {
        let mut roadmap = make_roadmap(Rc::new(BandScene::open(2)), 10);
        roadmap.densify_batch(0);
        assert_eq!(roadmap.num_nodes(), 10);
        assert_eq!(roadmap.densification_gen(), 1);
    }

    #[test]
    fn radius_follows_prm_star_formula() {
        let roadmap = make_roadmap(Rc::new(BandScene::open(2)), 100);
        let n = roadmap.num_nodes() as f64;
        let expected = roadmap.gamma_prm() * (n.ln() / n).powf(0.5);
        assert_relative_eq!(roadmap.radius(), expected, max_relative = 1e-12);
    }

    #[test]
    fn gamma_prm_matches_closed_form_in_2d() {
        // D = 2, unit square: xi = pi, mu = 1.
        let roadmap = make_roadmap(Rc::new(BandScene::open(2)), 10);
        let expected = 2.0 * (1.5 / std::f64::consts::PI).sqrt();
        assert_relative_eq!(roadmap.gamma_prm(), expected, max_relative = 1e-12);
    }

    #[test]
    fn adjacency_connects_within_radius_with_lower_bound_seeds() {
        let scene = Rc::new(BandScene::open(2));
        let mut roadmap = make_roadmap(scene.clone(), 200);
        let uid = roadmap.add_node(DVector::from_vec(vec![0.5, 0.5]));
        roadmap.update_adjacency(uid);
        let radius = roadmap.radius();
        let neighbors = roadmap.neighbors(uid);
        assert!(!neighbors.is_empty());
        for other in neighbors {
            let edge = roadmap.get_edge(uid, other).unwrap();
            assert!(!edge.base_evaluated);
            let dist = scene.distance(
                &roadmap.get_node(uid).unwrap().config,
                &roadmap.get_node(other).unwrap().config,
            );
            assert!(dist <= radius);
            assert_relative_eq!(edge.base_cost, dist);
        }
    }

    #[test]
    fn second_adjacency_refresh_does_no_new_work() {
        let mut roadmap = make_roadmap(Rc::new(BandScene::open(2)), 100);
        let uid = roadmap.add_node(DVector::from_vec(vec![0.5, 0.5]));
        roadmap.update_adjacency(uid);
        let degree = roadmap.neighbors(uid).len();
        let cursor = roadmap.journal_cursor();
        roadmap.update_adjacency(uid);
        assert_eq!(roadmap.neighbors(uid).len(), degree);
        assert!(roadmap.cost_changes_since(cursor).is_empty());
    }

    #[test]
    fn invalid_node_is_deleted_and_its_edges_die() {
        let scene = Rc::new(BandScene::with_band(2, 0.45, 0.55));
        let mut roadmap = make_roadmap(scene, 100);
        let inside = roadmap.add_node(DVector::from_vec(vec![0.5, 0.5]));
        let outside = roadmap.add_node(DVector::from_vec(vec![0.58, 0.5]));
        roadmap.densify_batch(1);
        roadmap.update_adjacency(inside);
        assert!(roadmap.neighbors(inside).contains(&outside));

        assert!(!roadmap.is_valid(inside));
        assert!(roadmap.get_node(inside).is_none());
        let edge = roadmap.get_edge(inside, outside).unwrap();
        assert!(edge.base_evaluated);
        assert!(edge.base_cost.is_infinite());

        // Still false on repeat, without re-querying the oracle.
        assert!(!roadmap.is_valid(inside));
    }

    #[test]
    fn validity_is_cached_after_first_check() {
        let scene = Rc::new(BandScene::open(2));
        let mut roadmap = make_roadmap(scene.clone(), 10);
        let queries = scene.validity_queries.get();
        assert!(roadmap.is_valid(3));
        assert!(roadmap.is_valid(3));
        assert_eq!(scene.validity_queries.get(), queries + 1);
    }

    #[test]
    fn dead_edges_are_pruned_on_adjacency_refresh() {
        let scene = Rc::new(BandScene::with_band(2, 0.45, 0.55));
        let mut roadmap = make_roadmap(scene, 100);
        let inside = roadmap.add_node(DVector::from_vec(vec![0.5, 0.5]));
        let outside = roadmap.add_node(DVector::from_vec(vec![0.58, 0.5]));
        roadmap.densify_batch(1);
        roadmap.update_adjacency(outside);
        assert!(roadmap.neighbors(outside).contains(&inside));

        assert!(!roadmap.is_valid(inside));
        roadmap.update_adjacency(outside);
        assert!(!roadmap.neighbors(outside).contains(&inside));
        assert!(roadmap.get_edge(outside, inside).is_none());
    }

    #[test]
    fn edge_cost_is_cached_and_final() {
        let scene = Rc::new(BandScene::open(2));
        let mut roadmap = make_roadmap(scene.clone(), 100);
        roadmap.update_adjacency(0);
        let other = roadmap.neighbors(0)[0];
        let first = roadmap.compute_cost(0, other);
        let queries = scene.cost_queries.get();
        let second = roadmap.compute_cost(0, other);
        assert_eq!(first, second);
        assert_eq!(scene.cost_queries.get(), queries);

        let conditional = roadmap.compute_conditional_cost(0, other, 7);
        assert_relative_eq!(conditional, 2.0 * first, max_relative = 1e-9);
        assert_eq!(roadmap.compute_conditional_cost(0, other, 7), conditional);
    }

    #[test]
    fn resolving_an_edge_journals_the_change() {
        let mut roadmap = make_roadmap(Rc::new(BandScene::open(2)), 100);
        roadmap.update_adjacency(0);
        let cursor = roadmap.journal_cursor();
        let other = roadmap.neighbors(0)[0];
        let lower_bound = roadmap.lazy_cost(0, other);
        let exact = roadmap.compute_cost(0, other);
        assert!(exact > lower_bound);
        let changes = roadmap.cost_changes_since(cursor);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_cost, lower_bound);
        assert_eq!(changes[0].new_cost, exact);
        assert_eq!(changes[0].grasp_id, None);
        // A later cursor sees nothing new.
        assert!(roadmap.cost_changes_since(roadmap.journal_cursor()).is_empty());
    }

    #[test]
    fn dead_edge_is_infinite_for_every_grasp() {
        let scene = Rc::new(BandScene::with_band(2, 0.45, 0.55));
        let mut roadmap = make_roadmap(scene, 10);
        let a = roadmap.add_node(DVector::from_vec(vec![0.3, 0.5]));
        let b = roadmap.add_node(DVector::from_vec(vec![0.7, 0.5]));
        roadmap.densify_batch(1);
        roadmap.update_adjacency(a);
        assert!(roadmap.compute_cost(a, b).is_infinite());
        assert!(roadmap.compute_conditional_cost(a, b, 0).is_infinite());
        assert!(roadmap.compute_conditional_cost(a, b, 1).is_infinite());
    }

    /// A writer that shares its buffer with the test body so the written
    /// bytes can be inspected while the roadmap still owns the logger.
    #[derive(Clone, Default)]
    struct SharedBuf(Rc<std::cell::RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn trace_log_records_nodes_and_events() {
        let scene = Rc::new(BandScene::open(1));
        let computer = Rc::new(IntegralEdgeCostComputer::new(scene.clone()));
        let roadmap_log = SharedBuf::default();
        let event_log = SharedBuf::default();
        let logger = TraceLogger::new(
            Some(Box::new(roadmap_log.clone())),
            Some(Box::new(event_log.clone())),
        );
        let mut roadmap = Roadmap::new(scene, computer, 4, logger);
        roadmap.update_adjacency(0);
        roadmap.is_valid(0);
        let other = roadmap.neighbors(0)[0];
        roadmap.compute_cost(0, other);
        roadmap.compute_conditional_cost(0, other, 2);
        roadmap.is_valid_with_grasp(other, 2);

        let nodes = roadmap_log.contents();
        assert_eq!(nodes.lines().count(), 4);
        assert!(nodes.lines().next().unwrap().starts_with("0, 1, "));

        let events = event_log.contents();
        assert!(events.contains("VAL_BASE, 0, 1"));
        assert!(events.contains(&format!("VAL_GRASP, {}, 2, 1", other)));
        assert!(events.contains("EDGE_COST, "));
        assert!(events.contains("EDGE_COST_GRASP, "));
    }
}
