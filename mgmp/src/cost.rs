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

use crate::space::{Config, GraspId, StateSpace};
use std::rc::Rc;

/// Turns point-cost queries along a straight configuration-space segment into
/// an edge cost, and exposes an admissible lower bound for edges that have
/// not been evaluated yet.
pub trait EdgeCostComputer {
    /// A lower bound on `cost(a, b)` that is cheap to evaluate. Used to seed
    /// lazily evaluated edges.
    fn lower_bound(&self, a: &Config, b: &Config) -> f64;

    /// The true, grasp-agnostic cost of traversing the segment from `a` to
    /// `b`. `+∞` if the segment passes through collision.
    fn cost(&self, a: &Config, b: &Config) -> f64;

    /// The cost of traversing the segment while holding grasp `grasp_id`.
    fn conditional_cost(&self, a: &Config, b: &Config, grasp_id: GraspId) -> f64;
}

/// Approximates the line integral of the state space's point cost with a
/// left Riemann sum at a fixed step size.
pub struct IntegralEdgeCostComputer {
    state_space: Rc<dyn StateSpace>,
    step_size: f64,
}

impl IntegralEdgeCostComputer {
    pub const DEFAULT_STEP_SIZE: f64 = 0.001;

    pub fn new(state_space: Rc<dyn StateSpace>) -> Self {
        Self::with_step_size(state_space, Self::DEFAULT_STEP_SIZE)
    }

    pub fn with_step_size(state_space: Rc<dyn StateSpace>, step_size: f64) -> Self {
        assert!(step_size > 0.0);
        Self {
            state_space,
            step_size,
        }
    }

    fn integrate(&self, a: &Config, b: &Config, point_cost: impl Fn(&Config) -> f64) -> f64 {
        assert_eq!(a.len(), b.len());
        let mut delta = b - a;
        let norm = delta.norm();
        if norm == 0.0 {
            return 0.0;
        }
        delta /= norm;
        let num_steps = (norm / self.step_size).ceil() as u64;
        let mut integral = 0.0;
        let mut progress = 0.0;
        for _ in 0..num_steps {
            let q = a + progress * &delta;
            // The final step is truncated so the sum covers exactly the
            // segment length.
            let step = self.step_size.min(norm - progress);
            progress += step;
            let dc = point_cost(&q);
            if dc.is_infinite() {
                return f64::INFINITY;
            }
            integral += dc * step;
        }
        integral
    }
}

impl EdgeCostComputer for IntegralEdgeCostComputer {
    fn lower_bound(&self, a: &Config, b: &Config) -> f64 {
        self.state_space.distance(a, b)
    }

    fn cost(&self, a: &Config, b: &Config) -> f64 {
        self.integrate(a, b, |q| self.state_space.cost(q))
    }

    fn conditional_cost(&self, a: &Config, b: &Config, grasp_id: GraspId) -> f64 {
        self.integrate(a, b, |q| self.state_space.conditional_cost(q, grasp_id))
    }
}
