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

use crate::error::ThisError;
use nalgebra::{DVector, UnitQuaternion, Vector3};

/// A point in the robot's joint space.
pub type Config = DVector<f64>;

/// Identifier of a grasp, assigned by the caller when the grasp is added to
/// the scene.
pub type GraspId = usize;

/// Identifier of a goal, assigned by the caller when the goal is added to the
/// planner.
pub type GoalId = usize;

/// Dimension and joint limits of the configuration space.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceInformation {
    pub dimension: usize,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

impl SpaceInformation {
    /// The Lebesgue measure of the bounding box spanned by the joint limits.
    pub fn measure(&self) -> f64 {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, hi)| hi - lo)
            .product()
    }
}

/// A fixed relative pose and gripper posture that binds the object to the
/// end-effector. Immutable once added to the scene.
#[derive(Debug, Clone)]
pub struct Grasp {
    pub id: GraspId,
    /// Orientation of the object relative to the end-effector frame.
    pub orientation: UnitQuaternion<f64>,
    /// Translation of the object relative to the end-effector frame.
    pub translation: Vector3<f64>,
    /// Joint values of the gripper while the grasp is held.
    pub gripper_values: DVector<f64>,
}

/// A desired terminal state: a configuration reached while holding the object
/// with a particular grasp, annotated with a scalar quality (higher = better).
#[derive(Debug, Clone)]
pub struct Goal {
    pub id: GoalId,
    pub config: Config,
    pub grasp_id: GraspId,
    pub quality: f64,
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum SpaceError {
    #[error("a grasp with id [{0}] has already been added to the scene")]
    DuplicateGrasp(GraspId),
    #[error("no grasp with id [{0}] is known to the scene")]
    UnknownGrasp(GraspId),
}

/// The collision oracle. An implementation owns a scene representation and
/// answers validity and clearance-derived cost queries about single
/// configurations, with or without a grasp applied.
///
/// All queries take `&self`: the planner runs on a single logical thread and
/// implementations are expected to mutate their scene through interior
/// mutability, wrapping every query in the scoped pattern of snapshotting the
/// robot and object state, applying the grasp if the query is conditional,
/// running the check, and restoring the snapshot on every exit path.
pub trait StateSpace {
    /// Dimension of the configuration space.
    fn dimension(&self) -> usize;

    /// Joint limits of the configuration space.
    fn space_information(&self) -> SpaceInformation;

    /// Distance between two configurations. Must be a lower bound on the true
    /// cost of any path between them; the planner assumes the Euclidean
    /// metric in configuration space.
    fn distance(&self, a: &Config, b: &Config) -> f64;

    /// Whether `config` is collision-free for the robot alone.
    fn is_valid(&self, config: &Config) -> bool;

    /// Whether `config` is collision-free with grasp `grasp_id` applied. When
    /// `lock_grasp` is set the object is attached to the end-effector for the
    /// duration of the check.
    fn is_valid_with_grasp(&self, config: &Config, grasp_id: GraspId, lock_grasp: bool) -> bool;

    /// Clearance-derived point cost of `config` for the robot alone. Returns
    /// `+∞` if the configuration is in collision.
    fn cost(&self, config: &Config) -> f64;

    /// Point cost of `config` with grasp `grasp_id` applied.
    fn conditional_cost(&self, config: &Config, grasp_id: GraspId) -> f64;

    /// Register a grasp with the scene. Adding a grasp whose id is already
    /// known is a contract violation and fails.
    fn add_grasp(&self, grasp: Grasp) -> Result<(), SpaceError>;

    /// Remove a grasp from the scene.
    fn remove_grasp(&self, grasp_id: GraspId) -> Result<(), SpaceError>;
}
