//! Picked points: a location plus an affine pose in homogeneous coordinates.

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

const ALLCLOSE_RTOL: f64 = 1e-5;
const ALLCLOSE_ATOL: f64 = 1e-8;

/// Location in tomogram space, in the unit of the owning picks set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// A 4x4 homogeneous transform from object space to tomogram space.
///
/// The bottom row is always `[0, 0, 0, 1]`: the corner element is exactly
/// 1.0, the other three are zero within allclose tolerance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<f64>>", into = "[[f64; 4]; 4]")]
pub struct Transform([[f64; 4]; 4]);

impl Transform {
    pub const IDENTITY: Transform = Transform([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Validate and wrap a matrix.
    pub fn new(matrix: [[f64; 4]; 4]) -> TypeResult<Self> {
        let last = matrix[3];
        if last[3] != 1.0 {
            return Err(TypeError::invalid_transform(format!(
                "last element must be 1.0, got {}",
                last[3]
            )));
        }
        let expected = [0.0, 0.0, 0.0, 1.0];
        if !last.iter().zip(expected).all(|(&a, b)| allclose(a, b)) {
            return Err(TypeError::invalid_transform(format!(
                "last row must be [0, 0, 0, 1], got {last:?}"
            )));
        }
        Ok(Self(matrix))
    }

    /// Validate a dynamically shaped matrix (rows of columns).
    pub fn from_rows(rows: Vec<Vec<f64>>) -> TypeResult<Self> {
        let cols = rows.iter().map(Vec::len).find(|&n| n != 4).unwrap_or(4);
        if rows.len() != 4 || cols != 4 {
            return Err(TypeError::InvalidTransformShape {
                rows: rows.len(),
                cols,
            });
        }

        let mut matrix = [[0.0; 4]; 4];
        for (dst, src) in matrix.iter_mut().zip(rows) {
            dst.copy_from_slice(&src);
        }
        Self::new(matrix)
    }

    /// Pure translation.
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut matrix = Self::IDENTITY.0;
        matrix[0][3] = x;
        matrix[1][3] = y;
        matrix[2][3] = z;
        Self(matrix)
    }

    pub fn matrix(&self) -> [[f64; 4]; 4] {
        self.0
    }

    /// The upper-left 3x3 rotation block.
    pub fn rotation(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[0][0], m[0][1], m[0][2]],
            [m[1][0], m[1][1], m[1][2]],
            [m[2][0], m[2][1], m[2][2]],
        ]
    }

    /// The translation column.
    pub fn shift(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TryFrom<[[f64; 4]; 4]> for Transform {
    type Error = TypeError;

    fn try_from(matrix: [[f64; 4]; 4]) -> TypeResult<Self> {
        Self::new(matrix)
    }
}

impl TryFrom<Vec<Vec<f64>>> for Transform {
    type Error = TypeError;

    fn try_from(rows: Vec<Vec<f64>>) -> TypeResult<Self> {
        Self::from_rows(rows)
    }
}

impl From<Transform> for [[f64; 4]; 4] {
    fn from(t: Transform) -> Self {
        t.0
    }
}

fn allclose(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= ALLCLOSE_ATOL + ALLCLOSE_RTOL * expected.abs()
}

fn default_score() -> f64 {
    1.0
}

/// One annotated point with pose, score and optional instance id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub location: Location,
    #[serde(default)]
    transformation: Transform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<i64>,
    #[serde(default = "default_score")]
    pub score: f64,
}

impl Point {
    /// A point at `location` with identity pose and score 1.0.
    pub fn new(location: Location) -> Self {
        Self {
            location,
            transformation: Transform::IDENTITY,
            instance_id: None,
            score: default_score(),
        }
    }

    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self::new(Location::new(x, y, z))
    }

    pub fn with_transform(mut self, transformation: Transform) -> Self {
        self.transformation = transformation;
        self
    }

    pub fn with_instance_id(mut self, instance_id: i64) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn transformation(&self) -> [[f64; 4]; 4] {
        self.transformation.matrix()
    }

    pub fn transform(&self) -> &Transform {
        &self.transformation
    }

    /// Replace the pose. The matrix is validated before it is accepted; on
    /// failure the previous pose is kept.
    pub fn set_transformation(&mut self, matrix: [[f64; 4]; 4]) -> TypeResult<()> {
        self.transformation = Transform::new(matrix)?;
        Ok(())
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(Location::default())
    }
}
