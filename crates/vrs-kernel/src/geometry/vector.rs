//! 3D vector with epsilon-tolerant equality

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use glam::DVec3;
use serde::{Deserialize, Serialize};

use super::dict::GeometryKey;
use crate::constants::EPSILON;

/// Coordinate axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All three axes, in order
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of the axis in a coordinate triple
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A point or direction in model space.
///
/// `==` is tolerant: two vectors compare equal when their distance is below
/// [`EPSILON`]. This relation is not transitive; code that needs bit-exact
/// comparison uses [`Vector3::exactly_equal`].
#[derive(Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vector3(DVec3);

impl Vector3 {
    /// The origin
    pub const ZERO: Self = Self(DVec3::ZERO);

    /// Create a vector from its coordinates
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self(DVec3::new(x, y, z))
    }

    /// Unit vector along `axis`, scaled by `norm`
    pub fn from_axis(axis: Axis, norm: f64) -> Self {
        Self::ZERO.with_coord(axis, norm)
    }

    pub fn x(&self) -> f64 {
        self.0.x
    }

    pub fn y(&self) -> f64 {
        self.0.y
    }

    pub fn z(&self) -> f64 {
        self.0.z
    }

    /// Coordinate along `axis`
    pub fn coord(&self, axis: Axis) -> f64 {
        self.0[axis.index()]
    }

    /// Copy of this vector with the coordinate along `axis` replaced
    pub fn with_coord(&self, axis: Axis, value: f64) -> Self {
        let mut v = self.0;
        v[axis.index()] = value;
        Self(v)
    }

    pub fn to_array(&self) -> [f64; 3] {
        self.0.to_array()
    }

    pub fn as_dvec3(&self) -> DVec3 {
        self.0
    }

    pub fn dot(&self, other: Self) -> f64 {
        self.0.dot(other.0)
    }

    pub fn cross(&self, other: Self) -> Self {
        Self(self.0.cross(other.0))
    }

    pub fn length(&self) -> f64 {
        self.0.length()
    }

    pub fn length_squared(&self) -> f64 {
        self.0.length_squared()
    }

    /// Distance between two points
    pub fn distance(&self, other: Self) -> f64 {
        self.0.distance(other.0)
    }

    /// Unit vector in the same direction (zero stays zero)
    pub fn normalized(&self) -> Self {
        Self(self.0.normalize_or_zero())
    }

    /// Unit vector in the same direction, or `None` if shorter than epsilon
    pub fn try_normalized(&self) -> Option<Self> {
        let length = self.length();
        (length >= EPSILON).then(|| *self / length)
    }

    /// Point at `fraction` of the way from `self` to `other`
    pub fn lerp(&self, other: Self, fraction: f64) -> Self {
        Self(self.0.lerp(other.0, fraction))
    }

    /// Bit-exact comparison
    pub fn exactly_equal(&self, other: &Self) -> bool {
        self.0.x.to_bits() == other.0.x.to_bits()
            && self.0.y.to_bits() == other.0.y.to_bits()
            && self.0.z.to_bits() == other.0.z.to_bits()
    }

    /// Remove the component of `self` along `direction`
    pub fn project_orthogonal(&self, direction: Self) -> Self {
        let length2 = direction.length_squared();
        if length2 == 0.0 {
            return *self;
        }
        *self - direction * (self.dot(direction) / length2)
    }

    /// Axis whose coordinate is closest to zero, if it is below `max_distance`.
    ///
    /// Used to find the axis-aligned plane through the origin that a point
    /// almost lies on.
    pub fn closest_axis_plane(&self, max_distance: f64) -> Option<Axis> {
        let mut best = None;
        let mut best_distance = max_distance;
        for axis in Axis::ALL {
            let distance = self.coord(axis).abs();
            if distance < best_distance {
                best_distance = distance;
                best = Some(axis);
            }
        }
        best
    }
}

impl PartialEq for Vector3 {
    fn eq(&self, other: &Self) -> bool {
        (self.0 - other.0).length() < EPSILON
    }
}

impl GeometryKey for Vector3 {
    fn hash_seed(&self) -> f64 {
        // |(1, 1.1, 1.2)| * 0.5 < 1, so keys closer than EPSILON stay within 1.0
        (self.0.x + self.0.y * 1.1 + self.0.z * 1.2) * (0.5 / EPSILON)
    }
}

impl fmt::Debug for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.0.x, self.0.y, self.0.z)
    }
}

impl From<DVec3> for Vector3 {
    fn from(v: DVec3) -> Self {
        Self(v)
    }
}

impl From<Vector3> for DVec3 {
    fn from(v: Vector3) -> Self {
        v.0
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from(a: [f64; 3]) -> Self {
        Self(DVec3::from_array(a))
    }
}

impl Add for Vector3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Vector3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Vector3 {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for Vector3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Mul<Vector3> for f64 {
    type Output = Vector3;

    fn mul(self, rhs: Vector3) -> Vector3 {
        Vector3(rhs.0 * self)
    }
}

impl Div<f64> for Vector3 {
    type Output = Self;

    fn div(self, rhs: f64) -> Self {
        Self(self.0 / rhs)
    }
}
