use core::fmt;
use core::ops::Mul;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Rotation quaternion, `w` is the scalar part.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn from_axis_angle(axis: Vec3, radians: f32) -> Self {
        let len = (axis.x * axis.x + axis.y * axis.y + axis.z * axis.z).sqrt();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let (s, c) = (radians * 0.5).sin_cos();
        let k = s / len;
        Self::new(axis.x * k, axis.y * k, axis.z * k, c)
    }

    /// Euler angles in degrees, applied about Z, then X, then Y.
    pub fn from_euler_degrees(x: f32, y: f32, z: f32) -> Self {
        let qx = Self::from_axis_angle(Vec3::new(1.0, 0.0, 0.0), x.to_radians());
        let qy = Self::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), y.to_radians());
        let qz = Self::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), z.to_radians());
        qy * qx * qz
    }

    pub fn norm_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Multiplicative inverse; a degenerate (zero) quaternion inverts to identity.
    pub fn inverse(&self) -> Self {
        let n = self.norm_squared();
        if n <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let c = self.conjugate();
        Self::new(c.x / n, c.y / n, c.z / n, c.w / n)
    }

    pub fn approx_eq(&self, other: &Self, eps: f32) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
            && (self.w - other.w).abs() <= eps
    }
}

impl Mul for Quat {
    type Output = Quat;

    fn mul(self, b: Quat) -> Quat {
        let a = self;
        Quat {
            x: a.w * b.x + a.x * b.w + a.y * b.z - a.z * b.y,
            y: a.w * b.y + a.y * b.w + a.z * b.x - a.x * b.z,
            z: a.w * b.z + a.z * b.w + a.x * b.y - a.y * b.x,
            w: a.w * b.w - a.x * b.x - a.y * b.y - a.z * b.z,
        }
    }
}

impl fmt::Display for Quat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.4}, {:.4}, {:.4}, {:.4})",
            self.x, self.y, self.z, self.w
        )
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn test_identity_is_neutral() {
        let q = Quat::from_axis_angle(Vec3::new(0.3, 1.0, -0.2), 1.1);
        assert!((Quat::IDENTITY * q).approx_eq(&q, EPS));
        assert!((q * Quat::IDENTITY).approx_eq(&q, EPS));
    }

    #[test]
    fn test_inverse_cancels() {
        let q = Quat::from_euler_degrees(10.0, 200.0, -35.0);
        assert!((q.inverse() * q).approx_eq(&Quat::IDENTITY, EPS));
        assert!((q * q.inverse()).approx_eq(&Quat::IDENTITY, EPS));
    }

    #[test]
    fn test_zero_quaternion_inverse() {
        let zero = Quat::new(0.0, 0.0, 0.0, 0.0);
        assert_eq!(zero.inverse(), Quat::IDENTITY);
    }

    #[test]
    fn test_euler_single_axis() {
        let q = Quat::from_euler_degrees(0.0, 90.0, 0.0);
        let half = core::f32::consts::FRAC_1_SQRT_2;
        assert!(q.approx_eq(&Quat::new(0.0, half, 0.0, half), EPS));
    }

    #[test]
    fn test_euler_order_is_z_then_x_then_y() {
        let composed = Quat::from_euler_degrees(0.0, 270.0, 90.0);
        let expected = Quat::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), 270f32.to_radians())
            * Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), 90f32.to_radians());
        assert!(composed.approx_eq(&expected, EPS));
        assert!((composed.norm_squared() - 1.0).abs() < EPS);
    }
}
