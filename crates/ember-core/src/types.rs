//! Spatial and common types

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// A 2D vector
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

    pub fn from_array(arr: [f32; 2]) -> Self {
        Self {
            x: arr[0],
            y: arr[1],
        }
    }

    pub fn to_array(&self) -> [f32; 2] {
        [self.x, self.y]
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, scalar: f32) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }
}

/// A 2D affine transform mapping emitter-local coordinates into system coordinates.
///
/// `map` computes `(m11·x + m21·y + dx, m12·x + m22·y + dy)`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform2D {
    pub m11: f32,
    pub m12: f32,
    pub m21: f32,
    pub m22: f32,
    pub dx: f32,
    pub dy: f32,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform2D {
    pub const IDENTITY: Self = Self {
        m11: 1.0,
        m12: 0.0,
        m21: 0.0,
        m22: 1.0,
        dx: 0.0,
        dy: 0.0,
    };

    pub fn from_translation(dx: f32, dy: f32) -> Self {
        Self {
            dx,
            dy,
            ..Self::IDENTITY
        }
    }

    /// Rotation in degrees, counter-clockwise, about the origin
    pub fn from_rotation(degrees: f32) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self {
            m11: c,
            m12: s,
            m21: -s,
            m22: c,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn with_scale(mut self, sx: f32, sy: f32) -> Self {
        self.m11 *= sx;
        self.m12 *= sx;
        self.m21 *= sy;
        self.m22 *= sy;
        self
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.m11 * x + self.m21 * y + self.dx,
            self.m12 * x + self.m22 * y + self.dy,
        )
    }

    /// Composition that applies `self` first, then `outer`
    pub fn then(&self, outer: &Transform2D) -> Transform2D {
        Transform2D {
            m11: self.m11 * outer.m11 + self.m12 * outer.m21,
            m12: self.m11 * outer.m12 + self.m12 * outer.m22,
            m21: self.m21 * outer.m11 + self.m22 * outer.m21,
            m22: self.m21 * outer.m12 + self.m22 * outer.m22,
            dx: self.dx * outer.m11 + self.dy * outer.m21 + outer.dx,
            dy: self.dx * outer.m12 + self.dy * outer.m22 + outer.dy,
        }
    }
}

/// 8-bit RGBA particle color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticleColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ParticleColor {
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as u8,
            g: ((hex >> 8) & 0xFF) as u8,
            b: (hex & 0xFF) as u8,
            a: 255,
        }
    }

    /// Normalized `[r, g, b, a]` in 0..=1
    pub fn to_array(&self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        ]
    }
}

impl Default for ParticleColor {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec2_operations() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(3.0, 5.0);
        assert_eq!(a + b, Vec2::new(4.0, 7.0));
        assert_eq!(b - a, Vec2::new(2.0, 3.0));
        assert_eq!(a * 2.0, Vec2::new(2.0, 4.0));
        assert!((Vec2::new(3.0, 4.0).length() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_translation_map() {
        let t = Transform2D::from_translation(10.0, -5.0);
        assert_eq!(t.map(1.0, 2.0), (11.0, -3.0));
        assert!(Transform2D::default().is_identity());
    }

    #[test]
    fn test_rotation_then_translation() {
        let rot = Transform2D::from_rotation(90.0);
        let (x, y) = rot.map(1.0, 0.0);
        assert!(x.abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);

        let combined = rot.then(&Transform2D::from_translation(5.0, 0.0));
        let (x, y) = combined.map(1.0, 0.0);
        assert!((x - 5.0).abs() < 1e-6);
        assert!((y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_color_from_hex() {
        let c = ParticleColor::from_hex(0xFF8844);
        assert_eq!(c, ParticleColor::new(0xFF, 0x88, 0x44, 0xFF));
        let arr = c.to_array();
        assert!((arr[0] - 1.0).abs() < 0.01);
        assert!((arr[1] - 0.533).abs() < 0.01);
    }
}
