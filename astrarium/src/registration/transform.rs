//! Frame-to-frame transformation model.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Affine-with-bilinear-cross-term 2D map:
///
/// ```text
/// x' = a0 + a1·X + a2·Y + a3·X·Y
/// y' = b0 + b1·X + b2·Y + b3·X·Y
/// ```
///
/// X, Y are pixel coordinates normalized by `x_width`/`y_width` (the size of
/// the image the transform was fit on); outputs are scaled back to pixels.
/// Applying the transform to a differently-sized image requires
/// [`rescaled`](Self::rescaled) first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    /// X-output coefficients [a0, a1, a2, a3].
    pub a: [f64; 4],
    /// Y-output coefficients [b0, b1, b2, b3].
    pub b: [f64; 4],
    /// Normalization width (image width the transform was fit on).
    pub x_width: f64,
    /// Normalization height (image height the transform was fit on).
    pub y_width: f64,
}

impl Transformation {
    /// Identity map for an image of the given size.
    pub fn identity(x_width: f64, y_width: f64) -> Self {
        Self {
            a: [0.0, 1.0, 0.0, 0.0],
            b: [0.0, 0.0, 1.0, 0.0],
            x_width,
            y_width,
        }
    }

    /// Map a reference-frame point to its target-frame position.
    pub fn apply(&self, p: DVec2) -> DVec2 {
        let x = p.x / self.x_width;
        let y = p.y / self.y_width;
        let xy = x * y;
        DVec2::new(
            (self.a[0] + self.a[1] * x + self.a[2] * y + self.a[3] * xy) * self.x_width,
            (self.b[0] + self.b[1] * x + self.b[2] * y + self.b[3] * xy) * self.y_width,
        )
    }

    /// Translation component in pixels (image of the origin).
    pub fn translation(&self) -> DVec2 {
        self.apply(DVec2::ZERO)
    }

    /// Rotation angle in radians, from the linear part at the origin.
    pub fn rotation_angle(&self) -> f64 {
        // d(y')/dx = b1·y_width/x_width, d(x')/dx = a1
        (self.b[1] * self.y_width / self.x_width).atan2(self.a[1])
    }

    /// The same map re-normalized for a differently-sized image.
    ///
    /// Coefficients operate on normalized coordinates, so only the widths
    /// change; this matches the invariant that X, Y must be rescaled before
    /// applying the transform to another image size.
    pub fn rescaled(&self, x_width: f64, y_width: f64) -> Self {
        Self {
            x_width,
            y_width,
            ..*self
        }
    }

    /// A transform is usable when its linear part is non-degenerate.
    pub fn is_valid(&self) -> bool {
        let det = self.a[1] * self.b[2] - self.a[2] * self.b[1];
        det.is_finite() && det.abs() > 1e-10
    }
}

impl std::fmt::Display for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let t = self.translation();
        write!(
            f,
            "Bilinear(dx={:.2}, dy={:.2}, rot={:.3}°)",
            t.x,
            t.y,
            self.rotation_angle().to_degrees()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const EPSILON: f64 = 1e-10;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn test_identity() {
        let t = Transformation::identity(640.0, 480.0);
        let p = t.apply(DVec2::new(123.0, 456.0));
        assert!(approx_eq(p.x, 123.0));
        assert!(approx_eq(p.y, 456.0));
        assert!(t.is_valid());
        assert!(approx_eq(t.rotation_angle(), 0.0));
    }

    #[test]
    fn test_pure_translation() {
        let mut t = Transformation::identity(640.0, 480.0);
        t.a[0] = 10.0 / 640.0;
        t.b[0] = -5.0 / 480.0;

        let p = t.apply(DVec2::new(100.0, 100.0));
        assert!(approx_eq(p.x, 110.0));
        assert!(approx_eq(p.y, 95.0));

        let offset = t.translation();
        assert!(approx_eq(offset.x, 10.0));
        assert!(approx_eq(offset.y, -5.0));
    }

    #[test]
    fn test_rotation_angle_extraction() {
        // Build a pure rotation in pixel space on a square image
        let angle = PI / 6.0;
        let w = 512.0;
        let t = Transformation {
            a: [0.0, angle.cos(), -angle.sin(), 0.0],
            b: [0.0, angle.sin(), angle.cos(), 0.0],
            x_width: w,
            y_width: w,
        };
        assert!(approx_eq(t.rotation_angle(), angle));

        let p = t.apply(DVec2::new(100.0, 0.0));
        assert!(approx_eq(p.x, 100.0 * angle.cos()));
        assert!(approx_eq(p.y, 100.0 * angle.sin()));
    }

    #[test]
    fn test_cross_term() {
        let mut t = Transformation::identity(100.0, 100.0);
        t.a[3] = 0.5;
        // At (100, 100): X = Y = 1, x' gains 0.5 * 100 px
        let p = t.apply(DVec2::new(100.0, 100.0));
        assert!(approx_eq(p.x, 150.0));
        assert!(approx_eq(p.y, 100.0));
        // At the origin the cross term vanishes
        let origin = t.apply(DVec2::ZERO);
        assert!(approx_eq(origin.x, 0.0));
    }

    #[test]
    fn test_rescaled_keeps_normalized_behavior() {
        let mut t = Transformation::identity(100.0, 100.0);
        t.a[0] = 0.1; // 10 px shift at 100-wide, 20 px at 200-wide

        let scaled = t.rescaled(200.0, 200.0);
        let offset = scaled.translation();
        assert!(approx_eq(offset.x, 20.0));
    }

    #[test]
    fn test_degenerate_is_invalid() {
        let t = Transformation {
            a: [0.0; 4],
            b: [0.0; 4],
            x_width: 100.0,
            y_width: 100.0,
        };
        assert!(!t.is_valid());
    }
}
