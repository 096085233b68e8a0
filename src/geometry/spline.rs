//! Natural cubic splines, used to build smooth reference lines from waypoints

use itertools::Itertools;
use nalgebra::{DMatrix, DVector};

/// Natural cubic spline `y(t)` over strictly increasing knots
#[derive(Debug, Clone)]
pub struct CubicSpline {
    t: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl CubicSpline {
    /// Returns `None` for fewer than two knots or knots that do not increase
    pub fn new(t: &[f64], y: &[f64]) -> Option<Self> {
        let n = t.len();
        if n < 2 || y.len() != n {
            return None;
        }
        let h: Vec<f64> = t.iter().tuple_windows().map(|(t0, t1)| t1 - t0).collect();
        if h.iter().any(|&hi| !(hi > 0.0)) {
            return None;
        }

        // second-derivative coefficients from the tridiagonal system
        let mut lhs = DMatrix::zeros(n, n);
        let mut rhs = DVector::zeros(n);
        lhs[(0, 0)] = 1.0;
        lhs[(n - 1, n - 1)] = 1.0;
        for i in 1..n - 1 {
            lhs[(i, i - 1)] = h[i - 1];
            lhs[(i, i)] = 2.0 * (h[i - 1] + h[i]);
            lhs[(i, i + 1)] = h[i];
            rhs[i] = 3.0 * (y[i + 1] - y[i]) / h[i] - 3.0 * (y[i] - y[i - 1]) / h[i - 1];
        }
        let c = lhs.lu().solve(&rhs)?;

        let mut b = Vec::with_capacity(n - 1);
        let mut d = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            d.push((c[i + 1] - c[i]) / (3.0 * h[i]));
            b.push((y[i + 1] - y[i]) / h[i] - h[i] * (c[i + 1] + 2.0 * c[i]) / 3.0);
        }
        Some(Self {
            t: t.to_vec(),
            a: y.to_vec(),
            b,
            c: c.iter().copied().collect(),
            d,
        })
    }

    /// Segment holding `t`, clamped to the first and last one
    fn segment(&self, t: f64) -> (usize, f64) {
        let i = self
            .t
            .partition_point(|&knot| knot <= t)
            .saturating_sub(1)
            .min(self.t.len() - 2);
        (i, t - self.t[i])
    }

    pub fn value(&self, t: f64) -> f64 {
        let (i, dt) = self.segment(t);
        self.a[i] + self.b[i] * dt + self.c[i] * dt.powi(2) + self.d[i] * dt.powi(3)
    }

    pub fn first_derivative(&self, t: f64) -> f64 {
        let (i, dt) = self.segment(t);
        self.b[i] + 2.0 * self.c[i] * dt + 3.0 * self.d[i] * dt.powi(2)
    }

    pub fn second_derivative(&self, t: f64) -> f64 {
        let (i, dt) = self.segment(t);
        2.0 * self.c[i] + 6.0 * self.d[i] * dt
    }
}

/// Planar curve `(x(s), y(s))` parameterized by the chord length between waypoints
#[derive(Debug, Clone)]
pub struct CubicSpline2D {
    s: Vec<f64>,
    sx: CubicSpline,
    sy: CubicSpline,
}

impl CubicSpline2D {
    pub fn new(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() != y.len() {
            return None;
        }
        let mut s = Vec::with_capacity(x.len());
        let mut total = 0.0;
        for i in 0..x.len() {
            if i > 0 {
                total += (x[i] - x[i - 1]).hypot(y[i] - y[i - 1]);
            }
            s.push(total);
        }
        Some(Self {
            sx: CubicSpline::new(&s, x)?,
            sy: CubicSpline::new(&s, y)?,
            s,
        })
    }

    pub fn length(&self) -> f64 {
        self.s.last().copied().unwrap_or(0.0)
    }

    pub fn position(&self, s: f64) -> (f64, f64) {
        (self.sx.value(s), self.sy.value(s))
    }

    pub fn yaw(&self, s: f64) -> f64 {
        self.sy.first_derivative(s).atan2(self.sx.first_derivative(s))
    }

    pub fn curvature(&self, s: f64) -> f64 {
        let (dx, ddx) = (self.sx.first_derivative(s), self.sx.second_derivative(s));
        let (dy, ddy) = (self.sy.first_derivative(s), self.sy.second_derivative(s));
        (ddy * dx - ddx * dy) / (dx * dx + dy * dy).powf(1.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spline_interpolates_knots() {
        let t = [0.0, 1.0, 2.5, 4.0];
        let y = [1.0, 3.0, -1.0, 0.5];
        let spline = CubicSpline::new(&t, &y).unwrap();
        for (ti, yi) in t.iter().zip(y.iter()) {
            assert!((spline.value(*ti) - yi).abs() < 1e-9);
        }
        // natural boundary conditions
        assert!(spline.second_derivative(0.0).abs() < 1e-9);
        assert!(spline.second_derivative(4.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_data_stays_linear() {
        let spline = CubicSpline::new(&[0.0, 1.0, 2.0], &[0.0, 2.0, 4.0]).unwrap();
        assert!((spline.value(1.5) - 3.0).abs() < 1e-12);
        assert!((spline.first_derivative(0.3) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_knots() {
        assert!(CubicSpline::new(&[0.0], &[1.0]).is_none());
        assert!(CubicSpline::new(&[0.0, 1.0, 1.0], &[0.0, 1.0, 2.0]).is_none());
        assert!(CubicSpline2D::new(&[0.0, 1.0], &[0.0]).is_none());
    }

    #[test]
    fn test_straight_2d_curve() {
        let spline = CubicSpline2D::new(&[0.0, 3.0, 6.0], &[0.0, 4.0, 8.0]).unwrap();
        assert!((spline.length() - 10.0).abs() < 1e-12);
        let (x, y) = spline.position(5.0);
        assert!((x - 3.0).abs() < 1e-9 && (y - 4.0).abs() < 1e-9);
        assert!((spline.yaw(2.0) - (4.0f64).atan2(3.0)).abs() < 1e-9);
        assert!(spline.curvature(7.0).abs() < 1e-9);
    }
}
