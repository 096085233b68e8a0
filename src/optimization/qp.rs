//! Inequality constrained quadratic programs
//!
//! Solves
//!
//! ```text
//! min  1/2 d' H d + g' d
//! s.t. A d <= b
//! ```
//!
//! with Hildreth's procedure: coordinate ascent on the dual, which needs no
//! active set bookkeeping and degrades gracefully on infeasible problems
//! (the multipliers grow but the iteration stays bounded).
//!
//! Constraints only enter the dual once the current step violates them. Most rows of
//! a trajectory problem stay inactive, so the dual stays small; the multipliers of one
//! round warm start the next.

use std::time::Instant;

use nalgebra::{Cholesky, DMatrix, DVector};

/// Settings of the dual coordinate ascent
#[derive(Debug, Clone, Copy)]
pub struct HildrethConfig {
    /// Maximum number of sweeps over all multipliers
    pub max_iterations: usize,
    /// Convergence threshold on the squared multiplier change of a sweep
    pub tolerance: f64,
    /// Violation above which a constraint joins the working set
    pub feasibility_tolerance: f64,
    /// No further sweep starts after this instant
    pub deadline: Option<Instant>,
}

impl Default for HildrethConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-12,
            feasibility_tolerance: 1e-9,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub d: DVector<f64>,
    /// One multiplier per row of `A`
    pub multipliers: DVector<f64>,
    pub iterations: usize,
    /// `false` when the sweep limit or the deadline cut the solve short
    pub converged: bool,
}

/// Solve the QP for a positive definite `h`.
///
/// Returns `None` if `h` is not positive definite.
pub fn solve_qp(
    h: &DMatrix<f64>,
    g: &DVector<f64>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    config: &HildrethConfig,
) -> Option<QpSolution> {
    let h_inv = Cholesky::new(h.clone())?.inverse();
    Some(solve_qp_with_inverse(&h_inv, g, a, b, config))
}

/// Solve the QP given the inverse Hessian
///
/// # Arguments
/// * `h_inv` - Inverse of the (positive definite) Hessian
/// * `g` - Linear cost term
/// * `a` - Constraint matrix, one row per inequality
/// * `b` - Constraint right hand side
///
/// # Returns
/// The last iterate; `converged` tells whether it solves the full problem
pub fn solve_qp_with_inverse(
    h_inv: &DMatrix<f64>,
    g: &DVector<f64>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    config: &HildrethConfig,
) -> QpSolution {
    let m = a.nrows();
    let d_free = -(h_inv * g);
    let mut d = d_free.clone();
    let mut in_working = vec![false; m];
    let mut working: Vec<usize> = Vec::new();
    let mut duals = DVector::<f64>::zeros(0);
    let mut iterations = 0;
    let mut converged = true;

    while m > 0 {
        let residual = a * &d - b;
        let violated: Vec<usize> = (0..m)
            .filter(|&i| !in_working[i] && residual[i] > config.feasibility_tolerance)
            .collect();
        if violated.is_empty() {
            break;
        }
        if deadline_passed(config.deadline) {
            converged = false;
            break;
        }

        let mut warm_start = DVector::zeros(working.len() + violated.len());
        warm_start.rows_mut(0, working.len()).copy_from(&duals);
        for &i in &violated {
            in_working[i] = true;
        }
        working.extend(violated);

        let round = hildreth(
            h_inv,
            &d_free,
            &a.select_rows(&working),
            &b.select_rows(&working),
            warm_start,
            config,
        );
        iterations += round.iterations;
        d = round.d;
        duals = round.multipliers;
        if !round.converged {
            converged = false;
            break;
        }
    }

    let mut multipliers = DVector::zeros(m);
    for (k, &row) in working.iter().enumerate() {
        multipliers[row] = duals[k];
    }
    QpSolution {
        d,
        multipliers,
        iterations,
        converged,
    }
}

fn deadline_passed(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |deadline| Instant::now() >= deadline)
}

/// Hildreth's procedure on the rows `a d <= b`, starting from the multipliers `lambda`
fn hildreth(
    h_inv: &DMatrix<f64>,
    d_free: &DVector<f64>,
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    mut lambda: DVector<f64>,
    config: &HildrethConfig,
) -> QpSolution {
    let m = a.nrows();
    let a_h_inv = a * h_inv;
    let p = &a_h_inv * a.transpose();
    // dual: min 1/2 l' P l + l' k, l >= 0
    let k = b - a * d_free;

    let mut iterations = 0;
    let mut converged = false;
    while iterations < config.max_iterations && !deadline_passed(config.deadline) {
        iterations += 1;
        let mut change = 0.0;
        for i in 0..m {
            let p_ii = p[(i, i)];
            if p_ii <= f64::EPSILON {
                continue;
            }
            // P is symmetric, so its column doubles as the row
            let coupling = p.column(i).dot(&lambda) - p_ii * lambda[i];
            let updated = (-(k[i] + coupling) / p_ii).max(0.0);
            change += (updated - lambda[i]).powi(2);
            lambda[i] = updated;
        }
        if change < config.tolerance {
            converged = true;
            break;
        }
    }

    let d = d_free - a_h_inv.transpose() * &lambda;
    QpSolution {
        d,
        multipliers: lambda,
        iterations,
        converged,
    }
}
