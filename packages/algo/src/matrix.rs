//! Dense linear algebra kernel shared by LinUCB and the Bayesian optimizer:
//! Cholesky decomposition, rank-1 updates, triangular solves, and the
//! Matern-5/2 kernel used for Gaussian Process regression.

use thiserror::Error;

use crate::types::{MAX_RANK1_DIAG, MIN_RANK1_DIAG};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MatrixError {
    #[error("matrix is not positive definite")]
    NonPositiveDefinite,
    #[error("rank-1 update produced a non-finite or collapsed diagonal")]
    Rank1UpdateFailed,
    #[error("triangular system is singular")]
    SingularSystem,
}

/// Floor below which a diagonal sum during decomposition is considered
/// collapsed and self-healed rather than left to produce a NaN/negative sqrt.
const CHOLESKY_EPS: f64 = 1e-10;

/// Computes the lower Cholesky factor L of a d×d positive-definite matrix `a`
/// (row-major) such that `L · Lᵀ = a`, via the Banachiewicz algorithm.
///
/// `a` is symmetrised first (`a_ij <- (a_ij + a_ji)/2`, NaN/∞ entries zeroed),
/// and a diagonal sum that collapses to `<= ε` or non-finite partway through
/// the decomposition is replaced by `max(λ, ε) + ε` rather than failing the
/// whole call: a single badly-conditioned row should not make a ridge-
/// regularised matrix (which the caller's `λI` prior already keeps away from
/// true singularity) un-decomposable.
pub fn cholesky(a: &[f64], d: usize, lambda: f64) -> Result<Vec<f64>, MatrixError> {
    let mut sym = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..d {
            let v = (a[i * d + j] + a[j * d + i]) / 2.0;
            sym[i * d + j] = if v.is_finite() { v } else { 0.0 };
        }
    }

    let healed_diag = lambda.max(CHOLESKY_EPS) + CHOLESKY_EPS;
    let mut l = vec![0.0; d * d];
    for i in 0..d {
        for j in 0..=i {
            let mut sum = sym[i * d + j];
            for k in 0..j {
                sum -= l[i * d + k] * l[j * d + k];
            }
            if i == j {
                if sum <= CHOLESKY_EPS || !sum.is_finite() {
                    sum = healed_diag;
                }
                l[i * d + j] = sum.sqrt();
            } else {
                let diag = l[j * d + j];
                if diag < MIN_RANK1_DIAG {
                    return Err(MatrixError::NonPositiveDefinite);
                }
                l[i * d + j] = sum / diag;
            }
        }
    }
    Ok(l)
}

/// Updates a Cholesky factor in place for `a' = a + x·xᵀ` using a sequence of
/// Givens-style rotations, avoiding the O(d^3) cost of a full re-decomposition.
/// Returns `Err` if the update drives any diagonal entry out of the safe
/// range; the caller should then fall back to [`cholesky`] on the
/// accumulated `a` matrix.
pub fn rank1_update(l: &mut [f64], d: usize, x: &[f64]) -> Result<(), MatrixError> {
    let mut work = x.to_vec();
    for k in 0..d {
        let l_kk = l[k * d + k];
        let r = (l_kk * l_kk + work[k] * work[k]).sqrt();
        if !r.is_finite() || r < MIN_RANK1_DIAG || r > MAX_RANK1_DIAG {
            return Err(MatrixError::Rank1UpdateFailed);
        }
        let c = r / l_kk;
        let s = work[k] / l_kk;
        l[k * d + k] = r;
        for i in (k + 1)..d {
            let l_ik = l[i * d + k];
            let new_l_ik = (l_ik + s * work[i]) / c;
            work[i] = c * work[i] - s * new_l_ik;
            l[i * d + k] = new_l_ik;
        }
    }
    Ok(())
}

/// Solves `L · y = b` (forward substitution), L lower-triangular row-major.
pub fn forward_solve(l: &[f64], d: usize, b: &[f64]) -> Result<Vec<f64>, MatrixError> {
    let mut y = vec![0.0; d];
    for i in 0..d {
        let diag = l[i * d + i];
        if diag.abs() < MIN_RANK1_DIAG {
            return Err(MatrixError::SingularSystem);
        }
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[i * d + k] * y[k];
        }
        y[i] = sum / diag;
    }
    Ok(y)
}

/// Solves `Lᵀ · x = y` (back substitution), L lower-triangular row-major.
pub fn back_solve(l: &[f64], d: usize, y: &[f64]) -> Result<Vec<f64>, MatrixError> {
    let mut x = vec![0.0; d];
    for ii in 0..d {
        let i = d - 1 - ii;
        let diag = l[i * d + i];
        if diag.abs() < MIN_RANK1_DIAG {
            return Err(MatrixError::SingularSystem);
        }
        let mut sum = y[i];
        for k in (i + 1)..d {
            sum -= l[k * d + i] * x[k];
        }
        x[i] = sum / diag;
    }
    Ok(x)
}

/// Solves `A · x = b` given A's Cholesky factor L, via forward then back
/// substitution.
pub fn solve_via_cholesky(l: &[f64], d: usize, b: &[f64]) -> Result<Vec<f64>, MatrixError> {
    let y = forward_solve(l, d, b)?;
    back_solve(l, d, &y)
}

/// Computes `sqrt(xᵀ · A⁻¹ · x)` given A's Cholesky factor, the LinUCB
/// confidence width term.
pub fn confidence_width(l: &[f64], d: usize, x: &[f64]) -> Result<f64, MatrixError> {
    let z = forward_solve(l, d, x)?;
    let sum: f64 = z.iter().map(|v| v * v).sum();
    Ok(sum.max(0.0).sqrt())
}

/// Matern-5/2 covariance kernel: k(r) = (1 + sqrt(5) r/l + 5 r^2/(3 l^2)) exp(-sqrt(5) r/l)
/// where r is the Euclidean distance between `a` and `b`, scaled by `length_scale`.
pub fn matern_5_2(a: &[f64], b: &[f64], length_scale: f64, signal_variance: f64) -> f64 {
    let l = length_scale.max(1e-6);
    let sq_dist: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
    let r = sq_dist.sqrt();
    let scaled = (5.0_f64).sqrt() * r / l;
    let poly = 1.0 + scaled + (5.0 * r * r) / (3.0 * l * l);
    signal_variance * poly * (-scaled).exp()
}
