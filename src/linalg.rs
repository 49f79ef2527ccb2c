use crate::errors::{GmmError, Result};
use crate::primitive::Primitive;
use nalgebra::{DMatrix, DVector};

/// Multivariate Gaussian log-density with precomputed precision matrix and
/// normalizing constant.
///
/// Construction inverts the covariance once; evaluation is then a single
/// quadratic form per point. Inversion is fallible: a collapsed covariance
/// (zero or negative determinant) is reported as
/// [`GmmError::SingularCovariance`] instead of silently producing NaN
/// densities.
pub struct GaussianDensity<T: Primitive> {
    mean: DVector<T>,
    precision: DMatrix<T>,
    log_norm: T,
}

impl<T: Primitive> GaussianDensity<T> {
    /// Build the density of component **component** from its mean and covariance.
    pub fn new(component: usize, mean: DVector<T>, covariance: &DMatrix<T>) -> Result<Self> {
        let dims = mean.len();
        if covariance.nrows() != dims || covariance.ncols() != dims {
            return Err(GmmError::SizeMismatch {
                context: "covariance matrix",
                expected: dims,
                actual: covariance.nrows(),
            });
        }

        let det = covariance.determinant();
        // Also catches NaN determinants
        if !(det > T::zero()) {
            return Err(GmmError::SingularCovariance { component });
        }
        let precision = covariance
            .clone()
            .try_inverse()
            .ok_or(GmmError::SingularCovariance { component })?;

        let half = T::from(0.5).unwrap();
        let log_norm = -half * (T::from(dims).unwrap() * T::two_pi().ln() + det.ln());
        Ok(Self { mean, precision, log_norm })
    }

    /// Evaluate `ln N(x | mean, covariance)`.
    pub fn log_density(&self, x: &DVector<T>) -> T {
        let diff = x - &self.mean;
        let mahalanobis_sq = (&self.precision * &diff).dot(&diff);
        self.log_norm - T::from(0.5).unwrap() * mahalanobis_sq
    }
}

/// Responsibility-weighted mean of all samples: `(Σ_n w_n·x_n) / mass`.
///
/// **samples** is the row-major N×M buffer, **weights** has one entry per
/// sample, **mass** is the caller-computed `Σ_n w_n` (must be positive).
pub fn weighted_mean<T: Primitive>(
    samples: &[T],
    sample_dims: usize,
    weights: &[T],
    mass: T,
) -> Result<DVector<T>> {
    if samples.len() != weights.len() * sample_dims {
        return Err(GmmError::SizeMismatch {
            context: "weighted mean",
            expected: weights.len() * sample_dims,
            actual: samples.len(),
        });
    }

    let mut mean = DVector::zeros(sample_dims);
    for (s, &w) in samples.chunks_exact(sample_dims).zip(weights.iter()) {
        for (acc, &sv) in mean.iter_mut().zip(s.iter()) {
            *acc += sv * w;
        }
    }
    Ok(mean / mass)
}

/// Responsibility-weighted scatter of centered samples:
/// `(Σ_n w_n·(x_n - mean)(x_n - mean)ᵀ) / mass`.
pub fn weighted_covariance<T: Primitive>(
    samples: &[T],
    sample_dims: usize,
    weights: &[T],
    mean: &DVector<T>,
    mass: T,
) -> Result<DMatrix<T>> {
    if samples.len() != weights.len() * sample_dims {
        return Err(GmmError::SizeMismatch {
            context: "weighted covariance",
            expected: weights.len() * sample_dims,
            actual: samples.len(),
        });
    }
    if mean.len() != sample_dims {
        return Err(GmmError::SizeMismatch {
            context: "weighted covariance",
            expected: sample_dims,
            actual: mean.len(),
        });
    }

    let mut scatter = DMatrix::zeros(sample_dims, sample_dims);
    for (s, &w) in samples.chunks_exact(sample_dims).zip(weights.iter()) {
        let diff = DVector::from_column_slice(s) - mean;
        scatter += (&diff * diff.transpose()) * w;
    }
    Ok(scatter / mass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_covariance_is_rejected() {
        let mean = DVector::from_column_slice(&[0.0f64, 0.0]);
        let covariance = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        match GaussianDensity::new(3, mean, &covariance) {
            Err(GmmError::SingularCovariance { component: 3 }) => {}
            other => panic!("expected SingularCovariance, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn covariance_dimension_mismatch_is_rejected() {
        let mean = DVector::from_column_slice(&[0.0f64, 0.0, 0.0]);
        let covariance = DMatrix::<f64>::identity(2, 2);
        assert!(matches!(
            GaussianDensity::new(0, mean, &covariance),
            Err(GmmError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn standard_normal_density_at_mean() {
        let mean = DVector::from_column_slice(&[0.0f64, 0.0]);
        let covariance = DMatrix::<f64>::identity(2, 2);
        let density = GaussianDensity::new(0, mean.clone(), &covariance).unwrap();
        // ln N(0 | 0, I) = -(m/2)·ln(2π)
        let should = -(2.0 / 2.0) * (2.0 * std::f64::consts::PI).ln();
        assert_approx_eq!(density.log_density(&mean), should, 1e-12);
    }

    #[test]
    fn scaled_univariate_density() {
        let mean = DVector::from_column_slice(&[1.0f64]);
        let covariance = DMatrix::from_row_slice(1, 1, &[4.0]);
        let density = GaussianDensity::new(0, mean, &covariance).unwrap();
        let x = DVector::from_column_slice(&[3.0f64]);
        // ln N(3 | 1, 4) = -0.5·(ln(2π) + ln 4 + (3-1)²/4)
        let should = -0.5 * ((2.0 * std::f64::consts::PI).ln() + 4.0f64.ln() + 1.0);
        assert_approx_eq!(density.log_density(&x), should, 1e-12);
    }

    #[test]
    fn weighted_mean_and_covariance_of_point_pair() {
        let samples = vec![0.0f64, 2.0];
        let weights = vec![1.0, 1.0];
        let mean = weighted_mean(&samples, 1, &weights, 2.0).unwrap();
        assert_approx_eq!(mean[0], 1.0, 1e-12);
        let covariance = weighted_covariance(&samples, 1, &weights, &mean, 2.0).unwrap();
        assert_approx_eq!(covariance[(0, 0)], 1.0, 1e-12);
    }

    #[test]
    fn uneven_weights_shift_the_mean() {
        let samples = vec![0.0f64, 4.0];
        let weights = vec![3.0, 1.0];
        let mean = weighted_mean(&samples, 1, &weights, 4.0).unwrap();
        assert_approx_eq!(mean[0], 1.0, 1e-12);
    }

    #[test]
    fn weighted_mean_checks_buffer_length() {
        let samples = vec![0.0f64, 2.0, 4.0];
        let weights = vec![1.0, 1.0];
        assert!(matches!(
            weighted_mean(&samples, 2, &weights, 2.0),
            Err(GmmError::SizeMismatch { .. })
        ));
    }
}
