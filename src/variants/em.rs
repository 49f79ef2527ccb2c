use crate::errors::{GmmError, Result};
use crate::linalg::{self, GaussianDensity};
use crate::primitive::Primitive;
use crate::{Component, Convergence, DegeneratePolicy, FitResult, GaussianMixture, GmmConfig, KMeansState};
use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

/// Result record of one E-step: the freshly computed N×K responsibility matrix
/// (row-major, every row summing to 1) and the data log-likelihood under the
/// parameters the step was evaluated with.
pub(crate) struct EStepOutput<T: Primitive> {
    pub responsibilities: Vec<T>,
    pub log_likelihood: T,
}

/// The expectation-maximization loop fitting the mixture parameters.
///
/// The engine owns no state of its own; the parameter set is read-only during the
/// E-step and rebuilt from the responsibilities during the M-step, with both phase
/// results passed by value between the phases.
pub(crate) struct EmEngine<T: Primitive> {
    _p: std::marker::PhantomData<T>,
}
impl<T: Primitive> EmEngine<T> {
    /// Build the density evaluator of one component, applying the degenerate-component
    /// policy when its covariance turns out singular.
    fn density(component_id: usize, component: &Component<T>, policy: &DegeneratePolicy<T>) -> Result<GaussianDensity<T>> {
        match GaussianDensity::new(component_id, component.mean.clone(), &component.covariance) {
            Err(GmmError::SingularCovariance { .. }) => match *policy {
                DegeneratePolicy::Fail => Err(GmmError::SingularCovariance { component: component_id }),
                DegeneratePolicy::Regularize { covariance_floor } => {
                    let dims = component.mean.len();
                    let lifted = &component.covariance + DMatrix::identity(dims, dims) * covariance_floor;
                    GaussianDensity::new(component_id, component.mean.clone(), &lifted)
                }
            },
            other => other,
        }
    }

    /// E-step: for every sample, evaluate the weighted log-density under each component
    /// and normalize across components with log-sum-exp, so each responsibility row sums
    /// to 1 even when the raw densities underflow. The per-sample normalizers accumulate
    /// into the data log-likelihood `L = Σ_n ln Σ_k w_k·N_k(x_n)`.
    pub(crate) fn e_step(data: &GaussianMixture<T>, components: &[Component<T>], policy: &DegeneratePolicy<T>) -> Result<EStepOutput<T>> {
        let k = components.len();
        let densities = components.iter().enumerate()
            .map(|(ci, c)| Self::density(ci, c, policy))
            .collect::<Result<Vec<_>>>()?;
        let log_weights: Vec<T> = components.iter().map(|c| c.weight.ln()).collect();

        let mut responsibilities = vec![T::zero(); data.sample_cnt * k];
        let work_packet_size = (data.sample_cnt / rayon::current_num_threads()).max(1);
        let log_likelihood = data.samples.par_chunks(data.sample_dims)
            .with_min_len(work_packet_size)
            .zip(responsibilities.par_chunks_mut(k))
            .map(|(s, row)| {
                let x = DVector::from_column_slice(s);
                for ((r, density), &lw) in row.iter_mut().zip(densities.iter()).zip(log_weights.iter()) {
                    *r = lw + density.log_density(&x);
                }
                let max_log = row.iter().cloned().fold(row[0], |a, b| if b > a { b } else { a });
                let sum_exp: T = row.iter().map(|&lp| (lp - max_log).exp()).sum();
                let log_norm = max_log + sum_exp.ln();
                for r in row.iter_mut() {
                    *r = (*r - log_norm).exp();
                }
                log_norm
            })
            .sum::<T>();

        Ok(EStepOutput { responsibilities, log_likelihood })
    }

    /// M-step: re-estimate every component from the responsibility matrix. The
    /// responsibility mass of component k determines its new weight `mass/N` and
    /// normalizes its weighted mean and covariance; masses sum to N over all
    /// components, so the weights sum to 1 by construction.
    pub(crate) fn m_step(data: &GaussianMixture<T>, responsibilities: &[T], components: &[Component<T>], policy: &DegeneratePolicy<T>) -> Result<Vec<Component<T>>> {
        let k = components.len();
        let sample_cnt = T::from(data.sample_cnt).unwrap();
        let mass_floor = T::from(1e-12).unwrap();

        components.par_iter().enumerate()
            .map(|(ci, component)| {
                let column: Vec<T> = responsibilities.iter().skip(ci).step_by(k).cloned().collect();
                let mass: T = column.iter().cloned().sum();

                if mass <= mass_floor {
                    return match *policy {
                        DegeneratePolicy::Fail => Err(GmmError::DegenerateComponent { component: ci }),
                        // Keep the previous parameters; the component may pick up mass
                        // again once the other components move.
                        DegeneratePolicy::Regularize { .. } => Ok(Component {
                            mean: component.mean.clone(),
                            covariance: component.covariance.clone(),
                            weight: mass / sample_cnt,
                        }),
                    };
                }

                let weight = mass / sample_cnt;
                let mean = linalg::weighted_mean(&data.samples, data.sample_dims, &column, mass)?;
                let mut covariance = linalg::weighted_covariance(&data.samples, data.sample_dims, &column, &mean, mass)?;
                if let DegeneratePolicy::Regularize { covariance_floor } = *policy {
                    let dims = data.sample_dims;
                    covariance += DMatrix::identity(dims, dims) * covariance_floor;
                }
                if !(covariance.determinant() > T::zero()) {
                    return Err(GmmError::SingularCovariance { component: ci });
                }
                Ok(Component { mean, covariance, weight })
            })
            .collect()
    }

    pub fn calculate<'a, F>(data: &GaussianMixture<T>, k: usize, init: F, config: &GmmConfig<'a, T>) -> Result<FitResult<T>>
                where for<'c> F: FnOnce(&GaussianMixture<T>, &mut KMeansState<T>, &GmmConfig<'c, T>) -> Result<()> {
        // Seed the component means with a k-means pass and notify the subscriber
        let kmeans_state = crate::variants::Lloyd::calculate(data, k, config.max_kmeans_iterations, init, config)?;
        (config.kmeans_done)(&kmeans_state);

        let mut components = Self::initial_components(data, &kmeans_state);
        let mut likelihood_trace = Vec::new();
        let mut logic = config.convergence.create_logic();
        let mut convergence = Convergence::IterationLimit;
        let mut iterations = 0;

        for i in 1..=config.max_em_iterations {
            let e_output = Self::e_step(data, &components, &config.degenerate_policy)?;
            likelihood_trace.push(e_output.log_likelihood);
            components = Self::m_step(data, &e_output.responsibilities, &components, &config.degenerate_policy)?;
            iterations = i;

            // Notify subscriber about finished iteration
            (config.iteration_done)(&components, i, e_output.log_likelihood);
            debug!("em iteration {}: log-likelihood {}", i, e_output.log_likelihood);

            if !logic.next(e_output.log_likelihood) {
                convergence = Convergence::Converged;
                break;
            }
        }

        // The responsibilities computed inside the loop predate that iteration's M-step,
        // so re-run the E-step under the returned parameters. Its likelihood belongs to
        // no completed iteration and stays off the trace.
        let responsibilities = Self::e_step(data, &components, &config.degenerate_policy)?.responsibilities;

        // Hard labels; responsibility ties break towards the lowest component index
        let assignments = responsibilities.chunks_exact(k)
            .map(|row| {
                let mut best = 0;
                for ci in 1..k {
                    if row[ci] > row[best] {
                        best = ci;
                    }
                }
                best
            })
            .collect();
        Ok(FitResult { k, components, responsibilities, likelihood_trace, assignments, iterations, convergence })
    }

    /// Initial parameter set: means from the k-means centroids, uniform weights,
    /// unit covariances.
    fn initial_components(data: &GaussianMixture<T>, kmeans_state: &KMeansState<T>) -> Vec<Component<T>> {
        let dims = data.sample_dims;
        let uniform = T::one() / T::from(kmeans_state.k).unwrap();
        kmeans_state.centroids.chunks_exact(dims)
            .map(|centroid| Component {
                mean: DVector::from_column_slice(centroid),
                covariance: DMatrix::identity(dims, dims),
                weight: uniform,
            })
            .collect()
    }
}
