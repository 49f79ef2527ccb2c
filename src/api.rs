use crate::convergence::ConvergenceCriterion;
use crate::errors::{GmmError, Result};
use crate::primitive::Primitive;
use nalgebra::{DMatrix, DVector};
use rand::prelude::*;
use rayon::prelude::*;
use std::cell::RefCell;

pub type KMeansDoneCallbackFn<'a, T> = &'a dyn Fn(&KMeansState<T>);
pub type IterationDoneCallbackFn<'a, T> = &'a dyn Fn(&[Component<T>], usize, T);

/// Recovery policy for components that collapse during the iteration, either by
/// losing their responsibility mass or by producing a singular covariance.
#[derive(Clone, Copy, Debug)]
pub enum DegeneratePolicy<T: Primitive> {
    /// Escalate as [`GmmError::DegenerateComponent`] / [`GmmError::SingularCovariance`],
    /// aborting the run.
    Fail,
    /// Local recovery: add **covariance_floor** to every diagonal entry of a freshly
    /// estimated covariance, and keep the previous parameters of a component whose
    /// responsibility mass underflowed.
    Regularize { covariance_floor: T },
}

/// This is a structure holding various configuration options for a mixture-model fit, such as
/// the random number generator to use, the convergence criterion, iteration caps, or a couple
/// of callbacks that can be set to get status information from a running calculation.
///
/// For more detailed information about all possible options, have a look at [`GmmConfigBuilder`].
pub struct GmmConfig<'a, T: Primitive> {
    /// Callback that is called when the k-means seeding phase finished
    /// ## Arguments
    /// - **state**: Final [`KMeansState`] of the seeding run
    pub(crate) kmeans_done: KMeansDoneCallbackFn<'a, T>,
    /// Callback that is called after each completed EM iteration (E-step followed by M-step)
    /// ## Arguments
    /// - **components**: Mixture components after the iteration's M-step
    /// - **iteration_id**: Number of the current iteration
    /// - **log_likelihood**: Data log-likelihood computed by the iteration's E-step
    pub(crate) iteration_done: IterationDoneCallbackFn<'a, T>,
    /// Random number generator to use
    pub(crate) rnd: Box<RefCell<dyn RngCore>>,
    /// The convergence criterion ending the EM iteration
    pub(crate) convergence: ConvergenceCriterion<T>,
    /// Hard cap on EM iterations; reaching it yields [`Convergence::IterationLimit`]
    pub(crate) max_em_iterations: usize,
    /// Hard cap on k-means rounds during seeding
    pub(crate) max_kmeans_iterations: usize,
    /// What to do when a component degenerates
    pub(crate) degenerate_policy: DegeneratePolicy<T>,
}
impl<'a, T: Primitive> Default for GmmConfig<'a, T> {
    fn default() -> Self {
        Self {
            kmeans_done: &|_| {},
            iteration_done: &|_, _, _| {},
            rnd: Box::new(RefCell::new(rand::thread_rng())),
            convergence: ConvergenceCriterion::AbsoluteDelta {
                epsilon: T::from(1e-6).unwrap(),
            },
            max_em_iterations: 200,
            max_kmeans_iterations: 100,
            degenerate_policy: DegeneratePolicy::Regularize {
                covariance_floor: T::from(1e-6).unwrap(),
            },
        }
    }
}
impl<'a, T: Primitive> GmmConfig<'a, T> {
    /// Use the [`GmmConfigBuilder`] to build a [`GmmConfig`] instance.
    pub fn build() -> GmmConfigBuilder<'a, T> {
        GmmConfigBuilder { config: GmmConfig::default() }
    }
}
impl<'a, T: Primitive> std::fmt::Debug for GmmConfig<'a, T> {
    fn fmt(&self, _: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { Ok(()) }
}

pub struct GmmConfigBuilder<'a, T: Primitive> {
    config: GmmConfig<'a, T>,
}
impl<'a, T: Primitive> GmmConfigBuilder<'a, T> {
    /// Set the callback that should be called after the k-means seeding phase, before the
    /// EM iteration starts.
    pub fn kmeans_done(mut self, kmeans_done: KMeansDoneCallbackFn<'a, T>) -> Self {
        self.config.kmeans_done = kmeans_done; self
    }
    /// Set the callback that should be called after each completed EM iteration.
    pub fn iteration_done(mut self, iteration_done: IterationDoneCallbackFn<'a, T>) -> Self {
        self.config.iteration_done = iteration_done; self
    }
    /// Set the random number generator that should be used in the calculation.
    /// Use a seeded generator for deterministically repeatable results.
    pub fn random_generator<R: RngCore + 'static>(mut self, rnd: R) -> Self {
        self.config.rnd = Box::new(RefCell::new(rnd)); self
    }
    /// Set the convergence criterion ending the EM iteration. For more information,
    /// see documentation of [`ConvergenceCriterion`].
    /// ## Default
    /// [`ConvergenceCriterion::AbsoluteDelta`] `{ epsilon: 1e-6 }`
    pub fn convergence(mut self, convergence: ConvergenceCriterion<T>) -> Self {
        self.config.convergence = convergence; self
    }
    /// Set the maximum amount of EM iterations. When the cap is reached before the
    /// convergence criterion fires, the result is tagged [`Convergence::IterationLimit`].
    pub fn max_em_iterations(mut self, max_em_iterations: usize) -> Self {
        self.config.max_em_iterations = max_em_iterations; self
    }
    /// Set the maximum amount of k-means rounds used for seeding the component means.
    pub fn max_kmeans_iterations(mut self, max_kmeans_iterations: usize) -> Self {
        self.config.max_kmeans_iterations = max_kmeans_iterations; self
    }
    /// Set the recovery policy for degenerate components. For more information, see
    /// documentation of [`DegeneratePolicy`].
    /// ## Default
    /// [`DegeneratePolicy::Regularize`] `{ covariance_floor: 1e-6 }`
    pub fn degenerate_policy(mut self, degenerate_policy: DegeneratePolicy<T>) -> Self {
        self.config.degenerate_policy = degenerate_policy; self
    }
    /// Return the internally built configuration structure.
    pub fn build(self) -> GmmConfig<'a, T> { self.config }
}

/// State of a k-means seeding run, as handed to the [`GmmConfig::kmeans_done`] callback and
/// returned by [`GaussianMixture::kmeans`].
///
/// ## Fields
/// - **k**: The amount of clusters that were requested
/// - **distsum**: The total sum of squared distances from all samples to their respective centroids
/// - **centroids**: Calculated cluster centers \[row-major\] = \[centroid0, centroid1, ...\]
/// - **centroid_frequency**: Amount of samples in each cluster
/// - **assignments**: Vector mapping each sample to its respective nearest cluster
/// - **centroid_distances**: Vector containing each sample's squared distance to its centroid
#[derive(Clone, Debug)]
pub struct KMeansState<T: Primitive> {
    pub k: usize,
    pub distsum: T,
    pub centroids: Vec<T>,
    pub centroid_frequency: Vec<usize>,
    pub assignments: Vec<usize>,
    pub centroid_distances: Vec<T>,

    pub(crate) sample_dims: usize,
}
impl<T: Primitive> KMeansState<T> {
    pub(crate) fn new(sample_cnt: usize, sample_dims: usize, k: usize) -> Self {
        Self {
            k,
            distsum: T::zero(),
            centroids: vec![T::zero(); sample_dims * k],
            centroid_frequency: vec![0usize; k],
            assignments: vec![0usize; sample_cnt],
            centroid_distances: vec![T::zero(); sample_cnt],
            sample_dims,
        }
    }
    pub(crate) fn set_centroid_from_iter(&mut self, idx: usize, src: impl Iterator<Item = T>) {
        self.centroids.iter_mut().skip(self.sample_dims * idx).take(self.sample_dims)
                .zip(src)
                .for_each(|(c, s)| *c = s);
    }
}

/// One Gaussian mixture component: mean vector, covariance matrix and mixture weight.
#[derive(Clone, Debug)]
pub struct Component<T: Primitive> {
    pub mean: DVector<T>,
    pub covariance: DMatrix<T>,
    pub weight: T,
}

/// Whether a fit ended because the likelihood stabilized, or because the iteration
/// cap was exhausted first. The latter is not an error; the result still carries the
/// best parameters found so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Convergence {
    Converged,
    IterationLimit,
}

/// Final result of a mixture-model fit.
///
/// ## Fields
/// - **k**: The amount of mixture components
/// - **components**: Fitted components (means, covariances, weights summing to 1)
/// - **responsibilities**: N×K matrix \[row-major\]; row n holds the posterior probability of
///   sample n belonging to each component, each row summing to 1. Evaluated under the
///   returned **components**, not an earlier iteration's parameters
/// - **likelihood_trace**: Data log-likelihood after every E-step, in iteration order
/// - **assignments**: Hard labels, sample n mapped to its most responsible component
/// - **iterations**: Amount of completed EM iterations
/// - **convergence**: Whether the convergence criterion fired before the iteration cap
#[derive(Clone, Debug)]
pub struct FitResult<T: Primitive> {
    pub k: usize,
    pub components: Vec<Component<T>>,
    pub responsibilities: Vec<T>,
    pub likelihood_trace: Vec<T>,
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub convergence: Convergence,
}

/// Entrypoint of this crate's API-Surface.
///
/// Create an instance of this struct, giving the samples you want to operate on. The primitive
/// type of the passed samples array will be the type used internally for all calculations, as
/// well as for the result stored in the returned [`FitResult`] structure.
///
/// Calling [`GaussianMixture::fit`] on the struct does not mutate it, so multiple runs can be
/// done in parallel (the per-phase loops are already parallelized though). The sample buffer
/// is treated as immutable for the whole lifetime of the instance.
///
/// ## Supported initialization methods
/// - K-Means++ [`GaussianMixture::init_kmeanplusplus`]
/// - Random-Sample (Forgy) [`GaussianMixture::init_random_sample`]
/// - Caller-supplied centroids [`GaussianMixture::init_precomputed`]
pub struct GaussianMixture<T: Primitive> {
    pub(crate) sample_cnt: usize,
    pub(crate) sample_dims: usize,
    pub(crate) samples: Vec<T>,
}
impl<T: Primitive> GaussianMixture<T> {
    /// Create a new instance of the [`GaussianMixture`] structure.
    ///
    /// ## Arguments
    /// - **samples**: Vector of samples \[row-major\] = \[sample0, sample1, ...\]
    /// - **sample_cnt**: Amount of samples contained in the passed **samples** vector
    /// - **sample_dims**: Amount of dimensions each sample from the **samples** vector has
    ///
    /// Fails with [`GmmError::MalformedInput`] on an empty dataset and with
    /// [`GmmError::SizeMismatch`] when the buffer length disagrees with the given shape.
    pub fn new(samples: Vec<T>, sample_cnt: usize, sample_dims: usize) -> Result<Self> {
        if sample_cnt == 0 {
            return Err(GmmError::MalformedInput { reason: "dataset contains no samples".into() });
        }
        if sample_dims == 0 {
            return Err(GmmError::MalformedInput { reason: "samples have zero dimensions".into() });
        }
        if samples.len() != sample_cnt * sample_dims {
            return Err(GmmError::SizeMismatch {
                context: "sample buffer",
                expected: sample_cnt * sample_dims,
                actual: samples.len(),
            });
        }
        Ok(Self { sample_cnt, sample_dims, samples })
    }

    pub(crate) fn update_centroid_distances(&self, state: &mut KMeansState<T>) {
        let centroids = &state.centroids;
        let sample_dims = self.sample_dims;

        // manually calculate work-packet size, because rayon does not do static scheduling
        // (which is more appropriate here)
        let work_packet_size = (self.sample_cnt / rayon::current_num_threads()).max(1);
        self.samples.par_chunks(sample_dims)
            .with_min_len(work_packet_size)
            .zip(state.assignments.par_iter().cloned())
            .zip(state.centroid_distances.par_iter_mut())
            .for_each(|((s, assignment), centroid_dist)| {
                let centroid = &centroids[assignment * sample_dims..(assignment + 1) * sample_dims];
                *centroid_dist = s.iter()
                    .zip(centroid.iter())
                    .map(|(&sv, &cv)| { let d = sv - cv; d * d })
                    .sum();
            });
    }

    pub(crate) fn update_cluster_assignments(&self, state: &mut KMeansState<T>, limit_k: Option<usize>) {
        let centroids = &state.centroids;
        let k = limit_k.unwrap_or(state.k);
        let sample_dims = self.sample_dims;

        let work_packet_size = (self.sample_cnt / rayon::current_num_threads()).max(1);
        self.samples.par_chunks(sample_dims)
            .with_min_len(work_packet_size)
            .zip(state.assignments.par_iter_mut())
            .zip(state.centroid_distances.par_iter_mut())
            .for_each(|((s, assignment), centroid_dist)| {
                // min_by keeps the first minimum, so distance ties break towards the
                // lowest cluster index
                let (best_idx, best_dist) = centroids.chunks_exact(sample_dims).take(k)
                    .map(|c| {
                        s.iter()
                            .zip(c.iter())
                            .map(|(&sv, &cv)| { let d = sv - cv; d * d })
                            .sum::<T>()
                    }).enumerate()
                    .min_by(|(_, d0), (_, d1)| d0.partial_cmp(d1).unwrap()).unwrap();
                *assignment = best_idx;
                *centroid_dist = best_dist;
            });
    }

    pub(crate) fn update_cluster_frequencies(&self, assignments: &[usize], centroid_frequency: &mut [usize]) -> usize {
        centroid_frequency.iter_mut().for_each(|v| *v = 0);
        let mut used_centroids_cnt = 0;
        assignments.iter().cloned()
            .for_each(|centroid_id| {
                if centroid_frequency[centroid_id] == 0 {
                    used_centroids_cnt += 1; // Count the amount of centroids with more than 0 samples
                }
                centroid_frequency[centroid_id] += 1;
            });
        used_centroids_cnt
    }

    /// Fit a **k**-component Gaussian mixture to the samples.
    ///
    /// Runs a k-means pass (Lloyd's algorithm) to seed the component means, then alternates
    /// E-steps and M-steps until the data log-likelihood stabilizes per the configured
    /// [`ConvergenceCriterion`], or the iteration cap is reached.
    ///
    /// ## Arguments
    /// - **k**: Amount of mixture components to fit
    /// - **init**: Initialization method to use for the k-means seeding phase
    /// - **config**: [`GmmConfig`] instance, containing several configuration options for the calculation
    ///
    /// ## Returns
    /// Instance of [`FitResult`], containing the fitted parameters, the responsibility matrix,
    /// the log-likelihood trace and the convergence status.
    ///
    /// ## Example
    /// ```rust
    /// use gmix::*;
    ///
    /// let (sample_cnt, sample_dims, k) = (300, 2, 3);
    ///
    /// // Generate some random data
    /// let mut samples = vec![0.0f64; sample_cnt * sample_dims];
    /// samples.iter_mut().for_each(|v| *v = rand::random());
    ///
    /// let gmm = GaussianMixture::new(samples, sample_cnt, sample_dims).unwrap();
    /// let result = gmm.fit(k, GaussianMixture::init_kmeanplusplus, &GmmConfig::default()).unwrap();
    ///
    /// println!("Weights: {:?}", result.components.iter().map(|c| c.weight).collect::<Vec<_>>());
    /// println!("Log-likelihood: {}", result.likelihood_trace.last().unwrap());
    /// ```
    pub fn fit<'a, F>(&self, k: usize, init: F, config: &GmmConfig<'a, T>) -> Result<FitResult<T>>
            where for<'c> F: FnOnce(&GaussianMixture<T>, &mut KMeansState<T>, &GmmConfig<'c, T>) -> Result<()> {
        crate::variants::EmEngine::calculate(self, k, init, config)
    }

    /// Run only the k-means seeding phase (Lloyd's algorithm) and return its final state.
    ///
    /// Rounds alternate nearest-centroid assignment and centroid re-estimation; empty clusters
    /// are reseeded with far-out samples, a round that worsens the total distortion is rolled
    /// back, and the iteration stops on a stable assignment or after **max_iter** rounds.
    ///
    /// ## Arguments
    /// - **k**: Amount of clusters to search for
    /// - **max_iter**: Limit on the amount of rounds
    /// - **init**: Initialization method to use for the centroids
    /// - **config**: [`GmmConfig`] instance, containing several configuration options for the calculation
    pub fn kmeans<'a, F>(&self, k: usize, max_iter: usize, init: F, config: &GmmConfig<'a, T>) -> Result<KMeansState<T>>
            where for<'c> F: FnOnce(&GaussianMixture<T>, &mut KMeansState<T>, &GmmConfig<'c, T>) -> Result<()> {
        crate::variants::Lloyd::calculate(self, k, max_iter, init, config)
    }

    /// K-Means++ initialization method
    ///
    /// ## Description
    /// This initialization method starts by selecting one sample as first centroid.
    /// Proceeding from there, the method iteratively selects one new centroid (per iteration)
    /// by drawing a sample with probability proportional to its squared distance to the
    /// nearest already-selected centroid. This leads to a tendency of selecting centroids
    /// that are far away from each other.
    ///
    /// ## Note
    /// This method is not meant for direct invocation. Pass a reference to it to
    /// [`GaussianMixture::fit`] or [`GaussianMixture::kmeans`].
    pub fn init_kmeanplusplus<'a>(gmm: &GaussianMixture<T>, state: &mut KMeansState<T>, config: &GmmConfig<'a, T>) -> Result<()> {
        crate::inits::kmeanplusplus::calculate(gmm, state, config)
    }

    /// Random sample initialization method (a.k.a. Forgy)
    ///
    /// ## Description
    /// This initialization method randomly selects k distinct samples as initial centroids.
    ///
    /// ## Note
    /// This method is not meant for direct invocation. Pass a reference to it to
    /// [`GaussianMixture::fit`] or [`GaussianMixture::kmeans`].
    pub fn init_random_sample<'a>(gmm: &GaussianMixture<T>, state: &mut KMeansState<T>, config: &GmmConfig<'a, T>) -> Result<()> {
        crate::inits::randomsample::calculate(gmm, state, config)
    }

    /// Caller-supplied centroid initialization
    ///
    /// ## Description
    /// Uses the passed row-major K×M **centroids** array verbatim as starting centroids.
    /// The array length has to match `k * sample_dims`, otherwise the run aborts with
    /// [`GmmError::SizeMismatch`].
    pub fn init_precomputed<'a>(centroids: Vec<T>) -> impl for<'c> Fn(&GaussianMixture<T>, &mut KMeansState<T>, &GmmConfig<'c, T>) -> Result<()> {
        move |gmm, state, config| crate::inits::precomputed::calculate(gmm, state, config, &centroids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_is_rejected() {
        assert!(matches!(
            GaussianMixture::<f64>::new(vec![], 0, 1),
            Err(GmmError::MalformedInput { .. })
        ));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            GaussianMixture::<f64>::new(vec![], 3, 0),
            Err(GmmError::MalformedInput { .. })
        ));
    }

    #[test]
    fn inconsistent_buffer_length_is_rejected() {
        match GaussianMixture::<f64>::new(vec![0.0; 5], 3, 2) {
            Err(GmmError::SizeMismatch { expected: 6, actual: 5, .. }) => {}
            other => panic!("expected SizeMismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn cluster_count_is_validated() {
        let gmm = GaussianMixture::new(vec![0.0f64, 1.0, 2.0], 3, 1).unwrap();
        let conf = GmmConfig::default();
        assert!(matches!(
            gmm.fit(0, GaussianMixture::init_random_sample, &conf),
            Err(GmmError::ClusterCountOutOfRange { k: 0, n: 3 })
        ));
        assert!(matches!(
            gmm.fit(4, GaussianMixture::init_random_sample, &conf),
            Err(GmmError::ClusterCountOutOfRange { k: 4, n: 3 })
        ));
    }

    #[test]
    fn cluster_assignments_break_ties_to_lowest_index() {
        let gmm = GaussianMixture::new(vec![5.0f64], 1, 1).unwrap();
        let mut state = KMeansState::new(1, 1, 2);
        // both centroids equally far away
        state.centroids = vec![4.0, 6.0];
        gmm.update_cluster_assignments(&mut state, None);
        assert_eq!(state.assignments, vec![0]);
        assert_approx_eq!(state.centroid_distances[0], 1.0, 1e-12);
    }

    #[test]
    fn cluster_frequencies_count_used_centroids() {
        let gmm = GaussianMixture::new(vec![0.0f64, 1.0, 2.0, 3.0], 4, 1).unwrap();
        let mut freq = vec![0usize; 3];
        let used = gmm.update_cluster_frequencies(&[0, 0, 2, 2], &mut freq);
        assert_eq!(used, 2);
        assert_eq!(freq, vec![2, 0, 2]);
    }
}
