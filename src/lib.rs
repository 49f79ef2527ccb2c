//! # gmix - API documentation
//!
//! Gmix is a small rust library for fitting Gaussian mixture models via
//! expectation-maximization (EM), seeded with k-means clustering.
//!
//! ## Design target
//! The main target is a plain, predictable API-surface: samples are given using a raw
//! row-major vector, fitted parameters come back as [`nalgebra`] vectors/matrices, and
//! the per-phase loops are parallelized with [`rayon`].
//!
//! ## Fitting pipeline
//! A fit runs in two phases. First, a k-means pass (Lloyd's algorithm) places the
//! component means; the centroid initialization method for that pass is chosen by the
//! caller. Second, the EM iteration alternates expectation steps (computing the
//! responsibility of every component for every sample) and maximization steps
//! (re-estimating weights, means and covariances from those responsibilities) until the
//! data log-likelihood stabilizes.
//!
//! ## Supported centroid initializations
//! The outcome of each run depends on the initialization of the seeding phase. For a
//! list of implemented initialization methods, see [`GaussianMixture`].
//!
//! ## Supported primitive types
//! - [`f32`]
//! - [`f64`]
//!
//! ## Example
//! ```rust
//! use gmix::*;
//!
//! fn main() {
//!     let (sample_cnt, sample_dims, k) = (300, 2, 3);
//!
//!     // Generate some random data
//!     let mut samples = vec![0.0f64; sample_cnt * sample_dims];
//!     samples.iter_mut().for_each(|v| *v = rand::random());
//!
//!     // Fit the mixture, using kmean++ as seeding initialization-method
//!     let gmm = GaussianMixture::new(samples, sample_cnt, sample_dims).unwrap();
//!     let result = gmm.fit(k, GaussianMixture::init_kmeanplusplus, &GmmConfig::default()).unwrap();
//!
//!     println!("Weights: {:?}", result.components.iter().map(|c| c.weight).collect::<Vec<_>>());
//!     println!("Component-Assignments: {:?}", result.assignments);
//!     println!("Log-Likelihood: {}", result.likelihood_trace.last().unwrap());
//! }
//! ```
//!
//! ## Example (using the status event callbacks)
//! ```rust
//! use gmix::*;
//!
//! fn main() {
//!     let (sample_cnt, sample_dims, k) = (300, 2, 3);
//!
//!     // Generate some random data
//!     let mut samples = vec![0.0f64; sample_cnt * sample_dims];
//!     samples.iter_mut().for_each(|v| *v = rand::random());
//!
//!     let conf = GmmConfig::build()
//!         .kmeans_done(&|s| println!("Seeding completed. Distortion: {}", s.distsum))
//!         .iteration_done(&|_, nr, log_likelihood|
//!             println!("Iteration {} - Log-Likelihood: {:.4}", nr, log_likelihood))
//!         .build();
//!
//!     let gmm = GaussianMixture::new(samples, sample_cnt, sample_dims).unwrap();
//!     let result = gmm.fit(k, GaussianMixture::init_random_sample, &conf).unwrap();
//!
//!     println!("Converged: {:?}", result.convergence);
//! }
//! ```
//!
//! ## Short API-Overview / Description
//! Entry-point of the library is the [`GaussianMixture`] struct. This struct is generic
//! over the underlying primitive type that should be used for the calculations. To use it,
//! an instance of this struct is created, taking the sample data into its ownership.
//!
//! Calling [`GaussianMixture::fit`] on the struct does not mutate it, so multiple runs can
//! be done in parallel (the algorithm itself is already parallelized though). The fit
//! returns a [`FitResult`] carrying the mixture components, the full responsibility matrix,
//! the log-likelihood trace and a [`Convergence`] tag telling whether the convergence
//! criterion fired before the iteration cap.
//!
//! The supported centroid initialization-method implementations are static methods within
//! the [`GaussianMixture`] struct, which are simply passed in as reference.

#[macro_use] mod helpers;
mod api;
mod convergence;
mod errors;
mod inits;
mod linalg;
mod primitive;
mod variants;

pub use api::{
    Component, Convergence, DegeneratePolicy, FitResult, GaussianMixture, GmmConfig, GmmConfigBuilder,
    IterationDoneCallbackFn, KMeansDoneCallbackFn, KMeansState,
};
pub use convergence::ConvergenceCriterion;
pub use errors::{GmmError, Result};
pub use linalg::GaussianDensity;
pub use primitive::Primitive;
