use thiserror::Error;

/// Error taxonomy of a mixture-model fit.
///
/// Reaching the EM iteration cap is deliberately *not* represented here; a
/// capped run still carries the best parameters found so far and is reported
/// through [`Convergence::IterationLimit`](crate::Convergence::IterationLimit).
#[derive(Debug, Error)]
pub enum GmmError {
    /// The dataset is unusable as a whole (empty, or inconsistently shaped).
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    /// The requested cluster count lies outside `1..=sample_cnt`.
    #[error("cluster count k={k} outside valid range [1, {n}]")]
    ClusterCountOutOfRange { k: usize, n: usize },

    /// Two operands of a linear-algebra operation disagree on dimensions.
    #[error("size mismatch in {context}: expected {expected}, got {actual}")]
    SizeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A component's covariance matrix has no inverse (zero determinant).
    #[error("covariance matrix of component {component} is singular")]
    SingularCovariance { component: usize },

    /// A component lost (almost) all of its responsibility mass.
    #[error("component {component} holds no responsibility mass")]
    DegenerateComponent { component: usize },

    /// A k-means cluster ended up without members and could not be reseeded.
    #[error("cluster {cluster} is empty and no donor sample was found")]
    EmptyCluster { cluster: usize },
}

pub type Result<T> = std::result::Result<T, GmmError>;
