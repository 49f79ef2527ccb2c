use crate::errors::{GmmError, Result};
use crate::primitive::Primitive;
use crate::{GaussianMixture, GmmConfig, KMeansState};

pub fn calculate<'a, T: Primitive>(gmm: &GaussianMixture<T>, state: &mut KMeansState<T>, _config: &GmmConfig<'a, T>, computed: &[T]) -> Result<()> {
    let expected = state.k * gmm.sample_dims;
    if computed.len() != expected {
        return Err(GmmError::SizeMismatch { context: "precomputed centroids", expected, actual: computed.len() });
    }
    computed.chunks_exact(gmm.sample_dims).enumerate().for_each(|(ci, c)| {
        state.set_centroid_from_iter(ci, c.iter().cloned());
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroids_are_taken_verbatim() {
        let gmm = GaussianMixture::new(vec![0.0f64, 1.0, 10.0, 11.0], 2, 2).unwrap();
        let mut state = KMeansState::new(2, 2, 2);
        let conf = GmmConfig::default();

        calculate(&gmm, &mut state, &conf, &[0.5, 1.5, 9.5, 10.5]).unwrap();
        assert_eq!(state.centroids, vec![0.5, 1.5, 9.5, 10.5]);
    }

    #[test]
    fn wrong_length_is_rejected() {
        let gmm = GaussianMixture::new(vec![0.0f64, 1.0, 10.0, 11.0], 2, 2).unwrap();
        let mut state = KMeansState::new(2, 2, 2);
        let conf = GmmConfig::default();

        assert!(matches!(
            calculate(&gmm, &mut state, &conf, &[0.5, 1.5, 9.5]),
            Err(GmmError::SizeMismatch { expected: 4, actual: 3, .. })
        ));
    }
}
