use crate::errors::Result;
use crate::primitive::Primitive;
use crate::{GaussianMixture, GmmConfig, KMeansState};
use rand::prelude::*;
use std::ops::DerefMut;

pub fn calculate<'a, T: Primitive>(gmm: &GaussianMixture<T>, state: &mut KMeansState<T>, config: &GmmConfig<'a, T>) -> Result<()> {
    gmm.samples.chunks_exact(gmm.sample_dims)
        .choose_multiple(config.rnd.borrow_mut().deref_mut(), state.k).iter().cloned()
        .enumerate()
        .for_each(|(ci, c)| { // Copy randomly chosen centroids into state.centroids
            state.set_centroid_from_iter(ci, c.iter().cloned());
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroids_are_distinct_samples() {
        let gmm = GaussianMixture::new(vec![1.0f64, 2.0, 3.0], 3, 1).unwrap();
        let mut state = KMeansState::new(3, 1, 3);
        let conf = GmmConfig::build().random_generator(StdRng::seed_from_u64(1)).build();

        calculate(&gmm, &mut state, &conf).unwrap();

        let mut centroids = state.centroids.clone();
        centroids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(centroids, vec![1.0, 2.0, 3.0]);
    }
}
