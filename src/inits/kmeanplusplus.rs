use crate::errors::Result;
use crate::primitive::Primitive;
use crate::{GaussianMixture, GmmConfig, KMeansState};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use std::ops::DerefMut;

pub fn calculate<'a, T: Primitive>(gmm: &GaussianMixture<T>, state: &mut KMeansState<T>, config: &GmmConfig<'a, T>) -> Result<()> {
    let sample_dims = gmm.sample_dims;
    {
        // Randomly select first centroid
        let first_idx = config.rnd.borrow_mut().gen_range(0..gmm.sample_cnt);
        state.set_centroid_from_iter(0, gmm.samples[first_idx * sample_dims..(first_idx + 1) * sample_dims].iter().cloned());
    }
    for k in 1..state.k {
        // For each following centroid...
        // Calculate distances & update cluster-assignments against the centroids selected so far
        gmm.update_cluster_assignments(state, Some(k));
        let distsum: T = state.centroid_distances.iter().cloned().sum();

        // Draw the next centroid with probability proportional to each sample's squared
        // distance to its nearest already-selected centroid. When every sample coincides
        // with a selected centroid, all weights vanish; fall back to a uniform draw then.
        let sampled_centroid_id = match WeightedIndex::new(state.centroid_distances.iter().cloned()) {
            Ok(index) if distsum > T::zero() => index.sample(config.rnd.borrow_mut().deref_mut()),
            _ => config.rnd.borrow_mut().gen_range(0..gmm.sample_cnt),
        };
        state.set_centroid_from_iter(k, gmm.samples[sampled_centroid_id * sample_dims..(sampled_centroid_id + 1) * sample_dims].iter().cloned());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_far_apart_centroids() {
        // With only two distinct locations, the second draw has all of its probability
        // mass on the location not yet selected
        let gmm = GaussianMixture::new(vec![0.0f64, 100.0], 2, 1).unwrap();
        let mut state = KMeansState::new(2, 1, 2);
        let conf = GmmConfig::build().random_generator(StdRng::seed_from_u64(1)).build();

        calculate(&gmm, &mut state, &conf).unwrap();

        let mut centroids = state.centroids.clone();
        centroids.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(centroids, vec![0.0, 100.0]);
    }

    #[test]
    fn identical_samples_fall_back_to_uniform_draw() {
        let gmm = GaussianMixture::new(vec![5.0f64; 4], 4, 1).unwrap();
        let mut state = KMeansState::new(4, 1, 2);
        let conf = GmmConfig::build().random_generator(StdRng::seed_from_u64(1)).build();

        calculate(&gmm, &mut state, &conf).unwrap();
        assert_eq!(state.centroids, vec![5.0, 5.0]);
    }
}
