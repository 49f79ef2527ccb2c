use crate::errors::{GmmError, Result};
use crate::primitive::Primitive;
use crate::{GaussianMixture, GmmConfig, KMeansState};
use log::debug;

/// Lloyd's algorithm, used as the seeding phase of a mixture-model fit.
///
/// Each round assigns every sample to its nearest centroid and re-estimates the
/// centroids as their cluster means. Empty clusters are reseeded with the sample
/// farthest from its assigned centroid, and a round that worsens the total
/// distortion is rolled back, so the distortion of accepted rounds is
/// monotonically non-increasing.
pub(crate) struct Lloyd<T: Primitive> {
    _p: std::marker::PhantomData<T>,
}
impl<T: Primitive> Lloyd<T> {
    fn update_centroids(data: &GaussianMixture<T>, state: &mut KMeansState<T>) -> Result<()> {
        let sample_dims = data.sample_dims;

        // Sum all samples in a cluster together into new_centroids, count non-empty clusters
        let mut new_centroids = vec![T::zero(); state.centroids.len()];
        let used_centroids_cnt = data.update_cluster_frequencies(&state.assignments, &mut state.centroid_frequency);
        for (s, &centroid_id) in data.samples.chunks_exact(sample_dims).zip(state.assignments.iter()) {
            new_centroids[centroid_id * sample_dims..(centroid_id + 1) * sample_dims].iter_mut()
                .zip(s.iter())
                .for_each(|(c, &sv)| *c += sv);
        }

        // When there are empty clusters, reseed them with bad samples
        if used_centroids_cnt != state.k {
            let mut distance_sorted_samples: Vec<usize> = (0..data.sample_cnt).collect();
            distance_sorted_samples.sort_unstable_by(
                |&i1, &i2| state.centroid_distances[i1].partial_cmp(&state.centroid_distances[i2]).unwrap());

            for i in 0..state.k {
                if state.centroid_frequency[i] != 0 {
                    continue;
                }
                // Find the sample with the highest distance to its centroid that is not
                // alone in its cluster
                let donor = distance_sorted_samples.iter().rev()
                    .map(|&sample_id| (sample_id, state.assignments[sample_id]))
                    .find(|&(_, prev_centroid_id)| state.centroid_frequency[prev_centroid_id] > 1);
                let (sample_id, prev_centroid_id) = match donor {
                    Some(found) => found,
                    None => return Err(GmmError::EmptyCluster { cluster: i }),
                };
                // Re-assign the found sample to the centroid without any samples.
                // new_centroids holds per-cluster coordinate sums here, so move the
                // sample's coordinates between the two sum slots.
                state.centroid_frequency[prev_centroid_id] -= 1;
                state.centroid_frequency[i] += 1;
                state.assignments[sample_id] = i;
                state.centroid_distances[sample_id] = T::zero();
                let sample = &data.samples[sample_id * sample_dims..(sample_id + 1) * sample_dims];
                new_centroids[prev_centroid_id * sample_dims..(prev_centroid_id + 1) * sample_dims].iter_mut()
                    .zip(sample.iter())
                    .for_each(|(cv, &sv)| *cv -= sv);
                new_centroids[i * sample_dims..(i + 1) * sample_dims].iter_mut()
                    .zip(sample.iter())
                    .for_each(|(cv, &sv)| *cv = sv);
            }
        }

        // Calculate new centroids from the accumulated sums and member counts
        state.centroids.chunks_exact_mut(sample_dims)
            .zip(new_centroids.chunks_exact(sample_dims))
            .zip(state.centroid_frequency.iter().cloned())
            .for_each(|((c, nc), cfreq)| {
                let cfreq = T::from(cfreq).unwrap();
                c.iter_mut().zip(nc.iter()).for_each(|(cv, &ncv)| *cv = ncv / cfreq);
            });
        Ok(())
    }

    pub fn calculate<'a, F>(data: &GaussianMixture<T>, k: usize, max_iter: usize, init: F, config: &GmmConfig<'a, T>) -> Result<KMeansState<T>>
                where for<'c> F: FnOnce(&GaussianMixture<T>, &mut KMeansState<T>, &GmmConfig<'c, T>) -> Result<()> {
        if k < 1 || k > data.sample_cnt {
            return Err(GmmError::ClusterCountOutOfRange { k, n: data.sample_cnt });
        }

        let mut state = KMeansState::new(data.sample_cnt, data.sample_dims, k);
        init(data, &mut state, config)?;

        // Snapshot of the last accepted round: (assignments, centroids, distsum)
        let mut accepted: Option<(Vec<usize>, Vec<T>, T)> = None;

        for i in 1..=max_iter {
            data.update_cluster_assignments(&mut state, None);
            let change_count = accepted.as_ref().map(|(prev_assignments, _, _)| {
                prev_assignments.iter().zip(state.assignments.iter()).filter(|(p, c)| p != c).count()
            });

            Self::update_centroids(data, &mut state)?;
            data.update_centroid_distances(&mut state);
            let new_distsum = state.centroid_distances.iter().cloned().sum::<T>();

            if let Some((prev_assignments, prev_centroids, prev_distsum)) = &accepted {
                if new_distsum > *prev_distsum {
                    // This round made things worse; go back to the previous assignments
                    // and centroids, then stop.
                    debug!("kmeans round {}: distortion regressed ({} -> {}), rolling back", i, prev_distsum, new_distsum);
                    state.assignments.copy_from_slice(prev_assignments);
                    state.centroids.copy_from_slice(prev_centroids);
                    let (assignments, centroid_frequency) = (&state.assignments, &mut state.centroid_frequency);
                    data.update_cluster_frequencies(assignments, centroid_frequency);
                    data.update_centroid_distances(&mut state);
                    state.distsum = *prev_distsum;
                    return Ok(state);
                }
            }
            state.distsum = new_distsum;
            debug!("kmeans round {}: distortion {}, {:?} membership changes", i, new_distsum, change_count);

            // Stable assignment means the iteration converged
            if change_count == Some(0) {
                break;
            }
            accepted = Some((state.assignments.clone(), state.centroids.clone(), new_distsum));
        }
        Ok(state)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::GmmConfig;

    #[test]
    fn two_separated_groups_converge() {
        let samples = vec![0.0f64, 1.0, 2.0, 10.0, 11.0, 12.0];
        let gmm = GaussianMixture::new(samples, 6, 1).unwrap();
        let conf = GmmConfig::default();
        let res = gmm.kmeans(2, 100, GaussianMixture::init_precomputed(vec![1.5, 10.5]), &conf).unwrap();

        assert_eq!(&res.assignments, &[0, 0, 0, 1, 1, 1]);
        assert_approx_eq!(res.centroids[0], 1.0, 1e-12);
        assert_approx_eq!(res.centroids[1], 11.0, 1e-12);
        assert_eq!(&res.centroid_frequency, &[3, 3]);
        assert_approx_eq!(res.distsum, 4.0, 1e-12);
    }

    #[test]
    fn caller_supplied_centroids_are_honored() {
        // With both starting centroids inside the left group, the right group must
        // still be discovered by the iteration, not by discarding the given start.
        let samples = vec![0.0f64, 1.0, 10.0, 11.0, 20.0, 21.0];
        let gmm = GaussianMixture::new(samples, 6, 1).unwrap();
        let conf = GmmConfig::default();
        let res = gmm.kmeans(2, 100, GaussianMixture::init_precomputed(vec![1.0, 11.0]), &conf).unwrap();

        assert_eq!(&res.assignments, &[0, 0, 1, 1, 1, 1]);
        assert_approx_eq!(res.centroids[0], 0.5, 1e-12);
        assert_approx_eq!(res.centroids[1], 15.5, 1e-12);
    }

    #[test]
    fn precomputed_centroid_length_is_checked() {
        let gmm = GaussianMixture::new(vec![0.0f64, 1.0, 2.0], 3, 1).unwrap();
        let conf = GmmConfig::default();
        assert!(matches!(
            gmm.kmeans(2, 100, GaussianMixture::init_precomputed(vec![0.0, 1.0, 2.0]), &conf),
            Err(GmmError::SizeMismatch { expected: 2, actual: 3, .. })
        ));
    }

    #[test]
    fn empty_cluster_handling() {
        let samples = vec![1.0f64, 0.0, 2.0, 0.0, 3.5, 0.0];
        let initial_centroids = vec![2.0, 0.0, 1337.0, 0.0];

        let gmm = GaussianMixture::new(samples, 3, 2).unwrap();
        let conf = GmmConfig::default();
        let res = gmm.kmeans(2, 1, GaussianMixture::init_precomputed(initial_centroids), &conf).unwrap();

        // Nobody is near the second centroid, so it gets reseeded with the farthest
        // sample (3.5, 0.0)
        assert_approx_eq!(res.distsum, 0.5, 1e-12);
        assert_eq!(&res.assignments, &[0, 0, 1]);
        assert_eq!(&res.centroids, &[1.5, 0.0, 3.5, 0.0]);
        assert_eq!(&res.centroid_frequency, &[2, 1]);
        assert_eq!(&res.centroid_distances, &[0.25, 0.25, 0.0]);
    }

    #[test]
    fn more_clusters_than_distinct_locations_terminates() {
        // Only two distinct coordinates but three clusters; reseeding has to kick in
        // and the run must end within the iteration cap.
        let samples = vec![1.0f64, 1.0, 1.0, 2.0, 2.0];
        let gmm = GaussianMixture::new(samples, 5, 1).unwrap();
        let conf = GmmConfig::default();
        let res = gmm.kmeans(3, 100, GaussianMixture::init_precomputed(vec![1.0, 1.0, 2.0]), &conf).unwrap();

        assert_eq!(res.centroid_frequency.iter().sum::<usize>(), 5);
        assert!(res.centroid_frequency.iter().all(|&f| f > 0));
        assert!(res.centroids.iter().all(|c| c.is_finite()));
        assert!(res.distsum >= 0.0);
    }

    #[test]
    fn distortion_is_monotonically_non_increasing() {
        let samples: Vec<f64> = (0..40).map(|i| (i * 7 % 13) as f64 + (i as f64) * 0.1).collect();
        let gmm = GaussianMixture::new(samples, 40, 1).unwrap();

        // The kmeans trace is not exposed, so track it through repeated capped runs with
        // identical seeding instead.
        let mut distsums = Vec::new();
        for max_iter in 1..=8 {
            let conf = GmmConfig::default();
            let res = gmm.kmeans(3, max_iter, GaussianMixture::init_precomputed(vec![0.0, 5.0, 10.0]), &conf).unwrap();
            distsums.push(res.distsum);
        }
        for pair in distsums.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-9, "distortion increased: {:?}", distsums);
        }
    }
}
