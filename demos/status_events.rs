use gmix::*;

fn main() {
    let (sample_cnt, sample_dims, k) = (2000, 2, 4);

    // Generate some random data
    let mut samples = vec![0.0f64; sample_cnt * sample_dims];
    samples.iter_mut().for_each(|v| *v = rand::random());

    let conf = GmmConfig::build()
        .kmeans_done(&|s| println!("Seeding completed. Distortion: {:.4}", s.distsum))
        .iteration_done(&|_, nr, log_likelihood|
            println!("Iteration {} - Log-Likelihood: {:.4}", nr, log_likelihood))
        .build();

    let gmm = GaussianMixture::new(samples, sample_cnt, sample_dims).unwrap();
    let result = gmm.fit(k, GaussianMixture::init_random_sample, &conf).unwrap();

    println!("Weights: {:?}", result.components.iter().map(|c| c.weight).collect::<Vec<_>>());
    println!("Converged: {:?} after {} iterations", result.convergence, result.iterations);
}
