use gmix::*;

fn main() {
    let (sample_cnt, sample_dims, k) = (2000, 2, 4);

    // Generate some random data
    let mut samples = vec![0.0f64; sample_cnt * sample_dims];
    samples.iter_mut().for_each(|v| *v = rand::random());

    // Fit the mixture, using kmean++ as seeding initialization-method
    let gmm = GaussianMixture::new(samples, sample_cnt, sample_dims).unwrap();
    let result = gmm.fit(k, GaussianMixture::init_kmeanplusplus, &GmmConfig::default()).unwrap();

    println!("Weights: {:?}", result.components.iter().map(|c| c.weight).collect::<Vec<_>>());
    println!("Means: {:?}", result.components.iter().map(|c| &c.mean).collect::<Vec<_>>());
    println!("Component-Assignments: {:?}", result.assignments);
    println!("Log-Likelihood: {}", result.likelihood_trace.last().unwrap());
    println!("Converged: {:?} after {} iterations", result.convergence, result.iterations);
}
