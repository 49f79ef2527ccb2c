use crate::primitive::Primitive;

/// Enum with possible convergence criteria.
/// A criterion decides, based on the log-likelihood trace, when the EM iteration has stabilized.
pub enum ConvergenceCriterion<T: Primitive> {
	/// Converged once the absolute change between the two latest log-likelihood
	/// values drops to the threshold (`|L_i - L_{i-1}| <= epsilon`).
	/// ## Fields:
	/// - **epsilon**: Threshold for the absolute log-likelihood change
	AbsoluteDelta { epsilon: T },
	/// Converged once the change relative to the previous log-likelihood drops to the
	/// threshold (`|L_i - L_{i-1}| <= epsilon * |L_{i-1}|`).
	/// ## Fields:
	/// - **epsilon**: Threshold for the relative log-likelihood change
	RelativeDelta { epsilon: T }
}
impl<T: Primitive> ConvergenceCriterion<T> {
	pub(crate) fn create_logic(&self) -> Box<dyn ConvergenceLogic<T>> {
		match *self {
			ConvergenceCriterion::AbsoluteDelta{epsilon} => Box::new(AbsoluteDeltaLogic {
				epsilon,
				prev_likelihood: None
			}),
			ConvergenceCriterion::RelativeDelta{epsilon} => Box::new(RelativeDeltaLogic {
				epsilon,
				prev_likelihood: None
			})
		}
	}
}

pub(crate) trait ConvergenceLogic<T: Primitive> {
	/// Function that has to be called once per completed EM iteration, with the freshly
	/// appended log-likelihood value.
	/// ## Arguments
	/// - **log_likelihood**: The data log-likelihood after the iteration
	/// ## Returns
	/// - **true** if the iteration should continue
	/// - **false** if the iteration has converged
	fn next(&mut self, log_likelihood: T) -> bool;
}


pub(crate) struct AbsoluteDeltaLogic<T: Primitive> {
	epsilon: T,
	prev_likelihood: Option<T>
}
impl<T: Primitive> ConvergenceLogic<T> for AbsoluteDeltaLogic<T> {
	fn next(&mut self, log_likelihood: T) -> bool {
		let delta = self.prev_likelihood.map(|prev| (log_likelihood - prev).abs());
		self.prev_likelihood = Some(log_likelihood);
		match delta {
			Some(delta) => delta > self.epsilon,
			None => true // first iteration, nothing to compare against
		}
	}
}


pub(crate) struct RelativeDeltaLogic<T: Primitive> {
	epsilon: T,
	prev_likelihood: Option<T>
}
impl<T: Primitive> ConvergenceLogic<T> for RelativeDeltaLogic<T> {
	fn next(&mut self, log_likelihood: T) -> bool {
		let result = match self.prev_likelihood {
			Some(prev) if prev != T::zero() => (log_likelihood - prev).abs() > self.epsilon * prev.abs(),
			Some(prev) => (log_likelihood - prev).abs() > self.epsilon,
			None => true
		};
		self.prev_likelihood = Some(log_likelihood);
		result
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test] fn test_absolute_delta_f32() { test_absolute_delta::<f32>(); }
	#[test] fn test_absolute_delta_f64() { test_absolute_delta::<f64>(); }

	fn test_absolute_delta<T: Primitive>() {
		{
			let mut logic = ConvergenceCriterion::AbsoluteDelta { epsilon: T::from(0.0005).unwrap() }.create_logic();
			assert_eq!(logic.next( T::from(-3000.0).unwrap() ), true);
			assert_eq!(logic.next( T::from(-3000.0).unwrap() ), false);
		}
		{
			let mut logic = ConvergenceCriterion::AbsoluteDelta { epsilon: T::from(0.0005).unwrap() }.create_logic();
			assert_eq!(logic.next( T::from(-3000.0).unwrap() ), true);
			assert_eq!(logic.next( T::from(-2999.99959).unwrap() ), false);
		}
		{
			let mut logic = ConvergenceCriterion::AbsoluteDelta { epsilon: T::from(0.0005).unwrap() }.create_logic();
			assert_eq!(logic.next( T::from(-3000.0).unwrap() ), true);
			assert_eq!(logic.next( T::from(-2999.99935).unwrap() ), true);
		}
		{
			let mut logic = ConvergenceCriterion::AbsoluteDelta { epsilon: T::from(0.0005).unwrap() }.create_logic();
			assert_eq!(logic.next( T::from(-3000.0).unwrap() ), true);
			assert_eq!(logic.next( T::from(-2000.0).unwrap() ), true);
			assert_eq!(logic.next( T::from(-1999.99).unwrap() ), true);
			assert_eq!(logic.next( T::from(-1999.98999999).unwrap() ), false);
		}
	}

	#[test] fn test_relative_delta_f64() { test_relative_delta::<f64>(); }

	fn test_relative_delta<T: Primitive>() {
		{
			let mut logic = ConvergenceCriterion::RelativeDelta { epsilon: T::from(1e-4).unwrap() }.create_logic();
			assert_eq!(logic.next( T::from(-1000.0).unwrap() ), true);
			// |ΔL| = 1.0 > 1e-4 * 1000
			assert_eq!(logic.next( T::from(-999.0).unwrap() ), true);
			// |ΔL| = 0.05 < 1e-4 * 999
			assert_eq!(logic.next( T::from(-998.95).unwrap() ), false);
		}
		{
			// zero previous likelihood falls back to the absolute comparison
			let mut logic = ConvergenceCriterion::RelativeDelta { epsilon: T::from(1e-4).unwrap() }.create_logic();
			assert_eq!(logic.next( T::zero() ), true);
			assert_eq!(logic.next( T::from(1.0).unwrap() ), true);
		}
	}
}
