use nalgebra::RealField;
use num::NumCast;
use rand::distributions::uniform::SampleUniform;
use std::{
    fmt::{Debug, Display},
    iter::Sum,
    ops::AddAssign,
};

/// Floating-point primitive the whole calculation is generic over.
///
/// The bounds collect everything the crate needs in one place: nalgebra's
/// [`RealField`] for the matrix algebra and transcendental functions,
/// [`NumCast`] for constants, and [`SampleUniform`] for the random-sampling
/// based centroid initializations.
pub trait Primitive:
    RealField
    + NumCast
    + SampleUniform
    + Sum
    + for<'a> AddAssign<&'a Self>
    + Copy
    + Default
    + Display
    + Debug
    + Send
    + Sync
    + 'static
{
}
impl Primitive for f32 {}
impl Primitive for f64 {}
