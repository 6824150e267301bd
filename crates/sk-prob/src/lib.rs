//! Probability building blocks for skstan.
//!
//! Log-densities of the three likelihoods used by the regression families,
//! parameterised the way the linear predictor produces them:
//! - [`normal`]: identity link
//! - [`bernoulli`]: logit link
//! - [`poisson`]: log link
//!
//! plus small numerically-stable helpers in [`math`].

pub mod bernoulli;
pub mod math;
pub mod normal;
pub mod poisson;
