pub mod monte_carlo;
pub mod rng;
pub mod uncertainty;
