pub mod params;
pub mod program;
pub mod rng;
pub mod team;

pub use params::MutationParameters;
pub use rng::Rng;
