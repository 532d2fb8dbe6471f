use rand::rngs::SmallRng;
use rand::Rng as _;
use rand::SeedableRng;

/// the single randomness faucet of the engine.
///
/// every stochastic decision, mutation, archiving, job seeding, flows
/// through one of these, seeded explicitly. parallel blocks never
/// share one: the owning stream deals out child seeds up front and
/// each worker builds its own, which is what keeps parallel and
/// sequential runs byte-identical.
#[derive(Debug, Clone)]
pub struct Rng(SmallRng);

impl Default for Rng {
    fn default() -> Self {
        Self::from_seed(0)
    }
}

impl Rng {
    pub fn from_seed(seed: u64) -> Self {
        Self(SmallRng::seed_from_u64(seed))
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.0 = SmallRng::seed_from_u64(seed);
    }

    /// uniform draw in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.0.random::<f64>()
    }

    /// bernoulli trial with the given success probability.
    pub fn flip(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }

    /// uniform index in 0..n. n must be positive.
    pub fn below(&mut self, n: usize) -> usize {
        self.0.random_range(0..n)
    }

    /// uniform draw in the inclusive range.
    pub fn range_i32(&mut self, low: i32, high: i32) -> i32 {
        self.0.random_range(low..=high)
    }

    /// a fresh seed for a child stream.
    pub fn next_seed(&mut self) -> u64 {
        self.0.random::<u64>()
    }
}
