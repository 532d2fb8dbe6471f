use crate::data::DataHandler;
use crate::ActionId;
use crate::Score;

/// what an evaluation is for; environments may e.g. hold back a
/// validation split or fix their stochasticity per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningMode {
    Training,
    Validation,
    Testing,
}

/// the world a policy is trained against.
///
/// the agent only ever sees an environment through this surface:
/// typed data sources for the programs to read, a discrete action
/// interface, a terminal flag and a score. environments that can be
/// cloned cheaply should say so through `is_copyable`/`copied`, which
/// is what unlocks parallel evaluation; the clone must carry the same
/// data-source identities as the original so that programs encoded
/// against one run against the other.
pub trait LearningEnvironment: Send + Sync {
    /// restore the environment to a starting state derived from the
    /// seed. called before every evaluation iteration.
    fn reset(&mut self, seed: u64, mode: LearningMode, iteration: u64, generation: u64);

    /// whether `copied` returns a usable private copy.
    fn is_copyable(&self) -> bool {
        false
    }

    /// a private copy for a worker thread, when supported.
    fn copied(&self) -> Option<Self>
    where
        Self: Sized,
    {
        None
    }

    /// the typed views programs read the world through.
    fn data_sources(&self) -> Vec<&dyn DataHandler>;

    /// apply a single-class decision.
    fn do_action(&mut self, action: ActionId);

    /// apply one decision per action class. single-class environments
    /// get the default, which forwards the first class.
    fn do_actions(&mut self, actions: &[ActionId]) {
        self.do_action(actions[0]);
    }

    fn is_terminal(&self) -> bool;

    /// the score of the episode so far.
    fn score(&self) -> Score;

    /// number of available actions per action class.
    fn nb_actions(&self) -> Vec<u64>;

    /// default decision per action class, used when an inference
    /// leaves a class undecided.
    fn init_actions(&self) -> Vec<ActionId>;
}
