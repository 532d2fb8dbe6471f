//! tiny environments for exercising the agents in tests.

use super::adversarial::AdversarialLearningEnvironment;
use super::classification::ClassificationLearningEnvironment;
use super::environment::LearningEnvironment;
use super::environment::LearningMode;
use crate::data::DataHandler;
use crate::data::PrimitiveArray;
use crate::mutator::Rng;
use crate::ActionId;
use crate::Score;

/// the misère stick game: players alternate removing 1 to 3 sticks
/// from a pile of 21, and whoever takes the last stick loses.
#[derive(Clone)]
pub struct StickGame {
    hints: PrimitiveArray,
    remaining: PrimitiveArray,
    turn: usize,
    winner: Option<usize>,
    nb_players: usize,
}

impl StickGame {
    pub const STICKS: f64 = 21.0;

    pub fn new(nb_players: usize) -> Self {
        Self {
            hints: PrimitiveArray::from_cells(vec![1.0, 2.0, 3.0]),
            remaining: PrimitiveArray::from_cells(vec![Self::STICKS]),
            turn: 0,
            winner: None,
            nb_players,
        }
    }

    fn sticks(&self) -> f64 {
        self.remaining.cell(0)
    }
}

impl LearningEnvironment for StickGame {
    fn reset(&mut self, _seed: u64, _mode: LearningMode, _iteration: u64, _generation: u64) {
        self.remaining.set(0, Self::STICKS);
        self.turn = 0;
        self.winner = None;
    }

    fn is_copyable(&self) -> bool {
        true
    }

    fn copied(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn data_sources(&self) -> Vec<&dyn DataHandler> {
        vec![&self.hints, &self.remaining]
    }

    fn do_action(&mut self, action: ActionId) {
        if self.winner.is_some() {
            return;
        }
        let take = (action + 1).min(self.sticks() as u64) as f64;
        self.remaining.set(0, self.sticks() - take);
        if self.sticks() == 0.0 {
            // taking the last stick loses
            self.winner = Some((self.turn + 1) % self.nb_players);
        }
        self.turn = (self.turn + 1) % self.nb_players;
    }

    fn is_terminal(&self) -> bool {
        self.winner.is_some()
    }

    fn score(&self) -> Score {
        match self.winner {
            Some(0) => 1.0,
            _ => 0.0,
        }
    }

    fn nb_actions(&self) -> Vec<u64> {
        vec![3]
    }

    fn init_actions(&self) -> Vec<ActionId> {
        vec![0]
    }
}

impl AdversarialLearningEnvironment for StickGame {
    fn scores(&self) -> Vec<Score> {
        (0..self.nb_players)
            .map(|player| match self.winner {
                Some(winner) if winner == player => 1.0,
                _ => 0.0,
            })
            .collect()
    }
}

/// a guessing game: each step shows one of `nb_symbols` values in the
/// data cell, and matching it scores a point. ends after a fixed
/// number of steps.
#[derive(Clone)]
pub struct NumberGuess {
    value: PrimitiveArray,
    rng: Rng,
    current: u64,
    steps: u64,
    hits: u64,
    nb_symbols: u64,
}

impl NumberGuess {
    pub const LENGTH: u64 = 10;

    pub fn new(nb_symbols: u64) -> Self {
        Self {
            value: PrimitiveArray::new(1),
            rng: Rng::from_seed(0),
            current: 0,
            steps: 0,
            hits: 0,
            nb_symbols,
        }
    }

    fn draw(&mut self) {
        self.current = self.rng.below(self.nb_symbols as usize) as u64;
        self.value.set(0, self.current as f64);
    }
}

impl LearningEnvironment for NumberGuess {
    fn reset(&mut self, seed: u64, _mode: LearningMode, _iteration: u64, _generation: u64) {
        self.rng.set_seed(seed);
        self.steps = 0;
        self.hits = 0;
        self.draw();
    }

    fn is_copyable(&self) -> bool {
        true
    }

    fn copied(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn data_sources(&self) -> Vec<&dyn DataHandler> {
        vec![&self.value]
    }

    fn do_action(&mut self, action: ActionId) {
        if action == self.current {
            self.hits += 1;
        }
        self.steps += 1;
        self.draw();
    }

    fn is_terminal(&self) -> bool {
        self.steps >= Self::LENGTH
    }

    fn score(&self) -> Score {
        self.hits as f64
    }

    fn nb_actions(&self) -> Vec<u64> {
        vec![self.nb_symbols]
    }

    fn init_actions(&self) -> Vec<ActionId> {
        vec![0]
    }
}

/// a fake dataset: the data cell shows the current class label
/// directly, and classifying is just echoing it back.
#[derive(Clone)]
pub struct FakeClassification {
    value: PrimitiveArray,
    table: Vec<Vec<u64>>,
    rng: Rng,
    current: usize,
    nb_classes: usize,
}

impl FakeClassification {
    pub fn new(nb_classes: usize) -> Self {
        Self {
            value: PrimitiveArray::new(1),
            table: vec![vec![0; nb_classes]; nb_classes],
            rng: Rng::from_seed(0),
            current: 0,
            nb_classes,
        }
    }

    fn draw(&mut self) {
        self.current = self.rng.below(self.nb_classes);
        self.value.set(0, self.current as f64);
    }
}

impl LearningEnvironment for FakeClassification {
    fn reset(&mut self, seed: u64, _mode: LearningMode, _iteration: u64, _generation: u64) {
        for row in self.table.iter_mut() {
            row.fill(0);
        }
        self.rng.set_seed(seed);
        self.draw();
    }

    fn is_copyable(&self) -> bool {
        true
    }

    fn copied(&self) -> Option<Self> {
        Some(self.clone())
    }

    fn data_sources(&self) -> Vec<&dyn DataHandler> {
        vec![&self.value]
    }

    fn do_action(&mut self, action: ActionId) {
        self.table[self.current][action as usize % self.nb_classes] += 1;
        self.draw();
    }

    fn is_terminal(&self) -> bool {
        false
    }

    fn score(&self) -> Score {
        let scored = super::classification::per_class_f1(&self.table);
        match scored.len() {
            0 => 0.0,
            n => scored.iter().map(|(f1, _)| f1).sum::<f64>() / n as f64,
        }
    }

    fn nb_actions(&self) -> Vec<u64> {
        vec![self.nb_classes as u64]
    }

    fn init_actions(&self) -> Vec<ActionId> {
        vec![0]
    }
}

impl ClassificationLearningEnvironment for FakeClassification {
    fn classification_table(&self) -> &Vec<Vec<u64>> {
        &self.table
    }

    fn current_class(&self) -> usize {
        self.current
    }
}
