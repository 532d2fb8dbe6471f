use crate::data::handler::combined_hash;
use crate::data::DataHandler;
use crate::error::Result;
use crate::mutator::Rng;
use crate::program::Program;
use crate::program::ProgramEngine;
use crate::DataHash;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

/// one observed program execution: which program, on which data
/// snapshot, producing which bid.
pub struct Recording {
    pub program: Arc<Program>,
    pub data_hash: DataHash,
    pub result: f64,
}

/// a bounded FIFO of program executions on historical inputs.
///
/// mutation consults the archive to reject candidates whose outputs
/// are indistinguishable from an already-seen program on every
/// recorded snapshot; without this check the population drifts into
/// behavioral clones. the archive owns a deep copy of each distinct
/// data-source snapshot, taken lazily the first time its hash shows
/// up, so candidates can be replayed long after the live sources have
/// moved on.
///
/// archiving is stochastic but deterministic: whether a recording is
/// kept depends only on the archive's own RNG, which callers reseed
/// before every parallelizable block.
pub struct Archive {
    max_size: usize,
    archiving_probability: f64,
    rng: Rng,
    recordings: VecDeque<Recording>,
    data_handlers: BTreeMap<DataHash, Vec<Box<dyn DataHandler>>>,
    per_program: BTreeMap<usize, Vec<(DataHash, f64)>>,
}

/// program identity is pointer identity: recordings keep their program
/// alive, so a key can never be recycled while referenced.
fn key(program: &Arc<Program>) -> usize {
    Arc::as_ptr(program) as usize
}

impl Archive {
    pub fn new(max_size: usize, archiving_probability: f64, seed: u64) -> Self {
        Self {
            max_size,
            archiving_probability,
            rng: Rng::from_seed(seed),
            recordings: VecDeque::new(),
            data_handlers: BTreeMap::new(),
            per_program: BTreeMap::new(),
        }
    }

    /// reseed the archiving RNG. call before entering every
    /// parallelizable evaluation block to pin which recordings land.
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng.set_seed(seed);
    }

    /// record a program execution with probability
    /// `archiving_probability`, or unconditionally when forced.
    ///
    /// the probability draw happens before any duplicate check so the
    /// RNG stream advances identically whether or not the recording is
    /// ultimately kept. at capacity the oldest recording is evicted,
    /// and a data snapshot no recording references anymore is dropped
    /// with it.
    pub fn add_recording(
        &mut self,
        program: &Arc<Program>,
        sources: &[&dyn DataHandler],
        result: f64,
        forced: bool,
    ) {
        if !forced && !self.rng.flip(self.archiving_probability) {
            return;
        }
        let hash = combined_hash(sources);
        if self.is_recording_existing(hash, program) {
            return;
        }
        self.data_handlers
            .entry(hash)
            .or_insert_with(|| sources.iter().map(|s| s.clone_handler()).collect());
        self.per_program
            .entry(key(program))
            .or_default()
            .push((hash, result));
        self.recordings.push_back(Recording {
            program: program.clone(),
            data_hash: hash,
            result,
        });
        while self.recordings.len() > self.max_size {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let Some(oldest) = self.recordings.pop_front() else {
            return;
        };
        let k = key(&oldest.program);
        if let Some(entries) = self.per_program.get_mut(&k) {
            if let Some(at) = entries.iter().position(|(h, _)| *h == oldest.data_hash) {
                entries.remove(at);
            }
            if entries.is_empty() {
                self.per_program.remove(&k);
            }
        }
        let referenced = self
            .recordings
            .iter()
            .any(|r| r.data_hash == oldest.data_hash);
        if !referenced {
            self.data_handlers.remove(&oldest.data_hash);
        }
    }

    /// whether a snapshot with this hash is held.
    pub fn has_data_handlers(&self, hash: DataHash) -> bool {
        self.data_handlers.contains_key(&hash)
    }

    /// whether this exact (snapshot, program) pair is already recorded.
    pub fn is_recording_existing(&self, hash: DataHash, program: &Arc<Program>) -> bool {
        self.per_program
            .get(&key(program))
            .is_some_and(|entries| entries.iter().any(|(h, _)| *h == hash))
    }

    /// whether the given per-snapshot results are distinguishable from
    /// every archived program.
    ///
    /// a collision is an archived program for which no common snapshot
    /// separates the two result sets by more than tau; a program with
    /// no common snapshot at all cannot be told apart either, and
    /// counts as a collision.
    pub fn are_program_results_unique(
        &self,
        results: &BTreeMap<DataHash, f64>,
        tau: f64,
    ) -> bool {
        for entries in self.per_program.values() {
            let distinguished = entries.iter().any(|(hash, archived)| {
                results
                    .get(hash)
                    .is_some_and(|candidate| (candidate - archived).abs() > tau)
            });
            if !distinguished {
                return false;
            }
        }
        true
    }

    /// replay a program against every held snapshot and collect its
    /// results per snapshot hash.
    pub fn replay(&self, engine: &mut ProgramEngine, program: &Arc<Program>) -> Result<BTreeMap<DataHash, f64>> {
        let mut results = BTreeMap::new();
        engine.set_program(program.clone())?;
        for (hash, snapshot) in self.data_handlers.iter() {
            let sources: Vec<&dyn DataHandler> =
                snapshot.iter().map(|s| s.as_ref()).collect();
            results.insert(*hash, engine.execute(&sources, true)?);
        }
        Ok(results)
    }

    pub fn nb_recordings(&self) -> usize {
        self.recordings.len()
    }

    pub fn nb_data_handlers(&self) -> usize {
        self.data_handlers.len()
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    pub fn data_handlers(&self) -> &BTreeMap<DataHash, Vec<Box<dyn DataHandler>>> {
        &self.data_handlers
    }

    pub fn clear(&mut self) {
        self.recordings.clear();
        self.data_handlers.clear();
        self.per_program.clear();
    }

    /// fold per-job archives, given in ascending job order, into this
    /// one, keeping only the tail-most `max_size` recordings.
    ///
    /// the walk is deterministic: find the suffix of archives whose
    /// recordings fill the capacity, skip the overflowing prefix of the
    /// first of them, then force-insert everything that remains in
    /// order. identical seeds therefore produce identical archives
    /// regardless of how many workers filled the per-job ones.
    pub fn merge(&mut self, archives: Vec<Archive>) {
        let mut total = 0usize;
        let mut start = archives.len();
        while start > 0 && total < self.max_size {
            start -= 1;
            total += archives[start].recordings.len();
        }
        let mut skip = total.saturating_sub(self.max_size);
        for archive in archives.into_iter().skip(start) {
            for recording in archive.recordings.iter() {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                let snapshot = archive
                    .data_handlers
                    .get(&recording.data_hash)
                    .expect("every recording references a held snapshot");
                let sources: Vec<&dyn DataHandler> =
                    snapshot.iter().map(|s| s.as_ref()).collect();
                self.add_recording(&recording.program, &sources, recording.result, true);
            }
        }
    }
}
