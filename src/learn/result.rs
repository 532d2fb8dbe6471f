use crate::Score;

/// a policy's evaluation: a scalar score and how many evaluation
/// iterations back it.
///
/// results merge as weighted means, so a partially evaluated root can
/// fold new iterations into its history without re-running the old
/// ones.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    result: Score,
    nb_evaluation: u64,
}

impl EvaluationResult {
    pub fn new(result: Score, nb_evaluation: u64) -> Self {
        Self { result, nb_evaluation }
    }

    pub fn result(&self) -> Score {
        self.result
    }

    pub fn nb_evaluation(&self) -> u64 {
        self.nb_evaluation
    }

    /// fold another result in, weighting each side by its evaluation
    /// count.
    pub fn combine(&mut self, other: &Self) {
        let total = self.nb_evaluation + other.nb_evaluation;
        if total == 0 {
            return;
        }
        self.result = (self.result * self.nb_evaluation as f64
            + other.result * other.nb_evaluation as f64)
            / total as f64;
        self.nb_evaluation = total;
    }
}

impl std::ops::AddAssign<&EvaluationResult> for EvaluationResult {
    fn add_assign(&mut self, other: &EvaluationResult) {
        self.combine(other);
    }
}

impl std::ops::DivAssign<f64> for EvaluationResult {
    fn div_assign(&mut self, divisor: f64) {
        self.result /= divisor;
    }
}

/// per-class evaluation of a classification policy: one balanced F1
/// score and one sample count per class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationEvaluationResult {
    score_per_class: Vec<Score>,
    nb_evaluation_per_class: Vec<u64>,
}

impl ClassificationEvaluationResult {
    pub fn new(score_per_class: Vec<Score>, nb_evaluation_per_class: Vec<u64>) -> Self {
        assert!(
            score_per_class.len() == nb_evaluation_per_class.len(),
            "one sample count per class score"
        );
        Self { score_per_class, nb_evaluation_per_class }
    }

    pub fn score_per_class(&self) -> &[Score] {
        &self.score_per_class
    }

    pub fn nb_evaluation_per_class(&self) -> &[u64] {
        &self.nb_evaluation_per_class
    }

    /// the general score: the unweighted mean of per-class scores, so
    /// rare classes count as much as common ones.
    pub fn result(&self) -> Score {
        match self.score_per_class.len() {
            0 => 0.0,
            n => self.score_per_class.iter().sum::<Score>() / n as f64,
        }
    }

    pub fn nb_evaluation(&self) -> u64 {
        self.nb_evaluation_per_class.iter().sum()
    }

    /// per-class weighted merge. both sides must score the same
    /// classes.
    pub fn combine(&mut self, other: &Self) {
        assert!(
            self.score_per_class.len() == other.score_per_class.len(),
            "class count mismatch between classification results"
        );
        for class in 0..self.score_per_class.len() {
            let ours = self.nb_evaluation_per_class[class];
            let theirs = other.nb_evaluation_per_class[class];
            let total = ours + theirs;
            if total == 0 {
                continue;
            }
            self.score_per_class[class] = (self.score_per_class[class] * ours as f64
                + other.score_per_class[class] * theirs as f64)
                / total as f64;
            self.nb_evaluation_per_class[class] = total;
        }
    }
}

impl std::ops::DivAssign<f64> for ClassificationEvaluationResult {
    fn div_assign(&mut self, divisor: f64) {
        for score in self.score_per_class.iter_mut() {
            *score /= divisor;
        }
    }
}

/// per-seat evaluation of an adversarial job: one score per seated
/// root, in seating order.
#[derive(Debug, Clone, PartialEq)]
pub struct AdversarialEvaluationResult {
    scores: Vec<Score>,
    nb_evaluation: u64,
}

impl AdversarialEvaluationResult {
    pub fn zeroed(nb_seats: usize) -> Self {
        Self { scores: vec![0.0; nb_seats], nb_evaluation: 0 }
    }

    pub fn from_scores(scores: Vec<Score>, nb_evaluation: u64) -> Self {
        Self { scores, nb_evaluation }
    }

    pub fn score_of(&self, seat: usize) -> Score {
        self.scores[seat]
    }

    pub fn nb_seats(&self) -> usize {
        self.scores.len()
    }

    pub fn nb_evaluation(&self) -> u64 {
        self.nb_evaluation
    }

    /// per-seat weighted merge.
    pub fn combine(&mut self, other: &Self) {
        assert!(
            self.scores.len() == other.scores.len(),
            "seat count mismatch between adversarial results"
        );
        let total = self.nb_evaluation + other.nb_evaluation;
        if total == 0 {
            return;
        }
        for seat in 0..self.scores.len() {
            self.scores[seat] = (self.scores[seat] * self.nb_evaluation as f64
                + other.scores[seat] * other.nb_evaluation as f64)
                / total as f64;
        }
        self.nb_evaluation = total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_a_weighted_mean() {
        let mut a = EvaluationResult::new(1.0, 2);
        a.combine(&EvaluationResult::new(4.0, 1));
        assert_eq!(a.result(), 2.0);
        assert_eq!(a.nb_evaluation(), 3);
    }

    #[test]
    fn chained_combines_match_prefolded_ones() {
        // (a += b) += c equals a += (b += c)
        let b = EvaluationResult::new(3.0, 2);
        let c = EvaluationResult::new(9.0, 4);
        let mut chained = EvaluationResult::new(1.0, 2);
        chained += &b;
        chained += &c;
        let mut prefolded = b.clone();
        prefolded += &c;
        let mut direct = EvaluationResult::new(1.0, 2);
        direct += &prefolded;
        assert!((chained.result() - direct.result()).abs() < 1e-12);
        assert_eq!(chained.nb_evaluation(), direct.nb_evaluation());
    }

    #[test]
    fn empty_results_absorb() {
        let mut zero = EvaluationResult::new(0.0, 0);
        zero.combine(&EvaluationResult::new(5.0, 3));
        assert_eq!(zero.result(), 5.0);
        assert_eq!(zero.nb_evaluation(), 3);
    }

    #[test]
    fn scalar_division_rescales_components() {
        let mut plain = EvaluationResult::new(6.0, 3);
        plain /= 2.0;
        assert_eq!(plain.result(), 3.0);
        assert_eq!(plain.nb_evaluation(), 3);
        let mut classed = ClassificationEvaluationResult::new(vec![1.0, 0.5], vec![2, 2]);
        classed /= 2.0;
        assert_eq!(classed.score_per_class(), &[0.5, 0.25]);
    }

    #[test]
    fn classification_general_score_is_the_class_mean() {
        let result =
            ClassificationEvaluationResult::new(vec![1.0, 0.0, 0.5], vec![10, 1, 4]);
        assert_eq!(result.result(), 0.5);
        assert_eq!(result.nb_evaluation(), 15);
    }

    #[test]
    fn classification_combines_class_by_class() {
        let mut a = ClassificationEvaluationResult::new(vec![1.0, 0.0], vec![1, 4]);
        let b = ClassificationEvaluationResult::new(vec![0.0, 1.0], vec![3, 4]);
        a.combine(&b);
        assert_eq!(a.score_per_class(), &[0.25, 0.5]);
        assert_eq!(a.nb_evaluation_per_class(), &[4, 8]);
    }

    #[test]
    #[should_panic(expected = "class count mismatch")]
    fn classification_rejects_mismatched_shapes() {
        let mut a = ClassificationEvaluationResult::new(vec![1.0], vec![1]);
        a.combine(&ClassificationEvaluationResult::new(vec![1.0, 2.0], vec![1, 1]));
    }

    #[test]
    fn adversarial_accumulates_per_seat() {
        let mut seats = AdversarialEvaluationResult::zeroed(3);
        seats.combine(&AdversarialEvaluationResult::from_scores(vec![1.0, 0.0, 0.0], 1));
        seats.combine(&AdversarialEvaluationResult::from_scores(vec![0.0, 1.0, 0.0], 1));
        assert_eq!(seats.score_of(0), 0.5);
        assert_eq!(seats.score_of(1), 0.5);
        assert_eq!(seats.score_of(2), 0.0);
        assert_eq!(seats.nb_evaluation(), 2);
    }
}
