//! Append-only log of objective values, one record per constraint evaluation.

/// Objective values of one evaluation.
///
/// Objectives are minimized, so the worst value is the largest one.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationRecord {
    pub stage: usize,
    /// Evaluation count within the stage, starting at 0.
    pub evaluation: usize,
    pub eta: f64,
    pub beta: f64,
    pub objective_values: Vec<f64>,
}

impl EvaluationRecord {
    pub fn worst(&self) -> f64 {
        self.objective_values
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn best(&self) -> f64 {
        self.objective_values
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn mean(&self) -> f64 {
        self.objective_values.iter().sum::<f64>() / self.objective_values.len() as f64
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationHistory {
    records: Vec<EvaluationRecord>,
}

impl EvaluationHistory {
    pub(crate) fn push(&mut self, record: EvaluationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvaluationRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&EvaluationRecord> {
        self.records.last()
    }

    pub fn stage(&self, stage: usize) -> impl Iterator<Item = &EvaluationRecord> {
        self.records
            .iter()
            .filter(move |record| record.stage == stage)
    }

    /// Worst objective per evaluation, for plotting.
    pub fn worst(&self) -> Vec<f64> {
        self.records.iter().map(EvaluationRecord::worst).collect()
    }

    pub fn mean(&self) -> Vec<f64> {
        self.records.iter().map(EvaluationRecord::mean).collect()
    }

    pub fn best(&self) -> Vec<f64> {
        self.records.iter().map(EvaluationRecord::best).collect()
    }
}

impl<'a> IntoIterator for &'a EvaluationHistory {
    type Item = &'a EvaluationRecord;
    type IntoIter = std::slice::Iter<'a, EvaluationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::history::{
        EvaluationHistory,
        EvaluationRecord,
    };

    fn record(stage: usize, evaluation: usize, objective_values: Vec<f64>) -> EvaluationRecord {
        EvaluationRecord {
            stage,
            evaluation,
            eta: 0.5,
            beta: 8.0,
            objective_values,
        }
    }

    #[test]
    fn it_summarizes_records() {
        let mut history = EvaluationHistory::default();
        history.push(record(0, 0, vec![-0.2, -0.6, -0.4]));
        history.push(record(0, 1, vec![-0.5, -0.7, -0.6]));
        history.push(record(1, 0, vec![-0.9]));

        assert_eq!(history.len(), 3);
        assert_eq!(history.worst(), vec![-0.2, -0.5, -0.9]);
        assert_eq!(history.best(), vec![-0.6, -0.7, -0.9]);
        assert!((history.mean()[0] + 0.4).abs() < 1e-12);
        assert_eq!(history.stage(0).count(), 2);
        assert_eq!(history.last().unwrap().stage, 1);
    }
}
