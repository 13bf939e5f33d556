//! Run accumulator
//!
//! `RunState` is the only structure shared across branches. Each branch index is
//! filled exactly once; merge order does not matter and reduction stages only
//! ever see the attempts sorted by branch index.

use std::collections::HashMap;

use super::attempt::Attempt;
use crate::domain::error::AccumulatorError;

/// Write-once map from branch index to attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    width: usize,
    attempts: HashMap<usize, Attempt>,
}

impl RunState {
    /// Create an empty state for a run with `width` branches
    pub fn new(width: usize) -> Self {
        Self {
            width,
            attempts: HashMap::with_capacity(width),
        }
    }

    /// Merge one completed attempt into the state
    ///
    /// Filling an index twice is a programming error and is reported rather than
    /// overwriting the earlier attempt.
    pub fn merge(mut self, branch_index: usize, attempt: Attempt) -> Result<Self, AccumulatorError> {
        self.insert(branch_index, attempt)?;
        Ok(self)
    }

    /// In-place form of [`RunState::merge`]
    pub fn insert(&mut self, branch_index: usize, attempt: Attempt) -> Result<(), AccumulatorError> {
        if branch_index >= self.width {
            return Err(AccumulatorError::UnknownBranch {
                index: branch_index,
                width: self.width,
            });
        }
        if self.attempts.contains_key(&branch_index) {
            return Err(AccumulatorError::DuplicateBranch(branch_index));
        }
        self.attempts.insert(branch_index, attempt);
        Ok(())
    }

    /// Fold a full set of completed branch results into one state
    pub fn reduce<I>(width: usize, results: I) -> Result<Self, AccumulatorError>
    where
        I: IntoIterator<Item = (usize, Attempt)>,
    {
        results
            .into_iter()
            .try_fold(Self::new(width), |state, (index, attempt)| {
                state.merge(index, attempt)
            })
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.attempts.len() == self.width
    }

    pub fn contains(&self, branch_index: usize) -> bool {
        self.attempts.contains_key(&branch_index)
    }

    pub fn get(&self, branch_index: usize) -> Option<&Attempt> {
        self.attempts.get(&branch_index)
    }

    /// Number of attempts whose execution succeeded
    pub fn successful(&self) -> usize {
        self.attempts.values().filter(|a| a.is_success()).count()
    }

    /// Attempts ordered by branch index, for inspection before the barrier
    pub fn sorted(&self) -> Vec<&Attempt> {
        let mut attempts: Vec<&Attempt> = self.attempts.values().collect();
        attempts.sort_by_key(|a| a.branch_index);
        attempts
    }

    /// Consume the state after the barrier, yielding attempts sorted by branch index
    ///
    /// Fails if any branch has not reported yet.
    pub fn into_sorted(self) -> Result<Vec<Attempt>, AccumulatorError> {
        if !self.is_complete() {
            return Err(AccumulatorError::Incomplete {
                filled: self.attempts.len(),
                expected: self.width,
            });
        }
        Ok(self.into_sorted_partial())
    }

    /// Sorted attempts regardless of completeness
    pub fn into_sorted_partial(self) -> Vec<Attempt> {
        let mut attempts: Vec<(usize, Attempt)> = self.attempts.into_iter().collect();
        attempts.sort_by_key(|(index, _)| *index);
        attempts.into_iter().map(|(_, attempt)| attempt).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::attempt::{AttemptDraft, ExecutionStatus};
    use proptest::prelude::*;

    fn attempt(index: usize, status: ExecutionStatus) -> Attempt {
        let mut draft = AttemptDraft::new(index, format!("model-{index}"), None);
        draft.record_execution(status, None, vec![format!("log {index}")]);
        draft.finish(index as u64)
    }

    #[test]
    fn test_merge_fills_each_index_once() {
        let state = RunState::new(3)
            .merge(2, attempt(2, ExecutionStatus::Success))
            .unwrap()
            .merge(0, attempt(0, ExecutionStatus::Timeout))
            .unwrap()
            .merge(1, attempt(1, ExecutionStatus::Success))
            .unwrap();

        assert!(state.is_complete());
        assert_eq!(state.successful(), 2);
        let sorted = state.into_sorted().unwrap();
        let indices: Vec<usize> = sorted.iter().map(|a| a.branch_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_merge_is_rejected() {
        let state = RunState::new(2)
            .merge(0, attempt(0, ExecutionStatus::Success))
            .unwrap();
        let err = state
            .merge(0, attempt(0, ExecutionStatus::Timeout))
            .unwrap_err();
        assert_eq!(err, AccumulatorError::DuplicateBranch(0));
    }

    #[test]
    fn test_duplicate_insert_keeps_first_attempt() {
        let mut state = RunState::new(1);
        state.insert(0, attempt(0, ExecutionStatus::Success)).unwrap();
        assert!(state.insert(0, attempt(0, ExecutionStatus::Timeout)).is_err());
        assert_eq!(
            state.get(0).unwrap().execution_status,
            ExecutionStatus::Success
        );
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let err = RunState::new(2)
            .merge(5, attempt(5, ExecutionStatus::Success))
            .unwrap_err();
        assert_eq!(err, AccumulatorError::UnknownBranch { index: 5, width: 2 });
    }

    #[test]
    fn test_incomplete_state_cannot_be_reduced() {
        let state = RunState::new(3)
            .merge(1, attempt(1, ExecutionStatus::Success))
            .unwrap();
        assert_eq!(
            state.into_sorted().unwrap_err(),
            AccumulatorError::Incomplete {
                filled: 1,
                expected: 3
            }
        );
    }

    fn statuses() -> impl Strategy<Value = ExecutionStatus> {
        prop_oneof![
            Just(ExecutionStatus::Success),
            Just(ExecutionStatus::RuntimeError),
            Just(ExecutionStatus::Timeout),
            Just(ExecutionStatus::NotExecuted),
        ]
    }

    proptest! {
        #[test]
        fn prop_merge_is_order_independent(
            (statuses, order) in prop::collection::vec(statuses(), 1..12)
                .prop_flat_map(|statuses| {
                    let n = statuses.len();
                    (Just(statuses), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
                })
        ) {
            let n = statuses.len();
            let attempts: Vec<Attempt> = statuses
                .iter()
                .enumerate()
                .map(|(i, s)| attempt(i, *s))
                .collect();

            let in_order = RunState::reduce(n, attempts.iter().cloned().enumerate()).unwrap();
            let shuffled = RunState::reduce(
                n,
                order.iter().map(|&i| (i, attempts[i].clone())),
            )
            .unwrap();

            prop_assert_eq!(in_order.len(), n);
            prop_assert_eq!(shuffled.len(), n);
            prop_assert_eq!(in_order.into_sorted().unwrap(), shuffled.into_sorted().unwrap());
        }
    }
}
