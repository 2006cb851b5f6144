use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate counters for a group of assets submitted together.
///
/// `completed + errors` never exceeds `count`, and `finished` is stamped once, when
/// the two reach `count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: i32,
    pub customer: i32,
    pub count: i32,
    pub completed: i32,
    pub errors: i32,
    pub submitted: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub superseded: bool,
}

/// What happened when an asset outcome was applied to a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// One of `completed`/`errors` was incremented. `finished` is true if this
    /// outcome closed the batch.
    Counted { finished: bool },
    /// The batch already accounts for every asset; nothing changed.
    AlreadyFull,
}

impl Batch {
    pub fn processed(&self) -> i32 {
        self.completed + self.errors
    }

    pub fn is_complete(&self) -> bool {
        self.processed() >= self.count
    }

    /// Count one asset outcome against the batch.
    pub fn record_outcome(&mut self, errored: bool, now: DateTime<Utc>) -> BatchOutcome {
        if self.is_complete() {
            return BatchOutcome::AlreadyFull;
        }

        if errored {
            self.errors += 1;
        } else {
            self.completed += 1;
        }

        let closes = self.processed() == self.count && self.finished.is_none();
        if closes {
            self.finished = Some(now);
        }
        BatchOutcome::Counted { finished: closes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(count: i32, completed: i32, errors: i32) -> Batch {
        Batch {
            id: 1,
            customer: 99,
            count,
            completed,
            errors,
            submitted: Utc::now(),
            finished: None,
            superseded: false,
        }
    }

    #[test]
    fn test_success_increments_completed_without_finishing() {
        let mut b = batch(10, 7, 1);
        let outcome = b.record_outcome(false, Utc::now());
        assert_eq!(outcome, BatchOutcome::Counted { finished: false });
        assert_eq!((b.completed, b.errors), (8, 1));
        assert!(b.finished.is_none());
    }

    #[test]
    fn test_final_error_closes_the_batch() {
        let mut b = batch(10, 9, 0);
        let now = Utc::now();
        let outcome = b.record_outcome(true, now);
        assert_eq!(outcome, BatchOutcome::Counted { finished: true });
        assert_eq!((b.completed, b.errors), (9, 1));
        assert_eq!(b.finished, Some(now));
    }

    #[test]
    fn test_both_closing_paths_stamp_finished() {
        let mut via_success = batch(10, 8, 1);
        assert_eq!(
            via_success.record_outcome(false, Utc::now()),
            BatchOutcome::Counted { finished: true }
        );
        assert_eq!((via_success.completed, via_success.errors), (9, 1));
        assert!(via_success.finished.is_some());

        let mut via_error = batch(10, 8, 0);
        via_error.record_outcome(false, Utc::now());
        assert!(via_error.finished.is_none());
        via_error.record_outcome(true, Utc::now());
        assert_eq!((via_error.completed, via_error.errors), (9, 1));
        assert!(via_error.finished.is_some());
    }

    #[test]
    fn test_full_batch_is_never_over_counted() {
        let mut b = batch(2, 1, 1);
        let finished = Some(Utc::now());
        b.finished = finished;
        assert_eq!(b.record_outcome(false, Utc::now()), BatchOutcome::AlreadyFull);
        assert_eq!((b.completed, b.errors), (1, 1));
        assert_eq!(b.finished, finished);
    }
}
