/// Decides when a growing affected-row count is due for a commit.
///
/// Commits once per multiple of the limit crossed. A limit of 0 never commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitJudge {
    limit: u64,
    reached: u64,
}

impl CommitJudge {
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self { limit, reached: 0 }
    }

    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// `affected` is the cumulative count, not a delta.
    pub fn can_commit(&mut self, affected: u64) -> bool {
        if self.limit == 0 {
            return false;
        }
        let times = affected / self.limit;
        if times > self.reached {
            self.reached = times;
            true
        } else {
            false
        }
    }
}

/// Cumulative affected rows of one Location plus its commit judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffectedRowRecorder {
    total: u64,
    judge: CommitJudge,
}

impl AffectedRowRecorder {
    #[must_use]
    pub fn new(commit_limit: u64) -> Self {
        Self {
            total: 0,
            judge: CommitJudge::new(commit_limit),
        }
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Add `rows` and report whether a commit is due.
    pub fn record(&mut self, rows: u64) -> bool {
        self.total = self.total.saturating_add(rows);
        self.judge.can_commit(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_commit_per_multiple_crossed() {
        let mut judge = CommitJudge::new(5);
        let decisions: Vec<bool> = [1, 4, 5, 5, 6, 9, 10, 23, 24, 25]
            .into_iter()
            .map(|count| judge.can_commit(count))
            .collect();
        assert_eq!(
            decisions,
            [false, false, true, false, false, false, true, true, false, true]
        );
    }

    #[test]
    fn zero_limit_never_commits() {
        let mut judge = CommitJudge::new(0);
        assert!((0..100).all(|count| !judge.can_commit(count)));
    }

    #[test]
    fn recorder_accumulates() {
        let mut recorder = AffectedRowRecorder::new(1);
        assert!(!recorder.record(0));
        assert!(recorder.record(1));
        assert!(recorder.record(3));
        assert!(!recorder.record(0));
        assert_eq!(recorder.total(), 4);
    }
}
