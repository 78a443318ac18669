use crate::models::{BallotOption, OptionId, OPTIONS, OPTION_COUNT};

/// Per-option vote counts, indexed by catalog position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    counts: [u64; OPTION_COUNT],
}

// Counts and percentage for one option
#[derive(Debug, Clone, PartialEq)]
pub struct VoteCount {
    pub option: &'static BallotOption,
    pub votes: u64,
    pub percentage: f64,
}

impl Tally {
    /// Full recomputation from every stored `option_id`. Ids outside the
    /// catalog are ignored.
    pub fn from_option_ids<I>(option_ids: I) -> Self
    where
        I: IntoIterator<Item = i64>,
    {
        let mut tally = Self::default();
        for option_id in option_ids {
            if let Some(index) = BallotOption::index_of(OptionId(option_id)) {
                tally.counts[index] += 1;
            }
        }
        tally
    }

    pub fn count(&self, option: OptionId) -> u64 {
        BallotOption::index_of(option)
            .map(|index| self.counts[index])
            .unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// `count / total * 100`, or 0 for every option when nothing has been cast.
    pub fn percentage(&self, option: OptionId) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(option) as f64 / total as f64 * 100.0
    }

    pub fn increment(&mut self, option: OptionId) -> bool {
        match BallotOption::index_of(option) {
            Some(index) => {
                self.counts[index] += 1;
                true
            }
            None => false,
        }
    }

    pub fn decrement(&mut self, option: OptionId) {
        if let Some(index) = BallotOption::index_of(option) {
            self.counts[index] = self.counts[index].saturating_sub(1);
        }
    }

    pub fn results(&self) -> Vec<VoteCount> {
        OPTIONS
            .iter()
            .map(|option| VoteCount {
                option,
                votes: self.count(option.id),
                percentage: self.percentage(option.id),
            })
            .collect()
    }

    /// Leading option(s); empty when no votes were cast.
    pub fn leaders(&self) -> Vec<&'static BallotOption> {
        let best = self.counts.iter().copied().max().unwrap_or(0);
        if best == 0 {
            return Vec::new();
        }
        OPTIONS
            .iter()
            .zip(self.counts.iter())
            .filter(|(_, votes)| **votes == best)
            .map(|(option, _)| option)
            .collect()
    }

    /// Text rendering of the tally. `precise` selects one decimal place
    /// (ballot view) instead of whole percentages (results view).
    pub fn summary(&self, precise: bool) -> String {
        let mut summary = String::new();
        let leaders = self.leaders();

        for count in self.results() {
            let percentage = if precise {
                format!("{:.1}", count.percentage)
            } else {
                format!("{}", count.percentage.round())
            };
            let line = if leaders.len() == 1 && leaders[0].id == count.option.id {
                format!("* {}: {} votes ({}%)", count.option.title, count.votes, percentage)
            } else {
                format!("  {}: {} votes ({}%)", count.option.title, count.votes, percentage)
            };
            summary.push_str(&line);
            summary.push('\n');
        }

        summary.push_str(&format!("Total Votes: {}", self.total()));
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_ones_and_a_two() {
        let tally = Tally::from_option_ids([1, 1, 2]);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.count(OptionId(1)), 2);
        assert_eq!(tally.count(OptionId(2)), 1);
        assert_eq!(tally.count(OptionId(3)), 0);
        assert_eq!(format!("{:.1}", tally.percentage(OptionId(1))), "66.7");
        assert_eq!(format!("{:.1}", tally.percentage(OptionId(2))), "33.3");
        assert_eq!(tally.percentage(OptionId(3)), 0.0);
    }

    #[test]
    fn empty_tally_is_all_zero() {
        let tally = Tally::from_option_ids(Vec::new());
        assert_eq!(tally.total(), 0);
        for option in &OPTIONS {
            assert_eq!(tally.count(option.id), 0);
            assert_eq!(tally.percentage(option.id), 0.0);
        }
        assert!(tally.leaders().is_empty());
    }

    #[test]
    fn out_of_range_ids_are_ignored() {
        let tally = Tally::from_option_ids([0, 1, 4, -3, 3, 99, 3]);
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.count(OptionId(3)), 2);
        assert_eq!(tally.count(OptionId(99)), 0);
    }

    #[test]
    fn percentages_sum_to_one_hundred() {
        for ids in [vec![1], vec![1, 2, 3], vec![1, 1, 1, 2, 3, 3, 3], vec![2; 17]] {
            let tally = Tally::from_option_ids(ids);
            let sum: f64 = OPTIONS.iter().map(|o| tally.percentage(o.id)).sum();
            assert!((sum - 100.0).abs() < 1e-9, "sum was {sum}");
        }
    }

    #[test]
    fn increment_then_decrement_restores() {
        let before = Tally::from_option_ids([1, 3]);
        let mut tally = before;
        assert!(tally.increment(OptionId(2)));
        assert_eq!(tally.count(OptionId(2)), 1);
        tally.decrement(OptionId(2));
        assert_eq!(tally, before);

        assert!(!tally.increment(OptionId(8)));
        tally.decrement(OptionId(2));
        assert_eq!(tally.count(OptionId(2)), 0);
    }

    #[test]
    fn summary_marks_single_leader() {
        let summary = Tally::from_option_ids([1, 1, 2]).summary(true);
        assert!(summary.contains("* Calendar Conflicts Reporter: 2 votes (66.7%)"));
        assert!(summary.contains("  Alexa Incident Commander: 1 votes (33.3%)"));
        assert!(summary.ends_with("Total Votes: 3"));

        let rounded = Tally::from_option_ids([1, 1, 2]).summary(false);
        assert!(rounded.contains("(67%)"));
        assert!(rounded.contains("(33%)"));
    }
}
