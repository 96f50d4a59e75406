use crate::traits::Usage;

/// Token accounting for one turn. Prompt and completion counts are summed
/// over every usage-bearing fragment; the total is taken verbatim from the
/// last one, since some providers report cumulative figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub completion_tokens: u64,
    pub prompt_tokens: u64,
    pub total_tokens: u64,
    pub samples: usize,
}

impl UsageTotals {
    pub fn record(&mut self, usage: &Usage) {
        self.completion_tokens += usage.completion_tokens;
        self.prompt_tokens += usage.prompt_tokens;
        self.total_tokens = usage.total_tokens;
        self.samples += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_is_last_sample_not_sum() {
        let mut totals = UsageTotals::default();
        for i in 1..=3 {
            totals.record(&Usage {
                prompt_tokens: 10,
                completion_tokens: i,
                total_tokens: 10 + i,
            });
        }

        assert_eq!(totals.prompt_tokens, 30);
        assert_eq!(totals.completion_tokens, 6);
        assert_eq!(totals.total_tokens, 13);
        assert_eq!(totals.samples, 3);
    }

    #[test]
    fn empty_is_zero() {
        let totals = UsageTotals::default();
        assert_eq!(totals.samples, 0);
        assert_eq!(totals.total_tokens, 0);
    }
}
