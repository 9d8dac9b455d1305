use crate::collab::Usage;
use crate::refine::Phase;
use crate::score::{self, DimensionScore, ScoreSource, Scorecard};

/// One collaborator call, as recorded in the session ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub phase: Phase,
    /// The iteration the call belongs to (the draft being produced or scored).
    pub iteration: u32,
    pub usage: Usage,
}

/// State of one refinement run.
///
/// `content` and `score` always travel together: the loop only writes a
/// candidate once it has been scored. A fresh session has empty content,
/// score 0 and no iterations.
#[derive(Debug, Clone)]
pub struct Session {
    content: String,
    score: f64,
    iteration: u32,
    total_cost: f64,
    dimensions: Vec<DimensionScore>,
    source: ScoreSource,
    calls: Vec<CallRecord>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            content: String::new(),
            score: 0.0,
            iteration: 0,
            total_cost: 0.0,
            dimensions: vec![],
            source: ScoreSource::Fallback("not yet evaluated".into()),
            calls: vec![],
        }
    }

    /// Current best candidate.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Evaluation of [`content`](Self::content), in `[0, 100]`.
    pub fn score(&self) -> f64 {
        self.score
    }

    /// Completed generate-or-improve cycles.
    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    /// Estimated USD spent on every call of this run.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Per-dimension scores from the latest evaluation, if the rubric
    /// response listed any.
    pub fn dimensions(&self) -> &[DimensionScore] {
        &self.dimensions
    }

    /// Names of up to `n` dimensions below full marks, weakest first.
    pub fn weakest(&self, n: usize) -> Vec<&str> {
        score::weakest(&self.dimensions, n)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Whether the current score was parsed or substituted.
    pub fn score_source(&self) -> &ScoreSource {
        &self.source
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn tokens_in(&self) -> u64 {
        self.calls.iter().map(|c| c.usage.tokens_in).sum()
    }

    pub fn tokens_out(&self) -> u64 {
        self.calls.iter().map(|c| c.usage.tokens_out).sum()
    }

    /// Cost per phase, in [`Phase`] order, phases without calls omitted.
    pub fn cost_by_phase(&self) -> Vec<(Phase, f64)> {
        [Phase::Generate, Phase::Score, Phase::Improve]
            .into_iter()
            .filter_map(|phase| {
                let calls: Vec<&CallRecord> =
                    self.calls.iter().filter(|c| c.phase == phase).collect();
                (!calls.is_empty()).then(|| (phase, calls.iter().map(|c| c.usage.cost).sum::<f64>()))
            })
            .collect()
    }

    /// Whether the run ended at or above `threshold`.
    pub fn met(&self, threshold: f64) -> bool {
        self.score >= threshold
    }

    pub(crate) fn record(&mut self, phase: Phase, usage: Usage) {
        self.total_cost += usage.cost;
        self.calls.push(CallRecord {
            phase,
            iteration: self.iteration,
            usage,
        });
    }

    pub(crate) fn begin_iteration(&mut self) {
        self.iteration += 1;
    }

    /// Replace the candidate and its evaluation in one step.
    pub(crate) fn commit(&mut self, content: String, card: Scorecard) {
        self.content = content;
        self.score = card.score;
        self.dimensions = card.dimensions;
        self.source = card.source;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::parse_scorecard;

    #[test]
    fn fresh_session_defaults() {
        let s = Session::new();
        assert_eq!(s.content(), "");
        assert_eq!(s.score(), 0.0);
        assert_eq!(s.iteration(), 0);
        assert_eq!(s.total_cost(), 0.0);
        assert!(s.calls().is_empty());
        assert!(s.score_source().is_fallback());
    }

    #[test]
    fn record_accumulates_cost_and_tokens() {
        let mut s = Session::new();
        s.begin_iteration();
        s.record(Phase::Generate, Usage::new(10, 20, 0.25));
        s.record(Phase::Score, Usage::new(5, 5, 0.5));

        assert_eq!(s.total_cost(), 0.75);
        assert_eq!(s.tokens_in(), 15);
        assert_eq!(s.tokens_out(), 25);
        assert_eq!(s.calls()[1].iteration, 1);
    }

    #[test]
    fn commit_updates_content_and_score_together() {
        let mut s = Session::new();
        s.commit("quiz".into(), parse_scorecard("a: 3/10\nTotal: 55/100", 70.0));

        assert_eq!(s.content(), "quiz");
        assert_eq!(s.score(), 55.0);
        assert_eq!(s.dimensions().len(), 1);
        assert_eq!(s.weakest(2), ["a"]);
        assert_eq!(s.score_source(), &ScoreSource::Parsed);
        assert!(!s.met(80.0));
        assert!(s.met(55.0));
    }

    #[test]
    fn cost_by_phase_skips_unused_phases() {
        let mut s = Session::new();
        s.record(Phase::Generate, Usage::new(0, 0, 0.25));
        s.record(Phase::Score, Usage::new(0, 0, 0.5));
        s.record(Phase::Score, Usage::new(0, 0, 0.25));

        assert_eq!(
            s.cost_by_phase(),
            vec![(Phase::Generate, 0.25), (Phase::Score, 0.75)]
        );
    }
}
