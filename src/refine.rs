use crate::collab::{CostEstimator, Generator, Usage};
use crate::error::RefineError;
use crate::prompt::Prompts;
use crate::score::{DEFAULT_FALLBACK_SCORE, ScoreSource, parse_scorecard};
use crate::session::Session;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How many of the weakest rubric dimensions a revision prompt names.
const FOCUS_DIMENSIONS: usize = 2;

/// Which collaborator call a step was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Generate,
    Score,
    Improve,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Generate => "generate",
            Phase::Score => "score",
            Phase::Improve => "improve",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passed to the `on_step` hook after each successful collaborator call.
pub struct StepEvent<'a> {
    pub phase: Phase,
    pub iteration: u32,
    pub duration: Duration,
    pub usage: &'a Usage,
    /// Set on [`Phase::Score`] steps only.
    pub score: Option<f64>,
    /// Set on [`Phase::Score`] steps only.
    pub source: Option<&'a ScoreSource>,
}

/// Passed to the `on_error` hook when a collaborator call fails.
pub struct ErrorEvent<'a> {
    pub phase: Phase,
    pub iteration: u32,
    pub error: &'a RefineError,
}

struct Call {
    response: String,
    usage: Usage,
    duration: Duration,
}

/// Generate, score, and revise until the score clears a threshold or the
/// iteration cap is hit.
///
/// Every call goes through one [`Generator`]; the prompt decides whether it
/// drafts, scores, or revises. Calls are strictly sequential.
pub struct RefinementLoop<G, E> {
    generator: G,
    estimator: E,
    prompts: Prompts,
    fallback_score: f64,
    on_step: Option<Box<dyn FnMut(&StepEvent)>>,
    on_error: Option<Box<dyn FnMut(&ErrorEvent)>>,
}

impl<G: Generator, E: CostEstimator> RefinementLoop<G, E> {
    pub fn new(generator: G, estimator: E) -> Self {
        Self {
            generator,
            estimator,
            prompts: Prompts::default(),
            fallback_score: DEFAULT_FALLBACK_SCORE,
            on_step: None,
            on_error: None,
        }
    }

    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Score to use when a rubric response can't be parsed (default 70).
    pub fn with_fallback_score(mut self, score: f64) -> Self {
        self.fallback_score = score;
        self
    }

    /// Register a callback that fires after each successful collaborator call.
    pub fn on_step(mut self, cb: impl FnMut(&StepEvent) + 'static) -> Self {
        self.on_step = Some(Box::new(cb));
        self
    }

    /// Register a callback that fires when a collaborator call fails.
    pub fn on_error(mut self, cb: impl FnMut(&ErrorEvent) + 'static) -> Self {
        self.on_error = Some(Box::new(cb));
        self
    }

    /// Set both hooks to forward steps and errors to `tracing`.
    pub fn with_tracing(self) -> Self {
        self.on_step(|e| match e.score {
            Some(score) => info!(
                phase = %e.phase,
                iteration = e.iteration,
                score,
                fallback = e.source.is_some_and(ScoreSource::is_fallback),
                elapsed_ms = e.duration.as_millis() as u64,
                cost = e.usage.cost,
                "step"
            ),
            None => info!(
                phase = %e.phase,
                iteration = e.iteration,
                elapsed_ms = e.duration.as_millis() as u64,
                cost = e.usage.cost,
                "step"
            ),
        })
        .on_error(|e| {
            error!(phase = %e.phase, iteration = e.iteration, error = %e.error, "step failed");
        })
    }

    pub fn prompts(&self) -> &Prompts {
        &self.prompts
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Run one refinement to completion.
    ///
    /// Returns the final session whether or not the threshold was met; check
    /// [`Session::met`]. A collaborator failure aborts the run and is returned
    /// unchanged. An unparseable rubric response does not: it scores as the
    /// fallback and the run goes on.
    pub fn run(&mut self, max_iterations: u32, threshold: f64) -> Result<Session, RefineError> {
        if max_iterations == 0 {
            return Err(RefineError::invalid("max_iterations must be at least 1"));
        }
        if !(0.0..=100.0).contains(&threshold) {
            return Err(RefineError::invalid(format!(
                "threshold {threshold} outside [0, 100]"
            )));
        }
        if !(0.0..=100.0).contains(&self.fallback_score) {
            return Err(RefineError::invalid(format!(
                "fallback score {} outside [0, 100]",
                self.fallback_score
            )));
        }

        let mut session = Session::new();
        debug!(max_iterations, threshold, "refinement started");

        session.begin_iteration();
        let create = self.prompts.create.clone();
        let draft = self.call(&mut session, Phase::Generate, &create)?;
        self.step(&session, Phase::Generate, &draft, None);
        self.evaluate(&mut session, draft.response)?;

        while !session.met(threshold) && session.iteration() < max_iterations {
            let prompt = self.prompts.render_improve(
                session.content(),
                session.score(),
                &session.weakest(FOCUS_DIMENSIONS),
            );
            session.begin_iteration();
            let revised = self.call(&mut session, Phase::Improve, &prompt)?;
            self.step(&session, Phase::Improve, &revised, None);
            self.evaluate(&mut session, revised.response)?;
        }

        info!(
            iterations = session.iteration(),
            score = session.score(),
            met = session.met(threshold),
            total_cost = session.total_cost(),
            "refinement finished"
        );
        Ok(session)
    }

    /// Score `candidate` and commit it to the session together with its score.
    fn evaluate(&mut self, session: &mut Session, candidate: String) -> Result<(), RefineError> {
        let prompt = self.prompts.render_rubric(&candidate);
        let call = self.call(session, Phase::Score, &prompt)?;
        let card = parse_scorecard(&call.response, self.fallback_score);

        match &card.source {
            ScoreSource::Fallback(reason) => warn!(
                target: "refine_line::score",
                iteration = session.iteration(),
                reason = %reason,
                fallback = self.fallback_score,
                "rubric response had no usable total, using fallback score"
            ),
            ScoreSource::Parsed if card.scale_mismatch() => warn!(
                target: "refine_line::score",
                iteration = session.iteration(),
                maximum = ?card.maximum,
                score = card.score,
                "rubric total is not on a 100-point scale"
            ),
            ScoreSource::Parsed => {}
        }

        self.step(session, Phase::Score, &call, Some((card.score, &card.source)));
        session.commit(candidate, card);
        Ok(())
    }

    fn call(
        &mut self,
        session: &mut Session,
        phase: Phase,
        prompt: &str,
    ) -> Result<Call, RefineError> {
        debug!(phase = %phase, iteration = session.iteration(), "calling generator");

        let start = Instant::now();
        let result = self.generator.generate(prompt);
        let duration = start.elapsed();

        match result {
            Err(err) => {
                if let Some(cb) = &mut self.on_error {
                    cb(&ErrorEvent {
                        phase,
                        iteration: session.iteration(),
                        error: &err,
                    });
                }
                Err(err)
            }
            Ok(response) => {
                let usage = self.estimator.estimate(prompt, &response);
                session.record(phase, usage);
                Ok(Call {
                    response,
                    usage,
                    duration,
                })
            }
        }
    }

    fn step(
        &mut self,
        session: &Session,
        phase: Phase,
        call: &Call,
        scored: Option<(f64, &ScoreSource)>,
    ) {
        if let Some(cb) = &mut self.on_step {
            cb(&StepEvent {
                phase,
                iteration: session.iteration(),
                duration: call.duration,
                usage: &call.usage,
                score: scored.map(|(score, _)| score),
                source: scored.map(|(_, source)| source),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{PricedEstimator, Pricing};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn test_prompts() -> Prompts {
        Prompts::new(
            "CREATE",
            "RUBRIC\n{content}",
            "IMPROVE {score} [{focus}]\n{content}",
        )
        .with_default_focus(["logic"])
    }

    /// Answers CREATE and IMPROVE prompts with numbered drafts and RUBRIC
    /// prompts with scripted rubric responses (the last one repeats).
    struct ScriptedModel {
        rubric: VecDeque<String>,
        drafts: u32,
        prompts: Vec<String>,
        fail_on: Option<(Phase, RefineError)>,
    }

    impl ScriptedModel {
        fn scores(scores: &[f64]) -> Self {
            Self::responses(
                scores
                    .iter()
                    .map(|s| format!("logic: 4/10\nfun: 9/10\nTotal: {s}/100"))
                    .collect(),
            )
        }

        fn responses(rubric: Vec<String>) -> Self {
            Self {
                rubric: rubric.into(),
                drafts: 0,
                prompts: vec![],
                fail_on: None,
            }
        }

        fn failing(mut self, phase: Phase, err: RefineError) -> Self {
            self.fail_on = Some((phase, err));
            self
        }

        fn phase_of(prompt: &str) -> Phase {
            if prompt.starts_with("RUBRIC") {
                Phase::Score
            } else if prompt.starts_with("IMPROVE") {
                Phase::Improve
            } else {
                Phase::Generate
            }
        }
    }

    impl Generator for ScriptedModel {
        fn generate(&mut self, prompt: &str) -> Result<String, RefineError> {
            self.prompts.push(prompt.to_string());
            let phase = Self::phase_of(prompt);

            if let Some((fail_phase, _)) = &self.fail_on
                && *fail_phase == phase
            {
                let (_, err) = self.fail_on.take().unwrap();
                return Err(err);
            }

            match phase {
                Phase::Score => {
                    if self.rubric.len() > 1 {
                        Ok(self.rubric.pop_front().unwrap())
                    } else {
                        Ok(self.rubric.front().cloned().unwrap_or_default())
                    }
                }
                _ => {
                    self.drafts += 1;
                    Ok(format!("draft {}", self.drafts))
                }
            }
        }
    }

    fn refine(model: ScriptedModel) -> RefinementLoop<ScriptedModel, PricedEstimator> {
        RefinementLoop::new(model, PricedEstimator::default()).with_prompts(test_prompts())
    }

    // --- termination ---

    #[test]
    fn perfect_score_stops_after_one_iteration() {
        for threshold in [0.0, 50.0, 80.0, 100.0] {
            let mut rl = refine(ScriptedModel::scores(&[100.0]));
            let session = rl.run(5, threshold).unwrap();
            assert_eq!(session.iteration(), 1);
            assert_eq!(session.score(), 100.0);
            assert_eq!(session.content(), "draft 1");
        }
    }

    #[test]
    fn zero_score_runs_exactly_max_iterations() {
        for n in 1..=4 {
            let mut rl = refine(ScriptedModel::scores(&[0.0]));
            let session = rl.run(n, 80.0).unwrap();
            assert_eq!(session.iteration(), n);
            assert_eq!(session.score(), 0.0);
            assert!(!session.met(80.0));
            // one draft plus n - 1 revisions, each scored
            assert_eq!(rl.generator().prompts.len() as u32, 2 * n);
        }
    }

    #[test]
    fn improvement_that_clears_threshold_stops() {
        let mut rl = refine(ScriptedModel::scores(&[60.0, 85.0, 95.0]));
        let session = rl.run(5, 80.0).unwrap();
        assert_eq!(session.iteration(), 2);
        assert_eq!(session.score(), 85.0);
        assert_eq!(session.content(), "draft 2");
    }

    // --- score parsing inside the loop ---

    #[test]
    fn malformed_rubric_uses_fallback_and_continues() {
        let mut rl = refine(ScriptedModel::responses(vec!["I liked it.".into()]));
        let session = rl.run(2, 80.0).unwrap();
        assert_eq!(session.score(), 70.0);
        assert_eq!(session.iteration(), 2);
        assert!(session.score_source().is_fallback());
    }

    #[test]
    fn fallback_score_can_clear_threshold() {
        let mut rl = refine(ScriptedModel::responses(vec!["?".into()])).with_fallback_score(90.0);
        let session = rl.run(3, 80.0).unwrap();
        assert_eq!(session.iteration(), 1);
        assert_eq!(session.score(), 90.0);
    }

    // --- cost ---

    #[test]
    fn cost_is_sum_of_call_estimates() {
        let est = PricedEstimator::new(Pricing::new(1.0, 2.0));
        let mut rl = RefinementLoop::new(ScriptedModel::scores(&[90.0]), est)
            .with_prompts(test_prompts());
        let session = rl.run(1, 80.0).unwrap();

        let rubric_response = "logic: 4/10\nfun: 9/10\nTotal: 90/100";
        let generate = est.estimate("CREATE", "draft 1");
        let score = est.estimate("RUBRIC\ndraft 1", rubric_response);

        assert_eq!(session.calls().len(), 2);
        assert!((session.total_cost() - (generate.cost + score.cost)).abs() < 1e-12);
        assert_eq!(session.tokens_in(), generate.tokens_in + score.tokens_in);
    }

    #[test]
    fn cost_never_changes_control_flow() {
        let pricey = |_: &str, _: &str| Usage::new(1, 1, 1_000_000.0);
        let mut rl = RefinementLoop::new(ScriptedModel::scores(&[10.0]), pricey)
            .with_prompts(test_prompts());
        let session = rl.run(3, 80.0).unwrap();
        assert_eq!(session.iteration(), 3);
        assert_eq!(session.total_cost(), 6_000_000.0);
    }

    // --- prompts ---

    #[test]
    fn improve_prompt_names_weakest_dimension() {
        let mut rl = refine(ScriptedModel::scores(&[60.0, 85.0]));
        rl.run(3, 80.0).unwrap();
        let improve = &rl.generator().prompts[2];
        assert_eq!(improve, "IMPROVE 60 [logic、fun]\ndraft 1");
    }

    #[test]
    fn improve_prompt_uses_default_focus_without_dimensions() {
        let mut rl = refine(ScriptedModel::responses(vec![
            "Total: 40/100".into(),
            "Total: 90/100".into(),
        ]));
        rl.run(3, 80.0).unwrap();
        assert_eq!(rl.generator().prompts[2], "IMPROVE 40 [logic]\ndraft 1");
    }

    #[test]
    fn rubric_scores_the_revised_content() {
        let mut rl = refine(ScriptedModel::scores(&[60.0, 85.0]));
        rl.run(3, 80.0).unwrap();
        assert_eq!(rl.generator().prompts[3], "RUBRIC\ndraft 2");
    }

    // --- failures ---

    #[test]
    fn generator_failure_propagates_unchanged() {
        let model = ScriptedModel::scores(&[90.0])
            .failing(Phase::Generate, RefineError::transient("connection reset"));
        let err = refine(model).run(3, 80.0).unwrap_err();
        assert!(matches!(err, RefineError::Transient(msg) if msg == "connection reset"));
    }

    #[test]
    fn scorer_failure_aborts_run() {
        let model =
            ScriptedModel::scores(&[90.0]).failing(Phase::Score, RefineError::invalid("http status 401"));
        let err = refine(model).run(3, 80.0).unwrap_err();
        assert_eq!(err.to_string(), "invalid: http status 401");
    }

    #[test]
    fn improver_failure_aborts_run() {
        let model =
            ScriptedModel::scores(&[10.0]).failing(Phase::Improve, RefineError::other("boom"));
        let mut rl = refine(model);
        let err = rl.run(3, 80.0).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(rl.generator().prompts.len(), 3);
    }

    #[test]
    fn invalid_arguments_make_no_calls() {
        for (max, threshold) in [(0, 80.0), (3, -1.0), (3, 100.5), (3, f64::NAN)] {
            let mut rl = refine(ScriptedModel::scores(&[90.0]));
            let err = rl.run(max, threshold).unwrap_err();
            assert!(matches!(err, RefineError::Invalid(_)));
            assert!(rl.generator().prompts.is_empty());
        }
    }

    #[test]
    fn out_of_range_fallback_is_rejected() {
        let mut rl = refine(ScriptedModel::scores(&[90.0])).with_fallback_score(150.0);
        assert!(matches!(rl.run(3, 80.0), Err(RefineError::Invalid(_))));
    }

    // --- hooks ---

    #[test]
    fn on_step_sees_every_call_in_order() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let steps_clone = Arc::clone(&steps);

        let mut rl = refine(ScriptedModel::scores(&[60.0, 85.0])).on_step(move |e| {
            steps_clone
                .lock()
                .unwrap()
                .push((e.phase, e.iteration, e.score));
        });
        rl.run(5, 80.0).unwrap();

        let steps = steps.lock().unwrap();
        assert_eq!(
            *steps,
            vec![
                (Phase::Generate, 1, None),
                (Phase::Score, 1, Some(60.0)),
                (Phase::Improve, 2, None),
                (Phase::Score, 2, Some(85.0)),
            ]
        );
    }

    #[test]
    fn on_step_flags_fallback_scores() {
        let fallbacks = Arc::new(Mutex::new(0usize));
        let fallbacks_clone = Arc::clone(&fallbacks);

        let mut rl = refine(ScriptedModel::responses(vec!["nothing useful".into()])).on_step(
            move |e| {
                if e.source.is_some_and(ScoreSource::is_fallback) {
                    *fallbacks_clone.lock().unwrap() += 1;
                }
            },
        );
        rl.run(3, 80.0).unwrap();
        assert_eq!(*fallbacks.lock().unwrap(), 3);
    }

    #[test]
    fn on_error_fires_once_on_failure() {
        let count = Arc::new(Mutex::new(0usize));
        let count_clone = Arc::clone(&count);

        let model = ScriptedModel::scores(&[10.0]).failing(Phase::Improve, RefineError::other("x"));
        let mut rl = refine(model).on_error(move |e| {
            assert_eq!(e.phase, Phase::Improve);
            assert_eq!(e.iteration, 2);
            *count_clone.lock().unwrap() += 1;
        });
        let _ = rl.run(3, 80.0);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn with_tracing_installs_both_hooks() {
        let rl = refine(ScriptedModel::scores(&[90.0])).with_tracing();
        assert!(rl.on_step.is_some());
        assert!(rl.on_error.is_some());
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::Generate.to_string(), "generate");
        assert_eq!(Phase::Score.to_string(), "score");
        assert_eq!(Phase::Improve.to_string(), "improve");
    }
}
