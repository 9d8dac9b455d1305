//! A score-gated refinement loop for LLM-generated content.
//!
//! A [`RefinementLoop`] drafts content, scores it against a rubric, and asks
//! for revisions until the score clears a threshold or the iteration cap is
//! hit. Model calls go through the [`Generator`] trait and are priced by a
//! [`CostEstimator`]; the running cost lives on the [`Session`] the loop
//! returns.
//!
//! # Quick start
//!
//! ```rust
//! use refine_line::{PricedEstimator, Prompts, RefineError, RefinementLoop};
//!
//! let mut rubric_calls = 0;
//! let model = move |prompt: &str| -> Result<String, RefineError> {
//!     if prompt.starts_with("Rate") {
//!         rubric_calls += 1;
//!         let total = if rubric_calls == 1 { 60 } else { 85 };
//!         Ok(format!("Clarity: 6/10\nTotal: {total}/100"))
//!     } else {
//!         Ok("A man walks into a bar and asks for water...".to_string())
//!     }
//! };
//!
//! let prompts = Prompts::new(
//!     "Write a riddle.",
//!     "Rate this riddle:\n{content}",
//!     "Improve this riddle (score {score}, work on {focus}):\n{content}",
//! );
//!
//! let mut refine = RefinementLoop::new(model, PricedEstimator::default()).with_prompts(prompts);
//! let session = refine.run(5, 80.0).unwrap();
//!
//! assert_eq!(session.iteration(), 2);
//! assert_eq!(session.score(), 85.0);
//! assert!(session.total_cost() > 0.0);
//! ```

mod collab;
mod cost;
mod error;
mod llm;
mod prompt;
mod refine;
pub mod score;
mod session;

pub use collab::{CostEstimator, Generator, Usage};
pub use cost::{PricedEstimator, Pricing, estimate_tokens};
pub use error::RefineError;
pub use llm::{ApiUsage, LlmClient, LlmConfig, LlmRequest, Message, Role};
pub use prompt::Prompts;
pub use refine::{ErrorEvent, Phase, RefinementLoop, StepEvent};
pub use score::{DimensionScore, ScoreSource, Scorecard, parse_scorecard};
pub use session::{CallRecord, Session};
