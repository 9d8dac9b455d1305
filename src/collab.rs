use crate::error::RefineError;

/// Anything that turns a prompt into text.
///
/// The loop calls this for the first draft, for every rubric evaluation, and
/// for every revision. Implement it on a model client, or pass a closure:
///
/// ```rust
/// use refine_line::{Generator, RefineError};
///
/// let mut echo = |prompt: &str| -> Result<String, RefineError> { Ok(prompt.to_uppercase()) };
/// assert_eq!(echo.generate("hi").unwrap(), "HI");
/// ```
pub trait Generator {
    /// Produce a response for `prompt`. May be slow; may fail.
    fn generate(&mut self, prompt: &str) -> Result<String, RefineError>;
}

impl<F> Generator for F
where
    F: FnMut(&str) -> Result<String, RefineError>,
{
    fn generate(&mut self, prompt: &str) -> Result<String, RefineError> {
        self(prompt)
    }
}

/// Token counts and cost for one collaborator call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Usage {
    pub tokens_in: u64,
    pub tokens_out: u64,
    /// Estimated cost in USD.
    pub cost: f64,
}

impl Usage {
    pub fn new(tokens_in: u64, tokens_out: u64, cost: f64) -> Self {
        Self {
            tokens_in,
            tokens_out,
            cost,
        }
    }
}

/// Prices a prompt/response pair. Must be side-effect free: the session that
/// owns the run does the accumulating.
pub trait CostEstimator {
    fn estimate(&self, prompt: &str, response: &str) -> Usage;
}

impl<F> CostEstimator for F
where
    F: Fn(&str, &str) -> Usage,
{
    fn estimate(&self, prompt: &str, response: &str) -> Usage {
        self(prompt, response)
    }
}
