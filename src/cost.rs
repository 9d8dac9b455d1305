use crate::collab::{CostEstimator, Usage};

/// Per-1K-token prices in USD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl Pricing {
    pub fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Claude 3.5 Sonnet list prices.
    pub fn claude_sonnet() -> Self {
        Self::new(0.003, 0.015)
    }

    pub fn cost(&self, tokens_in: u64, tokens_out: u64) -> f64 {
        (tokens_in as f64 * self.input_per_1k / 1000.0)
            + (tokens_out as f64 * self.output_per_1k / 1000.0)
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::claude_sonnet()
    }
}

/// Offline token estimate: one token per non-ASCII char, one per four ASCII
/// chars (rounded up). Close enough for Japanese and English prose.
pub fn estimate_tokens(text: &str) -> u64 {
    let mut ascii = 0u64;
    let mut wide = 0u64;
    for c in text.chars() {
        if c.is_ascii() {
            ascii += 1;
        } else {
            wide += 1;
        }
    }
    wide + ascii.div_ceil(4)
}

/// Estimates usage with [`estimate_tokens`] and prices it with a [`Pricing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PricedEstimator {
    pricing: Pricing,
}

impl PricedEstimator {
    pub fn new(pricing: Pricing) -> Self {
        Self { pricing }
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }
}

impl CostEstimator for PricedEstimator {
    fn estimate(&self, prompt: &str, response: &str) -> Usage {
        let tokens_in = estimate_tokens(prompt);
        let tokens_out = estimate_tokens(response);
        Usage::new(
            tokens_in,
            tokens_out,
            self.pricing.cost(tokens_in, tokens_out),
        )
    }
}
