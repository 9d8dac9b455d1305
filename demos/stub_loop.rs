// Offline refinement loop.
//
// A stub model drafts a quiz, scores it low on the first pass, and accepts the
// revision. The second run hands back a rubric with no total line, so the
// fallback score kicks in and shows up as a warning.
//
// Run: RUST_LOG=info cargo run --example stub_loop

use refine_line::{PricedEstimator, Prompts, RefineError, RefinementLoop};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Stub model
// ---------------------------------------------------------------------------

struct StubModel {
    scored: u32,
    garbled: bool,
}

impl refine_line::Generator for StubModel {
    fn generate(&mut self, prompt: &str) -> Result<String, RefineError> {
        if prompt.starts_with("次の水平思考クイズの品質") {
            self.scored += 1;
            if self.garbled {
                return Ok("とても良いクイズだと思います。".into());
            }
            let total = if self.scored == 1 { 62 } else { 86 };
            return Ok(format!(
                "論理性: 5/10\nオリジナリティ: 8/10\n解きやすさ: 6/10\n面白さ: 8/10\n合計: {total}/100"
            ));
        }

        if prompt.starts_with("次の水平思考クイズを改善") {
            return Ok("問題: 男はバーで水を頼んだが、銃を向けられて礼を言った。\n\
                       解答: しゃっくりが止まったから。\n\
                       解説: 驚かせることでしゃっくりを止めてもらった。"
                .into());
        }

        Ok("問題: 男はバーで水を頼んだ。\n解答: しゃっくり。".into())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    for (round, garbled) in [(1, false), (2, true)] {
        println!("=== Round {round} ===");

        let model = StubModel { scored: 0, garbled };
        let mut refine = RefinementLoop::new(model, PricedEstimator::default())
            .with_prompts(Prompts::lateral_thinking_quiz())
            .on_step(|e| {
                let score = e.score.map(|s| format!(" score={s}")).unwrap_or_default();
                println!("  [iter {}] {}{score} (${:.5})", e.iteration, e.phase, e.usage.cost);
            });

        match refine.run(3, 80.0) {
            Ok(session) => {
                println!("  Iterations: {}", session.iteration());
                println!("  Score:      {} ({:?})", session.score(), session.score_source());
                println!("  Cost:       ${:.4}", session.total_cost());
                for (phase, cost) in session.cost_by_phase() {
                    println!("    {:<8} ${cost:.5}", phase.as_str());
                }
                println!("  Quiz:\n{}", session.content());
            }
            Err(e) => println!("  Error: {e}"),
        }
        println!();
    }
}
