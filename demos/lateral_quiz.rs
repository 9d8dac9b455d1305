// Live lateral-thinking quiz refinement against the Anthropic API.
//
// Needs ANTHROPIC_API_KEY. REFINE_MODEL, REFINE_MAX_TOKENS and
// ANTHROPIC_BASE_URL are optional.
//
// Run: cargo run --example lateral_quiz -- [max_iterations] [threshold]

use refine_line::{LlmClient, PricedEstimator, Prompts, RefinementLoop};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let max_iterations: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(3);
    let threshold: f64 = args.next().and_then(|a| a.parse().ok()).unwrap_or(80.0);

    let client = match LlmClient::from_env() {
        Ok(client) => client,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };
    println!("model: {}", client.config().model);

    let mut refine = RefinementLoop::new(client, PricedEstimator::default())
        .with_prompts(Prompts::lateral_thinking_quiz())
        .with_tracing();

    println!("\n=== Generating quiz (max {max_iterations} iterations, threshold {threshold}) ===");
    match refine.run(max_iterations, threshold) {
        Ok(session) => {
            if session.met(threshold) {
                println!("\n=== Threshold met after {} iteration(s) ===", session.iteration());
            } else {
                println!(
                    "\n=== Stopped at {} iteration(s), {:.1} short of the threshold ===",
                    session.iteration(),
                    threshold - session.score()
                );
            }
            for dim in session.dimensions() {
                println!("  {}: {}/{}", dim.name, dim.value, dim.maximum);
            }
            println!("  score: {}", session.score());
            println!("\n=== Final quiz ===\n{}", session.content());
            println!(
                "\n=== Estimated cost: ${:.4} ({} in / {} out tokens) ===",
                session.total_cost(),
                session.tokens_in(),
                session.tokens_out()
            );
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            std::process::exit(1);
        }
    }
}
