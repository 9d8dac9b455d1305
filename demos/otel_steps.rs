// Export every refinement step as an OpenTelemetry span on stdout.
//
// Uses a stub model so it runs offline. The on_step hook backdates each span
// by the step's duration so the exported timings match the calls.
//
// Run: cargo run --example otel_steps

use std::time::SystemTime;

use opentelemetry::KeyValue;
use opentelemetry::trace::{Span, Tracer, TracerProvider as _};
use opentelemetry_sdk::trace::SdkTracerProvider;
use refine_line::{PricedEstimator, Prompts, RefineError, RefinementLoop};

fn main() {
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .build();
    let tracer = provider.tracer("refine-line");
    let error_tracer = tracer.clone();

    let mut scores = vec![45, 70, 88].into_iter();
    let model = move |prompt: &str| -> Result<String, RefineError> {
        if prompt.starts_with("Score") {
            let total = scores.next().unwrap_or(100);
            Ok(format!("Clarity: 7/10\nSurprise: 5/10\nTotal: {total}/100"))
        } else {
            Ok("Why did the lighthouse keeper turn off the light? ...".into())
        }
    };

    let prompts = Prompts::new(
        "Write a lateral thinking puzzle.",
        "Score this puzzle, one line per dimension and a Total line:\n{content}",
        "Revise this puzzle (score {score}), focusing on {focus}:\n{content}",
    );

    let mut refine = RefinementLoop::new(model, PricedEstimator::default())
        .with_prompts(prompts)
        .on_step(move |e| {
            let end = SystemTime::now();
            let mut attributes = vec![
                KeyValue::new("refine.iteration", e.iteration as i64),
                KeyValue::new("refine.tokens_in", e.usage.tokens_in as i64),
                KeyValue::new("refine.tokens_out", e.usage.tokens_out as i64),
                KeyValue::new("refine.cost_usd", e.usage.cost),
            ];
            if let Some(score) = e.score {
                attributes.push(KeyValue::new("refine.score", score));
            }
            if let Some(source) = e.source {
                attributes.push(KeyValue::new("refine.score_fallback", source.is_fallback()));
            }

            let mut span = tracer
                .span_builder(e.phase.as_str())
                .with_start_time(end - e.duration)
                .with_attributes(attributes)
                .start(&tracer);
            span.end_with_timestamp(end);
        })
        .on_error(move |e| {
            let mut span = error_tracer.start(format!("{}-failed", e.phase));
            span.set_attribute(KeyValue::new("error", e.error.to_string()));
            span.end();
        });

    match refine.run(5, 80.0) {
        Ok(session) => println!(
            "done: {} iterations, score {}, ${:.5}",
            session.iteration(),
            session.score(),
            session.total_cost()
        ),
        Err(e) => eprintln!("run failed: {e}"),
    }

    if let Err(e) = provider.shutdown() {
        eprintln!("tracer shutdown: {e}");
    }
}
