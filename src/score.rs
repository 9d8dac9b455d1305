//! Best-effort extraction of a rubric score from free text.
//!
//! A rubric response looks like:
//!
//! ```text
//! 論理性: 8/10
//! オリジナリティ: 7/10
//! 解きやすさ: 6/10
//! 面白さ: 9/10
//! 合計: 75/100
//! ```
//!
//! The total line decides the score. Parsing never fails: a response without
//! a usable total line yields the caller's fallback score, tagged as
//! [`ScoreSource::Fallback`] so it can't be mistaken for a real judgment.

/// Labels that mark the aggregate line.
pub const TOTAL_MARKERS: &[&str] = &["合計", "Total", "TOTAL", "total"];

/// Score used when a rubric response can't be parsed.
pub const DEFAULT_FALLBACK_SCORE: f64 = 70.0;

/// One scored rubric dimension, e.g. `論理性: 8/10`.
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionScore {
    pub name: String,
    pub value: f64,
    pub maximum: f64,
}

impl DimensionScore {
    /// Fraction of full marks, 0.0 when the maximum is not positive.
    pub fn ratio(&self) -> f64 {
        if self.maximum > 0.0 {
            self.value / self.maximum
        } else {
            0.0
        }
    }
}

/// Where a score came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreSource {
    /// Read from the total line.
    Parsed,
    /// The response had no usable total line; the reason says why.
    Fallback(String),
}

impl ScoreSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ScoreSource::Fallback(_))
    }
}

/// Everything extracted from one rubric response.
#[derive(Debug, Clone, PartialEq)]
pub struct Scorecard {
    /// Aggregate score in `[0, 100]`.
    pub score: f64,
    /// The maximum written on the total line, if any.
    pub maximum: Option<f64>,
    pub dimensions: Vec<DimensionScore>,
    pub source: ScoreSource,
}

impl Scorecard {
    /// Up to `n` dimensions below full marks, weakest first.
    pub fn weakest(&self, n: usize) -> Vec<&DimensionScore> {
        weakest(&self.dimensions, n)
    }

    /// Whether the total line declared a scale other than 100.
    pub fn scale_mismatch(&self) -> bool {
        self.maximum.is_some_and(|m| (m - 100.0).abs() > f64::EPSILON)
    }
}

/// Up to `n` of `dimensions` below full marks, weakest first. Ties keep
/// rubric order.
pub fn weakest(dimensions: &[DimensionScore], n: usize) -> Vec<&DimensionScore> {
    let mut dims: Vec<&DimensionScore> = dimensions.iter().filter(|d| d.ratio() < 1.0).collect();
    dims.sort_by(|a, b| {
        a.ratio()
            .partial_cmp(&b.ratio())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    dims.truncate(n);
    dims
}

/// Parse a rubric response. The first total line decides; its value is
/// clamped into `[0, 100]`. Without one, `fallback` is used.
pub fn parse_scorecard(response: &str, fallback: f64) -> Scorecard {
    let mut total: Option<Result<(f64, Option<f64>), String>> = None;
    let mut dimensions = Vec::new();

    for line in response.lines() {
        let Some((label, rest)) = split_label(line) else {
            continue;
        };

        if is_total_label(label) {
            if total.is_none() {
                total = Some(parse_fraction(rest));
            }
            continue;
        }

        if let Ok((value, Some(maximum))) = parse_fraction(rest) {
            let name = clean_name(label);
            if !name.is_empty() {
                dimensions.push(DimensionScore {
                    name: name.to_string(),
                    value,
                    maximum,
                });
            }
        }
    }

    match total {
        Some(Ok((value, maximum))) => Scorecard {
            score: value.clamp(0.0, 100.0),
            maximum,
            dimensions,
            source: ScoreSource::Parsed,
        },
        Some(Err(reason)) => Scorecard {
            score: fallback,
            maximum: None,
            dimensions,
            source: ScoreSource::Fallback(reason),
        },
        None => Scorecard {
            score: fallback,
            maximum: None,
            dimensions,
            source: ScoreSource::Fallback("no total line found".into()),
        },
    }
}

/// Split `label: rest` on the first ASCII or full-width colon.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let (idx, colon) = line.char_indices().find(|(_, c)| *c == ':' || *c == '：')?;
    Some((&line[..idx], &line[idx + colon.len_utf8()..]))
}

fn is_total_label(label: &str) -> bool {
    let label = label.trim_end_matches(|c: char| c.is_whitespace() || c == '*');
    TOTAL_MARKERS.iter().any(|marker| {
        label.strip_suffix(*marker).is_some_and(|head| {
            // "Subtotal" is not a total
            head.chars().last().is_none_or(|c| !c.is_ascii_alphabetic())
        })
    })
}

/// Parse `value/maximum`. The maximum is optional only in the sense that a
/// garbled one doesn't invalidate the value.
fn parse_fraction(text: &str) -> Result<(f64, Option<f64>), String> {
    let text = text.trim().trim_matches('*').trim();
    let (value, maximum) = text
        .split_once('/')
        .ok_or_else(|| format!("no value/maximum pair in '{text}'"))?;

    let value = value.trim().trim_matches('*').trim();
    let value: f64 = value
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("unparseable score value '{value}'"))?;

    let digits: String = maximum
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let maximum = digits.parse::<f64>().ok().filter(|m| m.is_finite());

    Ok((value, maximum))
}

fn clean_name(label: &str) -> &str {
    label
        .trim_start_matches(|c: char| {
            c.is_whitespace() || c.is_ascii_digit() || matches!(c, '-' | '*' | '#' | '.' | ')')
        })
        .trim_end_matches(|c: char| c.is_whitespace() || c == '*')
}
