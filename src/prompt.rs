/// The three prompts a refinement run sends.
///
/// Templates use `{content}`, `{score}` and `{focus}` placeholders. `{content}`
/// is substituted last so text inside a candidate is never re-expanded.
#[derive(Debug, Clone)]
pub struct Prompts {
    /// Sent once, as-is, to produce the first draft.
    pub create: String,
    /// Rubric prompt; expects `{content}`.
    pub rubric: String,
    /// Revision prompt; expects `{content}`, `{score}` and `{focus}`.
    pub improve: String,
    /// Dimensions to emphasise when the rubric response names none.
    pub default_focus: Vec<String>,
}

impl Prompts {
    pub fn new(
        create: impl Into<String>,
        rubric: impl Into<String>,
        improve: impl Into<String>,
    ) -> Self {
        Self {
            create: create.into(),
            rubric: rubric.into(),
            improve: improve.into(),
            default_focus: vec![],
        }
    }

    pub fn with_default_focus<I, S>(mut self, focus: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_focus = focus.into_iter().map(Into::into).collect();
        self
    }

    /// Lateral-thinking quiz: four dimensions scored out of 10, total out of 100.
    pub fn lateral_thinking_quiz() -> Self {
        Self::new(
            "水平思考クイズを1つ作成してください。次の要素を含めてください。\n\
             - 謎めいた状況の説明\n\
             - 解答\n\
             - 解説\n\n\
             論理的に解けるクイズにしてください。",
            "次の水平思考クイズの品質を評価してください。\n\
             各項目を0から10点で採点し、合計を100点満点に換算してください。\n\n\
             評価対象のクイズ:\n{content}\n\n\
             評価項目:\n\
             1. 論理性: 解答までの道筋が論理的か\n\
             2. オリジナリティ: 既存のクイズに似ていないか\n\
             3. 解きやすさ: ヒントから解答にたどり着けるか\n\
             4. 面白さ: 解答を聞いたときの驚きと納得感\n\n\
             各項目の点数と合計点を必ず次の形式で記載してください。\n\
             論理性: X/10\n\
             オリジナリティ: X/10\n\
             解きやすさ: X/10\n\
             面白さ: X/10\n\
             合計: XX/100",
            "次の水平思考クイズを改善してください。\n{content}\n\n\
             現在の品質スコア: {score}\n\
             特に{focus}を重視して改善してください。",
        )
        .with_default_focus(["論理性", "解きやすさ"])
    }

    pub fn render_rubric(&self, content: &str) -> String {
        self.rubric.replace("{content}", content)
    }

    /// `focus` falls back to [`default_focus`](Self::default_focus) when empty.
    pub fn render_improve(&self, content: &str, score: f64, focus: &[&str]) -> String {
        let focus = if focus.is_empty() {
            self.default_focus.join("、")
        } else {
            focus.join("、")
        };
        self.improve
            .replace("{score}", &format_score(score))
            .replace("{focus}", &focus)
            .replace("{content}", content)
    }
}

impl Default for Prompts {
    fn default() -> Self {
        Self::lateral_thinking_quiz()
    }
}

/// `75` rather than `75.0`, `72.5` as is.
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{score:.0}")
    } else {
        format!("{score}")
    }
}
