//! Prompt construction for the fact-check request.

/// Article text beyond this many characters is cut before sending.
pub const MAX_ARTICLE_CHARS: usize = 28_000;

const TRUNCATION_MARK: &str = "\n\n[Article truncated...]";

const INSTRUCTIONS: &str = "You are an expert fact-checker and media analyst. Your task is to evaluate a news article for accuracy and potential misinformation, and to assess its editorial/political bias.

Consider:
- Whether claims are verifiable or speculative
- Use of loaded language, exaggeration, or one-sided framing
- Omission of important context that could change the meaning
- Consistency with widely accepted facts and established reporting
- Sensationalism vs. measured tone
{today}- Comparison to reputable sources
- For BIAS: overall political/editorial leaning (Left, Center, Right) and strength (Low, Moderate, High)
Respond in this exact format only (no other text):
SCORE: [integer from 1 to 10]
BIAS: [Left|Center|Right], [Low|Moderate|High]
QUOTES:
- \"[Exact quote from article]\" — [One sentence explaining why it is factually wrong or biased]
- \"[Another quote]\" — [One sentence reason]
- [Up to 5 entries; use \"- None identified\" if no clear false or biased quotes]
SUMMARY: [your full explanation in one or two sentences]

Where 10 = no significant misinformation, factual and balanced; 1 = highly misleading or containing clear misinformation. List only actual phrases/sentences from the article that are false, misleading, or clearly biased.";

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    /// Free-form date shown to the model, e.g. "2026-10-18".
    pub today: Option<String>,
}

impl PromptBuilder {
    pub fn from_env() -> Self {
        let today = std::env::var("VERACITY_TODAY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { today }
    }

    pub fn with_today(mut self, today: impl Into<String>) -> Self {
        self.today = Some(today.into());
        self
    }

    pub fn build(&self, article_text: &str) -> String {
        let today = match self.today.as_deref() {
            Some(d) => format!("- Today is {d}\n"),
            None => String::new(),
        };
        let instructions = INSTRUCTIONS.replace("{today}", &today);
        format!(
            "{instructions}\n\n---\n\nARTICLE TO EVALUATE:\n\n{}",
            truncate_article(article_text)
        )
    }
}

/// Cuts at a char boundary and appends the truncation marker when cut.
pub fn truncate_article(text: &str) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(MAX_ARTICLE_CHARS) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARK}", &text[..cut]).into(),
        None => text.into(),
    }
}
