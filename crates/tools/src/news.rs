//! News scoring: how good a headline is as the seed of a market.
//!
//! A headline scores well when it points at a future, verifiable event
//! with a clear resolution. Scores are memoized per normalized headline and
//! source in a [`ScoreCache`] owned by whoever builds the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use augur_core::error::ToolError;
use augur_core::tool::Tool;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::parse_input;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Strong,
    Possible,
    Weak,
}

impl Verdict {
    fn from_score(score: u8) -> Self {
        match score {
            70.. => Self::Strong,
            40..=69 => Self::Possible,
            _ => Self::Weak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineScore {
    /// 0 to 100
    pub score: u8,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub suggested_question: Option<String>,
}

/// Anything that can judge a headline.
#[async_trait]
pub trait HeadlineScorer: Send + Sync {
    async fn score(&self, headline: &str, source: Option<&str>) -> Result<HeadlineScore, ToolError>;
}

const FUTURE_WORDS: &[&str] = &[
    "will", "expected", "plans", "planned", "set to", "could", "may", "upcoming", "deadline",
    "proposal", "proposed", "scheduled", "forecast",
];
const EVENT_WORDS: &[&str] = &[
    "election", "vote", "launch", "approve", "approval", "ruling", "verdict", "merger",
    "ipo", "release", "rate", "price", "deal", "summit", "trial", "etf", "championship",
];
const CLICKBAIT_WORDS: &[&str] = &[
    "you won't believe", "opinion", "how to", "why you", "top 10", "best ", "review",
];
const REPUTABLE_SOURCES: &[&str] = &[
    "reuters", "associated press", "ap", "bloomberg", "financial times", "wsj", "bbc",
];

/// Deterministic keyword heuristic.
#[derive(Debug, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    fn evaluate(headline: &str, source: Option<&str>) -> HeadlineScore {
        let lower = headline.to_lowercase();
        let mut score: i32 = 30;
        let mut reasons = Vec::new();

        if FUTURE_WORDS.iter().any(|w| contains_word(&lower, w)) {
            score += 25;
            reasons.push("refers to a future event".to_string());
        }
        if EVENT_WORDS.iter().any(|w| contains_word(&lower, w)) {
            score += 20;
            reasons.push("names a resolvable event".to_string());
        }
        if headline.chars().any(|c| c.is_ascii_digit()) || lower.contains('%') || lower.contains('$') {
            score += 10;
            reasons.push("contains a measurable quantity or date".to_string());
        }
        if CLICKBAIT_WORDS.iter().any(|w| lower.contains(w)) {
            score -= 30;
            reasons.push("reads as opinion or clickbait".to_string());
        }
        if headline.split_whitespace().count() < 4 {
            score -= 15;
            reasons.push("too short to define an outcome".to_string());
        }
        if let Some(source) = source
            && REPUTABLE_SOURCES.iter().any(|s| contains_word(&source.to_lowercase(), s))
        {
            score += 5;
            reasons.push(format!("reported by {source}"));
        }

        let score = score.clamp(0, 100) as u8;
        let verdict = Verdict::from_score(score);
        let suggested_question = (verdict != Verdict::Weak).then(|| suggest_question(headline));

        HeadlineScore {
            score,
            verdict,
            reasons,
            suggested_question,
        }
    }
}

#[async_trait]
impl HeadlineScorer for KeywordScorer {
    async fn score(&self, headline: &str, source: Option<&str>) -> Result<HeadlineScore, ToolError> {
        Ok(Self::evaluate(headline, source))
    }
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .match_indices(needle)
        .any(|(i, _)| {
            let before = haystack[..i].chars().next_back();
            let after = haystack[i + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
}

fn suggest_question(headline: &str) -> String {
    let deadline = (Utc::now() + Duration::days(30)).format("%B %-d, %Y");
    let claim = headline.trim().trim_end_matches(['.', '!', '?']);
    format!("Will this happen by {deadline}: \"{claim}\"?")
}

fn normalize(headline: &str) -> String {
    headline
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Shared memo of headline scores, keyed by headline and source.
#[derive(Clone, Default)]
pub struct ScoreCache {
    inner: Arc<Mutex<HashMap<(String, String), HeadlineScore>>>,
}

fn cache_key(headline: &str, source: Option<&str>) -> (String, String) {
    (normalize(headline), source.map(normalize).unwrap_or_default())
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, headline: &str, source: Option<&str>) -> Option<HeadlineScore> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(&cache_key(headline, source)).cloned()
    }

    pub fn insert(&self, headline: &str, source: Option<&str>, score: HeadlineScore) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(cache_key(headline, source), score);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct ScoreNewsTool {
    scorer: Arc<dyn HeadlineScorer>,
    cache: ScoreCache,
}

#[derive(Deserialize)]
struct ScoreNewsInput {
    headline: String,
    source: Option<String>,
}

impl ScoreNewsTool {
    pub fn new(scorer: Arc<dyn HeadlineScorer>, cache: ScoreCache) -> Self {
        Self { scorer, cache }
    }
}

#[async_trait]
impl Tool for ScoreNewsTool {
    fn name(&self) -> &str {
        "score_news"
    }

    fn description(&self) -> &str {
        "Score a news headline (0-100) for how well it would work as a prediction market, with reasons and a suggested market question."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "headline": { "type": "string", "description": "The news headline" },
                "source": { "type": "string", "description": "Publisher, if known" }
            },
            "required": ["headline"]
        })
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: ScoreNewsInput = parse_input(input)?;
        if input.headline.trim().is_empty() {
            return Err(ToolError::InvalidArguments("headline must not be empty".into()));
        }

        let source = input.source.as_deref();
        let (score, cached) = match self.cache.get(&input.headline, source) {
            Some(score) => {
                debug!(headline = %input.headline, "Score cache hit");
                (score, true)
            }
            None => {
                let score = self.scorer.score(&input.headline, source).await?;
                self.cache.insert(&input.headline, source, score.clone());
                (score, false)
            }
        };

        Ok(json!({
            "headline": input.headline,
            "score": score.score,
            "verdict": score.verdict,
            "reasons": score.reasons,
            "suggestedQuestion": score.suggested_question,
            "cached": cached,
        }))
    }
}
