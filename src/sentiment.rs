//! Sentiment scoring.
//!
//! The analytics only need `text -> score in [-1, 1]`. Scorers are built once at
//! startup and handed to whoever needs them as `Arc<dyn SentimentScorer>`.
//!
//! - `LexiconScorer`: valence sum with negation, boosters and emphasis, squashed into [-1, 1]
//! - `PolarityScorer`: mean word polarity with negation flip
//! - `EnsembleScorer`: combines members by one of three `EnsembleMethod`s

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::indicators::patterns::{mean, population_std};
use crate::models::{RawItem, SentimentSample};

pub trait SentimentScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Score in [-1, 1]. Empty or unknown text scores 0.
    fn score(&self, text: &str) -> f64;
}

/// Word valences on a [-4, 4] scale.
const VALENCE: &[(&str, f64)] = &[
    ("happy", 2.7),
    ("glad", 2.0),
    ("joy", 2.8),
    ("love", 3.2),
    ("loved", 2.9),
    ("great", 3.1),
    ("good", 1.9),
    ("nice", 1.8),
    ("excited", 2.2),
    ("exciting", 2.2),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("wonderful", 2.7),
    ("fantastic", 2.6),
    ("grateful", 2.5),
    ("thankful", 2.4),
    ("hope", 1.9),
    ("hopeful", 2.3),
    ("better", 1.9),
    ("calm", 1.3),
    ("proud", 2.1),
    ("relieved", 1.6),
    ("fine", 0.8),
    ("okay", 0.9),
    ("win", 2.8),
    ("beautiful", 2.9),
    ("enjoy", 2.2),
    ("fun", 2.3),
    ("safe", 1.9),
    ("support", 1.7),
    ("sad", -2.1),
    ("unhappy", -1.8),
    ("bad", -2.5),
    ("terrible", -2.1),
    ("awful", -2.0),
    ("horrible", -2.5),
    ("hate", -2.7),
    ("angry", -2.3),
    ("depressed", -2.3),
    ("depressing", -1.6),
    ("depression", -1.9),
    ("anxious", -1.0),
    ("anxiety", -0.7),
    ("lonely", -1.8),
    ("alone", -1.0),
    ("hopeless", -2.0),
    ("worthless", -1.9),
    ("tired", -1.9),
    ("exhausted", -1.5),
    ("hurt", -2.4),
    ("pain", -2.3),
    ("cry", -2.1),
    ("crying", -2.1),
    ("scared", -1.9),
    ("afraid", -2.0),
    ("worse", -2.1),
    ("worst", -3.1),
    ("fail", -2.5),
    ("failed", -2.3),
    ("miserable", -2.2),
    ("stress", -1.8),
    ("stressed", -1.4),
    ("panic", -2.3),
    ("broken", -1.4),
    ("lost", -1.3),
    ("suicidal", -3.6),
    ("die", -2.9),
];

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "nothing", "nobody", "none", "neither", "nor", "cannot", "without",
];

const BOOSTERS: &[(&str, f64)] = &[
    ("very", 0.293),
    ("really", 0.293),
    ("extremely", 0.293),
    ("so", 0.293),
    ("totally", 0.293),
    ("incredibly", 0.293),
    ("super", 0.293),
    ("slightly", -0.293),
    ("somewhat", -0.293),
    ("barely", -0.293),
];

const NEGATION_SCALAR: f64 = -0.74;
const EMPHASIS_PER_MARK: f64 = 0.292;
const NORMALIZATION_ALPHA: f64 = 15.0;

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

fn is_negation(token: &str) -> bool {
    NEGATIONS.contains(&token) || token.ends_with("n't")
}

struct Lexicon {
    valence: HashMap<&'static str, f64>,
    boosters: HashMap<&'static str, f64>,
}

impl Lexicon {
    fn builtin() -> Self {
        Self {
            valence: VALENCE.iter().copied().collect(),
            boosters: BOOSTERS.iter().copied().collect(),
        }
    }

    /// Valence of each sentiment-bearing token after boosters and negation
    /// within the three preceding tokens.
    fn adjusted_valences(&self, tokens: &[String]) -> Vec<f64> {
        let mut out = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(&base) = self.valence.get(token.as_str()) else {
                continue;
            };
            let mut v = base;
            let window = &tokens[i.saturating_sub(3)..i];

            for prev in window {
                if let Some(&boost) = self.boosters.get(prev.as_str()) {
                    v += boost * v.signum();
                }
            }
            if window.iter().any(|t| is_negation(t)) {
                v *= NEGATION_SCALAR;
            }
            out.push(v);
        }
        out
    }
}

/// Valence-sum scorer in the style of rule-based social-media lexicons.
pub struct LexiconScorer {
    lexicon: Lexicon,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        Self {
            lexicon: Lexicon::builtin(),
        }
    }
}

impl SentimentScorer for LexiconScorer {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn score(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        let mut sum: f64 = self.lexicon.adjusted_valences(&tokens).iter().sum();
        if sum == 0.0 {
            return 0.0;
        }

        let marks = text.chars().filter(|&c| c == '!').count().min(4) as f64;
        sum += marks * EMPHASIS_PER_MARK * sum.signum();

        (sum / (sum * sum + NORMALIZATION_ALPHA).sqrt()).clamp(-1.0, 1.0)
    }
}

/// Mean polarity of the sentiment-bearing words.
pub struct PolarityScorer {
    lexicon: Lexicon,
}

impl Default for PolarityScorer {
    fn default() -> Self {
        Self {
            lexicon: Lexicon::builtin(),
        }
    }
}

impl SentimentScorer for PolarityScorer {
    fn name(&self) -> &str {
        "polarity"
    }

    fn score(&self, text: &str) -> f64 {
        let tokens = tokenize(text);
        let mut polarities = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(&valence) = self.lexicon.valence.get(token.as_str()) else {
                continue;
            };
            let mut p = valence / 4.0;
            if i > 0 && self.lexicon.boosters.contains_key(tokens[i - 1].as_str()) {
                p *= 1.3;
            }
            if tokens[i.saturating_sub(2)..i].iter().any(|t| is_negation(t)) {
                p *= -0.5;
            }
            polarities.push(p.clamp(-1.0, 1.0));
        }
        if polarities.is_empty() {
            return 0.0;
        }
        polarities.iter().sum::<f64>() / polarities.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMethod {
    #[default]
    WeightedAverage,
    SimpleAverage,
    ConfidenceWeighted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agreement {
    /// All members share the same non-zero sign.
    pub directional: bool,
    pub variance: f64,
    /// `1 / (1 + variance)`; higher means closer agreement.
    pub agreement_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsemblePrediction {
    pub score: f64,
    pub individual: Vec<(String, f64)>,
    /// Mean magnitude of member scores.
    pub confidence: f64,
    pub agreement: Agreement,
}

struct Member {
    scorer: Box<dyn SentimentScorer>,
    weight: f64,
}

pub struct EnsembleScorer {
    members: Vec<Member>,
    method: EnsembleMethod,
}

impl EnsembleScorer {
    pub fn new(method: EnsembleMethod) -> Self {
        Self {
            members: Vec::new(),
            method,
        }
    }

    pub fn with_member(mut self, scorer: Box<dyn SentimentScorer>, weight: f64) -> Self {
        self.members.push(Member { scorer, weight });
        self
    }

    pub fn method(&self) -> EnsembleMethod {
        self.method
    }

    pub fn predict(&self, text: &str) -> EnsemblePrediction {
        let individual: Vec<(String, f64)> = self
            .members
            .iter()
            .map(|m| (m.scorer.name().to_string(), m.scorer.score(text)))
            .collect();
        let scores: Vec<f64> = individual.iter().map(|(_, s)| *s).collect();

        let score = match self.method {
            EnsembleMethod::WeightedAverage => {
                let weights: Vec<f64> = self.members.iter().map(|m| m.weight).collect();
                weighted_mean(&scores, &weights)
            }
            EnsembleMethod::SimpleAverage => mean(&scores),
            EnsembleMethod::ConfidenceWeighted => {
                let weights: Vec<f64> = scores.iter().map(|s| s.abs()).collect();
                weighted_mean(&scores, &weights)
            }
        };

        EnsemblePrediction {
            score: score.clamp(-1.0, 1.0),
            confidence: mean(
                &scores.iter().map(|s| s.abs()).collect::<Vec<_>>(),
            ),
            agreement: agreement(&scores),
            individual,
        }
    }
}

impl SentimentScorer for EnsembleScorer {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn score(&self, text: &str) -> f64 {
        self.predict(text).score
    }
}

/// Weighted mean normalized by the weight total; 0 when the weights sum to 0.
fn weighted_mean(values: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total
}

fn agreement(scores: &[f64]) -> Agreement {
    let sign = |v: f64| {
        if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else {
            0
        }
    };
    let directional = match scores.first() {
        Some(&first) => sign(first) != 0 && scores.iter().all(|&s| sign(s) == sign(first)),
        None => false,
    };
    let std = population_std(scores.iter().copied());
    let variance = std * std;
    Agreement {
        directional,
        variance,
        agreement_score: 1.0 / (1.0 + variance),
    }
}

/// Scores every item, keeping its timestamp and group id.
pub fn score_items(items: &[RawItem], scorer: &dyn SentimentScorer) -> Vec<SentimentSample> {
    items
        .iter()
        .map(|item| SentimentSample {
            timestamp: item.timestamp,
            score: scorer.score(&item.text),
            group_id: item.group_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct Fixed(&'static str, f64);

    impl SentimentScorer for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn score(&self, _text: &str) -> f64 {
            self.1
        }
    }

    fn default_ensemble() -> EnsembleScorer {
        EnsembleScorer::new(EnsembleMethod::WeightedAverage)
            .with_member(Box::new(LexiconScorer::default()), 0.5)
            .with_member(Box::new(PolarityScorer::default()), 0.5)
    }

    #[test]
    fn positive_text_scores_positive() {
        let scorer = default_ensemble();
        assert!(scorer.score("I am very happy and excited!") > 0.0);
        assert!(LexiconScorer::default().score("I am very happy and excited!") > 0.5);
    }

    #[test]
    fn negative_text_scores_negative() {
        let scorer = default_ensemble();
        assert!(scorer.score("This is terrible and depressing.") < 0.0);
    }

    #[test]
    fn neutral_text_scores_near_zero() {
        let score = default_ensemble().score("The sky is blue.");
        assert!(-0.2 < score && score < 0.2);
        assert_eq!(default_ensemble().score(""), 0.0);
    }

    #[test]
    fn negation_flips_direction() {
        let lexicon = LexiconScorer::default();
        assert!(lexicon.score("I am happy") > 0.0);
        assert!(lexicon.score("I am not happy") < 0.0);
        assert!(lexicon.score("I don't feel good") < 0.0);
        assert!(PolarityScorer::default().score("not good") < 0.0);
    }

    #[test]
    fn exclamation_adds_emphasis() {
        let lexicon = LexiconScorer::default();
        assert!(lexicon.score("great!!!") > lexicon.score("great"));
    }

    #[test]
    fn scores_stay_in_range() {
        let text = "love love love amazing awesome wonderful great great!!!!";
        let s = LexiconScorer::default().score(text);
        assert!(s <= 1.0 && s > 0.9);
    }

    #[test]
    fn ensemble_methods_combine_members() {
        let build = |method| {
            EnsembleScorer::new(method)
                .with_member(Box::new(Fixed("a", 0.8)), 0.75)
                .with_member(Box::new(Fixed("b", -0.2)), 0.25)
        };

        let weighted = build(EnsembleMethod::WeightedAverage).predict("x");
        assert!((weighted.score - 0.55).abs() < 1e-12);

        let simple = build(EnsembleMethod::SimpleAverage).predict("x");
        assert!((simple.score - 0.3).abs() < 1e-12);

        // (0.8*0.8 - 0.2*0.2) / 1.0
        let confident = build(EnsembleMethod::ConfidenceWeighted).predict("x");
        assert!((confident.score - 0.6).abs() < 1e-12);

        assert!((weighted.confidence - 0.5).abs() < 1e-12);
        assert!(!weighted.agreement.directional);
        assert!((weighted.agreement.variance - 0.25).abs() < 1e-12);
        assert!((weighted.agreement.agreement_score - 0.8).abs() < 1e-12);
        assert_eq!(weighted.individual[0], ("a".to_string(), 0.8));
    }

    #[test]
    fn confidence_weighted_with_all_zero_scores_is_zero() {
        let scorer = EnsembleScorer::new(EnsembleMethod::ConfidenceWeighted)
            .with_member(Box::new(Fixed("a", 0.0)), 1.0)
            .with_member(Box::new(Fixed("b", 0.0)), 1.0);
        let prediction = scorer.predict("x");
        assert_eq!(prediction.score, 0.0);
        assert!(!prediction.agreement.directional);
    }

    #[test]
    fn method_names_deserialize_from_snake_case() {
        let method: EnsembleMethod = serde_yaml::from_str("confidence_weighted").unwrap();
        assert_eq!(method, EnsembleMethod::ConfidenceWeighted);
    }

    #[test]
    fn items_keep_timestamp_and_group() {
        let ts = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let items = vec![RawItem {
            timestamp: ts,
            text: "so happy".into(),
            group_id: Some("mentalhealth".into()),
        }];
        let samples = score_items(&items, &LexiconScorer::default());
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, ts);
        assert_eq!(samples[0].group_id.as_deref(), Some("mentalhealth"));
        assert!(samples[0].score > 0.0);
    }
}
