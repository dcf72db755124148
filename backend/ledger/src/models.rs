//! # Documents
//!
//! Shapes of everything persisted in the store. Field names are camelCase so
//! the JSON matches what the frontend already reads.
//!
//! - Users: uid, email, displayName, **points**, createdAt
//! - Quizzes: immutable once published, read-only to the backend
//! - Predictions: options with fixed odds, lifecycle status, optional result
//! - Bets: created once on placement, mutated once on settlement, never deleted
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::LedgerError;

pub const STARTING_POINTS: u64 = 1000;

/// Parse-then-validate step applied to every record coming out of the store.
pub trait Document: DeserializeOwned {
    const KIND: &'static str;

    fn validate(&self) -> Result<(), LedgerError>;
}

pub fn parse_document<T: Document>(raw: &str) -> Result<T, LedgerError> {
    let document: T = serde_json::from_str(raw).map_err(|e| LedgerError::corrupt(T::KIND, e))?;
    document.validate()?;

    Ok(document)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub points: u64,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        uid: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: display_name.into(),
            points: STARTING_POINTS,
            created_at: now,
        }
    }

    /// Users live in a hash so the balance can be incremented in place.
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("uid", self.uid.clone()),
            ("email", self.email.clone()),
            ("displayName", self.display_name.clone()),
            ("points", self.points.to_string()),
            ("createdAt", self.created_at.to_rfc3339()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, LedgerError> {
        let field = |name: &str| {
            fields
                .get(name)
                .ok_or_else(|| LedgerError::corrupt("user", format!("missing {name}")))
        };

        let uid = field("uid")?.clone();
        if uid.is_empty() {
            return Err(LedgerError::corrupt("user", "empty uid"));
        }

        Ok(Self {
            uid,
            email: fields.get("email").cloned().unwrap_or_default(),
            display_name: fields.get("displayName").cloned().unwrap_or_default(),
            points: field("points")?
                .parse()
                .map_err(|e| LedgerError::corrupt("user", e))?,
            created_at: DateTime::parse_from_rfc3339(field("createdAt")?)
                .map_err(|e| LedgerError::corrupt("user", e))?
                .with_timezone(&Utc),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuizType {
    Weekly,
    RaceWeekend,
    Historical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizCategory {
    General,
    Drivers,
    Teams,
    Circuits,
    History,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub quiz_type: QuizType,
    pub questions: Vec<QuizQuestion>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub points_per_question: u64,
    pub difficulty: Difficulty,
    pub category: QuizCategory,
}

impl Quiz {
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }
}

impl Document for Quiz {
    const KIND: &'static str = "quiz";

    fn validate(&self) -> Result<(), LedgerError> {
        if self.id.is_empty() {
            return Err(LedgerError::corrupt(Self::KIND, "empty id"));
        }
        if self.start_date > self.end_date {
            return Err(LedgerError::corrupt(Self::KIND, "window ends before it starts"));
        }
        if self.questions.is_empty() {
            return Err(LedgerError::corrupt(Self::KIND, "no questions"));
        }

        for (index, question) in self.questions.iter().enumerate() {
            if question.correct_answer >= question.options.len() {
                return Err(LedgerError::corrupt(
                    Self::KIND,
                    format!("question {index} has no option {}", question.correct_answer),
                ));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionCategory {
    Race,
    Qualifying,
    Sprint,
    Practice,
}

impl PredictionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionCategory::Race => "race",
            PredictionCategory::Qualifying => "qualifying",
            PredictionCategory::Sprint => "sprint",
            PredictionCategory::Practice => "practice",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionType {
    Winner,
    Podium,
    FastestLap,
    PolePosition,
    Constructor,
    SafetyCar,
    RedFlag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Upcoming,
    Active,
    Completed,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionOption {
    pub text: String,
    pub odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub id: String,
    pub event_name: String,
    #[serde(default)]
    pub description: String,
    pub category: PredictionCategory,
    #[serde(rename = "type")]
    pub prediction_type: PredictionType,
    pub options: Vec<PredictionOption>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<usize>,
    pub status: PredictionStatus,
    pub race_weekend: String,
    pub circuit: String,
}

impl Prediction {
    /// Open for bets: active, no result recorded yet, inside its window.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == PredictionStatus::Active
            && self.result.is_none()
            && self.start_date <= now
            && now <= self.end_date
    }

    pub fn option(&self, index: usize) -> Option<&PredictionOption> {
        self.options.get(index)
    }
}

impl Document for Prediction {
    const KIND: &'static str = "prediction";

    fn validate(&self) -> Result<(), LedgerError> {
        if self.id.is_empty() {
            return Err(LedgerError::corrupt(Self::KIND, "empty id"));
        }
        if self.start_date > self.end_date {
            return Err(LedgerError::corrupt(Self::KIND, "window ends before it starts"));
        }
        if self.options.is_empty() {
            return Err(LedgerError::corrupt(Self::KIND, "no options"));
        }
        if let Some(option) = self
            .options
            .iter()
            .find(|option| !option.odds.is_finite() || option.odds < 1.0)
        {
            return Err(LedgerError::corrupt(
                Self::KIND,
                format!("odds {} for {} below 1.0", option.odds, option.text),
            ));
        }

        match (self.status, self.result) {
            (_, Some(result)) if result >= self.options.len() => Err(LedgerError::corrupt(
                Self::KIND,
                format!("result {result} out of range"),
            )),
            (PredictionStatus::Completed, None) => {
                Err(LedgerError::corrupt(Self::KIND, "completed without a result"))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetResult {
    Won,
    Lost,
    Refunded,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBet {
    pub id: String,
    pub uid: String,
    pub prediction_id: String,
    pub selected_option: usize,
    pub amount: u64,
    pub timestamp: DateTime<Utc>,
    // absent until settled, the store scripts test for the missing key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<BetResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_won: Option<u64>,
}

impl UserBet {
    pub fn is_settled(&self) -> bool {
        self.result.is_some()
    }
}

impl Document for UserBet {
    const KIND: &'static str = "bet";

    fn validate(&self) -> Result<(), LedgerError> {
        if self.id.is_empty() || self.uid.is_empty() || self.prediction_id.is_empty() {
            return Err(LedgerError::corrupt(Self::KIND, "missing reference"));
        }
        if self.amount == 0 {
            return Err(LedgerError::corrupt(Self::KIND, "zero amount"));
        }
        if self.result.is_some() != self.points_won.is_some() {
            return Err(LedgerError::corrupt(
                Self::KIND,
                "result and pointsWon must be set together",
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_bets: u64,
    pub winning_bets: u64,
    pub total_points_won: u64,
    pub total_points_lost: u64,
    pub favorite_category: String,
    pub best_circuit: String,
}

impl UserStats {
    pub fn win_rate(&self) -> Option<f64> {
        (self.total_bets > 0).then(|| self.winning_bets as f64 / self.total_bets as f64)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;

    pub fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 15, 0, 0).unwrap()
    }

    pub fn prediction(id: &str, odds: &[f64]) -> Prediction {
        Prediction {
            id: id.to_string(),
            event_name: "Bahrain GP - Race Winner".to_string(),
            description: "Who will win the Bahrain Grand Prix?".to_string(),
            category: PredictionCategory::Race,
            prediction_type: PredictionType::Winner,
            options: odds
                .iter()
                .enumerate()
                .map(|(index, &odds)| PredictionOption {
                    text: format!("Driver {index}"),
                    odds,
                    description: None,
                    image_url: None,
                })
                .collect(),
            start_date: now() - Duration::hours(1),
            end_date: now() + Duration::hours(24),
            result: None,
            status: PredictionStatus::Active,
            race_weekend: "bahrain-2025".to_string(),
            circuit: "bahrain".to_string(),
        }
    }

    pub fn bet(id: &str, prediction_id: &str, selected_option: usize, amount: u64) -> UserBet {
        UserBet {
            id: id.to_string(),
            uid: "driver-fan".to_string(),
            prediction_id: prediction_id.to_string(),
            selected_option,
            amount,
            timestamp: now(),
            result: None,
            points_won: None,
        }
    }

    pub fn quiz(id: &str) -> Quiz {
        Quiz {
            id: id.to_string(),
            title: "Weekly Warmup".to_string(),
            quiz_type: QuizType::Weekly,
            questions: vec![
                QuizQuestion {
                    question: "Who won the 2021 championship?".to_string(),
                    options: vec!["Hamilton".to_string(), "Verstappen".to_string()],
                    correct_answer: 1,
                    explanation: Some("Abu Dhabi, final lap".to_string()),
                    image_url: None,
                },
                QuizQuestion {
                    question: "Where is Eau Rouge?".to_string(),
                    options: vec![
                        "Monza".to_string(),
                        "Spa".to_string(),
                        "Suzuka".to_string(),
                    ],
                    correct_answer: 1,
                    explanation: None,
                    image_url: None,
                },
            ],
            start_date: now() - Duration::days(1),
            end_date: now() + Duration::days(6),
            points_per_question: 10,
            difficulty: Difficulty::Easy,
            category: QuizCategory::General,
        }
    }
}
