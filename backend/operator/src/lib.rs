//! # Operator
//!
//! Out of band tooling for the people running the game. Nothing here is reachable
//! from the public API.
//!
//! ## Seeding
//!
//! A catalog is one JSON file with `predictions` and `quizzes` arrays, read from disk or
//! fetched over HTTP. Documents without an id get one derived from their name, e.g.
//! `bahrain-2025` + `Race Winner` becomes `bahrain-2025-race-winner`. Every document is
//! validated before it is written. Rejected documents are reported and skipped, the rest
//! of the catalog still goes in. Re-seeding is safe: an open prediction is overwritten,
//! but settled or cancelled predictions and published quizzes only accept an identical copy.
//!
//! ## Settlement
//!
//! `settle` records the outcome and pays out, `cancel` refunds every stake. Both are safe
//! to re-run: bets already resolved are skipped.
use std::fmt;

use ledger::{LedgerError, Prediction, Quiz, settlement::SettlementReport};
use serde::de::DeserializeOwned;
use serde_json::Value;
use server::{bookmaker::Bookmaker, database::Store, error::AppError};
use tracing::{info, warn};

pub mod models;
pub mod utils;

use models::Catalog;
use utils::{progress_bar, read_source};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub predictions: usize,
    pub quizzes: usize,
    pub rejected: Vec<String>,
}

impl fmt::Display for SeedSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Predictions Published: {}", self.predictions)?;
        writeln!(f, "Quizzes Published: {}", self.quizzes)?;
        write!(f, "Rejected: {}", self.rejected.len())?;

        for reason in &self.rejected {
            write!(f, "\n  - {reason}")?;
        }

        Ok(())
    }
}

pub async fn seed<S: Store>(bookmaker: &Bookmaker<S>, source: &str) -> anyhow::Result<SeedSummary> {
    let raw = read_source(source).await?;
    let catalog = Catalog::parse(&raw)?;

    info!(
        "Loaded catalog from {source}: {} predictions, {} quizzes",
        catalog.predictions.len(),
        catalog.quizzes.len()
    );

    publish_catalog(bookmaker, catalog).await
}

pub async fn publish_catalog<S: Store>(
    bookmaker: &Bookmaker<S>,
    catalog: Catalog,
) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();
    let pb = progress_bar(catalog.len())?;

    for (index, document) in catalog.predictions.into_iter().enumerate() {
        let label = label("prediction", index, &document);
        pb.set_message(format!("Publishing {label}"));

        match decode::<Prediction>(document) {
            Ok(prediction) => match bookmaker.publish_prediction(prediction).await {
                Ok(_) => summary.predictions += 1,
                Err(e) if skippable(&e) => reject(&mut summary, &label, e),
                Err(e) => return Err(e.into()),
            },
            Err(e) => reject(&mut summary, &label, e),
        }

        pb.inc(1);
    }

    for (index, document) in catalog.quizzes.into_iter().enumerate() {
        let label = label("quiz", index, &document);
        pb.set_message(format!("Publishing {label}"));

        match decode::<Quiz>(document) {
            Ok(quiz) => match bookmaker.publish_quiz(quiz).await {
                Ok(_) => summary.quizzes += 1,
                Err(e) if skippable(&e) => reject(&mut summary, &label, e),
                Err(e) => return Err(e.into()),
            },
            Err(e) => reject(&mut summary, &label, e),
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");

    Ok(summary)
}

pub async fn settle<S: Store>(
    bookmaker: &Bookmaker<S>,
    prediction_id: &str,
    winning_option: usize,
) -> anyhow::Result<SettlementReport> {
    Ok(bookmaker
        .settle_prediction(prediction_id, winning_option)
        .await?)
}

pub async fn cancel<S: Store>(
    bookmaker: &Bookmaker<S>,
    prediction_id: &str,
) -> anyhow::Result<SettlementReport> {
    Ok(bookmaker.cancel_prediction(prediction_id).await?)
}

/// Problems with one document, as opposed to the store being unreachable.
fn skippable(error: &AppError) -> bool {
    matches!(
        error,
        AppError::InvalidDocument(_)
            | AppError::Ledger(
                LedgerError::AlreadySettled(_)
                    | LedgerError::PredictionCancelled(_)
                    | LedgerError::QuizAlreadyPublished(_)
            )
    )
}

fn decode<T: DeserializeOwned>(document: Value) -> serde_json::Result<T> {
    serde_json::from_value(document)
}

fn label(kind: &str, index: usize, document: &Value) -> String {
    match document.get("id").and_then(Value::as_str) {
        Some(id) => format!("{kind} {id}"),
        None => format!("{kind} #{index}"),
    }
}

fn reject(summary: &mut SeedSummary, label: &str, reason: impl fmt::Display) {
    warn!("Skipping {label}: {reason}");

    summary.rejected.push(format!("{label}: {reason}"));
}

#[cfg(test)]
mod tests {
    use std::{env, fs};

    use server::{database::MemoryStore, utils::RetryPolicy};

    use super::*;

    fn bookmaker() -> Bookmaker<MemoryStore> {
        Bookmaker::new(MemoryStore::new(), RetryPolicy::default())
    }

    fn catalog() -> Value {
        serde_json::json!({
            "predictions": [
                {
                    "eventName": "Race Winner",
                    "category": "race",
                    "type": "winner",
                    "options": [{ "text": "Piastri", "odds": 3.0 }, { "text": "Russell", "odds": 4.5 }],
                    "startDate": "2025-04-11T12:00:00Z",
                    "endDate": "2025-04-13T15:00:00Z",
                    "status": "active",
                    "raceWeekend": "bahrain-2025",
                    "circuit": "bahrain",
                },
                {
                    "id": "broken-odds",
                    "eventName": "Safety Car",
                    "category": "race",
                    "type": "safety-car",
                    "options": [{ "text": "Yes", "odds": 0.2 }],
                    "startDate": "2025-04-11T12:00:00Z",
                    "endDate": "2025-04-13T15:00:00Z",
                    "status": "active",
                    "raceWeekend": "bahrain-2025",
                    "circuit": "bahrain",
                },
            ],
            "quizzes": [
                {
                    "title": "Sakhir Basics",
                    "type": "race-weekend",
                    "questions": [{ "question": "Laps?", "options": ["57", "71"], "correctAnswer": 0 }],
                    "startDate": "2025-04-07T00:00:00Z",
                    "endDate": "2025-04-13T00:00:00Z",
                    "pointsPerQuestion": 20,
                    "difficulty": "medium",
                    "category": "circuits",
                },
                { "title": "Missing everything" },
            ],
        })
    }

    #[tokio::test]
    async fn test_publish_catalog() {
        let bookmaker = bookmaker();
        let catalog = Catalog::parse(&catalog().to_string()).unwrap();

        let summary = publish_catalog(&bookmaker, catalog).await.unwrap();

        assert_eq!(summary.predictions, 1);
        assert_eq!(summary.quizzes, 1);
        assert_eq!(summary.rejected.len(), 2);
        assert!(summary.rejected[0].starts_with("prediction broken-odds"));
        assert!(summary.rejected[1].starts_with("quiz missing-everything"));

        let prediction = bookmaker
            .prediction("bahrain-2025-race-winner")
            .await
            .unwrap();
        assert_eq!(prediction.options.len(), 2);
        assert!(
            bookmaker
                .store()
                .get_quiz("sakhir-basics")
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_reseed_keeps_settled_predictions() {
        let bookmaker = bookmaker();
        let first = Catalog::parse(&catalog().to_string()).unwrap();
        publish_catalog(&bookmaker, first).await.unwrap();

        bookmaker
            .settle_prediction("bahrain-2025-race-winner", 1)
            .await
            .unwrap();

        let mut edited = catalog();
        edited["quizzes"][0]["pointsPerQuestion"] = serde_json::json!(50);
        let again = Catalog::parse(&edited.to_string()).unwrap();
        let summary = publish_catalog(&bookmaker, again).await.unwrap();

        assert_eq!(summary.predictions, 0);
        assert_eq!(summary.quizzes, 0);
        assert_eq!(summary.rejected.len(), 4);
        assert!(summary.rejected[0].starts_with("prediction bahrain-2025-race-winner"));

        let prediction = bookmaker
            .prediction("bahrain-2025-race-winner")
            .await
            .unwrap();
        assert_eq!(prediction.result, Some(1));
    }

    #[tokio::test]
    async fn test_seed_from_file() {
        let path = env::temp_dir().join(format!("paddock-catalog-{}.json", std::process::id()));
        fs::write(&path, catalog().to_string()).unwrap();

        let summary = seed(&bookmaker(), path.to_str().unwrap()).await.unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(summary.predictions + summary.quizzes, 2);
    }

    #[tokio::test]
    async fn test_seed_missing_file() {
        assert!(seed(&bookmaker(), "/nonexistent/catalog.json").await.is_err());
    }

    #[tokio::test]
    async fn test_settle_unknown_prediction() {
        let result = settle(&bookmaker(), "monaco-2025-race-winner", 0).await;
        assert!(result.is_err());

        let result = cancel(&bookmaker(), "monaco-2025-race-winner").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_display() {
        let summary = SeedSummary {
            predictions: 2,
            quizzes: 1,
            rejected: vec!["quiz #0: no questions".to_string()],
        };

        assert_eq!(
            summary.to_string(),
            "Predictions Published: 2\nQuizzes Published: 1\nRejected: 1\n  - quiz #0: no questions"
        );
    }
}
