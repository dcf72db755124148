//! # Bookmaker
//!
//! Composes the store with the ledger rules. Routes and the operator tool both go
//! through here.
//!
//! ## Flow
//!
//! - Sign-in creates the profile with the starting balance if it does not exist
//! - Bets are validated locally, then written with an atomic debit
//! - Settlement is triggered out of band (operator tool or admin route) and is
//!   safe to re-run after a crash
//! - Profile pages read history and stats, the stats fold runs here on demand
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ledger::{
    LedgerError, Prediction, Quiz, User, UserBet, UserStats,
    bets::{BetRequest, validate_bet},
    models::{Document, QuizType},
    quiz::{PublicQuiz, QuizScore, score_quiz},
    settlement::{
        SettlementReport, begin_settlement, cancel_prediction, complete_settlement, refund_bet,
        settle_bet,
    },
    stats::compute_user_stats,
};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    database::{Placement, Store},
    error::AppError,
    utils::{Identity, RetryPolicy, retry_read},
};

pub const MAX_LEADERBOARD: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BetWithPrediction {
    #[serde(flatten)]
    pub bet: UserBet,
    pub prediction: Prediction,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    #[serde(flatten)]
    pub score: QuizScore,
    pub balance: u64,
}

pub struct Bookmaker<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: Store> Bookmaker<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn sign_in(&self, identity: &Identity, now: DateTime<Utc>) -> Result<User, AppError> {
        let user = User::new(
            &identity.uid,
            &identity.display_name,
            &identity.email,
            now,
        );

        self.store.create_user(&user).await
    }

    pub async fn profile(&self, uid: &str) -> Result<User, AppError> {
        retry_read(self.retry, move || self.store.get_user(uid))
            .await?
            .ok_or_else(|| LedgerError::not_found("User", uid).into())
    }

    pub async fn prediction(&self, id: &str) -> Result<Prediction, AppError> {
        retry_read(self.retry, move || self.store.get_prediction(id))
            .await?
            .ok_or_else(|| LedgerError::not_found("Prediction", id).into())
    }

    pub async fn place_bet(
        &self,
        uid: &str,
        request: BetRequest,
        now: DateTime<Utc>,
    ) -> Result<UserBet, AppError> {
        if let Some(request_id) = request.request_id {
            if let Some(existing) = self.replay(uid, &request_id.to_string()).await? {
                return Ok(existing);
            }
        }

        let prediction = self.prediction(&request.prediction_id).await?;
        let user = self.profile(uid).await?;

        let slip = validate_bet(
            &prediction,
            request.selected_option,
            request.amount,
            user.points,
            now,
        )
        .inspect_err(|e| warn!("Rejected bet from {uid}: {e}"))?;

        let id = request.request_id.unwrap_or_else(Uuid::new_v4).to_string();
        let bet = UserBet::place(id, uid, &prediction.id, slip, now);

        match self.store.insert_bet(&bet).await? {
            Placement::Placed { balance } => {
                info!(
                    "Bet {} placed: {uid} staked {} on option {} of {}, balance {balance}",
                    bet.id, bet.amount, bet.selected_option, bet.prediction_id
                );

                Ok(bet)
            }
            Placement::Duplicate => self
                .replay(uid, &bet.id)
                .await?
                .ok_or_else(|| AppError::Conflict(format!("Bet {} already exists", bet.id))),
        }
    }

    /// A retried request resolves to the bet it already created.
    async fn replay(&self, uid: &str, bet_id: &str) -> Result<Option<UserBet>, AppError> {
        let existing = retry_read(self.retry, move || self.store.get_bet(bet_id)).await?;

        match existing {
            Some(bet) if bet.uid == uid => {
                info!("Replayed bet {bet_id} for {uid}");
                Ok(Some(bet))
            }
            Some(_) => Err(AppError::Conflict(format!("Bet {bet_id} already exists"))),
            None => Ok(None),
        }
    }

    pub async fn settle_prediction(
        &self,
        prediction_id: &str,
        winning_option: usize,
    ) -> Result<SettlementReport, AppError> {
        let prediction = self
            .store
            .update_prediction(prediction_id, |prediction| {
                begin_settlement(prediction, winning_option)
            })
            .await?;

        let mut report = SettlementReport::new(prediction_id, Some(winning_option));
        let bets = retry_read(self.retry, move || self.store.prediction_bets(prediction_id)).await?;

        for bet in bets {
            let Some(resolution) = settle_bet(&bet, &prediction) else {
                report.skipped += 1;
                continue;
            };

            if self.store.apply_resolution(&resolution).await? {
                report.record(&resolution.bet);
            } else {
                report.skipped += 1;
            }
        }

        self.store
            .update_prediction(prediction_id, complete_settlement)
            .await?;

        info!(
            "Settled {prediction_id} on option {winning_option}: {} won, {} lost, {} skipped, {} points paid",
            report.winners, report.losers, report.skipped, report.points_disbursed
        );

        Ok(report)
    }

    pub async fn cancel_prediction(&self, prediction_id: &str) -> Result<SettlementReport, AppError> {
        self.store
            .update_prediction(prediction_id, cancel_prediction)
            .await?;

        let mut report = SettlementReport::new(prediction_id, None);
        let bets = retry_read(self.retry, move || self.store.prediction_bets(prediction_id)).await?;

        for bet in bets {
            let Some(resolution) = refund_bet(&bet) else {
                report.skipped += 1;
                continue;
            };

            if self.store.apply_resolution(&resolution).await? {
                report.record(&resolution.bet);
            } else {
                report.skipped += 1;
            }
        }

        info!(
            "Cancelled {prediction_id}: {} refunded, {} points returned",
            report.refunded, report.points_disbursed
        );

        Ok(report)
    }

    pub async fn betting_history(&self, uid: &str) -> Result<Vec<BetWithPrediction>, AppError> {
        let bets = retry_read(self.retry, move || self.store.user_bets(uid)).await?;
        let mut predictions: HashMap<String, Prediction> = HashMap::new();
        let mut history = Vec::with_capacity(bets.len());

        for bet in bets {
            if !predictions.contains_key(&bet.prediction_id) {
                let id = bet.prediction_id.as_str();
                match retry_read(self.retry, move || self.store.get_prediction(id)).await? {
                    Some(prediction) => {
                        predictions.insert(prediction.id.clone(), prediction);
                    }
                    None => {
                        warn!("Bet {} references missing prediction {id}", bet.id);
                        continue;
                    }
                }
            }

            if let Some(prediction) = predictions.get(&bet.prediction_id) {
                history.push(BetWithPrediction {
                    prediction: prediction.clone(),
                    bet,
                });
            }
        }

        Ok(history)
    }

    pub async fn user_stats(&self, uid: &str) -> Result<UserStats, AppError> {
        let history: Vec<(UserBet, Prediction)> = self
            .betting_history(uid)
            .await?
            .into_iter()
            .map(|entry| (entry.bet, entry.prediction))
            .collect();

        Ok(compute_user_stats(&history))
    }

    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<User>, AppError> {
        let limit = limit.clamp(1, MAX_LEADERBOARD);

        retry_read(self.retry, move || self.store.top_users(limit)).await
    }

    pub async fn active_predictions(
        &self,
        now: DateTime<Utc>,
        race_weekend: Option<&str>,
    ) -> Result<Vec<Prediction>, AppError> {
        let mut predictions: Vec<Prediction> =
            retry_read(self.retry, move || self.store.list_predictions())
                .await?
                .into_iter()
                .filter(|prediction| prediction.is_open(now))
                .filter(|prediction| {
                    race_weekend.is_none_or(|weekend| prediction.race_weekend == weekend)
                })
                .collect();

        predictions.sort_by(|a, b| a.end_date.cmp(&b.end_date).then_with(|| a.id.cmp(&b.id)));

        Ok(predictions)
    }

    pub async fn active_quizzes(
        &self,
        now: DateTime<Utc>,
        quiz_type: Option<QuizType>,
    ) -> Result<Vec<PublicQuiz>, AppError> {
        let mut quizzes: Vec<Quiz> = retry_read(self.retry, move || self.store.list_quizzes())
            .await?
            .into_iter()
            .filter(|quiz| quiz.is_open(now))
            .filter(|quiz| quiz_type.is_none_or(|quiz_type| quiz.quiz_type == quiz_type))
            .collect();

        quizzes.sort_by(|a, b| a.end_date.cmp(&b.end_date).then_with(|| a.id.cmp(&b.id)));

        Ok(quizzes.into_iter().map(PublicQuiz::from).collect())
    }

    pub async fn submit_quiz(
        &self,
        uid: &str,
        quiz_id: &str,
        answers: &[Option<usize>],
        now: DateTime<Utc>,
    ) -> Result<QuizResult, AppError> {
        let quiz = retry_read(self.retry, move || self.store.get_quiz(quiz_id))
            .await?
            .ok_or_else(|| LedgerError::not_found("Quiz", quiz_id))?;

        let score = score_quiz(&quiz, answers, now)?;
        let balance = self
            .store
            .record_quiz_attempt(uid, quiz_id, score.points_earned)
            .await?;

        info!(
            "{uid} scored {}/{} on {quiz_id}, earned {} points",
            score.correct_answers, score.total_questions, score.points_earned
        );

        Ok(QuizResult { score, balance })
    }

    pub async fn publish_prediction(&self, prediction: Prediction) -> Result<Prediction, AppError> {
        prediction.validate().map_err(AppError::InvalidDocument)?;
        self.store.put_prediction(&prediction).await?;
        info!("Published prediction {}", prediction.id);

        Ok(prediction)
    }

    pub async fn publish_quiz(&self, quiz: Quiz) -> Result<Quiz, AppError> {
        quiz.validate().map_err(AppError::InvalidDocument)?;
        self.store.put_quiz(&quiz).await?;
        info!("Published quiz {}", quiz.id);

        Ok(quiz)
    }
}
