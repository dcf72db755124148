use std::collections::{HashMap, HashSet};

use ledger::{
    LedgerError, Prediction, PredictionStatus, Quiz, User, UserBet,
    quiz::ensure_unchanged,
    settlement::{Resolution, ensure_replaceable},
    stats::rank_users,
};
use tokio::sync::Mutex;

use super::{Placement, Store};
use crate::error::AppError;

#[derive(Default)]
struct Tables {
    users: HashMap<String, User>,
    predictions: HashMap<String, Prediction>,
    quizzes: HashMap<String, Quiz>,
    bets: HashMap<String, UserBet>,
    attempts: HashSet<(String, String)>,
}

/// Every operation holds the one lock for its whole duration.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>, AppError> {
        Ok(self.tables.lock().await.users.get(uid).cloned())
    }

    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut tables = self.tables.lock().await;

        Ok(tables
            .users
            .entry(user.uid.clone())
            .or_insert_with(|| user.clone())
            .clone())
    }

    async fn top_users(&self, limit: usize) -> Result<Vec<User>, AppError> {
        let users = self.tables.lock().await.users.values().cloned().collect();

        Ok(rank_users(users, limit))
    }

    async fn get_prediction(&self, id: &str) -> Result<Option<Prediction>, AppError> {
        Ok(self.tables.lock().await.predictions.get(id).cloned())
    }

    async fn list_predictions(&self) -> Result<Vec<Prediction>, AppError> {
        Ok(self
            .tables
            .lock()
            .await
            .predictions
            .values()
            .cloned()
            .collect())
    }

    async fn put_prediction(&self, prediction: &Prediction) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;

        if let Some(stored) = tables.predictions.get(&prediction.id) {
            ensure_replaceable(stored, prediction)?;
        }

        tables
            .predictions
            .insert(prediction.id.clone(), prediction.clone());

        Ok(())
    }

    async fn update_prediction<F>(&self, id: &str, apply: F) -> Result<Prediction, AppError>
    where
        F: Fn(Prediction) -> Result<Prediction, LedgerError> + Send + Sync,
    {
        let mut tables = self.tables.lock().await;
        let current = tables
            .predictions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("Prediction", id))?;

        let updated = apply(current)?;
        tables.predictions.insert(id.to_string(), updated.clone());

        Ok(updated)
    }

    async fn get_quiz(&self, id: &str) -> Result<Option<Quiz>, AppError> {
        Ok(self.tables.lock().await.quizzes.get(id).cloned())
    }

    async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        Ok(self.tables.lock().await.quizzes.values().cloned().collect())
    }

    async fn put_quiz(&self, quiz: &Quiz) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;

        if let Some(stored) = tables.quizzes.get(&quiz.id) {
            ensure_unchanged(stored, quiz)?;
        }

        tables.quizzes.insert(quiz.id.clone(), quiz.clone());

        Ok(())
    }

    async fn insert_bet(&self, bet: &UserBet) -> Result<Placement, AppError> {
        let mut tables = self.tables.lock().await;

        if tables.bets.contains_key(&bet.id) {
            return Ok(Placement::Duplicate);
        }

        let open = match tables.predictions.get(&bet.prediction_id) {
            Some(prediction) => {
                prediction.status == PredictionStatus::Active && prediction.result.is_none()
            }
            None => return Err(LedgerError::not_found("Prediction", &bet.prediction_id).into()),
        };

        let user = tables
            .users
            .get_mut(&bet.uid)
            .ok_or_else(|| LedgerError::not_found("User", &bet.uid))?;

        if !open {
            return Err(LedgerError::PredictionNotActive(bet.prediction_id.clone()).into());
        }
        if bet.amount > user.points {
            return Err(LedgerError::InsufficientBalance {
                amount: bet.amount,
                balance: user.points,
            }
            .into());
        }

        user.points -= bet.amount;
        let balance = user.points;
        tables.bets.insert(bet.id.clone(), bet.clone());

        Ok(Placement::Placed { balance })
    }

    async fn get_bet(&self, id: &str) -> Result<Option<UserBet>, AppError> {
        Ok(self.tables.lock().await.bets.get(id).cloned())
    }

    async fn user_bets(&self, uid: &str) -> Result<Vec<UserBet>, AppError> {
        let mut bets: Vec<UserBet> = self
            .tables
            .lock()
            .await
            .bets
            .values()
            .filter(|bet| bet.uid == uid)
            .cloned()
            .collect();

        bets.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

        Ok(bets)
    }

    async fn prediction_bets(&self, prediction_id: &str) -> Result<Vec<UserBet>, AppError> {
        Ok(self
            .tables
            .lock()
            .await
            .bets
            .values()
            .filter(|bet| bet.prediction_id == prediction_id)
            .cloned()
            .collect())
    }

    async fn apply_resolution(&self, resolution: &Resolution) -> Result<bool, AppError> {
        let bet = &resolution.bet;
        let mut tables = self.tables.lock().await;

        match tables.bets.get(&bet.id) {
            Some(stored) if stored.is_settled() => return Ok(false),
            Some(_) => {}
            None => return Err(LedgerError::not_found("Bet", &bet.id).into()),
        }

        let user = tables
            .users
            .get_mut(&bet.uid)
            .ok_or_else(|| LedgerError::not_found("User", &bet.uid))?;
        user.points = user.points.saturating_add(resolution.credit);

        tables.bets.insert(bet.id.clone(), bet.clone());

        Ok(true)
    }

    async fn record_quiz_attempt(
        &self,
        uid: &str,
        quiz_id: &str,
        points: u64,
    ) -> Result<u64, AppError> {
        let mut guard = self.tables.lock().await;
        let tables = &mut *guard;

        let user = tables
            .users
            .get_mut(uid)
            .ok_or_else(|| LedgerError::not_found("User", uid))?;

        if !tables
            .attempts
            .insert((uid.to_string(), quiz_id.to_string()))
        {
            return Err(LedgerError::QuizAlreadySubmitted(quiz_id.to_string()).into());
        }

        user.points = user.points.saturating_add(points);

        Ok(user.points)
    }
}
