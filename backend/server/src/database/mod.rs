//! # Store
//!
//! Everything the ledger persists goes through [`Store`]. Two backends:
//!
//! - [`RedisStore`]: production, atomic writes via Lua scripts
//! - [`MemoryStore`]: tests and local runs, a single mutex around plain maps
//!
//! ## Requirements
//!
//! - A bet debit re-checks the balance in the same atomic step as the write
//! - A bet is settled at most once, the settled flag is checked inside the write
//! - Prediction status moves by compare-and-set so concurrent runs cannot both win
//! - Documents read back are parsed and validated before use
//!
//! ## Redis Layout
//!
//! - `user:{uid}`: hash (uid, email, displayName, **points**, createdAt)
//! - `leaderboard`: sorted set, uid scored by points
//! - `prediction:{id}`, `quiz:{id}`, `bet:{id}`: JSON documents
//! - `predictions`, `quizzes`: sets of ids
//! - `bets:user:{uid}`: sorted set of bet ids scored by timestamp (ms)
//! - `bets:prediction:{id}`: set of bet ids
//! - `attempt:{uid}:{quiz}`: marker for a submitted quiz
use std::future::Future;

use ledger::{LedgerError, Prediction, Quiz, User, UserBet, settlement::Resolution};
use serde::Serialize;

use crate::error::AppError;

pub mod memory;
pub mod remote;

pub use memory::MemoryStore;
pub use remote::RedisStore;

pub const LEADERBOARD: &str = "leaderboard";
pub const PREDICTIONS: &str = "predictions";
pub const QUIZZES: &str = "quizzes";

pub fn user_key(uid: &str) -> String {
    format!("user:{uid}")
}

pub fn prediction_key(id: &str) -> String {
    format!("prediction:{id}")
}

pub fn quiz_key(id: &str) -> String {
    format!("quiz:{id}")
}

pub fn bet_key(id: &str) -> String {
    format!("bet:{id}")
}

pub fn user_bets_key(uid: &str) -> String {
    format!("bets:user:{uid}")
}

pub fn prediction_bets_key(id: &str) -> String {
    format!("bets:prediction:{id}")
}

pub fn attempt_key(uid: &str, quiz_id: &str) -> String {
    format!("attempt:{uid}:{quiz_id}")
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::InternalError(e.into()))
}

/// Outcome of the atomic bet write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    Placed { balance: u64 },
    /// A bet with this id already exists, nothing was debited.
    Duplicate,
}

pub trait Store: Send + Sync + 'static {
    fn get_user(&self, uid: &str) -> impl Future<Output = Result<Option<User>, AppError>> + Send;

    /// Inserts `user` unless the uid exists; returns whatever is stored afterwards.
    fn create_user(&self, user: &User) -> impl Future<Output = Result<User, AppError>> + Send;

    fn top_users(&self, limit: usize) -> impl Future<Output = Result<Vec<User>, AppError>> + Send;

    fn get_prediction(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Prediction>, AppError>> + Send;

    fn list_predictions(&self) -> impl Future<Output = Result<Vec<Prediction>, AppError>> + Send;

    /// Inserts or replaces. A stored prediction with a recorded result, or a cancelled
    /// one, is only replaced by an identical copy.
    fn put_prediction(
        &self,
        prediction: &Prediction,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Read-modify-write of one prediction, retried on concurrent modification.
    fn update_prediction<F>(
        &self,
        id: &str,
        apply: F,
    ) -> impl Future<Output = Result<Prediction, AppError>> + Send
    where
        F: Fn(Prediction) -> Result<Prediction, LedgerError> + Send + Sync;

    fn get_quiz(&self, id: &str) -> impl Future<Output = Result<Option<Quiz>, AppError>> + Send;

    fn list_quizzes(&self) -> impl Future<Output = Result<Vec<Quiz>, AppError>> + Send;

    /// Published quizzes never change, republishing an identical copy is a no-op.
    fn put_quiz(&self, quiz: &Quiz) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Debits the stake and appends the bet in one step. Fails with
    /// `InsufficientBalance` or `PredictionNotActive` against current state.
    fn insert_bet(&self, bet: &UserBet) -> impl Future<Output = Result<Placement, AppError>> + Send;

    fn get_bet(&self, id: &str) -> impl Future<Output = Result<Option<UserBet>, AppError>> + Send;

    /// Newest first.
    fn user_bets(&self, uid: &str) -> impl Future<Output = Result<Vec<UserBet>, AppError>> + Send;

    fn prediction_bets(
        &self,
        prediction_id: &str,
    ) -> impl Future<Output = Result<Vec<UserBet>, AppError>> + Send;

    /// Writes the settled bet and credits its user unless the stored bet is
    /// already settled. Returns whether anything was applied.
    fn apply_resolution(
        &self,
        resolution: &Resolution,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Marks the quiz as submitted and credits `points`, once per user and quiz.
    /// Returns the new balance.
    fn record_quiz_attempt(
        &self,
        uid: &str,
        quiz_id: &str,
        points: u64,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}
