//! # Ledger
//!
//! Pure betting and scoring rules shared by the server and the operator tool.
//! Nothing in here touches the store; callers fetch documents, run them through
//! these functions, and write back whatever comes out.
//!
//! - [`bets`]: validation before a wager is written
//! - [`settlement`]: payouts, refunds, prediction status transitions
//! - [`stats`]: per-user aggregation and leaderboard ordering
//! - [`quiz`]: quiz scoring and the answer-free public view
pub mod bets;
pub mod error;
pub mod models;
pub mod quiz;
pub mod settlement;
pub mod stats;

pub use error::LedgerError;
pub use models::{
    BetResult, Document, Prediction, PredictionStatus, Quiz, User, UserBet, UserStats,
    parse_document,
};
