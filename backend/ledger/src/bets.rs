//! # Bet Ledger
//!
//! Validation performed before a bet is written. The balance check here runs
//! against a snapshot; the store re-checks it atomically with the write.
//!
//! Stakes are deducted on placement. A winning bet later credits the gross
//! payout, a losing one credits nothing.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::LedgerError,
    models::{Prediction, UserBet},
};

/// Incoming wager. Numbers stay loose so bad input maps to a ledger error
/// instead of a decode failure.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetRequest {
    pub prediction_id: String,
    pub selected_option: i64,
    pub amount: f64,
    #[serde(default)]
    pub request_id: Option<Uuid>,
}

/// A bet that passed every local check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BetSlip {
    pub selected_option: usize,
    pub amount: u64,
}

pub fn validate_amount(amount: f64) -> Result<u64, LedgerError> {
    if !amount.is_finite() || amount.fract() != 0.0 || amount < 1.0 || amount > u64::MAX as f64 {
        return Err(LedgerError::InvalidAmount);
    }

    Ok(amount as u64)
}

pub fn validate_selection(prediction: &Prediction, index: i64) -> Result<usize, LedgerError> {
    usize::try_from(index)
        .ok()
        .filter(|&index| index < prediction.options.len())
        .ok_or(LedgerError::InvalidSelection {
            index,
            options: prediction.options.len(),
        })
}

pub fn validate_bet(
    prediction: &Prediction,
    selected_option: i64,
    amount: f64,
    balance: u64,
    now: DateTime<Utc>,
) -> Result<BetSlip, LedgerError> {
    let amount = validate_amount(amount)?;
    let selected_option = validate_selection(prediction, selected_option)?;

    if !prediction.is_open(now) {
        return Err(LedgerError::PredictionNotActive(prediction.id.clone()));
    }

    if amount > balance {
        return Err(LedgerError::InsufficientBalance { amount, balance });
    }

    Ok(BetSlip {
        selected_option,
        amount,
    })
}

impl UserBet {
    pub fn place(
        id: impl Into<String>,
        uid: impl Into<String>,
        prediction_id: impl Into<String>,
        slip: BetSlip,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            uid: uid.into(),
            prediction_id: prediction_id.into(),
            selected_option: slip.selected_option,
            amount: slip.amount,
            timestamp: now,
            result: None,
            points_won: None,
        }
    }
}
