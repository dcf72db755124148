//! # Settlement
//!
//! Pure transitions applied by the settlement runner:
//!
//! 1. `begin_settlement` records the winning option on the prediction, which closes betting
//! 2. `settle_bet` resolves each unsettled bet into won/lost plus the balance credit
//! 3. `complete_settlement` flips the prediction to completed
//!
//! Each step is safe to repeat, so an interrupted run is resumed by running it again
//! with the same outcome.
use serde::Serialize;

use crate::{
    error::LedgerError,
    models::{BetResult, Prediction, PredictionStatus, UserBet},
};

/// Odds are applied in fixed point so `100 * 2.3` pays 230, not 229.
pub const ODDS_SCALE: u64 = 10_000;

pub fn payout(amount: u64, odds: f64) -> u64 {
    let scaled = (odds * ODDS_SCALE as f64).round() as u128;

    (amount as u128)
        .checked_mul(scaled)
        .map_or(u64::MAX, |gross| {
            u64::try_from(gross / ODDS_SCALE as u128).unwrap_or(u64::MAX)
        })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReport {
    pub prediction_id: String,
    pub winning_option: Option<usize>,
    pub winners: u64,
    pub losers: u64,
    pub refunded: u64,
    pub skipped: u64,
    pub points_disbursed: u64,
}

impl SettlementReport {
    pub fn new(prediction_id: impl Into<String>, winning_option: Option<usize>) -> Self {
        Self {
            prediction_id: prediction_id.into(),
            winning_option,
            ..Default::default()
        }
    }

    pub fn record(&mut self, bet: &UserBet) {
        match bet.result {
            Some(BetResult::Won) => self.winners += 1,
            Some(BetResult::Lost) => self.losers += 1,
            Some(BetResult::Refunded) => self.refunded += 1,
            None => return,
        }

        self.points_disbursed += bet.points_won.unwrap_or(0);
    }
}

/// A bet resolved against an outcome, with the points owed to its user.
#[derive(Clone, Debug, PartialEq)]
pub struct Resolution {
    pub bet: UserBet,
    pub credit: u64,
}

pub fn begin_settlement(
    mut prediction: Prediction,
    winning_option: usize,
) -> Result<Prediction, LedgerError> {
    match prediction.status {
        PredictionStatus::Completed => return Err(LedgerError::AlreadySettled(prediction.id)),
        PredictionStatus::Cancelled => return Err(LedgerError::PredictionCancelled(prediction.id)),
        PredictionStatus::Upcoming | PredictionStatus::Active => {}
    }

    let conflicting = prediction
        .result
        .is_some_and(|recorded| recorded != winning_option);
    if winning_option >= prediction.options.len() || conflicting {
        return Err(LedgerError::InvalidOutcome {
            prediction_id: prediction.id,
            index: winning_option,
        });
    }

    prediction.result = Some(winning_option);

    Ok(prediction)
}

pub fn complete_settlement(mut prediction: Prediction) -> Result<Prediction, LedgerError> {
    if prediction.status == PredictionStatus::Cancelled {
        return Err(LedgerError::PredictionCancelled(prediction.id));
    }
    if prediction.result.is_none() {
        return Err(LedgerError::InvalidOutcome {
            prediction_id: prediction.id,
            index: 0,
        });
    }

    prediction.status = PredictionStatus::Completed;

    Ok(prediction)
}

/// Only a prediction without a recorded result can be cancelled, a settlement in
/// progress has to be finished instead.
pub fn cancel_prediction(mut prediction: Prediction) -> Result<Prediction, LedgerError> {
    if prediction.status == PredictionStatus::Completed || prediction.result.is_some() {
        return Err(LedgerError::AlreadySettled(prediction.id));
    }

    prediction.status = PredictionStatus::Cancelled;

    Ok(prediction)
}

/// A published prediction can be edited until a result is recorded or it is cancelled.
/// Publishing the stored copy unchanged is always accepted.
pub fn ensure_replaceable(stored: &Prediction, incoming: &Prediction) -> Result<(), LedgerError> {
    if stored == incoming {
        return Ok(());
    }

    match stored.status {
        PredictionStatus::Cancelled => Err(LedgerError::PredictionCancelled(stored.id.clone())),
        PredictionStatus::Completed => Err(LedgerError::AlreadySettled(stored.id.clone())),
        _ if stored.result.is_some() => Err(LedgerError::AlreadySettled(stored.id.clone())),
        _ => Ok(()),
    }
}

/// Returns `None` for a bet that was already settled.
pub fn settle_bet(bet: &UserBet, prediction: &Prediction) -> Option<Resolution> {
    let winning_option = prediction.result?;
    if bet.is_settled() {
        return None;
    }

    let mut bet = bet.clone();
    let credit = if bet.selected_option == winning_option {
        let odds = prediction.option(bet.selected_option)?.odds;
        let points = payout(bet.amount, odds);

        bet.result = Some(BetResult::Won);
        bet.points_won = Some(points);
        points
    } else {
        bet.result = Some(BetResult::Lost);
        bet.points_won = Some(0);
        0
    };

    Some(Resolution { bet, credit })
}

/// Returns the stake of an unsettled bet to its user.
pub fn refund_bet(bet: &UserBet) -> Option<Resolution> {
    if bet.is_settled() {
        return None;
    }

    let mut bet = bet.clone();
    bet.result = Some(BetResult::Refunded);
    bet.points_won = Some(bet.amount);

    Some(Resolution {
        credit: bet.amount,
        bet,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, fixtures::*};

    #[test]
    fn test_payout() {
        assert_eq!(payout(100, 3.0), 300);
        assert_eq!(payout(100, 1.5), 150);
        assert_eq!(payout(100, 2.3), 230);
        assert_eq!(payout(3, 1.5), 4);
        assert_eq!(payout(1, 1.0), 1);
        assert_eq!(payout(u64::MAX, 2.0), u64::MAX);
    }

    #[test]
    fn test_payout_saturates_on_huge_odds() {
        let huge = prediction("p", &[1e35]);
        assert!(huge.validate().is_ok());

        assert_eq!(payout(2, 1e35), u64::MAX);
        assert_eq!(payout(u64::MAX, f64::MAX), u64::MAX);
        assert_eq!(payout(0, 1e35), 0);
    }

    #[test]
    fn test_won_bet_pays_odds() {
        let prediction = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();
        let resolution = settle_bet(&bet("b", "p", 1, 100), &prediction).unwrap();

        assert_eq!(resolution.credit, 300);
        assert_eq!(resolution.bet.result, Some(BetResult::Won));
        assert_eq!(resolution.bet.points_won, Some(300));
    }

    #[test]
    fn test_lost_bet_pays_nothing() {
        let prediction = begin_settlement(prediction("p", &[1.5, 3.0]), 0).unwrap();
        let resolution = settle_bet(&bet("b", "p", 1, 100), &prediction).unwrap();

        assert_eq!(resolution.credit, 0);
        assert_eq!(resolution.bet.result, Some(BetResult::Lost));
        assert_eq!(resolution.bet.points_won, Some(0));
    }

    #[test]
    fn test_settled_bet_is_skipped() {
        let prediction = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();
        let first = settle_bet(&bet("b", "p", 1, 100), &prediction).unwrap();

        assert_eq!(settle_bet(&first.bet, &prediction), None);
        assert_eq!(refund_bet(&first.bet), None);
    }

    #[test]
    fn test_no_result_settles_nothing() {
        let prediction = prediction("p", &[1.5, 3.0]);
        assert_eq!(settle_bet(&bet("b", "p", 1, 100), &prediction), None);
    }

    #[test]
    fn test_begin_rejects_completed() {
        let prediction = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();
        let prediction = complete_settlement(prediction).unwrap();

        assert_eq!(
            begin_settlement(prediction, 1),
            Err(LedgerError::AlreadySettled("p".to_string()))
        );
    }

    #[test]
    fn test_begin_rejects_bad_outcome() {
        assert!(matches!(
            begin_settlement(prediction("p", &[1.5, 3.0]), 2),
            Err(LedgerError::InvalidOutcome { index: 2, .. })
        ));
    }

    #[test]
    fn test_resume_requires_same_outcome() {
        let started = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();

        assert!(begin_settlement(started.clone(), 1).is_ok());
        assert!(matches!(
            begin_settlement(started, 0),
            Err(LedgerError::InvalidOutcome { index: 0, .. })
        ));
    }

    #[test]
    fn test_cancel() {
        let cancelled = cancel_prediction(prediction("p", &[1.5])).unwrap();
        assert_eq!(cancelled.status, PredictionStatus::Cancelled);
        assert!(matches!(
            begin_settlement(cancelled, 0),
            Err(LedgerError::PredictionCancelled(_))
        ));

        let completed =
            complete_settlement(begin_settlement(prediction("q", &[1.5]), 0).unwrap()).unwrap();
        assert!(cancel_prediction(completed).is_err());
    }

    #[test]
    fn test_cancel_rejects_settlement_in_progress() {
        let started = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();

        assert_eq!(
            cancel_prediction(started),
            Err(LedgerError::AlreadySettled("p".to_string()))
        );
    }

    #[test]
    fn test_complete_rejects_cancelled() {
        let mut cancelled = cancel_prediction(prediction("p", &[1.5, 3.0])).unwrap();
        cancelled.result = Some(0);

        assert_eq!(
            complete_settlement(cancelled),
            Err(LedgerError::PredictionCancelled("p".to_string()))
        );
    }

    #[test]
    fn test_replace_open_prediction() {
        let stored = prediction("p", &[1.5, 3.0]);
        let mut edited = stored.clone();
        edited.options[0].odds = 1.6;

        assert!(ensure_replaceable(&stored, &edited).is_ok());
    }

    #[test]
    fn test_replace_locked_prediction() {
        let original = prediction("p", &[1.5, 3.0]);
        let started = begin_settlement(original.clone(), 1).unwrap();
        let completed = complete_settlement(started.clone()).unwrap();
        let cancelled = cancel_prediction(original.clone()).unwrap();

        assert_eq!(
            ensure_replaceable(&started, &original),
            Err(LedgerError::AlreadySettled("p".to_string()))
        );
        assert_eq!(
            ensure_replaceable(&completed, &original),
            Err(LedgerError::AlreadySettled("p".to_string()))
        );
        assert_eq!(
            ensure_replaceable(&cancelled, &original),
            Err(LedgerError::PredictionCancelled("p".to_string()))
        );
        assert!(ensure_replaceable(&completed, &completed.clone()).is_ok());
    }

    #[test]
    fn test_refund_returns_stake() {
        let resolution = refund_bet(&bet("b", "p", 0, 75)).unwrap();

        assert_eq!(resolution.credit, 75);
        assert_eq!(resolution.bet.result, Some(BetResult::Refunded));
    }

    #[test]
    fn test_report_tallies() {
        let prediction = begin_settlement(prediction("p", &[1.5, 3.0]), 1).unwrap();
        let mut report = SettlementReport::new("p", Some(1));

        for bet in [bet("a", "p", 1, 100), bet("b", "p", 0, 40), bet("c", "p", 1, 10)] {
            report.record(&settle_bet(&bet, &prediction).unwrap().bet);
        }

        assert_eq!(report.winners, 2);
        assert_eq!(report.losers, 1);
        assert_eq!(report.points_disbursed, 330);
    }
}
