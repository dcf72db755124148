use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Bet amount must be a positive whole number of points")]
    InvalidAmount,

    #[error("Insufficient points: bet of {amount} exceeds balance of {balance}")]
    InsufficientBalance { amount: u64, balance: u64 },

    #[error("Option {index} does not exist, prediction has {options} options")]
    InvalidSelection { index: i64, options: usize },

    #[error("Prediction {0} is not open for bets")]
    PredictionNotActive(String),

    #[error("Prediction {0} was cancelled")]
    PredictionCancelled(String),

    #[error("Prediction {0} is already settled")]
    AlreadySettled(String),

    #[error("Outcome {index} is not valid for prediction {prediction_id}")]
    InvalidOutcome { prediction_id: String, index: usize },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Quiz {0} is not open")]
    QuizNotActive(String),

    #[error("Quiz {0} was already submitted")]
    QuizAlreadySubmitted(String),

    #[error("Quiz {0} is already published with different content")]
    QuizAlreadyPublished(String),

    #[error("Expected {expected} answers, got {got}")]
    InvalidAnswers { expected: usize, got: usize },

    #[error("Corrupt {kind} document: {reason}")]
    CorruptDocument { kind: &'static str, reason: String },
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn corrupt(kind: &'static str, reason: impl ToString) -> Self {
        LedgerError::CorruptDocument {
            kind,
            reason: reason.to_string(),
        }
    }
}
