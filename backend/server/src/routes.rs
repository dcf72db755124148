use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use ledger::{
    Prediction, Quiz, User, UserBet, UserStats, bets::BetRequest, models::QuizType,
    quiz::{PublicQuiz, QuizSubmission},
    settlement::SettlementReport,
};
use serde::Deserialize;

use crate::{
    bookmaker::{BetWithPrediction, QuizResult},
    database::Store,
    error::AppError,
    state::AppState,
    utils::{Identity, Operator},
};

type AppResult<T> = Result<Json<T>, AppError>;

fn payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|_| AppError::MalformedPayload)
}

#[derive(Deserialize)]
pub struct LeaderboardQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionQuery {
    race_weekend: Option<String>,
}

#[derive(Deserialize)]
pub struct QuizQuery {
    #[serde(rename = "type")]
    quiz_type: Option<QuizType>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    winning_option: usize,
}

pub async fn session_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> AppResult<User> {
    Ok(Json(state.bookmaker.sign_in(&identity, Utc::now()).await?))
}

pub async fn profile_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> AppResult<User> {
    Ok(Json(state.bookmaker.profile(&identity.uid).await?))
}

pub async fn history_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> AppResult<Vec<BetWithPrediction>> {
    Ok(Json(state.bookmaker.betting_history(&identity.uid).await?))
}

pub async fn stats_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> AppResult<UserStats> {
    Ok(Json(state.bookmaker.user_stats(&identity.uid).await?))
}

pub async fn leaderboard_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<LeaderboardQuery>,
) -> AppResult<Vec<User>> {
    let limit = query.limit.unwrap_or(state.config.leaderboard_limit);

    Ok(Json(state.bookmaker.leaderboard(limit).await?))
}

pub async fn predictions_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PredictionQuery>,
) -> AppResult<Vec<Prediction>> {
    let predictions = state
        .bookmaker
        .active_predictions(Utc::now(), query.race_weekend.as_deref())
        .await?;

    Ok(Json(predictions))
}

pub async fn prediction_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> AppResult<Prediction> {
    Ok(Json(state.bookmaker.prediction(&id).await?))
}

pub async fn bet_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    request: Result<Json<BetRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let bet: UserBet = state
        .bookmaker
        .place_bet(&identity.uid, payload(request)?, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(bet)))
}

pub async fn quizzes_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<QuizQuery>,
) -> AppResult<Vec<PublicQuiz>> {
    Ok(Json(
        state
            .bookmaker
            .active_quizzes(Utc::now(), query.quiz_type)
            .await?,
    ))
}

pub async fn quiz_submission_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<String>,
    submission: Result<Json<QuizSubmission>, JsonRejection>,
) -> AppResult<QuizResult> {
    let submission = payload(submission)?;
    let result = state
        .bookmaker
        .submit_quiz(&identity.uid, &id, &submission.answers, Utc::now())
        .await?;

    Ok(Json(result))
}

pub async fn publish_prediction_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _operator: Operator,
    prediction: Result<Json<Prediction>, JsonRejection>,
) -> AppResult<Prediction> {
    let prediction = payload(prediction)?;

    Ok(Json(state.bookmaker.publish_prediction(prediction).await?))
}

pub async fn publish_quiz_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _operator: Operator,
    quiz: Result<Json<Quiz>, JsonRejection>,
) -> AppResult<Quiz> {
    let quiz = payload(quiz)?;

    Ok(Json(state.bookmaker.publish_quiz(quiz).await?))
}

pub async fn settlement_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _operator: Operator,
    Path(id): Path<String>,
    request: Result<Json<SettleRequest>, JsonRejection>,
) -> AppResult<SettlementReport> {
    let request = payload(request)?;
    let report = state
        .bookmaker
        .settle_prediction(&id, request.winning_option)
        .await?;

    Ok(Json(report))
}

pub async fn cancellation_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _operator: Operator,
    Path(id): Path<String>,
) -> AppResult<SettlementReport> {
    Ok(Json(state.bookmaker.cancel_prediction(&id).await?))
}
