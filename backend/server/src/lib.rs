//! Backend of an F1 prediction and trivia game.
//!
//! Players answer quizzes for points, stake those points on race outcomes at fixed odds,
//! and compete on a leaderboard.
//!
//!
//!
//! # General Infrastructure
//! - User goes to the public endpoint running the reverse proxy
//! - Proxy authenticates with the identity provider and forwards `X-User-Id`,
//!   `X-User-Name` and `X-User-Email`
//! - Backend trusts those headers, it never sees credentials
//! - Operator actions (publishing, settlement) use a bearer admin key or the `operator` tool
//!
//!
//!
//! # Points
//!
//! **Goal**: A balance can never go negative and no bet is ever paid twice.
//!
//! - Every user starts with 1000 points
//! - The stake leaves the balance when the bet is placed
//! - A winning bet pays back `floor(amount * odds)`, a losing bet pays nothing
//! - A cancelled prediction refunds every stake
//! - Correct quiz answers add `pointsPerQuestion` each, once per quiz
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! The only persistent store. Balances live in hashes so the debit and the balance check
//! happen in the same Lua script as the bet write. Documents that need no atomic field
//! updates (predictions, quizzes, bets) are stored as JSON strings and validated on every read.
//!
//! ## Settlement
//! Settlement is not scheduled by the server. The `operator` tool or the admin route
//! triggers it once results are known. Re-running it after a failure finishes the bets
//! that were missed and changes nothing else.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against an in-memory store.
//! ```sh
//! DATABASE=memory ADMIN_KEY=dev RUST_LOG=info cargo run -p paddock
//! ```
//!
//! Settle a prediction.
//! ```sh
//! cargo run -p operator -- settle bahrain-2025-race-winner 1
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        HeaderName, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod bookmaker;
pub mod config;
pub mod database;
pub mod error;
pub mod routes;
pub mod state;
pub mod utils;

use config::{Config, Database};
use database::{MemoryStore, RedisStore, Store};
use routes::{
    bet_handler, cancellation_handler, history_handler, leaderboard_handler, prediction_handler,
    predictions_handler, profile_handler, publish_prediction_handler, publish_quiz_handler,
    quiz_submission_handler, quizzes_handler, session_handler, settlement_handler, stats_handler,
};
use state::AppState;
use utils::{USER_EMAIL_HEADER, USER_ID_HEADER, USER_NAME_HEADER};

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    match config.database {
        Database::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            serve(config, store).await
        }
        Database::Memory => {
            info!("Using in-memory store, nothing will persist");
            serve(config, MemoryStore::new()).await
        }
    }
}

pub fn router<S: Store>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(USER_ID_HEADER),
            HeaderName::from_static(USER_NAME_HEADER),
            HeaderName::from_static(USER_EMAIL_HEADER),
        ])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/session", post(session_handler::<S>))
        .route("/me", get(profile_handler::<S>))
        .route("/me/bets", get(history_handler::<S>))
        .route("/me/stats", get(stats_handler::<S>))
        .route("/leaderboard", get(leaderboard_handler::<S>))
        .route("/predictions", get(predictions_handler::<S>))
        .route("/predictions/{id}", get(prediction_handler::<S>))
        .route("/bets", post(bet_handler::<S>))
        .route("/quizzes", get(quizzes_handler::<S>))
        .route(
            "/quizzes/{id}/submissions",
            post(quiz_submission_handler::<S>),
        )
        .route("/admin/predictions", put(publish_prediction_handler::<S>))
        .route("/admin/quizzes", put(publish_quiz_handler::<S>))
        .route(
            "/admin/predictions/{id}/settlement",
            post(settlement_handler::<S>),
        )
        .route(
            "/admin/predictions/{id}/cancellation",
            post(cancellation_handler::<S>),
        )
        .layer(cors)
        .with_state(state)
}

async fn serve<S: Store>(config: Config, store: S) -> anyhow::Result<()> {
    info!("Initializing state...");
    let state = AppState::new(config, store);

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
