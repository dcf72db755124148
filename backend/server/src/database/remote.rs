//! # Redis
//!
//! RAM database.
//!
//! Every write that has to be atomic is a Lua script, Redis runs scripts one at a
//! time so a script sees and mutates a consistent snapshot.
//!
//! ## Scripts
//!
//! - Bet placement: duplicate id check, balance check, prediction status check,
//!   debit, append. All or nothing.
//! - Resolution: skip if the stored bet already carries a result, else write it and credit.
//! - Quiz attempt: `SET NX` marker, then credit.
//! - Compare-and-set: swap a document only if it is byte-identical to what was read.
//! - Publish: compare-and-set that also registers the id, an empty expected value
//!   means the key must not exist yet.
//!
//! ## Notes
//! - Scores in the leaderboard are refreshed from the `HINCRBY` result inside the
//!   same script, so the sorted set never lags a balance change.
//! - Lua numbers are doubles, balances above 2^53 lose precision.
use std::{collections::HashMap, time::Duration};

use ledger::{
    Document, LedgerError, Prediction, Quiz, User, UserBet, parse_document,
    quiz::ensure_unchanged,
    settlement::{Resolution, ensure_replaceable},
};
use redis::{
    AsyncCommands, Client, RedisError, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::Serialize;
use tracing::{info, warn};

use super::{
    LEADERBOARD, PREDICTIONS, Placement, QUIZZES, Store, attempt_key, bet_key, encode,
    prediction_bets_key, prediction_key, quiz_key, user_bets_key, user_key,
};
use crate::error::AppError;

const CAS_ATTEMPTS: usize = 5;

const CREATE_USER: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], 'uid', ARGV[1], 'email', ARGV[2], 'displayName', ARGV[3], 'points', ARGV[4], 'createdAt', ARGV[5])
redis.call('ZADD', KEYS[2], ARGV[4], ARGV[1])
return 1
"#;

// KEYS: user, leaderboard, bet, user bets, prediction bets, prediction
// ARGV: amount, bet json, uid, timestamp ms, bet id
const PLACE_BET: &str = r#"
if redis.call('EXISTS', KEYS[3]) == 1 then
    return {-3, 0}
end
local points = redis.call('HGET', KEYS[1], 'points')
if not points then
    return {-1, 0}
end
local raw = redis.call('GET', KEYS[6])
if not raw then
    return {-4, 0}
end
local prediction = cjson.decode(raw)
if prediction['status'] ~= 'active' or prediction['result'] ~= nil then
    return {-5, 0}
end
points = tonumber(points)
local amount = tonumber(ARGV[1])
if amount > points then
    return {-2, points}
end
local balance = redis.call('HINCRBY', KEYS[1], 'points', -amount)
redis.call('ZADD', KEYS[2], balance, ARGV[3])
redis.call('SET', KEYS[3], ARGV[2])
redis.call('ZADD', KEYS[4], ARGV[4], ARGV[5])
redis.call('SADD', KEYS[5], ARGV[5])
return {0, balance}
"#;

// KEYS: bet, user, leaderboard
// ARGV: settled bet json, credit, uid
const APPLY_RESOLUTION: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
    return -1
end
if cjson.decode(raw)['result'] ~= nil then
    return 0
end
if redis.call('EXISTS', KEYS[2]) == 0 then
    return -2
end
redis.call('SET', KEYS[1], ARGV[1])
local credit = tonumber(ARGV[2])
if credit > 0 then
    local balance = redis.call('HINCRBY', KEYS[2], 'points', credit)
    redis.call('ZADD', KEYS[3], balance, ARGV[3])
end
return 1
"#;

// KEYS: attempt, user, leaderboard
// ARGV: points, uid
const QUIZ_ATTEMPT: &str = r#"
if redis.call('EXISTS', KEYS[2]) == 0 then
    return -1
end
if not redis.call('SET', KEYS[1], '1', 'NX') then
    return -2
end
local balance = redis.call('HINCRBY', KEYS[2], 'points', tonumber(ARGV[1]))
redis.call('ZADD', KEYS[3], balance, ARGV[2])
return balance
"#;

const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

// KEYS: document, id set
// ARGV: expected json or '', new json, id
const PUBLISH: &str = r#"
local current = redis.call('GET', KEYS[1])
if (current or '') ~= ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2])
redis.call('SADD', KEYS[2], ARGV[3])
return 1
"#;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, RedisError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    create_user: Script,
    place_bet: Script,
    apply_resolution: Script,
    quiz_attempt: Script,
    compare_and_set: Script,
    publish: Script,
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self, RedisError> {
        let connection = init_redis(redis_url).await?;
        info!("Connected to Redis");

        Ok(Self {
            connection,
            create_user: Script::new(CREATE_USER),
            place_bet: Script::new(PLACE_BET),
            apply_resolution: Script::new(APPLY_RESOLUTION),
            quiz_attempt: Script::new(QUIZ_ATTEMPT),
            compare_and_set: Script::new(COMPARE_AND_SET),
            publish: Script::new(PUBLISH),
        })
    }

    /// Writes `document` unless `check` rejects the stored copy. Retried when the stored
    /// copy changes between the read and the write.
    async fn publish<T, F>(
        &self,
        key: String,
        set: &str,
        id: &str,
        document: &T,
        check: F,
    ) -> Result<(), AppError>
    where
        T: Document + Serialize + Sync,
        F: Fn(&T, &T) -> Result<(), LedgerError> + Send + Sync,
    {
        let encoded = encode(document)?;
        let mut connection = self.connection.clone();

        for attempt in 1..=CAS_ATTEMPTS {
            let current: Option<String> = connection.get(&key).await?;

            if let Some(raw) = &current {
                check(&parse_document(raw)?, document)?;
            }

            let written: i64 = self
                .publish
                .key(&key)
                .key(set)
                .arg(current.as_deref().unwrap_or(""))
                .arg(&encoded)
                .arg(id)
                .invoke_async(&mut connection)
                .await?;

            if written == 1 {
                return Ok(());
            }

            warn!("{key} changed underneath us, attempt {attempt}/{CAS_ATTEMPTS}");
        }

        Err(AppError::Conflict(format!("{key} is being modified")))
    }

    async fn documents<T: Document>(&self, keys: Vec<String>) -> Result<Vec<T>, AppError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut connection)
            .await?;

        // ids can outlive their documents only through manual edits, skip those
        raws.into_iter()
            .flatten()
            .map(|raw| parse_document(&raw).map_err(AppError::from))
            .collect()
    }

    async fn document<T: Document>(&self, key: String) -> Result<Option<T>, AppError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.get(&key).await?;

        Ok(raw.map(|raw| parse_document(&raw)).transpose()?)
    }

    async fn users(&self, uids: &[String]) -> Result<Vec<User>, AppError> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for uid in uids {
            pipe.hgetall(user_key(uid));
        }

        let mut connection = self.connection.clone();
        let hashes: Vec<HashMap<String, String>> = pipe.query_async(&mut connection).await?;

        hashes
            .iter()
            .filter(|fields| !fields.is_empty())
            .map(|fields| User::from_fields(fields).map_err(AppError::from))
            .collect()
    }
}

impl Store for RedisStore {
    async fn get_user(&self, uid: &str) -> Result<Option<User>, AppError> {
        let mut connection = self.connection.clone();
        let fields: HashMap<String, String> = connection.hgetall(user_key(uid)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(User::from_fields(&fields)?))
    }

    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut connection = self.connection.clone();
        let created: i64 = self
            .create_user
            .key(user_key(&user.uid))
            .key(LEADERBOARD)
            .arg(&user.uid)
            .arg(&user.email)
            .arg(&user.display_name)
            .arg(user.points)
            .arg(user.created_at.to_rfc3339())
            .invoke_async(&mut connection)
            .await?;

        if created == 1 {
            info!("Created profile for {}", user.uid);
        }

        self.get_user(&user.uid)
            .await?
            .ok_or_else(|| LedgerError::not_found("User", &user.uid).into())
    }

    async fn top_users(&self, limit: usize) -> Result<Vec<User>, AppError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut connection = self.connection.clone();
        let uids: Vec<String> = connection
            .zrevrange(LEADERBOARD, 0, limit as isize - 1)
            .await?;

        self.users(&uids).await
    }

    async fn get_prediction(&self, id: &str) -> Result<Option<Prediction>, AppError> {
        self.document(prediction_key(id)).await
    }

    async fn list_predictions(&self) -> Result<Vec<Prediction>, AppError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection.smembers(PREDICTIONS).await?;

        self.documents(ids.iter().map(|id| prediction_key(id)).collect())
            .await
    }

    async fn put_prediction(&self, prediction: &Prediction) -> Result<(), AppError> {
        self.publish(
            prediction_key(&prediction.id),
            PREDICTIONS,
            &prediction.id,
            prediction,
            ensure_replaceable,
        )
        .await
    }

    async fn update_prediction<F>(&self, id: &str, apply: F) -> Result<Prediction, AppError>
    where
        F: Fn(Prediction) -> Result<Prediction, LedgerError> + Send + Sync,
    {
        let key = prediction_key(id);
        let mut connection = self.connection.clone();

        for attempt in 1..=CAS_ATTEMPTS {
            let Some(raw): Option<String> = connection.get(&key).await? else {
                return Err(LedgerError::not_found("Prediction", id).into());
            };

            let updated = apply(parse_document(&raw)?)?;

            let swapped: i64 = self
                .compare_and_set
                .key(&key)
                .arg(&raw)
                .arg(encode(&updated)?)
                .invoke_async(&mut connection)
                .await?;

            if swapped == 1 {
                return Ok(updated);
            }

            warn!("Prediction {id} changed underneath us, attempt {attempt}/{CAS_ATTEMPTS}");
        }

        Err(AppError::Conflict(format!("Prediction {id} is being modified")))
    }

    async fn get_quiz(&self, id: &str) -> Result<Option<Quiz>, AppError> {
        self.document(quiz_key(id)).await
    }

    async fn list_quizzes(&self) -> Result<Vec<Quiz>, AppError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection.smembers(QUIZZES).await?;

        self.documents(ids.iter().map(|id| quiz_key(id)).collect())
            .await
    }

    async fn put_quiz(&self, quiz: &Quiz) -> Result<(), AppError> {
        self.publish(quiz_key(&quiz.id), QUIZZES, &quiz.id, quiz, ensure_unchanged)
            .await
    }

    async fn insert_bet(&self, bet: &UserBet) -> Result<Placement, AppError> {
        let mut connection = self.connection.clone();
        let (code, value): (i64, i64) = self
            .place_bet
            .key(user_key(&bet.uid))
            .key(LEADERBOARD)
            .key(bet_key(&bet.id))
            .key(user_bets_key(&bet.uid))
            .key(prediction_bets_key(&bet.prediction_id))
            .key(prediction_key(&bet.prediction_id))
            .arg(bet.amount)
            .arg(encode(bet)?)
            .arg(&bet.uid)
            .arg(bet.timestamp.timestamp_millis())
            .arg(&bet.id)
            .invoke_async(&mut connection)
            .await?;

        match code {
            0 => Ok(Placement::Placed {
                balance: value.max(0) as u64,
            }),
            -1 => Err(LedgerError::not_found("User", &bet.uid).into()),
            -2 => Err(LedgerError::InsufficientBalance {
                amount: bet.amount,
                balance: value.max(0) as u64,
            }
            .into()),
            -3 => Ok(Placement::Duplicate),
            -4 => Err(LedgerError::not_found("Prediction", &bet.prediction_id).into()),
            _ => Err(LedgerError::PredictionNotActive(bet.prediction_id.clone()).into()),
        }
    }

    async fn get_bet(&self, id: &str) -> Result<Option<UserBet>, AppError> {
        self.document(bet_key(id)).await
    }

    async fn user_bets(&self, uid: &str) -> Result<Vec<UserBet>, AppError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection.zrevrange(user_bets_key(uid), 0, -1).await?;

        self.documents(ids.iter().map(|id| bet_key(id)).collect())
            .await
    }

    async fn prediction_bets(&self, prediction_id: &str) -> Result<Vec<UserBet>, AppError> {
        let mut connection = self.connection.clone();
        let ids: Vec<String> = connection
            .smembers(prediction_bets_key(prediction_id))
            .await?;

        self.documents(ids.iter().map(|id| bet_key(id)).collect())
            .await
    }

    async fn apply_resolution(&self, resolution: &Resolution) -> Result<bool, AppError> {
        let bet = &resolution.bet;
        let mut connection = self.connection.clone();
        let applied: i64 = self
            .apply_resolution
            .key(bet_key(&bet.id))
            .key(user_key(&bet.uid))
            .key(LEADERBOARD)
            .arg(encode(bet)?)
            .arg(resolution.credit)
            .arg(&bet.uid)
            .invoke_async(&mut connection)
            .await?;

        match applied {
            1 => Ok(true),
            0 => Ok(false),
            -1 => Err(LedgerError::not_found("Bet", &bet.id).into()),
            _ => Err(LedgerError::not_found("User", &bet.uid).into()),
        }
    }

    async fn record_quiz_attempt(
        &self,
        uid: &str,
        quiz_id: &str,
        points: u64,
    ) -> Result<u64, AppError> {
        let mut connection = self.connection.clone();
        let balance: i64 = self
            .quiz_attempt
            .key(attempt_key(uid, quiz_id))
            .key(user_key(uid))
            .key(LEADERBOARD)
            .arg(points)
            .arg(uid)
            .invoke_async(&mut connection)
            .await?;

        match balance {
            -1 => Err(LedgerError::not_found("User", uid).into()),
            -2 => Err(LedgerError::QuizAlreadySubmitted(quiz_id.to_string()).into()),
            balance => Ok(balance.max(0) as u64),
        }
    }
}
