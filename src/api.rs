//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::ApiError;
use crate::explore;
use crate::models::{
    ApprovalStatus, ContributorPreview, FundingRound, RoundPhase, VerifiedProject,
};
use crate::prices;

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
}

/// Donations above this USD value are rejected outright.
pub const MAX_DONATION_USD: f64 = 2500.0;

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExploreParams {
    /// Industry tag value to match, e.g. `defi`.
    pub filter: Option<String>,
    /// Comma-separated round ids. A present-but-empty parameter is a
    /// different request than an absent one: it narrows the industry
    /// filter to a raw substring match instead of combining with rounds.
    pub round: Option<String>,
    /// Shuffle seed; omitting it behaves exactly like `seed=0`.
    pub seed: Option<u64>,
    /// Skip the contributor previews (mobile cards don't render them).
    #[serde(default)]
    pub mobile: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateContribution {
    pub project_round_id: String,
    pub user_id: String,
    pub amount: f64,
    pub token: String,
    /// Percentage of the donation pledged to the matching pool.
    #[serde(default = "default_matching_share")]
    pub matching_pool_share: i64,
    /// Signature of the already-submitted on-chain transaction, stored
    /// opaquely; this service never talks to the chain itself.
    pub tx_signature: String,
}

fn default_matching_share() -> i64 {
    10
}

#[derive(Serialize)]
pub struct VerifiedProjectsResponse {
    pub count: usize,
    pub projects: Vec<VerifiedProject>,
}

#[derive(Serialize)]
pub struct ContributorsResponse {
    pub project_id: String,
    pub count: usize,
    pub contributors: Vec<ContributorPreview>,
}

#[derive(Serialize)]
pub struct RoundScheduleEntry {
    #[serde(flatten)]
    pub round: FundingRound,
    pub phase: RoundPhase,
}

#[derive(Serialize)]
pub struct RoundsResponse {
    pub count: usize,
    pub rounds: Vec<RoundScheduleEntry>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `GET /projects/verified`
///
/// The explorer feed: approved participations shuffled by `seed` and
/// narrowed by the optional `filter` / `round` parameters.
pub async fn get_verified_projects(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<ExploreParams>,
) -> impl IntoResponse {
    let rounds = parse_round_set(params.round.as_deref());

    let mut projects = match db::list_verified_participations(&state.pool).await {
        Ok(items) => explore::order_and_filter(
            items,
            params.seed,
            params.filter.as_deref(),
            rounds.as_deref(),
        ),
        Err(e) => return error_response(e),
    };

    if !params.mobile {
        let ids: Vec<String> = projects.iter().map(|e| e.project.id.clone()).collect();
        match db::contributor_previews(&state.pool, &ids).await {
            Ok(previews) => {
                for entry in &mut projects {
                    if let Some(list) = previews.get(&entry.project.id) {
                        entry.project.contributions = list.clone();
                    }
                }
            }
            Err(e) => return error_response(e),
        }
    }

    let count = projects.len();
    (
        StatusCode::OK,
        Json(serde_json::json!(VerifiedProjectsResponse { count, projects })),
    )
        .into_response()
}

/// `GET /projects/:id/contributors`
///
/// All distinct contributors of the given project.
pub async fn get_project_contributors(
    State(state): State<Arc<ApiState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    match db::contributors_for_project(&state.pool, &project_id).await {
        Ok(contributors) => {
            let count = contributors.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(ContributorsResponse {
                    project_id,
                    count,
                    contributors,
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `GET /rounds`
///
/// The round schedule, each entry tagged with its phase relative to now.
pub async fn get_rounds(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match db::list_rounds(&state.pool).await {
        Ok(rounds) => {
            let now = Utc::now().timestamp();
            let rounds: Vec<RoundScheduleEntry> = rounds
                .into_iter()
                .map(|round| RoundScheduleEntry {
                    phase: RoundPhase::at(now, round.start_time, round.end_time),
                    round,
                })
                .collect();
            let count = rounds.len();
            (
                StatusCode::OK,
                Json(serde_json::json!(RoundsResponse { count, rounds })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// `POST /contributions`
///
/// Records a donation whose transaction was already signed and submitted
/// by the caller's wallet. The participation must be approved, the token
/// supported with a cached quote, and the USD value under the cap.
pub async fn create_contribution(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateContribution>,
) -> impl IntoResponse {
    let participation = match db::get_participation(&state.pool, &body.project_round_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return error_response(ApiError::NotFound(format!(
                "participation {} does not exist",
                body.project_round_id
            )))
        }
        Err(e) => return error_response(e),
    };
    let status = ApprovalStatus::from_db(&participation.status);
    if status != ApprovalStatus::Approved {
        return error_response(ApiError::Validation(format!(
            "participation {} is {} and cannot accept donations",
            participation.id,
            status.as_str()
        )));
    }

    let feed_id = match prices::feed_id(&body.token) {
        Some(id) => id,
        None => {
            return error_response(ApiError::Validation(format!(
                "unsupported donation token: {}",
                body.token
            )))
        }
    };
    let quote = match db::latest_price(&state.pool, feed_id).await {
        Ok(Some(quote)) => quote,
        Ok(None) => {
            return error_response(ApiError::Validation(format!(
                "no cached price for token: {}",
                body.token
            )))
        }
        Err(e) => return error_response(e),
    };

    let usd_amount = match validate_donation(body.amount, body.matching_pool_share, quote.usd) {
        Ok(usd) => usd,
        Err(e) => return error_response(e),
    };

    let new = db::NewContribution {
        project_round_id: &body.project_round_id,
        project_id: &participation.project_id,
        user_id: &body.user_id,
        amount: body.amount,
        token: &body.token,
        usd_amount,
        matching_pool_share: body.matching_pool_share,
        tx_signature: &body.tx_signature,
    };
    match db::insert_contribution(&state.pool, &new).await {
        Ok(stored) => (StatusCode::CREATED, Json(serde_json::json!(stored))).into_response(),
        Err(e) => error_response(e),
    }
}

// ─────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────

/// Pure donation checks; returns the USD value on success.
pub fn validate_donation(
    amount: f64,
    matching_pool_share: i64,
    price_usd: f64,
) -> crate::errors::Result<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ApiError::Validation(
            "donation amount must be positive".to_string(),
        ));
    }
    if !(0..=100).contains(&matching_pool_share) {
        return Err(ApiError::Validation(
            "matching pool share must be between 0 and 100".to_string(),
        ));
    }
    let usd = amount * price_usd;
    if usd > MAX_DONATION_USD {
        return Err(ApiError::Validation(format!(
            "cannot donate above ${MAX_DONATION_USD} per contribution"
        )));
    }
    Ok(usd)
}

/// Split the `round` query parameter. `None` means no round set at all;
/// `Some("")` is the empty set, which drives a different filter branch.
fn parse_round_set(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(String::from)
            .collect()
    })
}

fn error_response(e: ApiError) -> Response {
    (
        e.status(),
        Json(serde_json::json!(ErrorResponse {
            error: e.to_string()
        })),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
