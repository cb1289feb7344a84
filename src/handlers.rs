// region:    --- Imports
use crate::auction::model::{AuctionId, UserId};
use crate::bidding::commands::{
    AuctionService, CancelAuctionCommand, CreateAuctionCommand, PlaceBidCommand,
};
use crate::error::Error;
use crate::query::handlers::{self as queries, UserAuctionRole};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

// endregion: --- Imports

// region:    --- App State
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AuctionService>,
}

/// 라우터 설정
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/auctions", post(handle_create_auction).get(handle_list_open_auctions))
        .route("/auctions/:id", get(handle_get_auction))
        .route("/auctions/:id/bids", post(handle_place_bid))
        .route("/auctions/:id/cancel", post(handle_cancel_auction))
        .route("/users/:id/auctions", get(handle_list_user_auctions))
        .with_state(state)
}
// endregion: --- App State

// region:    --- Error Response
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::Auction(e) if e.is_business_rule() => (
                StatusCode::BAD_REQUEST,
                json!({ "code": e.code(), "message": e.to_string() }),
            ),
            Error::AuctionNotFound(_) | Error::UserNotFound(_) => (
                StatusCode::NOT_FOUND,
                json!({ "code": "NOT_FOUND", "message": self.to_string() }),
            ),
            Error::ConcurrencyConflict { .. } => (
                StatusCode::CONFLICT,
                json!({ "code": "CONFLICT", "message": "다른 요청과 충돌했습니다. 다시 시도해 주세요." }),
            ),
            _ => {
                error!("{:<12} --> 요청 처리 실패: {}", "Handler", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "code": "INTERNAL", "message": "요청을 처리하지 못했습니다." }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
// endregion: --- Error Response

// region:    --- Request Bodies
#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub bidder_id: UserId,
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelAuctionRequest {
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct GetAuctionParams {
    #[serde(default)]
    pub include_bids: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListAuctionsParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UserAuctionsParams {
    pub role: Option<UserAuctionRole>,
}
// endregion: --- Request Bodies

// region:    --- Command Handlers

/// 경매 생성
pub async fn handle_create_auction(
    State(state): State<AppState>,
    Json(cmd): Json<CreateAuctionCommand>,
) -> Result<impl IntoResponse, Error> {
    let auction = state.service.create_auction(cmd).await?;
    Ok((StatusCode::CREATED, Json(auction)))
}

/// 입찰 요청 처리
pub async fn handle_place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<AuctionId>,
    Json(req): Json<PlaceBidRequest>,
) -> Result<impl IntoResponse, Error> {
    let bid = state
        .service
        .place_bid(PlaceBidCommand {
            auction_id,
            bidder_id: req.bidder_id,
            amount: req.amount,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// 경매 취소
pub async fn handle_cancel_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<AuctionId>,
    Json(req): Json<CancelAuctionRequest>,
) -> Result<impl IntoResponse, Error> {
    let auction = state
        .service
        .cancel_auction(CancelAuctionCommand {
            auction_id,
            user_id: req.user_id,
        })
        .await?;
    Ok(Json(auction))
}
// endregion: --- Command Handlers

// region:    --- Query Handlers

/// 경매 조회
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<AuctionId>,
    Query(params): Query<GetAuctionParams>,
) -> Result<impl IntoResponse, Error> {
    let view = queries::get_auction(state.service.store(), auction_id, params.include_bids).await?;
    Ok(Json(view))
}

/// 진행 중인 경매 목록
pub async fn handle_list_open_auctions(
    State(state): State<AppState>,
    Query(params): Query<ListAuctionsParams>,
) -> Result<impl IntoResponse, Error> {
    let auctions =
        queries::list_open_auctions(state.service.store(), state.service.now(), params.limit)
            .await?;
    Ok(Json(auctions))
}

/// 사용자 경매 목록
pub async fn handle_list_user_auctions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<UserAuctionsParams>,
) -> Result<impl IntoResponse, Error> {
    let role = params.role.unwrap_or(UserAuctionRole::Seller);
    info!(
        "{:<12} --> 사용자 경매 목록 요청: {}, {:?}",
        "Handler", user_id, role
    );
    let auctions =
        queries::list_user_auctions(state.service.store(), &UserId::from(user_id), role).await?;
    Ok(Json(auctions))
}
// endregion: --- Query Handlers
