// region:    --- Imports
use crate::auction::model::{AuctionId, AuctionStatus, BidId, UserId};
use crate::store::RecordKey;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Auction Errors
/// 순수 도메인 로직(경매 애그리거트)에서 발생하는 비즈니스 규칙 오류
///
/// 항상 결정적이며, 재시도 없이 그대로 요청 거절로 응답한다.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuctionError {
    #[error("판매자는 자신의 경매에 입찰할 수 없습니다.")]
    SellerCannotBidOnOwnAuction,

    #[error("경매가 진행 중이 아닙니다.")]
    AuctionNotOpen,

    #[error("입찰 금액이 현재 입찰 금액({current})보다 높아야 합니다.")]
    BidNotHigherThanCurrentBid { current: i64 },

    #[error("입찰 금액이 최소 입찰가({minimum})보다 낮습니다.")]
    BidBelowMinimum { minimum: i64 },

    #[error("현재 경매 상태({status})에서는 요청을 처리할 수 없습니다.")]
    InvalidAuctionState { status: AuctionStatus },

    #[error("판매자만 경매를 취소할 수 있습니다.")]
    NotSeller,

    #[error("경매 이름이 비어 있습니다.")]
    EmptyName,

    #[error("시작 가격은 0보다 커야 합니다.")]
    InvalidInitialPrice,

    #[error("입찰 단위는 0보다 커야 합니다.")]
    InvalidBidIncrement,

    #[error("종료 시간이 이미 지났습니다.")]
    EndDateInPast,

    /// 입찰 수는 있는데 선두 입찰 레코드가 없는 손상된 상태
    #[error("선두 입찰 레코드를 찾을 수 없습니다: {bid_id:?}")]
    LeadingBidMissing { bid_id: Option<BidId> },
}

impl AuctionError {
    /// 응답에 사용되는 고정 오류 코드
    pub fn code(&self) -> &'static str {
        match self {
            AuctionError::SellerCannotBidOnOwnAuction => "SELLER_CANNOT_BID",
            AuctionError::AuctionNotOpen => "AUCTION_NOT_OPEN",
            AuctionError::BidNotHigherThanCurrentBid { .. } => "BID_NOT_HIGHER",
            AuctionError::BidBelowMinimum { .. } => "BID_BELOW_MINIMUM",
            AuctionError::InvalidAuctionState { .. } => "INVALID_STATUS",
            AuctionError::NotSeller => "NOT_SELLER",
            AuctionError::EmptyName => "EMPTY_NAME",
            AuctionError::InvalidInitialPrice => "INVALID_INITIAL_PRICE",
            AuctionError::InvalidBidIncrement => "INVALID_BID_INCREMENT",
            AuctionError::EndDateInPast => "END_DATE_IN_PAST",
            AuctionError::LeadingBidMissing { .. } => "LEADING_BID_MISSING",
        }
    }

    /// 요청 거절로 응답할 비즈니스 규칙 오류인지. 저장된 상태의 손상은 아니다.
    pub fn is_business_rule(&self) -> bool {
        !matches!(self, AuctionError::LeadingBidMissing { .. })
    }
}
// endregion: --- Auction Errors

// region:    --- Store Errors
/// 저장소 어댑터 오류
#[derive(Error, Debug)]
pub enum StoreError {
    /// 단일 조건부 쓰기의 조건 불일치
    #[error("조건부 쓰기 실패: {key}")]
    ConditionFailed { key: RecordKey },

    /// 트랜잭션 내 하나 이상의 조건 불일치로 전체 취소
    #[error("트랜잭션 취소: 조건 불일치 {keys:?}")]
    TransactionCanceled { keys: Vec<RecordKey> },

    #[error("트랜잭션 항목 수 초과: {count} (최대 {max})")]
    TransactionTooLarge { count: usize, max: usize },

    #[error("트랜잭션에 같은 키가 중복되었습니다: {key}")]
    DuplicateTransactItem { key: RecordKey },

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// 버전 조건(CAS) 실패 여부
    pub fn is_condition_failure(&self) -> bool {
        matches!(
            self,
            StoreError::ConditionFailed { .. } | StoreError::TransactionCanceled { .. }
        )
    }
}
// endregion: --- Store Errors

// region:    --- Service Errors
/// 서비스 계층 오류
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Auction(#[from] AuctionError),

    #[error("경매를 찾을 수 없습니다: {0}")]
    AuctionNotFound(AuctionId),

    #[error("사용자를 찾을 수 없습니다: {0}")]
    UserNotFound(UserId),

    /// 낙관적 동시성 충돌. 호출자가 다시 읽고 재시도해야 한다.
    #[error("동시성 충돌: {entity}")]
    ConcurrencyConflict { entity: String },

    /// 더 최신 이름 변경이 이미 반영된 오래된 이벤트
    #[error("오래된 이름 변경 이벤트: {user_id} (이벤트: {expected}, 현재: {actual})")]
    StaleDisplayName {
        user_id: UserId,
        expected: String,
        actual: String,
    },

    #[error("잘못된 배치 크기: {0}")]
    InvalidBatchSize(usize),

    #[error(transparent)]
    Store(StoreError),

    #[error("메시지 브로커 오류: {0}")]
    Broker(String),
}

impl Error {
    /// 저장소 오류를 서비스 오류로 변환한다. 조건 실패는 동시성 충돌이 된다.
    pub fn from_store(err: StoreError, entity: impl Into<String>) -> Self {
        if err.is_condition_failure() {
            Error::ConcurrencyConflict {
                entity: entity.into(),
            }
        } else {
            Error::Store(err)
        }
    }

    pub fn is_business_rule(&self) -> bool {
        matches!(self, Error::Auction(e) if e.is_business_rule())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConcurrencyConflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::AuctionNotFound(_) | Error::UserNotFound(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
// endregion: --- Service Errors
