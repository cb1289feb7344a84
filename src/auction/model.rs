use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// region:    --- Identifiers
/// 경매 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuctionId(pub Uuid);

impl AuctionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 사용자 식별자. 인증 시스템이 발급한 불투명한 값이다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 입찰 식별자. 생성 시각(마이크로초) 기반이며 경매 안에서 단조 증가한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidId(pub i64);

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:020}", self.0)
    }
}

/// 버전 토큰
///
/// 순번이 아니라 동등 비교만 하는 불투명한 값이다. 쓰기가 성공할 때마다 새로 발급된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub Uuid);

impl Version {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
// endregion: --- Identifiers

// region:    --- Auction
/// 경매 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuctionStatus {
    Open,
    Cancelled,
    Complete,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Open => "OPEN",
            AuctionStatus::Cancelled => "CANCELLED",
            AuctionStatus::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 경매 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: AuctionId,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub initial_price: i64,
    pub bid_increment: i64,
    pub end_date: DateTime<Utc>,
    pub status: AuctionStatus,
    pub seller_id: UserId,
    /// 판매자 표시 이름의 비정규화 사본
    pub seller_display_name: String,
    pub current_price: i64,
    pub current_bid_id: Option<BidId>,
    pub current_bidder_id: Option<UserId>,
    pub number_of_bids: u32,
    /// 마지막으로 발급된 입찰 식별자(선두 입찰이 아닐 수도 있음)
    pub last_bid_id: Option<BidId>,
    pub created_at: DateTime<Utc>,
    pub cancelled_date: Option<DateTime<Utc>>,
    pub version: Version,
}

/// 입찰 레코드. 생성 후 변경되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub auction_id: AuctionId,
    pub bid_id: BidId,
    pub bidder_id: UserId,
    pub amount: i64,
    pub placed_at: DateTime<Utc>,
}
// endregion: --- Auction

// region:    --- Projections
/// 사용자별 경매당 최근 입찰 프로젝션
///
/// 입찰이 수락될 때마다 통째로 덮어쓴다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBid {
    pub user_id: UserId,
    pub auction_id: AuctionId,
    pub bid_id: BidId,
    pub amount: i64,
    pub placed_at: DateTime<Utc>,
}

impl UserBid {
    pub fn from_bid(bid: &Bid) -> Self {
        Self {
            user_id: bid.bidder_id.clone(),
            auction_id: bid.auction_id,
            bid_id: bid.bid_id,
            amount: bid.amount,
            placed_at: bid.placed_at,
        }
    }
}

/// 사용자 프로필. 신원 관리 시스템이 소유하며 여기서는 읽기와 펜싱에만 쓴다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub version: Version,
}
// endregion: --- Projections
