//! 저장소 어댑터
//!
//! 파티션 단위 문서 저장소를 감싼다. 제공하는 기능은 세 가지뿐이다.
//!
//! * 버전 조건부 단일 쓰기
//! * 최대 `MAX_TRANSACT_ITEMS`개 항목의 원자적 다중 쓰기 (전부 성공 또는 전부 실패)
//! * 인덱스 범위 조회
//!
//! 파티션을 가로지르는 일반 잠금은 없다. 모든 조정은 조건부 쓰기로 이루어진다.
pub mod memory;
pub mod postgres;

// region:    --- Imports
use crate::auction::model::{
    Auction, AuctionId, AuctionStatus, Bid, BidId, UserBid, UserId, UserProfile, Version,
};
use crate::error::StoreError;
use crate::lease::LeaseRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

// endregion: --- Imports

/// 트랜잭션 하나에 담을 수 있는 최대 항목 수
pub const MAX_TRANSACT_ITEMS: usize = 100;

// region:    --- Keys
/// 파티션 키 + 정렬 키
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub partition: String,
    pub sort: String,
}

impl RecordKey {
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: sort.into(),
        }
    }

    pub fn auction(auction_id: AuctionId) -> Self {
        Self::new(auction_partition(auction_id), "AUCTION")
    }

    pub fn bid(auction_id: AuctionId, bid_id: BidId) -> Self {
        Self::new(auction_partition(auction_id), format!("BID#{}", bid_id))
    }

    pub fn user(user_id: &UserId) -> Self {
        Self::new(user_partition(user_id), "PROFILE")
    }

    pub fn user_bid(user_id: &UserId, auction_id: AuctionId) -> Self {
        Self::new(user_partition(user_id), format!("BID#{}", auction_id))
    }

    pub fn lease(name: &str) -> Self {
        Self::new(format!("LEASE#{}", name), "LEASE")
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.sort)
    }
}

/// 경매와 그 입찰들이 공유하는 파티션
pub fn auction_partition(auction_id: AuctionId) -> String {
    format!("AUCTION#{}", auction_id)
}

/// 사용자 프로필과 사용자별 입찰 프로젝션이 공유하는 파티션
pub fn user_partition(user_id: &UserId) -> String {
    format!("USER#{}", user_id)
}
// endregion: --- Keys

// region:    --- Records
/// 저장소에 들어가는 레코드 종류
///
/// 파티션을 범위 조회하면 여러 종류가 섞여 나오므로 `kind`로 구분한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Record {
    Auction(Auction),
    Bid(Bid),
    UserBid(UserBid),
    User(UserProfile),
    Lease(LeaseRecord),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Auction(auction) => RecordKey::auction(auction.id),
            Record::Bid(bid) => RecordKey::bid(bid.auction_id, bid.bid_id),
            Record::UserBid(user_bid) => RecordKey::user_bid(&user_bid.user_id, user_bid.auction_id),
            Record::User(user) => RecordKey::user(&user.user_id),
            Record::Lease(lease) => RecordKey::lease(&lease.name),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Record::Auction(_) => "Auction",
            Record::Bid(_) => "Bid",
            Record::UserBid(_) => "UserBid",
            Record::User(_) => "User",
            Record::Lease(_) => "Lease",
        }
    }

    /// 변경 가능한 레코드의 버전. 불변 레코드(입찰, 프로젝션)는 없음.
    pub fn version(&self) -> Option<Version> {
        match self {
            Record::Auction(auction) => Some(auction.version),
            Record::User(user) => Some(user.version),
            Record::Lease(lease) => Some(lease.version),
            Record::Bid(_) | Record::UserBid(_) => None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match self {
            Record::User(user) => Some(&user.display_name),
            _ => None,
        }
    }

    pub fn as_auction(&self) -> Option<&Auction> {
        match self {
            Record::Auction(auction) => Some(auction),
            _ => None,
        }
    }

    pub fn into_auction(self) -> Option<Auction> {
        match self {
            Record::Auction(auction) => Some(auction),
            _ => None,
        }
    }
}
// endregion: --- Records

// region:    --- Conditions
/// 조건 술어
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    NotExists,
    VersionEquals(Version),
    DisplayNameEquals(String),
}

impl Predicate {
    fn holds(&self, current: Option<&Record>) -> bool {
        match self {
            Predicate::NotExists => current.is_none(),
            Predicate::VersionEquals(expected) => {
                current.and_then(Record::version) == Some(*expected)
            }
            Predicate::DisplayNameEquals(expected) => {
                current.and_then(Record::display_name) == Some(expected.as_str())
            }
        }
    }
}

/// 술어들의 논리곱. 비어 있으면 무조건 쓰기다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition(Vec<Predicate>);

impl Condition {
    pub fn none() -> Self {
        Self(Vec::new())
    }

    pub fn not_exists() -> Self {
        Self(vec![Predicate::NotExists])
    }

    pub fn version_equals(version: Version) -> Self {
        Self(vec![Predicate::VersionEquals(version)])
    }

    pub fn and(mut self, predicate: Predicate) -> Self {
        self.0.push(predicate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 항목이 없어야 성립하는 조건인지
    pub fn requires_absence(&self) -> bool {
        self.0.contains(&Predicate::NotExists)
    }

    pub fn holds(&self, current: Option<&Record>) -> bool {
        self.0.iter().all(|predicate| predicate.holds(current))
    }
}
// endregion: --- Conditions

// region:    --- Transactions
/// 원자적 다중 쓰기의 한 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactItem {
    /// 조건부 전체 쓰기
    Put { record: Record, condition: Condition },
    /// 경매의 판매자 표시 이름 갱신. 버전은 검사하지 않고 새 버전만 기록한다.
    SetSellerDisplayName {
        key: RecordKey,
        display_name: String,
        version: Version,
    },
    /// 쓰기 없는 조건 검사 (펜싱 항목)
    ConditionCheck { key: RecordKey, condition: Condition },
}

impl TransactItem {
    pub fn put(record: Record, condition: Condition) -> Self {
        TransactItem::Put { record, condition }
    }

    pub fn key(&self) -> RecordKey {
        match self {
            TransactItem::Put { record, .. } => record.key(),
            TransactItem::SetSellerDisplayName { key, .. } => key.clone(),
            TransactItem::ConditionCheck { key, .. } => key.clone(),
        }
    }

    /// 현재 저장된 레코드에 대해 이 항목의 조건이 성립하는지
    pub(crate) fn holds(&self, current: Option<&Record>) -> bool {
        match self {
            TransactItem::Put { condition, .. } => condition.holds(current),
            TransactItem::SetSellerDisplayName { .. } => {
                matches!(current, Some(Record::Auction(_)))
            }
            TransactItem::ConditionCheck { condition, .. } => condition.holds(current),
        }
    }
}

/// 항목 수와 키 중복을 검사한다. 어느 쓰기보다도 먼저 수행된다.
pub(crate) fn validate_transaction(items: &[TransactItem]) -> Result<(), StoreError> {
    if items.len() > MAX_TRANSACT_ITEMS {
        return Err(StoreError::TransactionTooLarge {
            count: items.len(),
            max: MAX_TRANSACT_ITEMS,
        });
    }
    let mut seen = HashSet::with_capacity(items.len());
    for item in items {
        let key = item.key();
        if !seen.insert(key.clone()) {
            return Err(StoreError::DuplicateTransactItem { key });
        }
    }
    Ok(())
}

/// 경매 레코드에 새 판매자 표시 이름과 버전을 반영한다.
pub(crate) fn apply_seller_display_name(
    record: &mut Record,
    display_name: &str,
    version: Version,
) -> bool {
    match record {
        Record::Auction(auction) => {
            auction.seller_display_name = display_name.to_string();
            auction.version = version;
            true
        }
        _ => false,
    }
}
// endregion: --- Transactions

// region:    --- Queries
/// 종료 시각 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDateRange {
    Any,
    AtOrBefore(DateTime<Utc>),
    After(DateTime<Utc>),
}

impl EndDateRange {
    fn contains(&self, end_date: DateTime<Utc>) -> bool {
        match self {
            EndDateRange::Any => true,
            EndDateRange::AtOrBefore(at) => end_date <= *at,
            EndDateRange::After(at) => end_date > *at,
        }
    }
}

/// 인덱스 조회
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexQuery {
    /// 기본 키 파티션 범위 (정렬 키 순)
    Partition { partition: String },
    /// 상태 + 종료 시각 인덱스 (종료 시각 오름차순)
    ByStatus {
        status: AuctionStatus,
        end: EndDateRange,
    },
    /// 판매자 인덱스. 표시 이름이 다른 경매만 거르는 필터를 둘 수 있다.
    BySeller {
        seller_id: UserId,
        display_name_not: Option<String>,
    },
    /// 현재 선두 입찰자 인덱스
    ByCurrentBidder { bidder_id: UserId },
}

impl IndexQuery {
    /// 경매 인덱스 조회에서 레코드가 조건에 맞는지
    pub(crate) fn matches_auction(&self, auction: &Auction) -> bool {
        match self {
            IndexQuery::Partition { .. } => false,
            IndexQuery::ByStatus { status, end } => {
                auction.status == *status && end.contains(auction.end_date)
            }
            IndexQuery::BySeller {
                seller_id,
                display_name_not,
            } => {
                auction.seller_id == *seller_id
                    && display_name_not
                        .as_ref()
                        .map_or(true, |name| auction.seller_display_name != *name)
            }
            IndexQuery::ByCurrentBidder { bidder_id } => {
                auction.current_bidder_id.as_ref() == Some(bidder_id)
            }
        }
    }
}
// endregion: --- Queries

// region:    --- Store Trait
/// 저장소 어댑터 트레이트
#[async_trait]
pub trait Store: Send + Sync {
    /// 키로 조회
    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<Record>, StoreError>;

    /// 조건부 단일 쓰기. 조건이 맞지 않으면 `ConditionFailed`.
    async fn conditional_put(&self, record: Record, condition: Condition)
        -> Result<(), StoreError>;

    /// 원자적 다중 쓰기. 하나라도 조건이 맞지 않으면 `TransactionCanceled`.
    async fn transact_write(&self, items: Vec<TransactItem>) -> Result<(), StoreError>;

    /// 인덱스 조회
    async fn query(&self, query: IndexQuery, limit: Option<usize>)
        -> Result<Vec<Record>, StoreError>;
}
// endregion: --- Store Trait
