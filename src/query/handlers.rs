// region:    --- Imports
use crate::auction::aggregate::AuctionAggregate;
use crate::auction::model::{Auction, AuctionId, AuctionStatus, Bid, UserId};
use crate::error::{Error, Result};
use crate::store::{
    auction_partition, user_partition, EndDateRange, IndexQuery, Record, RecordKey, Store,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Views
/// 경매 조회 결과. 입찰 목록은 요청한 경우에만 채운다(최신순).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionView {
    #[serde(flatten)]
    pub auction: Auction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bids: Option<Vec<Bid>>,
}

/// 사용자 경매 목록 조회 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAuctionRole {
    /// 판매자로 등록한 경매
    Seller,
    /// 선두(또는 낙찰)인 경매
    Winner,
    /// 입찰에 참여한 경매
    Participant,
}
// endregion: --- Views

// region:    --- Query Handlers

/// 경매와 입찰 목록 조회
///
/// 같은 파티션을 한 번 범위 조회해 경매 레코드와 입찰 레코드를 함께 읽는다.
pub async fn get_auction_with_bids(
    store: &dyn Store,
    auction_id: AuctionId,
) -> Result<Option<AuctionAggregate>> {
    info!("{:<12} --> 경매 및 입찰 조회 id: {}", "Query", auction_id);
    let records = store
        .query(
            IndexQuery::Partition {
                partition: auction_partition(auction_id),
            },
            None,
        )
        .await?;

    let mut auction = None;
    let mut bids = Vec::new();
    for record in records {
        match record {
            Record::Auction(found) => auction = Some(found),
            Record::Bid(bid) => bids.push(bid),
            other => warn!(
                "{:<12} --> 경매 파티션에 예상치 못한 레코드: {}",
                "Query",
                other.kind()
            ),
        }
    }
    Ok(auction.map(|auction| AuctionAggregate::new(auction, bids)))
}

/// 경매 레코드만 조회
pub async fn get_auction_record(store: &dyn Store, auction_id: AuctionId) -> Result<Auction> {
    store
        .get_by_key(&RecordKey::auction(auction_id))
        .await?
        .and_then(Record::into_auction)
        .ok_or(Error::AuctionNotFound(auction_id))
}

/// 경매 조회 (입찰 목록 포함 여부 선택)
pub async fn get_auction(
    store: &dyn Store,
    auction_id: AuctionId,
    include_bids: bool,
) -> Result<AuctionView> {
    if !include_bids {
        info!("{:<12} --> 경매 조회 id: {}", "Query", auction_id);
        let auction = get_auction_record(store, auction_id).await?;
        return Ok(AuctionView {
            auction,
            bids: None,
        });
    }

    let aggregate = get_auction_with_bids(store, auction_id)
        .await?
        .ok_or(Error::AuctionNotFound(auction_id))?;
    let mut bids = aggregate.bids;
    bids.reverse();
    Ok(AuctionView {
        auction: aggregate.auction,
        bids: Some(bids),
    })
}

/// 진행 중인 경매 목록 (종료 임박 순)
pub async fn list_open_auctions(
    store: &dyn Store,
    now: DateTime<Utc>,
    limit: Option<usize>,
) -> Result<Vec<Auction>> {
    info!("{:<12} --> 진행 중인 경매 조회", "Query");
    let records = store
        .query(
            IndexQuery::ByStatus {
                status: AuctionStatus::Open,
                end: EndDateRange::After(now),
            },
            limit,
        )
        .await?;
    Ok(records.into_iter().filter_map(Record::into_auction).collect())
}

/// 사용자 경매 목록
pub async fn list_user_auctions(
    store: &dyn Store,
    user_id: &UserId,
    role: UserAuctionRole,
) -> Result<Vec<Auction>> {
    info!(
        "{:<12} --> 사용자 경매 조회 user: {}, role: {:?}",
        "Query", user_id, role
    );
    let query = match role {
        UserAuctionRole::Seller => IndexQuery::BySeller {
            seller_id: user_id.clone(),
            display_name_not: None,
        },
        UserAuctionRole::Winner => IndexQuery::ByCurrentBidder {
            bidder_id: user_id.clone(),
        },
        UserAuctionRole::Participant => {
            return list_participated_auctions(store, user_id).await;
        }
    };
    let records = store.query(query, None).await?;
    Ok(records.into_iter().filter_map(Record::into_auction).collect())
}

/// 사용자별 입찰 프로젝션을 따라 참여한 경매를 읽는다.
async fn list_participated_auctions(store: &dyn Store, user_id: &UserId) -> Result<Vec<Auction>> {
    let records = store
        .query(
            IndexQuery::Partition {
                partition: user_partition(user_id),
            },
            None,
        )
        .await?;

    let mut auctions = Vec::new();
    for record in records {
        if let Record::UserBid(user_bid) = record {
            match get_auction_record(store, user_bid.auction_id).await {
                Ok(auction) => auctions.push(auction),
                Err(Error::AuctionNotFound(id)) => {
                    warn!("{:<12} --> 프로젝션이 가리키는 경매 없음: {}", "Query", id)
                }
                Err(e) => return Err(e),
            }
        }
    }
    auctions.sort_by_key(|auction| (auction.end_date, auction.id));
    Ok(auctions)
}

// endregion: --- Query Handlers
