/// 경매 관련 커맨드 처리
/// 1. 경매 생성
/// 2. 입찰
/// 3. 경매 취소
/// 4. 경매 종료
///
/// 모든 변경은 (a) 현재 레코드와 버전 읽기 (b) 메모리에서 도메인 전이
/// (c) "저장된 버전이 읽은 버전과 같을 때만" 조건부 쓰기 순서로 커밋한다.
/// 충돌은 자동 재시도하지 않고 `ConcurrencyConflict`로 호출자에게 돌려준다.
// region:    --- Imports
use crate::auction::aggregate::AuctionDraft;
use crate::auction::events::AuctionEvent;
use crate::auction::model::{Auction, AuctionId, Bid, UserBid, UserId};
use crate::clock::Clock;
use crate::error::{AuctionError, Error, Result};
use crate::message_broker::EventPublisher;
use crate::query::handlers::{get_auction_record, get_auction_with_bids};
use crate::store::{Condition, Record, Store, TransactItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
// endregion: --- Imports

// region:    --- Commands
/// 경매 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CreateAuctionCommand {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub initial_price: i64,
    pub bid_increment: i64,
    pub end_date: DateTime<Utc>,
    pub seller_id: UserId,
    pub seller_display_name: String,
}

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlaceBidCommand {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: i64,
}

/// 경매 취소 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancelAuctionCommand {
    pub auction_id: AuctionId,
    pub user_id: UserId,
}
// endregion: --- Commands

// region:    --- Auction Service
/// 입찰 애플리케이션 서비스
pub struct AuctionService {
    store: Arc<dyn Store>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl AuctionService {
    pub fn new(
        store: Arc<dyn Store>,
        publisher: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 1. 경매 생성
    pub async fn create_auction(&self, cmd: CreateAuctionCommand) -> Result<Auction> {
        info!("{:<12} --> 경매 생성 요청: {}", "Command", cmd.name);
        let draft = AuctionDraft {
            name: cmd.name,
            description: cmd.description,
            image_url: cmd.image_url,
            initial_price: cmd.initial_price,
            bid_increment: cmd.bid_increment,
            end_date: cmd.end_date,
            seller_id: cmd.seller_id,
            seller_display_name: cmd.seller_display_name,
        };
        let auction = Auction::create(draft, self.clock.now())?;

        self.store
            .conditional_put(Record::Auction(auction.clone()), Condition::not_exists())
            .await
            .map_err(|e| self.store_failure(e, "create_auction", auction.id))?;

        info!("{:<12} --> 경매 생성 완료 id: {}", "Command", auction.id);
        Ok(auction)
    }

    /// 2. 입찰
    ///
    /// 경매 갱신(버전 조건)과 새 입찰(미존재 조건), 사용자별 입찰 프로젝션을
    /// 하나의 원자적 트랜잭션으로 쓴다.
    pub async fn place_bid(&self, cmd: PlaceBidCommand) -> Result<Bid> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);

        let mut aggregate = get_auction_with_bids(self.store.as_ref(), cmd.auction_id)
            .await?
            .ok_or(Error::AuctionNotFound(cmd.auction_id))?;

        let expected = aggregate.auction.version;
        let previous_leader_id = aggregate.auction.current_bidder_id.clone();
        let now = self.clock.now();

        let bid = aggregate.add_bid(&cmd.bidder_id, cmd.amount, now)?;

        let items = vec![
            TransactItem::put(
                Record::Auction(aggregate.auction.clone()),
                Condition::version_equals(expected),
            ),
            TransactItem::put(Record::Bid(bid.clone()), Condition::not_exists()),
            TransactItem::put(Record::UserBid(UserBid::from_bid(&bid)), Condition::none()),
        ];
        self.store
            .transact_write(items)
            .await
            .map_err(|e| self.store_failure(e, "place_bid", cmd.auction_id))?;

        info!(
            "{:<12} --> 입찰 성공: 입찰 {} / 현재 가격 {}",
            "Command", bid.bid_id, aggregate.auction.current_price
        );

        self.publish(AuctionEvent::BidAccepted {
            auction_id: bid.auction_id,
            bid_id: bid.bid_id,
            bidder_id: bid.bidder_id.clone(),
            previous_leader_id,
            current_leader_id: aggregate.auction.current_bidder_id.clone(),
            current_price: aggregate.auction.current_price,
            timestamp: now,
        })
        .await;

        Ok(bid)
    }

    /// 3. 경매 취소 (판매자만)
    pub async fn cancel_auction(&self, cmd: CancelAuctionCommand) -> Result<Auction> {
        info!("{:<12} --> 경매 취소 요청: {:?}", "Command", cmd);

        let mut auction = get_auction_record(self.store.as_ref(), cmd.auction_id).await?;
        if auction.seller_id != cmd.user_id {
            return Err(AuctionError::NotSeller.into());
        }

        let expected = auction.version;
        let now = self.clock.now();
        auction.cancel(now)?;

        self.store
            .conditional_put(
                Record::Auction(auction.clone()),
                Condition::version_equals(expected),
            )
            .await
            .map_err(|e| self.store_failure(e, "cancel_auction", cmd.auction_id))?;

        info!("{:<12} --> 경매 취소 완료 id: {}", "Command", auction.id);
        self.publish(AuctionEvent::AuctionCancelled {
            auction_id: auction.id,
            timestamp: now,
        })
        .await;

        Ok(auction)
    }

    /// 4. 경매 종료 (식별자로)
    pub async fn complete_auction(&self, auction_id: AuctionId) -> Result<Auction> {
        let auction = get_auction_record(self.store.as_ref(), auction_id).await?;
        self.complete(auction).await
    }

    /// 4. 경매 종료
    ///
    /// 읽어 온 레코드의 버전을 조건으로 쓴다. 그 사이 취소되었거나 다른 인스턴스가
    /// 먼저 종료했다면 `ConcurrencyConflict`.
    pub async fn complete(&self, mut auction: Auction) -> Result<Auction> {
        let expected = auction.version;
        let now = self.clock.now();
        auction.complete(now)?;

        self.store
            .conditional_put(
                Record::Auction(auction.clone()),
                Condition::version_equals(expected),
            )
            .await
            .map_err(|e| self.store_failure(e, "complete_auction", auction.id))?;

        info!(
            "{:<12} --> 경매 종료 id: {}, 낙찰자: {:?}, 가격: {}",
            "Command", auction.id, auction.current_bidder_id, auction.current_price
        );
        self.publish(AuctionEvent::AuctionCompleted {
            auction_id: auction.id,
            winner_id: auction.current_bidder_id.clone(),
            final_price: auction.current_price,
            timestamp: now,
        })
        .await;

        Ok(auction)
    }

    /// 저장소 오류를 기록하고 서비스 오류로 변환한다.
    fn store_failure(
        &self,
        err: crate::error::StoreError,
        operation: &str,
        auction_id: AuctionId,
    ) -> Error {
        if err.is_condition_failure() {
            warn!(
                "{:<12} --> 낙관적 동시성 충돌: {} auction={}",
                "Command", operation, auction_id
            );
        } else {
            error!(
                "{:<12} --> 저장소 오류: {} auction={}: {}",
                "Command", operation, auction_id, err
            );
        }
        Error::from_store(err, format!("auction {}", auction_id))
    }

    /// 커밋이 끝난 뒤의 이벤트 발행. 실패는 기록만 한다.
    async fn publish(&self, event: AuctionEvent) {
        if let Err(e) = self.publisher.publish(&event).await {
            error!(
                "{:<12} --> 이벤트 발행 실패: {} key={}: {}",
                "Command",
                event.event_type(),
                event.key(),
                e
            );
        }
    }
}
// endregion: --- Auction Service
