/// 경매 애그리거트
/// 1. 생성
/// 2. 입찰 (프록시 입찰 가격 결정)
/// 3. 취소
/// 4. 종료
///
/// I/O 없이 메모리 상태만 다룬다. 상태가 바뀌면 새 버전을 발급하고,
/// 이전 버전은 호출자가 조건부 쓰기의 조건으로 사용한다.
// region:    --- Imports
use super::model::{Auction, AuctionId, AuctionStatus, Bid, BidId, UserId, Version};
use crate::error::AuctionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// endregion: --- Imports

// region:    --- Auction Draft
/// 경매 생성 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionDraft {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub initial_price: i64,
    pub bid_increment: i64,
    pub end_date: DateTime<Utc>,
    pub seller_id: UserId,
    pub seller_display_name: String,
}
// endregion: --- Auction Draft

// region:    --- Auction Lifecycle
impl Auction {
    /// 1. 생성
    pub fn create(draft: AuctionDraft, now: DateTime<Utc>) -> Result<Self, AuctionError> {
        if draft.name.trim().is_empty() {
            return Err(AuctionError::EmptyName);
        }
        if draft.initial_price <= 0 {
            return Err(AuctionError::InvalidInitialPrice);
        }
        if draft.bid_increment <= 0 {
            return Err(AuctionError::InvalidBidIncrement);
        }
        if draft.end_date <= now {
            return Err(AuctionError::EndDateInPast);
        }

        Ok(Self {
            id: AuctionId::new(),
            name: draft.name,
            description: draft.description,
            image_url: draft.image_url,
            initial_price: draft.initial_price,
            bid_increment: draft.bid_increment,
            end_date: draft.end_date,
            status: AuctionStatus::Open,
            seller_id: draft.seller_id,
            seller_display_name: draft.seller_display_name,
            current_price: draft.initial_price,
            current_bid_id: None,
            current_bidder_id: None,
            number_of_bids: 0,
            last_bid_id: None,
            created_at: now,
            cancelled_date: None,
            version: Version::new(),
        })
    }

    /// 입찰 가능 여부
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Open && self.end_date > now
    }

    /// 종료 처리 대상 여부
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == AuctionStatus::Open && self.end_date <= now
    }

    /// 새 입찰자가 제시해야 하는 최소 금액
    pub fn minimum_bid(&self) -> i64 {
        if self.number_of_bids == 0 {
            self.initial_price
        } else {
            self.current_price.saturating_add(self.bid_increment)
        }
    }

    /// 3. 취소
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), AuctionError> {
        if !self.is_open(now) {
            return Err(AuctionError::InvalidAuctionState {
                status: self.status,
            });
        }
        self.status = AuctionStatus::Cancelled;
        self.cancelled_date = Some(now);
        self.version = Version::new();
        Ok(())
    }

    /// 4. 종료
    ///
    /// 이미 종료된 경매에 다시 호출하면 상태를 바꾸지 않고 오류를 돌려준다.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), AuctionError> {
        if !self.is_due(now) {
            return Err(AuctionError::InvalidAuctionState {
                status: self.status,
            });
        }
        self.status = AuctionStatus::Complete;
        self.version = Version::new();
        Ok(())
    }
}
// endregion: --- Auction Lifecycle

// region:    --- Auction Aggregate
/// 경매와 그 입찰 목록
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionAggregate {
    pub auction: Auction,
    /// 입찰 식별자 오름차순
    pub bids: Vec<Bid>,
}

impl AuctionAggregate {
    pub fn new(auction: Auction, mut bids: Vec<Bid>) -> Self {
        bids.sort_by_key(|bid| bid.bid_id);
        Self { auction, bids }
    }

    /// 현재 선두 입찰
    pub fn current_bid(&self) -> Option<&Bid> {
        let current = self.auction.current_bid_id?;
        self.bids.iter().rev().find(|bid| bid.bid_id == current)
    }

    /// 2. 입찰
    ///
    /// 두 번째로 높은 최대 입찰가를 이기는 데 필요한 만큼만 현재가를 올린다.
    /// 동점이면 먼저 입찰한 선두가 유지된다.
    pub fn add_bid(
        &mut self,
        bidder_id: &UserId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<Bid, AuctionError> {
        if *bidder_id == self.auction.seller_id {
            return Err(AuctionError::SellerCannotBidOnOwnAuction);
        }
        if !self.auction.is_open(now) {
            return Err(AuctionError::AuctionNotOpen);
        }

        let leader_amount = self.current_bid().map(|bid| bid.amount);
        if self.auction.number_of_bids > 0 && leader_amount.is_none() {
            return Err(AuctionError::LeadingBidMissing {
                bid_id: self.auction.current_bid_id,
            });
        }

        // 선두의 최대 입찰가 상향: 경쟁 입찰이 없으므로 현재가는 그대로
        if self.auction.current_bidder_id.as_ref() == Some(bidder_id) {
            let current = leader_amount.unwrap_or(self.auction.current_price);
            if amount <= current {
                return Err(AuctionError::BidNotHigherThanCurrentBid { current });
            }
            let bid = self.new_bid(bidder_id, amount, now);
            self.auction.current_bid_id = Some(bid.bid_id);
            self.auction.number_of_bids += 1;
            self.record(bid.clone());
            return Ok(bid);
        }

        let minimum = self.auction.minimum_bid();
        if amount < minimum {
            return Err(AuctionError::BidBelowMinimum { minimum });
        }

        let bid = self.new_bid(bidder_id, amount, now);
        let increment = self.auction.bid_increment;
        // 가격은 두 최대 입찰가 중 큰 쪽을 넘지 않는다
        match leader_amount {
            Some(leader_amount) => {
                if amount > leader_amount {
                    self.auction.current_bidder_id = Some(bidder_id.clone());
                    self.auction.current_bid_id = Some(bid.bid_id);
                    self.auction.current_price =
                        amount.min(leader_amount.saturating_add(increment));
                } else {
                    self.auction.current_price =
                        leader_amount.min(amount.saturating_add(increment));
                }
            }
            None => {
                self.auction.current_price = self.auction.initial_price;
                self.auction.current_bidder_id = Some(bidder_id.clone());
                self.auction.current_bid_id = Some(bid.bid_id);
            }
        }
        self.auction.number_of_bids += 1;
        self.record(bid.clone());
        Ok(bid)
    }

    fn new_bid(&self, bidder_id: &UserId, amount: i64, now: DateTime<Utc>) -> Bid {
        let micros = now.timestamp_micros();
        let bid_id = match self.auction.last_bid_id {
            Some(BidId(last)) => BidId(micros.max(last + 1)),
            None => BidId(micros),
        };
        Bid {
            auction_id: self.auction.id,
            bid_id,
            bidder_id: bidder_id.clone(),
            amount,
            placed_at: now,
        }
    }

    fn record(&mut self, bid: Bid) {
        self.auction.last_bid_id = Some(bid.bid_id);
        self.auction.version = Version::new();
        self.bids.push(bid);
    }
}
// endregion: --- Auction Aggregate

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn aggregate(initial_price: i64, bid_increment: i64) -> AuctionAggregate {
        let auction = Auction::create(
            AuctionDraft {
                name: "빈티지 카메라".to_string(),
                description: "필름 카메라".to_string(),
                image_url: None,
                initial_price,
                bid_increment,
                end_date: now() + Duration::hours(1),
                seller_id: UserId::from("seller"),
                seller_display_name: "Seller".to_string(),
            },
            now(),
        )
        .unwrap();
        AuctionAggregate::new(auction, vec![])
    }

    fn bid(aggregate: &mut AuctionAggregate, who: &str, amount: i64) -> Result<Bid, AuctionError> {
        aggregate.add_bid(&UserId::from(who), amount, now())
    }

    #[test]
    fn test_first_bid_sets_initial_price() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 120).unwrap();

        assert_eq!(agg.auction.current_price, 100);
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.number_of_bids, 1);
    }

    #[test]
    fn test_higher_competing_bid_takes_lead() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 120).unwrap();
        bid(&mut agg, "B", 150).unwrap();

        assert_eq!(agg.auction.current_price, 130);
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("B")));
        assert_eq!(agg.auction.number_of_bids, 2);

        let err = bid(&mut agg, "C", 120).unwrap_err();
        assert_eq!(err, AuctionError::BidBelowMinimum { minimum: 140 });
    }

    #[test]
    fn test_below_minimum_after_price_raise() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 150).unwrap();
        bid(&mut agg, "B", 150).unwrap();
        // 선두 A 유지, 현재가 150
        assert_eq!(agg.auction.current_price, 150);

        let err = bid(&mut agg, "C", 120).unwrap_err();
        assert_eq!(err, AuctionError::BidBelowMinimum { minimum: 160 });
    }

    #[test]
    fn test_lower_competing_bid_keeps_leader() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 150).unwrap();
        bid(&mut agg, "B", 120).unwrap();

        assert_eq!(agg.auction.current_price, 130);
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.number_of_bids, 2);
    }

    #[test]
    fn test_tie_keeps_first_bidder() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 150).unwrap();
        bid(&mut agg, "B", 150).unwrap();

        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.current_price, 150);
    }

    #[test]
    fn test_leader_self_raise() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", 120).unwrap();

        let err = bid(&mut agg, "A", 120).unwrap_err();
        assert_eq!(err, AuctionError::BidNotHigherThanCurrentBid { current: 120 });

        let raised = bid(&mut agg, "A", 200).unwrap();
        assert_eq!(agg.auction.current_price, 100);
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.current_bid_id, Some(raised.bid_id));
        assert_eq!(agg.auction.number_of_bids, 2);
    }

    #[test]
    fn test_seller_cannot_bid() {
        let mut agg = aggregate(100, 10);
        let err = bid(&mut agg, "seller", 500).unwrap_err();
        assert_eq!(err, AuctionError::SellerCannotBidOnOwnAuction);
    }

    #[test]
    fn test_bid_after_end_rejected() {
        let mut agg = aggregate(100, 10);
        let later = agg.auction.end_date;
        let err = agg.add_bid(&UserId::from("A"), 500, later).unwrap_err();
        assert_eq!(err, AuctionError::AuctionNotOpen);
    }

    #[test]
    fn test_bid_ids_strictly_increase_at_same_instant() {
        let mut agg = aggregate(100, 10);
        let first = bid(&mut agg, "A", 120).unwrap();
        let second = bid(&mut agg, "B", 150).unwrap();
        let third = bid(&mut agg, "A", 200).unwrap();

        assert!(first.bid_id < second.bid_id);
        assert!(second.bid_id < third.bid_id);
    }

    #[test]
    fn test_leader_and_price_over_bid_sequence() {
        let mut agg = aggregate(100, 10);
        let bids = [
            ("A", 110),
            ("B", 125),
            ("C", 300),
            ("B", 200),
            ("C", 320),
            ("D", 320),
            ("A", 400),
        ];
        let mut leader_max = 0;

        for (who, amount) in bids {
            let minimum = agg.auction.minimum_bid();
            let expected_minimum = if agg.auction.number_of_bids == 0 {
                agg.auction.initial_price
            } else {
                agg.auction.current_price.saturating_add(agg.auction.bid_increment)
            };
            assert_eq!(minimum, expected_minimum);

            let before = agg.auction.version;
            if bid(&mut agg, who, amount).is_ok() {
                assert_ne!(agg.auction.version, before);

                let leader = agg.current_bid().unwrap().amount;
                assert!(agg.auction.initial_price <= agg.auction.current_price);
                assert!(agg.auction.current_price <= leader);
                assert!(leader >= leader_max);
                leader_max = leader;
            }
        }
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.current_price, 330);
    }

    #[test]
    fn test_create_validation() {
        let draft = AuctionDraft {
            name: "램프".to_string(),
            description: String::new(),
            image_url: None,
            initial_price: 0,
            bid_increment: 10,
            end_date: now() + Duration::hours(1),
            seller_id: UserId::from("seller"),
            seller_display_name: "Seller".to_string(),
        };
        assert_eq!(
            Auction::create(draft.clone(), now()).unwrap_err(),
            AuctionError::InvalidInitialPrice
        );
        assert_eq!(
            Auction::create(
                AuctionDraft {
                    initial_price: 100,
                    bid_increment: 0,
                    ..draft.clone()
                },
                now()
            )
            .unwrap_err(),
            AuctionError::InvalidBidIncrement
        );
        assert_eq!(
            Auction::create(
                AuctionDraft {
                    initial_price: 100,
                    end_date: now(),
                    ..draft
                },
                now()
            )
            .unwrap_err(),
            AuctionError::EndDateInPast
        );
    }

    #[test]
    fn test_cancel_only_while_open() {
        let mut agg = aggregate(100, 10);
        let before = agg.auction.version;
        agg.auction.cancel(now()).unwrap();
        assert_eq!(agg.auction.status, AuctionStatus::Cancelled);
        assert_eq!(agg.auction.cancelled_date, Some(now()));
        assert_ne!(agg.auction.version, before);

        let err = agg.auction.cancel(now()).unwrap_err();
        assert_eq!(
            err,
            AuctionError::InvalidAuctionState {
                status: AuctionStatus::Cancelled
            }
        );
    }

    #[test]
    fn test_complete_once_after_end() {
        let mut agg = aggregate(100, 10);
        assert!(agg.auction.complete(now()).is_err());

        let end = agg.auction.end_date;
        agg.auction.complete(end).unwrap();
        assert_eq!(agg.auction.status, AuctionStatus::Complete);

        let version = agg.auction.version;
        assert!(agg.auction.complete(end).is_err());
        assert_eq!(agg.auction.version, version);
        assert!(agg.auction.cancel(end).is_err());
    }

    #[test]
    fn test_tie_at_maximum_amount_keeps_price_bounded() {
        let mut agg = aggregate(100, 10);
        bid(&mut agg, "A", i64::MAX).unwrap();
        bid(&mut agg, "B", i64::MAX).unwrap();

        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.current_price, i64::MAX);
        assert_eq!(agg.auction.minimum_bid(), i64::MAX);
    }

    #[test]
    fn test_maximum_increment_does_not_wrap_minimum() {
        let mut agg = aggregate(100, i64::MAX);
        bid(&mut agg, "A", 200).unwrap();

        assert_eq!(agg.auction.minimum_bid(), i64::MAX);
        assert_eq!(
            bid(&mut agg, "B", 300).unwrap_err(),
            AuctionError::BidBelowMinimum { minimum: i64::MAX }
        );
        assert_eq!(agg.auction.current_price, 100);

        bid(&mut agg, "B", i64::MAX).unwrap();
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("B")));
        assert!(agg.auction.current_price >= agg.auction.initial_price);
        assert!(agg.auction.current_price <= i64::MAX);
    }

    #[test]
    fn test_missing_leading_bid_is_rejected() {
        let mut agg = aggregate(100, 10);
        let leading = bid(&mut agg, "A", 150).unwrap();
        agg.bids.clear();
        let version = agg.auction.version;

        let err = bid(&mut agg, "B", 300).unwrap_err();
        assert_eq!(
            err,
            AuctionError::LeadingBidMissing {
                bid_id: Some(leading.bid_id)
            }
        );
        assert!(!err.is_business_rule());
        assert_eq!(agg.auction.current_bidder_id, Some(UserId::from("A")));
        assert_eq!(agg.auction.current_price, 100);
        assert_eq!(agg.auction.version, version);
    }
}
// endregion: --- Tests
