use super::model::{AuctionId, BidId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum AuctionEvent {
    // 입찰 수락 이벤트
    BidAccepted {
        auction_id: AuctionId,
        bid_id: BidId,
        bidder_id: UserId,
        previous_leader_id: Option<UserId>,
        current_leader_id: Option<UserId>,
        current_price: i64,
        timestamp: DateTime<Utc>,
    },
    // 경매 종료 이벤트
    AuctionCompleted {
        auction_id: AuctionId,
        winner_id: Option<UserId>,
        final_price: i64,
        timestamp: DateTime<Utc>,
    },
    // 경매 취소 이벤트
    AuctionCancelled {
        auction_id: AuctionId,
        timestamp: DateTime<Utc>,
    },
    // 표시 이름 변경 이벤트 (신원 관리 시스템이 발행)
    DisplayNameChanged {
        user_id: UserId,
        old_display_name: String,
        new_display_name: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuctionEvent {
    /// 메시지 키. 같은 애그리거트의 이벤트는 같은 파티션으로 보낸다.
    pub fn key(&self) -> String {
        match self {
            AuctionEvent::BidAccepted { auction_id, .. }
            | AuctionEvent::AuctionCompleted { auction_id, .. }
            | AuctionEvent::AuctionCancelled { auction_id, .. } => auction_id.to_string(),
            AuctionEvent::DisplayNameChanged { user_id, .. } => user_id.to_string(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            AuctionEvent::BidAccepted { .. } => "BidAccepted",
            AuctionEvent::AuctionCompleted { .. } => "AuctionCompleted",
            AuctionEvent::AuctionCancelled { .. } => "AuctionCancelled",
            AuctionEvent::DisplayNameChanged { .. } => "DisplayNameChanged",
        }
    }
}
