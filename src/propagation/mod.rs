/// 판매자 표시 이름 전파
///
/// 사용자의 표시 이름이 바뀌면 그 사용자가 판매자인 모든 경매의 비정규화된
/// 판매자 이름을 새 이름으로 바꾼다. 한 트랜잭션에는 최대 K-1개의 경매 갱신과
/// 사용자 레코드에 대한 펜싱 항목 하나를 담는다. 전파 도중 이름이 다시 바뀌면
/// 펜싱 조건이 깨지면서 그 배치 전체가 취소된다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::auction::model::{UserId, UserProfile, Version};
use crate::error::{Error, Result};
use crate::store::{
    Condition, IndexQuery, Predicate, Record, RecordKey, Store, TransactItem, MAX_TRANSACT_ITEMS,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Propagation Report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationReport {
    /// 커밋된 트랜잭션 수
    pub batches: usize,
    /// 갱신된 경매 수
    pub updated: usize,
}
// endregion: --- Propagation Report

// region:    --- Display Name Propagator
pub struct DisplayNamePropagator {
    store: Arc<dyn Store>,
    batch_size: usize,
}

impl DisplayNamePropagator {
    /// `batch_size`는 조회 한도 K. 펜싱 항목 자리를 남겨야 하므로 2 이상,
    /// 트랜잭션 최대 항목 수 이하여야 한다.
    pub fn new(store: Arc<dyn Store>, batch_size: usize) -> Result<Self> {
        if !(2..=MAX_TRANSACT_ITEMS).contains(&batch_size) {
            return Err(Error::InvalidBatchSize(batch_size));
        }
        Ok(Self { store, batch_size })
    }

    /// 이벤트 처리. 이름 변경 이벤트가 아니면 `None`.
    pub async fn handle(&self, event: &AuctionEvent) -> Result<Option<PropagationReport>> {
        match event {
            AuctionEvent::DisplayNameChanged {
                user_id,
                new_display_name,
                ..
            } => self.propagate(user_id, new_display_name).await.map(Some),
            _ => Ok(None),
        }
    }

    /// 새 표시 이름을 사용자의 모든 경매에 반영한다.
    pub async fn propagate(
        &self,
        user_id: &UserId,
        new_display_name: &str,
    ) -> Result<PropagationReport> {
        info!(
            "{:<12} --> 표시 이름 전파 시작: user={}, name={}",
            "Propagation", user_id, new_display_name
        );
        let user = self.load_user(user_id).await?;
        if user.display_name != new_display_name {
            warn!(
                "{:<12} --> 오래된 이벤트, 전파 중단: user={}, 이벤트={}, 현재={}",
                "Propagation", user_id, new_display_name, user.display_name
            );
            return Err(Error::StaleDisplayName {
                user_id: user_id.clone(),
                expected: new_display_name.to_string(),
                actual: user.display_name,
            });
        }

        let fence = TransactItem::ConditionCheck {
            key: RecordKey::user(user_id),
            condition: Condition::version_equals(user.version)
                .and(Predicate::DisplayNameEquals(new_display_name.to_string())),
        };

        let mut report = PropagationReport::default();
        loop {
            let candidates = self
                .store
                .query(
                    IndexQuery::BySeller {
                        seller_id: user_id.clone(),
                        display_name_not: Some(new_display_name.to_string()),
                    },
                    Some(self.batch_size),
                )
                .await
                .map_err(|e| {
                    error!(
                        "{:<12} --> 판매자 인덱스 조회 실패 user={}: {}",
                        "Propagation", user_id, e
                    );
                    Error::Store(e)
                })?;
            if candidates.is_empty() {
                break;
            }
            // 한도만큼 가득 찼으면 남은 경매가 더 있을 수 있다
            let full_page = candidates.len() == self.batch_size;

            let mut items: Vec<TransactItem> = candidates
                .iter()
                .filter_map(Record::as_auction)
                .take(self.batch_size - 1)
                .map(|auction| TransactItem::SetSellerDisplayName {
                    key: RecordKey::auction(auction.id),
                    display_name: new_display_name.to_string(),
                    version: Version::new(),
                })
                .collect();
            let updated = items.len();
            items.push(fence.clone());

            if let Err(e) = self.store.transact_write(items).await {
                if e.is_condition_failure() {
                    warn!(
                        "{:<12} --> 전파 중 사용자 변경 감지, 배치 취소: user={}",
                        "Propagation", user_id
                    );
                } else {
                    error!(
                        "{:<12} --> 전파 배치 쓰기 실패 user={}: {}",
                        "Propagation", user_id, e
                    );
                }
                return Err(Error::from_store(e, format!("user {}", user_id)));
            }

            report.batches += 1;
            report.updated += updated;
            debug!(
                "{:<12} --> 배치 커밋: user={}, 갱신 {}건",
                "Propagation", user_id, updated
            );

            if !full_page {
                break;
            }
        }

        info!(
            "{:<12} --> 표시 이름 전파 완료: user={}, 배치 {}개, 경매 {}건",
            "Propagation", user_id, report.batches, report.updated
        );
        Ok(report)
    }

    async fn load_user(&self, user_id: &UserId) -> Result<UserProfile> {
        match self.store.get_by_key(&RecordKey::user(user_id)).await? {
            Some(Record::User(user)) => Ok(user),
            _ => Err(Error::UserNotFound(user_id.clone())),
        }
    }
}
// endregion: --- Display Name Propagator

// endregion: --- Tests
