// region:    --- Imports
use super::{
    apply_seller_display_name, validate_transaction, Condition, IndexQuery, Record, RecordKey,
    Store, TransactItem,
};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

// endregion: --- Imports

// region:    --- In-Memory Store
/// 메모리 저장소
///
/// 트랜잭션 동안 쓰기 잠금을 쥐고 있으므로 모든 쓰기가 원자적이다. 테스트와 로컬 실행용.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<RecordKey, Record>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn conditional_put(
        &self,
        record: Record,
        condition: Condition,
    ) -> Result<(), StoreError> {
        let key = record.key();
        let mut records = self.records.write().await;
        if !condition.holds(records.get(&key)) {
            debug!("{:<12} --> 조건부 쓰기 실패: {}", "Store", key);
            return Err(StoreError::ConditionFailed { key });
        }
        records.insert(key, record);
        Ok(())
    }

    async fn transact_write(&self, items: Vec<TransactItem>) -> Result<(), StoreError> {
        validate_transaction(&items)?;

        let mut records = self.records.write().await;
        let failed: Vec<RecordKey> = items
            .iter()
            .filter(|item| !item.holds(records.get(&item.key())))
            .map(TransactItem::key)
            .collect();
        if !failed.is_empty() {
            debug!("{:<12} --> 트랜잭션 취소: {:?}", "Store", failed);
            return Err(StoreError::TransactionCanceled { keys: failed });
        }

        for item in items {
            match item {
                TransactItem::Put { record, .. } => {
                    records.insert(record.key(), record);
                }
                TransactItem::SetSellerDisplayName {
                    key,
                    display_name,
                    version,
                } => {
                    if let Some(record) = records.get_mut(&key) {
                        apply_seller_display_name(record, &display_name, version);
                    }
                }
                TransactItem::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        query: IndexQuery,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let records = self.records.read().await;
        let limit = limit.unwrap_or(usize::MAX);

        let result = match &query {
            IndexQuery::Partition { partition } => records
                .iter()
                .filter(|(key, _)| key.partition == *partition)
                .map(|(_, record)| record.clone())
                .take(limit)
                .collect(),
            _ => {
                let mut auctions: Vec<_> = records
                    .values()
                    .filter_map(Record::as_auction)
                    .filter(|auction| query.matches_auction(auction))
                    .collect();
                auctions.sort_by_key(|auction| (auction.end_date, auction.id));
                auctions
                    .into_iter()
                    .take(limit)
                    .map(|auction| Record::Auction(auction.clone()))
                    .collect()
            }
        };
        Ok(result)
    }
}
// endregion: --- In-Memory Store

// endregion: --- Tests
