// region:    --- Imports
use super::{
    apply_seller_display_name, validate_transaction, Condition, EndDateRange, IndexQuery, Record,
    RecordKey, Store, TransactItem,
};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, warn};

// endregion: --- Imports

// region:    --- Queries
const SELECT_BY_KEY: &str = "SELECT data FROM records WHERE pk = $1 AND sk = $2";

const SELECT_FOR_UPDATE: &str = "SELECT data FROM records WHERE pk = $1 AND sk = $2 FOR UPDATE";

const INSERT_IF_ABSENT: &str = r#"
    INSERT INTO records (pk, sk, kind, data, version, status, end_date, seller_id, seller_display_name, current_bidder_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (pk, sk) DO NOTHING
"#;

const UPSERT: &str = r#"
    INSERT INTO records (pk, sk, kind, data, version, status, end_date, seller_id, seller_display_name, current_bidder_id)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (pk, sk) DO UPDATE SET
        kind = EXCLUDED.kind,
        data = EXCLUDED.data,
        version = EXCLUDED.version,
        status = EXCLUDED.status,
        end_date = EXCLUDED.end_date,
        seller_id = EXCLUDED.seller_id,
        seller_display_name = EXCLUDED.seller_display_name,
        current_bidder_id = EXCLUDED.current_bidder_id
"#;

const QUERY_PARTITION: &str = "SELECT data FROM records WHERE pk = $1 ORDER BY sk LIMIT $2";

const QUERY_BY_STATUS: &str = r#"
    SELECT data FROM records
    WHERE kind = 'Auction'
      AND status = $1
      AND ($2::timestamptz IS NULL OR end_date <= $2)
      AND ($3::timestamptz IS NULL OR end_date > $3)
    ORDER BY end_date, pk
    LIMIT $4
"#;

const QUERY_BY_SELLER: &str = r#"
    SELECT data FROM records
    WHERE kind = 'Auction'
      AND seller_id = $1
      AND ($2::text IS NULL OR seller_display_name IS DISTINCT FROM $2)
    ORDER BY end_date, pk
    LIMIT $3
"#;

const QUERY_BY_CURRENT_BIDDER: &str = r#"
    SELECT data FROM records
    WHERE kind = 'Auction'
      AND current_bidder_id = $1
    ORDER BY end_date, pk
    LIMIT $2
"#;
// endregion: --- Queries

// region:    --- Postgres Store
/// PostgreSQL 저장소
///
/// 하나의 `records` 테이블을 파티션 문서 저장소처럼 사용한다. 조건 검사는
/// `SELECT ... FOR UPDATE`로 행을 잠근 뒤 같은 트랜잭션 안에서 수행한다.
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

/// 인덱스 컬럼으로 추출하는 경매 속성
struct IndexColumns {
    status: Option<&'static str>,
    end_date: Option<DateTime<Utc>>,
    seller_id: Option<String>,
    seller_display_name: Option<String>,
    current_bidder_id: Option<String>,
}

impl IndexColumns {
    fn of(record: &Record) -> Self {
        match record {
            Record::Auction(auction) => Self {
                status: Some(auction.status.as_str()),
                end_date: Some(auction.end_date),
                seller_id: Some(auction.seller_id.to_string()),
                seller_display_name: Some(auction.seller_display_name.clone()),
                current_bidder_id: auction.current_bidder_id.as_ref().map(ToString::to_string),
            },
            _ => Self {
                status: None,
                end_date: None,
                seller_id: None,
                seller_display_name: None,
                current_bidder_id: None,
            },
        }
    }
}

impl PostgresStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// 행을 잠그고 현재 레코드를 읽는다.
    async fn lock(
        tx: &mut Transaction<'_, Postgres>,
        key: &RecordKey,
    ) -> Result<Option<Record>, StoreError> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(SELECT_FOR_UPDATE)
            .bind(&key.partition)
            .bind(&key.sort)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(data.map(serde_json::from_value).transpose()?)
    }

    /// 레코드 쓰기. `if_absent`이면 이미 있는 경우 쓰지 않고 false를 돌려준다.
    async fn write(
        tx: &mut Transaction<'_, Postgres>,
        record: &Record,
        if_absent: bool,
    ) -> Result<bool, StoreError> {
        let key = record.key();
        let columns = IndexColumns::of(record);
        let sql = if if_absent { INSERT_IF_ABSENT } else { UPSERT };
        let result = sqlx::query(sql)
            .bind(&key.partition)
            .bind(&key.sort)
            .bind(record.kind())
            .bind(serde_json::to_value(record)?)
            .bind(record.version().map(|version| version.0))
            .bind(columns.status)
            .bind(columns.end_date)
            .bind(columns.seller_id)
            .bind(columns.seller_display_name)
            .bind(columns.current_bidder_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 조건을 검사한 뒤 쓴다. 조건이 맞지 않으면 false.
    async fn put_in(
        tx: &mut Transaction<'_, Postgres>,
        record: &Record,
        condition: &Condition,
    ) -> Result<bool, StoreError> {
        if condition.requires_absence() {
            // 동시 삽입 경쟁은 ON CONFLICT DO NOTHING이 가려낸다
            return if condition.holds(None) {
                Self::write(tx, record, true).await
            } else {
                Ok(false)
            };
        }
        if !condition.is_empty() {
            let current = Self::lock(tx, &record.key()).await?;
            if !condition.holds(current.as_ref()) {
                return Ok(false);
            }
        }
        Self::write(tx, record, false).await
    }

    fn decode(rows: Vec<serde_json::Value>) -> Result<Vec<Record>, StoreError> {
        rows.into_iter()
            .map(|data| serde_json::from_value(data).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_by_key(&self, key: &RecordKey) -> Result<Option<Record>, StoreError> {
        let data = sqlx::query_scalar::<_, serde_json::Value>(SELECT_BY_KEY)
            .bind(&key.partition)
            .bind(&key.sort)
            .fetch_optional(&*self.pool)
            .await?;
        Ok(data.map(serde_json::from_value).transpose()?)
    }

    async fn conditional_put(
        &self,
        record: Record,
        condition: Condition,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        if Self::put_in(&mut tx, &record, &condition).await? {
            tx.commit().await?;
            Ok(())
        } else {
            tx.rollback().await?;
            let key = record.key();
            debug!("{:<12} --> 조건부 쓰기 실패: {}", "Store", key);
            Err(StoreError::ConditionFailed { key })
        }
    }

    async fn transact_write(&self, mut items: Vec<TransactItem>) -> Result<(), StoreError> {
        validate_transaction(&items)?;
        // 교착을 피하기 위해 항상 같은 순서로 잠근다
        items.sort_by_key(TransactItem::key);

        let mut tx = self.pool.begin().await?;

        // 1단계: 잠금 및 조건 검사
        let mut current = Vec::with_capacity(items.len());
        let mut failed = Vec::new();
        for item in &items {
            let record = Self::lock(&mut tx, &item.key()).await?;
            if !item.holds(record.as_ref()) {
                failed.push(item.key());
            }
            current.push(record);
        }
        if !failed.is_empty() {
            tx.rollback().await?;
            debug!("{:<12} --> 트랜잭션 취소: {:?}", "Store", failed);
            return Err(StoreError::TransactionCanceled { keys: failed });
        }

        // 2단계: 쓰기
        for (item, record) in items.into_iter().zip(current) {
            let key = item.key();
            let written = match item {
                TransactItem::Put { record, condition } => {
                    Self::write(&mut tx, &record, condition.requires_absence()).await?
                }
                TransactItem::SetSellerDisplayName {
                    display_name,
                    version,
                    ..
                } => match record {
                    Some(mut record) => {
                        apply_seller_display_name(&mut record, &display_name, version)
                            && Self::write(&mut tx, &record, false).await?
                    }
                    None => false,
                },
                TransactItem::ConditionCheck { .. } => true,
            };
            if !written {
                // 검사와 삽입 사이에 다른 트랜잭션이 같은 키를 만들었다
                tx.rollback().await?;
                warn!("{:<12} --> 트랜잭션 쓰기 경합으로 취소", "Store");
                return Err(StoreError::TransactionCanceled { keys: vec![key] });
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        query: IndexQuery,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, StoreError> {
        let limit = limit.map(|limit| limit as i64);
        let rows = match query {
            IndexQuery::Partition { partition } => {
                sqlx::query_scalar::<_, serde_json::Value>(QUERY_PARTITION)
                    .bind(partition)
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await?
            }
            IndexQuery::ByStatus { status, end } => {
                let (at_or_before, after) = match end {
                    EndDateRange::Any => (None, None),
                    EndDateRange::AtOrBefore(at) => (Some(at), None),
                    EndDateRange::After(at) => (None, Some(at)),
                };
                sqlx::query_scalar::<_, serde_json::Value>(QUERY_BY_STATUS)
                    .bind(status.as_str())
                    .bind(at_or_before)
                    .bind(after)
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await?
            }
            IndexQuery::BySeller {
                seller_id,
                display_name_not,
            } => {
                sqlx::query_scalar::<_, serde_json::Value>(QUERY_BY_SELLER)
                    .bind(seller_id.0)
                    .bind(display_name_not)
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await?
            }
            IndexQuery::ByCurrentBidder { bidder_id } => {
                sqlx::query_scalar::<_, serde_json::Value>(QUERY_BY_CURRENT_BIDDER)
                    .bind(bidder_id.0)
                    .bind(limit)
                    .fetch_all(&*self.pool)
                    .await?
            }
        };
        Self::decode(rows)
    }
}
// endregion: --- Postgres Store
