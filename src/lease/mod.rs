/// 완료 스윕용 임대(lease)
///
/// 고정된 이름의 임대를 저장소의 조건부 쓰기로 획득한다. 임대는 권고용이다.
/// 만료 시간이 지나면 어느 인스턴스든 가져갈 수 있고, 갱신(heartbeat)은 하지 않는다.
/// 스윕이 임대 기간보다 오래 걸리면 두 인스턴스가 동시에 임대를 가졌다고 믿을 수
/// 있다. 각 경매 종료는 버전 조건으로 따로 보호되므로 중복 작업만 생길 뿐이다.
// region:    --- Imports
use crate::auction::model::Version;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::store::{Condition, Record, RecordKey, Store};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

// endregion: --- Imports

// region:    --- Lease Model
/// 저장소에 기록되는 임대 레코드
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseRecord {
    pub name: String,
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub version: Version,
}

/// 획득한 임대
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub name: String,
    pub owner: String,
    pub expires_at: DateTime<Utc>,
    pub version: Version,
}
// endregion: --- Lease Model

// region:    --- Lease Client
/// 임대 클라이언트 트레이트
#[async_trait]
pub trait LeaseClient: Send + Sync {
    /// 임대 획득 시도. 다른 소유자가 유효한 임대를 가지고 있으면 `None`.
    async fn try_acquire(&self, name: &str, duration: Duration)
        -> Result<Option<Lease>, StoreError>;

    /// 임대 해제
    async fn release(&self, lease: &Lease) -> Result<(), StoreError>;
}

/// 저장소 기반 임대 클라이언트
pub struct StoreLeaseClient {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    owner: String,
}

impl StoreLeaseClient {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, owner: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl LeaseClient for StoreLeaseClient {
    async fn try_acquire(
        &self,
        name: &str,
        duration: Duration,
    ) -> Result<Option<Lease>, StoreError> {
        let now = self.clock.now();
        let condition = match self.store.get_by_key(&RecordKey::lease(name)).await? {
            None => Condition::not_exists(),
            Some(Record::Lease(current))
                if current.expires_at <= now || current.owner == self.owner =>
            {
                Condition::version_equals(current.version)
            }
            Some(Record::Lease(current)) => {
                debug!(
                    "{:<12} --> 임대 보유 중: name={}, owner={}, expires_at={}",
                    "Lease", name, current.owner, current.expires_at
                );
                return Ok(None);
            }
            Some(other) => {
                warn!(
                    "{:<12} --> 임대 키에 다른 레코드가 있습니다: {}",
                    "Lease",
                    other.kind()
                );
                return Ok(None);
            }
        };

        let record = LeaseRecord {
            name: name.to_string(),
            owner: self.owner.clone(),
            acquired_at: now,
            expires_at: now + duration,
            version: Version::new(),
        };
        let lease = Lease {
            name: record.name.clone(),
            owner: record.owner.clone(),
            expires_at: record.expires_at,
            version: record.version,
        };

        match self.store.conditional_put(Record::Lease(record), condition).await {
            Ok(()) => {
                debug!(
                    "{:<12} --> 임대 획득: name={}, owner={}",
                    "Lease", name, self.owner
                );
                Ok(Some(lease))
            }
            // 다른 인스턴스가 먼저 가져갔다
            Err(e) if e.is_condition_failure() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), StoreError> {
        let now = self.clock.now();
        let record = LeaseRecord {
            name: lease.name.clone(),
            owner: lease.owner.clone(),
            acquired_at: now,
            expires_at: now,
            version: Version::new(),
        };
        match self
            .store
            .conditional_put(Record::Lease(record), Condition::version_equals(lease.version))
            .await
        {
            Ok(()) => {
                info!(
                    "{:<12} --> 임대 해제: name={}, owner={}",
                    "Lease", lease.name, lease.owner
                );
                Ok(())
            }
            Err(e) if e.is_condition_failure() => {
                warn!(
                    "{:<12} --> 임대가 이미 다른 소유자에게 넘어갔습니다: {}",
                    "Lease", lease.name
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
// endregion: --- Lease Client

// region:    --- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryStore;
    use chrono::TimeZone;

    const LOCK: &str = "auction-completion-sweep";

    fn setup() -> (Arc<InMemoryStore>, Arc<ManualClock>) {
        let clock = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (Arc::new(InMemoryStore::new()), Arc::new(ManualClock::new(clock)))
    }

    #[tokio::test]
    async fn test_only_one_owner_until_expiry() {
        let (store, clock) = setup();
        let a = StoreLeaseClient::new(store.clone(), clock.clone(), "a");
        let b = StoreLeaseClient::new(store.clone(), clock.clone(), "b");

        let lease = a.try_acquire(LOCK, Duration::seconds(62)).await.unwrap();
        assert!(lease.is_some());
        assert!(b.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().is_none());

        clock.advance(Duration::seconds(62));
        let taken = b.try_acquire(LOCK, Duration::seconds(62)).await.unwrap();
        assert_eq!(taken.map(|lease| lease.owner), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_owner_reacquires_own_lease() {
        let (store, clock) = setup();
        let a = StoreLeaseClient::new(store, clock.clone(), "a");

        let first = a.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().unwrap();
        clock.advance(Duration::seconds(60));
        let second = a.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().unwrap();
        assert!(second.expires_at > first.expires_at);
        assert_ne!(second.version, first.version);
    }

    #[tokio::test]
    async fn test_release_lets_others_acquire() {
        let (store, clock) = setup();
        let a = StoreLeaseClient::new(store.clone(), clock.clone(), "a");
        let b = StoreLeaseClient::new(store, clock, "b");

        let lease = a.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().unwrap();
        a.release(&lease).await.unwrap();
        assert!(b.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().is_some());

        // 넘어간 임대를 해제해도 새 소유자의 임대는 그대로다
        a.release(&lease).await.unwrap();
        assert!(a.try_acquire(LOCK, Duration::seconds(62)).await.unwrap().is_none());
    }
}
// endregion: --- Tests
