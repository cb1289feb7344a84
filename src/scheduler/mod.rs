/// 경매 완료 스윕
///
/// 일정 주기마다 임대를 획득하고, 종료 시간이 지난 진행 중 경매를 하나씩 종료한다.
/// 여러 프로세스에서 동시에 돌아도 안전하다. 임대는 중복 작업을 줄이기 위한 것이고,
/// 이중 종료는 각 경매의 버전 조건부 쓰기가 막는다.
///
/// 상태: Idle -> AcquiringLease -> (LeaseHeld -> Sweeping -> Idle) | (LeaseNotHeld -> Idle)
// region:    --- Imports
use crate::auction::model::{AuctionId, AuctionStatus};
use crate::bidding::commands::AuctionService;
use crate::error::Result;
use crate::lease::{Lease, LeaseClient};
use crate::store::{EndDateRange, IndexQuery, Record};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Sweep Config
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// 스윕 주기
    pub interval: Duration,
    /// 임대 기간. 주기보다 조금 길게 잡는다.
    pub lease_duration: chrono::Duration,
    pub lock_name: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lease_duration: chrono::Duration::seconds(62),
            lock_name: "auction-completion-sweep".to_string(),
        }
    }
}
// endregion: --- Sweep Config

// region:    --- Sweep State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    AcquiringLease,
    LeaseHeld,
    LeaseNotHeld,
    Sweeping,
}

/// 한 번의 틱 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub lease_acquired: bool,
    pub completed: Vec<AuctionId>,
    pub failed: Vec<AuctionId>,
    /// 중지 신호로 남은 경매를 처리하지 않고 멈췄는지
    pub stopped: bool,
}
// endregion: --- Sweep State

// region:    --- Completion Sweep
pub struct CompletionSweep {
    service: Arc<AuctionService>,
    lease: Arc<dyn LeaseClient>,
    config: SweepConfig,
    state: SweepState,
    held: Option<Lease>,
}

impl CompletionSweep {
    pub fn new(
        service: Arc<AuctionService>,
        lease: Arc<dyn LeaseClient>,
        config: SweepConfig,
    ) -> Self {
        Self {
            service,
            lease,
            config,
            state: SweepState::Idle,
            held: None,
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    /// 중지 신호가 올 때까지 주기적으로 스윕한다. 종료 시 보유한 임대를 해제한다.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "{:<12} --> 스윕 시작: interval={:?}, lease={}s",
            "Sweep",
            self.config.interval,
            self.config.lease_duration.num_seconds()
        );
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick(&shutdown).await {
                error!("{:<12} --> 스윕 중 오류 발생: {}", "Sweep", e);
            }
        }

        self.release().await;
        info!("{:<12} --> 스윕 종료", "Sweep");
    }

    /// 한 번의 틱: 임대 획득 후 종료 대상 경매를 하나씩 종료한다.
    pub async fn tick(&mut self, shutdown: &watch::Receiver<bool>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        if *shutdown.borrow() {
            report.stopped = true;
            return Ok(report);
        }

        self.transition(SweepState::AcquiringLease);
        let acquired = self
            .lease
            .try_acquire(&self.config.lock_name, self.config.lease_duration)
            .await;
        match acquired {
            Ok(Some(lease)) => {
                self.held = Some(lease);
                self.transition(SweepState::LeaseHeld);
            }
            Ok(None) => {
                self.held = None;
                self.transition(SweepState::LeaseNotHeld);
                self.transition(SweepState::Idle);
                return Ok(report);
            }
            Err(e) => {
                self.transition(SweepState::Idle);
                return Err(e.into());
            }
        }
        report.lease_acquired = true;

        self.transition(SweepState::Sweeping);
        let now = self.service.now();
        let due = self
            .service
            .store()
            .query(
                IndexQuery::ByStatus {
                    status: AuctionStatus::Open,
                    end: EndDateRange::AtOrBefore(now),
                },
                None,
            )
            .await;
        let due = match due {
            Ok(records) => records,
            Err(e) => {
                self.transition(SweepState::Idle);
                return Err(e.into());
            }
        };

        for auction in due.into_iter().filter_map(Record::into_auction) {
            if *shutdown.borrow() {
                info!("{:<12} --> 중지 신호로 스윕 중단", "Sweep");
                report.stopped = true;
                break;
            }
            let auction_id = auction.id;
            match self.service.complete(auction).await {
                Ok(_) => report.completed.push(auction_id),
                Err(e) if e.is_conflict() => {
                    warn!(
                        "{:<12} --> 경매 종료 충돌, 다음 주기에 재시도: {}",
                        "Sweep", auction_id
                    );
                    report.failed.push(auction_id);
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 경매 종료 실패 auction={}: {}",
                        "Sweep", auction_id, e
                    );
                    report.failed.push(auction_id);
                }
            }
        }

        info!(
            "{:<12} --> 스윕 완료: 종료 {}건, 실패 {}건",
            "Sweep",
            report.completed.len(),
            report.failed.len()
        );
        self.transition(SweepState::Idle);
        Ok(report)
    }

    /// 보유한 임대 해제
    pub async fn release(&mut self) {
        if let Some(lease) = self.held.take() {
            if let Err(e) = self.lease.release(&lease).await {
                error!("{:<12} --> 임대 해제 실패: {}", "Sweep", e);
            }
        }
    }

    fn transition(&mut self, next: SweepState) {
        debug!("{:<12} --> {:?} -> {:?}", "Sweep", self.state, next);
        self.state = next;
    }
}
// endregion: --- Completion Sweep
