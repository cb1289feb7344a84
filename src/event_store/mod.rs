// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::error::{Error, Result};
use crate::message_broker::KafkaConsumer;
use crate::propagation::DisplayNamePropagator;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Event Consumer
/// 이벤트 버스에서 받은 이벤트를 처리기로 보내는 소비자
///
/// 전달은 최소 한 번이므로 같은 이벤트가 다시 와도 결과가 같아야 한다.
/// 이름 변경 전파는 이미 반영된 경매를 다시 고르지 않으므로 재전달에 안전하다.
pub struct EventConsumer {
    propagator: Arc<DisplayNamePropagator>,
}

impl EventConsumer {
    pub fn new(propagator: Arc<DisplayNamePropagator>) -> Self {
        EventConsumer { propagator }
    }

    /// 중지 신호가 올 때까지 Kafka에서 이벤트를 소비한다.
    pub async fn start(self: Arc<Self>, kafka_consumer: KafkaConsumer, shutdown: watch::Receiver<bool>) {
        let consumer = Arc::clone(&self);
        if let Err(e) = kafka_consumer
            .consume_events(shutdown, move |event| {
                let consumer = Arc::clone(&consumer);
                async move { consumer.process_event(event).await }
            })
            .await
        {
            error!("{:<12} --> 이벤트 소비 오류: {:?}", "Consumer", e);
        }
        info!("{:<12} --> 이벤트 소비 종료", "Consumer");
    }

    /// 이벤트 처리
    ///
    /// 오래된 이름 변경과 전파 중 충돌은 더 최신 이벤트가 처리할 몫이므로
    /// 기록만 하고 확인 처리한다. 없는 사용자도 다시 받아 봐야 같으므로 확인 처리한다.
    /// 그 밖의 오류는 돌려주어 같은 메시지를 다시 받게 한다.
    pub async fn process_event(&self, event: AuctionEvent) -> Result<()> {
        match &event {
            AuctionEvent::DisplayNameChanged { user_id, .. } => {
                info!("{:<12} --> 표시 이름 변경(DisplayNameChanged): {}", "Consumer", user_id);
                match self.propagator.handle(&event).await {
                    Ok(_) => Ok(()),
                    Err(e @ Error::StaleDisplayName { .. }) => {
                        info!("{:<12} --> 오래된 이벤트 건너뜀: {}", "Consumer", e);
                        Ok(())
                    }
                    Err(e) if e.is_conflict() => {
                        warn!("{:<12} --> 전파 중단, 최신 이벤트가 이어받음: {}", "Consumer", e);
                        Ok(())
                    }
                    Err(e @ Error::UserNotFound(_)) => {
                        warn!("{:<12} --> 알 수 없는 사용자, 건너뜀: {}", "Consumer", e);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            other => {
                debug!(
                    "{:<12} --> 외부 소비자용 이벤트: {} key={}",
                    "Consumer",
                    other.event_type(),
                    other.key()
                );
                Ok(())
            }
        }
    }
}
// endregion: --- Event Consumer
