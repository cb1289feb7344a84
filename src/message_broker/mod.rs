// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::error::{Error, Result};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::topic_partition_list::Offset;
use rdkafka::ClientConfig;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Event Publisher
/// 이벤트 발행 트레이트. 전달은 최소 한 번(at-least-once)을 가정한다.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &AuctionEvent) -> Result<()>;
}

/// 발행된 이벤트를 메모리에 모아두는 버스 (테스트용)
#[derive(Debug, Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<AuctionEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 발행된 이벤트
    pub fn events(&self) -> Vec<AuctionEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: &AuctionEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
// endregion: --- Event Publisher

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
    topic: String,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str, topic: &str) -> std::result::Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
            topic: topic.to_string(),
        })
    }

    /// 메시지 전송
    pub async fn send_message(&self, key: &str, value: &str) -> Result<()> {
        info!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", self.topic, key
        );
        let record = FutureRecord::to(&self.topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| Error::Broker(format!("Error sending message: {:?}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for KafkaProducer {
    async fn publish(&self, event: &AuctionEvent) -> Result<()> {
        let payload =
            serde_json::to_string(event).map_err(|e| Error::Broker(e.to_string()))?;
        self.send_message(&event.key(), &payload).await
    }
}
// endregion: --- Kafka Producer

// region:    --- Kafka Consumer
/// 처리 실패 후 같은 메시지를 다시 읽기 전 대기 시간
const REDELIVERY_BACKOFF: Duration = Duration::from_secs(1);

/// 메시지 하나의 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 오프셋을 저장하고 다음 메시지로 넘어간다
    Ack,
    /// 오프셋을 저장하지 않고 같은 메시지를 다시 받는다
    Redeliver,
}

/// 페이로드를 이벤트로 해석해 처리기에 넘긴다.
///
/// 처리기 오류는 재전달한다. 해석할 수 없는 페이로드는 다시 받아도 같으므로 확인 처리한다.
pub async fn dispatch<F, Fut>(payload: Option<&[u8]>, handler: &F) -> Delivery
where
    F: Fn(AuctionEvent) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some(payload) = payload else {
        warn!("{:<12} --> 빈 페이로드 수신", "Consumer");
        return Delivery::Ack;
    };
    let event = match serde_json::from_slice::<AuctionEvent>(payload) {
        Ok(event) => event,
        Err(e) => {
            error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e);
            return Delivery::Ack;
        }
    };
    match handler(event).await {
        Ok(()) => Delivery::Ack,
        Err(e) => {
            error!(
                "{:<12} --> Kafka 이벤트 처리 오류, 재전달 예정: {:?}",
                "Consumer", e
            );
            Delivery::Redeliver
        }
    }
}

pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topic: String,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str, topic: &str) -> std::result::Result<Self, KafkaError> {
        // 처리가 끝난 메시지의 오프셋만 커밋한다
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .set("fetch.max.bytes", "5242880")
            .set("allow.auto.create.topics", "true")
            .create()?;

        Ok(KafkaConsumer {
            consumer,
            topic: topic.to_string(),
        })
    }

    /// 이벤트 소비. 중지 신호를 받으면 반환한다.
    ///
    /// 처리에 실패한 메시지는 오프셋을 저장하지 않고 그 위치로 되돌아가 다시 받는다.
    pub async fn consume_events<F, Fut>(
        &self,
        mut shutdown: watch::Receiver<bool>,
        handler: F,
    ) -> std::result::Result<(), KafkaError>
    where
        F: Fn(AuctionEvent) -> Fut + Send,
        Fut: Future<Output = Result<()>> + Send,
    {
        info!(
            "{:<12} --> Kafka 이벤트 소비 시작: topic={}",
            "Consumer", self.topic
        );
        self.consumer.subscribe(&[self.topic.as_str()])?;

        loop {
            let message = tokio::select! {
                _ = shutdown.changed() => {
                    info!("{:<12} --> 중지 신호 수신", "Consumer");
                    return Ok(());
                }
                message = self.consumer.recv() => message,
            };

            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e);
                    continue;
                }
            };
            debug!(
                "{:<12} --> 메시지 수신: topic={}, partition={}, offset={}",
                "Consumer",
                message.topic(),
                message.partition(),
                message.offset()
            );

            match dispatch(message.payload(), &handler).await {
                Delivery::Ack => {
                    if let Err(e) = self.consumer.store_offset_from_message(&message) {
                        error!("{:<12} --> 오프셋 저장 오류: {:?}", "Consumer", e);
                    }
                }
                Delivery::Redeliver => {
                    if let Err(e) = self.consumer.seek(
                        message.topic(),
                        message.partition(),
                        Offset::Offset(message.offset()),
                        Duration::from_secs(5),
                    ) {
                        error!("{:<12} --> 오프셋 되돌리기 오류: {:?}", "Consumer", e);
                    }
                    tokio::select! {
                        _ = shutdown.changed() => {
                            info!("{:<12} --> 중지 신호 수신", "Consumer");
                            return Ok(());
                        }
                        _ = tokio::time::sleep(REDELIVERY_BACKOFF) => {}
                    }
                }
            }
        }
    }
}
// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    brokers: String,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(brokers: &str) -> Self {
        KafkaManager {
            brokers: brokers.to_string(),
        }
    }

    pub fn producer(&self, topic: &str) -> std::result::Result<KafkaProducer, KafkaError> {
        KafkaProducer::new(&self.brokers, topic)
    }

    pub fn consumer(
        &self,
        group_id: &str,
        topic: &str,
    ) -> std::result::Result<KafkaConsumer, KafkaError> {
        KafkaConsumer::new(&self.brokers, group_id, topic)
    }

    /// 토픽 생성
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<()> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| Error::Broker(format!("AdminClient 생성 실패: {:?}", e)))?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        match admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
        {
            Ok(_) => {
                info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic_name);
                Ok(())
            }
            Err(e) => {
                error!("{:<12} --> Kafka 토픽 생성 실패: {:?}", "Manager", e);
                Err(Error::Broker(format!("토픽 생성 실패: {:?}", e)))
            }
        }
    }
}
// endregion: --- Kafka Manager

// endregion: --- Tests
