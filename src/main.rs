// region:    --- Imports
use auction_marketplace::bidding::commands::AuctionService;
use auction_marketplace::clock::{Clock, SystemClock};
use auction_marketplace::config::Config;
use auction_marketplace::database::DatabaseManager;
use auction_marketplace::event_store::EventConsumer;
use auction_marketplace::handlers::{self, AppState};
use auction_marketplace::lease::StoreLeaseClient;
use auction_marketplace::message_broker::{EventPublisher, KafkaManager};
use auction_marketplace::propagation::DisplayNamePropagator;
use auction_marketplace::scheduler::CompletionSweep;
use auction_marketplace::store::{PostgresStore, Store};
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    // 데이터베이스 연결 및 초기화
    let db_manager = DatabaseManager::connect(&config.database_url, config.db_max_connections).await?;
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    let store: Arc<dyn Store> = Arc::new(PostgresStore::new(db_manager.get_pool()));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Kafka 토픽 생성. 이미 있으면 실패를 기록하고 계속한다.
    let kafka_manager = KafkaManager::new(&config.kafka_brokers);
    if let Err(e) = kafka_manager.create_topic(&config.events_topic, 5, 1).await {
        error!("{:<12} --> 토픽 준비 실패, 계속 진행: {}", "Main", e);
    }
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(kafka_manager.producer(&config.events_topic)?);
    let kafka_consumer = kafka_manager.consumer(&config.consumer_group, &config.events_topic)?;
    info!("{:<12} --> Kafka 초기화 성공", "Main");

    let service = Arc::new(AuctionService::new(
        Arc::clone(&store),
        publisher,
        Arc::clone(&clock),
    ));

    // 중지 신호
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 표시 이름 전파 소비자
    let propagator = Arc::new(DisplayNamePropagator::new(
        Arc::clone(&store),
        config.propagation_batch_size,
    )?);
    let event_consumer = Arc::new(EventConsumer::new(propagator));
    let consumer_task = tokio::spawn(event_consumer.start(kafka_consumer, shutdown_rx.clone()));

    // 경매 완료 스윕
    let owner = format!("{}-{}", std::process::id(), Uuid::new_v4());
    let lease_client = Arc::new(StoreLeaseClient::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        owner,
    ));
    let sweep = CompletionSweep::new(Arc::clone(&service), lease_client, config.sweep());
    let sweep_task = tokio::spawn(sweep.run(shutdown_rx.clone()));

    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // 라우터 설정
    let routes_all = handlers::routes(AppState { service })
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024));

    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행. ctrl-c 수신 시 요청 처리를 마무리하고 반환한다.
    if let Err(err) = axum::serve(listener, routes_all.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("{:<12} --> 종료 신호 대기 실패: {}", "Main", e);
            }
            info!("{:<12} --> 종료 신호 수신", "Main");
        })
        .await
    {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    let _ = shutdown_tx.send(true);

    // 스윕이 임대를 해제할 때까지 기다린다
    if let Err(e) = sweep_task.await {
        error!("{:<12} --> 스윕 작업 종료 오류: {}", "Main", e);
    }
    if let Err(e) = consumer_task.await {
        error!("{:<12} --> 소비자 작업 종료 오류: {}", "Main", e);
    }
    info!("{:<12} --> 종료", "Main");
    Ok(())
}
// endregion: --- Main
