//! 그리드 생애주기 통합 테스트.
//!
//! 인메모리 저장소와 시뮬레이션 거래소로 생성부터 종료까지의 전체
//! 흐름을 검증합니다.

use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use gridbot_core::{
    GridConfig, GridError, GridMode, GridStatus, GridStore, LadderConfig, StepKind, StepStatus,
    Symbol,
};
use gridbot_data::MemoryStore;
use gridbot_engine::{GridService, TickReport};
use gridbot_exchange::SimulatedExchange;
use gridbot_notification::RecordingNotifier;

struct Fixture {
    store: Arc<MemoryStore>,
    exchange: Arc<SimulatedExchange>,
    notifier: Arc<RecordingNotifier>,
    service: GridService,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let exchange = Arc::new(SimulatedExchange::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let service = GridService::new(
        store.clone(),
        exchange.clone(),
        notifier.clone(),
        LadderConfig::default(),
    );
    Fixture {
        store,
        exchange,
        notifier,
        service,
    }
}

fn btc_config() -> GridConfig {
    GridConfig {
        symbol: Symbol::new("BTC", "USDT"),
        lower_price: dec!(90),
        upper_price: dec!(110),
        trigger_price: dec!(100),
        number_of_grids: 10,
        investment: dec!(1000),
        take_profit: Some(dec!(150)),
        stop_loss: Some(dec!(50)),
        mode: GridMode::Paper,
    }
}

async fn set_price(exchange: &SimulatedExchange, symbol: Symbol, last: rust_decimal::Decimal) {
    exchange
        .set_quote(symbol, last - dec!(0.5), last + dec!(0.5), last)
        .await;
}

#[tokio::test]
async fn test_create_builds_full_ladder() {
    let fx = fixture();
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    // 일반 10 + 초기 + 익절 + 손절
    assert_eq!(grid.steps.len(), 13);
    assert_eq!(grid.status, GridStatus::New);
    assert_eq!(
        grid.steps.iter().filter(|s| s.kind == StepKind::Normal).count(),
        10
    );
    let initial = grid.find_step_by_kind(StepKind::Initial).unwrap();
    assert_eq!(initial.buy_price, dec!(100));
    assert_eq!(initial.qty, dec!(2.5));

    // 종료 스텝은 기준 잔고가 없으므로 수량 0으로 대기
    let tp = grid.find_step_by_kind(StepKind::TakeProfit).unwrap();
    assert_eq!(tp.qty, dec!(0));
    assert_eq!(tp.status, StepStatus::AwaitingSell);

    // 저장소에 커밋됨
    assert!(fx.store.load_grid(grid.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_trigger_starts_grid_and_places_orders() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    // 트리거 위에서는 NEW 유지
    set_price(&fx.exchange, symbol.clone(), dec!(101)).await;
    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report, TickReport { committed: 1, skipped: 0, failed: 0 });
    let loaded = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, GridStatus::New);
    assert!(fx.exchange.placed_orders().await.is_empty());

    // 트리거 아래로 되돌림 → 가동, 주문 배치
    set_price(&fx.exchange, symbol, dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();
    let loaded = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, GridStatus::Running);

    // 일반 10 + 초기 = 11 (수량 0인 종료 스텝은 제외)
    assert_eq!(fx.exchange.placed_orders().await.len(), 11);
    for step in loaded.active_steps().filter(|s| s.qty > dec!(0)) {
        assert!(step.has_open_order());
    }
}

#[tokio::test]
async fn test_take_profit_freezes_and_notifies() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    set_price(&fx.exchange, symbol.clone(), dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();
    let open_orders = fx.exchange.placed_orders().await.len();
    assert!(open_orders > 0);

    // 익절 경계 도달 → 종료, 모든 주문 취소
    set_price(&fx.exchange, symbol.clone(), dec!(150)).await;
    fx.service.tick_all_grids().await.unwrap();
    let loaded = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, GridStatus::TakeProfit);
    assert!(loaded.steps.iter().all(|s| !s.has_open_order()));
    assert_eq!(fx.exchange.cancelled_orders().await.len(), open_orders);

    let messages = fx.notifier.messages().await;
    assert!(messages.iter().any(|(title, _)| title == "Grid take_profit"));

    // 종료된 그리드 재틱은 아무 변화 없음
    set_price(&fx.exchange, symbol, dec!(50)).await;
    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report.skipped, 1);
    let retick = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(retick.status, GridStatus::TakeProfit);
}

#[tokio::test]
async fn test_symbol_failure_does_not_block_other_grids() {
    let fx = fixture();
    let btc = Symbol::new("BTC", "USDT");
    let eth = Symbol::new("ETH", "USDT");

    fx.service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();
    let mut eth_config = btc_config();
    eth_config.symbol = eth.clone();
    let eth_grid = fx
        .service
        .create_grid(Uuid::new_v4(), eth_config)
        .await
        .unwrap();

    fx.exchange.fail_quotes_for(btc).await;
    set_price(&fx.exchange, eth, dec!(99)).await;

    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report, TickReport { committed: 1, skipped: 1, failed: 0 });
    let eth_loaded = fx.store.load_grid(eth_grid.id).await.unwrap().unwrap();
    assert_eq!(eth_loaded.status, GridStatus::Running);
}

#[tokio::test]
async fn test_store_failure_is_isolated_and_reported() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    fx.service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    set_price(&fx.exchange, symbol, dec!(101)).await;
    fx.store.fail_next_save().await;

    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report.failed, 1);
    let messages = fx.notifier.messages().await;
    assert!(messages.iter().any(|(title, _)| title == "Grid tick failed"));

    // 다음 틱은 정상 커밋
    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report.committed, 1);
}

#[tokio::test]
async fn test_update_repegs_initial_step_and_cancels_order() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    set_price(&fx.exchange, symbol, dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();

    let before = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    let old_order = before
        .find_step_by_kind(StepKind::Initial)
        .unwrap()
        .exchange_order_id
        .clone()
        .unwrap();

    let mut config = before.config.clone();
    config.trigger_price = dec!(95);
    let updated = fx.service.update_grid(grid.id, config).await.unwrap();

    let initial = updated.find_step_by_kind(StepKind::Initial).unwrap();
    assert_eq!(initial.buy_price, dec!(95));
    assert_eq!(initial.status, StepStatus::AwaitingBuy);
    assert!(initial.exchange_order_id.is_none());
    assert!(fx.exchange.cancelled_orders().await.contains(&old_order));

    // 트리거 불변 재수정은 주문을 건드리지 않음
    let cancelled_before = fx.exchange.cancelled_orders().await.len();
    fx.service
        .update_grid(grid.id, updated.config.clone())
        .await
        .unwrap();
    assert_eq!(fx.exchange.cancelled_orders().await.len(), cancelled_before);
}

#[tokio::test]
async fn test_update_rejects_immutable_fields_and_terminal_grids() {
    let fx = fixture();
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    let mut config = grid.config.clone();
    config.investment = dec!(2000);
    assert!(matches!(
        fx.service.update_grid(grid.id, config).await,
        Err(GridError::Validation(_))
    ));

    // 종료 상태 진입 후에는 어떤 수정도 거부
    let symbol = Symbol::new("BTC", "USDT");
    set_price(&fx.exchange, symbol.clone(), dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();
    set_price(&fx.exchange, symbol, dec!(150)).await;
    fx.service.tick_all_grids().await.unwrap();

    let mut config = grid.config.clone();
    config.trigger_price = dec!(95);
    assert!(matches!(
        fx.service.update_grid(grid.id, config).await,
        Err(GridError::Validation(_))
    ));
}

#[tokio::test]
async fn test_unsetting_stop_loss_removes_exit_step() {
    let fx = fixture();
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();
    assert!(grid.find_step_by_kind(StepKind::StopLoss).is_some());

    let mut config = grid.config.clone();
    config.stop_loss = None;
    let updated = fx.service.update_grid(grid.id, config).await.unwrap();
    assert!(updated.find_step_by_kind(StepKind::StopLoss).is_none());
}

#[tokio::test]
async fn test_delete_cancels_orders_and_hides_grid() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    set_price(&fx.exchange, symbol, dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();
    let open_orders = fx.exchange.placed_orders().await.len();

    fx.service.delete_grid(grid.id).await.unwrap();

    assert_eq!(fx.exchange.cancelled_orders().await.len(), open_orders);
    assert!(fx.store.load_grid(grid.id).await.unwrap().is_none());

    // 삭제된 그리드는 틱 대상에서 제외
    let report = fx.service.tick_all_grids().await.unwrap();
    assert_eq!(report, TickReport::default());
}

#[tokio::test]
async fn test_pause_stops_working_steps_until_resume() {
    let fx = fixture();
    let symbol = Symbol::new("BTC", "USDT");
    let grid = fx
        .service
        .create_grid(Uuid::new_v4(), btc_config())
        .await
        .unwrap();

    set_price(&fx.exchange, symbol.clone(), dec!(99)).await;
    fx.service.tick_all_grids().await.unwrap();
    let placed_before = fx.exchange.placed_orders().await.len();

    let paused = fx.service.pause_grid(grid.id).await.unwrap();
    assert_eq!(paused.status, GridStatus::Paused);

    // 일시정지 중에는 체결을 스크립트해도 반영되지 않음
    let order_id = paused.steps[0].exchange_order_id.clone().unwrap();
    fx.exchange.fill_order(&order_id).await.unwrap();
    fx.service.tick_all_grids().await.unwrap();
    let loaded = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(loaded.steps[0].fills.len(), 0);
    assert_eq!(fx.exchange.placed_orders().await.len(), placed_before);

    // 재개 후 다음 틱에 체결 반영
    fx.service.resume_grid(grid.id).await.unwrap();
    fx.service.tick_all_grids().await.unwrap();
    let loaded = fx.store.load_grid(grid.id).await.unwrap().unwrap();
    assert_eq!(loaded.steps[0].fills.len(), 1);
    assert_eq!(loaded.steps[0].status, StepStatus::AwaitingSell);
}
