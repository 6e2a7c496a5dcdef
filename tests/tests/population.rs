mod utils;
#[allow(unused)]
use utils::*;

use bytes::Bytes;
use mock_service::{MockConnector, MockService, Route};
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmer::prelude::*;
use swarmer::{Action, ConfigError};
use swarmer_runtime::{exit_status, EXIT_FORCED_STOP, EXIT_TARGET_MISSED};

const PING: &str = "/mock.Service/Ping";
const HANG: &str = "/mock.Service/Hang";

#[action]
async fn ping(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(PING, Bytes::new()).await?;
    Ok(Flow::Continue)
}

#[action]
async fn hang(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(HANG, Bytes::new()).await?;
    Ok(Flow::Continue)
}

fn connector() -> MockConnector {
    MockService::new()
        .route(PING, Route::Delay(Duration::from_millis(1)))
        .route(HANG, Route::Hang)
        .into_connector()
}

fn class(name: &str, weight: u32, action: Action, think: Duration) -> UserClass {
    UserClass::new(name, TaskSet::sequential(name).step(action))
        .weight(weight)
        .think_time(ThinkTime::constant(think))
}

fn settings(users: usize) -> PopulationSettings {
    PopulationSettings::new("mock:50051")
        .users(users)
        .spawn_rate(500.)
        .stop_timeout(Duration::from_secs(1))
        .drain_grace(Duration::from_millis(100))
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn weighted_population_holds_its_mix() {
    init();

    let connector = connector();
    let population = Population::new(
        settings(8),
        vec![
            class("Light", 1, ping(), Duration::from_millis(5)),
            class("Heavy", 3, ping(), Duration::from_millis(5)),
        ],
        Arc::new(connector.clone()),
    )
    .unwrap();

    let handle = population.start();
    assert!(handle.wait_for_running(8).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let census = handle.census();
    assert_eq!(census.per_class["Light"], 2);
    assert_eq!(census.per_class["Heavy"], 6);
    assert_eq!(census.spawned, 8);

    let stats = handle.shutdown().await;
    assert_eq!(stats.clean_stops, 8);
    assert_eq!(exit_status(&stats), 0);
    assert_eq!(connector.stats().connects(), 8);
    assert_eq!(connector.stats().open(), 0);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn shutdown_interrupts_think_time() {
    init();

    let connector = connector();
    let population = Population::new(
        settings(5),
        vec![class("Sleepy", 1, ping(), Duration::from_secs(60))],
        Arc::new(connector.clone()),
    )
    .unwrap();

    let handle = population.start();
    assert!(handle.wait_for_running(5).await);
    while connector.calls_to(PING) < 5 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = Instant::now();
    let stats = handle.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(stats.clean_stops, 5);
    assert_eq!(stats.forced_stops, 0);
    assert_eq!(connector.stats().closes(), 5);
    assert_eq!(connector.calls_to(PING), 5);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn stuck_users_are_forced_after_timeout() {
    init();

    let connector = connector();
    let population = Population::new(
        settings(3).stop_timeout(Duration::from_millis(200)),
        vec![class("Stuck", 1, hang(), Duration::ZERO)],
        Arc::new(connector.clone()),
    )
    .unwrap();

    let handle = population.start();
    assert!(handle.wait_for_running(3).await);
    while connector.calls_to(HANG) < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let started = Instant::now();
    let stats = handle.shutdown().await;
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(stats.forced_stops, 3);
    assert_eq!(exit_status(&stats), EXIT_FORCED_STOP);
    assert_eq!(connector.stats().open(), 0);

    // Abandoned calls are recorded as cancelled.
    let hang = stats.methods.iter().find(|m| m.method == HANG).unwrap();
    assert_eq!(hang.count, 3);
    assert_eq!(hang.errors, 3);
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn misconfigured_class_keeps_population_below_target() {
    init();

    let connector = connector();
    let broken = class("Broken", 1, ping(), Duration::from_millis(5)).requires("billing");
    let population = Population::new(
        settings(4).run_time(Duration::from_millis(200)),
        vec![class("Working", 1, ping(), Duration::from_millis(5)), broken],
        Arc::new(connector.clone()),
    )
    .unwrap();

    let stats = population.run().await;
    assert_eq!(stats.config_failures, 1);
    assert_eq!(stats.peak_users, 2);
    assert!(!stats.target_reached());
    assert_eq!(exit_status(&stats), EXIT_TARGET_MISSED);
}

#[tokio::test]
async fn empty_endpoint_is_rejected() {
    init();

    let res = Population::new(
        settings(1).users(1),
        vec![class("A", 1, ping(), Duration::ZERO)],
        Arc::new(connector()),
    );
    assert!(res.is_ok());

    let mut settings = settings(1);
    settings.host = String::new();
    let res = Population::new(
        settings,
        vec![class("A", 1, ping(), Duration::ZERO)],
        Arc::new(connector()),
    );
    assert!(matches!(res, Err(ConfigError::Settings(_))));
}
