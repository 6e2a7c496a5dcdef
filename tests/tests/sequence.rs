mod utils;
#[allow(unused)]
use utils::*;

use bytes::Bytes;
use mock_service::{MockService, Route};
use std::sync::Arc;
use std::time::Duration;
use swarmer::core::REQUEST_TYPE;
use swarmer::prelude::*;

const FIRST: &str = "/mock.Service/First";
const SECOND: &str = "/mock.Service/Second";
const ENTER: &str = "/mock.Service/Enter";
const LEAVE: &str = "/mock.Service/Leave";

#[action]
async fn first(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(FIRST, Bytes::new()).await?;
    Ok(Flow::Continue)
}

#[action]
async fn second(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(SECOND, Bytes::new()).await?;
    Ok(Flow::Continue)
}

#[action]
async fn enter(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(ENTER, Bytes::new()).await?;
    Ok(Flow::Continue)
}

#[action]
async fn leave(ctx: &mut UserContext) -> ActionResult {
    ctx.connection().unary_raw(LEAVE, Bytes::new()).await?;
    Ok(Flow::Interrupt)
}

fn settings() -> PopulationSettings {
    PopulationSettings::new("mock:50051")
        .users(1)
        .spawn_rate(100.)
        .stop_timeout(Duration::from_secs(1))
}

async fn methods_in_order(tasks: TaskSet, calls: u64) -> Vec<&'static str> {
    let connector = MockService::new()
        .route(FIRST, Route::Echo)
        .route(SECOND, Route::Echo)
        .route(ENTER, Route::Echo)
        .route(LEAVE, Route::Echo)
        .into_connector();
    let class = UserClass::new("Ordered", tasks).think_time(ThinkTime::constant(Duration::from_millis(1)));
    let population = Population::new(settings(), vec![class], Arc::new(connector.clone())).unwrap();

    let handle = population.start();
    let sink = handle.sink().clone();
    while connector.stats().calls() < calls {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    handle.shutdown().await;

    let mut events = sink.events();
    assert!(events.iter().all(|event| event.request_type == REQUEST_TYPE));
    assert!(events.iter().all(|event| !event.is_error()));
    events.sort_by_key(|event| event.started_at);
    events.into_iter().map(|event| event.method).collect()
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn sequential_actions_alternate() {
    init();

    let methods = methods_in_order(TaskSet::sequential("pair").step(first()).step(second()), 20).await;
    assert!(methods.len() >= 20);
    for (i, method) in methods.iter().enumerate() {
        let expected = if i % 2 == 0 { FIRST } else { SECOND };
        assert_eq!(*method, expected, "event {i}");
    }
}

#[tokio::test]
#[ntest::timeout(10_000)]
async fn nested_set_runs_until_interrupted() {
    init();

    let inner = TaskSet::sequential("inner").step(second()).step(leave());
    let tasks = TaskSet::sequential("outer").step(enter()).step(inner);

    let methods = methods_in_order(tasks, 30).await;
    assert!(methods.len() >= 30);
    for (i, method) in methods.iter().enumerate() {
        let expected = [ENTER, SECOND, LEAVE][i % 3];
        assert_eq!(*method, expected, "event {i}");
    }
}
