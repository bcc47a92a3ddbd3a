//! End-to-end coverage of the documented failure scenarios (spec §8)
//! through the public [`rpc_pool::Pool`] facade, against real HTTP mock
//! servers rather than the executor's internal types directly.

use rpc_pool::{BreakerConfig, CallOptions, HedgingConfig, Pool, PoolConfig, PoolError};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_result_body(value: serde_json::Value) -> serde_json::Value {
    json!({ "jsonrpc": "2.0", "id": 1, "result": value })
}

#[tokio::test]
async fn healthy_single_endpoint_returns_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!(42))))
        .mount(&server)
        .await;

    let pool = Pool::builder().endpoint(server.uri()).build().unwrap();
    let result = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!(42));
    assert_eq!(pool.get_stats().global.total_requests, 1);
}

#[tokio::test]
async fn failover_recovers_when_first_endpoint_is_down() {
    let bad = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&bad)
        .await;

    let good = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!(7))))
        .mount(&good)
        .await;

    let pool = Pool::builder()
        .endpoint(bad.uri())
        .endpoint(good.uri())
        .build()
        .unwrap();

    let result = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!(7));
}

#[tokio::test]
async fn non_retryable_error_surfaces_without_trying_other_endpoints() {
    let a = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&a)
        .await;

    let b = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!(1))))
        .mount(&b)
        .await;

    let pool = Pool::builder().endpoint(a.uri()).endpoint(b.uri()).build().unwrap();
    let err = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::Client { status: 400, .. }));
    assert_eq!(
        pool.get_load_distribution()
            .iter()
            .find(|l| l.url == b.uri())
            .map(|l| l.requests),
        Some(0)
    );
}

#[tokio::test]
async fn all_breakers_open_fails_fast_instead_of_hanging() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let mut config = PoolConfig::default();
    config.breaker = BreakerConfig {
        failure_threshold: 1,
        ..config.breaker
    };
    config.default_failover_budget_ms = 500;
    config.default_timeout_ms = 500;
    config.max_attempts = 1;

    let pool = Pool::builder().config(config).endpoint(server.uri()).build().unwrap();

    // First call trips the breaker.
    let _ = pool.call("getSlot", json!([]), CallOptions::default()).await;

    let start = Instant::now();
    let err = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::CircuitOpen { .. }));
    assert!(
        start.elapsed() < Duration::from_millis(500),
        "circuit-open should fail fast, not wait out the failover budget"
    );
}

#[tokio::test]
async fn hedging_lets_a_fast_backup_win_over_a_slow_primary() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!("slow"))).set_delay(Duration::from_millis(300)))
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!("fast"))))
        .mount(&fast)
        .await;

    let mut config = PoolConfig::default();
    config.hedging = HedgingConfig {
        delay_ms: 20,
        max_backups: 1,
        enabled: true,
        ..config.hedging
    };
    config.hedging.hedgeable_methods.insert("getSlot".to_string());

    let pool = Pool::builder()
        .config(config)
        .endpoint(slow.uri())
        .endpoint(fast.uri())
        .build()
        .unwrap();

    let start = Instant::now();
    let result = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!("fast"));
    assert!(
        start.elapsed() < Duration::from_millis(250),
        "hedged call should resolve once the backup answers, not wait for the slow primary"
    );
}

#[tokio::test]
async fn non_idempotent_calls_are_not_hedged() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!("slow"))).set_delay(Duration::from_millis(150)))
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!("fast"))))
        .mount(&fast)
        .await;

    let mut config = PoolConfig::default();
    config.hedging = HedgingConfig {
        delay_ms: 10,
        max_backups: 1,
        enabled: true,
        ..config.hedging
    };
    config.hedging.hedgeable_methods.insert("sendTransaction".to_string());

    let pool = Pool::builder()
        .config(config)
        .endpoint(slow.uri())
        .endpoint(fast.uri())
        .build()
        .unwrap();

    let opts = CallOptions {
        idempotent: Some(false),
        ..CallOptions::default()
    };
    let result = pool.call("sendTransaction", json!([]), opts).await.unwrap();
    // With hedging suppressed, the call sticks to whichever endpoint the
    // selector picked first and waits out its full latency.
    assert_eq!(result, json!("slow"));
}

#[tokio::test]
async fn destroy_rejects_subsequent_calls_and_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result_body(json!(1))))
        .mount(&server)
        .await;

    let pool = Pool::builder().endpoint(server.uri()).build().unwrap();
    pool.call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap();

    pool.destroy();
    pool.destroy();
    assert!(pool.is_destroyed());

    let err = pool
        .call("getSlot", json!([]), CallOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PoolError::PoolDestroyed));
}

#[tokio::test]
async fn builder_rejects_a_pool_with_no_endpoints() {
    let result = Pool::builder().build();
    assert!(result.is_err());
}
