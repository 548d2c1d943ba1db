// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use geosat_gateway::client::ReqwestTransport;
use geosat_gateway::runtime::{CircuitState, MetricsCollector};
use geosat_gateway::service::UNAVAILABLE;
use geosat_gateway::{FetchOutcome, Gateway, GatewayConfig, MemoryMetadataCache, MetadataCache};
use http::StatusCode;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer, extra: &str) -> GatewayConfig {
    let yaml = format!(
        "rbmc:\n  base_url: {}/api/v1/rbmc\n  user_agent: GeoSatTest/1.0\n  timeouts:\n    connect_ms: 500\n    response_ms: 1000\n{extra}",
        server.uri()
    );
    GatewayConfig::from_yaml(&yaml).expect("valid config")
}

fn gateway(config: &GatewayConfig) -> Gateway {
    Gateway::from_config(config).expect("gateway")
}

const NO_WAIT: &str = "retry:\n  backoff: none\n";

#[tokio::test]
async fn test_fallback_serves_last_cached_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/relatorio/cach"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/relatorio/cach"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let gateway = gateway(&config_for(&server, NO_WAIT));
    let link = format!("{}/api/v1/rbmc/relatorio/cach", server.uri());

    let first = gateway.service().report("CACH").await.unwrap();
    assert_eq!(first.status_code(), StatusCode::OK);
    assert_eq!(first.fresh().unwrap().link, link);

    let second = gateway.service().report("CACH").await.unwrap();
    assert_eq!(second.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    let fallback = second.fallback().unwrap();
    assert_eq!(fallback.status, UNAVAILABLE);
    assert_eq!(fallback.cached["link"].as_str(), Some(link.as_str()));

    let json = serde_json::to_value(fallback).unwrap();
    assert_eq!(json["estacao"], "CACH");
    assert_eq!(json["dadosCacheados"]["link"], link.as_str());
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_breaker_opens_and_stops_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/relatorio/alar"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        "retry:\n  max_attempts: 1\ncircuit_breaker:\n  sliding_window_size: 4\n  minimum_calls: 4\n  failure_rate_threshold: 50\n  wait_open_seconds: 30\n",
    );
    let gateway = gateway(&config);

    for _ in 0..4 {
        assert!(gateway.service().report("ALAR").await.unwrap().is_fallback());
    }
    assert_eq!(gateway.breaker().state(), CircuitState::Open);

    let outcome = gateway.service().report("ALAR").await.unwrap();
    let FetchOutcome::Fallback {
        response,
        retry_after,
    } = &outcome
    else {
        panic!("expected fallback");
    };
    assert!(response.message.contains("Circuit breaker open"));
    let secs = retry_after.unwrap();
    assert!((1..=30).contains(&secs));
    assert_eq!(
        outcome.retry_after_header().unwrap().to_str().unwrap(),
        secs.to_string()
    );

    let snapshot = gateway.metrics().snapshot();
    assert_eq!(snapshot.circuit_breaker_state, 1);
    assert_eq!(snapshot.circuit_breaker_rejections, 1);
    assert_eq!(gateway.metrics().fallbacks_for("circuit_open"), 1);
}

#[tokio::test]
async fn test_transient_failure_makes_four_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/rinex2/alar/2024/100"))
        .respond_with(ResponseTemplate::new(500))
        .expect(4)
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        "retry:\n  backoff: none\ncircuit_breaker:\n  sliding_window_size: 100\n  minimum_calls: 100\n",
    );
    let gateway = gateway(&config);

    let outcome = gateway.service().rinex2("alar", 2024, 100).await.unwrap();

    assert!(outcome.is_fallback());
    assert!(outcome.retry_after_header().is_none());
    assert_eq!(gateway.breaker().state(), CircuitState::Closed);
    assert_eq!(gateway.metrics().retries(), 3);
    assert_eq!(gateway.metrics().fallbacks_for("transient"), 1);
}

#[tokio::test]
async fn test_retry_recovers_within_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/rinex3/orbitas/2024/1"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/rinex3/orbitas/2024/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("orbits"))
        .mount(&server)
        .await;

    let gateway = gateway(&config_for(&server, NO_WAIT));
    let outcome = gateway.service().orbits(2024, 1).await.unwrap();

    let file = outcome.fresh().expect("fresh orbits");
    assert_eq!(file.category, "orbitas");
    assert!(file.station.is_none());
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_sends_configured_user_agent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/rinex3/1s/alar/2024/10/6/15/mo"))
        .and(header("user-agent", "GeoSatTest/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 16]))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&config_for(&server, NO_WAIT));
    let outcome = gateway
        .service()
        .rinex3_1s("ALAR", 2024, 10, 6, 15, "MO")
        .await
        .unwrap();

    assert_eq!(outcome.fresh().unwrap().interval.as_deref(), Some("1s"));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let gateway = gateway(&config_for(&server, "retry:\n  max_attempts: 1\n"));
    let outcome = gateway.service().rinex3_15s("alar", 2024, 2).await.unwrap();

    let fallback = outcome.fallback().expect("timeout falls back");
    assert!(fallback.message.starts_with("Temporary failure"));
    assert!(fallback.cached.is_empty());
    assert_eq!(gateway.metrics().failed_requests(), 1);
}

#[tokio::test]
async fn test_half_open_trial_closes_breaker() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = config_for(
        &server,
        "retry:\n  max_attempts: 1\ncircuit_breaker:\n  sliding_window_size: 2\n  minimum_calls: 2\n  wait_open_seconds: 1\n  permitted_calls_in_half_open: 1\n",
    );
    let gateway = gateway(&config);

    for _ in 0..2 {
        gateway.service().report("BRAZ").await.unwrap();
    }
    assert_eq!(gateway.breaker().state(), CircuitState::Open);
    assert_eq!(gateway.tracker().remaining_open_seconds(), Some(1));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(gateway.breaker().state(), CircuitState::HalfOpen);
    assert!(gateway.tracker().remaining_open_seconds().is_none());

    let outcome = gateway.service().report("BRAZ").await.unwrap();
    assert!(!outcome.is_fallback());
    assert_eq!(gateway.breaker().state(), CircuitState::Closed);
    assert_eq!(gateway.metrics().snapshot().circuit_breaker_state, 0);
}

#[tokio::test]
async fn test_gateway_from_config_file() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/rbmc/relatorio/poal"))
        .respond_with(ResponseTemplate::new(200).set_body_string("report"))
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        "rbmc:\n  base_url: {}/api/v1/rbmc/\nmetrics:\n  namespace: geosat\n",
        server.uri()
    )?;

    let config = GatewayConfig::load_from_path(file.path())?;
    let gateway = Gateway::from_config(&config)?;

    let report = gateway.service().report("poal").await?;
    assert_eq!(report.fresh().map(|r| r.size_bytes), Some(Some(6)));
    assert!(gateway
        .metrics()
        .to_prometheus_text()
        .contains("geosat_operations_total"));
    Ok(())
}

#[tokio::test]
async fn test_cache_shared_with_caller() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let config = config_for(&server, NO_WAIT);
    let metrics = Arc::new(MetricsCollector::with_defaults());
    let cache = Arc::new(MemoryMetadataCache::new(100).with_metrics(metrics.clone()));
    let transport = Arc::new(ReqwestTransport::new(&config.client_config().unwrap()).unwrap());
    let gateway = Gateway::with_parts(&config, transport, cache.clone(), metrics).unwrap();

    gateway.service().rinex3_15s("alar", 2024, 3).await.unwrap();

    let lookup = cache.get("rinex3_15s_alar_2024_3").await.unwrap();
    assert!(lookup.is_found());
    assert_eq!(gateway.metrics().snapshot().cache_hits, 1);
}
