//! End-to-end runs against a mock products service

use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use volley_config::{ConfigLoader, VolleyConfig};
use volley_execution::{Orchestrator, RunResult, StopReason};
use volley_http::HttpManager;
use volley_metrics::{builtin, MetricSummary, Verdict};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const BROWSE: &str = r#"
http:
  timeout: 5s
scenarios:
  - name: browse
    executor: constant-arrival-rate
    duration: 3s
    target: 5
    pre_allocated: 2
    max: 10
    graceful_stop: 5s
    base_url: "${PRODUCTS_URL:-http://localhost:8001}"
    script:
      name: browse_products
      steps:
        - name: list_products
          request: { url: "/products" }
          checks:
            - { name: status is 200, status: [200] }
            - { name: has products, json_array_non_empty: "" }
thresholds:
  http_req_failed: "rate<0.1"
  http_req_duration: "p(95)<500"
  checks: "rate>0.99"
"#;

/// Fails every third request with a 500
struct EveryThirdFails {
    seen: AtomicUsize,
}

impl Respond for EveryThirdFails {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.seen.fetch_add(1, Ordering::SeqCst) + 1;
        if n % 3 == 0 {
            ResponseTemplate::new(500).set_body_string("boom")
        } else {
            ResponseTemplate::new(200).set_body_string(r#"[{"id": 1, "name": "widget"}]"#)
        }
    }
}

fn load(yaml: &str, products_url: String) -> Result<VolleyConfig> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(yaml.as_bytes())?;

    let config = ConfigLoader::new()
        .with_lookup(move |name: &str| (name == "PRODUCTS_URL").then(|| products_url.clone()))
        .from_file(file.path())?;
    Ok(config)
}

async fn run(config: &VolleyConfig) -> Result<RunResult> {
    let client = Arc::new(HttpManager::new(&config.http)?);
    let orchestrator = Orchestrator::new(config, client)?;
    Ok(orchestrator.run().await)
}

#[tokio::test]
async fn test_healthy_products_service_passes() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"[{"id": 1, "name": "widget"}]"#)
                .set_delay(Duration::from_millis(10)),
        )
        .expect(15)
        .mount(&server)
        .await;

    let config = load(BROWSE, server.uri())?;
    let result = run(&config).await?;

    assert_eq!(result.stop_reason, StopReason::Completed);
    assert!(result.passed, "thresholds: {:?}", result.thresholds);
    assert_eq!(result.iterations, 15);
    assert_eq!(result.errors, 0);
    assert_eq!(result.error_rate(), Some(0.0));

    match result.snapshot.get(builtin::HTTP_REQ_DURATION) {
        Some(MetricSummary::Trend(trend)) => {
            assert_eq!(trend.count, 15);
            assert!(trend.p95 < 500.0);
            assert!(trend.min >= 10.0);
        }
        other => panic!("unexpected http_req_duration summary: {:?}", other),
    }

    let scenario = &result.scenarios[0];
    assert_eq!(scenario.offered, 15);
    assert_eq!(scenario.dropped, 0);
    Ok(())
}

#[tokio::test]
async fn test_every_third_failure_fails_error_rate_threshold() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(EveryThirdFails {
            seen: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let config = load(BROWSE, server.uri())?;
    let result = run(&config).await?;

    assert!(!result.passed);
    assert_eq!(result.errors, 5);
    let rate = result.error_rate().unwrap_or_default();
    assert!((rate - 1.0 / 3.0).abs() < 0.01, "error rate {}", rate);

    let verdicts: Vec<(&str, Verdict)> = result
        .thresholds
        .iter()
        .map(|o| (o.threshold.metric.as_str(), o.verdict))
        .collect();
    assert!(verdicts.contains(&(builtin::HTTP_REQ_FAILED, Verdict::Fail)));
    assert!(verdicts.contains(&(builtin::CHECKS, Verdict::Fail)));
    assert!(verdicts.contains(&(builtin::HTTP_REQ_DURATION, Verdict::Pass)));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_target_degrades_to_metrics() -> Result<()> {
    // Nothing listens here once the listener is dropped
    let uri = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        format!("http://{}", listener.local_addr()?)
    };

    let yaml = BROWSE.replace("duration: 3s", "duration: 1s");
    let config = load(&yaml, uri)?;
    let result = run(&config).await?;

    assert_eq!(result.stop_reason, StopReason::Completed);
    assert!(!result.passed);
    assert_eq!(result.error_rate(), Some(1.0));
    assert_eq!(result.errors, 5);
    // Transport errors still count as completed transactions
    assert_eq!(result.iterations, 5);
    Ok(())
}
