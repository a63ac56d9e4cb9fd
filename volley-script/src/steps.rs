//! Declarative step scripts built from configuration

use crate::check;
use crate::context::CorrelationContext;
use crate::error::{TemplateError, TemplateResult};
use crate::extract::extract;
use crate::script::{TransactionEnv, TransactionOutcome, TransactionScript};
use crate::template::TemplateEngine;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use volley_config::{CheckConfig, DelayConfig, ExtractionPaths, ScriptConfig, StepConfig};
use volley_http::{HttpMethod, HttpRequest};
use volley_metrics::{builtin, MetricKind, Observation};
use volley_resilience::jitter_between;

#[derive(Debug, Clone)]
struct CompiledStep {
    name: String,
    /// Variable name and template name of each `set` entry
    set: Vec<(String, String)>,
    method: HttpMethod,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
    json_body: bool,
    timeout: Option<Duration>,
    checks: Vec<CheckConfig>,
    extract: BTreeMap<String, ExtractionPaths>,
    delay: Option<DelayConfig>,
    every: u64,
    error_metric: Option<String>,
    trend_metric: Option<String>,
    counter_metric: Option<String>,
}

/// A script whose steps come from a [`ScriptConfig`]
#[derive(Debug, Clone)]
pub struct StepScript {
    name: String,
    base_url: Option<String>,
    vars: Map<String, JsonValue>,
    templates: TemplateEngine,
    steps: Vec<CompiledStep>,
}

/// How an attempted step went
struct StepReport {
    /// The request left the process
    sent: bool,
    /// Sent, but no response arrived
    transport_error: bool,
    /// Not sent, transport error, 4xx/5xx status, failed check or failed
    /// extraction
    failed: bool,
}

/// Why a step's request could not be built
#[derive(Debug, Default)]
struct Unrendered {
    /// Referenced names with no value
    missing: Vec<String>,
    /// Templates that failed for any other reason
    errors: Vec<String>,
}

impl Unrendered {
    fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty()
    }

    fn into_result<T>(mut self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            return Ok(value);
        }
        self.missing.sort();
        self.missing.dedup();
        Err(self)
    }
}

impl StepScript {
    /// Compile every template of the script. `base_url` is exposed to
    /// templates and prefixed to URLs that start with `/`.
    pub fn build(config: &ScriptConfig, base_url: Option<&str>) -> TemplateResult<Self> {
        let mut templates = TemplateEngine::new();
        let mut steps = Vec::with_capacity(config.steps.len());

        for step in &config.steps {
            steps.push(Self::compile_step(&config.name, step, &mut templates)?);
        }

        Ok(Self {
            name: config.name.clone(),
            base_url: base_url.map(|u| u.trim_end_matches('/').to_string()),
            vars: Map::new(),
            templates,
            steps,
        })
    }

    /// Expose fixed string variables to every template of the script
    pub fn with_vars(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.vars = vars
            .iter()
            .map(|(name, value)| (name.clone(), JsonValue::String(value.clone())))
            .collect();
        self
    }

    fn compile_step(
        script: &str,
        step: &StepConfig,
        templates: &mut TemplateEngine,
    ) -> TemplateResult<CompiledStep> {
        let method: HttpMethod =
            step.request
                .method
                .parse()
                .map_err(|_| TemplateError::InvalidMethod {
                    step: step.name.clone(),
                    method: step.request.method.clone(),
                })?;

        let prefix = format!("{}/{}", script, step.name);

        let mut set = Vec::with_capacity(step.set.len());
        for (var, value) in &step.set {
            let name = format!("{}/set/{}", prefix, var);
            templates.register(&name, value)?;
            set.push((var.clone(), name));
        }

        let url = format!("{}/url", prefix);
        templates.register(&url, &step.request.url)?;

        let mut headers = Vec::with_capacity(step.request.headers.len());
        for (header, value) in &step.request.headers {
            let name = format!("{}/header/{}", prefix, header);
            templates.register(&name, value)?;
            headers.push((header.clone(), name));
        }

        let (body, json_body) = match &step.request.body {
            None => (None, false),
            Some(body) => {
                let name = format!("{}/body", prefix);
                let (source, json_body) = match body {
                    JsonValue::String(raw) => (raw.clone(), false),
                    other => (other.to_string(), true),
                };
                templates.register(&name, &source)?;
                (Some(name), json_body)
            }
        };

        Ok(CompiledStep {
            name: step.name.clone(),
            set,
            method,
            url,
            headers,
            body,
            json_body,
            timeout: step.request.timeout,
            checks: step.checks.clone(),
            extract: step.extract.clone(),
            delay: step.delay,
            every: step.every.max(1),
            error_metric: step.error_metric.clone(),
            trend_metric: step.trend_metric.clone(),
            counter_metric: step.counter_metric.clone(),
        })
    }

    /// Step names in execution order
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name.as_str())
    }

    fn variables(&self, env: &TransactionEnv) -> Map<String, JsonValue> {
        let mut vars = self.vars.clone();
        if let Some(ref base_url) = self.base_url {
            vars.insert("base_url".to_string(), JsonValue::String(base_url.clone()));
        }
        vars.insert(
            "scenario".to_string(),
            JsonValue::String(env.scenario.to_string()),
        );
        vars.insert("iteration".to_string(), JsonValue::from(env.iteration));
        vars.insert("vu".to_string(), JsonValue::from(env.vu));
        vars
    }

    fn render_text(
        &self,
        template: &str,
        data: &Map<String, JsonValue>,
        unrendered: &mut Unrendered,
    ) -> String {
        match self.templates.render(template, data) {
            Ok(rendered) => {
                unrendered.missing.extend(rendered.missing);
                rendered.text
            }
            Err(e) => {
                unrendered.errors.push(e.to_string());
                String::new()
            }
        }
    }

    /// Assign the step's `set` variables, then render its request
    fn prepare(
        &self,
        step: &CompiledStep,
        context: &mut CorrelationContext,
        vars: &Map<String, JsonValue>,
    ) -> Result<HttpRequest, Unrendered> {
        if !step.set.is_empty() {
            let data = context.template_data(vars);
            let mut unrendered = Unrendered::default();
            let values: Vec<(String, String)> = step
                .set
                .iter()
                .map(|(var, template)| {
                    (var.clone(), self.render_text(template, &data, &mut unrendered))
                })
                .collect();
            for (var, text) in unrendered.into_result(values)? {
                context.insert(var, assigned_value(text));
            }
        }
        self.render(step, &context.template_data(vars))
    }

    /// Render the step's request, or report what kept it from rendering
    fn render(
        &self,
        step: &CompiledStep,
        data: &Map<String, JsonValue>,
    ) -> Result<HttpRequest, Unrendered> {
        let mut unrendered = Unrendered::default();

        let mut url = self.render_text(&step.url, data, &mut unrendered);
        if url.starts_with('/') {
            if let Some(ref base_url) = self.base_url {
                url = format!("{}{}", base_url, url);
            }
        }

        let mut request = HttpRequest::new(step.method, url);
        for (header, template) in &step.headers {
            let value = self.render_text(template, data, &mut unrendered);
            request = request.with_header(header.clone(), value);
        }
        if let Some(ref body) = step.body {
            request = request.with_body(self.render_text(body, data, &mut unrendered));
            if step.json_body && request.header("content-type").is_none() {
                request = request.with_header("Content-Type", "application/json");
            }
        }
        if let Some(timeout) = step.timeout {
            request = request.with_timeout(timeout);
        }

        unrendered.into_result(request)
    }

    /// A step with an unresolved reference counts as a missing reference.
    /// Any other rendering failure only fails the step.
    fn record_unrendered(
        &self,
        step: &CompiledStep,
        unrendered: &Unrendered,
        env: &TransactionEnv,
    ) {
        if unrendered.missing.is_empty() {
            debug!(
                "Step {} of {} not issued, rendering failed: {}",
                step.name,
                self.name,
                unrendered.errors.join("; ")
            );
        } else {
            debug!(
                "Step {} of {} not issued, unresolved references: {}",
                step.name,
                self.name,
                unrendered.missing.join(", ")
            );
            env.sink
                .record(Observation::counter(builtin::MISSING_REFERENCES, 1.0));
        }
        self.record_unsent(step, env);
        if let Some(ref metric) = step.error_metric {
            env.sink.record(Observation::rate(metric.as_str(), true));
        }
    }

    fn record_unsent(&self, step: &CompiledStep, env: &TransactionEnv) {
        for _ in &step.checks {
            env.sink.record(Observation::rate(builtin::CHECKS, false));
        }
    }

    /// Send the request and record its observations
    async fn issue(
        &self,
        step: &CompiledStep,
        request: HttpRequest,
        context: &mut CorrelationContext,
        env: &TransactionEnv,
    ) -> StepReport {
        debug!("{} {} ({})", request.method, request.url, step.name);

        let response = match env.client.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                debug!("Step {} got no response: {}", step.name, e);
                env.sink.record_all([
                    Observation::counter(builtin::HTTP_REQS, 1.0),
                    Observation::rate(builtin::HTTP_REQ_FAILED, true),
                ]);
                self.record_unsent(step, env);
                return StepReport {
                    sent: true,
                    transport_error: true,
                    failed: true,
                };
            }
            Err(e) => {
                debug!("Step {} of {} not issued: {}", step.name, self.name, e);
                self.record_unsent(step, env);
                return StepReport {
                    sent: false,
                    transport_error: false,
                    failed: true,
                };
            }
        };

        env.sink.record(Observation::counter(builtin::HTTP_REQS, 1.0));
        env.sink
            .record(Observation::trend(builtin::HTTP_REQ_DURATION, response.elapsed));
        env.sink
            .record(Observation::trend(step.name.as_str(), response.elapsed));
        if let Some(ref metric) = step.trend_metric {
            env.sink
                .record(Observation::trend(metric.as_str(), response.elapsed));
        }
        env.sink.record(Observation::rate(
            builtin::HTTP_REQ_FAILED,
            response.is_error(),
        ));

        let body = response.json();
        let mut failed = response.is_error();
        for check in &step.checks {
            let passed = check::passes(&check.condition, &response, body.as_ref());
            if !passed {
                debug!("Check '{}' failed on step {}", check.name, step.name);
                failed = true;
            }
            env.sink.record(Observation::rate(builtin::CHECKS, passed));
        }

        for (name, paths) in &step.extract {
            match extract(paths, &response, body.as_ref()) {
                Some(value) => context.insert(name.clone(), value),
                None => {
                    debug!("Step {} could not extract {}", step.name, name);
                    failed = true;
                }
            }
        }

        StepReport {
            sent: true,
            transport_error: false,
            failed,
        }
    }
}

/// Rendered `set` output that parses as JSON keeps its type
fn assigned_value(text: String) -> JsonValue {
    serde_json::from_str(text.trim()).unwrap_or(JsonValue::String(text))
}

#[async_trait::async_trait]
impl TransactionScript for StepScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn metrics(&self) -> Vec<(String, MetricKind)> {
        let mut metrics = Vec::new();
        for step in &self.steps {
            metrics.push((step.name.clone(), MetricKind::Trend));
            if let Some(ref metric) = step.error_metric {
                metrics.push((metric.clone(), MetricKind::Rate));
            }
            if let Some(ref metric) = step.trend_metric {
                metrics.push((metric.clone(), MetricKind::Trend));
            }
            if let Some(ref metric) = step.counter_metric {
                metrics.push((metric.clone(), MetricKind::Counter));
            }
        }
        metrics
    }

    async fn run(&self, env: &mut TransactionEnv) -> TransactionOutcome {
        let vars = self.variables(env);
        let mut context = CorrelationContext::new();
        let mut outcome = TransactionOutcome::default();

        for (index, step) in self.steps.iter().enumerate() {
            if env.stop.is_abandoned() {
                outcome.abandoned = true;
                break;
            }
            if env.iteration % step.every != 0 {
                continue;
            }

            let request = match self.prepare(step, &mut context, &vars) {
                Ok(request) => request,
                Err(unrendered) => {
                    self.record_unrendered(step, &unrendered, env);
                    if unrendered.missing.is_empty() {
                        outcome.unsent += 1;
                    } else {
                        outcome.missing_references += 1;
                    }
                    continue;
                }
            };

            let report = self.issue(step, request, &mut context, env).await;
            if report.sent {
                outcome.issued += 1;
            } else {
                outcome.unsent += 1;
            }
            if report.transport_error {
                outcome.transport_errors += 1;
            }
            if report.sent && report.failed {
                outcome.failed_steps += 1;
            }
            if let Some(ref metric) = step.error_metric {
                env.sink
                    .record(Observation::rate(metric.as_str(), report.failed));
            }
            if let Some(ref metric) = step.counter_metric {
                if !report.failed {
                    env.sink.record(Observation::counter(metric.as_str(), 1.0));
                }
            }

            let pause = match step.delay {
                Some(DelayConfig::Fixed(delay)) => delay,
                Some(DelayConfig::Jittered { min, max }) => jitter_between(min, max),
                None => Duration::ZERO,
            };
            if !pause.is_zero() && !env.stop.sleep(pause).await {
                outcome.abandoned = index + 1 < self.steps.len();
                break;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use volley_config::HttpConfig;
    use volley_http::{HttpClient, HttpError, HttpManager, HttpResponse, HttpResult};
    use volley_metrics::{MetricSink, MetricSummary, MetricsSnapshot};
    use volley_resilience::{StopCoordinator, StopLevel};

    type Responder = Box<dyn Fn(&HttpRequest) -> HttpResult<HttpResponse> + Send + Sync>;

    struct FakeClient {
        requests: Mutex<Vec<HttpRequest>>,
        respond: Responder,
    }

    impl FakeClient {
        fn new(
            respond: impl Fn(&HttpRequest) -> HttpResult<HttpResponse> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                respond: Box::new(respond),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.url.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for FakeClient {
        async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            let response = (self.respond)(&request);
            self.requests.lock().push(request);
            response
        }
    }

    fn ok(status: u16, body: &str) -> HttpResult<HttpResponse> {
        Ok(HttpResponse::new(status, body, Duration::from_millis(10)))
    }

    fn script(yaml: &str) -> StepScript {
        let config: ScriptConfig = serde_yaml::from_str(yaml).unwrap();
        StepScript::build(&config, Some("http://target:8002/")).unwrap()
    }

    fn env(client: Arc<FakeClient>, iteration: u64, stop: &StopCoordinator) -> TransactionEnv {
        TransactionEnv {
            scenario: Arc::from("orders"),
            iteration,
            vu: 3,
            client,
            sink: Arc::new(MetricSink::new()),
            stop: stop.signal(),
        }
    }

    fn snapshot(env: &TransactionEnv) -> MetricsSnapshot {
        env.sink.snapshot(Duration::from_secs(1))
    }

    fn rate(snapshot: &MetricsSnapshot, name: &str) -> (u64, u64) {
        match snapshot.get(name) {
            Some(MetricSummary::Rate { passes, total, .. }) => (*passes, *total),
            other => panic!("{} is not a rate: {:?}", name, other),
        }
    }

    const ORDER_JOURNEY: &str = r#"
name: create_and_fulfill
steps:
  - name: create_order
    request:
      method: POST
      url: /orders
      body: { customer_id: 7, items: [{ product_id: 1, quantity: 1 }] }
    checks:
      - { name: created, status: [200, 201] }
    extract:
      order_id: [id, order_id]
    error_metric: errors
    trend_metric: order_creation_duration
  - name: fulfill_order
    request:
      method: POST
      url: "{{base_url}}/orders/{{order_id}}/fulfill"
    checks:
      - { name: fulfilled, status: [200] }
"#;

    #[tokio::test]
    async fn test_order_id_flows_into_fulfill() {
        let client = FakeClient::new(|request| {
            if request.url.ends_with("/orders") {
                ok(201, r#"{"id": 42, "customer_id": 7}"#)
            } else {
                ok(200, r#"{"status": "fulfilled"}"#)
            }
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        let outcome = script(ORDER_JOURNEY).run(&mut env).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.issued, 2);
        assert_eq!(
            client.urls(),
            vec![
                "http://target:8002/orders".to_string(),
                "http://target:8002/orders/42/fulfill".to_string()
            ]
        );

        let create = &client.requests.lock()[0];
        assert_eq!(create.header("content-type"), Some("application/json"));
        let body: JsonValue = serde_json::from_str(create.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["customer_id"], 7);

        let snapshot = snapshot(&env);
        assert_eq!(snapshot.counter(builtin::HTTP_REQS), 2.0);
        assert_eq!(rate(&snapshot, builtin::CHECKS), (2, 2));
        assert_eq!(rate(&snapshot, "errors"), (0, 1));
        assert!(snapshot.get("create_order").is_some());
        assert!(snapshot.get("order_creation_duration").is_some());
    }

    #[tokio::test]
    async fn test_fallback_extraction_path() {
        let client = FakeClient::new(|request| {
            if request.url.ends_with("/orders") {
                ok(201, r#"{"order_id": 77}"#)
            } else {
                ok(200, "{}")
            }
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        script(ORDER_JOURNEY).run(&mut env).await;
        assert_eq!(client.urls()[1], "http://target:8002/orders/77/fulfill");
    }

    #[tokio::test]
    async fn test_failed_extraction_skips_dependent_step_only() {
        let yaml = r#"
name: journey
steps:
  - name: list_products
    request: { url: /products }
    checks:
      - { name: listed, status: [200] }
  - name: create_order
    request: { method: POST, url: /orders }
    extract:
      order_id: id
  - name: fulfill_order
    request: { method: POST, url: "/orders/{{order_id}}/fulfill" }
    checks:
      - { name: fulfilled, status: [200] }
  - name: list_orders
    request: { url: /orders }
"#;
        let client = FakeClient::new(|request| {
            if request.url.ends_with("/orders") && request.method == HttpMethod::Post {
                ok(201, "<html>not json</html>")
            } else {
                ok(200, "[]")
            }
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        let outcome = script(yaml).run(&mut env).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.issued, 3);
        assert_eq!(outcome.missing_references, 1);
        assert!(!client.urls().iter().any(|u| u.contains("fulfill")));

        let snapshot = snapshot(&env);
        assert_eq!(snapshot.counter(builtin::MISSING_REFERENCES), 1.0);
        assert!(snapshot.get("list_products").is_some());
        assert!(snapshot.get("fulfill_order").is_none());
        // listed passed, fulfilled recorded as failed without a request
        assert_eq!(rate(&snapshot, builtin::CHECKS), (1, 2));
    }

    /// Sends `/inventory` to `closed`, where nothing listens, and everything
    /// else to `fake`
    struct RefusingInventory {
        http: HttpManager,
        closed: String,
        fake: Arc<FakeClient>,
    }

    #[async_trait::async_trait]
    impl HttpClient for RefusingInventory {
        async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
            if request.url.ends_with("/inventory") {
                self.fake.requests.lock().push(request.clone());
                let refused = HttpRequest::new(request.method, self.closed.clone());
                return self.http.send(refused).await;
            }
            self.fake.send(request).await
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_recorded_and_journey_continues() {
        let yaml = r#"
name: browse
steps:
  - name: inventory
    request: { url: /inventory }
    checks:
      - { name: ok, status: [200] }
  - name: products
    request: { url: /products }
"#;
        let closed = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            format!("http://{}/inventory", listener.local_addr().unwrap())
        };
        let fake = FakeClient::new(|_| ok(200, "[]"));
        let client: Arc<dyn HttpClient> = Arc::new(RefusingInventory {
            http: HttpManager::new(&HttpConfig::default()).unwrap(),
            closed,
            fake: fake.clone(),
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(fake.clone(), 0, &stop);
        env.client = client;

        let outcome = script(yaml).run(&mut env).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.issued, 2);
        assert_eq!(outcome.transport_errors, 1);
        assert_eq!(fake.urls().len(), 2);

        let snapshot = snapshot(&env);
        assert_eq!(snapshot.counter(builtin::HTTP_REQS), 2.0);
        assert_eq!(rate(&snapshot, builtin::HTTP_REQ_FAILED), (1, 2));
        assert_eq!(rate(&snapshot, builtin::CHECKS), (0, 1));
        assert!(snapshot.get("inventory").is_none());
    }

    #[tokio::test]
    async fn test_locally_rejected_request_is_not_counted_as_sent() {
        let yaml = r#"
name: browse
steps:
  - name: inventory
    request: { url: "/inventory?sku={{sku}}" }
    checks:
      - { name: ok, status: [200] }
    error_metric: errors
  - name: products
    request: { url: /products }
"#;
        let client = FakeClient::new(|request| {
            if request.url.contains("/inventory") {
                Err(HttpError::InvalidUrl(request.url.clone()))
            } else {
                ok(200, "[]")
            }
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        let mut vars = BTreeMap::new();
        vars.insert("sku".to_string(), "a b".to_string());
        let outcome = script(yaml).with_vars(&vars).run(&mut env).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.issued, 1);
        assert_eq!(outcome.unsent, 1);
        assert_eq!(outcome.transport_errors, 0);

        let snapshot = snapshot(&env);
        assert_eq!(snapshot.counter(builtin::HTTP_REQS), 1.0);
        assert_eq!(rate(&snapshot, builtin::HTTP_REQ_FAILED), (0, 1));
        assert_eq!(rate(&snapshot, builtin::CHECKS), (0, 1));
        assert_eq!(rate(&snapshot, "errors"), (1, 1));
        assert_eq!(snapshot.counter(builtin::MISSING_REFERENCES), 0.0);
    }

    #[tokio::test]
    async fn test_render_failure_is_not_a_missing_reference() {
        let yaml = r#"
name: journey
steps:
  - name: create_order
    request: { method: POST, url: /orders }
    extract:
      order: ""
  - name: fulfill_order
    request: { method: POST, url: "/orders/{{order.id}}/fulfill" }
    checks:
      - { name: fulfilled, status: [200] }
    error_metric: errors
"#;
        let client = FakeClient::new(|_| ok(201, r#"{"order_id": 5}"#));
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        let outcome = script(yaml).run(&mut env).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.issued, 1);
        assert_eq!(outcome.unsent, 1);
        assert_eq!(outcome.missing_references, 0);
        assert_eq!(client.urls(), vec!["http://target:8002/orders".to_string()]);

        let snapshot = snapshot(&env);
        assert_eq!(snapshot.counter(builtin::MISSING_REFERENCES), 0.0);
        assert_eq!(rate(&snapshot, builtin::CHECKS), (0, 1));
        assert_eq!(rate(&snapshot, "errors"), (1, 1));
    }

    #[tokio::test]
    async fn test_set_and_vars_route_one_journey_across_services() {
        let yaml = r#"
name: buy
steps:
  - name: check_inventory
    set:
      product_id: "{{random_int 1 5}}"
    request: { url: "{{inventory_url}}/inventory/{{product_id}}" }
  - name: create_order
    request:
      method: POST
      url: "{{orders_url}}/orders"
      body: '{"items": [{"product_id": {{product_id}}, "quantity": 1}]}'
    checks:
      - { name: created, status: [201] }
    counter_metric: orders_created
"#;
        let client = FakeClient::new(|request| {
            if request.url.ends_with("/orders") {
                ok(201, r#"{"id": 1}"#)
            } else {
                ok(200, "{}")
            }
        });
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 0, &stop);

        let mut vars = BTreeMap::new();
        vars.insert("inventory_url".to_string(), "http://inventory:8002".to_string());
        vars.insert("orders_url".to_string(), "http://orders:8003".to_string());
        let outcome = script(yaml).with_vars(&vars).run(&mut env).await;
        assert!(outcome.is_success());

        let requests = client.requests.lock();
        let product_id: u64 = requests[0]
            .url
            .strip_prefix("http://inventory:8002/inventory/")
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=5).contains(&product_id));
        assert_eq!(requests[1].url, "http://orders:8003/orders");
        let body: JsonValue = serde_json::from_str(requests[1].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["items"][0]["product_id"], product_id);
        drop(requests);

        assert_eq!(snapshot(&env).counter("orders_created"), 1.0);
    }

    #[tokio::test]
    async fn test_counter_metric_counts_successful_steps_only() {
        let script = script(ORDER_JOURNEY.replace(
            "    trend_metric: order_creation_duration",
            "    trend_metric: order_creation_duration\n    counter_metric: orders_created",
        ).as_str());
        let stop = StopCoordinator::new("test");

        let created = FakeClient::new(|_| ok(201, r#"{"id": 1}"#));
        let mut env_ok = env(created, 0, &stop);
        script.run(&mut env_ok).await;
        assert_eq!(snapshot(&env_ok).counter("orders_created"), 1.0);

        let rejected = FakeClient::new(|_| ok(500, "{}"));
        let mut env_failed = env(rejected, 1, &stop);
        script.run(&mut env_failed).await;
        assert!(snapshot(&env_failed).get("orders_created").is_none());
    }

    #[tokio::test]
    async fn test_every_nth_iteration() {
        let yaml = r#"
name: products
steps:
  - name: list
    request: { url: /products }
  - name: create
    request: { method: POST, url: /products, body: { name: "P{{iteration}}", price: 9.99 } }
    every: 3
"#;
        let script = script(yaml);
        let stop = StopCoordinator::new("test");

        for (iteration, expected) in [(0, 2), (1, 1), (2, 1), (3, 2)] {
            let client = FakeClient::new(|_| ok(201, "{}"));
            let mut env = env(client.clone(), iteration, &stop);
            script.run(&mut env).await;
            assert_eq!(client.urls().len(), expected, "iteration {}", iteration);
        }
    }

    #[tokio::test]
    async fn test_template_variables() {
        let yaml = r#"
name: vars
steps:
  - name: tagged
    request:
      url: "/products?scenario={{scenario}}&vu={{vu}}&iter={{iteration}}"
      headers:
        X-Trace: "{{scenario}}-{{iteration}}"
"#;
        let client = FakeClient::new(|_| ok(200, "{}"));
        let stop = StopCoordinator::new("test");
        let mut env = env(client.clone(), 5, &stop);

        script(yaml).run(&mut env).await;

        let request = &client.requests.lock()[0];
        assert_eq!(
            request.url,
            "http://target:8002/products?scenario=orders&vu=3&iter=5"
        );
        assert_eq!(request.header("x-trace"), Some("orders-5"));
    }

    #[tokio::test]
    async fn test_abandoned_before_start() {
        let client = FakeClient::new(|_| ok(200, "{}"));
        let stop = StopCoordinator::new("test");
        stop.escalate(StopLevel::Abandon);
        let mut env = env(client.clone(), 0, &stop);

        let outcome = script(ORDER_JOURNEY).run(&mut env).await;
        assert!(outcome.abandoned);
        assert!(client.urls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandon_interrupts_delay_and_skips_rest() {
        let yaml = r#"
name: slow
steps:
  - name: first
    request: { url: /products }
    delay: 10m
  - name: second
    request: { url: /orders }
"#;
        let client = FakeClient::new(|_| ok(200, "{}"));
        let stop = Arc::new(StopCoordinator::new("test"));
        let mut env = env(client.clone(), 0, &stop);

        let escalate = {
            let stop = stop.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(1)).await;
                stop.escalate(StopLevel::Abandon);
            })
        };

        let outcome = script(yaml).run(&mut env).await;
        escalate.await.unwrap();

        assert!(outcome.abandoned);
        assert_eq!(client.urls(), vec!["http://target:8002/products".to_string()]);
    }

    #[test]
    fn test_build_rejects_bad_templates() {
        let config: ScriptConfig = serde_yaml::from_str(
            "name: bad\nsteps:\n  - name: s\n    request: { url: '{{unclosed' }\n",
        )
        .unwrap();
        assert!(matches!(
            StepScript::build(&config, None),
            Err(TemplateError::Compile { .. })
        ));
    }

    #[test]
    fn test_declared_metrics() {
        let metrics = script(ORDER_JOURNEY).metrics();
        assert!(metrics.contains(&("create_order".to_string(), MetricKind::Trend)));
        assert!(metrics.contains(&("errors".to_string(), MetricKind::Rate)));
        assert!(metrics.contains(&("order_creation_duration".to_string(), MetricKind::Trend)));

        let counted =
            ORDER_JOURNEY.replace("    error_metric: errors", "    counter_metric: orders_created");
        let metrics = script(&counted).metrics();
        assert!(metrics.contains(&("orders_created".to_string(), MetricKind::Counter)));
    }
}
