//! One buyer journey spread across separate products, inventory and orders
//! services

use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use volley_config::ConfigLoader;
use volley_execution::Orchestrator;
use volley_http::HttpManager;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BUYERS: &str = r#"
scenarios:
  - name: buyers
    executor: constant-arrival-rate
    duration: 1s
    target: 1
    pre_allocated: 1
    vars:
      products_url: "${PRODUCTS_URL:-http://localhost:8001}"
      inventory_url: "${INVENTORY_URL:-http://localhost:8002}"
      orders_url: "${ORDERS_URL:-http://localhost:8003}"
    script:
      name: purchase_journey
      steps:
        - name: browse_before_buying
          request: { url: "{{products_url}}/products" }
          checks:
            - { name: products loaded, status: [200] }
        - name: check_stock
          set:
            product_id: "{{random_int 1 5}}"
          request: { url: "{{inventory_url}}/inventory/{{product_id}}" }
          checks:
            - { name: inventory checked, status: [200] }
        - name: create_order
          request:
            method: POST
            url: "{{orders_url}}/orders"
            body: '{"customer_id": {{random_int 1 10000}}, "items": [{"product_id": {{product_id}}, "quantity": {{random_int 1 3}}}]}'
          checks:
            - { name: order created, status: [200, 201] }
          extract:
            order_id: [id, order_id]
          error_metric: errors
          counter_metric: orders_created
        - name: fulfill_order
          request:
            method: POST
            url: "{{orders_url}}/orders/{{order_id}}/fulfill"
          checks:
            - { name: order fulfilled, status: [200] }
thresholds:
  errors: "rate<0.1"
  orders_created: "count>0"
  http_req_failed: "rate<0.1"
"#;

async fn body_of(server: &MockServer, request_path: &str) -> Result<Value> {
    let requests = server.received_requests().await.unwrap_or_default();
    let request = requests
        .iter()
        .find(|r| r.url.path() == request_path)
        .ok_or_else(|| anyhow::anyhow!("no request to {}", request_path))?;
    Ok(serde_json::from_slice(&request.body)?)
}

#[tokio::test]
async fn test_journey_reaches_each_service_with_shared_product() -> Result<()> {
    let products = MockServer::start().await;
    let inventory = MockServer::start().await;
    let orders = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }])))
        .expect(1)
        .mount(&products)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/inventory/[1-5]$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "quantity": 9 })))
        .expect(1)
        .mount(&inventory)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 31 })))
        .expect(1)
        .mount(&orders)
        .await;
    Mock::given(method("POST"))
        .and(path("/orders/31/fulfill"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&orders)
        .await;

    let urls = [
        ("PRODUCTS_URL", products.uri()),
        ("INVENTORY_URL", inventory.uri()),
        ("ORDERS_URL", orders.uri()),
    ];
    let config = ConfigLoader::new()
        .with_lookup(move |name: &str| {
            urls.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, url)| url.clone())
        })
        .from_yaml(BUYERS)?;
    let client = Arc::new(HttpManager::new(&config.http)?);
    let result = Orchestrator::new(&config, client)?.run().await;

    assert!(result.passed, "thresholds: {:?}", result.thresholds);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.snapshot.counter("orders_created"), 1.0);

    let stock_checks = inventory.received_requests().await.unwrap_or_default();
    let product_id: u64 = stock_checks[0]
        .url
        .path()
        .trim_start_matches("/inventory/")
        .parse()?;
    let order = body_of(&orders, "/orders").await?;
    assert_eq!(order["items"][0]["product_id"], product_id);
    let quantity = order["items"][0]["quantity"].as_u64().unwrap_or_default();
    assert!((1..=3).contains(&quantity));
    Ok(())
}

#[tokio::test]
async fn test_unset_service_url_falls_back_to_default() -> Result<()> {
    let config = ConfigLoader::new()
        .with_lookup(|name: &str| {
            (name == "ORDERS_URL").then(|| "http://orders.internal:8003".to_string())
        })
        .from_yaml(BUYERS)?;
    let vars = &config.scenarios[0].vars;

    assert_eq!(vars["products_url"], "http://localhost:8001");
    assert_eq!(vars["inventory_url"], "http://localhost:8002");
    assert_eq!(vars["orders_url"], "http://orders.internal:8003");
    Ok(())
}
