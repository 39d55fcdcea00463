use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{Value, json};

use stockroom_api::app::{build_app, services::AppServices};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let app = build_app(Arc::new(AppServices::in_memory()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn register(client: &reqwest::Client, srv: &TestServer, body: Value) -> Value {
    let res = client
        .post(srv.url("/products"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

async fn adjust(
    client: &reqwest::Client,
    srv: &TestServer,
    id: &str,
    direction: &str,
    body: Value,
) -> reqwest::Response {
    client
        .post(srv.url(&format!("/products/{id}/stock/{direction}")))
        .header("X-Actor-Id", "clerk-1")
        .json(&body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn stock_lifecycle_register_adjust_history() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let product = register(
        &client,
        &srv,
        json!({ "id": "p-1", "name": "Rice 5kg", "minimum_stock": 2, "initial_stock": 10 }),
    )
    .await;
    assert_eq!(product["id"], "p-1");
    assert_eq!(product["current_stock"], 10);
    assert_eq!(product["status"], "active");

    let res = adjust(&client, &srv, "p-1", "increase", json!({ "quantity": 5, "notes": "delivery" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["product"]["current_stock"], 15);
    assert_eq!(body["movement"]["type"], "inbound");
    assert_eq!(body["movement"]["responsible"], "clerk-1");

    let res = adjust(&client, &srv, "p-1", "decrease", json!({ "quantity": 20 })).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 15);
    assert_eq!(body["requested"], 20);

    let res = adjust(&client, &srv, "p-1", "decrease", json!({ "quantity": 15 })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["product"]["current_stock"], 0);
    assert_eq!(body["product"]["is_low_stock"], true);

    let history: Value = client
        .get(srv.url("/products/p-1/movements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let movements = history["movements"].as_array().unwrap();
    let summary: Vec<(String, u64)> = movements
        .iter()
        .map(|m| (m["type"].as_str().unwrap().to_string(), m["quantity"].as_u64().unwrap()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("outbound".to_string(), 15),
            ("inbound".to_string(), 5),
            ("inbound".to_string(), 10),
        ]
    );

    let stock: Value = client
        .get(srv.url("/products/p-1/stock"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stock["current_stock"], 0);
    assert_eq!(stock["consistent"], true);
}

#[tokio::test]
async fn opening_movement_is_signed_by_the_caller() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/products"))
        .header("X-Actor-Id", "owner-9")
        .json(&json!({ "id": "P1", "name": "Soap", "initial_stock": 4 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let history: Value = client
        .get(srv.url("/products/P1/movements"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let opening = &history["movements"][0];
    assert_eq!(opening["notes"], "initial stock");
    assert_eq!(opening["responsible"], "owner-9");
}

#[tokio::test]
async fn invalid_requests_are_validation_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, json!({ "id": "p-1", "name": "Soap" })).await;

    for body in [json!({ "quantity": -3 }), json!({ "quantity": 0 }), json!({})] {
        let res = adjust(&client, &srv, "p-1", "increase", body).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "validation_error");
    }

    let res = client
        .post(srv.url("/products"))
        .json(&json!({ "name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_products_are_not_found() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/products/ghost")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "product_not_found");

    let res = adjust(&client, &srv, "ghost", "increase", json!({ "quantity": 1 })).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/products/find?q=nonexistent-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn find_edit_list_and_delete() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, json!({ "id": "b", "name": "Beans", "initial_stock": 4 })).await;
    register(&client, &srv, json!({ "id": "a", "name": "Apples", "minimum_stock": 3 })).await;

    let found: Value = client
        .get(srv.url("/products/find?q=Beans"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["id"], "b");

    let res = client
        .put(srv.url("/products/b"))
        .json(&json!({ "name": "Black beans", "brand": "Acme", "current_stock": 999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let edited: Value = res.json().await.unwrap();
    assert_eq!(edited["name"], "Black beans");
    assert_eq!(edited["current_stock"], 4);

    let list: Value = client
        .get(srv.url("/products"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Apples", "Black beans"]);

    let low: Value = client
        .get(srv.url("/products/low-stock"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(low.as_array().unwrap().len(), 1);
    assert_eq!(low[0]["id"], "a");

    let res = client.delete(srv.url("/products/b")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let res = client.delete(srv.url("/products/b")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn movement_stream_sends_snapshots() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    register(&client, &srv, json!({ "id": "p-1", "name": "Tea", "initial_stock": 2 })).await;

    let mut stream = client
        .get(srv.url("/products/p-1/movements/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);

    let mut received = String::new();
    let first = read_until(&mut stream, &mut received, "initial stock").await;
    assert!(first.contains("event: snapshot"));

    let res = adjust(&client, &srv, "p-1", "decrease", json!({ "quantity": 1, "notes": "sold" })).await;
    assert_eq!(res.status(), StatusCode::OK);

    let second = read_until(&mut stream, &mut received, "sold").await;
    assert!(second.contains("outbound"));
}

async fn read_until(res: &mut reqwest::Response, buf: &mut String, needle: &str) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !buf.contains(needle) {
            let chunk = res.chunk().await.unwrap().expect("stream ended");
            buf.push_str(&String::from_utf8_lossy(&chunk));
        }
        buf.clone()
    })
    .await
    .expect("timed out waiting for sse data")
}
