use std::sync::Arc;

use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use ledgerflow_api::app::{build_app, services};
use ledgerflow_api::config::Config;
use ledgerflow_infra::WorkerHandle;

const PRINCIPAL: &str = "x-principal-id";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    worker: Option<WorkerHandle>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory adapters, ephemeral port.
        let (services, worker) =
            services::build_in_memory_services(&Config::default()).expect("failed to build services");
        let app = build_app(Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            worker: Some(worker),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

fn decimal(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).expect("decimal field")
}

async fn open_account(client: &reqwest::Client, srv: &TestServer, owner: &str, balance: &str) -> String {
    let res = client
        .post(srv.url("/accounts"))
        .json(&json!({ "ownerId": owner, "initialBalance": balance, "currency": "USD" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let body: Value = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn balance(client: &reqwest::Client, srv: &TestServer, account: &str) -> Decimal {
    let body: Value = client
        .get(srv.url(&format!("/accounts/{account}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    decimal(&body["balance"])
}

/// Balances are updated asynchronously by the mutator; poll briefly.
async fn balance_eventually(
    client: &reqwest::Client,
    srv: &TestServer,
    account: &str,
    expected: Decimal,
) {
    for _ in 0..100 {
        if balance(client, srv, account).await == expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("account {account} did not reach balance {expected}");
}

fn principal() -> String {
    uuid::Uuid::now_v7().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn transaction_routes_require_a_principal() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url(&format!("/transactions/account/{}", uuid::Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url(&format!("/transactions/account/{}", uuid::Uuid::now_v7())))
        .header(PRINCIPAL, "not-a-uuid")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn transfer_settles_on_both_accounts() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let bob = principal();

    let a = open_account(&client, &srv, &alice, "100").await;
    let b = open_account(&client, &srv, &bob, "0").await;

    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({
            "accountId": a,
            "amount": "40",
            "type": "TRANSFER",
            "destinationAccountId": b,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let created: Value = res.json().await.unwrap();
    assert_eq!(created["type"], "TRANSFER");
    assert_eq!(created["status"], "COMMITTED");
    assert_eq!(decimal(&created["amount"]), dec!(40));
    let tx_id = created["id"].as_str().unwrap().to_string();

    balance_eventually(&client, &srv, &b, dec!(40)).await;
    assert_eq!(balance(&client, &srv, &a).await, dec!(60));

    let history: Value = client
        .get(srv.url(&format!("/transactions/account/{a}")))
        .header(PRINCIPAL, &alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["items"].as_array().unwrap().len(), 1);

    let res = client
        .get(srv.url(&format!("/transactions/{tx_id}")))
        .header(PRINCIPAL, &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Bob received the funds but does not own the source account.
    let res = client
        .get(srv.url(&format!("/transactions/{tx_id}")))
        .header(PRINCIPAL, &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn overdraft_is_rejected_without_a_record() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let a = open_account(&client, &srv, &alice, "30").await;

    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({ "accountId": a, "amount": "50", "type": "WITHDRAW" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_funds");

    let history: Value = client
        .get(srv.url(&format!("/transactions/account/{a}")))
        .header(PRINCIPAL, &alice)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(history["items"].as_array().unwrap().is_empty());
    assert_eq!(balance(&client, &srv, &a).await, dec!(30));
}

#[tokio::test]
async fn cross_currency_transfer_is_refused_and_funds_stay_available() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let a = open_account(&client, &srv, &alice, "100").await;

    let res = client
        .post(srv.url("/accounts"))
        .json(&json!({ "ownerId": principal(), "initialBalance": "0", "currency": "EUR" }))
        .send()
        .await
        .unwrap();
    let eur: Value = res.json().await.unwrap();

    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({
            "accountId": a,
            "amount": "40",
            "type": "TRANSFER",
            "destinationAccountId": eur["id"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_destination");

    let account: Value = client
        .get(srv.url(&format!("/accounts/{a}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(decimal(&account["available"]), dec!(100));
}

#[tokio::test]
async fn oversized_deposit_is_rejected_and_the_mutator_keeps_running() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let a = open_account(&client, &srv, &alice, "1").await;

    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({ "accountId": a, "amount": Decimal::MAX.to_string(), "type": "DEPOSIT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({ "accountId": a, "amount": "2", "type": "DEPOSIT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    balance_eventually(&client, &srv, &a, dec!(3)).await;
}

#[tokio::test]
async fn request_errors_map_to_statuses() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let a = open_account(&client, &srv, &alice, "10").await;

    // Somebody else's account.
    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, principal())
        .json(&json!({ "accountId": a, "amount": "1", "type": "DEPOSIT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Non-positive amount.
    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({ "accountId": a, "amount": "-5", "type": "DEPOSIT" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Destination that does not exist.
    let res = client
        .post(srv.url("/transactions"))
        .header(PRINCIPAL, &alice)
        .json(&json!({
            "accountId": a,
            "amount": "1",
            "type": "TRANSFER",
            "destinationAccountId": uuid::Uuid::now_v7().to_string(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_destination");

    let res = client
        .get(srv.url(&format!("/transactions/{}", uuid::Uuid::now_v7())))
        .header(PRINCIPAL, &alice)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validation_surface_answers_booleans() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let alice = principal();
    let a = open_account(&client, &srv, &alice, "100").await;

    let ask = |path: String| {
        let client = client.clone();
        let url = srv.url(&path);
        async move {
            let res = client.get(url).send().await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            res.json::<bool>().await.unwrap()
        }
    };

    assert!(ask(format!("/accounts/{a}/validate?userId={alice}")).await);
    assert!(!ask(format!("/accounts/{a}/validate?userId={}", principal())).await);
    assert!(!ask(format!("/accounts/{}/validate?userId={alice}", uuid::Uuid::now_v7())).await);

    assert!(ask(format!("/accounts/{a}/checksum?sum=100")).await);
    assert!(!ask(format!("/accounts/{a}/checksum?sum=100.01")).await);

    // GET never reserves anything.
    assert!(ask(format!("/accounts/{a}/checksum?sum=70&hold={}", uuid::Uuid::now_v7())).await);
    assert!(ask(format!("/accounts/{a}/checksum?sum=70")).await);

    // A held check reserves the funds until released.
    let hold = uuid::Uuid::now_v7();
    for _ in 0..2 {
        let res = client
            .post(srv.url(&format!("/accounts/{a}/holds")))
            .json(&json!({ "sum": "70", "transactionId": hold }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.json::<bool>().await.unwrap());
    }
    assert!(!ask(format!("/accounts/{a}/checksum?sum=50")).await);

    let res = client
        .delete(srv.url(&format!("/accounts/{a}/holds/{hold}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(ask(format!("/accounts/{a}/checksum?sum=50")).await);

    let eur = client
        .post(srv.url("/accounts"))
        .json(&json!({ "ownerId": alice, "initialBalance": "0", "currency": "EUR" }))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    let usd = open_account(&client, &srv, &alice, "0").await;
    assert!(ask(format!("/accounts/{usd}/accepts?from={a}")).await);
    assert!(!ask(format!("/accounts/{eur}/accepts?from={a}")).await);

    let res = client
        .get(srv.url(&format!("/accounts/{}", uuid::Uuid::now_v7())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let owned: Value = client
        .get(srv.url(&format!("/accounts/user/{alice}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(owned["items"].as_array().unwrap().len(), 3);
}
