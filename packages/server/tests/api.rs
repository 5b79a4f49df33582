//! HTTP API tests: a real server on a random port, with the chain served
//! by a scripted JSON-RPC endpoint.

mod common;

use std::sync::Arc;

use airdrop_merkle_core::{hash_to_hex, resolve};
use airdrop_server::{
    build_router,
    chain::{CampaignFactory, ChainClient, RpcFailure, RpcSigner, Transport},
    claim::ClaimOrchestrator,
    state::{AppState, TreeSource},
    EngineConfig,
};
use axum::{extract::State, routing::post, Json, Router};
use common::{alice, fixture_tree, FakeChain, Kind, CAMPAIGN};
use serde_json::{json, Value};
use tokio::sync::broadcast;

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn json_rpc(State(chain): State<FakeChain>, Json(req): Json<Value>) -> Json<Value> {
    let method = req["method"].as_str().unwrap_or_default().to_string();
    let params = req["params"].clone();
    let body = match chain.request(&method, params).await {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": req["id"], "result": result }),
        Err(RpcFailure::Rpc { code, message, data }) => json!({
            "jsonrpc": "2.0",
            "id": req["id"],
            "error": { "code": code, "message": message, "data": data },
        }),
        Err(other) => json!({
            "jsonrpc": "2.0",
            "id": req["id"],
            "error": { "code": -32603, "message": other.to_string() },
        }),
    };
    Json(body)
}

/// API server with a loaded tree; with a campaign when `kind` is given.
async fn start(kind: Option<Kind>) -> (String, Option<FakeChain>) {
    start_with(kind, false).await
}

/// As [`start`], with claims sent from alice's account when `claims` is set.
async fn start_with(kind: Option<Kind>, claims: bool) -> (String, Option<FakeChain>) {
    let tree = Arc::new(fixture_tree());
    let (event_tx, _) = broadcast::channel(16);

    let (campaign, orchestrator, chain) = match kind {
        Some(kind) => {
            let chain = FakeChain::new(kind, tree.root());
            let rpc_url = spawn(Router::new().route("/", post(json_rpc)).with_state(chain.clone())).await;
            let factory = CampaignFactory::new(ChainClient::http(rpc_url), 1);
            let campaign = factory.create_auto(&CAMPAIGN).await.unwrap();
            let orchestrator = claims.then(|| {
                let signer = Arc::new(RpcSigner::new(factory.client().clone(), alice()));
                ClaimOrchestrator::new(
                    campaign.clone(),
                    Some(signer),
                    tree.encoding(),
                    EngineConfig::default(),
                    event_tx.clone(),
                )
            });
            (Some(campaign), orchestrator, Some(chain))
        }
        None => (None, None, None),
    };

    let state = Arc::new(AppState::new(
        TreeSource::Static(tree),
        campaign,
        orchestrator,
        EngineConfig::default(),
        event_tx,
    ));
    (spawn(build_router(state)).await, chain)
}

#[tokio::test]
async fn health_reports_configuration() {
    let (base, _) = start(None).await;
    let body: Value = reqwest::get(format!("{}/api/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["treeSource"], "file");
    assert_eq!(body["claimsEnabled"], false);
}

#[tokio::test]
async fn eligibility_lookup() {
    let (base, _) = start(None).await;

    let resp = reqwest::get(format!("{}/api/eligibility/{}", base, alice())).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["amount"], "1000000000000000000");
    assert!(!body["proof"].as_array().unwrap().is_empty());

    let stranger = "0x0000000000000000000000000000000000000001";
    let resp = reqwest::get(format!("{}/api/eligibility/{}", base, stranger)).await.unwrap();
    assert_eq!(resp.status(), 404);

    let resp = reqwest::get(format!("{}/api/eligibility/not-an-address", base)).await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn batch_eligibility_keeps_order() {
    let (base, _) = start(None).await;
    let bob = "0xa0Ee7A142d267C1f36714E4a8F75612F20a79720";
    let stranger = "0x0000000000000000000000000000000000000001";

    let body: Vec<Value> = reqwest::Client::new()
        .post(format!("{}/api/eligibility/batch", base))
        .json(&json!({ "addresses": [bob, stranger, alice().to_checksum()] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body.len(), 3);
    assert_eq!(body[0]["amount"], "12000000000000000000");
    assert!(body[1].is_null());
    assert_eq!(body[2]["address"], alice().to_checksum());
}

#[tokio::test]
async fn verify_endpoint() {
    let (base, _) = start(None).await;
    let tree = fixture_tree();
    let record = resolve(&alice(), &tree).unwrap();
    let mut payload = serde_json::to_value(&record).unwrap();

    let client = reqwest::Client::new();
    let body: Value = client
        .post(format!("{}/api/verify", base))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["root"], hash_to_hex(&tree.root()));

    payload["amount"] = json!("999999999999999999");
    let body: Value = client
        .post(format!("{}/api/verify", base))
        .json(&payload)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["valid"], false);
}

#[tokio::test]
async fn campaign_routes_need_a_campaign() {
    let (base, _) = start(None).await;
    let resp = reqwest::get(format!("{}/api/campaign", base)).await.unwrap();
    assert_eq!(resp.status(), 400);
    let resp = reqwest::get(format!("{}/api/claims/0/status", base)).await.unwrap();
    assert_eq!(resp.status(), 400);
    let resp = reqwest::Client::new()
        .post(format!("{}/api/claims", base))
        .json(&json!({ "address": alice().to_checksum() }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn campaign_metadata_over_http_rpc() {
    let (base, _) = start(Some(Kind::Linear)).await;
    let body: Value = reqwest::get(format!("{}/api/campaign", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["variant"], "linearVesting");
    assert_eq!(body["name"], "Season 1");
    assert_eq!(body["merkleRoot"], body["treeRoot"]);
    assert_eq!(body["vesting"]["kind"], "linear");
    assert_eq!(body["vesting"]["schedule"]["totalDuration"], 86_400);
}

#[tokio::test]
async fn claimed_status_is_cached() {
    let (base, chain) = start(Some(Kind::Instant)).await;
    let chain = chain.unwrap();

    let url = format!("{}/api/claims/1/status", base);
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["claimed"], false);

    chain.with(|s| {
        s.claimed.insert(1);
    });
    let cached: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(cached["claimed"], false);

    let fresh: Value = reqwest::get(format!("{}?refresh=true", url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fresh["claimed"], true);
}

#[tokio::test]
async fn estimate_for_an_allocation() {
    let (base, chain) = start(Some(Kind::Instant)).await;
    chain.unwrap().with(|s| s.fee = 5_000);

    let body: Value = reqwest::get(format!("{}/api/estimate/{}", base, alice()))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["rawGasLimit"], 100_000);
    assert_eq!(body["gasLimit"], 120_000);
    assert_eq!(body["fee"], "5000");
    assert_eq!(body["totalCost"], (120_000u128 * 1_000_000_000 + 5_000).to_string());

    let stranger = "0x0000000000000000000000000000000000000001";
    let resp = reqwest::get(format!("{}/api/estimate/{}", base, stranger)).await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn estimate_watch_lifecycle() {
    let (base, _) = start(Some(Kind::Instant)).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/estimate/{}/watch", base, alice());

    let resp = client.post(&url).send().await.unwrap();
    assert_eq!(resp.status(), 202);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["index"], 0);
    assert_eq!(body["intervalSecs"], 15);

    assert_eq!(client.delete(&url).send().await.unwrap().status(), 204);
    assert_eq!(client.delete(&url).send().await.unwrap().status(), 404);
}

#[tokio::test]
async fn concurrent_claims_get_one_accept_and_one_conflict() {
    let (base, chain) = start_with(Some(Kind::Linear), true).await;
    // Keep the winner busy confirming.
    chain.unwrap().with(|s| s.pending_polls = 1_000);

    let http = reqwest::Client::new();
    let post = |http: reqwest::Client| {
        let url = format!("{}/api/claims", base);
        async move {
            http.post(url)
                .json(&json!({ "address": alice() }))
                .send()
                .await
                .unwrap()
        }
    };
    let (a, b) = tokio::join!(post(http.clone()), post(http.clone()));

    let mut statuses = vec![a.status().as_u16(), b.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, vec![202, 409]);

    let (accepted, rejected) = if a.status() == 202 { (a, b) } else { (b, a) };
    let record: Value = accepted.json().await.unwrap();
    assert_eq!(record["state"], "preparing");
    let err: Value = rejected.json().await.unwrap();
    assert_eq!(err["kind"], "AlreadyInProgress");

    let current: Value = http
        .get(format!("{}/api/claims/current", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_ne!(current["state"], "idle");
}
