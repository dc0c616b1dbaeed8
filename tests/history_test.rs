//! Integration tests for the REST history query endpoint: auth gating,
//! the admin-or-self authorization rule, ordering, and limit clamping.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use fieldtrack_server::db::DbPool;
use fieldtrack_server::fanout::AdminFanout;
use fieldtrack_server::registry::{PositionSample, TrackerRegistry};
use fieldtrack_server::{auth, db, routes, state, store};

/// Start the server on a random port and return (base_url, db, jwt_secret).
async fn start_test_server() -> (String, DbPool, Vec<u8>) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret =
        auth::jwt::load_or_generate_jwt_secret(&data_dir).expect("Failed to generate JWT secret");

    let app_state = state::AppState {
        db: db.clone(),
        jwt_secret: jwt_secret.clone(),
        registry: Arc::new(TrackerRegistry::new(200)),
        admins: Arc::new(AdminFanout::new()),
        store_tx: store::spawn_store_writer(db.clone(), 1024),
    };

    let app = routes::build_router(app_state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), db, jwt_secret)
}

fn mint_token(db: &DbPool, jwt_secret: &[u8], identity: &str, is_admin: bool) -> String {
    store::upsert_user(db, identity, is_admin).expect("Failed to upsert user");
    auth::jwt::issue_access_token(jwt_secret, identity, is_admin, 3600)
        .expect("Failed to issue token")
}

/// Seed stored samples for an identity with ascending timestamps.
fn seed_samples(db: &DbPool, identity: &str, count: i64) {
    for n in 0..count {
        store::append_sample(
            db,
            &PositionSample {
                identity: identity.to_string(),
                lat: n as f64,
                lon: -(n as f64),
                ts: 1_700_000_000 + n,
            },
        )
        .unwrap();
    }
}

async fn get_history(base_url: &str, identity: &str, token: Option<&str>, query: &str) -> reqwest::Response {
    let client = reqwest::Client::new();
    let mut req = client.get(format!("{}/api/history/{}{}", base_url, identity, query));
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }
    req.send().await.unwrap()
}

#[tokio::test]
async fn history_requires_a_credential() {
    let (base_url, db, _secret) = start_test_server().await;
    seed_samples(&db, "u1", 3);

    let resp = get_history(&base_url, "u1", None, "").await;
    assert_eq!(resp.status(), 401);

    let resp = get_history(&base_url, "u1", Some("garbage"), "").await;
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn admin_reads_any_identity_newest_first() {
    let (base_url, db, secret) = start_test_server().await;
    seed_samples(&db, "u1", 5);
    let admin_token = mint_token(&db, &secret, "boss", true);

    let resp = get_history(&base_url, "u1", Some(&admin_token), "").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 5);
    assert_eq!(body[0]["ts"], 1_700_000_004i64);
    assert_eq!(body[4]["ts"], 1_700_000_000i64);
    assert_eq!(body[0]["lat"], 4.0);
    assert_eq!(body[0]["lon"], -4.0);
}

#[tokio::test]
async fn identity_reads_its_own_history_but_not_others() {
    let (base_url, db, secret) = start_test_server().await;
    seed_samples(&db, "u1", 3);
    seed_samples(&db, "u2", 3);
    let u1_token = mint_token(&db, &secret, "u1", false);

    let resp = get_history(&base_url, "u1", Some(&u1_token), "").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 3);

    let resp = get_history(&base_url, "u2", Some(&u1_token), "").await;
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn limit_is_honored_and_clamped() {
    let (base_url, db, secret) = start_test_server().await;
    seed_samples(&db, "u1", 10);
    let admin_token = mint_token(&db, &secret, "boss", true);

    let resp = get_history(&base_url, "u1", Some(&admin_token), "?limit=2").await;
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["ts"], 1_700_000_009i64);

    // Oversized limits clamp to the 200-sample cap rather than erroring.
    let resp = get_history(&base_url, "u1", Some(&admin_token), "?limit=100000").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(body.len(), 10);
}

#[tokio::test]
async fn unknown_identity_returns_empty_list() {
    let (base_url, db, secret) = start_test_server().await;
    let admin_token = mint_token(&db, &secret, "boss", true);

    let resp = get_history(&base_url, "nobody", Some(&admin_token), "").await;
    assert_eq!(resp.status(), 200);
    let body: Vec<Value> = resp.json().await.unwrap();
    assert!(body.is_empty());
}
