//! Platform API client tests against an in-process mock platform.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};

use dynoscale_autoscale::{FleetMutator, FleetSnapshotSource};
use dynoscale_core::FleetSnapshot;
use dynoscale_heroku::{HerokuClient, HerokuError};

const APP: &str = "my-app";
const API_KEY: &str = "01234567-89ab-cdef-0123-456789abcdef";

type Formation = Arc<Mutex<BTreeMap<String, u32>>>;

fn check_headers(headers: &HeaderMap) -> Result<(), StatusCode> {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
    if auth != Some(&format!("Bearer {API_KEY}")[..]) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let accept = headers.get("accept").and_then(|v| v.to_str().ok());
    if accept != Some("application/vnd.heroku+json; version=3") {
        return Err(StatusCode::NOT_ACCEPTABLE);
    }
    Ok(())
}

fn check_app(app: &str) -> Result<(), StatusCode> {
    if app == APP {
        Ok(())
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

async fn list_formation(
    State(formation): State<Formation>,
    headers: HeaderMap,
    Path(app): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    check_headers(&headers)?;
    check_app(&app)?;
    let items: Vec<Value> = formation
        .lock()
        .unwrap()
        .iter()
        .map(|(t, q)| json!({ "type": t, "quantity": q, "size": "standard-1X" }))
        .collect();
    Ok(Json(Value::Array(items)))
}

async fn update_formation(
    State(formation): State<Formation>,
    headers: HeaderMap,
    Path((app, process_type)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    check_headers(&headers)?;
    check_app(&app)?;
    let quantity = body["quantity"]
        .as_u64()
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)? as u32;

    let mut formation = formation.lock().unwrap();
    let current = formation
        .get_mut(&process_type)
        .ok_or(StatusCode::NOT_FOUND)?;
    *current = quantity;
    Ok(Json(json!({ "type": process_type, "quantity": quantity })))
}

async fn list_dynos(
    headers: HeaderMap,
    Path(app): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    check_headers(&headers)?;
    check_app(&app)?;
    Ok(Json(json!([
        { "name": "web.1", "type": "web", "state": "up" }
    ])))
}

async fn mock_platform() -> (String, Formation) {
    let formation: Formation = Arc::new(Mutex::new(BTreeMap::from([
        ("fooworker".to_string(), 1),
        ("mainworker".to_string(), 1),
        ("web".to_string(), 2),
    ])));

    let router = Router::new()
        .route("/apps/{app}/formation", get(list_formation))
        .route(
            "/apps/{app}/formation/{process_type}",
            axum::routing::patch(update_formation),
        )
        .route("/apps/{app}/dynos", get(list_dynos))
        .with_state(formation.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), formation)
}

fn client(url: &str, app: &str, key: &str) -> HerokuClient {
    HerokuClient::new(url, app, key, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn lists_formation_quantities() {
    let (url, _) = mock_platform().await;
    let heroku = client(&url, APP, API_KEY);

    let fleet = heroku.list_fleet().await.unwrap();

    assert_eq!(
        fleet,
        vec![
            FleetSnapshot::new("fooworker", 1),
            FleetSnapshot::new("mainworker", 1),
            FleetSnapshot::new("web", 2),
        ]
    );
}

#[tokio::test]
async fn set_quantity_patches_formation() {
    let (url, formation) = mock_platform().await;
    let heroku = client(&url, APP, API_KEY);

    heroku.set_quantity("mainworker", 5).await.unwrap();
    let updated = heroku.update_formation("fooworker", 0).await.unwrap();

    assert_eq!(updated, FleetSnapshot::new("fooworker", 0));
    let formation = formation.lock().unwrap();
    assert_eq!(formation["mainworker"], 5);
    assert_eq!(formation["fooworker"], 0);
    assert_eq!(formation["web"], 2);
}

#[tokio::test]
async fn unknown_process_type_is_rejected() {
    let (url, _) = mock_platform().await;
    let heroku = client(&url, APP, API_KEY);

    let err = heroku.update_formation("ghost", 3).await.unwrap_err();
    assert!(err.is_not_found());

    let err = heroku.set_quantity("ghost", 3).await.unwrap_err();
    assert!(format!("{err:#}").contains(r#"process type "ghost" is not in the formation of "my-app""#));
    assert!(err.downcast_ref::<HerokuError>().is_some_and(HerokuError::is_not_found));
}

#[tokio::test]
async fn verify_access_checks_app_and_key() {
    let (url, _) = mock_platform().await;

    client(&url, APP, API_KEY).verify_access().await.unwrap();

    let missing_app = client(&url, "other-app", API_KEY);
    assert!(missing_app.list_dynos().await.unwrap_err().is_not_found());
    let err = missing_app.verify_access().await.unwrap_err();
    assert!(err.to_string().contains(r#"app "other-app" not found"#));

    let bad_key = client(&url, APP, "nope");
    match bad_key.list_dynos().await.unwrap_err() {
        HerokuError::Api { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn dynos_are_listed() {
    let (url, _) = mock_platform().await;
    let dynos = client(&url, APP, API_KEY).list_dynos().await.unwrap();

    assert_eq!(dynos.len(), 1);
    assert_eq!(dynos[0].name, "web.1");
    assert_eq!(dynos[0].process_type, "web");
    assert_eq!(dynos[0].state, "up");
}

#[test]
fn rejects_api_key_with_newline() {
    let err = HerokuClient::new(
        "https://api.heroku.com",
        APP,
        "bad\nkey",
        Duration::from_secs(1),
    )
    .err()
    .unwrap();
    assert!(matches!(err, HerokuError::InvalidApiKey));
}

#[test]
fn app_name_is_kept() {
    let heroku = client("https://api.heroku.com", APP, API_KEY);
    assert_eq!(heroku.app(), APP);
}
