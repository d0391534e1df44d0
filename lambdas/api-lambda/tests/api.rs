use doeklus_api_lambda::function_handler;
use doeklus_atoms::clock::ManualClock;
use doeklus_atoms::retry::RetryPolicy;
use doeklus_atoms::Backend;
use doeklus_shared::AppState;
use lambda_http::http::{self, StatusCode};
use lambda_http::{Body, Request, RequestExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn state() -> Arc<AppState> {
    let backend = Backend::in_memory()
        .with_clock(Arc::new(ManualClock::default()))
        .with_retry(RetryPolicy::immediate(10));
    Arc::new(AppState::new(backend))
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request {
    let mut builder = http::Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::Empty,
    };
    builder.body(body).unwrap()
}

async fn send(state: &Arc<AppState>, request: Request) -> (StatusCode, Value) {
    let resp = function_handler(request, state.clone()).await.unwrap();
    let status = resp.status();
    let value = match resp.body() {
        Body::Text(text) => serde_json::from_str(text).unwrap(),
        Body::Binary(bytes) => serde_json::from_slice(bytes).unwrap(),
        Body::Empty => Value::Null,
    };
    (status, value)
}

async fn call(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    send(state, request(method, uri, token, body)).await
}

/// GET with query parameters decoded the way API Gateway delivers them.
async fn get_with_query(
    state: &Arc<AppState>,
    uri: &str,
    token: &str,
    params: &[(&str, &str)],
) -> (StatusCode, Value) {
    let params: HashMap<String, String> = params
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let request = request("GET", uri, Some(token), None).with_query_string_parameters(params);
    send(state, request).await
}

async fn account(state: &Arc<AppState>, name: &str, role: &str, phone: Option<&str>) -> String {
    let email = format!("{}@example.nl", name.to_lowercase());
    let (status, _) = call(
        state,
        "POST",
        "/signup",
        None,
        Some(json!({
            "email": email,
            "password": "geheim123",
            "displayName": name,
            "role": role,
            "phone": phone,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, login) = call(
        state,
        "POST",
        "/login",
        None,
        Some(json!({"email": email, "password": "geheim123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(login["user"]["role"], role);
    login["accessToken"].as_str().unwrap().to_string()
}

fn task_body() -> Value {
    json!({
        "service": "Tuinonderhoud",
        "description": "Heg snoeien en gras maaien",
        "location": "Haarlem",
        "postcode": "2011AB",
        "date": "2024-06-15"
    })
}

#[tokio::test]
async fn bid_lifecycle_over_http() {
    let state = state();
    let owner = account(&state, "Anna", "customer", None).await;
    let bas = account(&state, "Bas", "klusser", Some("0612345678")).await;

    let (status, task) = call(&state, "POST", "/tasks", Some(&owner), Some(task_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "open");
    assert_eq!(task["time"], "");
    let task_id = task["id"].as_str().unwrap().to_string();

    let (status, placed) = call(
        &state,
        "POST",
        &format!("/tasks/{}/bids", task_id),
        Some(&bas),
        Some(json!({"amount": 80.0, "message": "Zaterdag kan ik"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let bid_id = placed["bid"]["id"].as_str().unwrap().to_string();

    let (status, err) = call(
        &state,
        "POST",
        &format!("/tasks/{}/bids", task_id),
        Some(&bas),
        Some(json!({"amount": 70.0, "message": "Toch goedkoper"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "duplicate_bid");

    let (status, accepted) = call(
        &state,
        "POST",
        &format!("/tasks/{}/bids/{}/accept", task_id, bid_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["task"]["status"], "assigned");
    assert_eq!(accepted["bid"]["amount"], 80.0);

    let (status, assigned) = get_with_query(&state, "/tasks", &bas, &[("scope", "assigned")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned.as_array().unwrap().len(), 1);

    let (status, inbox) =
        get_with_query(&state, "/notifications", &owner, &[("unread", "true")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(inbox["unreadCount"], 1);
    assert_eq!(inbox["notifications"][0]["type"], "bid_received");

    let (status, marked) = call(&state, "POST", "/notifications/read-all", Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(marked["marked"], 1);
}

#[tokio::test]
async fn errors_map_to_http_statuses() {
    let state = state();
    let owner = account(&state, "Anna", "customer", None).await;
    let stranger = account(&state, "Bram", "customer", None).await;

    let (status, _) = call(&state, "GET", "/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&state, "GET", "/tasks", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, err) = call(
        &state,
        "POST",
        "/tasks",
        Some(&owner),
        Some(json!({"service": "Tuinonderhoud"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation");

    let (_, task) = call(&state, "POST", "/tasks", Some(&owner), Some(task_body())).await;
    let task_id = task["id"].as_str().unwrap();

    let (status, _) = call(
        &state,
        "PATCH",
        &format!("/tasks/{}", task_id),
        Some(&stranger),
        Some(json!({"budget": "50"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&state, "GET", "/tasks/missing", Some(&owner), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, err) = call(
        &state,
        "POST",
        &format!("/tasks/{}/start", task_id),
        Some(&owner),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], "forbidden");

    let (status, _) = get_with_query(&state, "/tasks", &owner, &[("scope", "everything")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, err) = get_with_query(&state, "/tasks", &owner, &[("limit", "lots")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation");

    let (status, _) = call(&state, "GET", "/login", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&state, "DELETE", &format!("/tasks/{}", task_id), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn preflight_gets_cors_headers() {
    let state = state();
    let resp = function_handler(request("OPTIONS", "/tasks", None, None), state)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["Access-Control-Allow-Origin"], "*");
    assert!(resp.headers().contains_key("Access-Control-Allow-Methods"));
}

#[tokio::test]
async fn query_parameters_come_from_the_decoded_event() {
    let state = state();
    let owner = account(&state, "Anna", "customer", None).await;
    call(&state, "POST", "/tasks", Some(&owner), Some(task_body())).await;
    call(&state, "POST", "/tasks", Some(&owner), Some(task_body())).await;

    // The raw URI still carries the escaped form; only the decoded map counts.
    let request = request("GET", "/tasks?scope=m%69ne&limit=%31", Some(&owner), None)
        .with_query_string_parameters(HashMap::from([
            ("scope".to_string(), "mine".to_string()),
            ("limit".to_string(), "1".to_string()),
        ]));
    let (status, mine) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_signup_is_a_conflict() {
    let state = state();
    account(&state, "Anna", "customer", None).await;

    let (status, err) = call(
        &state,
        "POST",
        "/signup",
        None,
        Some(json!({
            "email": "anna@example.nl",
            "password": "anders123",
            "displayName": "Anna",
            "role": "customer",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "account_exists");
}
