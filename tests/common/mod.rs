// Test helpers are partially used by each test binary
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use onmyway::{build_app, config::AppConfig, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

pub fn test_app() -> Router {
    build_app(AppState::in_memory(AppConfig::ephemeral("integration-secret")))
}

/// Send one request through the router and decode the JSON response.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

pub struct Account {
    pub id: String,
    pub token: String,
    pub user: Value,
}

pub async fn register_and_login(app: &Router, body: Value) -> Account {
    let email = body["email"].as_str().unwrap().to_string();
    let password = body["password"].as_str().unwrap().to_string();
    let (status, res) = call(app, Method::POST, "/api/v1/auth/register", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{res}");

    let (status, res) = call(
        app,
        Method::POST,
        "/api/v1/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{res}");
    Account {
        id: res["user"]["id"].as_str().unwrap().to_string(),
        token: res["token"].as_str().unwrap().to_string(),
        user: res["user"].clone(),
    }
}

pub async fn passenger(app: &Router, n: u32) -> Account {
    register_and_login(
        app,
        json!({
            "name": format!("Passenger {n}"),
            "email": format!("p{n}@example.com"),
            "phone": format!("+1-555-01{n:02}"),
            "password": "secret1",
            "role": "passenger",
        }),
    )
    .await
}

pub async fn rider(app: &Router, n: u32) -> Account {
    register_and_login(
        app,
        json!({
            "name": format!("Rider {n}"),
            "email": format!("r{n}@example.com"),
            "phone": format!("+1-555-02{n:02}"),
            "password": "secret1",
            "role": "rider",
            "license": format!("DL{n}23"),
        }),
    )
    .await
}

pub fn location(address: &str) -> Value {
    json!({
        "address": address,
        "coordinates": { "latitude": 28.61, "longitude": 77.20 },
    })
}

pub fn booking(passenger_id: &str, pickup: &str, dropoff: &str) -> Value {
    json!({
        "pickupLocation": location(pickup),
        "dropoffLocation": location(dropoff),
        "passengerId": passenger_id,
    })
}
