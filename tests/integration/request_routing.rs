//! Requests answered by local routes, with and without storage behind them.

use hearth::bridge::WorkerOptions;
use hearth::facade::ReadyState;
use hearth::lease::{LeaseProvider, LeaseState, LocalLeaseProvider};
use hearth::store::SledBackend;
use hearth::{App, MigrationFlag, Reply, RequestContext, ResponseEnvelope, RouteTable, StorageRuntime};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

fn storage(dir: &TempDir) -> StorageRuntime {
    StorageRuntime::start_with(
        SledBackend::new(dir.path()),
        "tab",
        Arc::new(LocalLeaseProvider::new()) as Arc<dyn LeaseProvider>,
        WorkerOptions::default(),
        MigrationFlag::pending(|db| async move {
            db.exec("PUT items ? ?", vec![json!("1"), json!({"title": "seeded"})])
                .await?;
            Ok(())
        }),
    )
}

#[tokio::test]
async fn test_item_route_and_fallback() {
    let dir = TempDir::new().unwrap();
    let routes = RouteTable::builder()
        .get("/items/:id", |ctx: RequestContext| {
            Reply::from(ResponseEnvelope::structured(
                json!({ "id": ctx.get("id") }).to_string(),
            ))
        })
        .build()
        .unwrap();
    let app = App::new("http://localhost/", routes, storage(&dir)).unwrap();

    let found = app.fetch("GET", "/items/42?extra=x", None).await.unwrap();
    assert_eq!(found.response_text(), Some(r#"{"id":"42"}"#));
    assert_eq!(found.status(), 200);
    assert_eq!(found.get_all_response_headers(), "");

    let missing = app.fetch("GET", "/nope", None).await.unwrap();
    assert_eq!(missing.response_text(), Some("404"));
    assert_eq!(missing.status(), 200);
    assert_eq!(missing.status_text(), "OK");
    assert_eq!(missing.ready_state(), ReadyState::Done);
}

#[tokio::test]
async fn test_context_merge_through_facade() {
    let dir = TempDir::new().unwrap();
    let routes = RouteTable::builder()
        .all("/echo/:id", |ctx: RequestContext| {
            Reply::from(ResponseEnvelope::view("echo", ctx.to_json()))
        })
        .build()
        .unwrap();
    let app = App::new("http://localhost/", routes, storage(&dir)).unwrap();

    let request = app
        .fetch("PUT", "/echo/7?q=query&id=from-query", Some("body=1&q=body"))
        .await
        .unwrap();
    let echoed: Value = serde_json::from_str(request.response_text().unwrap()).unwrap();

    assert_eq!(echoed["body"], json!("1"));
    assert_eq!(echoed["q"], json!("query"));
    assert_eq!(echoed["id"], json!("from-query"));
    assert_eq!(echoed["requestURL"], json!("/echo/7"));
    assert_eq!(request.get_response_header("hx-template"), Some("echo"));
}

#[tokio::test]
async fn test_crud_routes_over_storage() {
    let dir = TempDir::new().unwrap();
    let storage = storage(&dir);
    let show_db = storage.sessions();
    let create_db = storage.sessions();

    let routes = RouteTable::builder()
        .get("/items/:id", move |ctx: RequestContext| {
            let db = Arc::clone(&show_db);
            Reply::deferred(async move {
                let id = ctx.get("id").unwrap_or_default().to_string();
                let rows = db
                    .with_session("app.db", |s| async move {
                        s.exec("GET items ?", vec![json!(id)]).await
                    })
                    .await?;
                Ok(match rows.first() {
                    Some(row) => ResponseEnvelope::view("item", row["value"].clone()),
                    None => ResponseEnvelope::raw("missing"),
                })
            })
        })
        .post("/items", move |ctx: RequestContext| {
            let db = Arc::clone(&create_db);
            Reply::deferred(async move {
                let id = ctx.get("id").unwrap_or_default().to_string();
                let title = ctx.get("title").unwrap_or_default().to_string();
                db.with_session("app.db", |s| async move {
                    s.exec("PUT items ? ?", vec![json!(id), json!({ "title": title })])
                        .await
                })
                .await?;
                Ok(ResponseEnvelope::redirect("/items"))
            })
        })
        .build()
        .unwrap();

    let mut app = App::new("http://localhost/", routes, storage).unwrap();
    app.wait_for_lease(LeaseState::Held).await.unwrap();

    let seeded = app.fetch("GET", "/items/1", None).await.unwrap();
    assert_eq!(seeded.response_text(), Some(r#"{"title":"seeded"}"#));
    assert!(!app.sessions().migration_pending());

    let created = app
        .fetch("POST", "/items", Some("id=2&title=Buy+milk"))
        .await
        .unwrap();
    assert_eq!(created.get_response_header("HX-Location"), Some("/items"));
    assert_eq!(created.response_text(), Some("{}"));

    let shown = app.fetch("GET", "/items/2", None).await.unwrap();
    assert_eq!(shown.response_text(), Some(r#"{"title":"Buy milk"}"#));
    assert_eq!(shown.get_response_header("hx-template"), Some("item"));

    app.deactivate().await.unwrap();
    assert_eq!(app.lease_state(), LeaseState::NotHeld);
    assert!(app.fetch("GET", "/items/2", None).await.is_err());

    app.activate().await.unwrap();
    let again = app.fetch("GET", "/items/2", None).await.unwrap();
    assert_eq!(again.response_text(), Some(r#"{"title":"Buy milk"}"#));

    app.shutdown().await.unwrap();
}
