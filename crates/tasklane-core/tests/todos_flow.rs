use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tasklane_core::dashboard::{Dashboard, StatusFilter};
use tasklane_core::error::ApiError;
use tasklane_core::ordering::ReorderOutcome;
use tasklane_core::session::{ClientSettings, LogObserver, SessionClient};
use tasklane_core::storage::{MemoryStore, TOKEN_KEY};
use tasklane_core::todos::{FetchOutcome, TodoStore};
use tasklane_shared::{TaskCreate, TaskPatch, TaskStatus};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn task(id: &str, status: &str) -> Value {
    json!({
        "_id": id,
        "title": format!("task {id}"),
        "status": status,
        "createdAt": "2025-01-01T00:00:00Z",
        "updatedAt": "2025-01-01T00:00:00Z"
    })
}

fn todo_store(server: &MockServer) -> TodoStore {
    let settings = ClientSettings {
        base_url: format!("{}/api", server.uri()),
        timeout: Duration::from_secs(5),
    };
    let client = SessionClient::new(
        &settings,
        Arc::new(MemoryStore::with_entry(TOKEN_KEY, "abc")),
        Arc::new(LogObserver),
    )
    .expect("client should build");
    TodoStore::new(Arc::new(client))
}

async fn mount_list(server: &MockServer, items: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": items })))
        .mount(server)
        .await;
}

fn ids(dashboard: &Dashboard) -> Vec<&str> {
    dashboard.working_set().ids()
}

#[tokio::test]
async fn fetch_replaces_cache_and_counts_statuses() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![task("1", "pending"), task("2", "completed"), task("3", "pending")],
    )
    .await;

    let store = todo_store(&server);
    let outcome = store.fetch(None).await.expect("fetch");

    assert_eq!(outcome, FetchOutcome::Applied(3));
    assert_eq!(store.counts().pending, 2);
    assert_eq!(store.counts().completed, 1);
    assert!(store.error().is_none());
}

#[tokio::test]
async fn fetch_sends_status_filter_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .and(query_param("status", "completed"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [task("2", "completed")]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(Some(TaskStatus::Completed)).await.expect("fetch");
    assert_eq!(store.todos().len(), 1);
}

#[tokio::test]
async fn failed_fetch_keeps_cache_and_records_fallback_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [task("1", "pending")]})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(None).await.expect("first fetch");
    store.fetch(None).await.expect_err("second fetch fails");

    assert_eq!(store.todos().len(), 1);
    assert_eq!(store.error().as_deref(), Some("Failed to fetch todos"));
}

#[tokio::test]
async fn superseded_fetch_is_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .and(query_param("status", "pending"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": [task("old", "pending")]}))
                .set_delay(Duration::from_millis(300)),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [task("new", "pending")]})))
        .with_priority(2)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    let (slow, fast) = tokio::join!(store.fetch(Some(TaskStatus::Pending)), store.fetch(None));

    assert_eq!(slow.expect("slow fetch"), FetchOutcome::Stale);
    assert_eq!(fast.expect("fast fetch"), FetchOutcome::Applied(1));
    let ids: Vec<String> = store.todos().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["new".to_string()]);
}

#[tokio::test]
async fn create_prepends_and_failure_keeps_cache() {
    let server = MockServer::start().await;
    mount_list(&server, vec![task("1", "pending")]).await;
    Mock::given(method("POST"))
        .and(path("/api/todos"))
        .and(body_json(json!({"title": "fresh"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": task("9", "pending")})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/todos"))
        .and(body_json(json!({"title": "dup"})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "Title taken"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(None).await.expect("fetch");

    let created = store.create(&TaskCreate::titled("fresh")).await.expect("create");
    assert_eq!(created.id, "9");
    let ids: Vec<String> = store.todos().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["9".to_string(), "1".to_string()]);

    let err = store.create(&TaskCreate::titled("dup")).await.expect_err("400");
    assert_eq!(err.status().map(|s| s.as_u16()), Some(400));
    assert_eq!(store.error().as_deref(), Some("Title taken"));
    assert_eq!(store.todos().len(), 2);
}

#[tokio::test]
async fn blank_title_is_rejected_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/todos"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/todos/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    let err = store.create(&TaskCreate::titled("   ")).await.expect_err("blank");
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(store.error().as_deref(), Some("Title is required"));

    let patch = TaskPatch {
        title: Some(String::new()),
        ..TaskPatch::default()
    };
    store.update("1", &patch).await.expect_err("blank");
}

#[tokio::test]
async fn update_replaces_in_place_and_delete_removes() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![task("1", "pending"), task("2", "pending"), task("3", "pending")],
    )
    .await;
    let mut renamed = task("2", "pending");
    renamed["title"] = json!("renamed");
    Mock::given(method("PATCH"))
        .and(path("/api/todos/2"))
        .and(body_json(json!({"title": "renamed"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": renamed })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/todos/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(None).await.expect("fetch");

    let patch = TaskPatch {
        title: Some("renamed".to_string()),
        ..TaskPatch::default()
    };
    store.update("2", &patch).await.expect("update");
    let titles: Vec<String> = store.todos().into_iter().map(|t| t.title).collect();
    assert_eq!(titles, vec!["task 1", "renamed", "task 3"]);

    store.delete("1").await.expect("delete");
    let ids: Vec<String> = store.todos().into_iter().map(|t| t.id).collect();
    assert_eq!(ids, vec!["2".to_string(), "3".to_string()]);
}

#[tokio::test]
async fn failed_delete_keeps_task_and_uses_fallback() {
    let server = MockServer::start().await;
    mount_list(&server, vec![task("1", "pending")]).await;
    Mock::given(method("DELETE"))
        .and(path("/api/todos/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(None).await.expect("fetch");
    store.delete("1").await.expect_err("500");

    assert_eq!(store.todos().len(), 1);
    assert_eq!(store.error().as_deref(), Some("Failed to delete todo"));
}

#[tokio::test]
async fn dashboard_sinks_completed_and_resets_after_toggle() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        vec![task("1", "pending"), task("2", "completed"), task("3", "pending")],
    )
    .await;
    Mock::given(method("PATCH"))
        .and(path("/api/todos/2"))
        .and(body_json(json!({"status": "pending"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": task("2", "pending")})))
        .expect(1)
        .mount(&server)
        .await;

    let mut dashboard = Dashboard::new(todo_store(&server), 6);
    dashboard.refresh().await.expect("refresh");
    assert_eq!(ids(&dashboard), vec!["1", "3", "2"]);

    assert_eq!(dashboard.reorder("3", "1"), ReorderOutcome::Moved);
    assert_eq!(ids(&dashboard), vec!["3", "1", "2"]);

    dashboard.toggle("2").await.expect("toggle");
    assert_eq!(ids(&dashboard), vec!["1", "2", "3"]);
    assert_eq!(dashboard.counts().completed, 0);
}

#[tokio::test]
async fn dashboard_filter_and_paging() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/todos"))
        .and(query_param("status", "pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                task("a", "pending"),
                task("b", "pending"),
                task("c", "pending"),
                task("d", "pending"),
                task("e", "pending")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut dashboard = Dashboard::new(todo_store(&server), 2);
    dashboard
        .set_filter(StatusFilter::Pending)
        .await
        .expect("filter");

    assert_eq!(dashboard.page_info().count, 3);
    assert_eq!(dashboard.set_page(5), 2);
    let visible: Vec<&str> = dashboard.visible().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(visible, vec!["e"]);
    assert_eq!(dashboard.page_info().offset, 4);

    assert!(!dashboard.next_page());
    assert!(dashboard.prev_page());
    assert_eq!(dashboard.page_info().index, 1);

    assert_eq!(dashboard.resolve("1").as_deref(), Some("a"));
    assert_eq!(dashboard.resolve("e").as_deref(), Some("e"));
    assert_eq!(dashboard.resolve("zzz"), None);
}

#[tokio::test]
async fn update_can_clear_description_and_due_date() {
    let server = MockServer::start().await;
    let mut original = task("4", "pending");
    original["description"] = json!("two liters");
    original["dueDate"] = json!("2025-02-01");
    mount_list(&server, vec![original]).await;
    Mock::given(method("PATCH"))
        .and(path("/api/todos/4"))
        .and(body_json(json!({"description": "", "dueDate": null})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": task("4", "pending")})))
        .expect(1)
        .mount(&server)
        .await;

    let store = todo_store(&server);
    store.fetch(None).await.expect("fetch");
    assert!(store.find("4").and_then(|t| t.due_date).is_some());

    let patch = TaskPatch {
        description: Some(None),
        due_date: Some(None),
        ..TaskPatch::default()
    };
    store.update("4", &patch).await.expect("update");

    let cleared = store.find("4").expect("task still cached");
    assert_eq!(cleared.description, None);
    assert_eq!(cleared.due_date, None);
}
