mod common;

use common::*;
use portfolio::admin::{self, AdminError, ListQuery, find_model, validate_value};
use portfolio::app;
use portfolio::orm::SqlValue;
use portfolio::router::{Method, Request};
use serde_json::{Value, json};
use std::collections::HashMap;

fn model(slug: &str) -> &'static admin::AdminModel {
    find_model(slug).unwrap()
}

fn bytes(value: Value) -> Vec<u8> {
    value.to_string().into_bytes()
}

#[tokio::test]
async fn test_admin_requires_token() {
    let (state, _mailer) = memory_state().await;
    let router = app::build_router(state);

    let resp = router.dispatch(Request::new(Method::Get, "/admin/")).await;
    assert_eq!(resp.status_code, 403);

    let resp = router
        .dispatch(Request::new(Method::Get, "/admin/").with_header("Authorization", "Bearer wrong"))
        .await;
    assert_eq!(resp.status_code, 403);

    let resp = router
        .dispatch(Request::new(Method::Get, "/admin/").with_header("Authorization", "Bearer secret"))
        .await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("Study notes"));

    let resp = router
        .dispatch(Request::new(Method::Get, "/admin/skill/?token=secret"))
        .await;
    assert_eq!(resp.status_code, 200);
}

#[tokio::test]
async fn test_admin_disabled_without_token() {
    let (mut state, _mailer) = memory_state().await;
    state.settings.admin_token = None;
    let router = app::build_router(state);
    let resp = router
        .dispatch(Request::new(Method::Get, "/admin/?token="))
        .await;
    assert_eq!(resp.status_code, 403);
}

/// First `href` in `body` that starts with `prefix`, with HTML escaping undone.
fn link_from(body: &str, prefix: &str) -> String {
    let marker = format!("href=\"{}", prefix);
    let start = body.find(&marker).unwrap() + "href=\"".len();
    let end = start + body[start..].find('"').unwrap();
    body[start..end].replace("&amp;", "&")
}

#[tokio::test]
async fn test_rendered_links_keep_reserved_token_characters() {
    let (mut state, _mailer) = memory_state().await;
    state.settings.admin_token = Some("a+b&c".to_string());
    seed_book(&state.db, "Dune", "fiction", false).await;
    seed_book(&state.db, "SICP", "technical", false).await;
    let router = app::build_router(state);

    let resp = router
        .dispatch(Request::new(Method::Get, "/admin/?token=a%2Bb%26c"))
        .await;
    assert_eq!(resp.status_code, 200);

    let link = link_from(&resp.body, "/admin/book/");
    assert_eq!(link, "/admin/book/?token=a%2Bb%26c");
    let resp = router.dispatch(Request::new(Method::Get, &link)).await;
    assert_eq!(resp.status_code, 200);

    let link = link_from(&resp.body, "/admin/book/?category=technical");
    assert_eq!(link, "/admin/book/?category=technical&token=a%2Bb%26c");
    let resp = router.dispatch(Request::new(Method::Get, &link)).await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("SICP"));
    assert!(!resp.body.contains("Dune"));
}

#[tokio::test]
async fn test_create_update_delete_project() {
    let (state, _mailer) = memory_state().await;
    let project = model("project");

    let id = admin::create_record(
        &state.db,
        project,
        &bytes(json!({
            "title": "Crate",
            "description": "A crate",
            "github_url": "https://github.com/me/crate",
            "technologies": "Rust, SQLite",
            "featured": true,
        })),
    )
    .await
    .unwrap();

    let record = admin::fetch_record(&state.db, project, id).await.unwrap();
    assert_eq!(record["title"], json!("Crate"));
    assert_eq!(record["featured"], json!(true));
    assert_eq!(record["live_url"], Value::Null);

    admin::update_record(&state.db, project, id, &bytes(json!({"title": "Renamed"})))
        .await
        .unwrap();
    let record = admin::fetch_record(&state.db, project, id).await.unwrap();
    assert_eq!(record["title"], json!("Renamed"));

    admin::delete_record(&state.db, project, id).await.unwrap();
    assert!(matches!(
        admin::fetch_record(&state.db, project, id).await,
        Err(AdminError::NotFound(_))
    ));
    assert!(matches!(
        admin::delete_record(&state.db, project, id).await,
        Err(AdminError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_create_rejects_bad_input() {
    let (state, _mailer) = memory_state().await;
    let project = model("project");

    let missing = admin::create_record(&state.db, project, &bytes(json!({"title": "x"}))).await;
    assert!(matches!(missing, Err(AdminError::Invalid(_))));

    let unknown = admin::create_record(
        &state.db,
        model("site-settings"),
        &bytes(json!({"colour": "red"})),
    )
    .await;
    match unknown {
        Err(AdminError::Invalid(message)) => assert!(message.contains("colour")),
        other => panic!("expected invalid, got {:?}", other.map(|_| ())),
    }

    let bad_url = admin::create_record(
        &state.db,
        project,
        &bytes(json!({
            "title": "Crate",
            "description": "A crate",
            "github_url": "github.com/me",
            "technologies": "Rust",
        })),
    )
    .await;
    assert!(matches!(bad_url, Err(AdminError::Invalid(_))));
    assert_eq!(count(&state.db, "project").await, 0);
}

#[tokio::test]
async fn test_singletons_and_policies() {
    let (state, _mailer) = memory_state().await;
    let settings_model = model("site-settings");

    let id = admin::create_record(&state.db, settings_model, b"{}")
        .await
        .unwrap();
    let second = admin::create_record(&state.db, settings_model, b"{}").await;
    assert_eq!(second.unwrap_err().status_code(), 400);

    let delete = admin::delete_record(&state.db, settings_model, id).await;
    assert_eq!(delete.unwrap_err().status_code(), 403);

    seed_profile(&state.db, "Ada").await;
    let another_profile = admin::create_record(
        &state.db,
        model("profile"),
        &bytes(json!({"name": "Bob", "email": "bob@example.com"})),
    )
    .await;
    assert_eq!(another_profile.unwrap_err().status_code(), 400);

    let add_message = admin::create_record(
        &state.db,
        model("contact-message"),
        &bytes(json!({"is_read": true})),
    )
    .await;
    assert_eq!(add_message.unwrap_err().status_code(), 403);
}

#[tokio::test]
async fn test_contact_message_only_read_flag_is_editable() {
    let (state, _mailer) = memory_state().await;
    let id = state
        .db
        .insert(
            "INSERT INTO contact_message (sender_email, subject, message) VALUES (?, ?, ?)",
            &["a@b.com".into(), "Hello".into(), "Hi".into()],
        )
        .await
        .unwrap();
    let messages = model("contact-message");

    let edit = admin::update_record(&state.db, messages, id, &bytes(json!({"subject": "x"}))).await;
    assert!(matches!(edit, Err(AdminError::Invalid(_))));

    admin::update_record(&state.db, messages, id, &bytes(json!({"is_read": true})))
        .await
        .unwrap();
    let record = admin::fetch_record(&state.db, messages, id).await.unwrap();
    assert_eq!(record["is_read"], json!(true));
    assert_eq!(record["subject"], json!("Hello"));
}

#[tokio::test]
async fn test_unique_and_foreign_key_violations_are_bad_requests() {
    let (state, _mailer) = memory_state().await;
    let skill = model("skill");
    let body = bytes(json!({"name": "Rust", "category": "languages", "proficiency_level": 4}));
    admin::create_record(&state.db, skill, &body).await.unwrap();
    let duplicate = admin::create_record(&state.db, skill, &body).await;
    assert_eq!(duplicate.unwrap_err().status_code(), 400);

    let note = admin::create_record(
        &state.db,
        model("study-note"),
        &bytes(json!({"book_title": "SICP", "book_author": "Abelson", "total_chapters": 5})),
    )
    .await
    .unwrap();
    let chapter = model("study-chapter");
    let chapter_body = bytes(json!({"study_note_id": note, "chapter_number": 1, "title": "Intro"}));
    admin::create_record(&state.db, chapter, &chapter_body)
        .await
        .unwrap();
    let again = admin::create_record(&state.db, chapter, &chapter_body).await;
    assert_eq!(again.unwrap_err().status_code(), 400);

    let orphan = admin::create_record(
        &state.db,
        chapter,
        &bytes(json!({"study_note_id": 4242, "chapter_number": 1, "title": "Lost"})),
    )
    .await;
    assert_eq!(orphan.unwrap_err().status_code(), 400);
}

#[tokio::test]
async fn test_list_search_filters_and_progress_column() {
    let (state, _mailer) = memory_state().await;
    seed_book(&state.db, "Dune", "fiction", true).await;
    seed_book(&state.db, "SICP", "technical", false).await;
    let books = model("book");

    let all = admin::list_records(&state.db, books, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let mut query = HashMap::new();
    query.insert("q".to_string(), "dun".to_string());
    let found = admin::list_records(&state.db, books, &ListQuery::from_query(books, &query))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["title"], json!("Dune"));

    let mut query = HashMap::new();
    query.insert("category".to_string(), "technical".to_string());
    query.insert("author".to_string(), "ignored".to_string());
    let filtered = admin::list_records(&state.db, books, &ListQuery::from_query(books, &query))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["title"], json!("SICP"));
    assert_eq!(
        admin::display_cell(books, "category", filtered[0].get("category")),
        "Technical"
    );

    let notes = model("study-note");
    admin::create_record(
        &state.db,
        notes,
        &bytes(json!({
            "book_title": "SICP",
            "book_author": "Abelson",
            "total_chapters": 3,
            "completed_chapters": 2,
        })),
    )
    .await
    .unwrap();
    let rows = admin::list_records(&state.db, notes, &ListQuery::default())
        .await
        .unwrap();
    assert_eq!(rows[0]["progress"], json!("66%"));
}

#[tokio::test]
async fn test_list_search_matches_wildcards_literally() {
    let (state, _mailer) = memory_state().await;
    seed_book(&state.db, "snake_case", "technical", false).await;
    seed_book(&state.db, "snakeXcase", "technical", false).await;
    seed_book(&state.db, "100% Rust", "technical", false).await;
    let books = model("book");

    for (q, expected) in [("e_c", vec!["snake_case"]), ("0%", vec!["100% Rust"])] {
        let mut query = HashMap::new();
        query.insert("q".to_string(), q.to_string());
        let found = admin::list_records(&state.db, books, &ListQuery::from_query(books, &query))
            .await
            .unwrap();
        let titles: Vec<&str> = found.iter().filter_map(|r| r["title"].as_str()).collect();
        assert_eq!(titles, expected, "search {:?}", q);
    }
}

#[tokio::test]
async fn test_admin_http_envelopes() {
    let (state, _mailer) = memory_state().await;
    let router = app::build_router(state);
    let auth = |req: Request| req.with_header("Authorization", "Bearer secret");

    let resp = router
        .dispatch(auth(Request::new(Method::Post, "/admin/blog-post/").with_body(
            json!({
                "title": "Post",
                "description": "About things",
                "medium_url": "https://medium.com/p",
                "tags": "rust, web",
                "published_date": "2025-01-31",
            })
            .to_string(),
        )))
        .await;
    assert_eq!(resp.status_code, 201);
    let created: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(created["success"], json!(true));
    let id = created["id"].as_i64().unwrap();

    let resp = router
        .dispatch(auth(Request::new(Method::Get, &format!("/admin/blog-post/{}/", id))))
        .await;
    assert_eq!(resp.status_code, 200);
    let record: Value = serde_json::from_str(&resp.body).unwrap();
    assert_eq!(record["published_date"], json!("2025-01-31"));

    let resp = router
        .dispatch(auth(Request::new(Method::Get, "/admin/nothing/")))
        .await;
    assert_eq!(resp.status_code, 404);

    let resp = router
        .dispatch(auth(Request::new(Method::Get, "/admin/blog-post/999/")))
        .await;
    assert_eq!(resp.status_code, 404);

    let resp = router
        .dispatch(auth(Request::new(
            Method::Post,
            &format!("/admin/blog-post/{}/delete/", id),
        )))
        .await;
    assert_eq!(resp.status_code, 200);

    let resp = router
        .dispatch(auth(Request::new(Method::Get, "/admin/blog-post/")))
        .await;
    assert_eq!(resp.status_code, 200);
    assert!(resp.body.contains("No records."));
}

#[test]
fn test_validate_value_rules() {
    let skill = model("skill");
    let level = skill.field("proficiency_level").unwrap();
    assert_eq!(validate_value(level, &json!(4)), Ok(SqlValue::Integer(4)));
    assert!(validate_value(level, &json!(5)).is_err());

    let book = model("book");
    let rating = book.field("rating").unwrap();
    assert_eq!(validate_value(rating, &json!("3")), Ok(SqlValue::Integer(3)));
    assert!(validate_value(rating, &json!(0)).is_err());
    assert_eq!(validate_value(rating, &Value::Null), Ok(SqlValue::Null));

    let kind = model("appointment-type");
    let duration = kind.field("duration").unwrap();
    assert!(validate_value(duration, &json!(45)).is_ok());
    assert!(validate_value(duration, &json!(50)).is_err());

    let appointment = model("appointment");
    let status = appointment.field("status").unwrap();
    assert!(validate_value(status, &json!("confirmed")).is_ok());
    assert!(validate_value(status, &json!("maybe")).is_err());
    let email = appointment.field("client_email").unwrap();
    assert!(validate_value(email, &json!("not-an-email")).is_err());
    assert!(validate_value(email, &json!("")).is_err());
}
