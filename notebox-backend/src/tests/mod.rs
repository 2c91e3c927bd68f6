use crate::{build_app, AppState, SharedState};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, RANGE};
use axum::http::HeaderValue;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::*;
use notebox_shared::api::{CreatedNotes, DeletedNote, Health, NoteList};
use notebox_shared::note::{Note, NoteType};
use serde_json::json;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use tracing::info;

static INIT: Once = Once::new();

const DEFAULT_TEST_LIMIT: usize = 1024 * 1024;

struct TestApp {
    server: TestServer,
    state: SharedState,
    // holds the uploads and static directories until the test ends
    dir: TempDir,
}

async fn setup_test_server() -> TestApp {
    setup_test_server_with_limit(DEFAULT_TEST_LIMIT).await
}

async fn setup_test_server_with_limit(max_file_bytes: usize) -> TestApp {
    INIT.call_once(|| {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                "notebox_backend=debug,tower_http=debug",
            ))
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let state = Arc::new(AppState::test(dir.path(), max_file_bytes).await);
    let app = build_app(&state);

    let config = TestServerConfig {
        expect_success_by_default: true,
        restrict_requests_with_http_schema: false,
        default_content_type: None,
        default_scheme: Some("http".into()),
        ..Default::default()
    };

    TestApp {
        server: TestServer::new_with_config(app, config).unwrap(),
        state,
        dir,
    }
}

impl TestApp {
    async fn create_json(&self, body: serde_json::Value) -> CreatedNotes {
        let res = self.server.post("/api/notes").json(&body).await;
        res.assert_status(axum::http::StatusCode::CREATED);
        res.json()
    }

    async fn create_text(&self, content: &str) -> Note {
        let mut created = self.create_json(json!({ "content": content })).await;
        created.notes.remove(0)
    }

    async fn list(&self, query: &str) -> NoteList {
        self.server
            .get(&format!("/api/notes{query}"))
            .await
            .json()
    }

    fn uploaded_files(&self) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.state.uploads.root())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

fn text_part(content: &'static [u8], file_name: &str, mime: &str) -> Part {
    Part::bytes(content.to_vec())
        .file_name(file_name.to_string())
        .mime_type(mime.to_string())
}

#[tokio::test]
async fn test_failing_setup_server() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, b"not a directory").unwrap();

    crate::storage::start_db(Some(&blocker.join("notes.db")))
        .await
        .expect_err("Should fail to open DB");
}

#[tokio::test]
async fn test_api_health() {
    let app = setup_test_server().await;
    let health: Health = app.server.get("/api/health").await.json();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.note_count, 0);
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

    app.create_text("one").await;
    let health: Health = app.server.get("/api/health").await.json();
    assert_eq!(health.note_count, 1);
}

#[tokio::test]
async fn test_api_create_and_get() {
    let app = setup_test_server().await;

    let created = app
        .create_json(json!({
            "content": "  keep my   spacing ",
            "tags": "home, urgent,,",
        }))
        .await;
    assert_eq!(created.count, 1);
    let note = &created.notes[0];
    assert_eq!(note.note_type, NoteType::Text);
    assert_eq!(note.content.as_deref(), Some("  keep my   spacing "));
    assert_eq!(note.tags.as_deref(), Some("home, urgent,,"));
    assert_eq!(note.tag_list, vec!["home", "urgent"]);
    assert_eq!(note.file_url, None);

    let fetched: Note = app
        .server
        .get(&format!("/api/notes/{}", note.id))
        .await
        .json();
    assert_eq!(&fetched, note);
}

#[tokio::test]
async fn test_api_example_scenario() {
    let app = setup_test_server().await;

    let note = app
        .create_json(json!({
            "note_type": "text",
            "content": "buy milk",
            "tags": "errand",
        }))
        .await
        .notes
        .remove(0);
    assert_eq!(note.id, 1);

    let list = app.list("?search=milk").await;
    assert_eq!(list.total, 1);
    assert_eq!(list.items[0].id, 1);

    let deleted: DeletedNote = app.server.delete("/api/notes/1").await.json();
    assert_eq!(deleted.id, 1);
    assert_eq!(deleted.file_removed, None);

    let res = app.server.get("/api/notes/1").expect_failure().await;
    assert_eq!(res.status_code(), 404);
    let body: serde_json::Value = res.json();
    assert!(body["error"].is_string());

    let res = app.server.delete("/api/notes/1").expect_failure().await;
    assert_eq!(res.status_code(), 404);
}

#[tokio::test]
async fn test_api_validation_errors() {
    let app = setup_test_server().await;

    for body in [
        json!({}),
        json!({ "content": "   " }),
        json!({ "note_type": "video", "content": "x" }),
        json!({ "note_type": "text" }),
        json!({ "note_type": "link", "link": "\u{200B}" }),
        json!({ "note_type": "file", "content": "no files in json" }),
    ] {
        info!("posting {}", body);
        let res = app
            .server
            .post("/api/notes")
            .json(&body)
            .expect_failure()
            .await;
        assert_eq!(res.status_code(), 400, "{body}");
        let err: serde_json::Value = res.json();
        assert!(err["error"].is_string());
    }

    let res = app
        .server
        .get("/api/notes/not-a-number")
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 400);

    let res = app
        .server
        .get("/api/notes?limit=lots")
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 400);

    assert_eq!(app.list("").await.total, 0);
}

#[tokio::test]
async fn test_api_link_notes() {
    let app = setup_test_server().await;

    // urlencoded, type detected from the link field
    let res = app
        .server
        .post("/api/notes")
        .form(&[("link", "https://example.com/\u{200B}page"), ("tags", "web")])
        .await;
    res.assert_status(axum::http::StatusCode::CREATED);
    let created: CreatedNotes = res.json();
    let note = &created.notes[0];
    assert_eq!(note.note_type, NoteType::Link);
    assert_eq!(note.content.as_deref(), Some("https://example.com/page"));

    // explicit type with the URL in content
    let note = app
        .create_json(json!({ "note_type": "LINK", "content": " https://rust-lang.org " }))
        .await
        .notes
        .remove(0);
    assert_eq!(note.note_type, NoteType::Link);
    assert_eq!(note.content.as_deref(), Some("https://rust-lang.org"));
}

#[tokio::test]
async fn test_api_file_upload_and_serve() {
    let app = setup_test_server().await;

    let form = MultipartForm::new()
        .add_text("content", "shopping list")
        .add_text("tags", "errand")
        .add_part("files", text_part(b"milk\neggs\n", "list.txt", "text/plain"));
    let res = app.server.post("/api/notes").multipart(form).await;
    res.assert_status(axum::http::StatusCode::CREATED);
    let created: CreatedNotes = res.json();
    assert_eq!(created.count, 1);

    let note = &created.notes[0];
    assert_eq!(note.note_type, NoteType::File);
    assert_eq!(note.content.as_deref(), Some("shopping list"));
    assert_eq!(note.file_name.as_deref(), Some("list.txt"));
    assert_eq!(note.mime_type.as_deref(), Some("text/plain"));
    let file_path = note.file_path.clone().expect("file_path");
    assert!(file_path.ends_with(".txt"));
    assert_eq!(note.file_url, Some(format!("/files/{file_path}")));
    assert_eq!(app.uploaded_files().len(), 1);

    let file_url = note.file_url.clone().unwrap();
    let res = app.server.get(&file_url).await;
    assert_eq!(res.as_bytes().as_ref(), b"milk\neggs\n");
    assert!(res.header(CONTENT_TYPE).to_str().unwrap().starts_with("text/plain"));
    let disposition = res.header(CONTENT_DISPOSITION);
    let disposition = disposition.to_str().unwrap();
    assert!(disposition.starts_with("inline"));
    assert!(disposition.contains("list.txt"));

    let res = app.server.get(&format!("{file_url}?download=true")).await;
    let disposition = res.header(CONTENT_DISPOSITION);
    assert!(disposition.to_str().unwrap().starts_with("attachment"));

    let res = app
        .server
        .get(&file_url)
        .add_header(RANGE, HeaderValue::from_static("bytes=0-3"))
        .await;
    assert_eq!(res.status_code(), 206);
    assert_eq!(res.as_bytes().as_ref(), b"milk");

    // searchable by the original filename
    assert_eq!(app.list("?search=LIST.TXT").await.total, 1);
}

#[tokio::test]
async fn test_api_multi_file_upload() {
    let app = setup_test_server().await;

    let form = MultipartForm::new()
        .add_text("tags", "scans")
        .add_part("files", text_part(b"first", "a.txt", "text/plain"))
        .add_part("files", text_part(b"second", "b.md", "text/markdown"))
        // an empty file input is ignored
        .add_part("files", Part::bytes(Vec::new()).file_name(""));
    let res = app.server.post("/api/notes").multipart(form).await;
    res.assert_status(axum::http::StatusCode::CREATED);
    let created: CreatedNotes = res.json();
    assert_eq!(created.count, 2);
    assert_ne!(created.notes[0].id, created.notes[1].id);
    assert_ne!(created.notes[0].file_path, created.notes[1].file_path);
    for note in &created.notes {
        assert_eq!(note.note_type, NoteType::File);
        assert_eq!(note.tags.as_deref(), Some("scans"));
        assert_eq!(note.content, None);
    }

    assert_eq!(app.list("").await.total, 2);
    assert_eq!(app.uploaded_files().len(), 2);
}

#[tokio::test]
async fn test_api_upload_over_limit() {
    let app = setup_test_server_with_limit(16).await;

    let form = MultipartForm::new()
        .add_part("files", text_part(b"small", "ok.txt", "text/plain"))
        .add_part(
            "files",
            text_part(b"this is more than sixteen bytes", "big.txt", "text/plain"),
        );
    let res = app
        .server
        .post("/api/notes")
        .multipart(form)
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 413);
    let err: serde_json::Value = res.json();
    assert!(err["error"].as_str().unwrap().contains("big.txt"));

    assert_eq!(app.list("").await.total, 0);
    assert!(app.uploaded_files().is_empty());

    // exactly at the limit is fine
    let form = MultipartForm::new().add_part(
        "files",
        text_part(b"sixteen bytes!!!", "edge.txt", "text/plain"),
    );
    app.server
        .post("/api/notes")
        .multipart(form)
        .await
        .assert_status(axum::http::StatusCode::CREATED);
}

#[tokio::test]
async fn test_api_body_over_route_limit() {
    let app = setup_test_server_with_limit(16).await;
    let body_limit = app.state.max_body_bytes();

    // the text field alone is past the body limit, so the reader fails
    // before any per-file check gets a look
    let form = MultipartForm::new()
        .add_part("files", text_part(b"tiny", "tiny.txt", "text/plain"))
        .add_text("content", "x".repeat(body_limit + 1024));
    let res = app
        .server
        .post("/api/notes")
        .multipart(form)
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 413);
    let err: serde_json::Value = res.json();
    assert!(err["error"].is_string());

    assert_eq!(app.list("").await.total, 0);
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn test_api_too_many_files() {
    let app = setup_test_server().await;

    let form = (0..=crate::notes::MAX_FILES_PER_REQUEST).fold(MultipartForm::new(), |form, n| {
        form.add_part(
            "files",
            Part::bytes(b"x".to_vec()).file_name(format!("{n}.txt")),
        )
    });
    let res = app
        .server
        .post("/api/notes")
        .multipart(form)
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 400);
    assert!(app.uploaded_files().is_empty());
}

#[tokio::test]
async fn test_api_list_order_and_pagination() {
    let app = setup_test_server().await;
    for n in 1..=5 {
        app.create_text(&format!("note {n}")).await;
    }

    let list = app.list("").await;
    assert_eq!(list.total, 5);
    assert!(!list.has_more);
    let contents: Vec<_> = list
        .items
        .iter()
        .filter_map(|n| n.content.as_deref())
        .collect();
    assert_eq!(
        contents,
        vec!["note 5", "note 4", "note 3", "note 2", "note 1"]
    );
    assert!(list
        .items
        .windows(2)
        .all(|pair| pair[0].created_at >= pair[1].created_at));

    let page = app.list("?page=2&page_size=2").await;
    assert_eq!(page.total, 5);
    assert_eq!(page.offset, 2);
    assert_eq!(page.page, 2);
    assert!(page.has_more);
    assert_eq!(page.items[0].content.as_deref(), Some("note 3"));
    assert_eq!(page.items[1].content.as_deref(), Some("note 2"));

    let last = app.list("?offset=4&limit=2").await;
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_more);

    let clamped = app.list("?limit=100000").await;
    assert_eq!(clamped.limit, notebox_shared::api::MAX_LIMIT);

    // offsets past anything SQLite can bind are clamped, not a crash
    for query in [
        "?offset=18446744073709551615",
        "?page=18446744073709551615&page_size=500",
    ] {
        let far = app.list(query).await;
        assert_eq!(far.total, 5, "{query}");
        assert!(far.items.is_empty(), "{query}");
        assert!(!far.has_more, "{query}");
        assert_eq!(far.offset, notebox_shared::api::MAX_OFFSET, "{query}");
    }
}

#[tokio::test]
async fn test_api_search() {
    let app = setup_test_server().await;
    app.create_json(json!({ "content": "Pick up MILK", "tags": "errand" }))
        .await;
    app.create_json(json!({ "content": "dentist", "tags": "Health" }))
        .await;
    app.create_json(json!({ "content": "50% off sale" })).await;
    app.create_json(json!({ "content": "Émile called" })).await;

    let list = app.list("?search=milk").await;
    assert_eq!(list.total, 1);
    assert_eq!(list.items[0].content.as_deref(), Some("Pick up MILK"));

    assert_eq!(app.list("?search=health").await.total, 1);
    assert_eq!(app.list("?search=%25").await.total, 1);
    assert_eq!(app.list("?search=nothing").await.total, 0);

    let list = app.list("?search=%C3%89mile").await;
    assert_eq!(list.total, 1);
    assert_eq!(list.items[0].content.as_deref(), Some("Émile called"));
    assert_eq!(app.list("?search=%C3%89MILE").await.total, 1);

    // blank search is no search
    assert_eq!(app.list("?search=%20").await.total, 4);
}

#[tokio::test]
async fn test_api_file_traversal() {
    let app = setup_test_server().await;
    std::fs::write(app.dir.path().join("secret.txt"), b"secret").unwrap();

    for path in [
        "/files/..%2Fsecret.txt",
        "/files/..%2F..%2Fetc%2Fpasswd",
        "/files/..%5Csecret.txt",
    ] {
        let res = app.server.get(path).expect_failure().await;
        assert_eq!(res.status_code(), 400, "{path}");
    }

    // present on disk but not attached to any note
    std::fs::write(app.state.uploads.root().join("stray.txt"), b"stray").unwrap();
    let res = app.server.get("/files/stray.txt").expect_failure().await;
    assert_eq!(res.status_code(), 404);

    let res = app.server.get("/files/missing.txt").expect_failure().await;
    assert_eq!(res.status_code(), 404);

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(
            app.dir.path().join("secret.txt"),
            app.state.uploads.root().join("escape.txt"),
        )
        .unwrap();
        let res = app.server.get("/files/escape.txt").expect_failure().await;
        assert_eq!(res.status_code(), 403);
    }
}

#[tokio::test]
async fn test_api_delete_file_note() {
    let app = setup_test_server().await;

    let form = MultipartForm::new().add_part("file", text_part(b"bye", "bye.txt", "text/plain"));
    let created: CreatedNotes = app.server.post("/api/notes").multipart(form).await.json();
    let note = &created.notes[0];
    let file_url = note.file_url.clone().unwrap();
    app.server.get(&file_url).await.assert_status_ok();

    let deleted: DeletedNote = app
        .server
        .delete(&format!("/api/notes/{}", note.id))
        .await
        .json();
    assert_eq!(deleted.file_removed, Some(true));
    assert_eq!(deleted.warning, None);
    assert!(app.uploaded_files().is_empty());

    let res = app.server.get(&file_url).expect_failure().await;
    assert_eq!(res.status_code(), 404);
}

#[tokio::test]
async fn test_api_delete_with_missing_file() {
    let app = setup_test_server().await;

    let form = MultipartForm::new().add_part("file", text_part(b"gone", "gone.txt", "text/plain"));
    let created: CreatedNotes = app.server.post("/api/notes").multipart(form).await.json();
    let note = &created.notes[0];
    for path in app.uploaded_files() {
        std::fs::remove_file(path).unwrap();
    }

    let deleted: DeletedNote = app
        .server
        .delete(&format!("/api/notes/{}", note.id))
        .await
        .json();
    assert_eq!(deleted.file_removed, Some(false));
    assert!(deleted.warning.is_some());

    let res = app
        .server
        .get(&format!("/api/notes/{}", note.id))
        .expect_failure()
        .await;
    assert_eq!(res.status_code(), 404);
}

#[tokio::test]
async fn test_api_static_and_docs() {
    let app = setup_test_server().await;
    let static_dir = app.dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), b"<h1>notes</h1>").unwrap();

    let res = app.server.get("/").await;
    assert_eq!(res.text(), "<h1>notes</h1>");

    let res = app.server.get("/static/index.html").await;
    assert_eq!(res.text(), "<h1>notes</h1>");

    let doc: serde_json::Value = app.server.get("/api/openapi.json").await.json();
    assert!(doc["paths"]["/api/notes"].is_object());
}
