use axum::{
    extract::{Path, State},
    http::header,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

const PAGE: &str = "<html><body><nav>Sections</nav><div class=\"article-body\">\
    <p>The transit agency announced on Monday that weekend service on the north line will pause for repairs.</p>\
    <p>Officials claimed the closure will cost riders nothing, although fares for the shuttle buses remain unclear.</p>\
    <p>Work is expected to finish before the holidays, according to the agency's published schedule.</p>\
    </div></body></html>";

const REPLY: &str = "SCORE: 7\nBIAS: Center, Low\nQUOTES:\n\
    - \"the closure will cost riders nothing\" — Shuttle fares are not settled.\n\
    SUMMARY: Largely accurate.";

#[derive(Clone, Default)]
struct Seen {
    models: Arc<Mutex<Vec<String>>>,
    keys: Arc<Mutex<Vec<String>>>,
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route(
            "/news",
            get(|| async { ([(header::CONTENT_TYPE, "text/html")], PAGE) }),
        )
        .route("/empty", get(|| async { "<html><body><p>Short.</p></body></html>" }))
        .route(
            "/v1beta/models/:action",
            post(
                |State(seen): State<Seen>,
                 Path(action): Path<String>,
                 axum::extract::Query(q): axum::extract::Query<std::collections::HashMap<String, String>>| async move {
                    let model = action.trim_end_matches(":generateContent").to_string();
                    seen.models.lock().unwrap().push(model.clone());
                    seen.keys
                        .lock()
                        .unwrap()
                        .push(q.get("key").cloned().unwrap_or_default());
                    if model == "retired" {
                        return (
                            StatusCode::NOT_FOUND,
                            Json(serde_json::json!({"error": {"message": "models/retired is not found"}})),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(serde_json::json!({"candidates": [{"content": {"parts": [{"text": REPLY}]}}]})),
                    )
                },
            ),
        )
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn veracity() -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(assert_cmd::cargo::cargo_bin!("veracity"));
    cmd.env_remove("VERACITY_ENV_FILE")
        .env_remove("VERACITY_GEMINI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env_remove("VERACITY_GEMINI_MODELS")
        .env_remove("VERACITY_TODAY")
        .env("RUST_LOG", "error");
    cmd
}

#[tokio::test]
async fn check_url_falls_back_and_writes_annotated_page() {
    let (base, seen) = serve().await;
    let tmp = tempfile::tempdir().unwrap();
    let html_out = tmp.path().join("out.html");

    let url = format!("{base}/news");
    let out = veracity()
        .args(["check", "--url", url.as_str(), "--models", "retired,good"])
        .arg("--html-out")
        .arg(&html_out)
        .env("VERACITY_GEMINI_API_KEY", "test-key")
        .env("VERACITY_GEMINI_BASE_URL", &base)
        .output()
        .await
        .expect("run veracity check");

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("check json");
    assert_eq!(v["ok"], true);
    assert_eq!(v["score"], 7);
    assert_eq!(v["bias"]["leaning"], "Center");
    assert_eq!(v["strategy"]["kind"], "selector");
    assert_eq!(v["strategy"]["selector"], ".article-body");
    assert_eq!(v["highlights"]["wrapped"].as_array().map(|a| a.len()), Some(1));

    assert_eq!(*seen.models.lock().unwrap(), vec!["retired", "good"]);
    assert!(seen.keys.lock().unwrap().iter().all(|k| k == "test-key"));

    let annotated = std::fs::read_to_string(&html_out).unwrap();
    assert!(annotated.contains(">the closure will cost riders nothing</span>"));
    assert!(annotated.contains("Largely accurate."));
}

#[tokio::test]
async fn check_without_key_fails_before_calling_the_model() {
    let (base, seen) = serve().await;
    let url = format!("{base}/news");
    let out = veracity()
        .args(["check", "--url", url.as_str()])
        .env("VERACITY_GEMINI_BASE_URL", &base)
        .output()
        .await
        .expect("run veracity check");

    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("check json");
    assert_eq!(v["ok"], false);
    assert!(v["error"].as_str().unwrap_or("").starts_with("No API key."));
    assert!(seen.models.lock().unwrap().is_empty());
}

#[tokio::test]
async fn check_page_without_article_reports_no_article() {
    let (base, seen) = serve().await;
    let url = format!("{base}/empty");
    let out = veracity()
        .args(["check", "--output", "text", "--url", url.as_str()])
        .env("VERACITY_GEMINI_API_KEY", "test-key")
        .env("VERACITY_GEMINI_BASE_URL", &base)
        .output()
        .await
        .expect("run veracity check");

    assert!(!out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    assert!(s.contains("Could not find article text on this page."), "{s}");
    assert!(seen.models.lock().unwrap().is_empty());
}

#[tokio::test]
async fn check_reports_fetch_errors_as_envelope() {
    let (base, _seen) = serve().await;
    let url = format!("{base}/missing-page");
    let out = veracity()
        .args(["check", "--url", url.as_str()])
        .env("VERACITY_GEMINI_API_KEY", "test-key")
        .output()
        .await
        .expect("run veracity check");

    assert!(!out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("check json");
    assert_eq!(v["ok"], false);
    assert!(v["error"].as_str().unwrap_or("").contains("404"));
}

#[test]
fn check_reads_saved_file() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    std::fs::write(&page, PAGE).unwrap();

    // No key: the article is still located, then the credential check fails.
    let out = std::process::Command::new(assert_cmd::cargo::cargo_bin!("veracity"))
        .args(["check", "--file"])
        .arg(&page)
        .env_remove("VERACITY_ENV_FILE")
        .env_remove("VERACITY_GEMINI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .output()
        .expect("run veracity check");
    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("check json");
    assert_eq!(v["strategy"]["selector"], ".article-body");
    assert!(v["article_chars"].as_u64().unwrap_or(0) > 200);
}

#[test]
fn check_ignores_malformed_timeout_env() {
    let tmp = tempfile::tempdir().unwrap();
    let page = tmp.path().join("page.html");
    std::fs::write(&page, PAGE).unwrap();

    // Same lenient fallback as doctor: a bad value is not an argument error.
    let out = std::process::Command::new(assert_cmd::cargo::cargo_bin!("veracity"))
        .args(["check", "--file"])
        .arg(&page)
        .env_remove("VERACITY_ENV_FILE")
        .env_remove("VERACITY_GEMINI_API_KEY")
        .env_remove("GEMINI_API_KEY")
        .env("VERACITY_GEMINI_TIMEOUT_MS", "soon")
        .output()
        .expect("run veracity check");
    assert_eq!(out.status.code(), Some(1), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("check json");
    assert_eq!(v["strategy"]["selector"], ".article-body");
    assert!(v["error"].as_str().unwrap_or("").starts_with("No API key."));
}
