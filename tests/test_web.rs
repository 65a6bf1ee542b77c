//! Router-level tests: JSON API and HTML pages against the echo provider.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::Router;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use medagent::agents::orchestrator::Orchestrator;
use medagent::config::Config;
use medagent::llm::LlmProvider;
use medagent::llm::providers::dummy::DummyProvider;
use medagent::report::store::LogStore;
use medagent::web::{AppState, build_router};

struct TestApp {
    _dir: TempDir,
    router: Router,
    store: LogStore,
}

fn app_with(provider: DummyProvider) -> TestApp {
    app_with_timeout(provider, None)
}

fn app_with_timeout(provider: DummyProvider, timeout: Option<Duration>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let cfg = Config::offline(dir.path());
    let store = LogStore::open(&cfg.logs.dir, &cfg.logs.reports_dir).unwrap();
    let orch = Orchestrator::new(LlmProvider::Dummy(provider), store.clone(), &cfg.agents);
    let mut state = AppState::new(Arc::new(orch), &cfg.web);
    if let Some(t) = timeout {
        state.request_timeout = t;
    }
    TestApp { _dir: dir, router: build_router(state), store }
}

/// Provider that takes far longer than the request timeout.
fn hanging_app() -> TestApp {
    app_with_timeout(DummyProvider::slow(Duration::from_secs(30)), Some(Duration::from_millis(50)))
}

fn app() -> TestApp {
    app_with(DummyProvider::echo())
}

async fn send(app: &TestApp, req: Request<Body>) -> Response {
    app.router.clone().oneshot(req).await.unwrap()
}

async fn body_string(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::get(uri);
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_form(uri: &str, body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut b = Request::post(uri).header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie {
        b = b.header(header::COOKIE, c);
    }
    b.body(Body::from(body.to_string())).unwrap()
}

fn patient() -> Value {
    json!({ "name": "Asha", "age": 54, "gender": "Female", "symptoms": "chest pain on exertion" })
}

/// `name=value` part of the response's `Set-Cookie` header.
fn session_cookie(resp: &Response) -> String {
    let raw = resp.headers().get(header::SET_COOKIE).expect("set-cookie").to_str().unwrap();
    raw.split(';').next().unwrap().to_string()
}

// ── JSON API ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_provider() {
    let app = app();
    let resp = send(&app, get("/api/health", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "dummy");
    assert_eq!(body["model"], "echo");
    assert_eq!(body["api_key_present"], true);
}

#[tokio::test]
async fn analyze_returns_record_and_writes_logs() {
    let app = app();
    let resp = send(&app, post_json("/api/analyze", patient())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let rec = body_json(resp).await;

    let id = rec["session_id"].as_str().unwrap();
    assert!(id.starts_with("diag_"));
    assert_eq!(
        rec["report_text"],
        "Patient: Asha, Age: 54, Gender: Female. Symptoms: chest pain on exertion"
    );
    for key in ["GeneralPhysician", "Cardiologist", "Pulmonologist", "Psychologist", "Neurologist", "Final"] {
        assert!(rec["outputs"][key].as_str().unwrap().starts_with("[echo]"), "{key}");
    }
    assert_eq!(rec["conversation_history"].as_array().unwrap().len(), 6);

    let paths = app.store.paths(id);
    let on_disk: Value = serde_json::from_str(&std::fs::read_to_string(&paths.json).unwrap()).unwrap();
    assert_eq!(on_disk["session_id"], id);
    assert_eq!(on_disk["outputs"]["Final"], rec["outputs"]["Final"]);
    let txt = std::fs::read_to_string(&paths.txt).unwrap();
    assert!(txt.starts_with("=== MedAgent Diagnosis Log ==="));
    assert!(txt.contains("--- Final ---"));
}

#[tokio::test]
async fn analyze_rejects_incomplete_form() {
    let app = app();
    let mut body = patient();
    body["gender"] = json!("Select");
    let resp = send(&app, post_json("/api/analyze", body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err = body_json(resp).await;
    assert_eq!(err["error"], "invalid_request");
    assert_eq!(err["message"], "Please complete the form (name, gender, and symptoms).");

    let resp = send(&app, post_json("/api/analyze", json!({ "name": "x" }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn analyze_maps_provider_failure_to_bad_gateway() {
    let app = app_with(DummyProvider::failing("API key not valid"));
    let resp = send(&app, post_json("/api/analyze", patient())).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let err = body_json(resp).await;
    assert_eq!(err["error"], "provider");
    assert!(err["message"].as_str().unwrap().contains("API key not valid"));
    assert!(app.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn analyze_times_out_with_gateway_timeout() {
    let app = hanging_app();
    let resp = send(&app, post_json("/api/analyze", patient())).await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    let err = body_json(resp).await;
    assert_eq!(err["error"], "timeout");
    assert_eq!(err["message"], "analysis timed out");
    assert!(app.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn followup_is_answered_and_persisted() {
    let app = app();
    let rec = body_json(send(&app, post_json("/api/analyze", patient())).await).await;
    let id = rec["session_id"].as_str().unwrap().to_string();

    let resp = send(
        &app,
        post_json(
            &format!("/api/sessions/{id}/followup"),
            json!({ "agent": "cardio", "question": "Is an echo needed?" }),
        ),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let f = body_json(resp).await;
    assert_eq!(f["agent"], "cardio");
    assert!(f["answer"].as_str().unwrap().starts_with("[echo] You are Cardiologist."));

    let detail = body_json(send(&app, get(&format!("/api/sessions/{id}"), None)).await).await;
    assert_eq!(detail["followups"].as_array().unwrap().len(), 1);
    assert_eq!(detail["followups"][0]["question"], "Is an echo needed?");
}

#[tokio::test]
async fn followup_errors() {
    let app = app();
    let rec = body_json(send(&app, post_json("/api/analyze", patient())).await).await;
    let id = rec["session_id"].as_str().unwrap().to_string();

    let resp = send(
        &app,
        post_json(&format!("/api/sessions/{id}/followup"), json!({ "agent": "derm", "question": "?" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
        &app,
        post_json(&format!("/api/sessions/{id}/followup"), json!({ "agent": "final", "question": "  " })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["message"], "Please type a question.");

    let resp = send(
        &app,
        post_json("/api/sessions/diag_19990101_000000/followup", json!({ "agent": "final", "question": "why?" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_are_listed_and_unknown_ids_are_not_found() {
    let app = app();
    send(&app, post_json("/api/analyze", patient())).await;
    send(&app, post_json("/api/analyze", patient())).await;

    let list = body_json(send(&app, get("/api/sessions", None)).await).await;
    let sessions = list["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_ne!(sessions[0]["session_id"], sessions[1]["session_id"]);

    let resp = send(&app, get("/api/sessions/not-a-session", None)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ── HTML pages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn index_sets_cookie_and_renders_form() {
    let app = app();
    let resp = send(&app, get("/", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(session_cookie(&resp).starts_with("medagent_session="));
    let html = body_string(resp).await;
    assert!(html.contains("Run Multi-Agent Analysis"));
    assert!(html.contains("value=\"30\""));
}

#[tokio::test]
async fn analyze_page_flow_through_followup_logs_and_download() {
    let app = app();
    let resp = send(
        &app,
        post_form("/analyze", "name=Asha&age=54&gender=Female&symptoms=chest+pain+%3Cb%3E", None),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let html = body_string(resp).await;
    assert!(html.contains("Analysis complete"));
    assert!(html.contains("Final Multidisciplinary Diagnosis"));
    assert!(html.contains("chest pain &lt;b&gt;"));
    assert!(!html.contains("chest pain <b>"));

    let id = app.store.list().unwrap()[0].session_id.clone();

    // The cookie carries the result to the other pages.
    let html = body_string(send(&app, get("/", Some(&cookie))).await).await;
    assert!(html.contains(&id));

    let html = body_string(send(&app, get("/followup", Some(&cookie))).await).await;
    assert!(html.contains("Ask which agent?"));

    let resp = send(&app, post_form("/followup", "agent=neuro&question=Is+an+MRI+needed%3F", Some(&cookie))).await;
    let html = body_string(resp).await;
    assert!(html.contains("Answer from Neurologist"));
    assert_eq!(app.store.load(&id).unwrap().followups.len(), 1);

    let html = body_string(send(&app, get("/download", Some(&cookie))).await).await;
    assert!(html.contains(&format!("/sessions/{id}/pdf")));

    let html = body_string(send(&app, get("/logs", Some(&cookie))).await).await;
    assert!(html.contains(&format!("<strong>Session ID:</strong> {id}")));
    assert!(html.contains("Download TXT (readable)"));
    assert!(html.contains("Download JSON (developer)"));
}

#[tokio::test]
async fn analyze_page_shows_warning_and_error() {
    let app = app();
    let html = body_string(send(&app, post_form("/analyze", "name=&age=30&gender=Male&symptoms=cough", None)).await).await;
    assert!(html.contains("Please complete the form (name, gender, and symptoms)."));

    let html = body_string(send(&app, post_form("/analyze", "name=A&age=abc&gender=Male&symptoms=cough", None)).await).await;
    assert!(html.contains("Age must be a whole number"));

    let failing = app_with(DummyProvider::failing("quota exceeded"));
    let resp = send(&failing, post_form("/analyze", "name=A&age=30&gender=Male&symptoms=cough", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("Error running agents:"));
    assert!(html.contains("quota exceeded"));
}

#[tokio::test]
async fn analyze_page_reports_timeout() {
    let app = hanging_app();
    let resp = send(&app, post_form("/analyze", "name=A&age=30&gender=Male&symptoms=cough", None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_string(resp).await;
    assert!(html.contains("notice error"));
    assert!(html.contains("Error running agents: analysis timed out"));
    assert!(app.store.list().unwrap().is_empty());
}

#[tokio::test]
async fn pages_without_a_result_say_so() {
    let app = app();
    let html = body_string(send(&app, get("/followup", None)).await).await;
    assert!(html.contains("Run an analysis first on the &#39;Report &amp; Analyze&#39; page."));
    let html = body_string(send(&app, get("/download", None)).await).await;
    assert!(html.contains("No result to download yet."));
    let html = body_string(send(&app, get("/logs", None)).await).await;
    assert!(html.contains("No previous sessions in this browser session."));
}

#[tokio::test]
async fn artifacts_download_with_filenames() {
    let app = app();
    let rec = body_json(send(&app, post_json("/api/analyze", patient())).await).await;
    let id = rec["session_id"].as_str().unwrap().to_string();

    let resp = send(&app, get(&format!("/sessions/{id}/txt"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{id}.txt\"").as_str()
    );
    assert!(body_string(resp).await.contains("=== Report ==="));

    let resp = send(&app, get(&format!("/sessions/{id}/json"), None)).await;
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");

    assert_eq!(send(&app, get(&format!("/sessions/{id}/exe"), None)).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(send(&app, get("/sessions/passwd/txt", None)).await.status(), StatusCode::NOT_FOUND);
}

#[cfg(feature = "pdf")]
#[tokio::test]
async fn pdf_is_generated_on_request() {
    let app = app();
    let rec = body_json(send(&app, post_json("/api/analyze", patient())).await).await;
    let id = rec["session_id"].as_str().unwrap().to_string();
    assert!(!app.store.paths(&id).pdf.exists());

    let resp = send(&app, get(&format!("/sessions/{id}/pdf"), None)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert!(app.store.paths(&id).pdf.exists());
    assert!(app.store.paths(&id).pdf.ends_with(format!("MedAgent_{id}.pdf")));
}
