//! HTML pages: intake form, follow-ups, downloads and recent logs.
//!
//! Pages are rendered server-side as plain strings. Every piece of patient
//! or model text goes through [`html_escape`]. Per-browser state (last
//! result, recent sessions) comes from [`BrowserSessions`](super::session::BrowserSessions).

use axum::{
    Form,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::warn;

use super::session::{BrowserId, RecentSession};
use super::{AppState, status_for};
use crate::agents::AgentKind;
use crate::error::AppError;
use crate::report::store::Artifact;
use crate::report::{DiagnosisRecord, FollowUp, Gender, MAX_AGE, PatientInput, pdf};

const APP_TITLE: &str = "MedAgent Multi-Agent Assistant";
const DEFAULT_AGE: &str = "30";

const STYLE: &str = r#"
*, *::before, *::after { box-sizing: border-box; }
body { margin: 0; display: flex; min-height: 100vh; background: linear-gradient(135deg, #f3f8ff 0%, #ffffff 100%); color: #012233; font-family: 'Segoe UI', system-ui, sans-serif; }
nav { width: 270px; flex-shrink: 0; padding: 24px 18px; background: linear-gradient(180deg, #0066cc, #66ccff); color: white; font-weight: 700; font-size: 1.05em; }
nav .sidebar-title { font-size: 1.5em; padding-bottom: 10px; }
nav p { font-weight: 400; font-size: 0.85em; line-height: 1.4; }
nav a { display: block; color: white; text-decoration: none; padding: 8px 10px; border-radius: 8px; margin-bottom: 4px; }
nav a.active, nav a:hover { background: rgba(255,255,255,0.22); }
main { flex: 1; padding: 28px 40px; max-width: 1100px; }
.card { background: #ffffff; color: #012233; border-radius: 12px; padding: 18px; box-shadow: 0 4px 18px rgba(0,0,0,0.08); margin-bottom: 12px; white-space: pre-wrap; }
.card-alt { background: #f0f8ff; color: #012233; border-radius: 12px; padding: 18px; box-shadow: 0 4px 18px rgba(0,0,0,0.06); margin-bottom: 12px; white-space: pre-wrap; }
.final { background: #e6f0ff; color: #001f3f; border-radius: 12px; padding: 18px; box-shadow: 0 5px 20px rgba(0,0,0,0.09); margin-bottom: 12px; font-weight: 600; white-space: pre-wrap; }
.small { font-size: 0.9rem; color: #334455; }
.columns { display: flex; gap: 32px; }
.columns > .wide { flex: 2; }
.columns > .narrow { flex: 1; }
label { display: block; margin: 12px 0 4px; font-weight: 600; }
input, select, textarea { width: 100%; padding: 8px; border: 1px solid #b8c8d8; border-radius: 8px; font: inherit; }
textarea { height: 160px; }
button, .button { display: inline-block; margin-top: 14px; padding: 9px 18px; border: none; border-radius: 8px; background: #0066cc; color: white; font: inherit; text-decoration: none; cursor: pointer; }
.notice { padding: 12px 16px; border-radius: 8px; margin: 12px 0; }
.notice.info { background: #e7f1fb; }
.notice.success { background: #e3f6e8; }
.notice.warning { background: #fff6db; }
.notice.error { background: #fde7e7; }
.downloads { display: flex; gap: 16px; align-items: center; }
hr { border: none; border-top: 1px solid #d0dbe6; margin: 18px 0; }
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Nav {
    Analyze,
    Followup,
    Download,
    Logs,
}

const NAV_ITEMS: [(Nav, &str, &str); 4] = [
    (Nav::Analyze, "/", "Report &amp; Analyze"),
    (Nav::Followup, "/followup", "Follow-up Questions"),
    (Nav::Download, "/download", "Download Report"),
    (Nav::Logs, "/logs", "Recent Logs"),
];

enum Notice {
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
}

impl Notice {
    fn render(&self) -> String {
        let (class, text) = match self {
            Notice::Info(t) => ("info", t),
            Notice::Success(t) => ("success", t),
            Notice::Warning(t) => ("warning", t),
            Notice::Error(t) => ("error", t),
        };
        format!("<div class=\"notice {class}\">{}</div>", html_escape(text))
    }
}

// ── Forms ─────────────────────────────────────────────────────────────────────

/// Intake form as submitted. Age stays a string so bad input can be
/// reported on the page instead of failing extraction.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct AnalyzeForm {
    name: String,
    age: String,
    gender: String,
    symptoms: String,
}

impl AnalyzeForm {
    fn blank() -> Self {
        Self { age: DEFAULT_AGE.into(), ..Self::default() }
    }

    fn to_input(&self) -> Result<PatientInput, AppError> {
        let age = self.age.trim().parse::<u32>().map_err(|_| {
            AppError::Validation(format!("Age must be a whole number between 0 and {MAX_AGE}."))
        })?;
        Ok(PatientInput {
            name: self.name.clone(),
            age,
            gender: self.gender.clone(),
            symptoms: self.symptoms.clone(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(super) struct FollowupForm {
    agent: String,
    question: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /: intake form plus the browser's last result.
pub(super) async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let browser = BrowserId::from_headers(&headers);
    let last = state.sessions.get(&browser).last_result;
    respond(&browser, analyze_page(&AnalyzeForm::blank(), None, last.as_ref()))
}

/// POST /analyze: validate, run every agent, show the cards.
pub(super) async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AnalyzeForm>,
) -> Response {
    let browser = BrowserId::from_headers(&headers);

    let notice = match form.to_input().and_then(|input| input.report_text()) {
        Err(e) => Notice::Warning(e.to_string()),
        Ok(report_text) => {
            match tokio::time::timeout(
                state.request_timeout,
                state.orchestrator.run_full_workflow(&report_text),
            )
            .await
            {
                Ok(Ok(record)) => {
                    state.sessions.record_result(&browser, &record);
                    Notice::Success("Analysis complete, results below.".into())
                }
                Ok(Err(e)) => {
                    warn!("analysis failed: {e}");
                    Notice::Error(format!("Error running agents: {e}"))
                }
                Err(_) => {
                    warn!(timeout_secs = state.request_timeout.as_secs(), "analysis timed out");
                    Notice::Error(format!(
                        "Error running agents: analysis timed out after {} s",
                        state.request_timeout.as_secs()
                    ))
                }
            }
        }
    };

    let last = state.sessions.get(&browser).last_result;
    respond(&browser, analyze_page(&form, Some(notice), last.as_ref()))
}

/// GET /followup
pub(super) async fn followup_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let browser = BrowserId::from_headers(&headers);
    let last = state.sessions.get(&browser).last_result;
    respond(&browser, followup_html(last.as_ref(), &FollowupForm::default(), None, None))
}

/// POST /followup: ask the chosen agent about the browser's last result.
pub(super) async fn followup_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<FollowupForm>,
) -> Response {
    let browser = BrowserId::from_headers(&headers);
    let Some(last) = state.sessions.get(&browser).last_result else {
        return respond(&browser, followup_html(None, &form, None, None));
    };

    let Some(agent) = AgentKind::from_key(form.agent.trim()) else {
        let notice = Notice::Warning("Please choose an agent.".into());
        return respond(&browser, followup_html(Some(&last), &form, Some(notice), None));
    };

    let asked = tokio::time::timeout(
        state.request_timeout,
        state.orchestrator.ask_followup(&last.session_id, agent, &form.question),
    )
    .await;

    let (notice, answer) = match asked {
        Ok(Ok(followup)) => {
            state.sessions.record_followup(&browser, &last.session_id, &followup);
            (None, Some(followup))
        }
        Ok(Err(AppError::Validation(msg))) => (Some(Notice::Warning(msg)), None),
        Ok(Err(e)) => {
            warn!(session_id = %last.session_id, "follow-up failed: {e}");
            (Some(Notice::Error(format!("Follow-up error: {e}"))), None)
        }
        Err(_) => (Some(Notice::Error("Follow-up error: request timed out".into())), None),
    };

    let last = state.sessions.get(&browser).last_result.unwrap_or(last);
    respond(&browser, followup_html(Some(&last), &form, notice, answer.as_ref()))
}

/// GET /download
pub(super) async fn download(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let browser = BrowserId::from_headers(&headers);
    let last = state.sessions.get(&browser).last_result;

    let body = match last {
        None => Notice::Info("No result to download yet.".into()).render(),
        Some(rec) => {
            let id = html_escape(&rec.session_id);
            format!(
                "<div class=\"card\"><strong>Session {id}</strong><div class=\"small\">{ts}</div>{report}</div>\
                 <div class=\"downloads\">\
                 <a class=\"button\" href=\"/sessions/{id}/pdf\">Generate &amp; Download PDF</a>\
                 <a href=\"/sessions/{id}/txt\">Download TXT (readable)</a>\
                 <a href=\"/sessions/{id}/json\">Download JSON (developer)</a>\
                 </div>",
                ts = html_escape(&rec.timestamp),
                report = html_escape(&rec.report_text),
            )
        }
    };
    respond(&browser, page("Download Multi-Agent Report", Nav::Download, &body))
}

/// GET /logs: this browser's recent sessions with their artefacts.
pub(super) async fn logs(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let browser = BrowserId::from_headers(&headers);
    let recent: Vec<RecentSession> = state.sessions.get(&browser).recent.into_iter().collect();

    if recent.is_empty() {
        let body = format!(
            "{}{}",
            Notice::Info("No previous sessions in this browser session.".into()).render(),
            Notice::Warning("Please run an analysis first to generate reports before downloading.".into())
                .render()
        );
        return respond(&browser, page("Recent Diagnosis Logs", Nav::Logs, &body));
    }

    let store = state.orchestrator.store().clone();
    let availability = tokio::task::spawn_blocking(move || {
        recent
            .into_iter()
            .map(|r| {
                let paths = store.paths(&r.session_id);
                let exists = [paths.txt.exists(), paths.json.exists(), paths.pdf.exists()];
                (r, exists)
            })
            .collect::<Vec<_>>()
    })
    .await;

    let rows = match availability {
        Ok(rows) => rows,
        Err(e) => {
            warn!("log availability check panicked: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "internal error\n").into_response();
        }
    };

    let mut body = String::new();
    for (session, [txt, json, pdf]) in rows {
        let id = html_escape(&session.session_id);
        body.push_str(&format!(
            "<p><strong>Session ID:</strong> {id} &nbsp;|&nbsp; <strong>Timestamp:</strong> {}</p>",
            html_escape(&session.timestamp)
        ));
        body.push_str(
            &Notice::Info("TXT and PDF are recommended for easy reading. JSON is for developer use.".into())
                .render(),
        );
        body.push_str("<div class=\"downloads\">");
        body.push_str(&download_link(&id, "txt", txt, "Download TXT (readable)", "TXT not available."));
        body.push_str(&download_link(&id, "json", json, "Download JSON (developer)", "JSON not available."));
        // PDFs are generated on request, so a missing one is still offered.
        let pdf_label = if pdf { "Download PDF (formatted)" } else { "Generate PDF" };
        body.push_str(&download_link(&id, "pdf", true, pdf_label, ""));
        body.push_str("</div><hr>");
    }
    respond(&browser, page("Recent Diagnosis Logs", Nav::Logs, &body))
}

/// GET /sessions/{session_id}/{artifact}: TXT/JSON from disk, PDF rendered
/// from the stored record (including follow-ups) and saved alongside.
pub(super) async fn artifact(
    State(state): State<AppState>,
    Path((session_id, artifact)): Path<(String, String)>,
) -> Response {
    let Some(kind) = Artifact::parse(&artifact) else {
        return (StatusCode::NOT_FOUND, "unknown artifact\n").into_response();
    };

    let store = state.orchestrator.store().clone();
    let id = session_id.clone();
    let result = tokio::task::spawn_blocking(move || -> Result<Option<Vec<u8>>, AppError> {
        match kind {
            Artifact::Pdf => {
                let record = store.load(&id)?;
                let bytes = pdf::render(&record)?;
                store.write_pdf(&id, &bytes)?;
                Ok(Some(bytes))
            }
            other => store.read_artifact(&id, other),
        }
    })
    .await;

    match result {
        Ok(Ok(Some(bytes))) => (
            [
                (header::CONTENT_TYPE, kind.mime().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", kind.filename(&session_id)),
                ),
            ],
            bytes,
        )
            .into_response(),
        Ok(Ok(None)) => (StatusCode::NOT_FOUND, format!("{artifact} not available\n")).into_response(),
        Ok(Err(e)) => {
            warn!(%session_id, %artifact, "artifact request failed: {e}");
            (status_for(&e), format!("{e}\n")).into_response()
        }
        Err(e) => {
            warn!(%session_id, "artifact task panicked: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error\n").into_response()
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// Escape text for HTML element content and quoted attribute values.
pub(crate) fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn respond(browser: &BrowserId, html: String) -> Response {
    let mut resp = Html(html).into_response();
    if browser.fresh {
        if let Ok(v) = HeaderValue::from_str(&browser.set_cookie()) {
            resp.headers_mut().insert(header::SET_COOKIE, v);
        }
    }
    resp
}

fn page(title: &str, active: Nav, body: &str) -> String {
    let mut nav = String::new();
    for (item, href, label) in NAV_ITEMS {
        let class = if item == active { " class=\"active\"" } else { "" };
        nav.push_str(&format!("<a href=\"{href}\"{class}>{label}</a>"));
    }
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\" />\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n\
         <title>{title} · {APP_TITLE}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><div class=\"sidebar-title\">&#127973; MedAgent Multi-Agent</div>\
         <p>Multi-agent medical diagnosis: General Physician, Cardiologist, Pulmonologist, \
         Psychologist, Neurologist and a Multidisciplinary team.</p>{nav}</nav>\n\
         <main><h1>{title}</h1>\n{body}\n</main>\n</body>\n</html>\n",
        title = html_escape(title),
    )
}

fn analyze_page(form: &AnalyzeForm, notice: Option<Notice>, last: Option<&DiagnosisRecord>) -> String {
    let mut gender_options = String::from("<option value=\"\">Select</option>");
    let chosen = Gender::parse(&form.gender);
    for g in Gender::ALL {
        let selected = if chosen == Some(g) { " selected" } else { "" };
        gender_options.push_str(&format!("<option value=\"{0}\"{selected}>{0}</option>", g.as_str()));
    }

    let mut body = format!(
        "<p>Enter patient details and symptoms. The system will run multiple specialist agents \
         and return a synthesized diagnosis.</p>\
         <div class=\"columns\"><div class=\"wide\">\
         <form method=\"post\" action=\"/analyze\" onsubmit=\"document.getElementById('running').hidden = false\">\
         <label for=\"name\">Patient name</label><input id=\"name\" name=\"name\" value=\"{name}\" />\
         <label for=\"age\">Age</label><input id=\"age\" name=\"age\" type=\"number\" min=\"0\" max=\"{MAX_AGE}\" value=\"{age}\" />\
         <label for=\"gender\">Gender</label><select id=\"gender\" name=\"gender\">{gender_options}</select>\
         <label for=\"symptoms\">Symptoms / History</label>\
         <textarea id=\"symptoms\" name=\"symptoms\" placeholder=\"Describe symptoms, onset, duration, severity, red flags...\">{symptoms}</textarea>\
         <button type=\"submit\">Run Multi-Agent Analysis</button>\
         <div id=\"running\" class=\"notice info\" hidden>Running multi-agent analysis. This may take a few seconds.</div>\
         </form></div>\
         <div class=\"narrow\"><p><strong>Quick tips</strong></p><ul>\
         <li>Be concise but include onset, progression, and red flags.</li>\
         <li>Example: chest pain radiating to left arm, worse on exertion, 2 days.</li>\
         <li>Use the Follow-up page to ask more questions about results.</li>\
         </ul></div></div>",
        name = html_escape(&form.name),
        age = html_escape(&form.age),
        symptoms = html_escape(&form.symptoms),
    );

    if let Some(n) = notice {
        body.push_str(&n.render());
    }
    if let Some(rec) = last {
        body.push_str(&result_cards(rec));
    }
    page("Multi-Agent Medical Diagnosis", Nav::Analyze, &body)
}

fn result_cards(rec: &DiagnosisRecord) -> String {
    let mut out = format!(
        "<div class=\"card\"><strong>Patient Report</strong><div class=\"small\">{} &bull; {}</div><p>{}</p></div>",
        html_escape(&rec.session_id),
        html_escape(&rec.timestamp),
        html_escape(&rec.report_text),
    );
    for kind in AgentKind::ALL {
        let (heading, class) = match kind {
            AgentKind::MultidisciplinaryTeam => ("Final Multidisciplinary Diagnosis", "final"),
            other => (other.display_name(), "card"),
        };
        out.push_str(&format!(
            "<h4>{heading}</h4><div class=\"{class}\">{}</div>",
            html_escape(rec.outputs.get(kind))
        ));
    }
    out
}

/// Label in the follow-up agent picker; the synthesis is offered first.
fn followup_label(kind: AgentKind) -> &'static str {
    match kind {
        AgentKind::MultidisciplinaryTeam => "Multidisciplinary (final)",
        other => other.display_name(),
    }
}

fn followup_html(
    last: Option<&DiagnosisRecord>,
    form: &FollowupForm,
    notice: Option<Notice>,
    answer: Option<&FollowUp>,
) -> String {
    let Some(rec) = last else {
        let body = Notice::Info("Run an analysis first on the 'Report & Analyze' page.".into()).render();
        return page("Follow-up Questions", Nav::Followup, &body);
    };

    let order = std::iter::once(AgentKind::MultidisciplinaryTeam)
        .chain(AgentKind::ALL.into_iter().filter(|k| *k != AgentKind::MultidisciplinaryTeam));
    let mut options = String::new();
    for kind in order {
        let selected = if form.agent == kind.key() { " selected" } else { "" };
        options.push_str(&format!(
            "<option value=\"{}\"{selected}>{}</option>",
            kind.key(),
            followup_label(kind)
        ));
    }

    let mut body = format!(
        "<p class=\"small\">About session {}</p>\
         <form method=\"post\" action=\"/followup\">\
         <label for=\"agent\">Ask which agent?</label><select id=\"agent\" name=\"agent\">{options}</select>\
         <label for=\"question\">Type your follow-up question</label>\
         <input id=\"question\" name=\"question\" value=\"{}\" />\
         <button type=\"submit\">Ask</button></form>",
        html_escape(&rec.session_id),
        html_escape(&form.question),
    );

    if let Some(n) = notice {
        body.push_str(&n.render());
    }
    if let Some(f) = answer {
        body.push_str(&format!(
            "<div class=\"card-alt\"><strong>Answer from {}</strong><p>{}</p></div>",
            f.agent.display_name(),
            html_escape(&f.answer)
        ));
    }

    let earlier: Vec<&FollowUp> = rec
        .followups
        .iter()
        .filter(|f| answer.is_none_or(|a| a != *f))
        .collect();
    if !earlier.is_empty() {
        body.push_str("<h4>Earlier follow-ups</h4>");
        for f in earlier.iter().rev() {
            body.push_str(&format!(
                "<div class=\"card-alt\"><strong>{}</strong> <span class=\"small\">{}</span>\n<em>Q: {}</em>\nA: {}</div>",
                f.agent.display_name(),
                html_escape(&f.timestamp),
                html_escape(&f.question),
                html_escape(&f.answer)
            ));
        }
    }
    page("Follow-up Questions", Nav::Followup, &body)
}

fn download_link(id: &str, ext: &str, available: bool, label: &str, missing: &str) -> String {
    if available {
        format!("<a href=\"/sessions/{id}/{ext}\">{label}</a>")
    } else {
        format!("<span class=\"small\">{missing}</span>")
    }
}
