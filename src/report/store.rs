//! On-disk session log: one `{id}.json` + one `{id}.txt` per diagnosis run.
//!
//! Files managed in the logs directory:
//! - `{id}.json`: pretty-printed [`DiagnosisRecord`]
//! - `{id}.txt` : human-readable dump of the report and every agent reply
//!
//! PDF reports live in a separate reports directory as `MedAgent_{id}.pdf`.
//! All operations are blocking file I/O; async callers wrap them in
//! `spawn_blocking`.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use super::{DiagnosisRecord, SESSION_ID_PREFIX, check_session_id};
use crate::error::AppError;

/// Upper bound on `_N` suffixes tried when a session id is already taken.
const MAX_ID_SUFFIX: u32 = 1000;

/// Paths of the artefacts belonging to one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub json: PathBuf,
    pub txt: PathBuf,
    pub pdf: PathBuf,
}

/// Listing row for `GET /api/sessions` and the logs page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub timestamp: String,
    pub report_text: String,
    pub has_txt: bool,
    pub has_pdf: bool,
    pub followups: usize,
}

#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    reports_dir: PathBuf,
}

impl LogStore {
    /// Open the store, creating both directories when missing.
    pub fn open(dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Result<Self, AppError> {
        let store = Self { dir: dir.into(), reports_dir: reports_dir.into() };
        for d in [&store.dir, &store.reports_dir] {
            fs::create_dir_all(d)
                .map_err(|e| AppError::Store(format!("cannot create {}: {e}", d.display())))?;
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, session_id: &str) -> SessionPaths {
        SessionPaths {
            json: self.dir.join(format!("{session_id}.json")),
            txt: self.dir.join(format!("{session_id}.txt")),
            pdf: self.reports_dir.join(pdf_filename(session_id)),
        }
    }

    /// Persist a new record. When its session id is already taken a `_N`
    /// suffix is appended; the stored (possibly renamed) record is returned.
    pub fn save(&self, mut record: DiagnosisRecord) -> Result<DiagnosisRecord, AppError> {
        check_session_id(&record.session_id)?;
        let base = record.session_id.clone();

        let mut file = None;
        for n in 1..=MAX_ID_SUFFIX {
            let candidate = if n == 1 { base.clone() } else { format!("{base}_{n}") };
            let path = self.paths(&candidate).json;
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => {
                    record.session_id = candidate;
                    file = Some(f);
                    break;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(AppError::Store(format!("cannot create {}: {e}", path.display())));
                }
            }
        }
        let Some(mut file) = file else {
            return Err(AppError::Store(format!("no free session id for {base}")));
        };

        let paths = self.paths(&record.session_id);
        let written = to_json(&record).and_then(|json| {
            file.write_all(json.as_bytes())
                .map_err(|e| AppError::Store(format!("cannot write {}: {e}", paths.json.display())))?;
            fs::write(&paths.txt, render_txt(&record))
                .map_err(|e| AppError::Store(format!("cannot write {}: {e}", paths.txt.display())))
        });
        if let Err(e) = written {
            // Release the claimed id.
            drop(file);
            let _ = fs::remove_file(&paths.json);
            return Err(e);
        }

        debug!(session_id = %record.session_id, "session log written");
        Ok(record)
    }

    /// Rewrite the JSON log of an existing session.
    pub fn update(&self, record: &DiagnosisRecord) -> Result<(), AppError> {
        check_session_id(&record.session_id)?;
        let path = self.paths(&record.session_id).json;
        if !path.exists() {
            return Err(AppError::NotFound(record.session_id.clone()));
        }
        // Write-then-rename so a crash never leaves a truncated log behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, to_json(record)?)
            .map_err(|e| AppError::Store(format!("cannot write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| AppError::Store(format!("cannot replace {}: {e}", path.display())))
    }

    pub fn load(&self, session_id: &str) -> Result<DiagnosisRecord, AppError> {
        check_session_id(session_id)?;
        let path = self.paths(session_id).json;
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(AppError::NotFound(session_id.to_string()));
            }
            Err(e) => return Err(AppError::Store(format!("cannot read {}: {e}", path.display()))),
        };
        serde_json::from_str(&data)
            .map_err(|e| AppError::Store(format!("malformed {}: {e}", path.display())))
    }

    /// All stored sessions, newest first. Unreadable logs are skipped.
    pub fn list(&self) -> Result<Vec<SessionSummary>, AppError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| AppError::Store(format!("cannot list {}: {e}", self.dir.display())))?;

        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(id) {
                Ok(record) => {
                    let paths = self.paths(&record.session_id);
                    out.push(SessionSummary {
                        has_txt: paths.txt.exists(),
                        has_pdf: paths.pdf.exists(),
                        followups: record.followups.len(),
                        session_id: record.session_id,
                        timestamp: record.timestamp,
                        report_text: record.report_text,
                    });
                }
                Err(e) => warn!(path = %path.display(), "skipping unreadable session log: {e}"),
            }
        }
        out.sort_by(|a, b| id_order_key(&b.session_id).cmp(&id_order_key(&a.session_id)));
        Ok(out)
    }

    /// Read one artefact of a session, `None` when it has not been written.
    pub fn read_artifact(&self, session_id: &str, kind: Artifact) -> Result<Option<Vec<u8>>, AppError> {
        check_session_id(session_id)?;
        let paths = self.paths(session_id);
        let path = match kind {
            Artifact::Json => paths.json,
            Artifact::Txt => paths.txt,
            Artifact::Pdf => paths.pdf,
        };
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Store(format!("cannot read {}: {e}", path.display()))),
        }
    }

    pub fn write_pdf(&self, session_id: &str, bytes: &[u8]) -> Result<PathBuf, AppError> {
        check_session_id(session_id)?;
        let path = self.paths(session_id).pdf;
        fs::write(&path, bytes)
            .map_err(|e| AppError::Store(format!("cannot write {}: {e}", path.display())))?;
        Ok(path)
    }
}

/// Downloadable artefacts of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Json,
    Txt,
    Pdf,
}

impl Artifact {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "json" => Some(Artifact::Json),
            "txt" => Some(Artifact::Txt),
            "pdf" => Some(Artifact::Pdf),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Artifact::Json => "application/json",
            Artifact::Txt => "text/plain; charset=utf-8",
            Artifact::Pdf => "application/pdf",
        }
    }

    pub fn filename(&self, session_id: &str) -> String {
        match self {
            Artifact::Json => format!("{session_id}.json"),
            Artifact::Txt => format!("{session_id}.txt"),
            Artifact::Pdf => pdf_filename(session_id),
        }
    }
}

pub fn pdf_filename(session_id: &str) -> String {
    format!("MedAgent_{session_id}.pdf")
}

/// Orders ids by their numeric segments, so `diag_X_10` sorts after
/// `diag_X_9` and after the unsuffixed `diag_X`.
fn id_order_key(id: &str) -> Vec<(usize, &str)> {
    id.strip_prefix(SESSION_ID_PREFIX)
        .unwrap_or(id)
        .split('_')
        .map(|seg| {
            let digits = seg.trim_start_matches('0');
            (digits.len(), digits)
        })
        .collect()
}

fn to_json(record: &DiagnosisRecord) -> Result<String, AppError> {
    serde_json::to_string_pretty(record).map_err(|e| AppError::Store(format!("serialise record: {e}")))
}

/// Plain-text rendering of a record, as written to `{id}.txt`.
pub fn render_txt(record: &DiagnosisRecord) -> String {
    let mut out = String::new();
    out.push_str("=== MedAgent Diagnosis Log ===\n");
    out.push_str(&format!(
        "Session ID: {}\nTimestamp: {}\n\n",
        record.session_id, record.timestamp
    ));
    out.push_str("=== Report ===\n");
    out.push_str(&record.report_text);
    out.push_str("\n\n");
    for (label, text) in record.outputs.labelled() {
        out.push_str(&format!("--- {label} ---\n{text}\n\n"));
    }
    out
}
