//! Per-browser state keyed by the `medagent_session` cookie.
//!
//! Holds what the pages need between requests: the last diagnosis shown and
//! the sessions this browser produced, newest first. State is in-memory only
//! and is lost on restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

use axum::http::{HeaderMap, header};
use uuid::Uuid;

use crate::report::{DiagnosisRecord, FollowUp};

pub const COOKIE_NAME: &str = "medagent_session";

/// Browsers tracked at once; the least recently seen is evicted beyond this.
const MAX_BROWSERS: usize = 1024;

/// Row in a browser's recent-sessions list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentSession {
    pub session_id: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Clone)]
pub struct BrowserState {
    pub last_result: Option<DiagnosisRecord>,
    pub recent: VecDeque<RecentSession>,
}

struct Entry {
    state: BrowserState,
    last_seen: Instant,
}

/// The browser a request came from. `fresh` ids need a `Set-Cookie`.
#[derive(Debug, Clone)]
pub struct BrowserId {
    pub id: String,
    pub fresh: bool,
}

impl BrowserId {
    /// Identify the browser from its cookie, minting a new id when absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match cookie_value(headers, COOKIE_NAME).filter(|v| Uuid::parse_str(v).is_ok()) {
            Some(id) => Self { id, fresh: false },
            None => Self { id: Uuid::new_v4().to_string(), fresh: true },
        }
    }

    pub fn set_cookie(&self) -> String {
        format!("{COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax", self.id)
    }
}

pub struct BrowserSessions {
    inner: Mutex<HashMap<String, Entry>>,
    recent_cap: usize,
}

impl BrowserSessions {
    pub fn new(recent_cap: usize) -> Self {
        Self { inner: Mutex::new(HashMap::new()), recent_cap }
    }

    /// Snapshot of a browser's state (empty for unknown browsers).
    pub fn get(&self, browser: &BrowserId) -> BrowserState {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match map.get_mut(&browser.id) {
            Some(entry) => {
                entry.last_seen = Instant::now();
                entry.state.clone()
            }
            None => BrowserState::default(),
        }
    }

    /// Make `record` the browser's last result and put it first in its
    /// recent list.
    pub fn record_result(&self, browser: &BrowserId, record: &DiagnosisRecord) {
        self.with_entry(browser, |state| {
            state.recent.retain(|r| r.session_id != record.session_id);
            state.recent.push_front(RecentSession {
                session_id: record.session_id.clone(),
                timestamp: record.timestamp.clone(),
            });
            state.recent.truncate(self.recent_cap);
            state.last_result = Some(record.clone());
        });
    }

    /// Mirror a stored follow-up onto the browser's copy of the last result.
    pub fn record_followup(&self, browser: &BrowserId, session_id: &str, followup: &FollowUp) {
        self.with_entry(browser, |state| {
            if let Some(last) = state.last_result.as_mut().filter(|r| r.session_id == session_id) {
                last.followups.push(followup.clone());
            }
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn with_entry(&self, browser: &BrowserId, f: impl FnOnce(&mut BrowserState)) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !map.contains_key(&browser.id) && map.len() >= MAX_BROWSERS {
            let oldest = map
                .iter()
                .min_by_key(|(_, e)| e.last_seen)
                .map(|(k, _)| k.clone());
            if let Some(k) = oldest {
                map.remove(&k);
            }
        }
        let entry = map.entry(browser.id.clone()).or_insert_with(|| Entry {
            state: BrowserState::default(),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        f(&mut entry.state);
    }
}

/// Value of cookie `name` from the request's `Cookie` headers.
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim().to_string())
}
