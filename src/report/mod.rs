//! Diagnosis records: the only persisted entity.
//!
//! A record bundles the patient report, every agent's reply, the
//! orchestrator's conversation history and any follow-up Q&A. It is written
//! once on submit and rewritten when a follow-up is appended.

pub mod pdf;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::agents::AgentKind;
use crate::error::AppError;

/// Timestamp format shared by session ids, records and history entries.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const SESSION_ID_PREFIX: &str = "diag_";

pub const MAX_AGE: u32 = 120;

const INCOMPLETE_FORM: &str = "Please complete the form (name, gender, and symptoms).";

// ── Patient input ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    /// Parse a form value. The `Select` placeholder and unknown values are `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

/// What the intake form submits.
#[derive(Debug, Clone, Deserialize)]
pub struct PatientInput {
    pub name: String,
    pub age: u32,
    pub gender: String,
    pub symptoms: String,
}

impl PatientInput {
    /// Validate the form and build the report text sent to every agent.
    pub fn report_text(&self) -> Result<String, AppError> {
        let name = self.name.trim();
        let symptoms = self.symptoms.trim();
        let gender = Gender::parse(&self.gender);

        let Some(gender) = gender.filter(|_| !name.is_empty() && !symptoms.is_empty()) else {
            return Err(AppError::Validation(INCOMPLETE_FORM.into()));
        };
        if self.age > MAX_AGE {
            return Err(AppError::Validation(format!("Age must be between 0 and {MAX_AGE}.")));
        }

        Ok(format!(
            "Patient: {name}, Age: {}, Gender: {}. Symptoms: {symptoms}",
            self.age,
            gender.as_str()
        ))
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// One reply per agent, keyed the way the JSON log names them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutputs {
    #[serde(rename = "GeneralPhysician")]
    pub general_physician: String,
    #[serde(rename = "Cardiologist")]
    pub cardiologist: String,
    #[serde(rename = "Pulmonologist")]
    pub pulmonologist: String,
    #[serde(rename = "Psychologist")]
    pub psychologist: String,
    #[serde(rename = "Neurologist")]
    pub neurologist: String,
    #[serde(rename = "Final")]
    pub final_diagnosis: String,
}

impl AgentOutputs {
    pub fn get(&self, kind: AgentKind) -> &str {
        match kind {
            AgentKind::GeneralPhysician => &self.general_physician,
            AgentKind::Cardiologist => &self.cardiologist,
            AgentKind::Pulmonologist => &self.pulmonologist,
            AgentKind::Psychologist => &self.psychologist,
            AgentKind::Neurologist => &self.neurologist,
            AgentKind::MultidisciplinaryTeam => &self.final_diagnosis,
        }
    }

    /// `(label, text)` pairs in log order.
    pub fn labelled(&self) -> [(&'static str, &str); 6] {
        AgentKind::ALL.map(|k| (k.output_label(), self.get(k)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent: String,
    pub text: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUp {
    pub agent: AgentKind,
    pub question: String,
    pub answer: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisRecord {
    pub session_id: String,
    pub timestamp: String,
    pub report_text: String,
    pub outputs: AgentOutputs,
    #[serde(default)]
    pub conversation_history: Vec<HistoryEntry>,
    #[serde(default)]
    pub followups: Vec<FollowUp>,
}

/// Base session id for a run started at `timestamp` (already formatted).
pub fn session_id_for(timestamp: &str) -> String {
    format!("{SESSION_ID_PREFIX}{timestamp}")
}

/// Session ids end up in file paths, so only `diag_` + digits/underscores pass.
pub fn is_valid_session_id(id: &str) -> bool {
    id.strip_prefix(SESSION_ID_PREFIX)
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit() || c == '_'))
}

pub fn check_session_id(id: &str) -> Result<(), AppError> {
    if is_valid_session_id(id) {
        Ok(())
    } else {
        Err(AppError::NotFound(id.to_string()))
    }
}
