//! Medical agents: labelled role prompts sent to the same hosted model.
//!
//! Each [`MedicalAgent`] owns a small short-term memory of one-line
//! summaries of its previous replies; the most recent few are folded into
//! its next prompt. The [`orchestrator`] drives the agents through a run.

pub mod orchestrator;
pub mod prompt;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::config::AgentsConfig;
use prompt::{PromptBuilder, defaults};

/// The six agents, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    #[serde(rename = "gp")]
    GeneralPhysician,
    #[serde(rename = "cardio")]
    Cardiologist,
    #[serde(rename = "pulmo")]
    Pulmonologist,
    #[serde(rename = "psych")]
    Psychologist,
    #[serde(rename = "neuro")]
    Neurologist,
    #[serde(rename = "final")]
    MultidisciplinaryTeam,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::GeneralPhysician,
        AgentKind::Cardiologist,
        AgentKind::Pulmonologist,
        AgentKind::Psychologist,
        AgentKind::Neurologist,
        AgentKind::MultidisciplinaryTeam,
    ];

    /// Reviewed concurrently after triage.
    pub const SPECIALISTS: [AgentKind; 4] = [
        AgentKind::Cardiologist,
        AgentKind::Pulmonologist,
        AgentKind::Psychologist,
        AgentKind::Neurologist,
    ];

    /// Short key used in forms, URLs and the follow-up API.
    pub fn key(&self) -> &'static str {
        match self {
            AgentKind::GeneralPhysician => "gp",
            AgentKind::Cardiologist => "cardio",
            AgentKind::Pulmonologist => "pulmo",
            AgentKind::Psychologist => "psych",
            AgentKind::Neurologist => "neuro",
            AgentKind::MultidisciplinaryTeam => "final",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentKind::GeneralPhysician => "General Physician",
            AgentKind::Cardiologist => "Cardiologist",
            AgentKind::Pulmonologist => "Pulmonologist",
            AgentKind::Psychologist => "Psychologist",
            AgentKind::Neurologist => "Neurologist",
            AgentKind::MultidisciplinaryTeam => "Multidisciplinary Team",
        }
    }

    /// Name used in conversation-history entries.
    pub fn history_label(&self) -> &'static str {
        match self {
            AgentKind::GeneralPhysician => "GeneralPhysician",
            AgentKind::Cardiologist => "Cardiologist",
            AgentKind::Pulmonologist => "Pulmonologist",
            AgentKind::Psychologist => "Psychologist",
            AgentKind::Neurologist => "Neurologist",
            AgentKind::MultidisciplinaryTeam => "MultidisciplinaryTeam",
        }
    }

    /// Key of this agent's reply in the record's `outputs` map.
    pub fn output_label(&self) -> &'static str {
        match self {
            AgentKind::MultidisciplinaryTeam => "Final",
            other => other.history_label(),
        }
    }

    fn role_file(&self) -> (&'static str, &'static str) {
        match self {
            AgentKind::GeneralPhysician => ("general_physician.md", defaults::GENERAL_PHYSICIAN),
            AgentKind::Cardiologist => ("cardiologist.md", defaults::CARDIOLOGIST),
            AgentKind::Pulmonologist => ("pulmonologist.md", defaults::PULMONOLOGIST),
            AgentKind::Psychologist => ("psychologist.md", defaults::PSYCHOLOGIST),
            AgentKind::Neurologist => ("neurologist.md", defaults::NEUROLOGIST),
            AgentKind::MultidisciplinaryTeam => {
                ("multidisciplinary_team.md", defaults::MULTIDISCIPLINARY_TEAM)
            }
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// One agent plus its short-term memory.
pub struct MedicalAgent {
    kind: AgentKind,
    prompts_dir: PathBuf,
    memory: Mutex<VecDeque<String>>,
    memory_cap: usize,
    prompt_window: usize,
    summary_chars: usize,
}

impl MedicalAgent {
    pub fn new(kind: AgentKind, config: &AgentsConfig) -> Self {
        Self {
            kind,
            prompts_dir: config.prompts_dir.clone(),
            memory: Mutex::new(VecDeque::new()),
            memory_cap: config.memory_cap,
            prompt_window: config.memory_prompt_window,
            summary_chars: config.summary_chars,
        }
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Role prompt, from `config/prompts/<role>.md` or the shipped copy.
    pub fn role_prompt(&self) -> String {
        let (file, fallback) = self.kind.role_file();
        PromptBuilder::new(&self.prompts_dir).layer_or(file, fallback).build()
    }

    /// Prompt for analysing `context` (a patient report or synthesis input).
    pub fn build_prompt(&self, context: &str) -> String {
        let memory = self.memory_block();
        PromptBuilder::new(&self.prompts_dir)
            .layer_or("specialist.md", defaults::SPECIALIST)
            .var("name", self.kind.display_name())
            .var("role", self.role_prompt())
            .var("report", context)
            .var("memory", memory)
            .build()
    }

    /// Record a one-line summary of `reply`, evicting the oldest beyond the cap.
    pub fn remember(&self, reply: &str, at: DateTime<Local>) {
        let summary: String = reply
            .chars()
            .take(self.summary_chars)
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        let line = format!(
            "[{}] {} summary: {summary}",
            at.format("%Y-%m-%dT%H:%M:%S"),
            self.kind.display_name()
        );

        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        memory.push_back(line);
        while memory.len() > self.memory_cap {
            memory.pop_front();
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn memory_block(&self) -> String {
        let memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        if memory.is_empty() || self.prompt_window == 0 {
            return String::new();
        }
        let skip = memory.len().saturating_sub(self.prompt_window);
        let recent: Vec<&str> = memory.iter().skip(skip).map(String::as_str).collect();
        format!("Short-term memory (latest):\n{}", recent.join("\n"))
    }
}

/// Build all six agents, indexable by [`AgentKind`].
pub(crate) fn build_roster(config: &AgentsConfig) -> Vec<MedicalAgent> {
    AgentKind::ALL.iter().map(|k| MedicalAgent::new(*k, config)).collect()
}
