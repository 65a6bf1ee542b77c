//! Multi-agent workflow: triage → specialists → multidisciplinary synthesis.
//!
//! The orchestrator owns the agent roster, the LLM provider and the session
//! log store. One instance is shared (`Arc`) by every web request.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::Local;
use tokio::task;
use tracing::{debug, info};

use super::prompt::{PromptBuilder, defaults};
use super::{AgentKind, MedicalAgent, build_roster};
use crate::config::AgentsConfig;
use crate::error::AppError;
use crate::llm::LlmProvider;
use crate::report::store::LogStore;
use crate::report::{
    AgentOutputs, DiagnosisRecord, FollowUp, HistoryEntry, TIMESTAMP_FORMAT, check_session_id,
    session_id_for,
};

pub struct Orchestrator {
    provider: LlmProvider,
    agents: Vec<MedicalAgent>,
    store: LogStore,
    prompts_dir: std::path::PathBuf,
    history: Mutex<VecDeque<HistoryEntry>>,
    history_cap: usize,
    /// Serialises read-modify-write of a record when appending follow-ups.
    record_lock: tokio::sync::Mutex<()>,
}

impl Orchestrator {
    pub fn new(provider: LlmProvider, store: LogStore, config: &AgentsConfig) -> Self {
        Self {
            provider,
            agents: build_roster(config),
            store,
            prompts_dir: config.prompts_dir.clone(),
            history: Mutex::new(VecDeque::new()),
            history_cap: config.history_cap,
            record_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    pub fn store(&self) -> &LogStore {
        &self.store
    }

    pub fn agent(&self, kind: AgentKind) -> &MedicalAgent {
        &self.agents[kind.index()]
    }

    /// Run every agent over `report_text` and persist the resulting record.
    pub async fn run_full_workflow(&self, report_text: &str) -> Result<DiagnosisRecord, AppError> {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        info!(%timestamp, provider = self.provider.name(), "starting multi-agent analysis");

        let gp = self.consult(AgentKind::GeneralPhysician, report_text).await?;
        self.record_history(AgentKind::GeneralPhysician, &gp, &timestamp);

        // Specialists only see the patient report, so they run side by side.
        let (cardio, pulmo, psych, neuro) = tokio::try_join!(
            self.consult(AgentKind::Cardiologist, report_text),
            self.consult(AgentKind::Pulmonologist, report_text),
            self.consult(AgentKind::Psychologist, report_text),
            self.consult(AgentKind::Neurologist, report_text),
        )?;
        for (kind, text) in AgentKind::SPECIALISTS.iter().zip([&cardio, &pulmo, &psych, &neuro]) {
            self.record_history(*kind, text, &timestamp);
        }

        let synthesis_input = PromptBuilder::new(&self.prompts_dir)
            .layer_or("synthesis.md", defaults::SYNTHESIS)
            .with_vars([
                ("report", report_text),
                ("gp", gp.as_str()),
                ("cardio", cardio.as_str()),
                ("pulmo", pulmo.as_str()),
                ("psych", psych.as_str()),
                ("neuro", neuro.as_str()),
            ])
            .build();
        let final_diagnosis = self
            .consult(AgentKind::MultidisciplinaryTeam, &synthesis_input)
            .await?;
        self.record_history(AgentKind::MultidisciplinaryTeam, &final_diagnosis, &timestamp);

        let record = DiagnosisRecord {
            session_id: session_id_for(&timestamp),
            timestamp,
            report_text: report_text.to_string(),
            outputs: AgentOutputs {
                general_physician: gp,
                cardiologist: cardio,
                pulmonologist: pulmo,
                psychologist: psych,
                neurologist: neuro,
                final_diagnosis,
            },
            conversation_history: self.history_snapshot(),
            followups: Vec::new(),
        };

        let store = self.store.clone();
        let saved = task::spawn_blocking(move || store.save(record))
            .await
            .map_err(|e| AppError::Store(format!("log writer panicked: {e}")))??;

        info!(session_id = %saved.session_id, "analysis complete");
        Ok(saved)
    }

    /// Ask one agent a follow-up question about a stored session.
    ///
    /// The context is that agent's reply in the session (`final` uses the
    /// synthesis). The Q&A is appended to the session's JSON log.
    pub async fn ask_followup(
        &self,
        session_id: &str,
        agent: AgentKind,
        question: &str,
    ) -> Result<FollowUp, AppError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AppError::Validation("Please type a question.".into()));
        }
        check_session_id(session_id)?;

        let record = self.load(session_id).await?;
        let prompt = PromptBuilder::new(&self.prompts_dir)
            .layer_or("followup.md", defaults::FOLLOWUP)
            .var("name", agent.display_name())
            .var("context", record.outputs.get(agent))
            .var("question", question)
            .build();

        debug!(%session_id, agent = agent.key(), "asking follow-up");
        let answer = self.provider.complete(&prompt).await?.text;

        let followup = FollowUp {
            agent,
            question: question.to_string(),
            answer,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        };

        // Reload under the lock so concurrent follow-ups are not lost.
        let _guard = self.record_lock.lock().await;
        let store = self.store.clone();
        let id = session_id.to_string();
        let entry = followup.clone();
        task::spawn_blocking(move || {
            let mut record = store.load(&id)?;
            record.followups.push(entry);
            store.update(&record)
        })
        .await
        .map_err(|e| AppError::Store(format!("log writer panicked: {e}")))??;

        info!(%session_id, agent = agent.key(), "follow-up answered");
        Ok(followup)
    }

    /// Read a stored session record.
    pub async fn load(&self, session_id: &str) -> Result<DiagnosisRecord, AppError> {
        let store = self.store.clone();
        let id = session_id.to_string();
        task::spawn_blocking(move || store.load(&id))
            .await
            .map_err(|e| AppError::Store(format!("log reader panicked: {e}")))?
    }

    async fn consult(&self, kind: AgentKind, context: &str) -> Result<String, AppError> {
        let agent = self.agent(kind);
        let prompt = agent.build_prompt(context);
        let reply = self.provider.complete(&prompt).await?.text;
        agent.remember(&reply, Local::now());
        debug!(agent = kind.key(), reply_len = reply.len(), "agent replied");
        Ok(reply)
    }

    fn record_history(&self, kind: AgentKind, text: &str, time: &str) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(HistoryEntry {
            agent: kind.history_label().to_string(),
            text: text.to_string(),
            time: time.to_string(),
        });
        while history.len() > self.history_cap {
            history.pop_front();
        }
    }

    fn history_snapshot(&self) -> Vec<HistoryEntry> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::providers::dummy::DummyProvider;
    use tempfile::TempDir;

    fn orchestrator(provider: DummyProvider) -> (TempDir, Orchestrator) {
        orchestrator_with(provider, |_| {})
    }

    fn orchestrator_with(
        provider: DummyProvider,
        tweak: impl FnOnce(&mut Config),
    ) -> (TempDir, Orchestrator) {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::offline(dir.path());
        tweak(&mut cfg);
        let store = LogStore::open(&cfg.logs.dir, &cfg.logs.reports_dir).unwrap();
        let orch = Orchestrator::new(LlmProvider::Dummy(provider), store, &cfg.agents);
        (dir, orch)
    }

    const REPORT: &str = "Patient: Asha, Age: 54, Gender: Female. Symptoms: chest pain on exertion";

    #[tokio::test]
    async fn full_workflow_fills_every_output_and_logs() {
        let (_dir, orch) = orchestrator(DummyProvider::echo());
        let rec = orch.run_full_workflow(REPORT).await.unwrap();

        assert!(rec.session_id.starts_with("diag_"));
        assert!(rec.outputs.general_physician.contains("General Physician"));
        assert!(rec.outputs.cardiologist.contains("Cardiologist"));
        assert!(rec.outputs.neurologist.contains(REPORT));
        // The synthesis prompt carries every earlier reply.
        assert!(rec.outputs.final_diagnosis.contains("Multidisciplinary Team"));
        assert!(rec.outputs.final_diagnosis.contains("Pulmonologist:\n[echo]"));

        let labels: Vec<_> = rec.conversation_history.iter().map(|h| h.agent.as_str()).collect();
        assert_eq!(
            labels,
            ["GeneralPhysician", "Cardiologist", "Pulmonologist", "Psychologist", "Neurologist", "MultidisciplinaryTeam"]
        );

        let paths = orch.store().paths(&rec.session_id);
        assert!(paths.json.exists());
        assert!(paths.txt.exists());
        assert_eq!(orch.load(&rec.session_id).await.unwrap(), rec);
    }

    #[tokio::test]
    async fn agents_remember_previous_runs() {
        let (_dir, orch) = orchestrator(DummyProvider::echo());
        orch.run_full_workflow(REPORT).await.unwrap();
        let second = orch.run_full_workflow(REPORT).await.unwrap();

        assert_eq!(orch.agent(AgentKind::Cardiologist).memory_len(), 2);
        assert!(second.outputs.cardiologist.contains("Short-term memory (latest):"));
        assert_ne!(second.session_id, "");
        assert_eq!(orch.store().list().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conversation_history_drops_oldest_past_cap() {
        let (_dir, orch) = orchestrator_with(DummyProvider::echo(), |cfg| cfg.agents.history_cap = 7);
        let first = orch.run_full_workflow(REPORT).await.unwrap();
        assert_eq!(first.conversation_history.len(), 6);

        let second = orch.run_full_workflow(REPORT).await.unwrap();
        let history = &second.conversation_history;
        assert_eq!(history.len(), 7);
        // Only the first run's synthesis survives; its GP..Neurologist entries are gone.
        assert_eq!(history[0].agent, "MultidisciplinaryTeam");
        assert_eq!(history[0].text, first.outputs.final_diagnosis);
        assert_eq!(history[1].agent, "GeneralPhysician");
        assert_eq!(history[1].text, second.outputs.general_physician);
        assert_eq!(history[6].text, second.outputs.final_diagnosis);
    }

    #[tokio::test]
    async fn provider_failure_propagates_and_writes_nothing() {
        let (_dir, orch) = orchestrator(DummyProvider::failing("API key not valid"));
        let err = orch.run_full_workflow(REPORT).await.unwrap_err();
        assert!(err.to_string().contains("API key not valid"));
        assert!(orch.store().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn followup_uses_agent_output_and_is_logged() {
        let (_dir, orch) = orchestrator(DummyProvider::echo());
        let rec = orch.run_full_workflow(REPORT).await.unwrap();

        let f = orch
            .ask_followup(&rec.session_id, AgentKind::Pulmonologist, "  Is a CT needed? ")
            .await
            .unwrap();
        assert_eq!(f.question, "Is a CT needed?");
        assert!(f.answer.starts_with("[echo] You are Pulmonologist."));
        assert!(f.answer.contains(&rec.outputs.pulmonologist));

        let back = orch.load(&rec.session_id).await.unwrap();
        assert_eq!(back.followups, vec![f]);
    }

    #[tokio::test]
    async fn followup_rejects_blank_question_and_unknown_session() {
        let (_dir, orch) = orchestrator(DummyProvider::echo());
        let err = orch
            .ask_followup("diag_20250101_120000", AgentKind::MultidisciplinaryTeam, "   ")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Please type a question.");

        let err = orch
            .ask_followup("diag_20250101_120000", AgentKind::MultidisciplinaryTeam, "why?")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
