//! MedAgent: multi-agent medical diagnosis assistant.
//!
//! A patient report is triaged by a general physician agent, reviewed by
//! four specialist agents and synthesised by a multidisciplinary team agent.
//! Every agent is a role prompt sent to the same hosted LLM. Results are
//! served over a small web UI and logged per session as JSON, text and PDF.

pub mod agents;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod report;
pub mod runtime;
pub mod web;
