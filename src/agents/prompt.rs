//! Layered prompt builder for the medical agents.
//!
//! Prompts are assembled from plain-text template fragments stored under
//! `config/prompts/`. Each layer is appended in order; a missing file falls
//! back to the compiled-in copy of the shipped template, or is skipped when
//! no fallback is given.
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.
//! Substituted values are never re-scanned, so patient text containing
//! `{{...}}` is passed through verbatim.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

const SEPARATOR: &str = "\n\n";

/// Shipped templates, used when the prompts directory lacks a file.
pub mod defaults {
    pub const SPECIALIST: &str = include_str!("../../config/prompts/specialist.md");
    pub const SYNTHESIS: &str = include_str!("../../config/prompts/synthesis.md");
    pub const FOLLOWUP: &str = include_str!("../../config/prompts/followup.md");
    pub const GENERAL_PHYSICIAN: &str = include_str!("../../config/prompts/general_physician.md");
    pub const CARDIOLOGIST: &str = include_str!("../../config/prompts/cardiologist.md");
    pub const PULMONOLOGIST: &str = include_str!("../../config/prompts/pulmonologist.md");
    pub const PSYCHOLOGIST: &str = include_str!("../../config/prompts/psychologist.md");
    pub const NEUROLOGIST: &str = include_str!("../../config/prompts/neurologist.md");
    pub const MULTIDISCIPLINARY_TEAM: &str =
        include_str!("../../config/prompts/multidisciplinary_team.md");
}

/// Fluent builder that assembles a layered prompt from template files.
///
/// ```rust
/// use medagent::agents::prompt::PromptBuilder;
///
/// let prompt = PromptBuilder::new("config/prompts")
///     .append("Context:\n{{context}}")
///     .var("context", "chest pain on exertion")
///     .build();
/// assert_eq!(prompt, "Context:\nchest pain on exertion");
/// ```
pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    /// Create a builder rooted at `prompts_dir` (e.g. `"config/prompts"`).
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.into(),
            parts: Vec::new(),
            vars: HashMap::new(),
        }
    }

    /// Append a layer loaded from `filename` in the prompts directory,
    /// using `fallback` when the file is missing. An empty fallback skips
    /// the layer.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!(path = %path.display(), "prompt layer not found, using fallback");
                fallback.to_string()
            }
        };
        self.append(text)
    }

    /// Directly append a text fragment.
    pub fn append(mut self, text: impl Into<String>) -> Self {
        let s = text.into();
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    /// Register `{{key}}` → `value` substitution pairs applied at build time.
    pub fn with_vars<'a, I>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (k, v) in vars {
            self.vars.insert(k.to_string(), v.to_string());
        }
        self
    }

    /// Register a single `{{key}}` → `value` substitution.
    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Assemble all layers, join with blank lines, and apply variable substitution.
    pub fn build(self) -> String {
        render(&self.parts.join(SEPARATOR), &self.vars)
    }
}

/// Single left-to-right pass over `template`. Unknown placeholders are kept.
fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
