//! User prompt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Style used for music generation when the user gives none.
pub const DEFAULT_STYLE: &str = "Catchy pop song with modern production, upbeat tempo, clear vocals";

/// Why a prompt was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Prompt concept is empty")]
    EmptyConcept,
}

/// Concept text plus optional musical style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    concept: String,
    style: Option<String>,
}

impl Prompt {
    /// Build a prompt, rejecting an empty concept.
    ///
    /// Whitespace is trimmed from both fields; a blank style counts as absent.
    pub fn new(concept: impl Into<String>, style: Option<String>) -> Result<Self, PromptError> {
        let concept = concept.into().trim().to_string();
        if concept.is_empty() {
            return Err(PromptError::EmptyConcept);
        }

        let style = style
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self { concept, style })
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    /// Style to hand to the music service.
    pub fn style_or_default(&self) -> &str {
        self.style.as_deref().unwrap_or(DEFAULT_STYLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::orchestrator::StageError;

    #[test]
    fn rejects_blank_concept() {
        assert_eq!(Prompt::new("   ", None), Err(PromptError::EmptyConcept));
        assert_eq!(
            Prompt::new("", Some("jazz".to_string())),
            Err(PromptError::EmptyConcept)
        );
    }

    #[test]
    fn blank_concept_is_an_input_error() {
        let err: StageError = Prompt::new("", None).unwrap_err().into();
        assert!(matches!(err, StageError::Input(ref msg) if msg.contains("concept is empty")));
    }

    #[test]
    fn blank_style_falls_back_to_default() {
        let prompt = Prompt::new(" cats ", Some("  ".to_string())).unwrap();
        assert_eq!(prompt.concept(), "cats");
        assert_eq!(prompt.style(), None);
        assert_eq!(prompt.style_or_default(), DEFAULT_STYLE);
    }

    #[test]
    fn explicit_style_is_kept() {
        let prompt = Prompt::new("cats", Some("synthwave".to_string())).unwrap();
        assert_eq!(prompt.style_or_default(), "synthwave");
    }
}
