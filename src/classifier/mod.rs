//! Single-shot text classification into a closed vocabulary.
//!
//! A [`Classifier`] sends one completion request per text at temperature
//! 0.0 and maps the model's answer onto a [`Vocabulary`]. Answers outside
//! the vocabulary never escape: they collapse to its sentinel.
//!
//! # Example
//!
//! ```rust,ignore
//! use assistant_gateway::classifier::{Classifier, Vocabulary};
//!
//! let classifier = Classifier::new(completer, "gpt-3.5-turbo", Vocabulary::restaurant_topics());
//! let category = classifier.classify("¿Tienen mesas para esta noche?").await?;
//! assert!(["0", "1", "2", "3", "4"].contains(&category.label()));
//! ```

pub mod vocabulary;

pub use vocabulary::{Category, PromptStyle, Vocabulary, VocabularyError, VocabularyPreset};

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::assistant::ChatCompleter;
use crate::error::TransportError;

/// Sampling temperature for classification requests.
pub const TEMPERATURE: f32 = 0.0;

/// Model-backed classifier bound to a default vocabulary.
#[derive(Clone)]
pub struct Classifier {
    completer: Arc<dyn ChatCompleter>,
    model: String,
    vocabulary: Vocabulary,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("model", &self.model)
            .field("labels", &self.vocabulary.labels())
            .finish_non_exhaustive()
    }
}

impl Classifier {
    pub fn new(
        completer: Arc<dyn ChatCompleter>,
        model: impl Into<String>,
        vocabulary: Vocabulary,
    ) -> Self {
        Self {
            completer,
            model: model.into(),
            vocabulary,
        }
    }

    #[must_use]
    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    /// Classify `text` against the configured vocabulary.
    pub async fn classify(&self, text: &str) -> Result<Category, TransportError> {
        self.classify_with(text, &self.vocabulary).await
    }

    /// Classify `text` against an explicit vocabulary.
    #[instrument(skip_all, fields(model = %self.model, text_len = text.len()))]
    pub async fn classify_with(
        &self,
        text: &str,
        vocabulary: &Vocabulary,
    ) -> Result<Category, TransportError> {
        let prompt = vocabulary.prompt_for(&self.model, text);
        let answer = self.completer.complete_chat(&prompt, TEMPERATURE).await?;
        let category = vocabulary.resolve(&answer);

        debug!(
            answer = %answer.trim(),
            category = %category,
            recognized = category.is_recognized(),
            "text classified"
        );
        Ok(category)
    }
}
