//! Closed label sets and the categories drawn from them.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::assistant::{ChatMessage, ChatPrompt};

/// Placeholder replaced by the user's text in inline prompt templates.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// How the classification prompt is laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStyle {
    /// A single user message; [`QUESTION_PLACEHOLDER`] is replaced with the input.
    Inline { template: String },
    /// A system instruction followed by the input as the user message.
    Instructed { instructions: String },
}

/// Invalid vocabulary definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VocabularyError {
    #[error("vocabulary has no labels")]
    Empty,
    #[error("label is blank after normalization")]
    BlankLabel,
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("sentinel `{0}` collides with a label")]
    SentinelIsLabel(String),
    #[error("inline template does not contain the {{question}} placeholder")]
    MissingPlaceholder,
}

/// A closed set of labels, the sentinel returned for anything else, and
/// the prompt that asks the model to pick one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
    sentinel: String,
    prompt: PromptStyle,
}

/// A classification result.
///
/// Only a [`Vocabulary`] can produce one, so the label is always one of its
/// labels or its sentinel. Serializes as the bare label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    label: String,
    recognized: bool,
}

impl Category {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// `false` when this is the vocabulary's sentinel.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        self.recognized
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Serialize for Category {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.label)
    }
}

/// Canonical form used to compare model answers with labels.
fn normalize(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| {
            matches!(c, '"' | '\'' | '`' | '.' | ',' | ';' | ':' | '!' | '¡' | '?' | '¿')
        })
        .trim()
        .to_lowercase()
}

impl Vocabulary {
    pub fn new<I, S>(
        labels: I,
        sentinel: impl Into<String>,
        prompt: PromptStyle,
    ) -> Result<Self, VocabularyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(VocabularyError::Empty);
        }

        let mut seen = Vec::with_capacity(labels.len());
        for label in &labels {
            let key = normalize(label);
            if key.is_empty() {
                return Err(VocabularyError::BlankLabel);
            }
            if seen.contains(&key) {
                return Err(VocabularyError::DuplicateLabel(label.clone()));
            }
            seen.push(key);
        }

        let sentinel = sentinel.into();
        if seen.contains(&normalize(&sentinel)) {
            return Err(VocabularyError::SentinelIsLabel(sentinel));
        }

        if let PromptStyle::Inline { template } = &prompt {
            if !template.contains(QUESTION_PLACEHOLDER) {
                return Err(VocabularyError::MissingPlaceholder);
            }
        }

        Ok(Self {
            labels,
            sentinel,
            prompt,
        })
    }

    /// Four colors, answered in one word; `false` when none applies.
    #[must_use]
    pub fn colors() -> Self {
        Self {
            labels: ["azul", "rojo", "rosado", "amarillo"]
                .map(String::from)
                .to_vec(),
            sentinel: "false".to_string(),
            prompt: PromptStyle::Inline {
                template: "Pregunta: \"{question}\"\n\
                    La pregunta anterior, ¿está relacionada con alguno de estos 4 colores?: \
                    azul, rojo, rosado, amarillo. Responde en una sola palabra el color que \
                    creas que está relacionado con la pregunta anterior."
                    .to_string(),
            },
        }
    }

    /// Four numbered restaurant topics; `0` when none applies.
    ///
    /// 1: menu and food options, 2: prices and promotions,
    /// 3: reservations and table availability, 4: policies and extra services.
    #[must_use]
    pub fn restaurant_topics() -> Self {
        Self {
            labels: ["1", "2", "3", "4"].map(String::from).to_vec(),
            sentinel: "0".to_string(),
            prompt: PromptStyle::Instructed {
                instructions: "Clasifica las preguntas de los clientes en una de las siguientes \
                    categorías, respondiendo con el número correspondiente: \
                    1 para 'Menú y Opciones de Comida', 2 para 'Precios y Promociones', \
                    3 para 'Reservas y Disponibilidad de Mesas', \
                    4 para 'Políticas y Servicios Adicionales'. \
                    Solo debes responder con el número de la categoría correspondiente."
                    .to_string(),
            },
        }
    }

    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The category returned when the answer is out of vocabulary.
    #[must_use]
    pub fn sentinel(&self) -> Category {
        Category {
            label: self.sentinel.clone(),
            recognized: false,
        }
    }

    /// Build the completion prompt for `text`.
    #[must_use]
    pub fn prompt_for(&self, model: &str, text: &str) -> ChatPrompt {
        let messages = match &self.prompt {
            PromptStyle::Inline { template } => {
                vec![ChatMessage::user(template.replace(QUESTION_PLACEHOLDER, text))]
            }
            PromptStyle::Instructed { instructions } => {
                vec![ChatMessage::system(instructions.clone()), ChatMessage::user(text)]
            }
        };
        ChatPrompt {
            model: model.to_string(),
            messages,
        }
    }

    /// Map a raw model answer onto the vocabulary.
    #[must_use]
    pub fn resolve(&self, answer: &str) -> Category {
        let key = normalize(answer);
        self.labels
            .iter()
            .find(|label| normalize(label) == key)
            .map_or_else(
                || self.sentinel(),
                |label| Category {
                    label: label.clone(),
                    recognized: true,
                },
            )
    }
}

/// Built-in vocabularies selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyPreset {
    /// [`Vocabulary::colors`].
    Colors,
    /// [`Vocabulary::restaurant_topics`].
    #[default]
    Topics,
}

impl From<VocabularyPreset> for Vocabulary {
    fn from(preset: VocabularyPreset) -> Self {
        match preset {
            VocabularyPreset::Colors => Self::colors(),
            VocabularyPreset::Topics => Self::restaurant_topics(),
        }
    }
}
