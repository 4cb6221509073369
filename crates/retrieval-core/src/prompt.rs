//! Prompt assembly for the completion service
//!
//! Assembly is a pure formatting step: retrieved passages are listed in the
//! rank order received, each prefixed with its 1-based rank, inside a
//! mode-specific template.

use serde::{Deserialize, Serialize};

use crate::retriever::RetrievalResult;

const TUTOR_PERSONA: &str = "You are EduGen, a friendly and professional grade 6 science tutor.";

/// Recognised prompt templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    /// Introduction to a topic
    Overview,
    /// Answer a student's question
    Qa,
}

impl PromptMode {
    /// Generation parameters fixed by the mode
    pub fn generation(&self) -> GenerationParams {
        match self {
            PromptMode::Overview => GenerationParams {
                max_tokens: Some(500),
                temperature: None,
            },
            PromptMode::Qa => GenerationParams {
                max_tokens: Some(800),
                temperature: Some(0.7),
            },
        }
    }
}

impl std::str::FromStr for PromptMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overview" => Ok(PromptMode::Overview),
            "qa" => Ok(PromptMode::Qa),
            other => Err(format!("unknown prompt mode: {}", other)),
        }
    }
}

/// Sampling parameters passed through to the completion service
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Template selection plus the topic it is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub mode: PromptMode,
    pub topic: Option<String>,
}

impl PromptTemplate {
    pub fn overview(topic: impl Into<String>) -> Self {
        Self {
            mode: PromptMode::Overview,
            topic: Some(topic.into()),
        }
    }

    pub fn qa(topic: Option<String>) -> Self {
        Self {
            mode: PromptMode::Qa,
            topic,
        }
    }
}

/// Stateless prompt formatter
pub struct PromptAssembler;

impl PromptAssembler {
    /// Render `passages` (best first) and `query` into `template`.
    ///
    /// The overview template introduces the topic and does not quote the
    /// query; the qa template ends with the question.
    pub fn assemble(query: &str, passages: &[RetrievalResult], template: &PromptTemplate) -> String {
        let material = Self::numbered(passages);

        match template.mode {
            PromptMode::Overview => {
                let topic = template.topic.as_deref().unwrap_or("this topic");
                format!(
                    "{persona} You make complex topics easy to understand for students aged 11 to 12.\n\n\
                     Curriculum material about {topic}:\n{material}\n\n\
                     Write a clear, engaging introduction to {topic} that covers:\n\
                     1. What the topic is about, in simple words\n\
                     2. Why it matters and why it is interesting\n\
                     3. Two or three surprising facts to catch a student's attention\n\n\
                     Keep the tone friendly and conversational for a grade 6 student.",
                    persona = TUTOR_PERSONA,
                    topic = topic,
                    material = material,
                )
            }
            PromptMode::Qa => {
                let about = template
                    .topic
                    .as_deref()
                    .map(|t| format!(" about {}", t))
                    .unwrap_or_default();
                format!(
                    "{persona} Your answers should be:\n\
                     - Clear and easy to follow for 11 to 12 year olds\n\
                     - Engaging and conversational\n\
                     - Backed by examples or analogies where they help\n\
                     - Encouraging of curiosity and critical thinking\n\n\
                     Curriculum material{about}:\n{material}\n\n\
                     Question: {query}\n\n\
                     Answer in a friendly, encouraging way that helps the student understand the idea.",
                    persona = TUTOR_PERSONA,
                    about = about,
                    material = material,
                    query = query,
                )
            }
        }
    }

    fn numbered(passages: &[RetrievalResult]) -> String {
        passages
            .iter()
            .enumerate()
            .map(|(rank, result)| format!("{}. {}", rank + 1, result.passage.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
