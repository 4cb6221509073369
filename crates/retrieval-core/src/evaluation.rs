//! Grading of free-text student answers
//!
//! The completion service is asked for a JSON object `{score, feedback}`.
//! Replies are decoded in two stages: strip a surrounding markdown code fence
//! if there is one, then parse strict JSON. Anything else is a
//! `MalformedResponse`; a score or feedback is never made up.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};
use crate::prompt::GenerationParams;

/// Sampling parameters for grading
pub const GRADING_PARAMS: GenerationParams = GenerationParams {
    max_tokens: None,
    temperature: Some(0.3),
};

/// A decoded grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Evaluation {
    /// Fraction of full credit, in [0, 1]
    pub score: f64,
    pub feedback: String,
}

impl Evaluation {
    pub fn percentage(&self) -> f64 {
        self.score * 100.0
    }

    /// Full credit only
    pub fn is_correct(&self) -> bool {
        self.score >= 1.0
    }
}

lazy_static! {
    /// A JSON object inside a ``` or ```json fence
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
}

/// Decode a grading reply into an [`Evaluation`]
pub fn decode_evaluation(reply: &str) -> Result<Evaluation> {
    let body = match FENCED_JSON.captures(reply).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => reply.trim(),
    };

    let evaluation: Evaluation = serde_json::from_str(body).map_err(|e| {
        tracing::warn!("Undecodable grading reply: {}", e);
        RetrievalError::MalformedResponse(format!("grading reply is not the expected JSON: {}", e))
    })?;

    if !evaluation.score.is_finite() || !(0.0..=1.0).contains(&evaluation.score) {
        return Err(RetrievalError::MalformedResponse(format!(
            "score {} is outside [0, 1]",
            evaluation.score
        )));
    }
    if evaluation.feedback.trim().is_empty() {
        return Err(RetrievalError::MalformedResponse(
            "feedback is empty".to_string(),
        ));
    }

    Ok(evaluation)
}

/// Prompt asking the completion service to grade `student_answer`
pub fn grading_prompt(question: &str, model_answer: &str, student_answer: &str) -> String {
    format!(
        "You are grading a grade 6 student's answer to a science question.\n\n\
         How to evaluate:\n\
         - Work out the core concepts, key supporting details and any alternative valid \
           explanations in the model answer.\n\
         - Check whether the student grasped the core concepts, even in different or simpler words.\n\
         - Give credit for valid points the model answer does not mention.\n\n\
         Scoring:\n\
         - 1.0: clear understanding of the core concepts; wording may differ from the model answer.\n\
         - 0.75: main concepts understood, some supporting details missing.\n\
         - 0.5: partial understanding with significant gaps.\n\
         - 0.0: incorrect or irrelevant.\n\n\
         Question: {question}\n\
         Model Answer: {model_answer}\n\
         Student's Answer: {student_answer}\n\n\
         Score understanding rather than completeness. The feedback should say what the student \
         got right, what could be added, and give a hint or example, in language a grade 6 \
         student understands.\n\n\
         Reply with ONLY a JSON object of this form and no other text:\n\
         {{\"score\": <number between 0 and 1>, \"feedback\": \"<feedback>\"}}",
        question = question,
        model_answer = model_answer,
        student_answer = student_answer,
    )
}
