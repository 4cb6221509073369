//! Retrieval-augmented tutoring: retrieve, assemble, complete

use serde::Serialize;
use std::sync::Arc;

use crate::completion::{CompletionRequest, CompletionService};
use crate::error::Result;
use crate::evaluation::{decode_evaluation, grading_prompt, Evaluation, GRADING_PARAMS};
use crate::prompt::{PromptAssembler, PromptTemplate};
use crate::retriever::{RetrievalResult, Retriever};

/// Generated text and the passages it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TutorReply {
    pub text: String,
    pub passages: Vec<RetrievalResult>,
}

/// Ties a [`Retriever`] to a [`CompletionService`]
#[derive(Clone)]
pub struct Tutor {
    retriever: Retriever,
    completion: Arc<dyn CompletionService>,
    top_k: usize,
}

impl Tutor {
    pub fn new(retriever: Retriever, completion: Arc<dyn CompletionService>, top_k: usize) -> Self {
        Self {
            retriever,
            completion,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Query used to retrieve material for a topic overview
    pub fn overview_query(topic: &str) -> String {
        format!("Give me an overview of the topic {}", topic)
    }

    /// Retrieve and render the prompt without calling the completion service
    pub async fn prepare(
        &self,
        query: &str,
        template: &PromptTemplate,
    ) -> Result<(String, Vec<RetrievalResult>)> {
        let passages = self.retriever.retrieve(query, self.top_k).await?;
        let prompt = PromptAssembler::assemble(query, &passages, template);
        Ok((prompt, passages))
    }

    /// Introduction to `topic`
    pub async fn overview(&self, topic: &str) -> Result<TutorReply> {
        let template = PromptTemplate::overview(topic);
        self.generate(&Self::overview_query(topic), &template).await
    }

    /// Answer a student's question, optionally scoped to a topic
    pub async fn answer(&self, question: &str, topic: Option<&str>) -> Result<TutorReply> {
        let template = PromptTemplate::qa(topic.map(str::to_string));
        self.generate(question, &template).await
    }

    /// Grade `student_answer` against `model_answer`
    pub async fn evaluate(
        &self,
        question: &str,
        model_answer: &str,
        student_answer: &str,
    ) -> Result<Evaluation> {
        let request = CompletionRequest::new(
            grading_prompt(question, model_answer, student_answer),
            GRADING_PARAMS,
        );
        let reply = self.completion.complete(&request).await?;
        let evaluation = decode_evaluation(&reply)?;
        tracing::info!("Graded answer: score {:.2}", evaluation.score);
        Ok(evaluation)
    }

    async fn generate(&self, query: &str, template: &PromptTemplate) -> Result<TutorReply> {
        let (prompt, passages) = self.prepare(query, template).await?;
        let request = CompletionRequest::new(prompt, template.mode.generation());
        let text = self.completion.complete(&request).await?;

        tracing::info!(
            "Generated {:?} reply ({} chars) from {} passages",
            template.mode,
            text.len(),
            passages.len()
        );
        Ok(TutorReply { text, passages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::Corpus;
    use crate::embeddings::EmbeddingProvider;
    use crate::error::RetrievalError;
    use crate::index::VectorIndex;
    use crate::prompt::PromptMode;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Unit;

    #[async_trait]
    impl EmbeddingProvider for Unit {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }

        fn dimension(&self) -> usize {
            1
        }

        fn model_id(&self) -> &str {
            "unit"
        }
    }

    /// Replies with a canned string and records every request
    struct Canned {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Canned {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionService for Canned {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }

        fn model_id(&self) -> &str {
            "canned"
        }
    }

    fn tutor(completion: Arc<Canned>) -> Tutor {
        let corpus = Corpus::from_texts(["MAGNETS attract iron", "LIGHT travels fast"]);
        let index = VectorIndex::build(&[vec![1.0], vec![3.0]]).unwrap();
        let retriever =
            Retriever::new(Arc::new(corpus), Arc::new(index), Arc::new(Unit)).unwrap();
        Tutor::new(retriever, completion, 1)
    }

    #[tokio::test]
    async fn test_overview_uses_overview_template() {
        let completion = Canned::new("Magnets are cool!");
        let reply = tutor(completion.clone()).overview("Magnets").await.unwrap();

        assert_eq!(reply.text, "Magnets are cool!");
        assert_eq!(reply.passages.len(), 1);

        let seen = completion.seen.lock().unwrap();
        assert!(seen[0].prompt.contains("1. MAGNETS attract iron"));
        assert_eq!(seen[0].params, PromptMode::Overview.generation());
    }

    #[tokio::test]
    async fn test_answer_includes_question() {
        let completion = Canned::new("Because...");
        tutor(completion.clone())
            .answer("Why do magnets stick?", Some("Magnets"))
            .await
            .unwrap();

        let seen = completion.seen.lock().unwrap();
        assert!(seen[0].prompt.contains("Question: Why do magnets stick?"));
        assert_eq!(seen[0].params.temperature, Some(0.7));
    }

    #[tokio::test]
    async fn test_evaluate_decodes_reply() {
        let completion = Canned::new("```json\n{\"score\": 0.5, \"feedback\": \"Half right\"}\n```");
        let evaluation = tutor(completion.clone())
            .evaluate("Q", "A", "B")
            .await
            .unwrap();
        assert_eq!(evaluation.score, 0.5);
        assert_eq!(completion.seen.lock().unwrap()[0].params, GRADING_PARAMS);
    }

    #[tokio::test]
    async fn test_evaluate_rejects_prose() {
        let completion = Canned::new("Pretty good answer!");
        assert!(matches!(
            tutor(completion).evaluate("Q", "A", "B").await,
            Err(RetrievalError::MalformedResponse(_))
        ));
    }
}
