use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    error::{QuizError, Result},
    format::{format_passages, format_topics},
    generation::{GenerationRequest, GenerativeService, generate_structured},
    retrieval::{Passage, Retriever},
    topics::topic_for_window,
    types::{Questions, TopicSegment, WindowRecord},
};

pub const QUESTIONS_SCHEMA_NAME: &str = "questions";

static QUESTION_RULES: &str = r#"You are a question-generating algorithm.
Only extract relevant information from the transcription text below. Every passage starts with its citation id in square brackets, followed by its time span and, when known, its topic.

Generate the requested number of multiple-choice questions. For each question:
- give exactly 4 possible answers
- give the index (0-3) of the correct answer and a reason why it is correct
- name the topic the question belongs to
- list the citation ids of the SPECIFIC passages used to form the question, most relevant first
- give the timestamp where the question would be inserted, at the end of the relevant passage

Try to cover a wide range of the topics in the transcription text. The questions should be in line with the overall theme of the text."#;

/// JSON schema of the structured model output.
pub fn questions_schema() -> Value {
    let text = |description: &str| json!({ "type": "string", "description": description });
    json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "description": "List of questions formed for the transcript.",
                "items": {
                    "type": "object",
                    "properties": {
                        "question": text("Question formed by the model."),
                        "answers": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "List of 4 possible answers to the question.",
                        },
                        "correctAnswerIndex": {
                            "type": "integer",
                            "description": "Index of the correct answer.",
                        },
                        "reason": text("Explanation for the correct answer."),
                        "topic": text("Topic of the question."),
                        "insertionTime": text("Timestamp at the end of the relevant passage."),
                        "citations": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "Citation ids of the specific passages used.",
                        },
                    },
                    "required": [
                        "question",
                        "answers",
                        "correctAnswerIndex",
                        "reason",
                        "topic",
                        "insertionTime",
                        "citations",
                    ],
                    "additionalProperties": false,
                },
            },
        },
        "required": ["questions"],
        "additionalProperties": false,
    })
}

/// Asks the generative service for citable questions over the windowed corpus.
pub struct QuestionSynthesizer {
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn GenerativeService>,
    prompt: String,
}

impl QuestionSynthesizer {
    pub fn new(
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn GenerativeService>,
        prompt: String,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompt,
        }
    }

    pub fn build_request(
        &self,
        passages: &[Passage],
        topics: &[TopicSegment],
        question_count: u32,
    ) -> GenerationRequest {
        let tagged: Vec<Passage> = passages
            .iter()
            .map(|p| match topic_for_window(topics, p.citation_id) {
                Some(label) => Passage {
                    citation_id: p.citation_id,
                    window: WindowRecord {
                        combined_text: format!("{{{label}}} {}", p.window.combined_text),
                        ..p.window.clone()
                    },
                },
                None => p.clone(),
            })
            .collect();

        let mut system = format!("{}\n\n{}", self.prompt, QUESTION_RULES);
        if !topics.is_empty() {
            system.push_str("\n\nTopics:\n");
            system.push_str(&format_topics(topics));
        }
        system.push_str("\n\nTranscription text:\n");
        system.push_str(&format_passages(&tagged));

        GenerationRequest {
            system,
            user: question_count.to_string(),
            schema_name: QUESTIONS_SCHEMA_NAME,
            schema: questions_schema(),
        }
    }

    pub async fn synthesize(
        &self,
        corpus: &[WindowRecord],
        topics: &[TopicSegment],
        question_count: u32,
    ) -> Result<Questions> {
        let passages = self.retriever.retrieve(corpus, &self.prompt).await?;
        let request = self.build_request(&passages, topics, question_count);

        info!(
            passages = passages.len(),
            question_count,
            model = self.generator.model_name(),
            "generating questions"
        );
        let questions: Questions = generate_structured(self.generator.as_ref(), &request).await?;

        for (index, question) in questions.questions.iter().enumerate() {
            question
                .check_shape()
                .map_err(|reason| QuizError::StructuredOutput {
                    schema: QUESTIONS_SCHEMA_NAME.to_string(),
                    reason: format!("question {index}: {reason}"),
                })?;
        }

        if questions.questions.len() != question_count as usize {
            warn!(
                requested = question_count,
                received = questions.questions.len(),
                "model returned a different number of questions than requested"
            );
        }
        info!(questions = questions.questions.len(), "questions generated");

        Ok(questions)
    }
}
