use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::{QuizError, Result},
    generation::{GenerationRequest, GenerativeService, generate_structured},
    types::{TopicSegment, WindowRecord},
};

/// Produces topic labels over the windowed corpus.
#[async_trait]
pub trait TopicService: Send + Sync {
    async fn extract_topics(&self, corpus: &[WindowRecord]) -> Result<Vec<TopicSegment>>;
}

#[derive(Deserialize)]
struct TopicLabel {
    label: String,
}

fn label_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "label": {
                "type": "string",
                "description": "A label of a few words summarizing the documents.",
            },
        },
        "required": ["label"],
        "additionalProperties": false,
    })
}

/// Labels consecutive groups of windows with a short model-written topic.
pub struct LabelingTopicService {
    generator: Arc<dyn GenerativeService>,
    prompt: String,
    group_size: usize,
}

impl LabelingTopicService {
    pub fn new(generator: Arc<dyn GenerativeService>, prompt: String, group_size: usize) -> Self {
        Self {
            generator,
            prompt,
            group_size: group_size.max(1),
        }
    }
}

#[async_trait]
impl TopicService for LabelingTopicService {
    async fn extract_topics(&self, corpus: &[WindowRecord]) -> Result<Vec<TopicSegment>> {
        let mut topics = Vec::new();

        for (group_index, group) in corpus.chunks(self.group_size).enumerate() {
            let first_window = group_index * self.group_size;
            let last_window = first_window + group.len() - 1;
            let documents = group
                .iter()
                .map(|w| w.combined_text.as_str())
                .collect::<Vec<_>>()
                .join("\n");

            let request = GenerationRequest {
                system: self.prompt.clone(),
                user: documents,
                schema_name: "topic_label",
                schema: label_schema(),
            };
            let TopicLabel { label } =
                generate_structured(self.generator.as_ref(), &request).await?;
            let label = label.trim().to_string();
            if label.is_empty() {
                return Err(QuizError::StructuredOutput {
                    schema: "topic_label".to_string(),
                    reason: format!("empty label for windows {first_window}..={last_window}"),
                });
            }

            topics.push(TopicSegment {
                label,
                first_window,
                last_window,
                start: group[0].start,
                end: group[group.len() - 1].end,
            });
        }

        info!(topics = topics.len(), "topics extracted");
        Ok(topics)
    }
}

/// Label of the topic covering `window`, if any.
pub fn topic_for_window(topics: &[TopicSegment], window: usize) -> Option<&str> {
    topics
        .iter()
        .find(|t| (t.first_window..=t.last_window).contains(&window))
        .map(|t| t.label.as_str())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use super::*;
    use crate::types::Timestamp;

    struct EchoLabeler {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerativeService for EchoLabeler {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
            self.seen.lock().unwrap().push(request.user.clone());
            let first_word = request.user.split_whitespace().next().unwrap_or_default();
            Ok(json!({ "label": format!(" {first_word} topic ") }))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    fn corpus(n: u64) -> Vec<WindowRecord> {
        (0..n)
            .map(|i| WindowRecord {
                combined_text: format!("w{i} text"),
                start: Timestamp::from_secs(i * 30),
                end: Timestamp::from_secs(i * 30 + 25),
            })
            .collect()
    }

    #[tokio::test]
    async fn labels_each_group_of_windows() {
        let labeler = Arc::new(EchoLabeler {
            seen: Mutex::new(Vec::new()),
        });
        let service = LabelingTopicService::new(labeler.clone(), "Label this.".into(), 2);

        let topics = service.extract_topics(&corpus(5)).await.unwrap();
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0].label, "w0 topic");
        assert_eq!((topics[0].first_window, topics[0].last_window), (0, 1));
        assert_eq!((topics[2].first_window, topics[2].last_window), (4, 4));
        assert_eq!(topics[1].start, Timestamp::from_secs(60));
        assert_eq!(topics[1].end, Timestamp::from_secs(115));
        assert_eq!(labeler.seen.lock().unwrap()[0], "w0 text\nw1 text");

        assert_eq!(topic_for_window(&topics, 3), Some("w2 topic"));
        assert_eq!(topic_for_window(&topics, 9), None);
    }
}
