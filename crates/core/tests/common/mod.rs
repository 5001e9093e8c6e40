#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use serde_json::{Value, json};
use vidquiz_core::{Config, GenerationRequest, GenerativeService, Result};

pub const LECTURE_SRT: &str = "\
1
00:00:00,000 --> 00:00:05,000
intro

2
00:00:20,000 --> 00:00:25,000
details

3
00:01:00,000 --> 00:01:05,000
summary
";

/// Answers topic requests with a numbered label and question requests with
/// a fixed document, counting calls per schema.
pub struct ScriptedGenerator {
    questions: Value,
    topic_calls: AtomicUsize,
    question_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(questions: Value) -> Self {
        Self {
            questions,
            topic_calls: AtomicUsize::new(0),
            question_calls: AtomicUsize::new(0),
        }
    }

    pub fn topic_calls(&self) -> usize {
        self.topic_calls.load(Ordering::SeqCst)
    }

    pub fn question_calls(&self) -> usize {
        self.question_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeService for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        match request.schema_name {
            "topic_label" => {
                let n = self.topic_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "label": format!("Topic {n}") }))
            }
            _ => {
                self.question_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.questions.clone())
            }
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn question(text: &str, citations: &[i64]) -> Value {
    json!({
        "question": text,
        "answers": ["Intro", "Details", "Summary", "None"],
        "correctAnswerIndex": 2,
        "reason": "Said near the end.",
        "topic": "Topic 1",
        "insertionTime": "00:01:05",
        "citations": citations,
    })
}

pub fn two_questions() -> Value {
    json!({
        "questions": [
            question("What comes last?", &[1, 0]),
            question("What comes first?", &[0]),
        ]
    })
}

/// Lay out `Captions/lecture/lecture.srt` under `root`.
pub fn write_captions(root: &Path) {
    let video_dir = root.join("Captions").join("lecture");
    std::fs::create_dir_all(&video_dir).unwrap();
    std::fs::write(video_dir.join("lecture.srt"), LECTURE_SRT).unwrap();
}

pub fn config(root: &Path, extra: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("VIDEO_TO_USE", "lecture".to_string()),
        ("QUESTION_COUNT", "2".to_string()),
        ("TOPIC_GROUP_SIZE", "1".to_string()),
        ("CAPTIONS_DIR", root.join("Captions").display().to_string()),
        ("CACHE_DIR", root.join("cache").display().to_string()),
        ("OUTPUT_DIR", root.join("Output Data").display().to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(move |var: &str| vars.get(var).cloned()).unwrap()
}
