use crate::{
    retrieval::Passage,
    types::{ResolvedQuestion, Timestamp, TopicSegment},
};

/// Format a timestamp as HH:MM:SS
pub fn format_timestamp(ts: Timestamp) -> String {
    let total = ts.as_millis() / 1000;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// Format passages for a prompt, each tagged with its citation id and span
pub fn format_passages(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| {
            format!(
                "[{}] ({} - {}) {}",
                p.citation_id,
                format_timestamp(p.window.start),
                format_timestamp(p.window.end),
                p.window.combined_text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_topics(topics: &[TopicSegment]) -> String {
    topics
        .iter()
        .map(|t| {
            format!(
                "- {} ({} - {})",
                t.label,
                format_timestamp(t.start),
                format_timestamp(t.end)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a quiz as human-readable markdown
pub fn format_quiz_readable(
    video: &str,
    topics: &[TopicSegment],
    questions: &[ResolvedQuestion],
) -> String {
    let mut output = String::new();
    output.push_str(&format!("# Quiz: {}\n\n", video));

    if !topics.is_empty() {
        output.push_str("## Topics\n\n");
        for topic in topics {
            output.push_str(&format!(
                "• [{}–{}] {}\n",
                format_timestamp(topic.start),
                format_timestamp(topic.end),
                topic.label
            ));
        }
        output.push('\n');
    }

    output.push_str("## Questions\n\n");
    for (i, q) in questions.iter().enumerate() {
        output.push_str(&format!(
            "### {}. [{}–{}] {}\n\n",
            i + 1,
            format_timestamp(q.start),
            format_timestamp(q.end),
            q.question
        ));
        output.push_str(&format!("*Topic:* {}\n\n", q.topic));
        for (j, answer) in q.answers.iter().enumerate() {
            let marker = if j as i64 == q.correct_answer_index {
                "✓"
            } else {
                " "
            };
            let letter = (b'A' + j as u8) as char;
            output.push_str(&format!("{} {}) {}\n", marker, letter, answer));
        }
        output.push_str(&format!("\n*Why:* {}\n\n", q.reason));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WindowRecord;

    #[test]
    fn timestamps_drop_milliseconds() {
        assert_eq!(format_timestamp(Timestamp::from_millis(3_723_999)), "01:02:03");
        assert_eq!(format_timestamp(Timestamp::ZERO), "00:00:00");
    }

    #[test]
    fn passages_carry_citation_ids() {
        let passages = vec![Passage {
            citation_id: 4,
            window: WindowRecord {
                combined_text: " compound interest ".into(),
                start: Timestamp::from_secs(90),
                end: Timestamp::from_secs(118),
            },
        }];
        assert_eq!(
            format_passages(&passages),
            "[4] (00:01:30 - 00:01:58) compound interest"
        );
    }

    #[test]
    fn readable_quiz_marks_correct_answer() {
        let questions = vec![ResolvedQuestion {
            start: Timestamp::from_secs(30),
            end: Timestamp::from_secs(55),
            topic: "Interest".into(),
            question: "What grows faster?".into(),
            answers: vec!["Simple".into(), "Compound".into(), "Neither".into(), "Both".into()],
            correct_answer_index: 1,
            reason: "Interest on interest.".into(),
        }];
        let text = format_quiz_readable("finance", &[], &questions);
        assert!(text.starts_with("# Quiz: finance"));
        assert!(text.contains("### 1. [00:00:30–00:00:55] What grows faster?"));
        assert!(text.contains("✓ B) Compound"));
        assert!(text.contains("  A) Simple"));
        assert!(!text.contains("## Topics"));
    }
}
