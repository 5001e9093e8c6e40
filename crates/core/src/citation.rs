use crate::{
    error::{QuizError, Result},
    types::{Question, ResolvedQuestion, WindowRecord},
};

/// Place each question on the timeline of the window its first citation
/// points at. Any further citations only back the answer and do not affect
/// placement; the model's own `insertion_time` is ignored.
pub fn resolve(raw: &[Question], corpus: &[WindowRecord]) -> Result<Vec<ResolvedQuestion>> {
    raw.iter()
        .enumerate()
        .map(|(question_index, question)| resolve_one(question_index, question, corpus))
        .collect()
}

fn resolve_one(
    question_index: usize,
    question: &Question,
    corpus: &[WindowRecord],
) -> Result<ResolvedQuestion> {
    let &citation = question
        .citations
        .first()
        .ok_or(QuizError::MissingCitation { question_index })?;

    let window = usize::try_from(citation)
        .ok()
        .and_then(|i| corpus.get(i))
        .ok_or(QuizError::CitationOutOfRange {
            question_index,
            citation,
            corpus_len: corpus.len(),
        })?;

    Ok(ResolvedQuestion {
        start: window.start,
        end: window.end,
        topic: question.topic.clone(),
        question: question.question.clone(),
        answers: question.answers.clone(),
        correct_answer_index: question.correct_answer_index,
        reason: question.reason.clone(),
    })
}
