use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{QuizError, Result};

/// Offset into a video with millisecond precision.
///
/// Serialized in the SRT timing format (`HH:MM:SS,mmm`) so cached artifacts
/// stay readable and round-trip exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp {value:?}: {reason}")]
pub struct TimestampError {
    pub value: String,
    pub reason: &'static str,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn saturating_add_millis(self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.0 % 1000;
        let total_secs = self.0 / 1000;
        let secs = total_secs % 60;
        let mins = (total_secs / 60) % 60;
        let hours = total_secs / 3600;
        write!(f, "{:02}:{:02}:{:02},{:03}", hours, mins, secs, millis)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    /// Parses `HH:MM:SS,mmm`. A `.` is accepted in place of the comma.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let value = s.trim();
        let err = |reason| TimestampError {
            value: value.to_string(),
            reason,
        };

        let (clock, millis) = value
            .split_once([',', '.'])
            .ok_or_else(|| err("missing milliseconds"))?;
        if millis.len() != 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err("milliseconds must be three digits"));
        }

        let parts: Vec<&str> = clock.split(':').collect();
        let [hours, mins, secs] = parts.as_slice() else {
            return Err(err("expected HH:MM:SS"));
        };
        let field = |part: &str| -> std::result::Result<u64, TimestampError> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("non-numeric field"));
            }
            part.parse::<u64>().map_err(|_| err("field out of range"))
        };

        let hours = field(hours)?;
        let mins = field(mins)?;
        let secs = field(secs)?;
        if mins >= 60 || secs >= 60 {
            return Err(err("minutes and seconds must be below 60"));
        }
        let millis: u64 = millis.parse().map_err(|_| err("non-numeric field"))?;

        hours
            .checked_mul(3_600_000)
            .and_then(|h| h.checked_add((mins * 60 + secs) * 1000 + millis))
            .map(Timestamp)
            .ok_or_else(|| err("field out of range"))
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.to_string()
    }
}

/// One subtitle cue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionRecord {
    pub text: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Captions of one video, sorted by start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    captions: Vec<CaptionRecord>,
}

impl Transcript {
    /// Sorts the records by start (stable) and rejects an empty set.
    pub fn new(mut captions: Vec<CaptionRecord>) -> Result<Self> {
        if captions.is_empty() {
            return Err(QuizError::EmptyTranscript);
        }
        captions.sort_by_key(|c| c.start);
        Ok(Self { captions })
    }

    pub fn captions(&self) -> &[CaptionRecord] {
        &self.captions
    }

    pub fn duration(&self) -> Timestamp {
        self.captions
            .iter()
            .map(|c| c.end)
            .max()
            .unwrap_or(Timestamp::ZERO)
    }

    pub fn into_inner(self) -> Vec<CaptionRecord> {
        self.captions
    }
}

/// A group of consecutive captions treated as one retrieval and citation unit.
/// Its position in the windowed corpus is its citation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub combined_text: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

/// A question as emitted by the model. `insertion_time` is the model's own
/// guess and is never used for placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: i64,
    pub reason: String,
    pub topic: String,
    pub insertion_time: String,
    pub citations: Vec<i64>,
}

pub const ANSWER_COUNT: usize = 4;

impl Question {
    /// Checks the shape constraints JSON schema cannot express.
    pub fn check_shape(&self) -> std::result::Result<(), String> {
        if self.answers.len() != ANSWER_COUNT {
            return Err(format!(
                "expected {} answers, got {}",
                ANSWER_COUNT,
                self.answers.len()
            ));
        }
        if !(0..ANSWER_COUNT as i64).contains(&self.correct_answer_index) {
            return Err(format!(
                "correct answer index {} is outside 0..{}",
                self.correct_answer_index, ANSWER_COUNT
            ));
        }
        Ok(())
    }

    pub fn correct_answer(&self) -> Option<&str> {
        usize::try_from(self.correct_answer_index)
            .ok()
            .and_then(|i| self.answers.get(i))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Questions {
    pub questions: Vec<Question>,
}

/// Final, persisted form of a question, placed on the timeline of the window
/// it cites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedQuestion {
    pub start: Timestamp,
    pub end: Timestamp,
    pub topic: String,
    pub question: String,
    pub answers: Vec<String>,
    pub correct_answer_index: i64,
    pub reason: String,
}

/// A topic label covering a contiguous run of windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSegment {
    pub label: String,
    pub first_window: usize,
    pub last_window: usize,
    pub start: Timestamp,
    pub end: Timestamp,
}
