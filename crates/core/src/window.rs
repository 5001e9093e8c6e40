use tracing::{debug, info};

use crate::{
    error::{QuizError, Result},
    types::{CaptionRecord, WindowRecord},
};

const WIDEN_STEP_MS: u64 = 1000;

/// Merge sorted captions into windows of roughly `window_size_secs` each.
///
/// A window starts at the cursor and takes every following caption whose
/// start lies before `cursor + duration`. When none does, the duration grows
/// by one second and the same cursor is retried, so gaps in speech never drop
/// captions. After a window is emitted the cursor moves to the end of its
/// last caption and the duration resets.
///
/// Every caption lands in exactly one window and windows keep source order.
///
/// Captions must be sorted by start time; an unsorted slice fails with
/// `UnsortedTranscript` instead of being reordered.
pub fn segment(transcript: &[CaptionRecord], window_size_secs: u32) -> Result<Vec<WindowRecord>> {
    let first = transcript.first().ok_or(QuizError::EmptyTranscript)?;
    if window_size_secs == 0 {
        return Err(QuizError::InvalidWindowSize);
    }
    if let Some(index) = transcript
        .windows(2)
        .position(|pair| pair[1].start < pair[0].start)
    {
        return Err(QuizError::UnsortedTranscript { index: index + 1 });
    }

    let window_ms = u64::from(window_size_secs) * 1000;
    let mut windows = Vec::new();
    let mut current_start = first.start;
    let mut duration_ms = window_ms;
    let mut next = 0;

    while next < transcript.len() {
        let limit = current_start.saturating_add_millis(duration_ms);
        let run_len = transcript[next..]
            .iter()
            .take_while(|caption| caption.start < limit)
            .count();

        if run_len == 0 {
            duration_ms += WIDEN_STEP_MS;
            continue;
        }

        let run = &transcript[next..next + run_len];
        let last = &run[run_len - 1];
        windows.push(WindowRecord {
            combined_text: run
                .iter()
                .map(|caption| caption.text.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            start: run[0].start,
            end: last.end,
        });

        if duration_ms != window_ms {
            debug!(
                at = %current_start,
                widened_secs = duration_ms / 1000,
                "window widened across a caption gap"
            );
        }

        current_start = current_start.max(last.end);
        duration_ms = window_ms;
        next += run_len;
    }

    info!(
        captions = transcript.len(),
        windows = windows.len(),
        window_size_secs,
        "combined transcript into windows"
    );
    Ok(windows)
}
