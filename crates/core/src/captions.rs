use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::{QuizError, Result},
    types::{CaptionRecord, Timestamp, Transcript},
};

const ARROW: &str = "-->";

struct PendingCue {
    start: Timestamp,
    end: Timestamp,
    lines: Vec<String>,
}

impl PendingCue {
    fn finish(self, out: &mut Vec<CaptionRecord>) {
        if self.lines.is_empty() {
            debug!(start = %self.start, "skipping cue without text");
            return;
        }
        out.push(CaptionRecord {
            text: self.lines.join(" "),
            start: self.start,
            end: self.end,
        });
    }
}

fn parse_timing_line(line: &str, line_no: usize) -> Result<(Timestamp, Timestamp)> {
    let invalid = |reason: String| QuizError::InvalidCaption {
        line: line_no,
        reason,
    };

    let (start, end) = line
        .split_once(ARROW)
        .ok_or_else(|| invalid(format!("expected timing line, got {:?}", line)))?;
    // Some files carry cue settings after the end time.
    let end = end.split_whitespace().next().unwrap_or_default();

    let start: Timestamp = start.parse().map_err(|e| invalid(format!("{e}")))?;
    let end: Timestamp = end.parse().map_err(|e| invalid(format!("{e}")))?;
    if end < start {
        return Err(invalid(format!("cue ends ({end}) before it starts ({start})")));
    }
    Ok((start, end))
}

/// Parse SRT content into caption records sorted by start time.
pub fn parse_srt(content: &str) -> Result<Vec<CaptionRecord>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut records = Vec::new();
    let mut pending: Option<PendingCue> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if line.is_empty() {
            if let Some(cue) = pending.take() {
                cue.finish(&mut records);
            }
            continue;
        }

        if line.contains(ARROW) {
            if let Some(cue) = pending.take() {
                cue.finish(&mut records);
            }
            let (start, end) = parse_timing_line(line, line_no)?;
            pending = Some(PendingCue {
                start,
                end,
                lines: Vec::new(),
            });
            continue;
        }

        match pending.as_mut() {
            Some(cue) => cue.lines.push(line.to_string()),
            None if line.bytes().all(|b| b.is_ascii_digit()) => {}
            None => {
                return Err(QuizError::InvalidCaption {
                    line: line_no,
                    reason: format!("text outside of a cue: {:?}", line),
                });
            }
        }
    }

    if let Some(cue) = pending.take() {
        cue.finish(&mut records);
    }

    if records.is_empty() && !content.trim().is_empty() {
        return Err(QuizError::EmptyTranscript);
    }

    records.sort_by_key(|r| r.start);
    Ok(records)
}

/// List the `*.srt` files for a video, sorted by file name.
pub fn find_caption_files(captions_dir: &Path, video: &str) -> Result<Vec<PathBuf>> {
    if !captions_dir.is_dir() {
        return Err(QuizError::CaptionsFolderMissing {
            path: captions_dir.to_path_buf(),
        });
    }

    let video_dir = captions_dir.join(video);
    if !video_dir.is_dir() {
        return Err(QuizError::VideoFolderMissing {
            video: video.to_string(),
            captions_dir: captions_dir.to_path_buf(),
        });
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(&video_dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("srt"))
        })
        .collect();

    if files.is_empty() {
        return Err(QuizError::NoCaptionFiles { path: video_dir });
    }

    files.sort();
    Ok(files)
}

/// Pick the caption file to use. Files are never merged.
pub fn select_caption_file(files: &[PathBuf]) -> Option<&Path> {
    let first = files.first()?;
    if files.len() > 1 {
        info!(
            chosen = %first.display(),
            candidates = files.len(),
            "multiple SRT files found, using the first one"
        );
    }
    Some(first.as_path())
}

/// Read and parse one caption file.
pub async fn load_transcript(path: &Path) -> Result<Transcript> {
    let content = fs::read_to_string(path).await?;
    let transcript = Transcript::new(parse_srt(&content)?)?;
    info!(
        file = %path.display(),
        captions = transcript.captions().len(),
        duration = %transcript.duration(),
        "transcript data extracted"
    );
    Ok(transcript)
}
