use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info};

use crate::{
    cache::{ArtifactCache, ArtifactKind, ConfigIdentity, slug},
    captions::{find_caption_files, load_transcript, select_caption_file},
    citation::resolve,
    config::{Config, OverwriteFlags},
    error::{QuizError, Result},
    generation::GenerativeService,
    retrieval::Retriever,
    synthesizer::QuestionSynthesizer,
    topics::{LabelingTopicService, TopicService},
    types::{CaptionRecord, Questions, ResolvedQuestion, TopicSegment, WindowRecord},
    window::segment,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptArtifact {
    pub source_file: PathBuf,
    pub captions: Vec<CaptionRecord>,
    pub windows: Vec<WindowRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicArtifact {
    pub topics: Vec<TopicSegment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionArtifact {
    pub raw: Questions,
    pub resolved: Vec<ResolvedQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cached,
    Generated,
}

/// A stage result and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged<T> {
    pub value: T,
    pub origin: Origin,
}

impl<T> Staged<T> {
    pub fn is_cached(&self) -> bool {
        self.origin == Origin::Cached
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub transcript: Staged<TranscriptArtifact>,
    pub topics: Staged<TopicArtifact>,
    pub questions: Staged<QuestionArtifact>,
    pub output_path: PathBuf,
}

/// Runs the stages in order, each one loaded from the artifact cache when
/// allowed and otherwise rebuilt and persisted before the next starts.
pub struct Pipeline<'a> {
    config: &'a Config,
    cache: ArtifactCache,
    topic_service: Arc<dyn TopicService>,
    synthesizer: QuestionSynthesizer,
    overwrite: OverwriteFlags,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a Config,
        generator: Arc<dyn GenerativeService>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        let topic_service = Arc::new(LabelingTopicService::new(
            generator.clone(),
            config.prompts.topic.clone(),
            config.topic_group_size,
        ));
        let synthesizer =
            QuestionSynthesizer::new(retriever, generator, config.prompts.question.clone());
        let identity = ConfigIdentity::from_config(config);

        Self {
            config,
            cache: ArtifactCache::new(&config.paths.cache_dir, identity),
            topic_service,
            synthesizer,
            overwrite: config.overwrite,
        }
    }

    pub fn with_topic_service(mut self, topic_service: Arc<dyn TopicService>) -> Self {
        self.topic_service = topic_service;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    fn overwrite_flag(&mut self, kind: ArtifactKind) -> &mut bool {
        match kind {
            ArtifactKind::Transcript => &mut self.overwrite.transcript,
            ArtifactKind::Topics => &mut self.overwrite.topics,
            ArtifactKind::Questions => &mut self.overwrite.questions,
        }
    }

    async fn cached<T>(&mut self, kind: ArtifactKind) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        if *self.overwrite_flag(kind) {
            info!(video = %self.config.video, "overwriting {kind}");
            return Ok(None);
        }
        self.cache.load(kind).await
    }

    /// Persist a freshly built artifact and force everything downstream of
    /// it to be rebuilt.
    async fn store<T: Serialize>(&mut self, kind: ArtifactKind, value: &T) -> Result<()> {
        let path = self.cache.save(kind, value).await?;
        info!(path = %path.display(), "{kind} saved");
        for downstream in kind.downstream() {
            *self.overwrite_flag(*downstream) = true;
        }
        Ok(())
    }

    fn log_failure(&self, kind: ArtifactKind, err: &QuizError) {
        error!(stage = %kind, video = %self.config.video, error = %err, "stage failed");
    }

    pub async fn transcript(&mut self) -> Result<Staged<TranscriptArtifact>> {
        let result = self.build_transcript().await;
        if let Err(e) = &result {
            self.log_failure(ArtifactKind::Transcript, e);
        }
        result
    }

    async fn build_transcript(&mut self) -> Result<Staged<TranscriptArtifact>> {
        if let Some(value) = self.cached(ArtifactKind::Transcript).await? {
            return Ok(Staged {
                value,
                origin: Origin::Cached,
            });
        }

        let files = find_caption_files(&self.config.paths.captions_dir, &self.config.video)?;
        let source_file = select_caption_file(&files)
            .ok_or_else(|| QuizError::NoCaptionFiles {
                path: self.config.paths.captions_dir.join(&self.config.video),
            })?
            .to_path_buf();
        let transcript = load_transcript(&source_file).await?;
        let windows = segment(transcript.captions(), self.config.window_size_secs)?;

        let value = TranscriptArtifact {
            source_file,
            captions: transcript.into_inner(),
            windows,
        };
        self.store(ArtifactKind::Transcript, &value).await?;
        Ok(Staged {
            value,
            origin: Origin::Generated,
        })
    }

    pub async fn topics(
        &mut self,
        transcript: &TranscriptArtifact,
    ) -> Result<Staged<TopicArtifact>> {
        let result = self.build_topics(transcript).await;
        if let Err(e) = &result {
            self.log_failure(ArtifactKind::Topics, e);
        }
        result
    }

    async fn build_topics(
        &mut self,
        transcript: &TranscriptArtifact,
    ) -> Result<Staged<TopicArtifact>> {
        if let Some(value) = self.cached(ArtifactKind::Topics).await? {
            return Ok(Staged {
                value,
                origin: Origin::Cached,
            });
        }

        let topics = self
            .topic_service
            .extract_topics(&transcript.windows)
            .await?;
        let value = TopicArtifact { topics };
        self.store(ArtifactKind::Topics, &value).await?;
        Ok(Staged {
            value,
            origin: Origin::Generated,
        })
    }

    pub async fn questions(
        &mut self,
        transcript: &TranscriptArtifact,
        topics: &TopicArtifact,
    ) -> Result<Staged<QuestionArtifact>> {
        let result = self.build_questions(transcript, topics).await;
        if let Err(e) = &result {
            self.log_failure(ArtifactKind::Questions, e);
        }
        result
    }

    async fn build_questions(
        &mut self,
        transcript: &TranscriptArtifact,
        topics: &TopicArtifact,
    ) -> Result<Staged<QuestionArtifact>> {
        if let Some(value) = self.cached(ArtifactKind::Questions).await? {
            return Ok(Staged {
                value,
                origin: Origin::Cached,
            });
        }

        let raw = self
            .synthesizer
            .synthesize(
                &transcript.windows,
                &topics.topics,
                self.config.question_count,
            )
            .await?;
        let resolved = resolve(&raw.questions, &transcript.windows)?;

        let value = QuestionArtifact { raw, resolved };
        self.store(ArtifactKind::Questions, &value).await?;
        Ok(Staged {
            value,
            origin: Origin::Generated,
        })
    }

    /// Get the path of the resolved question file for this configuration
    pub fn output_path(&self) -> PathBuf {
        let identity = self.cache.identity();
        output_path(
            &self.config.paths.output_dir,
            &identity.video,
            identity.model(),
            &identity.stage(ArtifactKind::Questions).fingerprint(),
        )
    }

    /// Rewrite the resolved question file. Identical artifacts give
    /// byte-identical files.
    pub async fn write_output(&self, questions: &QuestionArtifact) -> Result<PathBuf> {
        let result = self.write_questions(questions).await;
        if let Err(e) = &result {
            error!(stage = "output", video = %self.config.video, error = %e, "stage failed");
        }
        result
    }

    async fn write_questions(&self, questions: &QuestionArtifact) -> Result<PathBuf> {
        let path = self.output_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        fs::write(&path, serde_json::to_string_pretty(&questions.resolved)?).await?;
        info!(path = %path.display(), questions = questions.resolved.len(), "questions written");
        Ok(path)
    }

    pub async fn run(&mut self) -> Result<PipelineOutput> {
        let transcript = self.transcript().await?;
        let topics = self.topics(&transcript.value).await?;
        let questions = self.questions(&transcript.value, &topics.value).await?;
        let output_path = self.write_output(&questions.value).await?;

        Ok(PipelineOutput {
            transcript,
            topics,
            questions,
            output_path,
        })
    }
}

/// Resolved questions land in `<output_dir>/<video>/questions - <model> - <fingerprint>.json`,
/// so runs with different question settings never overwrite each other.
pub fn output_path(output_dir: &Path, video: &str, model: &str, fingerprint: &str) -> PathBuf {
    output_dir
        .join(slug(video))
        .join(format!("questions - {} - {fingerprint}.json", slug(model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_uses_video_model_and_fingerprint() {
        assert_eq!(
            output_path(Path::new("Output Data"), "Week 2", "gpt-4o-mini", "0a1b2c3d"),
            Path::new("Output Data/week_2/questions - gpt-4o-mini - 0a1b2c3d.json")
        );
    }
}
