pub mod cache;
pub mod captions;
pub mod citation;
pub mod config;
pub mod error;
pub mod format;
pub mod generation;
pub mod pipeline;
pub mod provider;
pub mod retrieval;
pub mod retry;
pub mod synthesizer;
pub mod topics;
pub mod types;
pub mod window;

pub use cache::{
    ArtifactCache, ArtifactKind, ConfigIdentity, QuestionSettings, StageIdentity, TopicSettings,
    get_root_cache_dir,
};
pub use captions::{find_caption_files, load_transcript, parse_srt, select_caption_file};
pub use citation::resolve;
pub use config::{Config, ConfigError};
pub use error::{QuizError, Result};
pub use format::{format_quiz_readable, format_timestamp};
pub use generation::{ChatCompletionsClient, GenerationRequest, GenerativeService};
pub use pipeline::{
    Origin, Pipeline, PipelineOutput, QuestionArtifact, Staged, TopicArtifact, TranscriptArtifact,
};
pub use provider::{Provider, ProviderConfig};
pub use retrieval::{FullCorpusRetriever, Passage, Retriever};
pub use retry::{ErrorClass, RetryPolicy};
pub use synthesizer::QuestionSynthesizer;
pub use topics::{LabelingTopicService, TopicService};
pub use types::{
    CaptionRecord, Question, Questions, ResolvedQuestion, Timestamp, TopicSegment, Transcript,
    WindowRecord,
};
pub use window::segment;
