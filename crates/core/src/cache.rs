use std::{
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{config::Config, error::Result};

/// Bumped whenever the shape of a persisted artifact changes.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

pub fn get_root_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("vidquiz")
}

/// Lowercase, filesystem-safe rendering of a name. Runs of anything other
/// than ASCII alphanumerics, `-` and `.` collapse into one `_`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    if out.is_empty() { "_".to_string() } else { out }
}

/// Settings that shape the topic labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicSettings {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub group_size: usize,
}

/// Settings that shape the generated questions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionSettings {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub count: u32,
}

/// Everything the cached artifacts of one run depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIdentity {
    pub video: String,
    pub window_size: u32,
    pub topics: TopicSettings,
    pub questions: QuestionSettings,
}

impl ConfigIdentity {
    pub fn from_config(config: &Config) -> Self {
        let provider = config.credentials.provider.name().to_string();
        let model = config.credentials.model.clone();
        Self {
            video: config.video.clone(),
            window_size: config.window_size_secs,
            topics: TopicSettings {
                provider: provider.clone(),
                model: model.clone(),
                prompt: config.prompts.topic.clone(),
                group_size: config.topic_group_size,
            },
            questions: QuestionSettings {
                provider,
                model,
                prompt: config.prompts.question.clone(),
                count: config.question_count,
            },
        }
    }

    pub fn model(&self) -> &str {
        &self.questions.model
    }

    /// The part of the identity an artifact kind depends on, upstream
    /// stages included.
    pub fn stage(&self, kind: ArtifactKind) -> StageIdentity {
        StageIdentity {
            video: self.video.clone(),
            window_size: self.window_size,
            topics: (kind != ArtifactKind::Transcript).then(|| self.topics.clone()),
            questions: (kind == ArtifactKind::Questions).then(|| self.questions.clone()),
        }
    }
}

/// Identity recorded in, and checked against, each cached envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageIdentity {
    pub video: String,
    pub window_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<TopicSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub questions: Option<QuestionSettings>,
}

impl StageIdentity {
    /// Short hex digest used to keep file names of different settings apart.
    pub fn fingerprint(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{:016x}", hasher.finish())[..8].to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Transcript,
    Topics,
    Questions,
}

impl ArtifactKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Topics => "topics",
            ArtifactKind::Questions => "questions",
        }
    }

    /// Artifacts downstream of this one.
    pub fn downstream(&self) -> &'static [ArtifactKind] {
        match self {
            ArtifactKind::Transcript => &[ArtifactKind::Topics, ArtifactKind::Questions],
            ArtifactKind::Topics => &[ArtifactKind::Questions],
            ArtifactKind::Questions => &[],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-disk envelope around every artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedArtifact<T> {
    pub schema_version: u32,
    pub kind: ArtifactKind,
    pub identity: StageIdentity,
    pub payload: T,
}

/// Header of an envelope, read before the payload so version and identity
/// mismatches can be told apart from corruption.
#[derive(Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
    kind: ArtifactKind,
    identity: StageIdentity,
}

/// Per-video artifact store under the cache root.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    identity: ConfigIdentity,
}

impl ArtifactCache {
    pub fn new(root: &Path, identity: ConfigIdentity) -> Self {
        Self {
            dir: root.join(slug(&identity.video)),
            identity,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity(&self) -> &ConfigIdentity {
        &self.identity
    }

    /// Get the path for a cached artifact (window size and settings aware)
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        let window = self.identity.window_size;
        let file = match kind {
            ArtifactKind::Transcript => format!("transcript_w{window}.json"),
            _ => format!(
                "{}_w{window}_{}_{}.json",
                kind,
                slug(self.identity.model()),
                self.identity.stage(kind).fingerprint()
            ),
        };
        self.dir.join(file)
    }

    /// Load an artifact. Returns `Ok(None)` when it is missing or unusable;
    /// unusable files are logged and left for the next save to replace.
    pub async fn load<T: DeserializeOwned>(&self, kind: ArtifactKind) -> Result<Option<T>> {
        let path = self.path(kind);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached {kind}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let header: EnvelopeHeader = match serde_json::from_str(&content) {
            Ok(header) => header,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cached {kind}, regenerating");
                return Ok(None);
            }
        };
        if header.schema_version != ARTIFACT_SCHEMA_VERSION {
            warn!(
                path = %path.display(),
                found = header.schema_version,
                expected = ARTIFACT_SCHEMA_VERSION,
                "cached {kind} has an unsupported schema version, regenerating"
            );
            return Ok(None);
        }
        if header.kind != kind || header.identity != self.identity.stage(kind) {
            warn!(
                path = %path.display(),
                found_kind = %header.kind,
                "cached {kind} belongs to a different configuration, regenerating"
            );
            return Ok(None);
        }

        match serde_json::from_str::<CachedArtifact<T>>(&content) {
            Ok(envelope) => {
                info!(path = %path.display(), "loaded cached {kind}");
                Ok(Some(envelope.payload))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cached {kind}, regenerating");
                Ok(None)
            }
        }
    }

    pub async fn save<T: Serialize>(&self, kind: ArtifactKind, payload: &T) -> Result<PathBuf> {
        let envelope = CachedArtifact {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            kind,
            identity: self.identity.stage(kind),
            payload,
        };
        let path = self.path(kind);
        fs::create_dir_all(&self.dir).await?;
        fs::write(&path, serde_json::to_string_pretty(&envelope)?).await?;
        debug!(path = %path.display(), "saved {kind}");
        Ok(path)
    }
}
