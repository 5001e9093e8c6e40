//! Run configuration, read once from the environment at startup.
//!
//! Every variable is validated before anything fails, so a single run reports
//! all configuration problems at once.

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use tracing::info;

use crate::{cache::get_root_cache_dir, provider::Provider, retry::RetryPolicy};

pub const DEFAULT_WINDOW_SIZE_SECS: u32 = 30;
pub const DEFAULT_QUESTION_COUNT: u32 = 10;
pub const DEFAULT_TOPIC_GROUP_SIZE: usize = 5;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_TOPIC_PROMPT: &str =
    "Give a single label that is only a few words long to summarize what these documents are about.";
pub const DEFAULT_QUESTION_PROMPT: &str = "You are a question-generating bot that generates questions for a given topic based on the provided relevant transcription text from a video.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigProblem {
    Missing { var: &'static str },
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigProblem::Missing { var } => write!(f, "{var} is not set"),
            ConfigProblem::Invalid { var, value, reason } => {
                write!(f, "{var}={value:?} is invalid: {reason}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub problems: Vec<ConfigProblem>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration")?;
        for problem in &self.problems {
            write!(f, "\n  - {problem}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub provider: Provider,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub api_version: Option<String>,
    /// Model name, or the deployment name for Azure.
    pub model: String,
    pub organization: Option<String>,
}

impl Credentials {
    pub fn chat_url(&self) -> String {
        match (self.provider, &self.endpoint) {
            (Provider::Azure, Some(endpoint)) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                self.model,
                self.api_version.as_deref().unwrap_or_default()
            ),
            (_, Some(endpoint)) => endpoint.clone(),
            (provider, None) => provider.config().api_url.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverwriteFlags {
    pub transcript: bool,
    pub topics: bool,
    pub questions: bool,
}

impl OverwriteFlags {
    /// Rebuilding a stage invalidates every later stage.
    pub fn cascade(self) -> Self {
        let topics = self.topics || self.transcript;
        let questions = self.questions || topics;
        Self {
            transcript: self.transcript,
            topics,
            questions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub topic: String,
    pub question: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC_PROMPT.to_string(),
            question: DEFAULT_QUESTION_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub captions_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub credentials: Credentials,
    pub video: String,
    pub window_size_secs: u32,
    pub question_count: u32,
    pub topic_group_size: usize,
    pub overwrite: OverwriteFlags,
    pub prompts: Prompts,
    pub paths: Paths,
    pub retry: RetryPolicy,
    /// Upper bound on a single HTTP attempt.
    pub request_timeout: Duration,
}

struct Reader<F> {
    lookup: F,
    problems: Vec<ConfigProblem>,
}

impl<F> Reader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, var: &'static str) -> Option<String> {
        (self.lookup)(var).filter(|v| !v.trim().is_empty())
    }

    fn required(&mut self, var: &'static str) -> Option<String> {
        let value = self.optional(var);
        if value.is_none() {
            self.problems.push(ConfigProblem::Missing { var });
        }
        value
    }

    fn invalid(&mut self, var: &'static str, value: String, reason: impl Into<String>) {
        self.problems.push(ConfigProblem::Invalid {
            var,
            value,
            reason: reason.into(),
        });
    }

    fn positive<T>(&mut self, var: &'static str, default: T) -> T
    where
        T: FromStr + PartialOrd + Default + Copy,
    {
        let Some(raw) = self.optional(var) else {
            return default;
        };
        match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => value,
            Ok(_) => {
                self.invalid(var, raw, "must be greater than zero");
                default
            }
            Err(_) => {
                self.invalid(var, raw, "must be a whole number");
                default
            }
        }
    }

    fn flag(&mut self, var: &'static str) -> bool {
        let Some(raw) = self.optional(var) else {
            return false;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            _ => {
                self.invalid(var, raw, "expected 0 or 1");
                false
            }
        }
    }

    fn text(&self, var: &'static str, default: &str) -> String {
        self.optional(var).unwrap_or_else(|| default.to_string())
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut r = Reader {
            lookup,
            problems: Vec::new(),
        };

        let provider = match r.optional("LLM_PROVIDER") {
            None => Some(Provider::default()),
            Some(raw) => match raw.parse::<Provider>() {
                Ok(provider) => Some(provider),
                Err(reason) => {
                    r.invalid("LLM_PROVIDER", raw, reason);
                    None
                }
            },
        };

        let credentials = provider.and_then(|provider| read_credentials(&mut r, provider));
        let video = r.required("VIDEO_TO_USE");

        let window_size_secs = r.positive("WINDOW_SIZE", DEFAULT_WINDOW_SIZE_SECS);
        let question_count = r.positive("QUESTION_COUNT", DEFAULT_QUESTION_COUNT);
        let topic_group_size = r.positive("TOPIC_GROUP_SIZE", DEFAULT_TOPIC_GROUP_SIZE);

        let requested = OverwriteFlags {
            transcript: r.flag("OVERWRITE_EXISTING_TRANSCRIPT"),
            topics: r.flag("OVERWRITE_EXISTING_TOPICMODEL"),
            questions: r.flag("OVERWRITE_EXISTING_QUESTIONS"),
        };

        let prompts = Prompts {
            topic: r
                .optional("TOPIC_PROMPT")
                .or_else(|| r.optional("LANGCHAIN_PROMPT"))
                .unwrap_or_else(|| DEFAULT_TOPIC_PROMPT.to_string()),
            question: r.text("QUESTION_PROMPT", DEFAULT_QUESTION_PROMPT),
        };

        let dir = |var, default: fn() -> PathBuf| r.optional(var).map_or_else(default, PathBuf::from);
        let paths = Paths {
            captions_dir: dir("CAPTIONS_DIR", || PathBuf::from("Captions")),
            cache_dir: dir("CACHE_DIR", get_root_cache_dir),
            output_dir: dir("OUTPUT_DIR", || PathBuf::from("Output Data")),
        };

        let defaults = RetryPolicy::default();
        let max_attempts = r.positive("RETRY_MAX_ATTEMPTS", defaults.max_attempts);
        let cooldown_secs = match r.optional("RETRY_COOLDOWN_SECS") {
            None => defaults.cooldown.as_secs(),
            Some(raw) => raw.trim().parse::<u64>().unwrap_or_else(|_| {
                r.invalid("RETRY_COOLDOWN_SECS", raw, "must be a whole number of seconds");
                defaults.cooldown.as_secs()
            }),
        };
        let retry = RetryPolicy {
            max_attempts,
            cooldown: Duration::from_secs(cooldown_secs),
            ..defaults
        };
        let request_timeout = Duration::from_secs(
            r.positive("REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        match (credentials, video) {
            (Some(credentials), Some(video)) if r.problems.is_empty() => {
                let overwrite = requested.cascade();
                if overwrite.topics && !requested.topics {
                    info!("transcript is being overwritten, topics will be too");
                }
                if overwrite.questions && !requested.questions {
                    info!("an earlier stage is being overwritten, questions will be too");
                }
                Ok(Config {
                    credentials,
                    video,
                    window_size_secs,
                    question_count,
                    topic_group_size,
                    overwrite,
                    prompts,
                    paths,
                    retry,
                    request_timeout,
                })
            }
            _ => Err(ConfigError {
                problems: r.problems,
            }),
        }
    }
}

fn read_credentials<F>(r: &mut Reader<F>, provider: Provider) -> Option<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = provider.config();
    let api_key = r.required(defaults.env_var);
    let organization = r.optional("OPENAI_API_ORGANIZATION");

    let (endpoint, api_version, model) = if provider == Provider::Azure {
        let endpoint = r.required("AZURE_OPENAI_ENDPOINT");
        let api_version = r.required("OPENAI_API_VERSION");
        let model = r.required("LLM_MODEL");
        (endpoint, api_version, model)
    } else {
        let model = r.text("LLM_MODEL", defaults.model);
        (r.optional("LLM_ENDPOINT"), None, Some(model))
    };

    if provider == Provider::Azure && (endpoint.is_none() || api_version.is_none()) {
        return None;
    }

    Some(Credentials {
        provider,
        api_key: api_key?,
        endpoint,
        api_version,
        model: model?,
        organization,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config =
            Config::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test"), ("VIDEO_TO_USE", "lecture")]))
                .unwrap();
        assert_eq!(config.credentials.provider, Provider::Openai);
        assert_eq!(config.credentials.model, "gpt-4o-mini");
        assert_eq!(
            config.credentials.chat_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(config.window_size_secs, 30);
        assert_eq!(config.question_count, 10);
        assert_eq!(config.overwrite, OverwriteFlags::default());
        assert_eq!(config.prompts, Prompts::default());
        assert_eq!(config.paths.captions_dir, PathBuf::from("Captions"));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.request_timeout, Duration::from_secs(120));
    }

    #[test]
    fn reports_every_problem_at_once() {
        let err = Config::from_lookup(lookup(&[
            ("WINDOW_SIZE", "0"),
            ("QUESTION_COUNT", "lots"),
            ("OVERWRITE_EXISTING_QUESTIONS", "maybe"),
        ]))
        .unwrap_err();

        assert!(err.problems.contains(&ConfigProblem::Missing { var: "OPENAI_API_KEY" }));
        assert!(err.problems.contains(&ConfigProblem::Missing { var: "VIDEO_TO_USE" }));
        let invalid: Vec<_> = err
            .problems
            .iter()
            .filter_map(|p| match p {
                ConfigProblem::Invalid { var, .. } => Some(*var),
                _ => None,
            })
            .collect();
        assert_eq!(
            invalid,
            vec!["WINDOW_SIZE", "QUESTION_COUNT", "OVERWRITE_EXISTING_QUESTIONS"]
        );

        let message = err.to_string();
        assert!(message.contains("VIDEO_TO_USE is not set"));
        assert!(message.contains("WINDOW_SIZE=\"0\""));
    }

    #[test]
    fn transcript_overwrite_cascades() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VIDEO_TO_USE", "lecture"),
            ("OVERWRITE_EXISTING_TRANSCRIPT", "1"),
        ]))
        .unwrap();
        assert_eq!(
            config.overwrite,
            OverwriteFlags {
                transcript: true,
                topics: true,
                questions: true
            }
        );

        let flags = OverwriteFlags {
            topics: true,
            ..OverwriteFlags::default()
        }
        .cascade();
        assert!(!flags.transcript && flags.topics && flags.questions);
    }

    #[test]
    fn azure_requires_endpoint_version_and_deployment() {
        let err = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "azure"),
            ("AZURE_OPENAI_API_KEY", "key"),
            ("VIDEO_TO_USE", "lecture"),
        ]))
        .unwrap_err();
        assert_eq!(
            err.problems,
            vec![
                ConfigProblem::Missing { var: "AZURE_OPENAI_ENDPOINT" },
                ConfigProblem::Missing { var: "OPENAI_API_VERSION" },
                ConfigProblem::Missing { var: "LLM_MODEL" },
            ]
        );

        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "Azure"),
            ("AZURE_OPENAI_API_KEY", "key"),
            ("AZURE_OPENAI_ENDPOINT", "https://example.openai.azure.com/"),
            ("OPENAI_API_VERSION", "2024-06-01"),
            ("LLM_MODEL", "quiz-deployment"),
            ("VIDEO_TO_USE", "lecture"),
        ]))
        .unwrap();
        assert_eq!(
            config.credentials.chat_url(),
            "https://example.openai.azure.com/openai/deployments/quiz-deployment/chat/completions?api-version=2024-06-01"
        );
    }

    #[test]
    fn unknown_provider_is_reported() {
        let err = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "parrot"),
            ("VIDEO_TO_USE", "lecture"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err.problems.as_slice(),
            [ConfigProblem::Invalid { var: "LLM_PROVIDER", .. }]
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_lookup(lookup(&[
            ("LLM_PROVIDER", "grok"),
            ("XAI_API_KEY", "xai"),
            ("LLM_MODEL", "grok-custom"),
            ("VIDEO_TO_USE", "lecture"),
            ("WINDOW_SIZE", "45"),
            ("QUESTION_PROMPT", "Ask hard questions."),
            ("CACHE_DIR", "/tmp/quiz-cache"),
            ("RETRY_MAX_ATTEMPTS", "5"),
            ("RETRY_COOLDOWN_SECS", "0"),
            ("REQUEST_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.credentials.model, "grok-custom");
        assert_eq!(config.window_size_secs, 45);
        assert_eq!(config.prompts.question, "Ask hard questions.");
        assert_eq!(config.paths.cache_dir, PathBuf::from("/tmp/quiz-cache"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.cooldown, Duration::ZERO);
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn zero_request_timeout_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("VIDEO_TO_USE", "lecture"),
            ("REQUEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err.problems.as_slice(),
            [ConfigProblem::Invalid { var: "REQUEST_TIMEOUT_SECS", .. }]
        ));
    }

    #[test]
    fn langchain_prompt_stands_in_for_topic_prompt() {
        let base = [("OPENAI_API_KEY", "sk-test"), ("VIDEO_TO_USE", "lecture")];

        let mut vars = base.to_vec();
        vars.push(("LANGCHAIN_PROMPT", "Label the lecture part."));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.prompts.topic, "Label the lecture part.");

        vars.push(("TOPIC_PROMPT", "Name the theme."));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.prompts.topic, "Name the theme.");
    }
}
