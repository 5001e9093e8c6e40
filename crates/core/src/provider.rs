use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Provider {
    #[default]
    Openai,
    Azure,
    Grok,
    Gemini,
}

pub struct ProviderConfig {
    /// Chat-completions URL. Empty for Azure, whose URL is built from the
    /// resource endpoint and deployment.
    pub api_url: &'static str,
    pub model: &'static str,
    pub env_var: &'static str,
}

impl Provider {
    pub fn config(&self) -> ProviderConfig {
        match self {
            Provider::Openai => ProviderConfig {
                api_url: "https://api.openai.com/v1/chat/completions",
                model: "gpt-4o-mini",
                env_var: "OPENAI_API_KEY",
            },
            Provider::Azure => ProviderConfig {
                api_url: "",
                model: "",
                env_var: "AZURE_OPENAI_API_KEY",
            },
            Provider::Grok => ProviderConfig {
                api_url: "https://api.x.ai/v1/chat/completions",
                model: "grok-4-fast",
                env_var: "XAI_API_KEY",
            },
            Provider::Gemini => ProviderConfig {
                api_url: "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions",
                model: "gemini-2.5-flash",
                env_var: "GEMINI_API_KEY",
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Provider::Openai => "OpenAI",
            Provider::Azure => "Azure OpenAI",
            Provider::Grok => "Grok",
            Provider::Gemini => "Gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::Openai),
            "azure" => Ok(Provider::Azure),
            "grok" => Ok(Provider::Grok),
            "gemini" => Ok(Provider::Gemini),
            other => Err(format!(
                "unknown provider {other:?}, expected openai, azure, grok or gemini"
            )),
        }
    }
}
