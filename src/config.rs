use async_openai::types::realtime::RealtimeVoice;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub realtime_model: String,
    pub voice: RealtimeVoice,
    pub knowledge_base_path: PathBuf,
    pub greeting_enabled: bool,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5050".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        // The call cannot exist without the speech service credential, so its
        // absence is fatal before any session is accepted.
        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let realtime_model = std::env::var("REALTIME_MODEL")
            .unwrap_or_else(|_| "gpt-4o-realtime-preview-2024-10-01".to_string());

        let voice_str = std::env::var("VOICE").unwrap_or_else(|_| "alloy".to_string());
        let voice = parse_voice(&voice_str).ok_or_else(|| {
            ConfigError::InvalidValue(
                "VOICE".to_string(),
                format!("'{}' is not a supported voice", voice_str),
            )
        })?;

        let knowledge_base_path = std::env::var("KNOWLEDGE_BASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./knowledge_base.csv"));

        let greeting_enabled = match std::env::var("GREETING_ENABLED") {
            Ok(value) => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue("GREETING_ENABLED".to_string(), value));
                }
            },
            Err(_) => false,
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            realtime_model,
            voice,
            knowledge_base_path,
            greeting_enabled,
            log_level,
        })
    }
}

/// Maps a voice name onto the realtime voice identifiers the speech service
/// accepts.
fn parse_voice(value: &str) -> Option<RealtimeVoice> {
    match value.to_lowercase().as_str() {
        "alloy" => Some(RealtimeVoice::Alloy),
        "ash" => Some(RealtimeVoice::Ash),
        "ballad" => Some(RealtimeVoice::Ballad),
        "coral" => Some(RealtimeVoice::Coral),
        "echo" => Some(RealtimeVoice::Echo),
        "sage" => Some(RealtimeVoice::Sage),
        "shimmer" => Some(RealtimeVoice::Shimmer),
        "verse" => Some(RealtimeVoice::Verse),
        _ => None,
    }
}
