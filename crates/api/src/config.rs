//! Application configuration

use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,
    pub cors_origin: Option<String>,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Redis (job queue)
    pub redis_url: String,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub cookie_secure: bool,

    // AI summaries and transcription
    pub ai_api_key: String,
    pub ai_base_url: String,
    pub ai_summary_model: String,
    pub ai_transcription_model: String,

    // WebSocket
    pub ws_max_audio_chunk_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Redis
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            cookie_secure: env::var("COOKIE_SECURE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),

            // AI
            ai_api_key: env::var("AI_API_KEY").unwrap_or_default(),
            ai_base_url: env::var("AI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            ai_summary_model: env::var("AI_SUMMARY_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ai_transcription_model: env::var("AI_TRANSCRIPTION_MODEL")
                .unwrap_or_else(|_| "whisper-1".to_string()),

            // WebSocket
            ws_max_audio_chunk_bytes: env::var("WS_MAX_AUDIO_CHUNK_BYTES")
                .unwrap_or_else(|_| "1048576".to_string()) // 1MB default
                .parse()
                .unwrap_or(1_048_576),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn setup_minimal_config() {
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    fn cleanup_config() {
        env::remove_var("DATABASE_URL");
        env::remove_var("JWT_SECRET");
        env::remove_var("JWT_EXPIRY_HOURS");
        env::remove_var("CORS_ORIGIN");
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        cleanup_config();
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::Missing("DATABASE_URL"))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_short_jwt_secret_rejected() {
        setup_minimal_config();
        env::set_var("JWT_SECRET", "too-short");

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_defaults_applied() {
        setup_minimal_config();
        env::set_var("JWT_EXPIRY_HOURS", "not-a-number");
        env::set_var("CORS_ORIGIN", "");

        let config = Config::from_env().unwrap();
        assert_eq!(config.jwt_expiry_hours, 24);
        assert_eq!(config.ws_max_audio_chunk_bytes, 1_048_576);
        assert!(config.cors_origin.is_none());

        cleanup_config();
    }
}
