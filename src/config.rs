//! Runtime configuration loaded from environment variables.
//!
//! Every option has a development-friendly default so the service boots with
//! nothing but a `.env` file (or nothing at all).

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    // LLM endpoint (OpenAI-compatible, NVIDIA NIM by default)
    pub nim_base_url: String,
    pub nim_api_key: String,
    pub nim_model: String,

    /// Path of the sqlite file backing the durable record store.
    pub database_path: String,

    // Negotiation defaults
    pub default_beta: f64,
    pub default_alpha: f64,
    pub default_max_rounds: u32,
    pub default_session_ttl_seconds: u64,

    // Security
    pub min_response_delay_ms: u64,
    pub cors_allowed_origins: Vec<String>,
    pub api_admin_key: String,
    pub max_requests_per_minute_per_ip: u64,
    pub max_request_body_bytes: usize,

    /// development | staging | production
    pub env: String,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nim_base_url: "https://integrate.api.nvidia.com/v1".to_string(),
            nim_api_key: String::new(),
            nim_model: "z-ai/glm4_7".to_string(),
            database_path: "hagglebot.db".to_string(),
            default_beta: 5.0,
            default_alpha: 0.6,
            default_max_rounds: 15,
            default_session_ttl_seconds: 300,
            min_response_delay_ms: 2000,
            cors_allowed_origins: vec!["http://localhost:3000".to_string()],
            api_admin_key: String::new(),
            max_requests_per_minute_per_ip: 30,
            max_request_body_bytes: 65_536,
            env: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        Self {
            nim_base_url: string_var("NIM_BASE_URL", defaults.nim_base_url),
            nim_api_key: string_var("NIM_API_KEY", defaults.nim_api_key),
            nim_model: string_var("NIM_MODEL", defaults.nim_model),
            database_path: env::var("DATABASE_PATH")
                .or_else(|_| env::var("DB_PATH"))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.database_path),
            default_beta: parsed_var("DEFAULT_BETA", defaults.default_beta),
            default_alpha: parsed_var("DEFAULT_ALPHA", defaults.default_alpha),
            default_max_rounds: parsed_var("DEFAULT_MAX_ROUNDS", defaults.default_max_rounds),
            default_session_ttl_seconds: parsed_var(
                "DEFAULT_SESSION_TTL_SECONDS",
                defaults.default_session_ttl_seconds,
            ),
            min_response_delay_ms: parsed_var(
                "MIN_RESPONSE_DELAY_MS",
                defaults.min_response_delay_ms,
            ),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .filter(|v: &Vec<String>| !v.is_empty())
                .unwrap_or(defaults.cors_allowed_origins),
            api_admin_key: string_var("API_ADMIN_KEY", defaults.api_admin_key),
            max_requests_per_minute_per_ip: parsed_var(
                "MAX_REQUESTS_PER_MINUTE_PER_IP",
                defaults.max_requests_per_minute_per_ip,
            ),
            max_request_body_bytes: parsed_var(
                "MAX_REQUEST_BODY_BYTES",
                defaults.max_request_body_bytes,
            ),
            env: env::var("APP_ENV")
                .or_else(|_| env::var("ENV"))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.env),
            log_level: string_var("LOG_LEVEL", defaults.log_level),
        }
    }
}

fn string_var(name: &str, default: String) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_negotiation_prd() {
        let s = Settings::default();
        assert_eq!(s.default_beta, 5.0);
        assert_eq!(s.default_alpha, 0.6);
        assert_eq!(s.default_max_rounds, 15);
        assert_eq!(s.default_session_ttl_seconds, 300);
        assert_eq!(s.max_requests_per_minute_per_ip, 30);
        assert_eq!(s.max_request_body_bytes, 65_536);
    }
}
