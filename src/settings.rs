// Environment-driven service settings

use std::env;

#[derive(Debug, Clone)]
pub struct Settings {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub model_temperature: f64,
    pub request_timeout_seconds: u64,
    /// How many trailing messages a speaker sees per turn.
    pub history_limit: u32,
    pub default_max_rounds: u32,
    pub default_turn_interval_seconds: f64,
    pub max_consecutive_failures: u32,
    pub min_rounds_before_conclusion: u32,
    pub min_rounds_before_repetition_stop: u32,
    /// Retention cap for full message history; 0 keeps everything.
    pub message_retention_limit: usize,
    pub http_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            openrouter_api_key: String::new(),
            openrouter_base_url: "https://openrouter.ai/api/v1".to_string(),
            model_temperature: 0.9,
            request_timeout_seconds: 30,
            history_limit: 16,
            default_max_rounds: 40,
            default_turn_interval_seconds: 0.5,
            max_consecutive_failures: 3,
            min_rounds_before_conclusion: 12,
            min_rounds_before_repetition_stop: 18,
            message_retention_limit: 0,
            http_port: 8000,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();
        Settings {
            openrouter_api_key: env_string("OPENROUTER_API_KEY", defaults.openrouter_api_key),
            openrouter_base_url: env_string("OPENROUTER_BASE_URL", defaults.openrouter_base_url),
            model_temperature: env_parse("MODEL_TEMPERATURE", defaults.model_temperature),
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT_SECONDS",
                defaults.request_timeout_seconds,
            ),
            history_limit: env_parse("HISTORY_LIMIT", defaults.history_limit),
            default_max_rounds: env_parse("DEFAULT_MAX_ROUNDS", defaults.default_max_rounds),
            default_turn_interval_seconds: env_parse(
                "TURN_INTERVAL_SECONDS",
                defaults.default_turn_interval_seconds,
            ),
            max_consecutive_failures: env_parse(
                "MAX_CONSECUTIVE_FAILURES",
                defaults.max_consecutive_failures,
            ),
            min_rounds_before_conclusion: env_parse(
                "MIN_ROUNDS_BEFORE_CONCLUSION",
                defaults.min_rounds_before_conclusion,
            ),
            min_rounds_before_repetition_stop: env_parse(
                "MIN_ROUNDS_BEFORE_REPETITION_STOP",
                defaults.min_rounds_before_repetition_stop,
            ),
            message_retention_limit: env_parse(
                "MESSAGE_RETENTION_LIMIT",
                defaults.message_retention_limit,
            ),
            http_port: env_parse("CHATROOM_HTTP_PORT", defaults.http_port),
        }
    }
}

fn env_string(name: &str, default: String) -> String {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.history_limit, 16);
        assert_eq!(settings.default_max_rounds, 40);
        assert_eq!(settings.max_consecutive_failures, 3);
        assert_eq!(settings.message_retention_limit, 0);
    }

    #[test]
    fn from_env_reads_and_falls_back() {
        env::set_var("HISTORY_LIMIT", "7");
        env::set_var("MODEL_TEMPERATURE", "not-a-number");
        let settings = Settings::from_env();
        assert_eq!(settings.history_limit, 7);
        // Garbage values fall back to the default.
        assert!((settings.model_temperature - 0.9).abs() < f64::EPSILON);
        env::remove_var("HISTORY_LIMIT");
        env::remove_var("MODEL_TEMPERATURE");
    }
}
