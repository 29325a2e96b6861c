use crate::app::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: String,
    pub api_endpoint: String,
    pub api_token: String,
    pub http_bind: String,
    pub tick_interval_ms: u64,
    pub platform_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            db_path: optional(&lookup, "DB_PATH")
                .unwrap_or_else(|| "/var/lib/gp-joule/gp_joule.db".to_string()),
            api_endpoint: required(&lookup, "API_ENDPOINT")?,
            api_token: required(&lookup, "API_TOKEN")?,
            http_bind: optional(&lookup, "HTTP_BIND").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            tick_interval_ms: parse_or_default(&lookup, "TICK_INTERVAL_MS", 1000_u64)?,
            platform_timeout_secs: parse_or_default(&lookup, "PLATFORM_TIMEOUT_SECS", 30_u64)?,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or_else(|| AppError::config(format!("{key} is required")))
}

fn parse_or_default<T, F>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr + Copy,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::config(format!("{key} must be a valid number"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;

    fn required_only(key: &str) -> Option<String> {
        match key {
            "API_ENDPOINT" => Some("https://platform.test/v2".to_string()),
            "API_TOKEN" => Some("token".to_string()),
            _ => None,
        }
    }

    #[test]
    fn rejects_missing_api_endpoint() {
        let result = AppConfig::from_lookup(|_| None);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: API_ENDPOINT is required"
        );
    }

    #[test]
    fn applies_defaults_for_optional_fields() {
        let result = AppConfig::from_lookup(required_only).expect("config should be valid");

        assert_eq!(result.api_endpoint, "https://platform.test/v2");
        assert_eq!(result.api_token, "token");
        assert_eq!(result.db_path, "/var/lib/gp-joule/gp_joule.db");
        assert_eq!(result.http_bind, "0.0.0.0:3000");
        assert_eq!(result.tick_interval_ms, 1000);
        assert_eq!(result.platform_timeout_secs, 30);
    }

    #[test]
    fn rejects_invalid_numeric_values() {
        let result = AppConfig::from_lookup(|key| match key {
            "TICK_INTERVAL_MS" => Some("abc".to_string()),
            other => required_only(other),
        });

        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().to_string(),
            "invalid configuration: TICK_INTERVAL_MS must be a valid number"
        );
    }
}
