use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub request_timeout_seconds: u64,
    pub invoice_number_prefix: String,
    pub invoice_number_padding: usize,
    pub agreement_number_prefix: String,
    pub agreement_number_padding: usize,
    pub seed_default_numbering: bool,
    pub deposit_duplicate_tolerance: f64,
    pub default_timezone: String,
    pub expiry_sweep_enabled: bool,
    pub expiry_sweep_hour_utc: u32,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "RentLedger API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            invoice_number_prefix: env_or("INVOICE_NUMBER_PREFIX", "INV-"),
            invoice_number_padding: env_parse_or("INVOICE_NUMBER_PADDING", 5),
            agreement_number_prefix: env_or("AGREEMENT_NUMBER_PREFIX", "AGR-"),
            agreement_number_padding: env_parse_or("AGREEMENT_NUMBER_PADDING", 4),
            seed_default_numbering: env_parse_bool_or("SEED_DEFAULT_NUMBERING", true),
            deposit_duplicate_tolerance: clamp_tolerance(env_parse_or(
                "DEPOSIT_DUPLICATE_TOLERANCE",
                0.01,
            )),
            default_timezone: env_or("DEFAULT_TIMEZONE", "America/Asuncion"),
            expiry_sweep_enabled: env_parse_bool_or("EXPIRY_SWEEP_ENABLED", true),
            expiry_sweep_hour_utc: env_parse_or::<u32>("EXPIRY_SWEEP_HOUR_UTC", 5).min(23),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }
}

impl Default for AppConfig {
    /// Configuration with every key at its documented default, independent of
    /// the process environment.
    fn default() -> Self {
        Self {
            app_name: "RentLedger API".to_string(),
            environment: "development".to_string(),
            api_prefix: "/v1".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_enabled: true,
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            request_timeout_seconds: 30,
            invoice_number_prefix: "INV-".to_string(),
            invoice_number_padding: 5,
            agreement_number_prefix: "AGR-".to_string(),
            agreement_number_padding: 4,
            seed_default_numbering: true,
            deposit_duplicate_tolerance: 0.01,
            default_timezone: "America/Asuncion".to_string(),
            expiry_sweep_enabled: true,
            expiry_sweep_hour_utc: 5,
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

fn clamp_tolerance(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 0.5)
    } else {
        0.01
    }
}

#[cfg(test)]
mod tests {
    use super::{clamp_tolerance, normalize_prefix, parse_csv};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_csv_skipping_blanks() {
        assert_eq!(
            parse_csv(" a, ,b ,"),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn clamps_tolerance() {
        assert_eq!(clamp_tolerance(-1.0), 0.0);
        assert_eq!(clamp_tolerance(0.02), 0.02);
        assert_eq!(clamp_tolerance(3.0), 0.5);
        assert_eq!(clamp_tolerance(f64::NAN), 0.01);
    }
}
