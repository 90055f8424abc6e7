use super::*;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/meterbook.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.contact-digital-prod.net".to_string(),
            api_key: String::new(),
            email: String::new(),
            password: String::new(),
            account_timeout_secs: 30,
            usage_timeout_secs: 60,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hourly: ResolutionPolicy {
                window: 9,
                sync_interval_hours: 24,
                max_lookback: 14,
            },
            daily: ResolutionPolicy {
                window: 35,
                sync_interval_hours: 24,
                max_lookback: 60,
            },
            monthly: ResolutionPolicy {
                window: 18,
                sync_interval_hours: 168,
                max_lookback: 24,
            },
            retry: RetryConfig::default(),
            cycle_interval_minutes: 24 * 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contract_id: String::new(),
            account_id: String::new(),
            cache_dir: "/data/meterbook".to_string(),
            timezone: "Pacific/Auckland".to_string(),
            logging: LoggingConfig::default(),
            api: ApiConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}
