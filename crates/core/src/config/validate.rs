use super::types::{Config, DownloadClientBackend};
use super::ConfigError;

/// Validate a loaded configuration before anything is constructed from it.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.auth.username.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "auth.username must not be empty".to_string(),
        ));
    }

    if config.auth.password.is_empty() {
        return Err(ConfigError::Invalid(
            "auth.password must not be empty".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::Invalid(
            "server.port must not be 0".to_string(),
        ));
    }

    if !config.server.base_url.starts_with('/') {
        return Err(ConfigError::Invalid(
            "server.base_url must start with '/'".to_string(),
        ));
    }

    if config.pipeline.dedup_window_secs == 0 {
        return Err(ConfigError::Invalid(
            "pipeline.dedup_window_secs must be greater than 0".to_string(),
        ));
    }

    for client in &config.download_clients {
        if client.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "download client name must not be empty".to_string(),
            ));
        }
        match client.backend {
            DownloadClientBackend::Qbittorrent => {
                if client.qbittorrent.is_none() {
                    return Err(ConfigError::Invalid(format!(
                        "download client {:?} uses the qbittorrent backend but has no [download_clients.qbittorrent] section",
                        client.name
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[auth]
username = "operator"
password = "hunter2"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_username_rejected() {
        let mut config = valid_config();
        config.auth.username = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_base_url_must_be_absolute() {
        let mut config = valid_config();
        config.server.base_url = "trawler".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_dedup_window_rejected() {
        let mut config = valid_config();
        config.pipeline.dedup_window_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_qbittorrent_backend_requires_section() {
        let config = load_config_from_str(
            r#"
[auth]
username = "operator"
password = "hunter2"

[[download_clients]]
name = "qbit"
backend = "qbittorrent"
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
