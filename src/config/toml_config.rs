use crate::domain::model::{parse_timestamp, CorridorId};
use crate::utils::error::{IngressError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_object_path, validate_path, validate_range,
    validate_resolved, validate_url, Validate,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 預設搜尋的設定檔位置，第一個存在的檔案生效
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "conf.toml",
    "/etc/osiris/conf.toml",
    "/etc/ingress-adapter-jao-conf.toml",
];

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_STATE_PATH: &str = "state.json";
pub const DEFAULT_HORIZON: &str = "Monthly";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Startup configuration. Built once in `main` and passed by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(rename = "Authorization")]
    pub authorization: AuthorizationConfig,
    #[serde(rename = "Azure Storage")]
    pub azure_storage: AzureStorageConfig,
    #[serde(rename = "Datasets")]
    pub datasets: DatasetsConfig,
    #[serde(rename = "JAO Server")]
    pub jao_server: JaoServerConfig,
    #[serde(rename = "JAO Values")]
    pub jao_values: JaoValuesConfig,
    #[serde(rename = "Logging", default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authority_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureStorageConfig {
    pub ingress_url: String,
    pub filesystem_name: String,
    pub state_path: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetsConfig {
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JaoServerConfig {
    pub server_url: String,
    pub auth_api_key: String,
    pub horizon: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JaoValuesConfig {
    pub default_date: String,
    pub corridors: Option<Vec<String>>,
    pub corridor_filters: Option<Vec<String>>,
    pub empty_response_is_authoritative: Option<bool>,
    pub max_window_days: Option<u32>,
    pub max_concurrent_corridors: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub configuration_file: Option<String>,
}

impl AdapterConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| IngressError::ConfigError {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// Loads `explicit` if given, otherwise the first existing default path.
    pub fn discover(explicit: Option<&Path>) -> Result<(PathBuf, Self)> {
        if let Some(path) = explicit {
            return Ok((path.to_path_buf(), Self::from_file(path)?));
        }

        let found = DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| IngressError::ConfigError {
                message: format!(
                    "no configuration file found (looked in {})",
                    DEFAULT_CONFIG_PATHS.join(", ")
                ),
            })?;
        let config = Self::from_file(&found)?;
        Ok((found, config))
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| IngressError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${JAO_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| IngressError::config(e.to_string()))?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn default_watermark(&self) -> Result<DateTime<Utc>> {
        parse_timestamp(&self.jao_values.default_date).ok_or_else(|| {
            IngressError::InvalidConfigValueError {
                field: "JAO Values.default_date".to_string(),
                value: self.jao_values.default_date.clone(),
                reason: "expected YYYY-MM-DD or an RFC 3339 timestamp".to_string(),
            }
        })
    }

    /// Statically configured corridors, if any.
    pub fn static_corridors(&self) -> Result<Option<Vec<CorridorId>>> {
        match &self.jao_values.corridors {
            Some(list) if !list.is_empty() => list
                .iter()
                .map(|raw| CorridorId::parse(raw))
                .collect::<Result<Vec<_>>>()
                .map(Some),
            _ => Ok(None),
        }
    }

    pub fn corridor_filters(&self) -> &[String] {
        self.jao_values.corridor_filters.as_deref().unwrap_or(&[])
    }

    pub fn horizon(&self) -> &str {
        self.jao_server.horizon.as_deref().unwrap_or(DEFAULT_HORIZON)
    }

    pub fn empty_response_is_authoritative(&self) -> bool {
        self.jao_values.empty_response_is_authoritative.unwrap_or(false)
    }

    pub fn max_window(&self) -> Option<Duration> {
        self.jao_values
            .max_window_days
            .map(|days| Duration::days(i64::from(days)))
    }

    pub fn max_concurrent_corridors(&self) -> usize {
        self.jao_values.max_concurrent_corridors.unwrap_or(1)
    }

    pub fn jao_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.jao_server
                .timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        )
    }

    pub fn storage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.azure_storage
                .timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS),
        )
    }

    pub fn authority_host(&self) -> &str {
        self.authorization
            .authority_host
            .as_deref()
            .unwrap_or(DEFAULT_AUTHORITY_HOST)
    }

    pub fn state_path(&self) -> &str {
        self.azure_storage
            .state_path
            .as_deref()
            .unwrap_or(DEFAULT_STATE_PATH)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("Authorization.tenant_id", &self.authorization.tenant_id)?;
        validate_non_empty_string("Authorization.client_id", &self.authorization.client_id)?;
        validate_resolved("Authorization.client_secret", &self.authorization.client_secret)?;
        validate_url("Authorization.authority_host", self.authority_host())?;

        validate_url("Azure Storage.ingress_url", &self.azure_storage.ingress_url)?;
        validate_non_empty_string(
            "Azure Storage.filesystem_name",
            &self.azure_storage.filesystem_name,
        )?;
        validate_object_path("Azure Storage.state_path", self.state_path())?;

        validate_non_empty_string("Datasets.source", &self.datasets.source)?;

        validate_url("JAO Server.server_url", &self.jao_server.server_url)?;
        validate_resolved("JAO Server.auth_api_key", &self.jao_server.auth_api_key)?;
        validate_non_empty_string("JAO Server.horizon", self.horizon())?;

        self.default_watermark()?;
        self.static_corridors()?;
        for filter in self.corridor_filters() {
            validate_non_empty_string("JAO Values.corridor_filters", filter)?;
        }
        if let Some(days) = self.jao_values.max_window_days {
            validate_range("JAO Values.max_window_days", days, 1, 366)?;
        }
        validate_range(
            "JAO Values.max_concurrent_corridors",
            self.max_concurrent_corridors(),
            1,
            64,
        )?;

        for (field, timeout) in [
            ("JAO Server.timeout_seconds", self.jao_server.timeout_seconds),
            ("Azure Storage.timeout_seconds", self.azure_storage.timeout_seconds),
        ] {
            if let Some(seconds) = timeout {
                validate_range(field, seconds, 1, 3600)?;
            }
        }

        if let Some(file) = &self.logging.configuration_file {
            validate_path("Logging.configuration_file", file)?;
        }

        Ok(())
    }

    /// Logging config file, resolved against the directory of the main
    /// configuration file when relative.
    pub fn logging_file(&self, config_path: &Path) -> Option<PathBuf> {
        let path = PathBuf::from(self.logging.configuration_file.as_deref()?);
        if path.is_absolute() {
            return Some(path);
        }
        Some(
            config_path
                .parent()
                .map(|dir| dir.join(&path))
                .unwrap_or(path),
        )
    }
}

impl Validate for AdapterConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASE_CONFIG: &str = r#"
[Authorization]
tenant_id = "tenant"
client_id = "client"
client_secret = "secret"

["Azure Storage"]
ingress_url = "https://account.dfs.core.windows.net"
filesystem_name = "datasets"

[Datasets]
source = "8f5e0c43-2c57-4b4c-9d4b-0b6d3e2ff0aa"

["JAO Server"]
server_url = "https://api.jao.eu/OWSMP/"
auth_api_key = "key"

["JAO Values"]
default_date = "2020-01-01"
"#;

    #[test]
    fn test_parse_original_section_names() {
        let config = AdapterConfig::from_toml_str(BASE_CONFIG).unwrap();

        assert_eq!(config.authorization.tenant_id, "tenant");
        assert_eq!(config.azure_storage.filesystem_name, "datasets");
        assert_eq!(config.jao_server.server_url, "https://api.jao.eu/OWSMP/");
        assert_eq!(config.horizon(), "Monthly");
        assert_eq!(config.state_path(), "state.json");
        assert_eq!(config.max_concurrent_corridors(), 1);
        assert!(!config.empty_response_is_authoritative());
        assert!(config.max_window().is_none());
        assert!(config.logging.configuration_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_watermark_parsing() {
        let config = AdapterConfig::from_toml_str(BASE_CONFIG).unwrap();
        assert_eq!(
            config.default_watermark().unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
        );

        let broken = BASE_CONFIG.replace("2020-01-01", "first of january");
        let config = AdapterConfig::from_toml_str(&broken).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("INGRESS_TEST_JAO_KEY", "from-env");
        let content = BASE_CONFIG.replace(
            "auth_api_key = \"key\"",
            "auth_api_key = \"${INGRESS_TEST_JAO_KEY}\"",
        );

        let config = AdapterConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.jao_server.auth_api_key, "from-env");

        std::env::remove_var("INGRESS_TEST_JAO_KEY");
    }

    #[test]
    fn test_unset_secret_is_rejected() {
        let content = BASE_CONFIG.replace(
            "client_secret = \"secret\"",
            "client_secret = \"${INGRESS_TEST_SURELY_UNSET_SECRET}\"",
        );

        let config = AdapterConfig::from_toml_str(&content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(IngressError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_invalid_corridor_and_ranges_are_rejected() {
        let content = format!("{}corridors = [\"DK1/DE\"]\n", BASE_CONFIG);
        let config = AdapterConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());

        let content = format!("{}max_concurrent_corridors = 0\n", BASE_CONFIG);
        let config = AdapterConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());

        let content = format!("{}max_window_days = 31\n", BASE_CONFIG);
        let config = AdapterConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_window(), Some(Duration::days(31)));
    }

    #[test]
    fn test_static_corridors() {
        let content = format!("{}corridors = [\"DK1-DE\", \" DE-DK1 \"]\n", BASE_CONFIG);
        let config = AdapterConfig::from_toml_str(&content).unwrap();

        let corridors = config.static_corridors().unwrap().unwrap();
        let names: Vec<&str> = corridors.iter().map(CorridorId::as_str).collect();
        assert_eq!(names, vec!["DK1-DE", "DE-DK1"]);
    }

    #[test]
    fn test_config_from_file_and_logging_path() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let content = format!(
            "{}\n[Logging]\nconfiguration_file = \"log.toml\"\n",
            BASE_CONFIG
        );
        temp_file.write_all(content.as_bytes()).unwrap();

        let (path, config) = AdapterConfig::discover(Some(temp_file.path())).unwrap();
        assert_eq!(path, temp_file.path());

        let logging = config.logging_file(&path).unwrap();
        assert_eq!(logging, temp_file.path().parent().unwrap().join("log.toml"));
    }

    #[test]
    fn test_demo_config_parses() {
        let config = AdapterConfig::from_toml_str(include_str!("../../demos/conf.toml")).unwrap();

        assert_eq!(config.corridor_filters(), ["DK", "D1", "D2"]);
        assert_eq!(config.max_window(), Some(Duration::days(31)));
        assert!(config.static_corridors().unwrap().is_none());

        let settings: crate::utils::logger::LogSettings =
            toml::from_str(include_str!("../../demos/log.toml")).unwrap();
        assert_eq!(settings.filter, "ingress_adapter_jao=info,reqwest=warn");
    }
}
