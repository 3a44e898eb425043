//! INI file configuration adapter.

use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .get(section, key)
            .as_ref()
            .and_then(|v| Self::parse_bool(v))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn from_string_parses_sections() {
        let content = r#"
[data]
dir = /var/lib/foresight
symbol = BTC-USD

[trading]
initial_cash = 10000.0
strategy_model = arima

[evaluation]
lookback_days = 30
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("data", "dir"),
            Some("/var/lib/foresight".to_string())
        );
        assert_eq!(
            adapter.get_string("trading", "strategy_model"),
            Some("arima".to_string())
        );
        assert_eq!(adapter.get_int("evaluation", "lookback_days", 0), 30);
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let adapter = FileConfigAdapter::from_string("[trading]\n").unwrap();
        assert_eq!(adapter.get_string("trading", "strategy_model"), None);
        assert_eq!(adapter.get_int("evaluation", "lookback_days", 30), 30);
        assert_eq!(adapter.get_double("trading", "initial_cash", 10_000.0), 10_000.0);
        assert!(adapter.get_bool("trading", "paper_only", true));
    }

    #[test]
    fn non_numeric_values_fall_back_to_defaults() {
        let adapter =
            FileConfigAdapter::from_string("[trading]\ninitial_cash = plenty\n").unwrap();
        assert_eq!(adapter.get_double("trading", "initial_cash", 10_000.0), 10_000.0);
        assert_eq!(adapter.get_int("trading", "initial_cash", 7), 7);
    }

    #[test]
    fn bool_spellings() {
        let adapter =
            FileConfigAdapter::from_string("[a]\nx = yes\ny = 0\nz = maybe\n").unwrap();
        assert!(adapter.get_bool("a", "x", false));
        assert!(!adapter.get_bool("a", "y", true));
        assert!(adapter.get_bool("a", "z", true));
    }

    #[test]
    fn from_file_reads_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[data]\nsymbol = ETH-USD\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("data", "symbol"),
            Some("ETH-USD".to_string())
        );
    }

    #[test]
    fn from_file_errors_for_missing_file() {
        assert!(FileConfigAdapter::from_file("/nonexistent/foresight.ini").is_err());
    }
}
