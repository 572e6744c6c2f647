use std::fs;
use std::net::SocketAddr;

use log::{debug, trace};
use pingora::server::configuration::{Opt, ServerConf};
use pingora_error::{Error, ErrorType::*, OrErr, Result};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_storage"))]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(nested)]
    pub api: Api,

    #[serde(default)]
    pub storage: Storage,

    #[validate(nested)]
    pub log: Option<Log>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> Result<Self>
    where
        P: AsRef<std::path::Path> + std::fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).or_err_with(ReadError, || {
            format!("Unable to read conf file from {path}")
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> Result<Self> {
        if let Some(path) = &opt.conf {
            let mut conf = Self::load_from_yaml(path)?;
            conf.merge_with_opt(opt);
            Ok(conf)
        } else {
            Error::e_explain(ReadError, "No path specified")
        }
    }

    pub fn from_yaml(conf_str: &str) -> Result<Self> {
        trace!("Read conf file: {conf_str}");
        let conf: Config = serde_yaml::from_str(conf_str).or_err_with(ReadError, || {
            format!("Unable to parse yaml conf {conf_str}")
        })?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()
            .or_err_with(FileReadError, || "Conf file valid failed")?;

        Ok(conf)
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }

    fn validate_storage(&self) -> Result<(), ValidationError> {
        match &self.storage {
            Storage::Memory => Ok(()),
            Storage::Etcd(etcd) => etcd
                .validate()
                .map_err(|_| ValidationError::new("invalid_etcd_storage")),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Api {
    pub address: SocketAddr,
    #[serde(default)]
    #[validate(nested)]
    pub cors: Cors,
}

/// Cross-origin headers added to every API response.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Cors {
    /// `*` or a comma separated list of origins
    #[serde(default = "Cors::default_origins")]
    #[validate(custom(function = "Cors::validate_origins"))]
    pub allow_origins: String,
    #[serde(default = "Cors::default_methods")]
    pub allow_methods: String,
    #[serde(default = "Cors::default_headers")]
    pub allow_headers: String,
    /// Preflight cache lifetime in seconds
    #[serde(default = "Cors::default_max_age")]
    pub max_age: i32,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allow_origins: Self::default_origins(),
            allow_methods: Self::default_methods(),
            allow_headers: Self::default_headers(),
            max_age: Self::default_max_age(),
        }
    }
}

impl Cors {
    fn default_origins() -> String {
        "*".to_string()
    }

    fn default_methods() -> String {
        "GET,POST,PUT,DELETE,OPTIONS".to_string()
    }

    fn default_headers() -> String {
        "*".to_string()
    }

    fn default_max_age() -> i32 {
        5
    }

    fn validate_origins(origins: &str) -> Result<(), ValidationError> {
        if origins.split(',').map(str::trim).any(str::is_empty) {
            return Err(ValidationError::new("allow_origins contains empty origin"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    #[default]
    Memory,
    Etcd(Etcd),
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Etcd {
    #[validate(length(min = 1))]
    pub host: Vec<String>,
    #[validate(custom(function = "Etcd::validate_prefix"))]
    pub prefix: String,
    pub timeout: Option<u32>,
    pub connect_timeout: Option<u32>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl Etcd {
    fn validate_prefix(prefix: &str) -> Result<(), ValidationError> {
        if prefix.starts_with('/') {
            Ok(())
        } else {
            Err(ValidationError::new("prefix_must_start_with_slash"))
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Log {
    #[validate(length(min = 1))]
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_load_minimal() {
        init_log();
        let conf_str = r#"
---
api:
  address: "0.0.0.0:5000"
        "#;
        let conf = Config::from_yaml(conf_str).unwrap();
        assert_eq!(conf.api.address, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert!(matches!(conf.storage, Storage::Memory));
        assert_eq!(conf.api.cors.allow_origins, "*");
        assert_eq!(conf.api.cors.max_age, 5);
        assert!(conf.log.is_none());
    }

    #[test]
    fn test_load_etcd_storage() {
        init_log();
        let conf_str = r#"
---
pingora:
  version: 1
  threads: 2
api:
  address: "127.0.0.1:5000"
  cors:
    allow_origins: "http://a.test, http://b.test"
storage:
  type: etcd
  host:
    - "127.0.0.1:2379"
  prefix: /taskboard
  timeout: 30
log:
  path: logs/taskboard.log
        "#;
        let conf = Config::from_yaml(conf_str).unwrap();
        assert_eq!(conf.pingora.threads, 2);
        match conf.storage {
            Storage::Etcd(etcd) => {
                assert_eq!(etcd.host, vec!["127.0.0.1:2379".to_string()]);
                assert_eq!(etcd.prefix, "/taskboard");
                assert_eq!(etcd.timeout, Some(30));
            }
            Storage::Memory => panic!("expected etcd storage"),
        }
        assert_eq!(conf.log.unwrap().path, "logs/taskboard.log");
    }

    #[test]
    fn test_valid_api_address() {
        init_log();
        let conf_str = r#"
---
api:
  address: "not an address"
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_etcd_host_length() {
        init_log();
        let conf_str = r#"
---
api:
  address: "127.0.0.1:5000"
storage:
  type: etcd
  host: []
  prefix: /taskboard
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_etcd_prefix() {
        init_log();
        let conf_str = r#"
---
api:
  address: "127.0.0.1:5000"
storage:
  type: etcd
  host: ["127.0.0.1:2379"]
  prefix: taskboard
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_cors_origins() {
        init_log();
        let conf_str = r#"
---
api:
  address: "127.0.0.1:5000"
  cors:
    allow_origins: "http://a.test,,"
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }

    #[test]
    fn test_valid_log_path() {
        init_log();
        let conf_str = r#"
---
api:
  address: "127.0.0.1:5000"
log:
  path: ""
        "#;
        assert!(Config::from_yaml(conf_str).is_err());
    }
}
