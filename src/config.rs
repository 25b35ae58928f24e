use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::conversation::ConversationDefaults;
use crate::lifecycle::{BatchPolicy, NoticeSettings};
use crate::operator_log::Level;
use crate::workshop::DEFAULT_MAX_ACCOUNTS;

pub const DEFAULT_CONFIG_FILE: &str = "workshop-operator.yaml";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub region: String,
    pub role_to_assume: Option<String>,
    pub role_session_name: String,
    pub session_duration_seconds: i32,
    pub notification_template: String,
    pub notification_sender: String,
    pub login_url: String,
    pub delete_target_arn: String,
    pub batch: BatchConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            region: "eu-west-1".to_string(),
            role_to_assume: None,
            role_session_name: "create-user".to_string(),
            session_duration_seconds: 900,
            notification_template: String::new(),
            notification_sender: "admin@xebia.fr".to_string(),
            login_url: String::new(),
            delete_target_arn: String::new(),
            batch: BatchConfig::default(),
            conversation: ConversationConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub call_timeout_seconds: u64,
    pub max_accounts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            call_timeout_seconds: 30,
            max_accounts: DEFAULT_MAX_ACCOUNTS,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub responsible_contact: Option<String>,
    pub group_name: Option<String>,
    pub language_code: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        let defaults = ConversationDefaults::default();
        Self {
            responsible_contact: defaults.responsible_contact,
            group_name: defaults.group_name,
            language_code: defaults.language_code,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub level: Option<String>,
}

impl OperatorConfig {
    /// Reads the YAML file when there is one, then applies the environment.
    /// An explicit path must exist; the default file is optional.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?
                .with_context(|| format!("config file {} not found", path.display()))?,
            None => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?.unwrap_or_default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if contents
            .lines()
            .all(|line| line.trim().is_empty() || line.trim().starts_with('#'))
        {
            return Ok(Some(Self::default()));
        }
        let config = serde_yaml_bw::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(Some(config))
    }

    /// Environment values win over the file. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(value) = var("ROLE_TO_ASSUME") {
            self.role_to_assume = Some(value);
        }
        if let Some(value) = var("SES_CREATE_TEMPLATE") {
            self.notification_template = value;
        }
        if let Some(value) = var("LOGIN_URL") {
            self.login_url = value;
        }
        if let Some(value) = var("LAMBDA_ARN_TO_DELETE") {
            self.delete_target_arn = value;
        }
        if let Some(value) = var("AWS_REGION") {
            self.region = value;
        }
        if let Some(value) = var("WORKSHOP_OPERATOR_LOG_LEVEL") {
            self.log.level = Some(value);
        }
    }

    pub fn log_level(&self) -> anyhow::Result<Level> {
        match self.log.level.as_deref() {
            Some(level) => level.parse(),
            None => Ok(Level::Info),
        }
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            max_concurrency: self.batch.max_concurrency.max(1),
            call_timeout: Duration::from_secs(self.batch.call_timeout_seconds.max(1)),
            max_accounts: self.batch.max_accounts.max(1),
        }
    }

    pub fn notice_settings(&self) -> NoticeSettings {
        NoticeSettings {
            template: self.notification_template.clone(),
            login_url: self.login_url.clone(),
        }
    }

    pub fn conversation_defaults(&self) -> ConversationDefaults {
        ConversationDefaults {
            responsible_contact: self.conversation.responsible_contact.clone(),
            group_name: self.conversation.group_name.clone(),
            language_code: self.conversation.language_code.clone(),
        }
    }
}
