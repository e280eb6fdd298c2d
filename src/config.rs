use crate::claims::ClaimRules;
use crate::classifier::ClassifierConfig;
use anyhow::Context;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the message archive (`chat.db`).
    pub chat_db_path: String,
    /// Restrict the scan to one conversation. `None` scans every message.
    #[serde(default)]
    pub chat_identifier: Option<String>,
    /// Optional SQL file replacing the built-in archive query.
    #[serde(default)]
    pub query_file: Option<String>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,
    #[serde(default)]
    pub identities: IdentityConfig,
    /// Sender identity -> display name. Every sender that can score must be listed.
    pub users: BTreeMap<String, String>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub rules: ClaimRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Identity assigned to rows without a handle (messages sent by the archive owner).
    #[serde(default = "default_self_id")]
    pub self_id: String,
    #[serde(default)]
    pub aliases: Vec<AliasConfig>,
}

/// Remaps an alternate address (e.g. an email handle) onto a canonical identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasConfig {
    pub from: String,
    pub to: String,
}

fn default_timezone() -> String {
    "America/New_York".to_string()
}

fn default_backup_dir() -> String {
    ".".to_string()
}

fn default_self_id() -> String {
    "me".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            self_id: default_self_id(),
            aliases: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut users = BTreeMap::new();
        users.insert("me".to_string(), "Me".to_string());
        users.insert("+15555550100".to_string(), "Friend".to_string());

        Self {
            chat_db_path: "~/Library/Messages/chat.db".to_string(),
            chat_identifier: None,
            query_file: None,
            timezone: default_timezone(),
            backup_dir: default_backup_dir(),
            identities: IdentityConfig {
                self_id: default_self_id(),
                aliases: vec![AliasConfig {
                    from: "friend@example.com".to_string(),
                    to: "+15555550100".to_string(),
                }],
            },
            users,
            classifier: ClassifierConfig::default(),
            rules: ClaimRules::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.tz()?;
        if self.users.is_empty() {
            anyhow::bail!("users map is empty");
        }
        if self.rules.max_claimants == 0 {
            anyhow::bail!("rules.max_claimants must be at least 1");
        }
        if self.rules.expiry_hours <= 0 {
            anyhow::bail!("rules.expiry_hours must be at least 1");
        }
        if self.rules.self_claim_cooldown_secs < 0 {
            anyhow::bail!("rules.self_claim_cooldown_secs must not be negative");
        }
        Ok(())
    }

    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {}", self.timezone, e))
    }

    /// Archive path with a leading `~` expanded against `$HOME`.
    pub fn archive_path(&self) -> std::path::PathBuf {
        match self.chat_db_path.strip_prefix("~/") {
            Some(rest) => match std::env::var_os("HOME") {
                Some(home) => Path::new(&home).join(rest),
                None => self.chat_db_path.clone().into(),
            },
            None => self.chat_db_path.clone().into(),
        }
    }
}
