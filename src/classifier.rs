use crate::message::NormalizedMessage;
use chrono::Timelike;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref CLAIM_REPLY: Regex = Regex::new(r"(?i)^\s*(not)?\s*me\W*$").unwrap();
    static ref LINK: Regex = Regex::new(r"(?i)https?://").unwrap();
    static ref WORDLE_RESULT: Regex = Regex::new(r"^Wordle \d+ \d").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// "me"
    Affirm,
    /// "not me"
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Spark,
    Claimable,
    Reply(ClaimKind),
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,
    #[serde(default = "default_trigger_hour")]
    pub trigger_hour: u32,
    #[serde(default = "default_trigger_minute")]
    pub trigger_minute: u32,
    /// Attachments whose balloon bundle id contains this marker are game
    /// invitations, not content, and never become claimable.
    #[serde(default = "default_excluded_bundle")]
    pub excluded_bundle: String,
}

fn default_trigger_word() -> String {
    "spark".to_string()
}

fn default_trigger_hour() -> u32 {
    16
}

fn default_trigger_minute() -> u32 {
    20
}

fn default_excluded_bundle() -> String {
    "gamepigeon".to_string()
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            trigger_word: default_trigger_word(),
            trigger_hour: default_trigger_hour(),
            trigger_minute: default_trigger_minute(),
            excluded_bundle: default_excluded_bundle(),
        }
    }
}

/// Rule-based, stateless message classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config: ClassifierConfig {
                trigger_word: config.trigger_word.to_lowercase(),
                ..config
            },
        }
    }

    pub fn classify(&self, msg: &NormalizedMessage) -> Classification {
        if self.is_spark(msg) {
            return Classification::Spark;
        }

        if let Some(kind) = Self::claim_reply(&msg.text) {
            return Classification::Reply(kind);
        }

        if self.is_claimable(msg) {
            return Classification::Claimable;
        }

        Classification::Plain
    }

    fn is_spark(&self, msg: &NormalizedMessage) -> bool {
        msg.timestamp.hour() == self.config.trigger_hour
            && msg.timestamp.minute() == self.config.trigger_minute
            && msg.text.trim().to_lowercase() == self.config.trigger_word
    }

    /// Matches a bare "me" / "not me" reply, allowing surrounding whitespace
    /// and trailing punctuation only.
    pub fn claim_reply(text: &str) -> Option<ClaimKind> {
        CLAIM_REPLY.captures(text).map(|caps| {
            if caps.get(1).is_some() {
                ClaimKind::Deny
            } else {
                ClaimKind::Affirm
            }
        })
    }

    fn is_claimable(&self, msg: &NormalizedMessage) -> bool {
        let content_attachment = msg.has_attachment
            && msg
                .attachment_bundle
                .as_deref()
                .map(|bundle| !bundle.contains(self.config.excluded_bundle.as_str()))
                .unwrap_or(true);

        content_attachment || LINK.is_match(&msg.text) || WORDLE_RESULT.is_match(&msg.text)
    }
}
