//! Claim resolution for the "me" game.
//!
//! Claimable messages sit in a window until they either collect the maximum
//! number of claimants or age out. Each "me" / "not me" reply is matched
//! against the oldest open message the replier has not already claimed.
//! The window is only evaluated when a reply arrives; there is no timer.

use crate::classifier::ClaimKind;
use crate::message::NormalizedMessage;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRules {
    /// Age at which an unfilled claimable message is retired.
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: i64,
    /// The poster may not be the first claimant of their own message until
    /// this many seconds have passed.
    #[serde(default = "default_self_claim_cooldown_secs")]
    pub self_claim_cooldown_secs: i64,
    #[serde(default = "default_max_claimants")]
    pub max_claimants: usize,
}

fn default_expiry_hours() -> i64 {
    24
}

fn default_self_claim_cooldown_secs() -> i64 {
    30
}

fn default_max_claimants() -> usize {
    3
}

impl Default for ClaimRules {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
            self_claim_cooldown_secs: default_self_claim_cooldown_secs(),
            max_claimants: default_max_claimants(),
        }
    }
}

impl ClaimRules {
    pub fn expiry(&self) -> Duration {
        Duration::hours(self.expiry_hours)
    }

    pub fn self_claim_cooldown(&self) -> Duration {
        Duration::seconds(self.self_claim_cooldown_secs)
    }
}

#[derive(Debug, Clone)]
pub struct ClaimableMessage {
    pub source: NormalizedMessage,
    pub claimants: HashSet<String>,
}

impl ClaimableMessage {
    pub fn new(source: NormalizedMessage) -> Self {
        Self {
            source,
            claimants: HashSet::new(),
        }
    }

    pub fn created_at(&self) -> DateTime<Tz> {
        self.source.timestamp
    }

    fn accepts(&self, reply: &NormalizedMessage, rules: &ClaimRules) -> bool {
        if self.claimants.contains(&reply.sender_id) {
            return false;
        }

        let own_message_too_soon = reply.sender_id == self.source.sender_id
            && self.claimants.is_empty()
            && reply.timestamp - self.created_at() < rules.self_claim_cooldown();

        !own_message_too_soon
    }
}

/// A reply that was credited against a claimable message.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub claimant: String,
    pub kind: ClaimKind,
    pub poster: String,
    pub posted_at: DateTime<Tz>,
    /// Number of claimants on the message including this one.
    pub position: usize,
}

#[derive(Debug)]
pub struct ClaimEngine {
    rules: ClaimRules,
    window: Vec<ClaimableMessage>,
    expired: usize,
}

impl Default for ClaimEngine {
    fn default() -> Self {
        Self::new(ClaimRules::default())
    }
}

impl ClaimEngine {
    pub fn new(rules: ClaimRules) -> Self {
        Self {
            rules,
            window: Vec::new(),
            expired: 0,
        }
    }

    /// Open claimable messages, oldest first as of the last reply processed.
    pub fn window(&self) -> &[ClaimableMessage] {
        &self.window
    }

    /// Messages retired from the window, whether aged out or filled.
    pub fn expired_count(&self) -> usize {
        self.expired
    }

    /// Claim slots assumed lost to retirement. Counts every retired message
    /// at full capacity, so partially or fully claimed ones are over-counted.
    pub fn lost_capacity(&self) -> usize {
        self.expired * self.rules.max_claimants
    }

    pub fn on_claimable(&mut self, msg: NormalizedMessage) {
        log::debug!(
            "claimable from {} at {}: {:?}",
            msg.sender_id,
            msg.timestamp,
            msg.text
        );
        self.window.push(ClaimableMessage::new(msg));
    }

    /// Resolve one "me" / "not me" reply. Returns the credited claim, if any.
    pub fn on_reply(&mut self, reply: &NormalizedMessage, kind: ClaimKind) -> Option<Claim> {
        self.expire_aged(reply.timestamp);

        self.window.sort_by_key(|m| m.created_at());

        let claim = match self
            .window
            .iter_mut()
            .find(|m| m.accepts(reply, &self.rules))
        {
            Some(target) => {
                target.claimants.insert(reply.sender_id.clone());
                let claim = Claim {
                    claimant: reply.sender_id.clone(),
                    kind,
                    poster: target.source.sender_id.clone(),
                    posted_at: target.created_at(),
                    position: target.claimants.len(),
                };
                log::debug!(
                    "{} claimed ({:?}) message from {} at {} [{}/{}]",
                    claim.claimant,
                    kind,
                    claim.poster,
                    claim.posted_at,
                    claim.position,
                    self.rules.max_claimants
                );
                Some(claim)
            }
            None => {
                log::debug!(
                    "reply from {} at {} matched no open message",
                    reply.sender_id,
                    reply.timestamp
                );
                None
            }
        };

        self.expire_full();
        claim
    }

    fn expire_aged(&mut self, now: DateTime<Tz>) {
        let expiry = self.rules.expiry();
        let before = self.window.len();
        self.window.retain(|m| now - m.created_at() < expiry);
        let retired = before - self.window.len();
        if retired > 0 {
            log::debug!("{} claimable message(s) aged out at {}", retired, now);
            self.expired += retired;
        }
    }

    fn expire_full(&mut self) {
        let max = self.rules.max_claimants;
        let before = self.window.len();
        self.window.retain(|m| m.claimants.len() < max);
        self.expired += before - self.window.len();
    }
}
