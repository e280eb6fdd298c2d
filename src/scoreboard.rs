use crate::claims::Claim;
use crate::classifier::ClaimKind;
use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTally {
    pub name: String,
    pub mes: u64,
    pub not_mes: u64,
    pub sparks: u64,
}

impl UserTally {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mes: 0,
            not_mes: 0,
            sparks: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.mes + self.not_mes
    }
}

/// Per-user tallies, one for every configured identity.
#[derive(Debug, Clone)]
pub struct Scoreboard {
    tallies: HashMap<String, UserTally>,
}

impl Scoreboard {
    pub fn new(users: &BTreeMap<String, String>) -> Self {
        Self {
            tallies: users
                .iter()
                .map(|(id, name)| (id.clone(), UserTally::new(name.as_str())))
                .collect(),
        }
    }

    fn tally_mut(&mut self, sender_id: &str) -> Result<&mut UserTally, ScanError> {
        self.tallies
            .get_mut(sender_id)
            .ok_or_else(|| ScanError::UnknownIdentity(sender_id.to_string()))
    }

    pub fn credit_claim(&mut self, claim: &Claim) -> Result<(), ScanError> {
        let tally = self.tally_mut(&claim.claimant)?;
        match claim.kind {
            ClaimKind::Affirm => tally.mes += 1,
            ClaimKind::Deny => tally.not_mes += 1,
        }
        Ok(())
    }

    pub fn credit_spark(&mut self, sender_id: &str) -> Result<(), ScanError> {
        self.tally_mut(sender_id)?.sparks += 1;
        Ok(())
    }

    pub fn get(&self, sender_id: &str) -> Option<&UserTally> {
        self.tallies.get(sender_id)
    }

    pub fn total_claims(&self) -> u64 {
        self.tallies.values().map(UserTally::total).sum()
    }

    /// Tallies ordered by total claims, highest first; ties by name.
    pub fn ranked(&self) -> Vec<UserTally> {
        let mut ranked: Vec<UserTally> = self.tallies.values().cloned().collect();
        ranked.sort_by(|a, b| b.total().cmp(&a.total()).then_with(|| a.name.cmp(&b.name)));
        ranked
    }
}
