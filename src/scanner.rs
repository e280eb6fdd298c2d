use crate::archive::{ArchiveReader, Normalizer, RawMessage};
use crate::claims::ClaimEngine;
use crate::classifier::{ClaimKind, Classification, Classifier};
use crate::config::Config;
use crate::error::{DecodeError, ScanError};
use crate::message::NormalizedMessage;
use crate::scoreboard::{Scoreboard, UserTally};
use crate::spark::SparkTracker;
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationCounts {
    pub spark: u64,
    pub claimable: u64,
    pub affirm: u64,
    pub deny: u64,
    pub plain: u64,
}

impl ClassificationCounts {
    fn record(&mut self, class: Classification) {
        match class {
            Classification::Spark => self.spark += 1,
            Classification::Claimable => self.claimable += 1,
            Classification::Reply(ClaimKind::Affirm) => self.affirm += 1,
            Classification::Reply(ClaimKind::Deny) => self.deny += 1,
            Classification::Plain => self.plain += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub tallies: Vec<UserTally>,
    pub earliest: Option<DateTime<Tz>>,
    pub total_claims: u64,
    pub expired: usize,
    /// `max_claimants × expired`; over-counts partially claimed messages.
    pub lost_capacity: usize,
    pub messages_scanned: u64,
    pub decode_failures: u64,
    pub classifications: ClassificationCounts,
}

/// Drives one pass over a chronologically ordered message stream.
pub struct Scanner {
    classifier: Classifier,
    normalizer: Normalizer,
    engine: ClaimEngine,
    sparks: SparkTracker,
    scoreboard: Scoreboard,
    strict: bool,
    earliest: Option<DateTime<Tz>>,
    latest: Option<DateTime<Tz>>,
    counts: ClassificationCounts,
    scanned: u64,
    decode_failures: u64,
}

impl Scanner {
    pub fn new(config: &Config, tz: Tz) -> Self {
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            normalizer: Normalizer::new(&config.identities, tz),
            engine: ClaimEngine::new(config.rules.clone()),
            sparks: SparkTracker::new(),
            scoreboard: Scoreboard::new(&config.users),
            strict: false,
            earliest: None,
            latest: None,
            counts: ClassificationCounts::default(),
            scanned: 0,
            decode_failures: 0,
        }
    }

    /// Abort on the first undecodable message instead of skipping it.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn engine(&self) -> &ClaimEngine {
        &self.engine
    }

    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    pub fn scan(&mut self, reader: &ArchiveReader) -> Result<(), ScanError> {
        let rows = reader.for_each_message(|raw| self.ingest(raw))?;
        log::info!(
            "Scanned {} rows from {} ({} undecodable)",
            rows,
            reader.path().display(),
            self.decode_failures
        );
        Ok(())
    }

    pub fn ingest(&mut self, raw: RawMessage) -> Result<(), ScanError> {
        let date = raw.date;
        match self.normalizer.normalize(raw) {
            Ok(msg) => self.process(msg).map(|_| ()),
            Err(e) => self.decode_failed(date, e),
        }
    }

    fn decode_failed(&mut self, date: i64, error: DecodeError) -> Result<(), ScanError> {
        let timestamp = self.normalizer.timestamp(date).ok();
        let label = timestamp
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| format!("raw date {}", date));

        if self.strict {
            return Err(ScanError::Decode {
                timestamp: label,
                source: error,
            });
        }

        log::warn!("Skipping message at {}: {}", label, error);
        self.decode_failures += 1;
        self.scanned += 1;
        self.counts.record(Classification::Plain);
        if let Some(ts) = timestamp {
            self.observe(ts);
        }
        Ok(())
    }

    fn observe(&mut self, ts: DateTime<Tz>) {
        if self.earliest.map_or(true, |earliest| ts < earliest) {
            self.earliest = Some(ts);
        }
        if let Some(latest) = self.latest {
            if ts < latest {
                log::warn!("Message at {} arrived after one at {}", ts, latest);
            }
        }
        self.latest = Some(ts);
    }

    /// Classify one message and apply it to the claim window, spark tracker
    /// and scoreboard.
    pub fn process(&mut self, msg: NormalizedMessage) -> Result<Classification, ScanError> {
        self.scanned += 1;
        self.observe(msg.timestamp);

        let class = self.classifier.classify(&msg);
        self.counts.record(class);

        match class {
            Classification::Spark => {
                if let Some(sender) = self.sparks.on_spark(&msg) {
                    self.scoreboard.credit_spark(sender)?;
                }
            }
            Classification::Claimable => self.engine.on_claimable(msg),
            Classification::Reply(kind) => {
                if let Some(claim) = self.engine.on_reply(&msg, kind) {
                    self.scoreboard.credit_claim(&claim)?;
                }
            }
            Classification::Plain => {}
        }

        Ok(class)
    }

    pub fn finish(self) -> ScanSummary {
        ScanSummary {
            tallies: self.scoreboard.ranked(),
            earliest: self.earliest,
            total_claims: self.scoreboard.total_claims(),
            expired: self.engine.expired_count(),
            lost_capacity: self.engine.lost_capacity(),
            messages_scanned: self.scanned,
            decode_failures: self.decode_failures,
            classifications: self.counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use chrono_tz::America::New_York;
    use std::collections::BTreeMap;

    fn config() -> Config {
        let mut users = BTreeMap::new();
        users.insert("a".to_string(), "Alex".to_string());
        users.insert("b".to_string(), "Blair".to_string());
        users.insert("c".to_string(), "Casey".to_string());
        Config {
            users,
            ..Default::default()
        }
    }

    fn at(offset_secs: i64) -> DateTime<Tz> {
        New_York.with_ymd_and_hms(2024, 7, 1, 16, 19, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn msg(sender: &str, offset_secs: i64, text: &str) -> NormalizedMessage {
        NormalizedMessage::new(sender, at(offset_secs), text)
    }

    #[test]
    fn test_claim_round_scores_all_three() {
        let mut scanner = Scanner::new(&config(), New_York);
        scanner.process(msg("a", 0, "https://example.com/x")).unwrap();
        scanner.process(msg("b", 10, "me")).unwrap();
        scanner.process(msg("a", 15, "me")).unwrap();
        scanner.process(msg("c", 20, "not me!")).unwrap();

        let summary = scanner.finish();
        assert_eq!(summary.total_claims, 3);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.lost_capacity, 3);
        assert_eq!(summary.classifications.claimable, 1);
        assert_eq!(summary.classifications.affirm, 2);
        assert_eq!(summary.classifications.deny, 1);

        let casey = summary.tallies.iter().find(|t| t.name == "Casey").unwrap();
        assert_eq!((casey.mes, casey.not_mes), (0, 1));
    }

    #[test]
    fn test_spark_awarded_once_per_day() {
        let mut scanner = Scanner::new(&config(), New_York);
        assert_eq!(
            scanner.process(msg("b", 60, "spark")).unwrap(),
            Classification::Spark
        );
        scanner.process(msg("a", 65, "Spark")).unwrap();
        scanner.process(msg("a", 24 * 60 * 60 + 70, "spark")).unwrap();

        assert_eq!(scanner.scoreboard().get("b").unwrap().sparks, 1);
        assert_eq!(scanner.scoreboard().get("a").unwrap().sparks, 1);
    }

    #[test]
    fn test_spark_message_never_claims() {
        let mut scanner = Scanner::new(
            &Config {
                classifier: crate::classifier::ClassifierConfig {
                    trigger_word: "me".to_string(),
                    ..Default::default()
                },
                ..config()
            },
            New_York,
        );
        scanner.process(msg("a", 0, "https://example.com")).unwrap();
        scanner.process(msg("b", 60, "me")).unwrap();

        assert_eq!(scanner.engine().window()[0].claimants.len(), 0);
        assert_eq!(scanner.scoreboard().get("b").unwrap().sparks, 1);
    }

    #[test]
    fn test_unknown_claimant_aborts() {
        let mut scanner = Scanner::new(&config(), New_York);
        scanner.process(msg("a", 0, "https://example.com")).unwrap();
        let err = scanner.process(msg("zed", 40, "me")).unwrap_err();
        assert!(matches!(err, ScanError::UnknownIdentity(_)));
    }

    #[test]
    fn test_unknown_sender_may_post_claimables() {
        let mut scanner = Scanner::new(&config(), New_York);
        scanner.process(msg("zed", 0, "https://example.com")).unwrap();
        scanner.process(msg("a", 5, "me")).unwrap();
        assert_eq!(scanner.scoreboard().get("a").unwrap().mes, 1);
    }

    #[test]
    fn test_earliest_timestamp_covers_plain_messages() {
        let mut scanner = Scanner::new(&config(), New_York);
        scanner.process(msg("a", 0, "good morning")).unwrap();
        scanner.process(msg("b", 30, "hi")).unwrap();

        let summary = scanner.finish();
        assert_eq!(summary.earliest, Some(at(0)));
        assert_eq!(summary.messages_scanned, 2);
        assert_eq!(summary.classifications.plain, 2);
    }

    #[test]
    fn test_undecodable_message_is_skipped() {
        let mut scanner = Scanner::new(&config(), New_York);
        let raw = RawMessage {
            sender: Some("a".to_string()),
            date: 0,
            attributed_body: Some(b"garbage".to_vec()),
            ..Default::default()
        };
        scanner.ingest(raw).unwrap();

        let summary = scanner.finish();
        assert_eq!(summary.decode_failures, 1);
        assert_eq!(summary.classifications.plain, 1);
        assert!(summary.earliest.is_some());
    }

    #[test]
    fn test_undecodable_message_fails_in_strict_mode() {
        let mut scanner = Scanner::new(&config(), New_York).strict(true);
        let raw = RawMessage {
            attributed_body: Some(Vec::new()),
            ..Default::default()
        };
        let err = scanner.ingest(raw).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Decode {
                source: DecodeError::NoString,
                ..
            }
        ));
    }
}
