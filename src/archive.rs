//! Reading and normalizing rows from a Messages `chat.db` archive.

use crate::config::{AliasConfig, IdentityConfig};
use crate::error::{DecodeError, ScanError};
use crate::message::NormalizedMessage;
use crate::typedstream::decode_attributed_body;
use anyhow::Context;
use chrono::DateTime;
use chrono_tz::Tz;
use rusqlite::{Connection, OpenFlags, Row};
use std::path::{Path, PathBuf};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the archive's epoch.
pub const APPLE_EPOCH_OFFSET_SECS: i64 = 978_307_200;

const NANOS_PER_SEC: i64 = 1_000_000_000;

const BASE_QUERY: &str = "SELECT handle.id AS sender,
        message.date AS date,
        message.text AS text,
        message.attributedBody AS attributed_body,
        message.cache_has_attachments AS has_attachment,
        message.balloon_bundle_id AS balloon_bundle_id
 FROM message
 LEFT JOIN handle ON message.handle_id = handle.ROWID";

const CHAT_FILTER: &str = "
 JOIN chat_message_join ON chat_message_join.message_id = message.ROWID
 JOIN chat ON chat.ROWID = chat_message_join.chat_id
 WHERE chat.chat_identifier = ?1";

const ORDER: &str = "
 ORDER BY message.date ASC";

/// One archive row with typed columns, before any decoding.
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub sender: Option<String>,
    pub date: i64,
    pub text: Option<String>,
    pub attributed_body: Option<Vec<u8>>,
    pub has_attachment: bool,
    pub balloon_bundle_id: Option<String>,
}

impl RawMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            sender: row.get("sender")?,
            date: row.get("date")?,
            text: row.get("text")?,
            attributed_body: row.get("attributed_body")?,
            has_attachment: row.get::<_, Option<i64>>("has_attachment")?.unwrap_or(0) != 0,
            balloon_bundle_id: row.get("balloon_bundle_id")?,
        })
    }
}

pub struct ArchiveReader {
    path: PathBuf,
    conn: Connection,
    custom_query: Option<String>,
    chat_identifier: Option<String>,
}

impl ArchiveReader {
    /// Open the archive read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| ScanError::SourceUnavailable {
            path: path.clone(),
            reason,
        };

        if !path.is_file() {
            return Err(unavailable("no such file".to_string()));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| unavailable(e.to_string()))?;

        log::info!("Opened archive {}", path.display());

        Ok(Self {
            path,
            conn,
            custom_query: None,
            chat_identifier: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Limit the scan to one conversation. Ignored when a custom query is set.
    pub fn with_chat(mut self, chat_identifier: Option<String>) -> Self {
        self.chat_identifier = chat_identifier;
        self
    }

    /// Replace the built-in query. The query must return the columns
    /// `sender`, `date`, `text`, `attributed_body`, `has_attachment` and
    /// `balloon_bundle_id`, ordered by `date`.
    pub fn with_query(mut self, sql: Option<String>) -> Self {
        self.custom_query = sql;
        self
    }

    fn query(&self) -> String {
        if let Some(sql) = &self.custom_query {
            return sql.clone();
        }
        let mut sql = BASE_QUERY.to_string();
        if self.chat_identifier.is_some() {
            sql.push_str(CHAT_FILTER);
        }
        sql.push_str(ORDER);
        sql
    }

    /// Stream rows in query order. Returns the number of rows read.
    pub fn for_each_message<F>(&self, mut f: F) -> Result<usize, ScanError>
    where
        F: FnMut(RawMessage) -> Result<(), ScanError>,
    {
        let sql = self.query();
        log::debug!("Archive query: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = match (&self.custom_query, &self.chat_identifier) {
            (None, Some(chat)) => stmt.query([chat])?,
            _ => stmt.query([])?,
        };

        let mut count = 0;
        while let Some(row) = rows.next()? {
            f(RawMessage::from_row(row)?)?;
            count += 1;
        }

        Ok(count)
    }
}

/// Turns raw rows into [`NormalizedMessage`]s: resolves identities, converts
/// timestamps into the configured zone and decodes message bodies.
#[derive(Debug, Clone)]
pub struct Normalizer {
    self_id: String,
    aliases: Vec<AliasConfig>,
    tz: Tz,
}

impl Normalizer {
    pub fn new(identities: &IdentityConfig, tz: Tz) -> Self {
        Self {
            self_id: identities.self_id.clone(),
            aliases: identities.aliases.clone(),
            tz,
        }
    }

    pub fn resolve_sender(&self, sender: Option<&str>) -> String {
        match sender {
            None => self.self_id.clone(),
            Some(id) => self
                .aliases
                .iter()
                .find(|alias| alias.from == id)
                .map(|alias| alias.to.clone())
                .unwrap_or_else(|| id.to_string()),
        }
    }

    /// Convert nanoseconds since the archive epoch into the configured zone.
    pub fn timestamp(&self, apple_nanos: i64) -> Result<DateTime<Tz>, DecodeError> {
        let secs = apple_nanos.div_euclid(NANOS_PER_SEC) + APPLE_EPOCH_OFFSET_SECS;
        let nanos = apple_nanos.rem_euclid(NANOS_PER_SEC) as u32;

        DateTime::from_timestamp(secs, nanos)
            .map(|utc| utc.with_timezone(&self.tz))
            .ok_or(DecodeError::InvalidTimestamp(apple_nanos))
    }

    /// The attributed body wins over the plain `text` column when present.
    pub fn body(raw: &RawMessage) -> Result<String, DecodeError> {
        match &raw.attributed_body {
            Some(data) => decode_attributed_body(data),
            None => Ok(raw.text.clone().unwrap_or_default()),
        }
    }

    pub fn normalize(&self, raw: RawMessage) -> Result<NormalizedMessage, DecodeError> {
        let timestamp = self.timestamp(raw.date)?;
        let text = Self::body(&raw)?;

        Ok(NormalizedMessage {
            sender_id: self.resolve_sender(raw.sender.as_deref()),
            timestamp,
            text,
            has_attachment: raw.has_attachment,
            attachment_bundle: raw.balloon_bundle_id,
        })
    }
}

/// Copy the archive into `dir`, named after the earliest processed message.
pub fn backup_archive(
    archive: &Path,
    dir: &Path,
    since: &DateTime<Tz>,
) -> anyhow::Result<PathBuf> {
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("chat.db");
    let target = dir.join(format!(
        "{}.since{}.bak",
        file_name,
        since.format("%Y%m%d%H%M")
    ));

    std::fs::copy(archive, &target).with_context(|| {
        format!(
            "Failed to back up {} to {}",
            archive.display(),
            target.display()
        )
    })?;

    log::info!("Backed up archive to {}", target.display());
    Ok(target)
}
