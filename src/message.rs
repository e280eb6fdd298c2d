use chrono::DateTime;
use chrono_tz::Tz;

/// A single archive row after identity resolution, time zone conversion and
/// body decoding. Everything downstream of the archive reader works on this.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    pub sender_id: String,
    pub timestamp: DateTime<Tz>,
    pub text: String,
    pub has_attachment: bool,
    pub attachment_bundle: Option<String>,
}

impl NormalizedMessage {
    pub fn new(
        sender_id: impl Into<String>,
        timestamp: DateTime<Tz>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id: sender_id.into(),
            timestamp,
            text: text.into(),
            has_attachment: false,
            attachment_bundle: None,
        }
    }

    pub fn with_attachment(mut self, bundle: Option<&str>) -> Self {
        self.has_attachment = true;
        self.attachment_bundle = bundle.map(str::to_string);
        self
    }
}
