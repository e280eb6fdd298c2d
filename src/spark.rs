use crate::message::NormalizedMessage;
use chrono::NaiveDate;

/// Awards the daily trigger to the first sender of each local calendar day.
/// Relies on messages arriving in chronological order.
#[derive(Debug)]
pub struct SparkTracker {
    last_awarded: NaiveDate,
}

impl Default for SparkTracker {
    fn default() -> Self {
        Self {
            last_awarded: NaiveDate::MIN,
        }
    }
}

impl SparkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sender to credit, or `None` if today's trigger was already awarded.
    pub fn on_spark<'a>(&mut self, msg: &'a NormalizedMessage) -> Option<&'a str> {
        let date = msg.timestamp.date_naive();
        if date > self.last_awarded {
            log::debug!("spark for {} awarded to {}", date, msg.sender_id);
            self.last_awarded = date;
            Some(&msg.sender_id)
        } else {
            None
        }
    }

    pub fn last_awarded(&self) -> Option<NaiveDate> {
        (self.last_awarded != NaiveDate::MIN).then_some(self.last_awarded)
    }
}
