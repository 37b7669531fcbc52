use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GantryError;
use crate::ports::PlaytimeStore;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct PlaytimeRecord {
    /// RFC 3339 timestamp of the end of the last session.
    pub last_played: Option<String>,
    pub total_played_secs: u64,
}

/// Adds one session to the title's record and returns the updated record.
pub fn record_session(
    store: &dyn PlaytimeStore,
    title_id: &str,
    started: DateTime<Utc>,
    ended: DateTime<Utc>,
) -> Result<PlaytimeRecord, GantryError> {
    let mut record = store.load(title_id)?.unwrap_or_default();
    let played = u64::try_from((ended - started).num_seconds()).unwrap_or(0);

    record.total_played_secs = record.total_played_secs.saturating_add(played);
    record.last_played = Some(ended.to_rfc3339_opts(SecondsFormat::Secs, true));
    store.save(title_id, &record)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_support::MemoryPlaytime;

    #[test]
    fn sessions_accumulate_and_stamp_last_played() {
        let store = MemoryPlaytime::default();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();

        record_session(&store, "celeste", start, start + chrono::Duration::minutes(30))
            .expect("first session");
        let record = record_session(
            &store,
            "celeste",
            start + chrono::Duration::hours(2),
            start + chrono::Duration::hours(3),
        )
        .expect("second session");

        assert_eq!(record.total_played_secs, 30 * 60 + 60 * 60);
        assert_eq!(record.last_played.as_deref(), Some("2024-03-01T23:00:00Z"));
    }

    #[test]
    fn clock_going_backwards_adds_nothing() {
        let store = MemoryPlaytime::default();
        let now = Utc::now();
        let record =
            record_session(&store, "celeste", now, now - chrono::Duration::seconds(5)).expect("record");
        assert_eq!(record.total_played_secs, 0);
    }
}
