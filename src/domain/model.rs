use crate::utils::error::{IngressError, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// JAO 跨境容量走廊識別碼，同時作為 watermark 與 sink key 的分組鍵
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CorridorId(String);

impl CorridorId {
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(IngressError::InvalidCorridor {
                value: raw.to_string(),
                reason: "identifier cannot be empty".to_string(),
            });
        }
        if value.contains('/') {
            return Err(IngressError::InvalidCorridor {
                value: raw.to_string(),
                reason: "identifier cannot contain '/'".to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CorridorId {
    type Error = IngressError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CorridorId> for String {
    fn from(id: CorridorId) -> Self {
        id.0
    }
}

impl fmt::Display for CorridorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open range `[start, end)` requested from the JAO API in one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchWindow {
    pub corridor: CorridorId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl FetchWindow {
    /// Computes the next window after `watermark`, or `None` when there is
    /// nothing to fetch yet.
    ///
    /// The JAO API answers per calendar day, so the end is truncated to
    /// midnight UTC. `max_len` caps the window length.
    pub fn next(
        corridor: &CorridorId,
        watermark: DateTime<Utc>,
        now: DateTime<Utc>,
        max_len: Option<Duration>,
    ) -> Option<Self> {
        let upper = match max_len {
            Some(len) => now.min(watermark + len),
            None => now,
        };
        let end = floor_to_day(upper);
        if end <= watermark {
            return None;
        }
        Some(Self {
            corridor: corridor.clone(),
            start: watermark,
            end,
        })
    }

    /// Deterministic object key, e.g. `DK1-DE/2020-01-01_2020-01-03`.
    pub fn sink_key(&self) -> String {
        format!(
            "{}/{}_{}",
            self.corridor,
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {})",
            self.corridor,
            format_timestamp(self.start),
            format_timestamp(self.end)
        )
    }
}

/// Raw records returned for one window. Dropped after the upload attempt.
#[derive(Debug, Clone, Default)]
pub struct IngestedBatch {
    pub records: Vec<serde_json::Value>,
    /// The API guarantees that an empty answer covers the whole window.
    pub window_complete: bool,
}

impl IngestedBatch {
    pub fn new(records: Vec<serde_json::Value>, window_complete: bool) -> Self {
        Self {
            records,
            window_complete,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.records)?)
    }
}

/// 單一走廊在本次執行中停在哪個步驟失敗
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    ReadWatermark,
    Fetch,
    Upload,
    Commit,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureStage::ReadWatermark => "read_watermark",
            FailureStage::Fetch => "fetch",
            FailureStage::Upload => "upload",
            FailureStage::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum CorridorOutcome {
    /// Terminal `Done`: every window was either committed or held back.
    Done,
    /// Terminal `Failed`: the watermark stayed at `CorridorReport::watermark`.
    Failed {
        stage: FailureStage,
        window: Option<FetchWindow>,
        error: IngressError,
    },
}

#[derive(Debug)]
pub struct CorridorReport {
    pub corridor: CorridorId,
    pub watermark_before: Option<DateTime<Utc>>,
    pub watermark: Option<DateTime<Utc>>,
    pub windows_committed: usize,
    pub records_uploaded: usize,
    pub outcome: CorridorOutcome,
}

impl CorridorReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CorridorOutcome::Failed { .. })
    }

    pub fn advanced(&self) -> bool {
        self.windows_committed > 0
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub corridors: Vec<CorridorReport>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.corridors.iter().any(CorridorReport::is_failed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CorridorReport> {
        self.corridors.iter().filter(|r| r.is_failed())
    }

    pub fn total_records(&self) -> usize {
        self.corridors.iter().map(|r| r.records_uploaded).sum()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn get(&self, corridor: &CorridorId) -> Option<&CorridorReport> {
        self.corridors.iter().find(|r| &r.corridor == corridor)
    }
}

pub fn floor_to_day(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Parses RFC 3339, naive ISO date-time (assumed UTC) or a plain `YYYY-MM-DD`.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_corridor_id_validation() {
        assert_eq!(CorridorId::parse(" DK1-DE ").unwrap().as_str(), "DK1-DE");
        assert!(CorridorId::parse("").is_err());
        assert!(CorridorId::parse("   ").is_err());
        assert!(CorridorId::parse("DK1/DE").is_err());
    }

    #[test]
    fn test_window_ends_at_midnight_before_now() {
        let corridor = CorridorId::parse("10Y-CORRIDOR-1").unwrap();
        let window = FetchWindow::next(&corridor, ts(2020, 1, 1, 0), ts(2020, 1, 3, 15), None)
            .unwrap();

        assert_eq!(window.start, ts(2020, 1, 1, 0));
        assert_eq!(window.end, ts(2020, 1, 3, 0));
        assert_eq!(window.sink_key(), "10Y-CORRIDOR-1/2020-01-01_2020-01-03");
    }

    #[test]
    fn test_no_window_when_now_not_after_watermark() {
        let corridor = CorridorId::parse("DK1-DE").unwrap();
        let w = ts(2020, 1, 3, 0);

        assert!(FetchWindow::next(&corridor, w, w, None).is_none());
        assert!(FetchWindow::next(&corridor, w, ts(2020, 1, 2, 0), None).is_none());
        // 同一天內還沒有完整的一天可抓
        assert!(FetchWindow::next(&corridor, w, ts(2020, 1, 3, 23), None).is_none());
    }

    #[test]
    fn test_window_respects_max_length() {
        let corridor = CorridorId::parse("DK1-DE").unwrap();
        let window = FetchWindow::next(
            &corridor,
            ts(2020, 1, 1, 0),
            ts(2020, 6, 1, 0),
            Some(Duration::days(31)),
        )
        .unwrap();

        assert_eq!(window.end, ts(2020, 2, 1, 0));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(parse_timestamp("2020-01-01"), Some(ts(2020, 1, 1, 0)));
        assert_eq!(parse_timestamp("2020-01-01T06:00:00"), Some(ts(2020, 1, 1, 6)));
        assert_eq!(parse_timestamp("2020-01-01T06:00:00Z"), Some(ts(2020, 1, 1, 6)));
        assert_eq!(parse_timestamp("2020-01-01T07:00:00+01:00"), Some(ts(2020, 1, 1, 6)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_format_timestamp_is_rfc3339_utc() {
        assert_eq!(format_timestamp(ts(2020, 1, 3, 0)), "2020-01-03T00:00:00Z");
    }

    #[test]
    fn test_batch_payload_is_json_array() {
        let batch = IngestedBatch::new(vec![serde_json::json!({"id": 1})], false);
        assert_eq!(batch.to_payload().unwrap(), br#"[{"id":1}]"#.to_vec());
    }
}
