//! Spreadsheet sink
//!
//! The ingestion loop only needs "write these cells at this range". The
//! production sink talks to the Google Sheets values API; tests swap in a
//! recording sink.

use async_trait::async_trait;
use gs_common::metrics::{FIRST_MATCH_ROW, ROWS_PER_MATCH};
use gs_common::row::{CellValue, SheetRow, SheetTarget};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::SinkError;

/// Largest span accepted by [`fill_match_numbers`]
pub const MAX_FILL_MATCHES: u32 = 50;

/// Destination for spreadsheet rows
#[async_trait]
pub trait SheetSink: Send + Sync {
    /// Overwrite the cells of `range` (A1 notation) with `values`
    async fn write_range(&self, range: &str, values: Vec<Vec<CellValue>>) -> Result<(), SinkError>;

    /// Write one row starting at its column B
    async fn write_row(&self, row: &SheetRow) -> Result<(), SinkError> {
        self.write_range(&row.range(), vec![row.cells.clone()]).await
    }
}

/// Google Sheets values API client
pub struct GoogleSheetsSink {
    client: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    range: &'a str,
    major_dimension: &'static str,
    values: Vec<Vec<CellValue>>,
}

impl GoogleSheetsSink {
    pub fn new(
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            token,
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}?valueInputOption=RAW",
            self.api_base, self.spreadsheet_id, range
        )
    }
}

#[async_trait]
impl SheetSink for GoogleSheetsSink {
    async fn write_range(&self, range: &str, values: Vec<Vec<CellValue>>) -> Result<(), SinkError> {
        if self.spreadsheet_id.is_empty() {
            return Err(SinkError::NotConfigured("spreadsheet_id is empty".to_string()));
        }
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| SinkError::NotConfigured("sheets_token is not set".to_string()))?;

        let body = ValueRange {
            range,
            major_dimension: "ROWS",
            values,
        };

        debug!(range = %range, "Writing spreadsheet range");
        let response = self
            .client
            .put(self.values_url(range))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                range: range.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Write match numbers into column A, six rows per match
pub async fn fill_match_numbers(sink: &dyn SheetSink, from: u32, to: u32) -> Result<(), SinkError> {
    if from == 0 || to < from {
        return Err(SinkError::InvalidRange(format!("{}..={}", from, to)));
    }
    if to - from >= MAX_FILL_MATCHES {
        return Err(SinkError::InvalidRange(format!(
            "{}..={} spans {} or more matches",
            from, to, MAX_FILL_MATCHES
        )));
    }

    for match_number in from..=to {
        let first = FIRST_MATCH_ROW + (match_number - 1) * ROWS_PER_MATCH;
        let last = first + ROWS_PER_MATCH - 1;
        let range = format!("{}!A{}:A{}", SheetTarget::RawData, first, last);
        let values = (0..ROWS_PER_MATCH)
            .map(|_| vec![CellValue::from(match_number)])
            .collect();
        sink.write_range(&range, values).await?;
    }

    info!(from, to, "Filled match numbers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(String, Vec<Vec<CellValue>>)>>,
    }

    #[async_trait]
    impl SheetSink for Recorder {
        async fn write_range(&self, range: &str, values: Vec<Vec<CellValue>>) -> Result<(), SinkError> {
            self.writes.lock().unwrap().push((range.to_string(), values));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_write_row_targets_column_b() {
        let sink = Recorder::default();
        let row = SheetRow {
            target: SheetTarget::RawData,
            row: 18,
            cells: vec![CellValue::Int(118)],
        };
        sink.write_row(&row).await.unwrap();

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes[0].0, "RawData!B18");
        assert_eq!(writes[0].1, vec![vec![CellValue::Int(118)]]);
    }

    #[tokio::test]
    async fn test_fill_match_numbers() {
        let sink = Recorder::default();
        fill_match_numbers(&sink, 2, 3).await.unwrap();

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].0, "RawData!A8:A13");
        assert_eq!(writes[0].1.len(), 6);
        assert_eq!(writes[0].1[0], vec![CellValue::Int(2)]);
        assert_eq!(writes[1].0, "RawData!A14:A19");
    }

    #[tokio::test]
    async fn test_fill_match_numbers_rejects_bad_ranges() {
        let sink = Recorder::default();
        assert!(matches!(
            fill_match_numbers(&sink, 5, 4).await,
            Err(SinkError::InvalidRange(_))
        ));
        assert!(matches!(
            fill_match_numbers(&sink, 1, 60).await,
            Err(SinkError::InvalidRange(_))
        ));
        assert!(sink.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_google_sink_requires_token() {
        let sink = GoogleSheetsSink::new("http://127.0.0.1:9", "sheet", None).unwrap();
        let err = sink.write_range("RawData!B2", Vec::new()).await.unwrap_err();
        assert!(matches!(err, SinkError::NotConfigured(_)));
    }

    #[test]
    fn test_values_url() {
        let sink = GoogleSheetsSink::new("https://sheets.example/v4/", "abc", None).unwrap();
        assert_eq!(
            sink.values_url("RawData!B18"),
            "https://sheets.example/v4/spreadsheets/abc/values/RawData!B18?valueInputOption=RAW"
        );
    }
}
