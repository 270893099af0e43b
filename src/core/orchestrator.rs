use crate::domain::model::{
    floor_to_day, CorridorId, CorridorOutcome, CorridorReport, FailureStage, FetchWindow,
    RunReport,
};
use crate::domain::ports::{FetchClient, Sink, WatermarkStore};
use crate::utils::error::IngressError;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::Instrument;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Longest window requested in one cycle; `None` fetches up to now.
    pub max_window: Option<Duration>,
    pub max_concurrent_corridors: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_window: None,
            max_concurrent_corridors: 1,
        }
    }
}

/// How a successful cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleResult {
    /// Watermark advanced to the window end.
    Committed { records: usize },
    /// Empty answer for a window reaching today; the day may still be published.
    Held,
}

type CycleFailure = (FailureStage, IngressError);

/// Drives fetch, upload and commit for every corridor of a run.
///
/// The watermark of a corridor is committed only after the window's records
/// were uploaded, so the sink always holds everything the watermark implies.
/// Failures stay local to their corridor.
pub struct IngestionOrchestrator {
    fetcher: Arc<dyn FetchClient>,
    sink: Arc<dyn Sink>,
    store: Arc<dyn WatermarkStore>,
    options: OrchestratorOptions,
}

impl IngestionOrchestrator {
    pub fn new(
        fetcher: Arc<dyn FetchClient>,
        sink: Arc<dyn Sink>,
        store: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            fetcher,
            sink,
            store,
            options: OrchestratorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// One pass over `corridors`. Reports come back in input order.
    pub async fn run(&self, corridors: &[CorridorId], now: DateTime<Utc>) -> RunReport {
        let concurrency = self.options.max_concurrent_corridors.max(1);
        tracing::info!(
            corridors = corridors.len(),
            concurrency,
            "🚀 Starting ingestion run"
        );

        let reports = stream::iter(corridors)
            .map(|corridor| {
                let span = tracing::info_span!("corridor", corridor = %corridor);
                self.run_corridor(corridor, now).instrument(span)
            })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await;

        RunReport { corridors: reports }
    }

    pub async fn run_corridor(&self, corridor: &CorridorId, now: DateTime<Utc>) -> CorridorReport {
        let mut report = CorridorReport {
            corridor: corridor.clone(),
            watermark_before: None,
            watermark: None,
            windows_committed: 0,
            records_uploaded: 0,
            outcome: CorridorOutcome::Done,
        };

        let mut watermark = match self.store.get(corridor).await {
            Ok(watermark) => watermark,
            Err(error) => {
                log_failure(corridor, FailureStage::ReadWatermark, None, &error);
                report.outcome = CorridorOutcome::Failed {
                    stage: FailureStage::ReadWatermark,
                    window: None,
                    error,
                };
                return report;
            }
        };
        report.watermark_before = Some(watermark);
        report.watermark = Some(watermark);

        while let Some(window) =
            FetchWindow::next(corridor, watermark, now, self.options.max_window)
        {
            match self.run_cycle(&window, now).await {
                Ok(CycleResult::Committed { records }) => {
                    watermark = window.end;
                    report.watermark = Some(watermark);
                    report.windows_committed += 1;
                    report.records_uploaded += records;
                    tracing::info!(records, window = %window, "✅ Window committed");
                }
                Ok(CycleResult::Held) => {
                    tracing::info!(window = %window, "No records yet, watermark held");
                    break;
                }
                Err((stage, error)) => {
                    log_failure(corridor, stage, Some(&window), &error);
                    report.outcome = CorridorOutcome::Failed {
                        stage,
                        window: Some(window),
                        error,
                    };
                    break;
                }
            }
        }

        if !report.is_failed() && report.windows_committed == 0 {
            tracing::debug!(watermark = %watermark, "Nothing committed for corridor");
        }
        report
    }

    async fn run_cycle(
        &self,
        window: &FetchWindow,
        now: DateTime<Utc>,
    ) -> Result<CycleResult, CycleFailure> {
        tracing::debug!(window = %window, "Fetching");
        let batch = self
            .fetcher
            .fetch(window)
            .await
            .map_err(|e| (FailureStage::Fetch, e))?;

        let records = batch.len();
        if batch.is_empty() {
            // 只有延伸到今天的區間才可能還在等資料；完全落在過去的空區間直接推進
            if !batch.window_complete && window.end >= floor_to_day(now) {
                return Ok(CycleResult::Held);
            }
            self.commit(window).await?;
            return Ok(CycleResult::Committed { records: 0 });
        }

        let payload = batch
            .to_payload()
            .map_err(|e| (FailureStage::Upload, e))?;
        drop(batch);

        let key = window.sink_key();
        tracing::debug!(key = %key, records, bytes = payload.len(), "Uploading");
        self.sink
            .upload(&key, &payload)
            .await
            .map_err(|e| (FailureStage::Upload, e))?;

        self.commit(window).await?;
        Ok(CycleResult::Committed { records })
    }

    async fn commit(&self, window: &FetchWindow) -> Result<(), CycleFailure> {
        self.store
            .commit(&window.corridor, window.end)
            .await
            .map_err(|e| (FailureStage::Commit, e))
    }
}

fn log_failure(
    corridor: &CorridorId,
    stage: FailureStage,
    window: Option<&FetchWindow>,
    error: &IngressError,
) {
    let window = window.map(ToString::to_string).unwrap_or_default();
    tracing::error!(
        corridor = %corridor,
        stage = %stage,
        kind = ?error.kind(),
        transient = error.is_transient(),
        window = %window,
        "❌ Corridor failed: {}",
        error
    );
}
