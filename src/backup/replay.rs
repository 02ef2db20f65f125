//! Loading a prior backup for replay and building the comparison link.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

use super::document::BackupDocument;
use super::BackupError;
use crate::dimensions::ReplayContext;
use crate::metric::{current_time_ms, Metric};
use crate::transport::{ObjectStore, TransportError};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplayError {
    /// The backup object could not be fetched.
    Download(TransportError),
    /// The backup body is not a valid document.
    Parse(String),
    /// A metric entry names something this build does not know.
    InvalidMetric(String),
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::Download(e) => write!(f, "backup download failed: {}", e),
            ReplayError::Parse(msg) => write!(f, "backup parse failed: {}", msg),
            ReplayError::InvalidMetric(msg) => write!(f, "invalid metric in backup: {}", msg),
        }
    }
}

impl std::error::Error for ReplayError {}

/// What a completed replay produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub replay_id: u64,
    pub metric_count: usize,
    pub dashboard_link: String,
}

/// A downloaded, parsed backup ready to be re-ingested.
#[derive(Debug, Clone)]
pub struct LoadedReplay {
    pub context: ReplayContext,
    pub metrics: Vec<Metric>,
}

static LAST_REPLAY_ID: AtomicU64 = AtomicU64::new(0);

/// Mint a replay id from the clock. Strictly increasing within a process even
/// when two calls land in the same nanosecond.
pub fn next_replay_id() -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    let previous = LAST_REPLAY_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or_else(|last| last);
    now.max(previous + 1)
}

/// Shift timestamps so the earliest lands at `now_ms`, keeping relative
/// spacing intact.
pub fn relocate_timestamps(metrics: &mut [Metric], now_ms: u64) {
    let Some(earliest) = metrics.iter().map(|m| m.timestamp).min() else {
        return;
    };
    for metric in metrics.iter_mut() {
        metric.timestamp = now_ms.saturating_add(metric.timestamp - earliest);
    }
}

/// Download and parse the backup at `path`. Nothing outside the returned value
/// is touched, so a failure here leaves the publisher untouched.
pub async fn load_replay(
    store: &dyn ObjectStore,
    path: &str,
    relocate: bool,
) -> Result<LoadedReplay, ReplayError> {
    let body = store.get_object(path).await.map_err(|e| {
        error!(path = %path, error = %e, "failed to rehydrate backup: download returned error");
        ReplayError::Download(e)
    })?;

    let document = BackupDocument::parse(&body).map_err(|e| match e {
        BackupError::Parse(msg) | BackupError::Serialize(msg) => ReplayError::Parse(msg),
        BackupError::Store(t) => ReplayError::Download(t),
    })?;

    let mut metrics = document.to_metrics().map_err(|e| ReplayError::InvalidMetric(e.to_string()))?;
    if relocate {
        relocate_timestamps(&mut metrics, current_time_ms());
    }

    let context = document.replay_context(next_replay_id());
    debug!(
        path = %path,
        replay_id = context.replay_id,
        metrics = metrics.len(),
        "backup loaded for replay"
    );

    Ok(LoadedReplay { context, metrics })
}

const DASHBOARD_METRICS: &[&str] = &[
    "NumConnections",
    "FailedTransfer",
    "SuccessfulTransfer",
    "S3AddressCount",
];

/// CloudWatch console link graphing the replayed series. Dimension values are
/// embedded in the console's tilde-quoted URL syntax.
pub fn dashboard_link(region: &str, namespace: &str, ctx: &ReplayContext) -> String {
    let quote = |s: &str| urlencoding::encode(s).replace('%', "*");
    let encrypted = u8::from(ctx.encrypted);

    let mut series = format!(
        "~(~(expression~'m1*2a8*2f1000*2f1000*2f1000~label~'BytesDownGb~id~'e1))\
         ~(~(expression~'m2*2a8*2f1000*2f1000*2f1000~label~'BytesUpGb~id~'e2))\
         ~(~'{ns}~'BytesDown~'Platform~'{platform}~'ToolName~'{tool}~'Encrypted~'{encrypted}\
         ~'ReplayId~'{replay_id}~'InstanceType~'{instance}~'TransferType~'{transfer}~(id~'m1~visible~false))\
         ~(~'.~'BytesUp~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~(id~'m2~visible~false))",
        ns = quote(namespace),
        platform = quote(&ctx.platform_name),
        tool = quote(&ctx.tool_name),
        encrypted = encrypted,
        replay_id = ctx.replay_id,
        instance = quote(&ctx.instance_type),
        transfer = ctx.transfer_type.as_str(),
    );
    for (i, name) in DASHBOARD_METRICS.iter().enumerate() {
        series.push_str(&format!(
            "~(~'.~'{}~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~'.~(id~'m{}~visible~false))",
            name,
            i + 3
        ));
    }

    format!(
        "https://{region}.console.aws.amazon.com/cloudwatch/home?region={region}\
         #metricsV2:graph=~(metrics~({series})~view~'timeSeries~stacked~false~region~'{region}\
         ~stat~'Sum~period~1~title~'Replay*20Graph)\
         ;query=~'*7b{ns}*2cEncrypted*2cInstanceType*2cPlatform*2cReplayId*2cToolName*2cTransferType*7d",
        region = region,
        series = series,
        ns = quote(namespace),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::Dimensions;
    use crate::metric::{MetricName, MetricUnit, TransferType};
    use crate::transport::MemoryObjectStore;
    use bytes::Bytes;

    fn ctx() -> ReplayContext {
        ReplayContext {
            transfer_type: TransferType::MultiPart,
            platform_name: "linux".to_string(),
            tool_name: "x".to_string(),
            instance_type: "c5".to_string(),
            encrypted: true,
            replay_id: 1234,
        }
    }

    #[test]
    fn replay_ids_strictly_increase() {
        let ids: Vec<u64> = (0..100).map(|_| next_replay_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn relocation_keeps_spacing() {
        let mut metrics = vec![
            Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, 5_000, 1.0),
            Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, 3_000, 1.0),
        ];
        relocate_timestamps(&mut metrics, 100_000);
        assert_eq!(metrics[0].timestamp, 102_000);
        assert_eq!(metrics[1].timestamp, 100_000);

        let mut empty: Vec<Metric> = Vec::new();
        relocate_timestamps(&mut empty, 1);
    }

    #[test]
    fn relocation_saturates_on_huge_timestamps() {
        let mut metrics = vec![
            Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, 0, 1.0),
            Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, u64::MAX, 1.0),
        ];
        relocate_timestamps(&mut metrics, 1_700_000_000_000);
        assert_eq!(metrics[0].timestamp, 1_700_000_000_000);
        assert_eq!(metrics[1].timestamp, u64::MAX);
    }

    #[test]
    fn dashboard_link_carries_dimensions() {
        let link = dashboard_link("us-west-2", "transfer-canary", &ctx());
        assert!(link.starts_with("https://us-west-2.console.aws.amazon.com/cloudwatch/home?region=us-west-2#"));
        assert!(link.contains("~'ReplayId~'1234"));
        assert!(link.contains("~'Platform~'linux"));
        assert!(link.contains("~'Encrypted~'1"));
        assert!(link.contains("~'TransferType~'MultiPart"));
        assert!(link.contains("*7btransfer-canary*2c"));
        assert!(link.contains("~(id~'m6~visible~false)"));
    }

    #[tokio::test]
    async fn load_replay_mints_fresh_context() {
        let store = MemoryObjectStore::new();
        let dims = Dimensions {
            platform_name: "linux".to_string(),
            tool_name: "x".to_string(),
            instance_type: "c5".to_string(),
            transfer_type: TransferType::MultiPart,
            encrypted: true,
            replay_id: Some(1),
        };
        let metrics = vec![Metric::with_timestamp(MetricName::BytesUp, MetricUnit::Bytes, 1_000, 2.0)];
        let json = BackupDocument::new(&dims, &metrics).to_json_pretty().unwrap();
        store.put_object("x/linux/c5/b.json", Bytes::from(json)).await.unwrap();

        let loaded = load_replay(&store, "x/linux/c5/b.json", false).await.unwrap();
        assert_eq!(loaded.metrics, metrics);
        assert_ne!(loaded.context.replay_id, 1);
        assert_eq!(loaded.context.tool_name, "x");
    }

    #[tokio::test]
    async fn load_replay_reports_download_and_parse_failures() {
        let store = MemoryObjectStore::new();
        assert!(matches!(
            load_replay(&store, "missing.json", false).await,
            Err(ReplayError::Download(TransportError::NotFound(_)))
        ));

        store.put_object("bad.json", Bytes::from_static(b"{")).await.unwrap();
        assert!(matches!(
            load_replay(&store, "bad.json", false).await,
            Err(ReplayError::Parse(_))
        ));
    }
}
