//! Metric sample model: names, units, and the per-second aggregation key.

use std::fmt;
use std::str::FromStr;

/// Connection-pool gauges sampled from a transport, recorded once per direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportMetricName {
    HeldConnectionCount,
    PendingAcquisitionCount,
    PendingConnectsCount,
    VendedConnectionCount,
    OpenConnectionCount,
}

impl TransportMetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMetricName::HeldConnectionCount => "HeldConnectionCount",
            TransportMetricName::PendingAcquisitionCount => "PendingAcquisitionCount",
            TransportMetricName::PendingConnectsCount => "PendingConnectsCount",
            TransportMetricName::VendedConnectionCount => "VendedConnectionCount",
            TransportMetricName::OpenConnectionCount => "OpenConnectionCount",
        }
    }

    pub fn all() -> &'static [TransportMetricName] {
        &[
            TransportMetricName::HeldConnectionCount,
            TransportMetricName::PendingAcquisitionCount,
            TransportMetricName::PendingConnectsCount,
            TransportMetricName::VendedConnectionCount,
            TransportMetricName::OpenConnectionCount,
        ]
    }

    fn from_name(name: &str) -> Option<TransportMetricName> {
        Self::all().iter().copied().find(|m| m.as_str() == name)
    }
}

/// Name of a published metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricName {
    BytesUp,
    BytesUpFailed,
    BytesDown,
    BytesDownFailed,
    NumConnections,
    S3AddressCount,
    SuccessfulTransfer,
    FailedTransfer,
    NumConnectionsCreated,
    Upload(TransportMetricName),
    Download(TransportMetricName),
}

impl MetricName {
    const SIMPLE: &'static [MetricName] = &[
        MetricName::BytesUp,
        MetricName::BytesUpFailed,
        MetricName::BytesDown,
        MetricName::BytesDownFailed,
        MetricName::NumConnections,
        MetricName::S3AddressCount,
        MetricName::SuccessfulTransfer,
        MetricName::FailedTransfer,
        MetricName::NumConnectionsCreated,
    ];

    /// Name as it appears on the wire and in backups.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::BytesUp => "BytesUp",
            MetricName::BytesUpFailed => "BytesUpFailed",
            MetricName::BytesDown => "BytesDown",
            MetricName::BytesDownFailed => "BytesDownFailed",
            MetricName::NumConnections => "NumConnections",
            MetricName::S3AddressCount => "S3AddressCount",
            MetricName::SuccessfulTransfer => "SuccessfulTransfer",
            MetricName::FailedTransfer => "FailedTransfer",
            MetricName::NumConnectionsCreated => "NumConnectionsCreated",
            MetricName::Upload(m) => match m {
                TransportMetricName::HeldConnectionCount => "UploadHeldConnectionCount",
                TransportMetricName::PendingAcquisitionCount => "UploadPendingAcquisitionCount",
                TransportMetricName::PendingConnectsCount => "UploadPendingConnectsCount",
                TransportMetricName::VendedConnectionCount => "UploadVendedConnectionCount",
                TransportMetricName::OpenConnectionCount => "UploadOpenConnectionCount",
            },
            MetricName::Download(m) => match m {
                TransportMetricName::HeldConnectionCount => "DownloadHeldConnectionCount",
                TransportMetricName::PendingAcquisitionCount => "DownloadPendingAcquisitionCount",
                TransportMetricName::PendingConnectsCount => "DownloadPendingConnectsCount",
                TransportMetricName::VendedConnectionCount => "DownloadVendedConnectionCount",
                TransportMetricName::OpenConnectionCount => "DownloadOpenConnectionCount",
            },
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a metric name string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMetricName(pub String);

impl fmt::Display for UnknownMetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown metric name: {}", self.0)
    }
}

impl std::error::Error for UnknownMetricName {}

impl FromStr for MetricName {
    type Err = UnknownMetricName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = MetricName::SIMPLE.iter().find(|n| n.as_str() == s) {
            return Ok(*name);
        }
        if let Some(name) = s.strip_prefix("Upload").and_then(TransportMetricName::from_name) {
            return Ok(MetricName::Upload(name));
        }
        if let Some(name) = s
            .strip_prefix("Download")
            .and_then(TransportMetricName::from_name)
        {
            return Ok(MetricName::Download(name));
        }
        Err(UnknownMetricName(s.to_string()))
    }
}

/// Unit of a metric value, matching the remote service's unit vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetricUnit {
    Seconds,
    Microseconds,
    Milliseconds,
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    BytesPerSecond,
    KilobytesPerSecond,
    MegabytesPerSecond,
    GigabytesPerSecond,
    TerabytesPerSecond,
    BitsPerSecond,
    KilobitsPerSecond,
    MegabitsPerSecond,
    GigabitsPerSecond,
    TerabitsPerSecond,
    CountsPerSecond,
    None,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Seconds => "Seconds",
            MetricUnit::Microseconds => "Microseconds",
            MetricUnit::Milliseconds => "Milliseconds",
            MetricUnit::Bytes => "Bytes",
            MetricUnit::Kilobytes => "Kilobytes",
            MetricUnit::Megabytes => "Megabytes",
            MetricUnit::Gigabytes => "Gigabytes",
            MetricUnit::Terabytes => "Terabytes",
            MetricUnit::Bits => "Bits",
            MetricUnit::Kilobits => "Kilobits",
            MetricUnit::Megabits => "Megabits",
            MetricUnit::Gigabits => "Gigabits",
            MetricUnit::Terabits => "Terabits",
            MetricUnit::Percent => "Percent",
            MetricUnit::Count => "Count",
            MetricUnit::BytesPerSecond => "Bytes/Second",
            MetricUnit::KilobytesPerSecond => "Kilobytes/Second",
            MetricUnit::MegabytesPerSecond => "Megabytes/Second",
            MetricUnit::GigabytesPerSecond => "Gigabytes/Second",
            MetricUnit::TerabytesPerSecond => "Terabytes/Second",
            MetricUnit::BitsPerSecond => "Bits/Second",
            MetricUnit::KilobitsPerSecond => "Kilobits/Second",
            MetricUnit::MegabitsPerSecond => "Megabits/Second",
            MetricUnit::GigabitsPerSecond => "Gigabits/Second",
            MetricUnit::TerabitsPerSecond => "Terabits/Second",
            MetricUnit::CountsPerSecond => "Count/Second",
            MetricUnit::None => "None",
        }
    }

    pub fn all() -> &'static [MetricUnit] {
        &[
            MetricUnit::Seconds,
            MetricUnit::Microseconds,
            MetricUnit::Milliseconds,
            MetricUnit::Bytes,
            MetricUnit::Kilobytes,
            MetricUnit::Megabytes,
            MetricUnit::Gigabytes,
            MetricUnit::Terabytes,
            MetricUnit::Bits,
            MetricUnit::Kilobits,
            MetricUnit::Megabits,
            MetricUnit::Gigabits,
            MetricUnit::Terabits,
            MetricUnit::Percent,
            MetricUnit::Count,
            MetricUnit::BytesPerSecond,
            MetricUnit::KilobytesPerSecond,
            MetricUnit::MegabytesPerSecond,
            MetricUnit::GigabytesPerSecond,
            MetricUnit::TerabytesPerSecond,
            MetricUnit::BitsPerSecond,
            MetricUnit::KilobitsPerSecond,
            MetricUnit::MegabitsPerSecond,
            MetricUnit::GigabitsPerSecond,
            MetricUnit::TerabitsPerSecond,
            MetricUnit::CountsPerSecond,
            MetricUnit::None,
        ]
    }

    /// Parse a unit string. Accepts the percent-encoded form older backups
    /// were written with. Unrecognized units map to `None`.
    pub fn parse_lossy(s: &str) -> MetricUnit {
        let decoded = urlencoding::decode(s)
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| s.to_string());
        if decoded == "Counts/Second" {
            return MetricUnit::CountsPerSecond;
        }
        MetricUnit::all()
            .iter()
            .copied()
            .find(|u| u.as_str() == decoded)
            .unwrap_or(MetricUnit::None)
    }
}

impl fmt::Display for MetricUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transfer mode tagged onto every published metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TransferType {
    #[default]
    None,
    SinglePart,
    MultiPart,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::None => "None",
            TransferType::SinglePart => "SinglePart",
            TransferType::MultiPart => "MultiPart",
        }
    }

    /// Unrecognized strings map to `None`.
    pub fn parse_lossy(s: &str) -> TransferType {
        match s {
            "SinglePart" => TransferType::SinglePart,
            "MultiPart" => TransferType::MultiPart,
            _ => TransferType::None,
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub name: MetricName,
    pub unit: MetricUnit,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub value: f64,
}

impl Metric {
    /// Create a metric stamped with the current time.
    pub fn new(name: MetricName, unit: MetricUnit, value: f64) -> Self {
        Self::with_timestamp(name, unit, current_time_ms(), value)
    }

    pub fn with_timestamp(name: MetricName, unit: MetricUnit, timestamp: u64, value: f64) -> Self {
        Self {
            name,
            unit,
            timestamp,
            value,
        }
    }

    pub fn aggregate_key(&self) -> AggregateKey {
        AggregateKey {
            name: self.name,
            timestamp_seconds: self.timestamp / 1000,
        }
    }
}

/// Samples sharing a key are the same logical data point and get summed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AggregateKey {
    pub name: MetricName,
    pub timestamp_seconds: u64,
}

/// Current time in milliseconds since epoch.
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
