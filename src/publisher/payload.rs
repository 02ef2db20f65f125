//! Form-encoded PutMetricData request bodies.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Method;
use std::fmt::Write;
use urlencoding::encode;

use crate::dimensions::Dimensions;
use crate::metric::Metric;
use crate::transport::PublishRequest;

const API_VERSION_HEADER: &str = "2011-06-15";
const ACTION_VERSION: &str = "2010-08-01";

/// Render a millisecond timestamp as ISO-8601 UTC at second precision.
pub fn iso8601(timestamp_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn dimension_pairs(dimensions: &Dimensions) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("Platform", dimensions.platform_name.clone()),
        ("ToolName", dimensions.tool_name.clone()),
        ("InstanceType", dimensions.instance_type.clone()),
        ("TransferType", dimensions.transfer_type.as_str().to_string()),
        ("Encrypted", u8::from(dimensions.encrypted).to_string()),
    ];
    if let Some(replay_id) = dimensions.replay_id {
        pairs.push(("ReplayId", replay_id.to_string()));
    }
    pairs
}

/// Encode one batch as a PutMetricData form body. Members are numbered from 1
/// in slice order.
pub fn encode_put_metric_data(namespace: &str, dimensions: &Dimensions, metrics: &[Metric]) -> String {
    let mut body = String::from("Action=PutMetricData&");
    if !namespace.is_empty() {
        let _ = write!(body, "Namespace={}&", encode(namespace));
    }

    let dims = dimension_pairs(dimensions);

    for (i, metric) in metrics.iter().enumerate() {
        let member = format!("MetricData.member.{}", i + 1);
        let _ = write!(body, "{}.MetricName={}&", member, metric.name.as_str());
        let _ = write!(
            body,
            "{}.Timestamp={}&",
            member,
            encode(&iso8601(metric.timestamp))
        );
        let _ = write!(body, "{}.Value={}&", member, metric.value);
        let _ = write!(body, "{}.Unit={}&", member, encode(metric.unit.as_str()));
        let _ = write!(body, "{}.StorageResolution=1&", member);

        for (d, (name, value)) in dims.iter().enumerate() {
            let _ = write!(body, "{}.Dimensions.member.{}.Name={}&", member, d + 1, name);
            let _ = write!(
                body,
                "{}.Dimensions.member.{}.Value={}&",
                member,
                d + 1,
                encode(value)
            );
        }
    }

    let _ = write!(body, "Version={}", ACTION_VERSION);
    body
}

/// Wrap an encoded body in an unsigned POST to the service root.
pub fn build_request(host: &str, body: String) -> PublishRequest {
    let body = Bytes::from(body);
    PublishRequest {
        method: Method::POST,
        path: "/".to_string(),
        headers: vec![
            ("host".to_string(), host.to_string()),
            (
                "content-type".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ),
            ("x-amz-api-version".to_string(), API_VERSION_HEADER.to_string()),
            ("content-length".to_string(), body.len().to_string()),
        ],
        body,
    }
}

/// Host portion of an endpoint URL, used for the `host` header.
pub fn endpoint_host(endpoint: &str) -> &str {
    let without_scheme = endpoint
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(endpoint);
    without_scheme.split('/').next().unwrap_or(without_scheme)
}
