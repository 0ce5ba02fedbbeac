//! Metric domain types and the JSON wire contract.

use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};

/// Metric kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value, last write wins.
    Gauge,
    /// Additive value, each update adds its delta.
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(VigilError::UnknownMetricType { mtype: s.to_string() }),
        }
    }
}

/// Wire representation of a metric.
///
/// `{ "id": "...", "type": "gauge"|"counter", "value"?: f64, "delta"?: i64 }`
///
/// The type is kept as a string so an unknown type surfaces as a validation
/// error rather than a decode error; use [`MetricUpdate::try_from`] to validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,

    #[serde(rename = "type")]
    pub mtype: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self { id: id.into(), mtype: MetricKind::Gauge.to_string(), delta: None, value: Some(value) }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            mtype: MetricKind::Counter.to_string(),
            delta: Some(delta),
            value: None,
        }
    }

    /// Parse the path-encoded form `/{type}/{name}/{value}`.
    pub fn from_parts(mtype: &str, id: &str, raw_value: &str) -> Result<Self> {
        let kind: MetricKind = mtype.parse()?;
        if id.is_empty() {
            return Err(VigilError::EmptyMetricId);
        }
        match kind {
            MetricKind::Gauge => raw_value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| Metric::gauge(id, v))
                .ok_or_else(|| VigilError::InvalidValue { kind: "gauge", value: raw_value.into() }),
            MetricKind::Counter => raw_value
                .parse::<i64>()
                .map(|d| Metric::counter(id, d))
                .map_err(|_| VigilError::InvalidValue {
                    kind: "counter",
                    value: raw_value.into(),
                }),
        }
    }

    pub fn kind(&self) -> Result<MetricKind> {
        self.mtype.parse()
    }
}

/// A validated metric update: exactly one payload, selected by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricUpdate {
    Gauge { id: String, value: f64 },
    Counter { id: String, delta: i64 },
}

impl MetricUpdate {
    pub fn id(&self) -> &str {
        match self {
            MetricUpdate::Gauge { id, .. } | MetricUpdate::Counter { id, .. } => id,
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricUpdate::Gauge { .. } => MetricKind::Gauge,
            MetricUpdate::Counter { .. } => MetricKind::Counter,
        }
    }

    /// Validate a whole batch, failing on the first malformed entry.
    pub fn validate_batch(metrics: &[Metric]) -> Result<Vec<MetricUpdate>> {
        metrics.iter().map(MetricUpdate::try_from).collect()
    }
}

impl TryFrom<&Metric> for MetricUpdate {
    type Error = VigilError;

    fn try_from(metric: &Metric) -> Result<Self> {
        let kind = metric.kind()?;
        if metric.id.is_empty() {
            return Err(VigilError::EmptyMetricId);
        }
        match kind {
            MetricKind::Gauge => {
                let value = metric.value.ok_or_else(|| VigilError::MissingValue {
                    id: metric.id.clone(),
                    kind: "gauge",
                    field: "value",
                })?;
                Ok(MetricUpdate::Gauge { id: metric.id.clone(), value: finite_gauge(value)? })
            }
            MetricKind::Counter => {
                let delta = metric.delta.ok_or_else(|| VigilError::MissingValue {
                    id: metric.id.clone(),
                    kind: "counter",
                    field: "delta",
                })?;
                Ok(MetricUpdate::Counter { id: metric.id.clone(), delta })
            }
        }
    }
}

/// Gauges must be finite: JSON has no encoding for NaN or infinity, so such
/// a value could be stored but never restored from a snapshot.
pub fn finite_gauge(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(VigilError::InvalidValue { kind: "gauge", value: value.to_string() })
    }
}

impl From<MetricUpdate> for Metric {
    fn from(update: MetricUpdate) -> Self {
        match update {
            MetricUpdate::Gauge { id, value } => Metric::gauge(id, value),
            MetricUpdate::Counter { id, delta } => Metric::counter(id, delta),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_wire_shape() {
        let json = serde_json::to_value(Metric::gauge("CPU", 0.42)).unwrap();
        assert_eq!(json, serde_json::json!({"id": "CPU", "type": "gauge", "value": 0.42}));
    }

    #[test]
    fn test_counter_wire_shape() {
        let json = serde_json::to_value(Metric::counter("Requests", 5)).unwrap();
        assert_eq!(json, serde_json::json!({"id": "Requests", "type": "counter", "delta": 5}));
    }

    #[test]
    fn test_validate_rejects_unknown_type() {
        let metric = Metric { id: "x".into(), mtype: "histogram".into(), delta: None, value: None };
        let err = MetricUpdate::try_from(&metric).unwrap_err();
        assert!(matches!(err, VigilError::UnknownMetricType { .. }));
    }

    #[test]
    fn test_validate_rejects_missing_payload() {
        let metric = Metric { id: "x".into(), mtype: "counter".into(), delta: None, value: Some(1.0) };
        let err = MetricUpdate::try_from(&metric).unwrap_err();
        assert!(matches!(err, VigilError::MissingValue { field: "delta", .. }));
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let err = MetricUpdate::try_from(&Metric::gauge("", 1.0)).unwrap_err();
        assert!(matches!(err, VigilError::EmptyMetricId));
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(Metric::from_parts("gauge", "Alloc", "12.5").unwrap(), Metric::gauge("Alloc", 12.5));
        assert_eq!(Metric::from_parts("counter", "Poll", "3").unwrap(), Metric::counter("Poll", 3));
        assert!(matches!(
            Metric::from_parts("counter", "Poll", "3.5"),
            Err(VigilError::InvalidValue { .. })
        ));
        assert!(matches!(
            Metric::from_parts("gauge", "Alloc", "abc"),
            Err(VigilError::InvalidValue { .. })
        ));
        assert!(matches!(Metric::from_parts("gauge", "", "1"), Err(VigilError::EmptyMetricId)));
        assert!(matches!(
            Metric::from_parts("summary", "x", "1"),
            Err(VigilError::UnknownMetricType { .. })
        ));
    }

    #[test]
    fn test_non_finite_gauges_rejected() {
        for raw in ["NaN", "nan", "inf", "-inf", "infinity", "1e400"] {
            assert!(
                matches!(Metric::from_parts("gauge", "Bad", raw), Err(VigilError::InvalidValue { .. })),
                "{raw} accepted"
            );
        }
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = MetricUpdate::try_from(&Metric::gauge("Bad", value)).unwrap_err();
            assert!(matches!(err, VigilError::InvalidValue { kind: "gauge", .. }));
        }
        assert_eq!(finite_gauge(-0.5).unwrap(), -0.5);
    }

    #[test]
    fn test_validate_batch_stops_at_first_error() {
        let batch = vec![
            Metric::gauge("a", 1.0),
            Metric { id: "b".into(), mtype: "gauge".into(), delta: Some(1), value: None },
            Metric::counter("c", 1),
        ];
        assert!(MetricUpdate::validate_batch(&batch).is_err());
        assert_eq!(MetricUpdate::validate_batch(&batch[..1]).unwrap().len(), 1);
    }
}
