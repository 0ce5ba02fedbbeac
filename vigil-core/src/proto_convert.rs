//! Type conversions between domain types and protobuf types.

use crate::types::Metric;

// Re-export proto types for convenience
pub use vigil_api::vigil::v1;

type ProtoMetric = v1::Metric;

impl From<Metric> for ProtoMetric {
    fn from(metric: Metric) -> Self {
        Self { id: metric.id, r#type: metric.mtype, delta: metric.delta, value: metric.value }
    }
}

impl From<&Metric> for ProtoMetric {
    fn from(metric: &Metric) -> Self {
        metric.clone().into()
    }
}

impl From<ProtoMetric> for Metric {
    fn from(proto: ProtoMetric) -> Self {
        Self { id: proto.id, mtype: proto.r#type, delta: proto.delta, value: proto.value }
    }
}
