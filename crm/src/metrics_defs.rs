//! Metrics definitions for the CRM client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CRM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "crm.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a CRM call in seconds. Tagged with op.",
};

pub const CRM_REQUEST_FAILED: MetricDef = MetricDef {
    name: "crm.request.failed",
    metric_type: MetricType::Counter,
    description: "Number of CRM calls that failed. Tagged with op.",
};

pub const ALL_METRICS: &[MetricDef] = &[CRM_REQUEST_DURATION, CRM_REQUEST_FAILED];
