//! Metrics definitions for the lifecycle synchronizer.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PROSPECT_REGISTERED: MetricDef = MetricDef {
    name: "lifecycle.prospect.registered",
    metric_type: MetricType::Counter,
    description: "Number of contacts registered as prospects",
};

pub const PURCHASE_RECORDED: MetricDef = MetricDef {
    name: "lifecycle.purchase.recorded",
    metric_type: MetricType::Counter,
    description: "Number of contacts marked as purchased",
};

pub const RECHECK_ARMED: MetricDef = MetricDef {
    name: "lifecycle.recheck.armed",
    metric_type: MetricType::Counter,
    description: "Number of deferred rechecks scheduled",
};

pub const RECHECK_FIRED: MetricDef = MetricDef {
    name: "lifecycle.recheck.fired",
    metric_type: MetricType::Counter,
    description: "Number of deferred rechecks that ran",
};

pub const RECHECK_CANCELLED: MetricDef = MetricDef {
    name: "lifecycle.recheck.cancelled",
    metric_type: MetricType::Counter,
    description: "Number of deferred rechecks cancelled by a purchase or by shutdown",
};

pub const RECHECK_MARKED_NOT_PURCHASED: MetricDef = MetricDef {
    name: "lifecycle.recheck.marked_not_purchased",
    metric_type: MetricType::Counter,
    description: "Number of rechecks that marked the contact as not purchased",
};

pub const RECHECK_FAILED: MetricDef = MetricDef {
    name: "lifecycle.recheck.failed",
    metric_type: MetricType::Counter,
    description: "Number of rechecks that failed on a CRM call",
};

pub const RECHECK_PENDING: MetricDef = MetricDef {
    name: "lifecycle.recheck.pending",
    metric_type: MetricType::Gauge,
    description: "Number of deferred rechecks waiting to fire",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PROSPECT_REGISTERED,
    PURCHASE_RECORDED,
    RECHECK_ARMED,
    RECHECK_FIRED,
    RECHECK_CANCELLED,
    RECHECK_MARKED_NOT_PURCHASED,
    RECHECK_FAILED,
    RECHECK_PENDING,
];
