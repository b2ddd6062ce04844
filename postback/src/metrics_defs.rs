//! Metrics definitions for the postback service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const POSTBACK_ACCEPTED: MetricDef = MetricDef {
    name: "postback.accepted",
    metric_type: MetricType::Counter,
    description: "Number of postbacks stored",
};

pub const POSTBACK_REJECTED: MetricDef = MetricDef {
    name: "postback.rejected",
    metric_type: MetricType::Counter,
    description: "Number of postbacks rejected. Tagged with reason.",
};

pub const MAPPING_LOAD_ROWS: MetricDef = MetricDef {
    name: "mapping.load.rows",
    metric_type: MetricType::Histogram,
    description: "Number of mapping rows written by a bulk load",
};

pub const MAPPING_LOAD_DURATION: MetricDef = MetricDef {
    name: "mapping.load.duration",
    metric_type: MetricType::Histogram,
    description: "Time to stream a mapping bulk load in seconds. Tagged with status.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    POSTBACK_ACCEPTED,
    POSTBACK_REJECTED,
    MAPPING_LOAD_ROWS,
    MAPPING_LOAD_DURATION,
];
