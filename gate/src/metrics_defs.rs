//! Metrics definitions for the gate.

use shared::metrics_defs::MetricDef;

pub const CACHE_HIT: MetricDef =
    MetricDef::counter("gate.cache.hit", "Launches served from the cached destination");

pub const CACHE_MISS: MetricDef =
    MetricDef::counter("gate.cache.miss", "Launches that had to run a resolution");

pub const RESOLVE_SUCCESS: MetricDef = MetricDef::counter(
    "gate.resolve.success",
    "Resolution attempts that produced a destination, tagged by strategy",
);

pub const RESOLVE_FAILURE: MetricDef = MetricDef::counter(
    "gate.resolve.failure",
    "Resolution attempts that ended in a terminal error",
);

pub const STRATEGY_ESCALATED: MetricDef = MetricDef::counter(
    "gate.strategy.escalated",
    "Transport failures that moved resolution on to the next strategy",
);

pub const RESOLVE_DURATION: MetricDef = MetricDef::histogram(
    "gate.resolve.duration",
    "Time to complete a resolution attempt in seconds",
);

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    RESOLVE_SUCCESS,
    RESOLVE_FAILURE,
    STRATEGY_ESCALATED,
    RESOLVE_DURATION,
];
