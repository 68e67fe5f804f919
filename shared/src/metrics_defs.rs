//! Metric definition types shared by workspace members.
//!
//! Each crate declares its metrics as `MetricDef` constants in its own
//! `metrics_defs.rs` and records them through the macros below, so metric
//! names never appear as string literals at call sites.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

impl MetricDef {
    pub const fn counter(name: &'static str, description: &'static str) -> Self {
        MetricDef {
            name,
            metric_type: MetricType::Counter,
            description,
        }
    }

    pub const fn histogram(name: &'static str, description: &'static str) -> Self {
        MetricDef {
            name,
            metric_type: MetricType::Histogram,
            description,
        }
    }
}

/// Records against the `metrics` facade; the calling crate must depend on `metrics`.
#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
    ($def:expr, $($label:expr => $value:expr),+ $(,)?) => {
        metrics::counter!($def.name, $($label => $value),+)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}
