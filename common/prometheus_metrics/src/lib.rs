//! A fallible wrapper around the Prometheus registry.
//!
//! Metric registration can fail (duplicate names, bad label sets) and a
//! metrics problem must never take down consensus code, so every metric is
//! stored as a `Result` and every accessor silently no-ops on the error
//! case. Modules define their metrics as `LazyLock` statics:
//!
//! ```
//! use std::sync::LazyLock;
//! use prometheus_metrics::*;
//!
//! static RUN_COUNT: LazyLock<Result<IntCounter>> =
//!     LazyLock::new(|| try_create_int_counter("runs_total", "Total runs"));
//!
//! inc_counter(&RUN_COUNT);
//! ```

pub use prometheus::{
    Error, Histogram, HistogramTimer, IntCounter, IntGauge, IntGaugeVec, Result,
};
use prometheus::{HistogramOpts, Opts};

/// Collect all metrics in the default registry, for exposition.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    prometheus::gather()
}

/// Attempt to create an `IntCounter`, returning `Err` if the registry does
/// not accept it (potentially due to naming conflict).
pub fn try_create_int_counter(name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    prometheus::register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Attempt to create an `IntGauge`, returning `Err` if the registry does not
/// accept it.
pub fn try_create_int_gauge(name: &str, help: &str) -> Result<IntGauge> {
    let gauge = IntGauge::with_opts(Opts::new(name, help))?;
    prometheus::register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Attempt to create a labelled `IntGaugeVec`, returning `Err` if the
/// registry does not accept it.
pub fn try_create_int_gauge_vec(
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntGaugeVec> {
    let gauge_vec = IntGaugeVec::new(Opts::new(name, help), label_names)?;
    prometheus::register(Box::new(gauge_vec.clone()))?;
    Ok(gauge_vec)
}

/// Attempt to create a `Histogram`, returning `Err` if the registry does not
/// accept it.
pub fn try_create_histogram(name: &str, help: &str) -> Result<Histogram> {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help))?;
    prometheus::register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

/// Start a timer that observes its duration into `histogram` when stopped or
/// dropped.
pub fn start_timer(histogram: &Result<Histogram>) -> Option<HistogramTimer> {
    if let Ok(histogram) = histogram {
        Some(histogram.start_timer())
    } else {
        None
    }
}

pub fn stop_timer(timer: Option<HistogramTimer>) {
    if let Some(timer) = timer {
        timer.observe_duration();
    }
}

pub fn inc_counter(counter: &Result<IntCounter>) {
    if let Ok(counter) = counter {
        counter.inc();
    }
}

pub fn set_gauge(gauge: &Result<IntGauge>, value: i64) {
    if let Ok(gauge) = gauge {
        gauge.set(value);
    }
}

/// Set the gauge labelled `label` in `gauge_vec`, ignoring unknown labels.
pub fn set_gauge_vec(gauge_vec: &Result<IntGaugeVec>, label: &str, value: i64) {
    if let Ok(gauge_vec) = gauge_vec {
        if let Ok(gauge) = gauge_vec.get_metric_with_label_values(&[label]) {
            gauge.set(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::LazyLock;

    static TEST_COUNTER: LazyLock<Result<IntCounter>> =
        LazyLock::new(|| try_create_int_counter("prometheus_metrics_test_counter", "Test"));
    static TEST_GAUGE_VEC: LazyLock<Result<IntGaugeVec>> = LazyLock::new(|| {
        try_create_int_gauge_vec("prometheus_metrics_test_gauge_vec", "Test", &["state"])
    });

    #[test]
    fn counters_increment() {
        inc_counter(&TEST_COUNTER);
        inc_counter(&TEST_COUNTER);
        assert_eq!(TEST_COUNTER.as_ref().unwrap().get(), 2);
    }

    #[test]
    fn duplicate_registration_is_contained() {
        // Second registration under the same name fails without panicking.
        let first = try_create_int_counter("prometheus_metrics_test_dup", "Test");
        let second = try_create_int_counter("prometheus_metrics_test_dup", "Test");
        assert!(first.is_ok());
        assert!(second.is_err());
        inc_counter(&second);
    }

    #[test]
    fn labelled_gauges_set() {
        set_gauge_vec(&TEST_GAUGE_VEC, "Active", 7);
        let gauge = TEST_GAUGE_VEC
            .as_ref()
            .unwrap()
            .get_metric_with_label_values(&["Active"])
            .unwrap();
        assert_eq!(gauge.get(), 7);
    }
}
