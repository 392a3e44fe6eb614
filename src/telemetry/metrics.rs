//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally registered `MeterProvider`.
//! Without an OTLP endpoint the global provider is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("massmint-preview")
}

/// Counter: items released by the throttle.
pub fn renders_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("massmint.render.dispatched")
        .with_description("Number of preview renders dispatched")
        .build()
}

/// Counter: successful render completions.
pub fn renders_completed() -> Counter<u64> {
    meter()
        .u64_counter("massmint.render.completed")
        .with_description("Number of preview renders completed")
        .build()
}

/// Counter: regenerations triggered by the failure marker.
pub fn renders_regenerated() -> Counter<u64> {
    meter()
        .u64_counter("massmint.render.regenerated")
        .with_description("Number of previews regenerated after a failed render")
        .build()
}

/// Counter: items that hit the regeneration limit.
pub fn renders_exhausted() -> Counter<u64> {
    meter()
        .u64_counter("massmint.render.exhausted")
        .with_description("Number of previews that exhausted their regenerations")
        .build()
}

/// Counter: completions with no registry effect.
/// Labels: `reason` ("not_started" | "ended" | "unmatched" | "exhausted").
pub fn completions_ignored() -> Counter<u64> {
    meter()
        .u64_counter("massmint.completion.ignored")
        .with_description("Number of render completions ignored")
        .build()
}

/// Histogram: capture plus metadata assembly duration.
/// Labels: `result` ("ok" | "error").
pub fn finalize_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("massmint.finalize.duration_ms")
        .with_description("Pin and metadata duration in milliseconds")
        .with_unit("ms")
        .build()
}
