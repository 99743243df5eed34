use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("lc.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("lc.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("lc.client.request_duration_seconds");

pub(crate) static STREAM_FRAMES: Counter = Counter::new("lc.stream.frames");
pub(crate) static STREAM_MALFORMED_FRAMES: Counter = Counter::new("lc.stream.malformed_frames");
pub(crate) static STREAM_BYTES: Counter = Counter::new("lc.stream.bytes");
pub(crate) static STREAM_TTFB: Moments = Moments::new("lc.stream.ttfb_seconds");

pub(crate) static HISTORY_LOADS: Counter = Counter::new("lc.history.loads");
pub(crate) static HISTORY_CORRUPT: Counter = Counter::new("lc.history.corrupt");
pub(crate) static HISTORY_SAVES: Counter = Counter::new("lc.history.saves");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_FRAMES);
    collector.register_counter(&STREAM_MALFORMED_FRAMES);
    collector.register_counter(&STREAM_BYTES);
    collector.register_moments(&STREAM_TTFB);

    collector.register_counter(&HISTORY_LOADS);
    collector.register_counter(&HISTORY_CORRUPT);
    collector.register_counter(&HISTORY_SAVES);
}
