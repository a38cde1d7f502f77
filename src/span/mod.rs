pub mod structs;
pub mod utils;

pub use structs::{Measurement, Span, TransactionEvent, FCP_MEASUREMENT};
pub use utils::{
    duration_ms, find_span_prefix, fingerprint_span, fingerprint_span_op, millis_to_duration,
    seconds_to_duration, span_duration,
};
