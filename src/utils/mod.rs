mod logging;

pub use logging::{init_logging, init_worker_logging, LOG_DIR};

use std::any::Any;
use std::time::Duration;

/// Human-readable elapsed time rounded to milliseconds, e.g. `1s 250ms`
pub fn format_elapsed(elapsed: Duration) -> String {
    let rounded = Duration::from_millis(elapsed.as_millis() as u64);
    humantime::format_duration(rounded).to_string()
}

/// Text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
