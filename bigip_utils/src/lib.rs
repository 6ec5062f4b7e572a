#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate lazy_static;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    foreign_links {
        Io(::std::io::Error);
        SerdeJ(serde_json::Error);
        Fmt(::std::fmt::Error);
    }
    errors {
        Retriable(msg: String) {
            description("transient backend failure")
            display("{}{}", crate::RETRY_MARK, msg)
        }
        BlockSize {
            description("block size must be positive")
            display("block size must be positive")
        }
    }
}

/// Sentinel embedded in error messages to mark an error as retriable.
///
/// The marker travels inside the message so it survives error merging and
/// re-wrapping across crate boundaries; `need_retry` scans for it.
pub const RETRY_MARK: &str = "__ERROR_TO_RETRY__";

/// Construct a retry-marked `Error` from a format string.
#[macro_export]
macro_rules! retry_error {
    ($($arg:tt)*) => {
        $crate::Error::from_kind($crate::ErrorKind::Retriable(format!($($arg)*)))
    };
}

/// True if `err` or any of its sources carries the retry marker.
pub fn need_retry(err: &dyn std::error::Error) -> bool {
    if err.to_string().contains(RETRY_MARK) {
        return true;
    }
    let mut cur = err.source();
    while let Some(e) = cur {
        if e.to_string().contains(RETRY_MARK) {
            return true;
        }
        cur = e.source();
    }
    false
}

/// Thread-safe deploy FIFO with head-insert and coalescing filter
pub mod queue;

/// Structural json comparison and small collection helpers
pub mod funcs;

/// Prometheus gauge families for function and iControl call timing
pub mod metrics;

pub use crate::funcs::{deep_copy, deep_equal, diff_strings, fields_is_expected, keyname, split_blocks, unified};
pub use crate::queue::DeployQueue;
