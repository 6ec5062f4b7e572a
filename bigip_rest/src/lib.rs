#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate serde_derive;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Utils(bigip_utils::Error, bigip_utils::ErrorKind);
    }
    foreign_links {
        Reqe(reqwest::Error);
        SerdeJ(serde_json::Error);
        Base64(base64::DecodeError);
        Io(::std::io::Error);
    }
    errors {
        UnexpectedHttpStatus(code: u16, body: String) {
            description("unexpected HTTP status")
            display("{}, {}", code, body)
        }
        TransactionNotCompleted(body: String) {
            description("transaction did not reach COMPLETED")
            display("{}", body)
        }
        UnsupportedRootKind(root: String) {
            description("unsupported root kind")
            display("not support root kind: {}", root)
        }
        UnsupportedSharedKind(kind: String) {
            description("unsupported shared kind")
            display("not supported kind {}", kind)
        }
        MalformedTypedName(name: String) {
            description("typed name is not <kind>/<name>")
            display("malformed typed resource name: {}", name)
        }
        MissingField(field: String, context: String) {
            description("expected field missing from response")
            display("failed to get {} from {}", field, context)
        }
        UnknownRecord(name: String) {
            description("unknown data-group record")
            display("invalid unknown key: {}", name)
        }
        DeviceUnavailable(url: String, reason: String) {
            description("device is unavailable")
            display("BIGIP {} is unavailable: {}", url, reason)
        }
    }
}

/// Device handle and raw iControl verbs
pub mod client;
/// Resource kind deployment order and the sorting passes built on it
pub mod taxonomy;
/// The unit of work streamed through the executor
pub mod request;
/// Live-state snapshots of a partition
pub mod state;
/// old/new/live reconciliation into ordered rest requests
pub mod diff;
/// Server-side transaction protocol
pub mod transaction;
/// Partition lifecycle and tmsh-backed maintenance calls
pub mod partition;
/// Controller state persisted in an internal data-group
pub mod datagroup;
/// Network table dumps and bootstrap helpers
pub mod net;

pub use crate::client::Bigip;
pub use crate::datagroup::PersistedConfig;
pub use crate::diff::{gen_cmds, ConfigTree};
pub use crate::request::{Body, Method, Operation, RestRequest, Schedule};
pub use crate::state::Snapshot;
