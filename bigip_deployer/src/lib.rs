#![recursion_limit = "1024"]

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }
    links {
        Rest(bigip_rest::Error, bigip_rest::ErrorKind);
        Utils(bigip_utils::Error, bigip_utils::ErrorKind);
    }
    errors {
        DeviceFailures(msg: String) {
            description("deployment failed on one or more devices")
            display("{}", msg)
        }
    }
}

/// Request/response types and the carrier-context directives
pub mod types;
/// The single-consumer worker loop
pub mod deployer;

pub use crate::deployer::Deployer;
pub use crate::types::{DeployContext, DeployRequest, DeployResponse};
