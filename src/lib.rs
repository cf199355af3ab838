#![deny(unsafe_code)]
#![warn(missing_docs)]

//! A virtual baseboard management controller for virtual machines.
//!
//! Every node gets two front ends bound to its BMC address, both driving the
//! node's [`Machine`]:
//! - IPMI v2.0 over RMCP+ (UDP 623): Open Session, RAKP 1-4 key exchange,
//!   HMAC-SHA1-96 integrity, AES-CBC-128 confidentiality, and the Chassis/App
//!   commands needed for power control
//! - Redfish (TCP 443): the Systems and Chassis resources and their reset actions
//!
//! [`BmcServer`] consumes [`BmcInfo`] registrations and starts the listeners of
//! each node as its address becomes known. Protocol internals stay private.

mod commands;
mod config;
mod crypto;
mod debug;
mod error;
mod machine;
mod message;
mod network;
mod observe;
mod protocol;
pub mod redfish;
mod rmcp;
mod server;
mod session;
mod types;
mod users;

pub use crate::config::{
    BmcConfig, DEFAULT_IPMI_PORT, DEFAULT_PASSWORD, DEFAULT_REDFISH_PORT, DEFAULT_USERNAME,
};
pub use crate::error::{Error, Result};
pub use crate::machine::{Machine, SimulatedMachine};
pub use crate::network::{AddressBinder, BmcNetwork, IpCommandBinder, Ipv4Cidr, NoopBinder};
pub use crate::server::{BmcServer, BmcServerBuilder, NodeEndpoints, ShutdownHandle};
pub use crate::types::{BmcInfo, ChassisControl, CompletionCode, PowerState, PrivilegeLevel};
