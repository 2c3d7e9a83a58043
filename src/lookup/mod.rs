//! Cloud-function side of the crate: resolves a player's computers from the
//! key-value table and wraps the answer in an API Gateway proxy envelope.
//!
//! [`ComputerLookup`] owns an injected [`ComputerStore`], so tests can swap
//! the DynamoDB client for a recording fake. [`response`] keeps the envelope
//! formatting pure.

mod config;
mod handler;
pub mod response;
mod store;

pub use config::{LookupConfig, PLACEHOLDER_COMPUTERS};
pub use handler::{
    parse_leading_int, ComputerCount, ComputerLookup, Computers, ComputersBody, LookupError,
    ProxyRequest, LOOKUP_FAILED_MESSAGE,
};
pub use response::{json_response, json_response_with_mime, ProxyResponse};
pub use store::{ComputerStore, DynamoComputerStore, Item, StoreError, PARTITION_KEY};
