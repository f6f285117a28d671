//! Adapters - HTTP surface (inbound) and storage, cache and geolocation
//! implementations of the domain ports (outbound).

pub mod inbound;
pub mod outbound;
