//! GeoIP Resolver Port
//!
//! Defines the interface for resolving IP addresses to country codes.

use crate::domain::value_objects::CountryCode;
use std::net::IpAddr;

/// Resolver for IP address to country.
///
/// This is an outbound port that abstracts the GeoIP database.
/// Geolocation is advisory everywhere it is consulted, so implementations
/// never fail: anything unresolvable is `None`.
pub trait GeoResolver: Send + Sync {
    /// Resolve an IP address to the country it is located in.
    fn country(&self, ip: IpAddr) -> Option<CountryCode>;
}
