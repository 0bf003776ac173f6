//! # Broadcast Address Math
//!
//! Pure helpers turning an interface address and its prefix length into the
//! subnet's broadcast address. Only IPv4 has broadcast; IPv6 inputs are
//! rejected with [`AddressError::UnsupportedFamily`] instead of producing a
//! meaningless value.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

/// Widest IPv4 prefix.
pub const MAX_IPV4_PREFIX: u8 = 32;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum AddressError {
    /// The prefix length does not describe an IPv4 mask.
    #[error("invalid prefix length /{0} (expected 0..=32)")]
    InvalidMask(u8),
    /// Broadcast only exists for IPv4.
    #[error("{0} is not an IPv4 address")]
    UnsupportedFamily(IpAddr),
}

/// Returns the network mask for `prefix_length` as a 32-bit integer.
///
/// `/0` yields an all-zero mask, `/32` an all-ones mask.
pub fn network_mask(prefix_length: u8) -> Result<u32, AddressError> {
    if prefix_length > MAX_IPV4_PREFIX {
        return Err(AddressError::InvalidMask(prefix_length));
    }
    // checked_shl handles /0, where a shift by 32 would overflow
    Ok(u32::MAX
        .checked_shl(u32::from(MAX_IPV4_PREFIX - prefix_length))
        .unwrap_or(0))
}

/// Computes `address | !mask`.
///
/// Loopback and link-local addresses are accepted; deciding whether such an
/// interface is worth probing is the enumerator's job.
pub fn compute_broadcast_address(
    address: IpAddr,
    prefix_length: u8,
) -> Result<Ipv4Addr, AddressError> {
    let v4: Ipv4Addr = match address {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(_) => return Err(AddressError::UnsupportedFamily(address)),
    };
    let mask: u32 = network_mask(prefix_length)?;
    Ok(Ipv4Addr::from(u32::from(v4) | !mask))
}
