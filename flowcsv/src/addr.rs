//! Address codec: raw record addresses to text.
//!
//! Rendering works on a copy of the stored value. The copy is converted to
//! network byte order right before it is handed to `std::net`, so the
//! record itself is never touched.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use flowcsv_schema::RawAddr;
use thiserror::Error;

/// Longest textual address, terminator slot included (`INET6_ADDRSTRLEN`).
pub const IP_STRING_LEN: usize = 46;

/// Address family of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    V4,
    V6,
}

impl Family {
    /// Family selected by an IPv6 flag bit.
    pub fn from_v6_flag(is_v6: bool) -> Self {
        if is_v6 {
            Family::V6
        } else {
            Family::V4
        }
    }

    /// Longest valid prefix length.
    pub fn max_mask(self) -> u8 {
        match self {
            Family::V4 => 32,
            Family::V6 => 128,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => f.write_str("IPv4"),
            Family::V6 => f.write_str("IPv6"),
        }
    }
}

/// Errors from address rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddrError {
    #[error("IPv4 field holds bits above 32: {0:#x}")]
    InvalidFamily(u128),

    #[error("mask length {mask} out of range for {family} (max {max})", max = .family.max_mask())]
    MaskOutOfRange { family: Family, mask: u8 },

    #[error("address family bits disagree with the announced {announced}")]
    ContradictoryFamily { announced: Family },
}

/// Interpret a raw address as `family`.
pub fn to_ip(raw: RawAddr, family: Family) -> Result<IpAddr, AddrError> {
    match family {
        Family::V4 => {
            if !raw.fits_v4() {
                return Err(AddrError::InvalidFamily(raw.as_u128()));
            }
            Ok(IpAddr::V4(Ipv4Addr::from(raw.v4_bits().to_be_bytes())))
        }
        Family::V6 => {
            let mut octets = [0u8; 16];
            octets[..8].copy_from_slice(&raw.0[0].to_be_bytes());
            octets[8..].copy_from_slice(&raw.0[1].to_be_bytes());
            Ok(IpAddr::V6(Ipv6Addr::from(octets)))
        }
    }
}

/// Canonical text of `raw`: dotted quad or colon hex.
pub fn format_addr(raw: RawAddr, family: Family) -> Result<String, AddrError> {
    to_ip(raw, family).map(|ip| bounded(ip.to_string()))
}

/// Reject a prefix length the family cannot have.
pub fn check_mask(family: Family, mask: u8) -> Result<(), AddrError> {
    if mask > family.max_mask() {
        return Err(AddrError::MaskOutOfRange { family, mask });
    }
    Ok(())
}

/// Clear every bit past the first `mask` bits.
pub fn mask_addr(raw: RawAddr, family: Family, mask: u8) -> Result<RawAddr, AddrError> {
    check_mask(family, mask)?;
    match family {
        Family::V4 => {
            if !raw.fits_v4() {
                return Err(AddrError::InvalidFamily(raw.as_u128()));
            }
            let keep = u32::MAX.checked_shl(32 - mask as u32).unwrap_or(0);
            Ok(RawAddr::from_v4_bits(raw.v4_bits() & keep))
        }
        Family::V6 => {
            let keep = u128::MAX.checked_shl(128 - mask as u32).unwrap_or(0);
            Ok(RawAddr::from_u128(raw.as_u128() & keep))
        }
    }
}

/// Text of the network `raw` belongs to under prefix length `mask`.
pub fn format_masked(raw: RawAddr, family: Family, mask: u8) -> Result<String, AddrError> {
    mask_addr(raw, family, mask).and_then(|net| format_addr(net, family))
}

fn bounded(mut text: String) -> String {
    // Address text is ASCII, so any byte index is a char boundary.
    text.truncate(IP_STRING_LEN - 1);
    text
}
