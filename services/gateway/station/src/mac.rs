//! Station MAC addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a MAC address
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid MAC address {0:?}")]
pub struct MacParseError(pub String);

/// A 48-bit MAC address.
///
/// Displays as 12 lowercase hex digits without separators. Parsing also
/// accepts `:` or `-` separated octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw octets
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Canonical 12-digit lowercase hex form
    pub fn hex(&self) -> String {
        self.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(octets: [u8; 6]) -> Self {
        Self(octets)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for octet in self.0 {
            write!(f, "{:02x}", octet)?;
        }
        Ok(())
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(MacParseError(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| MacParseError(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_form() {
        let mac = MacAddress::new([0xF0, 0x18, 0x98, 0x82, 0x72, 0x44]);
        assert_eq!(mac.hex(), "f01898827244");
        assert_eq!(MacAddress::new([0; 6]).hex(), "000000000000");
    }

    #[test]
    fn test_parse_forms() {
        let expected = MacAddress::new([0xF0, 0x18, 0x98, 0x82, 0x72, 0x44]);
        assert_eq!("f01898827244".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("F0:18:98:82:72:44".parse::<MacAddress>().unwrap(), expected);
        assert_eq!("f0-18-98-82-72-44".parse::<MacAddress>().unwrap(), expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("f0189882724".parse::<MacAddress>().is_err());
        assert!("f0:18:98:82:72:4g".parse::<MacAddress>().is_err());
        assert!("f0:18:98:82:72:44:00".parse::<MacAddress>().is_err());
        assert!("ff0:18:98:82:72:4é".parse::<MacAddress>().is_err());
    }
}
