//! MAC address generation for guest network interfaces.

use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

/// OUI prefix used for every generated guest MAC.
pub const MAC_PREFIX: [u8; 3] = [0x00, 0x16, 0x3e];

/// A guest NIC MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Generate a new address: the fixed prefix followed by three bytes of a
    /// fresh v4 UUID.
    ///
    /// Uniqueness is only as strong as the UUID generator; no check is made
    /// against addresses already in use.
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Derive an address from the first three bytes of `uuid`.
    pub fn from_uuid(uuid: Uuid) -> Self {
        let b = uuid.as_bytes();
        Self([MAC_PREFIX[0], MAC_PREFIX[1], MAC_PREFIX[2], b[0], b[1], b[2]])
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for MacAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
