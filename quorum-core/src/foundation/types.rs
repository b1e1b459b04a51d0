use crate::foundation::util::encoding::parse_hex_32bytes;
use crate::foundation::ThresholdError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

pub type Hash32 = [u8; 32];

/// Opaque textual identifier: node names, app ids, deployment seeds.
macro_rules! text_id {
    ($($name:ident),+) => {$(
        #[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    )+};
}

/// 32-byte digest identifier; hex on the wire and in logs (`{:#x}` adds the `0x` prefix).
macro_rules! digest_id {
    ($($name:ident),+) => {$(
        #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
        pub struct $name(Hash32);

        impl $name {
            pub const fn new(value: Hash32) -> Self {
                Self(value)
            }

            pub fn as_hash(&self) -> &Hash32 {
                &self.0
            }

            pub fn ct_eq(&self, other: &Self) -> bool {
                use subtle::ConstantTimeEq;
                self.0[..].ct_eq(&other.0[..]).into()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::LowerHex for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let prefix = if f.alternate() { "0x" } else { "" };
                write!(f, "{}{}", prefix, hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = ThresholdError;

            fn from_str(s: &str) -> Result<Self, ThresholdError> {
                parse_hex_32bytes(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                String::deserialize(deserializer)?.parse().map_err(serde::de::Error::custom)
            }
        }
    )+};
}

text_id!(NodeId, AppId, Seed);
digest_id!(RequestId, DealingId);

impl AppId {
    /// Id of an app that does not pin one: hex of `keccak256(app_name)`.
    pub fn for_app_name(name: &str) -> Self {
        use sha3::{Digest, Keccak256};
        Self(hex::encode(Keccak256::digest(name.as_bytes())))
    }
}
