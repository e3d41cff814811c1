use std::fmt;

use serde::{Deserialize, Serialize};
use udl_crypto::{codec, ContentHasher};

use crate::error::{TypeError, TypeResult};

/// 20-byte account address derived from a public key.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    /// Derive the address owned by `public_key`.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = ContentHasher::ADDRESS.hash(public_key);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[..20]);
        Self(addr)
    }

    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 20,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// Pay-to-address lock script for this address.
    pub fn lock_script(&self) -> Vec<u8> {
        script::lock_to(self)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short_hex())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Lock and unlock scripts.
///
/// Only pay-to-address locks are understood: a tag byte followed by the
/// 20-byte owner address. The unlock script carries the owner's public key
/// and a signature over the spending transaction's signing hash.
pub mod script {
    use super::*;

    /// Tag byte of a pay-to-address lock script.
    pub const PAY_TO_ADDRESS: u8 = 0x01;

    pub fn lock_to(address: &Address) -> Vec<u8> {
        let mut script = Vec::with_capacity(21);
        script.push(PAY_TO_ADDRESS);
        script.extend_from_slice(address.as_bytes());
        script
    }

    /// The owner of a lock script, if it is a pay-to-address script.
    pub fn owner(lock_script: &[u8]) -> Option<Address> {
        match lock_script.split_first() {
            Some((&PAY_TO_ADDRESS, rest)) => {
                let arr: [u8; 20] = rest.try_into().ok()?;
                Some(Address(arr))
            }
            _ => None,
        }
    }

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UnlockScript {
        pub public_key: Vec<u8>,
        pub signature: Vec<u8>,
    }

    impl UnlockScript {
        pub fn to_bytes(&self) -> TypeResult<Vec<u8>> {
            Ok(codec::encode(self)?)
        }

        pub fn from_bytes(bytes: &[u8]) -> TypeResult<Self> {
            Ok(codec::decode(bytes)?)
        }
    }
}
