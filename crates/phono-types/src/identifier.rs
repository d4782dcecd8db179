use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of any stored object: 8 random bytes.
///
/// The all-zero identifier is reserved as [`Identifier::EMPTY`] and means
/// "not set" wherever an object refers to another one (a segment without
/// audio, a phrase without speaker).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Identifier([u8; 8]);

impl Identifier {
    /// Number of bytes in an identifier.
    pub const LEN: usize = 8;

    /// The unset identifier (all zeros).
    pub const EMPTY: Identifier = Identifier([0u8; 8]);

    /// Generate a fresh random identifier. Never returns [`Identifier::EMPTY`].
    pub fn random() -> Self {
        let mut bytes = [0u8; 8];
        loop {
            rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
            if bytes != [0u8; 8] {
                return Self(bytes);
            }
        }
    }

    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Copy an identifier out of a slice that must be exactly 8 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; 8] = bytes.try_into().map_err(|_| TypeError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Returns `true` for the unset identifier.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 8]
    }

    /// `None` for the unset identifier.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// 16-character lowercase hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 16-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({})", self.to_hex())
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 8]> for Identifier {
    fn from(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }
}

impl From<Identifier> for [u8; 8] {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn random_is_never_empty() {
        for _ in 0..64 {
            assert!(!Identifier::random().is_empty());
        }
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(Identifier::random(), Identifier::random());
    }

    #[test]
    fn empty_is_all_zeros() {
        assert!(Identifier::EMPTY.is_empty());
        assert_eq!(Identifier::EMPTY.to_hex(), "0000000000000000");
        assert_eq!(Identifier::default(), Identifier::EMPTY);
        assert!(Identifier::EMPTY.non_empty().is_none());
    }

    #[test]
    fn from_slice_rejects_wrong_length() {
        let err = Identifier::from_slice(&[1, 2, 3]).unwrap_err();
        assert_eq!(err, TypeError::InvalidLength { expected: 8, actual: 3 });
    }

    #[test]
    fn from_hex_rejects_garbage() {
        assert!(matches!(
            Identifier::from_hex("zz").unwrap_err(),
            TypeError::InvalidHex(_)
        ));
    }

    #[test]
    fn serde_roundtrip() {
        let id = Identifier::random();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    proptest! {
        #[test]
        fn hex_roundtrip(bytes in any::<[u8; 8]>()) {
            let id = Identifier::from_bytes(bytes);
            prop_assert_eq!(Identifier::from_hex(&id.to_hex()).unwrap(), id);
        }

        #[test]
        fn ordering_follows_bytes(a in any::<[u8; 8]>(), b in any::<[u8; 8]>()) {
            prop_assert_eq!(Identifier::from_bytes(a).cmp(&Identifier::from_bytes(b)), a.cmp(&b));
        }
    }
}
