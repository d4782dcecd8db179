use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The six object kinds, with their key-layout rank as discriminant.
///
/// The rank is part of the on-disk key format and must never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObjectType {
    Audio = 0,
    Phrase = 1,
    Word = 2,
    Syllable = 3,
    Phone = 4,
    Speaker = 5,
}

impl ObjectType {
    /// All types in rank order.
    pub const ALL: [ObjectType; 6] = [
        ObjectType::Audio,
        ObjectType::Phrase,
        ObjectType::Word,
        ObjectType::Syllable,
        ObjectType::Phone,
        ObjectType::Speaker,
    ];

    /// The four segment types, outermost first.
    pub const SEGMENTS: [ObjectType; 4] = [
        ObjectType::Phrase,
        ObjectType::Word,
        ObjectType::Syllable,
        ObjectType::Phone,
    ];

    /// Key-layout rank.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Inverse of [`ObjectType::rank`].
    pub fn from_rank(rank: u8) -> Result<Self, TypeError> {
        match rank {
            0 => Ok(Self::Audio),
            1 => Ok(Self::Phrase),
            2 => Ok(Self::Word),
            3 => Ok(Self::Syllable),
            4 => Ok(Self::Phone),
            5 => Ok(Self::Speaker),
            other => Err(TypeError::UnknownRank(other)),
        }
    }

    /// Type name as used in logs and registry lookups.
    pub fn name(self) -> &'static str {
        match self {
            Self::Audio => "Audio",
            Self::Phrase => "Phrase",
            Self::Word => "Word",
            Self::Syllable => "Syllable",
            Self::Phone => "Phone",
            Self::Speaker => "Speaker",
        }
    }

    /// Returns `true` for Phrase, Word, Syllable and Phone.
    pub fn is_segment(self) -> bool {
        matches!(self, Self::Phrase | Self::Word | Self::Syllable | Self::Phone)
    }

    /// The only legal child type, if any.
    pub fn child_type(self) -> Option<Self> {
        match self {
            Self::Phrase => Some(Self::Word),
            Self::Word => Some(Self::Syllable),
            Self::Syllable => Some(Self::Phone),
            _ => None,
        }
    }

    /// The only legal parent type, if any.
    pub fn parent_type(self) -> Option<Self> {
        match self {
            Self::Word => Some(Self::Phrase),
            Self::Syllable => Some(Self::Word),
            Self::Phone => Some(Self::Syllable),
            _ => None,
        }
    }

    /// Depth in the containment tree (Phrase = 0). `None` for non-segments.
    pub fn depth(self) -> Option<usize> {
        Self::SEGMENTS.iter().position(|t| *t == self)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ObjectType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypeError::UnknownTypeName(s.to_string()))
    }
}
