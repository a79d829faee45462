#![allow(missing_docs)]

use std::fmt;
use std::ops::Deref;
use std::str::from_utf8;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! str_id {
    ($id:ident, $name:literal, $num:tt) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $id([u8; $num]);

        impl $id {
            /// Parse the value of a header extension.
            ///
            /// Returns `None` for values that are not UTF-8, or that aren't a valid id after
            /// trimming NUL padding and whitespace.
            pub fn parse(buf: &[u8]) -> Option<$id> {
                let s = from_utf8(buf).ok()?.trim_end_matches('\0').trim();
                if !Self::is_valid(s) {
                    return None;
                }
                Some(s.into())
            }

            /// Tells if the value is a valid id that fits without truncation.
            ///
            /// Ascii alphanumerics, `-` or `_`, at least one and at most the capacity.
            pub fn is_valid(s: &str) -> bool {
                !s.is_empty()
                    && s.len() <= $num
                    && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s: &str = self;
                write!(f, "{}", s)
            }
        }

        impl fmt::Debug for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let s: &str = self;
                write!(f, "{}({})", $name, s)
            }
        }

        impl Deref for $id {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                // Always cut on a char boundary, so this can't fail.
                from_utf8(&self.0).unwrap_or("").trim_end_matches('\0')
            }
        }

        /// Keeps the value as is, cut on a char boundary at the capacity.
        ///
        /// Use [`is_valid`](Self::is_valid) to check untrusted input first.
        impl<'a> From<&'a str> for $id {
            fn from(v: &'a str) -> Self {
                let mut max = v.len().min($num);
                while !v.is_char_boundary(max) {
                    max -= 1;
                }

                // pad with nul.
                let mut array = [0; $num];
                array[0..max].copy_from_slice(&v.as_bytes()[0..max]);

                $id(array)
            }
        }

        impl Serialize for $id {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $id {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                if !Self::is_valid(&s) {
                    return Err(<D::Error as serde::de::Error>::custom(format!(
                        "invalid {}: {:?}",
                        $name, s
                    )));
                }
                Ok(s.as_str().into())
            }
        }
    };
}

macro_rules! num_id {
    ($id:ident, $t:ty) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $id($t);

        impl Deref for $id {
            type Target = $t;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl From<$t> for $id {
            fn from(v: $t) -> Self {
                $id(v)
            }
        }

        impl fmt::Display for $id {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

str_id!(Mid, "Mid", 16);
// Two-byte header extensions carry up to 255 bytes.
str_id!(Rid, "Rid", 255);
num_id!(Ssrc, u32);
num_id!(Pt, u8);
num_id!(ChannelId, u64);
num_id!(ReceiverId, u64);

impl ReceiverId {
    /// A new random receiver identity.
    pub fn new() -> Self {
        ReceiverId(fastrand::u64(..))
    }
}

impl Default for ReceiverId {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelId {
    pub(crate) fn next(&self) -> Self {
        ChannelId(self.0 + 1)
    }
}
