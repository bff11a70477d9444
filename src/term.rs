//! Dynamically-typed caller values
//!
//! The host runtime hands us terms: integers, floats, atoms, binaries,
//! tuples and lists. On the wire each term is an externally tagged JSON
//! object, e.g. `{"atom":"urgent"}` or `{"tuple":[{"atom":"byte"},{"int":9}]}`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single caller-supplied value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    Int(i64),
    Float(f64),
    Atom(String),
    /// Raw bytes; JSON accepts either a string or an array of bytes
    Binary(#[serde(with = "binary_repr")] Vec<u8>),
    Tuple(Vec<Term>),
    List(Vec<Term>),
}

impl Term {
    pub fn atom(name: impl Into<String>) -> Self {
        Self::Atom(name.into())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Binary(bytes.into())
    }

    /// Integer that fits the native 32-bit `int`
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(n) => i32::try_from(*n).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Atom name, if it is an atom representable in Latin-1 within `max_len` bytes
    pub fn as_atom(&self, max_len: usize) -> Option<&str> {
        match self {
            Self::Atom(name) => latin1_len(name)
                .filter(|len| *len <= max_len)
                .map(|_| name.as_str()),
            _ => None,
        }
    }

    /// Flattened byte length if this term is an iolist, without copying.
    ///
    /// An iolist is a binary, or a (possibly nested) list whose elements are
    /// bytes (integers 0..=255), binaries or iolists.
    pub fn iolist_size(&self) -> Option<usize> {
        match self {
            Self::Binary(bytes) => Some(bytes.len()),
            Self::List(items) => items.iter().try_fold(0usize, |acc, item| {
                let len = match item {
                    Self::Int(b) if (0..=255).contains(b) => 1,
                    Self::Int(_) => return None,
                    other => other.iolist_size()?,
                };
                acc.checked_add(len)
            }),
            _ => None,
        }
    }

    /// Append the flattened iolist bytes to `out`.
    ///
    /// Callers check `iolist_size` first; non-iolist elements are skipped.
    pub fn copy_iolist(&self, out: &mut Vec<u8>) {
        match self {
            Self::Binary(bytes) => out.extend_from_slice(bytes),
            Self::List(items) => {
                for item in items {
                    match item {
                        Self::Int(b) => {
                            if let Ok(byte) = u8::try_from(*b) {
                                out.push(byte);
                            }
                        }
                        other => other.copy_iolist(out),
                    }
                }
            }
            _ => {}
        }
    }
}

/// Byte length of `s` once encoded as Latin-1, or None if it has wider chars
pub fn latin1_len(s: &str) -> Option<usize> {
    s.chars()
        .try_fold(0usize, |len, c| (u32::from(c) <= 0xFF).then_some(len + 1))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Atom(name) => f.write_str(name),
            Self::Binary(bytes) => write!(f, "<<{:?}>>", String::from_utf8_lossy(bytes)),
            Self::Tuple(items) => {
                f.write_str("{")?;
                join(f, items)?;
                f.write_str("}")
            }
            Self::List(items) => {
                f.write_str("[")?;
                join(f, items)?;
                f.write_str("]")
            }
        }
    }
}

mod binary_repr {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        match std::str::from_utf8(bytes) {
            Ok(text) => serializer.serialize_str(text),
            Err(_) => serializer.collect_seq(bytes),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Raw(Vec<u8>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Text(text) => text.into_bytes(),
            Repr::Raw(bytes) => bytes,
        })
    }
}
