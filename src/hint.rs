//! Hint decoding and application
//!
//! A hint list element is either a bare atom (`urgent`) or a
//! `{Key, Value}` pair. The value is classified into one of a fixed set of
//! shapes, and exactly one typed setter is called for it.
//!
//! Classification order matters because a term can satisfy more than one
//! shape:
//! 1. integer (32-bit)
//! 2. float
//! 3. `{byte, Int}` tuple; any other tuple is rejected outright
//! 4. no value at all (bare atom element)
//! 5. iolist or binary
//!
//! Anything else is a bad argument.

use crate::errors::{BridgeError, Result};
use crate::native::{NativeString, StringAllocator};
use crate::notify::NotificationService;
use crate::term::Term;
use std::ffi::CStr;

/// Longest hint key, in Latin-1 bytes
pub const MAX_KEY_LEN: usize = 255;

/// Marker atom for explicit byte values
const BYTE_MARKER: &str = "byte";

/// A decoded hint value
#[derive(Debug)]
pub enum HintValue<'a> {
    Integer(i32),
    Float(f64),
    ExplicitByte(u8),
    Text(NativeString<'a>),
    /// Bare key with no value slot
    Absent,
}

/// Classify a hint value.
///
/// `value` is `None` when the hint was a bare atom. Returns `Ok(None)` when
/// the value matches no shape; errors only on allocation failure.
pub fn decode_value<'a>(
    value: Option<&Term>,
    alloc: &'a dyn StringAllocator,
) -> Result<Option<HintValue<'a>>> {
    if let Some(term) = value {
        if let Some(n) = term.as_i32() {
            return Ok(Some(HintValue::Integer(n)));
        }
        if let Some(x) = term.as_f64() {
            return Ok(Some(HintValue::Float(x)));
        }
        if let Term::Tuple(elems) = term {
            return Ok(decode_byte(elems).map(HintValue::ExplicitByte));
        }
    }

    let Some(term) = value else {
        return Ok(Some(HintValue::Absent));
    };

    if term.iolist_size().is_some() {
        return NativeString::from_term(term, alloc).map(|s| Some(HintValue::Text(s)));
    }

    Ok(None)
}

/// `{byte, N}` with N truncated to 8 bits
fn decode_byte(elems: &[Term]) -> Option<u8> {
    match elems {
        [marker, value] if marker.as_atom(MAX_KEY_LEN) == Some(BYTE_MARKER) => {
            value.as_i32().map(|n| n as u8)
        }
        _ => None,
    }
}

/// Split a hint list element into its key and optional value
pub fn split_entry(entry: &Term) -> Result<(&Term, Option<&Term>)> {
    match entry {
        Term::Tuple(elems) => match elems.as_slice() {
            [key, value] => Ok((key, Some(value))),
            _ => Err(BridgeError::BadArgument("hint tuple must have two elements")),
        },
        Term::Atom(_) => Ok((entry, None)),
        _ => Err(BridgeError::BadArgument("hint must be an atom or a {Key, Value} tuple")),
    }
}

fn decode_key(key: &Term) -> Result<&str> {
    key.as_atom(MAX_KEY_LEN)
        .ok_or(BridgeError::BadArgument("hint key must be an atom of at most 255 bytes"))
}

/// Apply one hint list element to `notification`.
///
/// Calls exactly one setter on success and none on failure.
pub fn apply_entry<S: NotificationService>(
    service: &S,
    notification: &mut S::Handle,
    entry: &Term,
    alloc: &dyn StringAllocator,
) -> Result<()> {
    let (key, value) = split_entry(entry)?;
    apply(service, notification, key, value, alloc)
}

/// Apply a single `key`/`value` hint to `notification`
pub fn apply<S: NotificationService>(
    service: &S,
    notification: &mut S::Handle,
    key: &Term,
    value: Option<&Term>,
    alloc: &dyn StringAllocator,
) -> Result<()> {
    let key = decode_key(key)?;

    let Some(decoded) = decode_value(value, alloc)? else {
        tracing::debug!(key, value = ?value, "Rejected hint value");
        return Err(BridgeError::BadArgument("unrecognized hint value"));
    };

    match decoded {
        HintValue::Integer(n) => service.set_hint_int32(notification, key, n),
        HintValue::Float(x) => service.set_hint_double(notification, key, x),
        HintValue::ExplicitByte(b) => service.set_hint_byte(notification, key, b),
        HintValue::Text(text) => service.set_hint_string(notification, key, text.as_c_str()),
        HintValue::Absent => service.set_hint_string(notification, key, <&CStr>::default()),
    }

    Ok(())
}
