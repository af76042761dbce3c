use std::fmt;

use bytes::Bytes;

/// An immutable byte-string identity naming a computation.
///
/// Equality and hashing are over the full byte sequence, including embedded zero bytes: a `Key`
/// is not a C string and never null-terminated. `Bytes` gives cheap clones (an `Arc`-backed
/// refcount bump) since the same key is copied into many tables (the rule registry, dependency
/// lists, the active-wait graph) over the life of a build.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Key(Bytes);

impl Key {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Key(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(Bytes::from(s.into_bytes()))
    }
}

impl From<Vec<u8>> for Key {
    fn from(v: Vec<u8>) -> Self {
        Key(Bytes::from(v))
    }
}

impl From<&[u8]> for Key {
    fn from(v: &[u8]) -> Self {
        Key(Bytes::copy_from_slice(v))
    }
}

/// An immutable byte-string result of a computation. The engine never interprets its contents:
/// it is passed byte-for-byte from `complete` to every waiting `provide_value` delivery and to
/// the persistence bridge.
#[derive(Clone, Eq, PartialEq)]
pub struct Value(Bytes);

impl Value {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Value(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({} bytes)", self.0.len())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value(Bytes::from(v))
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value(Bytes::copy_from_slice(v))
    }
}
