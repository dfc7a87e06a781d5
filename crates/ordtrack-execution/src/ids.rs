//! Client order identifiers.
//!
//! A [`ClOrdId`] is an opaque token. Nothing in this workspace parses it;
//! the action that produced it travels beside it as an [`ActionKind`] (in
//! log fields, in [`crate::OutboundAction`]) instead of being glued onto the
//! string as a prefix.
//!
//! Uniqueness is the generator's contract. The tracker assumes every
//! identifier handed to `register` is fresh and only warns if it is not.

use std::borrow::Borrow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Opaque client order identifier (FIX tag 11 / 41 value).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClOrdId(String);

impl ClOrdId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ClOrdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ClOrdId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ClOrdId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClOrdId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ClOrdId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Which outbound request an identifier was minted for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    New,
    Replace,
    Cancel,
}

impl ActionKind {
    /// Short human tag used in log lines (`CL`, `RE`, `CA`).
    pub fn log_tag(&self) -> &'static str {
        match self {
            ActionKind::New => "CL",
            ActionKind::Replace => "RE",
            ActionKind::Cancel => "CA",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::New => write!(f, "new"),
            ActionKind::Replace => write!(f, "replace"),
            ActionKind::Cancel => write!(f, "cancel"),
        }
    }
}

/// Source of fresh identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, kind: ActionKind) -> ClOrdId;
}

/// Production generator: random UUID v4 in simple (hyphen-free) form.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self, _kind: ActionKind) -> ClOrdId {
        ClOrdId(Uuid::new_v4().simple().to_string())
    }
}

/// Deterministic generator for tests and paper runs: `{prefix}{n}`, n from 1.
///
/// Unique within one process as long as a single instance is shared.
#[derive(Debug)]
pub struct SequenceIdGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequenceIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn next_id(&self, _kind: ActionKind) -> ClOrdId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ClOrdId(format!("{}{}", self.prefix, n))
    }
}
