//! Interned identifiers (§3 DATA MODEL).
//!
//! `NodeId` and `ResourceId` compare case-sensitively (they're opaque config
//! keys); `NameserverHostname` and `RecordName` compare case-insensitively,
//! since they're DNS names. All four are cheap to clone (`Arc<str>` backed),
//! following the case-insensitive domain keying already used by
//! `dns/cache.rs::DomainEntry` in the teacher.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! case_sensitive_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(Arc::from(s.into()))
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

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::new(s)
            }
        }
    };
}

macro_rules! case_insensitive_dns_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Serialize, Deserialize)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                $name(Arc::from(s.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Lowercased form used for equality/hash/ordering; the original
            /// case is preserved in `as_str` for display and for the wire.
            fn normalized(&self) -> String {
                self.0.to_ascii_lowercase()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.normalized() == other.normalized()
            }
        }
        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.normalized().hash(state);
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.normalized().cmp(&other.normalized())
            }
        }
        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::new(s)
            }
        }
    };
}

case_sensitive_id!(NodeId);
case_sensitive_id!(ResourceId);
case_insensitive_dns_id!(NameserverHostname);
case_insensitive_dns_id!(RecordName);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn node_id_is_case_sensitive() {
        assert_ne!(NodeId::new("Node1"), NodeId::new("node1"));
    }

    #[test]
    fn hostname_is_case_insensitive() {
        assert_eq!(
            NameserverHostname::new("NS1.Example.com"),
            NameserverHostname::new("ns1.example.com")
        );

        let mut set = HashSet::new();
        set.insert(NameserverHostname::new("ns1.example.com"));
        assert!(set.contains(&NameserverHostname::new("NS1.EXAMPLE.COM")));
    }

    #[test]
    fn hostname_display_preserves_case() {
        let h = NameserverHostname::new("NS1.Example.com");
        assert_eq!(h.to_string(), "NS1.Example.com");
    }
}
