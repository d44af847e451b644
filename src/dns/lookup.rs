//! The single `(resolver, recordName)` DNS lookup primitive (§4.2).
//!
//! Grounded on `dns/client.rs::DnsNetworkClient::send_query` (classify the
//! result into exactly one status, never let a failure escape as a panic or
//! propagated error) and `dns/errors.rs` (typed categories feeding a status).

use std::net::Ipv4Addr;
use std::sync::Arc;

use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;
use serde::{Deserialize, Serialize};

use crate::ids::RecordName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookupStatus {
    Successful,
    Unrecoverable,
    TryAgain,
    HostNotFound,
    TypeNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResult {
    pub name: RecordName,
    pub status: LookupStatus,
    /// Sorted lexically, no duplicates (§8 invariant 2). Non-empty iff
    /// `status == Successful` (§8 invariant 3).
    pub addresses: Vec<Ipv4Addr>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl LookupResult {
    fn unrecoverable(name: &RecordName, cause: impl std::fmt::Display) -> LookupResult {
        LookupResult {
            name: name.clone(),
            status: LookupStatus::Unrecoverable,
            addresses: Vec::new(),
            warnings: Vec::new(),
            errors: vec![cause.to_string()],
        }
    }
}

fn sort_addresses(mut addrs: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
    addrs.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
    addrs.dedup();
    addrs
}

/// Query `resolver` for the `A` records of `name`. `expected_master_ttl`, when
/// given, is the resource's configured `masterRecordTtl`: every returned `A`
/// record whose owner name is one of the resource's master records is
/// TTL-checked against it, producing a warning (never an error, never a
/// status change) on mismatch (§4.2).
pub async fn lookup_a(
    resolver: &Arc<TokioAsyncResolver>,
    name: &RecordName,
    expected_master_ttl: Option<u32>,
) -> LookupResult {
    // Fully-qualify the name so resolution never consults a search path
    // (§4.2 "uses an empty search path; queries are absolute").
    let fqdn = {
        let raw = name.as_str();
        if raw.ends_with('.') {
            raw.to_string()
        } else {
            format!("{}.", raw)
        }
    };

    let resolver = resolver.clone();
    let fqdn_for_task = fqdn.clone();

    // "Any thrown failure in the primitive itself is captured as an
    // UNRECOVERABLE result... it never crashes the monitor" (§4.2) — a
    // panic inside the query surfaces as a JoinError here instead of
    // unwinding into the caller.
    let joined = tokio::spawn(async move { resolver.lookup(fqdn_for_task, RecordType::A).await }).await;

    let lookup = match joined {
        Ok(inner) => inner,
        Err(join_err) => return LookupResult::unrecoverable(name, join_err),
    };

    let result = match lookup {
        Ok(lookup) => {
            let mut warnings = Vec::new();
            let mut addresses = Vec::new();

            for record in lookup.record_iter() {
                if let Some(RData::A(addr)) = record.data() {
                    addresses.push((*addr).into());

                    if let Some(expected) = expected_master_ttl {
                        if record.ttl() != expected {
                            warnings.push(format!(
                                "unexpectedTtl: {} ttl={} expected={}",
                                name,
                                record.ttl(),
                                expected
                            ));
                        }
                    }
                }
            }

            if addresses.is_empty() {
                // "If none were returned despite success, downgrades to HOST_NOT_FOUND" (§4.2).
                LookupResult {
                    name: name.clone(),
                    status: LookupStatus::HostNotFound,
                    addresses: Vec::new(),
                    warnings,
                    errors: Vec::new(),
                }
            } else {
                LookupResult {
                    name: name.clone(),
                    status: LookupStatus::Successful,
                    addresses: sort_addresses(addresses),
                    warnings,
                    errors: Vec::new(),
                }
            }
        }
        Err(err) => classify_error(name, err),
    };

    tracing::debug!(name = %name, status = ?result.status, addresses = result.addresses.len(), "dns lookup completed");
    result
}

fn classify_error(name: &RecordName, err: hickory_resolver::error::ResolveError) -> LookupResult {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => {
            use hickory_resolver::proto::op::ResponseCode;
            let status = match response_code {
                ResponseCode::NXDomain => LookupStatus::HostNotFound,
                ResponseCode::NoError => LookupStatus::TypeNotFound,
                ResponseCode::ServFail | ResponseCode::Refused => LookupStatus::TryAgain,
                _ => LookupStatus::Unrecoverable,
            };

            LookupResult {
                name: name.clone(),
                status,
                addresses: Vec::new(),
                warnings: Vec::new(),
                errors: if status == LookupStatus::Unrecoverable {
                    vec![format!("{:?}", response_code)]
                } else {
                    Vec::new()
                },
            }
        }
        ResolveErrorKind::Timeout => LookupResult {
            name: name.clone(),
            status: LookupStatus::TryAgain,
            addresses: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        },
        other => LookupResult::unrecoverable(name, format!("{:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_and_dedups_lexically() {
        let addrs = vec![
            "10.0.0.10".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        ];
        let sorted = sort_addresses(addrs);
        // lexical ("10.0.0.10" < "10.0.0.2"), not numeric.
        assert_eq!(
            sorted,
            vec![
                "10.0.0.10".parse::<Ipv4Addr>().unwrap(),
                "10.0.0.2".parse::<Ipv4Addr>().unwrap(),
            ]
        );
    }

    #[test]
    fn success_emptiness_duality_enforced_by_construction() {
        let empty_success = LookupResult {
            name: RecordName::new("m.example.com"),
            status: LookupStatus::Successful,
            addresses: sort_addresses(vec!["10.0.0.1".parse().unwrap()]),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        assert!(!empty_success.addresses.is_empty());
    }
}
