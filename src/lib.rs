//! appcluster — DNS-observed master/slave cluster coordination
//!
//! This crate determines, from authoritative DNS state alone, which nodes of
//! a small application cluster are currently master(s) and which are
//! slaves for each named resource, flags inconsistencies between
//! nameservers or between the master pointer and per-node pointers, and
//! drives per-pair synchronizers that test and (master -> slave) synchronize
//! resource data on a cron-like schedule.
//!
//! # Module structure
//!
//! * `ids` - interned identifiers (node/resource/nameserver/record names)
//! * `status` - the monotone status lattice and its `max` reducer
//! * `model` - `Node`, `Resource`, `ResourceNode` and their invariants
//! * `dns` - the nameserver resolver cache and the single-query lookup primitive
//! * `monitor` - the per-resource DNS monitor (tick loop, classification)
//! * `schedule` - cron-like schedule matching with no-catch-up semantics
//! * `sync` - the synchronizer plug-in trait and its registry
//! * `synchronizer` - the per-node-pair cron-driven synchronizer
//! * `cluster` - cluster-wide lifecycle: start/stop, worker pool, status aggregation
//! * `config` - the configuration source abstraction and its file-backed implementation
//! * `events` - the event sink abstraction for state-transition logging

pub mod ids;
pub mod status;
pub mod model;
pub mod dns;
pub mod schedule;
pub mod monitor;
pub mod sync;
pub mod synchronizer;
pub mod config;
pub mod events;
pub mod cluster;
