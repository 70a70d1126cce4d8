//! OpenStack provider extension for the Trellis cluster-lifecycle manager
//!
//! Runs the per-provider mutating webhook that wires etcd backup sidecars
//! into shoot control planes backed by Swift object storage, plus the
//! provider's image-lookup utilities.
//!
//! # Modules
//!
//! - [`openstack`] - provider constants (type, backup secret name and keys)
//! - [`imagevector`] - packaged image vector and named image lookups
//! - [`config`] - provider configuration (backup schedule, cluster context)
//! - [`controlplanebackup`] - the etcd backup ensurer

#![deny(missing_docs)]

pub mod config;
pub mod controlplanebackup;
pub mod imagevector;
pub mod openstack;
