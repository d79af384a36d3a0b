//! Distributed Lock Data Model

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leasehold_common::{current_timestamp, format_timestamp, to_datetime};
use serde::{Deserialize, Serialize};

use super::identity::{LockClaim, OwnerIdentity};

/// `expires_at` of a cleared record (the unix epoch)
pub const TIME_ORIGIN: i64 = 0;

/// Persisted state of one named lock
///
/// The record is effectively held iff `locked && now < expires_at`; once the
/// lease runs out it is free regardless of the stored `locked` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Lock name, unique and immutable
    pub name: String,
    pub hostname: String,
    pub address: String,
    pub thread_id: i64,
    pub thread_name: String,
    pub thread_group_name: String,
    /// Administrative block on acquisition
    pub maintenance: bool,
    pub locked: bool,
    /// Last mutation (unix millis)
    pub updated_time: i64,
    /// Lease end (unix millis)
    pub expires_at: i64,
    /// Incremented on every persisted write, guards concurrent updates
    pub version: i64,
    /// Incremented on every successful acquisition, never reset
    pub fence_token: i64,
}

impl LockRecord {
    /// Create a record in the cleared state
    pub fn new(name: impl Into<String>) -> Self {
        let mut record = Self {
            name: name.into(),
            hostname: String::new(),
            address: String::new(),
            thread_id: -1,
            thread_name: String::new(),
            thread_group_name: String::new(),
            maintenance: false,
            locked: false,
            updated_time: 0,
            expires_at: TIME_ORIGIN,
            version: 0,
            fence_token: 0,
        };
        record.clear();
        record
    }

    /// Check if the lease is currently in force
    pub fn is_effectively_held(&self) -> bool {
        self.is_held_at(current_timestamp())
    }

    /// Check if the lease is in force at `now` (unix millis)
    pub fn is_held_at(&self, now: i64) -> bool {
        self.locked && now < self.expires_at
    }

    pub fn is_maintenance(&self) -> bool {
        self.maintenance
    }

    /// Ownership identity currently stored on the record
    pub fn owner(&self) -> OwnerIdentity {
        OwnerIdentity {
            hostname: self.hostname.clone(),
            address: self.address.clone(),
            thread_id: self.thread_id,
            thread_name: self.thread_name.clone(),
            thread_group_name: self.thread_group_name.clone(),
        }
    }

    /// Check if `identity` is the claimant recorded here
    ///
    /// A cleared record has no owner and never matches.
    pub fn same_owner(&self, identity: &OwnerIdentity) -> bool {
        !self.hostname.is_empty()
            && self.hostname == identity.hostname
            && self.address == identity.address
            && self.thread_name == identity.thread_name
            && self.thread_group_name == identity.thread_group_name
            && self.thread_id == identity.thread_id
    }

    /// Grant the lease to `claim` for `lease`
    pub fn apply_claim(&mut self, claim: &LockClaim, lease: Duration) {
        let now = current_timestamp();
        let lease_ms = i64::try_from(lease.as_millis()).unwrap_or(i64::MAX);

        self.hostname = claim.owner.hostname.clone();
        self.address = claim.owner.address.clone();
        self.thread_name = claim.owner.thread_name.clone();
        self.thread_group_name = claim.owner.thread_group_name.clone();
        self.thread_id = claim.owner.thread_id;
        self.updated_time = now;
        self.expires_at = now.saturating_add(lease_ms);
        self.maintenance = false;
        self.locked = true;
        self.fence_token += 1;
    }

    /// Reset to the cleared state
    pub fn clear(&mut self) {
        self.hostname.clear();
        self.address.clear();
        self.thread_name.clear();
        self.thread_group_name.clear();
        self.thread_id = -1;
        self.updated_time = current_timestamp();
        self.expires_at = TIME_ORIGIN;
        self.maintenance = false;
        self.locked = false;
    }

    pub fn enable_maintenance(&mut self) {
        self.maintenance = true;
    }

    /// Time left on the lease, zero once it has run out
    pub fn remaining_lease(&self) -> Duration {
        let now = current_timestamp();
        if self.locked && self.expires_at > now {
            Duration::from_millis((self.expires_at - now) as u64)
        } else {
            Duration::ZERO
        }
    }

    pub fn expires_at_time(&self) -> DateTime<Utc> {
        to_datetime(self.expires_at)
    }

    pub fn updated_at_time(&self) -> DateTime<Utc> {
        to_datetime(self.updated_time)
    }
}

impl fmt::Display for LockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DistributedLock(name={}, hostname={}, address={}, threadName={}, threadGroupName={}, threadId={}, expiresAt={}, locked={})",
            self.name,
            self.hostname,
            self.address,
            self.thread_name,
            self.thread_group_name,
            self.thread_id,
            format_timestamp(self.expires_at),
            self.locked
        )
    }
}
