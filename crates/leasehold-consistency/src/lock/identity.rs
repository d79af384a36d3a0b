//! Ownership identity of lock claimants

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use leasehold_common::{local_hostname, local_ip};
use serde::{Deserialize, Serialize};

/// Thread group reported for claims made from inside a tokio task
pub const TOKIO_TASK_GROUP: &str = "tokio-runtime";

static NEXT_THREAD_SEQ: AtomicI64 = AtomicI64::new(1);

thread_local! {
    static THREAD_SEQ: i64 = NEXT_THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
}

/// Host half of an ownership identity, resolved once per coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostIdentity {
    pub hostname: String,
    pub address: String,
}

impl HostIdentity {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
        }
    }

    /// Look up this machine's host name and primary IPv4 address.
    pub fn discover() -> Self {
        Self::new(local_hostname(), local_ip())
    }
}

/// Identity tuple of a lock claimant
///
/// Two identities are the same claimant iff every field matches. The
/// thread half is only locally unique and does not survive restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerIdentity {
    pub hostname: String,
    pub address: String,
    pub thread_id: i64,
    pub thread_name: String,
    pub thread_group_name: String,
}

impl OwnerIdentity {
    /// Identity of the calling execution context on `host`.
    ///
    /// Inside a tokio task the task id stands in for the thread, since a
    /// task may move between worker threads across awaits.
    pub fn current(host: &HostIdentity) -> Self {
        let (thread_id, thread_name, thread_group_name) = match tokio::task::try_id() {
            Some(id) => {
                let name = id.to_string();
                (
                    name.parse::<u64>().map(|v| v as i64).unwrap_or_default(),
                    format!("task-{name}"),
                    TOKIO_TASK_GROUP.to_string(),
                )
            }
            None => {
                let thread = std::thread::current();
                (
                    THREAD_SEQ.with(|seq| *seq),
                    thread.name().unwrap_or("unnamed").to_string(),
                    format!("process-{}", std::process::id()),
                )
            }
        };

        Self {
            hostname: host.hostname.clone(),
            address: host.address.clone(),
            thread_id,
            thread_name,
            thread_group_name,
        }
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hostname={}, address={}, threadName={}, threadGroupName={}, threadId={}",
            self.hostname, self.address, self.thread_name, self.thread_group_name, self.thread_id
        )
    }
}

/// A contender's request to own a named lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockClaim {
    pub name: String,
    pub owner: OwnerIdentity,
}

impl LockClaim {
    pub fn new(name: impl Into<String>, owner: OwnerIdentity) -> Self {
        Self {
            name: name.into(),
            owner,
        }
    }

    /// Claim `name` on behalf of the calling execution context.
    pub fn current(name: impl Into<String>, host: &HostIdentity) -> Self {
        Self::new(name, OwnerIdentity::current(host))
    }
}

impl fmt::Display for LockClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockClaim(name={}, {})", self.name, self.owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> HostIdentity {
        HostIdentity::new("node-1", "10.0.0.1")
    }

    #[test]
    fn test_current_outside_runtime_uses_thread() {
        let identity = OwnerIdentity::current(&host());
        assert_eq!(identity.hostname, "node-1");
        assert_eq!(identity.address, "10.0.0.1");
        assert!(identity.thread_group_name.starts_with("process-"));
        assert!(identity.thread_id > 0);

        // Stable for the same thread
        assert_eq!(identity, OwnerIdentity::current(&host()));
    }

    #[test]
    fn test_distinct_threads_are_distinct_owners() {
        let here = OwnerIdentity::current(&host());
        let there = std::thread::Builder::new()
            .name("worker-7".to_string())
            .spawn(|| OwnerIdentity::current(&host()))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(there.thread_name, "worker-7");
        assert_ne!(here, there);
    }

    #[tokio::test]
    async fn test_current_inside_task_uses_task_id() {
        let outer = tokio::spawn(async { OwnerIdentity::current(&host()) })
            .await
            .unwrap();
        let other = tokio::spawn(async { OwnerIdentity::current(&host()) })
            .await
            .unwrap();

        assert_eq!(outer.thread_group_name, TOKIO_TASK_GROUP);
        assert!(outer.thread_name.starts_with("task-"));
        assert_ne!(outer, other);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_task_identity_survives_await() {
        let (before, after) = tokio::spawn(async {
            let before = OwnerIdentity::current(&host());
            tokio::task::yield_now().await;
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            (before, OwnerIdentity::current(&host()))
        })
        .await
        .unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_claim_display() {
        let claim = LockClaim::new(
            "orders",
            OwnerIdentity {
                hostname: "node-1".to_string(),
                address: "10.0.0.1".to_string(),
                thread_id: 4,
                thread_name: "main".to_string(),
                thread_group_name: "main".to_string(),
            },
        );
        assert_eq!(
            claim.to_string(),
            "LockClaim(name=orders, hostname=node-1, address=10.0.0.1, threadName=main, threadGroupName=main, threadId=4)"
        );
    }
}
