//! Store key layout.
//!
//! Every key lives under an optional space prefix so several logical queue
//! systems can share one store:
//!
//! | key                     | type       | holds                                  |
//! |-------------------------|------------|----------------------------------------|
//! | `RQ:listen`             | hash       | group queue key -> last enqueue time   |
//! | `RQ:failed`             | list       | failure records                        |
//! | `RQ:jobs:<group>`       | list       | pending jobs of one group              |
//! | `RQ:watch:<host>`       | hash       | worker identity key -> heartbeat time  |
//! | `RQ:worker:<id>`        | string/TTL | worker (or master) identity            |
//! | `RQ:unique:<token>`     | string/TTL | dedup lock                             |
//! | `RQ:delay:lock`         | hash       | due time -> due time                   |
//! | `RQ:delay:time`         | zset       | due times scored by themselves         |
//! | `RQ:delay:jobs:<due>`   | list       | delay entries due at one second        |

const LISTEN: &str = "RQ:listen";
const FAILED: &str = "RQ:failed";
const JOBS: &str = "RQ:jobs:";
const WATCH: &str = "RQ:watch:";
const WORKER: &str = "RQ:worker:";
const UNIQUE: &str = "RQ:unique:";
const DELAY_LOCK: &str = "RQ:delay:lock";
const DELAY_TIME: &str = "RQ:delay:time";
const DELAY_JOBS: &str = "RQ:delay:jobs:";

/// Resolved key names for one queue space on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    host: Option<String>,
}

impl KeySpace {
    /// `space` may be empty for the default space. `host` names the Watch
    /// Set and master identity; without it they fall back to `worker` and
    /// `master`.
    pub fn new(space: &str, host: Option<String>) -> Self {
        let prefix = if space.is_empty() {
            String::new()
        } else {
            format!("{space}:")
        };
        Self {
            prefix,
            host: host.filter(|h| !h.is_empty()),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn listen(&self) -> String {
        self.key(LISTEN)
    }

    pub fn failed(&self) -> String {
        self.key(FAILED)
    }

    pub fn group_queue(&self, group: &str) -> String {
        self.key(&format!("{JOBS}{group}"))
    }

    /// Watch Set shared by the master and every unit on this host.
    pub fn watch(&self) -> String {
        self.key(&format!("{WATCH}{}", self.host.as_deref().unwrap_or("worker")))
    }

    pub fn worker(&self, identity: &str) -> String {
        self.key(&format!("{WORKER}{identity}"))
    }

    /// Identity key of this host's master.
    pub fn master(&self) -> String {
        self.worker(self.host.as_deref().unwrap_or("master"))
    }

    pub fn unique(&self, token: &str) -> String {
        self.key(&format!("{UNIQUE}{token}"))
    }

    pub fn delay_lock(&self) -> String {
        self.key(DELAY_LOCK)
    }

    pub fn delay_time(&self) -> String {
        self.key(DELAY_TIME)
    }

    pub fn delay_jobs(&self, due: i64) -> String {
        self.key(&format!("{DELAY_JOBS}{due}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_space_has_no_prefix() {
        let keys = KeySpace::new("", None);
        assert_eq!(keys.listen(), "RQ:listen");
        assert_eq!(keys.group_queue("main"), "RQ:jobs:main");
        assert_eq!(keys.watch(), "RQ:watch:worker");
        assert_eq!(keys.master(), "RQ:worker:master");
        assert_eq!(keys.delay_jobs(1700000000), "RQ:delay:jobs:1700000000");
    }

    #[test]
    fn test_space_and_host_are_applied() {
        let keys = KeySpace::new("billing", Some("node-7".to_string()));
        assert_eq!(keys.failed(), "billing:RQ:failed");
        assert_eq!(keys.unique("orders-create:42"), "billing:RQ:unique:orders-create:42");
        assert_eq!(keys.watch(), "billing:RQ:watch:node-7");
        assert_eq!(keys.master(), "billing:RQ:worker:node-7");
        assert_eq!(keys.worker("a1b2c3d4"), "billing:RQ:worker:a1b2c3d4");
    }

    #[test]
    fn test_empty_host_falls_back() {
        let keys = KeySpace::new("", Some(String::new()));
        assert_eq!(keys.master(), "RQ:worker:master");
    }
}
