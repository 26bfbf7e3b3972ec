use core::str::FromStr;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use serde::Deserialize;
use strum::{AsRefStr, Display, EnumString};
use tracing::{debug, warn};

use crate::attr::{AttributeList, Coded, Token};
use crate::cache::{CacheStats, DecisionCache};
use crate::env::parse_environment;
use crate::error::UploadError;
use crate::operation::{Decision, Operation};
use crate::policy::{LoadReport, PolicyTable, RuleId};
use crate::principal::{PrincipalId, PrincipalStore};
use crate::resource::{PolicyModel, ResourceIndex, ResourcePolicy};

/// Default decision cache capacity.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Engine configuration, fixed for the engine's lifetime.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct EngineConfig {
    /// The policy representation resource uploads are parsed into.
    pub model: PolicyModel,
    /// Decision cache capacity.
    pub cache_capacity: NonZeroUsize,
}

impl EngineConfig {
    pub fn new(model: PolicyModel) -> Self {
        Self {
            model,
            cache_capacity: NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("nonzero"),
        }
    }

    pub fn with_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

/// Signals accepted on the control channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum ControlAction {
    /// Start capturing per-resolution timings.
    #[strum(serialize = "RECORD")]
    Record,
    /// Stop capturing and reset the captured timing.
    #[strum(serialize = "STOP")]
    Stop,
}

/// One complete policy generation.
///
/// Snapshots are immutable once published: a reload builds the next
/// snapshot entirely off to the side and swaps it in, so a resolution
/// in flight keeps reading the generation it started with and never a
/// half-rebuilt index. The decision cache lives inside the snapshot,
/// which makes the swap itself the full cache invalidation; an insert
/// racing the swap lands in the dying generation's cache and is
/// dropped with it.
struct Snapshot<T> {
    principals: Arc<PrincipalStore<T>>,
    resources: Arc<ResourceIndex<T>>,
    policy: Arc<PolicyTable<T>>,
    environment: Arc<AttributeList<T>>,
    cache: DecisionCache,
}

impl<T: Token> Snapshot<T> {
    fn empty(cache_capacity: NonZeroUsize) -> Self {
        Self {
            principals: Arc::new(PrincipalStore::new()),
            resources: Arc::new(ResourceIndex::new()),
            policy: Arc::new(PolicyTable::new()),
            environment: Arc::new(AttributeList::new()),
            cache: DecisionCache::new(cache_capacity),
        }
    }
}

/// The decision engine.
///
/// `resolve` is safe to call from any number of threads; uploads can
/// run concurrently with resolutions and with each other. Every
/// resolution returns `Allow` or `Deny`, never an error: a principal
/// or resource without a record, a rule that was never declared, a
/// tree path without a matching branch all degrade to `Deny`.
pub struct Engine<T> {
    config: EngineConfig,
    state: RwLock<Arc<Snapshot<T>>>,
    reload: Mutex<()>,
    recording: AtomicBool,
    last_resolution_ns: AtomicU64,
}

/// Engine over plain string attribute tokens.
pub type TextEngine = Engine<String>;

/// Engine over integer-encoded attribute tokens.
pub type CodedEngine = Engine<Coded>;

impl<T: Token> Engine<T> {
    pub fn new(model: PolicyModel) -> Self {
        Self::with_config(EngineConfig::new(model))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(Arc::new(Snapshot::empty(config.cache_capacity))),
            reload: Mutex::new(()),
            recording: AtomicBool::new(false),
            last_resolution_ns: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decide whether `principal` may perform `requested` on the
    /// resource at `path`.
    pub fn resolve(&self, principal: PrincipalId, path: &str, requested: Operation) -> Decision {
        let started = if self.recording.load(Ordering::Relaxed) {
            Some(Instant::now())
        } else {
            None
        };
        let decision = self.decide(principal, path, requested);
        if let Some(started) = started {
            self.last_resolution_ns
                .store(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        }
        decision
    }

    fn decide(&self, principal: PrincipalId, path: &str, requested: Operation) -> Decision {
        // irrelevant operations never consume cache capacity
        if requested == Operation::Ignore {
            return Decision::Allow;
        }
        let snapshot = self.state.read().unwrap().clone();
        if let Some(decision) = snapshot.cache.get(principal, path) {
            return decision;
        }
        let Some(attrs) = snapshot.principals.get(principal) else {
            debug!(principal, path, "principal has no attributes; access denied");
            return Decision::Deny;
        };
        let Some(record) = snapshot.resources.get(path) else {
            debug!(principal, path, "resource has no covering policy; access denied");
            return Decision::Deny;
        };
        let decision = match record {
            ResourcePolicy::Rules(ids) => Self::match_rules(&snapshot, ids, attrs, requested),
            ResourcePolicy::Tree(tree) => tree.evaluate(attrs, &snapshot.environment, requested),
        };
        debug!(
            principal,
            path,
            requested = %requested,
            decision = %decision,
            "policy evaluated"
        );
        snapshot.cache.insert(principal, path.to_string(), decision);
        decision
    }

    /// First satisfied rule allows; an empty or exhausted set denies.
    fn match_rules(
        snapshot: &Snapshot<T>,
        ids: &[RuleId],
        attrs: &AttributeList<T>,
        requested: Operation,
    ) -> Decision {
        ids.iter()
            .any(|id| match snapshot.policy.get(*id) {
                Some(rule) => rule.satisfies(attrs, &snapshot.environment, requested),
                None => {
                    warn!(id = *id, "resource references a rule the policy never declared");
                    false
                }
            })
            .into()
    }

    /// Replace the principal store. Returns the number of principals
    /// loaded; on error the previous generation stays live.
    pub fn load_principals(&self, text: &str) -> Result<usize, UploadError> {
        let store = Arc::new(PrincipalStore::parse(text)?);
        let loaded = store.len();
        self.publish(|current| Snapshot {
            principals: store,
            resources: current.resources.clone(),
            policy: current.policy.clone(),
            environment: current.environment.clone(),
            cache: DecisionCache::new(self.config.cache_capacity),
        });
        debug!(principals = loaded, "principal store replaced");
        Ok(loaded)
    }

    /// Replace the resource index, parsing per the configured model.
    pub fn load_resources(&self, text: &str) -> Result<LoadReport, UploadError> {
        let (index, report) = ResourceIndex::parse(text, self.config.model)?;
        let index = Arc::new(index);
        self.publish(|current| Snapshot {
            principals: current.principals.clone(),
            resources: index,
            policy: current.policy.clone(),
            environment: current.environment.clone(),
            cache: DecisionCache::new(self.config.cache_capacity),
        });
        debug!(resources = report.entries, "resource index replaced");
        Ok(report)
    }

    /// Replace the flat policy table.
    pub fn load_policy(&self, text: &str) -> Result<LoadReport, UploadError> {
        let (table, report) = PolicyTable::parse(text)?;
        let table = Arc::new(table);
        self.publish(|current| Snapshot {
            principals: current.principals.clone(),
            resources: current.resources.clone(),
            policy: table,
            environment: current.environment.clone(),
            cache: DecisionCache::new(self.config.cache_capacity),
        });
        debug!(rules = report.entries, "policy table replaced");
        Ok(report)
    }

    /// Replace the environment attributes. Returns the number of
    /// attributes loaded.
    pub fn load_environment(&self, text: &str) -> Result<usize, UploadError> {
        let environment = Arc::new(parse_environment(text)?);
        let loaded = environment.len();
        self.publish(|current| Snapshot {
            principals: current.principals.clone(),
            resources: current.resources.clone(),
            policy: current.policy.clone(),
            environment,
            cache: DecisionCache::new(self.config.cache_capacity),
        });
        debug!(attributes = loaded, "environment replaced");
        Ok(loaded)
    }

    /// Publish a new generation. Parsing happened before we got here,
    /// so the write lock is held only for the pointer swap; the reload
    /// mutex keeps concurrent reloads from losing each other's parts.
    fn publish<F>(&self, rebuild: F)
    where
        F: FnOnce(&Snapshot<T>) -> Snapshot<T>,
    {
        let _reload = self.reload.lock().unwrap();
        let next = {
            let current = self.state.read().unwrap();
            rebuild(&current)
        };
        *self.state.write().unwrap() = Arc::new(next);
    }

    /// Apply a control channel signal (`RECORD` / `STOP`).
    pub fn apply_control(&self, text: &str) -> Result<ControlAction, UploadError> {
        let word = text.trim();
        let action = ControlAction::from_str(word)
            .map_err(|_| UploadError::malformed(format!("unknown control action '{word}'")))?;
        match action {
            ControlAction::Record => self.start_recording(),
            ControlAction::Stop => self.stop_recording(),
        }
        Ok(action)
    }

    pub fn start_recording(&self) {
        self.last_resolution_ns.store(0, Ordering::Relaxed);
        self.recording.store(true, Ordering::Relaxed);
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::Relaxed);
        self.last_resolution_ns.store(0, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Duration in nanoseconds of the most recently completed
    /// resolution while recording was active.
    pub fn last_resolution_ns(&self) -> u64 {
        self.last_resolution_ns.load(Ordering::Relaxed)
    }

    /// Hit/miss counts of the current generation's cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.state.read().unwrap().cache.stats()
    }
}
