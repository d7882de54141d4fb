//! # Dependency Resolution
//!
//! Orders the modules of a workspace so dependencies come before their
//! dependents.
//!
//! 1.  **Post-order traversal**: each member is visited in declaration order;
//!     a module's dependencies are visited, in declaration order, before the
//!     module is appended.
//!
//! 2.  **Visit states**: a module is either in progress (on the current
//!     path) or done. Reaching a done module again is a no-op, so a diamond
//!     dependency appears once. Reaching an in-progress module is a cycle.
//!
//! 3.  **Lookup**: a dependency identity names a sibling member first. If no
//!     member has that identity it is looked up in the lock file of the
//!     member the traversal started from, then in the module cache. Two
//!     locks pinning the same identity to different commits is an error.

use std::collections::HashMap;

use log::debug;

use crate::cache::ModuleCache;
use crate::config::{LockFile, ModuleIdentity, ModulePin};
use crate::error::{Error, Result};
use crate::module::Module;

/// A node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum NodeKey {
    /// A workspace member, by index.
    Member(usize),
    /// A module served by the cache.
    External(ModuleIdentity),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

/// The outcome of resolution.
#[derive(Debug)]
pub(crate) struct Resolution {
    /// Every reachable node, dependencies first.
    pub order: Vec<NodeKey>,
    /// External modules fetched along the way.
    pub externals: HashMap<ModuleIdentity, Module>,
    /// The commit each external module was fetched at.
    pins: HashMap<ModuleIdentity, ModulePin>,
}

impl Resolution {
    /// The module for `key`.
    pub fn module<'a>(&'a self, members: &'a [Module], key: &NodeKey) -> Option<&'a Module> {
        match key {
            NodeKey::Member(index) => members.get(*index),
            NodeKey::External(identity) => self.externals.get(identity),
        }
    }
}

pub(crate) struct Resolver<'a, L> {
    members: &'a [Module],
    labels: Vec<String>,
    member_index: HashMap<ModuleIdentity, usize>,
    cache: &'a dyn ModuleCache,
    load_lock: L,
    locks: HashMap<usize, LockFile>,
    states: HashMap<NodeKey, VisitState>,
    path: Vec<NodeKey>,
    resolution: Resolution,
}

impl<'a, L> Resolver<'a, L>
where
    L: FnMut(usize) -> Result<LockFile>,
{
    /// `load_lock` reads the lock file of a member. It is called at most
    /// once per member, and only if that member needs an external module.
    pub fn new(members: &'a [Module], cache: &'a dyn ModuleCache, load_lock: L) -> Result<Self> {
        let mut member_index = HashMap::new();
        for (index, module) in members.iter().enumerate() {
            if let Some(identity) = module.identity() {
                if member_index.insert(identity.clone(), index).is_some() {
                    return Err(Error::config(format!(
                        "module name {} is used by more than one workspace member",
                        identity
                    )));
                }
            }
        }
        Ok(Self {
            members,
            labels: Vec::new(),
            member_index,
            cache,
            load_lock,
            locks: HashMap::new(),
            states: HashMap::new(),
            path: Vec::new(),
            resolution: Resolution {
                order: Vec::new(),
                externals: HashMap::new(),
                pins: HashMap::new(),
            },
        })
    }

    /// Names unnamed members by `labels` (their directories) in messages.
    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Resolves every member and everything reachable from it.
    pub fn resolve(mut self) -> Result<Resolution> {
        for index in 0..self.members.len() {
            self.visit(NodeKey::Member(index), index)?;
        }
        debug!("Resolved {} modules", self.resolution.order.len());
        Ok(self.resolution)
    }

    /// Visits `key`, whose external dependencies are pinned by the lock of
    /// member `root`.
    fn visit(&mut self, key: NodeKey, root: usize) -> Result<()> {
        match self.states.get(&key) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => {
                let start = self.path.iter().position(|entry| *entry == key).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|entry| self.name(entry)).collect();
                cycle.push(self.name(&key));
                return Err(Error::DependencyCycle {
                    cycle: cycle.join(" -> "),
                });
            }
            None => {}
        }

        self.states.insert(key.clone(), VisitState::InProgress);
        self.path.push(key.clone());

        let dependencies = self
            .resolution
            .module(self.members, &key)
            .map(|module| module.dependencies().to_vec())
            .unwrap_or_default();

        for dependency in dependencies {
            let child = match self.member_index.get(&dependency) {
                Some(index) => NodeKey::Member(*index),
                None => {
                    self.fetch(&key, &dependency, root)?;
                    NodeKey::External(dependency)
                }
            };
            self.visit(child, root)?;
        }

        self.path.pop();
        self.states.insert(key.clone(), VisitState::Done);
        self.resolution.order.push(key);
        Ok(())
    }

    /// Makes sure the external module `dependency` is loaded at the commit
    /// pinned by the lock of member `root`.
    fn fetch(&mut self, dependent: &NodeKey, dependency: &ModuleIdentity, root: usize) -> Result<()> {
        if !self.locks.contains_key(&root) {
            let lock = (self.load_lock)(root)?;
            self.locks.insert(root, lock);
        }
        let pin = self
            .locks
            .get(&root)
            .and_then(|lock| lock.pin(dependency))
            .cloned();

        let unresolved = |hint: String| Error::UnresolvedDependency {
            module: self.name(dependent),
            dependency: dependency.to_string(),
            hint: Some(hint),
        };
        let pin = pin.ok_or_else(|| {
            unresolved(format!(
                "add it to the workspace or pin it in {} of {}",
                crate::defaults::LOCK_FILE,
                self.name(&NodeKey::Member(root))
            ))
        })?;
        if let Some(fetched) = self.resolution.pins.get(dependency) {
            if fetched.commit == pin.commit {
                return Ok(());
            }
            return Err(Error::config(format!(
                "dependency {} is locked at both {} and {}",
                dependency, fetched.commit, pin.commit
            )));
        }
        let module = self
            .cache
            .get_module(&pin)?
            .ok_or_else(|| unresolved(format!("commit {} is not in the module cache", pin.commit)))?;

        debug!("Using cached module {}:{}", pin.identity, pin.commit);
        self.resolution.externals.insert(dependency.clone(), module);
        self.resolution.pins.insert(dependency.clone(), pin);
        Ok(())
    }

    fn name(&self, key: &NodeKey) -> String {
        match key {
            NodeKey::Member(index) => match self.members.get(*index) {
                Some(module) if module.identity().is_some() => module.display_name(),
                _ => self
                    .labels
                    .get(*index)
                    .cloned()
                    .unwrap_or_else(|| format!("member {}", index)),
            },
            NodeKey::External(identity) => identity.to_string(),
        }
    }
}
