// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use colored::Colorize;
use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::format::{FormatChange, FormatChangeOptions};
use conc_schema::foundation::name::{PkgName, PkgNameBuf};
use conc_schema::foundation::version::Compatibility;
use conc_schema::{InclusionPolicy, NodeAttrs, NodeKey, PkgRequest, RequestedBy, ResolvedNodes};
use conc_solve_package_iterator::CandidateIterator;
use conc_solve_solution::{Solution, SolvedNode};
use miette::Diagnostic;
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::error::{
    GetCurrentResolveError,
    GetCurrentResolveResult,
    GetMergedRequestError,
    GetMergedRequestResult,
};

#[cfg(test)]
#[path = "./graph_test.rs"]
mod graph_test;

pub static DEAD_STATE: Lazy<Arc<State>> = Lazy::new(State::default);

const BRANCH_ALREADY_ATTEMPTED: &str = "Branch already attempted";

#[derive(Diagnostic, Debug, Error)]
pub enum GraphError {
    #[error("Recursion error: {0}")]
    RecursionError(&'static str),
    #[error(transparent)]
    #[diagnostic(forward(0))]
    RequestError(#[from] GetMergedRequestError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Clone, Debug)]
pub enum Change {
    RequestPackage(RequestPackage),
    SetPackage(Box<SetPackage>),
    SetProvider(SetProvider),
    StepBack(StepBack),
}

impl Change {
    pub fn apply(&self, parent: &Arc<State>, base: &Arc<State>) -> Arc<State> {
        match self {
            Change::RequestPackage(rp) => rp.apply(parent, base),
            Change::SetPackage(sp) => sp.apply(parent, base),
            Change::SetProvider(sp) => sp.apply(parent, base),
            Change::StepBack(sb) => sb.apply(parent, base),
        }
    }

    pub fn as_decision(&self) -> Decision {
        Decision {
            changes: vec![self.clone()],
            notes: Vec::default(),
        }
    }

    fn get_request_change_label(level: u64) -> &'static str {
        if level == 0 {
            "INITIAL REQUEST"
        } else {
            "REQUEST"
        }
    }
}

impl FormatChange for Change {
    type State = State;

    fn format_change(
        &self,
        format_settings: &FormatChangeOptions,
        state: Option<&Self::State>,
    ) -> String {
        use Change::*;
        match self {
            RequestPackage(c) => {
                format!(
                    "{} {}",
                    Self::get_request_change_label(format_settings.level).blue(),
                    c.request
                )
            }
            SetPackage(c) => {
                if format_settings.verbosity > 0 {
                    // Show who asked for it along with the resolved node
                    let requested_by: Vec<String> = match state {
                        Some(s) => match s.get_merged_request(&c.node.key) {
                            Ok(r) => r.get_requesters().iter().map(ToString::to_string).collect(),
                            Err(_) => vec![RequestedBy::DoesNotMatter.to_string()],
                        },
                        None => vec![RequestedBy::DoesNotMatter.to_string()],
                    };
                    format!(
                        "{} {} [{}]  (requested by {})",
                        "RESOLVE".green(),
                        c.node,
                        c.node.source,
                        requested_by.join(", ")
                    )
                } else {
                    format!("{} {}", "RESOLVE".green(), c.node)
                }
            }
            SetProvider(c) => {
                format!(
                    "{} {} => {}",
                    "PROVIDER".cyan(),
                    c.virtual_name,
                    c.provider
                )
            }
            StepBack(c) => {
                format!("{} {}", "BLOCKED".red(), c.cause)
            }
        }
    }
}

/// The decision represents a choice made by the solver.
///
/// Each decision connects one state to another in the graph.
#[derive(Clone, Debug)]
pub struct Decision {
    pub changes: Vec<Change>,
    pub notes: Vec<Note>,
}

impl Decision {
    pub fn builder(base: &State) -> DecisionBuilder<'_> {
        DecisionBuilder::new(base)
    }

    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            changes,
            notes: Vec::default(),
        }
    }

    pub fn apply(&self, base: &Arc<State>) -> Arc<State> {
        let mut state = None;
        for change in self.changes.iter() {
            state = Some(change.apply(base, state.as_ref().unwrap_or(base)));
        }
        state.unwrap_or_else(|| Arc::clone(base))
    }

    pub fn add_notes(&mut self, notes: impl IntoIterator<Item = Note>) {
        self.notes.extend(notes)
    }
}

pub struct DecisionBuilder<'state> {
    base: &'state State,
}

impl<'state> DecisionBuilder<'state> {
    pub fn new(base: &'state State) -> Self {
        Self { base }
    }

    /// Create a new decision to add a configured node to the resolve.
    ///
    /// `requests` are the dependencies of the node and `providers`
    /// the virtual packages that it pins to a provider.
    pub fn resolve_package(
        self,
        node: &Arc<SolvedNode>,
        requests: Vec<PkgRequest>,
        providers: Vec<(PkgNameBuf, PkgNameBuf)>,
    ) -> Decision {
        let mut changes = vec![Change::SetPackage(Box::new(SetPackage::new(Arc::clone(
            node,
        ))))];
        changes.extend(self.providers_to_changes(providers));
        changes.extend(
            requests
                .into_iter()
                .map(|request| Change::RequestPackage(RequestPackage::new(request))),
        );
        Decision::new(changes)
    }

    /// Create a new decision to satisfy a virtual with one provider.
    ///
    /// The provider is requested with the constraints that were
    /// placed on the virtual, apart from its versions.
    pub fn choose_provider(
        self,
        virtual_name: PkgNameBuf,
        provider: PkgNameBuf,
        request: PkgRequest,
    ) -> Decision {
        let mut changes = self.providers_to_changes(vec![(virtual_name, provider)]);
        changes.push(Change::RequestPackage(RequestPackage::new(request)));
        Decision::new(changes)
    }

    fn providers_to_changes(&self, providers: Vec<(PkgNameBuf, PkgNameBuf)>) -> Vec<Change> {
        providers
            .into_iter()
            .filter(|(virtual_name, provider)| {
                self.base
                    .get_provider(virtual_name)
                    .map(|existing| existing == provider)
                    != Some(true)
            })
            .map(|(virtual_name, provider)| {
                Change::SetProvider(SetProvider::new(virtual_name, provider))
            })
            .collect()
    }
}

type NodeIterator = Arc<tokio::sync::Mutex<Box<dyn CandidateIterator>>>;

#[derive(Clone, Debug)]
pub struct Graph {
    pub root: Arc<tokio::sync::RwLock<Arc<Node>>>,
    pub nodes: HashMap<u64, Arc<tokio::sync::RwLock<Arc<Node>>>>,
}

impl Graph {
    pub fn new() -> Self {
        let dead_state = Arc::clone(&*DEAD_STATE);
        let dead_state_id = dead_state.id();
        let dead_state = Arc::new(tokio::sync::RwLock::new(Arc::new(Node::new(dead_state))));
        let nodes = [(dead_state_id, dead_state.clone())]
            .iter()
            .cloned()
            .collect();
        Graph {
            root: dead_state,
            nodes,
        }
    }

    /// Record a decision made from the node with `source_id`,
    /// returning the node for the resulting state.
    ///
    /// # Errors
    /// - [`GraphError::RecursionError`] if the decision was already
    ///   taken from this node
    pub async fn add_branch(
        &mut self,
        source_id: u64,
        decision: Arc<Decision>,
    ) -> Result<Arc<tokio::sync::RwLock<Arc<Node>>>> {
        let Some(old_node) = self.nodes.get(&source_id).cloned() else {
            return Err(GraphError::RecursionError("source state is not in the graph"));
        };
        let new_state = decision.apply(&(old_node.read().await.state));
        let mut new_node = Arc::new(tokio::sync::RwLock::new(Arc::new(Node::new(new_state))));
        {
            let mut new_node_lock = new_node.write().await;

            match self.nodes.get(&new_node_lock.id()) {
                None => {
                    self.nodes.insert(new_node_lock.id(), new_node.clone());
                    for (key, iterator) in old_node.read().await.iterators.iter() {
                        Arc::make_mut(&mut new_node_lock)
                            .set_iterator(key.clone(), iterator)
                            .await
                    }
                }
                Some(node) => {
                    drop(new_node_lock);
                    new_node = node.clone();
                }
            }
        }

        // Don't record `StepBack` changes into the graph. Doing so will
        // preclude revisiting a `Node` that has unvisited child states.
        let is_step_back =
            matches!(decision.changes.as_slice(), [Change::StepBack(_)]);
        if !is_step_back {
            let mut old_node_lock = old_node.write().await;
            // Avoid deadlock if old_node is the same node as new_node
            if !Arc::ptr_eq(&old_node, &new_node) {
                let mut new_node_lock = new_node.write().await;
                Arc::make_mut(&mut old_node_lock)
                    .add_output(decision.clone(), &new_node_lock.state)?;
                Arc::make_mut(&mut new_node_lock).add_input(&old_node_lock.state, decision);
            } else {
                let old_state = old_node_lock.state.clone();
                Arc::make_mut(&mut old_node_lock).add_output(decision.clone(), &old_state)?;
                Arc::make_mut(&mut old_node_lock).add_input(&old_state, decision);
            }
        }
        Ok(new_node)
    }

    /// The number of distinct states visited
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    inputs: HashSet<u64>,
    // Preserve order of outputs for reporting in the same order.
    outputs: HashSet<u64>,
    outputs_decisions: Vec<Arc<Decision>>,
    pub state: Arc<State>,
    iterators: HashMap<NodeKey, NodeIterator>,
}

impl Node {
    pub fn add_input(&mut self, state: &State, _decision: Arc<Decision>) {
        self.inputs.insert(state.id());
    }

    pub fn add_output(&mut self, decision: Arc<Decision>, state: &State) -> Result<()> {
        if self.outputs.contains(&state.id()) {
            return Err(GraphError::RecursionError(BRANCH_ALREADY_ATTEMPTED));
        }
        self.outputs.insert(state.id());
        self.outputs_decisions.push(decision);
        Ok(())
    }

    /// The number of distinct states that lead to this one
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// The decisions taken from this node so far, in order
    pub fn outputs(&self) -> &[Arc<Decision>] {
        &self.outputs_decisions
    }

    pub fn get_iterator(&self, key: &NodeKey) -> Option<NodeIterator> {
        self.iterators.get(key).cloned()
    }

    pub fn new(state: Arc<State>) -> Self {
        Node {
            inputs: HashSet::default(),
            outputs: HashSet::default(),
            outputs_decisions: Vec::default(),
            state,
            iterators: HashMap::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.state.id()
    }

    /// Store a copy of an iterator so that this node resumes
    /// from the same position, independently of the original.
    pub async fn set_iterator(&mut self, key: NodeKey, iterator: &NodeIterator) {
        if self.iterators.contains_key(&key) {
            tracing::error!("iterator already exists [INTERNAL ERROR]");
            debug_assert!(false, "iterator already exists [INTERNAL ERROR]");
        }
        let copy = iterator.lock().await.clone();
        self.iterators
            .insert(key, Arc::new(tokio::sync::Mutex::new(copy)));
    }
}

/// Some additional information left by the solver
#[derive(Clone, Debug)]
pub enum Note {
    SkipPackageNote(SkipPackageNote),
    Other(String),
}

impl std::fmt::Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Note::SkipPackageNote(note) => note.fmt(f),
            Note::Other(message) => message.fmt(f),
        }
    }
}

/// A candidate that the solver looked at and rejected.
#[derive(Clone, Debug)]
pub struct SkipPackageNote {
    pub candidate: String,
    pub reason: String,
}

impl SkipPackageNote {
    pub fn new<C: ToString>(candidate: C, reason: &Compatibility) -> Self {
        SkipPackageNote {
            candidate: candidate.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn new_from_message<C: ToString, S: ToString>(candidate: C, reason: S) -> Self {
        SkipPackageNote {
            candidate: candidate.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for SkipPackageNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} - {}", "TRY".magenta(), self.candidate, self.reason)
    }
}

#[derive(Clone, Debug)]
pub struct RequestPackage {
    pub request: PkgRequest,
}

impl RequestPackage {
    pub fn new(request: PkgRequest) -> Self {
        RequestPackage { request }
    }

    pub fn apply(&self, parent: &Arc<State>, base: &Arc<State>) -> Arc<State> {
        let mut cloned_request = Some(self.request.clone());
        let mut new_requests = base
            .pkg_requests
            .iter()
            .cloned()
            .map(|existing_request| {
                let Some(request) = cloned_request.take() else {
                    return existing_request;
                };
                if existing_request.key != request.key {
                    cloned_request = Some(request);
                    return existing_request;
                }
                // merge into the existing request, keeping its place
                let mut merged = (**existing_request).clone();
                match merged.restrict(&request) {
                    Ok(_) => Arc::new(merged.into()),
                    Err(_) => {
                        // Keep it separate, the conflict is reported
                        // when the merged request is next needed
                        cloned_request = Some(request);
                        existing_request
                    }
                }
            })
            .collect::<Vec<_>>();

        if let Some(request) = cloned_request {
            // No request could be merged with; append.
            //
            // Requests for the same package are moved to the front
            // so that a package wanted by several dependents is
            // resolved sooner rather than later. The sort is stable.
            new_requests.sort_by_cached_key(|req| req.key.name != request.key.name);
            new_requests.push(Arc::new(request.into()));
        }

        Arc::new(base.with_pkg_requests(parent, new_requests))
    }
}

#[derive(Clone, Debug)]
pub struct SetPackage {
    pub node: Arc<SolvedNode>,
}

impl SetPackage {
    pub fn new(node: Arc<SolvedNode>) -> Self {
        SetPackage { node }
    }

    pub fn apply(&self, parent: &Arc<State>, base: &Arc<State>) -> Arc<State> {
        Arc::new(base.append_package(Some(parent), Arc::clone(&self.node)))
    }
}

/// Satisfies a virtual package with a concrete one.
#[derive(Clone, Debug)]
pub struct SetProvider {
    pub virtual_name: PkgNameBuf,
    pub provider: PkgNameBuf,
}

impl SetProvider {
    pub fn new(virtual_name: PkgNameBuf, provider: PkgNameBuf) -> Self {
        SetProvider {
            virtual_name,
            provider,
        }
    }

    pub fn apply(&self, parent: &Arc<State>, base: &Arc<State>) -> Arc<State> {
        Arc::new(base.with_provider(
            parent,
            self.virtual_name.clone(),
            self.provider.clone(),
        ))
    }
}

#[derive(Clone, Debug)]
struct StateId {
    pkg_requests_hash: u64,
    packages_hash: u64,
    providers_hash: u64,
    full_hash: u64,
}

impl StateId {
    #[inline]
    fn id(&self) -> u64 {
        self.full_hash
    }

    pub fn new(pkg_requests_hash: u64, packages_hash: u64, providers_hash: u64) -> Self {
        let full_hash = {
            let mut hasher = DefaultHasher::new();
            pkg_requests_hash.hash(&mut hasher);
            packages_hash.hash(&mut hasher);
            providers_hash.hash(&mut hasher);
            hasher.finish()
        };
        Self {
            pkg_requests_hash,
            packages_hash,
            providers_hash,
            full_hash,
        }
    }

    fn pkg_requests_hash(pkg_requests: &Vec<Arc<CachedHash<PkgRequest>>>) -> u64 {
        let mut hasher = DefaultHasher::new();
        pkg_requests.hash(&mut hasher);
        hasher.finish()
    }

    fn packages_hash(packages: &StatePackages) -> u64 {
        let mut hasher = DefaultHasher::new();
        for node in packages.values() {
            node.hash(&mut hasher);
        }
        hasher.finish()
    }

    fn providers_hash(providers: &BTreeMap<PkgNameBuf, PkgNameBuf>) -> u64 {
        let mut hasher = DefaultHasher::new();
        providers.hash(&mut hasher);
        hasher.finish()
    }

    fn with_pkg_requests(&self, pkg_requests: &Vec<Arc<CachedHash<PkgRequest>>>) -> Self {
        Self::new(
            StateId::pkg_requests_hash(pkg_requests),
            self.packages_hash,
            self.providers_hash,
        )
    }

    fn with_packages(&self, packages: &StatePackages) -> Self {
        Self::new(
            self.pkg_requests_hash,
            StateId::packages_hash(packages),
            self.providers_hash,
        )
    }

    fn with_providers(&self, providers: &BTreeMap<PkgNameBuf, PkgNameBuf>) -> Self {
        Self::new(
            self.pkg_requests_hash,
            self.packages_hash,
            StateId::providers_hash(providers),
        )
    }
}

/// For caching the hash of a request or node.
///
/// Hashing these represents a significant portion of solver runtime.
#[derive(Clone, Debug)]
pub struct CachedHash<T> {
    object: T,
    hash: u64,
}

impl<T> std::ops::Deref for CachedHash<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T: Hash> From<T> for CachedHash<T> {
    fn from(object: T) -> Self {
        let mut hasher = DefaultHasher::new();
        object.hash(&mut hasher);
        let hash = hasher.finish();

        Self { object, hash }
    }
}

impl<T> std::hash::Hash for CachedHash<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

type StatePackages = Arc<BTreeMap<NodeKey, CachedHash<Arc<SolvedNode>>>>;

// `State` is immutable. It should not derive Clone.
#[derive(Debug)]
pub struct State {
    pkg_requests: Arc<Vec<Arc<CachedHash<PkgRequest>>>>,
    packages: StatePackages,
    // This is a list of the packages in the order they were added to the
    // state. It does not contribute to the state id.
    packages_in_solve_order: Arc<Vec<Arc<SolvedNode>>>,
    providers: Arc<BTreeMap<PkgNameBuf, PkgNameBuf>>,
    state_id: StateId,
    // How deep is this state?
    pub state_depth: u64,
}

impl State {
    pub fn new(pkg_requests: Vec<PkgRequest>, packages: Vec<Arc<SolvedNode>>) -> Arc<Self> {
        let pkg_requests = pkg_requests
            .into_iter()
            .map(|el| Arc::new(el.into()))
            .collect();
        let providers = BTreeMap::new();
        let state_id = StateId::new(
            StateId::pkg_requests_hash(&pkg_requests),
            0,
            StateId::providers_hash(&providers),
        );
        let mut s = State {
            pkg_requests: Arc::new(pkg_requests),
            packages: Arc::new(BTreeMap::new()),
            packages_in_solve_order: Arc::new(Vec::new()),
            providers: Arc::new(providers),
            state_id,
            state_depth: 0,
        };
        for package in packages.into_iter() {
            s = s.append_package(None, package)
        }
        Arc::new(s)
    }

    pub fn default() -> Arc<Self> {
        State::new(Vec::default(), Vec::default())
    }

    /// Collect the resolved nodes and chosen providers.
    pub fn as_solution(&self, roots: Vec<NodeKey>) -> Solution {
        let mut solution = Solution::new(roots);
        for node in self.packages.values() {
            solution.add(Arc::clone(node));
        }
        for (virtual_name, provider) in self.providers.iter() {
            solution.set_provider(virtual_name.clone(), provider.clone());
        }
        solution
    }

    pub fn get_current_resolve(&self, key: &NodeKey) -> GetCurrentResolveResult<&Arc<SolvedNode>> {
        self.packages.get(key).map(|n| &**n).ok_or_else(|| {
            GetCurrentResolveError::PackageNotResolved(format!("Has not been resolved: '{key}'"))
        })
    }

    /// Combine every request that applies to the given node.
    ///
    /// A node split off for one dependent is also bound by the
    /// optional requests made for the package as a whole.
    pub fn get_merged_request(&self, key: &NodeKey) -> GetMergedRequestResult<PkgRequest> {
        let applies = |request: &PkgRequest| {
            request.key == *key
                || (key.is_split()
                    && request.key.name == key.name
                    && !request.key.is_split()
                    && request.inclusion_policy == InclusionPolicy::IfAlreadyPresent)
        };
        let mut merged: Option<PkgRequest> = None;
        for request in self.pkg_requests.iter() {
            if !applies(request) {
                continue;
            }
            match merged.as_mut() {
                None => {
                    let mut first = (***request).clone();
                    first.key = key.clone();
                    merged = Some(first);
                }
                Some(merged) => {
                    merged
                        .restrict(request)
                        .map_err(|source| GetMergedRequestError::Conflict {
                            key: key.to_string(),
                            source,
                        })?;
                }
            }
        }
        merged.ok_or_else(|| {
            GetMergedRequestError::NoRequestFor(format!("No requests for '{key}' [INTERNAL ERROR]"))
        })
    }

    /// The merged request for the next node to resolve, if any remain.
    ///
    /// Requests for resolved nodes, for virtuals that already have a
    /// provider, and requests that only apply if the package is
    /// brought in by something else are passed over.
    pub fn get_next_request(&self) -> GetMergedRequestResult<Option<PkgRequest>> {
        for request in self.pkg_requests.iter() {
            if self.packages.contains_key(&request.key) {
                continue;
            }
            if !request.key.is_split() && self.providers.contains_key(&request.key.name) {
                continue;
            }
            if request.inclusion_policy == InclusionPolicy::IfAlreadyPresent {
                // This will be picked up by get_merged_request if
                // something else requires the package.
                continue;
            }
            return Ok(Some(self.get_merged_request(&request.key)?));
        }

        Ok(None)
    }

    /// Optional requests from the solver's own input for packages
    /// that never became part of the resolve.
    pub fn unmet_dependency_requests(&self) -> Vec<PkgRequest> {
        let mut seen = BTreeSet::new();
        self.pkg_requests
            .iter()
            .filter(|r| r.inclusion_policy == InclusionPolicy::IfAlreadyPresent)
            .filter(|r| r.get_requesters().contains(&RequestedBy::CommandLine))
            .filter(|r| !self.providers.contains_key(&r.key.name))
            .filter(|r| !self.packages.keys().any(|k| k.name == r.key.name))
            .filter(|r| seen.insert(r.key.clone()))
            .map(|r| (***r).clone())
            .collect()
    }

    pub fn get_pkg_requests(&self) -> &Vec<Arc<CachedHash<PkgRequest>>> {
        &self.pkg_requests
    }

    pub fn get_ordered_resolved_packages(&self) -> &Arc<Vec<Arc<SolvedNode>>> {
        &self.packages_in_solve_order
    }

    pub fn get_resolved_packages(&self) -> &BTreeMap<NodeKey, CachedHash<Arc<SolvedNode>>> {
        &self.packages
    }

    #[inline]
    pub fn get_resolved_packages_hash(&self) -> u64 {
        self.state_id.packages_hash
    }

    /// The package chosen to satisfy a virtual, if any
    pub fn get_provider(&self, virtual_name: &PkgName) -> Option<&PkgName> {
        self.providers.get(virtual_name).map(|p| p.as_ref())
    }

    pub fn get_providers(&self) -> &BTreeMap<PkgNameBuf, PkgNameBuf> {
        &self.providers
    }

    /// The names of every resolved package
    pub fn resolved_names(&self) -> BTreeSet<PkgNameBuf> {
        self.packages.keys().map(|k| k.name.clone()).collect()
    }

    /// The node that a dependency edge leads to, once any virtual
    /// has been given a provider.
    pub fn edge_target(&self, edge: &conc_solve_solution::SolvedEdge) -> Option<NodeKey> {
        if !edge.is_virtual() {
            return Some(edge.target.clone());
        }
        self.get_provider(&edge.target.name)
            .map(|provider| NodeKey::new(provider.to_owned()))
    }

    /// Find a chain of dependencies from one node to another
    /// through the resolved nodes, both ends included.
    pub fn dependency_path(&self, from: &NodeKey, to: &NodeKey) -> Option<Vec<NodeKey>> {
        let mut visited = BTreeSet::new();
        let mut path = vec![from.clone()];
        if self.search_path(from, to, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    fn search_path(
        &self,
        current: &NodeKey,
        to: &NodeKey,
        visited: &mut BTreeSet<NodeKey>,
        path: &mut Vec<NodeKey>,
    ) -> bool {
        if current == to {
            return true;
        }
        if !visited.insert(current.clone()) {
            return false;
        }
        let Some(node) = self.packages.get(current) else {
            return false;
        };
        for edge in node.dependencies.iter() {
            let Some(next) = self.edge_target(edge) else {
                continue;
            };
            path.push(next.clone());
            if self.search_path(&next, to, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }

    fn append_package(&self, parent: Option<&Arc<Self>>, node: Arc<SolvedNode>) -> Self {
        let mut packages_in_solve_order = Arc::clone(&self.packages_in_solve_order);
        Arc::make_mut(&mut packages_in_solve_order).push(Arc::clone(&node));
        let mut packages = Arc::clone(&self.packages);
        Arc::make_mut(&mut packages).insert(node.key.clone(), node.into());
        let state_id = self.state_id.with_packages(&packages);
        Self {
            pkg_requests: Arc::clone(&self.pkg_requests),
            packages,
            packages_in_solve_order,
            providers: Arc::clone(&self.providers),
            state_id,
            state_depth: parent.as_ref().map(|p| p.state_depth + 1).unwrap_or(0),
        }
    }

    fn with_pkg_requests(
        &self,
        parent: &Self,
        pkg_requests: Vec<Arc<CachedHash<PkgRequest>>>,
    ) -> Self {
        let state_id = self.state_id.with_pkg_requests(&pkg_requests);
        Self {
            pkg_requests: Arc::new(pkg_requests),
            packages: Arc::clone(&self.packages),
            packages_in_solve_order: Arc::clone(&self.packages_in_solve_order),
            providers: Arc::clone(&self.providers),
            state_id,
            state_depth: parent.state_depth + 1,
        }
    }

    fn with_provider(&self, parent: &Self, virtual_name: PkgNameBuf, provider: PkgNameBuf) -> Self {
        let mut providers = Arc::clone(&self.providers);
        Arc::make_mut(&mut providers).insert(virtual_name, provider);
        let state_id = self.state_id.with_providers(&providers);
        Self {
            pkg_requests: Arc::clone(&self.pkg_requests),
            packages: Arc::clone(&self.packages),
            packages_in_solve_order: Arc::clone(&self.packages_in_solve_order),
            providers,
            state_id,
            state_depth: parent.state_depth + 1,
        }
    }

    pub fn id(&self) -> u64 {
        self.state_id.id()
    }
}

impl ResolvedNodes for State {
    fn resolved<'a>(&'a self, name: &PkgName) -> Vec<(&'a NodeAttrs, Option<&'a Digest>)> {
        self.packages
            .values()
            .filter(|node| node.name() == name)
            .map(|node| (&node.attrs, node.source.installed_hash()))
            .collect()
    }
}

#[derive(Clone, Debug)]
pub struct StepBack {
    pub cause: String,
    pub destination: Arc<State>,
    // For counting the number of StepBack apply() calls
    global_counter: Arc<AtomicU64>,
}

impl StepBack {
    pub fn new(cause: impl Into<String>, to: &Arc<State>, global_counter: Arc<AtomicU64>) -> Self {
        StepBack {
            cause: cause.into(),
            destination: Arc::clone(to),
            global_counter,
        }
    }

    pub fn apply(&self, _parent: &Arc<State>, _base: &Arc<State>) -> Arc<State> {
        // Increment the counter before restoring the state
        self.global_counter.fetch_add(1, Ordering::SeqCst);
        Arc::clone(&self.destination)
    }
}
