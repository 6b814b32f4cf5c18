// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_stream::stream;
use conc_config::{Config, ReusePolicy, UnifyPolicy};
use conc_schema::foundation::digest::Digest;
use conc_schema::foundation::format::{FormatChange, FormatChangeOptions};
use conc_schema::foundation::name::{PkgName, PkgNameBuf};
use conc_schema::foundation::version::Compatibility;
use conc_schema::foundation::version_range::VersionList;
use conc_schema::{
    AbstractSpec,
    ConcreteSpec,
    Constraints,
    NodeAttrs,
    NodeKey,
    PackageDefinition,
    PkgRequest,
    RequestedBy,
};
use conc_solve_graph::{
    Change,
    DEAD_STATE,
    Decision,
    Graph,
    Node,
    Note,
    RequestPackage,
    SkipPackageNote,
    State,
    StepBack,
};
use conc_solve_package_iterator::{
    BuildIterator,
    Candidate,
    CandidateIterator,
    ExternalIterator,
    NodeCandidates,
    ProviderIterator,
    ReuseIterator,
};
use conc_solve_solution::{CycleDetectedError, PackageSource, Solution, SolvedEdge, SolvedNode};
use conc_solve_validation::{ValidatorT, Validators, default_validators, validate_provider};
use conc_storage::{ConstraintSource, InstalledIndex, UnknownPackageError};
use futures::{Stream, TryStreamExt};
use itertools::Itertools;
use priority_queue::priority_queue::PriorityQueue;

use crate::error::{OutOfOptions, UnsatisfiableConstraintError};
use crate::{Error, Result};

#[cfg(test)]
#[path = "./solver_test.rs"]
mod solver_test;

type NodeIterator = Arc<tokio::sync::Mutex<Box<dyn CandidateIterator>>>;

/// Turns abstract specs into a fully configured dependency graph.
///
/// The search moves through immutable states, one decision at a
/// time, and steps back to the most recent choice point whenever
/// a request runs out of acceptable candidates.
#[derive(Clone)]
pub struct Solver {
    source: Arc<dyn ConstraintSource>,
    installed: Option<Arc<dyn InstalledIndex>>,
    config: Arc<Config>,
    initial_state_builders: Vec<Change>,
    roots: Vec<NodeKey>,
    validators: Cow<'static, [Validators]>,
    timeout: Option<Duration>,
    interrupted: Arc<AtomicBool>,
    // For counting the number of steps (forward) taken in a solve
    number_of_steps: usize,
    // For counting the candidates rejected for some reason
    number_candidates_skipped: usize,
    // For counting the total number of candidates examined
    number_total_candidates: usize,
    // For counting the number of StepBacks applied during the solve
    number_of_steps_back: Arc<AtomicU64>,
    // For accumulating the frequency of error messages generated
    // during the solve. Used in end-of-solve stats and to explain
    // an unsatisfiable request.
    error_frequency: HashMap<String, u64>,
    // For counting the number of times packages are involved in
    // blocked requests for other packages during the search.
    problem_packages: HashMap<String, u64>,
}

impl Solver {
    /// Create a solver that reads definitions from the given source.
    pub fn new<S>(source: S) -> Self
    where
        S: ConstraintSource + 'static,
    {
        Self {
            source: Arc::new(source),
            installed: None,
            config: Arc::new(Config::default()),
            initial_state_builders: Vec::default(),
            roots: Vec::default(),
            validators: Cow::from(default_validators()),
            timeout: None,
            interrupted: Arc::new(AtomicBool::new(false)),
            number_of_steps: 0,
            number_candidates_skipped: 0,
            number_total_candidates: 0,
            number_of_steps_back: Arc::new(AtomicU64::new(0)),
            error_frequency: HashMap::new(),
            problem_packages: HashMap::new(),
        }
    }

    /// Use these preferences and policies for every following solve.
    pub fn set_config(&mut self, config: Arc<Config>) {
        self.config = config;
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Offer existing installations from this index, subject to
    /// the configured reuse policy.
    pub fn set_installed_index(&mut self, index: Arc<dyn InstalledIndex>) {
        self.installed = Some(index);
    }

    /// Override the configured timeout of the solve.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Add a root to concretize.
    ///
    /// The named package is always resolved, each `^dependency` only
    /// constrains that package if something pulls it in.
    pub fn add_request(&mut self, spec: AbstractSpec) -> Result<()> {
        let Some(name) = spec.name.clone() else {
            return Err(Error::String(format!(
                "cannot concretize an anonymous spec: '{spec}'"
            )));
        };
        for request in PkgRequest::from_spec(&spec, RequestedBy::CommandLine) {
            self.initial_state_builders
                .push(Change::RequestPackage(RequestPackage::new(request)));
        }
        let key = NodeKey::new(name);
        if !self.roots.contains(&key) {
            self.roots.push(key);
        }
        Ok(())
    }

    /// The nodes requested directly, in the order they were added
    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn get_initial_state(&self) -> Arc<State> {
        let mut state = None;
        let base = State::default();
        for change in self.initial_state_builders.iter() {
            state = Some(change.apply(&base, state.as_ref().unwrap_or(&base)));
        }
        state.unwrap_or(base)
    }

    /// A flag that stops any running solve of this solver, or of
    /// its clones, at the next step.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Share an interrupt flag with other solvers, so that one
    /// store stops all of them.
    pub fn set_interrupt_handle(&mut self, handle: Arc<AtomicBool>) {
        self.interrupted = handle;
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Increment the number of occurrences of the given error message
    pub fn increment_error_count(&mut self, error_message: String) {
        let counter = self.error_frequency.entry(error_message).or_insert(0);
        *counter += 1;
    }

    /// Get the error to frequency mapping
    pub fn error_frequency(&self) -> &HashMap<String, u64> {
        &self.error_frequency
    }

    /// The most frequent errors, most frequent first, limited by
    /// the `max_frequent_errors` setting
    pub fn frequent_errors(&self) -> Vec<(&str, u64)> {
        self.error_frequency
            .iter()
            .map(|(message, count)| (message.as_str(), *count))
            .sorted_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)))
            .take(self.config.solver.max_frequent_errors)
            .collect()
    }

    /// Increment the number of times a package blocked a request
    pub fn increment_problem_package_count(&mut self, problem_package: String) {
        let counter = self.problem_packages.entry(problem_package).or_insert(0);
        *counter += 1;
    }

    /// Get the problem packages frequency mapping
    pub fn problem_packages(&self) -> &HashMap<String, u64> {
        &self.problem_packages
    }

    fn is_exempt(&self, definition: &PackageDefinition) -> bool {
        self.config.solver.unify == UnifyPolicy::Exempt
            && (definition.is_unification_exempt()
                || self.config.is_unification_exempt(definition.name()))
    }

    fn effective_timeout(&self) -> Option<Duration> {
        self.timeout
            .or(match self.config.solver.timeout_seconds {
                0 => None,
                seconds => Some(Duration::from_secs(seconds)),
            })
    }

    /// Return the stored iterator for a node key, creating it first
    /// if this is the first time the key is visited from this node.
    async fn get_iterator<F>(&self, node: &mut Arc<Node>, key: &NodeKey, make: F) -> NodeIterator
    where
        F: FnOnce() -> Box<dyn CandidateIterator>,
    {
        if let Some(iterator) = node.get_iterator(key) {
            return iterator;
        }
        let iterator = Arc::new(tokio::sync::Mutex::new(make()));
        Arc::make_mut(node)
            .set_iterator(key.clone(), &iterator)
            .await;
        node.get_iterator(key).unwrap_or(iterator)
    }

    fn make_candidates(
        &self,
        state: &State,
        request: &PkgRequest,
        definition: &PackageDefinition,
    ) -> NodeCandidates {
        let name = definition.name();
        let mut candidates = NodeCandidates::new();

        let reuse = match self.config.solver.reuse {
            ReusePolicy::Disabled => false,
            ReusePolicy::Prefer => true,
            ReusePolicy::Dependencies => !self.roots.contains(&request.key),
        };
        if let Some(index) = &self.installed {
            if reuse {
                candidates.push(ReuseIterator::new(
                    Arc::clone(index),
                    name.to_owned(),
                    request.constraints.clone(),
                ));
            } else {
                candidates.add_note(format!("installations of {name} are not reused"));
            }
        }

        if let Some(hash) = &request.constraints.hash {
            candidates.add_note(format!("only an installation can match /{hash}"));
            return candidates;
        }

        let externals = ExternalIterator::new(definition, &self.config);
        if !externals.is_empty() {
            candidates.push(externals);
        }
        if self.config.is_buildable(name) {
            let inherited = inherited_attrs(state, request);
            candidates.push(BuildIterator::new(
                definition,
                request,
                &self.config,
                inherited,
            ));
        } else {
            candidates.add_note(format!("{name} is configured as not buildable"));
        }
        candidates
    }

    async fn step_state(&mut self, node: &mut Arc<Node>) -> Result<Option<Decision>> {
        let request = match node.state.get_next_request() {
            Ok(Some(request)) => request,
            Ok(None) => {
                self.check_complete(&node.state)?;
                return Ok(None);
            }
            Err(err) => return Err(Error::DeadEnd(format!("{err}: {}", err.reason()))),
        };

        // This is a step forward in the solve
        self.number_of_steps += 1;

        let definition = match self.source.lookup(request.name()).await {
            Ok(definition) => definition,
            Err(err) if err.is_unknown_package() => {
                let providers = self.source.providers(request.name()).await?;
                if providers.is_empty() || request.key.is_split() {
                    return Err(Error::PackageNotFoundDuringSolve(Box::new(request)));
                }
                return self.step_virtual(node, request, providers).await;
            }
            Err(err) => return Err(err.into()),
        };
        self.step_package(node, request, definition).await
    }

    /// Choose the next provider for a virtual package.
    async fn step_virtual(
        &mut self,
        node: &mut Arc<Node>,
        request: PkgRequest,
        providers: BTreeSet<PkgNameBuf>,
    ) -> Result<Option<Decision>> {
        let mut notes = Vec::<Note>::new();
        let state = Arc::clone(&node.state);
        let virtual_name = request.name().to_owned();
        let iterator = self
            .get_iterator(node, &request.key, || {
                Box::new(ProviderIterator::new(
                    virtual_name.clone(),
                    providers,
                    &state.resolved_names(),
                    self.config.provider_preferences(&virtual_name),
                ))
            })
            .await;

        let mut iterator_lock = iterator.lock().await;
        while let Some(candidate) = iterator_lock.next().await? {
            let Candidate::Provider(provider) = candidate else {
                continue;
            };
            self.number_total_candidates += 1;
            let definition = self.source.lookup(&provider).await?;

            // The provider request keeps everything asked of the
            // virtual apart from the versions, which are the
            // virtual's own.
            let mut constraints = request.constraints.clone();
            constraints.versions = VersionList::any();
            let provider_key = NodeKey::new(provider.clone());
            let provider_request = PkgRequest::new(
                provider_key.clone(),
                constraints,
                RequestedBy::Virtual(virtual_name.clone()),
            );

            let mut compat = validate_provider(&request, &definition);
            if let (true, Ok(existing)) =
                (compat.is_ok(), state.get_current_resolve(&provider_key))
            {
                compat = definition
                    .provides_virtual(&virtual_name, &request.constraints.versions, &existing.attrs)
                    .and_then(|| {
                        provider_request
                            .is_satisfied_by(&existing.attrs, existing.source.installed_hash())
                    });
            }
            if !compat.is_ok() {
                self.skip_candidate(&mut notes, format!("{virtual_name} => {provider}"), &compat);
                continue;
            }

            let mut decision = Decision::builder(&state).choose_provider(
                virtual_name,
                provider,
                provider_request,
            );
            decision.add_notes(notes);
            return Ok(Some(decision));
        }

        notes.extend(iterator_lock.notes().into_iter().map(Note::Other));
        Err(OutOfOptions { request, notes }.into())
    }

    /// Choose the next acceptable configuration of a package.
    async fn step_package(
        &mut self,
        node: &mut Arc<Node>,
        request: PkgRequest,
        definition: Arc<PackageDefinition>,
    ) -> Result<Option<Decision>> {
        let mut notes = Vec::<Note>::new();
        let state = Arc::clone(&node.state);
        let iterator = self
            .get_iterator(node, &request.key, || {
                Box::new(self.make_candidates(&state, &request, &definition))
            })
            .await;

        let mut iterator_lock = iterator.lock().await;
        while let Some(candidate) = iterator_lock.next().await? {
            let label = candidate.to_string();
            let Candidate::Package { attrs, source } = candidate else {
                continue;
            };
            self.number_total_candidates += 1;

            let expansion = match self
                .expand(&state, &request, &definition, attrs, source)
                .await?
            {
                Ok(expansion) => expansion,
                Err(reason) => {
                    self.skip_candidate(&mut notes, label, &Compatibility::Incompatible(reason));
                    continue;
                }
            };
            let compat = self.validate_node(&state, &expansion.node, &expansion.requests)?;
            if !compat.is_ok() {
                self.skip_candidate(&mut notes, label, &compat);
                continue;
            }

            let Expansion {
                node: solved,
                requests,
                providers,
            } = expansion;
            let solved = Arc::new(solved);
            let mut decision =
                Decision::builder(&state).resolve_package(&solved, requests, providers);
            decision.add_notes(notes);
            return Ok(Some(decision));
        }

        notes.extend(iterator_lock.notes().into_iter().map(Note::Other));
        Err(OutOfOptions { request, notes }.into())
    }

    fn skip_candidate(&mut self, notes: &mut Vec<Note>, candidate: String, compat: &Compatibility) {
        tracing::trace!(%candidate, reason = %compat, "skipped");
        self.number_candidates_skipped += 1;
        notes.push(Note::SkipPackageNote(SkipPackageNote::new(candidate, compat)));
    }

    /// Attach dependency edges and requests to a candidate.
    ///
    /// Returns the reason the candidate cannot be used when its own
    /// dependencies contradict each other.
    ///
    /// # Errors
    /// - [`Error::Cycle`] if the candidate closes a dependency cycle
    async fn expand(
        &self,
        state: &State,
        request: &PkgRequest,
        definition: &Arc<PackageDefinition>,
        attrs: NodeAttrs,
        source: PackageSource,
    ) -> Result<std::result::Result<Expansion, String>> {
        let key = request.key.clone();
        let mut expansion = Expansion {
            node: SolvedNode {
                key: key.clone(),
                attrs,
                dependencies: Vec::new(),
                source: source.clone(),
                definition: Arc::clone(definition),
            },
            requests: Vec::new(),
            providers: Vec::new(),
        };

        match source {
            // externals are leaves
            PackageSource::External { .. } => {}
            PackageSource::Installed { spec, hash } => {
                self.pin_installed_dependencies(&key, &spec, &hash, &mut expansion)
                    .await?;
            }
            PackageSource::Build => {
                if let Err(reason) = self
                    .add_declared_dependencies(&key, definition, &mut expansion)
                    .await?
                {
                    return Ok(Err(reason));
                }
            }
        }

        for edge in expansion.node.dependencies.iter() {
            let Some(target) = state.edge_target(edge) else {
                continue;
            };
            let path = if target == key {
                Some(vec![target])
            } else {
                state.dependency_path(&target, &key)
            };
            if let Some(path) = path {
                let mut cycle = vec![key.to_string()];
                cycle.extend(path.iter().map(ToString::to_string));
                return Err(CycleDetectedError { cycle }.into());
            }
        }
        Ok(Ok(expansion))
    }

    async fn add_declared_dependencies(
        &self,
        key: &NodeKey,
        definition: &PackageDefinition,
        expansion: &mut Expansion,
    ) -> Result<std::result::Result<(), String>> {
        let include_test = self.config.solver.include_test_dependencies;
        let attrs = expansion.node.attrs.clone();
        for (dep, types) in definition.active_dependencies(&attrs, include_test) {
            let Some(dep_name) = dep.name() else {
                continue;
            };
            let (target, is_virtual) = self.dependency_key(dep_name, key).await?;

            let edge = if is_virtual {
                SolvedEdge::virtual_dependency(dep_name.to_owned(), types)
            } else {
                SolvedEdge::new(target.clone(), types)
            };
            match expansion
                .node
                .dependencies
                .iter_mut()
                .find(|e| e.target == edge.target)
            {
                Some(existing) => existing.types.extend(edge.types),
                None => expansion.node.dependencies.push(edge),
            }

            let mut requests = PkgRequest::from_spec(&dep.spec, RequestedBy::Package(key.clone()));
            if let Some(first) = requests.first_mut() {
                first.key = target;
            }
            for request in requests {
                if let Err(reason) = expansion.add_request(request) {
                    return Ok(Err(reason));
                }
            }
        }
        Ok(Ok(()))
    }

    /// Request the exact installations that a reused node was built
    /// against, and the providers it was built with.
    async fn pin_installed_dependencies(
        &self,
        key: &NodeKey,
        spec: &ConcreteSpec,
        hash: &Digest,
        expansion: &mut Expansion,
    ) -> Result<()> {
        let installed = spec.get(hash).ok_or_else(|| {
            Error::String(format!(
                "installation /{} is missing from its own graph",
                hash.short()
            ))
        })?;
        for edge in installed.dependencies() {
            let (target, _) = self.dependency_key(&edge.name, key).await?;
            let constraints = Constraints {
                hash: Some(edge.hash.to_string()),
                ..Constraints::default()
            };
            expansion.requests.push(PkgRequest::new(
                target.clone(),
                constraints,
                RequestedBy::Installed(*hash),
            ));
            expansion.node.dependencies.push(SolvedEdge {
                target,
                types: edge.types.clone(),
                virtuals: edge.virtuals.clone(),
            });
            for virtual_name in edge.virtuals.iter() {
                expansion
                    .providers
                    .push((virtual_name.clone(), edge.name.clone()));
            }
        }
        Ok(())
    }

    /// The node key for a dependency of `dependent`, and whether the
    /// dependency names a virtual package.
    async fn dependency_key(&self, name: &PkgName, dependent: &NodeKey) -> Result<(NodeKey, bool)> {
        match self.source.lookup(name).await {
            Ok(definition) if self.is_exempt(&definition) => {
                Ok((NodeKey::split(name.to_owned(), &dependent.name), false))
            }
            Ok(_) => Ok((NodeKey::new(name.to_owned()), false)),
            Err(err) if err.is_unknown_package() => {
                let is_virtual = !self.source.providers(name).await?.is_empty();
                Ok((NodeKey::new(name.to_owned()), is_virtual))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn validate_node(
        &self,
        state: &State,
        node: &SolvedNode,
        requests: &[PkgRequest],
    ) -> Result<Compatibility> {
        for validator in self.validators.as_ref() {
            let compat = validator.validate_node(state, node, requests)?;
            if !compat.is_ok() {
                return Ok(compat);
            }
        }
        Ok(Compatibility::Compatible)
    }

    /// Check a state with no requests left before accepting it.
    fn check_complete(&self, state: &State) -> Result<()> {
        if let Some(unmet) = state.unmet_dependency_requests().first() {
            let roots = self.roots.iter().map(ToString::to_string).join(", ");
            return Err(Error::DeadEnd(format!(
                "{roots} does not depend on {}",
                unmet.key
            )));
        }
        Ok(())
    }

    /// Put this solver back into its default state
    pub fn reset(&mut self) {
        self.initial_state_builders.truncate(0);
        self.roots.truncate(0);
        self.validators = Cow::from(default_validators());
        self.interrupted.store(false, Ordering::SeqCst);
        self.number_of_steps = 0;
        self.number_candidates_skipped = 0;
        self.number_total_candidates = 0;
        self.number_of_steps_back.store(0, Ordering::SeqCst);
        self.error_frequency.clear();
        self.problem_packages.clear();
    }

    /// Run this solver
    pub fn run(&self) -> SolverRuntime {
        SolverRuntime::new(self.clone())
    }

    /// Search for a solution to every request added so far.
    ///
    /// # Errors
    /// - [`Error::Unsatisfiable`] when no combination of candidates works
    /// - [`Error::UnknownPackage`] when a root names no package
    /// - [`Error::Cycle`] when a choice closes a dependency cycle
    /// - [`Error::SolverInterrupted`] on interruption or timeout
    pub async fn solve(&mut self) -> Result<Solution> {
        let mut runtime = self.run();
        let result = runtime.solution().await;
        self.take_stats(&runtime.solver);
        self.log_stats(result.is_ok());
        result
    }

    /// Solve, then assemble and hash the resulting graph.
    pub async fn solve_concrete(&mut self) -> Result<ConcreteSpec> {
        let solution = self.solve().await?;
        Ok(solution.assemble()?)
    }

    fn take_stats(&mut self, other: &Solver) {
        self.number_of_steps = other.number_of_steps;
        self.number_candidates_skipped = other.number_candidates_skipped;
        self.number_total_candidates = other.number_total_candidates;
        self.error_frequency.clone_from(&other.error_frequency);
        self.problem_packages.clone_from(&other.problem_packages);
    }

    fn log_stats(&self, solved: bool) {
        tracing::info!(
            solved,
            steps = self.get_number_of_steps(),
            steps_back = self.get_number_of_steps_back(),
            candidates = self.get_total_candidates(),
            skipped = self.get_number_of_candidates_skipped(),
            "solve finished"
        );
        for (message, count) in self.frequent_errors() {
            tracing::debug!(count, "{message}");
        }
        for (package, count) in self
            .problem_packages
            .iter()
            .sorted_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)))
        {
            tracing::debug!(count, "problem package: {package}");
        }
    }

    /// Get the number of steps (forward) taken in the solve
    pub fn get_number_of_steps(&self) -> usize {
        self.number_of_steps
    }

    /// Get the number of candidates rejected during the solve
    pub fn get_number_of_candidates_skipped(&self) -> usize {
        self.number_candidates_skipped
    }

    /// Get the total number of candidates examined during the solve
    pub fn get_total_candidates(&self) -> usize {
        self.number_total_candidates
    }

    /// Get the number of steps back taken during the solve
    pub fn get_number_of_steps_back(&self) -> u64 {
        self.number_of_steps_back.load(Ordering::SeqCst)
    }
}

/// A candidate along with what it adds to the state.
struct Expansion {
    node: SolvedNode,
    requests: Vec<PkgRequest>,
    providers: Vec<(PkgNameBuf, PkgNameBuf)>,
}

impl Expansion {
    fn add_request(&mut self, request: PkgRequest) -> std::result::Result<(), String> {
        match self
            .requests
            .iter_mut()
            .find(|r| r.key == request.key && r.inclusion_policy == request.inclusion_policy)
        {
            Some(existing) => existing
                .restrict(&request)
                .map_err(|err| format!("depends on {}: {err}", request.key)),
            None => {
                self.requests.push(request);
                Ok(())
            }
        }
    }
}

/// The attributes of the first resolved node that made the request
fn inherited_attrs<'a>(state: &'a State, request: &PkgRequest) -> Option<&'a NodeAttrs> {
    request.get_requesters().iter().find_map(|requester| match requester {
        RequestedBy::Package(key) => state.get_current_resolve(key).ok().map(|n| &n.attrs),
        _ => None,
    })
}

// This is needed so `PriorityQueue` doesn't need to hash the node itself.
struct NodeWrapper {
    pub(crate) node: Arc<tokio::sync::RwLock<Arc<Node>>>,
    pub(crate) hash: u64,
}

impl std::cmp::Eq for NodeWrapper {}

impl std::cmp::PartialEq for NodeWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl std::hash::Hash for NodeWrapper {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

// Prioritized by depth, so the deepest choice point is revisited first
type SolverHistory = PriorityQueue<NodeWrapper, u64>;

#[must_use = "The solver runtime does nothing unless iterated to completion"]
pub struct SolverRuntime {
    pub solver: Solver,
    graph: Arc<tokio::sync::RwLock<Graph>>,
    history: SolverHistory,
    current_node: Option<Arc<tokio::sync::RwLock<Arc<Node>>>>,
    decision: Option<Arc<Decision>>,
    deadline: Option<Instant>,
    // The cause and notes of the most recent step back
    last_failure: Option<(String, Vec<Note>)>,
}

impl SolverRuntime {
    pub fn new(solver: Solver) -> Self {
        let initial_decision = Decision::new(solver.initial_state_builders.clone());
        let deadline = solver
            .effective_timeout()
            .map(|timeout| Instant::now() + timeout);
        Self {
            solver,
            graph: Arc::new(tokio::sync::RwLock::new(Graph::new())),
            history: SolverHistory::default(),
            current_node: None,
            decision: Some(Arc::new(initial_decision)),
            deadline,
            last_failure: None,
        }
    }

    /// A reference to the solve graph being built by this runtime
    pub fn graph(&self) -> Arc<tokio::sync::RwLock<Graph>> {
        self.graph.clone()
    }

    /// Returns the completed solution for this runtime.
    ///
    /// If needed, this function will iterate any remaining
    /// steps for the current state.
    pub async fn solution(&mut self) -> Result<Solution> {
        {
            let iter = self.iter();
            tokio::pin!(iter);
            while let Some(_item) = iter.try_next().await? {}
        }
        self.current_solution().await
    }

    /// Return the current solution for this runtime.
    ///
    /// If the runtime has not yet completed, this solution
    /// may be incomplete or empty.
    pub async fn current_solution(&self) -> Result<Solution> {
        let current_node = self
            .current_node
            .as_ref()
            .ok_or_else(|| Error::String("Solver runtime has not been consumed".into()))?;
        let current_node_lock = current_node.read().await;

        let is_dead = current_node_lock.state.id()
            == self.graph.read().await.root.read().await.state.id()
            || Arc::ptr_eq(&current_node_lock.state, &DEAD_STATE);
        let is_empty = self.solver.initial_state_builders.is_empty();
        if is_dead && !is_empty {
            return Err(self.unsatisfiable().into());
        }

        let state = &current_node_lock.state;
        let roots = self
            .solver
            .roots
            .iter()
            .map(|root| match state.get_provider(&root.name) {
                Some(provider) if !root.is_split() => NodeKey::new(provider.to_owned()),
                _ => root.clone(),
            })
            .collect();
        let mut solution = state.as_solution(roots);
        let exempt: BTreeSet<PkgNameBuf> = solution
            .items()
            .filter(|node| self.solver.is_exempt(&node.definition))
            .map(|node| node.name().to_owned())
            .collect();
        for name in exempt {
            solution.add_exempt(name);
        }
        Ok(solution)
    }

    fn unsatisfiable(&self) -> UnsatisfiableConstraintError {
        let mut chain = Vec::new();
        if let Some((cause, notes)) = &self.last_failure {
            chain.push(cause.clone());
            for note in notes {
                chain.push(match note {
                    Note::SkipPackageNote(skip) => format!("{} - {}", skip.candidate, skip.reason),
                    Note::Other(message) => message.clone(),
                });
            }
        }
        for (message, _) in self.solver.frequent_errors() {
            if !chain.iter().any(|link| link == message) {
                chain.push(message.to_string());
            }
        }
        UnsatisfiableConstraintError {
            request: self.solver.roots.iter().map(ToString::to_string).join(", "),
            chain,
        }
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.solver.interrupted.load(Ordering::SeqCst) {
            return Err(Error::SolverInterrupted("the solve was interrupted".into()));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                let elapsed = self.solver.effective_timeout().unwrap_or_default();
                Err(Error::SolverInterrupted(format!(
                    "the solve did not finish within {} seconds",
                    elapsed.as_secs_f64()
                )))
            }
            _ => Ok(()),
        }
    }

    async fn is_dead(&self) -> bool {
        match self.current_node.as_ref() {
            Some(node) => Arc::ptr_eq(&node.read().await.state, &DEAD_STATE),
            None => false,
        }
    }

    /// Generate a step-back decision to the most recent choice point
    async fn take_a_step_back(&mut self, message: &str) {
        let destination = match self.history.pop() {
            Some((wrapper, _)) => {
                let node = wrapper.node.read().await;
                Arc::clone(&node.state)
            }
            None => Arc::clone(&DEAD_STATE),
        };
        tracing::debug!(cause = message, depth = destination.state_depth, "stepping back");
        self.decision = Some(Arc::new(
            Change::StepBack(StepBack::new(
                message,
                &destination,
                Arc::clone(&self.solver.number_of_steps_back),
            ))
            .as_decision(),
        ));
    }

    fn record_failure(&mut self, cause: String, notes: Vec<Note>) {
        self.solver.increment_error_count(cause.clone());
        self.last_failure = Some((cause, notes));
    }

    /// Iterate through each step of this runtime, trying to converge on a solution
    pub fn iter(&mut self) -> impl Stream<Item = Result<(Arc<Node>, Arc<Decision>)>> + Send + '_ {
        stream! {
            'outer: loop {
                if self.is_dead().await {
                    break 'outer;
                }
                let Some(decision) = self.decision.take() else {
                    break 'outer;
                };
                if let Err(err) = self.check_interrupted() {
                    yield Err(err);
                    break 'outer;
                }

                let source = match self.current_node.as_ref() {
                    Some(node) => node.read().await.clone(),
                    None => self.graph.read().await.root.read().await.clone(),
                };
                let to_yield = (Arc::clone(&source), Arc::clone(&decision));

                let branch = self.graph.write().await.add_branch(source.id(), decision).await;
                let current_node = match branch {
                    Ok(node) => node,
                    Err(err) => {
                        self.take_a_step_back(&err.to_string()).await;
                        yield Ok(to_yield);
                        continue 'outer;
                    }
                };
                self.current_node = Some(Arc::clone(&current_node));

                let mut current_node_lock = current_node.write().await;
                if Arc::ptr_eq(&current_node_lock.state, &DEAD_STATE) {
                    drop(current_node_lock);
                    yield Ok(to_yield);
                    continue 'outer;
                }
                let current_level = current_node_lock.state.state_depth;
                let step = self.solver.step_state(&mut current_node_lock).await;
                let current_state = Arc::clone(&current_node_lock.state);
                drop(current_node_lock);

                match step {
                    Ok(Some(decision)) => {
                        let options = FormatChangeOptions {
                            verbosity: 1,
                            level: current_level,
                        };
                        for change in decision.changes.iter() {
                            tracing::debug!(
                                "{}",
                                change.format_change(&options, Some(&*current_state))
                            );
                        }
                        self.decision = Some(Arc::new(decision));
                    }
                    Ok(None) => {
                        self.decision = None;
                        yield Ok(to_yield);
                        continue 'outer;
                    }
                    Err(Error::OutOfOptions(err)) => {
                        // Add to problem package counts based on what made
                        // the request for the blocked package.
                        let requested_by = err.request.get_requesters();
                        for requester in requested_by.iter() {
                            if let RequestedBy::Package(problem_package) = requester {
                                let name = problem_package.name.to_string();
                                self.solver.increment_problem_package_count(name)
                            }
                        }

                        // Add the requirers to the output so where the
                        // requests came from is more visible to the user.
                        let requirers: Vec<String> =
                            requested_by.iter().map(ToString::to_string).collect();
                        let cause = format!(
                            "could not satisfy '{}' as required by: {}",
                            err.request,
                            requirers.join(", ")
                        );
                        self.record_failure(cause.clone(), err.notes.clone());
                        self.take_a_step_back(&cause).await;
                        if let Some(d) = self.decision.as_mut() {
                            Arc::make_mut(d).add_notes(err.notes)
                        }
                        yield Ok(to_yield);
                        continue 'outer;
                    }
                    Err(Error::PackageNotFoundDuringSolve(request)) => {
                        let requested_by = request.get_requesters();
                        // Can't recover from a command line request for a
                        // missing package.
                        if requested_by.contains(&RequestedBy::CommandLine) {
                            let name = request.name().to_owned();
                            yield Err(Error::from(UnknownPackageError { name }));
                            break 'outer;
                        }
                        for requester in requested_by.iter() {
                            if let RequestedBy::Package(problem_package) = requester {
                                let name = problem_package.name.to_string();
                                self.solver.increment_problem_package_count(name)
                            }
                        }
                        let requirers: Vec<String> =
                            requested_by.iter().map(ToString::to_string).collect();
                        let cause = format!(
                            "package '{}' not found, as required by: {}",
                            request.key,
                            requirers.join(", ")
                        );
                        self.record_failure(cause.clone(), Vec::new());
                        self.take_a_step_back(&cause).await;
                        yield Ok(to_yield);
                        continue 'outer;
                    }
                    Err(Error::DeadEnd(cause)) => {
                        self.record_failure(cause.clone(), Vec::new());
                        self.take_a_step_back(&cause).await;
                        yield Ok(to_yield);
                        continue 'outer;
                    }
                    Err(err) => {
                        self.solver.increment_error_count(err.to_string());
                        yield Err(err);
                        break 'outer;
                    }
                }

                self.history.push(
                    NodeWrapper {
                        node: current_node,
                        hash: self.solver.get_number_of_steps() as u64,
                    },
                    current_level,
                );
                yield Ok(to_yield)
            }
        }
    }
}
