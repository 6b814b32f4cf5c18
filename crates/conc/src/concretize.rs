// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use conc_config::Config;
use conc_schema::{AbstractSpec, ConcreteSpec};
use conc_solve::Solver;
use conc_storage::{ConstraintSource, InstalledIndex};
use futures::StreamExt;
use futures::stream::FuturesOrdered;

use crate::{Error, Result};

#[cfg(test)]
#[path = "./concretize_test.rs"]
mod concretize_test;

/// Concretizes abstract specs against one package universe.
///
/// Every run gets its own solver, so one concretizer can be shared
/// by many concurrent runs. The source and the installed index are
/// only ever read.
#[derive(Clone)]
pub struct Concretizer {
    source: Arc<dyn ConstraintSource>,
    installed: Option<Arc<dyn InstalledIndex>>,
    config: Arc<Config>,
    timeout: Option<Duration>,
    interrupted: Arc<AtomicBool>,
}

impl Concretizer {
    /// Concretize against this source, with default settings.
    pub fn new<S>(source: S) -> Self
    where
        S: ConstraintSource + 'static,
    {
        Self {
            source: Arc::new(source),
            installed: None,
            config: Arc::new(Config::default()),
            timeout: None,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_config(mut self, config: Arc<Config>) -> Self {
        self.config = config;
        self
    }

    /// Offer the installations in this index for reuse.
    pub fn with_installed_index(mut self, index: Arc<dyn InstalledIndex>) -> Self {
        self.installed = Some(index);
        self
    }

    /// Give up on any run that takes longer than this,
    /// overriding the configured timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// The flag that stops every run of this concretizer.
    ///
    /// It stays set until cleared, and runs started while it is
    /// set fail immediately.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn solver(&self) -> Solver {
        let mut solver = Solver::new(Arc::clone(&self.source));
        solver.set_config(Arc::clone(&self.config));
        if let Some(index) = self.installed.as_ref() {
            solver.set_installed_index(Arc::clone(index));
        }
        if let Some(timeout) = self.timeout {
            solver.set_timeout(Some(timeout));
        }
        solver.set_interrupt_handle(Arc::clone(&self.interrupted));
        solver
    }

    /// Resolve one root and everything it depends on.
    pub async fn concretize(&self, spec: AbstractSpec) -> Result<ConcreteSpec> {
        self.concretize_together([spec]).await
    }

    /// Parse and resolve one root.
    pub async fn concretize_str(&self, text: &str) -> Result<ConcreteSpec> {
        let spec: AbstractSpec = text.parse()?;
        self.concretize(spec).await
    }

    /// Resolve several roots into one graph, where every package
    /// has a single configuration shared by all roots.
    pub async fn concretize_together<I>(&self, specs: I) -> Result<ConcreteSpec>
    where
        I: IntoIterator<Item = AbstractSpec>,
    {
        let mut solver = self.solver();
        for spec in specs {
            tracing::debug!(%spec, "adding root");
            solver.add_request(spec)?;
        }
        if solver.roots().is_empty() {
            return Err(Error::NoRequests);
        }
        let concrete = solver.solve_concrete().await?;
        for root in concrete.root_nodes() {
            tracing::info!(
                nodes = concrete.len(),
                steps = solver.get_number_of_steps(),
                "concretized {root}"
            );
        }
        Ok(concrete)
    }

    /// Resolve each root on its own, concurrently.
    ///
    /// The results are in the order of the given specs, and one
    /// failure does not stop the other runs.
    pub async fn concretize_each<I>(&self, specs: I) -> Vec<Result<ConcreteSpec>>
    where
        I: IntoIterator<Item = AbstractSpec>,
    {
        let mut tasks = FuturesOrdered::new();
        for spec in specs {
            let concretizer = self.clone();
            tasks.push_back(tokio::spawn(
                async move { concretizer.concretize(spec).await },
            ));
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.next().await {
            results.push(match joined {
                Ok(result) => result,
                Err(err) => Err(Error::TaskFailed(err.to_string())),
            });
        }
        results
    }
}

/// Resolve one root using the current configuration.
pub async fn concretize<S>(source: S, spec: AbstractSpec) -> Result<ConcreteSpec>
where
    S: ConstraintSource + 'static,
{
    let config = conc_config::get_config()?;
    Concretizer::new(source)
        .with_config(config)
        .concretize(spec)
        .await
}

/// Resolve each root on its own, concurrently, using the current
/// configuration.
pub async fn concretize_each<S, I>(source: S, specs: I) -> Result<Vec<Result<ConcreteSpec>>>
where
    S: ConstraintSource + 'static,
    I: IntoIterator<Item = AbstractSpec>,
{
    let config = conc_config::get_config()?;
    Ok(Concretizer::new(source)
        .with_config(config)
        .concretize_each(specs)
        .await)
}
