// Copyright (c) Contributors to the conc project.
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use conc_schema::AbstractSpec;
use conc_schema::foundation::arch::Arch;
use conc_schema::foundation::compiler::{Compiler, CompilerSpec};
use conc_schema::foundation::name::{PkgName, PkgNameBuf};
use conc_schema::foundation::version_range::VersionList;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::Result;

#[cfg(test)]
#[path = "./config_test.rs"]
mod config_test;

static CONFIG: OnceCell<RwLock<Arc<Config>>> = OnceCell::new();

/// The key of the package section that applies to every package
pub const ALL_PACKAGES: &str = "all";

/// Prefix of the environment variables that override configuration
pub const ENV_PREFIX: &str = "CONC_";

/// When installed configurations may stand in for new builds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// Never reuse, every node is built
    Disabled,
    /// Offer a matching installation before any new build
    #[default]
    Prefer,
    /// Reuse installations for dependencies, but never for a root
    Dependencies,
}

/// How strictly one package name must resolve to one node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnifyPolicy {
    /// Every package resolves to exactly one node, exemptions are ignored
    Strict,
    /// Packages flagged as exempt may resolve once per dependent
    #[default]
    Exempt,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Solver {
    /// Whether installed configurations are offered as candidates
    pub reuse: ReusePolicy,

    /// How unification exemptions are treated
    pub unify: UnifyPolicy,

    /// Maximum number of seconds to let the solver run before halting
    ///
    /// If this is zero, which is the default, the timeout is disabled
    /// and the solver will run to completion.
    pub timeout_seconds: u64,

    /// Follow dependencies of the `test` type
    pub include_test_dependencies: bool,

    /// Set the limit for how many of the most frequent errors are
    /// displayed in solve stats reports
    pub max_frequent_errors: usize,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            reuse: ReusePolicy::default(),
            unify: UnifyPolicy::default(),
            timeout_seconds: 0,
            include_test_dependencies: false,
            max_frequent_errors: 5,
        }
    }
}

/// An installation of a package that conc did not build.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct External {
    /// The full configuration of the installation, eg `openssl@3.0.2 %gcc@11.4.0`
    pub spec: AbstractSpec,
    pub prefix: PathBuf,
}

/// Preferences for one package, or for all of them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PackagePreferences {
    /// Versions to try first, in order
    pub version: Vec<VersionList>,
    /// Compilers to try first, in order
    pub compiler: Vec<CompilerSpec>,
    /// Preferred providers, in order, for each virtual
    pub providers: BTreeMap<PkgNameBuf, Vec<PkgNameBuf>>,
    /// Preferred variant values, as anonymous spec text, eg `+mpi ~shared`
    pub variants: Option<AbstractSpec>,
    /// The preferred microarchitecture
    pub target: Option<String>,
    /// When false, the package is only satisfied by externals or
    /// existing installations
    pub buildable: Option<bool>,
    pub externals: Vec<External>,
    pub unification_exempt: Option<bool>,
}

/// Configuration values for conc.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // These sub-types should aim to only have one level of
    // values within them, otherwise they become impossible to address
    // with environment variables.
    pub solver: Solver,

    /// The available toolchains
    pub compilers: Vec<Compiler>,

    /// The available platform-os-target triplets, the first is the default
    pub targets: Vec<Arch>,

    /// Per package preferences, keyed by package name or `all`
    pub packages: BTreeMap<String, PackagePreferences>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: Solver::default(),
            compilers: Vec::new(),
            targets: vec![host_arch()],
            packages: BTreeMap::new(),
        }
    }
}

/// A best guess at the triplet of the running machine.
pub fn host_arch() -> Arch {
    Arch::new(
        std::env::consts::OS,
        std::env::consts::FAMILY,
        std::env::consts::ARCH,
    )
}

impl Config {
    /// Get the current loaded config, loading it if needed
    pub fn current() -> Result<Arc<Self>> {
        get_config()
    }

    /// Load the config from disk, even if it's already been loaded before
    pub fn load() -> Result<Self> {
        load_config()
    }

    /// Parse a config from yaml text, without any other layers
    pub fn from_yaml_str<S: AsRef<str>>(yaml: S) -> Result<Self> {
        use config::{Config as RawConfig, File, FileFormat};

        let config = RawConfig::builder()
            .add_source(File::from_str(yaml.as_ref(), FileFormat::Yaml))
            .build()?;
        Ok(Config::deserialize(config)?)
    }

    /// Make this config the current global one
    pub fn make_current(self) -> Result<Arc<Self>> {
        // Note we don't know if we won the race to set the value here,
        // so we still need to try to update it.
        let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
            Ok(RwLock::new(Arc::new(self.clone())))
        })?;

        let mut lock = config
            .write()
            .map_err(|err| crate::Error::LockPoisonedWrite(err.to_string()))?;
        *Arc::make_mut(&mut lock) = self;
        Ok(Arc::clone(&lock))
    }

    /// The section for one package, if it has one
    pub fn package(&self, name: &PkgName) -> Option<&PackagePreferences> {
        self.packages.get(name.as_str())
    }

    /// The section that applies to every package, if there is one
    pub fn all_packages(&self) -> Option<&PackagePreferences> {
        self.packages.get(ALL_PACKAGES)
    }

    /// The package's own section followed by the `all` section
    fn sections(&self, name: &PkgName) -> impl Iterator<Item = &PackagePreferences> {
        self.package(name).into_iter().chain(self.all_packages())
    }

    /// Versions of the package to try first
    pub fn version_preferences(&self, name: &PkgName) -> &[VersionList] {
        self.package(name)
            .map(|p| p.version.as_slice())
            .unwrap_or_default()
    }

    /// Compilers to try first for the package
    pub fn compiler_preferences(&self, name: &PkgName) -> &[CompilerSpec] {
        self.sections(name)
            .map(|p| p.compiler.as_slice())
            .find(|c| !c.is_empty())
            .unwrap_or_default()
    }

    /// The configured order of providers for a virtual package.
    ///
    /// The virtual's own section is consulted before `all`.
    pub fn provider_preferences(&self, virtual_name: &PkgName) -> &[PkgNameBuf] {
        self.sections(virtual_name)
            .find_map(|p| p.providers.get(virtual_name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Preferred variant values for the package
    pub fn variant_preferences(&self, name: &PkgName) -> Vec<&AbstractSpec> {
        self.sections(name)
            .filter_map(|p| p.variants.as_ref())
            .collect()
    }

    /// The preferred microarchitecture for the package
    pub fn target_preference(&self, name: &PkgName) -> Option<&str> {
        self.sections(name).find_map(|p| p.target.as_deref())
    }

    pub fn is_buildable(&self, name: &PkgName) -> bool {
        self.sections(name)
            .find_map(|p| p.buildable)
            .unwrap_or(true)
    }

    /// The known external installations of the package
    pub fn externals(&self, name: &PkgName) -> &[External] {
        self.package(name)
            .map(|p| p.externals.as_slice())
            .unwrap_or_default()
    }

    /// True if configuration marks the package exempt from unification
    pub fn is_unification_exempt(&self, name: &PkgName) -> bool {
        self.sections(name)
            .find_map(|p| p.unification_exempt)
            .unwrap_or(false)
    }

    /// The target used when nothing else decides
    pub fn default_target(&self) -> Option<&Arch> {
        self.targets.first()
    }
}

/// Get the current conc config, fetching it from disk if needed.
pub fn get_config() -> Result<Arc<Config>> {
    let config = CONFIG.get_or_try_init(|| -> Result<RwLock<Arc<Config>>> {
        Ok(RwLock::new(Arc::new(load_config()?)))
    })?;
    let lock = config
        .read()
        .map_err(|err| crate::Error::LockPoisonedRead(err.to_string()))?;
    Ok(Arc::clone(&*lock))
}

/// The system and user configuration files, in the order they apply.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/conc/config.yaml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("conc").join("config.yaml"));
    }
    paths
}

/// Load the conc configuration from disk, even if it has already been loaded.
///
/// This includes the default, system and user configurations (if they exist)
/// and any `CONC_<SECTION>_<NAME>` environment variables.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file_paths(), std::env::vars())
}

/// Load configuration from the given files, then apply overrides
/// from the given environment variables.
pub fn load_config_from<I>(files: &[PathBuf], vars: I) -> Result<Config>
where
    I: IntoIterator<Item = (String, String)>,
{
    use config::{Config as RawConfig, File};

    let mut config_builder = RawConfig::builder();
    for path in files {
        tracing::trace!(path = %path.display(), "config layer");
        config_builder = config_builder.add_source(File::from(path.as_path()).required(false));
    }

    for (var, value) in vars {
        let Some(tail) = var.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let Some((section, name)) = tail.split_once('_') else {
            // typically, a value with no section is not a configuration
            // value, and can be skipped (eg: CONC_LOG)
            continue;
        };

        let key = format!("{}.{}", section.to_lowercase(), name.to_lowercase());
        config_builder = config_builder.set_override(key, value)?;
    }

    let config = config_builder.build()?;
    Ok(Config::deserialize(config)?)
}
