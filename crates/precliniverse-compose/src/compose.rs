use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bricks::assemble_bricks;
use crate::catalog::BrickCatalog;
use crate::config::FacilityConfig;
use crate::error::ComposeError;
use crate::manifest::Manifest;
use crate::secret::{OsEntropy, SecretLedger, SecretResolver, SecretSource};
use crate::topology::{build_core, resolve_secrets};

/// Non-fatal findings surfaced alongside a successful composition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompositionWarning {
    /// An enabled module identifier is not in the brick catalog; no service
    /// was emitted for it.
    UnknownModule(String),
}

/// Result of one composition: the manifest itself, the provenance ledger
/// for every secret-bearing field, and any non-fatal warnings.
#[derive(Clone, Debug)]
pub struct Composition {
    pub manifest: Manifest,
    pub ledger: SecretLedger,
    pub warnings: Vec<CompositionWarning>,
}

impl Composition {
    /// Renders the manifest to compose YAML.
    pub fn to_yaml(&self) -> Result<String, ComposeError> {
        self.manifest.to_yaml()
    }
}

/// The manifest composition engine.
///
/// A pure function of (config, catalog) except for entropy consumption:
/// each [`Composer::compose`] call builds everything from scratch, so
/// concurrent invocations share nothing but the entropy source.
pub struct Composer<S: SecretSource = OsEntropy> {
    catalog: BrickCatalog,
    entropy: S,
}

impl Composer<OsEntropy> {
    /// Engine over the builtin brick catalog and the OS CSPRNG.
    pub fn new() -> Self {
        Self::with_entropy(BrickCatalog::builtin(), OsEntropy)
    }
}

impl Default for Composer<OsEntropy> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SecretSource> Composer<S> {
    pub fn with_entropy(catalog: BrickCatalog, entropy: S) -> Self {
        Self { catalog, entropy }
    }

    pub fn catalog(&self) -> &BrickCatalog {
        &self.catalog
    }

    /// Runs the linear pipeline: validate, resolve secrets, build the core
    /// topology, graft the enabled bricks, and return the result. A failure
    /// at any stage aborts the whole composition.
    pub fn compose(&self, config: &FacilityConfig) -> Result<Composition, ComposeError> {
        config.validate()?;

        let mut resolver = SecretResolver::new(&self.entropy);
        let mut manifest = Manifest::new(config.project_slug());
        let mut warnings = Vec::new();

        let secrets = resolve_secrets(config, &mut resolver)?;
        let core = build_core(config, &secrets, &mut resolver, &mut manifest)?;
        assemble_bricks(
            &config.modules,
            &self.catalog,
            &core,
            &mut resolver,
            &mut manifest,
            &mut warnings,
        )?;

        debug!(
            facility = %config.facility_name,
            services = manifest.service_ids().count(),
            warnings = warnings.len(),
            "composition complete"
        );
        Ok(Composition {
            manifest,
            ledger: resolver.into_ledger(),
            warnings,
        })
    }
}

/// Caller contract for the wizard layer: one validated config in, rendered
/// manifest text out. Uses the builtin catalog and the OS entropy source.
pub fn generate_manifest(config: &FacilityConfig) -> Result<String, ComposeError> {
    Composer::new().compose(config)?.to_yaml()
}
