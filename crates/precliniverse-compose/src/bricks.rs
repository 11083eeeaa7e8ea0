use std::collections::BTreeMap;
use std::collections::HashSet;

use tracing::{debug, warn};

use crate::catalog::BrickCatalog;
use crate::compose::CompositionWarning;
use crate::error::ComposeError;
use crate::manifest::{Manifest, RestartPolicy, ServiceSpec};
use crate::secret::{SIGNING_KEY_BYTES, SecretResolver, SecretSource};
use crate::topology::{CoreState, NETWORK, NOTARY_SERVICE, notary_url, oidc_issuer};

/// Grafts each enabled brick onto the already-built core.
///
/// Bricks form a flat fan-out: every brick depends on the notary and on
/// nothing else, so enabling or dropping one never disturbs another.
/// Duplicate identifiers contribute one service, in first-mention order;
/// identifiers absent from the catalog contribute a warning instead.
pub(crate) fn assemble_bricks<S: SecretSource>(
    enabled: &[String],
    catalog: &BrickCatalog,
    core: &CoreState,
    resolver: &mut SecretResolver<S>,
    manifest: &mut Manifest,
    warnings: &mut Vec<CompositionWarning>,
) -> Result<(), ComposeError> {
    let mut seen = HashSet::new();
    for id in enabled {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let Some(descriptor) = catalog.get(id) else {
            warn!(module = %id, "enabled module is not in the catalog, skipping");
            warnings.push(CompositionWarning::UnknownModule(id.clone()));
            continue;
        };

        // Signing keys are per-service; a brick never reuses another
        // service's key.
        let signing_key = resolver.fresh_for_module(id, SIGNING_KEY_BYTES)?;

        let mut environment = BTreeMap::new();
        environment.insert("DATABASE_URL".to_string(), core.connection_string());
        environment.insert("SECRET_KEY".to_string(), signing_key);
        environment.insert(
            "OIDC_ISSUER".to_string(),
            oidc_issuer(&descriptor.oidc_client),
        );
        environment.insert("PRECLINILOG_URL".to_string(), notary_url());

        manifest.push_service(
            id.clone(),
            ServiceSpec {
                image: descriptor.image.clone(),
                restart: RestartPolicy::Always,
                environment,
                networks: vec![NETWORK.to_string()],
                depends_on: vec![NOTARY_SERVICE.to_string()],
                ports: vec![descriptor.port],
                ..Default::default()
            },
        )?;
        debug!(module = %id, image = %descriptor.image, "assembled brick");
    }
    Ok(())
}
