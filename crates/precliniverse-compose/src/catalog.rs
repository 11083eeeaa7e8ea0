use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::Serialize;

use crate::manifest::PortMapping;

/// Everything the assembler needs to graft one brick onto the core:
/// a pinned image, the published port, and the OIDC client identifier the
/// identity broker scopes the brick's issuer URL to.
///
/// Images are pinned to exact tags; a floating tag would make repeated
/// generations irreproducible.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct BrickDescriptor {
    pub image: String,
    pub port: PortMapping,
    pub oidc_client: String,
}

/// Catalog of the optional bricks a facility may enable, keyed by module
/// identifier. Identifiers absent from the catalog contribute no service.
#[derive(Clone, Debug)]
pub struct BrickCatalog {
    entries: BTreeMap<String, BrickDescriptor>,
}

impl BrickCatalog {
    /// The bricks shipped with Precliniverse.
    pub fn builtin() -> Self {
        let mut catalog = Self {
            entries: BTreeMap::new(),
        };
        catalog.register(
            "precliniquote",
            BrickDescriptor {
                image: "ghcr.io/precliniverse/precliniquote:1.8.2".to_string(),
                port: PortMapping::new(5000, 5000),
                oidc_client: "precliniquote".to_string(),
            },
        );
        catalog.register(
            "preclinistock",
            BrickDescriptor {
                image: "ghcr.io/precliniverse/preclinistock:0.9.4".to_string(),
                port: PortMapping::new(5100, 5000),
                oidc_client: "preclinistock".to_string(),
            },
        );
        catalog.register(
            "precliniplan",
            BrickDescriptor {
                image: "ghcr.io/precliniverse/precliniplan:1.2.0".to_string(),
                port: PortMapping::new(5200, 5000),
                oidc_client: "precliniplan".to_string(),
            },
        );
        catalog
    }

    /// Registers (or replaces) a brick under `id`.
    pub fn register(&mut self, id: impl Into<String>, descriptor: BrickDescriptor) {
        self.entries.insert(id.into(), descriptor);
    }

    pub fn get(&self, id: &str) -> Option<&BrickDescriptor> {
        self.entries.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Default for BrickCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
