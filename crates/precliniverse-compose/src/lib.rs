pub mod bricks;
pub mod catalog;
pub mod compose;
pub mod config;
pub mod error;
pub mod manifest;
pub mod secret;
pub mod topology;

pub use catalog::{BrickCatalog, BrickDescriptor};
pub use compose::{Composer, Composition, CompositionWarning, generate_manifest};
pub use config::{
    AdminAccount, DatabaseBackend, ExternalDatabase, FacilityConfig, MailSettings,
};
pub use error::ComposeError;
pub use manifest::{
    COMPOSE_VERSION, Manifest, NetworkSpec, PortMapping, RestartPolicy, ServiceSpec, VolumeMount,
    VolumeSpec,
};
pub use secret::{
    ADMIN_PASSWORD_BYTES, OsEntropy, PASSWORD_BYTES, SIGNING_KEY_BYTES, SecretLedger,
    SecretProvenance, SecretResolver, SecretSource,
};
pub use topology::{CACHE_SERVICE, DATABASE_SERVICE, IDENTITY_SERVICE, NETWORK, NOTARY_SERVICE};
