use std::collections::BTreeMap;

use tracing::debug;

use crate::config::{DatabaseBackend, FacilityConfig};
use crate::error::ComposeError;
use crate::manifest::{Manifest, NetworkSpec, PortMapping, RestartPolicy, ServiceSpec, VolumeMount};
use crate::secret::{
    ADMIN_PASSWORD_BYTES, PASSWORD_BYTES, SIGNING_KEY_BYTES, SecretResolver, SecretSource,
};

/// Shared network every service attaches to.
pub const NETWORK: &str = "preclini-net";
/// Database service identifier and, in embedded mode, its hostname.
pub const DATABASE_SERVICE: &str = "db";
/// Cache service backing the identity broker.
pub const CACHE_SERVICE: &str = "redis";
/// Identity broker service identifier.
pub const IDENTITY_SERVICE: &str = "authentik-server";
/// Mandatory audit/ledger service identifier.
pub const NOTARY_SERVICE: &str = "preclinilog";

const DATABASE_IMAGE: &str = "postgres:16-alpine";
const CACHE_IMAGE: &str = "redis:7-alpine";
const IDENTITY_IMAGE: &str = "ghcr.io/goauthentik/server:2024.12.3";
const NOTARY_IMAGE: &str = "ghcr.io/precliniverse/preclinilog:2.3.1";

const DATABASE_USER: &str = "precliniverse";
const DATABASE_NAME: &str = "precliniverse";
const DATABASE_VOLUME: &str = "db_data";

const IDENTITY_PORT: u16 = 9000;
const NOTARY_INTERNAL_PORT: u16 = 8000;

/// Credentials resolved up front, before any service assembly; a supplied
/// value that fails the embeddability check aborts here, never mid-build.
pub(crate) struct ResolvedSecrets {
    pub database_password: String,
    pub sso_password: String,
    pub admin_password: String,
}

pub(crate) fn resolve_secrets<S: SecretSource>(
    config: &FacilityConfig,
    resolver: &mut SecretResolver<S>,
) -> Result<ResolvedSecrets, ComposeError> {
    let database_password = match &config.database {
        DatabaseBackend::Embedded { password } => {
            resolver.resolve("database_password", password.as_deref(), PASSWORD_BYTES)?
        }
        DatabaseBackend::External(external) => {
            resolver.resolve("database_password", Some(&external.password), PASSWORD_BYTES)?
        }
    };
    let sso_password = resolver.resolve(
        "sso_password",
        config.sso_password.as_deref(),
        PASSWORD_BYTES,
    )?;
    let admin_password = resolver.resolve(
        "admin_password",
        config.admin.password.as_deref(),
        ADMIN_PASSWORD_BYTES,
    )?;
    if config.mail.as_ref().is_some_and(|m| m.password.is_some()) {
        resolver.note_supplied("mail_password");
    }
    Ok(ResolvedSecrets {
        database_password,
        sso_password,
        admin_password,
    })
}

/// Resolved core facts the brick assembler wires against.
pub(crate) struct CoreState {
    pub database_host: String,
    pub database_port: u16,
    pub database_password: String,
    /// Whether a database service exists in this manifest (embedded mode);
    /// controls the notary's dependency edge.
    pub database_service_present: bool,
}

impl CoreState {
    /// Connection string every consumer of the shared database embeds.
    pub fn connection_string(&self) -> String {
        format!(
            "postgresql://{DATABASE_USER}:{}@{}:{}/{DATABASE_NAME}",
            self.database_password, self.database_host, self.database_port
        )
    }
}

/// Issuer URL the identity broker publishes for one OIDC client.
pub(crate) fn oidc_issuer(client: &str) -> String {
    format!("http://{IDENTITY_SERVICE}:{IDENTITY_PORT}/application/o/{client}/")
}

/// Address at which the notary accepts requests from the bricks.
pub(crate) fn notary_url() -> String {
    format!("http://{NOTARY_SERVICE}:{NOTARY_INTERNAL_PORT}")
}

/// Assembles the mandatory services every deployment needs and threads the
/// resolved database address through to the brick assembler.
pub(crate) fn build_core<S: SecretSource>(
    config: &FacilityConfig,
    secrets: &ResolvedSecrets,
    resolver: &mut SecretResolver<S>,
    manifest: &mut Manifest,
) -> Result<CoreState, ComposeError> {
    manifest.add_network(
        NETWORK,
        NetworkSpec {
            driver: "bridge".to_string(),
        },
    );

    let core = build_database(config, secrets, manifest)?;
    build_cache(&secrets.sso_password, manifest)?;
    build_identity_broker(config, secrets, resolver, &core, manifest)?;
    build_notary(resolver, &core, manifest)?;

    debug!(
        database_host = %core.database_host,
        embedded = core.database_service_present,
        "assembled core topology"
    );
    Ok(core)
}

fn build_database(
    config: &FacilityConfig,
    secrets: &ResolvedSecrets,
    manifest: &mut Manifest,
) -> Result<CoreState, ComposeError> {
    match &config.database {
        DatabaseBackend::Embedded { .. } => {
            let mut environment = BTreeMap::new();
            environment.insert("POSTGRES_USER".to_string(), DATABASE_USER.to_string());
            environment.insert(
                "POSTGRES_PASSWORD".to_string(),
                secrets.database_password.clone(),
            );
            environment.insert("POSTGRES_DB".to_string(), DATABASE_NAME.to_string());

            manifest.push_service(
                DATABASE_SERVICE,
                ServiceSpec {
                    image: DATABASE_IMAGE.to_string(),
                    restart: RestartPolicy::Always,
                    environment,
                    volumes: vec![VolumeMount::new(
                        DATABASE_VOLUME,
                        "/var/lib/postgresql/data",
                    )],
                    networks: vec![NETWORK.to_string()],
                    ..Default::default()
                },
            )?;
            manifest.add_volume(DATABASE_VOLUME);

            Ok(CoreState {
                database_host: DATABASE_SERVICE.to_string(),
                database_port: 5432,
                database_password: secrets.database_password.clone(),
                database_service_present: true,
            })
        }
        DatabaseBackend::External(external) => {
            // No service is emitted; consumers point at the operator's
            // server and nothing downstream knows the difference.
            Ok(CoreState {
                database_host: external.host.clone(),
                database_port: external.port,
                database_password: secrets.database_password.clone(),
                database_service_present: false,
            })
        }
    }
}

fn build_cache(sso_password: &str, manifest: &mut Manifest) -> Result<(), ComposeError> {
    manifest.push_service(
        CACHE_SERVICE,
        ServiceSpec {
            image: CACHE_IMAGE.to_string(),
            restart: RestartPolicy::Always,
            command: Some(format!("--requirepass {sso_password}")),
            networks: vec![NETWORK.to_string()],
            ..Default::default()
        },
    )
}

fn build_identity_broker<S: SecretSource>(
    config: &FacilityConfig,
    secrets: &ResolvedSecrets,
    resolver: &mut SecretResolver<S>,
    core: &CoreState,
    manifest: &mut Manifest,
) -> Result<(), ComposeError> {
    // Independent from the identity password; never suppliable.
    let signing_key = resolver.fresh("authentik_secret_key", SIGNING_KEY_BYTES)?;

    let mut environment = BTreeMap::new();
    environment.insert(
        "AUTHENTIK_REDIS__HOST".to_string(),
        CACHE_SERVICE.to_string(),
    );
    environment.insert(
        "AUTHENTIK_REDIS__PASSWORD".to_string(),
        secrets.sso_password.clone(),
    );
    environment.insert(
        "AUTHENTIK_POSTGRESQL__HOST".to_string(),
        core.database_host.clone(),
    );
    environment.insert(
        "AUTHENTIK_POSTGRESQL__USER".to_string(),
        DATABASE_USER.to_string(),
    );
    environment.insert(
        "AUTHENTIK_POSTGRESQL__NAME".to_string(),
        DATABASE_NAME.to_string(),
    );
    environment.insert(
        "AUTHENTIK_POSTGRESQL__PASSWORD".to_string(),
        core.database_password.clone(),
    );
    environment.insert("AUTHENTIK_SECRET_KEY".to_string(), signing_key);
    environment.insert(
        "AUTHENTIK_BOOTSTRAP_EMAIL".to_string(),
        config.admin.email.clone(),
    );
    environment.insert(
        "AUTHENTIK_BOOTSTRAP_PASSWORD".to_string(),
        secrets.admin_password.clone(),
    );

    if let Some(mail) = &config.mail {
        if let Some(host) = &mail.host {
            environment.insert("AUTHENTIK_EMAIL__HOST".to_string(), host.clone());
        }
        if let Some(port) = mail.port {
            environment.insert("AUTHENTIK_EMAIL__PORT".to_string(), port.to_string());
        }
        if let Some(user) = &mail.user {
            environment.insert("AUTHENTIK_EMAIL__USERNAME".to_string(), user.clone());
        }
        if let Some(password) = &mail.password {
            environment.insert("AUTHENTIK_EMAIL__PASSWORD".to_string(), password.clone());
        }
        if mail.use_tls {
            environment.insert("AUTHENTIK_EMAIL__USE_TLS".to_string(), "true".to_string());
        }
        if let Some(from) = &mail.from_address {
            environment.insert("AUTHENTIK_EMAIL__FROM".to_string(), from.clone());
        }
    }

    manifest.push_service(
        IDENTITY_SERVICE,
        ServiceSpec {
            image: IDENTITY_IMAGE.to_string(),
            restart: RestartPolicy::Always,
            command: Some("server".to_string()),
            environment,
            volumes: vec![VolumeMount::new("./media", "/media")],
            networks: vec![NETWORK.to_string()],
            ports: vec![PortMapping::new(IDENTITY_PORT, IDENTITY_PORT)],
            ..Default::default()
        },
    )
}

fn build_notary<S: SecretSource>(
    resolver: &mut SecretResolver<S>,
    core: &CoreState,
    manifest: &mut Manifest,
) -> Result<(), ComposeError> {
    let signing_key = resolver.fresh("preclinilog_secret_key", SIGNING_KEY_BYTES)?;

    let mut environment = BTreeMap::new();
    environment.insert("DATABASE_URL".to_string(), core.connection_string());
    environment.insert("SECRET_KEY".to_string(), signing_key);
    environment.insert("OIDC_ISSUER".to_string(), oidc_issuer(NOTARY_SERVICE));

    // The startup-ordering edges are recorded for the deployment runtime;
    // the db edge only exists when a db service does.
    let mut depends_on = Vec::new();
    if core.database_service_present {
        depends_on.push(DATABASE_SERVICE.to_string());
    }
    depends_on.push(IDENTITY_SERVICE.to_string());

    manifest.push_service(
        NOTARY_SERVICE,
        ServiceSpec {
            image: NOTARY_IMAGE.to_string(),
            restart: RestartPolicy::Always,
            environment,
            networks: vec![NETWORK.to_string()],
            depends_on,
            ports: vec![PortMapping::new(8001, NOTARY_INTERNAL_PORT)],
            ..Default::default()
        },
    )
}
