use std::sync::atomic::{AtomicU8, Ordering};

use precliniverse_compose::{
    AdminAccount, BrickCatalog, ComposeError, Composer, DatabaseBackend, FacilityConfig,
    IDENTITY_SERVICE, MailSettings, NOTARY_SERVICE, SecretProvenance, SecretSource,
};

/// Deterministic entropy: fills buffers with a running counter so two
/// freshly constructed sources replay the same byte stream.
struct ScriptedEntropy {
    counter: AtomicU8,
}

impl ScriptedEntropy {
    fn new() -> Self {
        Self {
            counter: AtomicU8::new(0),
        }
    }
}

impl SecretSource for ScriptedEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), ComposeError> {
        for b in buf.iter_mut() {
            *b = self.counter.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

fn full_config() -> FacilityConfig {
    FacilityConfig {
        facility_name: "Acme Labs".to_string(),
        database: DatabaseBackend::Embedded {
            password: Some("db-pass.1".to_string()),
        },
        sso_password: Some("sso-pass.1".to_string()),
        modules: vec!["precliniquote".to_string()],
        admin: AdminAccount {
            email: "ops@acme.example".to_string(),
            password: Some("admin-pass.1".to_string()),
        },
        mail: Some(MailSettings {
            host: Some("smtp.acme.example".to_string()),
            password: Some("mail-pass".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn ledger_separates_supplied_from_generated_fields() {
    let mut config = full_config();
    config.database = Default::default();
    config.sso_password = None;
    let composition = Composer::new().compose(&config).unwrap();
    let ledger = &composition.ledger;

    assert_eq!(
        ledger.provenance("database_password"),
        Some(SecretProvenance::Generated)
    );
    assert_eq!(
        ledger.provenance("sso_password"),
        Some(SecretProvenance::Generated)
    );
    assert_eq!(
        ledger.provenance("admin_password"),
        Some(SecretProvenance::Supplied)
    );
    assert_eq!(
        ledger.provenance("mail_password"),
        Some(SecretProvenance::Supplied)
    );
    for key in [
        "authentik_secret_key",
        "preclinilog_secret_key",
        "precliniquote_secret_key",
    ] {
        assert_eq!(
            ledger.provenance(key),
            Some(SecretProvenance::Generated),
            "{key}"
        );
    }
}

#[test]
fn deterministic_source_yields_byte_identical_manifests() {
    let config = full_config();
    let first = Composer::with_entropy(BrickCatalog::builtin(), ScriptedEntropy::new())
        .compose(&config)
        .unwrap()
        .to_yaml()
        .unwrap();
    let second = Composer::with_entropy(BrickCatalog::builtin(), ScriptedEntropy::new())
        .compose(&config)
        .unwrap()
        .to_yaml()
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn os_entropy_changes_only_generated_values() {
    let config = full_config();
    let first = Composer::new().compose(&config).unwrap().manifest;
    let second = Composer::new().compose(&config).unwrap().manifest;

    // Structure is identical across calls.
    assert_eq!(
        first.service_ids().collect::<Vec<_>>(),
        second.service_ids().collect::<Vec<_>>()
    );
    assert_eq!(
        first.networks().keys().collect::<Vec<_>>(),
        second.networks().keys().collect::<Vec<_>>()
    );
    assert_eq!(
        first.volumes().keys().collect::<Vec<_>>(),
        second.volumes().keys().collect::<Vec<_>>()
    );
    for (id, spec) in first.services() {
        let other = second.service(id).unwrap();
        assert_eq!(spec.depends_on, other.depends_on, "{id}");
        assert_eq!(spec.ports, other.ports, "{id}");
        assert_eq!(spec.image, other.image, "{id}");
    }

    // Supplied secrets are stable; signing keys are fresh per call.
    let env = |m: &precliniverse_compose::Manifest, id: &str, key: &str| {
        m.service(id).unwrap().env(key).unwrap().to_string()
    };
    assert_eq!(
        env(&first, "db", "POSTGRES_PASSWORD"),
        env(&second, "db", "POSTGRES_PASSWORD")
    );
    assert_eq!(
        env(&first, IDENTITY_SERVICE, "AUTHENTIK_BOOTSTRAP_PASSWORD"),
        env(&second, IDENTITY_SERVICE, "AUTHENTIK_BOOTSTRAP_PASSWORD")
    );
    assert_ne!(
        env(&first, NOTARY_SERVICE, "SECRET_KEY"),
        env(&second, NOTARY_SERVICE, "SECRET_KEY")
    );
    assert_ne!(
        env(&first, IDENTITY_SERVICE, "AUTHENTIK_SECRET_KEY"),
        env(&second, IDENTITY_SERVICE, "AUTHENTIK_SECRET_KEY")
    );
}

#[test]
fn generated_database_password_differs_between_invocations() {
    let mut config = full_config();
    config.database = Default::default();
    let first = Composer::new().compose(&config).unwrap().manifest;
    let second = Composer::new().compose(&config).unwrap().manifest;
    assert_ne!(
        first.service("db").unwrap().env("POSTGRES_PASSWORD"),
        second.service("db").unwrap().env("POSTGRES_PASSWORD")
    );
}
