use std::collections::BTreeMap;
use std::sync::OnceLock;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Entropy for database and identity-broker passwords.
pub const PASSWORD_BYTES: usize = 16;
/// Entropy for per-service signing keys.
pub const SIGNING_KEY_BYTES: usize = 32;
/// Entropy for the administrator bootstrap password; shorter because it is
/// human-facing, still random-first.
pub const ADMIN_PASSWORD_BYTES: usize = 12;

/// Source of cryptographically secure random bytes.
///
/// Production code uses [`OsEntropy`]; tests inject a scripted source to
/// make composition output exactly reproducible.
pub trait SecretSource: Send + Sync {
    fn fill(&self, buf: &mut [u8]) -> Result<(), ComposeError>;
}

/// Operating-system CSPRNG, safe for concurrent use.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl SecretSource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), ComposeError> {
        getrandom::getrandom(buf).map_err(|err| ComposeError::Entropy(err.to_string()))
    }
}

impl<T> SecretSource for &T
where
    T: SecretSource + ?Sized,
{
    fn fill(&self, buf: &mut [u8]) -> Result<(), ComposeError> {
        (**self).fill(buf)
    }
}

/// Whether a secret value came from the caller or was synthesized here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecretProvenance {
    Supplied,
    Generated,
}

/// Records, per secret-bearing field, whether the value was caller-supplied
/// or engine-generated. Values themselves never enter the ledger.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SecretLedger {
    entries: BTreeMap<String, SecretProvenance>,
}

impl SecretLedger {
    pub fn provenance(&self, field: &str) -> Option<SecretProvenance> {
        self.entries.get(field).copied()
    }

    /// Iterates over the fields whose values the engine synthesized.
    pub fn generated_fields(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, p)| **p == SecretProvenance::Generated)
            .map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SecretProvenance)> {
        self.entries.iter().map(|(k, p)| (k.as_str(), *p))
    }

    fn record(&mut self, field: impl Into<String>, provenance: SecretProvenance) {
        self.entries.insert(field.into(), provenance);
    }
}

/// Alphabet safe to embed in connection strings, issuer URLs, and shell
/// command lines without escaping. Generated secrets (base64url without
/// padding) satisfy it by construction.
fn embeddable(value: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._~\-]+$").expect("Invalid regex")
    });
    re.is_match(value)
}

/// Decides, per credential field, whether to reuse a supplied value or
/// synthesize a new one, recording the outcome in a [`SecretLedger`].
pub struct SecretResolver<S: SecretSource> {
    source: S,
    ledger: SecretLedger,
}

impl<S: SecretSource> SecretResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            ledger: SecretLedger::default(),
        }
    }

    /// Returns the supplied value unchanged after the embeddability check,
    /// or a freshly generated value of `byte_length` bytes of entropy.
    pub fn resolve(
        &mut self,
        field: &'static str,
        supplied: Option<&str>,
        byte_length: usize,
    ) -> Result<String, ComposeError> {
        match supplied {
            Some(value) => {
                if !embeddable(value) {
                    return Err(ComposeError::InvalidSecretInput {
                        field,
                        reason: "must be non-empty and contain only URL-safe characters \
                                 (letters, digits, '.', '_', '~', '-')"
                            .to_string(),
                    });
                }
                self.ledger.record(field, SecretProvenance::Supplied);
                Ok(value.to_string())
            }
            None => {
                let value = self.generate(byte_length)?;
                self.ledger.record(field, SecretProvenance::Generated);
                Ok(value)
            }
        }
    }

    /// Synthesizes a fresh URL-safe secret without consulting the caller;
    /// used for per-service signing keys, which are never suppliable.
    pub fn fresh(
        &mut self,
        field: &'static str,
        byte_length: usize,
    ) -> Result<String, ComposeError> {
        let value = self.generate(byte_length)?;
        self.ledger.record(field, SecretProvenance::Generated);
        Ok(value)
    }

    /// Like [`SecretResolver::fresh`], with the ledger field named after a
    /// module identifier from the catalog.
    pub fn fresh_for_module(
        &mut self,
        module: &str,
        byte_length: usize,
    ) -> Result<String, ComposeError> {
        let value = self.generate(byte_length)?;
        self.ledger
            .record(format!("{module}_secret_key"), SecretProvenance::Generated);
        Ok(value)
    }

    /// Notes a caller-supplied credential that has no generated fallback
    /// (e.g. the outbound mail password).
    pub fn note_supplied(&mut self, field: &'static str) {
        self.ledger.record(field, SecretProvenance::Supplied);
    }

    pub fn into_ledger(self) -> SecretLedger {
        self.ledger
    }

    fn generate(&self, byte_length: usize) -> Result<String, ComposeError> {
        let mut bytes = vec![0u8; byte_length];
        self.source.fill(&mut bytes)?;
        Ok(URL_SAFE_NO_PAD.encode(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fills buffers with a repeating counter so generated values are
    /// reproducible across runs.
    struct ScriptedEntropy {
        counter: std::sync::atomic::AtomicU8,
    }

    impl ScriptedEntropy {
        fn new() -> Self {
            Self {
                counter: std::sync::atomic::AtomicU8::new(0),
            }
        }
    }

    impl SecretSource for ScriptedEntropy {
        fn fill(&self, buf: &mut [u8]) -> Result<(), ComposeError> {
            for b in buf.iter_mut() {
                *b = self
                    .counter
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn supplied_value_passes_through_unchanged() {
        let mut resolver = SecretResolver::new(OsEntropy);
        let value = resolver
            .resolve("db_password", Some("s3cret-Value_0.ok~"), PASSWORD_BYTES)
            .unwrap();
        assert_eq!(value, "s3cret-Value_0.ok~");
        assert_eq!(
            resolver.into_ledger().provenance("db_password"),
            Some(SecretProvenance::Supplied)
        );
    }

    #[test]
    fn rejects_supplied_value_with_unsafe_characters() {
        let mut resolver = SecretResolver::new(OsEntropy);
        for bad in ["", "has space", "semi;colon", "p@ss", "a/b", "q:r"] {
            let err = resolver
                .resolve("sso_password", Some(bad), PASSWORD_BYTES)
                .expect_err("unsafe value should fail");
            assert!(
                matches!(
                    err,
                    ComposeError::InvalidSecretInput {
                        field: "sso_password",
                        ..
                    }
                ),
                "{bad:?}: {err}"
            );
        }
    }

    #[test]
    fn generated_value_is_urlsafe_and_length_proportional() {
        let mut resolver = SecretResolver::new(OsEntropy);
        let value = resolver
            .resolve("secret_key", None, SIGNING_KEY_BYTES)
            .unwrap();
        // 32 bytes -> ceil(32 * 4 / 3) base64 characters, unpadded.
        assert_eq!(value.len(), 43);
        assert!(embeddable(&value), "{value}");
        assert_eq!(
            resolver.into_ledger().provenance("secret_key"),
            Some(SecretProvenance::Generated)
        );
    }

    #[test]
    fn two_generated_values_differ_under_os_entropy() {
        let mut resolver = SecretResolver::new(OsEntropy);
        let a = resolver.fresh("a", PASSWORD_BYTES).unwrap();
        let b = resolver.fresh("b", PASSWORD_BYTES).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn scripted_entropy_is_reproducible() {
        let mut first = SecretResolver::new(ScriptedEntropy::new());
        let mut second = SecretResolver::new(ScriptedEntropy::new());
        assert_eq!(
            first.fresh("k", SIGNING_KEY_BYTES).unwrap(),
            second.fresh("k", SIGNING_KEY_BYTES).unwrap()
        );
    }
}
