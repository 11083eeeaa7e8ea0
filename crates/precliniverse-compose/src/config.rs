use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ComposeError;

/// Validated input record describing one facility deployment.
///
/// The wizard layer is responsible for decoding raw form fields into this
/// shape (splitting module lists, mapping empty fields to `None`); the
/// engine only checks structural invariants via [`FacilityConfig::validate`].
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct FacilityConfig {
    /// Human-readable facility name; becomes the compose project name.
    pub facility_name: String,
    /// Where the shared PostgreSQL database lives.
    #[serde(default)]
    pub database: DatabaseBackend,
    /// Identity-broker access password; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sso_password: Option<String>,
    /// Enabled brick identifiers, in the order the operator picked them.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Administrator bootstrap account for the identity broker.
    pub admin: AdminAccount,
    /// Outbound mail settings, forwarded to the identity broker when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<MailSettings>,
}

/// Database placement: a managed service inside the manifest or an
/// operator-provided server outside it.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DatabaseBackend {
    /// Emit a database service and wire everything against it.
    Embedded {
        /// Database password; generated when absent.
        #[serde(skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Reuse an existing server; no database service is emitted.
    External(ExternalDatabase),
}

impl Default for DatabaseBackend {
    fn default() -> Self {
        Self::Embedded { password: None }
    }
}

/// Connection details for an operator-provided database server.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExternalDatabase {
    pub host: String,
    #[serde(default = "default_database_port")]
    pub port: u16,
    pub password: String,
}

fn default_database_port() -> u16 {
    5432
}

/// Administrator bootstrap account provisioned on the identity broker.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct AdminAccount {
    pub email: String,
    /// Bootstrap password; generated when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Outbound mail settings; every field is independently optional and only
/// present fields are forwarded into the identity broker's environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct MailSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
}

impl FacilityConfig {
    /// Checks the structural invariants that must hold before any secret
    /// resolution or service assembly begins.
    pub fn validate(&self) -> Result<(), ComposeError> {
        if self.facility_name.trim().is_empty() {
            return Err(ComposeError::InvalidConfig(
                "facility name must not be empty".to_string(),
            ));
        }
        // The slug drops everything else; a name without a single
        // alphanumeric would produce an empty compose project name.
        if !self
            .facility_name
            .chars()
            .any(|ch| ch.is_ascii_alphanumeric())
        {
            return Err(ComposeError::InvalidConfig(format!(
                "facility name {:?} must contain at least one letter or digit",
                self.facility_name
            )));
        }

        if self.admin.email.trim().is_empty() || !self.admin.email.contains('@') {
            return Err(ComposeError::InvalidConfig(format!(
                "administrator email {:?} is not an email address",
                self.admin.email
            )));
        }

        if let DatabaseBackend::External(external) = &self.database {
            if external.host.trim().is_empty() {
                return Err(ComposeError::InvalidConfig(
                    "external database host must not be empty".to_string(),
                ));
            }
            url::Host::parse(&external.host).map_err(|err| {
                ComposeError::InvalidConfig(format!(
                    "external database host {:?} is not a valid host: {err}",
                    external.host
                ))
            })?;
            if external.password.is_empty() {
                return Err(ComposeError::InvalidConfig(
                    "external database password must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Compose project name derived from the facility name: lowercase,
    /// non-alphanumerics collapsed to single dashes.
    pub fn project_slug(&self) -> String {
        let mut slug = String::with_capacity(self.facility_name.len());
        for ch in self.facility_name.trim().chars() {
            if ch.is_ascii_alphanumeric() {
                slug.extend(ch.to_lowercase());
            } else if !slug.ends_with('-') && !slug.is_empty() {
                slug.push('-');
            }
        }
        while slug.ends_with('-') {
            slug.pop();
        }
        slug
    }
}
