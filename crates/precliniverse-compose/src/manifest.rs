use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::ComposeError;

/// Compose file schema version emitted at the top of every manifest.
pub const COMPOSE_VERSION: &str = "3.8";

/// Container restart policy for a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    UnlessStopped,
    #[serde(rename = "no")]
    Never,
}

/// Published port in compose short syntax (`host:container`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl PortMapping {
    pub const fn new(host: u16, container: u16) -> Self {
        Self { host, container }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

impl Serialize for PortMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// The schema mirrors the serialized short-syntax string, not the field pair.
impl JsonSchema for PortMapping {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("PortMapping")
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

/// Volume mount in compose short syntax; the source is either a named
/// volume identifier or a host path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

impl VolumeMount {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)
    }
}

impl Serialize for VolumeMount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl JsonSchema for VolumeMount {
    fn schema_name() -> Cow<'static, str> {
        Cow::Borrowed("VolumeMount")
    }

    fn inline_schema() -> bool {
        true
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        String::json_schema(generator)
    }
}

/// One deployable unit. Every environment value is a fully resolved string;
/// nothing downstream performs further templating.
#[derive(Clone, Debug, Default, Serialize, JsonSchema)]
pub struct ServiceSpec {
    pub image: String,
    pub restart: RestartPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
}

impl ServiceSpec {
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }
}

/// Shared network, created implicitly by being referenced.
#[derive(Clone, Debug, Serialize, JsonSchema)]
pub struct NetworkSpec {
    pub driver: String,
}

/// Named persistent volume; compose expects an empty mapping body.
#[derive(Clone, Debug, Default, Serialize, JsonSchema)]
pub struct VolumeSpec {}

/// Fully resolved deployment description: services in dependency-respecting
/// assembly order plus the shared networks and volumes they reference.
///
/// Service key order is preserved exactly as assembled because the rendered
/// text is shown to the operator for review and stable ordering aids
/// diffing across repeated generations.
#[derive(Clone, Debug)]
pub struct Manifest {
    name: String,
    services: Vec<(String, ServiceSpec)>,
    networks: BTreeMap<String, NetworkSpec>,
    volumes: BTreeMap<String, VolumeSpec>,
}

impl Manifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            services: Vec::new(),
            networks: BTreeMap::new(),
            volumes: BTreeMap::new(),
        }
    }

    /// Compose project name (the facility slug).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a service, keeping identifiers unique within the manifest.
    pub(crate) fn push_service(
        &mut self,
        id: impl Into<String>,
        spec: ServiceSpec,
    ) -> Result<(), ComposeError> {
        let id = id.into();
        if self.services.iter().any(|(existing, _)| *existing == id) {
            return Err(ComposeError::InvalidConfig(format!(
                "service identifier {id:?} is already taken"
            )));
        }
        self.services.push((id, spec));
        Ok(())
    }

    pub(crate) fn add_network(&mut self, id: impl Into<String>, spec: NetworkSpec) {
        self.networks.entry(id.into()).or_insert(spec);
    }

    pub(crate) fn add_volume(&mut self, id: impl Into<String>) {
        self.volumes.entry(id.into()).or_default();
    }

    pub fn service(&self, id: &str) -> Option<&ServiceSpec> {
        self.services
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, spec)| spec)
    }

    /// Service identifiers in assembly order.
    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(id, _)| id.as_str())
    }

    pub fn services(&self) -> impl Iterator<Item = (&str, &ServiceSpec)> {
        self.services.iter().map(|(id, spec)| (id.as_str(), spec))
    }

    pub fn networks(&self) -> &BTreeMap<String, NetworkSpec> {
        &self.networks
    }

    pub fn volumes(&self) -> &BTreeMap<String, VolumeSpec> {
        &self.volumes
    }

    /// Renders the manifest to compose YAML.
    pub fn to_yaml(&self) -> Result<String, ComposeError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }
}

struct ServiceMap<'a>(&'a [(String, ServiceSpec)]);

impl Serialize for ServiceMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, spec) in self.0 {
            map.serialize_entry(id, spec)?;
        }
        map.end()
    }
}

// Hand-written so the `services` mapping keeps assembly order; a derived
// impl over a sorted map would reorder the document under the operator.
impl Serialize for Manifest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("version", COMPOSE_VERSION)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("services", &ServiceMap(&self.services))?;
        map.serialize_entry("networks", &self.networks)?;
        map.serialize_entry("volumes", &self.volumes)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_syntax_renders_host_colon_container() {
        assert_eq!(PortMapping::new(8001, 8000).to_string(), "8001:8000");
        assert_eq!(
            VolumeMount::new("db_data", "/var/lib/postgresql/data").to_string(),
            "db_data:/var/lib/postgresql/data"
        );
    }

    #[test]
    fn port_and_mount_schemas_match_the_string_wire_format() {
        for schema in [
            schemars::schema_for!(PortMapping),
            schemars::schema_for!(VolumeMount),
        ] {
            let value = serde_yaml::to_value(&schema).unwrap();
            assert_eq!(value["type"].as_str(), Some("string"), "{value:?}");
        }
    }
}
