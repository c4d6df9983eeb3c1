//! Read-only registry of known autorouters.

use std::collections::BTreeMap;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::AutorouterError;

/// Routing features an autorouter advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    PushAndShove,
    MultiLayer,
    Vias,
    InBrowser,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::PushAndShove => "push_and_shove",
            Capability::MultiLayer => "multi_layer",
            Capability::Vias => "vias",
            Capability::InBrowser => "in_browser",
        };
        f.write_str(name)
    }
}

/// Static description of one autorouter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutorouterDescriptor {
    pub id: String,
    pub name: String,
    pub version: Version,
    pub description: String,
    pub github_url: Option<String>,
    pub website_url: Option<String>,
    pub license: String,
    pub capabilities: Vec<Capability>,
}

impl AutorouterDescriptor {
    /// Builds a descriptor, validating `version` as semver.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        version: &str,
        description: impl Into<String>,
        license: impl Into<String>,
    ) -> Result<Self, semver::Error> {
        Ok(Self {
            id: id.into(),
            name: name.into(),
            version: Version::parse(version)?,
            description: description.into(),
            github_url: None,
            website_url: None,
            license: license.into(),
            capabilities: Vec::new(),
        })
    }

    pub fn with_github_url(mut self, url: impl Into<String>) -> Self {
        self.github_url = Some(url.into());
        self
    }

    pub fn with_website_url(mut self, url: impl Into<String>) -> Self {
        self.website_url = Some(url.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: &[Capability]) -> Self {
        self.capabilities = capabilities.to_vec();
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// Lookup table of autorouter descriptors by id.
#[derive(Debug, Clone, Default)]
pub struct AutorouterRegistry {
    entries: BTreeMap<String, AutorouterDescriptor>,
}

impl AutorouterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with FreeRouting and the tscircuit built-in router.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor);
        }
        registry
    }

    pub fn register(&mut self, descriptor: AutorouterDescriptor) {
        self.entries.insert(descriptor.id.clone(), descriptor);
    }

    /// Looks up `id`, failing with `UnknownAutorouter` when absent.
    pub fn get(&self, id: &str) -> Result<&AutorouterDescriptor, AutorouterError> {
        self.entries
            .get(id)
            .ok_or_else(|| AutorouterError::UnknownAutorouter(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AutorouterDescriptor> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_descriptors() -> Vec<AutorouterDescriptor> {
    let mut descriptors = Vec::new();

    // Versions below are literals known to parse.
    if let Ok(d) = AutorouterDescriptor::new(
        "freerouting",
        "FreeRouting",
        "1.9.0",
        "Java-based autorouter with push and shove routing capability",
        "GPL",
    ) {
        descriptors.push(
            d.with_github_url("https://github.com/freerouting/freerouting")
                .with_website_url("https://freerouting.org")
                .with_capabilities(&[
                    Capability::PushAndShove,
                    Capability::MultiLayer,
                    Capability::Vias,
                ]),
        );
    }

    if let Ok(d) = AutorouterDescriptor::new(
        "tscircuit-builtin",
        "TSCircuit Built-in Router",
        "0.1.0",
        "Basic autorouter built into TSCircuit",
        "MIT",
    ) {
        descriptors.push(
            d.with_github_url("https://github.com/tscircuit/tscircuit")
                .with_capabilities(&[Capability::InBrowser]),
        );
    }

    descriptors
}
