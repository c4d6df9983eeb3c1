//! Template references and the sandbox entry script.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::error::EvaluationError;

/// Import name of the published keyboard sample template.
pub const KEYBOARD_IMPORT: &str = "@tsci/seveibar.keyboard-sample";

/// Entry script executed inside the sandbox. The template module's default
/// export receives the injected `sampleNumber` prop.
const ENTRY_TEMPLATE: &str = r#"import MyCircuit from "{{ import_name }}"

circuit.add(<MyCircuit sampleNumber={ {{ sample_number }} } />)
"#;

/// A resolved reference to a circuit template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    /// Circuit type, e.g. `keyboard`.
    pub name: String,
    /// Module specifier imported by the entry script.
    pub import_name: String,
}

impl TemplateRef {
    pub fn new(name: impl Into<String>, import_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            import_name: import_name.into(),
        }
    }
}

/// Known circuit types and the modules they import.
///
/// A name mapped to `None` is recognised but has no published template yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, Option<String>>,
}

impl TemplateCatalog {
    /// The built-in catalog.
    pub fn builtin() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert("keyboard".to_string(), Some(KEYBOARD_IMPORT.to_string()));
        templates.insert("blinking-led".to_string(), None);
        Self { templates }
    }

    /// Loads `name: import_name` overrides from a YAML file on top of the built-ins.
    pub fn load_overrides(mut self, path: &Path) -> Result<Self, EvaluationError> {
        let contents = std::fs::read_to_string(path)?;
        let overrides: BTreeMap<String, String> = serde_yaml::from_str(&contents)
            .map_err(|e| {
                EvaluationError::SandboxProvision(format!(
                    "invalid template catalog {}: {}",
                    path.display(),
                    e
                ))
            })?;
        for (name, import_name) in overrides {
            self.templates.insert(name, Some(import_name));
        }
        Ok(self)
    }

    /// Binds `name` to `import_name`, replacing any previous binding.
    pub fn with_template(mut self, name: impl Into<String>, import_name: impl Into<String>) -> Self {
        self.templates.insert(name.into(), Some(import_name.into()));
        self
    }

    /// Resolves a circuit type to a template reference.
    pub fn resolve(&self, name: &str) -> Result<TemplateRef, EvaluationError> {
        match self.templates.get(name) {
            Some(Some(import_name)) => Ok(TemplateRef::new(name, import_name.clone())),
            _ => Err(EvaluationError::UnknownTemplate(name.to_string())),
        }
    }

    /// Resolves `name`, using `import_override` in place of the catalog binding.
    pub fn resolve_with_import(
        &self,
        name: &str,
        import_override: Option<&str>,
    ) -> Result<TemplateRef, EvaluationError> {
        match import_override {
            Some(import_name) if self.templates.contains_key(name) => {
                Ok(TemplateRef::new(name, import_name))
            }
            _ => self.resolve(name),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Renders the sandbox entry script for one sample.
pub fn render_entry_script(
    template: &TemplateRef,
    sample_number: u32,
) -> Result<String, EvaluationError> {
    // The import name lands inside a string literal of executable code.
    let module_specifier = Regex::new(r"^[@A-Za-z0-9_./-]+$").map_err(|e| {
        EvaluationError::SandboxProvision(format!("invalid import pattern: {}", e))
    })?;
    if !module_specifier.is_match(&template.import_name) {
        return Err(EvaluationError::UnknownTemplate(template.import_name.clone()));
    }

    let mut context = Context::new();
    context.insert("import_name", &template.import_name);
    context.insert("sample_number", &sample_number);
    Ok(Tera::one_off(ENTRY_TEMPLATE, &context, false)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_resolves_keyboard() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.resolve("keyboard").unwrap();
        assert_eq!(template.import_name, KEYBOARD_IMPORT);
    }

    #[test]
    fn test_unbound_and_unknown_names_fail() {
        let catalog = TemplateCatalog::builtin();
        assert!(matches!(
            catalog.resolve("blinking-led"),
            Err(EvaluationError::UnknownTemplate(name)) if name == "blinking-led"
        ));
        assert!(catalog.resolve("toaster").is_err());
    }

    #[test]
    fn test_import_override_requires_known_name() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog
            .resolve_with_import("blinking-led", Some("@tsci/me.blinky"))
            .unwrap();
        assert_eq!(template.import_name, "@tsci/me.blinky");
        assert!(catalog
            .resolve_with_import("toaster", Some("@tsci/me.toaster"))
            .is_err());
    }

    #[test]
    fn test_load_overrides_from_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "blinking-led: \"@tsci/me.blinky\"").unwrap();

        let catalog = TemplateCatalog::builtin()
            .load_overrides(file.path())
            .unwrap();
        assert_eq!(
            catalog.resolve("blinking-led").unwrap().import_name,
            "@tsci/me.blinky"
        );
    }

    #[test]
    fn test_entry_script_injects_sample_number() {
        let template = TemplateRef::new("keyboard", KEYBOARD_IMPORT);
        let script = render_entry_script(&template, 7).unwrap();

        assert!(script.contains(r#"import MyCircuit from "@tsci/seveibar.keyboard-sample""#));
        assert!(script.contains("sampleNumber={ 7 }"));
    }

    #[test]
    fn test_entry_script_rejects_injection() {
        let template = TemplateRef::new("keyboard", "x\"; process.exit(1); \"");
        assert!(render_entry_script(&template, 1).is_err());
    }
}
