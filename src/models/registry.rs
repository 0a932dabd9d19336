use std::collections::HashMap;
use std::sync::OnceLock;

use super::builtin;
use super::family::ModelFamily;
use super::spec::ModelSpec;
use crate::{Error, Result};

static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// The immutable builtin registry shared by every session in the process.
pub fn registry() -> &'static ModelRegistry {
    REGISTRY.get_or_init(ModelRegistry::builtins)
}

/// Flat lookup table from normalized model name to its spec.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(normalize(spec.name), spec);
    }

    /// Exact, case-insensitive match. No prefix or family fallback.
    pub fn lookup(&self, name: &str) -> Result<&ModelSpec> {
        self.get(name).ok_or_else(|| Error::ModelNotFound {
            model: name.to_string(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.models.get(&normalize(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn family_of(&self, name: &str) -> ModelFamily {
        self.get(name)
            .map(|spec| spec.family)
            .unwrap_or(ModelFamily::Unknown)
    }

    pub fn all(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let spec = registry().lookup("GPT-4-Turbo").unwrap();
        assert_eq!(spec.name, "gpt-4-turbo");
        assert_eq!(spec.context_length, 128_000);
        assert_eq!(spec.family, ModelFamily::Gpt4);
    }

    #[test]
    fn test_lookup_trims_whitespace() {
        let spec = registry().lookup("  gpt-3.5-turbo\n").unwrap();
        assert_eq!(spec.context_length, 16_385);
        assert_eq!(spec.max_instruction_length(), 16_285);
    }

    #[test]
    fn test_lookup_has_no_prefix_fallback() {
        let err = registry().lookup("gpt-4-turbo-2099").unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { ref model } if model == "gpt-4-turbo-2099"));
        assert!(err.is_configuration_error());
        assert!(!registry().contains("gpt"));
    }

    #[test]
    fn test_builtin_table() {
        let registry = ModelRegistry::builtins();
        assert_eq!(registry.len(), builtin::BUILTIN_MODELS.len());
        assert_eq!(registry.lookup("gpt-4-32k-0613").unwrap().context_length, 32_768);
        assert_eq!(registry.lookup("gpt-4").unwrap().context_length, 8_192);
        assert!(registry.all().all(|spec| spec.completion_reservation == 4096));
    }

    #[test]
    fn test_family_of_unknown_model() {
        assert_eq!(registry().family_of("gpt-3.5-turbo-1106"), ModelFamily::Gpt35);
        assert_eq!(registry().family_of("llama-3"), ModelFamily::Unknown);
    }

    #[test]
    fn test_register_custom_model() {
        let mut registry = ModelRegistry::new();
        assert!(registry.is_empty());
        registry.register(ModelSpec::new("Local-Model", 2048, ModelFamily::Unknown));

        let spec = registry.lookup("local-model").unwrap();
        assert_eq!(spec.context_length, 2048);
    }
}
