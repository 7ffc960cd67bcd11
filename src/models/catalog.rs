use std::collections::BTreeMap;

use super::chat::{ModelCard, ModelList};

/// Backend model used whenever a client asks for a name we don't know.
pub const DEFAULT_BACKEND_MODEL: &str = "mistral-small-latest";

const OWNED_BY: &str = "chatbridge";

/// Client-facing model names and the backend model each one is served by.
const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("gpt-4", "mistral-large-latest"),
    ("gpt-4-turbo", "mistral-large-latest"),
    ("gpt-4o", "mistral-medium-latest"),
    ("gpt-4o-mini", "mistral-small-latest"),
    ("gpt-3.5-turbo", "open-mistral-nemo"),
    ("o1", "magistral-medium-latest"),
    ("o1-mini", "magistral-small-latest"),
];

/// Immutable client → backend model table.
///
/// Built once at startup (built-ins plus configured overrides) and only read
/// afterwards, so it is shared across request tasks without locking.
#[derive(Debug, Clone)]
pub struct ModelMap {
    aliases: BTreeMap<String, String>,
    default_model: String,
    created: i64,
}

impl ModelMap {
    pub fn builtin() -> Self {
        Self {
            aliases: BUILTIN_ALIASES
                .iter()
                .map(|(client, backend)| (client.to_string(), backend.to_string()))
                .collect(),
            default_model: DEFAULT_BACKEND_MODEL.to_string(),
            created: super::chat::unix_now(),
        }
    }

    /// Built-in table with configured aliases layered on top. Overrides win
    /// over built-ins with the same client name.
    pub fn with_overrides(overrides: &[(String, String)], default_model: Option<&str>) -> Self {
        let mut map = Self::builtin();
        for (client, backend) in overrides {
            map.aliases.insert(client.clone(), backend.clone());
        }
        if let Some(default_model) = default_model {
            map.default_model = default_model.to_string();
        }
        map
    }

    /// Never fails: unknown names (lookup is case-sensitive) fall back to the
    /// default backend model.
    pub fn resolve(&self, client_model: &str) -> &str {
        self.aliases
            .get(client_model)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Known client model names, sorted.
    pub fn known_models(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_model_list(&self) -> ModelList {
        ModelList {
            object: "list".into(),
            data: self
                .known_models()
                .map(|id| ModelCard {
                    id: id.to_string(),
                    object: "model".into(),
                    created: self.created,
                    owned_by: OWNED_BY.into(),
                })
                .collect(),
        }
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self::builtin()
    }
}
