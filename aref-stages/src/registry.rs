//! Plugin registry - name -> stage lookup for `--plugin`

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::Stage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Plugin registered twice: {0}")]
    Duplicate(String),

    #[error("Plugin has an empty name")]
    EmptyName,
}

/// Registry of named plugin stages
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn Stage>>,
}

impl PluginRegistry {
    pub fn builder() -> PluginRegistryBuilder {
        PluginRegistryBuilder::default()
    }

    /// Get a plugin by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.plugins.get(name).cloned()
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Collects registrations; the first bad one fails the whole load
#[derive(Default)]
pub struct PluginRegistryBuilder {
    pending: Vec<Arc<dyn Stage>>,
}

impl PluginRegistryBuilder {
    pub fn register(mut self, stage: Arc<dyn Stage>) -> Self {
        self.pending.push(stage);
        self
    }

    pub fn register_all(mut self, stages: impl IntoIterator<Item = Arc<dyn Stage>>) -> Self {
        self.pending.extend(stages);
        self
    }

    pub fn build(self) -> Result<PluginRegistry, RegistryError> {
        let mut plugins = BTreeMap::new();
        for stage in self.pending {
            let name = stage.name().trim().to_string();
            if name.is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if plugins.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            plugins.insert(name, stage);
        }
        Ok(PluginRegistry { plugins })
    }
}
