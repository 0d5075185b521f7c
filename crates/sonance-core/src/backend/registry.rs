//! Name → constructor table for backends.
//!
//! The registry is an ordinary value. The binary builds one at startup with
//! [`BackendRegistry::with_builtin_backends`] and passes it to whatever
//! constructs backends; tests build isolated registries with their own
//! constructors. All registrations happen before the first `construct`.

use super::kokoro::{KokoroBackend, KokoroVariant};
use super::pocket::PocketBackend;
use super::SynthesisBackend;
use crate::config::BackendConfig;
use crate::error::{SynthesisError, SynthesisResult};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Builds a backend from its configuration.
pub type BackendConstructor =
    Box<dyn Fn(BackendConfig) -> SynthesisResult<Box<dyn SynthesisBackend>> + Send + Sync>;

/// Registered backend constructors keyed by name.
#[derive(Default)]
pub struct BackendRegistry {
    constructors: BTreeMap<String, BackendConstructor>,
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every backend shipped with this crate.
    pub fn with_builtin_backends() -> Self {
        let mut registry = Self::new();
        for variant in [KokoroVariant::Legacy, KokoroVariant::V1_0, KokoroVariant::V1_1] {
            registry.register(
                variant.backend_name(),
                Box::new(move |cfg: BackendConfig| {
                    Ok(Box::new(KokoroBackend::load(&cfg, variant)?) as Box<dyn SynthesisBackend>)
                }),
            );
        }
        registry.register(
            "pocket",
            Box::new(|cfg: BackendConfig| {
                Ok(Box::new(PocketBackend::load(&cfg)?) as Box<dyn SynthesisBackend>)
            }),
        );
        registry
    }

    /// Register a constructor under `name`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty or already registered. Registration is a
    /// startup-time step and a clash is a programming error.
    pub fn register(&mut self, name: &str, constructor: BackendConstructor) {
        assert!(!name.is_empty(), "backend registry: empty backend name");
        if self.constructors.contains_key(name) {
            panic!("backend registry: '{}' registered twice", name);
        }
        log::debug!("Registered backend '{}'", name);
        self.constructors.insert(name.to_string(), constructor);
    }

    /// Construct the backend registered as `name`.
    ///
    /// `config.backend` is overwritten with `name` before the constructor
    /// runs.
    pub fn construct(
        &self,
        name: &str,
        mut config: BackendConfig,
    ) -> SynthesisResult<Box<dyn SynthesisBackend>> {
        let constructor =
            self.constructors
                .get(name)
                .ok_or_else(|| SynthesisError::UnknownBackend {
                    name: name.to_string(),
                    available: self.constructors.keys().cloned().collect(),
                })?;

        config.backend = name.to_string();
        log::info!(
            "Constructing backend '{}' from {}",
            name,
            config.model_path.display()
        );
        constructor(config)
    }

    pub fn list_registered_backends(&self) -> BTreeSet<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }
}
