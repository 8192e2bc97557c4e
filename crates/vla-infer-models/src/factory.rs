//! Backend registry and factory
//!
//! Maps backend names to constructors. Adding a backend is a single
//! `register` call; lookup code never changes.

use crate::mock::MockVlaModel;
use crate::model::VlaModel;
use crate::openvla::OpenVlaModel;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use vla_infer_core::{Error, Result};

/// Registry name of the OpenVLA backend
pub const OPENVLA: &str = "openvla";

/// Constructor producing an unloaded backend
pub type ModelConstructor = Arc<dyn Fn() -> Box<dyn VlaModel> + Send + Sync>;

/// Factory creating unloaded model backends by name
#[derive(Clone)]
pub struct ModelFactory {
    constructors: BTreeMap<String, ModelConstructor>,
    mock: bool,
}

impl ModelFactory {
    /// Create an empty factory with no registered backends
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
            mock: false,
        }
    }

    /// Create a factory with the built-in backends registered
    pub fn new() -> Self {
        Self::empty().register(OPENVLA, || Box::new(OpenVlaModel::new()))
    }

    /// Register a backend constructor under `kind` (stored lower-cased)
    pub fn register<F>(mut self, kind: &str, constructor: F) -> Self
    where
        F: Fn() -> Box<dyn VlaModel> + Send + Sync + 'static,
    {
        self.constructors
            .insert(kind.to_lowercase(), Arc::new(constructor));
        self
    }

    /// Hand out mock backends instead of real ones
    pub fn with_mock(mut self, mock: bool) -> Self {
        self.mock = mock;
        self
    }

    /// Whether this factory produces mock backends
    pub fn is_mock(&self) -> bool {
        self.mock
    }

    /// Registered backend names, sorted
    pub fn supported_kinds(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Create an unloaded backend for `kind` (case-insensitive).
    ///
    /// In mock mode the kind must still be registered; the returned backend
    /// is a `MockVlaModel` named after it.
    pub fn create_model(&self, kind: &str) -> Result<Box<dyn VlaModel>> {
        let kind = kind.to_lowercase();

        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| Error::unsupported_kind(kind.clone(), self.supported_kinds()))?;

        if self.mock {
            tracing::debug!("Creating mock backend for '{}'", kind);
            return Ok(Box::new(MockVlaModel::new(kind)));
        }

        tracing::debug!("Creating backend '{}'", kind);
        Ok(constructor())
    }
}

impl Default for ModelFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelFactory")
            .field("kinds", &self.supported_kinds())
            .field("mock", &self.mock)
            .finish()
    }
}
