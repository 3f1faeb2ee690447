//! Handler lookup.

use tracing::debug;

use crate::{CheckpointError, CheckpointHandler, CheckpointResult, TensorDictCheckpoint};

/// Registry of checkpoint handlers, populated at startup.
///
/// The default registry carries the built-in native handler; embedders add
/// their own format plugins with [`HandlerRegistry::register`].
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn CheckpointHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let mut registry = Self {
            handlers: Vec::new(),
        };
        registry.register(Box::new(TensorDictCheckpoint));
        registry
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler. Later registrations shadow earlier ones of the same
    /// name.
    pub fn register(&mut self, handler: Box<dyn CheckpointHandler>) {
        debug!(name = handler.name(), "registered checkpoint handler");
        self.handlers.insert(0, handler);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Look up a handler by configured name.
    pub fn handler(&self, name: &str) -> CheckpointResult<&dyn CheckpointHandler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(|h| h.as_ref())
            .ok_or_else(|| CheckpointError::UnknownType {
                requested: name.to_owned(),
                available: self.names(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_has_native_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.handler("tensor-dict").is_ok());
    }

    #[test]
    fn test_framework_formats_are_not_shipped() {
        let registry = HandlerRegistry::new();
        assert!(matches!(
            registry.handler("pytorch"),
            Err(CheckpointError::UnknownType { .. })
        ));
    }

    #[test]
    fn test_registration_shadows() {
        struct Fake;
        impl CheckpointHandler for Fake {
            fn name(&self) -> &'static str {
                "tensor-dict"
            }
            fn read(&self, _bytes: &[u8]) -> crate::CheckpointResult<crate::ParamTree> {
                Ok(crate::ParamTree::new())
            }
            fn write(&self, _tree: &crate::ParamTree) -> crate::CheckpointResult<Vec<u8>> {
                Ok(Vec::new())
            }
        }
        let mut registry = HandlerRegistry::new();
        registry.register(Box::new(Fake));
        let handler = registry.handler("tensor-dict").unwrap();
        assert!(handler.write(&crate::ParamTree::new()).unwrap().is_empty());
    }
}
