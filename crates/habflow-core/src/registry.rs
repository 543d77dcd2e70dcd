// ── Controller registry ──
//
// Named controllers owned by the host. Nodes resolve their controller
// here at construction time.

use dashmap::DashMap;

use crate::controller::Controller;
use crate::error::CoreError;

#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: DashMap<String, Controller>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `controller` under its configured name, returning any
    /// controller it replaced.
    pub fn register(&self, controller: Controller) -> Option<Controller> {
        self.controllers
            .insert(controller.name().to_owned(), controller)
    }

    /// Look up a controller by name.
    pub fn resolve(&self, name: &str) -> Result<Controller, CoreError> {
        self.controllers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::UnknownController {
                name: name.to_owned(),
            })
    }

    pub fn remove(&self, name: &str) -> Option<Controller> {
        self.controllers.remove(name).map(|(_, c)| c)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .controllers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Shut down and drop every registered controller.
    pub async fn shutdown_all(&self) {
        let names = self.names();
        for name in names {
            if let Some(controller) = self.remove(&name) {
                controller.shutdown().await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    fn controller(name: &str) -> Controller {
        Controller::new(ControllerConfig::default().with_name(name)).unwrap()
    }

    #[test]
    fn resolve_registered() {
        let registry = ControllerRegistry::new();
        assert!(registry.register(controller("living")).is_none());
        assert!(registry.register(controller("garage")).is_none());

        assert_eq!(registry.resolve("living").unwrap().name(), "living");
        assert_eq!(registry.names(), vec!["garage", "living"]);
    }

    #[test]
    fn unknown_controller_fails_fast() {
        let registry = ControllerRegistry::new();
        let err = registry.resolve("nowhere").unwrap_err();
        assert!(matches!(err, CoreError::UnknownController { ref name } if name == "nowhere"));
        assert_eq!(err.to_string(), "Unknown controller 'nowhere'");
    }

    #[test]
    fn register_replaces_same_name() {
        let registry = ControllerRegistry::new();
        registry.register(controller("home"));
        let replaced = registry.register(controller("home"));
        assert!(replaced.is_some());
        assert_eq!(registry.names(), vec!["home"]);
    }
}
