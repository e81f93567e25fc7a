// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for controller registration.

#[cfg(test)]
mod tests {
    use super::super::{
        build_registry, ORGANIZATION_CONTROLLER, ROLE_CONTROLLER, SERVICE_BINDING_CONTROLLER,
        SPACE_CONTROLLER,
    };
    use crate::config::ControllerConfig;
    use crate::context::Context;
    use crate::store::memory::MemoryStore;
    use std::sync::Arc;

    fn registry() -> crate::engine::ControllerRegistry {
        let ctx = Arc::new(Context::new(
            Arc::new(MemoryStore::new()),
            ControllerConfig::default(),
        ));
        build_registry(&ctx)
    }

    #[test]
    fn test_registry_lists_every_controller() {
        let registry = registry();
        assert_eq!(
            registry.names(),
            vec![
                ORGANIZATION_CONTROLLER,
                SPACE_CONTROLLER,
                ROLE_CONTROLLER,
                SERVICE_BINDING_CONTROLLER
            ]
        );
    }

    #[test]
    fn test_tenants_watch_anchors_and_namespaces() {
        let registry = registry();
        for name in [ORGANIZATION_CONTROLLER, SPACE_CONTROLLER] {
            let kinds = registry.get(name).unwrap().watched_kinds();
            assert!(kinds.contains(&"SubnamespaceAnchor"), "{name}");
            assert!(kinds.contains(&"Namespace"), "{name}");
        }
    }

    #[test]
    fn test_role_watches_tenants() {
        let registry = registry();
        let kinds = registry.get(ROLE_CONTROLLER).unwrap().watched_kinds();
        assert_eq!(kinds, vec!["Role", "Space", "Organization"]);
    }

    #[test]
    fn test_service_binding_watches_secrets_and_instances() {
        let registry = registry();
        let kinds = registry
            .get(SERVICE_BINDING_CONTROLLER)
            .unwrap()
            .watched_kinds();
        assert_eq!(kinds, vec!["ServiceBinding", "Secret", "ServiceInstance"]);
    }
}
