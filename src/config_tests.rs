// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::{
        default_cluster_role_name, default_role_mappings, load_role_mappings,
        parse_role_mappings, ConfigError, ControllerConfig,
    };
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.root_namespace, "cf");
        assert_eq!(config.workers_per_controller, 4);
        assert_eq!(config.backoff_initial, Duration::from_millis(100));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
        assert_eq!(config.admin_cluster_role(), "cf-k8s-controllers-admin");
    }

    #[test]
    fn test_default_cluster_role_name_replaces_underscores() {
        assert_eq!(
            default_cluster_role_name("space_developer"),
            "cf-k8s-controllers-space-developer"
        );
    }

    #[test]
    fn test_default_role_mappings_cover_builtin_types() {
        let mappings = default_role_mappings();
        assert_eq!(mappings.len(), 7);
        assert_eq!(
            mappings.get("organization_manager").map(String::as_str),
            Some("cf-k8s-controllers-organization-manager")
        );
    }

    #[test]
    fn test_cluster_role_for_unknown_type() {
        let config = ControllerConfig::default();
        assert!(config.cluster_role_for("superuser").is_none());
    }

    #[test]
    fn test_parse_role_mappings() {
        let mappings = parse_role_mappings(
            "admin: platform-admin\nspace_developer: platform-developer\n",
        )
        .unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings["admin"], "platform-admin");
    }

    #[test]
    fn test_parse_role_mappings_requires_admin() {
        let err = parse_role_mappings("space_developer: dev\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingAdminRole(_)));
    }

    #[test]
    fn test_parse_role_mappings_rejects_non_map() {
        let err = parse_role_mappings("- admin\n- dev\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_role_mappings_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("role-mappings.yaml");
        fs::write(&path, "admin: platform-admin\norganization_user: org-user\n").unwrap();

        let mappings = load_role_mappings(&path).unwrap();
        assert_eq!(mappings["admin"], "platform-admin");
        assert_eq!(mappings["organization_user"], "org-user");
    }

    #[test]
    fn test_load_role_mappings_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");

        match load_role_mappings(&path).unwrap_err() {
            ConfigError::Read { path: reported, .. } => {
                assert_eq!(reported, path.display().to_string());
            }
            other => panic!("expected Read error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_role_mappings_reports_file_in_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "- admin\n").unwrap();

        match load_role_mappings(&path).unwrap_err() {
            ConfigError::Parse { path: reported, .. } => {
                assert_eq!(reported, path.display().to_string());
            }
            other => panic!("expected Parse error, got {other:?}"),
        }
    }
}
