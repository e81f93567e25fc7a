// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cluster.rs`

#[cfg(test)]
mod tests {
    use crate::errors::StoreError;
    use crate::store::cluster::map_kube_error;
    use kube::core::Status;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(
            Status::failure(&format!("{reason} happened"), reason)
                .with_code(code)
                .boxed(),
        )
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = map_kube_error(api_error(404, "NotFound"), "Secret", "ns/s");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_409_distinguishes_already_exists_from_conflict() {
        let exists = map_kube_error(api_error(409, "AlreadyExists"), "RoleBinding", "ns/rb");
        assert!(exists.is_already_exists());

        let conflict = map_kube_error(api_error(409, "Conflict"), "RoleBinding", "ns/rb");
        assert!(conflict.is_conflict());
    }

    #[test]
    fn test_422_maps_to_invalid() {
        let err = map_kube_error(api_error(422, "Invalid"), "Role", "cf/r");
        assert!(matches!(err, StoreError::Invalid { .. }));
    }

    #[test]
    fn test_server_errors_map_to_unavailable() {
        for code in [429, 500, 503] {
            let err = map_kube_error(api_error(code, "ServerTimeout"), "Space", "org/s");
            assert!(
                matches!(err, StoreError::Unavailable(_)),
                "HTTP {code} should map to Unavailable"
            );
        }
    }

    #[test]
    fn test_other_client_errors_are_passed_through() {
        let err = map_kube_error(api_error(403, "Forbidden"), "Namespace", "org");
        assert!(matches!(err, StoreError::Kube(_)));
    }

    #[test]
    fn test_invalid_keeps_server_message() {
        let err = map_kube_error(api_error(422, "Invalid"), "Role", "cf/r");
        match err {
            StoreError::Invalid { message, .. } => assert_eq!(message, "Invalid happened"),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }
}
