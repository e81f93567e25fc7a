// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `status_reasons` module

#[cfg(test)]
mod tests {
    use crate::status_reasons::*;

    const ALL_REASONS: &[&str] = &[
        REASON_SECRET_FOUND,
        REASON_SECRET_NOT_FOUND,
        REASON_SUBNAMESPACE_CREATED,
        REASON_SUBNAMESPACE_PENDING,
        REASON_SUBNAMESPACE_CONFLICT,
        REASON_VALID_SPEC,
        REASON_INVALID_SUBJECT,
        REASON_INVALID_SCOPE,
        REASON_UNKNOWN_ROLE_TYPE,
        REASON_IMMUTABLE_FIELD_CHANGED,
        REASON_ROLE_BINDINGS_CREATED,
    ];

    #[test]
    fn test_reasons_are_camel_case() {
        for reason in ALL_REASONS {
            assert!(
                reason.chars().next().is_some_and(char::is_uppercase),
                "{reason} must start upper case"
            );
            assert!(
                reason.chars().all(char::is_alphanumeric),
                "{reason} must be alphanumeric"
            );
        }
    }

    #[test]
    fn test_reasons_are_unique() {
        let mut sorted = ALL_REASONS.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ALL_REASONS.len());
    }

    #[test]
    fn test_binding_secret_wire_values() {
        assert_eq!(CONDITION_BINDING_SECRET_AVAILABLE, "BindingSecretAvailable");
        assert_eq!(REASON_SECRET_NOT_FOUND, "SecretNotFound");
        assert_eq!(MESSAGE_SECRET_NOT_FOUND, "Binding secret does not exist");
        assert_eq!(REASON_SECRET_FOUND, "SecretFound");
    }

    #[test]
    fn test_status_values() {
        assert_eq!(STATUS_TRUE, "True");
        assert_eq!(STATUS_FALSE, "False");
        assert_eq!(STATUS_UNKNOWN, "Unknown");
    }
}
