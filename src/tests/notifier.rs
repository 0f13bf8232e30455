// Unit Tests for User-Facing Messages
//
// UNIT UNDER TEST: Notifier
//
// BUSINESS RESPONSIBILITY:
//   - Produces a display-ready message and ordered suggestions per error kind
//   - Keeps copy stable across repeats and severities of the same kind
//   - Never suggests a plain retry for errors that need user action
//   - Accepts catalog overrides with fallback to built-in copy
//
// TEST COVERAGE:
//   - Built-in coverage of every kind
//   - Severity independence of messages
//   - Critical suggestion filtering
//   - JSON catalog loading, fallback and rejection of malformed input

use crate::classifier::{classify, RawFailure};
use crate::core_types::ErrorKind;
use crate::error::RecoveryError;
use crate::notifier::{MessageCatalog, MessageEntry, Notifier};
use crate::tests::helpers::test_context;

fn failure_for(kind: ErrorKind) -> RawFailure {
    match kind {
        ErrorKind::Network => RawFailure::transport("reset"),
        ErrorKind::Timeout => RawFailure::timed_out("slow"),
        ErrorKind::RateLimited => RawFailure::rate_limited(None),
        ErrorKind::Auth => RawFailure::status(401, "Unauthorized"),
        ErrorKind::Validation => RawFailure::invalid_request("empty message"),
        ErrorKind::Policy => RawFailure::policy_rejected("cors"),
        ErrorKind::Unknown => RawFailure::unexpected_response("garbage"),
    }
}

#[cfg(test)]
mod builtin_message_tests {
    use super::*;

    #[test]
    fn test_every_kind_has_message_and_suggestions() {
        // Test verifies the built-in table covers the whole taxonomy
        // Ensures no error reaches the user without guidance

        let notifier = Notifier::new();

        for kind in ErrorKind::ALL {
            let error = classify(&failure_for(kind), &test_context("send_message"));
            assert_eq!(error.kind(), kind);

            let notification = notifier.notify(&error);
            assert!(!notification.message.is_empty(), "{kind} has no message");
            assert!(!notification.suggestions.is_empty(), "{kind} has no suggestions");
        }
    }

    #[test]
    fn test_network_copy() {
        let notifier = Notifier::new();
        let error = classify(&RawFailure::transport("reset"), &test_context("send_message"));

        assert_eq!(
            notifier.user_message(&error),
            "Unable to connect. Please check your internet connection."
        );
        assert_eq!(
            notifier.recovery_suggestions(&error)[0],
            "Check your internet connection"
        );
    }

    #[test]
    fn test_unknown_copy_offers_retry() {
        let notifier = Notifier::new();
        let error = classify(&RawFailure::other("???"), &test_context("send_message"));

        let notification = notifier.notify(&error);

        assert_eq!(notification.message, "Something went wrong. Please try again.");
        assert_eq!(
            notification.suggestions,
            vec!["Try again", "Refresh the page", "Contact support if the problem persists"]
        );
        assert!(!notification.requires_action);
    }

    #[test]
    fn test_message_is_same_for_every_severity_of_a_kind() {
        // Test verifies copy depends on the kind only
        // Ensures a critical auth failure reads the same as an ordinary one

        // Arrange
        let notifier = Notifier::new();
        let context = test_context("load_profile");
        let high = classify(&RawFailure::status(401, "Unauthorized"), &context);
        let critical = classify(&RawFailure::status(401, "session expired"), &context);

        // Act
        let high_message = notifier.user_message(&high);
        let critical_message = notifier.user_message(&critical);

        // Assert
        assert_ne!(high.severity(), critical.severity());
        assert_eq!(high_message, critical_message);
    }

    #[test]
    fn test_critical_errors_never_suggest_plain_retry() {
        // Arrange
        let notifier = Notifier::new();
        let critical = classify(
            &RawFailure::status(401, "token has been revoked"),
            &test_context("load_profile"),
        );

        // Act
        let notification = notifier.notify(&critical);

        // Assert
        assert!(notification.requires_action);
        assert!(notification
            .suggestions
            .iter()
            .all(|s| !s.to_lowercase().contains("try again")));
        assert!(!notification.suggestions.is_empty());
    }

    #[test]
    fn test_auth_copy_never_mentions_retrying() {
        let notifier = Notifier::new();
        let error = classify(&RawFailure::status(403, "forbidden"), &test_context("load_profile"));

        let notification = notifier.notify(&error);

        assert!(!notification.message.to_lowercase().contains("try again"));
        assert!(notification
            .suggestions
            .iter()
            .all(|s| !s.to_lowercase().contains("try again")));
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;

    #[test]
    fn test_catalog_override_replaces_builtin_copy() {
        // Arrange
        let mut catalog = MessageCatalog::new();
        catalog.insert(
            ErrorKind::Timeout,
            MessageEntry {
                message: "Das hat zu lange gedauert.".to_string(),
                suggestions: vec!["Erneut versuchen".to_string()],
            },
        );
        let notifier = Notifier::with_catalog(catalog);
        let error = classify(&RawFailure::timed_out("slow"), &test_context("send_message"));

        // Act
        let notification = notifier.notify(&error);

        // Assert
        assert_eq!(notification.message, "Das hat zu lange gedauert.");
        assert_eq!(notification.suggestions, vec!["Erneut versuchen"]);
    }

    #[test]
    fn test_json_catalog_falls_back_for_missing_and_empty_entries() {
        // Test verifies partial translations never produce blank notifications
        // Ensures a half-finished locale file still yields usable copy

        // Arrange
        let notifier = Notifier::from_json(
            r#"{
                "network": { "message": "Keine Verbindung.", "suggestions": ["Verbindung prüfen"] },
                "timeout": { "message": "   ", "suggestions": [] }
            }"#,
        )
        .unwrap();
        let context = test_context("send_message");

        // Act
        let network = notifier.user_message(&classify(&RawFailure::transport("reset"), &context));
        let timeout = notifier.user_message(&classify(&RawFailure::timed_out("slow"), &context));
        let unknown = notifier.user_message(&classify(&RawFailure::other("???"), &context));

        // Assert
        assert_eq!(network, "Keine Verbindung.");
        assert_eq!(timeout, "The request took too long to complete.");
        assert_eq!(unknown, "Something went wrong. Please try again.");
    }

    #[test]
    fn test_malformed_catalog_is_rejected() {
        let missing_brace = Notifier::from_json(r#"{ "network": "#);
        let unknown_kind =
            Notifier::from_json(r#"{ "teapot": { "message": "x", "suggestions": ["y"] } }"#);

        assert!(matches!(missing_brace, Err(RecoveryError::Configuration { .. })));
        assert!(matches!(unknown_kind, Err(RecoveryError::Configuration { .. })));
    }
}
