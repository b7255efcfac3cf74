// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Deskline conversation engine.

use thiserror::Error;

/// The primary error type used across all Deskline adapter traits and engine operations.
///
/// Every failure is scoped to a single ticket, instance, or message operation;
/// none of these variants is fatal to the process.
#[derive(Debug, Error)]
pub enum DesklineError {
    /// A plan limit (connected instances, agents) would be exceeded.
    #[error("quota exceeded: {resource} limit of {limit} reached")]
    QuotaExceeded { resource: String, limit: u32 },

    /// Another agent won the claim race for this ticket.
    #[error("ticket {ticket} is already claimed")]
    AlreadyClaimed { ticket: String },

    /// The requested transition is not allowed from the current state.
    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// `return_to_queue` was called on a ticket without a queue.
    #[error("ticket {ticket} has no queue assigned")]
    NoQueueAssigned { ticket: String },

    /// A pairing attempt for this instance is already in flight.
    #[error("pairing already in progress for instance {instance}")]
    PairingInProgress { instance: String },

    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The channel gateway could not be reached or rejected the request.
    #[error("gateway unreachable: {message}")]
    GatewayUnreachable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The realtime change-feed subscription dropped events or closed.
    #[error("change feed disconnected")]
    FeedDisconnected,

    /// The text-generation capability failed or returned nothing usable.
    #[error("ai unavailable: {message}")]
    AiUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors (invalid values, missing settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DesklineError {
    /// Shorthand for a `NotFound` error.
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Shorthand for an `InvalidTransition` error.
    pub fn invalid_transition(
        entity: &str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Wraps any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(err),
        }
    }

    /// Returns true for errors the caller should show to the user as-is.
    ///
    /// Infrastructure failures (gateway, AI, storage, feed) return false and
    /// are expected to be logged and degraded around instead.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded { .. }
                | Self::AlreadyClaimed { .. }
                | Self::InvalidTransition { .. }
                | Self::NoQueueAssigned { .. }
                | Self::PairingInProgress { .. }
                | Self::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actionable_errors_are_classified() {
        assert!(DesklineError::AlreadyClaimed { ticket: "t".into() }.is_user_actionable());
        assert!(
            DesklineError::QuotaExceeded {
                resource: "instances".into(),
                limit: 1
            }
            .is_user_actionable()
        );
        assert!(DesklineError::invalid_transition("ticket", "pending", "closed").is_user_actionable());
        assert!(!DesklineError::FeedDisconnected.is_user_actionable());
        assert!(
            !DesklineError::GatewayUnreachable {
                message: "refused".into(),
                source: None
            }
            .is_user_actionable()
        );
    }

    #[test]
    fn invalid_transition_message_names_both_states() {
        let err = DesklineError::invalid_transition("ticket", "closed", "pending");
        assert_eq!(
            err.to_string(),
            "invalid transition for ticket: closed -> pending"
        );
    }
}
