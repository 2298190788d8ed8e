//! Domain layer - Core quote distribution types with no transport dependencies.

/// Latest-quote cache and the `Quote` value type.
pub mod quote;

/// Symbol interest tracking and reference-counted subscriptions.
pub mod subscription;
