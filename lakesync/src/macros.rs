//! Macros for synchronization error handling.
//!
//! Convenience macros for creating and returning [`crate::error::SyncError`] instances
//! with reduced boilerplate.

/// Creates a [`crate::error::SyncError`] from error kind and description.
///
/// Accepts a static description and optionally a dynamic detail value, which is
/// converted with `to_string` unless passed via `detail =` (which moves an owned
/// [`String`]).
#[macro_export]
macro_rules! sync_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::SyncError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::SyncError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::SyncError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns a [`crate::error::SyncError`] from the current function.
///
/// Combines error creation with early return for error conditions that terminate
/// the surrounding operation.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::sync_error!($kind, $desc, $detail))
    };
}
