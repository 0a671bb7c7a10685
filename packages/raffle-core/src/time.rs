//! Time utilities.

/// Returns the current Unix timestamp in seconds.
///
/// Stamps stored documents, credential rows and repair markers.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
