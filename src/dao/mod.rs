/// Persisted snapshot representation and validation.
pub mod models;
/// Snapshot storage backends.
pub mod snapshot_store;
/// Storage error types.
pub mod storage;
