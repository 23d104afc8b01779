pub mod cloud_sync;
pub mod google_api;
pub mod retry;
pub mod sync_engine;
