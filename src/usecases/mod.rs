pub mod merge;
pub mod summary;
pub mod sync_service;
