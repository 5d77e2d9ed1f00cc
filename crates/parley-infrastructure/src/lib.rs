pub mod attachment;
pub mod config_service;
pub mod dto;
pub mod file_checkpoint_store;
pub mod json_dir_session_store;
pub mod paths;
pub mod sqlite_session_store;
pub mod storage;
pub mod store_factory;

pub use crate::attachment::load_attachment;
pub use crate::config_service::ConfigService;
pub use crate::file_checkpoint_store::FileCheckpointStore;
pub use crate::json_dir_session_store::JsonDirSessionStore;
pub use crate::paths::ParleyPaths;
pub use crate::sqlite_session_store::{SqliteOptions, SqliteSessionStore};
pub use crate::store_factory::open_session_store;
