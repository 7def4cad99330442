pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, default_config_path, load_config};
pub use schema::{Config, GatewayConfig, ProviderConfig, RetrievalConfig, UploadConfig};
