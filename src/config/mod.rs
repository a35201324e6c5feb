pub mod schema;
pub mod loader;

pub use schema::{GeneratorConfig, ProjectConfig, SourceConfig};
pub use loader::{load_config, merge_with_cli_args, read_config_file, save_config, LoadedConfig};
