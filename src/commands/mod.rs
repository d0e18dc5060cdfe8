pub mod ads;
pub mod config;
pub mod context;
pub mod pin;
pub mod run;
pub mod service;
pub mod settings;
pub mod utils;

pub use ads::run_ad_command;
pub use config::run_config_command;
pub use context::GuardContext;
pub use pin::run_pin_command;
pub use run::run_guard;
pub use service::run_service_command;
pub use settings::run_settings_command;
