pub mod config;
pub mod error;
pub mod logging;
pub mod relay;
pub mod server;
pub mod settings_sync;
pub mod translate;
pub mod variants;

pub use config::{BotConfig, RelayConfig};
pub use error::{RelayError, Result, TranslateError};
pub use logging::SharedLogger;
pub use server::{build_router, make_app, AppState};
