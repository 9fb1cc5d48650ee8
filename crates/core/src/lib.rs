pub mod config;
pub mod document;
pub mod identifier;
pub mod run;

pub use config::{AppConfig, ConfigError, OcrBackendKind};
pub use document::{NormalizedPage, SourceEntry, SourceKind, IMAGE_EXTENSIONS};
pub use identifier::{Identifier, IdentifierError, StatusRecord};
pub use run::RunContext;
