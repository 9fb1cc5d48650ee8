use std::collections::HashMap;
use std::sync::Mutex;

use bizscan_core::Identifier;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Registry returned status {code}: {body}")]
    Status { code: u16, body: String },
}

/// Abstraction over the business-registry status service.
/// Returns the raw response body; parsing it is the caller's concern.
pub trait RegistryLookup: Send + Sync {
    fn lookup(&self, identifier: &Identifier) -> Result<String, RegistryError>;
}

impl<T: RegistryLookup + ?Sized> RegistryLookup for Box<T> {
    fn lookup(&self, identifier: &Identifier) -> Result<String, RegistryError> {
        (**self).lookup(identifier)
    }
}

// ── Mock registry (always available, used for tests) ─────────────────────────

enum Canned {
    Body(String),
    Status(u16),
}

/// Answers from a fixed table keyed by identifier. Unknown identifiers get a 404.
#[derive(Default)]
pub struct MockRegistry {
    responses: HashMap<String, Canned>,
    calls: Mutex<Vec<String>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, identifier: &str, body: impl Into<String>) -> Self {
        self.responses.insert(identifier.to_string(), Canned::Body(body.into()));
        self
    }

    pub fn with_status(mut self, identifier: &str, code: u16) -> Self {
        self.responses.insert(identifier.to_string(), Canned::Status(code));
        self
    }

    /// Identifiers looked up so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl RegistryLookup for MockRegistry {
    fn lookup(&self, identifier: &Identifier) -> Result<String, RegistryError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(identifier.as_str().to_string());
        }
        match self.responses.get(identifier.as_str()) {
            Some(Canned::Body(body)) => Ok(body.clone()),
            Some(Canned::Status(code)) => Err(RegistryError::Status {
                code: *code,
                body: String::new(),
            }),
            None => Err(RegistryError::Status {
                code: 404,
                body: "unknown identifier".into(),
            }),
        }
    }
}
