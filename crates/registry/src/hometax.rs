use std::time::Duration;

use bizscan_core::config::RegistryConfig;
use bizscan_core::Identifier;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};

use crate::lookup::{RegistryError, RegistryLookup};

/// The fixed status-inquiry document with the 10-digit number filled in.
pub fn request_body(identifier: &Identifier) -> String {
    format!(
        "<map id='ATTABZAA001R08'>\
         <pubcUserNo/>\
         <mobYn>N</mobYn>\
         <inqrTrgtClCd>1</inqrTrgtClCd>\
         <txprDscmNo>{}</txprDscmNo>\
         <dongCode>__MIDDLE__</dongCode>\
         <psbSearch>Y</psbSearch>\
         <map id='userReqInfoVO'/>\
         </map>",
        identifier.digits()
    )
}

/// Blocking client for the Hometax business status inquiry.
///
/// One request per lookup and no idle connections are kept between them.
pub struct HometaxClient {
    client: Client,
    endpoint: String,
}

impl HometaxClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &RegistryConfig) -> Result<Self, RegistryError> {
        Self::new(config.endpoint.clone(), Duration::from_secs(config.timeout_secs))
    }
}

impl RegistryLookup for HometaxClient {
    #[instrument(skip(self), fields(identifier = %identifier))]
    fn lookup(&self, identifier: &Identifier) -> Result<String, RegistryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/xml")
            .body(request_body(identifier))
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                code: status.as_u16(),
                body,
            });
        }
        debug!(bytes = body.len(), "Registry response received");
        Ok(body)
    }
}
