use async_trait::async_trait;
use tracing::trace;

use super::expand_env;
use super::HealthProbe;
use crate::ProbeError;

/// Hello-world check against an HTTP service
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
    expect: String,
}

impl HttpProbe {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        expect: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            expect: expect.into(),
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        let url = expand_env(&self.url);
        trace!("probing {}", url);

        let body = self.client.get(&url).send().await?.error_for_status()?.text().await?;

        if body.contains(&self.expect) {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedResponse {
                expected: self.expect.clone(),
            })
        }
    }
}
