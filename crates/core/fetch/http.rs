use super::{QueryRequest, QueryService, ServiceError, wire};
use crate::config::FetchConfig;
use crate::error::Result;
use geoband_types::FetchedEvent;
use reqwest::StatusCode;

/// Query service over the police street-crime HTTP API.
///
/// Issues `GET {base_url}?date=YYYY-MM&poly=<polygon key>`. The API answers
/// 503 when a polygon holds more results than it will return.
#[derive(Debug, Clone)]
pub struct HttpQueryService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQueryService {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, config.base_url.clone()))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Transport(e.to_string())
    }
}

impl QueryService for HttpQueryService {
    async fn query(
        &self,
        request: QueryRequest,
    ) -> std::result::Result<Vec<FetchedEvent>, ServiceError> {
        let period = request.period.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("date", period.as_str()), ("poly", request.polygon.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            StatusCode::OK => {
                let body = response.text().await.map_err(transport_error)?;
                wire::decode_events(&body).map_err(|e| ServiceError::Decode(e.to_string()))
            }
            StatusCode::SERVICE_UNAVAILABLE => Err(ServiceError::CapacityExceeded),
            status => Err(ServiceError::Status {
                code: status.as_u16(),
            }),
        }
    }
}
