use futures::StreamExt as _;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use duet_core::{ModelCatalog, RunId, SimulationConfig, SimulationState};

use super::config::ClientConfig;
use super::{ChunkStream, SimulationTransport};
use crate::errors::{HarnessError, TransportError};

/// `SimulationTransport` over the server's JSON/HTTP API.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
    base: reqwest::Url,
}

#[derive(Deserialize)]
struct CreatedRun {
    simulation_id: RunId,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, HarnessError> {
        let base = config.base()?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| HarnessError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            config,
            base,
        })
    }

    /// Creates a transport configured from `DUET_*` environment variables.
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL with `segments` appended, each percent-encoded as one path
    /// segment.
    fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base.clone();
        // `base()` rejected cannot-be-a-base URLs, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn unary(&self, request: RequestBuilder) -> RequestBuilder {
        request.timeout(self.config.request_timeout)
    }

    pub(crate) fn create_run_request(&self, config: &SimulationConfig) -> RequestBuilder {
        self.unary(self.client.post(self.endpoint(&["simulations"])).json(config))
    }

    pub(crate) fn get_run_request(&self, run_id: &RunId) -> RequestBuilder {
        self.unary(
            self.client
                .get(self.endpoint(&["simulations", run_id.as_str()])),
        )
    }

    /// No request timeout: a conversation may stream for minutes.
    pub(crate) fn stream_run_request(&self, run_id: &RunId) -> RequestBuilder {
        self.client
            .post(self.endpoint(&["simulations", run_id.as_str(), "run"]))
    }

    /// The server binds `content` and `reasoning` as query parameters.
    pub(crate) fn update_turn_request(
        &self,
        run_id: &RunId,
        turn_number: u32,
        content: &str,
        reasoning: Option<&str>,
    ) -> RequestBuilder {
        let turn = turn_number.to_string();
        let mut query = vec![("content", content)];
        if let Some(reasoning) = reasoning {
            query.push(("reasoning", reasoning));
        }
        self.unary(
            self.client
                .put(self.endpoint(&["simulations", run_id.as_str(), "messages", &turn]))
                .query(&query),
        )
    }

    pub(crate) fn rerun_from_request(&self, run_id: &RunId, turn_number: u32) -> RequestBuilder {
        let turn = turn_number.to_string();
        self.unary(
            self.client
                .post(self.endpoint(&["simulations", run_id.as_str(), "rerun", &turn])),
        )
    }

    pub(crate) fn list_models_request(&self) -> RequestBuilder {
        self.unary(self.client.get(self.endpoint(&["models"])))
    }
}

async fn send(
    operation: &'static str,
    request: RequestBuilder,
) -> Result<reqwest::Response, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::network(operation, e.to_string()))?;
    ensure_success(operation, response).await
}

async fn ensure_success(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(TransportError::status(operation, status.as_u16(), body))
}

async fn read_json<T: DeserializeOwned>(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let body = response
        .bytes()
        .await
        .map_err(|e| TransportError::network(operation, e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| TransportError::decode(operation, e.to_string()))
}

#[async_trait::async_trait]
impl SimulationTransport for HttpTransport {
    async fn create_run(&self, config: &SimulationConfig) -> Result<RunId, TransportError> {
        const OP: &str = "create_run";
        let response = send(OP, self.create_run_request(config)).await?;
        let created: CreatedRun = read_json(OP, response).await?;
        debug!(run_id = %created.simulation_id, "created remote run");
        Ok(created.simulation_id)
    }

    async fn get_run(&self, run_id: &RunId) -> Result<SimulationState, TransportError> {
        const OP: &str = "get_run";
        read_json(OP, send(OP, self.get_run_request(run_id)).await?).await
    }

    async fn stream_run(&self, run_id: &RunId) -> Result<ChunkStream, TransportError> {
        const OP: &str = "stream_run";
        let response = send(OP, self.stream_run_request(run_id)).await?;
        debug!(run_id = %run_id, "opened run event stream");
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::network(OP, e.to_string())));
        Ok(Box::pin(chunks))
    }

    async fn update_turn(
        &self,
        run_id: &RunId,
        turn_number: u32,
        content: &str,
        reasoning: Option<&str>,
    ) -> Result<(), TransportError> {
        let request = self.update_turn_request(run_id, turn_number, content, reasoning);
        send("update_turn", request).await?;
        Ok(())
    }

    async fn rerun_from(&self, run_id: &RunId, turn_number: u32) -> Result<(), TransportError> {
        send("rerun_from", self.rerun_from_request(run_id, turn_number)).await?;
        Ok(())
    }

    async fn list_models(&self) -> Result<ModelCatalog, TransportError> {
        const OP: &str = "list_models";
        read_json(OP, send(OP, self.list_models_request()).await?).await
    }
}
