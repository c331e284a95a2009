use serde_json::Value;
use strata_sync::{Deliverer, DeliveryFailure};
use tracing::instrument;
use url::Url;

use crate::{ActionRequest, ActionResponse, TransportError, WireBranchContext};
use strata_key::BranchContext;

const DEFAULT_ACTION_PATH: &str = "/api/workspaces/current/actions";
const CHANGE_LOG_PATH: &str = "/api/workspaces/current/actions/version";
const ALREADY_EXISTS_SUBSTRING: &str = "already exists";

/// A client for the single JSON POST action endpoint described in spec.md
/// §6 and §4.11.
///
/// One `RemoteClient` is shared by the read pipeline, write pipeline, and
/// change tracker of a `strata-client::Client`; it adds the `x-tenant-id`
/// header and normalizes non-2xx responses and `{success: false}` bodies
/// into [`TransportError`].
#[derive(Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: Url,
    tenant_id: String,
}

impl RemoteClient {
    /// Builds a client rooted at `base_url`, always sending `x-tenant-id:
    /// tenant_id`. `base_url` should be the workspace root (e.g.
    /// `https://api.example.com`); the action and change-log paths are
    /// appended automatically.
    pub fn new(base_url: Url, tenant_id: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            tenant_id: tenant_id.into(),
        }
    }

    /// Builds a client with a caller-provided `reqwest::Client`, for
    /// embedders that want to share a connection pool or set a global
    /// timeout.
    pub fn with_http_client(http: reqwest::Client, base_url: Url, tenant_id: impl Into<String>) -> Self {
        Self {
            http,
            base_url,
            tenant_id: tenant_id.into(),
        }
    }

    /// Dispatches a single action to the remote router.
    #[instrument(skip(self, data, options))]
    pub async fn dispatch(
        &self,
        action: &str,
        data: Option<Value>,
        options: Option<Value>,
        branch_context: Option<&BranchContext>,
    ) -> Result<ActionResponse, TransportError> {
        let request = ActionRequest {
            action: action.to_string(),
            data,
            options,
            branch_context: branch_context.map(WireBranchContext::from),
        };
        self.post(DEFAULT_ACTION_PATH, &request).await
    }

    /// Sends a single change-log event to the version endpoint. Failures
    /// here are the change tracker's concern to swallow and log — this
    /// method still returns a `Result` so the caller can decide.
    #[instrument(skip(self, event))]
    pub async fn send_change_log(&self, event: &Value) -> Result<ActionResponse, TransportError> {
        let request = ActionRequest {
            action: "changeLog.create".to_string(),
            data: Some(event.clone()),
            options: None,
            branch_context: None,
        };
        self.post(CHANGE_LOG_PATH, &request).await
    }

    async fn post(&self, path: &str, request: &ActionRequest) -> Result<ActionResponse, TransportError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|error| TransportError::MalformedResponse(error.to_string()))?;

        let response = self
            .http
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-tenant-id", &self.tenant_id)
            .json(request)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;

        if !status.is_success() {
            if status.as_u16() == 409 && body.contains(ALREADY_EXISTS_SUBSTRING) {
                return Err(TransportError::ConflictPermanent(body));
            }
            return Err(TransportError::Http(status.as_u16()));
        }

        let parsed: ActionResponse =
            serde_json::from_str(&body).map_err(|error| TransportError::MalformedResponse(error.to_string()))?;

        if !parsed.success {
            return Err(TransportError::ActionFailed(
                parsed.error.unwrap_or_else(|| "unknown remote error".to_string()),
            ));
        }

        Ok(parsed)
    }
}

impl From<TransportError> for DeliveryFailure {
    fn from(error: TransportError) -> Self {
        match &error {
            TransportError::Http(status) => DeliveryFailure::http(*status, error.to_string()),
            TransportError::ConflictPermanent(_) => DeliveryFailure::http(409, error.to_string()),
            _ => DeliveryFailure::network(error.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Deliverer for RemoteClient {
    async fn deliver(&self, action: &str, data: &Value) -> Result<Value, DeliveryFailure> {
        let response = self
            .dispatch(action, Some(data.clone()), None, None)
            .await
            .map_err(DeliveryFailure::from)?;
        Ok(response.data.unwrap_or(Value::Null))
    }
}
