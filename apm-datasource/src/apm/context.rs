use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::TryFutureExt;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tracing::Instrument;
use url::Url;

use super::api_model::{LoginRequest, LoginResponse, NodeDetail};
use super::{ApmError, AuthenticationError};
use crate::configuration::Credentials;
use crate::model::MachineId;
use crate::settings::ApmSettings;

const LOGIN_PATH: &str = "/auth/login";
const NODE_DETAIL_PATH: &str = "/topo/node/detail/info";
const APPLICATION_JSON: &str = "application/json";

/// Bearer token granted by APM login.
#[derive(Clone)]
pub struct AccessToken(SecretString);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    pub fn secret(&self) -> &str {
        self.0.expose_secret().as_str()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

#[derive(Debug, Clone)]
pub struct ApmContext {
    inner: Arc<ApmContextRef>,
}

impl ApmContext {
    pub fn new(
        client: reqwest::Client, base_url: Url, login_timeout: Duration, max_login_attempts: u32,
    ) -> Result<Self, ApmError> {
        if base_url.cannot_be_a_base() {
            return Err(ApmError::NotABaseUrl(base_url));
        }

        let login_endpoint = base_url.join(LOGIN_PATH)?;
        let node_detail_endpoint = base_url.join(NODE_DETAIL_PATH)?;

        Ok(Self {
            inner: Arc::new(ApmContextRef {
                client,
                base_url,
                login_endpoint,
                node_detail_endpoint,
                login_timeout,
                max_login_attempts: max_login_attempts.max(1),
            }),
        })
    }

    pub fn from_settings(base_url: Url, settings: &ApmSettings) -> Result<Self, ApmError> {
        let client = make_http_client(settings)?;
        Self::new(client, base_url, settings.login_timeout, settings.max_login_attempts)
    }

    pub fn base_url(&self) -> Url {
        self.inner.base_url.clone()
    }

    pub fn login_endpoint(&self) -> Url {
        self.inner.login_endpoint.clone()
    }

    pub fn node_detail_endpoint(&self) -> Url {
        self.inner.node_detail_endpoint.clone()
    }

    pub fn max_login_attempts(&self) -> u32 {
        self.inner.max_login_attempts
    }

    #[tracing::instrument(level = "info", skip(self, credentials), fields(username=%credentials.username))]
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken, AuthenticationError> {
        self.inner.authenticate(credentials).await
    }

    #[tracing::instrument(level = "info", skip(self, token))]
    pub async fn query_node_detail(&self, token: &AccessToken, machine_id: &MachineId) -> Result<NodeDetail, ApmError> {
        self.inner.query_node_detail(token, machine_id).await
    }
}

fn make_http_client(settings: &ApmSettings) -> Result<reqwest::Client, ApmError> {
    let headers = settings.header_map()?;

    let client_builder = reqwest::Client::builder()
        .pool_idle_timeout(settings.pool_idle_timeout)
        .pool_max_idle_per_host(settings.pool_max_idle_per_host)
        .default_headers(headers);

    let client_builder = if let Some(request_timeout) = settings.request_timeout {
        client_builder.timeout(request_timeout)
    } else {
        client_builder
    };

    Ok(client_builder.build()?)
}

struct ApmContextRef {
    client: reqwest::Client,
    base_url: Url,
    login_endpoint: Url,
    node_detail_endpoint: Url,
    login_timeout: Duration,
    max_login_attempts: u32,
}

impl fmt::Debug for ApmContextRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApmContextRef")
            .field("base_url", &self.base_url)
            .field("login_endpoint", &self.login_endpoint)
            .field("node_detail_endpoint", &self.node_detail_endpoint)
            .field("login_timeout", &self.login_timeout)
            .field("max_login_attempts", &self.max_login_attempts)
            .finish()
    }
}

enum LoginAttempt {
    Granted(AccessToken),
    Retry(ApmError),
    Abort(ApmError),
}

impl ApmContextRef {
    async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken, AuthenticationError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let _timer = super::start_apm_timer(super::LOGIN);

            let cause = match self.attempt_login(credentials).await {
                LoginAttempt::Granted(token) => {
                    tracing::info!(%attempts, "APM login granted");
                    return Ok(token);
                },
                LoginAttempt::Abort(cause) => {
                    super::track_apm_errors(super::LOGIN, &cause);
                    tracing::error!(error=?cause, %attempts, "APM login response unusable - aborting");
                    return Err(AuthenticationError { attempts, cause });
                },
                LoginAttempt::Retry(cause) => cause,
            };

            super::track_apm_errors(super::LOGIN, &cause);
            if self.max_login_attempts <= attempts {
                tracing::error!(error=?cause, %attempts, "APM login failed - attempts exhausted");
                return Err(AuthenticationError { attempts, cause });
            }

            tracing::warn!(
                error=?cause, %attempts, max_attempts=%self.max_login_attempts,
                "APM login attempt failed - retrying"
            );
        }
    }

    async fn attempt_login(&self, credentials: &Credentials) -> LoginAttempt {
        let request = LoginRequest {
            user_name: credentials.username.as_str(),
            password: credentials.password().expose_secret().as_str(),
        };

        let response = self
            .client
            .post(self.login_endpoint.clone())
            .header(ACCEPT, APPLICATION_JSON)
            .json(&request)
            .timeout(self.login_timeout)
            .send()
            .instrument(tracing::info_span!("APM login REST API", endpoint=%self.login_endpoint))
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return LoginAttempt::Retry(err.into()),
        };

        super::log_response("login", &response);
        let status = response.status();
        if status != StatusCode::OK {
            return LoginAttempt::Retry(ApmError::UnexpectedStatus { endpoint: super::LOGIN.to_string(), status });
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => return LoginAttempt::Retry(err.into()),
        };

        match serde_json::from_str::<LoginResponse>(body.as_str()) {
            Ok(login) => LoginAttempt::Granted(AccessToken::new(login.access_token)),
            Err(err) => LoginAttempt::Abort(err.into()),
        }
    }

    async fn query_node_detail(&self, token: &AccessToken, machine_id: &MachineId) -> Result<NodeDetail, ApmError> {
        let _timer = super::start_apm_timer(super::NODE_DETAIL);
        let span = tracing::info_span!("query APM node detail", %machine_id);

        let mut url = self.node_detail_endpoint.clone();
        url.query_pairs_mut().append_pair("id", machine_id.as_ref());

        let result: Result<NodeDetail, ApmError> = self
            .client
            .get(url)
            .header(ACCEPT, APPLICATION_JSON)
            .bearer_auth(token.secret())
            .send()
            .map_err(|error| {
                tracing::error!(?error, "failed APM node detail response");
                ApmError::from(error)
            })
            .and_then(|response| async move {
                super::log_response("node detail", &response);
                let status = response.status();
                if status != StatusCode::OK {
                    return Err(ApmError::UnexpectedStatus { endpoint: super::NODE_DETAIL.to_string(), status });
                }
                response.text().await.map_err(ApmError::from)
            })
            .instrument(span)
            .await
            .and_then(|body| {
                let result: Result<NodeDetail, ApmError> = serde_json::from_str(body.as_str()).map_err(ApmError::from);
                tracing::debug!(%body, ?result, "APM node detail response body");
                result
            });

        if let Err(ref err) = result {
            tracing::warn!(error=?err, %machine_id, "failed to query APM node detail");
            super::track_apm_errors(super::NODE_DETAIL, err);
        }

        result
    }
}
