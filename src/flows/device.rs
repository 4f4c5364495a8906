//! Device Authorization Flow
//!
//! Session lifecycle driven by the CLI (start, poll), the human (form, submit)
//! and the OAuth provider (callback).

use std::sync::Arc;

use crate::core::{normalize_user_code, Clock, CodeGenerator, DefaultCodeGenerator, SystemClock};
use crate::error::{
    ConfigurationError, DeviceAuthError, DeviceAuthResult, NetworkError, SessionError,
    UpstreamError, ValidationError,
};
use crate::providers::ProviderExchange;
use crate::session::{Claim, SessionStore};
use crate::telemetry::{DeviceAuthLogContext, DeviceAuthMetrics, Logger, NoOpMetrics, TracingLogger};
use crate::types::{
    CallbackParams, DevicePage, DeviceSession, DeviceStartResponse, PollOutcome, Provider,
    RequestOrigin, SessionStatus, SubmitOutcome, TokenBundle, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_ROUTE_PREFIX, DEFAULT_SESSION_TTL_SECS,
};

pub const FORM_PROMPT: &str = "Enter the device code shown in your CLI.";
pub const CODE_REQUIRED: &str = "Device code is required";
pub const CODE_INVALID: &str = "Invalid or expired device code. Please try again.";
pub const CODE_EXPIRED: &str = "Device code has expired. Restart the login from the CLI.";
pub const CODE_USED: &str = "This code has already been used. Return to the CLI.";
pub const CODE_FAILED: &str = "This login attempt has failed. Restart the login from the CLI.";
pub const MISSING_STATE: &str = "Missing state parameter";
pub const SESSION_NOT_FOUND: &str = "Session not found or expired. Return to the CLI and try again.";
pub const SESSION_EXPIRED: &str = "Session has expired. Please restart the login from the CLI.";
pub const MISSING_CODE: &str = "Missing authorization code";
pub const IDENTITY_FAILED: &str = "Identity provider authentication failed";
pub const AUTH_COMPLETE: &str =
    "Authentication complete. You may return to the CLI to finish logging in.";
pub const DEFAULT_FAILURE_DETAIL: &str = "Authorization failed";
pub const PROVIDER_MISMATCH: &str = "Callback provider does not match this login";

const CREATE_ATTEMPTS: usize = 3;

/// Device flow settings.
#[derive(Clone, Debug)]
pub struct DeviceFlowSettings {
    pub ttl_secs: u64,
    pub poll_interval_secs: u64,
    /// Prefix the auth routes are mounted under, used to build absolute URLs.
    pub route_prefix: String,
}

impl Default for DeviceFlowSettings {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            route_prefix: DEFAULT_ROUTE_PREFIX.to_string(),
        }
    }
}

/// Device authorization service.
pub struct DeviceFlowService {
    store: Arc<dyn SessionStore>,
    exchange: Arc<dyn ProviderExchange>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    logger: Arc<dyn Logger>,
    metrics: Arc<dyn DeviceAuthMetrics>,
    settings: DeviceFlowSettings,
}

impl DeviceFlowService {
    /// Create new service with random codes, the system clock and `tracing` logging.
    pub fn new(
        store: Arc<dyn SessionStore>,
        exchange: Arc<dyn ProviderExchange>,
        settings: DeviceFlowSettings,
    ) -> Self {
        Self {
            store,
            exchange,
            codes: Arc::new(DefaultCodeGenerator),
            clock: Arc::new(SystemClock),
            logger: Arc::new(TracingLogger),
            metrics: Arc::new(NoOpMetrics),
            settings,
        }
    }

    /// Set code generator.
    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    /// Set clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set logger.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Set metrics.
    pub fn with_metrics(mut self, metrics: Arc<dyn DeviceAuthMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn settings(&self) -> &DeviceFlowSettings {
        &self.settings
    }

    /// Number of sessions currently held.
    pub fn live_sessions(&self) -> usize {
        self.store.len()
    }

    /// Provider has client credentials.
    pub fn is_provider_configured(&self, provider: Provider) -> bool {
        self.exchange.is_configured(provider)
    }

    /// Begin a device authorization for `provider`.
    pub fn start(
        &self,
        provider: &str,
        origin: &RequestOrigin,
    ) -> DeviceAuthResult<DeviceStartResponse> {
        self.sweep();

        let provider: Provider = provider.parse()?;
        if !self.exchange.is_configured(provider) {
            self.logger.warn(
                "Device start for unconfigured provider",
                &DeviceAuthLogContext::new()
                    .provider(provider.as_str())
                    .operation("start"),
            );
            return Err(ConfigurationError::ProviderNotConfigured { provider }.into());
        }

        let session = self.create_session(provider)?;

        let verification_uri = origin.verification_uri(&self.settings.route_prefix);
        let encoded_user_code: String =
            url::form_urlencoded::byte_serialize(session.user_code.as_bytes()).collect();
        let verification_uri_complete = format!("{}?code={}", verification_uri, encoded_user_code);

        self.logger.info(
            "Device session started",
            &DeviceAuthLogContext::new()
                .provider(provider.as_str())
                .operation("start")
                .device_code(&session.device_code),
        );
        self.metrics.record_session_started(provider.as_str());
        self.metrics.set_live_sessions(self.store.len());

        Ok(DeviceStartResponse {
            device_code: session.device_code,
            user_code: session.user_code,
            verification_uri,
            verification_uri_complete,
            interval: self.settings.poll_interval_secs,
            expires_in: self.settings.ttl_secs,
        })
    }

    fn create_session(&self, provider: Provider) -> DeviceAuthResult<DeviceSession> {
        let mut last_error = None;

        for _ in 0..CREATE_ATTEMPTS {
            let user_code = self.codes.user_code();
            let session = DeviceSession::new(
                self.codes.device_code(),
                user_code.clone(),
                normalize_user_code(&user_code),
                provider,
                self.codes.state(),
                self.clock.now(),
                self.settings.ttl_secs,
            );

            match self.store.create(session.clone()) {
                Ok(()) => return Ok(session),
                Err(e @ DeviceAuthError::Session(SessionError::Conflict { .. })) => {
                    self.logger.debug(
                        "Generated code collided with a live session",
                        &DeviceAuthLogContext::new().operation("start"),
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| SessionError::Conflict { index: "device_code" }.into()))
    }

    /// Observe the session for `device_code`; terminal results are handed out once.
    pub fn poll(&self, device_code: &str) -> DeviceAuthResult<PollOutcome> {
        if device_code.trim().is_empty() {
            return Err(ValidationError::InvalidRequest.into());
        }

        self.sweep();

        let outcome = match self.store.claim(device_code) {
            Claim::Unknown => PollOutcome::Unknown,
            Claim::Pending(_) => PollOutcome::Pending,
            Claim::Consumed(session) => {
                let outcome = match session.status {
                    SessionStatus::Complete => match session.tokens {
                        Some(tokens) => PollOutcome::Complete(tokens),
                        None => PollOutcome::Failed {
                            detail: DEFAULT_FAILURE_DETAIL.to_string(),
                        },
                    },
                    SessionStatus::Error => PollOutcome::Failed {
                        detail: session
                            .error
                            .filter(|e| !e.is_empty())
                            .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string()),
                    },
                    SessionStatus::Expired => PollOutcome::Expired,
                    SessionStatus::Pending | SessionStatus::Authorizing => PollOutcome::Failed {
                        detail: "Invalid device session state".to_string(),
                    },
                };
                self.logger.info(
                    "Device session consumed by poll",
                    &DeviceAuthLogContext::new()
                        .provider(session.provider.as_str())
                        .operation("poll")
                        .device_code(device_code)
                        .extra("status", session.status.as_str()),
                );
                outcome
            }
        };

        self.metrics.record_poll(outcome.label());
        Ok(outcome)
    }

    /// Code entry form.
    pub fn form(&self, code: Option<&str>, message: Option<&str>, is_error: bool) -> DevicePage {
        DevicePage::form(
            message.filter(|m| !m.is_empty()).unwrap_or(FORM_PROMPT),
            code.unwrap_or_default(),
            is_error,
        )
    }

    /// Handle the human submitting a user code.
    pub fn submit(&self, code: &str, origin: &RequestOrigin) -> SubmitOutcome {
        if code.trim().is_empty() {
            return SubmitOutcome::Page(DevicePage::form(CODE_REQUIRED, code, true));
        }

        let normalized = normalize_user_code(code);
        let session = match self
            .store
            .find_by_user_code(&normalized)
            .and_then(|device_code| self.store.touch(&device_code))
        {
            Some(session) => session,
            None => return SubmitOutcome::Page(DevicePage::form(CODE_INVALID, code, true)),
        };

        let context = DeviceAuthLogContext::new()
            .provider(session.provider.as_str())
            .operation("submit")
            .device_code(&session.device_code);

        match session.status {
            SessionStatus::Expired => {
                self.store.remove(&session.device_code);
                self.logger.info("Expired device code submitted", &context);
                return SubmitOutcome::Page(DevicePage::form(CODE_EXPIRED, code, true));
            }
            SessionStatus::Complete => {
                return SubmitOutcome::Page(DevicePage::form(CODE_USED, code, true));
            }
            SessionStatus::Error => {
                return SubmitOutcome::Page(DevicePage::form(CODE_FAILED, code, true));
            }
            SessionStatus::Pending | SessionStatus::Authorizing => {}
        }

        let callback_url = origin.callback_uri(&self.settings.route_prefix, session.provider);
        match self
            .exchange
            .authorization_url(session.provider, &session.state, &callback_url)
        {
            Ok(url) => {
                self.logger.info("Redirecting to provider consent", &context);
                SubmitOutcome::Redirect(url)
            }
            Err(e) => {
                self.logger.error(
                    "Provider authorization URL unavailable",
                    &context.extra("error_code", e.error_code()),
                );
                self.fail(
                    &session,
                    format!("{} OAuth not configured", session.provider.display_name()),
                );
                SubmitOutcome::Page(DevicePage::form(
                    format!(
                        "{} login is not available. Contact support.",
                        session.provider.display_name()
                    ),
                    code,
                    true,
                ))
            }
        }
    }

    /// Handle the provider redirecting the browser back.
    pub async fn callback(
        &self,
        provider: &str,
        params: &CallbackParams,
        origin: &RequestOrigin,
    ) -> DevicePage {
        let state = match params.state() {
            Some(state) => state,
            None => return DevicePage::result(MISSING_STATE, true),
        };

        let route_provider: Provider = match provider.parse() {
            Ok(provider) => provider,
            Err(_) => return DevicePage::result("Unsupported provider", true),
        };

        let session = match self
            .store
            .find_by_state(state)
            .and_then(|device_code| self.store.get(&device_code))
        {
            Some(session) => session,
            None => return DevicePage::result(SESSION_NOT_FOUND, true),
        };

        let context = DeviceAuthLogContext::new()
            .provider(session.provider.as_str())
            .operation("callback")
            .device_code(&session.device_code);

        if session.provider != route_provider {
            self.logger.warn(
                "Callback arrived on another provider's route",
                &context.clone().extra("route", route_provider.as_str()),
            );
            self.fail(&session, PROVIDER_MISMATCH.to_string());
            return DevicePage::result(format!("Authorization failed: {}", PROVIDER_MISMATCH), true);
        }

        if session.is_expired_at(self.clock.now()) {
            self.expire(&session);
            return DevicePage::result(SESSION_EXPIRED, true);
        }

        if let Some(error) = params.error() {
            self.logger.info(
                "Provider denied authorization",
                &context.clone().extra("provider_error", error),
            );
            self.fail(&session, error.to_string());
            return DevicePage::result(format!("Authorization failed: {}", error), true);
        }

        let code = match params.code() {
            Some(code) => code,
            None => {
                self.fail(&session, MISSING_CODE.to_string());
                return DevicePage::result(MISSING_CODE, true);
            }
        };

        let display = session.provider.display_name();
        let callback_url = origin.callback_uri(&self.settings.route_prefix, session.provider);

        let provider_token = match self
            .exchange
            .exchange_code(session.provider, code, &callback_url, state)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                self.upstream_failure("provider", &e, &context);
                let (recorded, page) = match &e {
                    DeviceAuthError::Configuration(_) => (
                        format!("{} OAuth not configured", display),
                        format!("{} login is not available. Contact support.", display),
                    ),
                    DeviceAuthError::Network(NetworkError::ConnectionFailed { .. })
                    | DeviceAuthError::Network(NetworkError::Timeout { .. }) => (
                        e.detail(),
                        format!("Failed to contact {}. Please try again.", display),
                    ),
                    DeviceAuthError::Upstream(UpstreamError::MissingToken { field }) => (
                        e.detail(),
                        format!(
                            "{} response did not include {}",
                            display,
                            token_description(field)
                        ),
                    ),
                    _ => (
                        e.detail(),
                        format!("{} authorization failed. Please try again.", display),
                    ),
                };
                self.fail(&session, recorded);
                return DevicePage::result(page, true);
            }
        };

        let auth = match self
            .exchange
            .to_federated_identity(session.provider, &provider_token)
            .await
        {
            Ok(auth) => auth,
            Err(e) => {
                self.upstream_failure("identity", &e, &context);
                self.fail(&session, e.detail());
                return DevicePage::result(IDENTITY_FAILED, true);
            }
        };

        let bundle = TokenBundle::from_auth_response(session.provider, auth);
        match self.store.attach_tokens(&session.device_code, bundle) {
            Ok(_) => {
                self.logger.info("Device session complete", &context);
                self.metrics
                    .record_session_finished(session.provider.as_str(), SessionStatus::Complete.as_str());
                DevicePage::result(AUTH_COMPLETE, false)
            }
            Err(e) => {
                // Session finished or vanished while the exchange was in flight.
                self.logger.warn(
                    "Discarding tokens for finished session",
                    &context.extra("error_code", e.error_code()),
                );
                DevicePage::result(SESSION_EXPIRED, true)
            }
        }
    }

    fn sweep(&self) {
        let stats = self.store.sweep_expired();
        if stats.expired > 0 || stats.evicted > 0 {
            self.logger.debug(
                "Swept device sessions",
                &DeviceAuthLogContext::new()
                    .operation("sweep")
                    .extra("expired", stats.expired.to_string())
                    .extra("evicted", stats.evicted.to_string()),
            );
            self.metrics.record_swept(stats.expired, stats.evicted);
        }
    }

    fn fail(&self, session: &DeviceSession, message: String) {
        match self
            .store
            .update_status(&session.device_code, SessionStatus::Error, Some(message))
        {
            Ok(_) => self
                .metrics
                .record_session_finished(session.provider.as_str(), SessionStatus::Error.as_str()),
            Err(e) => self.logger.debug(
                "Session already finished",
                &DeviceAuthLogContext::new()
                    .operation("fail")
                    .device_code(&session.device_code)
                    .extra("error_code", e.error_code()),
            ),
        }
    }

    fn expire(&self, session: &DeviceSession) {
        if self
            .store
            .update_status(&session.device_code, SessionStatus::Expired, None)
            .is_ok()
        {
            self.metrics
                .record_session_finished(session.provider.as_str(), SessionStatus::Expired.as_str());
        }
        self.store.remove(&session.device_code);
    }

    fn upstream_failure(&self, upstream: &str, error: &DeviceAuthError, context: &DeviceAuthLogContext) {
        self.logger.warn(
            "Upstream exchange failed",
            &context
                .clone()
                .extra("upstream", upstream)
                .extra("error_code", error.error_code()),
        );
        if error.is_upstream() {
            self.metrics.record_upstream_error(upstream, error.error_code());
        }
    }
}

fn token_description(field: &str) -> &'static str {
    match field {
        "id_token" => "an ID token",
        _ => "an access token",
    }
}
