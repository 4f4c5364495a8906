//! HTTP Routes
//!
//! axum handlers for the device flow and identity passthrough.

use axum::{
    extract::{rejection::JsonRejection, Form, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::pages::render_device_page;
use super::AppState;
use crate::error::{DeviceAuthError, DeviceAuthResult, ValidationError};
use crate::identity::extract_id_token;
use crate::types::{
    CallbackParams, DetailResponse, DevicePollRequest, DeviceStartRequest, LoginRequest,
    PendingResponse, PollOutcome, ProfileUpdateRequest, Provider, ProviderLoginRequest,
    RefreshRequest, RegisterRequest, RequestOrigin, SubmitOutcome,
};

impl IntoResponse for DeviceAuthError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), "{}", self);
        }
        (status, Json(DetailResponse::new(self.detail()))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ProviderHealth {
    google: bool,
    github: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    identity_configured: bool,
    providers: ProviderHealth,
    live_sessions: usize,
}

#[derive(Debug, Default, Deserialize)]
struct FormQuery {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitForm {
    #[serde(default)]
    code: String,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> DeviceAuthResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| ValidationError::InvalidRequest.into())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn caller_token(headers: &HeaderMap) -> DeviceAuthResult<String> {
    Ok(extract_id_token(
        header_str(headers, "x-id-token"),
        header_str(headers, header::AUTHORIZATION.as_str()),
    )?)
}

fn request_origin(state: &AppState, headers: &HeaderMap) -> RequestOrigin {
    match &state.public_base_url {
        Some(base) => RequestOrigin::from_base_url(base),
        None => RequestOrigin::from_headers(
            header_str(headers, "x-forwarded-proto"),
            header_str(headers, header::HOST.as_str()),
        ),
    }
}

fn form_action(state: &AppState) -> String {
    format!("{}/device", state.device.settings().route_prefix)
}

async fn root() -> &'static str {
    "Device authorization server is running"
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let google = state.device.is_provider_configured(Provider::Google);
    let github = state.device.is_provider_configured(Provider::Github);
    let healthy = state.identity_configured && (google || github);

    Json(HealthResponse {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        identity_configured: state.identity_configured,
        providers: ProviderHealth { google, github },
        live_sessions: state.device.live_sessions(),
    })
}

async fn device_start(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<DeviceStartRequest>, JsonRejection>,
) -> DeviceAuthResult<Json<crate::types::DeviceStartResponse>> {
    let request = json_body(payload)?;
    let origin = request_origin(&state, &headers);
    Ok(Json(state.device.start(&request.provider, &origin)?))
}

async fn device_poll(
    State(state): State<AppState>,
    payload: Result<Json<DevicePollRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let request = json_body(payload)?;
    let outcome = state.device.poll(&request.device_code)?;
    let status = StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::BAD_REQUEST);

    let response = match outcome {
        PollOutcome::Pending => (status, Json(PendingResponse::pending())).into_response(),
        PollOutcome::Complete(bundle) => (status, Json(bundle)).into_response(),
        PollOutcome::Failed { detail } => (status, Json(DetailResponse::new(detail))).into_response(),
        PollOutcome::Expired => {
            (status, Json(DetailResponse::new("Device authorization expired"))).into_response()
        }
        PollOutcome::Unknown => {
            (status, Json(DetailResponse::new("Unknown device code"))).into_response()
        }
    };
    Ok(response)
}

async fn device_form(
    State(state): State<AppState>,
    query: Option<Query<FormQuery>>,
) -> Html<String> {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let is_error = query.error.as_deref() == Some("true");
    let page = state
        .device
        .form(query.code.as_deref(), query.message.as_deref(), is_error);
    Html(render_device_page(&page, &form_action(&state)))
}

async fn device_submit(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Option<Form<SubmitForm>>,
) -> Response {
    let form = form.map(|Form(f)| f).unwrap_or_default();
    let origin = request_origin(&state, &headers);

    match state.device.submit(&form.code, &origin) {
        SubmitOutcome::Redirect(url) => (StatusCode::FOUND, [(header::LOCATION, url)]).into_response(),
        SubmitOutcome::Page(page) => Html(render_device_page(&page, &form_action(&state))).into_response(),
    }
}

async fn device_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    params: Option<Query<CallbackParams>>,
) -> Html<String> {
    let params = params.map(|Query(p)| p).unwrap_or_default();
    let origin = request_origin(&state, &headers);
    let page = state.device.callback(&provider, &params, &origin).await;
    Html(render_device_page(&page, &form_action(&state)))
}

async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let request = json_body(payload)?;
    Ok(Json(state.identity.register(&request).await?).into_response())
}

async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let request = json_body(payload)?;
    Ok(Json(state.identity.login(&request).await?).into_response())
}

async fn login_provider(
    State(state): State<AppState>,
    payload: Result<Json<ProviderLoginRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let request = json_body(payload)?;
    Ok(Json(state.identity.login_with_provider(&request).await?).into_response())
}

async fn refresh(
    State(state): State<AppState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let request = json_body(payload)?;
    Ok(Json(state.identity.refresh(&request).await?).into_response())
}

async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> DeviceAuthResult<Response> {
    let token = caller_token(&headers)?;
    Ok(Json(state.identity.profile(&token).await?).into_response())
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProfileUpdateRequest>, JsonRejection>,
) -> DeviceAuthResult<Response> {
    let token = caller_token(&headers)?;
    let request = json_body(payload)?;
    Ok(Json(state.identity.update_profile(&token, &request).await?).into_response())
}

async fn delete_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> DeviceAuthResult<Response> {
    let token = caller_token(&headers)?;
    Ok(Json(state.identity.delete_profile(&token).await?).into_response())
}

/// Auth routes, relative to the route prefix.
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/device/start", post(device_start))
        .route("/device/poll", post(device_poll))
        .route("/device", get(device_form).post(device_submit))
        .route("/device/callback/:provider", get(device_callback))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/login/provider", post(login_provider))
        .route("/refresh", post(refresh))
        .route(
            "/me",
            get(get_profile).patch(update_profile).delete(delete_profile),
        )
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let prefix = state.device.settings().route_prefix.clone();
    let base = Router::new()
        .route("/", get(root))
        .route("/health", get(health));

    let router = if prefix.is_empty() {
        base.merge(auth_routes())
    } else {
        base.nest(&prefix, auth_routes())
    };

    router.with_state(state)
}
