//! HTTP surface: the HTML form, its optional views and a JSON mirror.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument};

use healthrisk_core::PREDICTION_METRICS;

use crate::config::ServiceConfig;
use crate::error::Error;
use crate::normalize::InputRecord;
use crate::predict::ServiceContext;
use crate::render;

/// Either a loaded context or the artifact error that stops every interaction.
#[derive(Debug, Clone)]
pub enum AppState {
    Ready(Arc<ServiceContext>),
    Unavailable(Arc<Error>),
}

impl AppState {
    pub fn from_config(cfg: &ServiceConfig) -> Self {
        match ServiceContext::load(cfg) {
            Ok(ctx) => AppState::Ready(Arc::new(ctx)),
            Err(e) => {
                error!(error = %e, path = %cfg.artifact_path.display(), "artifact_unavailable");
                AppState::Unavailable(Arc::new(e))
            }
        }
    }

    pub fn is_ready(&self) -> bool { matches!(self, AppState::Ready(_)) }

    fn context(&self) -> Result<&Arc<ServiceContext>, Response> {
        match self {
            AppState::Ready(ctx) => Ok(ctx),
            AppState::Unavailable(e) => {
                PREDICTION_METRICS.predictions_total.with_label_values(&["unavailable"]).inc();
                Err((StatusCode::SERVICE_UNAVAILABLE, Html(render::unavailable(e))).into_response())
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/predict", post(predict_form))
        .route("/api/predict", post(predict_json))
        .route("/history", get(history))
        .route("/performance", get(performance))
        .route("/categories", get(categories))
        .with_state(state)
        .merge(healthrisk_core::health_router())
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::ArtifactNotFound(_) | Error::ArtifactLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::InvalidInput(_) | Error::EncodingKeyMissing { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Prediction(_) | Error::Log(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn not_found() -> Response { (StatusCode::NOT_FOUND, Html(render::page(render::TITLE, "<p>Not enabled.</p>"))).into_response() }

async fn index(State(state): State<AppState>) -> Response {
    let ctx = match state.context() {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    Html(render::page(render::TITLE, &render::form(ctx, None))).into_response()
}

/// Checkboxes are absent from the body when unchecked.
#[derive(Debug, Deserialize)]
pub struct PredictForm {
    pub age: String,
    pub gender: String,
    pub location: String,
    pub auto_age_group: Option<String>,
    pub age_group: Option<String>,
    pub log: Option<String>,
}

impl PredictForm {
    fn into_input(self) -> Result<(InputRecord, bool), Error> {
        let age: u32 = self
            .age
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("age must be a whole number, got `{}`", self.age)))?;
        let mut input = InputRecord::new(age, self.gender, self.location);
        if self.auto_age_group.is_none() {
            let group = self
                .age_group
                .filter(|g| !g.trim().is_empty())
                .ok_or_else(|| Error::InvalidInput("select an age group or enable auto-derivation".into()))?;
            input = input.with_age_group(group);
        }
        Ok((input, self.log.is_some()))
    }
}

#[instrument(skip_all)]
async fn predict_form(State(state): State<AppState>, Form(form): Form<PredictForm>) -> Response {
    let ctx = match state.context() {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let (input, log) = match form.into_input() {
        Ok(v) => v,
        Err(e) => {
            let body = format!("{}{}", render::form(ctx, None), render::error(&e));
            return (status_for(&e), Html(render::page(render::TITLE, &body))).into_response();
        }
    };
    match ctx.submit(input.clone(), log).await {
        Ok(sub) => {
            let body = format!("{}{}", render::form(ctx, Some(&input)), render::submission(&sub, &input));
            Html(render::page(render::TITLE, &body)).into_response()
        }
        Err(e) => {
            let body = format!("{}{}", render::form(ctx, Some(&input)), render::error(&e));
            (status_for(&e), Html(render::page(render::TITLE, &body))).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    #[serde(flatten)]
    pub input: InputRecord,
    #[serde(default = "default_log")]
    pub log: bool,
}

fn default_log() -> bool { true }

fn json_error(err: &Error) -> Response {
    (status_for(err), Json(serde_json::json!({"error": err.to_string(), "kind": err.kind()}))).into_response()
}

#[instrument(skip_all)]
async fn predict_json(State(state): State<AppState>, Json(req): Json<PredictRequest>) -> Response {
    let ctx = match &state {
        AppState::Ready(ctx) => ctx,
        AppState::Unavailable(e) => return json_error(e),
    };
    match ctx.submit(req.input, req.log).await {
        Ok(sub) => Json(sub).into_response(),
        Err(e) => json_error(&e),
    }
}

async fn history(State(state): State<AppState>) -> Response {
    let ctx = match state.context() {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if !ctx.toggles().history {
        return not_found();
    }
    match ctx.history().await {
        Ok(rows) => Html(render::page("Past predictions", &render::history(ctx, rows.as_deref()))).into_response(),
        Err(e) => (status_for(&e), Html(render::page("Past predictions", &render::error(&e)))).into_response(),
    }
}

async fn performance(State(state): State<AppState>) -> Response {
    let ctx = match state.context() {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if !ctx.toggles().evaluation_report {
        return not_found();
    }
    Html(render::page("Model performance", &render::performance(ctx))).into_response()
}

async fn categories(State(state): State<AppState>) -> Response {
    let ctx = match state.context() {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if !ctx.toggles().category_debug {
        return not_found();
    }
    Html(render::page("Category mappings", &render::categories(ctx))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(age: &str, auto: bool, group: Option<&str>) -> PredictForm {
        PredictForm {
            age: age.into(),
            gender: "F".into(),
            location: "Urban".into(),
            auto_age_group: auto.then(|| "on".into()),
            age_group: group.map(str::to_string),
            log: Some("on".into()),
        }
    }

    #[test]
    fn auto_checkbox_drops_manual_group() {
        let (input, log) = form("30", true, Some("60+")).into_input().unwrap();
        assert!(input.is_derived());
        assert!(log);
    }

    #[test]
    fn manual_group_required_without_auto() {
        assert!(matches!(form("30", false, None).into_input(), Err(Error::InvalidInput(_))));
        let (input, _) = form("30", false, Some("41-60")).into_input().unwrap();
        assert_eq!(input.resolved_age_group(), "41-60");
    }

    #[test]
    fn non_numeric_age_is_invalid_input() {
        assert!(matches!(form("thirty", true, None).into_input(), Err(Error::InvalidInput(_))));
        assert!(matches!(form("-1", true, None).into_input(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn json_request_defaults_to_logging() {
        let req: PredictRequest = serde_json::from_str(r#"{"age": 30, "gender": "F", "location": "Urban"}"#).unwrap();
        assert!(req.log);
        assert!(req.input.is_derived());
    }
}
