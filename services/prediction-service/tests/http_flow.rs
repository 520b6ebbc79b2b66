//! Drives the router end to end with an in-memory artifact.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower::ServiceExt;

use prediction_service::categories::{Categories, CategoryMapping};
use prediction_service::classifier::{Estimator, TreeNode};
use prediction_service::history::PredictionLog;
use prediction_service::normalize::{Column, NormalizedRecord};
use prediction_service::{router, AppState, ClassValue, Classifier, Error, ModelArtifact, ServiceConfig, ServiceContext, TargetModel};

#[derive(Debug)]
struct AlwaysCardio;

impl Classifier for AlwaysCardio {
    fn predict(&self, _row: &NormalizedRecord) -> prediction_service::Result<ClassValue> {
        Ok(ClassValue::Label("Cardiovascular".into()))
    }
}

fn config(dir: &Path) -> ServiceConfig {
    ServiceConfig { log_path: dir.join("predictions_log.csv"), ..ServiceConfig::default() }
}

fn stub_state(cfg: &ServiceConfig) -> AppState {
    AppState::Ready(Arc::new(ServiceContext::new(ModelArtifact::new(TargetModel::new(AlwaysCardio)), cfg)))
}

async fn body_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn form_post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> { Request::builder().uri(uri).body(Body::empty()).unwrap() }

#[tokio::test]
async fn form_submission_renders_prediction_and_logs_one_row() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let app = router(stub_state(&cfg));

    let resp = app.clone().oneshot(form_post("age=30&gender=F&location=Urban&auto_age_group=on&log=on")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Predicted Cause Group: Cardiovascular"), "{html}");
    assert!(html.contains("Derived age group: 19-40"));
    assert!(html.contains("Prediction logged successfully!"));

    let rows = PredictionLog::new(&cfg.log_path, false).read_all().unwrap().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].age, 30);
    assert_eq!(rows[0].gender, "F");
    assert_eq!(rows[0].location, "Urban");
    assert_eq!(rows[0].age_group, "19-40");
    assert_eq!(rows[0].cause_group, "Cardiovascular");

    let html = body_text(app.oneshot(get("/history")).await.unwrap()).await;
    assert!(html.contains("<td>Cardiovascular</td>"));
}

#[tokio::test]
async fn unchecked_log_box_skips_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let app = router(stub_state(&cfg));
    let resp = app.clone().oneshot(form_post("age=70&gender=M&location=Rural&age_group=60%2B")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(!cfg.log_path.exists());
    let html = body_text(app.oneshot(get("/history")).await.unwrap()).await;
    assert!(html.contains("No predictions logged yet."));
}

#[tokio::test]
async fn missing_artifact_halts_every_form_route() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = ServiceConfig { artifact_path: PathBuf::from("/nonexistent/cause_and_exact_pipeline.json"), ..config(dir.path()) };
    let state = AppState::from_config(&cfg);
    assert!(matches!(&state, AppState::Unavailable(e) if matches!(**e, Error::ArtifactNotFound(_))));
    let app = router(state);

    let resp = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_text(resp).await.contains("not found"));

    let resp = app.clone().oneshot(form_post("age=30&gender=F&location=Urban&auto_age_group=on&log=on")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!cfg.log_path.exists());

    let resp = app.oneshot(get("/live")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn json_api_reports_unseen_category() {
    let dir = tempfile::tempdir().unwrap();
    let mut cats = Categories::default();
    cats.insert(Column::Gender, CategoryMapping::encoded(["F", "M"]));
    cats.insert(Column::Location, CategoryMapping::encoded(["Rural", "Urban"]));
    cats.insert(Column::AgeGroup, CategoryMapping::encoded(["0-5", "19-40", "41-60", "6-18", "60+"]));
    let tree = Estimator::Tree { nodes: vec![TreeNode::Leaf { value: ClassValue::Code(0) }] };
    let artifact = ModelArtifact::new(TargetModel::new(tree).with_labels(["Cardiovascular"])).with_categories(cats);
    let app = router(AppState::Ready(Arc::new(ServiceContext::new(artifact, &config(dir.path())))));

    let req = |body: &str| {
        Request::builder()
            .method("POST")
            .uri("/api/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let resp = app.clone().oneshot(req(r#"{"age": 30, "gender": "F", "location": "Suburban", "log": false}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["kind"], "encoding_key_missing");

    let resp = app.oneshot(req(r#"{"age": 30, "gender": "F", "location": "Urban", "log": false}"#)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
    assert_eq!(v["cause_group"], "Cardiovascular");
    assert_eq!(v["record"]["AGE_GROUP"], "19-40");
    assert_eq!(v["record"]["CODES"]["LOCATION"], 1);
    assert_eq!(v["log"]["status"], "skipped");
}

#[tokio::test]
async fn optional_views_follow_toggles() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let app = router(stub_state(&cfg));
    assert_eq!(app.clone().oneshot(get("/categories")).await.unwrap().status(), StatusCode::NOT_FOUND);
    let resp = app.oneshot(get("/performance")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("No evaluation report is stored"));

    let mut cfg = config(dir.path());
    cfg.outputs.category_debug = true;
    cfg.outputs.evaluation_report = false;
    let app = router(stub_state(&cfg));
    assert_eq!(app.clone().oneshot(get("/categories")).await.unwrap().status(), StatusCode::OK);
    assert_eq!(app.oneshot(get("/performance")).await.unwrap().status(), StatusCode::NOT_FOUND);
}
