use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::HttpConfig;
use crate::db::WaypointStore;
use crate::export::{self, TrackRequest};
use crate::track;

const INDEX_PAGE: &str = include_str!("../static/index.html");
const GPX_CONTENT_TYPE: &str = "application/gpx+xml";

#[derive(Clone)]
pub struct ApiState {
    pub store: WaypointStore,
    pub map_token: Arc<str>,
}

type ApiError = (StatusCode, String);

fn internal_error<E: std::fmt::Display>(err: E) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn token(State(state): State<ApiState>) -> String {
    info!("Got token request");
    state.map_token.to_string()
}

async fn list_topics(State(state): State<ApiState>) -> Result<Json<Vec<String>>, ApiError> {
    let topics = state.store.list_topics().await.map_err(internal_error)?;
    Ok(Json(topics.into_iter().collect()))
}

async fn locations(
    State(state): State<ApiState>,
    Path(topic): Path<String>,
    Query(request): Query<TrackRequest>,
) -> Result<Response, ApiError> {
    info!("Retrieving data for topic '{}'", topic);
    let waypoints = export::export_track(&state.store, &topic, &request)
        .await
        .map_err(internal_error)?;
    info!("Got {} waypoints", waypoints.len());

    let document = track::build_gpx(&waypoints).map_err(internal_error)?;
    let body = track::to_xml(&document).map_err(internal_error)?;
    Ok(([(header::CONTENT_TYPE, GPX_CONTENT_TYPE)], body).into_response())
}

pub fn router(store: WaypointStore, map_token: String) -> Router {
    let state = ApiState {
        store,
        map_token: map_token.into(),
    };

    Router::new()
        .route("/", get(index))
        .route("/token", get(token))
        .route("/topics", get(list_topics))
        .route("/locations/*topic", get(locations))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(config: &HttpConfig, store: WaypointStore) -> anyhow::Result<()> {
    let app = router(store, config.map_token.clone());
    let listener =
        tokio::net::TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
    info!("Starting up server on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_store;
    use crate::processor::message_processor::process_message;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{DateTime, Utc};
    use tower::ServiceExt;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(seconds, 0).unwrap()
    }

    #[tokio::test]
    async fn test_locations_returns_gpx_for_nested_topic() {
        let (store, _dir) = temp_store().await;
        store
            .write_one("owntracks/anna/phone", 52.5, 13.5, at(1_600_000_000))
            .await
            .unwrap();

        let app = router(store, String::new());
        let (status, content_type, body) = get_body(app, "/locations/owntracks/anna/phone").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(GPX_CONTENT_TYPE));
        assert!(body.contains("<trkpt"));
        assert!(body.contains("2020-09-13T12:26:40"));
    }

    #[tokio::test]
    async fn test_far_future_message_does_not_break_export() {
        let (store, _dir) = temp_store().await;
        let valid = br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":1600000000}"#;
        let far = br#"{"_type":"location","lat":1.0,"lon":2.0,"tst":300000000000}"#;
        process_message(&store, "t", valid).await.unwrap();
        assert_eq!(process_message(&store, "t", far).await.unwrap(), None);

        let app = router(store, String::new());
        let (status, _, body) = get_body(app, "/locations/t").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("<trkpt").count(), 1);
    }

    #[tokio::test]
    async fn test_locations_honors_range_and_cap() {
        let (store, _dir) = temp_store().await;
        for t in 1..=5 {
            store.write_one("a", t as f64, 0.0, at(t)).await.unwrap();
        }

        let app = router(store, String::new());
        let (status, _, body) =
            get_body(app, "/locations/a?from=1970-01-01T00:00:02Z&max=2").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("<trkpt").count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_empty_track() {
        let (store, _dir) = temp_store().await;
        let app = router(store, String::new());

        let (status, _, body) = get_body(app, "/locations/nobody").await;

        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("<trkpt"));
    }

    #[tokio::test]
    async fn test_topics_and_token() {
        let (store, _dir) = temp_store().await;
        store.write_one("b", 1.0, 1.0, at(1)).await.unwrap();
        store.write_one("a", 1.0, 1.0, at(1)).await.unwrap();

        let app = router(store, "pk.secret".to_string());
        let (_, _, topics) = get_body(app.clone(), "/topics").await;
        let (_, _, token) = get_body(app.clone(), "/token").await;
        let (status, _, index) = get_body(app, "/").await;

        assert_eq!(topics, r#"["a","b"]"#);
        assert_eq!(token, "pk.secret");
        assert_eq!(status, StatusCode::OK);
        assert!(index.contains("<html"));
    }

    #[tokio::test]
    async fn test_bad_query_string_is_rejected() {
        let (store, _dir) = temp_store().await;
        let app = router(store, String::new());

        let (status, _, _) = get_body(app, "/locations/a?max=-1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
