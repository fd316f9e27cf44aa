//! The `/status` endpoint.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ServerResult;
use crate::ServerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub commit: String,
    pub build_time: String,
    pub start_time: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub format: Option<String>,
}

/// Report build and uptime metadata as JSON, or YAML when asked for it.
/// Unknown formats fall back to JSON.
pub async fn handle_status(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<StatusQuery>,
) -> ServerResult<Response> {
    let response = StatusResponse {
        commit: state.commit.clone(),
        build_time: state.build_time.clone(),
        start_time: state.start_time.clone(),
    };
    match query.format.as_deref() {
        Some("yaml") => {
            let body = serde_yaml::to_string(&response)
                .map_err(|e| crate::error::ServerError::Serialization(e.to_string()))?;
            Ok(([("content-type", "application/yaml")], body).into_response())
        }
        _ => Ok(Json(response).into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_with_snake_case_keys() {
        let response = StatusResponse {
            commit: "abc123".into(),
            build_time: "2026-01-01T00:00:00Z".into(),
            start_time: "2026-01-02T00:00:00Z".into(),
        };
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["commit"], "abc123");
        assert_eq!(v["build_time"], "2026-01-01T00:00:00Z");
        assert_eq!(v["start_time"], "2026-01-02T00:00:00Z");
    }

    #[test]
    fn status_yaml_roundtrips() {
        let response = StatusResponse {
            commit: "abc123".into(),
            build_time: "0".into(),
            start_time: "0".into(),
        };
        let yaml = serde_yaml::to_string(&response).unwrap();
        let back: StatusResponse = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.commit, "abc123");
    }
}
