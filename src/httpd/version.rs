use axum::Json;
use radio_tuner_json::Versions;

pub fn versions() -> Versions {
    Versions {
        radio_tuner_git: git_version::git_version!(fallback = "unknown").to_string(),
        radio_tuner_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

pub async fn get_version() -> Json<Versions> {
    Json(versions())
}
