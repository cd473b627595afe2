use super::json_error::JsonError;
use crate::{app::AppState, configure::RadioRequest, report::TextReport};
use axum::{
    extract::{RawForm, RawQuery, State},
    Json,
};
use radio_tuner_json::{PutRadio, Report};

async fn configure(state: AppState, request: RadioRequest) -> Result<Report, JsonError> {
    // Register access blocks (including waiting for the hardware lock), so it
    // is run in a blocking thread.
    tokio::task::spawn_blocking(move || state.configure(&request))
        .await
        .map_err(|err| JsonError::server_error(err.into()))
}

fn query_request(query: Option<String>) -> RadioRequest {
    RadioRequest::from_query(query.as_deref().unwrap_or_default())
}

pub async fn get_radio(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<Report>, JsonError> {
    configure(state, query_request(query)).await.map(Json)
}

pub async fn put_radio(
    State(state): State<AppState>,
    Json(put): Json<PutRadio>,
) -> Result<Json<Report>, JsonError> {
    configure(state, RadioRequest::from(put)).await.map(Json)
}

async fn configure_text(state: AppState, request: RadioRequest) -> Result<String, JsonError> {
    let report = configure(state, request).await?;
    Ok(TextReport(&report).to_string())
}

pub async fn get_configure(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<String, JsonError> {
    configure_text(state, query_request(query)).await
}

// Form fields take precedence over the query string, as with CGI forms.
pub async fn post_configure(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    RawForm(form): RawForm,
) -> Result<String, JsonError> {
    let form = String::from_utf8_lossy(&form);
    let fields = match query {
        Some(query) => format!("{form}&{query}"),
        None => form.into_owned(),
    };
    configure_text(state, RadioRequest::from_query(&fields)).await
}
