use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;

use crate::dashboard::page;
use crate::dashboard::server::AppState;
use crate::message::CapturedMessage;
use crate::store::{PacketPair, PairFilter};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectorStatus {
    pub version: &'static str,
    pub capture_port: u16,
    pub messages: usize,
    pub pairs: usize,
}

#[derive(Serialize)]
pub struct ClearResult {
    pub cleared: bool,
}

pub async fn index(State(state): State<AppState>) -> Html<String> {
    Html(page::render(state.capture_port, state.refresh_secs))
}

pub async fn get_packets(State(state): State<AppState>) -> Json<Vec<CapturedMessage>> {
    Json(state.snapshot.messages())
}

pub async fn get_pairs(
    State(state): State<AppState>,
    Query(filter): Query<PairFilter>,
) -> Json<Vec<PacketPair>> {
    Json(filter.apply(state.snapshot.pairs()))
}

pub async fn get_status(State(state): State<AppState>) -> Json<InspectorStatus> {
    let stats = state.snapshot.stats();
    Json(InspectorStatus {
        version: env!("CARGO_PKG_VERSION"),
        capture_port: state.capture_port,
        messages: stats.messages,
        pairs: stats.pairs,
    })
}

pub async fn post_clear(State(state): State<AppState>) -> Json<ClearResult> {
    state.snapshot.clear();
    tracing::info!("Store cleared");
    Json(ClearResult { cleared: true })
}

/// Link target of the page's clear button: clear, then back to the page.
pub async fn get_clear(State(state): State<AppState>) -> impl IntoResponse {
    state.snapshot.clear();
    tracing::info!("Store cleared");
    (StatusCode::FOUND, [(header::LOCATION, "/")])
}
