//! HTTP API: list the chain, mine a block, list and add peers

use crate::{
    block::Block,
    chain::Chain,
    error::{LedgerError, NetworkError},
    gossip::peer_url,
    node::Ledger,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Body of `POST /mine-block`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineRequest {
    pub data: String,
}

/// Body of `POST /add-peer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPeerRequest {
    pub peer: String,
}

/// Build the API router over a ledger
pub fn router(ledger: Ledger) -> Router {
    Router::new()
        .route("/blocks", get(list_blocks))
        .route("/mine-block", post(mine_block))
        .route("/peers", get(list_peers))
        .route("/add-peer", post(add_peer))
        .with_state(ledger)
}

/// Serve the API until the listener fails
pub async fn serve(listener: TcpListener, ledger: Ledger) {
    if let Err(e) = axum::serve(listener, router(ledger)).await {
        error!("HTTP server stopped: {}", e);
    }
}

async fn list_blocks(State(ledger): State<Ledger>) -> Json<Chain> {
    Json(ledger.current_chain().await)
}

async fn mine_block(
    State(ledger): State<Ledger>,
    Json(request): Json<MineRequest>,
) -> Result<Json<Block>, ApiError> {
    let block = ledger.propose_block(&request.data).await?;
    Ok(Json(block))
}

async fn list_peers(State(ledger): State<Ledger>) -> Json<Vec<String>> {
    let peers = ledger.peers().await;
    Json(peers.into_iter().map(|peer| peer.address).collect())
}

/// Dials in the background; a failed connection is only logged.
async fn add_peer(
    State(ledger): State<Ledger>,
    Json(request): Json<AddPeerRequest>,
) -> Result<StatusCode, ApiError> {
    let url = peer_url(&request.peer).map_err(LedgerError::from)?;
    info!("Adding peer {}", url);
    tokio::spawn(async move {
        if let Err(e) = ledger.register_outbound_peer(&url).await {
            warn!("Connection failed: {}", e);
        }
    });
    Ok(StatusCode::OK)
}

/// Maps ledger errors onto HTTP status codes
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::Rejected(_)
            | LedgerError::Network(NetworkError::InvalidAddress { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}
