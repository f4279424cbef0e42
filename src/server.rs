//! # Quote API
//!
//! The warp-served consumer surface: `GET /v1/route` over the engine and a
//! `GET /health` liveness probe. The metrics endpoint lives in
//! [`crate::metrics`] on its own port.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::{Filter, Reply};

use crate::config::ServerSettings;
use crate::engine::RouteEngine;
use crate::errors::RouteError;
use crate::types::RouteRequest;

/// Query-string shape of `GET /v1/route`. Addresses arrive as hex strings
/// and are validated here, before the engine sees the request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteQuery {
    from_chain_id: u64,
    to_chain_id: u64,
    from_token: String,
    to_token: String,
    amount: String,
    slippage: Option<f64>,
    recipient: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl RouteQuery {
    fn into_request(self) -> Result<RouteRequest, String> {
        let parse = |label: &str, s: &str| {
            Address::from_str(s).map_err(|_| format!("{label} is not a valid address: {s}"))
        };
        Ok(RouteRequest {
            from_chain_id: self.from_chain_id,
            to_chain_id: self.to_chain_id,
            from_token: parse("fromToken", &self.from_token)?,
            to_token: parse("toToken", &self.to_token)?,
            amount: self.amount,
            slippage: self.slippage,
            recipient: self
                .recipient
                .as_deref()
                .map(|r| parse("recipient", r))
                .transpose()?,
        })
    }
}

/// Starts the quote API on its own Tokio task; resolves on cancellation.
pub fn start_api_server(
    engine: Arc<RouteEngine>,
    settings: &ServerSettings,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let bind = settings.bind.clone();
    let port = settings.port;
    tokio::spawn(async move {
        let addr: SocketAddr = match format!("{bind}:{port}").parse() {
            Ok(addr) => addr,
            Err(e) => {
                error!(target: "server", "Invalid API server address {bind}:{port}: {e}");
                return;
            }
        };

        let engine_filter = warp::any().map(move || engine.clone());
        let route = warp::path!("v1" / "route")
            .and(warp::get())
            .and(warp::query::<RouteQuery>())
            .and(engine_filter)
            .then(handle_route);
        let health = warp::path!("health")
            .and(warp::get())
            .map(|| warp::reply::json(&serde_json::json!({ "status": "ok" })));

        info!(target: "server", "Quote API listening on http://{}", addr);
        let (_, serving) = warp::serve(route.or(health)).bind_with_graceful_shutdown(addr, {
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        });
        serving.await;
        info!(target: "server", "Quote API stopped");
    })
}

async fn handle_route(query: RouteQuery, engine: Arc<RouteEngine>) -> warp::reply::Response {
    let request = match query.into_request() {
        Ok(r) => r,
        Err(message) => {
            return reply_error(StatusCode::BAD_REQUEST, message);
        }
    };
    match engine.find_routes(&request).await {
        Ok(Some(response)) => warp::reply::json(&response).into_response(),
        Ok(None) => reply_error(StatusCode::NOT_FOUND, "no route available".into()),
        Err(e @ (RouteError::InvalidRequest(_) | RouteError::UnsupportedChain(_))) => {
            reply_error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ RouteError::DeadlineExceeded(_)) => {
            warn!(target: "server", error = %e, "Discovery hit the deadline");
            reply_error(StatusCode::GATEWAY_TIMEOUT, e.to_string())
        }
        Err(e @ RouteError::Shutdown) => {
            reply_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(e) => {
            error!(target: "server", error = %e, "Discovery failed");
            reply_error(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

fn reply_error(status: StatusCode, error: String) -> warp::reply::Response {
    warp::reply::with_status(warp::reply::json(&ErrorBody { error }), status).into_response()
}
