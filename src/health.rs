//! Liveness payload served on `/` and `/health`.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::cache::PersistStats;
use crate::http::{Response, StatusCode};

pub const SERVICE_NAME: &str = "windbg-symbol-proxy";

#[derive(Debug, Serialize)]
pub struct Endpoints {
    pub symbol_proxy: &'static str,
    pub health: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub endpoints: Endpoints,
    pub persist: PersistStats,
}

impl Health {
    pub fn now(persist: PersistStats) -> Self {
        Self {
            status: "ok",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            endpoints: Endpoints {
                symbol_proxy: "GET /{pdb_name}/{guid}/{filename}",
                health: "GET /health",
            },
            persist,
        }
    }

    pub fn into_response(self) -> Response {
        match serde_json::to_string_pretty(&self) {
            Ok(json) => Response::new(StatusCode::OK)
                .header("Content-Type", "application/json")
                .header("Cache-Control", "no-cache")
                .body(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode health payload");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR).body("health encoding failed")
            }
        }
    }
}
