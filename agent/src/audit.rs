//! JSONL audit trail logging.
//!
//! Each agent run appends events to an `audit.jsonl` file, one JSON object
//! per line, so a post-mortem can reconstruct exactly what the agent
//! observed and did without replaying broker state.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// An audit event written to the JSONL trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub event: &'static str,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub data: serde_json::Value,
}

/// Append-only audit logger.
pub struct AuditLog {
    writer: BufWriter<std::fs::File>,
}

impl AuditLog {
    /// Open (or create) the audit log file for appending.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Log an event with arbitrary JSON data.
    pub fn log(&mut self, event: &'static str, data: serde_json::Value) -> Result<()> {
        let entry = AuditEvent {
            event,
            ts: Utc::now(),
            data,
        };
        let json = serde_json::to_string(&entry)?;
        writeln!(self.writer, "{json}")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn log_simple(&mut self, event: &'static str) -> Result<()> {
        self.log(event, serde_json::json!({}))
    }
}

/// Convenience: log the agent starting its control loop.
pub fn log_run_started(audit: &mut AuditLog, strategy_count: usize) -> Result<()> {
    audit.log(
        "run_started",
        serde_json::json!({ "strategy_count": strategy_count }),
    )
}

/// Convenience: log the startup flatten closing one ticket.
pub fn log_ticket_closed(audit: &mut AuditLog, symbol: &str, ticket_id: u64, ok: bool) -> Result<()> {
    audit.log(
        "startup_flatten_ticket",
        serde_json::json!({ "symbol": symbol, "ticket_id": ticket_id, "closed": ok }),
    )
}

/// Convenience: log a completed rebalance tick.
pub fn log_rebalance(
    audit: &mut AuditLog,
    total_equity_cents: i64,
    leverage: f64,
    strategy_count: usize,
) -> Result<()> {
    audit.log(
        "rebalance_computed",
        serde_json::json!({
            "equity": total_equity_cents as f64 / 100.0,
            "leverage": leverage,
            "strategy_count": strategy_count,
        }),
    )
}

/// Convenience: log a single submitted order.
pub fn log_order_submitted(audit: &mut AuditLog, symbol: &str, delta_shares: i64, magic: u32) -> Result<()> {
    audit.log(
        "order_submitted",
        serde_json::json!({ "symbol": symbol, "delta_shares": delta_shares, "magic": magic }),
    )
}

/// Convenience: log a strategy or optimizer failure that was downgraded
/// to a warning (previous weights/positions kept unchanged).
pub fn log_degraded(audit: &mut AuditLog, component: &str, reason: &str) -> Result<()> {
    audit.log(
        "degraded_to_safe_default",
        serde_json::json!({ "component": component, "reason": reason }),
    )
}

/// Convenience: log agent state persisted to disk.
pub fn log_state_saved(audit: &mut AuditLog, path: &str) -> Result<()> {
    audit.log("state_saved", serde_json::json!({ "path": path }))
}
