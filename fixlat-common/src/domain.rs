//! The Execution Report both endpoints exchange.

use fixlat_engine::fix42::{ExecTransType, ExecType, ExecutionReport, OrdStatus, Side};
use uuid::Uuid;

pub const SYMBOL: &str = "RANDOM";

/// A filled buy order with fresh order and execution ids.
pub fn fill_report() -> ExecutionReport {
    ExecutionReport {
        order_id: Uuid::new_v4().to_string(),
        exec_id: Uuid::new_v4().to_string(),
        exec_trans_type: ExecTransType::New,
        exec_type: ExecType::Fill,
        ord_status: OrdStatus::Filled,
        symbol: SYMBOL.to_string(),
        side: Side::Buy,
        leaves_qty: 0.0,
        cum_qty: 10.0,
        avg_px: 10.0,
    }
}
