//! Capital-flow snapshots: per-industry main-force flow and northbound
//! (Stock Connect) trading.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Today's main-force flow of one industry sector. Amounts are in yuan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorFlow {
    pub name: String,
    pub change_percent: f64,
    pub main_net_inflow: f64,
    pub main_net_inflow_percent: f64,
}

/// One trading day of northbound (Hong Kong → mainland) Stock Connect flow.
///
/// Amounts are in millions of yuan as published. Fields the exchanges no
/// longer disclose are reported as 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NorthFlow {
    pub date: NaiveDate,
    pub net_inflow: f64,
    pub buy_amount: f64,
    pub sell_amount: f64,
    pub accumulated: f64,
}
