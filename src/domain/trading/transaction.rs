use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trailing-stop order flavor. Limit orders refuse to fill beyond their
/// reference price and are cancelled when the market runs away from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    #[default]
    Market,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "limit"),
            OrderKind::Market => write!(f, "market"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Buy,
    Sell,
    RejectedBuy,
    RejectedSell,
    SyntheticLiquidation,
}

impl TransactionKind {
    /// True for rows that moved shares (rejections never do).
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            TransactionKind::Buy | TransactionKind::Sell | TransactionKind::SyntheticLiquidation
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Buy => write!(f, "BUY"),
            TransactionKind::Sell => write!(f, "SELL"),
            TransactionKind::RejectedBuy => write!(f, "REJECTED_BUY"),
            TransactionKind::RejectedSell => write!(f, "REJECTED_SELL"),
            TransactionKind::SyntheticLiquidation => write!(f, "SYNTHETIC_LIQUIDATION"),
        }
    }
}

/// Machine-readable reason for a rejected trade. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MaxLots,
    GridSpacing,
    MomentumPnlGate,
    DescendingEntry,
    InsufficientCash,
    NoEligibleLots,
    Unprofitable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::MaxLots => "max_lots",
            RejectReason::GridSpacing => "grid_spacing",
            RejectReason::MomentumPnlGate => "momentum_pnl_gate",
            RejectReason::DescendingEntry => "descending_entry",
            RejectReason::InsufficientCash => "insufficient_cash",
            RejectReason::NoEligibleLots => "no_eligible_lots",
            RejectReason::Unprofitable => "unprofitable",
        };
        write!(f, "{}", s)
    }
}

/// Context recorded with a `grid_spacing` rejection: the requirement that
/// failed and the lot that sat closest to the attempted entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridRejection {
    pub required_spacing: f64,
    pub closest_entry_price: f64,
    pub actual_spacing: f64,
}

/// One row of the enhanced transaction ledger (stable output contract).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub price: f64,
    pub shares: f64,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    pub lots_after_transaction: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridRejection>,
}

impl Transaction {
    pub fn execution(
        date: NaiveDate,
        kind: TransactionKind,
        price: f64,
        shares: f64,
        pnl: Option<f64>,
        lots_after: usize,
    ) -> Self {
        Self {
            date,
            kind,
            price,
            shares,
            value: price * shares,
            pnl,
            lots_after_transaction: lots_after,
            reason: None,
            grid: None,
        }
    }

    pub fn rejection(
        date: NaiveDate,
        kind: TransactionKind,
        price: f64,
        shares: f64,
        lots_after: usize,
        reason: RejectReason,
    ) -> Self {
        Self {
            date,
            kind,
            price,
            shares,
            value: price * shares,
            pnl: None,
            lots_after_transaction: lots_after,
            reason: Some(reason),
            grid: None,
        }
    }

    /// Short single-line form used in invariant-violation diagnostics.
    pub fn summary(&self) -> String {
        match self.reason {
            Some(reason) => format!("{} {} @ {:.4} ({})", self.kind, self.date, self.price, reason),
            None => format!("{} {} @ {:.4}", self.kind, self.date, self.price),
        }
    }
}
