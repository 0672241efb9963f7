use thiserror::Error;

use crate::model::Notification;

/// Failures of user-initiated actions. Each maps onto one notification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Invalid market")]
    InvalidMarket,

    #[error("Invalid size")]
    InvalidSize,

    #[error("Conversion already in progress")]
    InProgress,

    #[error("Error loading market: {0}")]
    LoadMarket(String),

    #[error("Error fetching orderbook: {0}")]
    FetchOrderbook(String),

    #[error("Invalid orderbook data")]
    InvalidOrderbookData,

    #[error("No best price found")]
    NoBestPrice,

    #[error("Error placing order: {0}")]
    PlaceOrder(String),

    #[error("Error cancelling order: {0}")]
    CancelOrder(String),
}

impl ConvertError {
    pub fn load_market(err: &anyhow::Error) -> Self {
        Self::LoadMarket(format!("{:#}", err))
    }

    pub fn fetch_orderbook(err: &anyhow::Error) -> Self {
        Self::FetchOrderbook(format!("{:#}", err))
    }

    pub fn place_order(err: &anyhow::Error) -> Self {
        Self::PlaceOrder(format!("{:#}", err))
    }

    pub fn cancel_order(err: &anyhow::Error) -> Self {
        Self::CancelOrder(format!("{:#}", err))
    }

    /// Fixed headline shown to the user.
    pub fn message(&self) -> &'static str {
        match self {
            ConvertError::InvalidMarket => "Invalid market",
            ConvertError::InvalidSize => "Invalid size",
            ConvertError::InProgress => "Conversion already in progress",
            ConvertError::LoadMarket(_) => "Error loading market",
            ConvertError::FetchOrderbook(_) => "Error fetching orderbook",
            ConvertError::InvalidOrderbookData => "Invalid orderbook data",
            ConvertError::NoBestPrice => "No best price found",
            ConvertError::PlaceOrder(_) => "Error placing order",
            ConvertError::CancelOrder(_) => "Error cancelling order",
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ConvertError::LoadMarket(d)
            | ConvertError::FetchOrderbook(d)
            | ConvertError::PlaceOrder(d)
            | ConvertError::CancelOrder(d) => Some(d.as_str()),
            _ => None,
        }
    }

    pub fn notification(&self) -> Notification {
        Notification::error(self.message(), self.description().map(str::to_string))
    }
}
