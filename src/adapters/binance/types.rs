//! Binance WebSocket message types
//!
//! Inbound frames are one of: a stream event tagged by `e`, an error reply
//! to a request, or a plain request acknowledgement.

use serde::{Deserialize, Serialize};

use crate::adapters::symbols::SymbolRegistry;
use crate::adapters::types::{CanonicalTick, Exchange, MarketType};
use crate::core::types::MarketEvent;

// =============================================================================
// Outbound
// =============================================================================

/// `{"method":"SUBSCRIBE","params":[...],"id":N}`
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest<'a> {
    pub method: &'static str,
    pub params: &'a [String],
    pub id: u64,
}

impl<'a> SubscribeRequest<'a> {
    pub fn subscribe(params: &'a [String], id: u64) -> Self {
        Self {
            method: "SUBSCRIBE",
            params,
            id,
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinanceMessage {
    Event(BinanceEvent),
    Error(ErrorReply),
    Response(ResponseReply),
}

/// Stream payloads, discriminated by the `e` field
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "e")]
pub enum BinanceEvent {
    #[serde(rename = "aggTrade")]
    AggTrade(AggTrade),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggTrade {
    /// Native symbol (`BTCUSDT`)
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: String,
    /// Trade time (ms)
    #[serde(rename = "T")]
    pub trade_time: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReply {
    pub error: ErrorBody,
    pub id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub msg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseReply {
    pub result: Option<serde_json::Value>,
    pub id: u64,
}

/// Decode one inbound frame into at most one event.
///
/// Trade symbols are mapped back through `symbols`. Unknown events,
/// acknowledgements, unparseable frames and non-positive prices yield `None`.
pub fn decode_message(
    text: &str,
    market_type: MarketType,
    symbols: &SymbolRegistry,
) -> Option<MarketEvent> {
    let message: BinanceMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::trace!(exchange = "Binance", error = %e, "Skipping unparseable frame");
            return None;
        }
    };

    match message {
        BinanceMessage::Event(BinanceEvent::AggTrade(trade)) => {
            let price = trade.price.parse::<f64>().ok()?;
            if !price.is_finite() || price <= 0.0 {
                tracing::debug!(symbol = %trade.symbol, price = %trade.price, "Dropping non-positive price");
                return None;
            }
            Some(MarketEvent::MarketData(CanonicalTick::new(
                Exchange::Binance,
                symbols.resolve(&trade.symbol),
                market_type,
                price,
                trade.trade_time,
            )))
        }
        BinanceMessage::Event(BinanceEvent::Other) => None,
        BinanceMessage::Error(reply) => {
            tracing::warn!(
                market_type = %market_type,
                code = reply.error.code,
                id = ?reply.id,
                msg = %reply.error.msg,
                "Binance error reply"
            );
            Some(MarketEvent::Error {
                exchange: Exchange::Binance,
                message: format!("{} ({}): {}", market_type, reply.error.code, reply.error.msg),
            })
        }
        BinanceMessage::Response(reply) => {
            tracing::debug!(market_type = %market_type, id = reply.id, result = ?reply.result, "Binance request acknowledged");
            None
        }
    }
}
