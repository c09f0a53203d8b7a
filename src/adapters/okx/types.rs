//! OKX WebSocket message types
//!
//! Data pushes carry `arg` + `data`; control replies carry an `event` tag.
//! The heartbeat reply is the bare text `pong`.

use serde::{Deserialize, Serialize};

use crate::adapters::symbols::{canonical_symbol, native_market_type};
use crate::adapters::types::{CanonicalTick, Exchange};
use crate::core::types::MarketEvent;

/// Channel carrying last-trade prices
pub const TICKERS_CHANNEL: &str = "tickers";

// =============================================================================
// Outbound
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelArg {
    pub channel: String,
    #[serde(rename = "instId", skip_serializing_if = "Option::is_none", default)]
    pub inst_id: Option<String>,
}

impl ChannelArg {
    pub fn tickers(inst_id: impl Into<String>) -> Self {
        Self {
            channel: TICKERS_CHANNEL.to_string(),
            inst_id: Some(inst_id.into()),
        }
    }
}

/// `{"op":"subscribe","args":[...]}`
#[derive(Debug, Clone, Serialize)]
pub struct OpRequest<'a> {
    pub op: &'static str,
    pub args: &'a [ChannelArg],
}

impl<'a> OpRequest<'a> {
    pub fn subscribe(args: &'a [ChannelArg]) -> Self {
        Self {
            op: "subscribe",
            args,
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OkxMessage {
    Push(Push),
    Event(OkxEvent),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Push {
    pub arg: ChannelArg,
    pub data: Vec<Ticker>,
}

/// Entry of the `tickers` channel (all numbers are strings)
#[derive(Debug, Clone, Deserialize)]
pub struct Ticker {
    #[serde(rename = "instId")]
    pub inst_id: String,
    pub last: String,
    pub ts: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OkxEvent {
    Subscribe {
        arg: Option<ChannelArg>,
    },
    Unsubscribe {
        arg: Option<ChannelArg>,
    },
    Error {
        #[serde(default)]
        code: String,
        #[serde(default)]
        msg: String,
    },
    #[serde(other)]
    Other,
}

/// Decode one inbound frame into at most one event.
///
/// Only the first entry of a push is used.
pub fn decode_message(text: &str) -> Option<MarketEvent> {
    if text == "pong" {
        return None;
    }

    let message: OkxMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::trace!(exchange = "OKX", error = %e, "Skipping unparseable frame");
            return None;
        }
    };

    match message {
        OkxMessage::Push(push) => {
            if push.arg.channel != TICKERS_CHANNEL {
                return None;
            }
            let ticker = push.data.first()?;
            let price = ticker.last.parse::<f64>().ok()?;
            if !price.is_finite() || price <= 0.0 {
                tracing::debug!(inst_id = %ticker.inst_id, last = %ticker.last, "Dropping non-positive price");
                return None;
            }
            let event_time_ms = ticker.ts.parse::<i64>().ok()?;
            Some(MarketEvent::MarketData(CanonicalTick::new(
                Exchange::Okx,
                canonical_symbol(&ticker.inst_id),
                native_market_type(&ticker.inst_id),
                price,
                event_time_ms,
            )))
        }
        OkxMessage::Event(OkxEvent::Subscribe { arg }) => {
            tracing::debug!(arg = ?arg, "OKX subscription confirmed");
            None
        }
        OkxMessage::Event(OkxEvent::Error { code, msg }) => {
            tracing::warn!(code = %code, msg = %msg, "OKX error event");
            Some(MarketEvent::Error {
                exchange: Exchange::Okx,
                message: format!("{}: {}", code, msg),
            })
        }
        OkxMessage::Event(OkxEvent::Unsubscribe { .. } | OkxEvent::Other) => None,
    }
}
