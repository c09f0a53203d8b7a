//! OKX Adapter Implementation
//!
//! A single public connection carries the `tickers` channel for both the spot
//! instrument (`BTC-USDT`) and the perpetual swap (`BTC-USDT-SWAP`). OKX
//! closes idle sockets, so the connection runs a text `ping`/`pong`
//! heartbeat.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::{ConnectionConfig, EventSink, ResilientConnection};
use crate::adapters::symbols::{okx_inst_id, requested_symbol};
use crate::adapters::traits::ExchangeAdapter;
use crate::adapters::types::{Exchange, StreamKind, SubscriptionSet, Symbols};
use crate::core::types::MarketEvent;

use super::config::{OkxConfig, MAX_ARGS_PER_FRAME};
use super::types::{decode_message, ChannelArg, OpRequest};

// =============================================================================
// OkxAdapter
// =============================================================================

/// OKX market data adapter implementing ExchangeAdapter
pub struct OkxAdapter {
    config: OkxConfig,
    connection: ResilientConnection,
    subscriptions: SubscriptionSet,
}

impl OkxAdapter {
    /// Create the adapter; no I/O happens until `connect()`
    pub fn new(config: OkxConfig, events: mpsc::Sender<MarketEvent>) -> Self {
        let sink = EventSink::new(Exchange::Okx, events);
        let handler = sink.connection_handler(None, decode_message);
        let connection = ResilientConnection::new(
            "okx-public",
            ConnectionConfig::new(config.ws_url.clone())
                .with_backoff(config.backoff.clone())
                .with_heartbeat(config.heartbeat.clone()),
            handler,
        );

        Self {
            config,
            connection,
            subscriptions: SubscriptionSet::new(),
        }
    }

    pub fn config(&self) -> &OkxConfig {
        &self.config
    }

    /// Ticker args for pairs not yet subscribed
    fn new_channel_args(&self, symbols: &Symbols) -> Vec<(String, StreamKind, ChannelArg)> {
        let mut seen: HashSet<(String, StreamKind)> = HashSet::new();
        let mut pending = Vec::new();

        for raw in symbols.iter() {
            let Some(symbol) = requested_symbol(raw) else {
                tracing::warn!(exchange = "OKX", symbol = %raw, "Skipping empty symbol");
                continue;
            };
            for market_type in &self.config.market_types {
                let stream = StreamKind::Tickers(*market_type);
                if self.subscriptions.contains(&symbol, stream)
                    || !seen.insert((symbol.clone(), stream))
                {
                    continue;
                }
                let arg = ChannelArg::tickers(okx_inst_id(&symbol, *market_type));
                pending.push((symbol.clone(), stream, arg));
            }
        }
        pending
    }
}

#[async_trait]
impl ExchangeAdapter for OkxAdapter {
    async fn connect(&mut self) -> ExchangeResult<()> {
        tracing::info!(exchange = "OKX", url = %self.connection.url(), "Connecting");
        self.connection.connect().await?;
        tracing::info!(exchange = "OKX", "Public stream connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> ExchangeResult<()> {
        self.connection.close().await;
        tracing::info!(exchange = "OKX", "Disconnected");
        Ok(())
    }

    async fn subscribe(&mut self, symbols: Symbols) -> ExchangeResult<usize> {
        let pending = self.new_channel_args(&symbols);
        if pending.is_empty() {
            tracing::debug!(exchange = "OKX", "Nothing new to subscribe");
            return Ok(0);
        }

        let args: Vec<ChannelArg> = pending.iter().map(|(_, _, arg)| arg.clone()).collect();
        for chunk in args.chunks(MAX_ARGS_PER_FRAME) {
            let failed = |e: &dyn std::fmt::Display| ExchangeError::SubscriptionFailed {
                symbol: chunk
                    .iter()
                    .filter_map(|a| a.inst_id.as_deref())
                    .collect::<Vec<_>>()
                    .join(","),
                reason: e.to_string(),
            };
            let frame = serde_json::to_string(&OpRequest::subscribe(chunk)).map_err(|e| failed(&e))?;
            self.connection.send_replayed(frame).map_err(|e| failed(&e))?;
        }

        for (symbol, stream, _) in &pending {
            self.subscriptions.insert(symbol, *stream);
        }
        let inst_ids: Vec<&str> = args.iter().filter_map(|a| a.inst_id.as_deref()).collect();
        tracing::info!(exchange = "OKX", inst_ids = ?inst_ids, "Subscribed");
        Ok(pending.len())
    }

    fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    fn is_connected(&self) -> bool {
        self.connection.is_open()
    }

    fn exchange(&self) -> Exchange {
        Exchange::Okx
    }
}
