//! WebSocket transport helpers
//!
//! One place for the TLS settings of every outbound market data socket.

use std::time::Duration;

use tokio_tungstenite::{
    connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};

use crate::adapters::errors::{ExchangeError, ExchangeResult};

/// WebSocket stream over plain TCP or TLS
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket to `url` (TLSv1.2 minimum for `wss://`).
///
/// `ws://` URLs connect over plain TCP; the connector is only used for TLS.
/// Fails with [`ExchangeError::NetworkTimeout`] if the handshake does not
/// complete within `timeout`.
pub async fn connect_ws(url: &str, timeout: Duration) -> ExchangeResult<WsStream> {
    let tls = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ExchangeError::ConnectionFailed(format!("TLS error: {}", e)))?;

    let handshake = connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(tls)));

    let (ws_stream, _response) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ExchangeError::NetworkTimeout(timeout.as_millis() as u64))?
        .map_err(|e| ExchangeError::WebSocket(Box::new(e)))?;

    Ok(ws_stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_error() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = connect_ws(&format!("ws://{}", addr), Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ExchangeError::WebSocket(_))));
    }

    #[tokio::test]
    async fn test_connect_handshake_timeout() {
        // Accepts TCP but never answers the upgrade request
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = connect_ws(&format!("ws://{}", addr), Duration::from_millis(100)).await;
        assert!(matches!(result, Err(ExchangeError::NetworkTimeout(100))));
    }
}
