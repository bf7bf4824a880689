//! 客户端传输
//!
//! 控制器只依赖 [`Transport`]：每次 `open` 产生一条独立的链路，入站接收端结束即视为链路断开。

use async_trait::async_trait;
use domain::{ClientEvent, ServerEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};

use crate::TransportError;

/// 一条已建立的链路
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self) -> Result<TransportLink, TransportError>;
}

/// 基于 tokio-tungstenite 的 WebSocket 传输，凭证通过 `?token=` 传递
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
    token: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}?token={}", self.url, self.token)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self) -> Result<TransportLink, TransportError> {
        let (stream, _response) = connect_async(self.endpoint())
            .await
            .map_err(|err| match err {
                WsError::Http(response) => TransportError::Rejected {
                    status: response.status().as_u16(),
                },
                other => TransportError::Connect(other.to_string()),
            })?;
        tracing::info!(url = %self.url, "websocket connected");

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientEvent>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

        // 写任务：出站发送端全部释放后发送关闭帧
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let payload = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize client event");
                        continue;
                    }
                };
                if let Err(err) = write.send(Message::Text(payload.into())).await {
                    tracing::warn!(error = %err, "websocket write failed");
                    return;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // 读任务：结束时释放入站发送端，控制器据此发现断线
        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<ServerEvent>(text.as_str()) {
                            Ok(event) => {
                                if inbound_tx.send(event).is_err() {
                                    break;
                                }
                            }
                            Err(err) => tracing::debug!(error = %err, "unrecognized server event"),
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "websocket read error");
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
