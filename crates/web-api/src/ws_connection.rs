use std::ops::ControlFlow;

use application::Connection;
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ServerEvent, UserSummary};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::state::AppState;

/// WebSocket 连接
///
/// 握手阶段已经完成认证。这里负责：
/// - 把入站帧解析为客户端事件并交给生命周期控制器
/// - 把推送给该连接的服务端事件写回 socket
/// - 无论以何种方式结束都执行关闭流程
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user: UserSummary,
}

impl WebSocketConnection {
    pub fn new(socket: WebSocket, state: AppState, user: UserSummary) -> Self {
        Self {
            socket,
            state,
            user,
        }
    }

    /// 运行连接主循环，直到任一方向断开
    pub async fn run(self) {
        let Self {
            socket,
            state,
            user,
        } = self;
        let user_id = user.id;
        let (mut sender, mut incoming) = socket.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();
        let mut connection = state.controller.activate(user, outbound_tx).await;
        let connection_id = connection.handle().id;
        tracing::info!(%user_id, %connection_id, "WebSocket 连接已建立");

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let frame = match cmd {
                            WsCommand::SendText(text) => WsMessage::Text(text.into()),
                            WsCommand::SendPong(data) => WsMessage::Pong(data),
                        };
                        if sender.send(frame).await.is_err() {
                            tracing::warn!("Failed to send websocket frame");
                            break;
                        }
                    }
                    Some(event) = outbound_rx.recv() => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(
                                    error = %err,
                                    event = event.name(),
                                    "failed to serialize websocket payload"
                                );
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::warn!("Failed to send event frame");
                            break;
                        }
                    }
                    else => break,
                }
            }
            tracing::debug!("WebSocket发送任务结束");
        });

        // 接收循环：按到达顺序逐个处理客户端事件
        loop {
            tokio::select! {
                _ = &mut send_task => {
                    tracing::debug!(%connection_id, "发送任务先行结束");
                    break;
                }
                frame = incoming.next() => {
                    let message = match frame {
                        Some(Ok(message)) => message,
                        Some(Err(err)) => {
                            tracing::debug!(%connection_id, error = %err, "WebSocket 读取失败");
                            break;
                        }
                        None => break,
                    };
                    if Self::handle_incoming(&state, &connection, message, &cmd_tx)
                        .await
                        .is_break()
                    {
                        break;
                    }
                }
            }
        }

        state.controller.close(&mut connection).await;
        send_task.abort();
        tracing::info!(%user_id, %connection_id, "WebSocket连接已断开");
    }

    async fn handle_incoming(
        state: &AppState,
        connection: &Connection,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> ControlFlow<()> {
        match message {
            WsMessage::Close(_) => {
                tracing::debug!("WebSocket收到关闭消息");
                return ControlFlow::Break(());
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                    tracing::warn!("Failed to send pong command");
                    return ControlFlow::Break(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => state.controller.handle_event(connection, event).await,
                Err(err) => {
                    tracing::debug!(error = %err, "无法解析的客户端事件");
                    return Self::reply_error(cmd_tx, "Invalid event payload").await;
                }
            },
            WsMessage::Binary(_) => {
                return Self::reply_error(cmd_tx, "Binary frames are not supported").await;
            }
        }
        ControlFlow::Continue(())
    }

    /// 帧级错误直接回写，不经过控制器
    async fn reply_error(cmd_tx: &mpsc::Sender<WsCommand>, message: &str) -> ControlFlow<()> {
        let payload = match serde_json::to_string(&ServerEvent::error(message)) {
            Ok(json) => json,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize error event");
                return ControlFlow::Continue(());
            }
        };
        if cmd_tx.send(WsCommand::SendText(payload)).await.is_err() {
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendText(String),
    SendPong(Bytes),
}
