//! 重连控制器
//!
//! 状态：`Disconnected → Connecting → Connected`，链路断开后 `Connected → Reconnecting`，
//! 再回到 `Connected` 或在重试耗尽后停在 `Disconnected`。每次手动 `connect`/`disconnect`
//! 都开启新的一代，取消上一代尚未触发的重试。

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use domain::{ClientEvent, RoomId, ServerEvent};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::{Backoff, ClientError, OutboundQueue, ReconnectConfig, Transport, TransportLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

type ResyncCallback = Arc<dyn Fn(Option<RoomId>) -> BoxFuture<'static, ()> + Send + Sync>;

struct Session {
    generation: u64,
    cancel: CancellationToken,
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    queue: OutboundQueue,
    active_room: Option<RoomId>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    config: ReconnectConfig,
    backoff: Backoff,
    state: watch::Sender<ConnectionState>,
    session: Mutex<Session>,
    resync: Mutex<Vec<ResyncCallback>>,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<ServerEvent>>>,
}

#[derive(Clone)]
pub struct ReconnectController {
    inner: Arc<Inner>,
}

impl ReconnectController {
    pub fn new(transport: Arc<dyn Transport>, config: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Session {
            generation: 0,
            cancel: CancellationToken::new(),
            outbound: None,
            queue: OutboundQueue::new(config.queue_capacity, config.max_queue_age()),
            active_room: None,
        };

        Self {
            inner: Arc::new(Inner {
                transport,
                backoff: Backoff::from_config(&config),
                config,
                state,
                session: Mutex::new(session),
                resync: Mutex::new(Vec::new()),
                events_tx,
                events_rx: Mutex::new(Some(events_rx)),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// 服务端事件流，跨越重连保持不变。只能取一次。
    pub fn events(&self) -> Option<mpsc::UnboundedReceiver<ServerEvent>> {
        lock(&self.inner.events_rx).take()
    }

    pub fn queued(&self) -> usize {
        self.inner.session().queue.len()
    }

    pub fn active_room(&self) -> Option<RoomId> {
        self.inner.session().active_room
    }

    /// 重连成功后重新加入的房间；`join_room` 事件也会更新它
    pub fn set_active_room(&self, room_id: Option<RoomId>) {
        self.inner.session().active_room = room_id;
    }

    /// 注册重新同步回调，参数为当前房间。回调应重新拉取权威状态。
    pub fn on_resync<F, Fut>(&self, callback: F)
    where
        F: Fn(Option<RoomId>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ResyncCallback = Arc::new(move |room_id| callback(room_id).boxed());
        lock(&self.inner.resync).push(callback);
    }

    /// 已连接时立即发送，否则进入出站队列
    pub fn emit(&self, event: ClientEvent) {
        let mut session = self.inner.session();
        match &event {
            ClientEvent::JoinRoom { room_id } => session.active_room = Some(*room_id),
            ClientEvent::LeaveRoom { room_id } if session.active_room == Some(*room_id) => {
                session.active_room = None
            }
            _ => {}
        }

        let pending = match &session.outbound {
            Some(outbound) => match outbound.send(event) {
                Ok(()) => None,
                Err(mpsc::error::SendError(event)) => Some(event),
            },
            None => Some(event),
        };
        if let Some(event) = pending {
            tracing::debug!(event = event.name(), "not connected, queueing event");
            session.outbound = None;
            session.queue.push(event);
        }
    }

    /// 手动连接。凭证被拒或连接失败时停在 `Disconnected`，不会自动重试。
    pub async fn connect(&self) -> Result<(), ClientError> {
        let (generation, cancel) = self.inner.restart();
        self.inner.set_state(ConnectionState::Connecting);

        let opened = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::Superseded),
            opened = self.inner.transport.open() => opened,
        };

        match opened {
            Ok(link) => {
                if self.inner.install(generation, &cancel, link, false).await {
                    Ok(())
                } else {
                    Err(ClientError::Superseded)
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "connect failed");
                if self.inner.is_current(generation) {
                    self.inner.set_state(ConnectionState::Disconnected);
                }
                Err(err.into())
            }
        }
    }

    /// 主动断开，取消等待中的重试。队列保留到下次连接。
    pub fn disconnect(&self) {
        self.inner.restart();
        self.inner.set_state(ConnectionState::Disconnected);
        tracing::info!("disconnected by client");
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        lock(&self.session)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session().generation == generation
    }

    /// 开启新的一代：取消旧的重试链并丢弃旧链路
    fn restart(&self) -> (u64, CancellationToken) {
        let mut session = self.session();
        session.cancel.cancel();
        session.generation += 1;
        session.cancel = CancellationToken::new();
        session.outbound = None;
        (session.generation, session.cancel.clone())
    }

    /// 启用新链路：重放队列，重新加入房间，重连时再触发重新同步回调
    async fn install(
        self: &Arc<Self>,
        generation: u64,
        cancel: &CancellationToken,
        link: TransportLink,
        reconnected: bool,
    ) -> bool {
        let TransportLink { outbound, inbound } = link;

        let active_room = {
            let mut session = self.session();
            if session.generation != generation {
                return false;
            }

            let mut replay = session.queue.drain_fresh().into_iter();
            let mut replayed = 0;
            while let Some(event) = replay.next() {
                if let Err(mpsc::error::SendError(event)) = outbound.send(event) {
                    session.queue.push(event);
                    for rest in replay.by_ref() {
                        session.queue.push(rest);
                    }
                    break;
                }
                replayed += 1;
            }
            if let Some(room_id) = session.active_room {
                let _ = outbound.send(ClientEvent::JoinRoom { room_id });
            }

            session.outbound = Some(outbound);
            self.set_state(ConnectionState::Connected);
            tracing::info!(replayed, reconnected, "connected");
            session.active_room
        };

        self.spawn_pump(generation, cancel.clone(), inbound);

        if reconnected {
            let callbacks: Vec<ResyncCallback> = lock(&self.resync).clone();
            for callback in callbacks {
                callback(active_room).await;
            }
        }
        true
    }

    fn spawn_pump(
        self: &Arc<Self>,
        generation: u64,
        cancel: CancellationToken,
        mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    event = inbound.recv() => match event {
                        Some(event) => {
                            let _ = inner.events_tx.send(event);
                        }
                        None => break,
                    },
                }
            }
            inner.link_lost(generation, cancel);
        });
    }

    fn link_lost(self: &Arc<Self>, generation: u64, cancel: CancellationToken) {
        {
            let mut session = self.session();
            if session.generation != generation || cancel.is_cancelled() {
                return;
            }
            session.outbound = None;
            self.set_state(ConnectionState::Reconnecting);
        }
        tracing::warn!("connection lost, reconnecting");
        self.spawn_reconnect(generation, cancel);
    }

    fn spawn_reconnect(self: &Arc<Self>, generation: u64, cancel: CancellationToken) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            for attempt in 0..inner.config.max_attempts {
                let delay = inner.backoff.delay(attempt);
                tracing::info!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                let opened = tokio::select! {
                    _ = cancel.cancelled() => return,
                    opened = inner.transport.open() => opened,
                };
                match opened {
                    Ok(link) => {
                        inner.install(generation, &cancel, link, true).await;
                        return;
                    }
                    Err(err) if err.is_rejected() => {
                        tracing::warn!(error = %err, "reconnect rejected, giving up");
                        break;
                    }
                    Err(err) => {
                        tracing::warn!(attempt = attempt + 1, error = %err, "reconnect failed")
                    }
                }
            }

            if !cancel.is_cancelled() && inner.is_current(generation) {
                tracing::error!(
                    max_attempts = inner.config.max_attempts,
                    "reconnect attempts exhausted"
                );
                inner.set_state(ConnectionState::Disconnected);
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
