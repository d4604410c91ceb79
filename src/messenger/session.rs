use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::common::{ChatCommand, Conversation, InboundEvent, Message, MessageId};
use crate::network::{ApiError, ConnectionState, MessageApi, Socket};

use super::membership::Membership;
use super::reconciler::{self, Delivery};
use super::store::{HistoryState, MessageStore};
use super::view::{self, Notice, NoticeKind, ViewState};

const COMMAND_BUFFER: usize = 100;

enum Completion {
    History(u64, Result<Vec<Message>, ApiError>),
    /// History re-fetched after a reconnect, merged into what is shown.
    Resync(Result<Vec<Message>, ApiError>),
    Sent(Result<Option<Message>, ApiError>),
    Deleted(MessageId, Result<(), ApiError>),
}

/// What the UI keeps of a mounted chat view.
pub struct MessengerHandle {
    pub commands: mpsc::Sender<ChatCommand>,
    pub view: watch::Receiver<ViewState>,
}

/// One mounted chat view: owns its store and runs until the UI closes it.
///
/// Every mutation happens on the `run` loop, so the store needs no locking;
/// network calls run concurrently as futures polled by the same loop.
pub struct Messenger<A: MessageApi> {
    api: Arc<A>,
    socket: Socket,
    store: MessageStore,
    commands: mpsc::Receiver<ChatCommand>,
    view: watch::Sender<ViewState>,
    socket_error: Option<String>,
    notice: Option<Notice>,
    notice_ttl: Duration,
    sent_count: u64,
    history_generation: u64,
}

type Pending = FuturesUnordered<BoxFuture<'static, Completion>>;

impl<A: MessageApi> Messenger<A> {
    pub fn new(
        api: Arc<A>,
        socket: Socket,
        conversation: Conversation,
        notice_ttl: Duration,
    ) -> (Self, MessengerHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view_rx) = watch::channel(ViewState::new(conversation.local.clone()));
        let socket_error = connection_banner(socket.state()).map(str::to_string);

        let messenger = Self {
            api,
            socket,
            store: MessageStore::new(conversation),
            commands: command_rx,
            view: view_tx,
            socket_error,
            notice: None,
            notice_ttl,
            sent_count: 0,
            history_generation: 0,
        };
        let handle = MessengerHandle {
            commands: command_tx,
            view: view_rx,
        };
        (messenger, handle)
    }

    pub async fn run(mut self) {
        let conversation = self.store.conversation().clone();
        let (event_tx, mut events) = mpsc::unbounded_channel();
        let _membership = Membership::join(&self.socket, conversation.local.clone(), event_tx);
        let mut connection = self.socket.watch_state();

        let mut pending = Pending::new();
        pending.push(self.fetch_history());
        self.publish();

        loop {
            let notice_deadline = self.notice.as_ref().map(|notice| notice.expires_at);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(ChatCommand::Close) | None => break,
                    Some(command) => self.handle_command(command, &mut pending),
                },
                Some(event) = events.recv() => self.handle_inbound(event, &mut pending),
                Some(done) = pending.next(), if !pending.is_empty() => self.handle_completion(done),
                Ok(()) = connection.changed() => {
                    let state = *connection.borrow_and_update();
                    if let Some(banner) = connection_banner(state) {
                        self.socket_error = Some(banner.to_string());
                    }
                }
                _ = expire(notice_deadline) => self.notice = None,
            }

            self.publish();
        }

        log::info!(
            "Chat view {} <-> {} closed with {} requests in flight",
            conversation.local,
            conversation.remote,
            pending.len()
        );
    }

    fn fetch_history(&mut self) -> BoxFuture<'static, Completion> {
        self.history_generation += 1;
        let generation = self.history_generation;
        let api = Arc::clone(&self.api);
        let conversation = self.store.conversation().clone();
        Box::pin(async move {
            Completion::History(generation, api.fetch_history(&conversation).await)
        })
    }

    fn handle_command(&mut self, command: ChatCommand, pending: &mut Pending) {
        match command {
            ChatCommand::Send(content) => {
                if content.trim().is_empty() {
                    log::debug!("Ignoring blank message");
                    return;
                }
                self.store.begin_send();
                let request = self.store.conversation().outgoing(content);
                let api = Arc::clone(&self.api);
                pending.push(Box::pin(async move {
                    Completion::Sent(api.send_message(&request).await)
                }));
            }
            ChatCommand::Delete(id) => {
                if !self.store.contains(&id) {
                    log::debug!("Ignoring delete for unknown message {id}");
                    return;
                }
                if !self.store.begin_delete(&id) {
                    log::debug!("Delete for {id} already in flight");
                    return;
                }
                let api = Arc::clone(&self.api);
                pending.push(Box::pin(async move {
                    let result = api.delete_message(&id).await;
                    Completion::Deleted(id, result)
                }));
            }
            ChatCommand::Reload => {
                log::info!("Reloading history with {}", self.store.conversation().remote);
                self.store.reset_history();
                pending.push(self.fetch_history());
            }
            ChatCommand::Close => {}
        }
    }

    fn handle_inbound(&mut self, event: InboundEvent, pending: &mut Pending) {
        match event {
            InboundEvent::NewMessage(message) => {
                let id = message.id.clone();
                match reconciler::reconcile(&mut self.store, message) {
                    Delivery::Accepted(applied) => log::debug!("Message {id}: {applied:?}"),
                    Delivery::Dropped => {}
                }
            }
            InboundEvent::Connected => {
                if self.socket_error.take().is_some() {
                    log::info!("Messaging connection restored");
                    self.resync(pending);
                }
            }
            InboundEvent::ConnectError(reason) => {
                log::warn!("Messaging connection error: {reason}");
                let banner = connection_banner(self.socket.state()).unwrap_or(view::SOCKET_FAILED);
                self.socket_error = Some(banner.to_string());
            }
        }
    }

    /// Catches up on messages sent while the link was down. The shown
    /// history stays in place; only missed messages are added.
    fn resync(&mut self, pending: &mut Pending) {
        if self.store.history() != &HistoryState::Ready {
            return;
        }
        let api = Arc::clone(&self.api);
        let conversation = self.store.conversation().clone();
        pending.push(Box::pin(async move {
            Completion::Resync(api.fetch_history(&conversation).await)
        }));
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::History(generation, _) if generation != self.history_generation => {
                log::debug!("Discarding stale history response #{generation}");
            }
            Completion::History(_, Ok(history)) => {
                self.store.replace_history(history);
                if self.store.is_empty() {
                    log::info!("No messages yet with {}", self.store.conversation().remote);
                } else {
                    log::info!(
                        "Loaded {} messages with {}",
                        self.store.len(),
                        self.store.conversation().remote
                    );
                }
            }
            Completion::History(_, Err(err)) => {
                log::error!("Failed to load message history: {err}");
                self.store.fail_history();
            }
            Completion::Resync(Ok(history)) => {
                let added = self.store.merge_history(history);
                if added > 0 {
                    log::info!("Recovered {added} messages missed while offline");
                }
            }
            Completion::Resync(Err(err)) => {
                log::warn!("Failed to refresh history after reconnect: {err}");
            }
            Completion::Sent(result) => {
                self.store.finish_send();
                match result {
                    Ok(echoed) => {
                        self.sent_count += 1;
                        if let Some(message) = echoed {
                            log::debug!("Server accepted message {}", message.id);
                        }
                        self.notify(NoticeKind::Success, view::SENT);
                    }
                    Err(err) => {
                        log::warn!("Failed to send message: {err}");
                        self.notify(NoticeKind::Error, view::SEND_FAILED);
                    }
                }
            }
            Completion::Deleted(id, result) => {
                self.store.finish_delete(&id);
                match result {
                    Ok(()) => {
                        self.store.remove(&id);
                        self.notify(NoticeKind::Success, view::DELETED);
                    }
                    Err(err) => {
                        log::warn!("Failed to delete message {id}: {err}");
                        self.notify(NoticeKind::Error, view::DELETE_FAILED);
                    }
                }
            }
        }
    }

    fn notify(&mut self, kind: NoticeKind, text: &str) {
        self.notice = Some(Notice {
            kind,
            text: text.to_string(),
            expires_at: Instant::now() + self.notice_ttl,
        });
    }

    fn snapshot(&self) -> ViewState {
        let fetch_error = match self.store.history() {
            HistoryState::Failed => Some(view::HISTORY_FAILED.to_string()),
            _ => None,
        };
        ViewState {
            local: self.store.conversation().local.clone(),
            messages: self.store.messages().to_vec(),
            is_loading: self.store.is_loading(),
            is_sending: self.store.is_sending(),
            deleting: self.store.deleting().clone(),
            fetch_error,
            socket_error: self.socket_error.clone(),
            notice: self.notice.clone(),
            sent_count: self.sent_count,
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Banner for a connection state, if that state warrants one.
fn connection_banner(state: ConnectionState) -> Option<&'static str> {
    match state {
        ConnectionState::Degraded => Some(view::SOCKET_FAILED),
        ConnectionState::Failed => Some(view::SOCKET_GAVE_UP),
        ConnectionState::Connecting | ConnectionState::Open | ConnectionState::Closed => None,
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::{Value, json};
    use tokio::sync::Semaphore;
    use tokio::task::JoinHandle;

    use crate::common::events::names;
    use crate::common::{OutgoingMessage, ParticipantId};
    use crate::config::ReconnectConfig;
    use crate::messenger::store::tests::msg;
    use crate::messenger::view::ViewError;
    use crate::network::SocketConfig;
    use crate::network::frame::Frame;

    const WAIT: Duration = Duration::from_secs(5);

    struct FakeApi {
        history: Mutex<VecDeque<Result<Vec<Message>, u16>>>,
        history_gate: Semaphore,
        delete_failure: Mutex<Option<u16>>,
        send_failure: Mutex<Option<u16>>,
        delete_gate: Semaphore,
        deletes: AtomicUsize,
        sent: Mutex<Vec<OutgoingMessage>>,
    }

    impl FakeApi {
        fn with_history(history: Vec<Message>) -> Self {
            Self {
                history: Mutex::new(VecDeque::from([Ok(history)])),
                history_gate: Semaphore::new(Semaphore::MAX_PERMITS),
                delete_failure: Mutex::new(None),
                send_failure: Mutex::new(None),
                delete_gate: Semaphore::new(Semaphore::MAX_PERMITS),
                deletes: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn deletes(&self) -> usize {
            self.deletes.load(Ordering::SeqCst)
        }
    }

    impl MessageApi for FakeApi {
        async fn fetch_history(&self, _: &Conversation) -> Result<Vec<Message>, ApiError> {
            let _permit = self.history_gate.acquire().await.unwrap();
            let next = {
                let mut queue = self.history.lock().unwrap();
                queue.pop_front().unwrap_or(Ok(Vec::new()))
            };
            next.map_err(|status| ApiError::Status { status })
        }

        async fn send_message(&self, message: &OutgoingMessage) -> Result<Option<Message>, ApiError> {
            self.sent.lock().unwrap().push(message.clone());
            match *self.send_failure.lock().unwrap() {
                Some(status) => Err(ApiError::Status { status }),
                None => Ok(None),
            }
        }

        async fn delete_message(&self, _: &MessageId) -> Result<(), ApiError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            let _permit = self.delete_gate.acquire().await.unwrap();
            let failure = *self.delete_failure.lock().unwrap();
            match failure {
                Some(status) => Err(ApiError::Status { status }),
                None => Ok(()),
            }
        }
    }

    struct Harness {
        socket: Socket,
        api: Arc<FakeApi>,
        commands: mpsc::Sender<ChatCommand>,
        view: watch::Receiver<ViewState>,
        outbound: mpsc::UnboundedReceiver<Frame>,
        task: JoinHandle<()>,
    }

    fn start(api: FakeApi) -> Harness {
        let socket = Socket::new(SocketConfig {
            url: "ws://127.0.0.1:9".into(),
            token: None,
            reconnect: ReconnectConfig::default(),
        });
        start_on(socket, api)
    }

    fn start_on(socket: Socket, api: FakeApi) -> Harness {
        let outbound = socket.detach_outbound();
        let api = Arc::new(api);
        let conversation = Conversation::new(ParticipantId::new("U1"), ParticipantId::new("T1"));
        let (messenger, handle) = Messenger::new(
            Arc::clone(&api),
            socket.clone(),
            conversation,
            Duration::from_secs(3),
        );
        let task = tokio::spawn(messenger.run());
        Harness {
            socket,
            api,
            commands: handle.commands,
            view: handle.view,
            outbound,
            task,
        }
    }

    impl Harness {
        async fn wait(&mut self, mut ready: impl FnMut(&ViewState) -> bool) -> ViewState {
            tokio::time::timeout(WAIT, self.view.wait_for(|state| ready(state)))
                .await
                .expect("view did not reach expected state")
                .expect("session ended")
                .clone()
        }

        async fn joined(&self) {
            tokio::time::timeout(WAIT, async {
                while self.socket.handler_count(names::NEW_MESSAGE) == 0 {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .expect("session never joined");
        }

        async fn command(&self, command: ChatCommand) {
            self.commands.send(command).await.unwrap();
        }

        fn live(&self, message: &Message) {
            self.socket
                .inject(names::NEW_MESSAGE, &serde_json::to_value(message).unwrap());
        }
    }

    fn ids(state: &ViewState) -> Vec<&str> {
        state.messages.iter().map(|m| m.id.as_str()).collect()
    }

    fn first() -> Message {
        msg("1", "U1", "T1", "hi", 0)
    }

    #[tokio::test]
    async fn history_populates_the_view() {
        let mut harness = start(FakeApi::with_history(vec![first()]));

        let state = harness.wait(|state| !state.is_loading).await;
        assert_eq!(state.messages, vec![first()]);
        assert_eq!(state.critical_error(), None);
    }

    #[tokio::test]
    async fn foreign_conversation_events_leave_the_view_unchanged() {
        let mut harness = start(FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        harness.live(&msg("x", "U2", "T2", "elsewhere", 5));
        harness.live(&msg("2", "T1", "U1", "marker", 6));

        let state = harness.wait(|state| state.messages.len() == 2).await;
        assert_eq!(ids(&state), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn sent_message_appears_only_through_the_live_echo() {
        let mut harness = start(FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Send("hello".into())).await;
        let state = harness.wait(|state| state.sent_count == 1).await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.notice.as_ref().map(|n| n.text.as_str()), Some(view::SENT));
        assert_eq!(
            *harness.api.sent.lock().unwrap(),
            vec![OutgoingMessage {
                sender_id: ParticipantId::new("U1"),
                receiver_id: ParticipantId::new("T1"),
                content: "hello".into(),
            }]
        );

        harness.live(&msg("2", "U1", "T1", "hello", 10));
        let state = harness.wait(|state| state.messages.len() == 2).await;
        assert_eq!(ids(&state), vec!["1", "2"]);
        assert!(state.messages[0].timestamp <= state.messages[1].timestamp);
    }

    #[tokio::test]
    async fn failed_send_keeps_the_view_and_reports_it() {
        let api = FakeApi::with_history(vec![first()]);
        *api.send_failure.lock().unwrap() = Some(500);
        let mut harness = start(api);
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Send("lost".into())).await;
        let state = harness.wait(|state| state.notice.is_some()).await;

        let notice = state.notice.clone().unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.text, view::SEND_FAILED);
        assert_eq!(state.sent_count, 0);
        assert_eq!(state.messages, vec![first()]);
        assert!(!state.is_sending);
        assert!(state.can_send("lost"));
        assert_eq!(harness.api.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_messages_are_not_sent() {
        let mut harness = start(FakeApi::with_history(Vec::new()));
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Send("   ".into())).await;
        harness.command(ChatCommand::Send("ok".into())).await;
        harness.wait(|state| state.sent_count == 1).await;

        let sent = harness.api.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "ok");
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_message_and_shows_a_notice() {
        let api = FakeApi::with_history(vec![first()]);
        *api.delete_failure.lock().unwrap() = Some(500);
        let mut harness = start(api);
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Delete(first().id)).await;
        let state = harness
            .wait(|state| state.notice.is_some() && state.deleting.is_empty())
            .await;

        assert_eq!(state.messages, vec![first()]);
        let notice = state.notice.unwrap();
        assert_eq!(notice.kind, NoticeKind::Error);
        assert_eq!(notice.text, view::DELETE_FAILED);
    }

    #[tokio::test]
    async fn successful_delete_removes_immediately() {
        let mut harness = start(FakeApi::with_history(vec![first(), msg("2", "T1", "U1", "b", 1)]));
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Delete(first().id)).await;
        let state = harness.wait(|state| state.messages.len() == 1).await;
        assert_eq!(ids(&state), vec!["2"]);
        assert_eq!(state.notice.map(|n| n.text), Some(view::DELETED.to_string()));
    }

    #[tokio::test]
    async fn concurrent_deletes_of_one_id_make_one_request() {
        let api = FakeApi::with_history(vec![first()]);
        api.delete_gate.forget_permits(Semaphore::MAX_PERMITS);
        let mut harness = start(api);
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Delete(first().id)).await;
        harness.command(ChatCommand::Delete(first().id)).await;
        harness.command(ChatCommand::Send("marker".into())).await;
        let state = harness.wait(|state| state.sent_count == 1).await;
        assert!(state.is_deleting(&first().id));
        assert_eq!(harness.api.deletes(), 1);

        harness.api.delete_gate.add_permits(1);
        let state = harness.wait(|state| state.messages.is_empty()).await;
        assert!(state.deleting.is_empty());
        assert_eq!(harness.api.deletes(), 1);
    }

    #[tokio::test]
    async fn live_events_before_history_are_kept() {
        let api = FakeApi::with_history(vec![first()]);
        api.history_gate.forget_permits(Semaphore::MAX_PERMITS);
        let mut harness = start(api);
        harness.joined().await;

        harness.live(&msg("2", "T1", "U1", "early", 3));
        harness.api.history_gate.add_permits(1);

        let state = harness.wait(|state| !state.is_loading).await;
        assert_eq!(ids(&state), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn history_failure_blocks_the_view_until_reload() {
        let api = FakeApi::with_history(Vec::new());
        *api.history.lock().unwrap() = VecDeque::from([Err(503), Ok(vec![first()])]);
        let mut harness = start(api);

        let state = harness.wait(|state| !state.is_loading).await;
        assert_eq!(
            state.critical_error(),
            Some(ViewError::Fatal(view::HISTORY_FAILED.into()))
        );
        assert!(state.messages.is_empty());

        harness.command(ChatCommand::Reload).await;
        let state = harness
            .wait(|state| !state.is_loading && state.fetch_error.is_none())
            .await;
        assert_eq!(state.messages, vec![first()]);
    }

    #[tokio::test]
    async fn socket_errors_are_transient() {
        let mut harness = start(FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        harness
            .socket
            .inject(names::CONNECT_ERROR, &json!("xhr poll error"));
        let state = harness.wait(|state| state.socket_error.is_some()).await;
        assert_eq!(
            state.critical_error(),
            Some(ViewError::Transient(view::SOCKET_FAILED.into()))
        );
        assert_eq!(state.messages, vec![first()]);

        harness.socket.inject(names::CONNECT, &Value::Null);
        let state = harness.wait(|state| state.socket_error.is_none()).await;
        assert_eq!(state.critical_error(), None);
    }

    #[tokio::test]
    async fn reconnect_recovers_messages_sent_while_offline() {
        let api = FakeApi::with_history(Vec::new());
        *api.history.lock().unwrap() = VecDeque::from([
            Ok(vec![first()]),
            Ok(vec![first(), msg("2", "T1", "U1", "sent during outage", 5)]),
        ]);
        let mut harness = start(api);
        harness.wait(|state| !state.is_loading).await;

        harness.socket.inject(names::CONNECT_ERROR, &json!("transport close"));
        harness.wait(|state| state.socket_error.is_some()).await;
        harness.socket.inject(names::CONNECT, &Value::Null);

        let state = harness.wait(|state| state.messages.len() == 2).await;
        assert_eq!(ids(&state), vec!["1", "2"]);
        assert_eq!(state.socket_error, None);
        assert!(!state.is_loading);
    }

    #[tokio::test]
    async fn reconnect_without_prior_error_does_not_refetch() {
        let api = FakeApi::with_history(Vec::new());
        *api.history.lock().unwrap() = VecDeque::from([
            Ok(vec![first()]),
            Ok(vec![first(), msg("2", "T1", "U1", "unexpected", 5)]),
        ]);
        let mut harness = start(api);
        harness.wait(|state| !state.is_loading).await;

        harness.socket.inject(names::CONNECT, &Value::Null);
        harness.live(&msg("3", "T1", "U1", "marker", 6));
        let state = harness.wait(|state| state.messages.len() == 2).await;
        assert_eq!(ids(&state), vec!["1", "3"]);
        assert_eq!(harness.api.history.lock().unwrap().len(), 1);
    }

    fn unreachable_socket(max_attempts: Option<u32>) -> Socket {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);
        Socket::new(SocketConfig {
            url,
            token: None,
            reconnect: ReconnectConfig {
                initial_delay_ms: 60_000,
                max_delay_ms: 60_000,
                max_attempts,
            },
        })
    }

    async fn settle(socket: &Socket, target: ConnectionState) {
        let mut state = socket.watch_state();
        tokio::time::timeout(WAIT, state.wait_for(|state| *state == target))
            .await
            .expect("socket did not settle")
            .unwrap();
    }

    #[tokio::test]
    async fn view_mounted_on_a_degraded_socket_shows_the_banner() {
        let socket = unreachable_socket(None);
        socket.connect();
        settle(&socket, ConnectionState::Degraded).await;

        let mut harness = start_on(socket.clone(), FakeApi::with_history(vec![first()]));
        let state = harness.wait(|state| !state.is_loading).await;
        assert_eq!(
            state.critical_error(),
            Some(ViewError::Transient(view::SOCKET_FAILED.into()))
        );
        assert_eq!(state.messages, vec![first()]);

        socket.disconnect().await;
    }

    #[tokio::test]
    async fn exhausted_reconnects_show_a_distinct_banner() {
        let socket = unreachable_socket(Some(0));
        let mut harness = start_on(socket.clone(), FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        socket.connect();
        let state = harness
            .wait(|state| state.socket_error.as_deref() == Some(view::SOCKET_GAVE_UP))
            .await;
        assert_eq!(
            state.critical_error(),
            Some(ViewError::Transient(view::SOCKET_GAVE_UP.into()))
        );
        assert_eq!(socket.state(), ConnectionState::Failed);

        let mut later = start_on(socket, FakeApi::with_history(Vec::new()));
        let state = later.wait(|state| !state.is_loading).await;
        assert_eq!(state.socket_error.as_deref(), Some(view::SOCKET_GAVE_UP));
    }

    #[tokio::test]
    async fn closing_releases_membership_and_handlers() {
        let mut harness = start(FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Close).await;
        (&mut harness.task).await.unwrap();

        harness.live(&msg("2", "U1", "T1", "after close", 9));
        assert_eq!(harness.socket.handler_count(names::NEW_MESSAGE), 0);
        assert_eq!(harness.socket.handler_count(names::CONNECT_ERROR), 0);
        assert_eq!(harness.socket.handler_count(names::CONNECT), 0);
        assert_eq!(harness.view.borrow().messages, vec![first()]);

        assert_eq!(harness.outbound.try_recv().unwrap(), Frame::new("join", json!("U1")));
        assert_eq!(harness.outbound.try_recv().unwrap(), Frame::new("leave", json!("U1")));
        assert!(harness.outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn aborted_session_still_leaves() {
        let mut harness = start(FakeApi::with_history(Vec::new()));
        harness.joined().await;

        harness.task.abort();
        assert!((&mut harness.task).await.unwrap_err().is_cancelled());

        assert_eq!(harness.socket.handler_count(names::NEW_MESSAGE), 0);
        assert_eq!(harness.outbound.try_recv().unwrap(), Frame::new("join", json!("U1")));
        assert_eq!(harness.outbound.try_recv().unwrap(), Frame::new("leave", json!("U1")));
    }

    #[tokio::test(start_paused = true)]
    async fn notices_expire() {
        let mut harness = start(FakeApi::with_history(vec![first()]));
        harness.wait(|state| !state.is_loading).await;

        harness.command(ChatCommand::Send("hi".into())).await;
        harness.wait(|state| state.notice.is_some()).await;
        let state = harness.wait(|state| state.notice.is_none()).await;
        assert_eq!(state.sent_count, 1);
    }
}
