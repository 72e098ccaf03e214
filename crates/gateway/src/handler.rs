//! Per-connection protocol state machine.
//!
//! A session starts `Unauthenticated`, becomes `Authenticated` after a
//! successful `auth` request and stays there until its inbound stream ends.
//! Everything the session sends goes through its [`SessionSink`]; fan-out to
//! other sessions goes through the shared [`BroadcastEngine`].
//!
//! [`BroadcastEngine`]: crate::broadcast::BroadcastEngine

use std::{pin::pin, sync::Arc};

use {
    futures::{Stream, StreamExt},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {
    parley_auth::AuthOutcome,
    parley_protocol::{
        AuthResponse, ChatMessage, ChatRequest, ChatResponse, Identity, SystemNotification,
        error_codes,
    },
};

use crate::{
    session::{SessionSink, SinkClosed},
    state::GatewayState,
};

/// Reply text when the identity backend cannot be reached.
pub const IDENTITY_UNAVAILABLE: &str = "identity service unavailable";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The inbound stream failed.
    #[error("transport error: {0}")]
    Transport(String),
    /// The session's own outbound channel is gone.
    #[error("session sink closed")]
    SinkClosed,
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl From<SinkClosed> for SessionError {
    fn from(_: SinkClosed) -> Self {
        Self::SinkClosed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Identity),
}

impl SessionState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated(identity) => Some(identity),
        }
    }
}

pub struct SessionHandler {
    gateway: Arc<GatewayState>,
    sink: SessionSink,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(gateway: Arc<GatewayState>, sink: SessionSink) -> Self {
        Self {
            gateway,
            sink,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drive the session until `inbound` ends, then clean up.
    ///
    /// End of stream is a clean close. A transport error or a failed reply
    /// ends the session with that error, after the same cleanup.
    pub async fn run<S>(mut self, inbound: S) -> Result<(), SessionError>
    where
        S: Stream<Item = Result<ChatRequest, SessionError>>,
    {
        let mut inbound = pin!(inbound);
        let result = loop {
            let request = match inbound.next().await {
                None => break Ok(()),
                Some(Err(e)) => break Err(e),
                Some(Ok(request)) => request,
            };
            if let Err(e) = self.handle(request).await {
                break Err(e);
            }
        };

        if let Err(e) = &result {
            warn!(conn_id = self.sink.conn_id(), error = %e, "session ended with error");
        }
        self.close().await;
        result
    }

    /// Apply one request to the current state.
    pub async fn handle(&mut self, request: ChatRequest) -> Result<(), SessionError> {
        debug!(conn_id = self.sink.conn_id(), kind = request.kind(), "request");
        match (self.state.clone(), request) {
            (SessionState::Unauthenticated, ChatRequest::Auth { login, password }) => {
                self.authenticate(&login, &password).await
            },
            (SessionState::Authenticated(_), ChatRequest::Auth { .. }) => self.reply(
                &ChatResponse::error(error_codes::ALREADY_AUTHENTICATED, "Already authenticated"),
            ),
            (SessionState::Unauthenticated, ChatRequest::Message { .. }) => self.reply(
                &ChatResponse::error(error_codes::NOT_AUTHENTICATED, "Please authenticate first"),
            ),
            (SessionState::Authenticated(identity), ChatRequest::Message { text }) => {
                self.post(&identity, text).await;
                Ok(())
            },
            (_, ChatRequest::Unknown) => self.reply(&ChatResponse::error(
                error_codes::UNKNOWN_REQUEST,
                "Unknown request type",
            )),
        }
    }

    /// Leave the chat if authenticated. Safe to call more than once.
    pub async fn close(&mut self) {
        let SessionState::Authenticated(identity) =
            std::mem::replace(&mut self.state, SessionState::Unauthenticated)
        else {
            debug!(conn_id = self.sink.conn_id(), "unauthenticated session closed");
            return;
        };

        self.gateway.registry.remove(&identity.id).await;
        self.gateway
            .broadcaster
            .broadcast(
                &ChatResponse::System(SystemNotification::left(&identity.display_name)),
                &identity.id,
            )
            .await;
        info!(
            conn_id = self.sink.conn_id(),
            user_id = %identity.id,
            username = %identity.display_name,
            "user disconnected"
        );
    }

    fn reply(&self, response: &ChatResponse) -> Result<(), SessionError> {
        self.sink.send(response)
    }

    async fn authenticate(&mut self, login: &str, password: &str) -> Result<(), SessionError> {
        let conn_id = self.sink.conn_id().to_string();
        let identity = match self.gateway.auth.login(login, password).await {
            Ok(AuthOutcome::Granted(identity)) => identity,
            Ok(AuthOutcome::Rejected(reason)) => {
                info!(%conn_id, login, %reason, "authentication rejected");
                return self.reply(&ChatResponse::Auth(AuthResponse::rejected(reason)));
            },
            Err(e) => {
                warn!(%conn_id, login, error = %e, "identity service call failed");
                return self.reply(&ChatResponse::Auth(AuthResponse::rejected(
                    IDENTITY_UNAVAILABLE,
                )));
            },
        };

        // The client sees its own success before any fan-out traffic.
        self.reply(&ChatResponse::Auth(AuthResponse::granted(identity.clone())))?;
        self.gateway
            .registry
            .add(identity.clone(), self.sink.clone())
            .await;
        self.gateway
            .broadcaster
            .broadcast(
                &ChatResponse::System(SystemNotification::joined(&identity.display_name)),
                &identity.id,
            )
            .await;
        info!(
            %conn_id,
            user_id = %identity.id,
            username = %identity.display_name,
            "user authenticated"
        );
        self.state = SessionState::Authenticated(identity);
        Ok(())
    }

    async fn post(&self, identity: &Identity, text: String) {
        if text.is_empty() {
            debug!(user_id = %identity.id, "ignoring empty message");
            return;
        }

        let message = ChatMessage {
            message_id: Uuid::new_v4().to_string(),
            sender_id: identity.id.clone(),
            sender_name: identity.display_name.clone(),
            text,
            timestamp: chrono::Utc::now().timestamp(),
        };
        info!(
            user_id = %identity.id,
            username = %identity.display_name,
            len = message.text.len(),
            "chat message"
        );
        self.gateway.history.append(message.clone());
        self.gateway
            .broadcaster
            .broadcast(&ChatResponse::Message(message), &identity.id)
            .await;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::{collections::HashMap, time::Duration};

    use {
        async_trait::async_trait,
        parley_auth::{AuthError, AuthGateway},
        parley_protocol::NotificationKind,
        tokio::sync::mpsc::UnboundedReceiver,
    };

    use super::*;

    /// Accepts `login == password` for a fixed set of logins.
    struct StaticAuth {
        users: HashMap<String, Identity>,
        down: bool,
    }

    impl StaticAuth {
        fn new(users: &[(&str, &str)]) -> Self {
            Self {
                users: users
                    .iter()
                    .map(|(id, name)| (name.to_string(), Identity::new(*id, *name)))
                    .collect(),
                down: false,
            }
        }
    }

    #[async_trait]
    impl AuthGateway for StaticAuth {
        async fn login(&self, login: &str, password: &str) -> Result<AuthOutcome, AuthError> {
            if self.down {
                return Err(AuthError::Unavailable("connection refused".into()));
            }
            Ok(match self.users.get(login) {
                Some(identity) if login == password => AuthOutcome::Granted(identity.clone()),
                _ => AuthOutcome::Rejected("Invalid credentials".into()),
            })
        }

        async fn create(&self, _: &str, _: &str) -> Result<AuthOutcome, AuthError> {
            Ok(AuthOutcome::Rejected("not supported".into()))
        }
    }

    fn gateway() -> Arc<GatewayState> {
        GatewayState::new(
            Arc::new(StaticAuth::new(&[("u1", "alice"), ("u2", "bob"), ("u3", "carol")])),
            100,
        )
    }

    fn connect(gateway: &Arc<GatewayState>) -> (SessionHandler, UnboundedReceiver<String>) {
        let (sink, rx) = SessionSink::channel(gateway.next_conn_id());
        (SessionHandler::new(Arc::clone(gateway), sink), rx)
    }

    fn recv(rx: &mut UnboundedReceiver<String>) -> ChatResponse {
        ChatResponse::from_frame(&rx.try_recv().unwrap()).unwrap()
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<ChatResponse> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(ChatResponse::from_frame(&frame).unwrap());
        }
        out
    }

    async fn login(handler: &mut SessionHandler, rx: &mut UnboundedReceiver<String>, name: &str) {
        handler.handle(ChatRequest::auth(name, name)).await.unwrap();
        let ChatResponse::Auth(reply) = recv(rx) else {
            panic!("expected auth reply");
        };
        assert!(reply.success);
    }

    fn error_code(response: ChatResponse) -> String {
        match response {
            ChatResponse::Error(e) => e.code,
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn messages_require_authentication() {
        let gateway = gateway();
        let (mut handler, mut rx) = connect(&gateway);

        handler.handle(ChatRequest::message("hi")).await.unwrap();
        assert_eq!(error_code(recv(&mut rx)), error_codes::NOT_AUTHENTICATED);
        assert_eq!(handler.state(), &SessionState::Unauthenticated);
        assert!(gateway.history.is_empty());
        assert!(gateway.registry.is_empty().await);
    }

    #[tokio::test]
    async fn rejected_auth_keeps_session_usable() {
        let gateway = gateway();
        let (mut handler, mut rx) = connect(&gateway);

        handler
            .handle(ChatRequest::auth("alice", "wrong"))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx),
            ChatResponse::Auth(AuthResponse::rejected("Invalid credentials"))
        );
        assert_eq!(handler.state(), &SessionState::Unauthenticated);

        login(&mut handler, &mut rx, "alice").await;
        assert_eq!(
            handler.state().identity(),
            Some(&Identity::new("u1", "alice"))
        );
    }

    #[tokio::test]
    async fn unavailable_backend_is_reported_distinctly() {
        let mut auth = StaticAuth::new(&[("u1", "alice")]);
        auth.down = true;
        let gateway = GatewayState::new(Arc::new(auth), 100);
        let (mut handler, mut rx) = connect(&gateway);

        handler
            .handle(ChatRequest::auth("alice", "alice"))
            .await
            .unwrap();
        assert_eq!(
            recv(&mut rx),
            ChatResponse::Auth(AuthResponse::rejected(IDENTITY_UNAVAILABLE))
        );
        assert_eq!(handler.state(), &SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn second_auth_is_refused() {
        let gateway = gateway();
        let (mut handler, mut rx) = connect(&gateway);
        login(&mut handler, &mut rx, "alice").await;

        handler
            .handle(ChatRequest::auth("bob", "bob"))
            .await
            .unwrap();
        assert_eq!(
            error_code(recv(&mut rx)),
            error_codes::ALREADY_AUTHENTICATED
        );
        assert_eq!(gateway.registry.ids().await, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_requests_do_not_change_state() {
        let gateway = gateway();
        let (mut handler, mut rx) = connect(&gateway);

        handler.handle(ChatRequest::Unknown).await.unwrap();
        assert_eq!(error_code(recv(&mut rx)), error_codes::UNKNOWN_REQUEST);
        assert_eq!(handler.state(), &SessionState::Unauthenticated);

        login(&mut handler, &mut rx, "alice").await;
        handler.handle(ChatRequest::Unknown).await.unwrap();
        assert_eq!(error_code(recv(&mut rx)), error_codes::UNKNOWN_REQUEST);
        assert!(handler.state().identity().is_some());
    }

    #[tokio::test]
    async fn empty_messages_are_ignored() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = connect(&gateway);
        let (mut bob, mut bob_rx) = connect(&gateway);
        login(&mut alice, &mut alice_rx, "alice").await;
        login(&mut bob, &mut bob_rx, "bob").await;
        drain(&mut alice_rx);

        bob.handle(ChatRequest::message("")).await.unwrap();
        assert!(drain(&mut alice_rx).is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert!(gateway.history.is_empty());
    }

    #[tokio::test]
    async fn alice_and_bob_scenario() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = connect(&gateway);
        let (mut bob, mut bob_rx) = connect(&gateway);

        login(&mut alice, &mut alice_rx, "alice").await;
        login(&mut bob, &mut bob_rx, "bob").await;

        // Alice hears bob join; bob hears nothing about himself.
        assert_eq!(
            drain(&mut alice_rx),
            vec![ChatResponse::System(SystemNotification::joined("bob"))]
        );
        assert!(drain(&mut bob_rx).is_empty());

        bob.handle(ChatRequest::message("hello")).await.unwrap();
        let ChatResponse::Message(msg) = recv(&mut alice_rx) else {
            panic!("expected chat message");
        };
        assert_eq!(msg.sender_id, "u2");
        assert_eq!(msg.sender_name, "bob");
        assert_eq!(msg.text, "hello");
        assert!(!msg.message_id.is_empty());
        assert!(drain(&mut bob_rx).is_empty());
        assert_eq!(gateway.history.snapshot(), vec![msg]);

        bob.close().await;
        let ChatResponse::System(left) = recv(&mut alice_rx) else {
            panic!("expected system notification");
        };
        assert_eq!(left.kind, NotificationKind::Left);
        assert_eq!(left.text, "bob has left the chat");
        assert_eq!(gateway.registry.ids().await, vec!["u1".to_string()]);

        // Closing again is a no-op.
        bob.close().await;
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn history_keeps_last_hundred() {
        let gateway = gateway();
        let (mut alice, mut rx) = connect(&gateway);
        login(&mut alice, &mut rx, "alice").await;

        for n in 0..120 {
            alice
                .handle(ChatRequest::message(format!("m{n}")))
                .await
                .unwrap();
        }
        let kept = gateway.history.snapshot();
        assert_eq!(kept.len(), 100);
        assert_eq!(kept[0].text, "m20");
        assert_eq!(kept[99].text, "m119");
    }

    #[tokio::test]
    async fn run_cleans_up_on_end_of_stream() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = connect(&gateway);
        login(&mut alice, &mut alice_rx, "alice").await;
        let (bob, mut bob_rx) = connect(&gateway);

        let inbound = futures::stream::iter(vec![
            Ok(ChatRequest::auth("bob", "bob")),
            Ok(ChatRequest::message("bye")),
        ]);
        bob.run(inbound).await.unwrap();

        assert!(matches!(recv(&mut bob_rx), ChatResponse::Auth(_)));
        let seen = drain(&mut alice_rx);
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[0],
            ChatResponse::System(SystemNotification::joined("bob"))
        );
        assert!(matches!(&seen[1], ChatResponse::Message(m) if m.text == "bye"));
        assert_eq!(
            seen[2],
            ChatResponse::System(SystemNotification::left("bob"))
        );
        assert!(!gateway.registry.contains("u2").await);
    }

    #[tokio::test]
    async fn run_propagates_transport_errors_after_cleanup() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = connect(&gateway);
        login(&mut alice, &mut alice_rx, "alice").await;
        let (bob, _bob_rx) = connect(&gateway);

        let inbound = futures::stream::iter(vec![
            Ok(ChatRequest::auth("bob", "bob")),
            Err(SessionError::Transport("reset by peer".into())),
            Ok(ChatRequest::message("never handled")),
        ]);
        let err = bob.run(inbound).await.unwrap_err();

        assert!(matches!(err, SessionError::Transport(_)));
        assert_eq!(drain(&mut alice_rx), vec![
            ChatResponse::System(SystemNotification::joined("bob")),
            ChatResponse::System(SystemNotification::left("bob")),
        ]);
        assert_eq!(gateway.registry.ids().await, vec!["u1".to_string()]);
        assert!(gateway.history.is_empty());
    }

    #[tokio::test]
    async fn stale_connection_close_removes_newer_session() {
        let gateway = gateway();
        let (mut bob, mut bob_rx) = connect(&gateway);
        login(&mut bob, &mut bob_rx, "bob").await;
        let (mut old, mut old_rx) = connect(&gateway);
        let (mut new, mut new_rx) = connect(&gateway);
        login(&mut old, &mut old_rx, "alice").await;
        login(&mut new, &mut new_rx, "alice").await;
        drain(&mut bob_rx);
        drain(&mut old_rx);

        // Removal is keyed by id, so the older connection closing takes the
        // newer registration with it.
        old.close().await;
        assert!(!gateway.registry.contains("u1").await);
        assert!(new.state().identity().is_some());
        assert_eq!(
            drain(&mut bob_rx),
            vec![ChatResponse::System(SystemNotification::left("alice"))]
        );
        assert!(drain(&mut new_rx).is_empty());

        // The newer connection no longer receives fan-out.
        bob.handle(ChatRequest::message("hi")).await.unwrap();
        assert!(drain(&mut new_rx).is_empty());
    }

    #[tokio::test]
    async fn closed_own_sink_ends_the_session() {
        let gateway = gateway();
        let (alice, alice_rx) = connect(&gateway);
        drop(alice_rx);

        let inbound = futures::stream::iter(vec![Ok(ChatRequest::message("hi"))]);
        assert!(matches!(
            alice.run(inbound).await,
            Err(SessionError::SinkClosed)
        ));
    }

    #[tokio::test]
    async fn dead_recipient_is_evicted_live_ones_still_receive() {
        let gateway = gateway();
        let (mut alice, mut alice_rx) = connect(&gateway);
        let (mut bob, bob_rx) = connect(&gateway);
        let (mut carol, mut carol_rx) = connect(&gateway);
        login(&mut alice, &mut alice_rx, "alice").await;
        // Bob's socket goes away right after his auth reply is queued.
        bob.handle(ChatRequest::auth("bob", "bob")).await.unwrap();
        drop(bob_rx);
        login(&mut carol, &mut carol_rx, "carol").await;
        drain(&mut alice_rx);

        carol.handle(ChatRequest::message("anyone?")).await.unwrap();
        assert!(matches!(recv(&mut alice_rx), ChatResponse::Message(_)));

        tokio::time::timeout(Duration::from_secs(2), async {
            while gateway.registry.contains("u2").await {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(gateway.registry.ids().await, vec![
            "u1".to_string(),
            "u3".to_string()
        ]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_senders_keep_their_own_order() {
        const PER_SENDER: usize = 50;
        let gateway = gateway();
        let (mut carol, mut carol_rx) = connect(&gateway);
        login(&mut carol, &mut carol_rx, "carol").await;

        let mut senders = Vec::new();
        for name in ["alice", "bob"] {
            let (mut handler, mut rx) = connect(&gateway);
            login(&mut handler, &mut rx, name).await;
            senders.push((handler, rx));
        }
        drain(&mut carol_rx);

        let tasks: Vec<_> = senders
            .into_iter()
            .map(|(mut handler, rx)| {
                tokio::spawn(async move {
                    for n in 0..PER_SENDER {
                        handler
                            .handle(ChatRequest::message(n.to_string()))
                            .await
                            .unwrap();
                    }
                    (handler, rx)
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let mut per_sender: HashMap<String, Vec<usize>> = HashMap::new();
        for response in drain(&mut carol_rx) {
            if let ChatResponse::Message(m) = response {
                per_sender
                    .entry(m.sender_name)
                    .or_default()
                    .push(m.text.parse().unwrap());
            }
        }
        let expected: Vec<usize> = (0..PER_SENDER).collect();
        assert_eq!(per_sender.len(), 2);
        assert_eq!(per_sender["alice"], expected);
        assert_eq!(per_sender["bob"], expected);
    }
}
