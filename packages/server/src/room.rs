//! The room aggregate: canonical users, message log, and session registry.
//!
//! `Room` is the single mutation point of the whole server. It lives behind
//! one `tokio::sync::Mutex` in [`AppState`](crate::state::AppState), and
//! every operation mutates state, rebuilds the snapshot, and initiates the
//! broadcast under that one critical section. Sessions never touch the
//! collections directly; they submit decoded events through [`Room::apply`].
//!
//! Because one operation completes (including its broadcast initiation)
//! before the next begins, every session observes the user and message
//! history as a consistent prefix sequence. Fan-out itself is a set of
//! unbounded channel sends, so delivering to a slow session cannot block
//! delivery to the others; the actual socket writes run in each session's
//! own forwarding task.

use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use idobata_shared::{
    protocol::encode_snapshot,
    room::{RoomState, User},
};

/// Errors raised by room operations.
#[derive(Debug, Error)]
pub enum RoomError {
    /// Join was attempted with a name already present in the room
    #[error("name '{0}' is already taken")]
    DuplicateName(String),

    /// Typing event referenced a name with no matching user
    #[error("no user named '{0}' in the room")]
    UnknownUser(String),
}

/// Server-side room aggregate.
///
/// Holds the canonical mutable `users` and `messages` collections plus the
/// registry of live session channels.
pub struct Room {
    users: Vec<User>,
    messages: Vec<String>,
    sessions: HashMap<Uuid, mpsc::UnboundedSender<String>>,
}

impl Room {
    pub fn new() -> Self {
        Self {
            users: Vec::new(),
            messages: Vec::new(),
            sessions: HashMap::new(),
        }
    }

    /// Register a session's snapshot channel.
    ///
    /// Registration happens at connection time, before the name frame
    /// arrives, so a join broadcast reaches the joining session too.
    pub fn register(&mut self, session_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        self.sessions.insert(session_id, sender);
        tracing::debug!("Session {} registered", session_id);
    }

    /// Drop a session's snapshot channel.
    pub fn unregister(&mut self, session_id: Uuid) {
        self.sessions.remove(&session_id);
        tracing::debug!("Session {} unregistered", session_id);
    }

    /// Add a user to the room and announce the join.
    ///
    /// Rejects names already present among users; the caller closes the
    /// session without a leave notice since it never joined.
    pub fn join(&mut self, name: &str) -> Result<(), RoomError> {
        if self.users.iter().any(|u| u.name == name) {
            return Err(RoomError::DuplicateName(name.to_string()));
        }

        self.users.push(User::new(name));
        self.messages.push(format!("[SERVER] {name} joined the chat."));
        self.broadcast();
        Ok(())
    }

    /// Append a chat message to the log.
    ///
    /// The body is trimmed into its display form here. Emptiness is the
    /// event-emission side's contract; an empty body is not re-checked.
    pub fn apply_message(&mut self, name: &str, body: &str) {
        self.messages.push(format!("{name}: {}", body.trim()));
        self.broadcast();
    }

    /// Flip a user's typing flag. Idempotent per flag value.
    pub fn set_typing(&mut self, name: &str, typing: bool) -> Result<(), RoomError> {
        let user = self
            .users
            .iter_mut()
            .find(|u| u.name == name)
            .ok_or_else(|| RoomError::UnknownUser(name.to_string()))?;

        user.is_typing = typing;
        self.broadcast();
        Ok(())
    }

    /// Remove a user and announce the disconnect.
    ///
    /// A no-op for names that never joined (e.g. a rejected duplicate).
    pub fn leave(&mut self, name: &str) {
        let before = self.users.len();
        self.users.retain(|u| u.name != name);
        if self.users.len() == before {
            return;
        }

        self.messages.push(format!("[SERVER] {name} disconnected."));
        self.broadcast();
    }

    /// Dispatch a decoded client event to the matching operation.
    ///
    /// Errors are the caller's to log and drop; no broadcast happens for a
    /// rejected event, so the sending client gets no visible feedback.
    pub fn apply(&mut self, event: idobata_shared::protocol::ClientEvent) -> Result<(), RoomError> {
        use idobata_shared::protocol::ClientEvent;

        match event {
            ClientEvent::Message { name, body } => {
                self.apply_message(&name, &body);
                Ok(())
            }
            ClientEvent::StartedTyping { name } => self.set_typing(&name, true),
            ClientEvent::StoppedTyping { name } => self.set_typing(&name, false),
        }
    }

    /// Build the current snapshot value.
    pub fn snapshot(&self) -> RoomState {
        RoomState {
            users: self.users.clone(),
            messages: self.messages.clone(),
        }
    }

    /// Fan the current snapshot out to every registered session.
    ///
    /// A failed channel send is logged and skipped; deregistration happens
    /// through the session's own error path, not here.
    fn broadcast(&self) {
        let frame = match encode_snapshot(&self.snapshot()) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to encode snapshot, skipping broadcast: {}", e);
                return;
            }
        };

        for (session_id, sender) in &self.sessions {
            if sender.send(frame.clone()).is_err() {
                tracing::warn!("Failed to push snapshot to session {}", session_id);
            }
        }
    }
}

impl Default for Room {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use idobata_shared::protocol::ClientEvent;
    use tokio::sync::Mutex;

    fn register_test_session(room: &mut Room) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        room.register(Uuid::new_v4(), tx);
        rx
    }

    #[test]
    fn test_join_builds_expected_snapshot() {
        // テスト項目: 空のルームに参加すると参加者と参加通知がスナップショットに載る
        // given (前提条件):
        let mut room = Room::new();

        // when (操作):
        room.join("alice").unwrap();

        // then (期待する結果):
        let snapshot = room.snapshot();
        assert_eq!(snapshot.users, vec![User::new("alice")]);
        assert_eq!(
            snapshot.messages,
            vec!["[SERVER] alice joined the chat.".to_string()]
        );
    }

    #[test]
    fn test_join_rejects_duplicate_name() {
        // テスト項目: 既に存在する名前での参加が拒否される
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();

        // when (操作):
        let result = room.join("alice");

        // then (期待する結果):
        assert!(matches!(result, Err(RoomError::DuplicateName(name)) if name == "alice"));
        assert_eq!(room.snapshot().users.len(), 1);
    }

    #[test]
    fn test_messages_keep_append_order() {
        // テスト項目: メッセージ列が受理された操作の追記順と一致する
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();
        room.join("bob").unwrap();

        // when (操作):
        room.apply_message("alice", "first");
        room.apply_message("bob", "second");
        room.apply_message("alice", "third");

        // then (期待する結果):
        assert_eq!(
            room.snapshot().messages,
            vec![
                "[SERVER] alice joined the chat.".to_string(),
                "[SERVER] bob joined the chat.".to_string(),
                "alice: first".to_string(),
                "bob: second".to_string(),
                "alice: third".to_string(),
            ]
        );
    }

    #[test]
    fn test_apply_message_trims_body() {
        // テスト項目: メッセージ本文が表示形式へ整形される際にトリムされる
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();

        // when (操作):
        room.apply_message("alice", "  hi there  ");

        // then (期待する結果):
        assert_eq!(room.snapshot().messages[1], "alice: hi there");
    }

    #[test]
    fn test_set_typing_is_idempotent() {
        // テスト項目: startedTyping を二回適用しても一回と同じ状態になる
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();

        // when (操作):
        room.set_typing("alice", true).unwrap();
        let once = room.snapshot();
        room.set_typing("alice", true).unwrap();
        let twice = room.snapshot();

        // then (期待する結果):
        assert_eq!(once, twice);
        assert!(twice.users[0].is_typing);
    }

    #[test]
    fn test_set_typing_unknown_user_is_rejected() {
        // テスト項目: 未登録ユーザーのタイピングイベントがエラーになり状態が変わらない
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();
        let before = room.snapshot();

        // when (操作):
        let result = room.set_typing("ghost", true);

        // then (期待する結果):
        assert!(matches!(result, Err(RoomError::UnknownUser(name)) if name == "ghost"));
        assert_eq!(room.snapshot(), before);
    }

    #[test]
    fn test_message_does_not_clear_typing_flag() {
        // テスト項目: メッセージ送信自体はタイピングフラグを消さない
        // given (前提条件): クライアントは Enter 時に stoppedTyping を先に送る契約
        let mut room = Room::new();
        room.join("alice").unwrap();
        room.set_typing("alice", true).unwrap();

        // when (操作):
        room.apply_message("alice", "hi");

        // then (期待する結果):
        assert!(room.snapshot().users[0].is_typing);

        // stoppedTyping が先行した場合のみフラグが消える
        room.set_typing("alice", false).unwrap();
        room.apply_message("alice", "bye");
        let snapshot = room.snapshot();
        assert_eq!(snapshot.users, vec![User::new("alice")]);
    }

    #[test]
    fn test_leave_removes_exactly_one_user() {
        // テスト項目: 退出でそのユーザーだけが消え、他のタイピング状態は変わらない
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();
        room.join("bob").unwrap();
        room.set_typing("bob", true).unwrap();

        // when (操作):
        room.leave("alice");

        // then (期待する結果):
        let snapshot = room.snapshot();
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.users[0].name, "bob");
        assert!(snapshot.users[0].is_typing);
        assert_eq!(
            snapshot.messages.last().unwrap(),
            "[SERVER] alice disconnected."
        );
    }

    #[test]
    fn test_leave_unknown_name_is_a_noop() {
        // テスト項目: 参加していない名前の退出は通知を出さない
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();
        let before = room.snapshot();

        // when (操作):
        room.leave("ghost");

        // then (期待する結果):
        assert_eq!(room.snapshot(), before);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_sessions_including_joiner() {
        // テスト項目: 参加ブロードキャストが参加者自身を含む全セッションに届く
        // given (前提条件):
        let mut room = Room::new();
        let mut rx_existing = register_test_session(&mut room);
        let mut rx_joiner = register_test_session(&mut room);

        // when (操作):
        room.join("alice").unwrap();

        // then (期待する結果):
        let frame_existing = rx_existing.recv().await.unwrap();
        let frame_joiner = rx_joiner.recv().await.unwrap();
        assert_eq!(frame_existing, frame_joiner);

        let state = idobata_shared::protocol::decode_snapshot(&frame_existing).unwrap();
        assert_eq!(state.users, vec![User::new("alice")]);
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_session() {
        // テスト項目: 受信側が閉じたセッションがあっても他への配送が続く
        // given (前提条件):
        let mut room = Room::new();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        drop(dead_rx);
        room.register(Uuid::new_v4(), dead_tx);
        let mut rx_alive = register_test_session(&mut room);

        // when (操作):
        room.join("alice").unwrap();

        // then (期待する結果):
        assert!(rx_alive.recv().await.is_some());
        // 死んだセッションはブロードキャスト側では登録解除されない
        assert_eq!(room.sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_event_triggers_no_broadcast() {
        // テスト項目: 拒否されたイベントではブロードキャストが発生しない
        // given (前提条件):
        let mut room = Room::new();
        room.join("alice").unwrap();
        let mut rx = register_test_session(&mut room);

        // when (操作):
        let result = room.apply(ClientEvent::StartedTyping {
            name: "ghost".to_string(),
        });

        // then (期待する結果):
        assert!(result.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_messages_never_interleave() {
        // テスト項目: 並行送信された N 件のメッセージが壊れず全件記録される
        // given (前提条件):
        let room = Arc::new(Mutex::new(Room::new()));
        room.lock().await.join("alice").unwrap();
        let message_count = 50;

        // when (操作):
        let mut handles = Vec::new();
        for i in 0..message_count {
            let room = room.clone();
            handles.push(tokio::spawn(async move {
                let mut room = room.lock().await;
                room.apply_message("alice", &format!("message number {i}"));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // then (期待する結果):
        let snapshot = room.lock().await.snapshot();
        let chat_lines: Vec<&String> = snapshot
            .messages
            .iter()
            .filter(|m| !m.starts_with("[SERVER]"))
            .collect();
        assert_eq!(chat_lines.len(), message_count);
        for line in chat_lines {
            assert!(line.starts_with("alice: message number "));
            let suffix = line.trim_start_matches("alice: message number ");
            assert!(suffix.parse::<usize>().is_ok(), "corrupted line: {line}");
        }
    }
}
