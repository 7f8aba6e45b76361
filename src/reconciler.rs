//! Folds streamed server events and local submissions into an ordered log.
//!
//! The last entry is the only one that may still be streaming. An event for
//! the same role overwrites it in place; anything else appends. Finalized
//! entries are never touched again.

use crate::types::{InboundEvent, Message, Role};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    #[default]
    NotStarted,
    AwaitingFirstEvent,
    Streaming(Role),
    BetweenMessages,
    Complete,
}

/// Which log slot changed, for observers that redraw the latest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogUpdate {
    Appended(usize),
    Replaced(usize),
}

impl LogUpdate {
    pub fn index(self) -> usize {
        match self {
            LogUpdate::Appended(index) | LogUpdate::Replaced(index) => index,
        }
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    log: Vec<Message>,
    state: ConversationState,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn state(&self) -> ConversationState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ConversationState::Complete
    }

    /// Topic submitted; waiting for the server's first frame.
    pub fn start(&mut self) {
        if self.state == ConversationState::NotStarted {
            self.state = ConversationState::AwaitingFirstEvent;
        }
    }

    pub fn apply(&mut self, event: InboundEvent) -> LogUpdate {
        let merge = matches!(
            self.log.last(),
            Some(last) if last.streaming && last.role == event.role
        );
        let InboundEvent {
            role,
            content,
            streaming,
        } = event;

        let update = if merge {
            let index = self.log.len() - 1;
            let last = &mut self.log[index];
            last.content = content;
            last.streaming = streaming;
            LogUpdate::Replaced(index)
        } else {
            self.append(Message {
                role,
                content,
                streaming,
            })
        };

        self.advance(role, streaming);
        update
    }

    /// Appends the user's own answer as a finished entry. Blank input is
    /// ignored.
    pub fn submit_local(&mut self, text: &str) -> Option<LogUpdate> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(self.push_local(Message::finalized(Role::User, text)))
    }

    /// Appends a locally generated `system` entry (topic banner, errors).
    pub fn push_notice(&mut self, text: impl Into<String>) -> LogUpdate {
        self.push_local(Message::finalized(Role::System, text))
    }

    fn push_local(&mut self, message: Message) -> LogUpdate {
        let update = self.append(message);
        if let ConversationState::Streaming(_) = self.state {
            self.state = ConversationState::BetweenMessages;
        }
        update
    }

    fn append(&mut self, message: Message) -> LogUpdate {
        // A streaming tail that is about to lose its position is closed as-is.
        if let Some(last) = self.log.last_mut() {
            if last.streaming {
                debug!(role = last.role.as_str(), "closing interrupted streaming entry");
                last.streaming = false;
            }
        }
        self.log.push(message);
        LogUpdate::Appended(self.log.len() - 1)
    }

    fn advance(&mut self, role: Role, streaming: bool) {
        if self.is_complete() {
            return;
        }
        self.state = match (role, streaming) {
            (Role::Advice, false) => ConversationState::Complete,
            (role, true) => ConversationState::Streaming(role),
            (_, false) => ConversationState::BetweenMessages,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(role: Role, content: &str, streaming: bool) -> InboundEvent {
        InboundEvent::new(role, content, streaming)
    }

    fn assert_invariants(log: &[Message]) {
        let streaming: Vec<usize> = log
            .iter()
            .enumerate()
            .filter(|(_, m)| m.streaming)
            .map(|(i, _)| i)
            .collect();
        assert!(streaming.len() <= 1, "more than one streaming entry: {log:?}");
        if let Some(&i) = streaming.first() {
            assert_eq!(i, log.len() - 1, "streaming entry is not last: {log:?}");
        }
    }

    #[test]
    fn streamed_run_collapses_into_one_entry() {
        let mut r = Reconciler::new();
        r.start();
        let parts = ["你", "你发热", "你发热多久", "你发热多久了？"];
        for part in parts {
            r.apply(ev(Role::Question, part, true));
            assert_invariants(r.log());
        }
        let update = r.apply(ev(Role::Question, "你发热多久了？", false));

        assert_eq!(update, LogUpdate::Replaced(0));
        assert_eq!(r.log(), &[Message::finalized(Role::Question, "你发热多久了？")]);
        assert_eq!(r.state(), ConversationState::BetweenMessages);
    }

    #[test]
    fn finalized_events_of_alternating_roles_each_append() {
        let mut r = Reconciler::new();
        let events = [
            ev(Role::System, "a", false),
            ev(Role::Question, "b", false),
            ev(Role::User, "c", false),
            ev(Role::Question, "d", false),
            ev(Role::Question, "e", false),
        ];
        for (i, event) in events.iter().cloned().enumerate() {
            assert_eq!(r.apply(event), LogUpdate::Appended(i));
        }
        let contents: Vec<&str> = r.log().iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn finalized_entry_is_never_reopened() {
        let mut r = Reconciler::new();
        r.apply(ev(Role::Question, "first", false));
        r.apply(ev(Role::Question, "second", true));

        assert_eq!(r.log().len(), 2);
        assert_eq!(r.log()[0], Message::finalized(Role::Question, "first"));
        assert!(r.log()[1].streaming);
    }

    #[test]
    fn role_switch_mid_stream_closes_previous_entry() {
        let mut r = Reconciler::new();
        r.apply(ev(Role::Question, "partial", true));
        r.apply(ev(Role::Advice, "more", true));

        assert_eq!(r.log().len(), 2);
        assert_eq!(r.log()[0], Message::finalized(Role::Question, "partial"));
        assert_eq!(r.state(), ConversationState::Streaming(Role::Advice));
        assert_invariants(r.log());
    }

    #[test]
    fn final_advice_completes_from_any_state() {
        let priors: [&[InboundEvent]; 4] = [
            &[],
            &[ev(Role::Question, "q", true)],
            &[ev(Role::Question, "q", false)],
            &[ev(Role::Advice, "thinking", true)],
        ];
        for prior in priors {
            let mut r = Reconciler::new();
            r.start();
            for event in prior {
                r.apply(event.clone());
            }
            r.apply(ev(Role::Advice, "建议多喝水", false));
            assert_eq!(r.state(), ConversationState::Complete);
            assert_invariants(r.log());
        }
    }

    #[test]
    fn complete_is_terminal() {
        let mut r = Reconciler::new();
        r.apply(ev(Role::Advice, "done", false));
        r.apply(ev(Role::Question, "late", true));
        r.submit_local("still here");
        r.push_notice("error");
        r.start();

        assert_eq!(r.state(), ConversationState::Complete);
        assert_eq!(r.log().len(), 4);
    }

    #[test]
    fn blank_local_input_is_ignored() {
        let mut r = Reconciler::new();
        r.apply(ev(Role::Question, "q", false));
        assert_eq!(r.submit_local(""), None);
        assert_eq!(r.submit_local("   "), None);
        assert_eq!(r.log().len(), 1);
    }

    #[test]
    fn local_input_is_stored_trimmed() {
        let mut r = Reconciler::new();
        r.submit_local("  两天 \n");
        assert_eq!(r.log(), &[Message::finalized(Role::User, "两天")]);
    }

    #[test]
    fn local_submissions_always_append() {
        let mut r = Reconciler::new();
        r.submit_local("one");
        let update = r.submit_local("two");

        assert_eq!(update, Some(LogUpdate::Appended(1)));
        assert!(r.log().iter().all(|m| m.role == Role::User && !m.streaming));
    }

    #[test]
    fn local_entry_during_stream_keeps_single_open_tail() {
        let mut r = Reconciler::new();
        r.start();
        r.apply(ev(Role::Question, "typing", true));
        r.push_notice("连接错误");

        assert_invariants(r.log());
        assert!(!r.log()[0].streaming);
        assert_eq!(r.state(), ConversationState::BetweenMessages);

        // The interrupted question stays closed; a late frame starts a new entry.
        r.apply(ev(Role::Question, "typing more", true));
        assert_eq!(r.log().len(), 3);
    }

    #[test]
    fn state_machine_walkthrough() {
        let mut r = Reconciler::new();
        assert_eq!(r.state(), ConversationState::NotStarted);
        r.start();
        assert_eq!(r.state(), ConversationState::AwaitingFirstEvent);
        r.push_notice("症状：发热");
        assert_eq!(r.state(), ConversationState::AwaitingFirstEvent);
        r.apply(ev(Role::Question, "q", true));
        assert_eq!(r.state(), ConversationState::Streaming(Role::Question));
        r.apply(ev(Role::Question, "q?", false));
        assert_eq!(r.state(), ConversationState::BetweenMessages);
        r.submit_local("a");
        assert_eq!(r.state(), ConversationState::BetweenMessages);
        r.apply(ev(Role::Advice, "adv", false));
        assert_eq!(r.state(), ConversationState::Complete);
    }

    #[test]
    fn consultation_scenario() {
        let mut r = Reconciler::new();
        r.start();

        r.apply(ev(Role::System, "症状：发热", false));
        assert_eq!(r.log(), &[Message::finalized(Role::System, "症状：发热")]);

        let update = r.apply(ev(Role::Question, "你发热多久了？", true));
        assert_eq!(update, LogUpdate::Appended(1));
        assert!(r.log()[1].streaming);

        let update = r.apply(ev(Role::Question, "你发热多久了？今天", false));
        assert_eq!(update, LogUpdate::Replaced(1));
        assert_eq!(r.log().len(), 2);
        assert_eq!(r.log()[1], Message::finalized(Role::Question, "你发热多久了？今天"));

        assert_eq!(r.submit_local("两天"), Some(LogUpdate::Appended(2)));
        assert_eq!(r.log()[2], Message::finalized(Role::User, "两天"));

        assert_eq!(r.apply(ev(Role::Advice, "建议多喝水", false)), LogUpdate::Appended(3));
        assert_eq!(r.log()[3], Message::finalized(Role::Advice, "建议多喝水"));
        assert_eq!(r.log().len(), 4);
        assert!(r.is_complete());
    }
}
