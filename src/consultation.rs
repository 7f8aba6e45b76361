use crate::error::{ProtocolError, TransportError};
use crate::protocol;
use crate::reconciler::{ConversationState, LogUpdate, Reconciler};
use crate::types::{InboundEvent, Message, OutboundMessage};
use tracing::{debug, info, warn};

/// Where outbound requests go. Implementations must not block.
pub trait OutboundSink {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), TransportError>;
}

pub fn topic_banner(topic: &str) -> String {
    format!("症状：{topic}")
}

pub fn connection_error_notice(detail: &str) -> String {
    format!("连接错误，请重新连接后重试（{detail}）")
}

pub fn parse_error_notice(detail: &str) -> String {
    format!("无法解析服务器消息，已忽略（{detail}）")
}

/// One consultation: the log plus the bits of session state the transport
/// callbacks need.
#[derive(Debug, Default)]
pub struct Consultation {
    reconciler: Reconciler,
    topic: Option<String>,
    open: bool,
}

impl Consultation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[Message] {
        self.reconciler.log()
    }

    pub fn state(&self) -> ConversationState {
        self.reconciler.state()
    }

    pub fn is_complete(&self) -> bool {
        self.reconciler.is_complete()
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn accepts_answers(&self) -> bool {
        self.open && !self.is_complete()
    }

    /// Records the topic. Returns false when it is blank or a topic was
    /// already submitted; the caller opens the transport only on true.
    pub fn begin(&mut self, topic: &str) -> bool {
        let topic = topic.trim();
        if topic.is_empty() || self.topic.is_some() {
            return false;
        }
        self.topic = Some(topic.to_string());
        self.reconciler.start();
        info!(topic, "consultation started");
        true
    }

    pub fn on_open<S: OutboundSink + ?Sized>(&mut self, sink: &mut S) -> Vec<LogUpdate> {
        let Some(topic) = self.topic.clone() else {
            warn!("transport opened before a topic was submitted");
            return Vec::new();
        };
        self.open = true;

        let sent = sink.send(&OutboundMessage::Symptom(topic.clone()));
        let mut updates = vec![self.reconciler.push_notice(topic_banner(&topic))];
        if let Err(err) = sent {
            updates.push(self.on_transport_error(&err.to_string()));
        }
        updates
    }

    pub fn on_frame(&mut self, text: &str) -> LogUpdate {
        self.accept(protocol::decode_inbound(text))
    }

    pub fn on_binary(&mut self, bytes: &[u8]) -> LogUpdate {
        self.accept(protocol::decode_binary(bytes))
    }

    fn accept(&mut self, decoded: Result<InboundEvent, ProtocolError>) -> LogUpdate {
        match decoded {
            Ok(event) => {
                debug!(
                    role = event.role.as_str(),
                    streaming = event.streaming,
                    len = event.content.len(),
                    "frame"
                );
                self.reconciler.apply(event)
            }
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                self.reconciler.push_notice(parse_error_notice(&err.to_string()))
            }
        }
    }

    pub fn on_transport_error(&mut self, detail: &str) -> LogUpdate {
        warn!(detail, "transport error");
        self.reconciler.push_notice(connection_error_notice(detail))
    }

    pub fn on_closed(&mut self) {
        self.open = false;
        info!(complete = self.is_complete(), "transport closed");
    }

    /// Sends an answer and logs it. Blank input, a closed session and a
    /// finished consultation are all ignored without sending anything.
    pub fn submit_answer<S: OutboundSink + ?Sized>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Vec<LogUpdate> {
        let answer = text.trim();
        if answer.is_empty() {
            return Vec::new();
        }
        if !self.accepts_answers() {
            debug!(state = ?self.state(), "answer ignored");
            return Vec::new();
        }

        match sink.send(&OutboundMessage::Answer(answer.to_string())) {
            Ok(()) => self.reconciler.submit_local(answer).into_iter().collect(),
            Err(err) => vec![self.on_transport_error(&err.to_string())],
        }
    }
}
