use crate::cli_adapter::parse_input;
use crate::config::Config;
use crate::consultation::Consultation;
use crate::reconciler::{ConversationState, LogUpdate};
use crate::sessions;
use crate::types::Message;
use crate::ws_adapter::{TransportEvent, WsAdapter};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{info, warn};

pub const TOPIC_PROMPT: &str = "请输入您的症状：";
pub const ANSWER_PROMPT: &str = "请输入您的回答：";
pub const COMPLETE_NOTICE: &str = "咨询已完成。";

/// Notified after every log change so the view can follow the latest entry.
pub trait LogObserver {
    fn on_update(&mut self, log: &[Message], update: LogUpdate) -> Result<()>;

    fn on_prompt(&mut self, _text: &str) -> Result<()> {
        Ok(())
    }
}

pub struct Coordinator<O: LogObserver> {
    config: Config,
    consultation: Consultation,
    observer: O,
}

impl<O: LogObserver> Coordinator<O> {
    pub fn new(config: Config, observer: O) -> Self {
        Self {
            config,
            consultation: Consultation::new(),
            observer,
        }
    }

    /// Runs one consultation. Returns when the connection closes, when input
    /// ends after the advice or after a connection error, or on Ctrl-C. The
    /// connection stays open after the final advice so late frames still
    /// reach the log.
    pub async fn run<R>(mut self, symptom: Option<String>, input: R) -> Result<Consultation>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = LinesStream::new(input.lines());

        let topic = match symptom.as_deref().and_then(parse_input) {
            Some(topic) => topic,
            None => match self.read_topic(&mut lines).await? {
                Some(topic) => topic,
                None => {
                    info!("input closed before a symptom was entered");
                    return Ok(self.consultation);
                }
            },
        };
        self.consultation.begin(&topic);

        let session_id = sessions::session_id(self.config.session.id_strategy)?;
        let url = sessions::session_url(
            &self.config.server.base_url,
            &self.config.server.path_prefix,
            &session_id,
        )?;
        info!(session_id = %session_id, url = %url, "opening consultation");

        let retry = self.config.transport.retry_policy();
        let mut adapter = match WsAdapter::connect(&url, retry).await {
            Ok(adapter) => adapter,
            Err(err) => {
                let update = self.consultation.on_transport_error(&err.to_string());
                self.publish([update])?;
                return Ok(self.consultation);
            }
        };
        let mut sink = adapter.sink();
        let mut input_open = true;
        let mut transport_failed = false;
        let mut announced_complete = false;

        loop {
            let before = self.consultation.state();
            // After completion or a connection error, input is read only to
            // notice it ending.
            let want_input = input_open
                && (self.consultation.is_complete()
                    || transport_failed
                    || (self.consultation.accepts_answers()
                        && before == ConversationState::BetweenMessages));

            tokio::select! {
                biased;
                maybe_event = adapter.events().recv() => {
                    match maybe_event {
                        Some(TransportEvent::Opened) => {
                            let updates = self.consultation.on_open(&mut sink);
                            self.publish(updates)?;
                        }
                        Some(TransportEvent::Text(text)) => {
                            let update = self.consultation.on_frame(&text);
                            self.publish([update])?;
                        }
                        Some(TransportEvent::Binary(bytes)) => {
                            let update = self.consultation.on_binary(&bytes);
                            self.publish([update])?;
                        }
                        Some(TransportEvent::Error(detail)) => {
                            transport_failed = true;
                            let update = self.consultation.on_transport_error(&detail);
                            self.publish([update])?;
                        }
                        Some(TransportEvent::Closed) | None => {
                            self.consultation.on_closed();
                            break;
                        }
                    }
                }
                maybe_line = lines.next(), if want_input => {
                    match maybe_line {
                        Some(Ok(line)) => {
                            if let Some(answer) = parse_input(&line) {
                                let updates = self.consultation.submit_answer(&answer, &mut sink);
                                self.publish(updates)?;
                            }
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "failed to read input");
                            input_open = false;
                        }
                        None => {
                            info!("input closed");
                            input_open = false;
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break;
                }
            }

            if self.consultation.is_complete() && !announced_complete {
                self.observer.on_prompt(COMPLETE_NOTICE)?;
                announced_complete = true;
            }
            if !input_open && (self.consultation.is_complete() || transport_failed) {
                break;
            }
            if input_open && !transport_failed && offers_answer(before, &self.consultation) {
                self.observer.on_prompt(ANSWER_PROMPT)?;
            }
        }

        Ok(self.consultation)
    }

    async fn read_topic<L>(&mut self, lines: &mut L) -> Result<Option<String>>
    where
        L: tokio_stream::Stream<Item = std::io::Result<String>> + Unpin,
    {
        self.observer.on_prompt(TOPIC_PROMPT)?;
        while let Some(line) = lines.next().await {
            let line = line.context("failed to read symptom")?;
            if let Some(topic) = parse_input(&line) {
                return Ok(Some(topic));
            }
        }
        Ok(None)
    }

    fn publish(&mut self, updates: impl IntoIterator<Item = LogUpdate>) -> Result<()> {
        for update in updates {
            self.observer.on_update(self.consultation.log(), update)?;
        }
        Ok(())
    }
}

/// True on each move into `BetweenMessages` while answers are accepted, so
/// every finished question gets its own prompt.
fn offers_answer(before: ConversationState, consultation: &Consultation) -> bool {
    consultation.accepts_answers()
        && consultation.state() == ConversationState::BetweenMessages
        && before != ConversationState::BetweenMessages
}

/// Feeds a capture of inbound frames (one JSON object per line) through a
/// fresh consultation.
pub fn replay<O: LogObserver>(path: &Path, observer: &mut O) -> Result<Consultation> {
    let file =
        File::open(path).with_context(|| format!("failed to open replay file: {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut consultation = Consultation::new();
    for line in reader.lines() {
        let line = line.context("failed to read replay line")?;
        if line.trim().is_empty() {
            continue;
        }
        let update = consultation.on_frame(&line);
        observer.on_update(consultation.log(), update)?;
    }
    Ok(consultation)
}
