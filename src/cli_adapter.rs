use crate::coordinator::LogObserver;
use crate::reconciler::LogUpdate;
use crate::types::{Message, Role};
use anyhow::Result;
use std::io::Write;

const STREAMING_MARKER: &str = " …";

/// Trims a typed line; blank lines carry nothing to send.
pub fn parse_input(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

pub fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "[系统]",
        Role::Question => "[提问]",
        Role::User => "[我]",
        Role::Advice => "[建议]",
    }
}

pub fn format_entry(message: &Message) -> String {
    let mut line = format!("{} {}", role_label(message.role), message.content);
    if message.streaming {
        line.push_str(STREAMING_MARKER);
    }
    line
}

/// Prints the log as it changes. A streaming entry stays on an open line and
/// is redrawn in place until it is finalized.
pub struct TerminalRenderer<W: Write> {
    out: W,
    open_line: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            open_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_open_line(&mut self) -> Result<()> {
        if self.open_line {
            writeln!(self.out)?;
            self.open_line = false;
        }
        Ok(())
    }
}

impl<W: Write> LogObserver for TerminalRenderer<W> {
    fn on_update(&mut self, log: &[Message], update: LogUpdate) -> Result<()> {
        let Some(message) = log.get(update.index()) else {
            return Ok(());
        };

        match update {
            LogUpdate::Replaced(_) if self.open_line => {
                write!(self.out, "\r\x1b[2K")?;
            }
            _ => self.end_open_line()?,
        }

        write!(self.out, "{}", format_entry(message))?;
        if message.streaming {
            self.open_line = true;
        } else {
            writeln!(self.out)?;
            self.open_line = false;
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_prompt(&mut self, text: &str) -> Result<()> {
        self.end_open_line()?;
        writeln!(self.out, "{text}")?;
        self.out.flush()?;
        Ok(())
    }
}
