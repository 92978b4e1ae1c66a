use anyhow::Result;
use ivi_application::Dashboard;
use ivi_core::chat::{ChatState, MessageRole, ToolCallStatus};
use ivi_core::config::DashboardConfig;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(config: DashboardConfig) -> Result<()> {
    let dashboard = Dashboard::from_config(config)?;
    let mut chat = dashboard.watch_chat();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut view = TurnView::default();

    println!("💬 Vehicle assistant. /cancel aborts a reply, /quit exits.");
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/cancel" => dashboard.cancel_turn(),
                    text => {
                        dashboard.send_turn(text);
                    }
                }
            }
            changed = chat.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = chat.borrow_and_update().clone();
                view.render(&state)?;
            }
        }
    }

    dashboard.shutdown();
    Ok(())
}

/// Prints the newest assistant message incrementally.
#[derive(Default)]
struct TurnView {
    message_id: Option<String>,
    printed: usize,
    tools: Vec<ToolCallStatus>,
    finished: bool,
}

impl TurnView {
    fn render(&mut self, state: &ChatState) -> std::io::Result<()> {
        let Some(message) = state
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
        else {
            return Ok(());
        };

        let mut out = std::io::stdout().lock();
        if self.message_id.as_deref() != Some(message.id.as_str()) {
            if self.message_id.is_some() && !self.finished {
                writeln!(out)?;
            }
            *self = Self {
                message_id: Some(message.id.clone()),
                ..Self::default()
            };
            write!(out, "assistant> ")?;
        }
        if self.finished {
            return Ok(());
        }

        for (index, call) in message.tool_calls.iter().enumerate() {
            match self.tools.get(index) {
                None => {
                    writeln!(out, "\n  ⚙ {}({})", call.name, call.args)?;
                    self.tools.push(ToolCallStatus::Calling);
                }
                Some(shown) if *shown == call.status => continue,
                Some(_) => {}
            }
            if call.status != ToolCallStatus::Calling {
                let mark = if call.status == ToolCallStatus::Done { "✓" } else { "✗" };
                let result = call.result.as_deref().unwrap_or("");
                writeln!(out, "  {mark} {} → {result}", call.name)?;
                self.tools[index] = call.status;
            }
        }

        if message.content.len() > self.printed {
            write!(out, "{}", &message.content[self.printed..])?;
            self.printed = message.content.len();
        }

        if !state.streaming {
            writeln!(out)?;
            if let Some(error) = &state.error {
                writeln!(out, "✗ {error}")?;
            }
            self.finished = true;
        }
        out.flush()
    }
}
