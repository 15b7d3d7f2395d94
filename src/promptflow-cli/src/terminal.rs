//! Bridge between a [`MemoryChannel`] and a terminal.
//!
//! Lines typed by the user become inbound messages, except page-turn
//! symbols which become reactions on the most recent menu. Everything the
//! engine sends is rendered as plain text.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use promptflow_core::menu::EMPTY_DESCRIPTION;
use promptflow_core::{
    IncomingMessage, MemoryChannel, OutgoingMessage, Outbound, PageSymbols, Reaction,
};

/// Id of the last menu shown, shared by the printer and the input reader.
pub type LatestMenu = Arc<Mutex<Option<String>>>;

/// What one input line means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Message(String),
    Reaction(String),
}

/// Classify a line. `<` and `>` are shorthands for the page symbols.
pub fn classify_line(line: &str, symbols: &PageSymbols) -> InputLine {
    let trimmed = line.trim();
    if trimmed == "<" || trimmed == symbols.previous {
        InputLine::Reaction(symbols.previous.clone())
    } else if trimmed == ">" || trimmed == symbols.next {
        InputLine::Reaction(symbols.next.clone())
    } else {
        InputLine::Message(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Plain-text rendering of an outbound message.
pub fn render(message: &OutgoingMessage, symbols: &PageSymbols) -> String {
    let page = match message {
        OutgoingMessage::Text { text, .. } => return text.clone(),
        OutgoingMessage::Menu { page, .. } => page,
    };

    let mut out = String::new();
    if let Some(title) = &page.title {
        let _ = writeln!(out, "== {} ==", title);
    }
    if let Some(description) = &page.description {
        let _ = writeln!(out, "{}", description);
    }
    for option in &page.options {
        let _ = writeln!(out, "{}", option.display_label());
        if option.description != EMPTY_DESCRIPTION {
            let _ = writeln!(out, "   {}", option.description);
        }
    }
    if page.page_count > 1 {
        let _ = writeln!(
            out,
            "Page {}/{} ({} / {} or < / > to turn)",
            page.page + 1,
            page.page_count,
            symbols.previous,
            symbols.next
        );
    }
    out.trim_end().to_string()
}

/// Print everything sent on the channel until the outbox closes.
pub async fn forward_outbox<W>(
    mut outbox: mpsc::UnboundedReceiver<Outbound>,
    mut writer: W,
    symbols: PageSymbols,
    latest_menu: LatestMenu,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = outbox.recv().await {
        let text = match event {
            Outbound::Sent { id, message } => {
                if message.as_menu_page().is_some() {
                    *latest_menu.lock() = Some(id);
                }
                render(&message, &symbols)
            }
            Outbound::Edited { message, .. } => render(&message, &symbols),
            Outbound::Reacted { id, symbol } => {
                debug!("Reaction {} added to {}", symbol, id);
                continue;
            }
        };
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(b"\n\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Forward input lines from `user` to the channel until `lines` closes.
pub async fn feed_input(
    mut lines: mpsc::UnboundedReceiver<String>,
    channel: MemoryChannel,
    user: String,
    symbols: PageSymbols,
    latest_menu: LatestMenu,
) {
    while let Some(line) = lines.recv().await {
        match classify_line(&line, &symbols) {
            InputLine::Message(content) => {
                if channel.deliver(IncomingMessage::new(user.as_str(), content)) == 0 {
                    debug!("No prompt is listening");
                }
            }
            InputLine::Reaction(symbol) => {
                let target = latest_menu.lock().clone();
                match target {
                    Some(id) => {
                        channel.react(&id, Reaction::new(user.as_str(), symbol));
                    }
                    None => warn!("No menu to turn pages on"),
                }
            }
        }
    }
}

/// Read stdin lines on a dedicated thread. The thread ends with the process
/// or at end of input.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}
