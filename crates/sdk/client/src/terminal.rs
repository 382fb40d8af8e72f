//! Window host for terminals.
//!
//! Opening a popup prints its URL for the user to open in a browser. Each
//! stdin line is a JSON `{ "origin": ..., "data": ... }` message event, as the
//! confirmation page would post it; an empty line or EOF closes the window.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use beam_session::{
    MessageEvent, OverlayControls, OverlayHandle, OverlayKind, PopupBlocked, PopupRequest,
    PopupWindow, WindowHost,
};
use console::style;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalInput {
    /// The user closed the window.
    Close,
    Message(MessageEvent),
    Invalid(String),
}

/// Interpret a line typed or piped into the terminal.
pub fn parse_line(line: &str) -> TerminalInput {
    let line = line.trim();
    if line.is_empty() {
        return TerminalInput::Close;
    }
    match serde_json::from_str::<MessageEvent>(line) {
        Ok(event) => TerminalInput::Message(event),
        Err(e) => TerminalInput::Invalid(e.to_string()),
    }
}

/// Cloning shares the window and the message channel.
#[derive(Clone)]
pub struct TerminalWindowHost {
    sender: broadcast::Sender<MessageEvent>,
    window: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl TerminalWindowHost {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            window: Arc::new(Mutex::new(None)),
        }
    }

    /// Feed stdin lines to [`TerminalWindowHost::deliver`] from a dedicated
    /// thread. The thread ends at EOF.
    pub fn spawn_stdin_reader(&self) -> std::thread::JoinHandle<()> {
        let host = self.clone();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => host.deliver(parse_line(&line)),
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            host.deliver(TerminalInput::Close);
        })
    }

    pub fn deliver(&self, input: TerminalInput) {
        match input {
            TerminalInput::Close => {
                if let Some(closed) = self.lock().take() {
                    closed.store(true, Ordering::SeqCst);
                    debug!("Terminal window closed by user");
                }
            }
            TerminalInput::Message(event) => {
                debug!("Message from {}", event.origin);
                // No receiver just means nobody is waiting for a confirmation.
                let _ = self.sender.send(event);
            }
            TerminalInput::Invalid(reason) => {
                eprintln!("{} {}", style("Ignored input:").yellow(), reason);
            }
        }
    }

    /// Whether a window is open and not yet closed.
    pub fn is_window_open(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|closed| !closed.load(Ordering::SeqCst))
    }

    /// Handshakes currently waiting for a message.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<AtomicBool>>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TerminalWindowHost {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowHost for TerminalWindowHost {
    fn open_popup(&self, request: &PopupRequest) -> Result<Box<dyn PopupWindow>, PopupBlocked> {
        let closed = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.lock().replace(Arc::clone(&closed)) {
            previous.store(true, Ordering::SeqCst);
        }

        eprintln!("{}", style(&request.title).bold());
        print_url(&request.url);
        Ok(Box::new(TerminalPopup { closed }))
    }

    fn show_overlay(&self, kind: OverlayKind, _controls: OverlayControls) -> Box<dyn OverlayHandle> {
        match kind {
            OverlayKind::Generic => eprintln!(
                "{}",
                style("Waiting for confirmation. Paste messages here, or an empty line to cancel.")
                    .dim()
            ),
            OverlayKind::Blocked => eprintln!("{}", style("Could not open the window.").red()),
        }
        Box::new(TerminalOverlay)
    }

    fn subscribe(&self) -> broadcast::Receiver<MessageEvent> {
        self.sender.subscribe()
    }
}

fn print_url(url: &str) {
    eprintln!("  {} {}", style("Open").cyan(), style(url).underlined());
}

struct TerminalPopup {
    closed: Arc<AtomicBool>,
}

impl PopupWindow for TerminalPopup {
    fn navigate(&self, url: &str) {
        print_url(url);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct TerminalOverlay;

impl OverlayHandle for TerminalOverlay {
    fn remove(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use beam_session::PopupSize;
    use serde_json::json;

    fn request() -> PopupRequest {
        PopupRequest {
            url: "https://identity.beta.onbeam.com/loading".into(),
            title: "Confirm this transaction".into(),
            size: PopupSize::default(),
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), TerminalInput::Close);
        assert!(matches!(parse_line("not json"), TerminalInput::Invalid(_)));

        let line = json!({ "origin": "https://identity.beta.onbeam.com", "data": { "a": 1 } });
        match parse_line(&line.to_string()) {
            TerminalInput::Message(event) => {
                assert_eq!(event.origin, "https://identity.beta.onbeam.com");
                assert_eq!(event.data, json!({ "a": 1 }));
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn test_empty_line_closes_window() {
        let host = TerminalWindowHost::new();
        let popup = host.open_popup(&request()).unwrap();
        assert!(host.is_window_open());

        host.deliver(TerminalInput::Close);

        assert!(popup.is_closed());
        assert!(!host.is_window_open());
    }

    #[test]
    fn test_reopening_closes_previous_window() {
        let host = TerminalWindowHost::new();
        let first = host.open_popup(&request()).unwrap();
        let second = host.open_popup(&request()).unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_messages_reach_subscribers() {
        let host = TerminalWindowHost::new();
        let mut receiver = host.subscribe();

        host.deliver(parse_line(
            r#"{"origin":"https://identity.beta.onbeam.com","data":{"eventType":"beam_confirmation"}}"#,
        ));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.data["eventType"], "beam_confirmation");
    }
}
