//! CLI channel: stdin/stdout REPL for local testing.
//!
//! One process can play several people: prefix a line with `<jid>:` to speak
//! as that jid. `<jid>: /doc <path>` uploads a local file as a document.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Attachment, Channel, IncomingMessage, MessageStream, Presence};
use crate::error::ChannelError;

/// Jid used for lines without a prefix.
pub const LOCAL_USER: &str = "local-user";

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub struct CliLine {
    pub jid: String,
    pub text: String,
    /// Path given with `/doc`.
    pub document: Option<String>,
}

/// Split a line into sender, text and an optional document path.
pub fn parse_line(line: &str) -> Option<CliLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (jid, rest) = match line.split_once(':') {
        Some((jid, rest)) if is_jid(jid.trim()) && !rest.starts_with("//") => {
            (jid.trim().to_string(), rest.trim())
        }
        _ => (LOCAL_USER.to_string(), line),
    };

    if let Some(path) = rest.strip_prefix("/doc ") {
        return Some(CliLine {
            jid,
            text: String::new(),
            document: Some(path.trim().to_string()),
        });
    }

    Some(CliLine {
        jid,
        text: rest.to_string(),
        document: None,
    })
}

/// A jid prefix is a single token without URL punctuation. The caller also
/// rejects a prefix followed by `//`, so "https://..." stays message text.
fn is_jid(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '@' | '.' | '+'))
}

async fn into_incoming(line: CliLine) -> Option<IncomingMessage> {
    let Some(path) = line.document else {
        return Some(IncomingMessage::new("cli", line.jid, line.text).with_detected_link());
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let file_name = std::path::Path::new(&path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.clone());
            let mime_type = file_name
                .ends_with(".txt")
                .then(|| "text/plain".to_string());
            Some(
                IncomingMessage::new("cli", line.jid, "").with_attachment(Attachment::Document {
                    file_name,
                    mime_type,
                    bytes,
                }),
            )
        }
        Err(e) => {
            eprintln!("cannot read {path}: {e}");
            None
        }
    }
}

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            // Print prompt
            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(parsed) = parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        let Some(msg) = into_incoming(parsed).await else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
        println!("\n[to {recipient}] {text}\n");
        eprint!("> ");
        Ok(())
    }

    async fn send_presence(&self, _recipient: &str, _presence: Presence) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
