//! Interactive console connector for trying handlers without a chat server.
//!
//! Every line typed becomes a message in channel `shell` from user `shell`;
//! everything the bot sends is printed. `exit`, `quit` or end of input ends
//! the session.

use std::{
    io::{self, BufRead, Write},
    sync::{Arc, Mutex},
};

use {
    async_trait::async_trait,
    serde::Serialize,
    tokio::sync::mpsc,
    tracing::{debug, error},
};

use courier_channels::{Connector, ConnectorStreams, Error, InMessage, OutMessage, Result};

/// Channel, user and team name of every console message.
pub const SHELL_NAME: &str = "shell";

const INPUT_PROMPT: &str = "shell> ";
const OUTPUT_PROMPT: &str = "courier> ";
const RULE: &str = "----------------";

type Input = Box<dyn BufRead + Send>;
type Output = Arc<Mutex<Box<dyn Write + Send>>>;
type Queues = (mpsc::Sender<InMessage>, mpsc::Sender<Error>);

#[derive(Serialize)]
struct Printed<'a> {
    channel: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    username: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    icon_url: &'a str,
}

/// Console connector over any line reader and writer (stdin/stdout by
/// default).
pub struct ShellConnector {
    input: Mutex<Option<Input>>,
    output: Output,
    queues: Arc<Mutex<Option<Queues>>>,
}

impl ShellConnector {
    /// Read from stdin, print to stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::with_io(io::BufReader::new(io::stdin()), io::stdout())
    }

    pub fn with_io(input: impl BufRead + Send + 'static, output: impl Write + Send + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
            output: Arc::new(Mutex::new(Box::new(output))),
            queues: Arc::default(),
        }
    }
}

/// The message for one typed line.
#[must_use]
pub fn line_message(line: &str) -> InMessage {
    let trigger_word = line.split_whitespace().next().unwrap_or_default();
    let raw = serde_json::json!({
        "team_domain": SHELL_NAME,
        "timestamp": chrono::Utc::now().timestamp().to_string(),
        "trigger_word": trigger_word,
    });
    InMessage::new(SHELL_NAME, SHELL_NAME, line)
        .with_channel_id(SHELL_NAME)
        .with_user_id(SHELL_NAME)
        .with_raw(raw)
}

fn print(output: &Output, text: &str) {
    let mut out = output.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
        debug!(error = %e, "shell output failed");
    }
}

fn current_messages(queues: &Mutex<Option<Queues>>) -> Option<mpsc::Sender<InMessage>> {
    queues
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .map(|(messages, _)| messages.clone())
}

fn current_errors(queues: &Mutex<Option<Queues>>) -> Option<mpsc::Sender<Error>> {
    queues
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .as_ref()
        .map(|(_, errors)| errors.clone())
}

/// Blocking read loop; ends on EOF, `exit`/`quit`, a read error or stop.
fn read_lines(input: Input, output: Output, queues: Arc<Mutex<Option<Queues>>>) {
    print(&output, INPUT_PROMPT);
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "reading shell input failed");
                if let Some(errors) = current_errors(&queues) {
                    let _ = errors.blocking_send(Error::external("reading shell input", e));
                }
                break;
            },
        };
        let line = line.trim();
        if line.is_empty() {
            print(&output, INPUT_PROMPT);
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }
        let Some(messages) = current_messages(&queues) else {
            break;
        };
        if messages.blocking_send(line_message(line)).is_err() {
            break;
        }
        print(&output, INPUT_PROMPT);
    }
    queues.lock().unwrap_or_else(|e| e.into_inner()).take();
    debug!("shell input ended");
}

#[async_trait]
impl Connector for ShellConnector {
    fn id(&self) -> &str {
        SHELL_NAME
    }

    async fn start(&self) -> Result<ConnectorStreams> {
        let input = self
            .input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| Error::unavailable("shell input already consumed"))?;

        let (msg_tx, messages) = mpsc::channel(1);
        let (err_tx, errors) = mpsc::channel(1);
        *self.queues.lock().unwrap_or_else(|e| e.into_inner()) = Some((msg_tx, err_tx));

        let output = Arc::clone(&self.output);
        let queues = Arc::clone(&self.queues);
        tokio::task::spawn_blocking(move || read_lines(input, output, queues));

        Ok(ConnectorStreams { messages, errors })
    }

    async fn stop(&self) {
        self.queues.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    async fn send(&self, msg: &OutMessage) -> Result<()> {
        let printed = Printed {
            channel: msg.target_channel_name(),
            text: &msg.text,
            username: &msg.user_name,
            icon_url: &msg.icon_url,
        };
        let json = serde_json::to_string_pretty(&printed)?;
        print(
            &self.output,
            &format!("\n[Send]\n{json}\n{RULE}\n{OUTPUT_PROMPT}{}\n", msg.text),
        );
        Ok(())
    }
}
