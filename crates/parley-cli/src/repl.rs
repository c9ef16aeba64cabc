//! Line-oriented front end: one question per line, answers streamed back.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_common::{Notification, NotificationLevel, ParleyError};
use parley_session::{
    build_preamble, AskRequest, ConversationTurn, FragmentSink, PromptReference, SessionError,
    SessionOrchestrator,
};

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Question(String),
    /// Attach a file to the next question only.
    Attach(PathBuf),
    /// Add a file to the open-files set sent when configured.
    Open(PathBuf),
    Reset,
    Quit,
    Help,
    Empty,
    Unknown(String),
}

pub fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Question(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("quit" | "exit", _) => Input::Quit,
        ("reset", _) => Input::Reset,
        ("help", _) => Input::Help,
        ("attach", path) if !path.is_empty() => Input::Attach(PathBuf::from(path)),
        ("open", path) if !path.is_empty() => Input::Open(PathBuf::from(path)),
        _ => Input::Unknown(line.to_string()),
    }
}

const HELP: &str = "\
Type a question and press Enter. Ctrl-C cancels the answer in progress.
  /attach <path>  include a file with the next question
  /open <path>    treat a file as open in the editor
  /reset          forget the conversation
  /quit           exit";

pub struct Repl {
    session: SessionOrchestrator,
    include_open_files: bool,
    history: Vec<ConversationTurn>,
    attached: Vec<PromptReference>,
    open_files: Vec<PromptReference>,
}

impl Repl {
    pub fn new(session: SessionOrchestrator, include_open_files: bool) -> Self {
        Self {
            session,
            include_open_files,
            history: Vec::new(),
            attached: Vec::new(),
            open_files: Vec::new(),
        }
    }

    pub async fn run(mut self) -> Result<(), ParleyError> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("parley ready. /help for commands.");

        loop {
            prompt();
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match parse_line(&line) {
                Input::Empty => {}
                Input::Quit => break,
                Input::Help => println!("{HELP}"),
                Input::Reset => {
                    self.history.clear();
                    self.attached.clear();
                    println!("Conversation cleared.");
                }
                Input::Attach(path) => match read_reference(&path) {
                    Ok(reference) => self.attached.push(reference),
                    Err(e) => eprintln!("cannot read {}: {e}", path.display()),
                },
                Input::Open(path) => match read_reference(&path) {
                    Ok(reference) => self.open_files.push(reference),
                    Err(e) => eprintln!("cannot read {}: {e}", path.display()),
                },
                Input::Unknown(text) => eprintln!("unknown command: {text}"),
                Input::Question(question) => self.ask(question).await?,
            }
        }

        self.session.connection().disconnect();
        Ok(())
    }

    async fn ask(&mut self, question: String) -> Result<(), ParleyError> {
        let preamble = build_preamble(&self.attached, &self.open_files, self.include_open_files);
        let request = AskRequest::new(question.clone())
            .with_history(self.history.clone())
            .with_preamble(preamble);

        let cancel = CancellationToken::new();
        let sink: FragmentSink = Arc::new(|fragment| {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(fragment.as_bytes());
            let _ = out.flush();
        });

        let result = until_ctrl_c(self.session.ask(request, &cancel, sink), &cancel).await;
        println!();

        let report = match result {
            Ok(report) => report,
            Err(SessionError::Busy) => {
                warn!("Ask rejected while another is in flight");
                return Ok(());
            }
            Err(SessionError::Credential(e)) => {
                show(&Notification::error("Not signed in", e.to_string()));
                return Ok(());
            }
        };

        if let Some(notification) = report.outcome.notification() {
            show(&notification);
        }
        if let Some(answer) = report.outcome.answer() {
            self.history
                .push(ConversationTurn::request(question, report.request_id.clone()));
            self.history.push(ConversationTurn::response([answer]));
            self.attached.clear();
            self.show_follow_ups().await;
        }
        Ok(())
    }

    /// Probes run once the answer is on screen; Ctrl-C skips them.
    async fn show_follow_ups(&self) {
        let cancel = CancellationToken::new();
        match until_ctrl_c(self.session.follow_ups(&cancel), &cancel).await {
            Ok(follow_ups) => {
                for follow_up in &follow_ups {
                    println!("  -> {follow_up}");
                }
            }
            Err(e) => debug!(error = %e, "Follow-ups skipped"),
        }
    }
}

/// Drive `work` to completion, cancelling `cancel` on the first Ctrl-C.
async fn until_ctrl_c<F: Future>(work: F, cancel: &CancellationToken) -> F::Output {
    tokio::pin!(work);
    loop {
        tokio::select! {
            output = &mut work => return output,
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                debug!("Ctrl-C, cancelling");
                cancel.cancel();
            }
        }
    }
}

fn read_reference(path: &Path) -> std::io::Result<PromptReference> {
    Ok(PromptReference::File {
        path: path.to_path_buf(),
        contents: std::fs::read_to_string(path)?,
    })
}

fn show(notification: &Notification) {
    let label = match notification.level {
        NotificationLevel::Info => "info",
        NotificationLevel::Warning => "warning",
        NotificationLevel::Error => "error",
    };
    eprintln!("[{label}] {notification}");
}

fn prompt() {
    let mut out = std::io::stdout().lock();
    let _ = out.write_all(b"> ");
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    #[test]
    fn plain_text_is_a_question() {
        assert_eq!(
            parse_line("  how do I list files?  "),
            Input::Question("how do I list files?".into())
        );
    }

    #[test]
    fn slash_commands() {
        assert_eq!(parse_line("/quit"), Input::Quit);
        assert_eq!(parse_line("/exit"), Input::Quit);
        assert_eq!(parse_line("/reset"), Input::Reset);
        assert_eq!(parse_line("/help"), Input::Help);
        assert_eq!(parse_line(""), Input::Empty);
        assert_eq!(
            parse_line("/attach src/main.rs"),
            Input::Attach(PathBuf::from("src/main.rs"))
        );
        assert_eq!(
            parse_line("/open  notes.md "),
            Input::Open(PathBuf::from("notes.md"))
        );
    }

    #[test]
    fn incomplete_or_unknown_commands() {
        assert_eq!(parse_line("/attach"), Input::Unknown("/attach".into()));
        assert_eq!(parse_line("/frobnicate"), Input::Unknown("/frobnicate".into()));
    }

    #[test]
    fn reads_file_reference() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fn main() {{}}").unwrap();

        let reference = read_reference(file.path()).unwrap();
        assert_eq!(
            reference,
            PromptReference::File {
                path: file.path().to_path_buf(),
                contents: "fn main() {}".into(),
            }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_reference(&dir.path().join("absent.rs")).is_err());
    }
}
