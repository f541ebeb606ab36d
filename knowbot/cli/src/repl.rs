//! Line-based chat loop
//!
//! Reads stdin and the session's stream events concurrently, so `/cancel`
//! works while an answer is still arriving.

use anyhow::Result;
use knowbot_core::{
    ChatSession, CompletionBackend, Conversation, Metadata, RejectReason, StreamEvent, Transition,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};

/// One line of user input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// A question for the bot
    Ask(String),
    /// List suggestions, or ask the n-th one (1-based)
    Suggest(Option<usize>),
    /// Show the sources of the last answer again
    Sources,
    /// Re-run the pending question
    Retry,
    /// Stop the current answer
    Cancel,
    /// Forget the conversation
    Reset,
    /// Show commands
    Help,
    /// Leave
    Quit,
    /// Blank line
    Empty,
    /// Unrecognized slash command
    Unknown(String),
}

impl Command {
    /// Parse a line of input
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Ask(line.to_string());
        };

        let mut parts = rest.split_whitespace();
        match parts.next().unwrap_or_default() {
            "suggest" | "s" => match parts.next() {
                None => Self::Suggest(None),
                Some(n) => match n.parse::<usize>() {
                    Ok(n) if n > 0 => Self::Suggest(Some(n)),
                    _ => Self::Unknown(line.to_string()),
                },
            },
            "sources" => Self::Sources,
            "retry" | "r" => Self::Retry,
            "cancel" | "c" => Self::Cancel,
            "reset" => Self::Reset,
            "help" | "h" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

const HELP: &str = "\
Commands:
  /suggest [n]  list suggestions, or ask suggestion n
  /sources      show the sources of the last answer
  /retry        ask the last unanswered question again
  /cancel       stop the current answer
  /reset        start a new conversation
  /quit         exit
";

/// Numbered suggestion list
pub fn format_suggestions(suggestions: &[String]) -> String {
    suggestions
        .iter()
        .enumerate()
        .map(|(i, s)| format!("  {}. {s}\n", i + 1))
        .collect()
}

/// Sources cited by the most recent answer, if it cited any
pub fn last_sources(conversation: &Conversation) -> Option<String> {
    conversation
        .last_interaction()
        .filter(|interaction| !interaction.metadata.is_empty())
        .map(|interaction| format_sources(&interaction.metadata))
}

/// Source list printed under a completed answer
pub fn format_sources(metadata: &Metadata) -> String {
    if metadata.is_empty() {
        return String::new();
    }

    let mut out = String::from("\nSources:\n");
    for source in &metadata.sources {
        match source.url {
            Some(ref url) => out.push_str(&format!("  - {} <{url}>\n", source.title)),
            None => out.push_str(&format!("  - {}\n", source.title)),
        }
    }
    out
}

struct Terminal {
    out: Stdout,
}

impl Terminal {
    async fn print(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    async fn prompt(&mut self) -> Result<()> {
        self.print("> ").await
    }
}

/// Run the chat loop until `/quit` or end of input
pub async fn run<B: CompletionBackend + 'static>(mut session: ChatSession<B>) -> Result<()> {
    let mut term = Terminal {
        out: tokio::io::stdout(),
    };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    term.print(&format!("{}\n\nTry asking:\n", session.title()))
        .await?;
    term.print(&format_suggestions(session.suggestions())).await?;
    term.print("\nType /help for commands.\n").await?;
    term.prompt().await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if !handle(&mut session, &mut term, Command::parse(&line)).await? {
                    break;
                }
            }
            events = session.next_events(), if session.is_streaming() => {
                for event in events {
                    render(&mut term, &event).await?;
                }
                if !session.is_streaming() {
                    term.prompt().await?;
                }
            }
        }
    }

    session.cancel();
    term.print("\n").await?;
    Ok(())
}

/// Apply one command; returns `false` to quit
async fn handle<B: CompletionBackend + 'static>(
    session: &mut ChatSession<B>,
    term: &mut Terminal,
    command: Command,
) -> Result<bool> {
    match command {
        Command::Ask(text) => submitted(term, session.submit(&text)).await?,
        Command::Suggest(None) => {
            term.print(&format_suggestions(session.suggestions())).await?;
        }
        Command::Suggest(Some(n)) => match session.submit_suggestion(n - 1) {
            Some(transition) => {
                if let Some(text) = session.suggestion(n - 1) {
                    term.print(&format!("{text}\n")).await?;
                }
                submitted(term, transition).await?;
            }
            None => term.print(&format!("No suggestion {n}\n")).await?,
        },
        Command::Sources => match last_sources(session.conversation()) {
            Some(text) => term.print(&text).await?,
            None => term.print("No sources for the last answer\n").await?,
        },
        Command::Retry => {
            if !session.retry() {
                term.print("Nothing to retry\n").await?;
            }
        }
        Command::Cancel => {
            if session.cancel() {
                term.print("\n[cancelled] /retry to ask again\n").await?;
            }
        }
        Command::Reset => {
            session.reset();
            term.print("Conversation cleared\n").await?;
        }
        Command::Help => term.print(HELP).await?,
        Command::Quit => return Ok(false),
        Command::Empty => {}
        Command::Unknown(line) => term.print(&format!("Unknown command: {line}\n")).await?,
    }

    if !session.is_streaming() {
        term.prompt().await?;
    }
    Ok(true)
}

async fn submitted(term: &mut Terminal, transition: Transition) -> Result<()> {
    if let Transition::Rejected(RejectReason::StreamActive) = transition {
        term.print("Still answering; /cancel first\n").await?;
    }
    Ok(())
}

async fn render(term: &mut Terminal, event: &StreamEvent) -> Result<()> {
    match event {
        StreamEvent::Delta(text) => term.print(text).await,
        StreamEvent::Completed { metadata, .. } => {
            term.print(&format!("\n{}\n", format_sources(metadata))).await
        }
        StreamEvent::Failed { error, .. } => {
            term.print(&format!("\n[error] {error}\n/retry to ask again\n"))
                .await
        }
    }
}
