//! Interactive console loop

use std::io::Write;
use std::path::{Path, PathBuf};

use agent_core::{ConversationStore, InteractionDriver};
use agent_runtime::Scheduler;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{info, warn};

use crate::commands::{Command, HELP};

/// Reply recorded for a turn cut short by Ctrl-C
const INTERRUPTED_NOTE: &str = "(interrupted before a reply)";

/// What the loop does after a command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Console {
    driver: InteractionDriver,
    scheduler: Scheduler,
    store: ConversationStore,
    session_dir: PathBuf,
}

impl Console {
    pub fn new(driver: InteractionDriver, scheduler: Scheduler, store: ConversationStore, session_dir: PathBuf) -> Self {
        Self {
            driver,
            scheduler,
            store,
            session_dir,
        }
    }

    /// Read commands from stdin until exit, end of input or Ctrl-C
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("{}", "=".repeat(60));
        println!("Agent ready. Conversation history carries across turns.");
        println!("{HELP}");
        println!("{}", "=".repeat(60));

        loop {
            prompt("\nYou: ")?;
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    self.interrupted(&mut lines).await?;
                    break;
                }
            };
            let Some(line) = line else { break };

            if self.handle(Command::parse(&line), &mut lines).await? == Flow::Exit {
                break;
            }
        }

        if self.scheduler.is_running().await {
            if let Err(e) = self.scheduler.shutdown().await {
                warn!(error = %e, "Scheduler shutdown failed");
            }
        }
        println!("Goodbye.");
        Ok(())
    }

    /// Apply one command; `lines` supplies follow-up answers
    pub async fn handle<R>(&mut self, command: Command, lines: &mut Lines<R>) -> anyhow::Result<Flow>
    where
        R: AsyncBufRead + Unpin,
    {
        match command {
            Command::Empty => {}
            Command::Exit => return Ok(Flow::Exit),
            Command::SaveAndExit => match self.save() {
                Ok(path) => {
                    println!("Conversation saved to {}", path.display());
                    return Ok(Flow::Exit);
                }
                Err(e) => println!("Could not save the conversation: {e}"),
            },
            Command::LoadHistory => {
                prompt("Path of the conversation file: ")?;
                let path = lines.next_line().await?.unwrap_or_default();
                self.load(Path::new(path.trim()));
            }
            Command::ClearHistory => {
                self.store.clear_history();
                println!("Conversation history cleared.");
            }
            Command::ShowHistory => {
                println!("\n--- Conversation summary ---");
                println!("{}", self.store.summary());
                println!("--- End ---");
            }
            Command::Stats => {
                println!("\n--- Conversation statistics ---");
                println!("{}", self.store.stats());
                println!("--- End ---");
            }
            Command::ListJobs => {
                let jobs = self.scheduler.list().await;
                if jobs.is_empty() {
                    println!("No scheduled jobs.");
                }
                for job in jobs {
                    let next = job
                        .next_run_time
                        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339());
                    println!("ID: {}, tool: {}, next run: {next}, trigger: {}", job.id, job.tool_name, job.trigger);
                }
            }
            Command::DeleteJob(id) => match self.scheduler.remove(&id).await {
                Ok(()) => println!("Job {id} removed."),
                Err(e) => println!("Could not remove job {id}: {e}"),
            },
            Command::Chat(text) => {
                prompt("Agent: thinking...")?;
                let response = tokio::select! {
                    response = self.driver.run_turn(&text, &mut self.store) => response,
                    _ = tokio::signal::ctrl_c() => {
                        self.interrupted(lines).await?;
                        return Ok(Flow::Exit);
                    }
                };
                println!("\rAgent: {response}");
            }
        }
        Ok(Flow::Continue)
    }

    async fn interrupted<R>(&mut self, lines: &mut Lines<R>) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        if self.store.close_unanswered_turn(INTERRUPTED_NOTE) {
            info!(session_id = %self.store.id(), "Turn interrupted before a reply");
        }
        prompt("\n\nInterrupted. Save conversation history? (y/n): ")?;
        let answer = lines.next_line().await?.unwrap_or_default();
        if answer.trim().eq_ignore_ascii_case("y") {
            match self.save() {
                Ok(path) => println!("Conversation saved to {}", path.display()),
                Err(e) => println!("Could not save the conversation: {e}"),
            }
        }
        Ok(())
    }

    fn save(&self) -> agent_core::Result<PathBuf> {
        self.store.save_to_dir(&self.session_dir)
    }

    fn load(&mut self, path: &Path) {
        if !path.is_file() {
            println!("File not found: {}", path.display());
            return;
        }
        match ConversationStore::try_load(path, self.store.max_history_length()) {
            Ok(store) => {
                info!(session_id = %store.id(), "Swapped in saved conversation");
                println!("Loaded {} messages from {}", store.len(), path.display());
                self.store = store;
            }
            Err(e) => println!("Could not load {}: {e}", path.display()),
        }
    }
}

fn prompt(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{text}")?;
    stdout.flush()
}
