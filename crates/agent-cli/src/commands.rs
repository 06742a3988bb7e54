//! Console commands recognised before input reaches the agent.

/// One line of console input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Save the conversation and exit
    SaveAndExit,
    /// Prompt for a file and replace the conversation with it
    LoadHistory,
    ClearHistory,
    ShowHistory,
    Stats,
    /// List scheduled jobs
    ListJobs,
    /// Remove a scheduled job
    DeleteJob(String),
    /// Exit without saving
    Exit,
    /// Anything else goes to the agent
    Chat(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            "" => Self::Empty,
            "exithistory" => Self::SaveAndExit,
            "loadhistory" => Self::LoadHistory,
            "clearhistory" => Self::ClearHistory,
            "showhistory" => Self::ShowHistory,
            "stats" => Self::Stats,
            "list" => Self::ListJobs,
            "exit" | "quit" => Self::Exit,
            _ => match line.strip_prefix("delete ") {
                Some(id) if !id.trim().is_empty() => Self::DeleteJob(id.trim().to_string()),
                _ => Self::Chat(line.to_string()),
            },
        }
    }
}

pub const HELP: &str = "\
Commands:
  exithistory      save the conversation and exit
  loadhistory      load a saved conversation
  clearhistory     clear the conversation
  showhistory      show a summary of the conversation
  stats            show conversation statistics
  list             list scheduled jobs
  delete <job_id>  remove a scheduled job
  exit | quit      exit without saving";
