use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::io::{AsyncBufRead, Lines};

use crate::gateway::{Session, SessionSnapshot};
use crate::settings::{Settings, Status};
use crate::voice::{self, ToggleOutcome};

const HELP: &str = "\
commands:
  show                 print the session summary (also: empty line)
  voice                toggle auto-join of the configured voice channel
  channel <id>         set the voice channel id
  status <status>      online | idle | dnd | invisible
  custom [text]        set the custom status, no text clears it
  quit                 leave voice, disconnect and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show,
    Help,
    ToggleVoice,
    SetChannel(String),
    SetStatus(Status),
    SetCustomStatus(String),
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "" | "show" => Ok(Command::Show),
            "help" | "?" => Ok(Command::Help),
            "voice" => Ok(Command::ToggleVoice),
            "channel" if rest.is_empty() => Err("usage: channel <id>".to_string()),
            "channel" => Ok(Command::SetChannel(rest.to_string())),
            "status" => rest.parse().map(Command::SetStatus),
            "custom" => Ok(Command::SetCustomStatus(rest.to_string())),
            "quit" | "exit" | "logout" => Ok(Command::Quit),
            other => Err(format!("unknown command '{other}', try 'help'")),
        }
    }
}

/// Memory and CPU usage of this process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessUsage {
    pub memory_mb: u64,
    pub cpu_percent: f32,
}

/// Samples [`ProcessUsage`] for the current process. CPU usage is measured
/// between two samples, so the first one reads 0%.
pub struct ProcessMonitor {
    system: System,
    pid: Option<Pid>,
}

impl ProcessMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    pub fn sample(&mut self) -> Option<ProcessUsage> {
        let pid = self.pid?;
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            false,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        let process = self.system.process(pid)?;
        Some(ProcessUsage {
            memory_mb: process.memory() / 1024 / 1024,
            cpu_percent: process.cpu_usage(),
        })
    }
}

impl Default for ProcessMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Read commands from `lines` until `quit` or end of input.
pub async fn run<R>(session: Session, mut lines: Lines<R>)
where
    R: AsyncBufRead + Unpin,
{
    let mut monitor = ProcessMonitor::new();
    render(&session, &mut monitor).await;
    println!("{HELP}");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read from stdin: {e}");
                break;
            }
        };

        match Command::parse(&line) {
            Ok(Command::Quit) => {
                println!("logging out...");
                break;
            }
            Ok(command) => execute(&session, command, &mut monitor).await,
            Err(msg) => println!("{msg}"),
        }
    }
}

async fn execute(session: &Session, command: Command, monitor: &mut ProcessMonitor) {
    match command {
        Command::Show => render(session, monitor).await,
        Command::Help => println!("{HELP}"),
        Command::ToggleVoice => {
            let settings = session.settings().get();
            if !settings.auto_join_voice && settings.voice_channel_id.is_empty() {
                println!("no voice channel id configured, use 'channel <id>' first");
                return;
            }
            match voice::toggle(session, Some(&settings.voice_channel_id)).await {
                ToggleOutcome::Connected => println!("voice enabled, join requested"),
                ToggleOutcome::Disabled => println!("voice disabled"),
                ToggleOutcome::MissingChannel => println!("no voice channel id configured"),
                ToggleOutcome::Failed(e) => println!("voice toggle failed: {e}"),
            }
        }
        Command::SetChannel(id) => match voice::switch_channel(session, &id).await {
            Ok(()) => println!("voice channel id set to {id}"),
            Err(e) => println!("voice channel id saved, but rejoining failed: {e}"),
        },
        Command::SetStatus(status) => match crate::presence::set_status(session, status).await {
            Ok(_) => println!("status set to {status}"),
            Err(e) => println!("failed to save status: {e}"),
        },
        Command::SetCustomStatus(text) => {
            match crate::presence::set_custom_status(session, &text).await {
                Ok(_) if text.is_empty() => println!("custom status cleared"),
                Ok(_) => println!("custom status set"),
                Err(e) => println!("failed to save custom status: {e}"),
            }
        }
        Command::Quit => {}
    }
}

async fn render(session: &Session, monitor: &mut ProcessMonitor) {
    let snapshot = session.snapshot().await;
    let settings = session.settings().get();
    let usage = monitor.sample();
    println!(
        "{}",
        summary(session.user().username.as_str(), &snapshot, &settings, usage)
    );
}

pub fn summary(
    username: &str,
    snapshot: &SessionSnapshot,
    settings: &Settings,
    usage: Option<ProcessUsage>,
) -> String {
    let uptime = snapshot.uptime().num_seconds().max(0);
    let mut out = format!(
        "[{}] {} | state {} | uptime {:02}:{:02}:{:02}",
        if snapshot.connected { "CONNECTED" } else { "DISCONNECTED" },
        username,
        snapshot.state.as_str(),
        uptime / 3600,
        (uptime / 60) % 60,
        uptime % 60,
    );
    if let Some(usage) = usage {
        out.push_str(&format!(
            " | ram {} MB | cpu {:.0}%",
            usage.memory_mb, usage.cpu_percent
        ));
    }
    out.push('\n');
    out.push_str(&format!(
        "status {} | custom {}\n",
        settings.status,
        if settings.custom_status.is_empty() {
            "none"
        } else {
            settings.custom_status.as_str()
        }
    ));
    out.push_str(&format!(
        "voice {} | channel {}\n",
        if settings.auto_join_voice { "ON" } else { "OFF" },
        if settings.voice_channel_id.is_empty() {
            "none"
        } else {
            settings.voice_channel_id.as_str()
        }
    ));

    if settings.auto_join_voice && settings.voice_channel_id.is_empty() {
        out.push_str("warning: voice is on but no voice channel id is configured");
    } else if snapshot.voice_connected {
        out.push_str("voice channel: connected");
    } else {
        out.push_str("voice channel: disconnected");
    }
    out
}
