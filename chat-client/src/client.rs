use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    select,
    sync::mpsc,
};
use tracing::{info, warn};

use crate::{
    cli::Cli,
    config::SessionConfig,
    input::{UserInput, image_extension},
    message::{ChatMessage, Payload, unix_timestamp},
    session::{Session, SessionTask},
};

/// How long `/quit` waits for queued messages before closing anyway.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

pub async fn run(cli: Cli) -> Result<()> {
    // `next_line` keeps partial input buffered when another select branch wins.
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let nickname = if cli.needs_nickname() {
        Some(prompt_nickname(&mut stdin).await?)
    } else {
        None
    };
    let config = cli
        .session_config(nickname)
        .context("invalid session configuration")?;

    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let (session, mut task) = Session::connect(config.clone(), move |message: ChatMessage| {
        // The receiver only goes away once the client loop has exited.
        let _ = inbound_tx.send(message);
    });

    if let Err(error) = wait_until_active(&session, &mut task, &config).await {
        session.close();
        return Err(error);
    }
    info!(endpoint = %config.url(), "connected");

    let result = run_client_loop(
        &session,
        &mut task,
        &mut inbound_rx,
        &mut stdin,
        &config.sender,
        cli.download_dir.as_deref(),
    )
    .await;

    if !task.is_finished() {
        if tokio::time::timeout(FLUSH_TIMEOUT, session.flush()).await.is_err() {
            warn!(queued = session.queued(), "gave up waiting for queued messages");
        }
        session.close();
        let _ = tokio::time::timeout(FLUSH_TIMEOUT, &mut task).await;
    }
    result
}

async fn prompt_nickname(stdin: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    write_prompt("Enter your nickname : ").await?;
    let line = stdin
        .next_line()
        .await
        .context("failed to read nickname")?
        .context("stdin closed before a nickname was entered")?;
    Ok(line.trim().to_string())
}

async fn wait_until_active(
    session: &Session,
    task: &mut SessionTask,
    config: &SessionConfig,
) -> Result<()> {
    select! {
        active = session.wait_active() => {
            if active.is_ok() {
                return Ok(());
            }
            // Closed before becoming active; the task carries the reason.
            finished_session(task.await).with_context(|| format!("could not join {}", config.url()))
        }
        outcome = &mut *task => {
            finished_session(outcome).with_context(|| format!("could not join {}", config.url()))
        }
    }
}

async fn run_client_loop(
    session: &Session,
    task: &mut SessionTask,
    inbound: &mut mpsc::UnboundedReceiver<ChatMessage>,
    stdin: &mut Lines<BufReader<Stdin>>,
    sender: &str,
    download_dir: Option<&Path>,
) -> Result<()> {
    loop {
        select! {
            Some(message) = inbound.recv() => {
                render_message(message, download_dir).await?;
            }
            line = stdin.next_line() => {
                if !handle_stdin_input(line, session, sender).await? {
                    break;
                }
            }
            outcome = &mut *task => {
                // Show whatever arrived before the connection went away.
                while let Ok(message) = inbound.try_recv() {
                    render_message(message, download_dir).await?;
                }
                write_stdout("*** connection closed").await?;
                return finished_session(outcome);
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }
    Ok(())
}

async fn handle_stdin_input(
    line: io::Result<Option<String>>,
    session: &Session,
    sender: &str,
) -> Result<bool> {
    let Some(input) = line? else {
        return Ok(false);
    };

    let parsed = match UserInput::parse(&input) {
        Ok(parsed) => parsed,
        Err(error) => {
            write_stderr(&format!("!!! {error}")).await?;
            return Ok(true);
        }
    };

    let message = match parsed {
        UserInput::Empty => return Ok(true),
        UserInput::Quit => {
            write_stdout("*** leaving chat").await?;
            return Ok(false);
        }
        UserInput::Text(text) => ChatMessage::text(sender, unix_timestamp(), text)?,
        UserInput::Image(path) => match load_image(sender, &path).await {
            Ok(message) => message,
            Err(error) => {
                write_stderr(&format!("!!! {error:#}")).await?;
                return Ok(true);
            }
        },
    };

    if let Err(error) = session.send(message) {
        write_stderr(&format!("!!! message not sent: {error}")).await?;
    }
    Ok(true)
}

async fn load_image(sender: &str, path: &Path) -> Result<ChatMessage> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read image {}", path.display()))?;
    Ok(ChatMessage::image(
        sender,
        unix_timestamp(),
        image_extension(path),
        data,
    )?)
}

fn finished_session(
    outcome: Result<Result<(), crate::SessionError>, tokio::task::JoinError>,
) -> Result<()> {
    outcome.context("session task panicked")??;
    Ok(())
}

async fn render_message(message: ChatMessage, download_dir: Option<&Path>) -> Result<()> {
    let sender = message.sender().to_string();
    let timestamp = message.timestamp();
    match message.into_payload() {
        Payload::Text(text) => write_stdout(&format!("<{sender}> {text}")).await?,
        Payload::Image { extension, data } => {
            let mut line = format!("<{sender}> [image .{extension}, {} bytes]", data.len());
            let mut failure = None;
            if let Some(dir) = download_dir {
                match save_image(dir, &sender, timestamp, &extension, &data).await {
                    Ok(path) => line.push_str(&format!(" saved to {}", path.display())),
                    Err(error) => failure = Some(error),
                }
            }
            write_stdout(&line).await?;
            if let Some(error) = failure {
                write_stderr(&format!("!!! image not saved: {error:#}")).await?;
            }
        }
    }
    Ok(())
}

async fn save_image(
    dir: &Path,
    sender: &str,
    timestamp: u32,
    extension: &str,
    data: &[u8],
) -> Result<PathBuf> {
    let safe_sender: String = sender
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let safe_extension: String = extension.chars().filter(char::is_ascii_alphanumeric).collect();
    let extension = if safe_extension.is_empty() { "bin" } else { &safe_extension };

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{safe_sender}-{timestamp}.{extension}"));
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("failed to save image to {}", path.display()))?;
    Ok(path)
}

async fn write_prompt(prompt: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
