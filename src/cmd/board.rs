//! Board commands. Each one loads the board, acts through `BoardManager`,
//! and prints the result.

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use taskboard::board::{Board, BoardEvent, BoardManager, HttpTaskStore, Session, TaskDraft};
use taskboard::config::ClientConfig;
use taskboard::models::{Lane, TaskId};

/// Fields changed by `taskboard edit`; `None` keeps the current value.
#[derive(Debug, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<String>,
}

pub(crate) fn require_token(token: Option<String>) -> Result<Session> {
    match token {
        Some(token) if !token.trim().is_empty() => Ok(Session::from_token(token.trim())),
        _ => bail!("No token. Pass --token or set TASKBOARD_TOKEN (see `taskboard login`)."),
    }
}

async fn connect(client: &ClientConfig, token: Option<String>) -> Result<BoardManager> {
    let session = require_token(token)?;
    let store = HttpTaskStore::with_timeout(&client.base_url, session, client.request_timeout())?;
    let manager = BoardManager::new(Arc::new(store));
    manager.load().await.context("Failed to load the board")?;
    Ok(manager)
}

pub async fn cmd_board(client: &ClientConfig, token: Option<String>) -> Result<()> {
    let manager = connect(client, token).await?;
    print!("{}", render(&manager.board()));
    Ok(())
}

pub async fn cmd_add(
    client: &ClientConfig,
    token: Option<String>,
    title: String,
    description: String,
    assigned_to: String,
) -> Result<()> {
    let manager = connect(client, token).await?;
    let draft = TaskDraft {
        title,
        description,
        assigned_to,
        status: None,
    };
    manager
        .submit_form(draft, None)
        .await
        .context("Failed to create task")?;
    print!("{}", render(&manager.board()));
    Ok(())
}

pub async fn cmd_edit(
    client: &ClientConfig,
    token: Option<String>,
    id: &str,
    edit: TaskEdit,
) -> Result<()> {
    let manager = connect(client, token).await?;
    let id = TaskId::from(id);
    let Some(mut draft) = manager.edit_task(&id) else {
        bail!("No task with id {}", id);
    };
    if let Some(title) = edit.title {
        draft.title = title;
    }
    if let Some(description) = edit.description {
        draft.description = description;
    }
    if let Some(assigned_to) = edit.assigned_to {
        draft.assigned_to = assigned_to;
    }
    manager
        .submit_form(draft, Some(id))
        .await
        .context("Failed to update task")?;
    print!("{}", render(&manager.board()));
    Ok(())
}

pub async fn cmd_move(
    client: &ClientConfig,
    token: Option<String>,
    id: &str,
    to: Lane,
    index: Option<usize>,
) -> Result<()> {
    let manager = connect(client, token).await?;
    let id = TaskId::from(id);
    let board = manager.board();
    let Some((from, index_from)) = board.find(&id) else {
        bail!("No task with id {}", id);
    };
    let index_to = index.unwrap_or_else(|| {
        let len = board.lane(to).len();
        if from == to { len.saturating_sub(1) } else { len }
    });

    let mut events = manager.subscribe();
    let Some(ticket) = manager.relocate(from, index_from, to, index_to)? else {
        println!("Task {} is already there.", id);
        return Ok(());
    };
    ticket
        .handle
        .await
        .context("Persist task panicked")?;

    if manager.is_out_of_sync(&id) {
        let mut reason = String::from("unknown error");
        while let Ok(event) = events.try_recv() {
            if let BoardEvent::PersistFailed {
                correlation,
                message,
                ..
            } = event
            {
                if correlation == ticket.correlation {
                    reason = message;
                }
            }
        }
        bail!("Move of {} was not saved: {}", id, reason);
    }
    print!("{}", render(&manager.board()));
    Ok(())
}

pub async fn cmd_rm(client: &ClientConfig, token: Option<String>, id: &str) -> Result<()> {
    let manager = connect(client, token).await?;
    manager
        .remove_task(&TaskId::from(id))
        .await
        .context("Failed to delete task")?;
    print!("{}", render(&manager.board()));
    Ok(())
}

/// Lanes in display order, one task per line.
fn render(board: &Board) -> String {
    let mut out = String::new();
    for lane in Lane::ALL {
        let tasks = board.lane(lane);
        let _ = writeln!(out, "{} ({})", lane, tasks.len());
        for task in tasks {
            let _ = write!(out, "  {}  {}", task.id, task.title);
            if !task.assigned_to.is_empty() {
                let _ = write!(out, "  @{}", task.assigned_to);
            }
            out.push('\n');
        }
    }
    out
}
