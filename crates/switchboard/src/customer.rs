// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Customer console: chat with the assistant, ask for a human, rate.

use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use switchboard_config::SwitchboardConfig;
use switchboard_core::{
    Actor, AssistantApi, CustomerId, HandoffStatus, PendingRating, RatingSubmission, Result,
    Role, SessionId, SessionMode, SwitchboardError, TransferOutcome,
};
use switchboard_handoff::{HandoffCoordinator, HandoffEvent, Reply, SessionSelection};
use switchboard_rating::RatingPrompter;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::commands::{self, Input};
use crate::console::{self, Connection, LineReader};

const HELP: &str = "\
  <text>                 talk in the current session
  /session <id>          switch session
  /human [reason]        ask for a human operator
  /cancel                withdraw a waiting request
  /end                   end the conversation with the operator
  /rate <1-5> [comment]  rate the finished conversation
  /later                 do not ask for a rating again
  /status                show the session mode
  /quit";

/// Stand-in for the AI assistant when no assistant service is wired in.
struct LocalAssistant;

#[async_trait]
impl AssistantApi for LocalAssistant {
    async fn ask(&self, _session_id: SessionId, text: &str) -> Result<String> {
        Ok(format!(
            "I could not find an answer to \"{text}\". Type /human to reach a person."
        ))
    }
}

struct CustomerConsole {
    selection: SessionSelection,
    coordinator: Arc<HandoffCoordinator>,
    prompter: Arc<RatingPrompter>,
    prompt: Mutex<Option<PendingRating>>,
}

pub async fn run(
    config: &SwitchboardConfig,
    id: CustomerId,
    session: Option<SessionId>,
    token: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let actor = Actor::customer(id);
    let store = console::open_store(config).await?;
    let selection = SessionSelection::new(actor, store.clone());
    let restored = selection.restore().await?;
    let current = match session.or(restored) {
        Some(session) => session,
        None => {
            return Err(SwitchboardError::Validation(
                "no session selected, pass --session".into(),
            ));
        }
    };
    selection.select(current).await?;

    let token = console::credentials(config, actor, token).await?;
    let conn = Connection::open(config, actor, token, store, Some(selection.accessor())).await?;

    let coordinator = Arc::new(HandoffCoordinator::spawn(
        conn.client.clone(),
        Some(Arc::new(LocalAssistant)),
    ));
    coordinator.attach(&conn.channels, Role::Customer)?;
    let prompter = Arc::new(RatingPrompter::new(conn.client.clone(), &config.rating));
    let follower = prompter.follow(coordinator.subscribe());

    let ui = CustomerConsole {
        selection,
        coordinator: Arc::clone(&coordinator),
        prompter: Arc::clone(&prompter),
        prompt: Mutex::new(None),
    };
    let printer = spawn_printer(&ui, cancel.clone());

    console::banner("switchboard customer", actor);
    ui.focus(current).await?;

    let mut input = LineReader::spawn(format!("{}> ", "you".green()))?;
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = input.next() => match line {
                Some(line) => line,
                None => break,
            },
        };
        match commands::parse(&line) {
            Ok(Some(Input::Quit)) => break,
            Ok(Some(Input::Help)) => println!("{HELP}"),
            Ok(Some(input)) => {
                if let Err(e) = ui.handle(input).await {
                    console::print_error(&e);
                }
            }
            Ok(None) => {}
            Err(e) => console::print_error(&e),
        }
    }

    cancel.cancel();
    prompter.shutdown();
    let _ = follower.await;
    let _ = printer.await;
    drop(ui);
    if let Ok(coordinator) = Arc::try_unwrap(coordinator) {
        coordinator.shutdown().await;
    }
    console::print_notice("goodbye");
    Ok(())
}

fn spawn_printer(console: &CustomerConsole, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut events = console.coordinator.subscribe();
    let mut prompts = console.prompter.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(HandoffEvent::Changed(update)) => print_status(update.request.status, update.mode, update.request.queue_position),
                    Ok(HandoffEvent::Text(text)) if text.sender == Some(Role::Operator) => {
                        println!("{} {}", "operator>".cyan(), text.content);
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                prompt = prompts.recv() => if let Ok(prompt) = prompt {
                    print_prompt(&prompt);
                },
            }
        }
    })
}

fn print_status(status: HandoffStatus, mode: SessionMode, queue_position: Option<u32>) {
    let line = match (status, queue_position) {
        (HandoffStatus::Pending | HandoffStatus::Assigned, Some(position)) => {
            format!("waiting for an operator, position {position}")
        }
        (HandoffStatus::Pending | HandoffStatus::Assigned, None) => "waiting for an operator".into(),
        (HandoffStatus::Accepted | HandoffStatus::InProgress, _) => "an operator joined the chat".into(),
        (HandoffStatus::FallbackTicket, _) => "no operator available, a ticket was opened".into(),
        (other, _) => format!("handoff {other}"),
    };
    console::print_notice(format!("[{mode}] {line}"));
}

fn print_prompt(prompt: &PendingRating) {
    println!(
        "{} {}",
        "How did we do?".bold(),
        "/rate <1-5> [comment], or /later".yellow()
    );
    if let Some(operator) = prompt.operator_id {
        console::print_notice(format!("you spoke with operator {operator}"));
    }
}

impl CustomerConsole {
    fn current(&self) -> Result<SessionId> {
        self.selection
            .current()
            .ok_or_else(|| SwitchboardError::Validation("no session selected".into()))
    }

    /// Watch the session and check for an outstanding rating.
    async fn focus(&self, session: SessionId) -> Result<()> {
        self.coordinator.watch(session);
        self.coordinator.settled().await;
        let pending = self.prompter.on_focus(session).await?;
        if let Some(prompt) = &pending {
            print_prompt(prompt);
        }
        *self.prompt.lock().await = pending;
        let mode = self.coordinator.mode(session);
        console::print_notice(format!("session {session}, {mode}"));
        Ok(())
    }

    async fn handle(&self, input: Input) -> Result<()> {
        match input {
            Input::Say(text) => {
                let session = self.current()?;
                match self.coordinator.send_text(session, text).await? {
                    Reply::Assistant(answer) => println!("{} {answer}", "assistant>".blue()),
                    Reply::Relayed => {}
                    Reply::Dropped => console::print_notice("not connected, message not sent"),
                }
            }
            Input::Session(session) => {
                if let Some(previous) = self.selection.current() {
                    self.coordinator.unwatch(previous);
                }
                self.selection.select(session).await?;
                self.focus(session).await?;
            }
            Input::Human(reason) => {
                let session = self.current()?;
                match self.coordinator.request_transfer(session, reason, None).await? {
                    TransferOutcome::Queued(request) => {
                        print_status(request.status, SessionMode::AiServed, request.queue_position);
                        if let Some(wait) = request.estimated_wait_seconds {
                            console::print_notice(format!("estimated wait {wait}s"));
                        }
                    }
                    TransferOutcome::Fallback { ticket_id, .. } => {
                        console::print_notice(format!(
                            "no operator is available right now, ticket {ticket_id} was opened"
                        ));
                    }
                }
            }
            Input::Cancel => {
                let session = self.current()?;
                let tracked = self.coordinator.tracked(session).ok_or_else(|| {
                    SwitchboardError::Validation("no handoff request to cancel".into())
                })?;
                self.coordinator.cancel(tracked.request.id).await?;
                console::print_notice("request cancelled");
            }
            Input::End => {
                self.coordinator.end_by_user(self.current()?).await?;
            }
            Input::Rate { score, comment } => {
                let prompt = self.prompt.lock().await.clone();
                let id = match prompt.and_then(|p| p.handoff_request_id) {
                    Some(id) => id,
                    None => {
                        let pending = self.prompter.on_focus(self.current()?).await?;
                        pending.and_then(|p| p.handoff_request_id).ok_or_else(|| {
                            SwitchboardError::Validation("nothing to rate in this session".into())
                        })?
                    }
                };
                let submission = RatingSubmission {
                    handoff_request_id: id,
                    score,
                    tags: Vec::new(),
                    comment,
                };
                self.prompter.submit(submission).await?;
                *self.prompt.lock().await = None;
                console::print_notice("thanks for the feedback");
            }
            Input::Later => {
                if let Some(id) = self.prompt.lock().await.take().and_then(|p| p.handoff_request_id) {
                    self.prompter.defer(id);
                }
            }
            Input::Status => {
                let session = self.current()?;
                let mode = self.coordinator.mode(session);
                match self.coordinator.tracked(session) {
                    Some(tracked) => print_status(tracked.request.status, mode, tracked.request.queue_position),
                    None => console::print_notice(format!("[{mode}] no handoff in session {session}")),
                }
            }
            other => {
                return Err(SwitchboardError::Validation(format!(
                    "{other:?} is not available to customers"
                )));
            }
        }
        Ok(())
    }
}
