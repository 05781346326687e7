// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator console: presence, the pending queue, and live conversations.

use std::sync::Arc;

use colored::Colorize;
use switchboard_config::SwitchboardConfig;
use switchboard_core::wire::NotificationQuery;
use switchboard_core::{
    Actor, HandoffApi, HandoffRequest, OperatorId, PresenceStatus, Result, Role, SessionMode,
    SwitchboardError,
};
use switchboard_handoff::{HandoffCoordinator, HandoffEvent, Reply};
use switchboard_notify::{BadgeStore, Notice, NotificationHub, Surface};
use switchboard_presence::PresenceTracker;
use switchboard_rest::RestClient;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::commands::{self, Input};
use crate::console::{self, Connection, LineReader};

const HELP: &str = "\
  /online | /away | /offline   change your status
  /queue                       requests waiting for pickup
  /accept <id>                 take a request
  /reject <id> [reason]        decline an offered request
  /reply <session> <text>      write to a customer
  /complete <id>               finish a conversation
  /notes                       list notifications
  /read                        mark all notifications read
  /quit";

struct OperatorConsole {
    client: Arc<RestClient>,
    presence: Arc<PresenceTracker>,
    coordinator: Arc<HandoffCoordinator>,
    hub: NotificationHub,
    _surface: Surface,
}

pub async fn run(
    config: &SwitchboardConfig,
    id: OperatorId,
    token: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let actor = Actor::operator(id);
    let store = console::open_store(config).await?;
    let token = console::credentials(config, actor, token).await?;
    let conn = Connection::open(config, actor, token, store, None).await?;

    let presence = Arc::new(PresenceTracker::new(
        id,
        conn.client.clone(),
        conn.store.clone(),
        &config.presence,
    ));
    let remembered = presence.restore().await?;
    presence.attach(&conn.channels)?;
    let heartbeat = presence.spawn_heartbeat();

    let coordinator = Arc::new(HandoffCoordinator::spawn(conn.client.clone(), None));
    coordinator.attach(&conn.channels, Role::Operator)?;

    let badge = Arc::new(BadgeStore::open(actor, Role::Operator, conn.store.clone()).await?);
    let hub = NotificationHub::new(conn.channels.clone(), badge, conn.client.clone());
    let surface = hub.attach_surface()?;

    let ui = OperatorConsole {
        client: conn.client.clone(),
        presence: Arc::clone(&presence),
        coordinator: Arc::clone(&coordinator),
        hub,
        _surface: surface,
    };
    let printer = spawn_printer(&ui, cancel.clone());

    console::banner("switchboard operator", actor);
    match remembered {
        // Restored status is only a hint; the operator confirms it.
        Some(status) => console::print_notice(format!(
            "last status was {status}, type /{} to resume",
            status.to_string().to_ascii_lowercase()
        )),
        None => console::print_notice("you are offline, type /online to take requests"),
    }
    if ui.hub.unread() > 0 {
        console::print_notice(format!("{} unread notifications", ui.hub.unread()));
    }

    let mut input = LineReader::spawn(format!("{}> ", "op".cyan()))?;
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
    presence.shutdown();
    let _ = heartbeat.await;
    let _ = printer.await;
    ui.hub.badge().flush().await;
    drop(ui);
    if let Ok(coordinator) = Arc::try_unwrap(coordinator) {
        coordinator.shutdown().await;
    }
    console::print_notice("goodbye");
    Ok(())
}

fn spawn_printer(ui: &OperatorConsole, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut events = ui.coordinator.subscribe();
    let mut notices = ui.hub.notices().subscribe();
    let mut presence = ui.presence.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(HandoffEvent::Changed(update)) => console::print_notice(format!(
                        "request #{} in session {} is now {}",
                        update.request.id, update.session_id, update.request.status
                    )),
                    Ok(HandoffEvent::Text(text)) if text.sender == Some(Role::Customer) => {
                        println!("{} {}", format!("session {}>", text.session_id).green(), text.content);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
                notice = notices.recv() => match notice {
                    Ok(Notice::HandoffOffered(offer)) => println!(
                        "{} #{} from session {} ({}){}",
                        "new request".bold().yellow(),
                        offer.handoff_request_id,
                        offer.session_id,
                        offer.priority,
                        offer.reason.map(|r| format!(": {r}")).unwrap_or_default()
                    ),
                    Ok(Notice::Admin(note)) => println!("{} {}", "notice:".bold().magenta(), note.title),
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
                changed = presence.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = presence.borrow_and_update().clone();
                    if let Some(current) = current {
                        console::print_notice(format!(
                            "status {} ({}/{} sessions)",
                            current.status, current.current_session_count, current.max_session_count
                        ));
                    }
                }
            }
        }
    })
}

fn print_request(request: &HandoffRequest) {
    println!(
        "  #{:<5} session {:<6} {:<12} {:<8} {}",
        request.id,
        request.session_id,
        request.status.to_string(),
        request.priority.to_string(),
        request.reason.as_deref().unwrap_or("-")
    );
}

impl OperatorConsole {
    async fn handle(&self, input: Input) -> Result<()> {
        match input {
            Input::Presence(status) => {
                let change = self.presence.request_status(status);
                let confirmed = change.confirm().await?;
                if confirmed.status == PresenceStatus::Online {
                    console::print_notice("you will be offered new requests");
                }
            }
            Input::Queue => {
                let queue = self.client.pending_queue().await?;
                if queue.is_empty() {
                    console::print_notice("the queue is empty");
                }
                for request in &queue {
                    print_request(request);
                }
            }
            Input::Accept(id) => {
                let request = self.coordinator.accept(id).await?;
                console::print_notice(format!(
                    "talking with session {}, /reply {} <text>",
                    request.session_id, request.session_id
                ));
            }
            Input::Reject(id, reason) => {
                self.coordinator.reject(id, reason).await?;
            }
            Input::Complete(id) => {
                self.coordinator.complete(id).await?;
            }
            Input::Reply(session, text) => {
                if self.coordinator.mode(session) != SessionMode::HumanServed {
                    return Err(SwitchboardError::Validation(format!(
                        "session {session} is not in a live conversation with you"
                    )));
                }
                match self.coordinator.send_text(session, text).await? {
                    Reply::Dropped => console::print_notice("not connected, message not sent"),
                    Reply::Relayed | Reply::Assistant(_) => {}
                }
            }
            Input::Notes => {
                self.hub.enter_view();
                let notes = self.hub.list(NotificationQuery::default()).await?;
                if notes.is_empty() {
                    console::print_notice("no notifications");
                }
                for note in notes {
                    let marker = if note.read { " " } else { "*" };
                    println!("{marker} {} {}: {}", note.created_at.format("%H:%M"), note.title, note.content);
                }
            }
            Input::Read => {
                let changed = self.hub.mark_all_read().await?;
                console::print_notice(format!("{changed} marked read"));
            }
            Input::Status => match self.presence.presence() {
                Some(p) => console::print_notice(format!(
                    "{} with {}/{} sessions, {} live here",
                    p.status,
                    p.current_session_count,
                    p.max_session_count,
                    self.coordinator.live_count()
                )),
                None => console::print_notice("status unknown until you go /online"),
            },
            other => {
                return Err(SwitchboardError::Validation(format!(
                    "{other:?} is not available to operators"
                )));
            }
        }
        Ok(())
    }
}
