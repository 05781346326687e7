// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor console: roster, overrides, broadcasts.

use std::sync::Arc;

use colored::Colorize;
use switchboard_config::SwitchboardConfig;
use switchboard_core::report::{LowScoreQuery, RatingProcess, RatingQuery, RatingRecord, RecordQuery};
use switchboard_core::wire::{BroadcastBody, NotificationQuery};
use switchboard_core::{
    Actor, HandoffApi, OperatorPresence, PresenceStatus, ReportApi, Result, Role, SwitchboardError,
};
use switchboard_notify::{BadgeStore, Notice, NotificationHub, Surface};
use switchboard_presence::PresenceBoard;
use switchboard_rest::RestClient;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::commands::{self, Input};
use crate::console::{self, Connection, LineReader};

const HELP: &str = "\
  /roster                                       operators and their load
  /force <operator> <online|away|offline>       override a status
  /broadcast <operators|supervisors|all> <title> | <content>
  /close <id>                                   close a handoff request
  /records                                      recent handoff records
  /trail <id>                                   event trail of a request
  /ratings | /stats | /trend [7|30|90] | /low   rating review
  /process <id> [note]                          mark a rating followed up
  /notes                                        list notifications
  /read                                         mark all notifications read
  /quit";

struct SupervisorConsole {
    client: Arc<RestClient>,
    board: PresenceBoard,
    hub: NotificationHub,
    _surface: Surface,
}

pub async fn run(
    config: &SwitchboardConfig,
    id: u64,
    token: Option<String>,
    cancel: CancellationToken,
) -> Result<()> {
    let actor = Actor::supervisor(id);
    let store = console::open_store(config).await?;
    let token = console::credentials(config, actor, token).await?;
    let conn = Connection::open(config, actor, token, store, None).await?;

    let board = PresenceBoard::new(conn.client.clone());
    board.attach(&conn.channels)?;
    let known = board.refresh().await?;

    let badge = Arc::new(BadgeStore::open(actor, Role::Supervisor, conn.store.clone()).await?);
    let hub = NotificationHub::new(conn.channels.clone(), badge, conn.client.clone());
    let surface = hub.attach_surface()?;

    let ui = SupervisorConsole {
        client: conn.client.clone(),
        board,
        hub,
        _surface: surface,
    };
    let printer = spawn_printer(&ui, cancel.clone());

    console::banner("switchboard supervisor", actor);
    console::print_notice(format!(
        "{known} operators known, {} online",
        ui.board.online_count()
    ));

    let mut input = LineReader::spawn(format!("{}> ", "sup".magenta()))?;
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
    let _ = printer.await;
    ui.hub.badge().flush().await;
    console::print_notice("goodbye");
    Ok(())
}

fn spawn_printer(ui: &SupervisorConsole, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    let mut notices = ui.hub.notices().subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                notice = notices.recv() => match notice {
                    Ok(Notice::Admin(note)) => println!("{} {}", "notice:".bold().magenta(), note.title),
                    Ok(Notice::HandoffOffered(_)) => {}
                    Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                },
            }
        }
    })
}

fn print_rating(r: &RatingRecord) {
    let score = r.score.map_or_else(|| "-".to_string(), |s| s.to_string());
    println!(
        "  #{:<6} {:<10} score {} operator {}{}",
        r.handoff_request_id.to_string(),
        r.status.to_string(),
        score,
        r.operator_id.map_or_else(|| "-".to_string(), |op| op.to_string()),
        r.comment.as_deref().map(|c| format!(": {c}")).unwrap_or_default()
    );
}

fn print_presence(p: &OperatorPresence) {
    let status = match p.status {
        PresenceStatus::Online => p.status.to_string().green(),
        PresenceStatus::Away => p.status.to_string().yellow(),
        PresenceStatus::Offline => p.status.to_string().dimmed(),
    };
    println!(
        "  {:<8} {:<10} {}/{} sessions{}",
        p.operator_id.to_string(),
        status,
        p.current_session_count,
        p.max_session_count,
        if p.senior { ", senior" } else { "" }
    );
}

impl SupervisorConsole {
    async fn handle(&self, input: Input) -> Result<()> {
        match input {
            Input::Roster => {
                let roster = self.board.snapshot();
                if roster.is_empty() {
                    console::print_notice("no operators registered");
                }
                for presence in roster.iter() {
                    print_presence(presence);
                }
            }
            Input::Force(operator, status) => {
                let presence = self.board.force_status(operator, status).await?;
                print_presence(&presence);
            }
            Input::Broadcast {
                audience,
                title,
                content,
            } => {
                let sent = self
                    .hub
                    .broadcast(BroadcastBody {
                        title,
                        content,
                        audience,
                    })
                    .await?;
                console::print_notice(format!("notification {} sent to {}", sent.id, sent.audience));
            }
            Input::Close(id) => {
                let request = self.client.close(id).await?;
                console::print_notice(format!("request #{} is {}", request.id, request.status));
            }
            Input::Records => {
                let records = self.client.records(RecordQuery::default()).await?;
                if records.is_empty() {
                    console::print_notice("no handoff records");
                }
                for r in records {
                    println!(
                        "  #{:<6} session {:<6} {:<15} operator {} wait {}s",
                        r.handoff_request_id.to_string(),
                        r.session_id.to_string(),
                        r.status.to_string(),
                        r.operator_id.map_or_else(|| "-".to_string(), |op| op.to_string()),
                        r.wait_seconds.unwrap_or_default()
                    );
                }
            }
            Input::Trail(id) => {
                for event in self.client.events(id).await? {
                    println!(
                        "  {} {:<10} {}{}",
                        event.created_at.format("%H:%M:%S"),
                        event.kind.to_string(),
                        event.party,
                        event.detail.map(|d| format!(" ({d})")).unwrap_or_default()
                    );
                }
            }
            Input::Ratings => {
                for rating in self.client.ratings(RatingQuery::default()).await? {
                    print_rating(&rating);
                }
            }
            Input::Stats => {
                let stats = self.client.rating_stats().await?;
                console::print_notice(format!(
                    "{} rated, average {:.2}, {:.0}% positive, {} negative",
                    stats.count, stats.average, stats.positive_rate, stats.negative
                ));
            }
            Input::Trend(days) => {
                for point in self.client.rating_trend(days).await? {
                    println!(
                        "  {} {:>3} rated, average {:.2}, {:.0}% positive",
                        point.date, point.rated_count, point.average, point.positive_rate
                    );
                }
            }
            Input::LowScores => {
                let low = self.client.low_scores(LowScoreQuery::default()).await?;
                if low.is_empty() {
                    console::print_notice("no low scores this week");
                }
                for rating in &low {
                    print_rating(rating);
                }
            }
            Input::Process(id, note) => {
                let rating = self.client.process_rating(id, RatingProcess { note }).await?;
                print_rating(&rating);
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
            other => {
                return Err(SwitchboardError::Validation(format!(
                    "{other:?} is not available to supervisors"
                )));
            }
        }
        Ok(())
    }
}
