// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console input parsing shared by the customer, operator and supervisor
//! consoles. Lines not starting with `/` are chat text.

use switchboard_core::{
    Audience, OperatorId, PresenceStatus, RequestId, Result, SessionId, SwitchboardError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Say(String),
    Human(Option<String>),
    Cancel,
    End,
    Rate { score: u8, comment: Option<String> },
    Later,
    Session(SessionId),
    Status,
    Presence(PresenceStatus),
    Queue,
    Accept(RequestId),
    Reject(RequestId, Option<String>),
    Complete(RequestId),
    Close(RequestId),
    Reply(SessionId, String),
    Notes,
    Read,
    Roster,
    Force(OperatorId, PresenceStatus),
    Broadcast {
        audience: Audience,
        title: String,
        content: String,
    },
    Records,
    Trail(RequestId),
    Ratings,
    Stats,
    Trend(u32),
    LowScores,
    Process(RequestId, Option<String>),
    Help,
    Quit,
}

fn invalid(message: impl Into<String>) -> SwitchboardError {
    SwitchboardError::Validation(message.into())
}

fn number(word: Option<&str>, what: &str) -> Result<u64> {
    let word = word.ok_or_else(|| invalid(format!("missing {what}")))?;
    word.trim_start_matches('#')
        .parse()
        .map_err(|_| invalid(format!("`{word}` is not a valid {what}")))
}

fn rest(words: &[&str]) -> Option<String> {
    (!words.is_empty()).then(|| words.join(" "))
}

fn audience(word: Option<&str>) -> Result<Audience> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        Some("operators") => Ok(Audience::Operators),
        Some("supervisors") => Ok(Audience::Supervisors),
        Some("all") => Ok(Audience::All),
        Some(other) => Err(invalid(format!(
            "unknown audience `{other}`, expected operators, supervisors or all"
        ))),
        None => Err(invalid("missing audience")),
    }
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Input::Say(line.to_string())));
    };

    let words: Vec<&str> = command.split_whitespace().collect();
    let (name, args) = match words.split_first() {
        Some((name, args)) => (name.to_ascii_lowercase(), args),
        None => return Err(invalid("empty command, try /help")),
    };

    let input = match name.as_str() {
        "human" => Input::Human(rest(args)),
        "cancel" => Input::Cancel,
        "end" => Input::End,
        "rate" => {
            let score = number(args.first().copied(), "score")?;
            let score = u8::try_from(score).map_err(|_| invalid("score must be 1-5"))?;
            Input::Rate {
                score,
                comment: rest(args.get(1..).unwrap_or_default()),
            }
        }
        "later" => Input::Later,
        "session" => Input::Session(SessionId(number(args.first().copied(), "session id")?)),
        "status" => Input::Status,
        "online" => Input::Presence(PresenceStatus::Online),
        "away" => Input::Presence(PresenceStatus::Away),
        "offline" => Input::Presence(PresenceStatus::Offline),
        "queue" => Input::Queue,
        "accept" => Input::Accept(RequestId(number(args.first().copied(), "request id")?)),
        "reject" => Input::Reject(
            RequestId(number(args.first().copied(), "request id")?),
            rest(args.get(1..).unwrap_or_default()),
        ),
        "complete" => Input::Complete(RequestId(number(args.first().copied(), "request id")?)),
        "close" => Input::Close(RequestId(number(args.first().copied(), "request id")?)),
        "reply" => {
            let session = SessionId(number(args.first().copied(), "session id")?);
            let text = rest(args.get(1..).unwrap_or_default())
                .ok_or_else(|| invalid("nothing to send"))?;
            Input::Reply(session, text)
        }
        "notes" => Input::Notes,
        "read" => Input::Read,
        "roster" => Input::Roster,
        "force" => {
            let operator = OperatorId(number(args.first().copied(), "operator id")?);
            let status = args
                .get(1)
                .ok_or_else(|| invalid("missing status"))?
                .parse::<PresenceStatus>()
                .map_err(|_| invalid("status must be online, away or offline"))?;
            Input::Force(operator, status)
        }
        "broadcast" => {
            let audience = audience(args.first().copied())?;
            let body = rest(args.get(1..).unwrap_or_default())
                .ok_or_else(|| invalid("usage: /broadcast <audience> <title> | <content>"))?;
            let (title, content) = body
                .split_once('|')
                .map(|(t, c)| (t.trim().to_string(), c.trim().to_string()))
                .unwrap_or_else(|| (body.clone(), String::new()));
            if title.is_empty() {
                return Err(invalid("broadcast title is empty"));
            }
            Input::Broadcast {
                audience,
                title,
                content,
            }
        }
        "records" => Input::Records,
        "trail" => Input::Trail(RequestId(number(args.first().copied(), "request id")?)),
        "ratings" => Input::Ratings,
        "stats" => Input::Stats,
        "trend" => match args.first() {
            Some(_) => {
                let days = number(args.first().copied(), "day count")?;
                Input::Trend(u32::try_from(days).map_err(|_| invalid("day count is too large"))?)
            }
            None => Input::Trend(7),
        },
        "low" => Input::LowScores,
        "process" => Input::Process(
            RequestId(number(args.first().copied(), "request id")?),
            rest(args.get(1..).unwrap_or_default()),
        ),
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => return Err(invalid(format!("unknown command /{other}, try /help"))),
    };
    Ok(Some(input))
}
