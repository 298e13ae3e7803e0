//! Scripted invite sessions.
//!
//! One command per line:
//!
//! ```text
//! issue <handle>
//! redeem <handle> <token | $N>
//! list <handle>
//! link <token | $N>
//! ```
//!
//! `$N` is the N-th token issued in this session (1-based). Blank lines and
//! lines starting with `#` are skipped. Every command prints one JSON line.

use anyhow::{anyhow, bail, Context, Result};
use qrlink_invites::{InviteError, InviteLedger, InviteLinks};
use qrlink_types::{Handle, InviteToken};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRef {
    Literal(InviteToken),
    Issued(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Issue(Handle),
    Redeem(Handle, TokenRef),
    List(Handle),
    Link(TokenRef),
}

fn parse_token_ref(raw: &str) -> Result<TokenRef> {
    match raw.strip_prefix('$') {
        Some(index) => {
            let index: usize = index
                .parse()
                .with_context(|| format!("invalid token reference '{raw}'"))?;
            if index == 0 {
                bail!("token references start at $1");
            }
            Ok(TokenRef::Issued(index))
        }
        None => Ok(TokenRef::Literal(InviteToken::from(raw))),
    }
}

pub fn parse_line(line: &str) -> Result<Option<Command>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = line.split_whitespace().collect();
    let command = match parts.as_slice() {
        ["issue", handle] => Command::Issue(Handle::from(*handle)),
        ["redeem", handle, token] => Command::Redeem(Handle::from(*handle), parse_token_ref(token)?),
        ["list", handle] => Command::List(Handle::from(*handle)),
        ["link", token] => Command::Link(parse_token_ref(token)?),
        [verb, ..] => bail!("unrecognized command '{verb}' with {} argument(s)", parts.len() - 1),
        [] => return Ok(None),
    };
    Ok(Some(command))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands: usize,
    pub issued: usize,
    pub connected: usize,
    pub failures: usize,
}

pub struct Session<'a> {
    ledger: &'a InviteLedger,
    links: &'a InviteLinks,
    issued: Vec<InviteToken>,
    summary: SessionSummary,
}

impl<'a> Session<'a> {
    pub fn new(ledger: &'a InviteLedger, links: &'a InviteLinks) -> Self {
        Self {
            ledger,
            links,
            issued: Vec::new(),
            summary: SessionSummary::default(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    fn resolve(&self, token: &TokenRef) -> Result<InviteToken> {
        match token {
            TokenRef::Literal(token) => Ok(token.clone()),
            TokenRef::Issued(index) => index
                .checked_sub(1)
                .and_then(|i| self.issued.get(i))
                .cloned()
                .ok_or_else(|| anyhow!("${index} refers to an invite not issued yet")),
        }
    }

    /// Run one command. Invite and storage failures are reported in the
    /// returned JSON; only bad token references are errors, and those are
    /// not counted.
    pub fn execute(&mut self, command: &Command) -> Result<Value> {
        let value = match command {
            Command::Issue(issuer) => match self.ledger.issue(issuer) {
                Ok(token) => {
                    self.issued.push(token.clone());
                    self.summary.issued += 1;
                    json!({
                        "op": "issue",
                        "issuer": issuer,
                        "ref": format!("${}", self.issued.len()),
                        "token": token.as_str(),
                        "redeem_url": self.links.redeem_url(&token),
                        "qr_url": self.links.qr_url(&token),
                    })
                }
                Err(err) => self.failure("issue", &err),
            },
            Command::Redeem(redeemer, token) => {
                let token = self.resolve(token)?;
                match self.ledger.redeem(redeemer, &token) {
                    Ok(outcome) => {
                        if outcome.is_connected() {
                            self.summary.connected += 1;
                        }
                        json!({
                            "op": "redeem",
                            "redeemer": redeemer,
                            "outcome": outcome,
                            "next": self.links.connections_url(),
                        })
                    }
                    Err(err) => self.failure("redeem", &err),
                }
            }
            Command::List(handle) => match self.ledger.list_connections(handle) {
                Ok(connections) => json!({
                    "op": "list",
                    "handle": handle,
                    "connections": connections,
                }),
                Err(err) => self.failure("list", &err),
            },
            Command::Link(token) => {
                let token = self.resolve(token)?;
                json!({
                    "op": "link",
                    "redeem_url": self.links.redeem_url(&token),
                    "qr_url": self.links.qr_url(&token),
                })
            }
        };

        self.summary.commands += 1;
        Ok(value)
    }

    fn failure(&mut self, op: &str, err: &InviteError) -> Value {
        self.summary.failures += 1;
        let kind = match err {
            InviteError::InviteNotFound { .. } => "invite_not_found",
            InviteError::Resource(_) => "resource",
            InviteError::Storage(_) => "storage",
            InviteError::InvalidTokenLength { .. } => "config",
        };
        json!({
            "op": op,
            "error": kind,
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        })
    }
}

/// Execute every line of `input`, writing one JSON document per command.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session<'_>,
    input: R,
    mut output: W,
) -> Result<SessionSummary> {
    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("failed to read line {line_no}"))?;
        let Some(command) = parse_line(&line).with_context(|| format!("line {line_no}"))? else {
            continue;
        };
        debug!(line = line_no, ?command, "Executing");

        let value = session
            .execute(&command)
            .with_context(|| format!("line {line_no}"))?;
        writeln!(output, "{value}")?;
    }
    output.flush()?;
    Ok(session.summary())
}
