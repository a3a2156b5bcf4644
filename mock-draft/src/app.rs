// Command-line driver: seeds the configured event, parses commands, and runs
// them against the draft service.
//
// Commands arrive on an mpsc channel and replies go back out on another, the
// same shape as an interactive front end would use. Every `DraftUpdate` is
// published on a broadcast channel so observers (the update logger, tests)
// see changes without the engine knowing about them.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::draft::event::DraftEvent;
use crate::draft::pick::{PlayerId, TeamId};
use crate::draft::state::DraftUpdate;
use crate::error::DraftError;
use crate::prediction::submission::SubmissionUpdate;
use crate::service::{DraftService, ServiceError, ServiceResult};
use crate::store::EventStore;

// ---------------------------------------------------------------------------
// Player pool CSV
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlayerRow {
    name: String,
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    note: Option<String>,
}

/// A player to seed into the pool.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSeed {
    pub name: String,
    pub group: Option<String>,
    pub note: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load_players_from_reader<R: Read>(rdr: R) -> Result<Vec<PlayerSeed>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut players = Vec::new();
    for result in reader.deserialize::<PlayerRow>() {
        match result {
            Ok(row) if row.name.trim().is_empty() => {
                warn!("skipping player row with a blank name");
            }
            Ok(row) => players.push(PlayerSeed {
                name: row.name.trim().to_string(),
                group: non_blank(row.group),
                note: non_blank(row.note),
            }),
            Err(e) => warn!("skipping malformed player row: {}", e),
        }
    }
    Ok(players)
}

/// Load the player pool from a `name,group,note` CSV file.
pub fn load_players(path: &Path) -> anyhow::Result<Vec<PlayerSeed>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open player file {}", path.display()))?;
    load_players_from_reader(file)
        .with_context(|| format!("failed to read player file {}", path.display()))
}

/// Create the configured event with its teams and player pool unless it is
/// already stored. Returns `true` when the event was created.
pub fn seed_event<S: EventStore>(
    service: &DraftService<S>,
    config: &Config,
    players: &[PlayerSeed],
) -> ServiceResult<bool> {
    let event_id = config.event.id.as_str();
    match service.event(event_id) {
        Ok(_) => {
            info!("Event {} already stored, skipping seed", event_id);
            return Ok(false);
        }
        Err(ServiceError::Draft(DraftError::NotFound { .. })) => {}
        Err(e) => return Err(e),
    }

    let mut event = DraftEvent::new(event_id, config.event.name.as_str());
    event.prediction_deadline = config.event.prediction_deadline;
    service.create_event(event)?;

    for team in &config.event.teams {
        service.add_team(event_id, &team.name, &team.captains)?;
    }
    for player in players {
        service.add_player(
            event_id,
            &player.name,
            player.group.clone(),
            player.note.clone(),
        )?;
    }
    info!(
        "Seeded event {} with {} teams and {} players",
        event_id,
        config.event.teams.len(),
        players.len()
    );
    Ok(true)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Open,
    /// Start the draft with the teams in the given order (all teams, in
    /// registration order, when empty).
    Init(Vec<String>),
    Pick {
        player: String,
        team: Option<String>,
    },
    Undo,
    Pause,
    Resume,
    Close,
    Reset,
    Predict {
        participant: String,
        path: PathBuf,
    },
    Score(String),
    Leaderboard,
    Stats,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

impl Command {
    /// Parse one input line.
    ///
    /// `pick` takes the player's name or id, optionally followed by
    /// `@<team>` to assign the pick to a team other than the one on the clock.
    pub fn parse(line: &str) -> Result<Command, CommandError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let cmd = match word.to_ascii_lowercase().as_str() {
            "" => return Err(CommandError::Empty),
            "status" => Command::Status,
            "open" => Command::Open,
            "init" => Command::Init(rest.split_whitespace().map(str::to_string).collect()),
            "pick" => {
                let (player, team) = match rest.rsplit_once('@') {
                    Some((player, team)) => (player.trim(), Some(team.trim())),
                    None => (rest, None),
                };
                if player.is_empty() || team.is_some_and(str::is_empty) {
                    return Err(CommandError::Usage("pick <player> [@team]"));
                }
                Command::Pick {
                    player: player.to_string(),
                    team: team.map(str::to_string),
                }
            }
            "undo" => Command::Undo,
            "pause" => Command::Pause,
            "resume" => Command::Resume,
            "close" => Command::Close,
            "reset" => Command::Reset,
            "predict" => match rest.split_once(char::is_whitespace) {
                Some((participant, path)) if !path.trim().is_empty() => Command::Predict {
                    participant: participant.to_string(),
                    path: PathBuf::from(path.trim()),
                },
                _ => return Err(CommandError::Usage("predict <participant> <json-file>")),
            },
            "score" => {
                if rest.is_empty() {
                    return Err(CommandError::Usage("score <participant>"));
                }
                Command::Score(rest.to_string())
            }
            "leaderboard" => Command::Leaderboard,
            "stats" => Command::Stats,
            "help" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(cmd)
    }
}

const HELP: &str = "\
commands:
  status                        show draft progress
  open                          open the event for predictions
  init [team ...]               start the draft (teams in round-1 order)
  pick <player> [@team]         record a pick
  undo                          remove the latest pick
  pause | resume                pause or resume drafting
  close                         archive the event
  reset                         discard the draft and reopen predictions
  predict <participant> <file>  save a prediction from a JSON file
  score <participant>           score one prediction
  leaderboard                   rank all predictions
  stats                         field-wide prediction accuracy
  quit";

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Runs commands for one event and publishes the resulting updates.
pub struct App<S> {
    service: DraftService<S>,
    event_id: String,
    updates: broadcast::Sender<DraftUpdate>,
}

impl<S: EventStore> App<S> {
    pub fn new(
        service: DraftService<S>,
        event_id: impl Into<String>,
        updates: broadcast::Sender<DraftUpdate>,
    ) -> Self {
        App {
            service,
            event_id: event_id.into(),
            updates,
        }
    }

    pub fn service(&self) -> &DraftService<S> {
        &self.service
    }

    fn publish(&self, update: DraftUpdate) -> String {
        let reply = describe_update(&update);
        // No receivers just means nobody is watching.
        let _ = self.updates.send(update);
        reply
    }

    /// Execute one command and return the text to show the user.
    pub fn handle(&self, cmd: Command) -> ServiceResult<String> {
        let id = self.event_id.as_str();
        match cmd {
            Command::Status => self.status(),
            Command::Open => {
                self.service.open(id)?;
                Ok(format!("event {id} is open for predictions"))
            }
            Command::Init(names) => {
                let event = self.service.event(id)?;
                let order: Vec<TeamId> = if names.is_empty() {
                    event.teams.iter().map(|t| t.id).collect()
                } else {
                    names
                        .iter()
                        .map(|name| resolve_team(&event, name))
                        .collect::<Result<Vec<_>, _>>()?
                };
                let update = self.service.initialize_draft(id, &order)?;
                Ok(self.publish(update))
            }
            Command::Pick { player, team } => {
                let event = self.service.event(id)?;
                let player_id = resolve_player(&event, &player)?;
                let team_id = team.map(|t| resolve_team(&event, &t)).transpose()?;
                let update = self.service.make_pick(id, player_id, team_id)?;
                Ok(self.publish(update))
            }
            Command::Undo => {
                let update = self.service.undo_last_pick(id)?;
                Ok(self.publish(update))
            }
            Command::Pause => {
                let update = self.service.pause(id)?;
                Ok(self.publish(update))
            }
            Command::Resume => {
                let update = self.service.resume(id)?;
                Ok(self.publish(update))
            }
            Command::Close => {
                self.service.close(id)?;
                Ok(format!("event {id} closed"))
            }
            Command::Reset => {
                self.service.reset_draft(id)?;
                Ok(format!("draft for {id} reset; predictions reopened"))
            }
            Command::Predict { participant, path } => {
                let update = read_prediction(&path)?;
                let saved = self.service.save_submission(id, &participant, update)?;
                Ok(format!(
                    "saved prediction for {}: {} teams ordered, {} players placed",
                    saved.participant,
                    saved.team_order.len(),
                    saved.placements.len()
                ))
            }
            Command::Score(participant) => {
                let score = self.service.score_submission(id, &participant)?;
                Ok(format!(
                    "{}: {} points (slots {}, team order {}, teams {}, rounds {}; {} exact, {} near)",
                    score.participant,
                    score.total,
                    score.slot_points,
                    score.team_order_points,
                    score.correct_team_points,
                    score.correct_round_points,
                    score.exact_matches,
                    score.near_matches
                ))
            }
            Command::Leaderboard => {
                let board = self.service.leaderboard(id)?;
                if board.is_empty() {
                    return Ok("no predictions submitted".to_string());
                }
                let lines: Vec<String> = board
                    .iter()
                    .map(|e| format!("{:>3}. {:<20} {:>5}", e.rank, e.score.participant, e.score.total))
                    .collect();
                Ok(lines.join("\n"))
            }
            Command::Stats => self.stats(),
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => Ok(String::new()),
        }
    }

    fn status(&self) -> ServiceResult<String> {
        let event = self.service.event(&self.event_id)?;
        let progress = event.progress();
        let mut out = format!(
            "{} [{}]: {} teams, {} players ({} available), {}/{} picks",
            event.name,
            progress.status,
            event.teams.len(),
            event.players.len(),
            event.available_players().count(),
            progress.picks_made,
            progress.total_picks
        );
        if let Some(team_id) = progress.on_the_clock {
            let team = event.team(team_id).map_or("?", |t| t.name.as_str());
            out.push_str(&format!(
                "\nround {}{}, pick {}: {} on the clock",
                progress.current_round,
                if progress.is_reversed { " (reversed)" } else { "" },
                progress.current_pick + 1,
                team
            ));
        }
        Ok(out)
    }

    fn stats(&self) -> ServiceResult<String> {
        let event = self.service.event(&self.event_id)?;
        let report = self.service.aggregate_stats(&self.event_id)?;
        let name = |id: PlayerId| event.player(id).map_or("?", |p| p.name.as_str());

        let mut lines = vec![format!(
            "{} predictions, {} with a complete team order",
            report.submissions, report.complete_team_orders
        )];
        lines.push("most accurate:".to_string());
        for p in report.most_accurate(3) {
            lines.push(format!(
                "  {} (pick {}): {:.0}% exact",
                name(p.player_id),
                p.actual_pick,
                p.exact_rate() * 100.0
            ));
        }
        lines.push("biggest surprises:".to_string());
        for p in report.biggest_surprises(3) {
            lines.push(format!(
                "  {} (pick {}): predicted around {:.1}",
                name(p.player_id),
                p.actual_pick,
                p.avg_predicted_slot
            ));
        }
        Ok(lines.join("\n"))
    }
}

fn resolve_player(event: &DraftEvent, input: &str) -> Result<PlayerId, DraftError> {
    if let Ok(id) = input.parse::<PlayerId>() {
        if event.player(id).is_some() {
            return Ok(id);
        }
    }
    event
        .player_by_name(input)
        .map(|p| p.id)
        .ok_or_else(|| DraftError::not_found("player", input))
}

fn resolve_team(event: &DraftEvent, input: &str) -> Result<TeamId, DraftError> {
    if let Ok(id) = input.parse::<TeamId>() {
        if event.team(id).is_some() {
            return Ok(id);
        }
    }
    event
        .team_by_name(input)
        .map(|t| t.id)
        .ok_or_else(|| DraftError::not_found("team", input))
}

fn read_prediction(path: &Path) -> ServiceResult<SubmissionUpdate> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DraftError::validation("prediction", format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        DraftError::validation("prediction", format!("{}: {e}", path.display())).into()
    })
}

/// One-line summary of an update, shown to the user and logged by observers.
pub fn describe_update(update: &DraftUpdate) -> String {
    let p = update.progress();
    let clock = p
        .on_the_clock
        .map_or_else(|| "nobody".to_string(), |t| format!("team {t}"));
    match update {
        DraftUpdate::Initialized { .. } => format!(
            "draft started: {} picks to make, {} on the clock",
            p.total_picks, clock
        ),
        DraftUpdate::PickMade { pick, .. } => format!("{pick}; {clock} on the clock"),
        DraftUpdate::PickUndone { removed, .. } => format!(
            "undid pick #{}; {} on the clock",
            removed.pick_number, clock
        ),
        DraftUpdate::StatusChanged { from, .. } => {
            format!("status {} -> {}", from, p.status)
        }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

/// Log every update published on `rx` until all senders are gone.
pub fn spawn_update_logger(mut rx: broadcast::Receiver<DraftUpdate>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(update) => info!("Draft update: {}", describe_update(&update)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Update logger lagged, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Run commands from `cmd_rx` until `Quit` or until the channel closes,
/// sending each reply through `out_tx`.
pub async fn run<S: EventStore>(
    mut cmd_rx: mpsc::Receiver<Command>,
    out_tx: mpsc::Sender<String>,
    app: App<S>,
) -> anyhow::Result<()> {
    info!("Command loop started for event {}", app.event_id);

    while let Some(cmd) = cmd_rx.recv().await {
        if cmd == Command::Quit {
            info!("Quit command received, shutting down");
            break;
        }
        let reply = match app.handle(cmd) {
            Ok(reply) => reply,
            Err(ServiceError::Draft(e)) => {
                warn!("Command rejected: {}", e);
                format!("error: {e}")
            }
            Err(ServiceError::Store(e)) => {
                error!("Storage failure: {:#}", e);
                format!("storage error: {e:#}")
            }
        };
        if out_tx.send(reply).await.is_err() {
            info!("Output channel closed, shutting down");
            break;
        }
    }

    info!("Command loop exiting");
    Ok(())
}
