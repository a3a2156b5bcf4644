// Cross-participant accuracy statistics for a completed draft.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::submission::Submission;
use crate::draft::event::DraftEvent;
use crate::draft::pick::{PlayerId, TeamId};
use crate::error::{DraftError, DraftResult};

/// Minimum number of predictions before a player counts as a "surprise".
pub const MIN_PREDICTIONS_FOR_SURPRISE: usize = 2;

/// How well the field predicted one player's pick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerAccuracy {
    pub player_id: PlayerId,
    pub actual_pick: u32,
    pub times_predicted: usize,
    pub exact_matches: usize,
    pub avg_predicted_slot: f64,
    /// `|mean(predicted slot) - actual pick|`.
    pub avg_error: f64,
}

impl PlayerAccuracy {
    pub fn exact_rate(&self) -> f64 {
        ratio(self.exact_matches, self.times_predicted)
    }
}

/// How often a team was placed at its actual position in predicted orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamOrderAccuracy {
    pub team_id: TeamId,
    /// 1-based position in the actual round-1 order.
    pub actual_position: usize,
    pub correct: usize,
    /// Submissions with a complete team order.
    pub predictions: usize,
    pub rate: f64,
}

/// How often participants predicted the right team for the players this team
/// actually drafted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPickAccuracy {
    pub team_id: TeamId,
    pub correct: usize,
    pub predictions: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub submissions: usize,
    pub complete_team_orders: usize,
    /// Every drafted player predicted at least once, in actual pick order.
    pub players: Vec<PlayerAccuracy>,
    pub team_order: Vec<TeamOrderAccuracy>,
    pub team_picks: Vec<TeamPickAccuracy>,
}

impl AggregateReport {
    /// Players with the highest exact-match rate first.
    pub fn most_accurate(&self, limit: usize) -> Vec<&PlayerAccuracy> {
        let mut players: Vec<&PlayerAccuracy> = self.players.iter().collect();
        players.sort_by(|a, b| {
            b.exact_rate()
                .total_cmp(&a.exact_rate())
                .then_with(|| b.exact_matches.cmp(&a.exact_matches))
                .then_with(|| a.actual_pick.cmp(&b.actual_pick))
        });
        players.truncate(limit);
        players
    }

    /// Players with the lowest exact-match rate first; among equals, the most
    /// widely predicted first.
    pub fn least_accurate(&self, limit: usize) -> Vec<&PlayerAccuracy> {
        let mut players: Vec<&PlayerAccuracy> = self.players.iter().collect();
        players.sort_by(|a, b| {
            a.exact_rate()
                .total_cmp(&b.exact_rate())
                .then_with(|| b.times_predicted.cmp(&a.times_predicted))
                .then_with(|| a.actual_pick.cmp(&b.actual_pick))
        });
        players.truncate(limit);
        players
    }

    /// Players whose average prediction missed by the most, among those
    /// predicted by at least [`MIN_PREDICTIONS_FOR_SURPRISE`] participants.
    pub fn biggest_surprises(&self, limit: usize) -> Vec<&PlayerAccuracy> {
        let mut players: Vec<&PlayerAccuracy> = self
            .players
            .iter()
            .filter(|p| p.times_predicted >= MIN_PREDICTIONS_FOR_SURPRISE)
            .collect();
        players.sort_by(|a, b| {
            b.avg_error
                .total_cmp(&a.avg_error)
                .then_with(|| a.actual_pick.cmp(&b.actual_pick))
        });
        players.truncate(limit);
        players
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Default)]
struct PlayerTally {
    count: usize,
    exact: usize,
    slot_sum: u64,
}

#[derive(Default)]
struct TeamTally {
    correct: usize,
    total: usize,
}

/// Compute accuracy statistics across all submissions for a completed event.
pub fn aggregate_stats(event: &DraftEvent, submissions: &[Submission]) -> DraftResult<AggregateReport> {
    if !event.is_draft_complete() {
        return Err(DraftError::InvalidState(format!(
            "aggregate statistics need a completed draft (status {}, {} of {} picks)",
            event.status,
            event.picks.len(),
            event.total_picks()
        )));
    }

    let mut players: HashMap<PlayerId, PlayerTally> = HashMap::new();
    let mut pick_tallies: HashMap<TeamId, TeamTally> = HashMap::new();
    let mut order_hits: HashMap<TeamId, usize> = HashMap::new();
    let actual_order = event.actual_team_order().unwrap_or(&[]);
    let mut complete_team_orders = 0;

    for submission in submissions {
        for (&player_id, &slot) in &submission.placements {
            let Some(pick) = event.pick_for(player_id) else {
                continue;
            };
            let tally = players.entry(player_id).or_default();
            tally.count += 1;
            tally.slot_sum += u64::from(slot);
            if slot == pick.pick_number {
                tally.exact += 1;
            }

            if let Some((team, _)) = submission.predicted_cell(slot, event) {
                let tally = pick_tallies.entry(pick.team_id).or_default();
                tally.total += 1;
                if team == pick.team_id {
                    tally.correct += 1;
                }
            }
        }

        if submission.has_complete_team_order(event) {
            complete_team_orders += 1;
            for (predicted, actual) in submission.team_order.iter().zip(actual_order) {
                if predicted == actual {
                    *order_hits.entry(*actual).or_default() += 1;
                }
            }
        }
    }

    let mut player_stats: Vec<PlayerAccuracy> = players
        .into_iter()
        .filter_map(|(player_id, tally)| {
            let actual_pick = event.pick_for(player_id)?.pick_number;
            let avg_predicted_slot = tally.slot_sum as f64 / tally.count as f64;
            Some(PlayerAccuracy {
                player_id,
                actual_pick,
                times_predicted: tally.count,
                exact_matches: tally.exact,
                avg_predicted_slot,
                avg_error: (avg_predicted_slot - f64::from(actual_pick)).abs(),
            })
        })
        .collect();
    player_stats.sort_by_key(|p| p.actual_pick);

    let team_order = actual_order
        .iter()
        .enumerate()
        .map(|(idx, &team_id)| {
            let correct = order_hits.get(&team_id).copied().unwrap_or(0);
            TeamOrderAccuracy {
                team_id,
                actual_position: idx + 1,
                correct,
                predictions: complete_team_orders,
                rate: ratio(correct, complete_team_orders),
            }
        })
        .collect();

    let team_picks = event
        .teams
        .iter()
        .map(|team| {
            let tally = pick_tallies.remove(&team.id).unwrap_or_default();
            TeamPickAccuracy {
                team_id: team.id,
                correct: tally.correct,
                predictions: tally.total,
                rate: ratio(tally.correct, tally.total),
            }
        })
        .collect();

    debug!(
        "Event {}: aggregated {} submissions over {} predicted players",
        event.id,
        submissions.len(),
        player_stats.len()
    );

    Ok(AggregateReport {
        submissions: submissions.len(),
        complete_team_orders,
        players: player_stats,
        team_order,
        team_picks,
    })
}
