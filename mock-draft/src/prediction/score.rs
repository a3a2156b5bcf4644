// Scoring a single prediction against the actual draft, plus the leaderboard.

use serde::{Deserialize, Serialize};

use super::submission::Submission;
use crate::draft::event::DraftEvent;
use crate::draft::pick::{PlayerId, TeamId};

/// Point table for scoring predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    pub exact: u32,
    pub off_by_one: u32,
    pub off_by_two: u32,
    pub off_by_three: u32,
    pub correct_team: u32,
    pub correct_round: u32,
    /// Per team placed at its actual position in the predicted team order.
    pub team_order: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        ScoringRules {
            exact: 10,
            off_by_one: 5,
            off_by_two: 3,
            off_by_three: 1,
            correct_team: 3,
            correct_round: 2,
            team_order: 5,
        }
    }
}

impl ScoringRules {
    /// Points for a placement that missed the actual pick by `difference`.
    pub fn slot_points(&self, difference: u32) -> u32 {
        match difference {
            0 => self.exact,
            1 => self.off_by_one,
            2 => self.off_by_two,
            3 => self.off_by_three,
            _ => 0,
        }
    }
}

/// Scoring detail for one placed player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementScore {
    pub player_id: PlayerId,
    pub predicted_slot: u32,
    /// `None` if the player was never drafted.
    pub actual_pick: Option<u32>,
    pub difference: Option<u32>,
    pub slot_points: u32,
    pub predicted_team: Option<TeamId>,
    pub predicted_round: Option<u32>,
    pub actual_team: Option<TeamId>,
    pub team_correct: bool,
    pub round_correct: bool,
}

impl PlacementScore {
    pub fn is_exact(&self) -> bool {
        self.difference == Some(0)
    }

    pub fn is_near(&self) -> bool {
        matches!(self.difference, Some(1..=3))
    }
}

/// Per-category breakdown of a submission's score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionScore {
    pub participant: String,
    pub total: u32,
    pub slot_points: u32,
    pub team_order_points: u32,
    pub correct_team_points: u32,
    pub correct_round_points: u32,
    pub exact_matches: usize,
    pub near_matches: usize,
    pub correct_teams: usize,
    pub correct_rounds: usize,
    pub team_order_matches: usize,
    pub placements: Vec<PlacementScore>,
}

/// Score `submission` against the picks recorded in `event`.
///
/// Pure and independent per submission: scoring one participant never
/// depends on another.
pub fn score_submission(
    event: &DraftEvent,
    submission: &Submission,
    rules: &ScoringRules,
) -> SubmissionScore {
    let mut placements = Vec::with_capacity(submission.placements.len());

    for (&player_id, &predicted_slot) in &submission.placements {
        let actual = event.pick_for(player_id);
        let predicted = submission.predicted_cell(predicted_slot, event);

        let mut placement = PlacementScore {
            player_id,
            predicted_slot,
            actual_pick: actual.map(|p| p.pick_number),
            difference: actual.map(|p| predicted_slot.abs_diff(p.pick_number)),
            slot_points: 0,
            predicted_team: predicted.map(|(team, _)| team),
            predicted_round: predicted.map(|(_, round)| round),
            actual_team: actual.map(|p| p.team_id),
            team_correct: false,
            round_correct: false,
        };

        if let Some(pick) = actual {
            placement.slot_points = placement.difference.map_or(0, |d| rules.slot_points(d));
            if let Some((team, round)) = predicted {
                placement.team_correct = team == pick.team_id;
                placement.round_correct = round == pick.round;
            }
        }
        placements.push(placement);
    }

    let team_order_matches = match event.actual_team_order() {
        Some(actual) => submission
            .team_order
            .iter()
            .zip(actual)
            .filter(|(predicted, actual)| predicted == actual)
            .count(),
        None => 0,
    };

    let exact_matches = placements.iter().filter(|p| p.is_exact()).count();
    let near_matches = placements.iter().filter(|p| p.is_near()).count();
    let correct_teams = placements.iter().filter(|p| p.team_correct).count();
    let correct_rounds = placements.iter().filter(|p| p.round_correct).count();

    let slot_points = placements
        .iter()
        .map(|p| p.slot_points)
        .fold(0u32, u32::saturating_add);
    let team_order_points = points_for(team_order_matches, rules.team_order);
    let correct_team_points = points_for(correct_teams, rules.correct_team);
    let correct_round_points = points_for(correct_rounds, rules.correct_round);
    let total = [team_order_points, correct_team_points, correct_round_points]
        .into_iter()
        .fold(slot_points, u32::saturating_add);

    SubmissionScore {
        participant: submission.participant.clone(),
        total,
        slot_points,
        team_order_points,
        correct_team_points,
        correct_round_points,
        exact_matches,
        near_matches,
        correct_teams,
        correct_rounds,
        team_order_matches,
        placements,
    }
}

/// `count * per`, clamped at `u32::MAX` for oversized point tables.
fn points_for(count: usize, per: u32) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX).saturating_mul(per)
}

/// One row of the leaderboard. Tied totals share a rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub score: SubmissionScore,
}

/// Score every submission and rank by total, highest first. Ties are ordered
/// by participant handle.
pub fn leaderboard(
    event: &DraftEvent,
    submissions: &[Submission],
    rules: &ScoringRules,
) -> Vec<LeaderboardEntry> {
    let mut scores: Vec<SubmissionScore> = submissions
        .iter()
        .map(|s| score_submission(event, s, rules))
        .collect();
    scores.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.participant.cmp(&b.participant))
    });

    let mut entries: Vec<LeaderboardEntry> = Vec::with_capacity(scores.len());
    for (idx, score) in scores.into_iter().enumerate() {
        let rank = match entries.last() {
            Some(prev) if prev.score.total == score.total => prev.rank,
            _ => idx + 1,
        };
        entries.push(LeaderboardEntry { rank, score });
    }
    entries
}
