// Snake order mapping between overall slots and (round, team index) cells.
//
// Both the live draft and prediction scoring go through these functions, so a
// prediction is always judged against the same ordering that ran the draft.

/// Convert a 0-based overall slot into a 1-based round and the index of the
/// picking team within the base team ordering.
///
/// Odd rounds run forward through the base order, even rounds run in reverse.
///
/// # Panics
/// Panics if `num_teams` is zero.
pub fn slot_to_round_and_team_index(slot: usize, num_teams: usize) -> (usize, usize) {
    assert!(num_teams > 0, "snake order requires at least one team");
    let round = slot / num_teams + 1;
    let pos_in_round = slot % num_teams;
    let team_index = if round % 2 == 1 {
        pos_in_round
    } else {
        num_teams - 1 - pos_in_round
    };
    (round, team_index)
}

/// Inverse of [`slot_to_round_and_team_index`].
///
/// # Panics
/// Panics if `num_teams` is zero, `round` is zero, or `team_index` is not
/// below `num_teams`.
pub fn round_and_team_index_to_slot(round: usize, team_index: usize, num_teams: usize) -> usize {
    assert!(num_teams > 0, "snake order requires at least one team");
    assert!(round >= 1, "rounds are 1-based");
    assert!(team_index < num_teams, "team index {team_index} out of range");
    let pos_in_round = if round % 2 == 1 {
        team_index
    } else {
        num_teams - 1 - team_index
    };
    (round - 1) * num_teams + pos_in_round
}

/// Whether the (round, team index) cell falls inside a draft of `total_slots`
/// picks, i.e. the player pool is large enough for that pick to happen.
pub fn is_valid_slot(round: usize, team_index: usize, num_teams: usize, total_slots: usize) -> bool {
    if num_teams == 0 || round == 0 || team_index >= num_teams {
        return false;
    }
    round_and_team_index_to_slot(round, team_index, num_teams) < total_slots
}

/// Round number and direction after `picks_made` picks.
///
/// Returns `(current_round, is_reversed)`: the round that the next pick
/// belongs to and whether that round runs in reversed order.
pub fn progress_after(picks_made: usize, num_teams: usize) -> (usize, bool) {
    let (round, _) = slot_to_round_and_team_index(picks_made, num_teams);
    (round, round % 2 == 0)
}

/// Expand a base team ordering into a full snake sequence covering at least
/// `min_picks` slots (always whole rounds).
pub fn generate_order<T: Clone>(base: &[T], min_picks: usize) -> Vec<T> {
    if base.is_empty() {
        return Vec::new();
    }
    let num_teams = base.len();
    let rounds = min_picks.div_ceil(num_teams).max(1);
    (0..rounds * num_teams)
        .map(|slot| {
            let (_, team_index) = slot_to_round_and_team_index(slot, num_teams);
            base[team_index].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_law_holds() {
        for num_teams in 1..=12 {
            for slot in 0..(num_teams * 9) {
                let (round, team_index) = slot_to_round_and_team_index(slot, num_teams);
                assert_eq!(
                    round_and_team_index_to_slot(round, team_index, num_teams),
                    slot,
                    "num_teams={num_teams} slot={slot}"
                );
            }
        }
    }

    #[test]
    fn four_team_example() {
        // Round 2 runs T4,T3,T2,T1; slot 4 is its first pick, team index 3.
        assert_eq!(slot_to_round_and_team_index(0, 4), (1, 0));
        assert_eq!(slot_to_round_and_team_index(3, 4), (1, 3));
        assert_eq!(slot_to_round_and_team_index(4, 4), (2, 3));
        assert_eq!(slot_to_round_and_team_index(7, 4), (2, 0));
        assert_eq!(slot_to_round_and_team_index(8, 4), (3, 0));
    }

    #[test]
    fn single_team_never_reverses_position() {
        for slot in 0..5 {
            assert_eq!(slot_to_round_and_team_index(slot, 1), (slot + 1, 0));
        }
    }

    #[test]
    fn valid_slot_bounded_by_pool_size() {
        // 4 teams, 6 players: round 2 only has two real picks (team 3, team 2).
        assert!(is_valid_slot(1, 0, 4, 6));
        assert!(is_valid_slot(2, 3, 4, 6));
        assert!(is_valid_slot(2, 2, 4, 6));
        assert!(!is_valid_slot(2, 1, 4, 6));
        assert!(!is_valid_slot(2, 0, 4, 6));
        assert!(!is_valid_slot(0, 0, 4, 6));
        assert!(!is_valid_slot(1, 4, 4, 6));
    }

    #[test]
    fn progress_flips_direction_each_round() {
        assert_eq!(progress_after(0, 3), (1, false));
        assert_eq!(progress_after(2, 3), (1, false));
        assert_eq!(progress_after(3, 3), (2, true));
        assert_eq!(progress_after(5, 3), (2, true));
        assert_eq!(progress_after(6, 3), (3, false));
    }

    #[test]
    fn generate_order_snakes() {
        let order = generate_order(&["A", "B", "C"], 7);
        assert_eq!(order, vec!["A", "B", "C", "C", "B", "A", "A", "B", "C"]);
    }

    #[test]
    fn generate_order_covers_bound_in_whole_rounds() {
        let base: Vec<u32> = (1..=7).collect();
        let order = generate_order(&base, 200);
        assert!(order.len() >= 200);
        assert_eq!(order.len() % 7, 0);
        for (slot, team) in order.iter().enumerate() {
            let (_, idx) = slot_to_round_and_team_index(slot, 7);
            assert_eq!(*team, base[idx]);
        }
    }

    #[test]
    fn generate_order_empty_base() {
        let order: Vec<u32> = generate_order(&[], 200);
        assert!(order.is_empty());
    }
}
