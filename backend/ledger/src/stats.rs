use crate::models::{BetResult, Prediction, User, UserBet, UserStats};

#[derive(Default)]
struct Tally {
    bets: u64,
    wins: u64,
    settled: u64,
}

/// Insertion ordered tallies so ties resolve to the first key seen.
fn tally<'a, 'b>(tallies: &'b mut Vec<(&'a str, Tally)>, key: &'a str) -> &'b mut Tally {
    let index = match tallies.iter().position(|(existing, _)| *existing == key) {
        Some(index) => index,
        None => {
            tallies.push((key, Tally::default()));
            tallies.len() - 1
        }
    };

    &mut tallies[index].1
}

pub fn compute_user_stats(history: &[(UserBet, Prediction)]) -> UserStats {
    let mut stats = UserStats::default();
    let mut categories: Vec<(&str, Tally)> = Vec::new();
    let mut circuits: Vec<(&str, Tally)> = Vec::new();

    for (bet, prediction) in history {
        stats.total_bets += 1;
        tally(&mut categories, prediction.category.as_str()).bets += 1;

        let circuit = tally(&mut circuits, &prediction.circuit);
        match bet.result {
            Some(BetResult::Won) => {
                stats.winning_bets += 1;
                stats.total_points_won += bet.points_won.unwrap_or(0);
                circuit.wins += 1;
                circuit.settled += 1;
            }
            Some(BetResult::Lost) => {
                stats.total_points_lost += bet.amount;
                circuit.settled += 1;
            }
            Some(BetResult::Refunded) | None => {}
        }
    }

    let mut favorite: Option<(&str, &Tally)> = None;
    for (category, counts) in &categories {
        if favorite.is_none_or(|(_, best)| counts.bets > best.bets) {
            favorite = Some((*category, counts));
        }
    }

    let mut best: Option<(&str, &Tally)> = None;
    for (circuit, counts) in circuits.iter().filter(|(_, counts)| counts.settled > 0) {
        // wins/settled > best.wins/best.settled without dividing
        if best.is_none_or(|(_, top)| counts.wins * top.settled > top.wins * counts.settled) {
            best = Some((*circuit, counts));
        }
    }

    stats.favorite_category = favorite.map(|(key, _)| key.to_string()).unwrap_or_default();
    stats.best_circuit = best.map(|(key, _)| key.to_string()).unwrap_or_default();

    stats
}

/// Order by points descending, ties by uid descending, then take `limit`.
pub fn rank_users(mut users: Vec<User>, limit: usize) -> Vec<User> {
    users.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| b.uid.cmp(&a.uid)));
    users.truncate(limit);

    users
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PredictionCategory, fixtures::*};

    fn settled(
        id: &str,
        result: BetResult,
        amount: u64,
        points_won: u64,
        circuit: &str,
        category: PredictionCategory,
    ) -> (UserBet, Prediction) {
        let mut bet = bet(id, "p", 0, amount);
        bet.result = Some(result);
        bet.points_won = Some(points_won);

        let mut prediction = prediction("p", &[2.0]);
        prediction.circuit = circuit.to_string();
        prediction.category = category;

        (bet, prediction)
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(compute_user_stats(&[]), UserStats::default());

        let stats = compute_user_stats(&[]);
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.favorite_category, "");
        assert_eq!(stats.best_circuit, "");
    }

    #[test]
    fn test_totals() {
        use PredictionCategory::Race;

        let history = vec![
            settled("a", BetResult::Won, 50, 100, "bahrain", Race),
            settled("b", BetResult::Lost, 50, 0, "bahrain", Race),
            settled("c", BetResult::Won, 25, 75, "jeddah", Race),
        ];
        let stats = compute_user_stats(&history);

        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.winning_bets, 2);
        assert_eq!(stats.total_points_won, 175);
        assert_eq!(stats.total_points_lost, 50);
    }

    #[test]
    fn test_favorite_category_first_wins_ties() {
        use PredictionCategory::{Qualifying, Race, Sprint};

        let history = vec![
            settled("a", BetResult::Lost, 10, 0, "x", Sprint),
            settled("b", BetResult::Lost, 10, 0, "x", Race),
            settled("c", BetResult::Lost, 10, 0, "x", Race),
            settled("d", BetResult::Lost, 10, 0, "x", Sprint),
            settled("e", BetResult::Lost, 10, 0, "x", Qualifying),
        ];

        assert_eq!(compute_user_stats(&history).favorite_category, "sprint");
    }

    #[test]
    fn test_best_circuit_by_win_rate() {
        use PredictionCategory::Race;

        let history = vec![
            settled("a", BetResult::Won, 10, 20, "monza", Race),
            settled("b", BetResult::Lost, 10, 0, "monza", Race),
            settled("c", BetResult::Won, 10, 20, "suzuka", Race),
            settled("d", BetResult::Lost, 10, 0, "spa", Race),
        ];

        assert_eq!(compute_user_stats(&history).best_circuit, "suzuka");
    }

    #[test]
    fn test_best_circuit_ignores_unsettled() {
        use PredictionCategory::Race;

        let (mut pending, mut prediction) = settled("a", BetResult::Won, 10, 0, "imola", Race);
        pending.result = None;
        pending.points_won = None;
        prediction.circuit = "imola".to_string();

        let history = vec![
            (pending, prediction),
            settled("b", BetResult::Lost, 10, 0, "monaco", Race),
            settled("c", BetResult::Refunded, 10, 10, "baku", Race),
        ];
        let stats = compute_user_stats(&history);

        assert_eq!(stats.best_circuit, "monaco");
        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.total_points_won, 0);
        assert_eq!(stats.total_points_lost, 10);
    }

    #[test]
    fn test_best_circuit_first_wins_ties() {
        use PredictionCategory::Race;

        let history = vec![
            settled("a", BetResult::Won, 10, 20, "zandvoort", Race),
            settled("b", BetResult::Lost, 10, 0, "zandvoort", Race),
            settled("c", BetResult::Won, 10, 20, "austin", Race),
            settled("d", BetResult::Lost, 10, 0, "austin", Race),
        ];

        assert_eq!(compute_user_stats(&history).best_circuit, "zandvoort");
    }

    #[test]
    fn test_rank_users() {
        let user = |uid: &str, points| {
            let mut user = User::new(uid, uid, "", now());
            user.points = points;
            user
        };
        let users = vec![user("a", 50), user("b", 900), user("c", 900), user("d", 10)];

        let ranked: Vec<_> = rank_users(users, 3)
            .into_iter()
            .map(|user| (user.uid, user.points))
            .collect();

        assert_eq!(
            ranked,
            vec![
                ("c".to_string(), 900),
                ("b".to_string(), 900),
                ("a".to_string(), 50)
            ]
        );
    }
}
