//! NSGA-II ranking for the two-objective (profit, drawdown) mode.
//!
//! Profit is maximized and drawdown minimized. Candidates are ordered by
//! non-domination rank first and crowding distance second.

use std::cmp::Ordering;

use super::fitness::Fitness;

/// Rank and crowding distance of one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranking {
    /// Pareto front index, 0 is the non-dominated front.
    pub rank: usize,
    pub crowding: f64,
}

impl Ranking {
    /// Crowded-comparison order: lower rank wins, then larger crowding distance.
    pub fn crowded_cmp(&self, other: &Ranking) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| self.crowding.partial_cmp(&other.crowding).unwrap_or(Ordering::Equal))
    }
}

/// Split candidate indices into successive Pareto fronts.
pub fn non_dominated_sort(fitness: &[Fitness]) -> Vec<Vec<usize>> {
    let n = fitness.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if fitness[p].dominates(&fitness[q]) {
                dominated_by[p].push(q);
            } else if fitness[q].dominates(&fitness[p]) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            current.push(p);
        }
    }

    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    next.push(q);
                }
            }
        }
        fronts.push(current);
        current = next;
    }

    fronts
}

/// Crowding distance of each member of `front`, aligned with `front`.
pub fn crowding_distance(front: &[usize], fitness: &[Fitness]) -> Vec<f64> {
    let mut distance = vec![0.0; front.len()];
    if front.len() <= 2 {
        return vec![f64::INFINITY; front.len()];
    }

    let objectives: [fn(&Fitness) -> f64; 2] = [
        |f| f.primary(),
        |f| f.drawdown().unwrap_or(0.0),
    ];

    for objective in objectives {
        let mut order: Vec<usize> = (0..front.len()).collect();
        order.sort_by(|&a, &b| {
            objective(&fitness[front[a]])
                .partial_cmp(&objective(&fitness[front[b]]))
                .unwrap_or(Ordering::Equal)
        });

        let lo = objective(&fitness[front[order[0]]]);
        let hi = objective(&fitness[front[order[order.len() - 1]]]);
        distance[order[0]] = f64::INFINITY;
        distance[order[order.len() - 1]] = f64::INFINITY;

        let span = hi - lo;
        if span <= 0.0 || !span.is_finite() {
            continue;
        }
        for w in 1..order.len() - 1 {
            let prev = objective(&fitness[front[order[w - 1]]]);
            let next = objective(&fitness[front[order[w + 1]]]);
            distance[order[w]] += (next - prev) / span;
        }
    }

    distance
}

/// Rank every candidate, aligned with `fitness`.
pub fn rank_population(fitness: &[Fitness]) -> Vec<Ranking> {
    let mut rankings = vec![
        Ranking {
            rank: usize::MAX,
            crowding: 0.0,
        };
        fitness.len()
    ];

    for (rank, front) in non_dominated_sort(fitness).iter().enumerate() {
        for (&idx, crowding) in front.iter().zip(crowding_distance(front, fitness)) {
            rankings[idx] = Ranking { rank, crowding };
        }
    }

    rankings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pareto(profit: f64, drawdown: f64) -> Fitness {
        Fitness::Pareto { profit, drawdown }
    }

    #[test]
    fn test_fronts() {
        let fitness = vec![
            pareto(10.0, 5.0),  // front 0
            pareto(12.0, 8.0),  // front 0
            pareto(8.0, 6.0),   // dominated by 0
            pareto(5.0, 20.0),  // dominated by 0, 1, 2
        ];
        let fronts = non_dominated_sort(&fitness);
        assert_eq!(fronts.len(), 3);
        assert_eq!(fronts[0], vec![0, 1]);
        assert_eq!(fronts[1], vec![2]);
        assert_eq!(fronts[2], vec![3]);
    }

    #[test]
    fn test_crowding_boundaries_infinite() {
        let fitness = vec![
            pareto(1.0, 1.0),
            pareto(2.0, 2.0),
            pareto(3.0, 3.0),
            pareto(4.0, 4.0),
        ];
        let front = vec![0, 1, 2, 3];
        let distance = crowding_distance(&front, &fitness);
        assert!(distance[0].is_infinite());
        assert!(distance[3].is_infinite());
        // (3 - 1) / 3 per objective, two objectives
        assert!((distance[1] - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rank_population_and_compare() {
        let fitness = vec![pareto(10.0, 5.0), pareto(8.0, 6.0), pareto(12.0, 8.0)];
        let rankings = rank_population(&fitness);
        assert_eq!(rankings[0].rank, 0);
        assert_eq!(rankings[1].rank, 1);
        assert_eq!(rankings[2].rank, 0);
        assert_eq!(rankings[0].crowded_cmp(&rankings[1]), Ordering::Greater);
    }

    #[test]
    fn test_empty_population() {
        assert!(non_dominated_sort(&[]).is_empty());
        assert!(rank_population(&[]).is_empty());
    }
}
