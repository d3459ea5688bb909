//! Aggregation of unknowns for smoothed aggregation AMG
//!
//! Aggregates are disjoint clusters of fine unknowns; each one becomes a
//! single coarse unknown (or one per near-null-space candidate). Both methods
//! visit unknowns in a fixed order and produce the same partition on every
//! run.

use super::PriorityQueue;
use crate::sparse::{CsrBuilder, CsrMatrix};
use crate::strength::StrengthGraph;
use serde::{Deserialize, Serialize};

/// Aggregation algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Priority-driven greedy aggregation followed by a sweep of leftovers
    #[default]
    Standard,
    /// Single pass in index order
    Naive,
}

impl AggregationMethod {
    /// Partition the unknowns of `strength` into aggregates
    pub fn aggregate(self, strength: &StrengthGraph) -> Aggregates {
        match self {
            AggregationMethod::Standard => standard_aggregation(strength),
            AggregationMethod::Naive => naive_aggregation(strength),
        }
    }
}

/// Complete partition of the fine unknowns into aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregates {
    assignment: Vec<usize>,
    num_aggregates: usize,
}

impl Aggregates {
    /// Finalize a partial assignment: every unassigned unknown becomes a singleton
    fn finalize(partial: Vec<Option<usize>>, mut num_aggregates: usize) -> Self {
        let assignment = partial
            .into_iter()
            .map(|a| {
                a.unwrap_or_else(|| {
                    num_aggregates += 1;
                    num_aggregates - 1
                })
            })
            .collect();
        Self {
            assignment,
            num_aggregates,
        }
    }

    /// Build from an explicit assignment; ids must cover `0..num_aggregates`
    pub fn from_assignment(assignment: Vec<usize>) -> Self {
        let num_aggregates = assignment.iter().max().map_or(0, |&m| m + 1);
        Self {
            assignment,
            num_aggregates,
        }
    }

    /// Number of fine unknowns
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// Whether there are no unknowns
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Number of aggregates
    pub fn num_aggregates(&self) -> usize {
        self.num_aggregates
    }

    /// Aggregate id of every fine unknown
    pub fn assignment(&self) -> &[usize] {
        &self.assignment
    }

    /// Aggregate containing unknown `i`
    pub fn aggregate_of(&self, i: usize) -> usize {
        self.assignment[i]
    }

    /// Members of each aggregate, in increasing index order
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.num_aggregates];
        for (i, &a) in self.assignment.iter().enumerate() {
            members[a].push(i);
        }
        members
    }

    /// Boolean aggregation operator (n × num_aggregates, one 1 per row)
    pub fn to_matrix(&self) -> CsrMatrix {
        let mut builder = CsrBuilder::with_capacity(self.len(), self.num_aggregates, self.len());
        for &a in &self.assignment {
            builder.add_row_entries(std::iter::once((a, 1.0)));
        }
        builder.finish()
    }
}

/// Standard greedy aggregation
///
/// Phase 1 repeatedly seeds an aggregate at the unknown with the most
/// unaggregated strong neighbours (lowest index on ties) and absorbs those
/// neighbours, while some unknown still has at least two of them. Phase 2
/// sweeps the leftovers in index order into the adjacent aggregate they are
/// most strongly coupled to, or starts a singleton when none exists.
pub fn standard_aggregation(strength: &StrengthGraph) -> Aggregates {
    let n = strength.num_rows();
    // Row i of the transpose lists the unknowns whose count includes i
    let dependents = strength.transpose();

    let counts: Vec<usize> = (0..n).map(|i| strength.neighbors(i).len()).collect();
    let mut queue = PriorityQueue::new(&counts);
    let mut partial: Vec<Option<usize>> = vec![None; n];
    let mut next_id = 0;

    while let Some((_, count)) = queue.peek() {
        if count < 2 {
            break;
        }
        let Some((seed, _)) = queue.pop() else { break };

        let members: Vec<usize> = std::iter::once(seed)
            .chain(
                strength
                    .neighbors(seed)
                    .iter()
                    .copied()
                    .filter(|&j| partial[j].is_none()),
            )
            .collect();

        for &m in &members {
            partial[m] = Some(next_id);
            queue.remove(m);
        }
        for &m in &members {
            for &q in dependents.neighbors(m) {
                queue.decrement(q);
            }
        }
        next_id += 1;
    }

    for i in 0..n {
        if partial[i].is_some() {
            continue;
        }
        let best = strength
            .weighted_neighbors(i)
            .filter_map(|(j, w)| partial[j].map(|a| (a, w)))
            .fold(None, |best: Option<(usize, f64)>, (a, w)| match best {
                Some((_, bw)) if bw >= w => best,
                _ => Some((a, w)),
            });
        partial[i] = Some(match best {
            Some((a, _)) => a,
            None => {
                next_id += 1;
                next_id - 1
            }
        });
    }

    Aggregates::finalize(partial, next_id)
}

/// Naive aggregation: in index order, every unaggregated unknown forms an
/// aggregate with its unaggregated strong neighbours
pub fn naive_aggregation(strength: &StrengthGraph) -> Aggregates {
    let n = strength.num_rows();
    let mut partial: Vec<Option<usize>> = vec![None; n];
    let mut next_id = 0;

    for i in 0..n {
        if partial[i].is_some() {
            continue;
        }
        partial[i] = Some(next_id);
        for &j in strength.neighbors(i) {
            if partial[j].is_none() {
                partial[j] = Some(next_id);
            }
        }
        next_id += 1;
    }

    Aggregates::finalize(partial, next_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strength::symmetric_strength;

    fn laplacian_1d(n: usize) -> CsrMatrix {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.0));
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
                triplets.push((i + 1, i, -1.0));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    fn laplacian_2d(nx: usize) -> CsrMatrix {
        let n = nx * nx;
        let mut triplets = Vec::new();
        for y in 0..nx {
            for x in 0..nx {
                let i = y * nx + x;
                triplets.push((i, i, 4.0));
                if x + 1 < nx {
                    triplets.push((i, i + 1, -1.0));
                    triplets.push((i + 1, i, -1.0));
                }
                if y + 1 < nx {
                    triplets.push((i, i + nx, -1.0));
                    triplets.push((i + nx, i, -1.0));
                }
            }
        }
        CsrMatrix::from_triplets(n, n, triplets).unwrap()
    }

    fn assert_partition(aggs: &Aggregates) {
        let members = aggs.members();
        assert_eq!(members.len(), aggs.num_aggregates());
        assert!(members.iter().all(|m| !m.is_empty()));
        assert_eq!(members.iter().map(Vec::len).sum::<usize>(), aggs.len());
    }

    #[test]
    fn test_standard_1d_triples() {
        let s = symmetric_strength(&laplacian_1d(9), 0.0);
        let aggs = standard_aggregation(&s);
        assert_eq!(aggs.assignment(), &[0, 0, 0, 1, 1, 1, 2, 2, 2]);
    }

    #[test]
    fn test_standard_2d_partition() {
        let s = symmetric_strength(&laplacian_2d(10), 0.0);
        let aggs = standard_aggregation(&s);
        assert_partition(&aggs);
        let na = aggs.num_aggregates();
        assert!(na >= 100 / 9 && na <= 100 / 3, "aggregates: {na}");
    }

    #[test]
    fn test_naive_1d() {
        let s = symmetric_strength(&laplacian_1d(6), 0.0);
        let aggs = naive_aggregation(&s);
        assert_eq!(aggs.assignment(), &[0, 0, 1, 1, 2, 2]);
        assert_partition(&aggs);
    }

    #[test]
    fn test_isolated_unknowns_are_singletons() {
        let a = CsrMatrix::from_diagonal(&ndarray::array![1.0, 1.0, 1.0]);
        let s = symmetric_strength(&a, 0.0);
        for method in [AggregationMethod::Standard, AggregationMethod::Naive] {
            let aggs = method.aggregate(&s);
            assert_eq!(aggs.num_aggregates(), 3);
        }
    }

    #[test]
    fn test_aggregation_is_deterministic() {
        let s = symmetric_strength(&laplacian_2d(9), 0.1);
        for method in [AggregationMethod::Standard, AggregationMethod::Naive] {
            assert_eq!(method.aggregate(&s), method.aggregate(&s));
        }
    }

    #[test]
    fn test_aggregation_matrix() {
        let aggs = Aggregates::from_assignment(vec![0, 1, 0, 1, 2]);
        let m = aggs.to_matrix();
        assert_eq!(m.num_rows, 5);
        assert_eq!(m.num_cols, 3);
        assert_eq!(m.get(2, 0), 1.0);
        assert_eq!(m.get(4, 2), 1.0);
        assert_eq!(m.nnz(), 5);
    }
}
