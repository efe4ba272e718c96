use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Train/test partition of example indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Split {
    /// Indices used for fitting.
    pub train: Vec<usize>,
    /// Held-out indices.
    pub test: Vec<usize>,
}

/// Stratified split preserving the label ratio in both partitions.
///
/// Each class is shuffled with a seeded RNG and `test_fraction` of it
/// (rounded, at least one) is held out. A class with a single member
/// stays entirely in the training partition so the model still sees it.
/// Both partitions are returned in ascending index order.
pub(crate) fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> Split {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &y)| y == class)
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 {
            train.extend(members);
            continue;
        }
        members.shuffle(&mut rng);

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let held_out = ((members.len() as f64) * test_fraction).round() as usize;
        let held_out = held_out.clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..held_out]);
        train.extend_from_slice(&members[held_out..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(positives: usize, total: usize) -> Vec<bool> {
        (0..total).map(|i| i < positives).collect()
    }

    #[test]
    fn preserves_label_ratio() {
        let y = labels(10, 100);
        let split = stratified_split(&y, 0.2, 42);
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.iter().filter(|&&i| y[i]).count(), 2);
        assert_eq!(split.train.iter().filter(|&&i| y[i]).count(), 8);
    }

    #[test]
    fn minority_class_lands_in_both_partitions() {
        let y = labels(2, 50);
        let split = stratified_split(&y, 0.2, 42);
        assert!(split.test.iter().any(|&i| y[i]));
        assert!(split.train.iter().any(|&i| y[i]));
    }

    #[test]
    fn partitions_cover_every_index_once() {
        let y = labels(7, 31);
        let split = stratified_split(&y, 0.25, 9);
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..31).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_split() {
        let y = labels(12, 60);
        assert_eq!(stratified_split(&y, 0.2, 42), stratified_split(&y, 0.2, 42));
    }

    #[test]
    fn singleton_class_stays_in_train() {
        let y = labels(1, 10);
        let split = stratified_split(&y, 0.2, 42);
        assert!(split.train.contains(&0));
        assert!(!split.test.contains(&0));
    }
}
