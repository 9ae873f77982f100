/// Split `items` into consecutive batches of `size` items; the last batch
/// holds the remainder.
///
/// Produces `ceil(len / size)` batches and concatenating them in order gives
/// back `items` exactly. An empty input yields no batches. A `size` of zero
/// is treated as one.
pub fn partition<T>(items: &[T], size: usize) -> Vec<&[T]> {
    items.chunks(size.max(1)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(25, 10, vec![10, 10, 5])]
    #[case(20, 10, vec![10, 10])]
    #[case(3, 10, vec![3])]
    #[case(1, 1, vec![1])]
    #[case(7, 1, vec![1; 7])]
    #[case(0, 10, vec![])]
    #[case(4, 0, vec![1; 4])]
    fn test_partition_sizes(#[case] len: usize, #[case] size: usize, #[case] expected: Vec<usize>) {
        let items: Vec<usize> = (0..len).collect();
        let sizes: Vec<usize> = partition(&items, size).iter().map(|b| b.len()).collect();
        assert_eq!(sizes, expected);
        assert_eq!(sizes.len(), len.div_ceil(size.max(1)));
    }

    #[test]
    fn test_partition_is_stable_and_total() {
        for len in 0..50 {
            let items: Vec<usize> = (0..len).collect();
            for size in 1..12 {
                let batches = partition(&items, size);
                assert!(batches.iter().rev().skip(1).all(|b| b.len() == size));
                assert_eq!(batches.concat(), items);
            }
        }
    }
}
