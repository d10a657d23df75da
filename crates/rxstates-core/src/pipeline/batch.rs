//! Partitioning records into fixed-size batches.

use crate::types::PharmacyRecord;

/// A contiguous run of input rows sent to the provider in one call.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based batch number
    pub index: usize,
    /// Records in input order
    pub records: Vec<PharmacyRecord>,
}

impl Batch {
    pub fn new(index: usize, records: Vec<PharmacyRecord>) -> Self {
        Self { index, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Number of batches needed for `rows` rows.
pub fn batch_count(rows: usize, batch_size: usize) -> usize {
    rows.div_ceil(batch_size)
}

/// Split records into batches of `batch_size`; the last may be smaller.
///
/// `batch_size` must be non-zero.
pub fn partition(records: &[PharmacyRecord], batch_size: usize) -> Vec<Batch> {
    records
        .chunks(batch_size)
        .enumerate()
        .map(|(index, chunk)| Batch::new(index, chunk.to_vec()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;

    #[test]
    fn test_65_rows_in_batches_of_30() {
        let batches = partition(&fixtures::records(65), 30);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![30, 30, 5]);
        assert_eq!(batches[1].records[0].row_index, 30);
        assert_eq!(batches[2].records[0].id, "P61");
    }

    #[test]
    fn test_every_row_in_exactly_one_batch() {
        for n in [1usize, 2, 29, 30, 31, 59, 60, 61, 100] {
            let records = fixtures::records(n);
            for b in [1usize, 7, 30, 64, 200] {
                let batches = partition(&records, b);
                assert_eq!(batches.len(), batch_count(n, b), "n={n} b={b}");

                let rows: Vec<usize> = batches
                    .iter()
                    .flat_map(|batch| batch.records.iter().map(|r| r.row_index))
                    .collect();
                assert_eq!(rows, (0..n).collect::<Vec<_>>(), "n={n} b={b}");

                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    assert!(!batch.is_empty() && batch.len() <= b);
                }
            }
        }
    }

    #[test]
    fn test_empty_input_has_no_batches() {
        assert!(partition(&[], 30).is_empty());
        assert_eq!(batch_count(0, 30), 0);
    }
}
