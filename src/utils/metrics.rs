//! Classification metrics over batched predictions.

use crate::tensor::TensorBuffer;

/// Index of the largest value in `row` (first occurrence wins).
pub fn argmax(row: &[f32]) -> usize {
    let mut best = 0usize;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Number of rows of `predictions` whose argmax equals the label.
pub fn correct_count(predictions: &TensorBuffer, labels: &[u8]) -> usize {
    let classes = predictions.sample_len();
    if classes == 0 {
        return 0;
    }
    predictions
        .data()
        .chunks_exact(classes)
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label as usize)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_ties_take_first() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[5.0]), 0);
    }

    #[test]
    fn test_correct_count() {
        let preds =
            TensorBuffer::from_vec(&[3, 2], vec![0.9, 0.1, 0.2, 0.8, 0.6, 0.4]).unwrap();
        assert_eq!(correct_count(&preds, &[0, 1, 1]), 2);
        assert_eq!(correct_count(&preds, &[]), 0);
    }
}
