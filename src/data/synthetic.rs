//! Seeded synthetic digit images.
//!
//! Each class is drawn as a seven-segment glyph on a 28x28 canvas, with a
//! random shift, stroke intensity and background noise per sample. The
//! result is a small, learnable stand-in for MNIST that needs no files.

use crate::data::{Dataset, IMG_H, IMG_W, NUM_CLASSES};
use crate::utils::SimpleRng;

// Segment rectangles (row range, col range) on an unshifted canvas:
// a top, b upper right, c lower right, d bottom, e lower left, f upper left,
// g middle.
const SEGMENTS: [((usize, usize), (usize, usize)); 7] = [
    ((4, 6), (8, 20)),
    ((4, 14), (18, 20)),
    ((14, 24), (18, 20)),
    ((22, 24), (8, 20)),
    ((14, 24), (8, 10)),
    ((4, 14), (8, 10)),
    ((13, 15), (8, 20)),
];

// Bit i set => segment i lit, in the order above.
const GLYPHS: [u8; NUM_CLASSES] = [
    0b011_1111, // 0: a b c d e f
    0b000_0110, // 1: b c
    0b101_1011, // 2: a b d e g
    0b100_1111, // 3: a b c d g
    0b110_0110, // 4: b c f g
    0b110_1101, // 5: a c d f g
    0b111_1101, // 6: a c d e f g
    0b000_0111, // 7: a b c
    0b111_1111, // 8: all
    0b110_1111, // 9: a b c d f g
];

const MAX_SHIFT: i32 = 3;

/// Generate `count` labelled images with labels cycling through all classes.
pub fn synthetic_digits(count: usize, rng: &mut SimpleRng) -> Dataset {
    let mut images = vec![0.0f32; count * IMG_H * IMG_W];
    let mut labels = Vec::with_capacity(count);

    for (n, image) in images.chunks_exact_mut(IMG_H * IMG_W).enumerate() {
        let label = (n % NUM_CLASSES) as u8;
        labels.push(label);

        for px in image.iter_mut() {
            *px = rng.gen_range_f32(0.0, 0.1);
        }

        let dy = rng.gen_usize((2 * MAX_SHIFT + 1) as usize) as i32 - MAX_SHIFT;
        let dx = rng.gen_usize((2 * MAX_SHIFT + 1) as usize) as i32 - MAX_SHIFT;
        let intensity = rng.gen_range_f32(0.6, 1.0);

        for (seg, &((r0, r1), (c0, c1))) in SEGMENTS.iter().enumerate() {
            if GLYPHS[label as usize] & (1 << seg) == 0 {
                continue;
            }
            for r in r0..r1 {
                for c in c0..c1 {
                    let y = (r as i32 + dy) as usize;
                    let x = (c as i32 + dx) as usize;
                    image[y * IMG_W + x] = intensity;
                }
            }
        }
    }

    // Shapes are constructed consistently above, so this cannot fail.
    Dataset::new(images, labels, &[1, IMG_H, IMG_W], NUM_CLASSES)
        .unwrap_or_else(|e| unreachable!("synthetic dataset is well-formed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_and_labels() {
        let mut rng = SimpleRng::new(5);
        let ds = synthetic_digits(25, &mut rng);
        assert_eq!(ds.len(), 25);
        assert_eq!(ds.sample_shape(), &[1, 28, 28]);
        assert_eq!(ds.labels()[..12], [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 1]);
    }

    #[test]
    fn test_pixels_in_unit_range() {
        let mut rng = SimpleRng::new(5);
        let ds = synthetic_digits(10, &mut rng);
        for i in 0..ds.len() {
            let (image, _) = ds.sample(i).unwrap();
            assert!(image.iter().all(|&p| (0.0..=1.0).contains(&p)));
        }
    }

    #[test]
    fn test_classes_differ() {
        let mut rng = SimpleRng::new(5);
        let ds = synthetic_digits(10, &mut rng);
        let lit = |i: usize| ds.sample(i).unwrap().0.iter().filter(|&&p| p >= 0.6).count();
        // "8" lights every segment, "1" only two
        assert!(lit(8) > lit(1));
    }

    #[test]
    fn test_seeded() {
        let a = synthetic_digits(5, &mut SimpleRng::new(9));
        let b = synthetic_digits(5, &mut SimpleRng::new(9));
        assert_eq!(a.sample(3), b.sample(3));
    }
}
