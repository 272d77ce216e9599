//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical 112×112 RGB crop using the five
//! InsightFace reference landmarks and least-squares estimation.

use ndarray::{Array3, ArrayView3};

/// ArcFace reference landmarks for a 112×112 output.
pub(crate) const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub(crate) const ALIGNED_SIZE: usize = 112;

/// Estimate a 2×3 similarity transform (scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Normal equations for A * [a, b, tx, ty]^T = B, two rows per point:
    //   sx * a - sy * b + tx = dx
    //   sy * a + sx * b + ty = dy
    let mut ata = [0.0f32; 16];
    let mut atb = [0.0f32; 4];

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let r1 = [sx, -sy, 1.0, 0.0];
        let r2 = [sy, sx, 0.0, 1.0];

        for j in 0..4 {
            for k in 0..4 {
                ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
            }
            atb[j] += r1[j] * dx + r2[j] * dy;
        }
    }

    let [a, b, tx, ty] = solve_4x4(&ata, &atb);
    [a, -b, tx, b, a, ty]
}

/// Solve a 4×4 linear system via Gaussian elimination with partial pivoting.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut max_row = col;
        let mut max_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }
        m.swap(col, max_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }

    x
}

/// Apply a 2×3 similarity warp to an `(h, w, c)` tensor, producing an
/// `out_size × out_size` crop. Bilinear sampling; out-of-bounds is black.
fn warp_affine(image: ArrayView3<'_, i32>, matrix: &[f32; 6], out_size: usize) -> Array3<u8> {
    let (src_height, src_width, channels) = image.dim();
    let (a, tx) = (matrix[0], matrix[2]);
    let (b, ty) = (matrix[3], matrix[5]);

    let mut output = Array3::<u8>::zeros((out_size, out_size, channels));

    // Inverse of [[a, -b], [b, a]] scales by 1 / (a^2 + b^2).
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return output;
    }
    let ia = a / det;
    let ib = b / det;

    for oy in 0..out_size {
        for ox in 0..out_size {
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            for c in 0..channels {
                let sample = |x: i32, y: i32| -> f32 {
                    if x >= 0 && x < src_width as i32 && y >= 0 && y < src_height as i32 {
                        image[[y as usize, x as usize, c]] as f32
                    } else {
                        0.0
                    }
                };

                let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1) * fx * fy;

                output[[oy, ox, c]] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    output
}

/// Align a detected face to a canonical 112×112 RGB crop suitable for
/// ArcFace embedding extraction.
pub fn align_face(image: ArrayView3<'_, i32>, landmarks: &[(f32, f32); 5]) -> Array3<u8> {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(image, &matrix, ALIGNED_SIZE)
}
