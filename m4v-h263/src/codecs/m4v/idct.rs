//! Fixed-point inverse 8x8 DCT.
//!
//! The general transform runs a column pass followed by a row pass. On top of
//! it there are kernels specialised for sparsely populated blocks, selected by
//! the nonzero coefficient count and the row/column occupancy bitmaps gathered
//! during coefficient decoding. The specialised kernels merely drop terms that
//! are known to be zero, so their output is identical to the general path.

const W1: i32 = 2841;
const W2: i32 = 2676;
const W3: i32 = 2408;
const W5: i32 = 1609;
const W6: i32 = 1108;
const W7: i32 =  565;
const W8: i32 =  181;

const COL_SHIFT: u8 = 8;
const ROW_SHIFT: u8 = 14;

// sparse dispatch is worth it only for mostly empty blocks
const SPARSE_COEF_LIMIT: usize = 10;

// the inputs to this butterfly can reach about 2^27 for full-range
// coefficients, so the product needs more than 32 bits
fn mul_w8(val: i32) -> i32 {
    ((i64::from(W8) * i64::from(val) + 128) >> 8) as i32
}

fn idct_col(blk: &mut [i16; 64], off: usize) {
    let in0 = ((i32::from(blk[off]))       << 11) + (1 << (COL_SHIFT - 1));
    let in1 =  (i32::from(blk[off + 4*8])) << 11;
    let in2 =   i32::from(blk[off + 6*8]);
    let in3 =   i32::from(blk[off + 2*8]);
    let in4 =   i32::from(blk[off + 1*8]);
    let in5 =   i32::from(blk[off + 7*8]);
    let in6 =   i32::from(blk[off + 5*8]);
    let in7 =   i32::from(blk[off + 3*8]);

    let tmp = W7 * (in4 + in5);
    let a4 = tmp + (W1 - W7) * in4;
    let a5 = tmp - (W1 + W7) * in5;

    let tmp = W3 * (in6 + in7);
    let a6 = tmp - (W3 - W5) * in6;
    let a7 = tmp - (W3 + W5) * in7;

    let tmp = in0 + in1;

    let a0 = in0 - in1;
    let t1 = W6 * (in2 + in3);
    let a2 = t1 - (W2 + W6) * in2;
    let a3 = t1 + (W2 - W6) * in3;
    let b1 = a4 + a6;

    let b4 = a4 - a6;
    let t2 = a5 - a7;
    let b6 = a5 + a7;
    let b7 = tmp + a3;
    let b5 = tmp - a3;
    let b3 = a0 + a2;
    let b0 = a0 - a2;
    let b2 = mul_w8(b4 + t2);
    let b4 = mul_w8(b4 - t2);

    blk[off]       = ((b7 + b1) >> COL_SHIFT) as i16;
    blk[off + 7*8] = ((b7 - b1) >> COL_SHIFT) as i16;
    blk[off + 1*8] = ((b3 + b2) >> COL_SHIFT) as i16;
    blk[off + 6*8] = ((b3 - b2) >> COL_SHIFT) as i16;
    blk[off + 2*8] = ((b0 + b4) >> COL_SHIFT) as i16;
    blk[off + 5*8] = ((b0 - b4) >> COL_SHIFT) as i16;
    blk[off + 3*8] = ((b5 + b6) >> COL_SHIFT) as i16;
    blk[off + 4*8] = ((b5 - b6) >> COL_SHIFT) as i16;
}

fn idct_row(row: &mut [i16]) {
    let in0 = ((i32::from(row[0])) << 8) + (1 << (ROW_SHIFT - 1));
    let in1 =  (i32::from(row[4])) << 8;
    let in2 =   i32::from(row[6]);
    let in3 =   i32::from(row[2]);
    let in4 =   i32::from(row[1]);
    let in5 =   i32::from(row[7]);
    let in6 =   i32::from(row[5]);
    let in7 =   i32::from(row[3]);

    let tmp = W7 * (in4 + in5);
    let a4 = (tmp + (W1 - W7) * in4) >> 3;
    let a5 = (tmp - (W1 + W7) * in5) >> 3;

    let tmp = W3 * (in6 + in7);
    let a6 = (tmp - (W3 - W5) * in6) >> 3;
    let a7 = (tmp - (W3 + W5) * in7) >> 3;

    let tmp = in0 + in1;

    let a0 = in0 - in1;
    let t1 = W6 * (in2 + in3);
    let a2 = (t1 - (W2 + W6) * in2) >> 3;
    let a3 = (t1 + (W2 - W6) * in3) >> 3;
    let b1 = a4 + a6;

    let b4 = a4 - a6;
    let t2 = a5 - a7;
    let b6 = a5 + a7;
    let b7 = tmp + a3;
    let b5 = tmp - a3;
    let b3 = a0 + a2;
    let b0 = a0 - a2;
    let b2 = mul_w8(b4 + t2);
    let b4 = mul_w8(b4 - t2);

    row[0] = ((b7 + b1) >> ROW_SHIFT) as i16;
    row[7] = ((b7 - b1) >> ROW_SHIFT) as i16;
    row[1] = ((b3 + b2) >> ROW_SHIFT) as i16;
    row[6] = ((b3 - b2) >> ROW_SHIFT) as i16;
    row[2] = ((b0 + b4) >> ROW_SHIFT) as i16;
    row[5] = ((b0 - b4) >> ROW_SHIFT) as i16;
    row[3] = ((b5 + b6) >> ROW_SHIFT) as i16;
    row[4] = ((b5 - b6) >> ROW_SHIFT) as i16;
}

/// Performs the full inverse transform without sparsity shortcuts.
pub fn idct(blk: &mut [i16; 64]) {
    for i in 0..8 { idct_col(blk, i); }
    for i in 0..8 { idct_row(&mut blk[i * 8..][..8]); }
}

// Specialised column kernels. The index selects how many of the top rows may
// hold nonzero coefficients; dropped terms are exactly zero so the result
// matches the general kernel.

fn idct_col1(blk: &mut [i16; 64], off: usize) {
    let dc = ((((i32::from(blk[off])) << 11) + (1 << (COL_SHIFT - 1))) >> COL_SHIFT) as i16;
    for i in 0..8 { blk[off + i*8] = dc; }
}

fn idct_col2(blk: &mut [i16; 64], off: usize) {
    let in0 = ((i32::from(blk[off]))       << 11) + (1 << (COL_SHIFT - 1));
    let in4 =   i32::from(blk[off + 1*8]);

    let a4 = W1 * in4;
    let a5 = W7 * in4;
    let b2 = mul_w8(a4 + a5);
    let b4 = mul_w8(a4 - a5);

    blk[off]       = ((in0 + a4) >> COL_SHIFT) as i16;
    blk[off + 7*8] = ((in0 - a4) >> COL_SHIFT) as i16;
    blk[off + 1*8] = ((in0 + b2) >> COL_SHIFT) as i16;
    blk[off + 6*8] = ((in0 - b2) >> COL_SHIFT) as i16;
    blk[off + 2*8] = ((in0 + b4) >> COL_SHIFT) as i16;
    blk[off + 5*8] = ((in0 - b4) >> COL_SHIFT) as i16;
    blk[off + 3*8] = ((in0 + a5) >> COL_SHIFT) as i16;
    blk[off + 4*8] = ((in0 - a5) >> COL_SHIFT) as i16;
}

fn idct_col4(blk: &mut [i16; 64], off: usize) {
    let in0 = ((i32::from(blk[off]))       << 11) + (1 << (COL_SHIFT - 1));
    let in3 =   i32::from(blk[off + 2*8]);
    let in4 =   i32::from(blk[off + 1*8]);
    let in7 =   i32::from(blk[off + 3*8]);

    let a4 =  W1 * in4;
    let a5 =  W7 * in4;
    let a6 =  W3 * in7;
    let a7 = -W5 * in7;
    let a2 =  W6 * in3;
    let a3 =  W2 * in3;
    let b1 = a4 + a6;

    let b4 = a4 - a6;
    let t2 = a5 - a7;
    let b6 = a5 + a7;
    let b7 = in0 + a3;
    let b5 = in0 - a3;
    let b3 = in0 + a2;
    let b0 = in0 - a2;
    let b2 = mul_w8(b4 + t2);
    let b4 = mul_w8(b4 - t2);

    blk[off]       = ((b7 + b1) >> COL_SHIFT) as i16;
    blk[off + 7*8] = ((b7 - b1) >> COL_SHIFT) as i16;
    blk[off + 1*8] = ((b3 + b2) >> COL_SHIFT) as i16;
    blk[off + 6*8] = ((b3 - b2) >> COL_SHIFT) as i16;
    blk[off + 2*8] = ((b0 + b4) >> COL_SHIFT) as i16;
    blk[off + 5*8] = ((b0 - b4) >> COL_SHIFT) as i16;
    blk[off + 3*8] = ((b5 + b6) >> COL_SHIFT) as i16;
    blk[off + 4*8] = ((b5 - b6) >> COL_SHIFT) as i16;
}

// Specialised row kernels, indexed by how many leading columns may be nonzero.

fn idct_row1(row: &mut [i16]) {
    let dc = ((((i32::from(row[0])) << 8) + (1 << (ROW_SHIFT - 1))) >> ROW_SHIFT) as i16;
    for el in row.iter_mut().take(8) { *el = dc; }
}

fn idct_row2(row: &mut [i16]) {
    let in0 = ((i32::from(row[0])) << 8) + (1 << (ROW_SHIFT - 1));
    let in4 =   i32::from(row[1]);

    let a4 = (W1 * in4) >> 3;
    let a5 = (W7 * in4) >> 3;
    let b2 = mul_w8(a4 + a5);
    let b4 = mul_w8(a4 - a5);

    row[0] = ((in0 + a4) >> ROW_SHIFT) as i16;
    row[7] = ((in0 - a4) >> ROW_SHIFT) as i16;
    row[1] = ((in0 + b2) >> ROW_SHIFT) as i16;
    row[6] = ((in0 - b2) >> ROW_SHIFT) as i16;
    row[2] = ((in0 + b4) >> ROW_SHIFT) as i16;
    row[5] = ((in0 - b4) >> ROW_SHIFT) as i16;
    row[3] = ((in0 + a5) >> ROW_SHIFT) as i16;
    row[4] = ((in0 - a5) >> ROW_SHIFT) as i16;
}

fn idct_row4(row: &mut [i16]) {
    let in0 = ((i32::from(row[0])) << 8) + (1 << (ROW_SHIFT - 1));
    let in3 =   i32::from(row[2]);
    let in4 =   i32::from(row[1]);
    let in7 =   i32::from(row[3]);

    let a4 = ( W1 * in4) >> 3;
    let a5 = ( W7 * in4) >> 3;
    let a6 = ( W3 * in7) >> 3;
    let a7 = (-W5 * in7) >> 3;
    let a2 = ( W6 * in3) >> 3;
    let a3 = ( W2 * in3) >> 3;
    let b1 = a4 + a6;

    let b4 = a4 - a6;
    let t2 = a5 - a7;
    let b6 = a5 + a7;
    let b7 = in0 + a3;
    let b5 = in0 - a3;
    let b3 = in0 + a2;
    let b0 = in0 - a2;
    let b2 = mul_w8(b4 + t2);
    let b4 = mul_w8(b4 - t2);

    row[0] = ((b7 + b1) >> ROW_SHIFT) as i16;
    row[7] = ((b7 - b1) >> ROW_SHIFT) as i16;
    row[1] = ((b3 + b2) >> ROW_SHIFT) as i16;
    row[6] = ((b3 - b2) >> ROW_SHIFT) as i16;
    row[2] = ((b0 + b4) >> ROW_SHIFT) as i16;
    row[5] = ((b0 - b4) >> ROW_SHIFT) as i16;
    row[3] = ((b5 + b6) >> ROW_SHIFT) as i16;
    row[4] = ((b5 - b6) >> ROW_SHIFT) as i16;
}

type ColKernel = fn(&mut [i16; 64], usize);
type RowKernel = fn(&mut [i16]);

const COL_KERNELS: [ColKernel; 4] = [ idct_col1, idct_col2, idct_col4, idct_col ];
const ROW_KERNELS: [RowKernel; 4] = [ idct_row1, idct_row2, idct_row4, idct_row ];

fn kernel_index(mask: u8) -> usize {
    if mask < 0x02 { 0 } else if mask < 0x04 { 1 } else if mask < 0x10 { 2 } else { 3 }
}

/// Performs the inverse transform choosing a kernel set by block sparsity.
///
/// `count` is the number of nonzero coefficients, `row_mask` and `col_mask`
/// are occupancy bitmaps with bit N set when row/column N holds any nonzero
/// coefficient. The masks may overestimate the occupancy but must never miss
/// a nonzero coefficient. Output is identical to [`idct`] for any valid input.
pub fn block_idct(blk: &mut [i16; 64], count: usize, row_mask: u8, col_mask: u8) {
    if count > SPARSE_COEF_LIMIT {
        idct(blk);
        return;
    }
    if (row_mask | col_mask) <= 1 {
        let dc = ((i32::from(blk[0]) + 4) >> 3) as i16;
        *blk = [dc; 64];
        return;
    }
    let col_kernel = COL_KERNELS[kernel_index(row_mask)];
    for i in 0..8 {
        if (col_mask >> i) & 1 != 0 {
            col_kernel(blk, i);
        }
    }
    let row_kernel = ROW_KERNELS[kernel_index(col_mask)];
    for i in 0..8 {
        row_kernel(&mut blk[i * 8..][..8]);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Lcg(u32);
    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1664525).wrapping_add(1013904223);
            self.0 >> 8
        }
    }

    fn random_sparse_block(rng: &mut Lcg, ncoeffs: usize) -> ([i16; 64], u8, u8) {
        let mut blk = [0i16; 64];
        let mut row_mask = 0u8;
        let mut col_mask = 0u8;
        for _ in 0..ncoeffs {
            let idx = (rng.next() % 64) as usize;
            let val = ((rng.next() % 4096) as i32 - 2048) as i16;
            blk[idx] = val;
            if val != 0 {
                row_mask |= 1 << (idx >> 3);
                col_mask |= 1 << (idx & 7);
            }
        }
        (blk, row_mask, col_mask)
    }

    #[test]
    fn sparse_matches_general() {
        let mut rng = Lcg(42);
        for ncoeffs in 1..=10 {
            for _ in 0..200 {
                let (blk, row_mask, col_mask) = random_sparse_block(&mut rng, ncoeffs);
                let mut fast = blk;
                let mut full = blk;
                block_idct(&mut fast, ncoeffs, row_mask, col_mask);
                idct(&mut full);
                assert_eq!(fast, full, "mismatch for {} coeffs", ncoeffs);
            }
        }
    }

    #[test]
    fn dc_only() {
        for dc in [-2048i16, -1000, -8, -1, 0, 1, 7, 8, 100, 2047] {
            let mut blk = [0i16; 64];
            blk[0] = dc;
            let mut full = blk;
            block_idct(&mut blk, 1, 1, 1);
            idct(&mut full);
            assert_eq!(blk, full);
            assert_eq!(blk[0], ((i32::from(dc) + 4) >> 3) as i16);
            assert!(blk.iter().all(|&v| v == blk[0]));
        }
    }

    #[test]
    fn full_range_levels() {
        // alternating extremes drive the butterflies to their widest values
        let mut blk = [0i16; 64];
        for (i, el) in blk.iter_mut().enumerate() {
            *el = if i % 2 == 0 { 2047 } else { -2048 };
        }
        let mut fast = blk;
        let mut full = blk;
        block_idct(&mut fast, 64, 0xFF, 0xFF);
        idct(&mut full);
        assert_eq!(fast, full);

        // sparse extremes go through the specialised kernels
        let mut blk = [0i16; 64];
        let mut row_mask = 0u8;
        let mut col_mask = 0u8;
        for &idx in [1usize, 3, 5, 7, 8, 24, 40, 56].iter() {
            blk[idx] = if (idx & 1) != 0 { 2047 } else { -2048 };
            row_mask |= 1 << (idx >> 3);
            col_mask |= 1 << (idx & 7);
        }
        let mut fast = blk;
        let mut full = blk;
        block_idct(&mut fast, 8, row_mask, col_mask);
        idct(&mut full);
        assert_eq!(fast, full);
    }

    #[test]
    fn zero_block() {
        let mut blk = [0i16; 64];
        idct(&mut blk);
        assert_eq!(blk, [0i16; 64]);
    }

    #[test]
    fn dense_goes_through_general_path() {
        let mut rng = Lcg(7);
        let mut blk = [0i16; 64];
        for el in blk.iter_mut() {
            *el = ((rng.next() % 512) as i32 - 256) as i16;
        }
        let mut fast = blk;
        let mut full = blk;
        block_idct(&mut fast, 64, 0xFF, 0xFF);
        idct(&mut full);
        assert_eq!(fast, full);
    }
}
