//! Edge deblocking and deringing.
//!
//! Two users share the filter kernels here: the Annex J in-loop filter that
//! runs on the reference picture one macroblock row at a time, and the
//! optional output-only post processor driven by per-block coefficient
//! semaphores. The semaphore maps are double buffered so skipped macroblocks
//! can carry the previous frame's values.
use std::mem;
use super::super::*;
use super::PostFilterMode;
use super::CBPInfo;

const FILTER_STRENGTH: [u8; 32] = [
    1,  1,  2,  2,  3,  3,  4,  4,  4,  5,  5,  5,  6,  6,  7,  7,
    7,  8,  8,  8,  9,  9,  9, 10, 10, 10, 11, 11, 11, 12, 12, 12
];

/// Maximum per-block semaphore value.
const SEMA_MAX: u8 = 63;

fn filter_strength(q: u8) -> u8 {
    if q < 32 { FILTER_STRENGTH[q as usize] } else { 0 }
}

fn deblock_hor(buf: &mut VideoBuffer<u8>, comp: usize, strength: u8, off: usize) {
    let stride = buf.get_stride(comp);
    let dptr = buf.get_data_mut().unwrap();
    let buf = dptr.as_mut_slice();
    for x in 0..8 {
        let a = i16::from(buf[off - 2 * stride + x]);
        let b = i16::from(buf[off -     stride + x]);
        let c = i16::from(buf[off              + x]);
        let d = i16::from(buf[off +     stride + x]);
        let diff = ((a - d) + (c - b) * 4) / 8;
        if (diff != 0) && (diff > -24) && (diff < 24) {
            let d1a = (diff.abs() - 2 * (diff.abs() - i16::from(strength)).max(0)).max(0);
            let d1  = if diff < 0 { -d1a } else { d1a };
            let hd1 = d1a / 2;
            let d2  = ((a - d) / 4).max(-hd1).min(hd1);

            buf[off - 2 * stride + x] = (a - d2) as u8;
            buf[off -     stride + x] = (b + d1).max(0).min(255) as u8;
            buf[off              + x] = (c - d1).max(0).min(255) as u8;
            buf[off +     stride + x] = (d + d2) as u8;
        }
    }
}

fn deblock_ver(buf: &mut VideoBuffer<u8>, comp: usize, strength: u8, off: usize) {
    let stride = buf.get_stride(comp);
    let dptr = buf.get_data_mut().unwrap();
    let buf = dptr.as_mut_slice();
    for y in 0..8 {
        let a = i16::from(buf[off - 2 + y * stride]);
        let b = i16::from(buf[off - 1 + y * stride]);
        let c = i16::from(buf[off     + y * stride]);
        let d = i16::from(buf[off + 1 + y * stride]);
        let diff = (a - d + (c - b) * 4) / 8;
        if (diff != 0) && (diff > -24) && (diff < 24) {
            let d1a = (diff.abs() - 2 * (diff.abs() - i16::from(strength)).max(0)).max(0);
            let d1  = if diff < 0 { -d1a } else { d1a };
            let hd1 = d1a / 2;
            let d2  = ((a - d) / 4).max(-hd1).min(hd1);

            buf[off - 2 + y * stride] = (a - d2) as u8;
            buf[off - 1 + y * stride] = (b + d1).max(0).min(255) as u8;
            buf[off     + y * stride] = (c - d1).max(0).min(255) as u8;
            buf[off + 1 + y * stride] = (d + d2) as u8;
        }
    }
}

/// Annex J in-loop edge filter for one finished macroblock row. Edges are
/// filtered only between coded blocks, with the strength taken from the
/// quantiser on the lower/right side.
pub fn filter_row(buf: &mut VideoBuffer<u8>, mb_y: usize, mb_w: usize, cbpi: &CBPInfo) {
    let stride  = buf.get_stride(0);
    let mut off = buf.get_offset(0) + mb_y * 16 * stride;
    for mb_x in 0..mb_w {
        let coff = off;
        let coded0 = cbpi.is_coded(mb_x, 0);
        let coded1 = cbpi.is_coded(mb_x, 1);
        let q = cbpi.get_q(mb_w + mb_x);
        let strength = filter_strength(q);
        if mb_y != 0 {
            if coded0 && cbpi.is_coded_top(mb_x, 0) { deblock_hor(buf, 0, strength, coff); }
            if coded1 && cbpi.is_coded_top(mb_x, 1) { deblock_hor(buf, 0, strength, coff + 8); }
        }
        let coff = off + 8 * stride;
        if cbpi.is_coded(mb_x, 2) && coded0 { deblock_hor(buf, 0, strength, coff); }
        if cbpi.is_coded(mb_x, 3) && coded1 { deblock_hor(buf, 0, strength, coff + 8); }
        off += 16;
    }
    let mut leftt = false;
    let mut leftc = false;
    let mut off = buf.get_offset(0) + mb_y * 16 * stride;
    for mb_x in 0..mb_w {
        let ctop0 = cbpi.is_coded_top(mb_x, 0);
        let ctop1 = cbpi.is_coded_top(mb_x, 1);
        let ccur0 = cbpi.is_coded(mb_x, 0);
        let ccur1 = cbpi.is_coded(mb_x, 1);
        let q = cbpi.get_q(mb_w + mb_x);
        let strength = filter_strength(q);
        if mb_y != 0 {
            let coff = off - 8 * stride;
            let qtop = cbpi.get_q(mb_x);
            let strtop = filter_strength(qtop);
            if leftt && ctop0 { deblock_ver(buf, 0, strtop, coff); }
            if ctop0 && ctop1 { deblock_ver(buf, 0, strtop, coff + 8); }
        }
        if leftc && ccur0 { deblock_ver(buf, 0, strength, off); }
        if ccur0 && ccur1 { deblock_ver(buf, 0, strength, off + 8); }
        leftt = ctop1;
        leftc = ccur1;
        off += 16;
    }
    let strideu = buf.get_stride(1);
    let stridev = buf.get_stride(2);
    let offu = buf.get_offset(1) + mb_y * 8 * strideu;
    let offv = buf.get_offset(2) + mb_y * 8 * stridev;
    if mb_y != 0 {
        for mb_x in 0..mb_w {
            let ctu = cbpi.is_coded_top(mb_x, 4);
            let ccu = cbpi.is_coded(mb_x, 4);
            let ctv = cbpi.is_coded_top(mb_x, 5);
            let ccv = cbpi.is_coded(mb_x, 5);
            let q = cbpi.get_q(mb_w + mb_x);
            let strength = filter_strength(q);
            if ctu && ccu { deblock_hor(buf, 1, strength, offu + mb_x * 8); }
            if ctv && ccv { deblock_hor(buf, 2, strength, offv + mb_x * 8); }
        }
        let mut leftu = false;
        let mut leftv = false;
        let offu = buf.get_offset(1) + (mb_y - 1) * 8 * strideu;
        let offv = buf.get_offset(2) + (mb_y - 1) * 8 * stridev;
        for mb_x in 0..mb_w {
            let ctu = cbpi.is_coded_top(mb_x, 4);
            let ctv = cbpi.is_coded_top(mb_x, 5);
            let qt = cbpi.get_q(mb_x);
            let strt = filter_strength(qt);
            if leftu && ctu { deblock_ver(buf, 1, strt, offu + mb_x * 8); }
            if leftv && ctv { deblock_ver(buf, 2, strt, offv + mb_x * 8); }
            leftu = ctu;
            leftv = ctv;
        }
    }
}

const DERING_KERNEL: [[u16; 3]; 3] = [
    [ 1, 2, 1 ],
    [ 2, 4, 2 ],
    [ 1, 2, 1 ]
];

/// Smooths the inner pixels of one 8x8 block whose 3x3 neighbourhood lies
/// entirely on one side of the block intensity threshold.
fn dering_block(data: &mut [u8], off: usize, stride: usize) {
    let mut blk = [[0u8; 8]; 8];
    for (y, row) in blk.iter_mut().enumerate() {
        for (x, el) in row.iter_mut().enumerate() {
            *el = data[off + x + y * stride];
        }
    }
    let mut bmin = 255u8;
    let mut bmax = 0u8;
    for row in blk.iter() {
        for &p in row.iter() {
            bmin = bmin.min(p);
            bmax = bmax.max(p);
        }
    }
    let thr = (u16::from(bmax) + u16::from(bmin) + 1) / 2;
    for y in 1..7 {
        for x in 1..7 {
            let mut hi = 0;
            for dy in 0..3 {
                for dx in 0..3 {
                    if u16::from(blk[y + dy - 1][x + dx - 1]) >= thr { hi += 1; }
                }
            }
            if hi == 0 || hi == 9 {
                let mut sum = 0u16;
                for dy in 0..3 {
                    for dx in 0..3 {
                        sum += u16::from(blk[y + dy - 1][x + dx - 1]) * DERING_KERNEL[dy][dx];
                    }
                }
                data[off + x + y * stride] = ((sum + 8) >> 4) as u8;
            }
        }
    }
}

/// Output-only deblocking/deringing post processor.
///
/// Each 8x8 block carries a semaphore counting its nonzero quantised AC
/// coefficients (capped at [`SEMA_MAX`]). Edges next to a nonzero semaphore
/// are deblocked and blocks with a nonzero semaphore are deringed. The maps
/// are double buffered: skipped macroblocks reuse the previous frame's
/// values, concealed macroblocks get the maximum.
pub struct PostProc {
    mode: PostFilterMode,
    mb_w: usize,
    mb_h: usize,
    cur:  [Vec<u8>; 3],
    prev: [Vec<u8>; 3],
    qmap: Vec<u8>,
}

impl PostProc {
    pub fn new(mode: PostFilterMode, mb_w: usize, mb_h: usize) -> Self {
        let luma   = vec![0; mb_w * mb_h * 4];
        let chroma = vec![0; mb_w * mb_h];
        PostProc {
            mode, mb_w, mb_h,
            cur:  [luma.clone(), chroma.clone(), chroma.clone()],
            prev: [luma, chroma.clone(), chroma],
            qmap: vec![0; mb_w * mb_h],
        }
    }
    pub fn reset(&mut self) {
        for plane in self.cur.iter_mut().chain(self.prev.iter_mut()) {
            for el in plane.iter_mut() { *el = 0; }
        }
        for el in self.qmap.iter_mut() { *el = 0; }
    }
    pub fn start_frame(&mut self) {
        // every macroblock is set, carried or concealed, so nothing to clear
    }
    fn luma_idx(&self, mb_x: usize, mb_y: usize, blk: usize) -> usize {
        (mb_x * 2 + (blk & 1)) + (mb_y * 2 + (blk >> 1)) * self.mb_w * 2
    }
    pub fn set_mb(&mut self, mb_x: usize, mb_y: usize, q: u8, sema: &[u8; 6]) {
        for blk in 0..4 {
            let idx = self.luma_idx(mb_x, mb_y, blk);
            self.cur[0][idx] = sema[blk].min(SEMA_MAX);
        }
        self.cur[1][mb_x + mb_y * self.mb_w] = sema[4].min(SEMA_MAX);
        self.cur[2][mb_x + mb_y * self.mb_w] = sema[5].min(SEMA_MAX);
        self.qmap[mb_x + mb_y * self.mb_w] = q;
    }
    pub fn carry_mb(&mut self, mb_x: usize, mb_y: usize) {
        for blk in 0..4 {
            let idx = self.luma_idx(mb_x, mb_y, blk);
            self.cur[0][idx] = self.prev[0][idx];
        }
        let idx = mb_x + mb_y * self.mb_w;
        self.cur[1][idx] = self.prev[1][idx];
        self.cur[2][idx] = self.prev[2][idx];
    }
    /// Reuses the whole previous map, for frames that repeat the reference.
    pub fn carry_frame(&mut self) {
        for mb_y in 0..self.mb_h {
            for mb_x in 0..self.mb_w {
                self.carry_mb(mb_x, mb_y);
            }
        }
    }
    pub fn conceal_mb(&mut self, mb_x: usize, mb_y: usize, q: u8) {
        for blk in 0..4 {
            let idx = self.luma_idx(mb_x, mb_y, blk);
            self.cur[0][idx] = SEMA_MAX;
        }
        let idx = mb_x + mb_y * self.mb_w;
        self.cur[1][idx] = SEMA_MAX;
        self.cur[2][idx] = SEMA_MAX;
        self.qmap[idx] = q;
    }
    fn mb_q(&self, bx: usize, by: usize, luma: bool) -> u8 {
        let shift = if luma { 1 } else { 0 };
        self.qmap[(bx >> shift) + (by >> shift) * self.mb_w]
    }
    fn deblock_plane(&self, buf: &mut VideoBuffer<u8>, comp: usize) {
        let luma = comp == 0;
        let (sw, sh) = if luma { (self.mb_w * 2, self.mb_h * 2) } else { (self.mb_w, self.mb_h) };
        let stride = buf.get_stride(comp);
        let base = buf.get_offset(comp);
        let sema = &self.cur[comp];
        // vertical block edges over the whole plane, then horizontal ones
        for by in 0..sh {
            for bx in 1..sw {
                if sema[bx + by * sw] == 0 && sema[bx - 1 + by * sw] == 0 { continue; }
                let strength = filter_strength(self.mb_q(bx, by, luma));
                deblock_ver(buf, comp, strength, base + bx * 8 + by * 8 * stride);
            }
        }
        for by in 1..sh {
            for bx in 0..sw {
                if sema[bx + by * sw] == 0 && sema[bx + (by - 1) * sw] == 0 { continue; }
                let strength = filter_strength(self.mb_q(bx, by, luma));
                deblock_hor(buf, comp, strength, base + bx * 8 + by * 8 * stride);
            }
        }
    }
    fn dering_plane(&self, buf: &mut VideoBuffer<u8>, comp: usize) {
        let luma = comp == 0;
        let (sw, sh) = if luma { (self.mb_w * 2, self.mb_h * 2) } else { (self.mb_w, self.mb_h) };
        let stride = buf.get_stride(comp);
        let base = buf.get_offset(comp);
        for by in 0..sh {
            for bx in 0..sw {
                if self.cur[comp][bx + by * sw] == 0 { continue; }
                let off = base + bx * 8 + by * 8 * stride;
                let dptr = buf.get_data_mut().unwrap();
                dering_block(dptr.as_mut_slice(), off, stride);
            }
        }
    }
    /// Filters the output copy of the decoded frame in place.
    pub fn filter_frame(&mut self, buf: &mut VideoBuffer<u8>) {
        if self.mode.deblock {
            for comp in 0..3 {
                self.deblock_plane(buf, comp);
            }
        }
        if self.mode.dering {
            for comp in 0..3 {
                self.dering_plane(buf, comp);
            }
        }
    }
    /// Makes the current semaphore maps the reference for the next frame.
    pub fn end_frame(&mut self) {
        mem::swap(&mut self.cur, &mut self.prev);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn make_buf(w: usize, h: usize, val: u8) -> VideoBuffer<u8> {
        let mut buf = alloc_video_buffer(VideoInfo::new(w, h), 4).unwrap();
        for el in buf.get_data_mut().unwrap().iter_mut() { *el = val; }
        buf
    }

    fn put_step_edge(buf: &mut VideoBuffer<u8>, lo: u8, hi: u8) {
        // vertical luma step at x = 8
        let stride = buf.get_stride(0);
        let off = buf.get_offset(0);
        let data = buf.get_data_mut().unwrap();
        for y in 0..16 {
            for x in 0..16 {
                data[off + x + y * stride] = if x < 8 { lo } else { hi };
            }
        }
    }

    #[test]
    fn deblock_softens_step_edge() {
        let mut buf = make_buf(16, 16, 128);
        put_step_edge(&mut buf, 100, 120);
        let mut pp = PostProc::new(PostFilterMode { deblock: true, dering: false }, 1, 1);
        pp.set_mb(0, 0, 10, &[1, 1, 1, 1, 0, 0]);
        pp.filter_frame(&mut buf);
        let stride = buf.get_stride(0);
        let off = buf.get_offset(0);
        let data = buf.get_data();
        // diff = 7, strength 5: d1 = 3, d2 clamps to -1
        assert_eq!(data[off + 6], 101);
        assert_eq!(data[off + 7], 103);
        assert_eq!(data[off + 8], 117);
        assert_eq!(data[off + 9], 119);
        // away from the edge nothing changes
        assert_eq!(data[off], 100);
        assert_eq!(data[off + 15 + 15 * stride], 120);
    }

    #[test]
    fn zero_semaphores_leave_frame_alone() {
        let mut buf = make_buf(16, 16, 128);
        put_step_edge(&mut buf, 100, 120);
        let want = buf.get_data().clone();
        let mut pp = PostProc::new(PostFilterMode { deblock: true, dering: true }, 1, 1);
        pp.set_mb(0, 0, 10, &[0; 6]);
        pp.filter_frame(&mut buf);
        assert_eq!(buf.get_data(), &want);
    }

    #[test]
    fn carried_semaphores_survive_frame_swap() {
        let mut pp = PostProc::new(PostFilterMode { deblock: true, dering: false }, 1, 1);
        pp.set_mb(0, 0, 10, &[1, 2, 3, 4, 5, 6]);
        pp.end_frame();
        pp.carry_mb(0, 0);
        assert_eq!(pp.cur[0][0], 1);
        assert_eq!(pp.cur[0][1], 2);
        assert_eq!(pp.cur[1][0], 5);
        assert_eq!(pp.cur[2][0], 6);
    }

    #[test]
    fn dering_keeps_flat_blocks() {
        let mut buf = make_buf(16, 16, 90);
        let want = buf.get_data().clone();
        let mut pp = PostProc::new(PostFilterMode { deblock: false, dering: true }, 1, 1);
        pp.set_mb(0, 0, 10, &[1; 6]);
        pp.filter_frame(&mut buf);
        assert_eq!(buf.get_data(), &want);
    }

    #[test]
    fn dering_smooths_uniform_side() {
        // flat 100 block with one outlier: pixels whose whole neighbourhood
        // stays below the threshold are smoothed, the outlier's own
        // neighbourhood straddles it and is left alone
        let mut buf = make_buf(16, 16, 100);
        let stride = buf.get_stride(0);
        let off = buf.get_offset(0);
        buf.get_data_mut().unwrap()[off + 3 + 3 * stride] = 120;
        let mut pp = PostProc::new(PostFilterMode { deblock: false, dering: true }, 1, 1);
        pp.set_mb(0, 0, 10, &[1, 0, 0, 0, 0, 0]);
        pp.filter_frame(&mut buf);
        let data = buf.get_data();
        assert_eq!(data[off + 3 + 3 * stride], 120);
        assert_eq!(data[off + 5 + 5 * stride], 100);
        assert_eq!(data[off + 1 + 1 * stride], 100);
    }
}
