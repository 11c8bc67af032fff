//! Pixel block manipulation: block output, edge emulation and half-pel motion compensation.
use super::*;

/// Puts YUV420 16x16 macroblock data onto picture in the requested place.
pub fn put_blocks(buf: &mut VideoBuffer<u8>, xpos: usize, ypos: usize, blk: &[[i16;64]; 6]) {
    let stridey = buf.get_stride(0);
    let strideu = buf.get_stride(1);
    let stridev = buf.get_stride(2);
    let mut idxy = buf.get_offset(0) + xpos * 16 + ypos * 16 * stridey;
    let mut idxu = buf.get_offset(1) + xpos *  8 + ypos *  8 * strideu;
    let mut idxv = buf.get_offset(2) + xpos *  8 + ypos *  8 * stridev;

    let data = buf.get_data_mut().unwrap();
    let framebuf: &mut [u8] = data.as_mut_slice();

    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[0][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[1][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k + 8] = v as u8;
        }
        idxy += stridey;
    }
    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[2][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[3][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k + 8] = v as u8;
        }
        idxy += stridey;
    }

    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[4][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxu + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[5][k + j * 8];
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxv + k] = v as u8;
        }
        idxu += strideu;
        idxv += stridev;
    }
}

/// Adds YUV420 16x16 macroblock coefficients to the picture in the requested place.
pub fn add_blocks(buf: &mut VideoBuffer<u8>, xpos: usize, ypos: usize, blk: &[[i16;64]; 6]) {
    let stridey = buf.get_stride(0);
    let strideu = buf.get_stride(1);
    let stridev = buf.get_stride(2);
    let mut idxy = buf.get_offset(0) + xpos * 16 + ypos * 16 * stridey;
    let mut idxu = buf.get_offset(1) + xpos *  8 + ypos *  8 * strideu;
    let mut idxv = buf.get_offset(2) + xpos *  8 + ypos *  8 * stridev;

    let data = buf.get_data_mut().unwrap();
    let framebuf: &mut [u8] = data.as_mut_slice();

    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[0][k + j * 8] + i16::from(framebuf[idxy + k]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[1][k + j * 8] + i16::from(framebuf[idxy + k + 8]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k + 8] = v as u8;
        }
        idxy += stridey;
    }
    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[2][k + j * 8] + i16::from(framebuf[idxy + k]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[3][k + j * 8] + i16::from(framebuf[idxy + k + 8]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxy + k + 8] = v as u8;
        }
        idxy += stridey;
    }

    for j in 0..8 {
        for k in 0..8 {
            let mut v = blk[4][k + j * 8] + i16::from(framebuf[idxu + k]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxu + k] = v as u8;
        }
        for k in 0..8 {
            let mut v = blk[5][k + j * 8] + i16::from(framebuf[idxv + k]);
            if v < 0 { v = 0; } else if v > 255 { v = 255; }
            framebuf[idxv + k] = v as u8;
        }
        idxu += strideu;
        idxv += stridev;
    }
}

/// Copies block from the picture with pixels beyond the picture borders being replaced with replicated edge pixels.
pub fn edge_emu(src: &VideoBuffer<u8>, xpos: isize, ypos: isize, bw: usize, bh: usize,
                dst: &mut [u8], dstride: usize, comp: usize) {
    let stride = src.get_stride(comp);
    let offs   = src.get_offset(comp);
    let (w, h) = src.get_dimensions(comp);
    let data = src.get_data();
    let framebuf: &[u8] = data.as_slice();

    for y in 0..bh {
        let srcy;
        if (y as isize) + ypos < 0 { srcy = 0; }
        else if (y as isize) + ypos >= (h as isize) { srcy = h - 1; }
        else { srcy = ((y as isize) + ypos) as usize; }

        for x in 0..bw {
            let srcx;
            if (x as isize) + xpos < 0 { srcx = 0; }
            else if (x as isize) + xpos >= (w as isize) { srcx = w - 1; }
            else { srcx = ((x as isize) + xpos) as usize; }
            dst[x + y * dstride] = framebuf[offs + srcx + srcy * stride];
        }
    }
}

/// A generic type for motion interpolation function used by [`copy_block`]
///
/// The function expects following parameters:
/// * destination buffer
/// * destination buffer stride
/// * source buffer
/// * source buffer stride
/// * block width
/// * block height
///
/// [`copy_block`]: ./fn.copy_block.html
pub type BlkInterpFunc = fn(&mut [u8], usize, &[u8], usize, usize, usize);

/// Performs motion compensation on an arbitrary block on some plane.
///
/// Arguments:
/// * `dx` and `dy` - destination coordinates
/// * `mv_x` and `mv_y` - motion in full pixels
/// * `bw` and `bh` - block dimensions
/// * `preborder` and `postborder` - number of pixels before and after interpolated one used by the interpolation filter.
/// * `mode` - interpolation mode (essentially the index for the `interp` array)
pub fn copy_block(dst: &mut SimpleVideoFrame<u8>, src: VideoBufferRef<u8>, comp: usize,
                  dx: usize, dy: usize, mv_x: i16, mv_y: i16, bw: usize, bh: usize,
                  preborder: usize, postborder: usize,
                  mode: usize, interp: &[BlkInterpFunc])
{
    let pre  = if mode != 0 { preborder  as isize } else { 0 };
    let post = if mode != 0 { postborder as isize } else { 0 };
    let (w, h) = src.get_dimensions(comp);
    let sx = (dx as isize) + (mv_x as isize);
    let sy = (dy as isize) + (mv_y as isize);

    if (sx - pre < 0) || (sx + (bw as isize) + post > (w as isize)) ||
       (sy - pre < 0) || (sy + (bh as isize) + post > (h as isize)) {
        let ebuf_stride: usize = 32;
        let mut ebuf: Vec<u8> = vec![0; ebuf_stride * (bh + ((pre + post) as usize))];

        let dstride = dst.stride[comp];
        let doff    = dst.offset[comp];
        let edge = (pre + post) as usize;
        edge_emu(&src, sx - pre, sy - pre, bw + edge, bh + edge,
                 ebuf.as_mut_slice(), ebuf_stride, comp);
        (interp[mode])(&mut dst.data[doff + dx + dy * dstride..], dstride,
                       ebuf.as_slice(), ebuf_stride, bw, bh);
    } else {
        let sstride = src.get_stride(comp);
        let soff    = src.get_offset(comp);
        let sdta    = src.get_data();
        let sbuf: &[u8] = sdta.as_slice();
        let dstride = dst.stride[comp];
        let doff    = dst.offset[comp];
        let saddr = soff + ((sx - pre) as usize) + ((sy - pre) as usize) * sstride;
        (interp[mode])(&mut dst.data[doff + dx + dy * dstride..], dstride,
                       &sbuf[saddr..], sstride, bw, bh);
    }
}

/// Performs motion compensation of a whole macroblock with a single vector in half-pel units.
pub fn copy_mb(dst: &mut VideoBuffer<u8>, src: VideoBufferRef<u8>,
               xpos: usize, ypos: usize, mv: MV, interp: &[BlkInterpFunc]) {
    let mode = ((mv.x & 1) + (mv.y & 1) * 2) as usize;
    let cmode = (if (mv.x & 3) != 0 { 1 } else { 0 }) + (if (mv.y & 3) != 0 { 2 } else { 0 });

    let mut dst = SimpleVideoFrame::from_video_buf(dst).unwrap();

    copy_block(&mut dst, src.clone(), 0, xpos, ypos, mv.x >> 1, mv.y >> 1, 16, 16, 0, 1, mode, interp);
    copy_block(&mut dst, src.clone(), 1, xpos >> 1, ypos >> 1, mv.x >> 2, mv.y >> 2, 8, 8, 0, 1, cmode, interp);
    copy_block(&mut dst, src,         2, xpos >> 1, ypos >> 1, mv.x >> 2, mv.y >> 2, 8, 8, 0, 1, cmode, interp);
}

/// Rounding for the chroma vector derived from four luma vectors.
pub const CHROMA_ROUND: [i16; 16] = [ 0, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1 ];

/// Performs motion compensation of a macroblock with four per-block vectors in half-pel units.
pub fn copy_mb_4mv(dst: &mut VideoBuffer<u8>, src: VideoBufferRef<u8>,
                   xpos: usize, ypos: usize, mvs: &[MV; 4], interp: &[BlkInterpFunc]) {
    let mut dst = SimpleVideoFrame::from_video_buf(dst).unwrap();

    for i in 0..4 {
        let xadd = (i & 1) * 8;
        let yadd = (i & 2) * 4;
        let mode = ((mvs[i].x & 1) + (mvs[i].y & 1) * 2) as usize;

        copy_block(&mut dst, src.clone(), 0, xpos + xadd, ypos + yadd, mvs[i].x >> 1, mvs[i].y >> 1, 8, 8, 0, 1, mode, interp);
    }

    let sum_mv = mvs[0] + mvs[1] + mvs[2] + mvs[3];
    let cmx = (sum_mv.x >> 3) + CHROMA_ROUND[(sum_mv.x & 0xF) as usize];
    let cmy = (sum_mv.y >> 3) + CHROMA_ROUND[(sum_mv.y & 0xF) as usize];
    let mode = ((cmx & 1) + (cmy & 1) * 2) as usize;
    for plane in 1..3 {
        copy_block(&mut dst, src.clone(), plane, xpos >> 1, ypos >> 1, cmx >> 1, cmy >> 1, 8, 8, 0, 1, mode, interp);
    }
}

fn interp00(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw { dst[didx + x] = src[sidx + x]; }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp01(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw { dst[didx + x] = (((src[sidx + x] as u16) + (src[sidx + x + 1] as u16) + 1) >> 1) as u8; }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp10(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw { dst[didx + x] = (((src[sidx + x] as u16) + (src[sidx + x + sstride] as u16) + 1) >> 1) as u8; }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp11(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw {
            dst[didx + x] = (((src[sidx + x] as u16) +
                              (src[sidx + x + 1] as u16) +
                              (src[sidx + x + sstride] as u16) +
                              (src[sidx + x + sstride + 1] as u16) + 2) >> 2) as u8;
        }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp01_nornd(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw { dst[didx + x] = (((src[sidx + x] as u16) + (src[sidx + x + 1] as u16)) >> 1) as u8; }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp10_nornd(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw { dst[didx + x] = (((src[sidx + x] as u16) + (src[sidx + x + sstride] as u16)) >> 1) as u8; }
        didx += dstride;
        sidx += sstride;
    }
}

fn interp11_nornd(dst: &mut [u8], dstride: usize, src: &[u8], sstride: usize, bw: usize, bh: usize)
{
    let mut didx = 0;
    let mut sidx = 0;
    for _ in 0..bh {
        for x in 0..bw {
            dst[didx + x] = (((src[sidx + x] as u16) +
                              (src[sidx + x + 1] as u16) +
                              (src[sidx + x + sstride] as u16) +
                              (src[sidx + x + sstride + 1] as u16) + 1) >> 2) as u8;
        }
        didx += dstride;
        sidx += sstride;
    }
}

/// Half-pixel interpolation functions rounding ties up (`rounding_type` 0).
pub const INTERP_FUNCS: &[BlkInterpFunc] = &[
        interp00, interp01, interp10, interp11 ];

/// Half-pixel interpolation functions rounding ties down (`rounding_type` 1).
pub const INTERP_FUNCS_NORND: &[BlkInterpFunc] = &[
        interp00, interp01_nornd, interp10_nornd, interp11_nornd ];

#[cfg(test)]
mod test {
    use super::*;
    use m4v_core::frame::{alloc_video_buffer, VideoInfo};

    fn gradient_frame() -> VideoBufferRef<u8> {
        let mut buf = alloc_video_buffer(VideoInfo::new(64, 64), 4).unwrap();
        let stride = buf.get_stride(0);
        let off = buf.get_offset(0);
        let data = buf.get_data_mut().unwrap();
        for y in 0..64 {
            for x in 0..64 {
                data[off + x + y * stride] = ((x * 3 + y * 5) & 0xFF) as u8;
            }
        }
        buf.into_ref()
    }

    #[test]
    fn put_add_clip() {
        let mut buf = alloc_video_buffer(VideoInfo::new(32, 32), 4).unwrap();
        let mut blk = [[0i16; 64]; 6];
        blk[0][0] = 300;
        blk[1][0] = -5;
        blk[4][0] = 100;
        put_blocks(&mut buf, 0, 0, &blk);
        let stride = buf.get_stride(0);
        {
            let data = buf.get_data();
            assert_eq!(data[0], 255);
            assert_eq!(data[8], 0);
            assert_eq!(data[buf.get_offset(1)], 100);
            assert_eq!(data[1 + stride], 0);
        }
        let mut resid = [[0i16; 64]; 6];
        resid[0][0] = -200;
        add_blocks(&mut buf, 0, 0, &resid);
        assert_eq!(buf.get_data()[0], 55);
    }

    #[test]
    fn edge_replication() {
        let src = gradient_frame();
        let mut dst = [0u8; 8 * 8];
        edge_emu(&src, -4, -4, 8, 8, &mut dst, 8, 0);
        // top-left corner replicated
        assert_eq!(dst[0], src.get_data()[src.get_offset(0)]);
        assert_eq!(dst[3], dst[0]);
        edge_emu(&src, 60, 60, 8, 8, &mut dst, 8, 0);
        let stride = src.get_stride(0);
        let corner = src.get_data()[src.get_offset(0) + 63 + 63 * stride];
        assert_eq!(dst[63], corner);
    }

    #[test]
    fn halfpel_rounding() {
        let src = [10u8, 13, 0, 0];
        let mut dst = [0u8; 2];
        interp01(&mut dst, 2, &src, 4, 1, 1);
        assert_eq!(dst[0], 12);
        interp01_nornd(&mut dst, 2, &src, 4, 1, 1);
        assert_eq!(dst[0], 11);
    }

    #[test]
    fn zero_mv_copy_matches_source() {
        let src = gradient_frame();
        let mut dst = alloc_video_buffer(VideoInfo::new(64, 64), 4).unwrap();
        copy_mb(&mut dst, src.clone(), 16, 16, ZERO_MV, INTERP_FUNCS);
        let stride = dst.get_stride(0);
        let off = dst.get_offset(0) + 16 + 16 * stride;
        let soff = src.get_offset(0) + 16 + 16 * src.get_stride(0);
        let ddata = dst.get_data();
        let sdata = src.get_data();
        for y in 0..16 {
            assert_eq!(&ddata[off + y * stride..][..16], &sdata[soff + y * src.get_stride(0)..][..16]);
        }
    }
}
