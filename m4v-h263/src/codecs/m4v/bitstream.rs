//! Bitstream parsing: picture, packet and macroblock headers plus the
//! run-length coefficient layer.
//!
//! All functions here produce quantised coefficients; inverse quantisation
//! and prediction happen in the decoder driver so that nothing is committed
//! before a macroblock is known to have parsed cleanly.
use m4v_core::io::bitreader::*;
use m4v_core::io::codebook::*;
use m4v_core::codecs::{DecoderError, DecoderResult};
use super::super::MV;
use super::*;
use super::data::*;

pub const VOP_START_CODE: u32     = 0x000001B6;
pub const SHORT_START_MARKER: u32 = 0x000020;
pub const DC_MARKER: u32          = 0x6B001;
pub const MOTION_MARKER: u32      = 0x1F001;

/// All codebooks used by the macroblock layer, built once per decoder.
pub struct Tables {
    pub intra_mcbpc_cb: Codebook<u32>,
    pub inter_mcbpc_cb: Codebook<u32>,
    pub cbpy_cb:        Codebook<u32>,
    pub rl_cb:          Codebook<RLSym>,
    pub intra_rl_cb:    Codebook<RLSym>,
    pub mv_cb:          Codebook<u8>,
    pub dc_lum_cb:      Codebook<u32>,
    pub dc_chrom_cb:    Codebook<u32>,
}

impl Tables {
    pub fn new() -> Self {
        let mut coderead = ShortCodebookDescReader::new(MCBPC_INTRA.to_vec());
        let intra_mcbpc_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = ShortCodebookDescReader::new(MCBPC_INTER.to_vec());
        let inter_mcbpc_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = ShortCodebookDescReader::new(CBPY.to_vec());
        let cbpy_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = RLCodeReader::new(RL_INTER);
        let rl_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = RLCodeReader::new(RL_INTRA);
        let intra_rl_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = TableCodebookDescReader::new(&MV_CODES, &MV_BITS, |idx| idx as u8);
        let mv_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = ShortCodebookDescReader::new(DC_SIZE_LUMA.to_vec());
        let dc_lum_cb = Codebook::new(&mut coderead).unwrap();
        let mut coderead = ShortCodebookDescReader::new(DC_SIZE_CHROMA.to_vec());
        let dc_chrom_cb = Codebook::new(&mut coderead).unwrap();
        Tables {
            intra_mcbpc_cb, inter_mcbpc_cb, cbpy_cb,
            rl_cb, intra_rl_cb, mv_cb, dc_lum_cb, dc_chrom_cb,
        }
    }
}

impl Default for Tables {
    fn default() -> Self { Self::new() }
}

fn check_marker(br: &mut BitReader) -> DecoderResult<()> {
    let mark = br.read(1)?;
    validate!(mark == 1);
    Ok(())
}

/// Number of bits used for the macroblock number field in a packet header.
pub fn mb_num_bits(num_mb: usize) -> u8 {
    let mut bits = 1;
    while (1 << bits) < num_mb { bits += 1; }
    bits
}

/// Bit length of the resync marker for the given picture.
pub fn resync_marker_len(pinfo: &PicInfo) -> u8 {
    if pinfo.mode == Type::I { 17 } else { 16 + pinfo.fcode }
}

/// Bitstream reader for one coded picture.
pub struct VopBR<'a> {
    pub br:         BitReader<'a>,
    tables:         &'a Tables,
    short_header:   bool,
    modified_quant: bool,
    advanced_intra: bool,
    slice_structure: bool,
    time_inc_bits:  u8,
    mb_w:           usize,
    mb_h:           usize,
    num_mb:         usize,
    gob_no:         usize,
}

impl<'a> VopBR<'a> {
    pub fn new(src: &'a [u8], tables: &'a Tables, cfg: &DecoderConfig) -> Self {
        let mb_w = (cfg.width + 15) >> 4;
        let mb_h = (cfg.height + 15) >> 4;
        VopBR {
            br:             BitReader::new(src),
            tables,
            short_header:   cfg.short_video_header,
            modified_quant: cfg.modified_quant,
            advanced_intra: cfg.advanced_intra,
            slice_structure: cfg.slice_structure,
            time_inc_bits:  cfg.time_inc_bits,
            mb_w,
            mb_h,
            num_mb:         mb_w * mb_h,
            gob_no:         0,
        }
    }

    pub fn decode_pichdr(&mut self) -> DecoderResult<PicInfo> {
        if self.short_header {
            self.decode_pichdr_short()
        } else {
            self.decode_pichdr_vop()
        }
    }

    fn decode_pichdr_vop(&mut self) -> DecoderResult<PicInfo> {
        let br = &mut self.br;
        let startcode = br.read(32)?;
        validate!(startcode == VOP_START_CODE);
        let mode = match br.read(2)? {
                0 => Type::I,
                1 => Type::P,
                _ => return Err(DecoderError::NotImplemented),
            };
        while br.read_bool()? { }
        check_marker(br)?;
        br.read(self.time_inc_bits)?;
        check_marker(br)?;
        let coded = br.read_bool()?;
        if !coded {
            return Ok(PicInfo {
                mode: Type::Skip, quant: 0, rounding: false,
                fcode: 1, dc_vlc_thr: 0, coded: false,
            });
        }
        let rounding = if mode == Type::P { br.read_bool()? } else { false };
        let dc_vlc_thr = br.read(3)? as u8;
        let quant = br.read(5)? as u8;
        validate!(quant > 0);
        let fcode = if mode == Type::P {
                let fcode = br.read(3)? as u8;
                validate!(fcode > 0);
                fcode
            } else { 1 };
        Ok(PicInfo { mode, quant, rounding, fcode, dc_vlc_thr, coded: true })
    }

    fn decode_pichdr_short(&mut self) -> DecoderResult<PicInfo> {
        let br = &mut self.br;
        let startcode = br.read(22)?;
        validate!(startcode == SHORT_START_MARKER);
        br.read(8)?; // temporal reference
        check_marker(br)?;
        let zero = br.read(1)?;
        validate!(zero == 0);
        br.read(1)?; // split screen indicator
        br.read(1)?; // document camera indicator
        br.read(1)?; // freeze picture release
        let sfmt = br.read(3)? as usize;
        let (w, h) = SHORT_SRC_FORMATS[sfmt];
        validate!(w != 0);
        validate!((w + 15) >> 4 == self.mb_w);
        validate!((h + 15) >> 4 == self.mb_h);
        let mode = if !br.read_bool()? { Type::I } else { Type::P };
        let opt = br.read(4)?; // UMV, SAC, AP, PB
        validate!(opt == 0);
        let quant = br.read(5)? as u8;
        validate!(quant > 0);
        let cpm = br.read_bool()?;
        validate!(!cpm);
        while br.read_bool()? { // skip PEI
            br.read(8)?;
        }
        self.gob_no = 0;
        Ok(PicInfo {
            mode, quant, rounding: false,
            fcode: 1, dc_vlc_thr: 7, coded: true,
        })
    }

    pub fn decode_gob_header(&mut self) -> DecoderResult<SliceInfo> {
        let br = &mut self.br;
        let gbsc = br.read(17)?;
        validate!(gbsc == 1);
        let gn = br.read(5)? as usize;
        br.read(2)?; // GOB frame ID
        let gquant = br.read(5)? as u8;
        validate!(gquant > 0);
        validate!(gn * self.mb_w < self.num_mb);
        validate!(gn >= self.gob_no);
        self.gob_no = gn + 1;
        Ok(SliceInfo::new(gn * self.mb_w, gquant))
    }

    pub fn decode_packet_header(&mut self, pinfo: &PicInfo) -> DecoderResult<SliceInfo> {
        if self.short_header && !self.slice_structure {
            return self.decode_gob_header();
        }
        let marker_len = if self.short_header { 17 } else { resync_marker_len(pinfo) };
        let br = &mut self.br;
        let marker = br.read(marker_len)?;
        validate!(marker == 1);
        let mb_start = br.read(mb_num_bits(self.num_mb))? as usize;
        validate!(mb_start < self.num_mb);
        let quant = br.read(5)? as u8;
        validate!(quant > 0);
        let hec = if self.short_header { false } else { br.read_bool()? };
        if hec {
            while br.read_bool()? { }
            check_marker(br)?;
            br.read(self.time_inc_bits)?;
            check_marker(br)?;
            br.read(2)?; // coding type
            br.read(3)?; // intra DC threshold
            if pinfo.mode == Type::P {
                br.read(3)?; // fcode
            }
        }
        Ok(SliceInfo::new(mb_start, quant))
    }

    /// Consumes the stuffing pattern (a zero bit followed by ones up to the
    /// next byte boundary) if it is present at the current position.
    pub fn skip_stuffing(&mut self) {
        if self.short_header { return; }
        let to_align = (8 - (self.br.tell() & 7)) & 7;
        let nbits = if to_align == 0 { 8 } else { to_align as u8 };
        if (self.br.left() as usize) < usize::from(nbits) { return; }
        if self.br.peek(nbits) == (1 << (nbits - 1)) - 1 {
            let _ = self.br.skip(u32::from(nbits));
        }
    }

    /// Reports whether a resync marker (or GOB start code) follows the
    /// current position, without consuming anything.
    pub fn is_slice_end(&mut self, pinfo: &PicInfo) -> bool {
        let pos = self.br.tell();
        self.skip_stuffing();
        self.br.align();
        let marker_len = if self.short_header { 17 } else { resync_marker_len(pinfo) };
        let found = (self.br.left() >= isize::from(marker_len))
                    && (self.br.peek(marker_len) == 1);
        let _ = self.br.seek(pos as u32);
        found
    }

    /// Scans forward through byte-aligned positions for the next resync
    /// marker, leaving the reader right before it.
    pub fn search_resync(&mut self, pinfo: &PicInfo) -> DecoderResult<()> {
        let marker_len = if self.short_header { 17 } else { resync_marker_len(pinfo) };
        self.br.align();
        while self.br.left() >= isize::from(marker_len) {
            if self.br.peek(marker_len) == 1 {
                return Ok(());
            }
            self.br.skip(8)?;
        }
        Err(DecoderError::ShortData)
    }

    /// Checks for the marker separating the partitions of a packet and
    /// consumes it when present.
    pub fn check_part_marker(&mut self, pinfo: &PicInfo) -> bool {
        let (len, pattern) = if pinfo.mode == Type::I {
                (19, DC_MARKER)
            } else {
                (17, MOTION_MARKER)
            };
        if self.br.left() >= isize::from(len) && self.br.peek(len) == pattern {
            let _ = self.br.skip(u32::from(len));
            true
        } else {
            false
        }
    }

    /// Reads one intra MCBPC symbol, consuming stuffing codes.
    pub fn read_mcbpc_intra(&mut self) -> DecoderResult<u32> {
        let mut sym = self.br.read_cb(&self.tables.intra_mcbpc_cb)?;
        while sym == MCBPC_INTRA_STUFFING {
            sym = self.br.read_cb(&self.tables.intra_mcbpc_cb)?;
        }
        Ok(sym)
    }

    /// Reads one inter MCBPC symbol, consuming stuffing codes.
    pub fn read_mcbpc_inter(&mut self) -> DecoderResult<u32> {
        let mut sym = self.br.read_cb(&self.tables.inter_mcbpc_cb)?;
        while sym == MCBPC_INTER_STUFFING {
            sym = self.br.read_cb(&self.tables.inter_mcbpc_cb)?;
        }
        Ok(sym)
    }

    /// Reads the luma coded-block pattern; inter modes use the complemented symbol.
    pub fn read_cbpy(&mut self, intra: bool) -> DecoderResult<u8> {
        let sym = self.br.read_cb(&self.tables.cbpy_cb)? as u8;
        Ok(if intra { sym } else { 15 - sym })
    }

    pub fn read_acpred_flag(&mut self) -> DecoderResult<bool> {
        self.br.read_bool().map_err(|e| e.into())
    }

    /// Applies a coded quantiser change to `q` and clamps the result to `[1, 31]`.
    pub fn read_dquant(&mut self, q: u8) -> DecoderResult<u8> {
        let br = &mut self.br;
        let new_q = if self.modified_quant {
                if br.read_bool()? {
                    i16::from(br.read(5)? as u8)
                } else if br.read_bool()? {
                    i16::from(q) - 1
                } else {
                    i16::from(q) + 1
                }
            } else {
                let idx = br.read(2)? as usize;
                i16::from(q) + i16::from(DQUANT_TAB[idx])
            };
        Ok(new_q.max(1).min(31) as u8)
    }

    fn decode_acpred_aic(&mut self) -> DecoderResult<ACPredMode> {
        let br = &mut self.br;
        if !br.read_bool()? {
            Ok(ACPredMode::DC)
        } else if !br.read_bool()? {
            Ok(ACPredMode::Hor)
        } else {
            Ok(ACPredMode::Ver)
        }
    }

    /// Decodes one macroblock header in combined mode.
    pub fn decode_mb_header(&mut self, pinfo: &PicInfo, quant: u8) -> DecoderResult<BlockInfo> {
        match pinfo.mode {
            Type::I => self.decode_mb_header_intra(quant),
            Type::P => self.decode_mb_header_inter(pinfo, quant),
            Type::Skip => Err(DecoderError::Bug),
        }
    }

    fn decode_mb_header_intra(&mut self, quant: u8) -> DecoderResult<BlockInfo> {
        let mut q = quant;
        let sym = self.read_mcbpc_intra()?;
        let cbpc = (sym & 3) as u8;
        let dquant = (sym & 4) != 0;
        let mut acpred = false;
        let mut aic = ACPredMode::None;
        if self.short_header {
            if self.advanced_intra {
                aic = self.decode_acpred_aic()?;
            }
        } else {
            acpred = self.read_acpred_flag()?;
        }
        let cbpy = self.read_cbpy(true)?;
        if dquant {
            q = self.read_dquant(q)?;
        }
        let mut binfo = BlockInfo::new(Type::I, (cbpy << 2) | cbpc, q);
        binfo.acpred = acpred;
        binfo.aic = aic;
        Ok(binfo)
    }

    fn decode_mb_header_inter(&mut self, pinfo: &PicInfo, quant: u8) -> DecoderResult<BlockInfo> {
        let mut q = quant;
        if self.br.read_bool()? {
            return Ok(BlockInfo::new(Type::Skip, 0, q));
        }
        let sym = self.read_mcbpc_inter()?;
        let cbpc     = (sym & 3) as u8;
        let is_intra = (sym & 0x04) != 0;
        let dquant   = (sym & 0x08) != 0;
        let is_4mv   = (sym & 0x10) != 0;
        if is_intra {
            let mut acpred = false;
            let mut aic = ACPredMode::None;
            if self.short_header {
                if self.advanced_intra {
                    aic = self.decode_acpred_aic()?;
                }
            } else {
                acpred = self.read_acpred_flag()?;
            }
            let cbpy = self.read_cbpy(true)?;
            if dquant {
                q = self.read_dquant(q)?;
            }
            let mut binfo = BlockInfo::new(Type::I, (cbpy << 2) | cbpc, q);
            binfo.acpred = acpred;
            binfo.aic = aic;
            return Ok(binfo);
        }
        let cbpy = self.read_cbpy(false)?;
        if dquant {
            q = self.read_dquant(q)?;
        }
        let mut binfo = BlockInfo::new(Type::P, (cbpy << 2) | cbpc, q);
        if !is_4mv {
            let mv = self.decode_mv(pinfo.fcode)?;
            binfo.set_mv(&[mv]);
        } else {
            let mut mvs = [super::super::ZERO_MV; 4];
            for mv in mvs.iter_mut() {
                *mv = self.decode_mv(pinfo.fcode)?;
            }
            binfo.set_mv(&mvs);
        }
        Ok(binfo)
    }

    fn decode_mv_component(&mut self, fcode: u8) -> DecoderResult<i16> {
        let sym = i16::from(self.br.read_cb(&self.tables.mv_cb)?);
        if sym == 0 { return Ok(0); }
        let sign = self.br.read_bool()?;
        let val = if fcode > 1 {
                let residual = self.br.read(fcode - 1)? as i16;
                ((sym - 1) << (fcode - 1)) + residual + 1
            } else {
                sym
            };
        Ok(if sign { -val } else { val })
    }

    /// Decodes one motion vector difference.
    pub fn decode_mv(&mut self, fcode: u8) -> DecoderResult<MV> {
        let xval = self.decode_mv_component(fcode)?;
        let yval = self.decode_mv_component(fcode)?;
        Ok(MV::new(xval, yval))
    }

    /// Decodes the intra DC difference coded with the DC size codes.
    pub fn decode_dc_diff(&mut self, chroma: bool) -> DecoderResult<i16> {
        let cb = if chroma { &self.tables.dc_chrom_cb } else { &self.tables.dc_lum_cb };
        let size = self.br.read_cb(cb)? as u8;
        if size == 0 { return Ok(0); }
        let val = self.br.read(size)? as i16;
        let diff = if (val & (1 << (size - 1))) == 0 {
                val - (1 << size) + 1
            } else {
                val
            };
        if size > 8 {
            check_marker(&mut self.br)?;
        }
        Ok(diff)
    }

    /// Decodes the fixed-length intra DC used by the short header layout.
    pub fn decode_dc_flc(&mut self) -> DecoderResult<i16> {
        let mut dc = self.br.read(8)? as i16;
        validate!(dc != 0 && dc != 128);
        if dc == 255 { dc = 128; }
        Ok(dc)
    }

    fn decode_rl_event(&mut self, intra: bool) -> DecoderResult<(bool, u8, i16)> {
        let rl_cb = if intra && !self.short_header {
                &self.tables.intra_rl_cb
            } else {
                &self.tables.rl_cb
            };
        let rl_tab = if intra && !self.short_header { RL_INTRA } else { RL_INTER };
        let sym = self.br.read_cb(rl_cb)?;
        if !sym.is_escape() {
            let mut level = i16::from(sym.level);
            if self.br.read_bool()? { level = -level; }
            return Ok((sym.last, sym.run, level));
        }
        if self.short_header {
            let last = self.br.read_bool()?;
            let run = self.br.read(6)? as u8;
            let level = self.br.read_s(8)? as i16;
            validate!(level != 0 && level != -128);
            return Ok((last, run, level));
        }
        if !self.br.read_bool()? {
            // level magnitude offset by the table maximum for this run
            let sym = self.br.read_cb(rl_cb)?;
            validate!(!sym.is_escape());
            let lmax = i16::from(rl_max_level(rl_tab, sym.last, sym.run));
            validate!(lmax > 0);
            let mut level = i16::from(sym.level) + lmax;
            if self.br.read_bool()? { level = -level; }
            Ok((sym.last, sym.run, level))
        } else if !self.br.read_bool()? {
            // run offset by the table maximum for this level
            let sym = self.br.read_cb(rl_cb)?;
            validate!(!sym.is_escape());
            let rmax = rl_max_run(rl_tab, sym.last, sym.level);
            let run = sym.run + rmax + 1;
            let mut level = i16::from(sym.level);
            if self.br.read_bool()? { level = -level; }
            Ok((sym.last, run, level))
        } else {
            let last = self.br.read_bool()?;
            let run = self.br.read(6)? as u8;
            check_marker(&mut self.br)?;
            let level = self.br.read_s(12)? as i16;
            check_marker(&mut self.br)?;
            validate!(level != 0);
            Ok((last, run, level))
        }
    }

    /// Decodes the run-length coefficient layer of one block into `blk`
    /// (quantised values, in scan position), starting at index `start`.
    pub fn decode_ac_coeffs(&mut self, intra: bool, start: usize,
                            scan: &[usize; 64], blk: &mut [i16; 64]) -> DecoderResult<()> {
        let mut idx = start;
        loop {
            let (last, run, level) = self.decode_rl_event(intra)?;
            idx += usize::from(run);
            validate!(idx < 64);
            blk[scan[idx]] = level;
            idx += 1;
            if last { break; }
        }
        Ok(())
    }

    /// Decodes an intra block; the DC difference (when separately coded)
    /// lands in `blk[0]`, AC coefficients in scan positions.
    pub fn decode_block_intra(&mut self, use_dc_vlc: bool, chroma: bool, coded: bool,
                              scan: &[usize; 64], blk: &mut [i16; 64]) -> DecoderResult<()> {
        let mut start = 0;
        if self.short_header {
            blk[0] = self.decode_dc_flc()?;
            start = 1;
        } else if use_dc_vlc {
            blk[0] = self.decode_dc_diff(chroma)?;
            start = 1;
        }
        if !coded { return Ok(()); }
        self.decode_ac_coeffs(true, start, scan, blk)
    }

    /// Decodes an inter residual block (quantised values).
    pub fn decode_block_inter(&mut self, scan: &[usize; 64], blk: &mut [i16; 64]) -> DecoderResult<()> {
        self.decode_ac_coeffs(false, 0, scan, blk)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn cfg() -> DecoderConfig { DecoderConfig::new(176, 144) }

    #[test]
    fn vop_header_i() {
        // start code, I type, mtb end, marker, time inc 0, marker,
        // coded, dc thr 0, quant 12
        const SRC: [u8; 7] = [ 0x00, 0x00, 0x01, 0xB6, 0x10, 0xC3, 0x00 ];
        let tables = Tables::new();
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        let pinfo = bs.decode_pichdr().unwrap();
        assert_eq!(pinfo.mode, Type::I);
        assert_eq!(pinfo.quant, 12);
        assert!(pinfo.coded);
    }

    #[test]
    fn vop_header_not_coded() {
        // same as above but vop_coded = 0
        const SRC: [u8; 6] = [ 0x00, 0x00, 0x01, 0xB6, 0x10, 0x80 ];
        let tables = Tables::new();
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        let pinfo = bs.decode_pichdr().unwrap();
        assert!(!pinfo.coded);
    }

    #[test]
    fn bad_start_code() {
        const SRC: [u8; 4] = [ 0x00, 0x00, 0x01, 0xB3 ];
        let tables = Tables::new();
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        assert_eq!(bs.decode_pichdr().unwrap_err(), DecoderError::InvalidData);
    }

    #[test]
    fn dc_diff_signs() {
        // size 2 ("10") value 0b10 -> +2, size 2 value 0b01 -> -2
        const SRC: [u8; 2] = [ 0b10_10_10_01, 0 ];
        let tables = Tables::new();
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        assert_eq!(bs.decode_dc_diff(false).unwrap(), 2);
        assert_eq!(bs.decode_dc_diff(false).unwrap(), -2);
    }

    #[test]
    fn mv_long_range() {
        // fcode 2: magnitude code 2 ("001"), sign 0, residual 0
        // -> ((2 - 1) << 1) + 0 + 1 = 3
        const SRC: [u8; 1] = [ 0b001_0_0_000 ];
        let tables = Tables::new();
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        let x = bs.decode_mv_component(2).unwrap();
        assert_eq!(x, 3);
    }

    #[test]
    fn resync_scan() {
        let tables = Tables::new();
        // garbage byte, then a 17-bit I-frame resync marker at a byte boundary
        const SRC: [u8; 4] = [ 0x55, 0x00, 0x00, 0x80 ];
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        let pinfo = PicInfo { mode: Type::I, quant: 10, rounding: false, fcode: 1, dc_vlc_thr: 0, coded: true };
        bs.br.skip(3).unwrap();
        bs.search_resync(&pinfo).unwrap();
        assert_eq!(bs.br.tell(), 8);
        assert_eq!(bs.br.peek(17), 1);
    }

    #[test]
    fn stuffing_consumed() {
        let tables = Tables::new();
        const SRC: [u8; 2] = [ 0b101_01111, 0xFF ];
        let mut bs = VopBR::new(&SRC, &tables, &cfg());
        bs.br.skip(3).unwrap();
        bs.skip_stuffing();
        assert_eq!(bs.br.tell(), 8);
    }
}
