//! MPEG-4 Simple Profile / H.263 baseline macroblock decoder.
//!
//! The decoder reconstructs one frame per call from an elementary-stream VOP
//! or short-header picture. Corrupt packets are concealed deterministically
//! from the reference frame, so a complete frame buffer is always produced.
use super::MV;

#[allow(clippy::needless_range_loop)]
pub mod bitstream;
pub mod data;
pub mod decoder;
#[allow(clippy::erasing_op)]
#[allow(clippy::many_single_char_names)]
pub mod idct;
pub mod postfilter;

pub use self::decoder::M4VDecoder;

/// Frame types produced by the decoder.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum Type {
    I, P, Skip
}

/// Post-decode filtering requested from the decoder.
#[derive(Debug,Clone,Copy,Default,PartialEq)]
pub struct PostFilterMode {
    pub deblock: bool,
    pub dering:  bool,
}

impl PostFilterMode {
    pub fn is_active(self) -> bool { self.deblock || self.dering }
}

/// Stream-level decoder configuration, established once per stream.
#[derive(Debug,Clone,Copy)]
pub struct DecoderConfig {
    /// Luma width in pixels.
    pub width:              usize,
    /// Luma height in pixels.
    pub height:             usize,
    /// H.263 baseline short header instead of MPEG-4 start codes.
    pub short_video_header: bool,
    /// MPEG-4 data partitioning (headers and residuals split per packet).
    pub data_partitioned:   bool,
    /// Annex T modified quantisation.
    pub modified_quant:     bool,
    /// Annex I advanced intra coding.
    pub advanced_intra:     bool,
    /// Annex K slice structured mode (resync without GOB numbering).
    pub slice_structure:    bool,
    /// Annex J in-loop deblocking.
    pub deblocking:         bool,
    /// Number of bits in the VOP time increment field.
    pub time_inc_bits:      u8,
    /// Optional output-only post filter.
    pub postfilter:         PostFilterMode,
}

impl DecoderConfig {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width, height,
            short_video_header: false,
            data_partitioned:   false,
            modified_quant:     false,
            advanced_intra:     false,
            slice_structure:    false,
            deblocking:         false,
            time_inc_bits:      4,
            postfilter:         PostFilterMode::default(),
        }
    }
}

/// Picture-level header data.
#[derive(Debug,Clone,Copy)]
pub struct PicInfo {
    pub mode:       Type,
    pub quant:      u8,
    pub rounding:   bool,
    pub fcode:      u8,
    pub dc_vlc_thr: u8,
    pub coded:      bool,
}

impl PicInfo {
    /// Reports whether predicted intra DC uses the variable-length code at the given quantiser.
    pub fn uses_dc_vlc(&self, quant: u8) -> bool {
        quant < data::DC_VLC_THRESHOLD[self.dc_vlc_thr as usize]
    }
}

/// Decoded video packet (or GOB) header.
#[derive(Debug,Clone,Copy)]
pub struct SliceInfo {
    pub mb_start: usize,
    pub quant:    u8,
}

impl SliceInfo {
    pub fn new(mb_start: usize, quant: u8) -> Self {
        SliceInfo { mb_start, quant }
    }
}

/// Per-slice decoding position state.
#[derive(Debug,Clone,Copy)]
pub struct SliceState {
    pub mb_x:       usize,
    pub mb_y:       usize,
    pub first_line: bool,
    pub first_mb:   bool,
    pub slice_mb_x: usize,
    pub slice_mb_y: usize,
    pub slice_no:   u16,
    pub quant:      u8,
}

impl SliceState {
    pub fn new() -> Self {
        SliceState {
            mb_x: 0, mb_y: 0, first_line: true, first_mb: true,
            slice_mb_x: 0, slice_mb_y: 0, slice_no: 0, quant: 0,
        }
    }
    pub fn next_mb(&mut self) {
        self.mb_x += 1; self.first_mb = false;
        if self.mb_x >= self.slice_mb_x && self.mb_y > self.slice_mb_y {
            self.first_line = false;
        }
    }
    pub fn new_row(&mut self) {
        self.mb_x = 0; self.mb_y += 1;
        if self.mb_x >= self.slice_mb_x && self.mb_y > self.slice_mb_y {
            self.first_line = false;
        }
        self.first_mb = true;
    }
    pub fn reset_slice(&mut self, smb_x: usize, smb_y: usize) {
        self.slice_mb_x = smb_x;
        self.slice_mb_y = smb_y;
        self.first_line = true;
        self.first_mb   = true;
        self.slice_no  += 1;
    }
    pub fn set_pos(&mut self, mb_w: usize, mb_pos: usize) {
        self.mb_x = mb_pos % mb_w;
        self.mb_y = mb_pos / mb_w;
        self.reset_slice(self.mb_x, self.mb_y);
    }
}

impl Default for SliceState {
    fn default() -> Self { Self::new() }
}

/// Explicit intra prediction direction (Annex I); the MPEG-4 path derives
/// the direction per block from the DC gradient instead.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum ACPredMode {
    None,
    DC,
    Hor,
    Ver,
}

/// Decoded macroblock header.
#[derive(Debug,Clone,Copy)]
pub struct BlockInfo {
    pub mode:   Type,
    pub intra:  bool,
    pub skip:   bool,
    pub cbp:    u8,
    pub q:      u8,
    pub mv:     [MV; 4],
    pub num_mv: usize,
    pub acpred: bool,
    pub aic:    ACPredMode,
}

impl BlockInfo {
    pub fn new(mode: Type, cbp: u8, q: u8) -> Self {
        BlockInfo {
            mode,
            intra:  mode == Type::I,
            skip:   (cbp == 0) && (mode != Type::I),
            cbp,
            q,
            mv:     [super::ZERO_MV; 4],
            num_mv: 0,
            acpred: false,
            aic:    ACPredMode::None,
        }
    }
    pub fn is_intra(&self) -> bool { self.intra }
    pub fn is_skipped(&self) -> bool { self.skip }
    pub fn set_mv(&mut self, mvs: &[MV]) {
        if !mvs.is_empty() { self.skip = false; }
        for (dst, src) in self.mv.iter_mut().zip(mvs.iter()) { *dst = *src; }
        self.num_mv = mvs.len();
    }
}

/// Two-row history of coded block patterns and quantisers, used by the
/// in-loop edge filter.
pub struct CBPInfo {
    cbp:    Vec<u8>,
    q:      Vec<u8>,
    mb_w:   usize,
}

impl CBPInfo {
    pub fn new() -> Self { CBPInfo { cbp: Vec::new(), q: Vec::new(), mb_w: 0 } }
    pub fn reset(&mut self, mb_w: usize) {
        self.mb_w = mb_w;
        self.cbp.clear();
        self.cbp.resize(self.mb_w * 2, 0);
        self.q.clear();
        self.q.resize(self.mb_w * 2, 0);
    }
    pub fn update_row(&mut self) {
        for i in 0..self.mb_w {
            self.cbp[i] = self.cbp[self.mb_w + i];
            self.q[i]   = self.q[self.mb_w + i];
        }
    }
    pub fn set_cbp(&mut self, mb_x: usize, cbp: u8) {
        self.cbp[self.mb_w + mb_x] = cbp;
    }
    pub fn set_q(&mut self, mb_x: usize, q: u8) {
        self.q[self.mb_w + mb_x] = q;
    }
    pub fn get_q(&self, mb_x: usize) -> u8 { self.q[mb_x] }
    pub fn is_coded(&self, mb_x: usize, blk_no: usize) -> bool {
        (self.cbp[self.mb_w + mb_x] & (1 << (5 - blk_no))) != 0
    }
    pub fn is_coded_top(&self, mb_x: usize, blk_no: usize) -> bool {
        let cbp     = self.cbp[self.mb_w + mb_x];
        let cbp_top = self.cbp[mb_x];
        match blk_no {
            0 => { (cbp_top & 0b001000) != 0 },
            1 => { (cbp_top & 0b000100) != 0 },
            2 => { (cbp     & 0b100000) != 0 },
            3 => { (cbp     & 0b010000) != 0 },
            4 => { (cbp_top & 0b000010) != 0 },
            _ => { (cbp_top & 0b000001) != 0 },
        }
    }
}

impl Default for CBPInfo {
    fn default() -> Self { Self::new() }
}
