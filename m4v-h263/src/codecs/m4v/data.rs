//! VLC tables and fixed lookup data for the MPEG-4 / H.263 macroblock layer.
//!
//! The run-level tables carry the shared H.263/MPEG-4 codeword pool with the
//! event arrangement differing between the inter and intra variants. Escape
//! level/run limits are derived from these tables at codebook build time so
//! the escape decoding can never disagree with the regular codes.
use m4v_core::io::codebook::*;

/// MCBPC codes for I-frames.
///
/// Symbol layout: bits 0-1 chroma CBP, bit 2 quantiser delta follows,
/// symbol 8 is macroblock stuffing.
pub const MCBPC_INTRA: &[ShortCodebookDesc] = &[
    ShortCodebookDesc { code: 0b1,         bits: 1 },
    ShortCodebookDesc { code: 0b001,       bits: 3 },
    ShortCodebookDesc { code: 0b010,       bits: 3 },
    ShortCodebookDesc { code: 0b011,       bits: 3 },
    ShortCodebookDesc { code: 0b0001,      bits: 4 },
    ShortCodebookDesc { code: 0b000001,    bits: 6 },
    ShortCodebookDesc { code: 0b000010,    bits: 6 },
    ShortCodebookDesc { code: 0b000011,    bits: 6 },
    ShortCodebookDesc { code: 0b000000001, bits: 9 }
];

/// MCBPC codes for P-frames.
///
/// Symbol layout: bits 0-1 chroma CBP, bit 2 intra, bit 3 quantiser delta
/// follows, bit 4 four motion vectors, symbol 20 is macroblock stuffing.
pub const MCBPC_INTER: &[ShortCodebookDesc] = &[
    ShortCodebookDesc { code: 0b1,             bits:  1 }, // inter
    ShortCodebookDesc { code: 0b0011,          bits:  4 },
    ShortCodebookDesc { code: 0b0010,          bits:  4 },
    ShortCodebookDesc { code: 0b000101,        bits:  6 },
    ShortCodebookDesc { code: 0b00011,         bits:  5 }, // intra
    ShortCodebookDesc { code: 0b00000100,      bits:  8 },
    ShortCodebookDesc { code: 0b00000011,      bits:  8 },
    ShortCodebookDesc { code: 0b0000011,       bits:  7 },
    ShortCodebookDesc { code: 0b011,           bits:  3 }, // inter + dquant
    ShortCodebookDesc { code: 0b0000111,       bits:  7 },
    ShortCodebookDesc { code: 0b0000110,       bits:  7 },
    ShortCodebookDesc { code: 0b000000101,     bits:  9 },
    ShortCodebookDesc { code: 0b000100,        bits:  6 }, // intra + dquant
    ShortCodebookDesc { code: 0b000000100,     bits:  9 },
    ShortCodebookDesc { code: 0b000000011,     bits:  9 },
    ShortCodebookDesc { code: 0b000000010,     bits:  9 },
    ShortCodebookDesc { code: 0b010,           bits:  3 }, // inter, 4MV
    ShortCodebookDesc { code: 0b0000101,       bits:  7 },
    ShortCodebookDesc { code: 0b0000100,       bits:  7 },
    ShortCodebookDesc { code: 0b00000101,      bits:  8 },
    ShortCodebookDesc { code: 0b000000001,     bits:  9 }, // stuffing
    ShortCodebookDesc { code: 0,               bits:  0 },
    ShortCodebookDesc { code: 0,               bits:  0 },
    ShortCodebookDesc { code: 0,               bits:  0 },
    ShortCodebookDesc { code: 0b00000000010,   bits: 11 }, // inter, 4MV + dquant
    ShortCodebookDesc { code: 0b0000000001100, bits: 13 },
    ShortCodebookDesc { code: 0b0000000001110, bits: 13 },
    ShortCodebookDesc { code: 0b0000000001111, bits: 13 }
];

/// Macroblock stuffing symbol in `MCBPC_INTRA`.
pub const MCBPC_INTRA_STUFFING: u32 = 8;
/// Macroblock stuffing symbol in `MCBPC_INTER`.
pub const MCBPC_INTER_STUFFING: u32 = 20;

/// CBPY codes, indexed by the intra luma pattern (P-frames complement the symbol).
pub const CBPY: &[ShortCodebookDesc] = &[
    ShortCodebookDesc { code: 0b0011,   bits: 4 },
    ShortCodebookDesc { code: 0b00101,  bits: 5 },
    ShortCodebookDesc { code: 0b00100,  bits: 5 },
    ShortCodebookDesc { code: 0b1001,   bits: 4 },
    ShortCodebookDesc { code: 0b00011,  bits: 5 },
    ShortCodebookDesc { code: 0b0111,   bits: 4 },
    ShortCodebookDesc { code: 0b000010, bits: 6 },
    ShortCodebookDesc { code: 0b1011,   bits: 4 },
    ShortCodebookDesc { code: 0b00010,  bits: 5 },
    ShortCodebookDesc { code: 0b000011, bits: 6 },
    ShortCodebookDesc { code: 0b0101,   bits: 4 },
    ShortCodebookDesc { code: 0b1010,   bits: 4 },
    ShortCodebookDesc { code: 0b0100,   bits: 4 },
    ShortCodebookDesc { code: 0b1000,   bits: 4 },
    ShortCodebookDesc { code: 0b0110,   bits: 4 },
    ShortCodebookDesc { code: 0b11,     bits: 2 }
];

/// Motion vector component magnitude codes (0..=32), sign bit follows nonzero values.
pub const MV_CODES: [u16; 33] = [
    0x01, 0x01, 0x01, 0x01, 0x03, 0x05, 0x04, 0x03,
    0x0B, 0x0A, 0x09, 0x11, 0x10, 0x0F, 0x0E, 0x0D,
    0x0C, 0x0B, 0x0A, 0x09, 0x08, 0x07, 0x06, 0x05,
    0x04, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x03,
    0x02
];
pub const MV_BITS: [u8; 33] = [
     1,  2,  3,  4,  6,  7,  7,  7,
     9,  9,  9, 10, 10, 10, 10, 10,
    10, 10, 10, 10, 10, 10, 10, 10,
    10, 11, 11, 11, 11, 11, 11, 12,
    12
];

/// Intra DC size codes for luma (symbol is the size itself).
pub const DC_SIZE_LUMA: &[ShortCodebookDesc] = &[
    ShortCodebookDesc { code: 0b011,         bits:  3 },
    ShortCodebookDesc { code: 0b11,          bits:  2 },
    ShortCodebookDesc { code: 0b10,          bits:  2 },
    ShortCodebookDesc { code: 0b010,         bits:  3 },
    ShortCodebookDesc { code: 0b001,         bits:  3 },
    ShortCodebookDesc { code: 0b0001,        bits:  4 },
    ShortCodebookDesc { code: 0b00001,       bits:  5 },
    ShortCodebookDesc { code: 0b000001,      bits:  6 },
    ShortCodebookDesc { code: 0b0000001,     bits:  7 },
    ShortCodebookDesc { code: 0b00000001,    bits:  8 },
    ShortCodebookDesc { code: 0b000000001,   bits:  9 },
    ShortCodebookDesc { code: 0b0000000001,  bits: 10 },
    ShortCodebookDesc { code: 0b00000000001, bits: 11 }
];

/// Intra DC size codes for chroma.
pub const DC_SIZE_CHROMA: &[ShortCodebookDesc] = &[
    ShortCodebookDesc { code: 0b11,           bits:  2 },
    ShortCodebookDesc { code: 0b10,           bits:  2 },
    ShortCodebookDesc { code: 0b01,           bits:  2 },
    ShortCodebookDesc { code: 0b001,          bits:  3 },
    ShortCodebookDesc { code: 0b0001,         bits:  4 },
    ShortCodebookDesc { code: 0b00001,        bits:  5 },
    ShortCodebookDesc { code: 0b000001,       bits:  6 },
    ShortCodebookDesc { code: 0b0000001,      bits:  7 },
    ShortCodebookDesc { code: 0b00000001,     bits:  8 },
    ShortCodebookDesc { code: 0b000000001,    bits:  9 },
    ShortCodebookDesc { code: 0b0000000001,   bits: 10 },
    ShortCodebookDesc { code: 0b00000000001,  bits: 11 },
    ShortCodebookDesc { code: 0b000000000001, bits: 12 }
];

/// One run-level codeword description.
#[derive(Clone,Copy)]
pub struct RLCodeDesc {
    pub code:  u16,
    pub bits:  u8,
    pub last:  u8,
    pub run:   u8,
    pub level: i8,
}

/// Decoded run-level event; the escape codeword decodes to a zero level.
#[derive(Clone,Copy,Default)]
pub struct RLSym {
    pub last:  bool,
    pub run:   u8,
    pub level: i8,
}

impl RLSym {
    pub fn is_escape(self) -> bool { self.level == 0 }
}

/// Codebook description reader for the run-level tables.
pub struct RLCodeReader {
    tab: &'static [RLCodeDesc],
}

impl RLCodeReader {
    pub fn new(tab: &'static [RLCodeDesc]) -> Self { Self { tab } }
}

impl CodebookDescReader<RLSym> for RLCodeReader {
    fn bits(&mut self, idx: usize) -> u8  { self.tab[idx].bits }
    fn code(&mut self, idx: usize) -> u32 { u32::from(self.tab[idx].code) }
    fn sym (&mut self, idx: usize) -> RLSym {
        let desc = self.tab[idx];
        RLSym { last: desc.last != 0, run: desc.run, level: desc.level }
    }
    fn len(&mut self) -> usize { self.tab.len() }
}

/// Largest level coded without escape for `(last, run)`, zero if the pair is not in the table.
pub fn rl_max_level(tab: &[RLCodeDesc], last: bool, run: u8) -> i8 {
    let last = last as u8;
    let mut lmax = 0;
    for desc in tab.iter() {
        if desc.level != 0 && desc.last == last && desc.run == run && desc.level > lmax {
            lmax = desc.level;
        }
    }
    lmax
}

/// Largest run coded without escape for `(last, level)`, zero if the level is not in the table.
pub fn rl_max_run(tab: &[RLCodeDesc], last: bool, level: i8) -> u8 {
    let last = last as u8;
    let mut rmax = 0;
    for desc in tab.iter() {
        if desc.level != 0 && desc.last == last && desc.level == level && desc.run > rmax {
            rmax = desc.run;
        }
    }
    rmax
}

pub const RL_INTER: &[RLCodeDesc] = &[
    RLCodeDesc { code: 0x0002, bits:  2, last: 0, run:  0, level:  1 },
    RLCodeDesc { code: 0x000F, bits:  4, last: 0, run:  0, level:  2 },
    RLCodeDesc { code: 0x0015, bits:  6, last: 0, run:  0, level:  3 },
    RLCodeDesc { code: 0x0017, bits:  7, last: 0, run:  0, level:  4 },
    RLCodeDesc { code: 0x001F, bits:  8, last: 0, run:  0, level:  5 },
    RLCodeDesc { code: 0x0025, bits:  9, last: 0, run:  0, level:  6 },
    RLCodeDesc { code: 0x0024, bits:  9, last: 0, run:  0, level:  7 },
    RLCodeDesc { code: 0x0021, bits: 10, last: 0, run:  0, level:  8 },
    RLCodeDesc { code: 0x0020, bits: 10, last: 0, run:  0, level:  9 },
    RLCodeDesc { code: 0x0007, bits: 11, last: 0, run:  0, level: 10 },
    RLCodeDesc { code: 0x0006, bits: 11, last: 0, run:  0, level: 11 },
    RLCodeDesc { code: 0x0020, bits: 11, last: 0, run:  0, level: 12 },
    RLCodeDesc { code: 0x0006, bits:  3, last: 0, run:  1, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  6, last: 0, run:  1, level:  2 },
    RLCodeDesc { code: 0x001E, bits:  8, last: 0, run:  1, level:  3 },
    RLCodeDesc { code: 0x000F, bits: 10, last: 0, run:  1, level:  4 },
    RLCodeDesc { code: 0x0021, bits: 11, last: 0, run:  1, level:  5 },
    RLCodeDesc { code: 0x0050, bits: 12, last: 0, run:  1, level:  6 },
    RLCodeDesc { code: 0x000E, bits:  4, last: 0, run:  2, level:  1 },
    RLCodeDesc { code: 0x001D, bits:  8, last: 0, run:  2, level:  2 },
    RLCodeDesc { code: 0x000E, bits: 10, last: 0, run:  2, level:  3 },
    RLCodeDesc { code: 0x0051, bits: 12, last: 0, run:  2, level:  4 },
    RLCodeDesc { code: 0x000D, bits:  5, last: 0, run:  3, level:  1 },
    RLCodeDesc { code: 0x0023, bits:  9, last: 0, run:  3, level:  2 },
    RLCodeDesc { code: 0x000D, bits: 10, last: 0, run:  3, level:  3 },
    RLCodeDesc { code: 0x000C, bits:  5, last: 0, run:  4, level:  1 },
    RLCodeDesc { code: 0x0022, bits:  9, last: 0, run:  4, level:  2 },
    RLCodeDesc { code: 0x0052, bits: 12, last: 0, run:  4, level:  3 },
    RLCodeDesc { code: 0x000B, bits:  5, last: 0, run:  5, level:  1 },
    RLCodeDesc { code: 0x000C, bits: 10, last: 0, run:  5, level:  2 },
    RLCodeDesc { code: 0x0053, bits: 12, last: 0, run:  5, level:  3 },
    RLCodeDesc { code: 0x0013, bits:  6, last: 0, run:  6, level:  1 },
    RLCodeDesc { code: 0x000B, bits: 10, last: 0, run:  6, level:  2 },
    RLCodeDesc { code: 0x0054, bits: 12, last: 0, run:  6, level:  3 },
    RLCodeDesc { code: 0x0012, bits:  6, last: 0, run:  7, level:  1 },
    RLCodeDesc { code: 0x000A, bits: 10, last: 0, run:  7, level:  2 },
    RLCodeDesc { code: 0x0011, bits:  6, last: 0, run:  8, level:  1 },
    RLCodeDesc { code: 0x0009, bits: 10, last: 0, run:  8, level:  2 },
    RLCodeDesc { code: 0x0010, bits:  6, last: 0, run:  9, level:  1 },
    RLCodeDesc { code: 0x0008, bits: 10, last: 0, run:  9, level:  2 },
    RLCodeDesc { code: 0x0016, bits:  7, last: 0, run: 10, level:  1 },
    RLCodeDesc { code: 0x0055, bits: 12, last: 0, run: 10, level:  2 },
    RLCodeDesc { code: 0x0015, bits:  7, last: 0, run: 11, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  7, last: 0, run: 12, level:  1 },
    RLCodeDesc { code: 0x001C, bits:  8, last: 0, run: 13, level:  1 },
    RLCodeDesc { code: 0x001B, bits:  8, last: 0, run: 14, level:  1 },
    RLCodeDesc { code: 0x0021, bits:  9, last: 0, run: 15, level:  1 },
    RLCodeDesc { code: 0x0020, bits:  9, last: 0, run: 16, level:  1 },
    RLCodeDesc { code: 0x001F, bits:  9, last: 0, run: 17, level:  1 },
    RLCodeDesc { code: 0x001E, bits:  9, last: 0, run: 18, level:  1 },
    RLCodeDesc { code: 0x001D, bits:  9, last: 0, run: 19, level:  1 },
    RLCodeDesc { code: 0x001C, bits:  9, last: 0, run: 20, level:  1 },
    RLCodeDesc { code: 0x001B, bits:  9, last: 0, run: 21, level:  1 },
    RLCodeDesc { code: 0x001A, bits:  9, last: 0, run: 22, level:  1 },
    RLCodeDesc { code: 0x0022, bits: 11, last: 0, run: 23, level:  1 },
    RLCodeDesc { code: 0x0023, bits: 11, last: 0, run: 24, level:  1 },
    RLCodeDesc { code: 0x0056, bits: 12, last: 0, run: 25, level:  1 },
    RLCodeDesc { code: 0x0057, bits: 12, last: 0, run: 26, level:  1 },
    RLCodeDesc { code: 0x0007, bits:  4, last: 1, run:  0, level:  1 },
    RLCodeDesc { code: 0x0019, bits:  9, last: 1, run:  0, level:  2 },
    RLCodeDesc { code: 0x0005, bits: 11, last: 1, run:  0, level:  3 },
    RLCodeDesc { code: 0x000F, bits:  6, last: 1, run:  1, level:  1 },
    RLCodeDesc { code: 0x0004, bits: 11, last: 1, run:  1, level:  2 },
    RLCodeDesc { code: 0x000E, bits:  6, last: 1, run:  2, level:  1 },
    RLCodeDesc { code: 0x000D, bits:  6, last: 1, run:  3, level:  1 },
    RLCodeDesc { code: 0x000C, bits:  6, last: 1, run:  4, level:  1 },
    RLCodeDesc { code: 0x0013, bits:  7, last: 1, run:  5, level:  1 },
    RLCodeDesc { code: 0x0012, bits:  7, last: 1, run:  6, level:  1 },
    RLCodeDesc { code: 0x0011, bits:  7, last: 1, run:  7, level:  1 },
    RLCodeDesc { code: 0x0010, bits:  7, last: 1, run:  8, level:  1 },
    RLCodeDesc { code: 0x001A, bits:  8, last: 1, run:  9, level:  1 },
    RLCodeDesc { code: 0x0019, bits:  8, last: 1, run: 10, level:  1 },
    RLCodeDesc { code: 0x0018, bits:  8, last: 1, run: 11, level:  1 },
    RLCodeDesc { code: 0x0017, bits:  8, last: 1, run: 12, level:  1 },
    RLCodeDesc { code: 0x0016, bits:  8, last: 1, run: 13, level:  1 },
    RLCodeDesc { code: 0x0015, bits:  8, last: 1, run: 14, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  8, last: 1, run: 15, level:  1 },
    RLCodeDesc { code: 0x0013, bits:  8, last: 1, run: 16, level:  1 },
    RLCodeDesc { code: 0x0018, bits:  9, last: 1, run: 17, level:  1 },
    RLCodeDesc { code: 0x0017, bits:  9, last: 1, run: 18, level:  1 },
    RLCodeDesc { code: 0x0016, bits:  9, last: 1, run: 19, level:  1 },
    RLCodeDesc { code: 0x0015, bits:  9, last: 1, run: 20, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  9, last: 1, run: 21, level:  1 },
    RLCodeDesc { code: 0x0013, bits:  9, last: 1, run: 22, level:  1 },
    RLCodeDesc { code: 0x0012, bits:  9, last: 1, run: 23, level:  1 },
    RLCodeDesc { code: 0x0011, bits:  9, last: 1, run: 24, level:  1 },
    RLCodeDesc { code: 0x0007, bits: 10, last: 1, run: 25, level:  1 },
    RLCodeDesc { code: 0x0006, bits: 10, last: 1, run: 26, level:  1 },
    RLCodeDesc { code: 0x0005, bits: 10, last: 1, run: 27, level:  1 },
    RLCodeDesc { code: 0x0004, bits: 10, last: 1, run: 28, level:  1 },
    RLCodeDesc { code: 0x0024, bits: 11, last: 1, run: 29, level:  1 },
    RLCodeDesc { code: 0x0025, bits: 11, last: 1, run: 30, level:  1 },
    RLCodeDesc { code: 0x0026, bits: 11, last: 1, run: 31, level:  1 },
    RLCodeDesc { code: 0x0027, bits: 11, last: 1, run: 32, level:  1 },
    RLCodeDesc { code: 0x0058, bits: 12, last: 1, run: 33, level:  1 },
    RLCodeDesc { code: 0x0059, bits: 12, last: 1, run: 34, level:  1 },
    RLCodeDesc { code: 0x005A, bits: 12, last: 1, run: 35, level:  1 },
    RLCodeDesc { code: 0x005B, bits: 12, last: 1, run: 36, level:  1 },
    RLCodeDesc { code: 0x005C, bits: 12, last: 1, run: 37, level:  1 },
    RLCodeDesc { code: 0x005D, bits: 12, last: 1, run: 38, level:  1 },
    RLCodeDesc { code: 0x005E, bits: 12, last: 1, run: 39, level:  1 },
    RLCodeDesc { code: 0x005F, bits: 12, last: 1, run: 40, level:  1 },
    RLCodeDesc { code: 0x0003, bits:  7, last: 0, run: 0, level: 0 }, // escape
];

pub const RL_INTRA: &[RLCodeDesc] = &[
    RLCodeDesc { code: 0x0002, bits:  2, last: 0, run:  0, level:  1 },
    RLCodeDesc { code: 0x000F, bits:  4, last: 0, run:  0, level:  2 },
    RLCodeDesc { code: 0x0015, bits:  6, last: 0, run:  0, level:  3 },
    RLCodeDesc { code: 0x0017, bits:  7, last: 0, run:  0, level:  4 },
    RLCodeDesc { code: 0x001F, bits:  8, last: 0, run:  0, level:  5 },
    RLCodeDesc { code: 0x0025, bits:  9, last: 0, run:  0, level:  6 },
    RLCodeDesc { code: 0x0024, bits:  9, last: 0, run:  0, level:  7 },
    RLCodeDesc { code: 0x0021, bits: 10, last: 0, run:  0, level:  8 },
    RLCodeDesc { code: 0x0020, bits: 10, last: 0, run:  0, level:  9 },
    RLCodeDesc { code: 0x0007, bits: 11, last: 0, run:  0, level: 10 },
    RLCodeDesc { code: 0x0006, bits: 11, last: 0, run:  0, level: 11 },
    RLCodeDesc { code: 0x0020, bits: 11, last: 0, run:  0, level: 12 },
    RLCodeDesc { code: 0x0006, bits:  3, last: 0, run:  0, level: 13 },
    RLCodeDesc { code: 0x0014, bits:  6, last: 0, run:  0, level: 14 },
    RLCodeDesc { code: 0x001E, bits:  8, last: 0, run:  0, level: 15 },
    RLCodeDesc { code: 0x000F, bits: 10, last: 0, run:  0, level: 16 },
    RLCodeDesc { code: 0x0021, bits: 11, last: 0, run:  0, level: 17 },
    RLCodeDesc { code: 0x0050, bits: 12, last: 0, run:  0, level: 18 },
    RLCodeDesc { code: 0x000E, bits:  4, last: 0, run:  0, level: 19 },
    RLCodeDesc { code: 0x001D, bits:  8, last: 0, run:  0, level: 20 },
    RLCodeDesc { code: 0x000E, bits: 10, last: 0, run:  0, level: 21 },
    RLCodeDesc { code: 0x0051, bits: 12, last: 0, run:  0, level: 22 },
    RLCodeDesc { code: 0x000D, bits:  5, last: 0, run:  0, level: 23 },
    RLCodeDesc { code: 0x0023, bits:  9, last: 0, run:  0, level: 24 },
    RLCodeDesc { code: 0x000D, bits: 10, last: 0, run:  0, level: 25 },
    RLCodeDesc { code: 0x000C, bits:  5, last: 0, run:  0, level: 26 },
    RLCodeDesc { code: 0x0022, bits:  9, last: 0, run:  0, level: 27 },
    RLCodeDesc { code: 0x0052, bits: 12, last: 0, run:  1, level:  1 },
    RLCodeDesc { code: 0x000B, bits:  5, last: 0, run:  1, level:  2 },
    RLCodeDesc { code: 0x000C, bits: 10, last: 0, run:  1, level:  3 },
    RLCodeDesc { code: 0x0053, bits: 12, last: 0, run:  1, level:  4 },
    RLCodeDesc { code: 0x0013, bits:  6, last: 0, run:  1, level:  5 },
    RLCodeDesc { code: 0x000B, bits: 10, last: 0, run:  1, level:  6 },
    RLCodeDesc { code: 0x0054, bits: 12, last: 0, run:  1, level:  7 },
    RLCodeDesc { code: 0x0012, bits:  6, last: 0, run:  1, level:  8 },
    RLCodeDesc { code: 0x000A, bits: 10, last: 0, run:  1, level:  9 },
    RLCodeDesc { code: 0x0011, bits:  6, last: 0, run:  1, level: 10 },
    RLCodeDesc { code: 0x0009, bits: 10, last: 0, run:  2, level:  1 },
    RLCodeDesc { code: 0x0010, bits:  6, last: 0, run:  2, level:  2 },
    RLCodeDesc { code: 0x0008, bits: 10, last: 0, run:  2, level:  3 },
    RLCodeDesc { code: 0x0016, bits:  7, last: 0, run:  2, level:  4 },
    RLCodeDesc { code: 0x0055, bits: 12, last: 0, run:  2, level:  5 },
    RLCodeDesc { code: 0x0015, bits:  7, last: 0, run:  3, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  7, last: 0, run:  3, level:  2 },
    RLCodeDesc { code: 0x001C, bits:  8, last: 0, run:  3, level:  3 },
    RLCodeDesc { code: 0x001B, bits:  8, last: 0, run:  4, level:  1 },
    RLCodeDesc { code: 0x0021, bits:  9, last: 0, run:  4, level:  2 },
    RLCodeDesc { code: 0x0020, bits:  9, last: 0, run:  4, level:  3 },
    RLCodeDesc { code: 0x001F, bits:  9, last: 0, run:  5, level:  1 },
    RLCodeDesc { code: 0x001E, bits:  9, last: 0, run:  5, level:  2 },
    RLCodeDesc { code: 0x001D, bits:  9, last: 0, run:  5, level:  3 },
    RLCodeDesc { code: 0x001C, bits:  9, last: 0, run:  6, level:  1 },
    RLCodeDesc { code: 0x001B, bits:  9, last: 0, run:  6, level:  2 },
    RLCodeDesc { code: 0x001A, bits:  9, last: 0, run:  6, level:  3 },
    RLCodeDesc { code: 0x0022, bits: 11, last: 0, run:  7, level:  1 },
    RLCodeDesc { code: 0x0023, bits: 11, last: 0, run:  7, level:  2 },
    RLCodeDesc { code: 0x0056, bits: 12, last: 0, run:  8, level:  1 },
    RLCodeDesc { code: 0x0057, bits: 12, last: 0, run:  8, level:  2 },
    RLCodeDesc { code: 0x0007, bits:  4, last: 1, run:  0, level:  1 },
    RLCodeDesc { code: 0x0019, bits:  9, last: 1, run:  0, level:  2 },
    RLCodeDesc { code: 0x0005, bits: 11, last: 1, run:  0, level:  3 },
    RLCodeDesc { code: 0x000F, bits:  6, last: 1, run:  0, level:  4 },
    RLCodeDesc { code: 0x0004, bits: 11, last: 1, run:  0, level:  5 },
    RLCodeDesc { code: 0x000E, bits:  6, last: 1, run:  0, level:  6 },
    RLCodeDesc { code: 0x000D, bits:  6, last: 1, run:  0, level:  7 },
    RLCodeDesc { code: 0x000C, bits:  6, last: 1, run:  0, level:  8 },
    RLCodeDesc { code: 0x0013, bits:  7, last: 1, run:  1, level:  1 },
    RLCodeDesc { code: 0x0012, bits:  7, last: 1, run:  1, level:  2 },
    RLCodeDesc { code: 0x0011, bits:  7, last: 1, run:  1, level:  3 },
    RLCodeDesc { code: 0x0010, bits:  7, last: 1, run:  2, level:  1 },
    RLCodeDesc { code: 0x001A, bits:  8, last: 1, run:  2, level:  2 },
    RLCodeDesc { code: 0x0019, bits:  8, last: 1, run:  3, level:  1 },
    RLCodeDesc { code: 0x0018, bits:  8, last: 1, run:  4, level:  1 },
    RLCodeDesc { code: 0x0017, bits:  8, last: 1, run:  5, level:  1 },
    RLCodeDesc { code: 0x0016, bits:  8, last: 1, run:  6, level:  1 },
    RLCodeDesc { code: 0x0015, bits:  8, last: 1, run:  7, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  8, last: 1, run:  8, level:  1 },
    RLCodeDesc { code: 0x0013, bits:  8, last: 1, run:  9, level:  1 },
    RLCodeDesc { code: 0x0018, bits:  9, last: 1, run: 10, level:  1 },
    RLCodeDesc { code: 0x0017, bits:  9, last: 1, run: 11, level:  1 },
    RLCodeDesc { code: 0x0016, bits:  9, last: 1, run: 12, level:  1 },
    RLCodeDesc { code: 0x0015, bits:  9, last: 1, run: 13, level:  1 },
    RLCodeDesc { code: 0x0014, bits:  9, last: 1, run: 14, level:  1 },
    RLCodeDesc { code: 0x0013, bits:  9, last: 1, run: 15, level:  1 },
    RLCodeDesc { code: 0x0012, bits:  9, last: 1, run: 16, level:  1 },
    RLCodeDesc { code: 0x0011, bits:  9, last: 1, run: 17, level:  1 },
    RLCodeDesc { code: 0x0007, bits: 10, last: 1, run: 18, level:  1 },
    RLCodeDesc { code: 0x0006, bits: 10, last: 1, run: 19, level:  1 },
    RLCodeDesc { code: 0x0005, bits: 10, last: 1, run: 20, level:  1 },
    RLCodeDesc { code: 0x0004, bits: 10, last: 1, run: 21, level:  1 },
    RLCodeDesc { code: 0x0024, bits: 11, last: 1, run: 22, level:  1 },
    RLCodeDesc { code: 0x0025, bits: 11, last: 1, run: 23, level:  1 },
    RLCodeDesc { code: 0x0026, bits: 11, last: 1, run: 24, level:  1 },
    RLCodeDesc { code: 0x0027, bits: 11, last: 1, run: 25, level:  1 },
    RLCodeDesc { code: 0x0058, bits: 12, last: 1, run: 26, level:  1 },
    RLCodeDesc { code: 0x0059, bits: 12, last: 1, run: 27, level:  1 },
    RLCodeDesc { code: 0x005A, bits: 12, last: 1, run: 28, level:  1 },
    RLCodeDesc { code: 0x005B, bits: 12, last: 1, run: 29, level:  1 },
    RLCodeDesc { code: 0x005C, bits: 12, last: 1, run: 30, level:  1 },
    RLCodeDesc { code: 0x005D, bits: 12, last: 1, run: 31, level:  1 },
    RLCodeDesc { code: 0x005E, bits: 12, last: 1, run: 32, level:  1 },
    RLCodeDesc { code: 0x005F, bits: 12, last: 1, run: 33, level:  1 },
    RLCodeDesc { code: 0x0003, bits:  7, last: 0, run: 0, level: 0 }, // escape
];

/// Alternate vertical scan, used when AC prediction comes from the left.
pub const SCAN_ALT_V: [usize; 64] = [
     0,  8, 16, 24,  1,  9,  2, 10,
    17, 25, 32, 40, 48, 56, 57, 49,
    41, 33, 26, 18,  3, 11,  4, 12,
    19, 27, 34, 42, 50, 58, 35, 43,
    51, 59, 20, 28,  5, 13,  6, 14,
    21, 29, 36, 44, 52, 60, 37, 45,
    53, 61, 22, 30,  7, 15, 23, 31,
    38, 46, 54, 62, 39, 47, 55, 63
];

/// Alternate horizontal scan, used when AC prediction comes from above.
pub const SCAN_ALT_H: [usize; 64] = [
     0,  1,  2,  3,  8,  9, 16, 17,
    10, 11,  4,  5,  6,  7, 15, 14,
    13, 12, 19, 18, 24, 25, 32, 33,
    26, 27, 20, 21, 22, 23, 28, 29,
    30, 31, 34, 35, 40, 41, 48, 49,
    42, 43, 36, 37, 38, 39, 44, 45,
    46, 47, 50, 51, 56, 57, 58, 59,
    52, 53, 54, 55, 60, 61, 62, 63
];

/// Quantiser delta lookup for the 2-bit DQUANT field.
pub const DQUANT_TAB: [i8; 4] = [ -1, -2, 1, 2 ];

/// Chroma quantiser mapping for modified quantization mode.
pub const MODIFIED_CHROMA_QSCALE: [u8; 32] = [
     0,  1,  2,  3,  4,  5,  6,  6,  7,  8,  9,  9, 10, 10, 11, 11,
    12, 12, 12, 13, 13, 13, 14, 14, 14, 14, 14, 15, 15, 15, 15, 15
];

/// Running-quantiser thresholds for the 3-bit `intra_dc_vlc_thr` field;
/// the DC VLC is in use while the quantiser is below the threshold.
pub const DC_VLC_THRESHOLD: [u8; 8] = [ 99, 13, 15, 17, 19, 21, 23, 0 ];

/// Returns the intra DC scaler for the given quantiser.
pub fn dc_scaler(quant: u8, chroma: bool) -> i16 {
    let q = i16::from(quant);
    if !chroma {
        match q {
            1..=4   => 8,
            5..=8   => 2 * q,
            9..=24  => q + 8,
            _       => 2 * q - 16,
        }
    } else {
        match q {
            1..=4   => 8,
            5..=24  => (q + 13) / 2,
            _       => q - 6,
        }
    }
}

/// Picture dimensions for the short video header source format field.
pub const SHORT_SRC_FORMATS: [(usize, usize); 8] = [
    (0, 0), (128, 96), (176, 144), (352, 288), (704, 576), (1408, 1152), (0, 0), (0, 0)
];

#[cfg(test)]
mod test {
    use super::*;
    use m4v_core::io::bitreader::BitReader;

    fn build_short(tab: &[ShortCodebookDesc]) -> Codebook<u32> {
        let mut cr = ShortCodebookDescReader::new(tab.to_vec());
        Codebook::new(&mut cr).unwrap()
    }

    #[test]
    fn tables_build() {
        build_short(MCBPC_INTRA);
        build_short(MCBPC_INTER);
        build_short(CBPY);
        build_short(DC_SIZE_LUMA);
        build_short(DC_SIZE_CHROMA);
        let mut mv = TableCodebookDescReader::new(&MV_CODES, &MV_BITS, |idx| idx as u8);
        Codebook::new(&mut mv).unwrap();
        Codebook::new(&mut RLCodeReader::new(RL_INTER)).unwrap();
        Codebook::new(&mut RLCodeReader::new(RL_INTRA)).unwrap();
    }

    #[test]
    fn mcbpc_decoding() {
        let cb = build_short(MCBPC_INTER);
        // "1" -> inter cbpc 0, "011" -> inter+dquant cbpc 0, "010" -> 4MV cbpc 0
        const SRC: [u8; 1] = [ 0b1_011_010_0 ];
        let mut br = BitReader::new(&SRC);
        assert_eq!(br.read_cb(&cb).unwrap(), 0);
        assert_eq!(br.read_cb(&cb).unwrap(), 8);
        assert_eq!(br.read_cb(&cb).unwrap(), 16);
    }

    #[test]
    fn rl_decoding() {
        use m4v_core::io::codebook::CodebookReader;
        let cb = Codebook::new(&mut RLCodeReader::new(RL_INTER)).unwrap();
        // "10" -> (last 0, run 0, level 1), "1111" -> (0, 0, 2), "0000011" -> escape
        const SRC: [u8; 2] = [ 0b10_1111_00, 0b00011_000 ];
        let mut br = BitReader::new(&SRC);
        let s = br.read_cb(&cb).unwrap();
        assert!(!s.last && s.run == 0 && s.level == 1);
        let s = br.read_cb(&cb).unwrap();
        assert!(!s.last && s.run == 0 && s.level == 2);
        let s = br.read_cb(&cb).unwrap();
        assert!(s.is_escape());
    }

    #[test]
    fn escape_limits() {
        assert_eq!(rl_max_level(RL_INTER, false, 0), 12);
        assert_eq!(rl_max_level(RL_INTER, false, 1), 6);
        assert_eq!(rl_max_level(RL_INTER, true, 0), 3);
        assert_eq!(rl_max_run(RL_INTER, false, 1), 26);
        assert_eq!(rl_max_run(RL_INTER, true, 1), 40);
        assert_eq!(rl_max_level(RL_INTRA, false, 0), 27);
        assert_eq!(rl_max_run(RL_INTRA, true, 1), 33);
    }

    #[test]
    fn scaler_values() {
        assert_eq!(dc_scaler(1, false), 8);
        assert_eq!(dc_scaler(7, false), 14);
        assert_eq!(dc_scaler(16, false), 24);
        assert_eq!(dc_scaler(30, false), 44);
        assert_eq!(dc_scaler(16, true), 14);
        assert_eq!(dc_scaler(30, true), 24);
    }
}
