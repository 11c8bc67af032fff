//! Decoder support functions and definitions.
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign, Neg};

pub use m4v_core::codecs::*;
pub use m4v_core::frame::*;

#[allow(unused_macros)]
#[cfg(debug_assertions)]
macro_rules! validate {
    ($a:expr) => { if !$a { println!("check failed at {}:{}", file!(), line!()); return Err(DecoderError::InvalidData); } };
}
#[cfg(not(debug_assertions))]
macro_rules! validate {
    ($a:expr) => { if !$a { return Err(DecoderError::InvalidData); } };
}

/// Frame manager for codecs with intra and inter frames.
///
/// The just decoded frame is installed as the reference for the next one;
/// the previous reference is shared read-only while the current frame is
/// being reconstructed.
#[derive(Default)]
pub struct IPShuffler {
    lastframe: Option<VideoBufferRef<u8>>,
}

impl IPShuffler {
    /// Constructs a new instance of frame manager.
    pub fn new() -> Self { IPShuffler { lastframe: None } }
    /// Clears the reference.
    pub fn clear(&mut self) { self.lastframe = None; }
    /// Sets a new frame reference.
    pub fn add_frame(&mut self, buf: VideoBufferRef<u8>) {
        self.lastframe = Some(buf);
    }
    /// Returns the saved reference frame or `None` if it is not present.
    pub fn get_ref(&mut self) -> Option<VideoBufferRef<u8>> {
        self.lastframe.as_ref().cloned()
    }
}

/// Motion vector data type.
#[derive(Debug,Clone,Copy,Default,PartialEq)]
pub struct MV {
    /// X coordinate of the vector.
    pub x: i16,
    /// Y coordinate of the vector.
    pub y: i16,
}

#[allow(clippy::many_single_char_names)]
#[allow(clippy::collapsible_if)]
#[allow(clippy::collapsible_else_if)]
impl MV {
    /// Creates a new motion vector instance.
    pub fn new(x: i16, y: i16) -> Self { MV{ x, y } }
    /// Predicts median from provided motion vectors.
    ///
    /// Each component of the vector is predicted as the median of corresponding input vector components.
    pub fn pred(a: MV, b: MV, c: MV) -> Self {
        let x;
        if a.x < b.x {
            if b.x < c.x {
                x = b.x;
            } else {
                if a.x < c.x { x = c.x; } else { x = a.x; }
            }
        } else {
            if b.x < c.x {
                if a.x < c.x { x = a.x; } else { x = c.x; }
            } else {
                x = b.x;
            }
        }
        let y;
        if a.y < b.y {
            if b.y < c.y {
                y = b.y;
            } else {
                if a.y < c.y { y = c.y; } else { y = a.y; }
            }
        } else {
            if b.y < c.y {
                if a.y < c.y { y = a.y; } else { y = c.y; }
            } else {
                y = b.y;
            }
        }
        MV { x, y }
    }
}

/// Zero motion vector.
pub const ZERO_MV: MV = MV { x: 0, y: 0 };

impl Add for MV {
    type Output = MV;
    fn add(self, other: MV) -> MV { MV { x: self.x + other.x, y: self.y + other.y } }
}

impl AddAssign for MV {
    fn add_assign(&mut self, other: MV) { self.x += other.x; self.y += other.y; }
}

impl Sub for MV {
    type Output = MV;
    fn sub(self, other: MV) -> MV { MV { x: self.x - other.x, y: self.y - other.y } }
}

impl SubAssign for MV {
    fn sub_assign(&mut self, other: MV) { self.x -= other.x; self.y -= other.y; }
}

impl Neg for MV {
    type Output = MV;
    fn neg(self) -> Self::Output {
        MV { x: -self.x, y: -self.y }
    }
}

impl fmt::Display for MV {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// The common 8x8 zigzag scan.
pub const ZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63
];

pub mod blockdsp;

#[cfg(feature="decoder_m4v")]
#[allow(clippy::useless_let_if_seq)]
pub mod m4v;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mv_pred() {
        let a = MV::new( 4,  2);
        let b = MV::new(-2,  6);
        let c = MV::new( 1, -3);
        assert_eq!(MV::pred(a, b, c), MV::new(1, 2));
        assert_eq!(MV::pred(a, a, c), MV::new(4, 2));
        assert_eq!(MV::pred(ZERO_MV, ZERO_MV, ZERO_MV), ZERO_MV);
    }
}
