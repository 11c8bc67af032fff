//! Bitstream writer functionality.
//!
//! The writer appends bits to a `Vec<u8>` in big-endian order (MSB first
//! within each byte), matching [`BitReader`].
//!
//! [`BitReader`]: ../bitreader/struct.BitReader.html
//!
//! # Examples
//!
//! Writing a 17-bit value:
//! ```
//! use m4v_core::io::bitwriter::BitWriter;
//!
//! # fn foo() -> Vec<u8> {
//! let mut bw = BitWriter::new(Vec::new());
//! bw.write(42, 17);
//! # bw.end()
//! # }
//! ```

/// Bitstream writer.
pub struct BitWriter {
    dst:    Vec<u8>,
    bitbuf: u32,
    bits:   u8,
    start:  usize,
}

impl BitWriter {
    /// Creates a new instance of `BitWriter` that will append data to the input vector.
    pub fn new(dst: Vec<u8>) -> Self {
        let start = dst.len();
        Self {
            dst,
            start,
            bitbuf: 0,
            bits:   0,
        }
    }
    /// Writes single zero bit to the output.
    pub fn write0(&mut self) { self.write_bit(false); }
    /// Writes single set bit to the output.
    pub fn write1(&mut self) { self.write_bit(true); }
    /// Writes single bit.
    pub fn write_bit(&mut self, bit: bool) {
        self.bitbuf |= (bit as u32) << (31 - self.bits);
        self.bits += 1;
        self.flush();
    }
    /// Writes `bits` bits of `val` value to the output.
    pub fn write(&mut self, val: u32, bits: u8) {
        if bits == 0 {
            return;
        }
        if self.bits + bits <= 32 {
            self.bitbuf |= val << (32 - self.bits - bits);
            self.bits += bits;
            self.flush();
        } else {
            let cbits = 32 - self.bits;
            let bits2 = bits - cbits;
            self.write(val >> bits2, cbits);
            self.write(val & ((1 << bits2) - 1), bits2);
        }
    }
    /// Writes `bits` bits of signed `val` value to the output.
    pub fn write_s(&mut self, val: i32, bits: u8) {
        self.write((val as u32) & ((1 << bits) - 1), bits);
    }
    /// Tells the amount of bits written so far.
    pub fn tell(&self) -> usize {
        (self.dst.len() - self.start) * 8 + (self.bits as usize)
    }
    fn flush(&mut self) {
        while self.bits >= 8 {
            self.dst.push((self.bitbuf >> 24) as u8);
            self.bitbuf <<= 8;
            self.bits    -= 8;
        }
    }
    /// Finalises operations and returns the vector containing output data.
    pub fn end(mut self) -> Vec<u8> {
        self.flush();
        if self.bits > 0 {
            self.dst.push((self.bitbuf >> 24) as u8);
        }
        self.dst
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bw_works() {
        let mut bw = BitWriter::new(Vec::new());
        bw.write(43, 9);
        assert_eq!(bw.tell(), 9);
        let data = bw.end();
        assert_eq!(&data, &[21, 128]);
    }
}
