//! Video frame storage.
//!
//! Frames are planar 8-bit YUV 4:2:0: a full-resolution luma plane followed by
//! two chroma planes at half resolution in both dimensions. All three planes
//! live in one contiguous allocation addressed through per-plane offsets and
//! strides. Planes are padded to an alignment requested by the decoder so that
//! edge-emulated motion compensation never leaves the allocation.
use crate::refs::BufferRef;

/// The number of planes in a frame.
pub const NUM_COMPONENTS: usize = 3;

/// A list specifying frame allocation errors.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum AllocatorError {
    /// The requested dimensions are too large.
    TooLargeDimensions,
    /// The requested dimensions are invalid (e.g. zero).
    FormatError,
}

/// Video frame parameters.
#[derive(Clone,Copy,Debug,PartialEq)]
pub struct VideoInfo {
    /// Frame width in luma pixels.
    pub width:  usize,
    /// Frame height in luma pixels.
    pub height: usize,
}

impl VideoInfo {
    /// Constructs a new `VideoInfo` instance.
    pub fn new(width: usize, height: usize) -> Self {
        VideoInfo { width, height }
    }
    /// Returns the dimensions of the requested plane.
    pub fn get_dimensions(&self, comp: usize) -> (usize, usize) {
        if comp == 0 {
            (self.width, self.height)
        } else {
            ((self.width + 1) >> 1, (self.height + 1) >> 1)
        }
    }
}

/// Buffer for planar video data.
#[derive(Clone)]
pub struct VideoBuffer<T: Copy> {
    info:    VideoInfo,
    data:    BufferRef<Vec<T>>,
    offs:    Vec<usize>,
    strides: Vec<usize>,
}

impl<T: Copy> VideoBuffer<T> {
    /// Returns the video frame parameters.
    pub fn get_info(&self) -> VideoInfo { self.info }
    /// Returns the offset of the requested plane in the data.
    pub fn get_offset(&self, comp: usize) -> usize {
        if comp >= self.offs.len() { 0 } else { self.offs[comp] }
    }
    /// Returns the stride (the distance between subsequent lines) of the requested plane.
    pub fn get_stride(&self, comp: usize) -> usize {
        if comp >= self.strides.len() { 0 } else { self.strides[comp] }
    }
    /// Returns the dimensions of the requested plane.
    pub fn get_dimensions(&self, comp: usize) -> (usize, usize) {
        self.info.get_dimensions(comp)
    }
    /// Returns a reference to the frame data.
    pub fn get_data(&self) -> &Vec<T> { self.data.as_ref() }
    /// Returns a mutable reference to the frame data.
    pub fn get_data_mut(&mut self) -> Option<&mut Vec<T>> { self.data.as_mut() }
    /// Clones the frame contents into a new buffer.
    pub fn copy_buffer(&self) -> Self {
        let mut data: Vec<T> = Vec::with_capacity(self.data.len());
        data.extend_from_slice(self.data.as_ref());
        VideoBuffer {
            info:    self.info,
            data:    BufferRef::new(data),
            offs:    self.offs.clone(),
            strides: self.strides.clone(),
        }
    }
    /// Converts the buffer into a reference-counted one.
    pub fn into_ref(self) -> VideoBufferRef<T> {
        BufferRef::new(self)
    }
}

/// A specialised reference-counted `VideoBuffer` type.
pub type VideoBufferRef<T> = BufferRef<VideoBuffer<T>>;

/// A flattened mutable view of `VideoBuffer` used by DSP routines.
pub struct SimpleVideoFrame<'a, T: Copy> {
    /// Plane widths.
    pub width:   [usize; NUM_COMPONENTS],
    /// Plane heights.
    pub height:  [usize; NUM_COMPONENTS],
    /// Plane strides.
    pub stride:  [usize; NUM_COMPONENTS],
    /// Plane offsets in the data.
    pub offset:  [usize; NUM_COMPONENTS],
    /// The frame data.
    pub data:    &'a mut [T],
}

impl<'a, T: Copy> SimpleVideoFrame<'a, T> {
    /// Constructs a new instance of `SimpleVideoFrame` from the provided buffer.
    pub fn from_video_buf(vbuf: &'a mut VideoBuffer<T>) -> Option<Self> {
        let info = vbuf.get_info();
        let mut width  = [0; NUM_COMPONENTS];
        let mut height = [0; NUM_COMPONENTS];
        let mut stride = [0; NUM_COMPONENTS];
        let mut offset = [0; NUM_COMPONENTS];
        for comp in 0..NUM_COMPONENTS {
            let (w, h) = info.get_dimensions(comp);
            width[comp]  = w;
            height[comp] = h;
            stride[comp] = vbuf.get_stride(comp);
            offset[comp] = vbuf.get_offset(comp);
        }
        let data = vbuf.get_data_mut()?;
        Some(SimpleVideoFrame {
            width, height, stride, offset,
            data: data.as_mut_slice(),
        })
    }
}

/// Constructs a new video buffer with the requested parameters.
///
/// The `align` parameter should be the base-two logarithm of the alignment in
/// pixels applied to every plane (both width and height are padded).
pub fn alloc_video_buffer(vinfo: VideoInfo, align: u8) -> Result<VideoBuffer<u8>, AllocatorError> {
    if vinfo.width == 0 || vinfo.height == 0 {
        return Err(AllocatorError::FormatError);
    }
    let width  = align_size(vinfo.width,  align);
    let height = align_size(vinfo.height, align);
    if width > 65536 || height > 65536 {
        return Err(AllocatorError::TooLargeDimensions);
    }

    let mut offs:    Vec<usize> = Vec::with_capacity(NUM_COMPONENTS);
    let mut strides: Vec<usize> = Vec::with_capacity(NUM_COMPONENTS);
    let mut total = 0usize;
    for comp in 0..NUM_COMPONENTS {
        let (w, h) = if comp == 0 { (width, height) } else { (width >> 1, height >> 1) };
        offs.push(total);
        strides.push(w);
        total = total.checked_add(w.checked_mul(h).ok_or(AllocatorError::TooLargeDimensions)?)
                     .ok_or(AllocatorError::TooLargeDimensions)?;
    }
    let data: Vec<u8> = vec![0; total];
    Ok(VideoBuffer {
        info:    vinfo,
        data:    BufferRef::new(data),
        offs,
        strides,
    })
}

fn align_size(size: usize, align: u8) -> usize {
    (size + ((1 << align) - 1)) & !((1 << align) - 1)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alloc() {
        let info = VideoInfo::new(176, 144);
        let buf = alloc_video_buffer(info, 4).unwrap();
        assert_eq!(buf.get_stride(0), 176);
        assert_eq!(buf.get_stride(1), 88);
        assert_eq!(buf.get_dimensions(1), (88, 72));
        assert!(buf.get_offset(1) >= 176 * 144);
        assert_eq!(buf.get_data().len(), 176 * 144 + 2 * 88 * 72);

        // odd sizes get padded
        let info = VideoInfo::new(11, 17);
        let buf = alloc_video_buffer(info, 4).unwrap();
        assert_eq!(buf.get_stride(0), 16);
        assert_eq!(buf.get_stride(1), 8);

        assert!(matches!(alloc_video_buffer(VideoInfo::new(0, 16), 4),
                         Err(AllocatorError::FormatError)));
    }

    #[test]
    fn test_copy() {
        let info = VideoInfo::new(32, 32);
        let mut buf = alloc_video_buffer(info, 4).unwrap();
        buf.get_data_mut().unwrap()[0] = 42;
        let copy = buf.copy_buffer();
        assert_eq!(copy.get_data()[0], 42);
        let rbuf = buf.into_ref();
        let rbuf2 = rbuf.clone();
        assert_eq!(rbuf2.get_data()[0], 42);
    }
}
