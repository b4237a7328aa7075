//! Buffer list encoding and decoding.
//!
//! The engine exchanges audio as a variable-length `AudioBufferList`
//! record: a `u32` count followed by `count` fixed-width buffer headers
//! (`channel_count: u32, byte_size: u32, data: *mut c_void`). The layout is
//! dictated by the engine and reproduced here byte for byte.
//!
//! Only descriptors are copied. Sample data is never touched by the codec;
//! the pointers are handed through so rendering stays zero-copy.
//!
//! # Safety
//!
//! `AudioBufferList` is a flexible array member struct. A record with `n`
//! buffers occupies [`record_size`]`(n)` bytes, which for `n == 0` is less
//! than `size_of::<AudioBufferList>()`. Records are therefore only accessed
//! through raw pointers, never through `&AudioBufferList`.

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::mem::{self, offset_of};
use std::ops::Index;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Reason, Result};

// Interleaved buffers are legal but unusual on the render path; say so once.
static INTERLEAVED_WARNING_LOGGED: AtomicBool = AtomicBool::new(false);

/// One entry of a buffer list (`AudioBuffer`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Number of interleaved channels in the buffer.
    pub channel_count: u32,
    /// Size of the buffer in bytes. The engine may shrink it to report how
    /// much data is valid.
    pub byte_size: u32,
    /// Audio data. Not owned.
    pub data: *mut c_void,
}

impl BufferDescriptor {
    pub const EMPTY: Self = Self {
        channel_count: 0,
        byte_size: 0,
        data: ptr::null_mut(),
    };

    pub const fn new(channel_count: u32, byte_size: u32, data: *mut c_void) -> Self {
        Self {
            channel_count,
            byte_size,
            data,
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }

    /// View the data as `f32` samples.
    ///
    /// Returns `None` for null, misaligned, or non-multiple-of-4 buffers.
    ///
    /// # Safety
    ///
    /// `data` must be valid for `byte_size` bytes for `'a`, with no other
    /// live reference to it.
    pub unsafe fn as_f32_mut<'a>(&self) -> Option<&'a mut [f32]> {
        if !validate_f32_buffer(self.data, self.byte_size) {
            return None;
        }
        if self.channel_count > 1 && !INTERLEAVED_WARNING_LOGGED.swap(true, Ordering::Relaxed) {
            log::warn!(
                "Interleaved buffer with {} channels handed to an f32 view. \
                 This warning will only appear once per session.",
                self.channel_count
            );
        }
        let len = self.byte_size as usize / mem::size_of::<f32>();
        Some(slice::from_raw_parts_mut(self.data.cast::<f32>(), len))
    }

    /// Fill the buffer with zero bytes.
    ///
    /// # Safety
    ///
    /// `data` must be null or valid for writes of `byte_size` bytes.
    pub unsafe fn zero(&self) {
        if !self.data.is_null() {
            ptr::write_bytes(self.data.cast::<u8>(), 0, self.byte_size as usize);
        }
    }
}

// SAFETY: the descriptor never dereferences `data` on its own; every access
// goes through the unsafe methods above.
unsafe impl Send for BufferDescriptor {}
unsafe impl Sync for BufferDescriptor {}

/// Native buffer list record (`AudioBufferList`).
///
/// Contains a variable number of [`BufferDescriptor`] entries; only the
/// first is declared.
#[repr(C)]
pub struct AudioBufferList {
    pub number_buffers: u32,
    pub buffers: [BufferDescriptor; 1],
}

/// Offset of the first header from the start of the record.
pub const HEADER_OFFSET: usize = offset_of!(AudioBufferList, buffers);

/// Size of one buffer header.
pub const HEADER_SIZE: usize = mem::size_of::<BufferDescriptor>();

/// Bytes occupied by a record with `count` headers, or `None` if that
/// overflows `usize`.
pub const fn record_size(count: usize) -> Option<usize> {
    match count.checked_mul(HEADER_SIZE) {
        Some(headers) => HEADER_OFFSET.checked_add(headers),
        None => None,
    }
}

#[inline]
fn validate_f32_buffer(data_ptr: *const c_void, byte_size: u32) -> bool {
    if data_ptr.is_null() {
        return false;
    }
    if (data_ptr as usize) % mem::align_of::<f32>() != 0 {
        return false;
    }
    (byte_size as usize) % mem::size_of::<f32>() == 0
}

#[inline]
unsafe fn header_ptr(list: *const AudioBufferList, index: usize) -> *const BufferDescriptor {
    list.cast::<u8>()
        .add(HEADER_OFFSET)
        .cast::<BufferDescriptor>()
        .add(index)
}

#[inline]
unsafe fn read_count(list: *const AudioBufferList) -> u32 {
    ptr::addr_of!((*list).number_buffers).read()
}

fn malformed(count: u32, bound: usize) -> Error {
    log::warn!(
        "rejecting buffer list with {} buffers (bound {})",
        count,
        bound
    );
    Error::Fatal(Reason::MalformedBufferList)
}

/// A decoded buffer list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferList {
    descriptors: Vec<BufferDescriptor>,
}

impl BufferList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: Vec<BufferDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn push(&mut self, descriptor: BufferDescriptor) {
        self.descriptors.push(descriptor);
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BufferDescriptor> {
        self.descriptors.get(index)
    }

    pub fn as_slice(&self) -> &[BufferDescriptor] {
        &self.descriptors
    }

    pub fn iter(&self) -> slice::Iter<'_, BufferDescriptor> {
        self.descriptors.iter()
    }
}

impl Index<usize> for BufferList {
    type Output = BufferDescriptor;

    fn index(&self, index: usize) -> &BufferDescriptor {
        &self.descriptors[index]
    }
}

impl<'a> IntoIterator for &'a BufferList {
    type Item = &'a BufferDescriptor;
    type IntoIter = slice::Iter<'a, BufferDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Decode a native record, rejecting counts above `max_buffers`.
///
/// # Safety
///
/// `list` must be null or point to a readable record whose headers are
/// readable for the count it declares (up to `max_buffers`).
pub unsafe fn decode(list: *const AudioBufferList, max_buffers: usize) -> Result<BufferList> {
    if list.is_null() {
        return Err(Error::Fatal(Reason::MalformedBufferList));
    }
    let count = read_count(list);
    if count as usize > max_buffers {
        return Err(malformed(count, max_buffers));
    }
    let descriptors = (0..count as usize)
        .map(|i| header_ptr(list, i).read_unaligned())
        .collect();
    Ok(BufferList { descriptors })
}

/// Encode a list into a freshly allocated, caller-owned record.
pub fn encode(list: &BufferList) -> Result<OwnedBufferList> {
    let mut owned = OwnedBufferList::allocate(list.len())?;
    for (index, descriptor) in list.iter().enumerate() {
        owned.set(index, *descriptor);
    }
    Ok(owned)
}

/// Pre-sized descriptor storage for the render path.
///
/// [`decode_into`] and [`write_back`] never allocate.
#[derive(Debug)]
pub struct BufferScratch {
    descriptors: Box<[BufferDescriptor]>,
    len: usize,
}

impl BufferScratch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: vec![BufferDescriptor::EMPTY; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.descriptors.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[BufferDescriptor] {
        &self.descriptors[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [BufferDescriptor] {
        &mut self.descriptors[..self.len]
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// Decode a record into `scratch` without allocating.
///
/// A null record decodes as empty. Counts above the scratch capacity are
/// rejected.
///
/// # Safety
///
/// Same as [`decode`].
pub unsafe fn decode_into(list: *const AudioBufferList, scratch: &mut BufferScratch) -> Result<()> {
    scratch.len = 0;
    if list.is_null() {
        return Ok(());
    }
    let count = read_count(list) as usize;
    if count > scratch.capacity() {
        return Err(Error::Fatal(Reason::MalformedBufferList));
    }
    for (index, slot) in scratch.descriptors[..count].iter_mut().enumerate() {
        *slot = header_ptr(list, index).read_unaligned();
    }
    scratch.len = count;
    Ok(())
}

/// Write descriptors back into the record they were decoded from.
///
/// Only the first `min(count, scratch.len())` headers are written; the
/// count itself is never changed.
///
/// # Safety
///
/// `list` must be null or a writable record.
pub unsafe fn write_back(list: *mut AudioBufferList, scratch: &BufferScratch) {
    if list.is_null() {
        return;
    }
    let count = (read_count(list) as usize).min(scratch.len);
    for (index, descriptor) in scratch.descriptors[..count].iter().enumerate() {
        header_ptr(list, index)
            .cast_mut()
            .write_unaligned(*descriptor);
    }
}

/// A heap-allocated native record owned by Rust.
///
/// Optionally owns the sample storage its descriptors point at
/// ([`OwnedBufferList::with_buffers`]).
pub struct OwnedBufferList {
    record: NonNull<AudioBufferList>,
    layout: Layout,
    count: usize,
    samples: Vec<Box<[f32]>>,
}

// SAFETY: the record and sample storage are exclusively owned.
unsafe impl Send for OwnedBufferList {}

impl OwnedBufferList {
    /// Allocate a zeroed record with `count` empty headers.
    pub fn allocate(count: usize) -> Result<Self> {
        let size = record_size(count)
            .ok_or(Error::Fatal(Reason::InvalidParameter))?
            .max(mem::size_of::<AudioBufferList>());
        let layout = Layout::from_size_align(size, mem::align_of::<AudioBufferList>())
            .map_err(|_| Error::Fatal(Reason::OutOfMemory))?;
        let count_u32 = u32::try_from(count).map_err(|_| Error::Fatal(Reason::InvalidParameter))?;

        // SAFETY: layout has non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let record = NonNull::new(raw.cast::<AudioBufferList>())
            .ok_or(Error::Fatal(Reason::OutOfMemory))?;
        // SAFETY: freshly allocated, large enough for the header
        unsafe { ptr::addr_of_mut!((*record.as_ptr()).number_buffers).write(count_u32) };

        Ok(Self {
            record,
            layout,
            count,
            samples: Vec::new(),
        })
    }

    /// Allocate a record plus zeroed mono `f32` storage for each buffer.
    pub fn with_buffers(count: usize, bytes_per_buffer: u32) -> Result<Self> {
        let mut owned = Self::allocate(count)?;
        let samples = (bytes_per_buffer as usize).div_ceil(mem::size_of::<f32>());
        owned.samples.reserve_exact(count);
        for index in 0..count {
            let mut storage = vec![0.0f32; samples].into_boxed_slice();
            let data = storage.as_mut_ptr().cast::<c_void>();
            owned.samples.push(storage);
            owned.set(index, BufferDescriptor::new(1, bytes_per_buffer, data));
        }
        Ok(owned)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn as_ptr(&self) -> *const AudioBufferList {
        self.record.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut AudioBufferList {
        self.record.as_ptr()
    }

    pub fn get(&self, index: usize) -> Option<BufferDescriptor> {
        if index >= self.count {
            return None;
        }
        // SAFETY: index is within the allocated record
        Some(unsafe { header_ptr(self.as_ptr(), index).read_unaligned() })
    }

    /// Overwrite the header at `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, descriptor: BufferDescriptor) {
        if index >= self.count {
            return;
        }
        // SAFETY: index is within the allocated record
        unsafe {
            header_ptr(self.as_ptr(), index)
                .cast_mut()
                .write_unaligned(descriptor)
        };
    }

    /// Decode this record. Never fails: the count is ours.
    pub fn decode(&self) -> BufferList {
        BufferList {
            descriptors: (0..self.count).filter_map(|i| self.get(i)).collect(),
        }
    }

    /// Samples of an owned buffer, limited to its current `byte_size`.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        let storage = self.samples.get(index)?;
        let valid = self.get(index)?.byte_size as usize / mem::size_of::<f32>();
        Some(&storage[..valid.min(storage.len())])
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut [f32]> {
        let valid = self.get(index)?.byte_size as usize / mem::size_of::<f32>();
        let storage = self.samples.get_mut(index)?;
        let len = valid.min(storage.len());
        Some(&mut storage[..len])
    }
}

impl Drop for OwnedBufferList {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with this layout
        unsafe { alloc::dealloc(self.record.as_ptr().cast::<u8>(), self.layout) };
    }
}

impl std::fmt::Debug for OwnedBufferList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedBufferList")
            .field("buffers", &self.decode())
            .field("owns_samples", &!self.samples.is_empty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_list(n: usize) -> BufferList {
        let mut list = BufferList::new();
        for i in 0..n {
            list.push(BufferDescriptor::new(
                (i % 3 + 1) as u32,
                (i * 256) as u32,
                (0x1000 + i * 0x100) as *mut c_void,
            ));
        }
        list
    }

    #[test]
    fn test_wire_layout() {
        assert_eq!(HEADER_OFFSET, mem::size_of::<usize>());
        assert_eq!(HEADER_SIZE, 8 + mem::size_of::<usize>());
        assert_eq!(record_size(2), Some(HEADER_OFFSET + 2 * HEADER_SIZE));
        assert_eq!(record_size(usize::MAX / 2), None);
    }

    #[test]
    fn test_allocate_rejects_overflowing_count() {
        let err = OwnedBufferList::allocate(usize::MAX / 2).err();
        assert_eq!(err, Some(Error::Fatal(Reason::InvalidParameter)));
        let err = OwnedBufferList::with_buffers(usize::MAX / HEADER_SIZE + 1, 4).err();
        assert_eq!(err, Some(Error::Fatal(Reason::InvalidParameter)));
    }

    #[test]
    fn test_round_trip() {
        for n in 0..=64 {
            let list = sample_list(n);
            let encoded = encode(&list).unwrap();
            let decoded = unsafe { decode(encoded.as_ptr(), 64) }.unwrap();
            assert_eq!(decoded, list);
        }
    }

    #[test]
    fn test_decode_rejects_count_over_bound() {
        let encoded = encode(&sample_list(5)).unwrap();
        let err = unsafe { decode(encoded.as_ptr(), 4) }.unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::MalformedBufferList));
    }

    #[test]
    fn test_decode_null() {
        let err = unsafe { decode(ptr::null(), 4) }.unwrap_err();
        assert_eq!(err.reason(), Reason::MalformedBufferList);
    }

    #[test]
    fn test_decode_into_reuses_scratch() {
        let encoded = encode(&sample_list(3)).unwrap();
        let mut scratch = BufferScratch::with_capacity(4);
        let before = scratch.as_slice().as_ptr();
        unsafe { decode_into(encoded.as_ptr(), &mut scratch) }.unwrap();
        assert_eq!(scratch.len(), 3);
        assert_eq!(scratch.as_slice(), sample_list(3).as_slice());
        assert_eq!(scratch.as_slice().as_ptr(), before);

        let too_long = encode(&sample_list(5)).unwrap();
        assert!(unsafe { decode_into(too_long.as_ptr(), &mut scratch) }.is_err());
        assert!(scratch.is_empty());
    }

    #[test]
    fn test_write_back_updates_byte_size() {
        let mut owned = OwnedBufferList::with_buffers(2, 64).unwrap();
        let mut scratch = BufferScratch::with_capacity(2);
        unsafe { decode_into(owned.as_ptr(), &mut scratch) }.unwrap();
        scratch.as_mut_slice()[1].byte_size = 32;
        unsafe { write_back(owned.as_mut_ptr(), &scratch) };
        assert_eq!(owned.get(1).unwrap().byte_size, 32);
        assert_eq!(owned.channel(1).unwrap().len(), 8);
        assert_eq!(owned.get(0).unwrap().byte_size, 64);
    }

    #[test]
    fn test_with_buffers_channel_access() {
        let mut owned = OwnedBufferList::with_buffers(2, 16).unwrap();
        owned.channel_mut(0).unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        let descriptor = owned.get(0).unwrap();
        let view = unsafe { descriptor.as_f32_mut() }.unwrap();
        assert_eq!(view, &[1.0, 2.0, 3.0, 4.0]);
        assert!(owned.channel(2).is_none());
    }

    #[test]
    fn test_f32_view_validation() {
        let mut storage = [0u32; 4];
        let base = storage.as_mut_ptr().cast::<u8>();
        let misaligned = BufferDescriptor::new(1, 8, unsafe { base.add(1) }.cast());
        assert!(unsafe { misaligned.as_f32_mut() }.is_none());
        let odd = BufferDescriptor::new(1, 6, base.cast());
        assert!(unsafe { odd.as_f32_mut() }.is_none());
        assert!(unsafe { BufferDescriptor::EMPTY.as_f32_mut() }.is_none());
    }

    #[test]
    fn test_zero() {
        let mut owned = OwnedBufferList::with_buffers(1, 8).unwrap();
        owned.channel_mut(0).unwrap().fill(0.5);
        unsafe { owned.get(0).unwrap().zero() };
        assert_eq!(owned.channel(0).unwrap(), &[0.0, 0.0]);
    }
}
