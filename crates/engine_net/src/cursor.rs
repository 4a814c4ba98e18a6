//! A byte buffer paired with a moving offset.
//!
//! [`ViewCursor`] writes and reads little-endian scalars at its offset and
//! advances. It never grows: writes past the capacity fail with
//! [`CursorError::Overflow`], reads past the end with
//! [`CursorError::OutOfBounds`].
//!
//! Optional records are expressed with explicit positions instead of
//! callbacks: [`ViewCursor::begin_record`] remembers where the record starts
//! and reserves its change mask, [`ViewCursor::end_record`] either patches
//! the mask in or rewinds so the attempt leaves no trace.

use std::marker::PhantomData;
use std::ops::{BitAnd, BitOr, Shl};

/// Cursor bounds violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CursorError {
    #[error("write of {needed} bytes at offset {offset} overflows capacity {capacity}")]
    Overflow {
        offset: usize,
        needed: usize,
        capacity: usize,
    },

    #[error("read of {needed} bytes at offset {offset} past end of {len}-byte buffer")]
    OutOfBounds {
        offset: usize,
        needed: usize,
        len: usize,
    },
}

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width value the cursor can encode.
pub trait Scalar: sealed::Sealed + Copy {
    /// Encoded width in bytes.
    const SIZE: usize;

    #[doc(hidden)]
    fn put(self, dst: &mut [u8]);

    #[doc(hidden)]
    fn get(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}

        impl Scalar for $t {
            const SIZE: usize = std::mem::size_of::<$t>();

            fn put(self, dst: &mut [u8]) {
                dst.copy_from_slice(&self.to_le_bytes());
            }

            fn get(src: &[u8]) -> Self {
                let mut bytes = [0u8; std::mem::size_of::<$t>()];
                bytes.copy_from_slice(src);
                <$t>::from_le_bytes(bytes)
            }
        }
    )*};
}

impl_scalar!(u8, u16, u32, u64, f32);

/// An unsigned integer used as a per-record bit set of changed fields.
pub trait ChangeMask:
    Scalar
    + Default
    + Eq
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Shl<u32, Output = Self>
{
    /// Number of flags the mask can carry.
    const BITS: u32;

    /// The mask with only the lowest bit set.
    const ONE: Self;

    /// The mask with bit `index` set.
    #[must_use]
    fn bit(index: u32) -> Self {
        Self::ONE << index
    }

    #[must_use]
    fn is_empty(self) -> bool {
        self == Self::default()
    }
}

macro_rules! impl_change_mask {
    ($($t:ty),*) => {$(
        impl ChangeMask for $t {
            const BITS: u32 = <$t>::BITS;
            const ONE: Self = 1;
        }
    )*};
}

impl_change_mask!(u8, u16, u32, u64);

/// A saved cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

impl Mark {
    #[must_use]
    pub fn offset(self) -> usize {
        self.0
    }
}

/// Reserved space for a `T`, filled later with [`ViewCursor::patch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot<T> {
    offset: usize,
    _marker: PhantomData<T>,
}

/// An open optional record: where it started and where its mask goes.
#[derive(Debug, Clone, Copy)]
#[must_use = "an open record must be closed with `end_record`"]
pub struct Record<M> {
    start: Mark,
    mask: Slot<M>,
}

/// A buffer with a read/write offset.
#[derive(Debug, Clone)]
pub struct ViewCursor<B = Vec<u8>> {
    buf: B,
    offset: usize,
}

impl ViewCursor<Vec<u8>> {
    /// A zero-filled buffer of `capacity` bytes, offset 0.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::wrap(vec![0; capacity])
    }

    /// Copies out the bytes written so far and resets the offset to 0.
    pub fn take_written(&mut self) -> Vec<u8> {
        let out = self.buf[..self.offset].to_vec();
        self.offset = 0;
        out
    }
}

impl<B> ViewCursor<B> {
    /// Wraps an existing buffer with the offset at 0.
    pub fn wrap(buf: B) -> Self {
        Self { buf, offset: 0 }
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn mark(&self) -> Mark {
        Mark(self.offset)
    }

    /// Moves the offset back to `mark`.
    pub fn rewind(&mut self, mark: Mark) {
        self.offset = mark.0;
    }

    /// Moves the offset back to the start, discarding everything written.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    pub fn into_inner(self) -> B {
        self.buf
    }
}

impl<B: AsRef<[u8]>> ViewCursor<B> {
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.as_ref().len()
    }

    /// Bytes between the offset and the end of the buffer.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.offset)
    }

    /// The prefix `0..offset`.
    #[must_use]
    pub fn written(&self) -> &[u8] {
        &self.buf.as_ref()[..self.offset]
    }

    /// Reads a `T` at the offset and advances.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::OutOfBounds`] if fewer than `T::SIZE` bytes
    /// remain.
    pub fn read<T: Scalar>(&mut self) -> Result<T, CursorError> {
        let buf = self.buf.as_ref();
        let end = self.offset + T::SIZE;
        let bytes = buf.get(self.offset..end).ok_or(CursorError::OutOfBounds {
            offset: self.offset,
            needed: T::SIZE,
            len: buf.len(),
        })?;
        let value = T::get(bytes);
        self.offset = end;
        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        self.read()
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        self.read()
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        self.read()
    }

    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        self.read()
    }

    pub fn read_f32(&mut self) -> Result<f32, CursorError> {
        self.read()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> ViewCursor<B> {
    fn claim(&mut self, needed: usize) -> Result<usize, CursorError> {
        let capacity = self.capacity();
        if self.offset + needed > capacity {
            return Err(CursorError::Overflow {
                offset: self.offset,
                needed,
                capacity,
            });
        }
        let at = self.offset;
        self.offset += needed;
        Ok(at)
    }

    /// Writes `value` at the offset and advances.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if the value does not fit.
    pub fn write<T: Scalar>(&mut self, value: T) -> Result<(), CursorError> {
        let at = self.claim(T::SIZE)?;
        value.put(&mut self.buf.as_mut()[at..at + T::SIZE]);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), CursorError> {
        self.write(value)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), CursorError> {
        self.write(value)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), CursorError> {
        self.write(value)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), CursorError> {
        self.write(value)
    }

    pub fn write_f32(&mut self, value: f32) -> Result<(), CursorError> {
        self.write(value)
    }

    /// Reserves room for a `T` and advances past it.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if the space does not fit.
    pub fn space<T: Scalar>(&mut self) -> Result<Slot<T>, CursorError> {
        let offset = self.claim(T::SIZE)?;
        Ok(Slot {
            offset,
            _marker: PhantomData,
        })
    }

    /// Fills a slot previously reserved on this cursor. The offset does not
    /// move.
    pub fn patch<T: Scalar>(&mut self, slot: Slot<T>, value: T) {
        value.put(&mut self.buf.as_mut()[slot.offset..slot.offset + T::SIZE]);
    }

    /// Opens an optional record: remembers the position and reserves its
    /// change mask.
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::Overflow`] if the mask does not fit.
    pub fn begin_record<M: ChangeMask>(&mut self) -> Result<Record<M>, CursorError> {
        let start = self.mark();
        let mask = self.space::<M>()?;
        Ok(Record { start, mask })
    }

    /// Closes a record. A non-empty `mask` is patched in and the bytes kept;
    /// an empty one rewinds to where the record began. Returns whether the
    /// record was kept.
    pub fn end_record<M: ChangeMask>(&mut self, record: Record<M>, mask: M) -> bool {
        if mask.is_empty() {
            self.rewind(record.start);
            false
        } else {
            self.patch(record.mask, mask);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_round_trip() {
        let mut cursor = ViewCursor::new(19);
        cursor.write_u8(0xAB).unwrap();
        cursor.write_u16(0x1234).unwrap();
        cursor.write_u32(7).unwrap();
        cursor.write_u64(u64::MAX - 1).unwrap();
        cursor.write_f32(1.5).unwrap();
        assert_eq!(cursor.offset(), 19);
        assert_eq!(&cursor.written()[1..3], &[0x34, 0x12]);

        let bytes = cursor.take_written();
        assert_eq!(cursor.offset(), 0);

        let mut reader = ViewCursor::wrap(bytes.as_slice());
        assert_eq!(reader.read_u8().unwrap(), 0xAB);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(reader.read_f32().unwrap(), 1.5);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_write_past_capacity_overflows() {
        let mut cursor = ViewCursor::new(3);
        cursor.write_u16(1).unwrap();
        let err = cursor.write_u16(2).unwrap_err();
        assert_eq!(
            err,
            CursorError::Overflow {
                offset: 2,
                needed: 2,
                capacity: 3
            }
        );
        assert_eq!(cursor.offset(), 2);
    }

    #[test]
    fn test_read_past_end_is_out_of_bounds() {
        let bytes = [1u8, 0, 0];
        let mut cursor = ViewCursor::wrap(&bytes[..]);
        assert!(matches!(
            cursor.read_u32(),
            Err(CursorError::OutOfBounds { needed: 4, len: 3, .. })
        ));
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn test_space_and_patch() {
        let mut cursor = ViewCursor::new(8);
        let slot = cursor.space::<u32>().unwrap();
        cursor.write_u32(99).unwrap();
        cursor.patch(slot, 5);
        assert_eq!(cursor.written(), &[5, 0, 0, 0, 99, 0, 0, 0]);
    }

    #[test]
    fn test_empty_record_leaves_no_trace() {
        let mut cursor = ViewCursor::new(16);
        cursor.write_u8(1).unwrap();
        let before = cursor.written().to_vec();

        let record = cursor.begin_record::<u16>().unwrap();
        cursor.write_f32(3.0).unwrap();
        assert!(!cursor.end_record(record, 0));

        assert_eq!(cursor.written(), before.as_slice());
    }

    #[test]
    fn test_kept_record_patches_mask() {
        let mut cursor = ViewCursor::new(16);
        let record = cursor.begin_record::<u8>().unwrap();
        cursor.write_f32(0.0).unwrap();
        assert!(cursor.end_record(record, u8::bit(2)));
        assert_eq!(cursor.written(), &[0b100, 0, 0, 0, 0]);
    }

    #[test]
    fn test_change_mask_bits() {
        assert_eq!(u16::bit(11), 0x0800);
        assert_eq!(<u64 as ChangeMask>::BITS, 64);
        assert!(0u32.is_empty());
    }
}
