//! The atomic value type: a byte buffer plus the tag that says how to read it.

use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};
use num_bigint::BigInt;

use crate::decoding::copy_of;
use crate::{ByteDecoding, NoteError, NoteResult};

/// A tagged byte buffer.
///
/// Equality and hashing only look at the bytes; two notes with the same
/// buffer and different tags are equal. The buffer is shared (`Bytes`), so
/// cloning a note is cheap.
///
/// ```
/// use nv_core::{ByteDecoding, Note};
///
/// let n = Note::from_i32(0x0102_0304, ByteDecoding::LittleEndian);
/// assert_eq!(n.as_bytes(), &[4, 3, 2, 1]);
/// assert_eq!(n.as_i32(), 0x0102_0304);
/// ```
#[derive(Clone, Default)]
pub struct Note {
    bytes: Bytes,
    tag: ByteDecoding,
}

impl Note {
    pub fn new(bytes: impl Into<Bytes>, tag: ByteDecoding) -> Self {
        Self {
            bytes: bytes.into(),
            tag,
        }
    }

    /// A raw note over `bytes`.
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self::new(bytes, ByteDecoding::Raw)
    }

    /// A UTF-8 note holding `text`.
    pub fn text(text: impl AsRef<str>) -> Self {
        Self::new(
            Bytes::copy_from_slice(text.as_ref().as_bytes()),
            ByteDecoding::Utf8,
        )
    }

    /// Parses `text` written in `tag`'s text form (hex, base32, ...).
    pub fn from_text(text: &str, tag: ByteDecoding) -> NoteResult<Self> {
        Ok(Self::new(tag.decode(text)?, tag))
    }

    pub fn from_i16(value: i16, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_i32(value: i32, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_u32(value: u32, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_i64(value: i64, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_u64(value: u64, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_f32(value: f32, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_f64(value: f64, tag: ByteDecoding) -> Self {
        Self::numeric(value.to_be_bytes(), value.to_le_bytes(), tag)
    }

    pub fn from_bool(value: bool) -> Self {
        let byte: &'static [u8] = if value { &[1] } else { &[0] };
        Self::raw(Bytes::from_static(byte))
    }

    /// Two's-complement encoding of `value` in the tag's byte order.
    pub fn from_big_int(value: &BigInt, tag: ByteDecoding) -> Self {
        let bytes = if tag.is_little_endian() {
            value.to_signed_bytes_le()
        } else {
            value.to_signed_bytes_be()
        };
        Self::new(bytes, tag)
    }

    fn numeric<const N: usize>(be: [u8; N], le: [u8; N], tag: ByteDecoding) -> Self {
        let bytes = if tag.is_little_endian() { le } else { be };
        Self::new(Bytes::copy_from_slice(&bytes), tag)
    }

    /// Replaces buffer and tag together.
    pub fn set(&mut self, bytes: impl Into<Bytes>, tag: ByteDecoding) {
        self.bytes = bytes.into();
        self.tag = tag;
    }

    pub fn tag(&self) -> ByteDecoding {
        self.tag
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the buffer.
    pub fn bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Same bytes, different interpretation.
    pub fn with_tag(&self, tag: ByteDecoding) -> Self {
        Self::new(self.bytes.clone(), tag)
    }

    /// Text form of the buffer according to the tag.
    pub fn as_string(&self) -> NoteResult<String> {
        self.tag.encode(&self.bytes)
    }

    fn fixed<const N: usize>(&self) -> [u8; N] {
        copy_of::<N>(&self.bytes)
    }

    pub fn as_i16(&self) -> i16 {
        let b = self.fixed::<2>();
        if self.tag.is_little_endian() {
            i16::from_le_bytes(b)
        } else {
            i16::from_be_bytes(b)
        }
    }

    pub fn as_i32(&self) -> i32 {
        let b = self.fixed::<4>();
        if self.tag.is_little_endian() {
            i32::from_le_bytes(b)
        } else {
            i32::from_be_bytes(b)
        }
    }

    pub fn as_u32(&self) -> u32 {
        let b = self.fixed::<4>();
        if self.tag.is_little_endian() {
            u32::from_le_bytes(b)
        } else {
            u32::from_be_bytes(b)
        }
    }

    pub fn as_i64(&self) -> i64 {
        let b = self.fixed::<8>();
        if self.tag.is_little_endian() {
            i64::from_le_bytes(b)
        } else {
            i64::from_be_bytes(b)
        }
    }

    pub fn as_u64(&self) -> u64 {
        let b = self.fixed::<8>();
        if self.tag.is_little_endian() {
            u64::from_le_bytes(b)
        } else {
            u64::from_be_bytes(b)
        }
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_bits(self.as_u32())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.as_u64())
    }

    /// First byte (zero-padded) is non-zero.
    pub fn as_bool(&self) -> bool {
        self.fixed::<1>()[0] != 0
    }

    /// Two's-complement integer of arbitrary width. Empty buffers have no value.
    pub fn as_big_int(&self) -> NoteResult<BigInt> {
        if self.bytes.is_empty() {
            return Err(NoteError::malformed("empty buffer has no integer value"));
        }
        Ok(if self.tag.is_little_endian() {
            BigInt::from_signed_bytes_le(&self.bytes)
        } else {
            BigInt::from_signed_bytes_be(&self.bytes)
        })
    }

    /// Self-describing form: one tag byte followed by the buffer.
    pub fn to_tagged_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.bytes.len());
        buf.put_u8(self.tag as u8);
        buf.put_slice(&self.bytes);
        buf.freeze()
    }

    pub fn from_tagged_bytes(mut bytes: Bytes) -> NoteResult<Self> {
        if bytes.is_empty() {
            return Err(NoteError::malformed("tagged note is missing its tag byte"));
        }
        let tag = ByteDecoding::try_from(bytes[0])?;
        let body = bytes.split_off(1);
        Ok(Self::new(body, tag))
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Note")
            .field("tag", &self.tag)
            .field("bytes", &HexPreview(&self.bytes))
            .finish()
    }
}

struct HexPreview<'a>(&'a [u8]);

impl fmt::Debug for HexPreview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const LIMIT: usize = 32;
        let shown = &self.0[..self.0.len().min(LIMIT)];
        f.write_str("h'")?;
        for b in shown {
            write!(f, "{:02x}", b)?;
        }
        if self.0.len() > LIMIT {
            write!(f, "..(+{})", self.0.len() - LIMIT)?;
        }
        f.write_str("'")
    }
}

impl From<&str> for Note {
    fn from(value: &str) -> Self {
        Note::text(value)
    }
}

impl From<String> for Note {
    fn from(value: String) -> Self {
        Self::new(Bytes::from(value.into_bytes()), ByteDecoding::Utf8)
    }
}

impl From<Bytes> for Note {
    fn from(value: Bytes) -> Self {
        Note::raw(value)
    }
}

impl From<Vec<u8>> for Note {
    fn from(value: Vec<u8>) -> Self {
        Note::raw(value)
    }
}

impl AsRef<[u8]> for Note {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_tag() {
        let a = Note::new(Bytes::from_static(b"abc"), ByteDecoding::Utf8);
        let b = Note::new(Bytes::from_static(b"abc"), ByteDecoding::Base64);
        assert_eq!(a, b);
        assert_ne!(a, Note::raw(Bytes::from_static(b"abd")));
    }

    #[test]
    fn empty_is_a_value() {
        let empty = Note::raw(Bytes::new());
        assert!(empty.is_empty());
        assert_eq!(Some(empty.clone()), Some(Note::default()));
        assert_ne!(Some(empty), None);
    }

    #[test]
    fn numeric_accessors_follow_tag_endianness() {
        let be = Note::from_i64(-2, ByteDecoding::BigEndian);
        let le = Note::from_i64(-2, ByteDecoding::LittleEndian);
        assert_eq!(be.as_i64(), -2);
        assert_eq!(le.as_i64(), -2);
        assert_eq!(be.as_bytes()[7], 0xfe);
        assert_eq!(le.as_bytes()[0], 0xfe);

        let f = Note::from_f64(1.5, ByteDecoding::LittleEndian);
        assert_eq!(f.as_f64(), 1.5);
        assert_eq!(Note::from_f32(-0.25, ByteDecoding::Raw).as_f32(), -0.25);
        assert_eq!(Note::from_i16(-300, ByteDecoding::Raw).as_i16(), -300);
        assert_eq!(Note::from_u32(7, ByteDecoding::Raw).as_u32(), 7);
        assert_eq!(Note::from_u64(u64::MAX, ByteDecoding::Raw).as_u64(), u64::MAX);
    }

    #[test]
    fn short_buffers_are_zero_padded_at_the_end() {
        let be = Note::new(Bytes::from_static(&[0x01, 0x02]), ByteDecoding::BigEndian);
        assert_eq!(be.as_i32(), 0x0102_0000);

        let le = Note::new(Bytes::from_static(&[0x01, 0x02]), ByteDecoding::LittleEndian);
        assert_eq!(le.as_i32(), 0x0201);

        assert_eq!(Note::default().as_i64(), 0);
    }

    #[test]
    fn long_buffers_are_truncated() {
        let n = Note::new(
            Bytes::from_static(&[0, 0, 0, 9, 0xff, 0xff]),
            ByteDecoding::BigEndian,
        );
        assert_eq!(n.as_i32(), 9);
    }

    #[test]
    fn booleans() {
        assert!(Note::from_bool(true).as_bool());
        assert!(!Note::from_bool(false).as_bool());
        assert!(!Note::default().as_bool());
    }

    #[test]
    fn big_integers() {
        let value = BigInt::from(-123_456_789_012_345_678_i64) * BigInt::from(1_000_000_i64);
        for tag in [ByteDecoding::BigEndian, ByteDecoding::LittleEndian] {
            let n = Note::from_big_int(&value, tag);
            assert_eq!(n.as_big_int().unwrap(), value);
        }
        assert!(matches!(
            Note::default().as_big_int(),
            Err(NoteError::MalformedValue(_))
        ));
    }

    #[test]
    fn strings_use_tag_text_form() {
        let n = Note::from_text("deadbeef", ByteDecoding::Base16).unwrap();
        assert_eq!(n.as_bytes(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(n.as_string().unwrap(), "deadbeef");
        assert_eq!(n.with_tag(ByteDecoding::Base64).as_string().unwrap(), "3q2+7w==");
        assert_eq!(Note::text("héllo").as_string().unwrap(), "héllo");
    }

    #[test]
    fn set_replaces_both_fields() {
        let mut n = Note::text("a");
        n.set(Bytes::from_static(&[0, 1]), ByteDecoding::LittleEndian);
        assert_eq!(n.tag(), ByteDecoding::LittleEndian);
        assert_eq!(n.as_i16(), 256);
    }

    #[test]
    fn tagged_form() {
        let n = Note::from_u32(42, ByteDecoding::LittleEndian);
        let tagged = n.to_tagged_bytes();
        assert_eq!(tagged[0], ByteDecoding::LittleEndian as u8);
        let back = Note::from_tagged_bytes(tagged).unwrap();
        assert_eq!(back.tag(), ByteDecoding::LittleEndian);
        assert_eq!(back.as_u32(), 42);

        assert!(Note::from_tagged_bytes(Bytes::new()).is_err());
        assert_eq!(
            Note::from_tagged_bytes(Bytes::from_static(&[0xee, 1])).unwrap_err(),
            NoteError::UnknownTag(0xee)
        );
    }
}
