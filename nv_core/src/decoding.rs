//! Interpretation tags for note buffers.
//!
//! A [`ByteDecoding`] never changes the stored bytes; it only tells readers
//! how to interpret them (byte order for numerics, text form for strings,
//! framing for composites).

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD as B64, URL_SAFE as B64_URL};
use bytes::Bytes;
use data_encoding::{BASE32, HEXLOWER, HEXLOWER_PERMISSIVE};

use crate::{NoteError, NoteResult};

/// How the bytes of a [`crate::Note`] are meant to be read.
///
/// The discriminant is the tag byte used by the tagged wire form
/// ([`crate::Note::to_tagged_bytes`]); it is part of the on-disk format.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum ByteDecoding {
    /// Opaque bytes. Numerics read big-endian, text reads UTF-8.
    #[default]
    Raw = 0x00,
    /// UTF-8 text.
    Utf8 = 0x01,
    /// Big-endian numeric.
    BigEndian = 0x02,
    /// Little-endian numeric.
    LittleEndian = 0x03,
    /// Text form is lowercase hex.
    Base16 = 0x04,
    /// Text form is RFC 4648 base32 with padding.
    Base32 = 0x05,
    /// Text form is standard base64 with padding.
    Base64 = 0x06,
    /// Text form is URL-safe base64 with padding.
    Base64Url = 0x07,
    /// Back-to-back length-prefixed values (a [`crate::NoteList`]).
    FramedList = 0x08,
    /// Back-to-back length-prefixed key/value pairs (a [`crate::NoteMap`]).
    PairList = 0x09,
}

impl ByteDecoding {
    /// True when fixed-width numerics should be read least significant byte first.
    pub fn is_little_endian(self) -> bool {
        matches!(self, ByteDecoding::LittleEndian)
    }

    /// True for tags whose buffers are framed composites.
    pub fn is_framed(self) -> bool {
        matches!(self, ByteDecoding::FramedList | ByteDecoding::PairList)
    }

    /// Renders `bytes` in this tag's text form.
    pub fn encode(self, bytes: &[u8]) -> NoteResult<String> {
        match self {
            ByteDecoding::Base16 => Ok(HEXLOWER.encode(bytes)),
            ByteDecoding::Base32 => Ok(BASE32.encode(bytes)),
            ByteDecoding::Base64 => Ok(B64.encode(bytes)),
            ByteDecoding::Base64Url => Ok(B64_URL.encode(bytes)),
            ByteDecoding::Raw
            | ByteDecoding::Utf8
            | ByteDecoding::BigEndian
            | ByteDecoding::LittleEndian => String::from_utf8(bytes.to_vec())
                .map_err(|e| NoteError::malformed(format!("invalid utf-8: {e}"))),
            ByteDecoding::FramedList | ByteDecoding::PairList => Err(NoteError::malformed(
                format!("{self:?} buffers have no text form"),
            )),
        }
    }

    /// Parses `text` written in this tag's text form back into bytes.
    pub fn decode(self, text: &str) -> NoteResult<Bytes> {
        let decoded = match self {
            ByteDecoding::Base16 => HEXLOWER_PERMISSIVE
                .decode(text.as_bytes())
                .map_err(|e| NoteError::malformed(format!("invalid base16: {e}")))?,
            ByteDecoding::Base32 => BASE32
                .decode(text.as_bytes())
                .map_err(|e| NoteError::malformed(format!("invalid base32: {e}")))?,
            ByteDecoding::Base64 => B64
                .decode(text)
                .map_err(|e| NoteError::malformed(format!("invalid base64: {e}")))?,
            ByteDecoding::Base64Url => B64_URL
                .decode(text)
                .map_err(|e| NoteError::malformed(format!("invalid url-safe base64: {e}")))?,
            ByteDecoding::Raw
            | ByteDecoding::Utf8
            | ByteDecoding::BigEndian
            | ByteDecoding::LittleEndian => text.as_bytes().to_vec(),
            ByteDecoding::FramedList | ByteDecoding::PairList => {
                return Err(NoteError::malformed(format!(
                    "{self:?} buffers have no text form"
                )));
            }
        };
        Ok(Bytes::from(decoded))
    }
}

impl ByteDecoding {
    pub const ALL: [ByteDecoding; 10] = [
        ByteDecoding::Raw,
        ByteDecoding::Utf8,
        ByteDecoding::BigEndian,
        ByteDecoding::LittleEndian,
        ByteDecoding::Base16,
        ByteDecoding::Base32,
        ByteDecoding::Base64,
        ByteDecoding::Base64Url,
        ByteDecoding::FramedList,
        ByteDecoding::PairList,
    ];

    /// Short lowercase name, as accepted by [`str::parse`].
    pub fn name(self) -> &'static str {
        match self {
            ByteDecoding::Raw => "raw",
            ByteDecoding::Utf8 => "utf8",
            ByteDecoding::BigEndian => "be",
            ByteDecoding::LittleEndian => "le",
            ByteDecoding::Base16 => "base16",
            ByteDecoding::Base32 => "base32",
            ByteDecoding::Base64 => "base64",
            ByteDecoding::Base64Url => "base64url",
            ByteDecoding::FramedList => "list",
            ByteDecoding::PairList => "map",
        }
    }
}

impl std::fmt::Display for ByteDecoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ByteDecoding {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "hex" => return Ok(ByteDecoding::Base16),
            "text" => return Ok(ByteDecoding::Utf8),
            _ => {}
        }
        ByteDecoding::ALL
            .into_iter()
            .find(|tag| tag.name() == lower)
            .ok_or_else(|| NoteError::malformed(format!("unknown byte decoding name: {s}")))
    }
}

impl TryFrom<u8> for ByteDecoding {
    type Error = NoteError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ByteDecoding::Raw),
            0x01 => Ok(ByteDecoding::Utf8),
            0x02 => Ok(ByteDecoding::BigEndian),
            0x03 => Ok(ByteDecoding::LittleEndian),
            0x04 => Ok(ByteDecoding::Base16),
            0x05 => Ok(ByteDecoding::Base32),
            0x06 => Ok(ByteDecoding::Base64),
            0x07 => Ok(ByteDecoding::Base64Url),
            0x08 => Ok(ByteDecoding::FramedList),
            0x09 => Ok(ByteDecoding::PairList),
            other => Err(NoteError::UnknownTag(other)),
        }
    }
}

/// Truncates to `N` bytes or zero-pads at the end.
pub(crate) fn copy_of<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let len = bytes.len().min(N);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}
