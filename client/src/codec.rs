//! Stateless conversions between text, integers and raw byte buffers.
//!
//! These helpers sit underneath the handle's text accessors and the external
//! binding path. Every failure is reported as a [`FormatError`].

use std::fmt;

use crate::error::FormatError;

/// The text encodings understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
  Utf8,
  /// Little-endian UTF-16, two bytes per code unit.
  Utf16Le,
}

impl fmt::Display for Encoding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Encoding::Utf8 => write!(f, "UTF-8"),
      Encoding::Utf16Le => write!(f, "UTF-16LE"),
    }
  }
}

/// Encodes `text` into a freshly allocated byte buffer.
pub fn encode(text: &str, encoding: Encoding) -> Vec<u8> {
  match encoding {
    Encoding::Utf8 => text.as_bytes().to_vec(),
    Encoding::Utf16Le => text
      .encode_utf16()
      .flat_map(|unit| unit.to_le_bytes())
      .collect(),
  }
}

/// Decodes a complete buffer as text.
pub fn decode(bytes: &[u8], encoding: Encoding) -> Result<String, FormatError> {
  match encoding {
    Encoding::Utf8 => std::str::from_utf8(bytes)
      .map(str::to_owned)
      .map_err(|e| FormatError::InvalidEncoding {
        encoding,
        message: e.to_string(),
      }),
    Encoding::Utf16Le => {
      if bytes.len() % 2 != 0 {
        return Err(FormatError::InvalidEncoding {
          encoding,
          message: format!("odd byte length {}", bytes.len()),
        });
      }
      let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
      String::from_utf16(&units).map_err(|e| FormatError::InvalidEncoding {
        encoding,
        message: e.to_string(),
      })
    }
  }
}

/// Decodes `len` bytes starting at `offset`.
pub fn decode_range(
  bytes: &[u8],
  offset: usize,
  len: usize,
  encoding: Encoding,
) -> Result<String, FormatError> {
  decode(window(bytes, offset, len)?, encoding)
}

/// Parses a decimal `i32` from ASCII bytes. Surrounding whitespace and a
/// leading sign are accepted.
pub fn parse_i32(bytes: &[u8]) -> Result<i32, FormatError> {
  let text = std::str::from_utf8(bytes)
    .map_err(|_| FormatError::InvalidInteger(String::from_utf8_lossy(bytes).into_owned()))?;
  text
    .trim()
    .parse::<i32>()
    .map_err(|_| FormatError::InvalidInteger(text.to_owned()))
}

/// Parses a decimal `i32` from `size` bytes starting at `offset`.
pub fn parse_i32_range(bytes: &[u8], offset: usize, size: usize) -> Result<i32, FormatError> {
  parse_i32(window(bytes, offset, size)?)
}

/// Copies the half-open range `start..end` into a new buffer.
pub fn copy_range(bytes: &[u8], start: usize, end: usize) -> Result<Vec<u8>, FormatError> {
  if start > end || end > bytes.len() {
    return Err(FormatError::OutOfBounds {
      start,
      end,
      len: bytes.len(),
    });
  }
  Ok(bytes[start..end].to_vec())
}

/// Copies `len` bytes starting at `start` into a new buffer.
pub fn sub_array(bytes: &[u8], start: usize, len: usize) -> Result<Vec<u8>, FormatError> {
  window(bytes, start, len).map(<[u8]>::to_vec)
}

fn window(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], FormatError> {
  let end = offset.checked_add(len).ok_or(FormatError::OutOfBounds {
    start: offset,
    end: usize::MAX,
    len: bytes.len(),
  })?;
  bytes.get(offset..end).ok_or(FormatError::OutOfBounds {
    start: offset,
    end,
    len: bytes.len(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn text_survives_both_encodings() {
    for text in ["", "orders", "naïve café ☕", "𝄞 clef"] {
      for encoding in [Encoding::Utf8, Encoding::Utf16Le] {
        let bytes = encode(text, encoding);
        assert_eq!(decode(&bytes, encoding).unwrap(), text, "{encoding}");
      }
    }
  }

  #[test]
  fn utf16_uses_two_bytes_per_unit() {
    assert_eq!(encode("ab", Encoding::Utf16Le), vec![b'a', 0, b'b', 0]);
  }

  #[test]
  fn decode_rejects_malformed_input() {
    let err = decode(&[0xff, 0xfe, 0xfd], Encoding::Utf8).unwrap_err();
    assert!(matches!(err, FormatError::InvalidEncoding { encoding: Encoding::Utf8, .. }));

    let err = decode(&[b'a', 0, b'b'], Encoding::Utf16Le).unwrap_err();
    assert!(matches!(err, FormatError::InvalidEncoding { encoding: Encoding::Utf16Le, .. }));

    // An unpaired high surrogate.
    let err = decode(&[0x00, 0xd8], Encoding::Utf16Le).unwrap_err();
    assert!(matches!(err, FormatError::InvalidEncoding { .. }));
  }

  #[test]
  fn decode_range_reads_a_window() {
    let bytes = b"--orders--";
    assert_eq!(decode_range(bytes, 2, 6, Encoding::Utf8).unwrap(), "orders");
    assert!(matches!(
      decode_range(bytes, 8, 5, Encoding::Utf8),
      Err(FormatError::OutOfBounds { start: 8, end: 13, len: 10 })
    ));
  }

  #[test]
  fn parse_i32_accepts_decimal_text() {
    assert_eq!(parse_i32(b"42").unwrap(), 42);
    assert_eq!(parse_i32(b" -17 ").unwrap(), -17);
    assert_eq!(parse_i32(b"+8").unwrap(), 8);
    assert_eq!(parse_i32_range(b"len=0128;", 4, 4).unwrap(), 128);
  }

  #[test]
  fn parse_i32_rejects_garbage() {
    assert_eq!(parse_i32(b"").unwrap_err(), FormatError::InvalidInteger(String::new()));
    assert!(matches!(parse_i32(b"12a"), Err(FormatError::InvalidInteger(_))));
    assert!(matches!(parse_i32(b"99999999999"), Err(FormatError::InvalidInteger(_))));
    assert!(matches!(parse_i32(&[0xff]), Err(FormatError::InvalidInteger(_))));
  }

  #[test]
  fn copy_helpers_respect_bounds() {
    let bytes = [1u8, 2, 3, 4, 5];
    assert_eq!(copy_range(&bytes, 1, 4).unwrap(), vec![2, 3, 4]);
    assert_eq!(copy_range(&bytes, 2, 2).unwrap(), Vec::<u8>::new());
    assert_eq!(sub_array(&bytes, 3, 2).unwrap(), vec![4, 5]);

    assert!(matches!(copy_range(&bytes, 4, 2), Err(FormatError::OutOfBounds { .. })));
    assert!(matches!(copy_range(&bytes, 0, 6), Err(FormatError::OutOfBounds { .. })));
    assert!(matches!(sub_array(&bytes, usize::MAX, 2), Err(FormatError::OutOfBounds { .. })));
  }
}
