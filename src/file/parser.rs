//! Low-level byte stream parser for artifact containers.
//!
//! This module provides [`Parser`], a cursor-based binary reader used to
//! decode the artifact container format and the signature/optimization
//! payloads embedded in it. It offers bounds-checked access to binary data
//! with little-endian primitives, 7-bit encoded lengths, and
//! length-prefixed UTF-8 strings.
//!
//! # Architecture
//!
//! The parser is built around a simple cursor model that maintains a
//! position within a byte slice:
//!
//! - **Position tracking** - Maintains current offset for sequential reads
//! - **Bounds checking** - All operations validate data availability first
//! - **Type-safe reading** - Strongly typed methods for common data types
//!
//! # Usage Examples
//!
//! ```rust
//! use depscope::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04];
//! let mut parser = Parser::new(&data);
//!
//! let value = parser.read_u16()?;
//! assert_eq!(value, 0x0201);
//! # Ok::<(), depscope::Error>(())
//! ```
//!
//! ## Length-Prefixed Strings
//!
//! ```rust
//! use depscope::Parser;
//!
//! // 7-bit encoded length 5, then "Hello"
//! let data = [0x05, b'H', b'e', b'l', b'l', b'o'];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_prefixed_string_utf8()?, "Hello");
//! # Ok::<(), depscope::Error>(())
//! ```

use crate::Result;

/// A cursor-based binary reader for artifact containers and payloads.
///
/// Maintains an internal position and bounds-checks every read, so
/// truncated or malformed artifacts surface as errors instead of panics.
///
/// # Examples
///
/// ```rust
/// use depscope::Parser;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut parser = Parser::new(&data);
///
/// let first = parser.read_u32()?;
/// assert_eq!(first, 0x04030201);
/// assert_eq!(parser.pos(), 4);
/// # Ok::<(), depscope::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    ///
    /// # Arguments
    /// * `data` - The byte slice to read from
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the current position to the specified index.
    ///
    /// # Arguments
    /// * `pos` - The position to move the cursor to
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the position is beyond the
    /// data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Arguments
    /// * `step` - Amount of bytes to advance
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by `step` would
    /// exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(next) if next <= self.data.len() => {
                self.position = next;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Read a single byte and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if no byte is available.
    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.read_bytes(1)?;
        Ok(bytes[0])
    }

    /// Read a `u16` in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the
    /// data length.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a `u32` in little-endian format and advance the position.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the
    /// data length.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read `len` raw bytes and advance the position.
    ///
    /// # Arguments
    /// * `len` - Number of bytes to read
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would exceed the
    /// data length.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        match self.position.checked_add(len) {
            Some(end) if end <= self.data.len() => {
                let slice = &self.data[self.position..end];
                self.position = end;
                Ok(slice)
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Read a 7-bit encoded unsigned integer.
    ///
    /// Each byte contributes 7 bits, low-order group first; the high bit
    /// marks continuation. At most five bytes encode a `u32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if data runs out mid-value, or
    /// [`crate::Error::Malformed`] if the encoding exceeds five bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use depscope::Parser;
    ///
    /// let data = [0x7F];
    /// let mut parser = Parser::new(&data);
    /// assert_eq!(parser.read_7bit_encoded_int()?, 127);
    ///
    /// let data = [0x80, 0x01];
    /// let mut parser = Parser::new(&data);
    /// assert_eq!(parser.read_7bit_encoded_int()?, 128);
    /// # Ok::<(), depscope::Error>(())
    /// ```
    pub fn read_7bit_encoded_int(&mut self) -> Result<u32> {
        let mut result: u32 = 0;
        let mut shift = 0;

        loop {
            let byte = self.read_u8()?;
            result |= u32::from(byte & 0x7F) << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }

            shift += 7;
            if shift >= 35 {
                return Err(malformed_error!(
                    "7-bit encoded integer exceeds five bytes at offset {}",
                    self.position
                ));
            }
        }
    }

    /// Read a length-prefixed UTF-8 string.
    ///
    /// The length is a 7-bit encoded byte count followed by the raw UTF-8
    /// data, the convention used throughout the artifact container.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the declared length exceeds
    /// the remaining data, or [`crate::Error::Malformed`] if the bytes are
    /// not valid UTF-8.
    pub fn read_prefixed_string_utf8(&mut self) -> Result<String> {
        let length = self.read_7bit_encoded_int()? as usize;
        let start = self.position;
        let bytes = self.read_bytes(length)?;

        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Err(malformed_error!(
                "Invalid UTF-8 in prefixed string at offset {}",
                start
            )),
        }
    }
}
