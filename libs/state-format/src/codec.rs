//! Length-prefixed primitives.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::StateFormatError;

const PREFIX_LEN: usize = std::mem::size_of::<u32>();

pub(crate) struct Writer {
    buf: BytesMut,
}

impl Writer {
    pub(crate) fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    pub(crate) fn put_u32(&mut self, field: &'static str, value: usize) -> Result<(), StateFormatError> {
        let value =
            u32::try_from(value).map_err(|_| StateFormatError::TooLarge { field, len: value })?;
        self.buf.put_u32_le(value);
        Ok(())
    }

    pub(crate) fn put_tag(&mut self, tag: u32) {
        self.buf.put_u32_le(tag);
    }

    pub(crate) fn put_bytes(&mut self, field: &'static str, bytes: &[u8]) -> Result<(), StateFormatError> {
        self.put_u32(field, bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    pub(crate) fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn get_u32(&mut self, field: &'static str) -> Result<u32, StateFormatError> {
        self.require(field, PREFIX_LEN)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn get_len(&mut self, field: &'static str) -> Result<usize, StateFormatError> {
        let len = self.get_u32(field)?;
        usize::try_from(len).map_err(|_| StateFormatError::TooLarge {
            field,
            len: usize::MAX,
        })
    }

    pub(crate) fn get_bytes(&mut self, field: &'static str) -> Result<&'a [u8], StateFormatError> {
        let len = self.get_len(field)?;
        self.require(field, len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub(crate) fn get_str(&mut self, field: &'static str) -> Result<&'a str, StateFormatError> {
        let bytes = self.get_bytes(field)?;
        std::str::from_utf8(bytes).map_err(|source| StateFormatError::InvalidUtf8 { field, source })
    }

    fn require(&self, field: &'static str, needed: usize) -> Result<(), StateFormatError> {
        if self.buf.remaining() < needed {
            return Err(StateFormatError::Truncated {
                field,
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_are_little_endian() {
        let mut w = Writer::new();
        w.put_bytes("f", b"ab").unwrap();
        assert_eq!(&w.finish()[..], &[2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut r = Reader::new(&[5, 0, 0, 0, b'x']);
        let err = r.get_bytes("hostname").unwrap_err();
        assert!(matches!(
            err,
            StateFormatError::Truncated {
                field: "hostname",
                needed: 5,
                remaining: 1
            }
        ));
    }

    #[test]
    fn test_reader_rejects_bad_utf8() {
        let mut r = Reader::new(&[1, 0, 0, 0, 0xff]);
        assert!(matches!(
            r.get_str("task type"),
            Err(StateFormatError::InvalidUtf8 { .. })
        ));
    }
}
