//! Extend Read and Write with some convenience methods for binary i/o
//!
use std::io::{self, Read, Write};

use paste::paste;
use unsigned_varint::{
    encode::{u64 as varint_encode_u64, u64_buffer as varint_u64_buffer},
    io::{read_u64 as varint_read_u64, ReadError},
};

macro_rules! read_be {
    ($($type:ident),*) => {
        paste! {
            $(
                /// Read a Big Endian encoded number from a stream
                fn [<read_ $type>](&mut self) -> io::Result<$type> {
                    let mut buffer = [0; std::mem::size_of::<$type>()];
                    self.read_exact(&mut buffer)?;

                    Ok($type::from_be_bytes(buffer))
                }
            )*
        }
    };
}

macro_rules! write_be {
    ($($type:ident),*) => {
        paste! {
            $(
                /// Write a Big Endian encoded number to a stream
                fn [<write_ $type>](&mut self, word: $type) -> io::Result<()> {
                    self.write_all(&word.to_be_bytes())
                }
            )*
        }
    };
}

pub(crate) trait ExtendedRead: Read {
    read_be!(u16, u32, f64);

    /// Read an unsigned varint from a stream
    fn read_varint(&mut self) -> io::Result<u64> {
        varint_read_u64(&mut *self).map_err(|err| match err {
            ReadError::Io(err) => err,
            err => io::Error::new(io::ErrorKind::InvalidData, err.to_string()),
        })
    }
}

impl<R: Read + ?Sized> ExtendedRead for R {}

pub(crate) trait ExtendedWrite: Write {
    write_be!(u16, u32, f64);

    /// Write an unsigned varint to a stream
    fn write_varint(&mut self, word: u64) -> io::Result<()> {
        let mut buffer = varint_u64_buffer();
        self.write_all(varint_encode_u64(word, &mut buffer))
    }
}

impl<W: Write + ?Sized> ExtendedWrite for W {}
