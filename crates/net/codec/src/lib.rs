//! Byte-level codec for the tether wire format.
//!
//! Integers are encoded as unsigned varints (7 bits per byte, low group first, high bit set on
//! every byte but the last). Byte arrays are prefixed with their varint length; a zero length
//! means the array is absent.

mod error;
pub use error::CodecError;

mod varint;
pub use varint::{
    decode_varint, decode_varint_long, encode_varint, encode_varint_long, read_varint,
    read_varint_long, write_varint, write_varint_long,
};

mod array;
pub use array::{
    DEFAULT_MAX_ARRAY_LEN, decode_length_prefixed, encode_length_prefixed, read_length_prefixed,
    write_length_prefixed,
};
