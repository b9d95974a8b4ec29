//! Register word codecs
//!
//! - `words`: word/byte order conversions
//! - `decoder`: transport response to sample value
//! - `encoder`: write spec to transport request

pub mod decoder;
pub mod encoder;
pub mod words;

pub use decoder::SampleDecoder;
pub use encoder::{EncodedRequest, SampleEncoder, WriteOutcome};
pub use words::{
    bytes_4_to_regs, f32_to_regs, i32_to_regs, regs_to_bytes_4, regs_to_f32, regs_to_i32,
    WordOrder,
};
