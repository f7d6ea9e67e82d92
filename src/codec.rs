//! Typed payload codecs.
//!
//! Register payloads are sequences of big-endian words; these helpers decode
//! them into typed vectors and encode typed values back into register bytes.
//! Bit payloads pack booleans LSB-first, bit `i` landing in byte `i / 8`.

use crate::error::{ModbusError, ModbusResult};

fn check_len(data: &[u8], count: usize, width: usize) -> ModbusResult<()> {
    let expected = count * width;
    if data.len() < expected {
        return Err(ModbusError::InsufficientData {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

macro_rules! decode_array {
    ($data:expr, $count:expr, $ty:ty) => {{
        const WIDTH: usize = std::mem::size_of::<$ty>();
        check_len($data, $count, WIDTH)?;
        Ok($data[..$count * WIDTH]
            .chunks_exact(WIDTH)
            .map(|chunk| <$ty>::from_be_bytes(chunk.try_into().unwrap()))
            .collect())
    }};
}

/// Decode `count` booleans from an LSB-first bit-packed payload.
pub fn to_bool_array(data: &[u8], count: usize) -> ModbusResult<Vec<bool>> {
    check_len(data, count.div_ceil(8), 1)?;
    Ok((0..count).map(|i| (data[i / 8] & (1 << (i % 8))) != 0).collect())
}

/// Decode `count` big-endian u16 words.
pub fn to_u16_array(data: &[u8], count: usize) -> ModbusResult<Vec<u16>> {
    decode_array!(data, count, u16)
}

/// Decode `count` big-endian i16 words.
pub fn to_i16_array(data: &[u8], count: usize) -> ModbusResult<Vec<i16>> {
    decode_array!(data, count, i16)
}

/// Decode `count` big-endian u32 values, each spanning two registers.
pub fn to_u32_array(data: &[u8], count: usize) -> ModbusResult<Vec<u32>> {
    decode_array!(data, count, u32)
}

/// Decode `count` big-endian i32 values.
pub fn to_i32_array(data: &[u8], count: usize) -> ModbusResult<Vec<i32>> {
    decode_array!(data, count, i32)
}

/// Decode `count` big-endian u64 values, each spanning four registers.
pub fn to_u64_array(data: &[u8], count: usize) -> ModbusResult<Vec<u64>> {
    decode_array!(data, count, u64)
}

/// Decode `count` big-endian i64 values.
pub fn to_i64_array(data: &[u8], count: usize) -> ModbusResult<Vec<i64>> {
    decode_array!(data, count, i64)
}

/// Decode `count` big-endian IEEE-754 f32 values.
pub fn to_f32_array(data: &[u8], count: usize) -> ModbusResult<Vec<f32>> {
    decode_array!(data, count, f32)
}

/// Decode `count` big-endian IEEE-754 f64 values.
pub fn to_f64_array(data: &[u8], count: usize) -> ModbusResult<Vec<f64>> {
    decode_array!(data, count, f64)
}

/// Pack booleans into bytes LSB-first, padding the final byte with zeros.
pub fn bools_to_bytes(values: &[bool]) -> Vec<u8> {
    let mut data = vec![0u8; values.len().div_ceil(8)];
    for (i, &value) in values.iter().enumerate() {
        if value {
            data[i / 8] |= 1 << (i % 8);
        }
    }
    data
}

/// Encode u16 values as big-endian register bytes.
pub fn u16_to_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Encode i16 values as big-endian register bytes.
pub fn i16_to_bytes(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Encode u32 values as big-endian register bytes, two registers each.
pub fn u32_to_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Encode i32 values as big-endian register bytes.
pub fn i32_to_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// Encode f32 values as big-endian register bytes.
pub fn f32_to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}
