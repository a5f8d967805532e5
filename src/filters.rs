//! Filters: codecs that rearrange or transform values without compressing
//!
//! `transpose` is a core codec. The others follow the numcodecs filters of
//! the same names and are also registered under a `numcodecs.` prefix.

use crate::buffer::ArrayBuffer;
use crate::codec::{
    parse_configuration, ArrayToArrayCodec, BytesToBytesCodec, ChunkSpec, Codec, CodecOptions,
    CodecTraits,
};
use crate::error::{ArrayError, Result};
use crate::types::{DataType, Element, FillValue};
use ndarray::{ArrayViewD, IxDyn};
use num_traits::{AsPrimitive, WrappingAdd, WrappingSub};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Once};

/// Name prefix of codecs shared with numcodecs
pub const NUMCODECS_PREFIX: &str = "numcodecs.";

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransposeConfiguration {
    order: Vec<usize>,
}

/// The `transpose` codec: permutes the dimensions of a chunk
///
/// Output dimension `i` is input dimension `order[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposeCodec {
    order: Vec<usize>,
}

impl TransposeCodec {
    pub const NAME: &'static str = "transpose";

    pub fn new(order: Vec<usize>) -> Result<Self> {
        let mut sorted = order.clone();
        sorted.sort_unstable();
        if sorted.iter().enumerate().any(|(i, &o)| i != o) {
            return Err(ArrayError::validation(format!(
                "transpose order {order:?} is not a permutation"
            )));
        }
        Ok(Self { order })
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: TransposeConfiguration = parse_configuration(Self::NAME, configuration)?;
        let codec = Self::new(config.order)
            .map_err(|e| ArrayError::UnsupportedCodec(e.to_string()))?;
        Ok(Codec::ArrayToArray(Arc::new(codec)))
    }

    fn inverse_order(&self) -> Vec<usize> {
        let mut inverse = vec![0; self.order.len()];
        for (i, &o) in self.order.iter().enumerate() {
            inverse[o] = i;
        }
        inverse
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if rank != self.order.len() {
            return Err(ArrayError::validation(format!(
                "transpose order has {} entries for a chunk of rank {}",
                self.order.len(),
                rank
            )));
        }
        Ok(())
    }
}

/// Permute the axes of `chunk` so that output axis `i` is input axis `order[i]`
fn permute_buffer(chunk: &ArrayBuffer, order: &[usize]) -> Result<ArrayBuffer> {
    let element_size = chunk.data_type().size_in_bytes();
    let mut shape: Vec<usize> = chunk.shape().iter().map(|&s| s as usize).collect();
    shape.push(element_size);
    let view = ArrayViewD::from_shape(IxDyn(&shape), chunk.as_bytes())
        .map_err(|e| ArrayError::codec(e.to_string()))?;

    // element bytes stay innermost
    let mut axes = order.to_vec();
    axes.push(order.len());
    let permuted = view.permuted_axes(axes);

    let out_shape = order.iter().map(|&o| chunk.shape()[o]).collect();
    let bytes: Vec<u8> = permuted.iter().copied().collect();
    ArrayBuffer::new(chunk.data_type(), out_shape, bytes)
}

impl CodecTraits for TransposeCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "order": self.order })
    }

    fn validate(&self, spec: &ChunkSpec) -> Result<()> {
        self.check_rank(spec.shape.len())
    }
}

impl ArrayToArrayCodec for TransposeCodec {
    fn encoded_spec(&self, decoded: &ChunkSpec) -> Result<ChunkSpec> {
        self.check_rank(decoded.shape.len())?;
        Ok(ChunkSpec {
            shape: self.order.iter().map(|&o| decoded.shape[o]).collect(),
            ..decoded.clone()
        })
    }

    fn encode_array(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer> {
        self.check_rank(chunk.shape().len())?;
        permute_buffer(&chunk, &self.order)
    }

    fn decode_array(&self, chunk: ArrayBuffer, decoded: &ChunkSpec) -> Result<ArrayBuffer> {
        self.check_rank(chunk.shape().len())?;
        let restored = permute_buffer(&chunk, &self.inverse_order())?;
        if restored.shape() != decoded.shape.as_slice() {
            return Err(ArrayError::codec(format!(
                "transpose decoded shape {:?}, expected {:?}",
                restored.shape(),
                decoded.shape
            )));
        }
        Ok(restored)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeltaConfiguration {}

/// The `delta` codec: stores the first element followed by successive
/// differences, in C order, with wrapping integer arithmetic.
///
/// Only integer data types are supported so that decoding is exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCodec;

impl DeltaCodec {
    pub const NAME: &'static str = "delta";

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        static WARN: Once = Once::new();
        let _: DeltaConfiguration = parse_configuration(Self::NAME, configuration)?;
        WARN.call_once(|| {
            log::warn!(
                "The `{}` codec is a numcodecs filter and may not be supported elsewhere.",
                Self::NAME
            )
        });
        Ok(Codec::ArrayToArray(Arc::new(Self)))
    }
}

fn delta_encode<T: Element + WrappingSub>(chunk: ArrayBuffer) -> Result<ArrayBuffer> {
    let values: Vec<T> = chunk.to_elements()?;
    let mut out = values.clone();
    for i in 1..values.len() {
        out[i] = values[i].wrapping_sub(&values[i - 1]);
    }
    ArrayBuffer::from_elements(chunk.shape().to_vec(), &out)
}

fn delta_decode<T: Element + WrappingAdd>(chunk: ArrayBuffer) -> Result<ArrayBuffer> {
    let mut values: Vec<T> = chunk.to_elements()?;
    for i in 1..values.len() {
        values[i] = values[i].wrapping_add(&values[i - 1]);
    }
    ArrayBuffer::from_elements(chunk.shape().to_vec(), &values)
}

macro_rules! dispatch_integer {
    ($data_type:expr, $f:ident, $chunk:expr) => {
        match $data_type {
            DataType::Int8 => $f::<i8>($chunk),
            DataType::Int16 => $f::<i16>($chunk),
            DataType::Int32 => $f::<i32>($chunk),
            DataType::Int64 => $f::<i64>($chunk),
            DataType::UInt8 => $f::<u8>($chunk),
            DataType::UInt16 => $f::<u16>($chunk),
            DataType::UInt32 => $f::<u32>($chunk),
            DataType::UInt64 => $f::<u64>($chunk),
            other => Err(ArrayError::validation(format!(
                "delta codec does not support {other}"
            ))),
        }
    };
}

impl CodecTraits for DeltaCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({})
    }

    fn validate(&self, spec: &ChunkSpec) -> Result<()> {
        if !spec.data_type.is_integer() {
            return Err(ArrayError::validation(format!(
                "delta codec does not support {}",
                spec.data_type
            )));
        }
        Ok(())
    }
}

impl ArrayToArrayCodec for DeltaCodec {
    fn encoded_spec(&self, decoded: &ChunkSpec) -> Result<ChunkSpec> {
        Ok(decoded.clone())
    }

    fn encode_array(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer> {
        dispatch_integer!(chunk.data_type(), delta_encode, chunk)
    }

    fn decode_array(&self, chunk: ArrayBuffer, _decoded: &ChunkSpec) -> Result<ArrayBuffer> {
        dispatch_integer!(chunk.data_type(), delta_decode, chunk)
    }
}

/// Evaluate `$body` with `$T` aliased to the element type of `$data_type`
macro_rules! dispatch_numeric {
    ($data_type:expr, $T:ident => $body:expr) => {
        match $data_type {
            DataType::Int8 => {
                type $T = i8;
                $body
            }
            DataType::Int16 => {
                type $T = i16;
                $body
            }
            DataType::Int32 => {
                type $T = i32;
                $body
            }
            DataType::Int64 => {
                type $T = i64;
                $body
            }
            DataType::UInt8 => {
                type $T = u8;
                $body
            }
            DataType::UInt16 => {
                type $T = u16;
                $body
            }
            DataType::UInt32 => {
                type $T = u32;
                $body
            }
            DataType::UInt64 => {
                type $T = u64;
                $body
            }
            DataType::Float32 => {
                type $T = f32;
                $body
            }
            DataType::Float64 => {
                type $T = f64;
                $body
            }
            DataType::Bool => Err(ArrayError::validation("a numeric data type is required")),
        }
    };
}

/// Parse a data type given as `int32` or as a numpy type string such as `<f8`
fn parse_data_type(name: &str) -> Result<DataType> {
    if let Ok(data_type) = serde_json::from_value::<DataType>(Value::from(name)) {
        return Ok(data_type);
    }
    let data_type = match name.trim_start_matches(|c| matches!(c, '<' | '>' | '|' | '=')) {
        "b1" | "?" => DataType::Bool,
        "i1" => DataType::Int8,
        "i2" => DataType::Int16,
        "i4" => DataType::Int32,
        "i8" => DataType::Int64,
        "u1" => DataType::UInt8,
        "u2" => DataType::UInt16,
        "u4" => DataType::UInt32,
        "u8" => DataType::UInt64,
        "f4" => DataType::Float32,
        "f8" => DataType::Float64,
        _ => {
            return Err(ArrayError::UnsupportedCodec(format!(
                "unknown data type {name:?}"
            )))
        }
    };
    Ok(data_type)
}

fn parse_optional_data_type(name: Option<&str>) -> Result<Option<DataType>> {
    name.map(parse_data_type).transpose()
}

fn require_numeric(codec: &str, data_type: DataType) -> Result<()> {
    if data_type == DataType::Bool {
        return Err(ArrayError::validation(format!(
            "{codec} codec does not support {data_type}"
        )));
    }
    Ok(())
}

/// Convert every element of `chunk` to `to`, with `as` semantics
fn cast_buffer(chunk: &ArrayBuffer, to: DataType) -> Result<ArrayBuffer> {
    if chunk.data_type() == to {
        return Ok(chunk.clone());
    }
    dispatch_numeric!(chunk.data_type(), S => {
        let values: Vec<S> = chunk.to_elements()?;
        dispatch_numeric!(to, D => {
            let out: Vec<D> = values.iter().map(|&v| AsPrimitive::<D>::as_(v)).collect();
            ArrayBuffer::from_elements(chunk.shape().to_vec(), &out)
        })
    })
}

fn to_f64_values(chunk: &ArrayBuffer) -> Result<Vec<f64>> {
    dispatch_numeric!(chunk.data_type(), T => {
        let values: Vec<T> = chunk.to_elements()?;
        Ok(values.into_iter().map(AsPrimitive::<f64>::as_).collect())
    })
}

fn from_f64_values(shape: Vec<u64>, data_type: DataType, values: &[f64]) -> Result<ArrayBuffer> {
    dispatch_numeric!(data_type, T => {
        let out: Vec<T> = values.iter().map(|&v| AsPrimitive::<T>::as_(v)).collect();
        ArrayBuffer::from_elements(shape, &out)
    })
}

/// Apply an element transform to a fill value
fn convert_fill_value(
    fill_value: &FillValue,
    data_type: DataType,
    convert: impl FnOnce(ArrayBuffer) -> Result<ArrayBuffer>,
) -> Result<FillValue> {
    let single = ArrayBuffer::new(data_type, vec![], fill_value.as_ne_bytes().to_vec())?;
    Ok(FillValue::new(convert(single)?.into_bytes()))
}

/// Round half to even, as numpy does
fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FixedScaleOffsetConfiguration {
    #[serde(default)]
    offset: f64,
    #[serde(default = "unit_scale")]
    scale: f64,
    #[serde(default)]
    dtype: Option<String>,
    #[serde(default)]
    astype: Option<String>,
}

fn unit_scale() -> f64 {
    1.0
}

/// The `fixedscaleoffset` codec: stores `round((x - offset) * scale)`,
/// optionally in a narrower type
///
/// Decoding computes `y / scale + offset` and converts back to the array type,
/// so values survive exactly only up to the resolution `1 / scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedScaleOffsetCodec {
    offset: f64,
    scale: f64,
    dtype: Option<DataType>,
    astype: Option<DataType>,
}

impl FixedScaleOffsetCodec {
    pub const NAME: &'static str = "fixedscaleoffset";

    pub fn new(
        offset: f64,
        scale: f64,
        dtype: Option<DataType>,
        astype: Option<DataType>,
    ) -> Result<Self> {
        if !offset.is_finite() || !scale.is_finite() || scale == 0.0 {
            return Err(ArrayError::validation(format!(
                "fixedscaleoffset needs a finite offset and scale, got {offset} and {scale}"
            )));
        }
        Ok(Self {
            offset,
            scale,
            dtype,
            astype,
        })
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: FixedScaleOffsetConfiguration =
            parse_configuration(Self::NAME, configuration)?;
        let codec = Self::new(
            config.offset,
            config.scale,
            parse_optional_data_type(config.dtype.as_deref())?,
            parse_optional_data_type(config.astype.as_deref())?,
        )
        .map_err(|e| ArrayError::UnsupportedCodec(e.to_string()))?;
        Ok(Codec::ArrayToArray(Arc::new(codec)))
    }

    fn encoded_type(&self, decoded: DataType) -> DataType {
        self.astype.unwrap_or(decoded)
    }

    fn transform(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer> {
        let values: Vec<f64> = to_f64_values(&chunk)?
            .into_iter()
            .map(|v| round_half_even((v - self.offset) * self.scale))
            .collect();
        from_f64_values(
            chunk.shape().to_vec(),
            self.encoded_type(chunk.data_type()),
            &values,
        )
    }
}

impl CodecTraits for FixedScaleOffsetCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        let mut configuration = serde_json::json!({ "offset": self.offset, "scale": self.scale });
        if let Some(dtype) = self.dtype {
            configuration["dtype"] = Value::from(dtype.name());
        }
        if let Some(astype) = self.astype {
            configuration["astype"] = Value::from(astype.name());
        }
        configuration
    }

    fn validate(&self, spec: &ChunkSpec) -> Result<()> {
        require_numeric(Self::NAME, spec.data_type)?;
        require_numeric(Self::NAME, self.encoded_type(spec.data_type))?;
        match self.dtype {
            Some(dtype) if dtype != spec.data_type => Err(ArrayError::validation(format!(
                "fixedscaleoffset is configured for {dtype}, the chunk holds {}",
                spec.data_type
            ))),
            _ => Ok(()),
        }
    }
}

impl ArrayToArrayCodec for FixedScaleOffsetCodec {
    fn encoded_spec(&self, decoded: &ChunkSpec) -> Result<ChunkSpec> {
        self.validate(decoded)?;
        Ok(ChunkSpec {
            shape: decoded.shape.clone(),
            data_type: self.encoded_type(decoded.data_type),
            fill_value: convert_fill_value(&decoded.fill_value, decoded.data_type, |fill| {
                self.transform(fill)
            })?,
        })
    }

    fn encode_array(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer> {
        self.transform(chunk)
    }

    fn decode_array(&self, chunk: ArrayBuffer, decoded: &ChunkSpec) -> Result<ArrayBuffer> {
        let values: Vec<f64> = to_f64_values(&chunk)?
            .into_iter()
            .map(|v| v / self.scale + self.offset)
            .collect();
        from_f64_values(chunk.shape().to_vec(), decoded.data_type, &values)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AsTypeConfiguration {
    encode_dtype: String,
    #[serde(default)]
    decode_dtype: Option<String>,
}

/// The `astype` codec: stores elements converted to another numeric type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsTypeCodec {
    encode_dtype: DataType,
    decode_dtype: Option<DataType>,
}

impl AsTypeCodec {
    pub const NAME: &'static str = "astype";

    pub fn new(encode_dtype: DataType, decode_dtype: Option<DataType>) -> Self {
        Self {
            encode_dtype,
            decode_dtype,
        }
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: AsTypeConfiguration = parse_configuration(Self::NAME, configuration)?;
        let codec = Self::new(
            parse_data_type(&config.encode_dtype)?,
            parse_optional_data_type(config.decode_dtype.as_deref())?,
        );
        Ok(Codec::ArrayToArray(Arc::new(codec)))
    }
}

impl CodecTraits for AsTypeCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        let mut configuration = serde_json::json!({ "encode_dtype": self.encode_dtype.name() });
        if let Some(decode) = self.decode_dtype {
            configuration["decode_dtype"] = Value::from(decode.name());
        }
        configuration
    }

    fn validate(&self, spec: &ChunkSpec) -> Result<()> {
        require_numeric(Self::NAME, spec.data_type)?;
        require_numeric(Self::NAME, self.encode_dtype)?;
        match self.decode_dtype {
            Some(decode) if decode != spec.data_type => Err(ArrayError::validation(format!(
                "astype decodes to {decode}, the chunk holds {}",
                spec.data_type
            ))),
            _ => Ok(()),
        }
    }
}

impl ArrayToArrayCodec for AsTypeCodec {
    fn encoded_spec(&self, decoded: &ChunkSpec) -> Result<ChunkSpec> {
        self.validate(decoded)?;
        Ok(ChunkSpec {
            shape: decoded.shape.clone(),
            data_type: self.encode_dtype,
            fill_value: convert_fill_value(&decoded.fill_value, decoded.data_type, |fill| {
                cast_buffer(&fill, self.encode_dtype)
            })?,
        })
    }

    fn encode_array(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer> {
        cast_buffer(&chunk, self.encode_dtype)
    }

    fn decode_array(&self, chunk: ArrayBuffer, decoded: &ChunkSpec) -> Result<ArrayBuffer> {
        cast_buffer(&chunk, decoded.data_type)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShuffleConfiguration {
    #[serde(default = "default_element_size")]
    elementsize: usize,
}

fn default_element_size() -> usize {
    4
}

/// The `shuffle` codec: groups byte `j` of every element together
///
/// Trailing bytes that do not fill a whole element are kept in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShuffleCodec {
    element_size: usize,
}

impl ShuffleCodec {
    pub const NAME: &'static str = "shuffle";

    pub fn new(element_size: usize) -> Self {
        Self { element_size }
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: ShuffleConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self::new(config.elementsize))))
    }

    /// Move byte `j` of element `i` from `from(i, j)` to `to(i, j)`
    fn permute(&self, bytes: &[u8], shuffle: bool) -> Vec<u8> {
        let size = self.element_size;
        if size <= 1 {
            return bytes.to_vec();
        }
        let count = bytes.len() / size;
        let mut out = bytes.to_vec();
        for i in 0..count {
            for j in 0..size {
                let (element_major, byte_major) = (i * size + j, j * count + i);
                if shuffle {
                    out[byte_major] = bytes[element_major];
                } else {
                    out[element_major] = bytes[byte_major];
                }
            }
        }
        out
    }
}

impl CodecTraits for ShuffleCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "elementsize": self.element_size })
    }
}

impl BytesToBytesCodec for ShuffleCodec {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        Ok(self.permute(&bytes, true))
    }

    fn decode_bytes(&self, bytes: Vec<u8>, _options: &CodecOptions) -> Result<Vec<u8>> {
        Ok(self.permute(&bytes, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FillValue;

    fn spec_of(chunk: &ArrayBuffer) -> ChunkSpec {
        ChunkSpec {
            shape: chunk.shape().to_vec(),
            data_type: chunk.data_type(),
            fill_value: FillValue::zero(chunk.data_type()),
        }
    }

    #[test]
    fn test_transpose_2d() {
        let chunk = ArrayBuffer::from_elements(vec![2, 3], &[1u16, 2, 3, 4, 5, 6]).unwrap();
        let codec = TransposeCodec::new(vec![1, 0]).unwrap();
        let encoded = codec.encode_array(chunk.clone()).unwrap();
        assert_eq!(encoded.shape(), &[3, 2]);
        assert_eq!(encoded.to_elements::<u16>().unwrap(), vec![1, 4, 2, 5, 3, 6]);
        assert_eq!(
            codec.encoded_spec(&spec_of(&chunk)).unwrap().shape,
            vec![3, 2]
        );
        let decoded = codec.decode_array(encoded, &spec_of(&chunk)).unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_transpose_3d_round_trip() {
        let values: Vec<i32> = (0..24).collect();
        let chunk = ArrayBuffer::from_elements(vec![2, 3, 4], &values).unwrap();
        let codec = TransposeCodec::new(vec![2, 0, 1]).unwrap();
        let encoded = codec.encode_array(chunk.clone()).unwrap();
        assert_eq!(encoded.shape(), &[4, 2, 3]);
        // element (i, j, k) of the output is (j, k, i) of the input
        let out = encoded.to_ndarray::<i32>().unwrap();
        let inp = chunk.to_ndarray::<i32>().unwrap();
        assert_eq!(out[[3, 1, 2]], inp[[1, 2, 3]]);
        assert_eq!(codec.decode_array(encoded, &spec_of(&chunk)).unwrap(), chunk);
    }

    #[test]
    fn test_transpose_invalid_order() {
        assert!(TransposeCodec::new(vec![0, 0]).is_err());
        assert!(TransposeCodec::new(vec![1, 2]).is_err());
        let codec = TransposeCodec::new(vec![1, 0]).unwrap();
        let chunk = ArrayBuffer::from_elements(vec![3], &[1u8, 2, 3]).unwrap();
        assert!(codec.validate(&spec_of(&chunk)).is_err());
        assert!(TransposeCodec::create(&serde_json::json!({"order": [0, 2]})).is_err());
    }

    #[test]
    fn test_delta_round_trip() {
        let chunk = ArrayBuffer::from_elements(vec![5], &[10u8, 12, 11, 255, 0]).unwrap();
        let encoded = DeltaCodec.encode_array(chunk.clone()).unwrap();
        assert_eq!(encoded.to_elements::<u8>().unwrap(), vec![10, 2, 255, 244, 1]);
        assert_eq!(
            DeltaCodec.decode_array(encoded, &spec_of(&chunk)).unwrap(),
            chunk
        );
    }

    #[test]
    fn test_delta_rejects_floats() {
        let chunk = ArrayBuffer::from_elements(vec![2], &[1.0f32, 2.0]).unwrap();
        assert!(DeltaCodec.validate(&spec_of(&chunk)).is_err());
        assert!(DeltaCodec.encode_array(chunk).is_err());
    }

    #[test]
    fn test_delta_resolves_repeatedly() {
        for _ in 0..3 {
            assert!(DeltaCodec::create(&serde_json::json!({})).is_ok());
        }
    }

    #[test]
    fn test_shuffle_known_bytes() {
        let codec = ShuffleCodec::new(2);
        let encoded = codec.encode_bytes(vec![1, 2, 3, 4, 5, 6, 7]).unwrap();
        assert_eq!(encoded, vec![1, 3, 5, 2, 4, 6, 7]);
        let decoded = codec.decode_bytes(encoded, &CodecOptions::default()).unwrap();
        assert_eq!(decoded, vec![1, 2, 3, 4, 5, 6, 7]);

        match ShuffleCodec::create(&serde_json::json!({})).unwrap() {
            Codec::BytesToBytes(codec) => {
                assert_eq!(codec.configuration(), serde_json::json!({"elementsize": 4}));
            }
            other => panic!("expected a bytes-to-bytes codec, got {other:?}"),
        }
    }

    #[test]
    fn test_fixed_scale_offset_floats() {
        let codec =
            FixedScaleOffsetCodec::new(1000.0, 10.0, None, Some(DataType::Int16)).unwrap();
        let values = [1000.0f64, 1000.25, 999.9, 1001.0];
        let chunk = ArrayBuffer::from_elements(vec![4], &values).unwrap();
        let spec = spec_of(&chunk);
        let encoded_spec = codec.encoded_spec(&spec).unwrap();
        assert_eq!(encoded_spec.data_type, DataType::Int16);
        // fill 0.0 maps to (0 - 1000) * 10
        assert_eq!(encoded_spec.fill_value, FillValue::from_element(-10_000i16));

        let encoded = codec.encode_array(chunk).unwrap();
        // 2.5 rounds to the even neighbour
        assert_eq!(encoded.to_elements::<i16>().unwrap(), vec![0, 2, -1, 10]);
        let decoded = codec.decode_array(encoded, &spec).unwrap();
        let expected = [1000.0, 1000.2, 999.9, 1001.0];
        for (value, expected) in decoded.to_elements::<f64>().unwrap().iter().zip(expected) {
            assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
        }
    }

    #[test]
    fn test_fixed_scale_offset_checks_types() {
        let codec = FixedScaleOffsetCodec::new(0.0, 1.0, Some(DataType::Int32), None).unwrap();
        let chunk = ArrayBuffer::from_elements(vec![1], &[1i64]).unwrap();
        assert!(codec.validate(&spec_of(&chunk)).is_err());
        assert!(FixedScaleOffsetCodec::new(0.0, 0.0, None, None).is_err());
        let config = serde_json::json!({"scale": 2, "dtype": "<i4", "astype": "|u1"});
        assert!(FixedScaleOffsetCodec::create(&config).is_ok());
        assert!(FixedScaleOffsetCodec::create(&serde_json::json!({"dtype": "c16"})).is_err());
    }

    #[test]
    fn test_astype_round_trip() {
        let codec = AsTypeCodec::new(DataType::Float64, Some(DataType::Int32));
        let chunk = ArrayBuffer::from_elements(vec![3], &[-7i32, 0, 123_456]).unwrap();
        let spec = spec_of(&chunk);
        assert_eq!(codec.encoded_spec(&spec).unwrap().data_type, DataType::Float64);
        let encoded = codec.encode_array(chunk.clone()).unwrap();
        assert_eq!(encoded.to_elements::<f64>().unwrap(), vec![-7.0, 0.0, 123_456.0]);
        assert_eq!(codec.decode_array(encoded, &spec).unwrap(), chunk);

        let mismatched = ArrayBuffer::from_elements(vec![1], &[1u8]).unwrap();
        assert!(codec.validate(&spec_of(&mismatched)).is_err());
        let flags = ArrayBuffer::from_elements(vec![1], &[true]).unwrap();
        assert!(AsTypeCodec::new(DataType::Int8, None)
            .validate(&spec_of(&flags))
            .is_err());
    }
}
