//! Core data types: element types, byte order and fill values

use crate::error::{ArrayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Element data types supported by arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    /// Boolean, stored as one byte
    Bool = 0,
    /// Signed 8-bit integer
    Int8 = 1,
    /// Signed 16-bit integer
    Int16 = 2,
    /// Signed 32-bit integer
    Int32 = 3,
    /// Signed 64-bit integer
    Int64 = 4,
    /// Unsigned 8-bit integer
    UInt8 = 5,
    /// Unsigned 16-bit integer
    UInt16 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Unsigned 64-bit integer
    UInt64 = 8,
    /// 32-bit floating point
    Float32 = 9,
    /// 64-bit floating point
    Float64 = 10,
}

impl DataType {
    /// Size in bytes of this data type
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::Bool | DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
        }
    }

    /// Check if this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Check if this is an integer type
    pub fn is_integer(&self) -> bool {
        !self.is_float() && *self != DataType::Bool
    }

    /// The name used in metadata documents
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Byte order of serialised elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// The byte order of the running platform
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }

    pub fn is_native(&self) -> bool {
        *self == Self::native()
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Endianness::Little
    }
}

/// A Rust type that can be stored as an array element.
pub trait Element: Copy + Send + Sync + 'static {
    /// The array data type of this element.
    const DATA_TYPE: DataType;

    /// Native-endian bytes of a slice of elements.
    fn to_ne_bytes_vec(elements: &[Self]) -> Vec<u8>;

    /// Elements from native-endian bytes.
    fn from_ne_bytes_vec(bytes: &[u8]) -> Result<Vec<Self>>;
}

macro_rules! impl_pod_element {
    ($($t:ty => $dt:ident),* $(,)?) => {
        $(
            impl Element for $t {
                const DATA_TYPE: DataType = DataType::$dt;

                fn to_ne_bytes_vec(elements: &[Self]) -> Vec<u8> {
                    bytemuck::cast_slice(elements).to_vec()
                }

                fn from_ne_bytes_vec(bytes: &[u8]) -> Result<Vec<Self>> {
                    if bytes.len() % std::mem::size_of::<$t>() != 0 {
                        return Err(ArrayError::validation(
                            "Byte length not aligned with data type size",
                        ));
                    }
                    Ok(bytemuck::pod_collect_to_vec(bytes))
                }
            }
        )*
    };
}

impl_pod_element!(
    i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64,
    u8 => UInt8, u16 => UInt16, u32 => UInt32, u64 => UInt64,
    f32 => Float32, f64 => Float64,
);

impl Element for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn to_ne_bytes_vec(elements: &[Self]) -> Vec<u8> {
        elements.iter().map(|&b| u8::from(b)).collect()
    }

    fn from_ne_bytes_vec(bytes: &[u8]) -> Result<Vec<Self>> {
        bytes
            .iter()
            .map(|&b| match b {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(ArrayError::validation(format!(
                    "invalid boolean byte {other}"
                ))),
            })
            .collect()
    }
}

/// The logical value of array positions not backed by a stored chunk.
///
/// Held as the native-endian bytes of one element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FillValue(Vec<u8>);

impl FillValue {
    /// Create a fill value from native-endian element bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create a fill value from an element.
    pub fn from_element<T: Element>(value: T) -> Self {
        Self(T::to_ne_bytes_vec(&[value]))
    }

    /// The all-zero fill value for a data type.
    pub fn zero(data_type: DataType) -> Self {
        Self(vec![0; data_type.size_in_bytes()])
    }

    pub fn as_ne_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Check that this fill value is an element of `data_type`.
    pub fn validate(&self, data_type: DataType) -> Result<()> {
        if self.0.len() != data_type.size_in_bytes() {
            return Err(ArrayError::validation(format!(
                "fill value has {} bytes, data type {} needs {}",
                self.0.len(),
                data_type,
                data_type.size_in_bytes()
            )));
        }
        if data_type == DataType::Bool && self.0[0] > 1 {
            return Err(ArrayError::validation("boolean fill value must be 0 or 1"));
        }
        Ok(())
    }

    /// Parse a fill value from its metadata representation.
    pub fn from_json(value: &Value, data_type: DataType) -> Result<Self> {
        let invalid = || {
            ArrayError::validation(format!(
                "fill value {value} cannot be represented as {data_type}"
            ))
        };

        macro_rules! int {
            ($t:ty) => {{
                let parsed: Option<$t> = if let Some(v) = value.as_i64() {
                    num_traits::cast(v)
                } else if let Some(v) = value.as_u64() {
                    num_traits::cast(v)
                } else {
                    None
                };
                Self::from_element(parsed.ok_or_else(invalid)?)
            }};
        }

        macro_rules! float {
            ($t:ty) => {{
                let parsed: f64 = match value {
                    Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
                    Value::String(s) => match s.as_str() {
                        "NaN" => f64::NAN,
                        "Infinity" => f64::INFINITY,
                        "-Infinity" => f64::NEG_INFINITY,
                        _ => return Err(invalid()),
                    },
                    _ => return Err(invalid()),
                };
                let narrowed = parsed as $t;
                if parsed.is_finite() && !narrowed.is_finite() {
                    return Err(invalid());
                }
                Self::from_element(narrowed)
            }};
        }

        let fill_value = match data_type {
            DataType::Bool => Self::from_element(value.as_bool().ok_or_else(invalid)?),
            DataType::Int8 => int!(i8),
            DataType::Int16 => int!(i16),
            DataType::Int32 => int!(i32),
            DataType::Int64 => int!(i64),
            DataType::UInt8 => int!(u8),
            DataType::UInt16 => int!(u16),
            DataType::UInt32 => int!(u32),
            DataType::UInt64 => int!(u64),
            DataType::Float32 => float!(f32),
            DataType::Float64 => float!(f64),
        };
        Ok(fill_value)
    }

    /// The metadata representation of this fill value.
    pub fn to_json(&self, data_type: DataType) -> Result<Value> {
        self.validate(data_type)?;
        let b = self.as_ne_bytes();

        fn float_json(v: f64) -> Value {
            if v.is_nan() {
                Value::from("NaN")
            } else if v == f64::INFINITY {
                Value::from("Infinity")
            } else if v == f64::NEG_INFINITY {
                Value::from("-Infinity")
            } else {
                Value::from(v)
            }
        }

        macro_rules! decode {
            ($t:ty) => {
                <$t>::from_ne_bytes(
                    b.try_into()
                        .map_err(|_| ArrayError::validation("fill value width mismatch"))?,
                )
            };
        }

        Ok(match data_type {
            DataType::Bool => Value::from(b[0] != 0),
            DataType::Int8 => Value::from(b[0] as i8),
            DataType::Int16 => Value::from(decode!(i16)),
            DataType::Int32 => Value::from(decode!(i32)),
            DataType::Int64 => Value::from(decode!(i64)),
            DataType::UInt8 => Value::from(b[0]),
            DataType::UInt16 => Value::from(decode!(u16)),
            DataType::UInt32 => Value::from(decode!(u32)),
            DataType::UInt64 => Value::from(decode!(u64)),
            DataType::Float32 => float_json(f64::from(decode!(f32))),
            DataType::Float64 => float_json(decode!(f64)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::UInt8.size_in_bytes(), 1);
        assert_eq!(DataType::Int16.size_in_bytes(), 2);
        assert_eq!(DataType::Float32.size_in_bytes(), 4);
        assert_eq!(DataType::Float64.size_in_bytes(), 8);
        assert_eq!(DataType::Bool.size_in_bytes(), 1);
    }

    #[test]
    fn test_data_type_names() {
        assert_eq!(
            serde_json::to_value(DataType::UInt16).unwrap(),
            json!("uint16")
        );
        let dt: DataType = serde_json::from_value(json!("float64")).unwrap();
        assert_eq!(dt, DataType::Float64);
        assert_eq!(DataType::Int32.to_string(), "int32");
    }

    #[test]
    fn test_fill_value_integers() {
        let fv = FillValue::from_json(&json!(-3), DataType::Int16).unwrap();
        assert_eq!(fv, FillValue::from_element(-3i16));
        assert_eq!(fv.to_json(DataType::Int16).unwrap(), json!(-3));

        assert!(FillValue::from_json(&json!(300), DataType::UInt8).is_err());
        assert!(FillValue::from_json(&json!(-1), DataType::UInt32).is_err());
        assert!(FillValue::from_json(&json!(1.5), DataType::Int32).is_err());
        assert!(FillValue::from_json(&json!(u64::MAX), DataType::UInt64).is_ok());
    }

    #[test]
    fn test_fill_value_floats() {
        let fv = FillValue::from_json(&json!("NaN"), DataType::Float32).unwrap();
        let v = f32::from_ne_bytes(fv.as_ne_bytes().try_into().unwrap());
        assert!(v.is_nan());
        assert_eq!(fv.to_json(DataType::Float32).unwrap(), json!("NaN"));

        let fv = FillValue::from_json(&json!(0), DataType::Float64).unwrap();
        assert_eq!(fv, FillValue::from_element(0.0f64));

        assert!(FillValue::from_json(&json!("nope"), DataType::Float64).is_err());
    }

    #[test]
    fn test_fill_value_float_overflow() {
        let err = FillValue::from_json(&json!(1e300), DataType::Float32).unwrap_err();
        assert!(matches!(err, ArrayError::Validation(_)));
        assert!(FillValue::from_json(&json!(-1e39), DataType::Float32).is_err());
        assert!(FillValue::from_json(&json!(1e300), DataType::Float64).is_ok());

        let fv = FillValue::from_json(&json!("-Infinity"), DataType::Float32).unwrap();
        assert_eq!(fv, FillValue::from_element(f32::NEG_INFINITY));
    }

    #[test]
    fn test_fill_value_bool() {
        let fv = FillValue::from_json(&json!(true), DataType::Bool).unwrap();
        assert_eq!(fv.as_ne_bytes(), &[1]);
        assert!(FillValue::from_json(&json!(1), DataType::Bool).is_err());
        assert!(FillValue::new(vec![2]).validate(DataType::Bool).is_err());
    }

    #[test]
    fn test_element_bytes() {
        let data: Vec<f32> = vec![1.0, 2.0, 3.0, 4.0];
        let bytes = f32::to_ne_bytes_vec(&data);
        assert_eq!(bytes.len(), data.len() * 4);
        let recovered = f32::from_ne_bytes_vec(&bytes).unwrap();
        assert_eq!(data, recovered);
        assert!(u32::from_ne_bytes_vec(&[0, 1, 2]).is_err());
    }
}
