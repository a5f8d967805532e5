//! Codec capability traits and the codec registry
//!
//! A codec is one reversible stage of the chunk encoding chain. Depending on
//! where it sits in the chain it implements one of three capability traits:
//!
//! - [`ArrayToArrayCodec`]: array in, array out (e.g. `transpose`)
//! - [`ArrayToBytesCodec`]: the single array/bytes boundary (`bytes`)
//! - [`BytesToBytesCodec`]: bytes in, bytes out (compression, checksums)
//!
//! Codecs are resolved by name through a [`CodecRegistry`]. The registry is an
//! ordinary value handed to metadata validation and array handles; unknown
//! names fail closed with [`ArrayError::UnsupportedCodec`].

use crate::buffer::ArrayBuffer;
use crate::compression::{ChecksumCodec, Crc32cCodec, GzipCodec, ZlibCodec, ZstdCodec};
use crate::error::{ArrayError, Result};
use crate::filters::{
    AsTypeCodec, DeltaCodec, FixedScaleOffsetCodec, ShuffleCodec, TransposeCodec,
    NUMCODECS_PREFIX,
};
use crate::types::{DataType, Endianness, FillValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A codec entry in array metadata: a name plus its configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecDescriptor {
    pub name: String,
    #[serde(default = "empty_configuration", skip_serializing_if = "is_empty_configuration")]
    pub configuration: Value,
}

fn empty_configuration() -> Value {
    Value::Object(Map::new())
}

fn is_empty_configuration(value: &Value) -> bool {
    matches!(value, Value::Object(m) if m.is_empty()) || value.is_null()
}

impl CodecDescriptor {
    pub fn new(name: impl Into<String>, configuration: Value) -> Self {
        Self {
            name: name.into(),
            configuration,
        }
    }

    /// A descriptor without configuration
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, empty_configuration())
    }
}

/// Shape, type and fill value of a chunk as seen by one codec stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub shape: Vec<u64>,
    pub data_type: DataType,
    pub fill_value: FillValue,
}

/// Options applied while decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    pub validate_checksums: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            validate_checksums: true,
        }
    }
}

/// Behaviour shared by all codecs
pub trait CodecTraits: Send + Sync + fmt::Debug {
    /// Registered name of the codec
    fn name(&self) -> &str;

    /// Configuration written back to metadata
    fn configuration(&self) -> Value;

    /// Check the codec against the chunk it will receive
    fn validate(&self, _spec: &ChunkSpec) -> Result<()> {
        Ok(())
    }

    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor::new(self.name(), self.configuration())
    }
}

/// Array-to-array stage
pub trait ArrayToArrayCodec: CodecTraits {
    /// Spec of the array this stage produces from `decoded`
    fn encoded_spec(&self, decoded: &ChunkSpec) -> Result<ChunkSpec>;

    fn encode_array(&self, chunk: ArrayBuffer) -> Result<ArrayBuffer>;

    /// Inverse of [`Self::encode_array`]; `decoded` describes the chunk to restore
    fn decode_array(&self, chunk: ArrayBuffer, decoded: &ChunkSpec) -> Result<ArrayBuffer>;
}

/// Array-to-bytes stage
pub trait ArrayToBytesCodec: CodecTraits {
    fn encode_to_bytes(&self, chunk: ArrayBuffer) -> Result<Vec<u8>>;

    fn decode_from_bytes(&self, bytes: &[u8], decoded: &ChunkSpec) -> Result<ArrayBuffer>;
}

/// Bytes-to-bytes stage
pub trait BytesToBytesCodec: CodecTraits {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>>;

    fn decode_bytes(&self, bytes: Vec<u8>, options: &CodecOptions) -> Result<Vec<u8>>;
}

/// A resolved codec, tagged with its stage
#[derive(Debug, Clone)]
pub enum Codec {
    ArrayToArray(Arc<dyn ArrayToArrayCodec>),
    ArrayToBytes(Arc<dyn ArrayToBytesCodec>),
    BytesToBytes(Arc<dyn BytesToBytesCodec>),
}

impl Codec {
    pub fn name(&self) -> &str {
        match self {
            Codec::ArrayToArray(c) => c.name(),
            Codec::ArrayToBytes(c) => c.name(),
            Codec::BytesToBytes(c) => c.name(),
        }
    }

    pub fn descriptor(&self) -> CodecDescriptor {
        match self {
            Codec::ArrayToArray(c) => c.descriptor(),
            Codec::ArrayToBytes(c) => c.descriptor(),
            Codec::BytesToBytes(c) => c.descriptor(),
        }
    }
}

/// Parse a codec configuration, failing closed on unknown fields
pub fn parse_configuration<T: DeserializeOwned>(name: &str, configuration: &Value) -> Result<T> {
    let configuration = if configuration.is_null() {
        empty_configuration()
    } else {
        configuration.clone()
    };
    serde_json::from_value(configuration).map_err(|e| {
        ArrayError::UnsupportedCodec(format!("invalid configuration for codec {name}: {e}"))
    })
}

/// The `bytes` codec: elements serialised in a fixed byte order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BytesCodec {
    endian: Option<Endianness>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BytesCodecConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    endian: Option<Endianness>,
}

impl BytesCodec {
    pub const NAME: &'static str = "bytes";

    pub fn new(endian: Option<Endianness>) -> Self {
        Self { endian }
    }

    pub fn little() -> Self {
        Self::new(Some(Endianness::Little))
    }

    pub fn big() -> Self {
        Self::new(Some(Endianness::Big))
    }

    fn create(configuration: &Value) -> Result<Codec> {
        let config: BytesCodecConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::ArrayToBytes(Arc::new(Self::new(config.endian))))
    }

    fn needs_swap(&self, data_type: DataType) -> bool {
        data_type.size_in_bytes() > 1 && self.endian.is_some_and(|e| !e.is_native())
    }
}

fn swap_elements(bytes: &mut [u8], size: usize) {
    for element in bytes.chunks_exact_mut(size) {
        element.reverse();
    }
}

impl CodecTraits for BytesCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::to_value(BytesCodecConfiguration {
            endian: self.endian,
        })
        .unwrap_or_else(|_| empty_configuration())
    }

    fn validate(&self, spec: &ChunkSpec) -> Result<()> {
        if self.endian.is_none() && spec.data_type.size_in_bytes() > 1 {
            return Err(ArrayError::validation(format!(
                "bytes codec requires an endian for {}",
                spec.data_type
            )));
        }
        Ok(())
    }
}

impl ArrayToBytesCodec for BytesCodec {
    fn encode_to_bytes(&self, chunk: ArrayBuffer) -> Result<Vec<u8>> {
        let data_type = chunk.data_type();
        let mut bytes = chunk.into_bytes();
        if self.needs_swap(data_type) {
            swap_elements(&mut bytes, data_type.size_in_bytes());
        }
        Ok(bytes)
    }

    fn decode_from_bytes(&self, bytes: &[u8], decoded: &ChunkSpec) -> Result<ArrayBuffer> {
        let mut bytes = bytes.to_vec();
        if self.needs_swap(decoded.data_type) {
            swap_elements(&mut bytes, decoded.data_type.size_in_bytes());
        }
        ArrayBuffer::new(decoded.data_type, decoded.shape.clone(), bytes)
            .map_err(|e| ArrayError::codec(format!("bytes codec: {e}")))
    }
}

/// Constructor of a codec from its configuration
pub type CodecFactory = fn(&Value) -> Result<Codec>;

/// Codec constructors by name
#[derive(Clone)]
pub struct CodecRegistry {
    factories: HashMap<String, CodecFactory>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("CodecRegistry").field("codecs", &names).finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(BytesCodec::NAME, BytesCodec::create);
        registry.register(TransposeCodec::NAME, TransposeCodec::create);
        registry.register(Crc32cCodec::NAME, Crc32cCodec::create);

        let numcodecs: [(&str, CodecFactory); 9] = [
            (DeltaCodec::NAME, DeltaCodec::create),
            (ShuffleCodec::NAME, ShuffleCodec::create),
            (FixedScaleOffsetCodec::NAME, FixedScaleOffsetCodec::create),
            (AsTypeCodec::NAME, AsTypeCodec::create),
            ("crc32", ChecksumCodec::create_crc32),
            ("adler32", ChecksumCodec::create_adler32),
            (GzipCodec::NAME, GzipCodec::create),
            (ZlibCodec::NAME, ZlibCodec::create),
            (ZstdCodec::NAME, ZstdCodec::create),
        ];
        for (name, factory) in numcodecs {
            registry.register(name, factory);
            registry.register(format!("{NUMCODECS_PREFIX}{name}"), factory);
        }
        registry
    }
}

impl CodecRegistry {
    /// A registry with no codecs
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a codec constructor, replacing any previous one of that name
    pub fn register(&mut self, name: impl Into<String>, factory: CodecFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Construct the codec a descriptor names
    pub fn resolve(&self, descriptor: &CodecDescriptor) -> Result<Codec> {
        let factory = self
            .factories
            .get(&descriptor.name)
            .ok_or_else(|| ArrayError::UnsupportedCodec(descriptor.name.clone()))?;
        factory(&descriptor.configuration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(shape: Vec<u64>, data_type: DataType) -> ChunkSpec {
        ChunkSpec {
            shape,
            data_type,
            fill_value: FillValue::zero(data_type),
        }
    }

    #[test]
    fn test_bytes_codec_endianness() {
        let chunk = ArrayBuffer::from_elements(vec![2], &[0x0102u16, 0x0304]).unwrap();

        let big = BytesCodec::big().encode_to_bytes(chunk.clone()).unwrap();
        assert_eq!(big, vec![0x01, 0x02, 0x03, 0x04]);
        let little = BytesCodec::little().encode_to_bytes(chunk.clone()).unwrap();
        assert_eq!(little, vec![0x02, 0x01, 0x04, 0x03]);

        let decoded = BytesCodec::big()
            .decode_from_bytes(&big, &spec(vec![2], DataType::UInt16))
            .unwrap();
        assert_eq!(decoded, chunk);
    }

    #[test]
    fn test_bytes_codec_requires_endian() {
        let codec = BytesCodec::new(None);
        assert!(codec.validate(&spec(vec![2], DataType::UInt8)).is_ok());
        assert!(codec.validate(&spec(vec![2], DataType::Int32)).is_err());
    }

    #[test]
    fn test_bytes_codec_wrong_length() {
        let err = BytesCodec::little()
            .decode_from_bytes(&[0, 1, 2], &spec(vec![2], DataType::UInt16))
            .unwrap_err();
        assert!(matches!(err, ArrayError::Codec(_)));
    }

    #[test]
    fn test_registry_resolves_builtins() {
        let registry = CodecRegistry::default();
        for name in ["bytes", "transpose", "delta", "gzip", "zlib", "zstd", "crc32c"] {
            assert!(registry.contains(name), "{name} not registered");
        }
        let codec = registry
            .resolve(&CodecDescriptor::new("bytes", json!({"endian": "big"})))
            .unwrap();
        assert!(matches!(codec, Codec::ArrayToBytes(_)));
        assert_eq!(codec.descriptor().configuration, json!({"endian": "big"}));
    }

    #[test]
    fn test_registry_resolves_numcodecs() {
        let registry = CodecRegistry::default();
        for name in ["shuffle", "crc32", "adler32", "fixedscaleoffset", "astype", "delta"] {
            assert!(registry.contains(name), "{name} not registered");
            let prefixed = format!("numcodecs.{name}");
            assert!(registry.contains(&prefixed), "{prefixed} not registered");
        }
        let codec = registry
            .resolve(&CodecDescriptor::new(
                "numcodecs.astype",
                json!({"encode_dtype": "<f8", "decode_dtype": "int32"}),
            ))
            .unwrap();
        assert!(matches!(codec, Codec::ArrayToArray(_)));
        let codec = registry
            .resolve(&CodecDescriptor::new("adler32", json!({"location": "end"})))
            .unwrap();
        assert!(matches!(codec, Codec::BytesToBytes(_)));
    }

    #[test]
    fn test_registry_fails_closed() {
        let registry = CodecRegistry::default();
        let err = registry
            .resolve(&CodecDescriptor::named("blosc"))
            .unwrap_err();
        assert!(matches!(err, ArrayError::UnsupportedCodec(_)));

        let err = registry
            .resolve(&CodecDescriptor::new("bytes", json!({"endian": "little", "extra": 1})))
            .unwrap_err();
        assert!(matches!(err, ArrayError::UnsupportedCodec(_)));
    }

    #[test]
    fn test_descriptor_serde() {
        let d: CodecDescriptor = serde_json::from_value(json!({"name": "crc32c"})).unwrap();
        assert_eq!(d, CodecDescriptor::named("crc32c"));
        assert_eq!(serde_json::to_value(&d).unwrap(), json!({"name": "crc32c"}));
    }
}
