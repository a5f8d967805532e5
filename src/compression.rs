//! Bytes-to-bytes codecs: compression and checksums

use crate::codec::{parse_configuration, BytesToBytesCodec, Codec, CodecOptions, CodecTraits};
use crate::error::{ArrayError, Result};
use flate2::read::{GzDecoder, GzEncoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression as FlateCompression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use std::sync::Arc;

/// Deflate compression level (0-9, where 0 is no compression and 9 is maximum)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct CompressionLevel(u32);

impl From<u32> for CompressionLevel {
    fn from(level: u32) -> Self {
        Self::new(level)
    }
}

impl From<CompressionLevel> for u32 {
    fn from(level: CompressionLevel) -> Self {
        level.0
    }
}

impl CompressionLevel {
    pub fn new(level: u32) -> Self {
        Self(level.min(9))
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn fast() -> Self {
        Self(1)
    }

    pub fn best() -> Self {
        Self(9)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(6)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeflateConfiguration {
    #[serde(default)]
    level: CompressionLevel,
}

fn read_all(mut reader: impl Read, capacity: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(capacity);
    reader.read_to_end(&mut out)?;
    Ok(out)
}

/// The `gzip` codec
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipCodec {
    level: CompressionLevel,
}

impl GzipCodec {
    pub const NAME: &'static str = "gzip";

    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: DeflateConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self::new(config.level))))
    }
}

impl CodecTraits for GzipCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "level": self.level.value() })
    }
}

impl BytesToBytesCodec for GzipCodec {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(&bytes[..], FlateCompression::new(self.level.value()));
        read_all(encoder, bytes.len() / 2).map_err(|e| ArrayError::codec(e.to_string()))
    }

    fn decode_bytes(&self, bytes: Vec<u8>, _options: &CodecOptions) -> Result<Vec<u8>> {
        read_all(GzDecoder::new(&bytes[..]), bytes.len() * 2)
            .map_err(|e| ArrayError::codec(format!("gzip: {e}")))
    }
}

/// The `zlib` codec
#[derive(Debug, Clone, Copy, Default)]
pub struct ZlibCodec {
    level: CompressionLevel,
}

impl ZlibCodec {
    pub const NAME: &'static str = "zlib";

    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: DeflateConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self::new(config.level))))
    }
}

impl CodecTraits for ZlibCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "level": self.level.value() })
    }
}

impl BytesToBytesCodec for ZlibCodec {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let encoder = ZlibEncoder::new(&bytes[..], FlateCompression::new(self.level.value()));
        read_all(encoder, bytes.len() / 2).map_err(|e| ArrayError::codec(e.to_string()))
    }

    fn decode_bytes(&self, bytes: Vec<u8>, _options: &CodecOptions) -> Result<Vec<u8>> {
        read_all(ZlibDecoder::new(&bytes[..]), bytes.len() * 2)
            .map_err(|e| ArrayError::codec(format!("zlib: {e}")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ZstdConfiguration {
    #[serde(default = "default_zstd_level")]
    level: i32,
    #[serde(default)]
    checksum: bool,
}

fn default_zstd_level() -> i32 {
    zstd::DEFAULT_COMPRESSION_LEVEL
}

/// The `zstd` codec
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
    checksum: bool,
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL, false)
    }
}

impl ZstdCodec {
    pub const NAME: &'static str = "zstd";

    /// `checksum` embeds a content checksum in each zstd frame
    pub fn new(level: i32, checksum: bool) -> Self {
        Self { level, checksum }
    }

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let config: ZstdConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self::new(
            config.level,
            config.checksum,
        ))))
    }
}

impl CodecTraits for ZstdCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "level": self.level, "checksum": self.checksum })
    }
}

impl BytesToBytesCodec for ZstdCodec {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let compress = || -> std::io::Result<Vec<u8>> {
            let mut encoder = zstd::stream::Encoder::new(Vec::new(), self.level)?;
            encoder.include_checksum(self.checksum)?;
            encoder.write_all(&bytes)?;
            encoder.finish()
        };
        compress().map_err(|e| ArrayError::codec(e.to_string()))
    }

    fn decode_bytes(&self, bytes: Vec<u8>, _options: &CodecOptions) -> Result<Vec<u8>> {
        zstd::decode_all(&bytes[..]).map_err(|e| {
            if self.checksum {
                ArrayError::DataIntegrity(format!("zstd: {e}"))
            } else {
                ArrayError::codec(format!("zstd: {e}"))
            }
        })
    }
}

/// Number of bytes added by each checksum codec
pub const CHECKSUM_SIZE: usize = 4;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Crc32cConfiguration {}

/// The `crc32c` checksum codec
///
/// Appends a little-endian CRC32C of the input on encode; verifies and strips
/// it on decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32cCodec;

impl Crc32cCodec {
    pub const NAME: &'static str = "crc32c";

    pub(crate) fn create(configuration: &Value) -> Result<Codec> {
        let _: Crc32cConfiguration = parse_configuration(Self::NAME, configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self)))
    }
}

impl CodecTraits for Crc32cCodec {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn configuration(&self) -> Value {
        serde_json::json!({})
    }
}

impl BytesToBytesCodec for Crc32cCodec {
    fn encode_bytes(&self, mut bytes: Vec<u8>) -> Result<Vec<u8>> {
        let checksum = crc32c::crc32c(&bytes).to_le_bytes();
        bytes.extend_from_slice(&checksum);
        Ok(bytes)
    }

    fn decode_bytes(&self, mut bytes: Vec<u8>, options: &CodecOptions) -> Result<Vec<u8>> {
        if bytes.len() < CHECKSUM_SIZE {
            return Err(ArrayError::DataIntegrity(format!(
                "crc32c: encoded chunk of {} bytes is shorter than its checksum",
                bytes.len()
            )));
        }
        let data_len = bytes.len() - CHECKSUM_SIZE;
        if options.validate_checksums {
            let mut stored = [0u8; CHECKSUM_SIZE];
            stored.copy_from_slice(&bytes[data_len..]);
            let computed = crc32c::crc32c(&bytes[..data_len]);
            if computed != u32::from_le_bytes(stored) {
                return Err(ArrayError::DataIntegrity(format!(
                    "crc32c mismatch: stored {:#010x}, computed {:#010x}",
                    u32::from_le_bytes(stored),
                    computed
                )));
            }
        }
        bytes.truncate(data_len);
        Ok(bytes)
    }
}

/// Where a numcodecs checksum codec places its checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumLocation {
    #[default]
    Start,
    End,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChecksumConfiguration {
    #[serde(default)]
    location: ChecksumLocation,
}

/// Checksum algorithms of the numcodecs checksum codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Crc32,
    Adler32,
}

impl ChecksumKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumKind::Crc32 => "crc32",
            ChecksumKind::Adler32 => "adler32",
        }
    }

    fn compute(&self, bytes: &[u8]) -> u32 {
        match self {
            ChecksumKind::Crc32 => crc32fast::hash(bytes),
            ChecksumKind::Adler32 => {
                let mut hasher = adler2::Adler32::new();
                hasher.write_slice(bytes);
                hasher.checksum()
            }
        }
    }
}

/// The numcodecs `crc32` and `adler32` codecs
///
/// Stores a little-endian checksum of the input before it (the default) or
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumCodec {
    kind: ChecksumKind,
    location: ChecksumLocation,
}

impl ChecksumCodec {
    pub fn new(kind: ChecksumKind, location: ChecksumLocation) -> Self {
        Self { kind, location }
    }

    pub(crate) fn create_crc32(configuration: &Value) -> Result<Codec> {
        Self::create(ChecksumKind::Crc32, configuration)
    }

    pub(crate) fn create_adler32(configuration: &Value) -> Result<Codec> {
        Self::create(ChecksumKind::Adler32, configuration)
    }

    fn create(kind: ChecksumKind, configuration: &Value) -> Result<Codec> {
        let config: ChecksumConfiguration = parse_configuration(kind.name(), configuration)?;
        Ok(Codec::BytesToBytes(Arc::new(Self::new(kind, config.location))))
    }
}

impl CodecTraits for ChecksumCodec {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn configuration(&self) -> Value {
        serde_json::json!({ "location": self.location })
    }
}

impl BytesToBytesCodec for ChecksumCodec {
    fn encode_bytes(&self, bytes: Vec<u8>) -> Result<Vec<u8>> {
        let checksum = self.kind.compute(&bytes).to_le_bytes();
        let mut out = Vec::with_capacity(bytes.len() + CHECKSUM_SIZE);
        match self.location {
            ChecksumLocation::Start => {
                out.extend_from_slice(&checksum);
                out.extend_from_slice(&bytes);
            }
            ChecksumLocation::End => {
                out.extend_from_slice(&bytes);
                out.extend_from_slice(&checksum);
            }
        }
        Ok(out)
    }

    fn decode_bytes(&self, bytes: Vec<u8>, options: &CodecOptions) -> Result<Vec<u8>> {
        if bytes.len() < CHECKSUM_SIZE {
            return Err(ArrayError::DataIntegrity(format!(
                "{}: encoded chunk of {} bytes is shorter than its checksum",
                self.kind.name(),
                bytes.len()
            )));
        }
        let (stored, data) = match self.location {
            ChecksumLocation::Start => bytes.split_at(CHECKSUM_SIZE),
            ChecksumLocation::End => {
                let (data, stored) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
                (stored, data)
            }
        };
        if options.validate_checksums {
            let mut raw = [0u8; CHECKSUM_SIZE];
            raw.copy_from_slice(stored);
            let stored = u32::from_le_bytes(raw);
            let computed = self.kind.compute(data);
            if computed != stored {
                return Err(ArrayError::DataIntegrity(format!(
                    "{} mismatch: stored {stored:#010x}, computed {computed:#010x}",
                    self.kind.name()
                )));
            }
        }
        Ok(data.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(codec: &dyn BytesToBytesCodec, data: &[u8]) -> Vec<u8> {
        let encoded = codec.encode_bytes(data.to_vec()).unwrap();
        codec
            .decode_bytes(encoded, &CodecOptions::default())
            .unwrap()
    }

    #[test]
    fn test_gzip() {
        let codec = GzipCodec::new(CompressionLevel::default());
        let data = b"Hello, world! ".repeat(100);
        let encoded = codec.encode_bytes(data.clone()).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
        assert_eq!(round_trip(&codec, &data), data);
    }

    #[test]
    fn test_zlib() {
        let codec = ZlibCodec::new(CompressionLevel::best());
        let data = b"Hello, world! ".repeat(100);
        assert_eq!(round_trip(&codec, &data), data);
        assert_eq!(round_trip(&codec, &[]), Vec::<u8>::new());
    }

    #[test]
    fn test_zstd() {
        let codec = ZstdCodec::new(3, true);
        let data = b"Hello, world! ".repeat(100);
        let encoded = codec.encode_bytes(data.clone()).unwrap();
        assert!(encoded.len() < data.len());
        assert_eq!(round_trip(&codec, &data), data);
    }

    #[test]
    fn test_corrupt_gzip_is_codec_error() {
        let err = GzipCodec::default()
            .decode_bytes(vec![1, 2, 3, 4], &CodecOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArrayError::Codec(_)));
    }

    #[test]
    fn test_crc32c_appends_checksum() {
        let codec = Crc32cCodec;
        let encoded = codec.encode_bytes(b"123456789".to_vec()).unwrap();
        assert_eq!(encoded.len(), 9 + CHECKSUM_SIZE);
        // standard CRC32C check value
        assert_eq!(&encoded[9..], &0xe306_9283u32.to_le_bytes());
        assert_eq!(round_trip(&codec, b"123456789"), b"123456789");
    }

    #[test]
    fn test_crc32c_detects_corruption() {
        let codec = Crc32cCodec;
        let mut encoded = codec.encode_bytes(vec![1, 2, 3, 4, 5]).unwrap();
        encoded[2] ^= 0xff;
        let err = codec
            .decode_bytes(encoded.clone(), &CodecOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArrayError::DataIntegrity(_)));

        // verification can be switched off, the checksum is still stripped
        let options = CodecOptions {
            validate_checksums: false,
        };
        assert_eq!(codec.decode_bytes(encoded, &options).unwrap().len(), 5);

        let err = codec
            .decode_bytes(vec![1, 2], &CodecOptions::default())
            .unwrap_err();
        assert!(matches!(err, ArrayError::DataIntegrity(_)));
    }

    #[test]
    fn test_configuration_round_trip() {
        let codec = GzipCodec::create(&serde_json::json!({"level": 3})).unwrap();
        assert_eq!(codec.descriptor().configuration, serde_json::json!({"level": 3}));
        assert!(ZstdCodec::create(&serde_json::json!({"lvl": 3})).is_err());
    }

    #[test]
    fn test_numcodecs_checksums() {
        let data = b"Wikipedia";
        let crc = ChecksumCodec::new(ChecksumKind::Crc32, ChecksumLocation::Start);
        let encoded = crc.encode_bytes(data.to_vec()).unwrap();
        assert_eq!(&encoded[..CHECKSUM_SIZE], &crc32fast::hash(data).to_le_bytes());
        assert_eq!(&encoded[CHECKSUM_SIZE..], data);
        assert_eq!(round_trip(&crc, data), data);

        let adler = ChecksumCodec::new(ChecksumKind::Adler32, ChecksumLocation::End);
        let encoded = adler.encode_bytes(data.to_vec()).unwrap();
        // the adler-32 of "Wikipedia"
        assert_eq!(&encoded[data.len()..], &0x11e6_0398u32.to_le_bytes());
        assert_eq!(round_trip(&adler, data), data);
        assert_eq!(round_trip(&adler, b""), b"");
    }

    #[test]
    fn test_numcodecs_checksum_corruption() {
        for kind in [ChecksumKind::Crc32, ChecksumKind::Adler32] {
            for location in [ChecksumLocation::Start, ChecksumLocation::End] {
                let codec = ChecksumCodec::new(kind, location);
                let mut encoded = codec.encode_bytes(b"hello world".to_vec()).unwrap();
                encoded[6] ^= 0x10;
                let err = codec
                    .decode_bytes(encoded.clone(), &CodecOptions::default())
                    .unwrap_err();
                assert!(matches!(err, ArrayError::DataIntegrity(_)), "{kind:?} {location:?}");
                let relaxed = CodecOptions {
                    validate_checksums: false,
                };
                assert!(codec.decode_bytes(encoded, &relaxed).is_ok());
            }
            let codec = ChecksumCodec::new(kind, ChecksumLocation::Start);
            assert!(matches!(
                codec.decode_bytes(vec![1, 2], &CodecOptions::default()),
                Err(ArrayError::DataIntegrity(_))
            ));
        }
        assert!(ChecksumCodec::create_crc32(&serde_json::json!({"location": "middle"})).is_err());
    }
}
