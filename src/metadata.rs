//! Array and group metadata
//!
//! Metadata is persisted as a JSON document named [`METADATA_KEY`] under each
//! node path. Array metadata is validated against a [`CodecRegistry`] when it
//! is built and when it is loaded, and is immutable afterwards: resizing or
//! changing the codec chain yields a new value.

use crate::chunk_grid::ChunkGrid;
use crate::chunk_key::ChunkKeyEncoding;
use crate::codec::{BytesCodec, ChunkSpec, Codec, CodecDescriptor, CodecRegistry, CodecTraits};
use crate::config::ArrayConfig;
use crate::error::{ArrayError, Result};
use crate::pipeline::CodecPipeline;
use crate::types::{DataType, Endianness, FillValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the metadata document of a node
pub const METADATA_KEY: &str = "zarr.json";

/// Storage format version
pub const ZARR_FORMAT: u8 = 3;

const REGULAR_GRID: &str = "regular";

/// Metadata of an array node
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayMetadata {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    data_type: DataType,
    fill_value: FillValue,
    codecs: Vec<CodecDescriptor>,
    chunk_key_encoding: ChunkKeyEncoding,
    attributes: Map<String, Value>,
    dimension_names: Option<Vec<Option<String>>>,
}

/// Builder for [`ArrayMetadata`]
#[derive(Debug, Clone)]
pub struct ArrayMetadataBuilder {
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    data_type: DataType,
    fill_value: Option<FillValue>,
    codecs: Vec<CodecDescriptor>,
    chunk_key_encoding: ChunkKeyEncoding,
    attributes: Map<String, Value>,
    dimension_names: Option<Vec<Option<String>>>,
}

impl ArrayMetadataBuilder {
    pub fn fill_value(mut self, fill_value: FillValue) -> Self {
        self.fill_value = Some(fill_value);
        self
    }

    pub fn codecs(mut self, codecs: Vec<CodecDescriptor>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn chunk_key_encoding(mut self, encoding: ChunkKeyEncoding) -> Self {
        self.chunk_key_encoding = encoding;
        self
    }

    pub fn attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn dimension_names(mut self, names: Vec<Option<String>>) -> Self {
        self.dimension_names = Some(names);
        self
    }

    /// Validate against the built-in codecs
    pub fn build(self) -> Result<ArrayMetadata> {
        self.build_with(&CodecRegistry::default(), &ArrayConfig::default())
    }

    /// Validate against `registry`
    ///
    /// A chain without an array-to-bytes codec gets a `bytes` codec in
    /// `config.default_endian`, placed before any bytes-to-bytes codec.
    pub fn build_with(
        self,
        registry: &CodecRegistry,
        config: &ArrayConfig,
    ) -> Result<ArrayMetadata> {
        let codecs = with_default_bytes_codec(self.codecs, registry, config.default_endian)?;
        let metadata = ArrayMetadata {
            fill_value: self
                .fill_value
                .unwrap_or_else(|| FillValue::zero(self.data_type)),
            shape: self.shape,
            chunk_shape: self.chunk_shape,
            data_type: self.data_type,
            codecs,
            chunk_key_encoding: self.chunk_key_encoding,
            attributes: self.attributes,
            dimension_names: self.dimension_names,
        };
        metadata.validate(registry)?;
        Ok(metadata)
    }
}

fn with_default_bytes_codec(
    mut codecs: Vec<CodecDescriptor>,
    registry: &CodecRegistry,
    endian: Endianness,
) -> Result<Vec<CodecDescriptor>> {
    let resolved = codecs
        .iter()
        .map(|d| registry.resolve(d))
        .collect::<Result<Vec<_>>>()?;
    if resolved.iter().any(|c| matches!(c, Codec::ArrayToBytes(_))) {
        return Ok(codecs);
    }
    let position = resolved
        .iter()
        .position(|c| matches!(c, Codec::BytesToBytes(_)))
        .unwrap_or(resolved.len());
    codecs.insert(position, BytesCodec::new(Some(endian)).descriptor());
    Ok(codecs)
}

impl ArrayMetadata {
    /// Start building metadata for an array of `shape` split into `chunk_shape` chunks
    pub fn builder(
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        data_type: DataType,
    ) -> ArrayMetadataBuilder {
        ArrayMetadataBuilder {
            shape,
            chunk_shape,
            data_type,
            fill_value: None,
            codecs: Vec::new(),
            chunk_key_encoding: ChunkKeyEncoding::default(),
            attributes: Map::new(),
            dimension_names: None,
        }
    }

    /// Create validated metadata using the built-in codecs
    pub fn new(
        shape: Vec<u64>,
        chunk_shape: Vec<u64>,
        data_type: DataType,
        fill_value: FillValue,
        codecs: Vec<CodecDescriptor>,
        chunk_key_encoding: ChunkKeyEncoding,
    ) -> Result<Self> {
        Self::builder(shape, chunk_shape, data_type)
            .fill_value(fill_value)
            .codecs(codecs)
            .chunk_key_encoding(chunk_key_encoding)
            .build()
    }

    fn validate(&self, registry: &CodecRegistry) -> Result<()> {
        if self.shape.len() != self.chunk_shape.len() {
            return Err(ArrayError::validation(format!(
                "array rank {} does not match chunk rank {}",
                self.shape.len(),
                self.chunk_shape.len()
            )));
        }
        if self.chunk_shape.contains(&0) {
            return Err(ArrayError::validation(format!(
                "chunk shape {:?} has a zero dimension",
                self.chunk_shape
            )));
        }
        if let Some(names) = &self.dimension_names {
            if names.len() != self.shape.len() {
                return Err(ArrayError::validation(format!(
                    "{} dimension names for an array of rank {}",
                    names.len(),
                    self.shape.len()
                )));
            }
        }
        self.fill_value.validate(self.data_type)?;
        self.codec_pipeline(registry).map(|_| ())
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn fill_value(&self) -> &FillValue {
        &self.fill_value
    }

    pub fn codecs(&self) -> &[CodecDescriptor] {
        &self.codecs
    }

    pub fn chunk_key_encoding(&self) -> &ChunkKeyEncoding {
        &self.chunk_key_encoding
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn dimension_names(&self) -> Option<&[Option<String>]> {
        self.dimension_names.as_deref()
    }

    /// The regular chunk grid of this array
    pub fn chunk_grid(&self) -> ChunkGrid {
        ChunkGrid::new_unchecked(self.shape.clone(), self.chunk_shape.clone())
    }

    /// Spec of a full chunk as seen by the first codec
    pub fn chunk_spec(&self) -> ChunkSpec {
        ChunkSpec {
            shape: self.chunk_shape.clone(),
            data_type: self.data_type,
            fill_value: self.fill_value.clone(),
        }
    }

    /// Resolve the codec chain into a pipeline
    pub fn codec_pipeline(&self, registry: &CodecRegistry) -> Result<CodecPipeline> {
        let codecs = self
            .codecs
            .iter()
            .map(|d| registry.resolve(d))
            .collect::<Result<Vec<_>>>()?;
        CodecPipeline::new(codecs, self.chunk_spec())
    }

    /// A copy with a new shape; existing chunks are left untouched
    pub fn with_shape(&self, shape: Vec<u64>) -> Result<Self> {
        if shape.len() != self.shape.len() {
            return Err(ArrayError::validation(format!(
                "cannot change rank from {} to {}",
                self.shape.len(),
                shape.len()
            )));
        }
        Ok(Self {
            shape,
            ..self.clone()
        })
    }

    /// A copy with a new codec chain, validated against `registry`
    pub fn with_codecs(
        &self,
        codecs: Vec<CodecDescriptor>,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let metadata = Self {
            codecs,
            ..self.clone()
        };
        metadata.validate(registry)?;
        Ok(metadata)
    }

    /// A copy with new user attributes
    pub fn with_attributes(&self, attributes: Map<String, Value>) -> Self {
        Self {
            attributes,
            ..self.clone()
        }
    }

    /// Serialize to the JSON metadata document
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let document = ArrayDocument {
            zarr_format: ZARR_FORMAT,
            node_type: NodeType::Array,
            shape: self.shape.clone(),
            data_type: self.data_type,
            chunk_grid: ChunkGridDocument {
                name: REGULAR_GRID.to_string(),
                configuration: RegularGridConfiguration {
                    chunk_shape: self.chunk_shape.clone(),
                },
            },
            chunk_key_encoding: self.chunk_key_encoding,
            fill_value: self.fill_value.to_json(self.data_type)?,
            codecs: self.codecs.clone(),
            attributes: self.attributes.clone(),
            dimension_names: self.dimension_names.clone(),
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }

    /// Parse and validate a JSON metadata document
    pub fn from_json(bytes: &[u8], registry: &CodecRegistry) -> Result<Self> {
        match NodeMetadata::from_json(bytes, registry)? {
            NodeMetadata::Array(metadata) => Ok(metadata),
            NodeMetadata::Group(_) => Err(ArrayError::validation("node is a group, not an array")),
        }
    }

    fn from_document(document: ArrayDocument, registry: &CodecRegistry) -> Result<Self> {
        if document.chunk_grid.name != REGULAR_GRID {
            return Err(ArrayError::validation(format!(
                "unsupported chunk grid {}",
                document.chunk_grid.name
            )));
        }
        let metadata = Self {
            fill_value: FillValue::from_json(&document.fill_value, document.data_type)?,
            shape: document.shape,
            chunk_shape: document.chunk_grid.configuration.chunk_shape,
            data_type: document.data_type,
            codecs: document.codecs,
            chunk_key_encoding: document.chunk_key_encoding,
            attributes: document.attributes,
            dimension_names: document.dimension_names,
        };
        metadata.validate(registry)?;
        Ok(metadata)
    }
}

/// Metadata of a group node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMetadata {
    pub attributes: Map<String, Value>,
}

impl GroupMetadata {
    pub fn new(attributes: Map<String, Value>) -> Self {
        Self { attributes }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let document = GroupDocument {
            zarr_format: ZARR_FORMAT,
            node_type: NodeType::Group,
            attributes: self.attributes.clone(),
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

/// Metadata of either kind of node
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMetadata {
    Array(ArrayMetadata),
    Group(GroupMetadata),
}

impl NodeMetadata {
    /// Parse a metadata document, dispatching on `node_type`
    pub fn from_json(bytes: &[u8], registry: &CodecRegistry) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)?;
        let header: NodeHeader = serde_json::from_value(value.clone())?;
        if header.zarr_format != ZARR_FORMAT {
            return Err(ArrayError::validation(format!(
                "unsupported zarr_format {}, expected {}",
                header.zarr_format, ZARR_FORMAT
            )));
        }
        match header.node_type {
            NodeType::Array => {
                let document: ArrayDocument = serde_json::from_value(value)?;
                ArrayMetadata::from_document(document, registry).map(NodeMetadata::Array)
            }
            NodeType::Group => {
                let document: GroupDocument = serde_json::from_value(value)?;
                Ok(NodeMetadata::Group(GroupMetadata::new(document.attributes)))
            }
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        match self {
            NodeMetadata::Array(m) => m.to_json(),
            NodeMetadata::Group(m) => m.to_json(),
        }
    }
}

/// True if a metadata document describes a group. Codecs are not resolved.
pub(crate) fn is_group_document(bytes: &[u8]) -> Result<bool> {
    let header: NodeHeader = serde_json::from_slice(bytes)?;
    Ok(header.node_type == NodeType::Group)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum NodeType {
    Array,
    Group,
}

#[derive(Deserialize)]
struct NodeHeader {
    zarr_format: u8,
    node_type: NodeType,
}

#[derive(Serialize, Deserialize)]
struct RegularGridConfiguration {
    chunk_shape: Vec<u64>,
}

#[derive(Serialize, Deserialize)]
struct ChunkGridDocument {
    name: String,
    configuration: RegularGridConfiguration,
}

#[derive(Serialize, Deserialize)]
struct ArrayDocument {
    zarr_format: u8,
    node_type: NodeType,
    shape: Vec<u64>,
    data_type: DataType,
    chunk_grid: ChunkGridDocument,
    chunk_key_encoding: ChunkKeyEncoding,
    fill_value: Value,
    codecs: Vec<CodecDescriptor>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    dimension_names: Option<Vec<Option<String>>>,
}

#[derive(Serialize, Deserialize)]
struct GroupDocument {
    zarr_format: u8,
    node_type: NodeType,
    #[serde(default)]
    attributes: Map<String, Value>,
}
