//! The codec pipeline applied to every chunk
//!
//! Encoding runs the array-to-array codecs in order, then the array-to-bytes
//! codec, then the bytes-to-bytes codecs. Decoding runs the same chain in
//! reverse.

use crate::buffer::ArrayBuffer;
use crate::codec::{
    ArrayToArrayCodec, ArrayToBytesCodec, BytesToBytesCodec, ChunkSpec, Codec, CodecDescriptor,
    CodecOptions,
};
use crate::error::{ArrayError, Result};
use std::sync::Arc;

/// An ordered, validated chain of codecs for chunks of one array
#[derive(Debug, Clone)]
pub struct CodecPipeline {
    array_to_array: Vec<Arc<dyn ArrayToArrayCodec>>,
    array_to_bytes: Arc<dyn ArrayToBytesCodec>,
    bytes_to_bytes: Vec<Arc<dyn BytesToBytesCodec>>,
    /// Spec seen by each array-to-array codec, then by the array-to-bytes codec
    specs: Vec<ChunkSpec>,
}

impl CodecPipeline {
    /// Build a pipeline for chunks described by `chunk_spec`
    ///
    /// Fails if the codecs are not ordered as array-to-array codecs, exactly
    /// one array-to-bytes codec, then bytes-to-bytes codecs, or if any codec
    /// rejects the chunk it would receive.
    pub fn new(codecs: Vec<Codec>, chunk_spec: ChunkSpec) -> Result<Self> {
        let mut array_to_array = Vec::new();
        let mut array_to_bytes = None;
        let mut bytes_to_bytes = Vec::new();

        for codec in codecs {
            match codec {
                Codec::ArrayToArray(c) => {
                    if array_to_bytes.is_some() {
                        return Err(ArrayError::validation(format!(
                            "array-to-array codec {} must precede the array-to-bytes codec",
                            c.name()
                        )));
                    }
                    array_to_array.push(c);
                }
                Codec::ArrayToBytes(c) => {
                    if array_to_bytes.is_some() {
                        return Err(ArrayError::validation(
                            "codec chain has more than one array-to-bytes codec",
                        ));
                    }
                    array_to_bytes = Some(c);
                }
                Codec::BytesToBytes(c) => {
                    if array_to_bytes.is_none() {
                        return Err(ArrayError::validation(format!(
                            "bytes-to-bytes codec {} must follow the array-to-bytes codec",
                            c.name()
                        )));
                    }
                    bytes_to_bytes.push(c);
                }
            }
        }

        let array_to_bytes = array_to_bytes
            .ok_or_else(|| ArrayError::validation("codec chain has no array-to-bytes codec"))?;

        let mut specs = Vec::with_capacity(array_to_array.len() + 1);
        let mut spec = chunk_spec;
        for codec in &array_to_array {
            codec.validate(&spec)?;
            let next = codec.encoded_spec(&spec)?;
            specs.push(spec);
            spec = next;
        }
        array_to_bytes.validate(&spec)?;
        specs.push(spec);
        for codec in &bytes_to_bytes {
            codec.validate(&specs[specs.len() - 1])?;
        }

        Ok(Self {
            array_to_array,
            array_to_bytes,
            bytes_to_bytes,
            specs,
        })
    }

    /// Spec of the decoded chunk
    pub fn chunk_spec(&self) -> &ChunkSpec {
        &self.specs[0]
    }

    /// Descriptors of every codec, in encoding order
    pub fn descriptors(&self) -> Vec<CodecDescriptor> {
        self.array_to_array
            .iter()
            .map(|c| c.descriptor())
            .chain(std::iter::once(self.array_to_bytes.descriptor()))
            .chain(self.bytes_to_bytes.iter().map(|c| c.descriptor()))
            .collect()
    }

    /// Encode a full chunk to its stored bytes
    pub fn encode(&self, chunk: ArrayBuffer) -> Result<Vec<u8>> {
        let expected = self.chunk_spec();
        if chunk.shape() != expected.shape.as_slice() || chunk.data_type() != expected.data_type {
            return Err(ArrayError::codec(format!(
                "chunk of shape {:?} and type {} does not match pipeline {:?} {}",
                chunk.shape(),
                chunk.data_type(),
                expected.shape,
                expected.data_type
            )));
        }

        let mut array = chunk;
        for codec in &self.array_to_array {
            array = codec.encode_array(array)?;
        }
        let mut bytes = self.array_to_bytes.encode_to_bytes(array)?;
        for codec in &self.bytes_to_bytes {
            bytes = codec.encode_bytes(bytes)?;
        }
        Ok(bytes)
    }

    /// Decode stored bytes back to a full chunk
    pub fn decode(&self, bytes: &[u8], options: &CodecOptions) -> Result<ArrayBuffer> {
        let mut bytes = bytes.to_vec();
        for codec in self.bytes_to_bytes.iter().rev() {
            bytes = codec.decode_bytes(bytes, options)?;
        }
        let last = &self.specs[self.specs.len() - 1];
        let mut array = self.array_to_bytes.decode_from_bytes(&bytes, last)?;
        for (codec, spec) in self.array_to_array.iter().zip(&self.specs).rev() {
            array = codec.decode_array(array, spec)?;
        }
        Ok(array)
    }
}
