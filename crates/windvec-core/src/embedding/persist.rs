//! Saving and loading [`WordVectors`] as a safetensors file.
//!
//! The file holds one `F32` tensor `vectors` of shape `[tokens, dimensions]`
//! in vocabulary order. Tokens and counts live in the header metadata as JSON
//! under a single key, so writing the same vectors twice yields identical
//! bytes.

use std::collections::HashMap;
use std::path::Path;

use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::embedding::table::{EmbeddingTable, WordVectors};
use crate::embedding::vocabulary::{VocabEntry, Vocabulary};
use crate::error::{Result, WindvecError};

const VECTORS_TENSOR: &str = "vectors";
const VOCABULARY_KEY: &str = "windvec.vocabulary";
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct VocabularyHeader {
    version: u32,
    dimensions: usize,
    entries: Vec<VocabEntry>,
}

impl WordVectors {
    /// Serialize to safetensors bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let table = self.table();
        let raw: Vec<u8> = table
            .as_slice()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let view = TensorView::new(Dtype::F32, vec![table.rows(), table.dimensions()], &raw)?;

        let header = VocabularyHeader {
            version: FORMAT_VERSION,
            dimensions: table.dimensions(),
            entries: self.vocabulary().entries().to_vec(),
        };
        let metadata = HashMap::from([(VOCABULARY_KEY.to_string(), serde_json::to_string(&header)?)]);

        Ok(safetensors::serialize([(VECTORS_TENSOR, view)], &Some(metadata))?)
    }

    /// Deserialize from safetensors bytes.
    ///
    /// # Errors
    ///
    /// `WindvecError::Format` if the bytes are not a windvec vector file or the
    /// tensor shape disagrees with the vocabulary.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (_, metadata) = SafeTensors::read_metadata(bytes)?;
        let header_json = metadata
            .metadata()
            .as_ref()
            .and_then(|m| m.get(VOCABULARY_KEY))
            .ok_or_else(|| WindvecError::Format("missing vocabulary header".into()))?;
        let header: VocabularyHeader = serde_json::from_str(header_json)?;
        if header.version != FORMAT_VERSION {
            return Err(WindvecError::Format(format!(
                "unsupported vector file version {}",
                header.version
            )));
        }

        let tensors = SafeTensors::deserialize(bytes)?;
        let view = tensors.tensor(VECTORS_TENSOR)?;
        let rows = header.entries.len();
        if view.dtype() != Dtype::F32 || view.shape() != [rows, header.dimensions] {
            return Err(WindvecError::Format(format!(
                "expected F32 [{rows}, {}] vectors, found {:?} {:?}",
                header.dimensions,
                view.dtype(),
                view.shape()
            )));
        }

        let data: Vec<f32> = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let vocabulary = Vocabulary::from_entries(header.entries)?;
        let table = EmbeddingTable::from_raw(rows, header.dimensions, data)?;
        WordVectors::new(vocabulary, table)
    }

    /// Write the vectors to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_bytes()?)?;
        info!(path = %path.display(), tokens = self.vocabulary().len(), "word vectors saved");
        Ok(())
    }

    /// Read vectors previously written by [`WordVectors::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let vectors = Self::from_bytes(&std::fs::read(path)?)?;
        info!(path = %path.display(), tokens = vectors.vocabulary().len(), "word vectors loaded");
        Ok(vectors)
    }
}
