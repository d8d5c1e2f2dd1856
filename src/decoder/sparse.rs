use super::{AccessorLayout, DecodeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseIndexType {
    U8,
    U16,
    U32,
}

impl SparseIndexType {
    fn size(self) -> usize {
        match self {
            SparseIndexType::U8 => 1,
            SparseIndexType::U16 => 2,
            SparseIndexType::U32 => 4,
        }
    }
}

/// Sparse substitution applied on top of an accessor's base values.
/// Both streams are the bounded bytes of their buffer views.
#[derive(Debug, Clone)]
pub struct SparseAccessor<'a> {
    pub count: usize,
    pub indices: &'a [u8],
    pub indices_offset: usize,
    pub index_type: SparseIndexType,
    pub values: &'a [u8],
    pub values_offset: usize,
}

impl SparseAccessor<'_> {
    pub fn indices(&self) -> Result<Vec<usize>, DecodeError> {
        let size = self.index_type.size();
        let needed = self
            .count
            .checked_mul(size)
            .and_then(|n| n.checked_add(self.indices_offset))
            .unwrap_or(usize::MAX);
        if needed > self.indices.len() {
            return Err(DecodeError::Truncated {
                needed,
                available: self.indices.len(),
            });
        }
        let bytes = &self.indices[self.indices_offset..needed];
        Ok(bytes
            .chunks_exact(size)
            .map(|b| match self.index_type {
                SparseIndexType::U8 => b[0] as usize,
                SparseIndexType::U16 => u16::from_le_bytes([b[0], b[1]]) as usize,
                SparseIndexType::U32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize,
            })
            .collect())
    }

    /// Sparse values are always tightly packed.
    pub(super) fn value_layout(&self, base: &AccessorLayout) -> AccessorLayout {
        AccessorLayout {
            byte_offset: self.values_offset,
            byte_stride: None,
            count: self.count,
            ..*base
        }
    }
}
