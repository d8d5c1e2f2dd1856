//! Byte-to-number decoding of glTF accessors.
//!
//! Nothing here touches the document or the cache: a [`RawAccessor`] carries
//! the byte streams and layout, and [`decode`] turns it into typed arrays.

mod sparse;

use glam::{Mat4, Vec2, Vec3, Vec4};
use thiserror::Error;

use crate::conventions::color_from_rgb;

pub use sparse::{SparseAccessor, SparseIndexType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

impl From<gltf::accessor::DataType> for ComponentType {
    fn from(data_type: gltf::accessor::DataType) -> Self {
        use gltf::accessor::DataType;
        match data_type {
            DataType::I8 => ComponentType::I8,
            DataType::U8 => ComponentType::U8,
            DataType::I16 => ComponentType::I16,
            DataType::U16 => ComponentType::U16,
            DataType::U32 => ComponentType::U32,
            DataType::F32 => ComponentType::F32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    pub fn component_count(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 | ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }

    fn columns(self) -> usize {
        match self {
            ElementType::Mat2 => 2,
            ElementType::Mat3 => 3,
            ElementType::Mat4 => 4,
            _ => 1,
        }
    }
}

impl From<gltf::accessor::Dimensions> for ElementType {
    fn from(dimensions: gltf::accessor::Dimensions) -> Self {
        use gltf::accessor::Dimensions;
        match dimensions {
            Dimensions::Scalar => ElementType::Scalar,
            Dimensions::Vec2 => ElementType::Vec2,
            Dimensions::Vec3 => ElementType::Vec3,
            Dimensions::Vec4 => ElementType::Vec4,
            Dimensions::Mat2 => ElementType::Mat2,
            Dimensions::Mat3 => ElementType::Mat3,
            Dimensions::Mat4 => ElementType::Mat4,
        }
    }
}

/// What the decoded values are going to be used for. Determines the output
/// shape and which component types are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Position,
    Normal,
    Tangent,
    TexCoord,
    Color,
    Joints,
    Weights,
    Indices,
    InverseBindMatrix,
    Time,
    Translation,
    Rotation,
    Scale,
    MorphWeights,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("accessor needs {needed} bytes but its stream holds {available}")]
    Truncated { needed: usize, available: usize },
    #[error("{kind:?} data cannot be read from {element:?} elements")]
    UnexpectedElementType {
        kind: AttributeKind,
        element: ElementType,
    },
    #[error("{kind:?} data cannot be read from {component:?} components")]
    UnexpectedComponentType {
        kind: AttributeKind,
        component: ComponentType,
    },
    #[error("sparse index {index} is outside the accessor's {count} elements")]
    SparseIndexOutOfRange { index: usize, count: usize },
    #[error("accessor has neither a buffer view nor sparse values")]
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessorLayout {
    /// Offset of the first element inside the view's stream.
    pub byte_offset: usize,
    /// `None` means tightly packed.
    pub byte_stride: Option<usize>,
    pub component_type: ComponentType,
    pub element_type: ElementType,
    pub count: usize,
    pub normalized: bool,
}

impl AccessorLayout {
    /// Size of one element, including the column padding glTF requires for
    /// small-component matrices.
    pub fn element_size(&self) -> usize {
        let component = self.component_type.size();
        let columns = self.element_type.columns();
        if columns > 1 {
            let rows = self.element_type.component_count() / columns;
            let column = (rows * component).next_multiple_of(4);
            column * columns
        } else {
            component * self.element_type.component_count()
        }
    }

    pub fn stride(&self) -> usize {
        self.byte_stride.unwrap_or_else(|| self.element_size())
    }

    fn component_offset(&self, component: usize) -> usize {
        let size = self.component_type.size();
        let columns = self.element_type.columns();
        if columns > 1 {
            let rows = self.element_type.component_count() / columns;
            let column = (rows * size).next_multiple_of(4);
            (component / rows) * column + (component % rows) * size
        } else {
            component * size
        }
    }
}

/// An accessor before decoding: the bounded byte stream of its buffer view
/// (absent for sparse-only accessors) plus layout and sparse overrides.
#[derive(Debug, Clone)]
pub struct RawAccessor<'a> {
    pub stream: Option<&'a [u8]>,
    pub layout: AccessorLayout,
    pub sparse: Option<SparseAccessor<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeData {
    Scalar(Vec<f32>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    Joints(Vec<[u16; 4]>),
    Indices(Vec<u32>),
    Mat4(Vec<Mat4>),
}

impl AttributeData {
    pub fn len(&self) -> usize {
        match self {
            AttributeData::Scalar(v) => v.len(),
            AttributeData::Vec2(v) => v.len(),
            AttributeData::Vec3(v) => v.len(),
            AttributeData::Vec4(v) => v.len(),
            AttributeData::Joints(v) => v.len(),
            AttributeData::Indices(v) => v.len(),
            AttributeData::Mat4(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Option<&[f32]> {
        match self {
            AttributeData::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec2(&self) -> Option<&[Vec2]> {
        match self {
            AttributeData::Vec2(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec3(&self) -> Option<&[Vec3]> {
        match self {
            AttributeData::Vec3(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_vec4(&self) -> Option<&[Vec4]> {
        match self {
            AttributeData::Vec4(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_joints(&self) -> Option<&[[u16; 4]]> {
        match self {
            AttributeData::Joints(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_indices(&self) -> Option<&[u32]> {
        match self {
            AttributeData::Indices(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_mat4(&self) -> Option<&[Mat4]> {
        match self {
            AttributeData::Mat4(v) => Some(v),
            _ => None,
        }
    }
}

pub fn decode(raw: &RawAccessor, kind: AttributeKind) -> Result<AttributeData, DecodeError> {
    let element = raw.layout.element_type;
    let component = raw.layout.component_type;
    let unexpected_element = || DecodeError::UnexpectedElementType { kind, element };
    let unexpected_component = || DecodeError::UnexpectedComponentType { kind, component };

    match kind {
        AttributeKind::Position
        | AttributeKind::Normal
        | AttributeKind::Translation
        | AttributeKind::Scale => {
            if element != ElementType::Vec3 {
                return Err(unexpected_element());
            }
            let floats = read_floats(raw)?;
            Ok(AttributeData::Vec3(
                floats.chunks_exact(3).map(Vec3::from_slice).collect(),
            ))
        }
        AttributeKind::Tangent | AttributeKind::Weights | AttributeKind::Rotation => {
            if element != ElementType::Vec4 {
                return Err(unexpected_element());
            }
            if kind == AttributeKind::Tangent && component != ComponentType::F32 {
                return Err(unexpected_component());
            }
            let floats = read_floats(raw)?;
            Ok(AttributeData::Vec4(
                floats.chunks_exact(4).map(Vec4::from_slice).collect(),
            ))
        }
        AttributeKind::TexCoord => {
            if element != ElementType::Vec2 {
                return Err(unexpected_element());
            }
            let floats = read_floats(raw)?;
            Ok(AttributeData::Vec2(
                floats.chunks_exact(2).map(Vec2::from_slice).collect(),
            ))
        }
        AttributeKind::Color => {
            let floats = read_floats(raw)?;
            let colors = match element {
                ElementType::Vec3 => floats
                    .chunks_exact(3)
                    .map(|c| color_from_rgb(Vec3::from_slice(c)))
                    .collect(),
                ElementType::Vec4 => floats.chunks_exact(4).map(Vec4::from_slice).collect(),
                _ => return Err(unexpected_element()),
            };
            Ok(AttributeData::Vec4(colors))
        }
        AttributeKind::Joints => {
            if element != ElementType::Vec4 {
                return Err(unexpected_element());
            }
            if !matches!(component, ComponentType::U8 | ComponentType::U16) {
                return Err(unexpected_component());
            }
            let ints = read_uints(raw, kind)?;
            Ok(AttributeData::Joints(
                ints.chunks_exact(4)
                    .map(|j| [j[0] as u16, j[1] as u16, j[2] as u16, j[3] as u16])
                    .collect(),
            ))
        }
        AttributeKind::Indices => {
            if element != ElementType::Scalar {
                return Err(unexpected_element());
            }
            Ok(AttributeData::Indices(read_uints(raw, kind)?))
        }
        AttributeKind::InverseBindMatrix => {
            if element != ElementType::Mat4 {
                return Err(unexpected_element());
            }
            let floats = read_floats(raw)?;
            Ok(AttributeData::Mat4(
                floats.chunks_exact(16).map(Mat4::from_cols_slice).collect(),
            ))
        }
        AttributeKind::Time | AttributeKind::MorphWeights => {
            if element != ElementType::Scalar {
                return Err(unexpected_element());
            }
            Ok(AttributeData::Scalar(read_floats(raw)?))
        }
    }
}

/// Reads every component of every element as `f32`, applying glTF's
/// normalized-integer rules where the accessor asks for them.
pub fn read_floats(raw: &RawAccessor) -> Result<Vec<f32>, DecodeError> {
    let layout = &raw.layout;
    let components = layout.element_type.component_count();
    let mut out = vec![0.0f32; output_len(raw)?];

    if let Some(stream) = raw.stream {
        for i in 0..layout.count {
            let element = layout.byte_offset + i * layout.stride();
            for c in 0..components {
                let at = element + layout.component_offset(c);
                out[i * components + c] =
                    read_component_f32(&stream[at..], layout.component_type, layout.normalized);
            }
        }
    }

    if let Some(sparse) = &raw.sparse {
        let value_layout = sparse.value_layout(layout);
        for (n, index) in sparse.indices()?.into_iter().enumerate() {
            if index >= layout.count {
                return Err(DecodeError::SparseIndexOutOfRange {
                    index,
                    count: layout.count,
                });
            }
            let element = value_layout.byte_offset + n * value_layout.stride();
            for c in 0..components {
                let at = element + value_layout.component_offset(c);
                out[index * components + c] = read_component_f32(
                    &sparse.values[at..],
                    layout.component_type,
                    layout.normalized,
                );
            }
        }
    }

    Ok(out)
}

/// Reads every component as `u32`. Float components are rejected.
pub fn read_uints(raw: &RawAccessor, kind: AttributeKind) -> Result<Vec<u32>, DecodeError> {
    let layout = &raw.layout;
    if layout.component_type == ComponentType::F32 {
        return Err(DecodeError::UnexpectedComponentType {
            kind,
            component: layout.component_type,
        });
    }
    let components = layout.element_type.component_count();
    let mut out = vec![0u32; output_len(raw)?];

    if let Some(stream) = raw.stream {
        for i in 0..layout.count {
            let element = layout.byte_offset + i * layout.stride();
            for c in 0..components {
                let at = element + layout.component_offset(c);
                out[i * components + c] = read_component_u32(&stream[at..], layout.component_type);
            }
        }
    }

    if let Some(sparse) = &raw.sparse {
        let value_layout = sparse.value_layout(layout);
        for (n, index) in sparse.indices()?.into_iter().enumerate() {
            if index >= layout.count {
                return Err(DecodeError::SparseIndexOutOfRange {
                    index,
                    count: layout.count,
                });
            }
            let element = value_layout.byte_offset + n * value_layout.stride();
            for c in 0..components {
                let at = element + value_layout.component_offset(c);
                out[index * components + c] =
                    read_component_u32(&sparse.values[at..], layout.component_type);
            }
        }
    }

    Ok(out)
}

/// Validates every stream the accessor reads against its layout and returns
/// the number of components to decode. Runs before anything is allocated.
fn output_len(raw: &RawAccessor) -> Result<usize, DecodeError> {
    let layout = &raw.layout;
    match (raw.stream, &raw.sparse) {
        (Some(stream), _) => check_bounds(stream, layout)?,
        (None, None) => return Err(DecodeError::NoData),
        (None, Some(_)) => {
            // nothing backs the base values, so cap them at what a GLB buffer can hold
            let needed = byte_span(layout).unwrap_or(usize::MAX);
            if needed > MAX_UNBACKED_BYTES {
                return Err(DecodeError::Truncated {
                    needed,
                    available: MAX_UNBACKED_BYTES,
                });
            }
        }
    }
    if let Some(sparse) = &raw.sparse {
        check_bounds(sparse.values, &sparse.value_layout(layout))?;
    }
    layout
        .count
        .checked_mul(layout.element_type.component_count())
        .ok_or(DecodeError::Truncated {
            needed: usize::MAX,
            available: 0,
        })
}

const MAX_UNBACKED_BYTES: usize = u32::MAX as usize;

/// Bytes from the start of the stream to the end of the last element, or
/// `None` when that does not fit in `usize`.
fn byte_span(layout: &AccessorLayout) -> Option<usize> {
    if layout.count == 0 {
        return Some(0);
    }
    (layout.count - 1)
        .checked_mul(layout.stride())?
        .checked_add(layout.element_size())?
        .checked_add(layout.byte_offset)
}

fn check_bounds(stream: &[u8], layout: &AccessorLayout) -> Result<(), DecodeError> {
    if layout.count == 0 {
        return Ok(());
    }
    let needed = byte_span(layout).unwrap_or(usize::MAX);
    if needed > stream.len() {
        return Err(DecodeError::Truncated {
            needed,
            available: stream.len(),
        });
    }
    Ok(())
}

fn read_component_f32(bytes: &[u8], component_type: ComponentType, normalized: bool) -> f32 {
    match component_type {
        ComponentType::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        ComponentType::I8 => {
            let v = bytes[0] as i8 as f32;
            if normalized { (v / 127.0).max(-1.0) } else { v }
        }
        ComponentType::U8 => {
            let v = bytes[0] as f32;
            if normalized { v / 255.0 } else { v }
        }
        ComponentType::I16 => {
            let v = i16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized { (v / 32767.0).max(-1.0) } else { v }
        }
        ComponentType::U16 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]) as f32;
            if normalized { v / 65535.0 } else { v }
        }
        ComponentType::U32 => {
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32;
            if normalized { v / u32::MAX as f32 } else { v }
        }
    }
}

fn read_component_u32(bytes: &[u8], component_type: ComponentType) -> u32 {
    match component_type {
        ComponentType::I8 => bytes[0] as i8 as u32,
        ComponentType::U8 => bytes[0] as u32,
        ComponentType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        ComponentType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        ComponentType::U32 | ComponentType::F32 => {
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn layout(
        component_type: ComponentType,
        element_type: ElementType,
        count: usize,
    ) -> AccessorLayout {
        AccessorLayout {
            byte_offset: 0,
            byte_stride: None,
            component_type,
            element_type,
            count,
            normalized: false,
        }
    }

    pub(crate) fn f32_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn reads_packed_positions() {
        let bytes = f32_bytes(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Vec3, 3),
            sparse: None,
        };
        let data = decode(&raw, AttributeKind::Position).unwrap();
        assert_eq!(
            data.as_vec3().unwrap(),
            &[Vec3::ZERO, Vec3::X, Vec3::Y]
        );
    }

    #[test]
    fn honors_offset_and_stride() {
        // two interleaved vec2 uvs separated by 4 bytes of padding, after an 8 byte header
        let mut bytes = vec![0xAA; 8];
        bytes.extend(f32_bytes(&[0.25, 0.5]));
        bytes.extend([0xBB; 4]);
        bytes.extend(f32_bytes(&[0.75, 1.0]));
        bytes.extend([0xBB; 4]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: AccessorLayout {
                byte_offset: 8,
                byte_stride: Some(12),
                ..layout(ComponentType::F32, ElementType::Vec2, 2)
            },
            sparse: None,
        };
        let data = decode(&raw, AttributeKind::TexCoord).unwrap();
        assert_eq!(
            data.as_vec2().unwrap(),
            &[Vec2::new(0.25, 0.5), Vec2::new(0.75, 1.0)]
        );
    }

    #[test]
    fn normalized_bytes_become_unit_floats() {
        let bytes = [0u8, 255, 51, 255];
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: AccessorLayout {
                normalized: true,
                ..layout(ComponentType::U8, ElementType::Vec4, 1)
            },
            sparse: None,
        };
        let data = decode(&raw, AttributeKind::Color).unwrap();
        assert_eq!(data.as_vec4().unwrap(), &[Vec4::new(0.0, 1.0, 0.2, 1.0)]);
    }

    #[test]
    fn rgb_colors_get_opaque_alpha() {
        let bytes = f32_bytes(&[0.1, 0.2, 0.3]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Vec3, 1),
            sparse: None,
        };
        let data = decode(&raw, AttributeKind::Color).unwrap();
        assert_eq!(data.as_vec4().unwrap(), &[Vec4::new(0.1, 0.2, 0.3, 1.0)]);
    }

    #[test]
    fn reads_u16_indices_and_u8_joints() {
        let indices: Vec<u8> = [0u16, 2, 1].iter().flat_map(|i| i.to_le_bytes()).collect();
        let raw = RawAccessor {
            stream: Some(&indices),
            layout: layout(ComponentType::U16, ElementType::Scalar, 3),
            sparse: None,
        };
        assert_eq!(
            decode(&raw, AttributeKind::Indices).unwrap(),
            AttributeData::Indices(vec![0, 2, 1])
        );

        let joints = [3u8, 1, 0, 0];
        let raw = RawAccessor {
            stream: Some(&joints),
            layout: layout(ComponentType::U8, ElementType::Vec4, 1),
            sparse: None,
        };
        assert_eq!(
            decode(&raw, AttributeKind::Joints).unwrap(),
            AttributeData::Joints(vec![[3, 1, 0, 0]])
        );
    }

    #[test]
    fn truncated_stream_is_an_error() {
        let bytes = f32_bytes(&[1.0, 2.0, 3.0, 4.0]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Vec3, 2),
            sparse: None,
        };
        assert_eq!(
            decode(&raw, AttributeKind::Position),
            Err(DecodeError::Truncated {
                needed: 24,
                available: 16
            })
        );
    }

    #[test]
    fn oversized_count_fails_before_allocating() {
        let bytes = [0u8; 6];
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::U16, ElementType::Scalar, 1 << 61),
            sparse: None,
        };
        assert!(matches!(
            decode(&raw, AttributeKind::Indices),
            Err(DecodeError::Truncated { available: 6, .. })
        ));

        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Vec4, 1 << 40),
            sparse: None,
        };
        assert!(matches!(
            decode(&raw, AttributeKind::Weights),
            Err(DecodeError::Truncated { available: 6, .. })
        ));
    }

    #[test]
    fn huge_stride_does_not_wrap_past_the_check() {
        let bytes = [0u8; 64];
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: AccessorLayout {
                byte_stride: Some(usize::MAX / 2),
                ..layout(ComponentType::F32, ElementType::Vec3, 3)
            },
            sparse: None,
        };
        assert!(matches!(
            decode(&raw, AttributeKind::Position),
            Err(DecodeError::Truncated { needed: usize::MAX, .. })
        ));
    }

    #[test]
    fn float_indices_are_rejected() {
        let bytes = f32_bytes(&[0.0]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Scalar, 1),
            sparse: None,
        };
        assert!(matches!(
            decode(&raw, AttributeKind::Indices),
            Err(DecodeError::UnexpectedComponentType { .. })
        ));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let bytes = f32_bytes(&[0.0, 1.0]);
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Vec2, 1),
            sparse: None,
        };
        assert_eq!(
            decode(&raw, AttributeKind::Position),
            Err(DecodeError::UnexpectedElementType {
                kind: AttributeKind::Position,
                element: ElementType::Vec2
            })
        );
    }

    #[test]
    fn reads_column_major_matrices() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let bytes = f32_bytes(&m.to_cols_array());
        let raw = RawAccessor {
            stream: Some(&bytes),
            layout: layout(ComponentType::F32, ElementType::Mat4, 1),
            sparse: None,
        };
        let data = decode(&raw, AttributeKind::InverseBindMatrix).unwrap();
        assert_eq!(data.as_mat4().unwrap(), &[m]);
    }

    #[test]
    fn small_matrix_columns_are_padded() {
        let l = layout(ComponentType::U8, ElementType::Mat3, 1);
        assert_eq!(l.element_size(), 12);
        assert_eq!(l.component_offset(3), 4);
        let l = layout(ComponentType::F32, ElementType::Mat3, 1);
        assert_eq!(l.element_size(), 36);
    }
}
