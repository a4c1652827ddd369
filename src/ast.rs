// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Schema model for fixed binary structure layouts.
//!
//! The model is constructed once per generation run from an already
//! deserialized schema tree (see [`crate::parser`]) and is immutable
//! afterwards. Fields keep their declaration order; physical offset
//! ordering is computed separately by [`crate::analyzer`].

use serde::Serialize;
use std::fmt;

/// Fixed-width integral storage kinds, plus the pointer-sized kind.
///
/// Every scalar, array element, and bitfield storage unit resolves to
/// one of these kinds. The names match the type names used in schema
/// files.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Int64,
    Uint64,
    Uintptr,
}

/// Byte width of the pointer-sized storage kind on the decode target.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum PointerWidth {
    P32,
    P64,
}

impl StorageType {
    pub fn from_name(name: &str) -> Option<StorageType> {
        match name {
            "int8" => Some(StorageType::Int8),
            "uint8" => Some(StorageType::Uint8),
            "int16" => Some(StorageType::Int16),
            "uint16" => Some(StorageType::Uint16),
            "int32" => Some(StorageType::Int32),
            "uint32" => Some(StorageType::Uint32),
            "int64" => Some(StorageType::Int64),
            "uint64" => Some(StorageType::Uint64),
            "uintptr" => Some(StorageType::Uintptr),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StorageType::Int8 => "int8",
            StorageType::Uint8 => "uint8",
            StorageType::Int16 => "int16",
            StorageType::Uint16 => "uint16",
            StorageType::Int32 => "int32",
            StorageType::Uint32 => "uint32",
            StorageType::Int64 => "int64",
            StorageType::Uint64 => "uint64",
            StorageType::Uintptr => "uintptr",
        }
    }

    /// Byte width of the kind, or `None` for the pointer-sized kind
    /// whose width depends on the decode target.
    pub fn fixed_byte_width(self) -> Option<usize> {
        match self {
            StorageType::Int8 | StorageType::Uint8 => Some(1),
            StorageType::Int16 | StorageType::Uint16 => Some(2),
            StorageType::Int32 | StorageType::Uint32 => Some(4),
            StorageType::Int64 | StorageType::Uint64 => Some(8),
            StorageType::Uintptr => None,
        }
    }

    pub fn fixed_bit_width(self) -> Option<usize> {
        self.fixed_byte_width().map(|width| width * 8)
    }

    /// Byte width of the kind, resolving the pointer-sized kind
    /// against the selected target pointer width.
    pub fn byte_width(self, pointer_width: PointerWidth) -> usize {
        self.fixed_byte_width().unwrap_or_else(|| pointer_width.bytes())
    }

    pub fn is_pointer_sized(self) -> bool {
        matches!(self, StorageType::Uintptr)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            StorageType::Int8 | StorageType::Int16 | StorageType::Int32 | StorageType::Int64
        )
    }

    /// The unsigned kind of the same width. Bit extraction always
    /// operates on the unsigned bit pattern of the raw storage value.
    pub fn unsigned(self, pointer_width: PointerWidth) -> StorageType {
        match self.byte_width(pointer_width) {
            1 => StorageType::Uint8,
            2 => StorageType::Uint16,
            4 => StorageType::Uint32,
            _ => StorageType::Uint64,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl PointerWidth {
    pub fn bytes(self) -> usize {
        match self {
            PointerWidth::P32 => 4,
            PointerWidth::P64 => 8,
        }
    }
}

impl std::str::FromStr for PointerWidth {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "4" => Ok(PointerWidth::P32),
            "8" => Ok(PointerWidth::P64),
            _ => Err(format!("could not parse {input:?}, valid options are '4', '8'.")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndiannessValue {
    LittleEndian,
    BigEndian,
}

/// Named bit range inside a bitfield. Sub-fields are packed tightly,
/// least-significant-bit first, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "bit_field")]
pub struct BitField {
    pub id: String,
    pub width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum FieldDesc {
    #[serde(rename = "scalar_field")]
    Scalar { type_id: String },
    #[serde(rename = "array_field")]
    Array { type_id: String, count: usize },
    #[serde(rename = "bitfield_field")]
    Bitfield { type_id: String, fields: Vec<BitField> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub id: String,
    /// Byte offset of the field inside the parent structure.
    pub offset: usize,
    #[serde(flatten)]
    pub desc: FieldDesc,
    /// Endianness override; resolves to the parent structure's
    /// endianness when absent.
    pub endianness: Option<EndiannessValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename = "structure")]
pub struct Structure {
    pub id: String,
    pub endianness: EndiannessValue,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct File {
    pub structures: Vec<Structure>,
}

/// Error raised while constructing or validating a schema.
/// Any schema error aborts the generation run before any code is
/// emitted.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed schema: {message}")]
    MalformedSchema { message: String },
    #[error("malformed structure `{structure}`: {message}")]
    MalformedStructure { structure: String, message: String },
    #[error("malformed field `{field}` of structure `{structure}`: {message}")]
    MalformedField { structure: String, field: String, message: String },
    #[error("invalid storage type `{type_id}` in field `{field}` of structure `{structure}`")]
    InvalidStorageType { structure: String, field: String, type_id: String },
    #[error("bitfield `{field}` of structure `{structure}` may not use pointer-sized storage")]
    PointerSizedBitfield { structure: String, field: String },
    #[error(
        "too many bits in field `{field}` of structure `{structure}` - used: {used}, max: {max}"
    )]
    BitfieldOverflow { structure: String, field: String, used: usize, max: usize },
    #[error(
        "fields `{previous}` and `{field}` of structure `{structure}` \
         are both declared at offset {offset}"
    )]
    DuplicateOffset { structure: String, previous: String, field: String, offset: usize },
    #[error(
        "field `{field}` of structure `{structure}` at offset {offset} \
         overlaps `{previous}` ending at offset {end}"
    )]
    OverlappingFields {
        structure: String,
        previous: String,
        field: String,
        offset: usize,
        end: usize,
    },
    #[error("redeclaration of member identifier `{member}` in structure `{structure}`")]
    DuplicateMember { structure: String, member: String },
    #[error(
        "field `{field}` of structure `{structure}` extends past the maximum \
         addressable offset"
    )]
    FieldExtentOverflow { structure: String, field: String },
}

impl Field {
    /// Name of the storage type actually read from the stream: the
    /// element type for arrays, the storage type for bitfields, the
    /// field's own type otherwise.
    pub fn storage_type_id(&self) -> &str {
        match &self.desc {
            FieldDesc::Scalar { type_id }
            | FieldDesc::Array { type_id, .. }
            | FieldDesc::Bitfield { type_id, .. } => type_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.desc {
            FieldDesc::Scalar { .. } => "scalar",
            FieldDesc::Array { .. } => "array",
            FieldDesc::Bitfield { .. } => "bitfield",
        }
    }

    /// Endianness used to read this field: the override if present,
    /// else the parent structure's endianness.
    pub fn resolved_endianness(&self, structure: &Structure) -> EndiannessValue {
        self.endianness.unwrap_or(structure.endianness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_type_names_resolve() {
        for name in ["int8", "uint8", "int16", "uint16", "int32", "uint32", "int64", "uint64"] {
            let ty = StorageType::from_name(name).unwrap();
            assert_eq!(ty.name(), name);
            assert!(!ty.is_pointer_sized());
        }
        assert_eq!(StorageType::from_name("uintptr"), Some(StorageType::Uintptr));
        assert_eq!(StorageType::from_name("float32"), None);
        assert_eq!(StorageType::from_name("uint7"), None);
        assert_eq!(StorageType::from_name("UINT8"), None);
    }

    #[test]
    fn storage_type_widths() {
        assert_eq!(StorageType::Uint8.fixed_byte_width(), Some(1));
        assert_eq!(StorageType::Int16.fixed_byte_width(), Some(2));
        assert_eq!(StorageType::Uint32.fixed_bit_width(), Some(32));
        assert_eq!(StorageType::Int64.fixed_byte_width(), Some(8));
        assert_eq!(StorageType::Uintptr.fixed_byte_width(), None);
        assert_eq!(StorageType::Uintptr.byte_width(PointerWidth::P32), 4);
        assert_eq!(StorageType::Uintptr.byte_width(PointerWidth::P64), 8);
    }

    #[test]
    fn unsigned_counterparts() {
        assert_eq!(StorageType::Int8.unsigned(PointerWidth::P64), StorageType::Uint8);
        assert_eq!(StorageType::Int64.unsigned(PointerWidth::P64), StorageType::Uint64);
        assert_eq!(StorageType::Uint16.unsigned(PointerWidth::P64), StorageType::Uint16);
        assert_eq!(StorageType::Uintptr.unsigned(PointerWidth::P32), StorageType::Uint32);
        assert_eq!(StorageType::Uintptr.unsigned(PointerWidth::P64), StorageType::Uint64);
    }

    #[test]
    fn endianness_resolution() {
        let structure = Structure {
            id: "S".to_owned(),
            endianness: EndiannessValue::BigEndian,
            fields: vec![],
        };
        let field = Field {
            id: "f".to_owned(),
            offset: 0,
            desc: FieldDesc::Scalar { type_id: "uint8".to_owned() },
            endianness: None,
        };
        assert_eq!(field.resolved_endianness(&structure), EndiannessValue::BigEndian);
        let field = Field { endianness: Some(EndiannessValue::LittleEndian), ..field };
        assert_eq!(field.resolved_endianness(&structure), EndiannessValue::LittleEndian);
    }
}
