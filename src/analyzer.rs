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

//! Schema validation and physical layout planning.
//!
//! [`analyze`] gates code generation: it resolves and checks every
//! storage type, checks bitfield bit budgets, and plans the physical
//! layout of each structure (ascending offset order, slack spans,
//! byte extents, total decoded size). The run aborts at the first
//! violation; no partial output is ever produced.

use std::collections::HashSet;

use crate::ast;
use crate::ast::SchemaError;

/// Layout information computed for the whole schema, parallel to
/// `ast::File::structures`. The model itself is left untouched.
#[derive(Debug, Clone)]
pub struct Layout {
    pub structures: Vec<StructLayout>,
}

/// Physical decode plan for one structure.
#[derive(Debug, Clone)]
pub struct StructLayout {
    /// Field plans in ascending offset order. This is the order the
    /// generated decode procedure reads from the stream; the output
    /// type declaration keeps declaration order instead.
    pub fields: Vec<FieldLayout>,
    /// End offset of the last field, i.e. the total decoded size of
    /// the structure in bytes.
    pub total_size: usize,
}

#[derive(Debug, Clone)]
pub struct FieldLayout {
    /// Index of the field in the structure's declaration order.
    pub field: usize,
    pub offset: usize,
    /// Byte extent of the field: scalar width, element width times
    /// count for arrays, storage width for bitfields.
    pub width: usize,
    /// Bytes to read and discard before this field. The wire format
    /// is a contiguous stream, so bytes not covered by any declared
    /// field must still be advanced past.
    pub slack: usize,
    /// Resolved storage type read from the stream for this field.
    pub storage: ast::StorageType,
}

impl FieldLayout {
    pub fn end(&self) -> usize {
        self.offset + self.width
    }
}

/// Bit extraction plan for one bitfield sub-field: the value is
/// `(raw >> bit_offset) & mask`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitSlice {
    pub bit_offset: usize,
    pub width: usize,
    pub mask: u64,
}

/// True iff `name` is a fixed-width integral kind or the
/// pointer-sized kind.
pub fn validate_storage_type(name: &str) -> bool {
    ast::StorageType::from_name(name).is_some()
}

/// Resolve the field's effective storage type, failing if the
/// declared name is not a valid storage kind.
pub fn check_field(
    structure: &ast::Structure,
    field: &ast::Field,
) -> Result<ast::StorageType, SchemaError> {
    let type_id = field.storage_type_id();
    ast::StorageType::from_name(type_id).ok_or_else(|| SchemaError::InvalidStorageType {
        structure: structure.id.clone(),
        field: field.id.clone(),
        type_id: type_id.to_owned(),
    })
}

/// Check a bitfield's storage type and bit budget. Pointer-sized
/// storage is rejected: its width is ambiguous, which makes the bit
/// packing ill-defined.
pub fn check_bitfield(
    structure: &ast::Structure,
    field: &ast::Field,
) -> Result<(), SchemaError> {
    let ast::FieldDesc::Bitfield { fields, .. } = &field.desc else {
        return Ok(());
    };
    let storage = check_field(structure, field)?;
    let max = storage.fixed_bit_width().ok_or_else(|| SchemaError::PointerSizedBitfield {
        structure: structure.id.clone(),
        field: field.id.clone(),
    })?;
    let used = fields.iter().map(|sub| sub.width).sum::<usize>();
    if used > max {
        return Err(SchemaError::BitfieldOverflow {
            structure: structure.id.clone(),
            field: field.id.clone(),
            used,
            max,
        });
    }
    Ok(())
}

/// Construct the mask with the low `width` bits set; `mask_bits(0)`
/// is `0`.
pub fn mask_bits(width: usize) -> u64 {
    let mut mask = 0;
    for bit in 0..width {
        mask |= 1u64 << bit;
    }
    mask
}

/// Compute the extraction plan for a bitfield's sub-fields: packed
/// tightly, least-significant-bit first, in declaration order.
pub fn bitfield_slices(fields: &[ast::BitField]) -> Vec<BitSlice> {
    let mut bit_offset = 0;
    fields
        .iter()
        .map(|sub| {
            let slice = BitSlice { bit_offset, width: sub.width, mask: mask_bits(sub.width) };
            bit_offset += sub.width;
            slice
        })
        .collect()
}

/// Check member identifiers for uniqueness. Bitfield sub-fields
/// become members of the output type in place of the bitfield itself.
fn check_members(structure: &ast::Structure) -> Result<(), SchemaError> {
    let mut members = HashSet::new();
    let mut insert = |member: &str| {
        if !members.insert(member.to_owned()) {
            return Err(SchemaError::DuplicateMember {
                structure: structure.id.clone(),
                member: member.to_owned(),
            });
        }
        Ok(())
    };
    for field in &structure.fields {
        match &field.desc {
            ast::FieldDesc::Bitfield { fields, .. } => {
                for sub in fields {
                    insert(&sub.id)?;
                }
            }
            _ => insert(&field.id)?,
        }
    }
    Ok(())
}

fn plan_layout(
    structure: &ast::Structure,
    pointer_width: ast::PointerWidth,
) -> Result<StructLayout, SchemaError> {
    let mut fields = Vec::with_capacity(structure.fields.len());
    for (index, field) in structure.fields.iter().enumerate() {
        let overflow = || SchemaError::FieldExtentOverflow {
            structure: structure.id.clone(),
            field: field.id.clone(),
        };
        let storage = check_field(structure, field)?;
        let width = match &field.desc {
            ast::FieldDesc::Scalar { .. } | ast::FieldDesc::Bitfield { .. } => {
                storage.byte_width(pointer_width)
            }
            ast::FieldDesc::Array { count, .. } => {
                storage.byte_width(pointer_width).checked_mul(*count).ok_or_else(overflow)?
            }
        };
        // The end offset must stay addressable, so the extent checks
        // below and `FieldLayout::end` cannot wrap.
        field.offset.checked_add(width).ok_or_else(overflow)?;
        fields.push(FieldLayout { field: index, offset: field.offset, width, slack: 0, storage });
    }

    // Physical read order. The sort is stable, but equal offsets are
    // rejected below so the tie order never matters.
    fields.sort_by_key(|layout| layout.offset);

    let mut last_end = 0;
    let mut previous: Option<usize> = None;
    for layout in fields.iter_mut() {
        let field = &structure.fields[layout.field];
        if let Some(previous) = previous {
            let previous = &structure.fields[previous];
            if layout.offset == previous.offset {
                return Err(SchemaError::DuplicateOffset {
                    structure: structure.id.clone(),
                    previous: previous.id.clone(),
                    field: field.id.clone(),
                    offset: layout.offset,
                });
            }
            if layout.offset < last_end {
                return Err(SchemaError::OverlappingFields {
                    structure: structure.id.clone(),
                    previous: previous.id.clone(),
                    field: field.id.clone(),
                    offset: layout.offset,
                    end: last_end,
                });
            }
        }
        layout.slack = layout.offset - last_end;
        last_end = layout.end();
        previous = Some(layout.field);
    }

    Ok(StructLayout { fields, total_size: last_end })
}

/// Validate the schema and plan the physical layout of every
/// structure.
pub fn analyze(file: &ast::File, pointer_width: ast::PointerWidth) -> Result<Layout, SchemaError> {
    let mut structures = Vec::with_capacity(file.structures.len());
    for structure in &file.structures {
        for field in &structure.fields {
            check_field(structure, field)?;
            check_bitfield(structure, field)?;
        }
        check_members(structure)?;
        structures.push(plan_layout(structure, pointer_width)?);
    }
    Ok(Layout { structures })
}
