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

//! Construction of the schema model from an already deserialized
//! schema tree.
//!
//! The textual representation (JSON or YAML) is deserialized into a
//! generic [`serde_json::Value`] tree by the caller; this module only
//! walks the tree and builds [`ast::File`], applying the schema
//! defaults and parsing the `type` string grammar:
//!
//! ```text
//! type  := kind | "bitfield." kind | kind "[" count "]"
//! kind  := "int8" | "uint8" | ... | "uint64" | "uintptr"
//! ```

use crate::ast;
use crate::ast::SchemaError;
use serde_json::Value;

/// Build the schema model from a parsed schema tree: a sequence of
/// structure objects.
pub fn parse_schema(value: &Value) -> Result<ast::File, SchemaError> {
    let structures = value.as_array().ok_or_else(|| SchemaError::MalformedSchema {
        message: "expected a sequence of structure objects".to_owned(),
    })?;
    let structures =
        structures.iter().map(parse_structure).collect::<Result<Vec<_>, _>>()?;
    Ok(ast::File { structures })
}

fn parse_structure(value: &Value) -> Result<ast::Structure, SchemaError> {
    let object = value.as_object().ok_or_else(|| SchemaError::MalformedSchema {
        message: "structure is not an object".to_owned(),
    })?;
    let id = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SchemaError::MalformedSchema {
            message: "structure without a `name`".to_owned(),
        })?
        .to_owned();
    let endianness = parse_endianness(&id, "<structure>", object.get("endian"))?
        .unwrap_or(ast::EndiannessValue::LittleEndian);
    let fields = object
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| SchemaError::MalformedStructure {
            structure: id.clone(),
            message: "missing `fields` sequence".to_owned(),
        })?
        .iter()
        .map(|field| parse_field(&id, field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ast::Structure { id, endianness, fields })
}

fn parse_field(structure: &str, value: &Value) -> Result<ast::Field, SchemaError> {
    let malformed = |field: &str, message: &str| SchemaError::MalformedField {
        structure: structure.to_owned(),
        field: field.to_owned(),
        message: message.to_owned(),
    };

    let object = value.as_object().ok_or_else(|| SchemaError::MalformedStructure {
        structure: structure.to_owned(),
        message: "field is not an object".to_owned(),
    })?;
    let id = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SchemaError::MalformedStructure {
            structure: structure.to_owned(),
            message: "field without a `name`".to_owned(),
        })?
        .to_owned();
    let offset = object
        .get("offset")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed(&id, "`offset` must be a non-negative integer"))?
        as usize;
    let type_id = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(&id, "missing `type`"))?;
    let endianness = parse_endianness(structure, &id, object.get("endian"))?;

    let desc = if let Some(storage) = type_id.strip_prefix("bitfield.") {
        let fields = object
            .get("bit_fields")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed(&id, "bitfield without a `bit_fields` sequence"))?
            .iter()
            .map(|sub| parse_bit_field(structure, &id, sub))
            .collect::<Result<Vec<_>, _>>()?;
        ast::FieldDesc::Bitfield { type_id: storage.to_owned(), fields }
    } else if let Some(index) = type_id.find('[') {
        let count = type_id
            .strip_suffix(']')
            .map(|head| &head[index + 1..])
            .and_then(|count| count.parse::<usize>().ok())
            .filter(|count| *count > 0)
            .ok_or_else(|| malformed(&id, "array count must be a positive integer"))?;
        ast::FieldDesc::Array { type_id: type_id[..index].to_owned(), count }
    } else {
        ast::FieldDesc::Scalar { type_id: type_id.to_owned() }
    };

    Ok(ast::Field { id, offset, desc, endianness })
}

fn parse_bit_field(
    structure: &str,
    field: &str,
    value: &Value,
) -> Result<ast::BitField, SchemaError> {
    let malformed = |message: &str| SchemaError::MalformedField {
        structure: structure.to_owned(),
        field: field.to_owned(),
        message: message.to_owned(),
    };

    let object = value.as_object().ok_or_else(|| malformed("bit field is not an object"))?;
    let id = object
        .get("name")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("bit field without a `name`"))?
        .to_owned();
    // The width defaults to a single bit.
    let width = match object.get("size") {
        None => 1,
        Some(size) => size
            .as_u64()
            .filter(|size| *size > 0)
            .ok_or_else(|| malformed("bit field `size` must be a positive integer"))?
            as usize,
    };
    Ok(ast::BitField { id, width })
}

fn parse_endianness(
    structure: &str,
    field: &str,
    value: Option<&Value>,
) -> Result<Option<ast::EndiannessValue>, SchemaError> {
    match value.and_then(Value::as_str) {
        None if value.is_none() => Ok(None),
        Some("little") => Ok(Some(ast::EndiannessValue::LittleEndian)),
        Some("big") => Ok(Some(ast::EndiannessValue::BigEndian)),
        _ => Err(SchemaError::MalformedField {
            structure: structure.to_owned(),
            field: field.to_owned(),
            message: "`endian` must be \"little\" or \"big\"".to_owned(),
        }),
    }
}
