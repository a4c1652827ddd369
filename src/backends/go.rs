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

//! Go compiler backend.
//!
//! Emits one struct declaration per structure (declaration order) and
//! one `Parse<Name>(input io.Reader) (*<Name>, error)` procedure per
//! structure (ascending offset order). Reads are performed with
//! `binary.Read`; the schema's integral kind names map directly onto
//! Go type names.

use crate::backends::{GenOptions, TempAllocator};
use crate::{analyzer, ast};

fn indent(s: &str, level: usize) -> String {
    let prefix = "\t".repeat(level);
    s.lines()
        .map(|line| if line.is_empty() { line.to_string() } else { format!("{}{}", prefix, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

fn go_endianness(endianness: ast::EndiannessValue) -> &'static str {
    match endianness {
        ast::EndiannessValue::LittleEndian => "binary.LittleEndian",
        ast::EndiannessValue::BigEndian => "binary.BigEndian",
    }
}

/// Sized unsigned type used to read a pointer-sized value.
/// `binary.Read` only accepts fixed-size data, so `uintptr` members
/// are read through a temporary of the target pointer width.
fn go_pointer_read_type(pointer_width: ast::PointerWidth) -> &'static str {
    match pointer_width {
        ast::PointerWidth::P32 => "uint32",
        ast::PointerWidth::P64 => "uint64",
    }
}

/// Member type in the generated struct. The schema's kind names are
/// also valid Go type names.
fn go_member_type(field: &ast::Field) -> String {
    match &field.desc {
        ast::FieldDesc::Scalar { type_id } => type_id.clone(),
        ast::FieldDesc::Array { type_id, count } => format!("[{}]{}", count, type_id),
        // Bitfield members are declared per sub-field by the caller.
        ast::FieldDesc::Bitfield { type_id, .. } => type_id.clone(),
    }
}

/// Extraction expression for one bitfield sub-field. Extraction is
/// shift-then-mask on the unsigned bit pattern, so signed storage is
/// routed through the unsigned type of the same width to avoid
/// arithmetic shifts and signed constant overflows.
fn go_extract(
    raw: &str,
    storage: ast::StorageType,
    slice: &analyzer::BitSlice,
    options: &GenOptions,
) -> String {
    let mask = format!("0x{:X}", slice.mask);
    if storage.is_signed() {
        let unsigned = storage.unsigned(options.pointer_width).name();
        format!(
            "{}(({}({}) >> {}) & {})",
            storage.name(),
            unsigned,
            raw,
            slice.bit_offset,
            mask
        )
    } else {
        format!("({} >> {}) & {}", raw, slice.bit_offset, mask)
    }
}

/// Fail-fast error return naming the failing field and structure and
/// wrapping the read error's description.
fn error_check(structure: &ast::Structure, field: &ast::Field) -> Vec<String> {
    vec![
        "if err != nil {".to_owned(),
        format!(
            "\treturn nil, errors.New(fmt.Sprintf(\
             \"Error reading field '{}' of structure '{}': %s\", err))",
            field.id, structure.id
        ),
        "}".to_owned(),
    ]
}

fn generate_struct_declaration(structure: &ast::Structure, options: &GenOptions) -> String {
    let mut members = Vec::new();
    for field in &structure.fields {
        match &field.desc {
            // No member is emitted for the bitfield itself, only for
            // its sub-fields.
            ast::FieldDesc::Bitfield { type_id, fields } => {
                for sub in fields {
                    members.push(format!("{} {}", options.naming.apply(&sub.id), type_id));
                }
            }
            _ => members.push(format!(
                "{} {}",
                options.naming.apply(&field.id),
                go_member_type(field)
            )),
        }
    }

    format!(
        "type {} struct {{\n{}\n}}\n",
        options.naming.apply(&structure.id),
        indent(&members.join("\n"), 1)
    )
}

fn generate_parse_function(
    structure: &ast::Structure,
    plan: &analyzer::StructLayout,
    options: &GenOptions,
) -> String {
    let name = options.naming.apply(&structure.id);
    let mut temps = TempAllocator::new();
    let mut lines =
        vec![format!("var output {}", name), "var err error".to_owned(), String::new()];
    let mut last_name = "*beginning of structure*".to_owned();

    for layout in &plan.fields {
        let field = &structure.fields[layout.field];
        let endianness = go_endianness(field.resolved_endianness(structure));

        if layout.slack > 0 {
            let temp = temps.allocate();
            lines.push(format!(
                "// Reading {} byte(s) of slack between \"{}\" and \"{}\"",
                layout.slack, last_name, field.id
            ));
            lines.push(format!("var {} [{}]byte", temp, layout.slack));
            lines.push(format!("err = binary.Read(input, binary.LittleEndian, &{})", temp));
            lines.extend(error_check(structure, field));
            lines.push(String::new());
        }

        lines.push(format!("// Reading into field \"{}\"", field.id));
        match &field.desc {
            ast::FieldDesc::Scalar { type_id } if layout.storage.is_pointer_sized() => {
                let temp = temps.allocate();
                lines.push(format!(
                    "var {} {}",
                    temp,
                    go_pointer_read_type(options.pointer_width)
                ));
                lines.push(format!("err = binary.Read(input, {}, &{})", endianness, temp));
                lines.extend(error_check(structure, field));
                lines.push(format!(
                    "output.{} = {}({})",
                    options.naming.apply(&field.id),
                    type_id,
                    temp
                ));
                lines.push(String::new());
            }
            ast::FieldDesc::Array { type_id, count } if layout.storage.is_pointer_sized() => {
                let temp = temps.allocate();
                let member = options.naming.apply(&field.id);
                lines.push(format!(
                    "var {} [{}]{}",
                    temp,
                    count,
                    go_pointer_read_type(options.pointer_width)
                ));
                lines.push(format!("err = binary.Read(input, {}, &{})", endianness, temp));
                lines.extend(error_check(structure, field));
                lines.push(format!("for i := 0; i < {}; i++ {{", count));
                lines.push(format!("\toutput.{}[i] = {}({}[i])", member, type_id, temp));
                lines.push("}".to_owned());
                lines.push(String::new());
            }
            ast::FieldDesc::Scalar { .. } | ast::FieldDesc::Array { .. } => {
                lines.push(format!(
                    "err = binary.Read(input, {}, &output.{})",
                    endianness,
                    options.naming.apply(&field.id)
                ));
                lines.extend(error_check(structure, field));
                lines.push(String::new());
            }
            ast::FieldDesc::Bitfield { type_id, fields } => {
                let temp = temps.allocate();
                lines.push(format!("var {} {}", temp, type_id));
                lines.push(format!("err = binary.Read(input, {}, &{})", endianness, temp));
                lines.extend(error_check(structure, field));
                lines.push(String::new());
                for (sub, slice) in fields.iter().zip(analyzer::bitfield_slices(fields)) {
                    lines.push(format!(
                        "// Bit field \"{}\": offset {}, size {}",
                        sub.id, slice.bit_offset, slice.width
                    ));
                    lines.push(format!(
                        "output.{} = {}",
                        options.naming.apply(&sub.id),
                        go_extract(&temp, layout.storage, &slice, options)
                    ));
                }
                lines.push(String::new());
            }
        }

        last_name = field.id.clone();
    }

    lines.push(format!("// Total size of structure: {} bytes", plan.total_size));
    lines.push("return &output, nil".to_owned());

    format!(
        "func Parse{}(input io.Reader) (*{}, error) {{\n{}\n}}\n",
        name,
        name,
        indent(&lines.join("\n"), 1)
    )
}

/// Generate the complete Go source for the schema: package header,
/// fixed import set, then one struct declaration and one parse
/// procedure per structure, in input order.
pub fn generate(
    file: &ast::File,
    layout: &analyzer::Layout,
    options: &GenOptions,
) -> String {
    let mut code = String::new();
    code.push_str(&format!("package {}\n", options.package));
    code.push('\n');
    code.push_str("import (\n");
    code.push_str("\t\"encoding/binary\"\n");
    code.push_str("\t\"errors\"\n");
    code.push_str("\t\"fmt\"\n");
    code.push_str("\t\"io\"\n");
    code.push_str(")\n");

    for (structure, plan) in file.structures.iter().zip(&layout.structures) {
        code.push('\n');
        code.push_str(&generate_struct_declaration(structure, options));
        code.push('\n');
        code.push_str(&generate_parse_function(structure, plan, options));
    }

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::NamingStrategy;
    use crate::parser::parse_schema;
    use serde_json::json;

    fn options() -> GenOptions {
        GenOptions {
            package: "example".to_owned(),
            naming: NamingStrategy::CapitalizeFirst,
            pointer_width: ast::PointerWidth::P64,
        }
    }

    fn generate_json(value: serde_json::Value) -> String {
        let file = parse_schema(&value).unwrap();
        let layout = analyzer::analyze(&file, ast::PointerWidth::P64).unwrap();
        generate(&file, &layout, &options())
    }

    #[test]
    fn generates_contiguous_structure() {
        let code = generate_json(json!([
            {
                "name": "Test1",
                "fields": [
                    { "name": "foo", "offset": 0, "type": "uint8" },
                    { "name": "bar", "offset": 1, "type": "int16" },
                    {
                        "name": "bits",
                        "offset": 3,
                        "type": "bitfield.uint8",
                        "bit_fields": [{ "name": "flag1" }, { "name": "not_a_flag", "size": 2 }],
                    },
                ],
            }
        ]));

        let expected = r#"package example

import (
	"encoding/binary"
	"errors"
	"fmt"
	"io"
)

type Test1 struct {
	Foo uint8
	Bar int16
	Flag1 uint8
	Not_a_flag uint8
}

func ParseTest1(input io.Reader) (*Test1, error) {
	var output Test1
	var err error

	// Reading into field "foo"
	err = binary.Read(input, binary.LittleEndian, &output.Foo)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'foo' of structure 'Test1': %s", err))
	}

	// Reading into field "bar"
	err = binary.Read(input, binary.LittleEndian, &output.Bar)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'bar' of structure 'Test1': %s", err))
	}

	// Reading into field "bits"
	var temp0 uint8
	err = binary.Read(input, binary.LittleEndian, &temp0)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'bits' of structure 'Test1': %s", err))
	}

	// Bit field "flag1": offset 0, size 1
	output.Flag1 = (temp0 >> 0) & 0x1
	// Bit field "not_a_flag": offset 1, size 2
	output.Not_a_flag = (temp0 >> 1) & 0x3

	// Total size of structure: 4 bytes
	return &output, nil
}
"#;
        assert_eq!(code, expected);
    }

    #[test]
    fn generates_slack_reads() {
        let code = generate_json(json!([
            {
                "name": "Gap",
                "fields": [
                    { "name": "a", "offset": 0, "type": "uint8" },
                    { "name": "b", "offset": 3, "type": "uint8" },
                ],
            }
        ]));

        let expected_body = r#"func ParseGap(input io.Reader) (*Gap, error) {
	var output Gap
	var err error

	// Reading into field "a"
	err = binary.Read(input, binary.LittleEndian, &output.A)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'a' of structure 'Gap': %s", err))
	}

	// Reading 2 byte(s) of slack between "a" and "b"
	var temp0 [2]byte
	err = binary.Read(input, binary.LittleEndian, &temp0)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'b' of structure 'Gap': %s", err))
	}

	// Reading into field "b"
	err = binary.Read(input, binary.LittleEndian, &output.B)
	if err != nil {
		return nil, errors.New(fmt.Sprintf("Error reading field 'b' of structure 'Gap': %s", err))
	}

	// Total size of structure: 4 bytes
	return &output, nil
}
"#;
        assert!(code.ends_with(expected_body), "unexpected output:\n{code}");
    }

    #[test]
    fn decodes_in_offset_order_but_declares_in_schema_order() {
        let code = generate_json(json!([
            {
                "name": "Shuffled",
                "fields": [
                    { "name": "late", "offset": 4, "type": "uint8" },
                    { "name": "early", "offset": 0, "type": "uint32" },
                ],
            }
        ]));

        // Declaration order in the struct.
        let late_member = code.find("Late uint8").unwrap();
        let early_member = code.find("Early uint32").unwrap();
        assert!(late_member < early_member);

        // Offset order in the parse function.
        let early_read = code.find("&output.Early").unwrap();
        let late_read = code.find("&output.Late").unwrap();
        assert!(early_read < late_read);
    }

    #[test]
    fn honors_field_endianness_overrides() {
        let code = generate_json(json!([
            {
                "name": "Mixed",
                "endian": "big",
                "fields": [
                    { "name": "a", "offset": 0, "type": "uint16" },
                    { "name": "b", "offset": 2, "type": "uint16", "endian": "little" },
                ],
            }
        ]));
        assert!(code.contains("err = binary.Read(input, binary.BigEndian, &output.A)"));
        assert!(code.contains("err = binary.Read(input, binary.LittleEndian, &output.B)"));
    }

    #[test]
    fn reads_pointer_sized_fields_through_sized_temporaries() {
        let code = generate_json(json!([
            {
                "name": "Ptrs",
                "fields": [{ "name": "ptr", "offset": 0, "type": "uintptr" }],
            }
        ]));
        assert!(code.contains("Ptr uintptr"));
        assert!(code.contains("var temp0 uint64"));
        assert!(code.contains("output.Ptr = uintptr(temp0)"));
    }

    #[test]
    fn extracts_signed_bitfields_through_unsigned_pattern() {
        let code = generate_json(json!([
            {
                "name": "Signed",
                "fields": [{
                    "name": "bits",
                    "offset": 0,
                    "type": "bitfield.int8",
                    "bit_fields": [{ "name": "low", "size": 4 }, { "name": "high", "size": 4 }],
                }],
            }
        ]));
        assert!(code.contains("output.Low = int8((uint8(temp0) >> 0) & 0xF)"));
        assert!(code.contains("output.High = int8((uint8(temp0) >> 4) & 0xF)"));
    }

    #[test]
    fn generates_array_members() {
        let code = generate_json(json!([
            {
                "name": "Arr",
                "fields": [{ "name": "values", "offset": 0, "type": "uint16[2]" }],
            }
        ]));
        assert!(code.contains("Values [2]uint16"));
        assert!(code.contains("err = binary.Read(input, binary.LittleEndian, &output.Values)"));
        assert!(code.contains("// Total size of structure: 4 bytes"));
    }

    #[test]
    fn output_is_deterministic() {
        let schema = json!([
            {
                "name": "Test1",
                "fields": [
                    { "name": "foo", "offset": 0, "type": "uint8" },
                    { "name": "bar", "offset": 1, "type": "int16" },
                ],
            }
        ]);
        assert_eq!(generate_json(schema.clone()), generate_json(schema));
    }
}
