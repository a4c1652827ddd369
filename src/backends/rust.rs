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

//! Rust compiler backend.
//!
//! Emits one `pub struct` per structure (declaration order) and one
//! `pub fn parse_<name>(input: &mut impl Read)` per structure
//! (ascending offset order), together with a `DecodeError` preamble.
//! Reads go through `read_exact` into fixed byte buffers decoded with
//! `from_le_bytes`/`from_be_bytes`.

use crate::backends::{GenOptions, TempAllocator};
use crate::{analyzer, ast};
use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Ident, Literal, TokenStream};
use quote::{format_ident, quote};

pub trait ToIdent {
    /// Generate a sanitized rust identifier.
    /// Rust specific keywords are renamed for validity.
    fn to_ident(self) -> Ident;
}

impl ToIdent for &'_ str {
    fn to_ident(self) -> Ident {
        match self {
            "as" | "break" | "const" | "continue" | "crate" | "else" | "enum" | "extern"
            | "false" | "fn" | "for" | "if" | "impl" | "in" | "let" | "loop" | "match" | "mod"
            | "move" | "mut" | "pub" | "ref" | "return" | "self" | "Self" | "static" | "struct"
            | "super" | "trait" | "true" | "type" | "unsafe" | "use" | "where" | "while"
            | "async" | "await" | "dyn" | "abstract" | "become" | "box" | "do" | "final"
            | "macro" | "override" | "priv" | "typeof" | "unsized" | "virtual" | "yield"
            | "try" => format_ident!("r#{}", self),
            _ => format_ident!("{}", self),
        }
    }
}

/// Rust primitive backing a storage kind.
fn rust_type(storage: ast::StorageType) -> Ident {
    match storage {
        ast::StorageType::Int8 => format_ident!("i8"),
        ast::StorageType::Uint8 => format_ident!("u8"),
        ast::StorageType::Int16 => format_ident!("i16"),
        ast::StorageType::Uint16 => format_ident!("u16"),
        ast::StorageType::Int32 => format_ident!("i32"),
        ast::StorageType::Uint32 => format_ident!("u32"),
        ast::StorageType::Int64 => format_ident!("i64"),
        ast::StorageType::Uint64 => format_ident!("u64"),
        ast::StorageType::Uintptr => format_ident!("usize"),
    }
}

/// Rust primitive a storage kind is read as: the sized unsigned type
/// of the pointer width for `uintptr`, the kind itself otherwise.
fn rust_read_type(storage: ast::StorageType, pointer_width: ast::PointerWidth) -> Ident {
    if storage.is_pointer_sized() {
        rust_type(storage.unsigned(pointer_width))
    } else {
        rust_type(storage)
    }
}

fn from_bytes(endianness: ast::EndiannessValue) -> Ident {
    match endianness {
        ast::EndiannessValue::LittleEndian => format_ident!("from_le_bytes"),
        ast::EndiannessValue::BigEndian => format_ident!("from_be_bytes"),
    }
}

fn mask_literal(mask: u64) -> syn::LitInt {
    syn::parse_str::<syn::LitInt>(&format!("{:#x}", mask)).unwrap()
}

/// Zero literal of the given primitive type, for array initializers.
fn zero_literal(ty: &Ident) -> syn::LitInt {
    syn::parse_str::<syn::LitInt>(&format!("0{}", ty)).unwrap()
}

/// Map a read failure to a `DecodeError` naming the failing field and
/// structure.
fn decode_error(structure: &ast::Structure, field: &ast::Field) -> TokenStream {
    let structure = &structure.id;
    let field = &field.id;
    quote! {
        .map_err(|err| DecodeError { structure: #structure, field: #field, source: err })?
    }
}

/// Read `width` bytes from the input into a fresh byte buffer and
/// return its identifier.
fn read_bytes(
    width: usize,
    structure: &ast::Structure,
    field: &ast::Field,
    temps: &mut TempAllocator,
    statements: &mut Vec<TokenStream>,
) -> Ident {
    let temp = format_ident!("{}", temps.allocate());
    let width = Literal::usize_unsuffixed(width);
    let error = decode_error(structure, field);
    statements.push(quote! {
        let mut #temp = [0u8; #width];
        input.read_exact(&mut #temp) #error;
    });
    temp
}

fn generate_field_parser(
    structure: &ast::Structure,
    layout: &analyzer::FieldLayout,
    options: &GenOptions,
    temps: &mut TempAllocator,
    statements: &mut Vec<TokenStream>,
) {
    let field = &structure.fields[layout.field];
    let endianness = field.resolved_endianness(structure);
    let from_bytes = from_bytes(endianness);
    let element_width = layout.storage.byte_width(options.pointer_width);

    if layout.slack > 0 {
        // Consume and discard the bytes between the previous field's
        // end and this field's offset.
        read_bytes(layout.slack, structure, field, temps, statements);
    }

    match &field.desc {
        ast::FieldDesc::Scalar { .. } => {
            let member = field.id.as_str().to_ident();
            let buffer = read_bytes(element_width, structure, field, temps, statements);
            let read_type = rust_read_type(layout.storage, options.pointer_width);
            if layout.storage.is_pointer_sized() {
                statements.push(quote! {
                    let #member = #read_type::#from_bytes(#buffer) as usize;
                });
            } else {
                statements.push(quote! {
                    let #member = #read_type::#from_bytes(#buffer);
                });
            }
        }
        ast::FieldDesc::Array { count, .. } => {
            let member = field.id.as_str().to_ident();
            let member_type = rust_type(layout.storage);
            let read_type = rust_read_type(layout.storage, options.pointer_width);
            let zero = zero_literal(&member_type);
            let count = Literal::usize_unsuffixed(*count);
            let buffer = format_ident!("{}", temps.allocate());
            let width = Literal::usize_unsuffixed(element_width);
            let error = decode_error(structure, field);
            let element = if layout.storage.is_pointer_sized() {
                quote! { #read_type::#from_bytes(#buffer) as usize }
            } else {
                quote! { #read_type::#from_bytes(#buffer) }
            };
            statements.push(quote! {
                let mut #member = [#zero; #count];
                for element in #member.iter_mut() {
                    let mut #buffer = [0u8; #width];
                    input.read_exact(&mut #buffer) #error;
                    *element = #element;
                }
            });
        }
        ast::FieldDesc::Bitfield { fields, .. } => {
            let buffer = read_bytes(element_width, structure, field, temps, statements);
            let raw = format_ident!("{}", temps.allocate());
            let storage_type = rust_type(layout.storage);
            statements.push(quote! {
                let #raw = #storage_type::#from_bytes(#buffer);
            });
            for (sub, slice) in fields.iter().zip(analyzer::bitfield_slices(fields)) {
                let member = sub.id.as_str().to_ident();
                let bit_offset = Literal::usize_unsuffixed(slice.bit_offset);
                let mask = mask_literal(slice.mask);
                // Extraction is always unsigned; signed storage is
                // shifted as its unsigned counterpart so no sign bits
                // leak into the mask.
                if layout.storage.is_signed() {
                    let unsigned =
                        rust_type(layout.storage.unsigned(options.pointer_width));
                    statements.push(quote! {
                        let #member =
                            (((#raw as #unsigned) >> #bit_offset) & #mask) as #storage_type;
                    });
                } else {
                    statements.push(quote! {
                        let #member = (#raw >> #bit_offset) & #mask;
                    });
                }
            }
        }
    }
}

fn generate_structure(
    structure: &ast::Structure,
    plan: &analyzer::StructLayout,
    options: &GenOptions,
) -> TokenStream {
    let type_id = format_ident!("{}", structure.id.to_upper_camel_case());

    // Member declarations follow schema declaration order; a bitfield
    // contributes one member per sub-field.
    let mut members = Vec::new();
    let mut initializers = Vec::new();
    for field in &structure.fields {
        match &field.desc {
            ast::FieldDesc::Scalar { .. } => {
                let member = field.id.as_str().to_ident();
                let storage = ast::StorageType::from_name(field.storage_type_id())
                    .expect("schema was validated");
                let member_type = rust_type(storage);
                members.push(quote! { pub #member: #member_type });
                initializers.push(member);
            }
            ast::FieldDesc::Array { count, .. } => {
                let member = field.id.as_str().to_ident();
                let storage = ast::StorageType::from_name(field.storage_type_id())
                    .expect("schema was validated");
                let member_type = rust_type(storage);
                let count = Literal::usize_unsuffixed(*count);
                members.push(quote! { pub #member: [#member_type; #count] });
                initializers.push(member);
            }
            ast::FieldDesc::Bitfield { fields, .. } => {
                let storage = ast::StorageType::from_name(field.storage_type_id())
                    .expect("schema was validated");
                let member_type = rust_type(storage);
                for sub in fields {
                    let member = sub.id.as_str().to_ident();
                    members.push(quote! { pub #member: #member_type });
                    initializers.push(member);
                }
            }
        }
    }

    // Decode statements follow physical offset order.
    let mut temps = TempAllocator::new();
    let mut statements = Vec::new();
    for layout in &plan.fields {
        generate_field_parser(structure, layout, options, &mut temps, &mut statements);
    }

    let parse_id = format_ident!("parse_{}", structure.id.to_snake_case());
    let size_doc = format!(" Total size of structure: {} bytes.", plan.total_size);

    quote! {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct #type_id {
            #(#members,)*
        }

        #[doc = #size_doc]
        pub fn #parse_id(input: &mut impl Read) -> Result<#type_id, DecodeError> {
            #(#statements)*
            Ok(#type_id { #(#initializers,)* })
        }
    }
}

/// Generate the file preamble: the import set and the error type
/// shared by every decode procedure.
fn preamble(options: &GenOptions) -> TokenStream {
    let module_doc_string = format!(" @generated decoders for package {}.", options.package);
    quote! {
        #![doc = #module_doc_string]

        use std::io::Read;

        #[derive(Debug)]
        pub struct DecodeError {
            pub structure: &'static str,
            pub field: &'static str,
            pub source: std::io::Error,
        }

        impl std::fmt::Display for DecodeError {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(
                    f,
                    "Error reading field '{}' of structure '{}': {}",
                    self.field, self.structure, self.source
                )
            }
        }

        impl std::error::Error for DecodeError {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.source)
            }
        }
    }
}

/// Generate Rust code for the schema.
///
/// The code is not formatted, pipe it through `rustfmt` to get
/// readable source code.
pub fn generate_tokens(
    file: &ast::File,
    layout: &analyzer::Layout,
    options: &GenOptions,
) -> TokenStream {
    let preamble = preamble(options);
    let decls = file
        .structures
        .iter()
        .zip(&layout.structures)
        .map(|(structure, plan)| generate_structure(structure, plan, options));
    quote! {
        #preamble

        #(#decls)*
    }
}

/// Generate formatted Rust code for the schema.
pub fn generate(file: &ast::File, layout: &analyzer::Layout, options: &GenOptions) -> String {
    let syntax_tree =
        syn::parse2(generate_tokens(file, layout, options)).expect("Could not parse code");
    prettyplease::unparse(&syntax_tree)
}
