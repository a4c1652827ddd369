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

//! Code generation backends.
//!
//! Each backend consumes the validated schema model together with the
//! planned layout and emits source text for one target language.
//! Emission is a pure function of its inputs: identical input always
//! produces byte-identical output.

pub mod go;
pub mod rust;

pub use heck::ToUpperCamelCase;

use crate::ast;

/// Identifier transform applied to exported member and type names in
/// the generated code. The transform is injectable because exported
/// visibility rules differ between target languages.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Capitalize the first letter, leave the rest untouched:
    /// `not_a_flag` becomes `Not_a_flag`.
    CapitalizeFirst,
    /// Upper camel case: `not_a_flag` becomes `NotAFlag`.
    UpperCamel,
}

impl NamingStrategy {
    pub fn apply(&self, id: &str) -> String {
        match self {
            NamingStrategy::CapitalizeFirst => {
                let mut chars = id.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                }
            }
            NamingStrategy::UpperCamel => id.to_upper_camel_case(),
        }
    }
}

impl std::str::FromStr for NamingStrategy {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "capitalize" => Ok(NamingStrategy::CapitalizeFirst),
            "camel" => Ok(NamingStrategy::UpperCamel),
            _ => Err(format!(
                "could not parse {input:?}, valid options are 'capitalize', 'camel'."
            )),
        }
    }
}

/// Options threaded through code emission.
#[derive(Debug, Clone)]
pub struct GenOptions {
    /// Module or package name for the generated source.
    pub package: String,
    /// Naming transform for exported identifiers.
    pub naming: NamingStrategy,
    /// Byte width of the pointer-sized storage kind.
    pub pointer_width: ast::PointerWidth,
}

/// Allocator for temporary identifiers, scoped to a single
/// structure's emission so names never collide within a decode
/// procedure. Each structure owns its own counter.
#[derive(Debug, Default)]
pub struct TempAllocator {
    next: usize,
}

impl TempAllocator {
    pub fn new() -> TempAllocator {
        TempAllocator::default()
    }

    pub fn allocate(&mut self) -> String {
        let temp = format!("temp{}", self.next);
        self.next += 1;
        temp
    }
}
