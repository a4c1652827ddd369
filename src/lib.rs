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

//! Schema analyzer and decoder generator for fixed binary structure
//! layouts.

pub mod analyzer;
pub mod ast;
pub mod backends;
pub mod parser;

#[cfg(test)]
mod test {
    use super::*;
    use crate::backends::{GenOptions, NamingStrategy};
    use serde_json::json;

    #[test]
    fn generated_output_is_deterministic() {
        // The generated code should be deterministic, to avoid
        // unnecessary rebuilds during incremental builds.
        let schema = json!([
            {
                "name": "Header",
                "endian": "big",
                "fields": [
                    { "name": "magic", "offset": 0, "type": "uint32" },
                    { "name": "count", "offset": 6, "type": "uint16", "endian": "little" },
                    { "name": "table", "offset": 8, "type": "uint64[2]" },
                    {
                        "name": "flags",
                        "offset": 24,
                        "type": "bitfield.uint8",
                        "bit_fields": [
                            { "name": "compressed" },
                            { "name": "version", "size": 3 },
                        ],
                    },
                ],
            }
        ]);

        let options = GenOptions {
            package: "header".to_owned(),
            naming: NamingStrategy::CapitalizeFirst,
            pointer_width: ast::PointerWidth::P64,
        };

        let file1 = parser::parse_schema(&schema).unwrap();
        let file2 = parser::parse_schema(&schema).unwrap();
        let file3 = parser::parse_schema(&schema).unwrap();
        assert_eq!(file1, file2);
        assert_eq!(file2, file3);

        let layout1 = analyzer::analyze(&file1, ast::PointerWidth::P64).unwrap();
        let layout2 = analyzer::analyze(&file2, ast::PointerWidth::P64).unwrap();
        let layout3 = analyzer::analyze(&file3, ast::PointerWidth::P64).unwrap();

        let go1 = backends::go::generate(&file1, &layout1, &options);
        let go2 = backends::go::generate(&file2, &layout2, &options);
        let go3 = backends::go::generate(&file3, &layout3, &options);
        assert_eq!(go1, go2);
        assert_eq!(go2, go3);

        let rust1 = backends::rust::generate(&file1, &layout1, &options);
        let rust2 = backends::rust::generate(&file2, &layout2, &options);
        let rust3 = backends::rust::generate(&file3, &layout3, &options);
        assert_eq!(rust1, rust2);
        assert_eq!(rust2, rust3);
    }
}
