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

//! Schema analyzer and decoder generator.

use argh::FromArgs;
use std::path::Path;

use layout_compiler::ast::PointerWidth;
use layout_compiler::backends::{self, GenOptions, NamingStrategy};
use layout_compiler::{analyzer, parser};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Json,
    Go,
    Rust,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "go" => Ok(Self::Go),
            "rust" => Ok(Self::Rust),
            _ => Err(format!(
                "could not parse {input:?}, valid options are 'json', 'go', 'rust'."
            )),
        }
    }
}

#[derive(FromArgs, Debug)]
/// Schema analyzer and decoder generator.
struct Opt {
    #[argh(switch)]
    /// print tool version and exit.
    version: bool,

    #[argh(option, default = "OutputFormat::Go")]
    /// generate output in this format ("go", "rust", "json").
    /// The output will be printed on stdout in all cases.
    /// The input file is the source schema file.
    output_format: OutputFormat,

    #[argh(option)]
    /// package name for the generated source.
    /// Defaults to the input file stem.
    package_name: Option<String>,

    #[argh(option, default = "PointerWidth::P64")]
    /// byte width of the pointer-sized storage kind ("4" or "8").
    pointer_width: PointerWidth,

    #[argh(option, default = "NamingStrategy::CapitalizeFirst")]
    /// naming transform for exported identifiers
    /// ("capitalize", "camel").
    naming: NamingStrategy,

    #[argh(positional)]
    /// input schema file.
    input_file: Option<String>,
}

/// Derive the generated package name from the schema file name:
/// everything before the first `.` of the base name.
fn package_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.split('.').next())
        .unwrap_or("generated")
        .to_owned()
}

fn generate(opt: &Opt, input_file: &str) -> Result<(), String> {
    let text = std::fs::read_to_string(input_file)
        .map_err(|err| format!("Could not read {input_file}: {err}"))?;
    let tree: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| format!("Could not parse {input_file}: {err}"))?;

    let file = parser::parse_schema(&tree).map_err(|err| err.to_string())?;
    let layout = analyzer::analyze(&file, opt.pointer_width).map_err(|err| err.to_string())?;

    let options = GenOptions {
        package: opt.package_name.clone().unwrap_or_else(|| package_name(input_file)),
        naming: opt.naming,
        pointer_width: opt.pointer_width,
    };

    match opt.output_format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&file).map_err(|err| err.to_string())?;
            println!("{}", json);
        }
        OutputFormat::Go => println!("{}", backends::go::generate(&file, &layout, &options)),
        OutputFormat::Rust => println!("{}", backends::rust::generate(&file, &layout, &options)),
    }
    Ok(())
}

fn main() -> Result<(), String> {
    let opt: Opt = argh::from_env();

    if opt.version {
        println!("layoutc {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let Some(input_file) = opt.input_file.as_ref() else {
        return Err("No input file is specified".to_owned());
    };

    generate(&opt, input_file)
}
