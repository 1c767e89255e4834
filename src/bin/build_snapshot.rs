// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Build `data.json` from a CSV export of the patrol spreadsheet.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

#[derive(Parser, Debug)]
#[command(version, about = "Build the dashboard snapshot from a spreadsheet CSV export")]
struct Args {
    /// CSV export with a header row
    input: PathBuf,

    /// Snapshot to write
    #[arg(short, long, default_value = "data.json")]
    output: PathBuf,

    /// Error-flag document written when the build fails
    #[arg(long, default_value = "error.json")]
    error_output: PathBuf,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if args.verbose { "debug" } else { "info" }))
        .init();

    match patrol_core::builder::run(&args.input, &args.output, &args.error_output) {
        Ok(written) => {
            if !written {
                info!("Nothing to do");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Build failed, wrote {}: {e}", args.error_output.display());
            ExitCode::FAILURE
        }
    }
}
