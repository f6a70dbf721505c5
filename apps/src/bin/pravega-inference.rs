//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

// Read video from a Pravega stream and display it on screen.
// Example:
//   pravega-inference --pravega-scope examples --input-stream camera1

use clap::Parser;
use pravega_inference::config::{Config, Opts};
use pravega_inference::logging;
use std::process::ExitCode;
use tracing::{debug, error, info};

fn main() -> ExitCode {
    let opts: Opts = Opts::parse();
    logging::init(opts.log_level);
    info!("opts={:?}", opts);
    debug!("Debug logging enabled.");

    let config = match Config::try_from(opts) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    match pravega_inference::run(&config) {
        Ok(termination) => {
            info!("main: END; termination={:?}", termination);
            ExitCode::from(termination.exit_code())
        }
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
