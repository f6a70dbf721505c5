//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Read video from a Pravega stream and display it on screen.
//! All media handling is done by GStreamer and the pravegasrc plugin.

pub mod bus;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod supervisor;

use anyhow::Error;
use bus::Termination;
use config::Config;
use supervisor::{GstBusLoop, supervise};
use tracing::{info, warn};

/// Runs the pipeline described by `config` until end-of-stream, an error, or Ctrl-C.
pub fn run(config: &Config) -> Result<Termination, Error> {
    config.log_arguments();

    // Set GStreamer log level.
    std::env::set_var("GST_DEBUG", &config.gst_debug);

    gst::init()?;
    info!("{}", gst::version_string());

    let pipeline = pipeline::build_pipeline(config)?;

    let mut event_loop = GstBusLoop::for_pipeline(&pipeline)?;
    let quit_handle = event_loop.quit_handle();
    if let Err(err) = ctrlc::set_handler(move || quit_handle.interrupt()) {
        warn!("Unable to install Ctrl-C handler: {}", err);
    }

    Ok(supervise(&pipeline, &mut event_loop)?)
}
