//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

use std::sync::Once;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;

static TRACING_INIT: Once = Once::new();

/// Maps a Python-style numeric log level (10=DEBUG, 20=INFO, 30=WARNING, 40=ERROR) to a tracing level.
pub fn level_filter(log_level: u8) -> LevelFilter {
    match log_level {
        0..=9 => LevelFilter::TRACE,
        10 => LevelFilter::DEBUG,
        11..=20 => LevelFilter::INFO,
        21..=30 => LevelFilter::WARN,
        _ => LevelFilter::ERROR,
    }
}

/// Initialize tracing.
/// If RUST_LOG is set, it is used as the filter. Otherwise all events at or above `log_level` are written.
/// This can be called multiple times.
pub fn init(log_level: u8) {
    TRACING_INIT.call_once(|| {
        let filter = std::env::var("RUST_LOG")
            .ok()
            .filter(|filter| !filter.is_empty())
            .unwrap_or_else(|| level_filter(log_level).to_string());
        // This will fail if there is already a global default tracing subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_span_events(FmtSpan::CLOSE)
            .try_init();
    })
}
