//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Command line options and their resolution into an immutable [Config].

use clap::{ArgAction, Parser, ValueEnum};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_PRAVEGA_CONTROLLER_URI: &str = "tcp://127.0.0.1:9090";
/// Default logging configuration for GStreamer and the Pravega plugins.
/// Valid levels are: none, ERROR, WARNING, FIXME, INFO, DEBUG, LOG, TRACE, MEMDUMP
pub const DEFAULT_GST_DEBUG: &str = "WARNING,pravegasrc:LOG,timestampcvt:LOG,pravegatc:LOG,pravegasink:DEBUG";
pub const DEFAULT_DETECTION_MODEL: &str = "../video-processing/models/yolov5/FP16/yolov5s.xml";
/// Python-style numeric level for INFO.
pub const DEFAULT_LOG_LEVEL: u8 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Stream {0} given without a scope but pravega-scope has not been provided")]
    MissingScope(String),
    #[error("input-stream must not be empty")]
    MissingInputStream,
}

/// Where pravegasrc begins reading. These are the nicks of the element's `start-mode` enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StartMode {
    NoSeek,
    Earliest,
    Latest,
    Timestamp,
}

impl StartMode {
    pub fn nick(&self) -> &'static str {
        match self {
            StartMode::NoSeek => "no-seek",
            StartMode::Earliest => "earliest",
            StartMode::Latest => "latest",
            StartMode::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.nick())
    }
}

/// Read video from a Pravega stream and display it on screen.
/// Every option can also be set with the environment variable of the same name, e.g. INPUT_STREAM.
#[derive(Parser, Clone, Debug)]
#[command(version)]
pub struct Opts {
    /// Allow pravegasrc to create the scope if it does not exist.
    #[arg(long, env = "ALLOW_CREATE_SCOPE", default_value_t = true, value_parser = parse_bool, action = ArgAction::Set)]
    pub allow_create_scope: bool,
    /// Object detection model. Not used by this pipeline.
    #[arg(long, env = "DETECTION_MODEL", default_value = DEFAULT_DETECTION_MODEL)]
    pub detection_model: PathBuf,
    /// GStreamer debug configuration, exported as GST_DEBUG.
    #[arg(long, env = "GST_DEBUG", default_value = DEFAULT_GST_DEBUG)]
    pub gst_debug: String,
    /// Pravega stream to read, as scope/stream or just stream when --pravega-scope is given.
    #[arg(long, env = "INPUT_STREAM", value_name = "SCOPE/STREAM")]
    pub input_stream: String,
    /// The filename containing the Keycloak credentials JSON. If missing, authentication will be disabled.
    #[arg(long, env = "KEYCLOAK_SERVICE_ACCOUNT_FILE")]
    pub keycloak_service_account_file: Option<String>,
    /// 10=DEBUG,20=INFO
    #[arg(long, env = "LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL)]
    pub log_level: u8,
    /// Pravega controller URI.
    #[arg(long, env = "PRAVEGA_CONTROLLER_URI", default_value = DEFAULT_PRAVEGA_CONTROLLER_URI)]
    pub pravega_controller_uri: String,
    /// Default scope for stream names given without one.
    #[arg(long, env = "PRAVEGA_SCOPE")]
    pub pravega_scope: Option<String>,
    /// Position in the stream at which reading starts.
    #[arg(long, env = "START_MODE", value_enum, default_value_t = StartMode::Earliest)]
    pub start_mode: StartMode,
}

/// Accepts the same spellings as Python's `distutils.util.strtobool`.
pub fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" | "1" => Ok(true),
        "n" | "no" | "f" | "false" | "off" | "0" => Ok(false),
        _ => Err(format!("invalid truth value '{}'", value)),
    }
}

/// A fully qualified Pravega stream name in the form scope/stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamAddress(String);

impl StreamAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scope(&self) -> &str {
        self.0.split_once('/').map(|(scope, _)| scope).unwrap_or_default()
    }

    pub fn stream(&self) -> &str {
        self.0.split_once('/').map(|(_, stream)| stream).unwrap_or(&self.0)
    }
}

impl fmt::Display for StreamAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Qualifies `stream_name` with `default_scope` unless it already contains a scope.
/// Returns `None` when no stream name was given.
pub fn resolve_stream_address(
    stream_name: Option<&str>,
    default_scope: Option<&str>,
) -> Result<Option<StreamAddress>, ConfigError> {
    let stream_name = match stream_name {
        Some(name) if !name.is_empty() => name,
        _ => return Ok(None),
    };
    if stream_name.contains('/') {
        return Ok(Some(StreamAddress(stream_name.to_owned())));
    }
    match default_scope {
        Some(scope) if !scope.is_empty() => Ok(Some(StreamAddress(format!("{}/{}", scope, stream_name)))),
        _ => Err(ConfigError::MissingScope(stream_name.to_owned())),
    }
}

/// Resolved settings. Created once at startup and then only read.
#[derive(Clone, Debug)]
pub struct Config {
    pub allow_create_scope: bool,
    pub detection_model: PathBuf,
    pub gst_debug: String,
    pub input_stream: StreamAddress,
    pub keycloak_service_account_file: Option<String>,
    pub log_level: u8,
    pub pravega_controller_uri: String,
    pub pravega_scope: Option<String>,
    pub start_mode: StartMode,
}

impl TryFrom<Opts> for Config {
    type Error = ConfigError;

    fn try_from(opts: Opts) -> Result<Self, Self::Error> {
        let input_stream = resolve_stream_address(Some(&opts.input_stream), opts.pravega_scope.as_deref())?
            .ok_or(ConfigError::MissingInputStream)?;
        Ok(Config {
            allow_create_scope: opts.allow_create_scope,
            detection_model: opts.detection_model,
            gst_debug: opts.gst_debug,
            input_stream,
            keycloak_service_account_file: opts.keycloak_service_account_file,
            log_level: opts.log_level,
            pravega_controller_uri: opts.pravega_controller_uri,
            pravega_scope: opts.pravega_scope,
            start_mode: opts.start_mode,
        })
    }
}

impl Config {
    pub fn log_arguments(&self) {
        info!("argument: allow_create_scope: {}", self.allow_create_scope);
        info!("argument: detection_model: {}", self.detection_model.display());
        info!("argument: gst_debug: {}", self.gst_debug);
        info!("argument: input_stream: {} (scope: {}, stream: {})",
            self.input_stream, self.input_stream.scope(), self.input_stream.stream());
        info!("argument: keycloak_service_account_file: {:?}", self.keycloak_service_account_file);
        info!("argument: log_level: {}", self.log_level);
        info!("argument: pravega_controller_uri: {}", self.pravega_controller_uri);
        info!("argument: pravega_scope: {:?}", self.pravega_scope);
        info!("argument: start_mode: {}", self.start_mode);
    }
}
