//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Classification of GStreamer bus messages and the reaction to each kind.

use gst::prelude::*;
use gst::MessageView;
#[allow(unused_imports)]
use tracing::{error, warn, info, debug, trace};

/// The parts of a bus message that the handler reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusEvent {
    EndOfStream,
    Warning { source: String, error: String, debug: Option<String> },
    Error { source: String, error: String, debug: Option<String> },
    /// Element specific message with its structure serialized.
    Element { source: String, details: String },
    /// Posted for property changes after a deep notify watch has been added.
    PropertyNotify { source: String, details: String },
    Other,
}

/// Why the event loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    EndOfStream,
    Error { source: String, message: String },
    Interrupted,
}

impl Termination {
    pub fn exit_code(&self) -> u8 {
        match self {
            Termination::EndOfStream => 0,
            Termination::Error { .. } => 1,
            Termination::Interrupted => 130,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BusAction {
    Continue,
    Quit(Termination),
}

fn source_name(msg: &gst::Message) -> String {
    msg.src()
        .map(|src| src.name().to_string())
        .unwrap_or_else(|| "unknown".to_owned())
}

fn structure_string(msg: &gst::Message) -> String {
    msg.structure()
        .map(|s| s.to_string())
        .unwrap_or_default()
}

impl From<&gst::Message> for BusEvent {
    fn from(msg: &gst::Message) -> Self {
        match msg.view() {
            MessageView::Eos(..) => BusEvent::EndOfStream,
            MessageView::Warning(w) => BusEvent::Warning {
                source: source_name(msg),
                error: w.error().to_string(),
                debug: w.debug().map(|d| d.to_string()),
            },
            MessageView::Error(err) => BusEvent::Error {
                source: source_name(msg),
                error: err.error().to_string(),
                debug: err.debug().map(|d| d.to_string()),
            },
            MessageView::Element(..) => BusEvent::Element {
                source: source_name(msg),
                details: structure_string(msg),
            },
            MessageView::PropertyNotify(notify) => {
                let (object, property_name, value) = notify.get();
                let value = value
                    .map(|v| v.serialize().map(|s| s.to_string()).unwrap_or_else(|_| format!("{:?}", v)))
                    .unwrap_or_default();
                BusEvent::PropertyNotify {
                    source: object.name().to_string(),
                    details: format!("{} = {}", property_name, value),
                }
            }
            _ => BusEvent::Other,
        }
    }
}

/// Logs the event and decides whether the event loop should keep running.
pub fn handle_bus_event(event: &BusEvent) -> BusAction {
    match event {
        BusEvent::EndOfStream => {
            info!("End-of-stream");
            BusAction::Quit(Termination::EndOfStream)
        }
        BusEvent::Warning { source, error, debug: debug_info } => {
            warn!("{}: {}: {}", source, error, debug_info.as_deref().unwrap_or_default());
            BusAction::Continue
        }
        BusEvent::Error { source, error, debug: debug_info } => {
            error!("{}: {}: {}", source, error, debug_info.as_deref().unwrap_or_default());
            BusAction::Quit(Termination::Error {
                source: source.clone(),
                message: error.clone(),
            })
        }
        BusEvent::Element { source, details } => {
            info!("{}: {}", source, details);
            BusAction::Continue
        }
        BusEvent::PropertyNotify { source, details } => {
            debug!("{}: {}", source, details);
            BusAction::Continue
        }
        BusEvent::Other => BusAction::Continue,
    }
}
