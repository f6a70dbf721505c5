//
// Copyright (c) Dell Inc., or its subsidiaries. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//

//! Builds the pravegasrc to screen pipeline and applies the configuration to its source element.

use crate::config::Config;
use gst::prelude::*;
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{error, warn, info, debug, trace};

/// Name of the pravegasrc element within the pipeline.
pub const SOURCE_ELEMENT_NAME: &str = "pravegasrc";

pub const PROPERTY_NAME_CONTROLLER: &str = "controller";
pub const PROPERTY_NAME_STREAM: &str = "stream";
pub const PROPERTY_NAME_ALLOW_CREATE_SCOPE: &str = "allow-create-scope";
pub const PROPERTY_NAME_KEYCLOAK_FILE: &str = "keycloak-file";
pub const PROPERTY_NAME_START_MODE: &str = "start-mode";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to parse pipeline: {0}")]
    Parse(#[source] glib::Error),
    #[error("Missing element(s): {}", .0.join(", "))]
    MissingElements(Vec<String>),
    #[error("Pipeline description did not produce a pipeline")]
    NotAPipeline,
    #[error("Element `{0}` not found in pipeline")]
    ElementNotFound(String),
    #[error("Element `{element}` has no writable property `{property}`")]
    PropertyNotFound { element: String, property: String },
    #[error("Unable to set property `{property}` of element `{element}`: {reason}")]
    InvalidPropertyValue { element: String, property: String, reason: String },
}

/// The launch description of the pipeline.
pub fn pipeline_description() -> String {
    format!("{} name={}", SOURCE_ELEMENT_NAME, SOURCE_ELEMENT_NAME)
        + " ! decodebin"        // Demux and decode whatever the stream contains
        + " ! videoconvert"     // Convert to a color space that the sink accepts
        + " ! autovideosink"
}

/// A value to bind to an element property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertyValue {
    Str(String),
    Bool(bool),
    /// Deserialized against the type of the property, e.g. the nick of an enum value.
    Nick(String),
}

/// Settings applied to pravegasrc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSettings {
    pub controller: String,
    pub stream: String,
    pub allow_create_scope: bool,
    pub keycloak_file: Option<String>,
    pub start_mode: String,
}

impl From<&Config> for SourceSettings {
    fn from(config: &Config) -> Self {
        SourceSettings {
            controller: config.pravega_controller_uri.clone(),
            stream: config.input_stream.to_string(),
            allow_create_scope: config.allow_create_scope,
            keycloak_file: config.keycloak_service_account_file.clone(),
            start_mode: config.start_mode.nick().to_owned(),
        }
    }
}

impl SourceSettings {
    /// Property bindings in the order they are applied.
    /// The Keycloak file is only bound when one was given.
    pub fn bindings(&self) -> Vec<(&'static str, PropertyValue)> {
        let mut bindings = vec![
            (PROPERTY_NAME_CONTROLLER, PropertyValue::Str(self.controller.clone())),
            (PROPERTY_NAME_STREAM, PropertyValue::Str(self.stream.clone())),
            (PROPERTY_NAME_ALLOW_CREATE_SCOPE, PropertyValue::Bool(self.allow_create_scope)),
        ];
        if let Some(keycloak_file) = &self.keycloak_file {
            bindings.push((PROPERTY_NAME_KEYCLOAK_FILE, PropertyValue::Str(keycloak_file.clone())));
        }
        bindings.push((PROPERTY_NAME_START_MODE, PropertyValue::Nick(self.start_mode.clone())));
        bindings
    }
}

/// Creates a pipeline from launch syntax.
/// Elements that are not installed are reported by name.
pub fn launch(description: &str) -> Result<gst::Pipeline, PipelineError> {
    info!("Launch Pipeline: {}", description);
    let mut context = gst::ParseContext::new();
    let element = match gst::parse::launch_full(description, Some(&mut context), gst::ParseFlags::empty()) {
        Ok(element) => element,
        Err(err) => {
            return Err(match err.kind::<gst::ParseError>() {
                Some(gst::ParseError::NoSuchElement) => PipelineError::MissingElements(
                    context.missing_elements().into_iter().map(|name| name.to_string()).collect(),
                ),
                _ => PipelineError::Parse(err),
            });
        }
    };
    element
        .downcast::<gst::Pipeline>()
        .map_err(|_| PipelineError::NotAPipeline)
}

/// Applies `settings` to the element named `name`.
/// A missing element or property is an error because the pipeline would otherwise fail later with a less useful message.
pub fn configure_source(
    pipeline: &gst::Pipeline,
    name: &str,
    settings: &SourceSettings,
) -> Result<(), PipelineError> {
    let element = pipeline
        .by_name(name)
        .ok_or_else(|| PipelineError::ElementNotFound(name.to_owned()))?;
    for (property, value) in settings.bindings() {
        set_property(&element, property, &value)?;
    }
    Ok(())
}

fn set_property(element: &gst::Element, property: &str, value: &PropertyValue) -> Result<(), PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidPropertyValue {
        element: element.name().to_string(),
        property: property.to_owned(),
        reason,
    };
    let pspec = element
        .find_property(property)
        .filter(|pspec| pspec.flags().contains(glib::ParamFlags::WRITABLE))
        .ok_or_else(|| PipelineError::PropertyNotFound {
            element: element.name().to_string(),
            property: property.to_owned(),
        })?;
    let value = match value {
        PropertyValue::Str(s) => s.to_value(),
        PropertyValue::Bool(b) => b.to_value(),
        PropertyValue::Nick(s) if pspec.value_type() == glib::Type::STRING => s.to_value(),
        PropertyValue::Nick(s) => glib::Value::deserialize(s, pspec.value_type())
            .map_err(|err| invalid(format!("'{}' is not a valid {}: {}", s, pspec.value_type(), err)))?,
    };
    if !value.type_().is_a(pspec.value_type()) {
        return Err(invalid(format!("expected {}, got {}", pspec.value_type(), value.type_())));
    }
    debug!("Setting {}.{}={:?}", element.name(), property, value);
    element.set_property_from_value(property, &value);
    Ok(())
}

/// Creates the pipeline and configures pravegasrc.
pub fn build_pipeline(config: &Config) -> Result<gst::Pipeline, PipelineError> {
    let description = pipeline_description();
    info!("Creating pipeline:\n{}", description.replace(" ! ", "\n   ! "));
    let pipeline = launch(&description)?;
    configure_source(&pipeline, SOURCE_ELEMENT_NAME, &SourceSettings::from(config))?;
    Ok(pipeline)
}
