//! Declarative description of the DocuGenerate API: resources, operations,
//! their input fields and when those fields are shown.

pub mod registry;
pub mod visibility;

/// The bundled DocuGenerate definition.
pub const DOCUGENERATE_DEFINITION: &str = include_str!("docugenerate.yaml");
