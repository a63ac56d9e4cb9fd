//! Script construction and rendering errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Template text does not parse; reported when the script is built
    #[error("template '{name}' does not compile: {message}")]
    Compile { name: String, message: String },

    /// Rendering failed for a reason other than a missing reference
    #[error("template '{name}' failed to render: {message}")]
    Render { name: String, message: String },

    #[error("step '{step}' has invalid method '{method}'")]
    InvalidMethod { step: String, method: String },

    #[error("template '{0}' is not registered")]
    Unknown(String),
}

pub type TemplateResult<T> = Result<T, TemplateError>;
