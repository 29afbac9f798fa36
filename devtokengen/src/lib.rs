//! `devtokengen`: fake device tokens for loading a push backend.
//!
//! [`DevtokenGenerator`] yields distinct, sequential tokens; [`Template`]
//! turns each one into an output line such as a subscribe command.

pub mod template;
pub mod token;

pub use template::{render, Template, TemplateError};
pub use token::{DevtokenGenerator, DEFAULT_TOKEN_LEN};
