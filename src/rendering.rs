//! # Payload Rendering
//!
//! Given a template and a data bundle, produce the outbound body text. The engine
//! only depends on [`PayloadRenderer`]; [`HandlebarsRenderer`] is the default.

use handlebars::Handlebars;
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

use crate::composer::DataBundle;
use crate::error::{ClearanceError, Result};

pub trait PayloadRenderer: Send + Sync {
    fn render(&self, template: &str, bundle: &DataBundle) -> Result<String>;
}

/// Handlebars in non-strict mode without HTML escaping. Missing fields render
/// empty, and `${Name}` placeholders are accepted as `{{Name}}`.
pub struct HandlebarsRenderer {
    handlebars: Handlebars<'static>,
}

static DOLLAR_PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    fn normalize(template: &str) -> Cow<'_, str> {
        let pattern = DOLLAR_PLACEHOLDER
            .get_or_init(|| Regex::new(r"\$\{\s*([A-Za-z0-9_.\[\]]+)\s*\}").ok())
            .as_ref();
        match pattern {
            Some(pattern) => pattern.replace_all(template, "{{$1}}"),
            None => Cow::Borrowed(template),
        }
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PayloadRenderer for HandlebarsRenderer {
    fn render(&self, template: &str, bundle: &DataBundle) -> Result<String> {
        self.handlebars
            .render_template(&Self::normalize(template), bundle)
            .map_err(|e| ClearanceError::RenderError(e.to_string()))
    }
}
