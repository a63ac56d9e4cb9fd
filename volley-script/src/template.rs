//! Request templating
//!
//! Templates are Handlebars in strict mode with HTML escaping disabled.
//! Every template is compiled up front so syntax errors surface before the
//! run starts. The root names each template refers to are recorded at
//! compile time; rendering substitutes [`MISSING`] for any that are absent
//! and reports them, so an unresolved reference never aborts rendering.

use crate::error::{TemplateError, TemplateResult};
use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
};
use rand::Rng;
use regex::Regex;
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Value substituted for references that could not be resolved
pub const MISSING: &str = "__missing__";

const HELPERS: [&str; 18] = [
    "random_int",
    "timestamp_ms",
    "uuid",
    "if",
    "unless",
    "each",
    "with",
    "lookup",
    "log",
    "eq",
    "ne",
    "gt",
    "gte",
    "lt",
    "lte",
    "and",
    "or",
    "not",
];

static EXPRESSION: OnceLock<Regex> = OnceLock::new();
static QUOTED: OnceLock<Regex> = OnceLock::new();

fn expression_pattern() -> &'static Regex {
    EXPRESSION.get_or_init(|| {
        Regex::new(r"\{\{\{?~?(.*?)~?\}?\}\}").expect("expression pattern is valid")
    })
}

fn quoted_pattern() -> &'static Regex {
    QUOTED.get_or_init(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("quoted pattern is valid"))
}

/// Result of rendering one template
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub text: String,
    /// Referenced names that were absent from the data
    pub missing: Vec<String>,
}

/// Compiled templates for one script
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
    references: HashMap<String, BTreeSet<String>>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true); // Error on missing variables
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.register_helper("random_int", Box::new(random_int_helper));
        handlebars.register_helper("timestamp_ms", Box::new(timestamp_ms_helper));
        handlebars.register_helper("uuid", Box::new(uuid_helper));

        Self {
            handlebars,
            references: HashMap::new(),
        }
    }

    /// Compile and store a template under `name`
    pub fn register(&mut self, name: &str, template: &str) -> TemplateResult<()> {
        self.handlebars
            .register_template_string(name, template)
            .map_err(|e| TemplateError::Compile {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        self.references
            .insert(name.to_string(), scan_references(template));
        Ok(())
    }

    /// Root names the template refers to
    pub fn references(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.references.get(name)
    }

    /// Render with `data`, an object of template variables
    pub fn render(&self, name: &str, data: &Map<String, JsonValue>) -> TemplateResult<Rendered> {
        let references = self
            .references
            .get(name)
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))?;

        let missing: Vec<String> = references
            .iter()
            .filter(|r| data.get(r.as_str()).map_or(true, JsonValue::is_null))
            .cloned()
            .collect();

        let text = if missing.is_empty() {
            self.handlebars.render(name, data)
        } else {
            let mut patched = data.clone();
            for reference in &missing {
                patched.insert(reference.clone(), JsonValue::String(MISSING.to_string()));
            }
            self.handlebars.render(name, &patched)
        }
        .map_err(|e| TemplateError::Render {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(Rendered { text, missing })
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Root variable names referenced outside `each`/`with` blocks
pub fn scan_references(template: &str) -> BTreeSet<String> {
    let mut references = BTreeSet::new();
    let mut scoped_depth = 0usize;

    for captures in expression_pattern().captures_iter(template) {
        let expression = quoted_pattern().replace_all(captures[1].trim(), " ");
        let expression = expression.replace(['(', ')'], " ");
        let mut tokens = expression.split_whitespace().peekable();

        let Some(first) = tokens.peek().copied() else {
            continue;
        };
        if first.starts_with('!') || first.starts_with('>') {
            continue;
        }
        if let Some(closing) = first.strip_prefix('/') {
            if matches!(closing, "each" | "with") {
                scoped_depth = scoped_depth.saturating_sub(1);
            }
            continue;
        }

        let opens_scope = matches!(first.trim_start_matches(['#', '^']), "each" | "with");
        let mut candidates = Vec::new();
        for (position, token) in tokens.enumerate() {
            let token = token.trim_start_matches(['#', '^']);
            let token = token.split_once('=').map_or(token, |(_, value)| value);
            if position == 0 && (HELPERS.contains(&token) || token == "else") {
                continue;
            }
            if let Some(root) = root_name(token) {
                candidates.push(root);
            }
        }

        if scoped_depth == 0 {
            references.extend(candidates);
        }
        if opens_scope {
            scoped_depth += 1;
        }
    }

    references
}

fn root_name(token: &str) -> Option<String> {
    let root = token.split(['.', '/', '[']).next()?;
    let starts_like_identifier = root
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_like_identifier || matches!(root, "this" | "true" | "false" | "null" | "else") {
        return None;
    }
    Some(root.to_string())
}

fn random_int_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let bound = |index: usize| {
        h.param(index)
            .and_then(|p| p.value().as_i64())
            .ok_or_else(|| RenderError::new("random_int expects two integer parameters"))
    };
    let (min, max) = (bound(0)?, bound(1)?);
    let value = if max <= min {
        min
    } else {
        rand::thread_rng().gen_range(min..=max)
    };
    out.write(&value.to_string())?;
    Ok(())
}

fn timestamp_ms_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&chrono::Utc::now().timestamp_millis().to_string())?;
    Ok(())
}

fn uuid_helper(
    _: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    out.write(&uuid::Uuid::new_v4().to_string())?;
    Ok(())
}
