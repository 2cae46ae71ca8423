//! Selector capability: querying a response body with selector expressions
//!
//! The pipeline treats expressions as opaque strings. The bundled
//! [`CssSelector`] understands CSS selector lists with an optional suffix:
//!
//! - `h1.title` - full text content of each matched element
//! - `div.lead::text` - only the element's own text nodes
//! - `a.item::attr(href)` - the value of an attribute

use crate::{ConfigError, ConfigResult};
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::sync::Arc;

/// Parses response bodies into queryable pages
pub trait Selector: Send + Sync {
    /// Parses `body` once so it can be queried repeatedly
    fn load(&self, body: &str) -> Box<dyn PageQuery>;
}

/// A parsed page that answers selector queries
pub trait PageQuery {
    /// Returns every value matched by `expr`, in document order
    fn query(&self, expr: &str) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Output {
    AllText,
    OwnText,
    Attr(String),
}

#[derive(Debug, Clone)]
struct CompiledExpr {
    selector: scraper::Selector,
    output: Output,
}

impl CompiledExpr {
    fn parse(expr: &str) -> ConfigResult<Self> {
        let invalid = |reason: String| ConfigError::InvalidSelector {
            expr: expr.to_string(),
            reason,
        };

        let (css, output) = match expr.rsplit_once("::") {
            Some((css, "text")) => (css, Output::OwnText),
            Some((css, suffix)) if suffix.starts_with("attr(") && suffix.ends_with(')') => {
                let name = suffix["attr(".len()..suffix.len() - 1].trim();
                if name.is_empty() {
                    return Err(invalid("empty attribute name".to_string()));
                }
                (css, Output::Attr(name.to_string()))
            }
            Some((_, suffix)) => {
                return Err(invalid(format!("unsupported suffix '::{}'", suffix)));
            }
            None => (expr, Output::AllText),
        };

        let css = css.trim();
        if css.is_empty() {
            return Err(invalid("empty selector".to_string()));
        }

        let selector = scraper::Selector::parse(css).map_err(|e| invalid(e.to_string()))?;
        Ok(Self { selector, output })
    }

    fn apply(&self, element: ElementRef<'_>) -> Option<String> {
        match &self.output {
            Output::AllText => Some(element.text().collect()),
            Output::OwnText => Some(
                element
                    .children()
                    .filter_map(|child| child.value().as_text().map(|t| &**t))
                    .collect(),
            ),
            Output::Attr(name) => element.value().attr(name).map(str::to_string),
        }
    }
}

/// Checks that `expr` is a valid selector expression
///
/// # Errors
///
/// Returns `ConfigError::InvalidSelector` describing the problem.
pub fn validate_expr(expr: &str) -> ConfigResult<()> {
    CompiledExpr::parse(expr).map(|_| ())
}

/// CSS-based selector with precompiled expressions
#[derive(Debug, Clone, Default)]
pub struct CssSelector {
    compiled: Arc<HashMap<String, CompiledExpr>>,
}

impl CssSelector {
    /// Creates a selector with every expression in `exprs` precompiled
    ///
    /// # Arguments
    ///
    /// * `exprs` - Expressions that will be queried (field and link selectors)
    ///
    /// # Returns
    ///
    /// * `Ok(CssSelector)` - All expressions compiled
    /// * `Err(ConfigError)` - The first invalid expression
    pub fn new<'a>(exprs: impl IntoIterator<Item = &'a str>) -> ConfigResult<Self> {
        let mut compiled = HashMap::new();
        for expr in exprs {
            if !compiled.contains_key(expr) {
                compiled.insert(expr.to_string(), CompiledExpr::parse(expr)?);
            }
        }
        Ok(Self {
            compiled: Arc::new(compiled),
        })
    }
}

impl Selector for CssSelector {
    fn load(&self, body: &str) -> Box<dyn PageQuery> {
        Box::new(CssPage {
            document: Html::parse_document(body),
            compiled: Arc::clone(&self.compiled),
        })
    }
}

struct CssPage {
    document: Html,
    compiled: Arc<HashMap<String, CompiledExpr>>,
}

impl PageQuery for CssPage {
    fn query(&self, expr: &str) -> Vec<String> {
        let owned;
        let compiled = match self.compiled.get(expr) {
            Some(compiled) => compiled,
            None => match CompiledExpr::parse(expr) {
                Ok(parsed) => {
                    owned = parsed;
                    &owned
                }
                Err(e) => {
                    tracing::debug!("Ignoring selector query: {}", e);
                    return Vec::new();
                }
            },
        };

        self.document
            .select(&compiled.selector)
            .filter_map(|element| compiled.apply(element))
            .collect()
    }
}
