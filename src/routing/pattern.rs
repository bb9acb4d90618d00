//! URL pattern: match, build and page dispatch for one registry entry

use regex::Regex;
use reqwest::Method;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::template::{normalize, Template};
use crate::http::Response;
use crate::page::{Page, PageBinding, PageContext, PagePredicate};
use crate::session::Session;
use crate::{Error, Result};

/// Named parameters captured from a URL
pub type Params = BTreeMap<String, String>;

#[derive(Clone)]
struct Matcher {
    regex: Regex,
    /// Relative template compiled without a base: matched against path and query
    path_only: bool,
}

/// One or more URL regexes, optionally bound to a page type
///
/// Relative templates are resolved against the base URL the pattern is bound
/// to (see [`UrlPattern::bind_base`]). Matching is anchored at the start only,
/// so `https://bank.example/news` matches the template `https://bank.example/`.
#[derive(Clone)]
pub struct UrlPattern {
    templates: Vec<String>,
    base: Option<String>,
    matchers: Vec<Matcher>,
    normalized: Vec<Template>,
    binding: Option<PageBinding>,
    predicate: Option<PagePredicate>,
}

impl UrlPattern {
    /// Compile a pattern from its regex templates
    pub fn new<I, S>(templates: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let templates: Vec<String> = templates.into_iter().map(Into::into).collect();
        if templates.is_empty() {
            return Err(Error::configuration("URL pattern needs at least one template"));
        }

        let matchers = compile_all(&templates, None)?;
        let normalized = templates.iter().flat_map(|t| normalize(t)).collect();

        Ok(Self {
            templates,
            base: None,
            matchers,
            normalized,
            binding: None,
            predicate: None,
        })
    }

    /// Bind a page type, constructed for every response this pattern matches
    pub fn with_page<P, F>(mut self, factory: F) -> Self
    where
        P: Page,
        F: Fn(PageContext) -> Result<P> + Send + Sync + 'static,
    {
        self.binding = Some(PageBinding::new(factory));
        self
    }

    /// Only accept constructed pages for which `predicate` holds
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Page) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// A copy of this pattern with relative templates resolved against `base`
    pub fn bind_base(&self, base: Option<&str>) -> Result<Self> {
        Ok(Self {
            base: base.map(str::to_string),
            matchers: compile_all(&self.templates, base)?,
            ..self.clone()
        })
    }

    pub fn templates(&self) -> &[String] {
        &self.templates
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    /// Name of the bound page type, if any
    pub fn page_type(&self) -> Option<&'static str> {
        self.binding.as_ref().map(|b| b.type_name())
    }

    /// Match `url` against each template in turn
    pub fn match_url(&self, url: &str) -> Option<Params> {
        self.matchers.iter().find_map(|m| m.captures(url))
    }

    /// Match `url` with relative templates resolved against `base` instead of
    /// the bound one
    pub fn match_with_base(&self, url: &str, base: &str) -> Result<Option<Params>> {
        let matchers = compile_all(&self.templates, Some(base))?;
        Ok(matchers.iter().find_map(|m| m.captures(url)))
    }

    /// Build a URL from the first template whose placeholders are exactly the
    /// given keys
    pub fn build(&self, params: &[(&str, &str)]) -> Result<String> {
        let keys: BTreeSet<&str> = params.iter().map(|(k, _)| *k).collect();
        let values: BTreeMap<&str, &str> = params.iter().copied().collect();

        match self.normalized.iter().find(|t| t.accepts(&keys)) {
            Some(template) => Ok(join_base(self.base.as_deref(), &template.render(&values))),
            None => {
                let available: Vec<String> = self.normalized.iter().map(|t| t.to_string()).collect();
                Err(Error::url_not_resolvable(format!(
                    "Unable to resolve URL with {:?}. Available are {}",
                    keys,
                    available.join(", ")
                )))
            }
        }
    }

    /// [`build`](Self::build), then append query string parameters
    pub fn build_with_query(&self, params: &[(&str, &str)], query: &[(&str, &str)]) -> Result<String> {
        let built = self.build(params)?;
        append_query(&built, query)
    }

    /// Construct the bound page for `response` if it belongs here
    ///
    /// Returns `None` without a binding, for HEAD responses, when no template
    /// matches, when the page's own `is_here` check fails or when the
    /// registered predicate rejects it.
    pub fn handle(
        &self,
        name: &str,
        response: &Arc<Response>,
        session: &Arc<Session>,
    ) -> Result<Option<Arc<dyn Page>>> {
        let binding = match &self.binding {
            Some(binding) => binding,
            None => return Ok(None),
        };
        if response.method == Method::HEAD {
            return Ok(None);
        }
        let params = match self.match_url(&response.url) {
            Some(params) => params,
            None => return Ok(None),
        };

        let page = binding.construct(PageContext {
            name: name.to_string(),
            url: response.url.clone(),
            params,
            response: response.clone(),
            session: session.clone(),
        })?;

        if !page.is_here() {
            debug!("{} matched {} but its is_here check failed", response.url, binding.type_name());
            return Ok(None);
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(page.as_ref()) {
                debug!("{} matched {} but the predicate rejected it", response.url, binding.type_name());
                return Ok(None);
            }
        }
        Ok(Some(page))
    }

    /// Accept either an id (built with the `id` placeholder) or an absolute
    /// URL; a URL this pattern does not match yields `None`
    pub fn id_to_url(&self, id_or_url: &str) -> Result<Option<String>> {
        if id_or_url.starts_with("http://") || id_or_url.starts_with("https://") {
            return Ok(self.match_url(id_or_url).map(|_| id_or_url.to_string()));
        }
        self.build(&[("id", id_or_url)]).map(Some)
    }
}

impl fmt::Debug for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlPattern")
            .field("templates", &self.templates)
            .field("base", &self.base)
            .field("page", &self.page_type())
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Matcher {
    fn captures(&self, url: &str) -> Option<Params> {
        let target = if self.path_only { path_and_query(url) } else { url };
        let caps = self.regex.captures(target)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
                .collect(),
        )
    }
}

/// True for templates starting with a scheme, e.g. `https://`
pub(crate) fn is_absolute(template: &str) -> bool {
    match template.find("://") {
        Some(idx) if idx > 0 => template[..idx]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

fn compile_all(templates: &[String], base: Option<&str>) -> Result<Vec<Matcher>> {
    templates.iter().map(|t| compile(t, base)).collect()
}

fn compile(template: &str, base: Option<&str>) -> Result<Matcher> {
    if is_absolute(template) {
        return Ok(Matcher {
            regex: Regex::new(&format!("^(?:{})", template))?,
            path_only: false,
        });
    }

    let relative = template.trim_start_matches('^').trim_start_matches('/');
    match base {
        Some(base) => Ok(Matcher {
            regex: Regex::new(&format!(
                "^{}/(?:{})",
                regex::escape(base.trim_end_matches('/')),
                relative
            ))?,
            path_only: false,
        }),
        None => Ok(Matcher {
            regex: Regex::new(&format!("^/(?:{})", relative))?,
            path_only: true,
        }),
    }
}

fn path_and_query(url: &str) -> &str {
    if !is_absolute(url) {
        return url;
    }
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => return url,
    };
    match after_scheme.find('/') {
        Some(idx) => {
            let rest = &after_scheme[idx..];
            rest.split('#').next().unwrap_or(rest)
        }
        None => "/",
    }
}

/// Resolve a built URL the same way relative templates are matched
fn join_base(base: Option<&str>, url: &str) -> String {
    match base {
        Some(base) if !is_absolute(url) => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            url.trim_start_matches('/')
        ),
        _ => url.to_string(),
    }
}

/// Append query parameters to an absolute or relative URL
pub(crate) fn append_query(url: &str, query: &[(&str, &str)]) -> Result<String> {
    if query.is_empty() {
        return Ok(url.to_string());
    }

    if is_absolute(url) {
        let mut parsed = url::Url::parse(url)
            .map_err(|e| Error::url_not_resolvable(format!("Invalid URL {}: {}", url, e)))?;
        parsed.query_pairs_mut().extend_pairs(query.iter());
        return Ok(parsed.to_string());
    }

    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter())
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{}{}{}", url, separator, encoded))
}
