//! Page, image and listing reads over a content store

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::markdown::{escape_html, markdown_to_html, SIMPLE_LAYOUT};
use crate::config::SiteConfig;
use crate::error::{CmsError, Result};
use crate::store::{trim_key, ContentStore};
use crate::types::{PageDetails, RawFile};

/// Layout used when the request names none
pub const DEFAULT_LAYOUT: &str = "main";

/// Body shown when neither the page nor the error page exists
pub const NOT_FOUND_TEXT: &str = "This is not the page you are looking for...";

const BODY_TOKEN: &str = "{% BODY %}";
const TIMESTAMP_TOKEN: &str = "{% TIMESTAMP %}";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

/// A page ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// HTML, or the raw Markdown for wrapped requests
    pub body: String,
    /// False when the requested page does not exist
    pub found: bool,
}

/// Read side of the CMS
#[derive(Clone)]
pub struct CmsGateway {
    store: Arc<dyn ContentStore>,
    site: SiteConfig,
}

impl CmsGateway {
    pub fn new(store: Arc<dyn ContentStore>, site: SiteConfig) -> Self {
        Self { store, site }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Where `/` redirects to
    pub fn home_path(&self) -> String {
        format!("/page/{}", self.site.default_home)
    }

    pub fn ping(&self, message: &str) -> String {
        tracing::info!(message, "Pinged");
        format!(
            "Service : microcms; Version : {}; Container : {}; Message : {}",
            crate::VERSION,
            self.site.container,
            message
        )
    }

    /// Render `file` (without its `.md` extension) through `layout`.
    ///
    /// `wrapped` skips rendering and returns the raw Markdown.
    pub async fn get_page(
        &self,
        file: Option<&str>,
        layout: Option<&str>,
        wrapped: bool,
    ) -> Result<RenderedPage> {
        let name = non_blank(file).unwrap_or(&self.site.default_home);
        let key = format!("{}.md", safe_key(name)?);
        tracing::info!(page = %key, "Request for page");

        let container = &self.site.container;
        let mut page = self.store.get_text_file(container, &key).await?;
        let found = !page.is_missing();

        if !found {
            let error_key = format!("{}.md", trim_key(&self.site.default_error));
            page = self.store.get_text_file(container, &error_key).await?;
            if page.is_blank() {
                page.content = NOT_FOUND_TEXT.to_string();
            }
        }

        if wrapped {
            return Ok(RenderedPage {
                body: page.content,
                found,
            });
        }

        let html = markdown_to_html(&page.content);
        let body = self.apply_layout(layout, &html, page.last_updated).await?;
        Ok(RenderedPage { body, found })
    }

    /// Raw image bytes from the images folder
    pub async fn get_image(&self, file: Option<&str>) -> Result<RawFile> {
        let name = non_blank(file).unwrap_or(&self.site.default_image);
        let key = format!("{}/{}", trim_key(&self.site.images_dir), safe_key(name)?);

        let image = self.store.get_raw_file(&self.site.container, &key).await?;
        if !image.is_valid() {
            return Err(CmsError::NotFound(key));
        }
        Ok(image)
    }

    /// HTML list of every page, wrapped in `layout` when it exists
    pub async fn list_pages(&self, layout: Option<&str>) -> Result<String> {
        let keys = self.store.list_files(&self.site.container, None).await?;

        let mut list = String::from("<ul>\n");
        for key in keys.iter().filter(|key| self.is_listed(key)) {
            let page = trim_extension(key);
            let page = escape_html(page);
            list.push_str(&format!("<li><a href=\"/page/{0}\">{0}</a></li>\n", page));
        }
        list.push_str("</ul>\n");

        let layout = self.load_layout(layout).await?;
        if layout.is_blank() {
            return Ok(list);
        }
        Ok(fill_layout(&layout.content, &list, Some(Utc::now())))
    }

    fn is_listed(&self, key: &str) -> bool {
        let first = key.split('/').next().unwrap_or_default();
        let excluded = self
            .site
            .exclude_folders
            .iter()
            .any(|folder| folder.eq_ignore_ascii_case(first))
            || first.eq_ignore_ascii_case(&self.site.layouts_dir)
            || first.eq_ignore_ascii_case(&self.site.images_dir);

        let lower = key.to_lowercase();
        !excluded && (lower.ends_with(".md") || lower.ends_with(".markdown"))
    }

    async fn load_layout(&self, layout: Option<&str>) -> Result<PageDetails> {
        let name = non_blank(layout).unwrap_or(DEFAULT_LAYOUT);
        let key = format!(
            "{}/{}.{}",
            trim_key(&self.site.layouts_dir),
            safe_key(name)?,
            self.site.layout_extension.trim_start_matches('.')
        );
        self.store.get_text_file(&self.site.container, &key).await
    }

    async fn apply_layout(
        &self,
        layout: Option<&str>,
        html: &str,
        updated: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let layout = self.load_layout(layout).await?;
        let template = if layout.is_blank() {
            SIMPLE_LAYOUT
        } else {
            layout.content.as_str()
        };
        Ok(fill_layout(template, html, updated))
    }
}

fn fill_layout(template: &str, body: &str, updated: Option<DateTime<Utc>>) -> String {
    let timestamp = updated
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default();
    template
        .replace(BODY_TOKEN, body)
        .replace(TIMESTAMP_TOKEN, &timestamp)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize a requested name into a key, refusing parent references
fn safe_key(name: &str) -> Result<&str> {
    let key = trim_key(name);
    if key.is_empty() || key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(CmsError::NotFound(name.to_string()));
    }
    Ok(key)
}

fn trim_extension(key: &str) -> &str {
    match key.rfind('.') {
        Some(dot) if !key[dot..].contains('/') => &key[..dot],
        _ => key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_extension() {
        assert_eq!(trim_extension("a.md"), "a");
        assert_eq!(trim_extension("sub/a.b.md"), "sub/a.b");
        assert_eq!(trim_extension("v1.0/readme"), "v1.0/readme");
        assert_eq!(trim_extension("plain"), "plain");
    }

    #[test]
    fn test_safe_key() {
        assert_eq!(safe_key(" /sub/a ").unwrap(), "sub/a");
        assert!(safe_key("../secrets").is_err());
        assert!(safe_key("a/../../b").is_err());
        assert!(safe_key("  ").is_err());
    }

    #[test]
    fn test_fill_layout() {
        let ts = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let out = fill_layout("<main>{% BODY %}</main><i>{% TIMESTAMP %}</i>", "<p>x</p>", Some(ts));
        assert_eq!(out, "<main><p>x</p></main><i>1970-01-01 00:00:00 +00:00</i>");

        let out = fill_layout("{% TIMESTAMP %}", "", None);
        assert_eq!(out, "");
    }
}
