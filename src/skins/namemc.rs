// Skin gallery detail pages -> direct image URLs
// Players often paste the NameMC page of a skin instead of the PNG itself

const NAMEMC_SKIN_PAGE: &str = "https://namemc.com/skin/";
const NAMEMC_SKIN_BASE: &str = "https://s.namemc.com/i";

/// Maps one gallery's detail pages to its image URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryRule {
    /// Detail page prefix, followed by the skin id
    pub page_prefix: String,
    /// Image URL template, `{id}` is replaced by the skin id
    pub image_template: String,
}

impl GalleryRule {
    pub fn new(page_prefix: &str, image_template: &str) -> Self {
        Self {
            page_prefix: page_prefix.to_string(),
            image_template: image_template.to_string(),
        }
    }

    pub fn namemc() -> Self {
        Self::new(NAMEMC_SKIN_PAGE, &format!("{}/{{id}}.png", NAMEMC_SKIN_BASE))
    }

    fn rewrite(&self, url: &str) -> Option<String> {
        let rest = url.strip_prefix(self.page_prefix.as_str())?;
        let id: String = rest
            .chars()
            .take_while(|c| !matches!(c, '/' | '?' | '#'))
            .collect();
        if id.is_empty() {
            return None;
        }
        Some(self.image_template.replace("{id}", &id))
    }
}

/// Rewrites known gallery pages, leaves every other URL untouched
#[derive(Debug, Clone)]
pub struct GalleryRewriter {
    rules: Vec<GalleryRule>,
}

impl Default for GalleryRewriter {
    fn default() -> Self {
        Self {
            rules: vec![GalleryRule::namemc()],
        }
    }
}

impl GalleryRewriter {
    pub fn new(rules: Vec<GalleryRule>) -> Self {
        Self { rules }
    }

    pub fn rewrite(&self, url: &str) -> String {
        let url = url.trim();
        for rule in &self.rules {
            if let Some(image_url) = rule.rewrite(url) {
                tracing::debug!("Rewrote gallery page {} to {}", url, image_url);
                return image_url;
            }
        }
        url.to_string()
    }
}
