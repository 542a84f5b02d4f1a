/// DOM Test Harness
///
/// Builds a read-only, queryable document from a markup fragment and attaches
/// the parsed stylesheet. Validation never looks at computed styles: layout is
/// not available here, so style checks go through `Stylesheet` declarations.
use scraper::{Html, Selector};
use tracing::debug;

use crate::css::Stylesheet;
use crate::error::{EvalError, Result};

pub struct TestDocument {
    html: Html,
    stylesheet: Stylesheet,
}

impl std::fmt::Debug for TestDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDocument")
            .field("rules", &self.stylesheet.rules().len())
            .finish()
    }
}

/// Parse `html` as a fragment and attach `css` as its stylesheet
pub fn create_test_dom(html: &str, css: &str) -> TestDocument {
    let fragment = Html::parse_fragment(html);
    if !fragment.errors.is_empty() {
        debug!(errors = fragment.errors.len(), "Markup parsed with recoverable errors");
    }
    TestDocument {
        html: fragment,
        stylesheet: Stylesheet::parse(css),
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| EvalError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

impl TestDocument {
    /// Number of elements matching `selector` (a selector list counts each
    /// element once)
    pub fn count(&self, selector: &str) -> Result<usize> {
        let parsed = parse_selector(selector)?;
        Ok(self.html.select(&parsed).count())
    }

    pub fn exists(&self, selector: &str) -> Result<bool> {
        Ok(self.count(selector)? > 0)
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }
}

/// Fails with `EvalError::Structural` naming `selector` when nothing matches
pub fn assert_element_exists(doc: &TestDocument, selector: &str) -> Result<()> {
    if doc.exists(selector)? {
        return Ok(());
    }
    Err(EvalError::Structural {
        selector: selector.to_string(),
        message: format!("Expected an element matching `{}`", selector),
    })
}

/// Fails with `EvalError::Structural` when fewer than `min` elements match
pub fn assert_min_count(doc: &TestDocument, selector: &str, min: usize) -> Result<()> {
    let found = doc.count(selector)?;
    if found >= min {
        return Ok(());
    }
    Err(EvalError::Structural {
        selector: selector.to_string(),
        message: format!(
            "Expected at least {} elements matching `{}`, found {}",
            min, selector, found
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_exists() {
        let doc = create_test_dom("<div class=\"box\"></div>", ".box{color:red}");
        assert!(assert_element_exists(&doc, ".box").is_ok());

        let err = assert_element_exists(&doc, ".missing").unwrap_err();
        assert!(matches!(err, EvalError::Structural { .. }));
        assert!(err.to_string().contains(".missing"));
    }

    #[test]
    fn test_stylesheet_is_attached() {
        let doc = create_test_dom("<div class=\"box\"></div>", ".box{color:red}");
        let block = doc.stylesheet().declarations(".box").unwrap();
        assert_eq!(block.get("color"), Some("red"));
    }

    #[test]
    fn test_selector_list_and_descendants() {
        let html = r##"
            <nav class="navbar">
              <h1>Brand</h1>
              <div class="nav-links">
                <a href="#a">A</a><a href="#b">B</a><a class="nav-link" href="#c">C</a>
              </div>
            </nav>"##;
        let doc = create_test_dom(html, "");
        assert!(doc.exists(".navbar .logo, .navbar .brand, .navbar h1").unwrap());
        assert_eq!(doc.count(".navbar a, .navbar .nav-link").unwrap(), 3);
        assert!(assert_min_count(&doc, ".navbar a", 3).is_ok());

        let err = assert_min_count(&doc, ".navbar a", 4).unwrap_err();
        assert!(err.to_string().contains("found 3"));
    }

    #[test]
    fn test_invalid_selector() {
        let doc = create_test_dom("<p></p>", "");
        let err = doc.count("p[").unwrap_err();
        assert!(matches!(err, EvalError::InvalidSelector { .. }));
    }

    #[test]
    fn test_malformed_markup_is_recovered() {
        let doc = create_test_dom("<div class=\"container\"><div class=\"box\">x", "");
        assert!(doc.exists(".container .box").unwrap());
    }
}
