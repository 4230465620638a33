//! Image block content: a URL with optional size hints.
//!
//! An image block's `content` is the public URL of the uploaded object. The
//! last rendered size rides along as `width` / `height` query parameters;
//! a missing parameter means `auto`. Rewriting the size must leave every
//! other query parameter alone, in its original position.

use std::fmt;

use thiserror::Error;
use url::Url;

const WIDTH_PARAM: &str = "width";
const HEIGHT_PARAM: &str = "height";

/// Errors from image content handling.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ImageError {
    /// The block content is not an absolute URL.
    #[error("invalid image url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// One rendered dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Dimension {
    #[default]
    Auto,
    Px(u32),
}

impl Dimension {
    /// Parse a query value. `"auto"`, empty, and anything non-numeric read as
    /// [`Dimension::Auto`]; a trailing `px` is accepted.
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let digits = trimmed.strip_suffix("px").unwrap_or(trimmed);
        digits.parse().map(Dimension::Px).unwrap_or(Dimension::Auto)
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Dimension::Auto)
    }

    fn query_value(&self) -> Option<String> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(px) => Some(px.to_string()),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Auto => f.write_str("auto"),
            Dimension::Px(px) => write!(f, "{px}"),
        }
    }
}

/// Parsed image block content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageSource {
    url: Url,
    width: Dimension,
    height: Dimension,
}

impl ImageSource {
    /// Parse image block content.
    pub fn parse(content: &str) -> Result<Self, ImageError> {
        let url = Url::parse(content).map_err(|e| ImageError::InvalidUrl {
            url: content.to_string(),
            reason: e.to_string(),
        })?;

        let mut width = Dimension::Auto;
        let mut height = Dimension::Auto;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                WIDTH_PARAM => width = Dimension::parse(&value),
                HEIGHT_PARAM => height = Dimension::parse(&value),
                _ => {}
            }
        }

        Ok(Self { url, width, height })
    }

    pub fn width(&self) -> Dimension {
        self.width
    }

    pub fn height(&self) -> Dimension {
        self.height
    }

    /// Replace both size hints.
    pub fn with_size(mut self, width: Dimension, height: Dimension) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Render back into block content.
    ///
    /// Existing `width`/`height` parameters are rewritten where they stand
    /// (or dropped when `auto`); new ones are appended after everything else.
    pub fn to_content(&self) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut wrote_width = false;
        let mut wrote_height = false;

        for (key, value) in self.url.query_pairs() {
            match key.as_ref() {
                WIDTH_PARAM => {
                    if !wrote_width {
                        if let Some(v) = self.width.query_value() {
                            pairs.push((WIDTH_PARAM.to_string(), v));
                        }
                        wrote_width = true;
                    }
                }
                HEIGHT_PARAM => {
                    if !wrote_height {
                        if let Some(v) = self.height.query_value() {
                            pairs.push((HEIGHT_PARAM.to_string(), v));
                        }
                        wrote_height = true;
                    }
                }
                _ => pairs.push((key.into_owned(), value.into_owned())),
            }
        }
        if !wrote_width {
            if let Some(v) = self.width.query_value() {
                pairs.push((WIDTH_PARAM.to_string(), v));
            }
        }
        if !wrote_height {
            if let Some(v) = self.height.query_value() {
                pairs.push((HEIGHT_PARAM.to_string(), v));
            }
        }

        let mut url = self.url.clone();
        url.set_query(None);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs.iter());
        }
        url.into()
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_content())
    }
}
