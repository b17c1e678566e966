//! Rendering context for the human test page.
//!
//! Each dispatcher owns one [`TestPage`].  With embedded assets the template
//! is compiled once at construction; with a local asset directory every
//! request re-reads the files and recompiles, so edits show up on reload.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use rws_core::template::{PageContext, PageTemplate, TemplateError};
use thiserror::Error;

const PAGE_FILE: &str = "test.html";

const EMBEDDED_PAGE: &str = include_str!("../../static/test.html");
const EMBEDDED_ASSETS: [(&str, &[u8]); 3] = [
    ("test.html", include_bytes!("../../static/test.html")),
    ("test.js", include_bytes!("../../static/test.js")),
    ("test.css", include_bytes!("../../static/test.css")),
];

#[derive(Debug, Error)]
pub enum TestPageError {
    #[error("invalid test page template: {0}")]
    Template(#[from] TemplateError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
enum AssetSource {
    Embedded(PageTemplate),
    LocalDir(PathBuf),
}

/// Test page template plus the assets it references.
#[derive(Debug)]
pub struct TestPage {
    source: AssetSource,
}

impl TestPage {
    /// Uses the assets compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns [`TestPageError::Template`] if the embedded page does not compile.
    pub fn embedded() -> Result<Self, TestPageError> {
        Ok(Self {
            source: AssetSource::Embedded(PageTemplate::compile(EMBEDDED_PAGE)?),
        })
    }

    /// Serves `test.html` and its assets from `dir`, re-read per request.
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: AssetSource::LocalDir(dir.into()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, AssetSource::LocalDir(_))
    }

    /// Renders the page.
    ///
    /// # Errors
    ///
    /// In local mode, returns [`TestPageError`] when `test.html` cannot be read
    /// or compiled.
    pub fn render(&self, context: &PageContext<'_>) -> Result<String, TestPageError> {
        match &self.source {
            AssetSource::Embedded(template) => Ok(template.render(context)),
            AssetSource::LocalDir(dir) => {
                let path = dir.join(PAGE_FILE);
                let source = std::fs::read_to_string(&path)
                    .map_err(|source| TestPageError::Io { path, source })?;
                Ok(PageTemplate::compile(&source)?.render(context))
            }
        }
    }

    /// Looks up a static asset by file name.
    ///
    /// Returns `Ok(None)` for unknown names and for names that could escape the
    /// asset directory.
    ///
    /// # Errors
    ///
    /// In local mode, returns [`TestPageError::Io`] for read failures other
    /// than a missing file.
    pub fn asset(&self, name: &str) -> Result<Option<Cow<'static, [u8]>>, TestPageError> {
        if !is_safe_asset_name(name) {
            return Ok(None);
        }
        match &self.source {
            AssetSource::Embedded(_) => Ok(EMBEDDED_ASSETS
                .iter()
                .find(|(asset, _)| *asset == name)
                .map(|(_, bytes)| Cow::Borrowed(*bytes))),
            AssetSource::LocalDir(dir) => read_local(&dir.join(name)),
        }
    }
}

fn read_local(path: &Path) -> Result<Option<Cow<'static, [u8]>>, TestPageError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(Cow::Owned(bytes))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(TestPageError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Plain file names only: no traversal, no separators.
fn is_safe_asset_name(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains(['/', '\\'])
}
