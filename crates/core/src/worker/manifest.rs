//! The precache manifest: the ordered list of paths installed into a bucket.

use url::Url;

use crate::Error;

/// Built-in manifest for the bundled page: shell, offline document, web-app
/// manifest, icons, videos with posters and the hashed bundles.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/offline.html",
    "/manifest.json",
    "/dist/images/cover-1.c430d792c7407caf1834.webp",
    "/dist/images/editor-star.f0be85a46f7d80ed0910.gif",
    "/favicon.ico",
    "/sw.js",
    "/images/btn-start.webp",
    "/images/editor-star.gif",
    "/images/icons/b1.webp",
    "/images/icons/g10.webp",
    "/video/1.mp4",
    "/video/2.mp4",
    "/video/3.mp4",
    "/video/4.mp4",
    "/video/cover-1.webp",
    "/video/cover-2.webp",
    "/video/cover-3.webp",
    "/video/cover-4.webp",
    "/dist/js/rem.e28b7c510f9f88cb9315.js",
    "/dist/js/main.f108999031cca5dd34dc.js",
    "/dist/js/db.d864342bf7d967d0e0b8.js",
    "/dist/js/customCarousel.7b890c4348049128ea11.js",
    "/dist/js/nfc.ed538ba699de1ce2cbb2.js",
    "/dist/js/updateNotification.5070a4861c46d80d1b1d.js",
    "/dist/css/styles.26817d5264d65738108c.css",
    "/dist/js/styles.31d6cfe0d16ae931b73c.js",
];

/// Ordered, duplicate-free list of absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
}

impl Manifest {
    /// Build a manifest, keeping the first occurrence of repeated paths.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        let paths = paths
            .into_iter()
            .map(Into::into)
            .filter(|p| seen.insert(p.clone()))
            .collect();
        Self { paths }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Resolve every path against the origin.
    pub fn resolve(&self, origin: &Url) -> Result<Vec<Url>, Error> {
        self.paths
            .iter()
            .map(|p| origin.join(p).map_err(|e| Error::InvalidUrl(format!("{p}: {e}"))))
            .collect()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(DEFAULT_MANIFEST.iter().copied())
    }
}
