//! Format Capability Registry
//!
//! Static table of every image format img-press knows about, combined with
//! the result of the startup dependency probe. The table never changes after
//! the probe: callers consult it before touching a codec instead of learning
//! about a missing library from a failed decode.

use crate::error::{PressError, Result};
use crate::probe::{probe_dependencies, DependencyStatus};
use image::ImageFormat;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

/// Optional library a format needs before it can be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dependency {
    /// libheif, compiled in with the `heif` feature
    Libheif,
    /// ImageMagick 7 `magick` executable on PATH
    ImageMagick,
}

impl Dependency {
    pub const ALL: [Dependency; 2] = [Dependency::Libheif, Dependency::ImageMagick];

    pub fn name(&self) -> &'static str {
        match self {
            Dependency::Libheif => "libheif",
            Dependency::ImageMagick => "ImageMagick",
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            Dependency::Libheif => {
                "Install libheif (>= 1.21) and rebuild img-press with `--features heif`"
            }
            Dependency::ImageMagick => {
                "Install ImageMagick 7 and make sure the `magick` command is on PATH"
            }
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which library implements a format's codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Image(ImageFormat),
    Heif,
    /// ImageMagick coder name, e.g. `PDF`
    Magick(&'static str),
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatDescriptor {
    pub identifier: &'static str,
    /// First entry is the extension used for output files.
    pub extensions: &'static [&'static str],
    pub mime: &'static str,
    pub supports_read: bool,
    pub supports_write: bool,
    /// Whether the encoder honours a quality setting.
    pub lossy: bool,
    #[serde(skip)]
    pub backend: Backend,
    pub required_dependency: Option<Dependency>,
    pub dependency_available: bool,
}

impl FormatDescriptor {
    pub fn primary_extension(&self) -> &'static str {
        self.extensions[0]
    }

    pub fn can_read(&self) -> bool {
        self.supports_read && self.dependency_available
    }

    pub fn can_write(&self) -> bool {
        self.supports_write && self.dependency_available
    }

    /// Upper-case label used in summaries and history, e.g. `JPEG`.
    pub fn label(&self) -> String {
        self.identifier.to_uppercase()
    }

    fn matches(&self, name: &str) -> bool {
        self.identifier == name || self.mime == name || self.extensions.contains(&name)
    }
}

struct FormatSpec {
    identifier: &'static str,
    extensions: &'static [&'static str],
    mime: &'static str,
    read: bool,
    write: bool,
    lossy: bool,
    backend: Backend,
    dependency: Option<Dependency>,
}

const fn builtin(
    identifier: &'static str,
    extensions: &'static [&'static str],
    mime: &'static str,
    format: ImageFormat,
    read: bool,
    write: bool,
    lossy: bool,
) -> FormatSpec {
    FormatSpec {
        identifier,
        extensions,
        mime,
        read,
        write,
        lossy,
        backend: Backend::Image(format),
        dependency: None,
    }
}

const fn magick(
    identifier: &'static str,
    extensions: &'static [&'static str],
    mime: &'static str,
    coder: &'static str,
    write: bool,
    lossy: bool,
) -> FormatSpec {
    FormatSpec {
        identifier,
        extensions,
        mime,
        read: true,
        write,
        lossy,
        backend: Backend::Magick(coder),
        dependency: Some(Dependency::ImageMagick),
    }
}

static FORMAT_TABLE: &[FormatSpec] = &[
    builtin("jpeg", &["jpg", "jpeg", "jpe", "jfif"], "image/jpeg", ImageFormat::Jpeg, true, true, true),
    builtin("png", &["png"], "image/png", ImageFormat::Png, true, true, false),
    builtin("gif", &["gif"], "image/gif", ImageFormat::Gif, true, true, false),
    builtin("bmp", &["bmp"], "image/bmp", ImageFormat::Bmp, true, true, false),
    builtin("tiff", &["tiff", "tif"], "image/tiff", ImageFormat::Tiff, true, true, false),
    // image only ships the lossless VP8L encoder
    builtin("webp", &["webp"], "image/webp", ImageFormat::WebP, true, true, false),
    builtin("ico", &["ico"], "image/x-icon", ImageFormat::Ico, true, true, false),
    builtin("pnm", &["ppm", "pgm", "pbm", "pnm"], "image/x-portable-anymap", ImageFormat::Pnm, true, true, false),
    builtin("tga", &["tga"], "image/x-tga", ImageFormat::Tga, true, true, false),
    builtin("qoi", &["qoi"], "image/qoi", ImageFormat::Qoi, true, true, false),
    builtin("dds", &["dds"], "image/vnd-ms.dds", ImageFormat::Dds, true, false, false),
    // decoding AVIF needs the native dav1d binding, which is not enabled
    builtin("avif", &["avif"], "image/avif", ImageFormat::Avif, false, true, true),
    FormatSpec {
        identifier: "heic",
        extensions: &["heic", "heif", "hif"],
        mime: "image/heic",
        read: true,
        write: true,
        lossy: true,
        backend: Backend::Heif,
        dependency: Some(Dependency::Libheif),
    },
    magick("psd", &["psd"], "image/vnd.adobe.photoshop", "PSD", false, false),
    magick("pdf", &["pdf"], "application/pdf", "PDF", true, true),
    magick("svg", &["svg"], "image/svg+xml", "SVG", true, false),
    magick("eps", &["eps"], "application/postscript", "EPS", true, false),
    magick("fits", &["fits", "fit", "fts"], "image/fits", "FITS", true, false),
];

static GLOBAL_REGISTRY: LazyLock<FormatRegistry> = LazyLock::new(FormatRegistry::probe);

/// Lookup table of format descriptors.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    /// Process-wide registry, probed on first use.
    pub fn global() -> &'static FormatRegistry {
        &GLOBAL_REGISTRY
    }

    /// Build a registry from a fresh dependency probe.
    pub fn probe() -> Self {
        let status = probe_dependencies();
        Self::from_status(&status)
    }

    pub fn from_status(status: &DependencyStatus) -> Self {
        Self::with_availability(|dep| status.is_available(dep))
    }

    /// Build a registry with dependency availability decided by `available`.
    pub fn with_availability<F>(available: F) -> Self
    where
        F: Fn(Dependency) -> bool,
    {
        let formats = FORMAT_TABLE
            .iter()
            .map(|spec| FormatDescriptor {
                identifier: spec.identifier,
                extensions: spec.extensions,
                mime: spec.mime,
                supports_read: spec.read,
                supports_write: spec.write,
                lossy: spec.lossy,
                backend: spec.backend,
                required_dependency: spec.dependency,
                dependency_available: spec.dependency.map_or(true, &available),
            })
            .collect();
        Self { formats }
    }

    /// Resolve an identifier, extension alias (`jpg`, `.tif`) or MIME type.
    pub fn resolve(&self, identifier: &str) -> Result<&FormatDescriptor> {
        let name = normalize(identifier);
        self.formats
            .iter()
            .find(|f| f.matches(&name))
            .ok_or_else(|| PressError::UnknownFormat(identifier.to_string()))
    }

    pub fn can_read(&self, identifier: &str) -> bool {
        self.resolve(identifier).map(|f| f.can_read()).unwrap_or(false)
    }

    pub fn can_write(&self, identifier: &str) -> bool {
        self.resolve(identifier).map(|f| f.can_write()).unwrap_or(false)
    }

    pub fn by_extension(&self, extension: &str) -> Option<&FormatDescriptor> {
        let ext = normalize(extension);
        self.formats.iter().find(|f| f.extensions.contains(&ext.as_str()))
    }

    /// Detect a file's format from its extension, then from its leading bytes.
    pub fn detect(&self, path: &Path) -> Option<&FormatDescriptor> {
        if let Some(found) = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.by_extension(ext))
        {
            return Some(found);
        }
        self.sniff(path)
    }

    fn sniff(&self, path: &Path) -> Option<&FormatDescriptor> {
        let mut header = [0u8; 32];
        let read = fs::File::open(path).and_then(|mut f| f.read(&mut header)).ok()?;
        let header = &header[..read];

        if header.len() >= 12 && &header[4..8] == b"ftyp" {
            let brand = &header[8..12];
            if matches!(brand, b"heic" | b"heix" | b"heim" | b"heis" | b"mif1" | b"msf1") {
                return self.resolve("heic").ok();
            }
        }
        if header.starts_with(b"%PDF") {
            return self.resolve("pdf").ok();
        }
        if header.starts_with(b"8BPS") {
            return self.resolve("psd").ok();
        }

        let guessed = image::guess_format(header).ok()?;
        self.formats
            .iter()
            .find(|f| f.backend == Backend::Image(guessed))
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.formats
    }

    /// Formats currently selectable as an output target.
    pub fn writable(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.iter().filter(|f| f.can_write())
    }

    /// Every extension of a format that is readable right now.
    pub fn readable_extensions(&self) -> Vec<&'static str> {
        self.formats
            .iter()
            .filter(|f| f.can_read())
            .flat_map(|f| f.extensions.iter().copied())
            .collect()
    }

    pub fn missing_dependencies(&self) -> Vec<Dependency> {
        let mut missing: Vec<Dependency> = self
            .formats
            .iter()
            .filter(|f| !f.dependency_available)
            .filter_map(|f| f.required_dependency)
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}

/// Canonical identifier for a name, alias or MIME type, regardless of which
/// dependencies are installed.
pub fn canonical_identifier(name: &str) -> Option<&'static str> {
    let name = normalize(name);
    FORMAT_TABLE
        .iter()
        .find(|spec| {
            spec.identifier == name || spec.mime == name || spec.extensions.contains(&name.as_str())
        })
        .map(|spec| spec.identifier)
}

fn normalize(name: &str) -> String {
    name.trim().trim_start_matches('.').to_lowercase()
}
