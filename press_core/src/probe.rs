//! Optional dependency probing
//!
//! Each dependency is probed at most once per registry build. A probe that
//! fails, or panics inside a foreign library, counts as "not available".

use crate::formats::Dependency;
use crate::logging::execute_external_command;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};

pub const MAGICK_BINARY: &str = "magick";

/// Result of probing every optional dependency.
#[derive(Debug, Clone, Default)]
pub struct DependencyStatus {
    available: BTreeMap<Dependency, bool>,
}

impl DependencyStatus {
    pub fn is_available(&self, dependency: Dependency) -> bool {
        self.available.get(&dependency).copied().unwrap_or(false)
    }

    pub fn set(&mut self, dependency: Dependency, available: bool) {
        self.available.insert(dependency, available);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dependency, bool)> + '_ {
        self.available.iter().map(|(d, a)| (*d, *a))
    }
}

pub fn probe_dependencies() -> DependencyStatus {
    let mut status = DependencyStatus::default();
    for dependency in Dependency::ALL {
        let available = probe_one(dependency);
        if available {
            tracing::info!(dependency = %dependency, "Optional dependency available");
        } else {
            tracing::warn!(
                dependency = %dependency,
                hint = dependency.install_hint(),
                "Optional dependency missing, dependent formats disabled"
            );
        }
        status.set(dependency, available);
    }
    status
}

fn probe_one(dependency: Dependency) -> bool {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match dependency {
        Dependency::Libheif => probe_libheif(),
        Dependency::ImageMagick => probe_imagemagick(),
    }));
    match result {
        Ok(available) => available,
        Err(_) => {
            tracing::error!(dependency = %dependency, "Dependency probe panicked");
            false
        }
    }
}

#[cfg(feature = "heif")]
fn probe_libheif() -> bool {
    crate::codec::heif::is_available()
}

#[cfg(not(feature = "heif"))]
fn probe_libheif() -> bool {
    tracing::debug!("Built without the heif feature");
    false
}

fn probe_imagemagick() -> bool {
    let Ok(path) = which::which(MAGICK_BINARY) else {
        return false;
    };
    // other programs named `magick` exist; require a real version banner
    match execute_external_command(&path, &["-version"]) {
        Ok(result) => result.success() && result.stdout.contains("ImageMagick"),
        Err(e) => {
            tracing::debug!(error = %e, "ImageMagick probe failed");
            false
        }
    }
}
