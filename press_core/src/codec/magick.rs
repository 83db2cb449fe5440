//! Formats handled by the ImageMagick `magick` executable
//!
//! Source bytes go in on stdin and pixels come back as PNG on stdout (the
//! reverse for encoding), so no temporary files are needed.

use crate::error::{PressError, Result};
use crate::logging::log_external_tool;
use crate::probe::MAGICK_BINARY;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

/// Rasterisation density for vector input (PDF, SVG, EPS).
const RASTER_DENSITY: &str = "150";

/// Decode the first page/frame of `path` with the given ImageMagick coder.
///
/// The file is streamed on stdin, so its name never reaches `magick`'s
/// argument parser (leading `-`, `[..]` frame syntax, `coder:` prefixes).
pub fn decode(coder: &str, path: &Path) -> Result<DynamicImage> {
    let bytes = fs::read(path).map_err(|source| PressError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let args = decode_args(coder);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let png = run(&args, Some(bytes))?;
    image::load_from_memory_with_format(&png, ImageFormat::Png)
        .map_err(|e| PressError::decode(path, e))
}

/// `[0]` selects the first page / the flattened PSD composite.
fn decode_args(coder: &str) -> [String; 4] {
    [
        "-density".to_string(),
        RASTER_DENSITY.to_string(),
        format!("{}:-[0]", coder),
        "png:-".to_string(),
    ]
}

pub fn encode(coder: &str, image: &DynamicImage, quality: u8, lossy: bool) -> Result<Vec<u8>> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PressError::encode(coder.to_lowercase(), e))?;

    let quality = quality.to_string();
    let output = format!("{}:-", coder);
    let mut args = vec!["png:-"];
    if lossy {
        args.extend(["-quality", quality.as_str()]);
    }
    args.push(output.as_str());

    run(&args, Some(png))
}

fn run(args: &[&str], stdin: Option<Vec<u8>>) -> Result<Vec<u8>> {
    let start = Instant::now();
    let tool_err = |message: String| PressError::ExternalTool {
        tool: MAGICK_BINARY.to_string(),
        message,
    };

    let mut child = Command::new(MAGICK_BINARY)
        .args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| tool_err(format!("failed to start: {}", e)))?;

    // Feed stdin from another thread; a full stdout pipe would otherwise deadlock.
    let writer = match (stdin, child.stdin.take()) {
        (Some(data), Some(mut pipe)) => Some(thread::spawn(move || pipe.write_all(&data))),
        _ => None,
    };

    let mut stdout = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_end(&mut stdout)
            .map_err(|e| tool_err(format!("failed to read output: {}", e)))?;
    }
    let mut stderr = String::new();
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_string(&mut stderr);
    }

    let status = child
        .wait()
        .map_err(|e| tool_err(format!("failed to wait: {}", e)))?;

    if let Some(handle) = writer {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(tool_err(format!("failed to write input: {}", e))),
            Err(_) => return Err(tool_err("stdin writer panicked".to_string())),
        }
    }

    log_external_tool(MAGICK_BINARY, args, &stderr, status.code(), start.elapsed());

    if !status.success() {
        return Err(tool_err(format!(
            "exit code {:?}: {}",
            status.code(),
            stderr.trim()
        )));
    }
    if stdout.is_empty() {
        return Err(tool_err("produced no output".to_string()));
    }
    Ok(stdout)
}
