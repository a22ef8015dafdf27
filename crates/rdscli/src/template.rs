//! Stack template loading with file includes
//!
//! A template line of the form
//!
//! ```text
//!       ZipFile: |
//!         {{ INCLUDE : control_lambda.py }}
//! ```
//!
//! is replaced by the contents of `control_lambda.py` (a sibling of the
//! template), each line indented like the directive. Included files may
//! include further files.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static INCLUDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\{\{\s*INCLUDE\s*:\s*(\S+?)\s*\}\}(.*)$").expect("include pattern is valid")
});

/// Includes nested deeper than this are assumed to be cyclic
const MAX_INCLUDE_DEPTH: usize = 16;

/// Read `path` and resolve its includes
pub fn load_template(path: &Path) -> Result<String> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut out = String::new();
    expand(path, "", &dir, 0, &mut out)?;
    Ok(out)
}

fn expand(path: &Path, indent: &str, dir: &Path, depth: usize, out: &mut String) -> Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        bail!("Includes nested too deeply at {}", path.display());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read template file {}", path.display()))?;

    for raw in content.split_inclusive('\n') {
        let body = raw.trim_end_matches(['\n', '\r']);
        let ending = &raw[body.len()..];
        let line = format!("{indent}{body}");

        match INCLUDE_RE.captures(&line) {
            Some(caps) => {
                let (prefix, name, trailer) = (&caps[1], &caps[2], &caps[3]);
                let target = include_target(dir, prefix, name, trailer)?;
                expand(&target, prefix, dir, depth + 1, out)?;
            }
            None => {
                out.push_str(&line);
                out.push_str(ending);
            }
        }
    }
    Ok(())
}

fn include_target(dir: &Path, prefix: &str, name: &str, trailer: &str) -> Result<PathBuf> {
    if !trailer.trim().is_empty() {
        bail!("Invalid use of INCLUDE for {name}: must be at the end of line");
    }
    if !prefix.chars().all(char::is_whitespace) {
        bail!("Invalid use of INCLUDE for {name}: only indent whitespace must precede");
    }
    if name.contains('/') || name.contains('\\') {
        bail!("Invalid use of INCLUDE for {name}: no directory path is allowed");
    }

    let target = dir.join(name);
    if !target.is_file() {
        bail!(
            "Invalid use of INCLUDE for {name}: file not found in {}",
            dir.display()
        );
    }
    Ok(target)
}
