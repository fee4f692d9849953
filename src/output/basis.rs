//! Basis list file
//!
//! One listing URL per line, in basis order. Blank lines and lines starting
//! with `#` are ignored on read so the file can be annotated by hand.

use crate::category::CategoryNode;
use crate::SweepError;
use chrono::Utc;
use std::io::Write;
use std::path::Path;

/// Reads a basis list file
pub fn read_basis_file(path: &Path) -> Result<Vec<String>, SweepError> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_basis(&content))
}

/// Extracts URLs from basis file content
pub fn parse_basis(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Renders a basis list with a short provenance header
pub fn render_basis(nodes: &[CategoryNode], source: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "# {} basis URLs from {} at {}\n",
        nodes.len(),
        source,
        Utc::now().to_rfc3339()
    ));
    for node in nodes {
        out.push_str(&node.url);
        out.push('\n');
    }
    out
}

/// Writes a basis list file, replacing any existing one atomically
pub fn write_basis_file(path: &Path, nodes: &[CategoryNode], source: &str) -> Result<(), SweepError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(render_basis(nodes, source).as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;

    tracing::info!("Wrote {} basis URLs to {}", nodes.len(), path.display());
    Ok(())
}
