//! Output file naming.

use std::path::{Path, PathBuf};

/// Replace path separators so a display title can be used as a file name.
pub fn sanitize_file_name(name: &str) -> String {
    let s = name.replace(['/', '\\'], "_");
    let s = s.trim();
    if s.is_empty() {
        "untitled".to_string()
    } else {
        s.to_string()
    }
}

/// First free path among `name.ext`, `name (1).ext`, `name (2).ext`, ...
///
/// Check-then-act: the caller must still create the file without clobbering.
pub fn resolve_output_path(dir: &Path, base_name: &str, extension: &str) -> PathBuf {
    let name = sanitize_file_name(base_name);
    let mut path = dir.join(format!("{}.{}", name, extension));
    let mut count = 1u32;
    while path.exists() {
        path = dir.join(format!("{} ({}).{}", name, count, extension));
        count += 1;
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_separators() {
        assert_eq!(sanitize_file_name("[en] A/B\\C ch1"), "[en] A_B_C ch1");
        assert_eq!(sanitize_file_name("  "), "untitled");
    }

    #[test]
    fn collision_appends_counter() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = resolve_output_path(dir.path(), "name", "cbz");
        assert_eq!(first, dir.path().join("name.cbz"));
        std::fs::write(&first, b"x")?;

        let second = resolve_output_path(dir.path(), "name", "cbz");
        assert_eq!(second, dir.path().join("name (1).cbz"));
        std::fs::write(&second, b"x")?;

        let third = resolve_output_path(dir.path(), "name", "cbz");
        assert_eq!(third, dir.path().join("name (2).cbz"));
        Ok(())
    }

    #[test]
    fn different_extension_is_not_a_collision() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("name.cbz"), b"x")?;
        assert_eq!(
            resolve_output_path(dir.path(), "name", "pdf"),
            dir.path().join("name.pdf")
        );
        Ok(())
    }
}
