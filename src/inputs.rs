use std::fs;
use std::path::Path;
use tracing::error;

/// Loads trimmed, non-empty lines from a flat file.
///
/// A missing or unreadable file yields an empty list; callers decide whether
/// that is fatal (it is for the wallet list, not for tokens or proxies).
pub fn load_lines<P: AsRef<Path>>(path: P) -> Vec<String> {
    match fs::read_to_string(&path) {
        Ok(content) => content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Err(e) => {
            error!("Failed to read {}: {}", path.as_ref().display(), e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, content: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("sui-checker-test-{}-{}", std::process::id(), name));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn skips_blank_lines_and_trims() {
        let path = temp_file("wallets", "0xabc\n\n  0xdef  \n\t\n0x123\n");
        let lines = load_lines(&path);
        fs::remove_file(&path).ok();
        assert_eq!(lines, vec!["0xabc", "0xdef", "0x123"]);
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let lines = load_lines("/nonexistent/definitely-not-here.txt");
        assert!(lines.is_empty());
    }
}
