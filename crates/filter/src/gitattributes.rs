//! `.gitattributes` management for theta-tracked files.

use std::path::Path;

use crate::FilterResult;

/// The attributes a tracked checkpoint needs.
pub const THETA_ATTRIBUTES: [&str; 3] = ["filter=theta", "merge=theta", "diff=theta"];

/// Read the lines of a `.gitattributes` file; a missing file is empty.
pub fn read_gitattributes(path: &Path) -> FilterResult<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_owned).collect())
}

/// Write attribute lines back, ending with a newline.
pub fn write_gitattributes(path: &Path, lines: &[String]) -> FilterResult<()> {
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(path, text)?;
    Ok(())
}

/// Add the theta attributes for `tracked_path`.
///
/// If an existing pattern already covers the path the attributes are
/// appended to that line (skipping ones already present); otherwise a new
/// line covering exactly this path is added. Unrelated lines pass through
/// untouched.
pub fn add_theta_to_gitattributes(lines: &[String], tracked_path: &str) -> Vec<String> {
    let mut pattern_found = false;
    let mut out = Vec::with_capacity(lines.len() + 1);
    for line in lines {
        let mut line = line.clone();
        if let Some((pattern, _attributes)) = split_attribute_line(&line) {
            if pattern_matches(&pattern, tracked_path) {
                pattern_found = true;
                for attribute in THETA_ATTRIBUTES {
                    if !line.split_whitespace().any(|a| a == attribute) {
                        line = format!("{} {attribute}", line.trim_end());
                    }
                }
            }
        }
        out.push(line);
    }
    if !pattern_found {
        out.push(format!(
            "{tracked_path} {}",
            THETA_ATTRIBUTES.join(" ")
        ));
    }
    out
}

/// Patterns in `lines` that carry the theta filter.
pub fn theta_tracked_patterns(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| {
            let (pattern, attributes) = split_attribute_line(line)?;
            attributes
                .split_whitespace()
                .any(|a| a == "filter=theta")
                .then_some(pattern)
        })
        .collect()
}

fn split_attribute_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let pattern = parts.next()?.to_owned();
    let attributes = parts.next().unwrap_or("").to_owned();
    Some((pattern, attributes))
}

/// Shell-style wildcard match: `*` matches any run, `?` one character.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let path: Vec<char> = path.chars().collect();
    // Iterative wildcard matching with single-star backtracking.
    let (mut p, mut s) = (0usize, 0usize);
    let (mut star, mut matched) = (None::<usize>, 0usize);
    while s < path.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == path[s]) {
            p += 1;
            s += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            matched = s;
            p += 1;
        } else if let Some(star_pos) = star {
            p = star_pos + 1;
            matched += 1;
            s = matched;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_new_line_added_when_no_pattern_covers() {
        let out = add_theta_to_gitattributes(&lines(&["*.txt text"]), "model.ckpt");
        assert_eq!(
            out,
            lines(&[
                "*.txt text",
                "model.ckpt filter=theta merge=theta diff=theta"
            ])
        );
    }

    #[test]
    fn test_existing_pattern_gains_attributes() {
        let out = add_theta_to_gitattributes(&lines(&["*.ckpt -text"]), "model.ckpt");
        assert_eq!(
            out,
            lines(&["*.ckpt -text filter=theta merge=theta diff=theta"])
        );
    }

    #[test]
    fn test_partial_attributes_completed() {
        let out = add_theta_to_gitattributes(&lines(&["*.ckpt filter=theta"]), "model.ckpt");
        assert_eq!(
            out,
            lines(&["*.ckpt filter=theta merge=theta diff=theta"])
        );
    }

    #[test]
    fn test_idempotent() {
        let first = add_theta_to_gitattributes(&[], "model.ckpt");
        let second = add_theta_to_gitattributes(&first, "model.ckpt");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unrelated_lines_untouched() {
        let input = lines(&["# checkpoints", "", "*.bin binary"]);
        let out = add_theta_to_gitattributes(&input, "model.ckpt");
        assert_eq!(&out[..3], &input[..]);
    }

    #[test]
    fn test_tracked_patterns() {
        let input = lines(&[
            "*.ckpt filter=theta merge=theta diff=theta",
            "*.txt text",
            "weights/*.pt filter=theta",
        ]);
        assert_eq!(
            theta_tracked_patterns(&input),
            vec!["*.ckpt".to_owned(), "weights/*.pt".to_owned()]
        );
    }

    #[test]
    fn test_pattern_matching() {
        assert!(pattern_matches("*.ckpt", "model.ckpt"));
        assert!(pattern_matches("model.?kpt", "model.ckpt"));
        assert!(pattern_matches("weights/*", "weights/final.pt"));
        assert!(!pattern_matches("*.ckpt", "model.bin"));
        assert!(pattern_matches("*", "anything"));
    }
}
