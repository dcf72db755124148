use std::sync::LazyLock;

use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;

static UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[_]").expect("valid regex"));
static UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9- ]").expect("valid regex"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("valid regex"));
static DASHES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("valid regex"));

pub fn sanitize(input: &str) -> String {
    let s = UNDERSCORES.replace_all(input, " ");
    let s = UNSAFE.replace_all(&s, "");

    SPACES.replace_all(s.trim(), " ").to_lowercase()
}

/// Lowercase, dash separated id usable inside a Redis key.
pub fn slug(input: &str) -> String {
    let spaced = sanitize(input).replace(' ', "-");

    DASHES
        .replace_all(&spaced, "-")
        .trim_matches('-')
        .to_string()
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub async fn read_source(source: &str) -> anyhow::Result<String> {
    if is_url(source) {
        let response = reqwest::get(source).await?.error_for_status()?;

        #[cfg(feature = "verbose")]
        println!("Status: {}\n", response.status());

        Ok(response.text().await?)
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read {source}"))
    }
}

pub fn progress_bar(len: usize) -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )?
        .progress_chars("=> "),
    );

    Ok(pb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        assert_eq!(sanitize("hello_world"), "hello world");
        assert_eq!(sanitize("Red-Bull"), "red-bull");
        assert_eq!(sanitize("box-this_lap!"), "box-this lap");
    }

    #[test]
    fn test_leading_trailing_spaces() {
        assert_eq!(sanitize("   monza   "), "monza");
        assert_eq!(sanitize("  multiple   spaces  "), "multiple spaces");
    }

    #[test]
    fn test_special_characters() {
        assert_eq!(sanitize("!@#$%^&*()"), "");
        assert_eq!(sanitize("abc123!@#"), "abc123");
    }

    #[test]
    fn test_empty_string() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("     "), "");
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Bahrain GP - Race Winner"), "bahrain-gp-race-winner");
        assert_eq!(slug("São Paulo Sprint"), "so-paulo-sprint");
        assert_eq!(slug("-- pole_position --"), "pole-position");
        assert_eq!(slug("???"), "");
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/catalog.json"));
        assert!(!is_url("./catalog.json"));
    }
}
