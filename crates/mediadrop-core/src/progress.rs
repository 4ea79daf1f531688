//! Progress lines printed by yt-dlp with `--newline`.

/// Parse a yt-dlp `--newline` progress line into a percentage (0..=100).
///
/// Recognises lines such as `[download]  42.3% of ~ 10.00MiB at 1.2MiB/s`.
pub fn parse_progress_line(line: &str) -> Option<f32> {
    let rest = line.trim_start().strip_prefix("[download]")?;
    let token = rest.split_whitespace().next()?;
    let number = token.strip_suffix('%')?;
    let value = number.trim().parse::<f32>().ok()?;
    value.is_finite().then(|| value.clamp(0.0, 100.0))
}
