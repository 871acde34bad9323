//! Best-effort scraping of `uiautomator` XML dumps.
//!
//! Device UI hierarchies are noisy and version-dependent, so every lookup
//! here returns `Option` and callers decide the fallback. The send-button
//! patterns cover the labeled forms WhatsApp has shipped; when none match,
//! the bottom-right region heuristic narrows the remaining candidates.

use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_SCREEN_WIDTH: i32 = 720;
pub const DEFAULT_SCREEN_HEIGHT: i32 = 1600;

/// Known-good send-button coordinate observed on the reference device.
pub const SEND_BUTTON_FALLBACK: (i32, i32) = (671, 802);

static SEND_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(
            r#"resource-id="com\.whatsapp:id/send"[^>]*bounds="\[(\d+),(\d+)\]\[(\d+),(\d+)\]""#,
        )
        .unwrap(),
        Regex::new(r#"content-desc="[Ss]end"[^>]*bounds="\[(\d+),(\d+)\]\[(\d+),(\d+)\]""#)
            .unwrap(),
        Regex::new(r#"text="[Ss]end"[^>]*bounds="\[(\d+),(\d+)\]\[(\d+),(\d+)\]""#).unwrap(),
    ]
});

static BOUNDS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"bounds="\[(\d+),(\d+)\]\[(\d+),(\d+)\]""#).unwrap());

static SCREEN_SIZE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)x(\d+)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl Default for ScreenSize {
    fn default() -> Self {
        ScreenSize {
            width: DEFAULT_SCREEN_WIDTH,
            height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

/// What to do when the locator finds nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// A miss stays a miss.
    None,
    /// Substitute a known-good coordinate.
    Fixed(i32, i32),
}

/// Parse `wm size`-style output ("Physical size: 720x1600"). Unparseable
/// input gets the default panel size.
pub fn parse_screen_size(raw: &str) -> ScreenSize {
    SCREEN_SIZE_PATTERN
        .captures(raw)
        .and_then(|caps| {
            let width = caps.get(1)?.as_str().parse().ok()?;
            let height = caps.get(2)?.as_str().parse().ok()?;
            Some(ScreenSize { width, height })
        })
        .unwrap_or_default()
}

/// Center of the first labeled send-button node, trying the resource-id
/// form first, then content-desc, then visible text.
pub fn find_send_button(xml: &str) -> Option<(i32, i32)> {
    for pattern in SEND_PATTERNS.iter() {
        if let Some(center) = pattern.captures(xml).and_then(capture_center) {
            return Some(center);
        }
    }
    None
}

/// Centers of every node sitting in the bottom-right region of the screen,
/// in document order. The send button lives there on every layout we have
/// seen, so this is the candidate list when the labeled patterns miss.
pub fn bottom_right_candidates(xml: &str, screen: ScreenSize) -> Vec<(i32, i32)> {
    BOUNDS_PATTERN
        .captures_iter(xml)
        .filter_map(capture_center)
        .filter(|&(x, y)| {
            x > (screen.width as f64 * 0.7) as i32 && y > (screen.height as f64 * 0.8) as i32
        })
        .collect()
}

/// Labeled match, else first bottom-right candidate, else the fallback
/// policy's answer.
pub fn locate_send_button(
    xml: &str,
    screen: ScreenSize,
    fallback: FallbackPolicy,
) -> Option<(i32, i32)> {
    if let Some(center) = find_send_button(xml) {
        return Some(center);
    }
    if let Some(&center) = bottom_right_candidates(xml, screen).first() {
        return Some(center);
    }
    match fallback {
        FallbackPolicy::None => None,
        FallbackPolicy::Fixed(x, y) => Some((x, y)),
    }
}

fn capture_center(caps: regex::Captures) -> Option<(i32, i32)> {
    let x1: i32 = caps.get(1)?.as_str().parse().ok()?;
    let y1: i32 = caps.get(2)?.as_str().parse().ok()?;
    let x2: i32 = caps.get(3)?.as_str().parse().ok()?;
    let y2: i32 = caps.get(4)?.as_str().parse().ok()?;
    Some(((x1 + x2) / 2, (y1 + y2) / 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEND_NODE: &str = r#"<node index="2" text="" resource-id="com.whatsapp:id/send" class="android.widget.ImageButton" content-desc="Send" bounds="[616,746][726,858]" />"#;

    #[test]
    fn test_find_send_button_by_resource_id() {
        assert_eq!(find_send_button(SEND_NODE), Some((671, 802)));
    }

    #[test]
    fn test_find_send_button_by_content_desc() {
        let xml = r#"<node content-desc="Send" bounds="[600,1400][720,1520]" />"#;
        assert_eq!(find_send_button(xml), Some((660, 1460)));
    }

    #[test]
    fn test_find_send_button_misses_cleanly() {
        let xml = r#"<node text="Type a message" bounds="[0,746][600,858]" />"#;
        assert_eq!(find_send_button(xml), None);
    }

    #[test]
    fn test_bottom_right_candidates_filter_by_region() {
        let xml = r#"
            <node text="header" bounds="[0,0][720,100]" />
            <node text="keyboard key" bounds="[640,1400][720,1500]" />
            <node text="left key" bounds="[0,1400][80,1500]" />
        "#;
        let candidates = bottom_right_candidates(xml, ScreenSize::default());
        assert_eq!(candidates, vec![(680, 1450)]);
    }

    #[test]
    fn test_locate_falls_back_to_fixed_coordinate() {
        let (x, y) = SEND_BUTTON_FALLBACK;
        let located = locate_send_button("<hierarchy/>", ScreenSize::default(), FallbackPolicy::Fixed(x, y));
        assert_eq!(located, Some((671, 802)));

        let missed = locate_send_button("<hierarchy/>", ScreenSize::default(), FallbackPolicy::None);
        assert_eq!(missed, None);
    }

    #[test]
    fn test_parse_screen_size() {
        let parsed = parse_screen_size("Physical size: 1080x2400");
        assert_eq!(
            parsed,
            ScreenSize {
                width: 1080,
                height: 2400
            }
        );
        assert_eq!(parse_screen_size("no size here"), ScreenSize::default());
    }
}
