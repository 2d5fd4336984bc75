//! The fixed palette of wall colors, sofas and mirrors.
//!
//! Sofa and mirror references are the public asset URLs stored on listings.

pub const WALL_COLORS: [(&str, &str); 8] = [
    ("#f87171", "red"),
    ("#fbbf24", "yellow"),
    ("#34d399", "green"),
    ("#60a5fa", "blue"),
    ("#a78bfa", "purple"),
    ("#f472b6", "pink"),
    ("#facc15", "gold"),
    ("#38bdf8", "sky"),
];

pub const SOFAS: [&str; 4] = [
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/sofas/sofa-1.png",
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/sofas/sofa-2.png",
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/sofas/sofa-3.png",
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/sofas/sofa-4.png",
];

pub const MIRRORS: [&str; 3] = [
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/mirrors/mirror-1.png",
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/mirrors/mirror-2.png",
    "https://uvvctnndpellvuhctmqh.supabase.co/storage/v1/object/public/my-bucket/mirrors/mirror-3.png",
];

pub const DEFAULT_LEFT_WALL: &str = "#fbbf24";
pub const DEFAULT_RIGHT_WALL: &str = "#34d399";

/// Look up a palette color by hex value (case-insensitive) or color name.
pub fn find_color(value: &str) -> Option<&'static str> {
    let value = value.trim();
    WALL_COLORS
        .iter()
        .find(|(hex, name)| hex.eq_ignore_ascii_case(value) || name.eq_ignore_ascii_case(value))
        .map(|(hex, _)| *hex)
}

pub fn color_name(hex: &str) -> Option<&'static str> {
    WALL_COLORS
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(hex))
        .map(|(_, name)| *name)
}

/// Short display label for an asset reference: its file stem.
pub fn asset_label(reference: &str) -> &str {
    let file = reference.rsplit('/').next().unwrap_or(reference);
    file.strip_suffix(".png").unwrap_or(file)
}

/// 1-based lookup into one of the catalog lists.
pub(crate) fn nth<T: Copy>(items: &[T], index: usize) -> Option<T> {
    index.checked_sub(1).and_then(|i| items.get(i)).copied()
}
