//! Read-only, module-level shared tables: the avatar palette and the team
//! color/name presets. Per the concurrency model these never change after
//! process start, so every room may read them without synchronization.

/// 12-entry avatar color palette, assigned round-robin on join order.
pub const AVATAR_COLORS: [&str; 12] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#9a6324",
];

pub fn avatar_color(index: usize) -> &'static str {
    AVATAR_COLORS[index % AVATAR_COLORS.len()]
}

/// (name, color) presets teams are drawn from, in order, when `initTeams`
/// needs `count` fresh teams.
pub const TEAM_PRESETS: [(&str, &str); 6] = [
    ("Red", "#e6194b"),
    ("Blue", "#4363d8"),
    ("Green", "#3cb44b"),
    ("Yellow", "#ffe119"),
    ("Purple", "#911eb4"),
    ("Orange", "#f58231"),
];

pub fn team_preset(index: usize) -> (&'static str, &'static str) {
    TEAM_PRESETS[index % TEAM_PRESETS.len()]
}
